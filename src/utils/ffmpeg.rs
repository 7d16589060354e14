//! Модуль для работы с FFmpeg
//!
//! Поиск бинарников, проверка установки и асинхронный запуск процессов
//! с таймаутом. Каждый запуск возвращает типизированный результат, а при
//! ненулевом коде выхода в ошибку попадает stderr инструмента.

use std::ffi::OsStr;
use std::path::{Path, PathBuf};
use std::process::{Output, Stdio};
use std::time::Duration;

use log::debug;
use tokio::process::Command;

use crate::error::{QuizSyncError, Result};

/// Найти инструмент: явный путь из конфигурации или поиск в PATH
pub fn resolve_tool(configured: Option<&Path>, name: &str) -> Result<PathBuf> {
    if let Some(path) = configured {
        if path.exists() {
            return Ok(path.to_path_buf());
        }
        return Err(QuizSyncError::Configuration(format!(
            "{} not found at configured path {}",
            name,
            path.display()
        )));
    }

    which::which(name).map_err(|e| {
        QuizSyncError::Configuration(format!("{} not found in PATH: {}", name, e))
    })
}

/// Проверка наличия FFmpeg
pub async fn check_ffmpeg_installed(ffmpeg: &Path) -> bool {
    Command::new(ffmpeg)
        .arg("-version")
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .await
        .map(|status| status.success())
        .unwrap_or(false)
}

/// Получение версии FFmpeg (первая строка `-version`)
pub async fn get_ffmpeg_version(ffmpeg: &Path) -> Result<String> {
    let output = run_tool(ffmpeg, &["-version"], Duration::from_secs(10)).await?;
    let version_str = String::from_utf8_lossy(&output.stdout);
    Ok(version_str.lines().next().unwrap_or("").to_string())
}

/// Запуск внешнего инструмента
///
/// Процесс убивается, если future отменён или истёк таймаут.
pub async fn run_tool<S: AsRef<OsStr>>(program: &Path, args: &[S], timeout: Duration) -> Result<Output> {
    let tool = tool_name(program);
    debug!(
        "Running {} {}",
        tool,
        args.iter()
            .map(|a| a.as_ref().to_string_lossy().into_owned())
            .collect::<Vec<_>>()
            .join(" ")
    );

    let child = Command::new(program)
        .args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .spawn()?;

    let output = match tokio::time::timeout(timeout, child.wait_with_output()).await {
        Ok(result) => result?,
        Err(_) => {
            return Err(QuizSyncError::ToolTimeout {
                tool,
                seconds: timeout.as_secs(),
            })
        }
    };

    if !output.status.success() {
        return Err(QuizSyncError::Tool {
            tool,
            status: output.status.to_string(),
            stderr: last_lines(&String::from_utf8_lossy(&output.stderr), 8),
        });
    }

    Ok(output)
}

/// Разобрать вывод `ffprobe -show_entries format=duration`
pub fn parse_probe_duration(stdout: &str) -> Result<f64> {
    let value = stdout
        .lines()
        .map(str::trim)
        .find(|line| !line.is_empty())
        .ok_or_else(|| QuizSyncError::InvalidFormat("ffprobe returned no duration".to_string()))?;

    let value = value.strip_prefix("duration=").unwrap_or(value);
    let duration = value
        .parse::<f64>()
        .map_err(|e| QuizSyncError::InvalidFormat(format!("Invalid duration '{}': {}", value, e)))?;

    if !duration.is_finite() || duration < 0.0 {
        return Err(QuizSyncError::InvalidFormat(format!("Invalid duration '{}'", value)));
    }
    Ok(duration)
}

/// Файл существует и не пустой
pub async fn check_file_exists_and_valid(path: &Path) -> bool {
    if let Ok(metadata) = tokio::fs::metadata(path).await {
        if metadata.is_file() && metadata.len() > 0 {
            return true;
        }
    }
    false
}

fn tool_name(program: &Path) -> String {
    program
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| program.display().to_string())
}

// ffmpeg печатает баннер в stderr, полезны только последние строки
fn last_lines(text: &str, count: usize) -> String {
    let lines: Vec<&str> = text.lines().filter(|l| !l.trim().is_empty()).collect();
    let skip = lines.len().saturating_sub(count);
    lines[skip..].join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_probe_duration() {
        assert_eq!(parse_probe_duration("12.345000\n").unwrap(), 12.345);
        assert_eq!(parse_probe_duration("\nduration=3.5\n").unwrap(), 3.5);
        assert!(matches!(parse_probe_duration("N/A"), Err(QuizSyncError::InvalidFormat(_))));
        assert!(parse_probe_duration("").is_err());
    }

    #[test]
    fn test_resolve_tool_with_missing_configured_path() {
        let result = resolve_tool(Some(Path::new("/definitely/not/here/ffmpeg")), "ffmpeg");
        assert!(matches!(result, Err(QuizSyncError::Configuration(_))));
    }

    #[test]
    fn test_last_lines_keeps_tail() {
        let stderr = "banner\n\nconfig\nerror one\nerror two";
        assert_eq!(last_lines(stderr, 2), "error one\nerror two");
        assert_eq!(tool_name(Path::new("/usr/bin/ffprobe")), "ffprobe");
    }

    #[tokio::test]
    async fn test_check_file_exists_and_valid() {
        let dir = tempfile::tempdir().unwrap();
        let empty = dir.path().join("empty.mp4");
        let full = dir.path().join("full.mp4");
        std::fs::write(&empty, b"").unwrap();
        std::fs::write(&full, b"data").unwrap();

        assert!(!check_file_exists_and_valid(&empty).await);
        assert!(check_file_exists_and_valid(&full).await);
        assert!(!check_file_exists_and_valid(&dir.path().join("missing")).await);
    }
}

//! Модуль для работы с аудио
//!
//! Построение аргументов ffmpeg/ffprobe. Функции чистые и не запускают
//! процессы, поэтому командные строки проверяются тестами напрямую.

use std::path::Path;

use crate::config::LoudnessTarget;

/// Диапазон, который поддерживает один фильтр atempo
const ATEMPO_MIN: f64 = 0.5;
const ATEMPO_MAX: f64 = 2.0;

fn path_arg(path: &Path) -> String {
    path.to_string_lossy().into_owned()
}

/// Секунды с точностью до миллисекунды
pub fn seconds_arg(seconds: f64) -> String {
    format!("{:.3}", seconds)
}

fn base_args() -> Vec<String> {
    vec!["-y".to_string(), "-loglevel".to_string(), "error".to_string()]
}

/// Цепочка atempo для произвольного множителя скорости
///
/// Множители вне [0.5, 2.0] раскладываются на несколько фильтров.
pub fn atempo_chain(factor: f64) -> String {
    let mut remaining = factor;
    let mut filters = Vec::new();

    while remaining > ATEMPO_MAX {
        filters.push(format!("atempo={:.1}", ATEMPO_MAX));
        remaining /= ATEMPO_MAX;
    }
    while remaining < ATEMPO_MIN {
        filters.push(format!("atempo={:.1}", ATEMPO_MIN));
        remaining /= ATEMPO_MIN;
    }
    filters.push(format!("atempo={:.4}", remaining));

    filters.join(",")
}

/// Нормализация громкости
///
/// loudnorm внутренне передискретизирует в 192 кГц, поэтому частота
/// задаётся явно.
pub fn loudnorm_args(input: &Path, output: &Path, target: &LoudnessTarget, sample_rate: u32) -> Vec<String> {
    let mut args = base_args();
    args.extend([
        "-i".to_string(),
        path_arg(input),
        "-filter:a".to_string(),
        target.filter(),
        "-ar".to_string(),
        sample_rate.to_string(),
        path_arg(output),
    ]);
    args
}

/// Изменение темпа без изменения высоты тона
pub fn tempo_args(input: &Path, output: &Path, factor: f64, sample_rate: u32) -> Vec<String> {
    let mut args = base_args();
    args.extend([
        "-i".to_string(),
        path_arg(input),
        "-filter:a".to_string(),
        atempo_chain(factor),
        "-ar".to_string(),
        sample_rate.to_string(),
        path_arg(output),
    ]);
    args
}

/// Вырезать отрезок `[start, start + duration)` из клипа
pub fn trim_args(input: &Path, output: &Path, start: f64, duration: f64, sample_rate: u32) -> Vec<String> {
    let mut args = base_args();
    args.extend([
        "-i".to_string(),
        path_arg(input),
        "-ss".to_string(),
        seconds_arg(start),
        "-t".to_string(),
        seconds_arg(duration),
        "-ar".to_string(),
        sample_rate.to_string(),
        path_arg(output),
    ]);
    args
}

/// Тишина заданной длительности (основа сведения)
pub fn silence_args(output: &Path, duration: f64, sample_rate: u32) -> Vec<String> {
    let mut args = base_args();
    args.extend([
        "-f".to_string(),
        "lavfi".to_string(),
        "-i".to_string(),
        format!("anullsrc=channel_layout=stereo:sample_rate={}", sample_rate),
        "-t".to_string(),
        seconds_arg(duration),
        path_arg(output),
    ]);
    args
}

/// Финальный проход: нормализация, затем добивка и обрезка до точной длины
pub fn finalize_args(
    input: &Path,
    output: &Path,
    total_duration: f64,
    target: &LoudnessTarget,
    sample_rate: u32,
) -> Vec<String> {
    let mut args = base_args();
    args.extend([
        "-i".to_string(),
        path_arg(input),
        "-filter:a".to_string(),
        format!("{},apad", target.filter()),
        "-t".to_string(),
        seconds_arg(total_duration),
        "-ar".to_string(),
        sample_rate.to_string(),
        path_arg(output),
    ]);
    args
}

/// Длительность контейнера через ffprobe
pub fn probe_duration_args(path: &Path) -> Vec<String> {
    vec![
        "-v".to_string(),
        "error".to_string(),
        "-show_entries".to_string(),
        "format=duration".to_string(),
        "-of".to_string(),
        "default=noprint_wrappers=1:nokey=1".to_string(),
        path_arg(path),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_atempo_chain() {
        assert_eq!(atempo_chain(1.25), "atempo=1.2500");
        assert_eq!(atempo_chain(5.0), "atempo=2.0,atempo=2.0,atempo=1.2500");
        assert_eq!(atempo_chain(0.2), "atempo=0.5,atempo=0.5,atempo=0.8000");
    }

    #[test]
    fn test_loudnorm_args_force_sample_rate() {
        let args = loudnorm_args(
            Path::new("raw.wav"),
            Path::new("norm.wav"),
            &LoudnessTarget::speech(),
            44100,
        );
        assert_eq!(
            args,
            vec![
                "-y", "-loglevel", "error", "-i", "raw.wav", "-filter:a",
                "loudnorm=I=-20:LRA=11:TP=-2:linear=true", "-ar", "44100", "norm.wav"
            ]
        );
    }

    #[test]
    fn test_finalize_pads_then_cuts() {
        let args = finalize_args(
            Path::new("mixed.wav"),
            Path::new("composite.wav"),
            15.0,
            &LoudnessTarget::master(),
            44100,
        );
        let filter = args.iter().position(|a| a == "-filter:a").unwrap();
        assert_eq!(args[filter + 1], "loudnorm=I=-16:LRA=11:TP=-1.5,apad");
        let cut = args.iter().position(|a| a == "-t").unwrap();
        assert_eq!(args[cut + 1], "15.000");
    }

    #[test]
    fn test_silence_args() {
        let args = silence_args(Path::new("base.wav"), 17.25, 48000);
        assert!(args.contains(&"anullsrc=channel_layout=stereo:sample_rate=48000".to_string()));
        assert!(args.contains(&"17.250".to_string()));
    }
}

//! Контракт внешнего медиаинструмента
//!
//! `MediaTool` описывает все операции, которые конвейер делает через
//! ffmpeg-совместимую утилиту. Каждая операция либо создаёт выходной файл,
//! либо возвращает ошибку; пустой результат никогда не считается успехом.

use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;

use crate::config::{LoudnessTarget, QuizSyncConfig};
use crate::error::{QuizSyncError, Result};
use crate::media::audio;
use crate::media::effects::SoundEffect;
use crate::media::mix::MixPlan;
use crate::media::video::{extract_args, is_remote};
use crate::utils::ffmpeg::{
    check_ffmpeg_installed, check_file_exists_and_valid, get_ffmpeg_version, parse_probe_duration, resolve_tool,
    run_tool,
};

/// Таймаут аудио-операций
const AUDIO_TIMEOUT: Duration = Duration::from_secs(120);
const PROBE_TIMEOUT: Duration = Duration::from_secs(30);

#[async_trait]
pub trait MediaTool: Send + Sync {
    /// Проверить, что инструмент доступен, и вернуть его версию
    async fn version(&self) -> Result<String>;

    /// Длительность контейнера в секундах
    async fn probe_duration(&self, input: &str) -> Result<f64>;

    /// Нормализация громкости
    async fn normalize_loudness(&self, input: &Path, output: &Path, target: &LoudnessTarget) -> Result<()>;

    /// Изменение скорости без изменения высоты тона
    async fn change_tempo(&self, input: &Path, output: &Path, factor: f64) -> Result<()>;

    /// Вырезать отрезок клипа
    async fn trim_audio(&self, input: &Path, output: &Path, start: f64, duration: f64) -> Result<()>;

    /// Тишина заданной длительности
    async fn render_silence(&self, output: &Path, duration: f64) -> Result<()>;

    /// Сведение всех входов плана в один файл
    async fn mix(&self, plan: &MixPlan, output: &Path) -> Result<()>;

    /// Финальная нормализация и приведение к точной длине
    async fn finalize_mix(
        &self,
        input: &Path,
        output: &Path,
        total_duration: f64,
        target: &LoudnessTarget,
    ) -> Result<()>;

    /// Синтез звукового эффекта
    async fn render_effect(&self, effect: SoundEffect, output: &Path) -> Result<()>;

    /// Вырезать и перекодировать отрезок видео
    async fn extract_segment(
        &self,
        source: &str,
        start: f64,
        duration: f64,
        output: &Path,
        timeout: Duration,
    ) -> Result<()>;
}

/// Реализация через процессы ffmpeg и ffprobe
#[derive(Debug, Clone)]
pub struct FfmpegTool {
    ffmpeg: PathBuf,
    ffprobe: PathBuf,
    sample_rate: u32,
}

impl FfmpegTool {
    pub fn new(ffmpeg: PathBuf, ffprobe: PathBuf, sample_rate: u32) -> Self {
        Self {
            ffmpeg,
            ffprobe,
            sample_rate,
        }
    }

    /// Найти бинарники по конфигурации или в PATH
    pub fn from_config(config: &QuizSyncConfig) -> Result<Self> {
        Ok(Self::new(
            resolve_tool(config.ffmpeg_path.as_deref(), "ffmpeg")?,
            resolve_tool(config.ffprobe_path.as_deref(), "ffprobe")?,
            config.sample_rate,
        ))
    }

    async fn ffmpeg(&self, args: Vec<String>, output: &Path, timeout: Duration) -> Result<()> {
        run_tool(&self.ffmpeg, &args, timeout).await?;
        // Нулевой код выхода без файла тоже ошибка
        if !check_file_exists_and_valid(output).await {
            return Err(QuizSyncError::Tool {
                tool: "ffmpeg".to_string(),
                status: "exit status: 0".to_string(),
                stderr: format!("no output written to {}", output.display()),
            });
        }
        Ok(())
    }
}

#[async_trait]
impl MediaTool for FfmpegTool {
    async fn version(&self) -> Result<String> {
        if !check_ffmpeg_installed(&self.ffmpeg).await {
            return Err(QuizSyncError::Configuration(format!(
                "ffmpeg at {} cannot be executed",
                self.ffmpeg.display()
            )));
        }
        get_ffmpeg_version(&self.ffmpeg).await
    }

    async fn probe_duration(&self, input: &str) -> Result<f64> {
        let output = run_tool(&self.ffprobe, &audio::probe_duration_args(Path::new(input)), PROBE_TIMEOUT).await?;
        parse_probe_duration(&String::from_utf8_lossy(&output.stdout))
    }

    async fn normalize_loudness(&self, input: &Path, output: &Path, target: &LoudnessTarget) -> Result<()> {
        self.ffmpeg(audio::loudnorm_args(input, output, target, self.sample_rate), output, AUDIO_TIMEOUT)
            .await
    }

    async fn change_tempo(&self, input: &Path, output: &Path, factor: f64) -> Result<()> {
        if !(factor.is_finite() && factor > 0.0) {
            return Err(QuizSyncError::InvalidFormat(format!("Invalid tempo factor {}", factor)));
        }
        self.ffmpeg(audio::tempo_args(input, output, factor, self.sample_rate), output, AUDIO_TIMEOUT)
            .await
    }

    async fn trim_audio(&self, input: &Path, output: &Path, start: f64, duration: f64) -> Result<()> {
        self.ffmpeg(
            audio::trim_args(input, output, start, duration, self.sample_rate),
            output,
            AUDIO_TIMEOUT,
        )
        .await
    }

    async fn render_silence(&self, output: &Path, duration: f64) -> Result<()> {
        self.ffmpeg(audio::silence_args(output, duration, self.sample_rate), output, AUDIO_TIMEOUT)
            .await
    }

    async fn mix(&self, plan: &MixPlan, output: &Path) -> Result<()> {
        self.ffmpeg(plan.ffmpeg_args(output, self.sample_rate), output, AUDIO_TIMEOUT)
            .await
    }

    async fn finalize_mix(
        &self,
        input: &Path,
        output: &Path,
        total_duration: f64,
        target: &LoudnessTarget,
    ) -> Result<()> {
        self.ffmpeg(
            audio::finalize_args(input, output, total_duration, target, self.sample_rate),
            output,
            AUDIO_TIMEOUT,
        )
        .await
    }

    async fn render_effect(&self, effect: SoundEffect, output: &Path) -> Result<()> {
        self.ffmpeg(effect.render_args(output, self.sample_rate), output, AUDIO_TIMEOUT)
            .await
    }

    async fn extract_segment(
        &self,
        source: &str,
        start: f64,
        duration: f64,
        output: &Path,
        timeout: Duration,
    ) -> Result<()> {
        self.ffmpeg(extract_args(source, start, duration, output, is_remote(source)), output, timeout)
            .await
    }
}

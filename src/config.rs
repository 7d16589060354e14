//! Модуль конфигурации библиотеки quiz-sync
//!
//! Этот модуль содержит структуры для настройки конвейера: пути к инструментам,
//! уровни громкости, допуски по длительности и параметры подбора фонового видео.

use std::path::{Path, PathBuf};
use serde::{Deserialize, Serialize};
use crate::error::{QuizSyncError, Result};
use crate::script::captions::CanvasFormat;

/// Целевые параметры нормализации громкости (фильтр loudnorm)
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LoudnessTarget {
    /// Интегральная громкость, LUFS
    pub integrated: f64,
    /// Диапазон громкости, LU
    pub range: f64,
    /// Потолок истинного пика, dBTP
    pub true_peak: f64,
    /// Линейная нормализация (без динамической обработки)
    pub linear: bool,
}

impl LoudnessTarget {
    /// Уровень для отдельных речевых клипов
    pub fn speech() -> Self {
        Self {
            integrated: -20.0,
            range: 11.0,
            true_peak: -2.0,
            linear: true,
        }
    }

    /// Уровень финального прохода по композитной дорожке
    pub fn master() -> Self {
        Self {
            integrated: -16.0,
            range: 11.0,
            true_peak: -1.5,
            linear: false,
        }
    }

    /// Строка фильтра loudnorm
    pub fn filter(&self) -> String {
        let mut filter = format!(
            "loudnorm=I={}:LRA={}:TP={}",
            self.integrated, self.range, self.true_peak
        );
        if self.linear {
            filter.push_str(":linear=true");
        }
        filter
    }
}

/// Настройки звуковых эффектов
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SoundEffectsConfig {
    /// Добавлять эффекты в сведение
    pub enabled: bool,
    /// Директория для сгенерированных эффектов (по умолчанию внутри кэша)
    pub effects_dir: Option<PathBuf>,
    /// Свой файл для интро
    pub intro: Option<PathBuf>,
    /// Свой файл для тиков обратного отсчёта
    pub countdown: Option<PathBuf>,
    /// Свой файл для правильного ответа
    pub answer: Option<PathBuf>,
}

impl Default for SoundEffectsConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            effects_dir: None,
            intro: None,
            countdown: None,
            answer: None,
        }
    }
}

/// Настройки подбора фонового видео
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct VideoConfig {
    /// Таймаут вырезания сегмента, секунды
    pub extraction_timeout_secs: u64,
    /// Таймаут полной загрузки источника, секунды
    pub download_timeout_secs: u64,
    /// Минимальная длительность, при которой результат считается валидным
    pub min_valid_duration: f64,
    /// Длительность квиза, если она не была вычислена
    pub default_quiz_duration: f64,
    /// Доля длительности источника, отступаемая от конца
    pub safety_margin_ratio: f64,
    /// Максимальный отступ от конца, секунды
    pub max_safety_margin: f64,
}

impl Default for VideoConfig {
    fn default() -> Self {
        Self {
            extraction_timeout_secs: 120,
            download_timeout_secs: 300,
            min_valid_duration: 0.1,
            default_quiz_duration: 30.0,
            safety_margin_ratio: 0.1,
            max_safety_margin: 5.0,
        }
    }
}

/// Конфигурация библиотеки
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct QuizSyncConfig {
    /// Путь к ffmpeg (ищется в PATH, если не указан)
    pub ffmpeg_path: Option<PathBuf>,
    /// Путь к ffprobe (ищется в PATH, если не указан)
    pub ffprobe_path: Option<PathBuf>,
    /// Базовая директория для рабочих директорий рендеров
    pub work_dir: Option<PathBuf>,
    /// Директория для кэша между рендерами
    pub cache_dir: Option<PathBuf>,
    /// Максимальный размер кэша в байтах
    pub max_cache_size: Option<u64>,
    /// Удалять временные файлы после завершения
    pub cleanup_temp_files: bool,
    /// Частота дискретизации всех промежуточных файлов
    pub sample_rate: u32,
    /// Нормализация отдельных речевых клипов
    pub speech_loudness: LoudnessTarget,
    /// Финальная нормализация композитной дорожки
    pub final_loudness: LoudnessTarget,
    /// Громкость речевых входов при сведении
    pub component_gain: f32,
    /// Громкость звуковых эффектов при сведении
    pub effect_gain: f32,
    /// Допуск подгонки речи под слот, секунды
    pub fit_tolerance: f64,
    /// Допуск длительности композитной дорожки, секунды
    pub mix_tolerance: f64,
    /// Формат холста (влияет на разбиение субтитров)
    pub canvas: CanvasFormat,
    /// Звуковые эффекты
    pub sound_effects: SoundEffectsConfig,
    /// Фоновое видео
    pub video: VideoConfig,
}

impl Default for QuizSyncConfig {
    fn default() -> Self {
        Self {
            ffmpeg_path: None,
            ffprobe_path: None,
            work_dir: None,
            cache_dir: None,
            max_cache_size: Some(2 * 1024 * 1024 * 1024), // 2 GB
            cleanup_temp_files: true,
            sample_rate: 44100,
            speech_loudness: LoudnessTarget::speech(),
            final_loudness: LoudnessTarget::master(),
            component_gain: 0.9,
            effect_gain: 0.7,
            fit_tolerance: 0.15,
            mix_tolerance: 0.05,
            canvas: CanvasFormat::default(),
            sound_effects: SoundEffectsConfig::default(),
            video: VideoConfig::default(),
        }
    }
}

impl QuizSyncConfig {
    /// Загрузить конфигурацию из JSON-файла
    pub fn from_json_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let raw = std::fs::read_to_string(path.as_ref()).map_err(|e| {
            QuizSyncError::Configuration(format!(
                "Failed to read config file {}: {}",
                path.as_ref().display(),
                e
            ))
        })?;
        let config: Self = serde_json::from_str(&raw)?;
        config.validate()?;
        Ok(config)
    }

    /// Проверить значения конфигурации
    pub fn validate(&self) -> Result<()> {
        if self.sample_rate == 0 {
            return Err(QuizSyncError::Configuration("sample_rate must be positive".to_string()));
        }
        if !(self.fit_tolerance > 0.0) || !(self.mix_tolerance > 0.0) {
            return Err(QuizSyncError::Configuration(
                "fit_tolerance and mix_tolerance must be positive".to_string(),
            ));
        }
        if self.component_gain < 0.0 || self.effect_gain < 0.0 {
            return Err(QuizSyncError::Configuration("gains must not be negative".to_string()));
        }
        if !(0.0..1.0).contains(&self.video.safety_margin_ratio) || self.video.max_safety_margin < 0.0 {
            return Err(QuizSyncError::Configuration(
                "video safety margin must be within [0, 1) and non-negative".to_string(),
            ));
        }
        if !(self.video.default_quiz_duration > 0.0) {
            return Err(QuizSyncError::Configuration(
                "video.default_quiz_duration must be positive".to_string(),
            ));
        }
        Ok(())
    }

    /// Директория кэша (по умолчанию во временной директории системы)
    pub fn resolved_cache_dir(&self) -> PathBuf {
        self.cache_dir
            .clone()
            .unwrap_or_else(|| std::env::temp_dir().join("quiz-sync-cache"))
    }

    /// Директория для сгенерированных звуковых эффектов
    pub fn resolved_effects_dir(&self) -> PathBuf {
        self.sound_effects
            .effects_dir
            .clone()
            .unwrap_or_else(|| self.resolved_cache_dir().join("sound_effects"))
    }
}

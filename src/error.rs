//! Модуль обработки ошибок библиотеки quiz-sync
//!
//! Каждая фатальная ошибка несёт контекст: какой компонент или этап конвейера
//! упал и что сообщил внешний инструмент.

use std::fmt;
use thiserror::Error;

/// Этап конвейера рендеринга, на котором произошла ошибка
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RenderStage {
    /// Подготовка: конфигурация, рабочая директория, поиск инструментов
    Setup,
    /// Разбор сценария
    Parsing,
    /// Синтез и подгонка речи под слоты
    Fitting,
    /// Сведение композитной дорожки
    Mixing,
    /// Подбор фонового видео
    VideoReconciliation,
    /// Передача внешнему рендереру
    Rendering,
}

impl RenderStage {
    /// Получить название этапа в виде строки
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Setup => "setup",
            Self::Parsing => "script parsing",
            Self::Fitting => "speech fitting",
            Self::Mixing => "audio mixing",
            Self::VideoReconciliation => "video reconciliation",
            Self::Rendering => "rendering",
        }
    }
}

impl fmt::Display for RenderStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Ошибки библиотеки quiz-sync
#[derive(Debug, Error)]
pub enum QuizSyncError {
    /// Ошибка ввода-вывода
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Ошибка сериализации/десериализации JSON
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Ошибка HTTP запроса
    #[error("HTTP request error: {0}")]
    Http(#[from] reqwest::Error),

    /// Внешний инструмент завершился с ненулевым кодом
    #[error("{tool} failed ({status}): {stderr}")]
    Tool {
        tool: String,
        status: String,
        stderr: String,
    },

    /// Внешний инструмент не уложился в отведённое время
    #[error("{tool} timed out after {seconds}s")]
    ToolTimeout { tool: String, seconds: u64 },

    /// Неверный формат вывода инструмента или данных
    #[error("Invalid format: {0}")]
    InvalidFormat(String),

    /// Ошибка конфигурации
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Синтез речи для компонента не удался
    #[error("Speech synthesis failed for {component}: {message}")]
    Synthesis { component: String, message: String },

    /// Измерение длительности или растяжение не удалось
    #[error("Speech fitting failed for {component}: {message}")]
    Fitting { component: String, message: String },

    /// Любой шаг построения композитной дорожки
    #[error("Audio mixing failed: {0}")]
    Mix(String),

    /// Все уровни подбора фонового видео исчерпаны
    #[error("Background video resolution failed: {0}")]
    VideoResolution(String),

    /// Внешний рендерер вернул ошибку
    #[error("Rendering failed: {0}")]
    Render(String),

    /// В сценарии нет ни одного компонента
    #[error("Timeline is empty: the script produced no components")]
    EmptyTimeline,

    /// Другая ошибка
    #[error("Other error: {0}")]
    Other(String),
}

impl QuizSyncError {
    /// Этап конвейера, к которому относится ошибка
    pub fn stage(&self) -> RenderStage {
        match self {
            Self::EmptyTimeline => RenderStage::Parsing,
            Self::Synthesis { .. } | Self::Fitting { .. } => RenderStage::Fitting,
            Self::Mix(_) => RenderStage::Mixing,
            Self::VideoResolution(_) => RenderStage::VideoReconciliation,
            Self::Render(_) => RenderStage::Rendering,
            Self::Io(_)
            | Self::Json(_)
            | Self::Http(_)
            | Self::Tool { .. }
            | Self::ToolTimeout { .. }
            | Self::InvalidFormat(_)
            | Self::Configuration(_)
            | Self::Other(_) => RenderStage::Setup,
        }
    }
}

impl From<&str> for QuizSyncError {
    fn from(s: &str) -> Self {
        QuizSyncError::Other(s.to_string())
    }
}

impl From<String> for QuizSyncError {
    fn from(s: String) -> Self {
        QuizSyncError::Other(s)
    }
}

/// Тип Result для библиотеки quiz-sync
pub type Result<T> = std::result::Result<T, QuizSyncError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stage_mapping() {
        let err = QuizSyncError::Fitting {
            component: "answer#2".to_string(),
            message: "atempo failed".to_string(),
        };
        assert_eq!(err.stage(), RenderStage::Fitting);
        assert!(err.to_string().contains("answer#2"));

        assert_eq!(QuizSyncError::Mix("x".into()).stage(), RenderStage::Mixing);
        assert_eq!(
            QuizSyncError::VideoResolution("x".into()).stage(),
            RenderStage::VideoReconciliation
        );
        assert_eq!(QuizSyncError::EmptyTimeline.stage(), RenderStage::Parsing);
    }

    #[test]
    fn test_tool_error_keeps_diagnostic() {
        let err = QuizSyncError::Tool {
            tool: "ffmpeg".to_string(),
            status: "exit status: 1".to_string(),
            stderr: "Invalid argument".to_string(),
        };
        assert_eq!(err.to_string(), "ffmpeg failed (exit status: 1): Invalid argument");
    }
}

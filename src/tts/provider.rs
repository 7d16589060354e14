//! Интерфейс внешнего синтеза речи

use std::path::Path;
use async_trait::async_trait;

/// Синтезатор речи: записывает озвученный текст в аудиофайл
///
/// Формат файла любой, который понимает ffmpeg. Длительность результата
/// не предполагается: подгонщик всегда измеряет её сам.
#[async_trait]
pub trait SpeechSynthesizer: Send + Sync {
    /// Название провайдера для логов
    fn name(&self) -> &str {
        "speech"
    }

    /// Синтезировать `text` в файл `output`
    async fn synthesize(&self, text: &str, output: &Path) -> anyhow::Result<()>;
}

//! # Progress
//!
//! События прогресса конвейера рендеринга. Отправляются в необязательный
//! канал `tokio::sync::mpsc`; отсутствие получателя никогда не роняет рендер.

use serde::Serialize;
use tokio::sync::mpsc::Sender;

use crate::media::video::ReconcileTier;
use crate::script::types::ComponentKind;

/// Обновление прогресса для отправки клиенту
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum ProgressUpdate {
    /// Началась обработка
    Started,
    /// Разбор сценария
    ParsingScript,
    /// Подготовка звуковых эффектов
    GeneratingEffects,
    /// Синтез и подгонка речи для компонента
    FittingComponent {
        current: usize,
        total: usize,
        kind: ComponentKind,
    },
    /// Сведение композитной дорожки
    Mixing { inputs: usize },
    /// Подбор фонового видео
    ReconcilingVideo,
    /// Переход к следующему уровню подбора видео
    VideoFallback { tier: ReconcileTier },
    /// Передача внешнему рендереру
    Rendering,
    /// Обработка завершена
    Finished,
}

/// Отправить обновление, если канал задан
pub async fn send_progress(sender: &Option<Sender<ProgressUpdate>>, update: ProgressUpdate) {
    if let Some(sender) = sender {
        let _ = sender.send(update).await;
    }
}

//! Модуль для работы с медиафайлами
//!
//! Подготовка аудио, сведение композитной дорожки, звуковые эффекты и
//! подбор фонового видео. Все вызовы ffmpeg идут через `MediaTool`.

pub mod tool;
pub mod audio;
pub mod mix;
pub mod effects;
pub mod video;

pub use tool::{FfmpegTool, MediaTool};
pub use mix::{AudioMixer, CompositeTrack, MixInput, MixPlan};
pub use effects::{EffectCue, SoundEffect, SoundEffectSet};
pub use video::{
    choose_window, BackgroundSource, HttpFetcher, ReconcileTier, SourceFetcher, VideoReconciler,
    VideoSegment, VideoWindow,
};

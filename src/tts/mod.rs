//! Модуль для работы с TTS
//!
//! Синтез речи подключается снаружи через `SpeechSynthesizer`; здесь
//! подготовка текста и подгонка длительности клипов под слоты.

pub mod provider;
pub mod text;
pub mod fitter;

pub use provider::SpeechSynthesizer;
pub use text::{clean_content_for_audio, spoken_text};
pub use fitter::{AudioAsset, ComponentAudio, SpeechFitter};

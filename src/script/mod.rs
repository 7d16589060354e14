//! Модуль для работы со сценарием квиза
//!
//! Разбор сценария в таймлайн, типы компонентов и генерация субтитров.

pub mod types;
pub mod parser;
pub mod captions;

pub use types::{
    Component, ComponentId, ComponentKind, CountdownBeat, IntroSpec, ParseWarning, Timeline,
    COUNTDOWN_SPOKEN_TEXT,
};
pub use parser::{parse, parse_with_warnings, ParsedScript};
pub use captions::{captions, CanvasFormat, Caption};

//! Вспомогательные модули
//!
//! Запуск внешних инструментов, временные файлы рендера и логирование.

pub mod ffmpeg;
pub mod temp;
pub mod logger;

pub use ffmpeg::{check_file_exists_and_valid, resolve_tool, run_tool};
pub use temp::{RenderWorkspace, ScratchFile};
pub use logger::init_logger;

use env_logger::{Builder, Env};
use log::LevelFilter;
use std::io::Write;

/// Фильтр по умолчанию, переопределяется через `RUST_LOG`
pub const DEFAULT_FILTER: &str = "warn,quiz_sync=info";

/// Инициализация логгера
///
/// Повторный вызов ничего не делает, поэтому библиотека может вызывать его
/// из тестов и из приложения-хоста одновременно.
pub fn init_logger() {
    let env = Env::default().filter_or("RUST_LOG", DEFAULT_FILTER);

    let mut builder = Builder::from_env(env);

    // Подавляем шумные HTTP-модули
    builder
        .filter_module("hyper", LevelFilter::Error)
        .filter_module("hyper_util", LevelFilter::Error)
        .filter_module("mio", LevelFilter::Error)
        .filter_module("reqwest", LevelFilter::Warn)
        .filter_module("rustls", LevelFilter::Warn)
        .format(|buf, record| {
            writeln!(
                buf,
                "[{}] {}: {}",
                record.level(),
                record.target(),
                record.args()
            )
        })
        .target(env_logger::Target::Stderr);

    let _ = builder.try_init();
}

// logs.rs

use pmoconfig::Config;
use tracing::Level;
use tracing_subscriber::{
    Registry,
    filter::LevelFilter,
    layer::SubscriberExt,
    util::SubscriberInitExt,
};

/// Initialise le système de logging à partir de `host.logger`
///
/// Le niveau minimal vient de `host.logger.min_level` (TRACE si la valeur
/// est invalide), la sortie console de `host.logger.enable_console`.
pub fn init_logging(config: &Config) {
    let log_level = string_to_level(&config.get_log_min_level())
        .map(level_to_levelfilter)
        .unwrap_or(LevelFilter::TRACE);

    let subscriber = Registry::default().with(log_level);

    if config.get_log_enable_console() {
        subscriber
            .with(
                tracing_subscriber::fmt::layer()
                    .with_target(true)
                    .with_level(true)
                    .with_ansi(true),
            )
            .init();
    } else {
        subscriber.init();
    }
}

fn string_to_level(s: &str) -> Option<Level> {
    match s.trim().to_uppercase().as_str() {
        "ERROR" => Some(Level::ERROR),
        "WARN" | "WARNING" => Some(Level::WARN),
        "INFO" => Some(Level::INFO),
        "DEBUG" => Some(Level::DEBUG),
        "TRACE" => Some(Level::TRACE),
        _ => None,
    }
}

fn level_to_levelfilter(level: Level) -> LevelFilter {
    match level {
        Level::ERROR => LevelFilter::ERROR,
        Level::WARN => LevelFilter::WARN,
        Level::INFO => LevelFilter::INFO,
        Level::DEBUG => LevelFilter::DEBUG,
        Level::TRACE => LevelFilter::TRACE,
    }
}

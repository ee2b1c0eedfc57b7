//! Logging initialization for the CLI.
//!
//! Per-stage targets (`tick::lexer`, `tick::parser`, `tick::compiler`,
//! `tick::vm`, `tick::runtime`, `tick::cache`) share one level chosen
//! on the command line; everything else stays at warn.

use tracing_subscriber::{
    filter::{LevelFilter, Targets},
    fmt,
    layer::SubscriberExt,
    util::SubscriberInitExt,
    Layer,
};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LogFormat {
    /// Human-oriented multi-line output.
    Pretty,
    /// One line per record.
    Compact,
}

impl LogFormat {
    pub fn from_str(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "pretty" => LogFormat::Pretty,
            _ => LogFormat::Compact,
        }
    }
}

pub fn parse_level(s: &str) -> LevelFilter {
    match s.to_lowercase().as_str() {
        "off" | "silent" => LevelFilter::OFF,
        "error" => LevelFilter::ERROR,
        "warn" => LevelFilter::WARN,
        "info" => LevelFilter::INFO,
        "debug" => LevelFilter::DEBUG,
        "trace" => LevelFilter::TRACE,
        _ => LevelFilter::WARN,
    }
}

pub fn init(level: LevelFilter, format: LogFormat) {
    let targets = Targets::new()
        .with_default(LevelFilter::WARN)
        .with_target("tick", level);

    match format {
        LogFormat::Pretty => {
            let layer = fmt::layer().pretty().with_target(true).with_filter(targets);
            tracing_subscriber::registry().with(layer).init();
        }
        LogFormat::Compact => {
            let layer = fmt::layer()
                .compact()
                .with_target(false)
                .without_time()
                .with_filter(targets);
            tracing_subscriber::registry().with(layer).init();
        }
    }
}

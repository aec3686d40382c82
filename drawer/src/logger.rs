use std::path::Path;

use anyhow::{Context, Result};
use clap::ValueEnum;
use fern::colors::{Color, ColoredLevelConfig};
use log::LevelFilter;
use serde::{Deserialize, Serialize};
use strum::Display;

pub const DATETIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.3f";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ValueEnum, Display)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum LogLevel {
    Off,
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl From<LogLevel> for LevelFilter {
    fn from(value: LogLevel) -> Self {
        match value {
            LogLevel::Off => LevelFilter::Off,
            LogLevel::Error => LevelFilter::Error,
            LogLevel::Warn => LevelFilter::Warn,
            LogLevel::Info => LevelFilter::Info,
            LogLevel::Debug => LevelFilter::Debug,
            LogLevel::Trace => LevelFilter::Trace,
        }
    }
}

pub struct LoggerConfig<'a> {
    pub level: LogLevel,
    pub dir_path: &'a str,
    pub filename_log: &'a str,
    pub disable_file_logging: bool,
    pub disable_colors: bool,
}

/// Install the global logger: console always, plus an appending log file
pub fn init(config: LoggerConfig<'_>) -> Result<()> {
    let colors = ColoredLevelConfig::new()
        .error(Color::Red)
        .warn(Color::Yellow)
        .info(Color::Green)
        .debug(Color::Cyan)
        .trace(Color::Magenta);
    let disable_colors = config.disable_colors;

    let console = fern::Dispatch::new()
        .format(move |out, message, record| {
            let now = chrono::Local::now().format(DATETIME_FORMAT);
            if disable_colors {
                out.finish(format_args!(
                    "{} [{:>5}] [{}] {}",
                    now,
                    record.level(),
                    record.target(),
                    message
                ))
            } else {
                out.finish(format_args!(
                    "{} [{:>5}] [{}] {}",
                    now,
                    colors.color(record.level()),
                    record.target(),
                    message
                ))
            }
        })
        .chain(std::io::stdout());

    let mut dispatch = fern::Dispatch::new()
        .level(config.level.into())
        // HTTP internals are noise at our debug level
        .level_for("hyper", LevelFilter::Warn)
        .level_for("reqwest", LevelFilter::Warn)
        .chain(console);

    if !config.disable_file_logging {
        let dir = Path::new(config.dir_path);
        std::fs::create_dir_all(dir)
            .with_context(|| format!("Failed to create logs directory {}", dir.display()))?;
        let path = dir.join(config.filename_log);
        let file = fern::log_file(&path)
            .with_context(|| format!("Failed to open log file {}", path.display()))?;

        dispatch = dispatch.chain(
            fern::Dispatch::new()
                .format(|out, message, record| {
                    out.finish(format_args!(
                        "{} [{:>5}] [{}] {}",
                        chrono::Local::now().format(DATETIME_FORMAT),
                        record.level(),
                        record.target(),
                        message
                    ))
                })
                .chain(file),
        );
    }

    dispatch.apply().context("Failed to install logger")?;
    Ok(())
}

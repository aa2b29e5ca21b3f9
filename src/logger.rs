use std::env;
use std::str::FromStr;

use anyhow::{Context, Result};
use log::{LevelFilter, Log, Metadata, Record};

const DEFAULT_LEVEL: LevelFilter = LevelFilter::Warn;

/// Prints log records to stderr as `LEVEL [target] message`.
struct Logger {
    level: LevelFilter,
}

impl Log for Logger {
    fn enabled(&self, metadata: &Metadata<'_>) -> bool {
        metadata.level() <= self.level
    }

    fn log(&self, record: &Record<'_>) {
        if self.enabled(record.metadata()) {
            let target = if !record.target().is_empty() {
                record.target()
            } else {
                record.module_path().unwrap_or_default()
            };
            eprintln!("{:<5} [{}] {}", record.level(), target, record.args());
        }
    }

    fn flush(&self) {}
}

/// Installs the logger. The level is read from `RUST_LOG` and then raised by `verbose` steps or lowered by `quiet`
/// steps.
pub fn init(verbose: u64, quiet: u64) -> Result<()> {
    let base = match env::var("RUST_LOG") {
        Ok(value) => LevelFilter::from_str(&value).with_context(|| format!("Invalid RUST_LOG level {:?}", value))?,
        Err(_) => DEFAULT_LEVEL,
    };
    let level = adjust_level(base, verbose as i64 - quiet as i64);
    log::set_boxed_logger(Box::new(Logger { level })).context("Logger already installed")?;
    log::set_max_level(level);
    Ok(())
}

fn adjust_level(base: LevelFilter, steps: i64) -> LevelFilter {
    let levels = [
        LevelFilter::Off,
        LevelFilter::Error,
        LevelFilter::Warn,
        LevelFilter::Info,
        LevelFilter::Debug,
        LevelFilter::Trace,
    ];
    let idx = levels.iter().position(|&level| level == base).unwrap_or(2) as i64;
    levels[(idx + steps).clamp(0, levels.len() as i64 - 1) as usize]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn adjusts_level_within_bounds() {
        assert_eq!(adjust_level(LevelFilter::Warn, 0), LevelFilter::Warn);
        assert_eq!(adjust_level(LevelFilter::Warn, 2), LevelFilter::Debug);
        assert_eq!(adjust_level(LevelFilter::Warn, 10), LevelFilter::Trace);
        assert_eq!(adjust_level(LevelFilter::Warn, -1), LevelFilter::Error);
        assert_eq!(adjust_level(LevelFilter::Info, -5), LevelFilter::Off);
    }
}

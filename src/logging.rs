use std::io::Write;

use chrono::Local;
use colored::*;
use env_logger::{Builder, Env};
use log::Level;

// chrono only formats up to milliseconds here
const TS_DASHES_BLANK_COLONS_DOT: &str = "%Y-%m-%d %H:%M:%S%.3f";

/// Installs the global logger. `RUST_LOG` wins over `debug` when set.
pub fn init_logger(debug: bool) {
    let default_level = if debug { "debug" } else { "info" };
    let mut builder = Builder::from_env(Env::default().default_filter_or(default_level));
    builder.format(|buf, record| {
        writeln!(
            buf,
            "{} {} [{}] {}",
            Local::now().format(TS_DASHES_BLANK_COLONS_DOT),
            paint(record.level()),
            record.module_path().unwrap_or(""),
            record.args()
        )
    });
    // A second call (e.g. from tests) keeps the first logger.
    let _ = builder.try_init();
}

fn paint(level: Level) -> ColoredString {
    let label = level.to_string();
    match level {
        Level::Error => label.red().bold(),
        Level::Warn => label.yellow(),
        Level::Info => label.green(),
        Level::Debug => label.blue(),
        Level::Trace => label.dimmed(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_init_twice_is_harmless() {
        init_logger(false);
        init_logger(true);
        log::info!("logger initialised");
    }
}

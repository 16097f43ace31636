// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Logger configuration.

use {
    log::{Level, LevelFilter},
    std::{io::Write, time::Instant},
};

const WHITE: &str = "\x1b[97;20m";
const GREY: &str = "\x1b[38;20m";
const GREEN: &str = "\x1b[32;20m";
const YELLOW: &str = "\x1b[33;20m";
const RED: &str = "\x1b[31;20m";
const RESET: &str = "\x1b[0m";

/// Resolve the log level from the `DEBUG` setting and `--verbose` count.
pub fn log_level(debug: bool, verbose: u8) -> LevelFilter {
    let base = if debug { 1 } else { 0 };

    match base + verbose {
        0 => LevelFilter::Info,
        1 => LevelFilter::Debug,
        _ => LevelFilter::Trace,
    }
}

fn level_color(level: Level) -> &'static str {
    match level {
        Level::Error => RED,
        Level::Warn => YELLOW,
        Level::Info => GREEN,
        Level::Debug | Level::Trace => GREY,
    }
}

/// Format elapsed seconds as `HH:MM:SS`.
pub fn format_elapsed(secs: u64) -> String {
    format!(
        "{:02}:{:02}:{:02}",
        (secs / 3600) % 24,
        (secs / 60) % 60,
        secs % 60
    )
}

/// Render a single log line.
pub fn format_record(
    elapsed: &str,
    level: Level,
    target: &str,
    message: &str,
    use_color: bool,
) -> String {
    if use_color {
        format!(
            "{WHITE}{elapsed}{RESET} - {}{level}{RESET} - {WHITE}{target}{RESET} - {GREY}{message}{RESET}",
            level_color(level),
        )
    } else {
        format!("{elapsed} - {level} - {target} - {message}")
    }
}

/// Install the global logger.
///
/// `RUST_LOG` takes precedence over the computed level.
pub fn init_logging(level: LevelFilter, use_color: bool) {
    let start = Instant::now();

    let mut builder = env_logger::Builder::from_env(
        env_logger::Env::default().default_filter_or(level.as_str()),
    );

    builder.format(move |buf, record| {
        let elapsed = format_elapsed(start.elapsed().as_secs());
        writeln!(
            buf,
            "{}",
            format_record(
                &elapsed,
                record.level(),
                record.target(),
                &record.args().to_string(),
                use_color,
            )
        )
    });

    // HTTP client internals are noisy below warn.
    for module in ["reqwest", "rustls", "hyper"] {
        builder.filter_module(module, LevelFilter::Warn);
    }

    // Ignore a second initialization, as happens in tests.
    let _ = builder.try_init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_log_level() {
        assert_eq!(log_level(false, 0), LevelFilter::Info);
        assert_eq!(log_level(true, 0), LevelFilter::Debug);
        assert_eq!(log_level(false, 1), LevelFilter::Debug);
        assert_eq!(log_level(true, 3), LevelFilter::Trace);
    }

    #[test]
    fn test_format_elapsed() {
        assert_eq!(format_elapsed(0), "00:00:00");
        assert_eq!(format_elapsed(3725), "01:02:05");
    }

    #[test]
    fn test_format_record() {
        assert_eq!(
            format_record("00:00:01", Level::Info, "buildpylib::shell", "hi", false),
            "00:00:01 - INFO - buildpylib::shell - hi"
        );

        let colored = format_record("00:00:01", Level::Warn, "t", "m", true);
        assert!(colored.starts_with("\x1b[97;20m00:00:01\x1b[0m - \x1b[33;20mWARN\x1b[0m"));
        assert!(colored.ends_with("\x1b[38;20mm\x1b[0m"));
    }
}

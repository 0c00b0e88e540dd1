use log::LevelFilter;
use simplelog::{ColorChoice, ConfigBuilder, TermLogger, TerminalMode};
use std::str::FromStr;

/// Environment variable selecting the log level (`off`, `error`, ..., `trace`).
pub const LOG_ENV: &str = "MYSH_LOG";

/// Level named by `value`, `Off` when absent or unrecognised.
pub fn level_from(value: Option<&str>) -> LevelFilter {
    value
        .and_then(|v| LevelFilter::from_str(v.trim()).ok())
        .unwrap_or(LevelFilter::Off)
}

/// Send `log` records to stderr at the level given by `MYSH_LOG`.
///
/// Best-effort: with logging off nothing is installed, and a logger that fails to
/// initialise is ignored so diagnostics stay one line per error.
pub fn init_logging() {
    let level = level_from(std::env::var(LOG_ENV).ok().as_deref());
    if level == LevelFilter::Off {
        return;
    }
    let config = ConfigBuilder::new()
        .set_time_level(LevelFilter::Off)
        .set_target_level(LevelFilter::Off)
        .build();
    let _ = TermLogger::init(level, config, TerminalMode::Stderr, ColorChoice::Never);
}

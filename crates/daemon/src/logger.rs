use anyhow::Result;
use chrono::Utc;
use fern::Dispatch;
use log::LevelFilter;

/// Environment variable holding the log level (`error` .. `trace`).
pub const LOG_LEVEL_VAR: &str = "PORTFOLIO_LOG_LEVEL";

/// Sets up console logging.
///
/// Level comes from `PORTFOLIO_LOG_LEVEL` (default `info`). HTTP client
/// internals are capped at `warn`.
pub fn setup_logger() -> Result<()> {
    let level = std::env::var(LOG_LEVEL_VAR)
        .ok()
        .and_then(|raw| raw.parse::<LevelFilter>().ok())
        .unwrap_or(LevelFilter::Info);

    Dispatch::new()
        .level(level)
        .level_for("reqwest", LevelFilter::Warn)
        .level_for("hyper", LevelFilter::Warn)
        .chain(std::io::stdout())
        .format(|out, message, record| {
            out.finish(format_args!(
                "{} [{}] {}: {}",
                Utc::now().format("%Y-%m-%dT%H:%M:%SZ"),
                record.level(),
                record.target(),
                message
            ));
        })
        .apply()?;
    Ok(())
}

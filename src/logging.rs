use simplelog::*;
use std::fs::{self, OpenOptions};
use std::io::{Error, ErrorKind};
use std::path::PathBuf;

/// `~/.local/share/clocksyncrs/logs`
pub fn log_dir() -> Result<PathBuf, Error> {
    let home = std::env::var("HOME")
        .map_err(|_| Error::new(ErrorKind::NotFound, "HOME environment variable not set"))?;

    Ok(PathBuf::from(home)
        .join(".local")
        .join("share")
        .join("clocksyncrs")
        .join("logs"))
}

/// Sends debug and above to `app.log` in [`log_dir`]. Fails if a logger is
/// already installed.
pub fn init_logger() -> Result<(), Error> {
    let log_dir = log_dir()?;
    fs::create_dir_all(&log_dir)?;

    let log_file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(log_dir.join("app.log"))?;

    // Thread names tell the pulse, maintenance and MIDI threads apart
    let config = ConfigBuilder::new()
        .set_thread_level(LevelFilter::Debug)
        .set_thread_mode(ThreadLogMode::Names)
        .build();

    CombinedLogger::init(vec![WriteLogger::new(LevelFilter::Debug, config, log_file)])
        .map_err(|e| Error::new(ErrorKind::Other, e))
}

/// Logs to stderr, filtered by `RUST_LOG` (default `info`).
pub fn init_stderr_logger() -> Result<(), Error> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .try_init()
        .map_err(|e| Error::new(ErrorKind::Other, e))
}

use std::fs::OpenOptions;
use std::io::Write;
use anyhow::{anyhow, Result};
use env_logger::{Builder, Target};
use log::LevelFilter;

/// Installs the global logger.
///
/// # Arguments
///
/// * `verbose` - Log at debug level instead of info.
/// * `logfile` - Append to this file instead of writing to stderr.
pub fn init_logger(verbose: bool, logfile: Option<&str>) -> Result<LevelFilter> {
    let log_level = if verbose {
        LevelFilter::Debug
    } else {
        LevelFilter::Info
    };

    let mut builder = Builder::new();
    builder
        .filter_level(log_level)
        .format(|buf, record| {
            writeln!(
                buf,
                "[{}] {} {}: {}",
                chrono::Local::now().format("%Y-%m-%d %H:%M:%S"),
                record.level(),
                record.target(),
                record.args()
            )
        });

    if let Some(path) = logfile {
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .map_err(|e| anyhow!("Failed to open log file {}: {}", path, e))?;
        builder.target(Target::Pipe(Box::new(file)));
    }

    builder.try_init().map_err(|e| anyhow!("Failed to initialise logging: {}", e))?;
    Ok(log_level)
}

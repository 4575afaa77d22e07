use flexi_logger::{Logger, LoggerHandle};

/// Start logging to stderr. `RUST_LOG` overrides `base_level`.
///
/// Keep the returned handle alive for the life of the program.
pub fn setup_logging(base_level: &str) -> anyhow::Result<LoggerHandle> {
    let handle = Logger::try_with_env_or_str(base_level)?
        .log_to_stderr()
        .format(flexi_logger::detailed_format)
        .start()?;
    Ok(handle)
}

//! Logging setup shared by the binaries.
//!
//! Logs always go to stderr: the probe's stdout has to stay byte-exact.

use tracing::Level;

/// Map a `-v` count onto a max level. Zero means warnings and errors only.
pub fn level_for(verbosity: u8) -> Level {
    match verbosity {
        0 => Level::WARN,
        1 => Level::INFO,
        2 => Level::DEBUG,
        _ => Level::TRACE,
    }
}

/// Install the global subscriber and bridge `log` records into it.
pub fn setup_logging(level: Level) -> miette::Result<()> {
    use miette::IntoDiagnostic;

    tracing::subscriber::set_global_default(
        tracing_subscriber::fmt()
            .without_time()
            .with_writer(std::io::stderr)
            .with_max_level(level)
            .finish(),
    )
    .into_diagnostic()?;
    tracing_log::LogTracer::init().into_diagnostic()?;
    Ok(())
}

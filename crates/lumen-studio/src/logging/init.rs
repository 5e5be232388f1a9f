use std::io::Write;

use log::SetLoggerError;

use super::filter::{resolve_filter, Verbosity};

/// `--color` on the command line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
pub enum ColorChoice {
    #[default]
    Auto,
    Always,
    Never,
}

impl From<ColorChoice> for env_logger::WriteStyle {
    fn from(choice: ColorChoice) -> Self {
        match choice {
            ColorChoice::Auto => env_logger::WriteStyle::Auto,
            ColorChoice::Always => env_logger::WriteStyle::Always,
            ColorChoice::Never => env_logger::WriteStyle::Never,
        }
    }
}

/// What the command line asks of the logger.
#[derive(Debug, Clone, Default)]
pub struct LoggingConfig {
    /// `env_logger` filter syntax, e.g. `lumen_xaml=debug`.
    pub filter: Option<String>,
    pub verbosity: Verbosity,
    pub color: ColorChoice,
}

/// Install the global logger. Fails if a logger is already installed.
///
/// Records are written as `LEVEL target: message`, with the crate prefix
/// of the target dropped for engine modules.
pub fn init_logging(config: LoggingConfig) -> Result<(), SetLoggerError> {
    let env = std::env::var("RUST_LOG").ok();
    let filter = resolve_filter(config.filter.as_deref(), env.as_deref(), config.verbosity);

    env_logger::Builder::new()
        .parse_filters(&filter)
        .write_style(config.color.into())
        .format(|buf, record| {
            let target = record.target().strip_prefix("lumen_xaml::").unwrap_or(record.target());
            writeln!(buf, "{:<5} {}: {}", record.level(), target, record.args())
        })
        .try_init()?;

    log::debug!("logging with filter '{}'", filter);
    Ok(())
}

//! `lumen-studio`: load a Lumen markup screen, print the object graph it
//! builds and poke at it through path expressions.
//!
//! ```text
//! lumen-studio                                  # bundled player screen
//! lumen-studio screen.xaml -p Title -p "[volume].Value"
//! lumen-studio -s "[volume].Value=75" -p "[readout].Text"
//! lumen-studio -i "[play].PerformClick" -vv --color never
//! ```

mod dump;
mod handlers;
mod logging;
mod model;
mod session;

use std::io;
use std::path::PathBuf;

use anyhow::Context;
use clap::Parser as _;
use log::info;

use crate::logging::{init_logging, ColorChoice, LoggingConfig, Verbosity};
use crate::session::Session;

const PLAYER: &str = include_str!("../ui/player.xaml");

#[derive(Debug, clap::Parser)]
#[command(name = "lumen-studio", version, about = "Inspect the object graph a Lumen markup file builds")]
struct Cli {
    /// Markup file to load; the bundled player screen when omitted.
    file: Option<PathBuf>,

    /// Assign `PATH=VALUE` on the loaded graph (repeatable, applied in order).
    #[arg(short, long = "set", value_name = "PATH=VALUE")]
    set: Vec<String>,

    /// Invoke the parameterless method a path names (repeatable).
    #[arg(short, long = "invoke", value_name = "PATH")]
    invoke: Vec<String>,

    /// Evaluate a path against the root object and print the result (repeatable).
    #[arg(short, long = "path", value_name = "PATH")]
    path: Vec<String>,

    /// Log filter in `env_logger` syntax; overrides `RUST_LOG` and `-v`.
    #[arg(long, value_name = "FILTER")]
    log: Option<String>,

    /// Show parser tracing: once for bindings and names, twice for every element.
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Colored log output.
    #[arg(long, value_enum, default_value_t)]
    color: ColorChoice,

    /// Do not print the object graph.
    #[arg(short, long)]
    quiet: bool,
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_logging(LoggingConfig {
        filter: cli.log.clone(),
        verbosity: Verbosity::from_count(cli.verbose),
        color: cli.color,
    })
    .context("cannot install the logger")?;

    let (source, origin) = match &cli.file {
        Some(path) => {
            let source = std::fs::read_to_string(path).with_context(|| format!("cannot read {}", path.display()))?;
            (source, path.display().to_string())
        }
        None => (PLAYER.to_string(), "bundled player screen".to_string()),
    };

    println!();
    println!("  ╔════════════════════════════════════════╗");
    println!("  ║            LUMEN STUDIO v0.1           ║");
    println!("  ║   markup builder  ·  live bindings     ║");
    println!("  ╚════════════════════════════════════════╝");
    println!();

    info!("loading {}", origin);
    let session = Session::load(&source).with_context(|| format!("cannot load {}", origin))?;
    println!("  loaded {} ({} live binding(s))", origin, session.binding_count());
    println!();

    for assignment in &cli.set {
        session.assign(assignment)?;
        println!("  set    {}", assignment);
    }
    for path in &cli.invoke {
        let result = session.invoke(path)?;
        println!("  call   {} -> {}", path, result);
    }
    if !cli.set.is_empty() || !cli.invoke.is_empty() {
        println!();
    }

    if !cli.quiet {
        dump::write_tree(&mut io::stdout().lock(), session.root())?;
        println!();
    }

    for path in &cli.path {
        match session.evaluate(path) {
            Ok(value) => println!("  {} = {}", path, value),
            Err(e) => println!("  {} : {:#}", path, e),
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::{CommandFactory, Parser};

    #[test]
    fn arguments_are_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn repeatable_options_keep_their_order() {
        let cli = Cli::try_parse_from(["lumen-studio", "screen.xaml", "-p", "Title", "--path", "[a].B", "-s", "X=1"]).unwrap();
        assert_eq!(cli.file, Some(PathBuf::from("screen.xaml")));
        assert_eq!(cli.path, ["Title", "[a].B"]);
        assert_eq!(cli.set, ["X=1"]);
        assert!(cli.log.is_none() && !cli.quiet);
        assert_eq!((cli.verbose, cli.color), (0, ColorChoice::Auto));
    }

    #[test]
    fn logging_flags() {
        let cli = Cli::try_parse_from(["lumen-studio", "-vv", "--color", "never", "--log", "lumen_xaml=trace"]).unwrap();
        assert_eq!(Verbosity::from_count(cli.verbose), Verbosity::Trace);
        assert_eq!(cli.color, ColorChoice::Never);
        assert_eq!(cli.log.as_deref(), Some("lumen_xaml=trace"));
        assert!(Cli::try_parse_from(["lumen-studio", "--color", "sometimes"]).is_err());
    }
}

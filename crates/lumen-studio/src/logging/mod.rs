//! Logger setup for the studio binary.
//!
//! The engine crates only log through the `log` facade. The studio installs
//! an `env_logger` backend whose filter comes from `--log`, `RUST_LOG` or the
//! `-v` count, in that order.

mod filter;
mod init;

pub use filter::{resolve_filter, Verbosity};
pub use init::{init_logging, ColorChoice, LoggingConfig};

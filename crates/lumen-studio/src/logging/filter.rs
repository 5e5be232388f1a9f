/// How much of the engine's own tracing to show when no explicit filter is
/// given.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Verbosity {
    /// Binding failures and other warnings only.
    #[default]
    Quiet,
    /// Namespace imports, name registration and binding activation.
    Debug,
    /// Every element the parser instantiates.
    Trace,
}

impl Verbosity {
    pub fn from_count(count: u8) -> Self {
        match count {
            0 => Verbosity::Quiet,
            1 => Verbosity::Debug,
            _ => Verbosity::Trace,
        }
    }

    fn directives(self) -> &'static str {
        match self {
            Verbosity::Quiet => "warn",
            Verbosity::Debug => "warn,lumen_xaml=debug,lumen_studio=info",
            Verbosity::Trace => "warn,lumen_xaml=trace,lumen_studio=debug",
        }
    }
}

/// The `env_logger` filter to install. A non-blank `explicit` filter wins,
/// then a non-blank `RUST_LOG`, then the directives for `verbosity`.
pub fn resolve_filter(explicit: Option<&str>, env: Option<&str>, verbosity: Verbosity) -> String {
    [explicit, env]
        .into_iter()
        .flatten()
        .map(str::trim)
        .find(|f| !f.is_empty())
        .unwrap_or(verbosity.directives())
        .to_string()
}

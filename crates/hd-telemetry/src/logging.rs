use tracing_subscriber::{fmt, EnvFilter};

/// Output format for diagnostics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    #[default]
    Human,
    Json,
}

/// Resolved logging options (from flags plus `general.*` config).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogOptions {
    pub level: String,
    pub format: LogFormat,
    /// `--debug`: force `debug` regardless of `RUST_LOG`.
    pub debug: bool,
}

impl Default for LogOptions {
    fn default() -> Self {
        Self {
            level: "warn".into(),
            format: LogFormat::Human,
            debug: false,
        }
    }
}

/// The filter directive to use: `--debug` beats `RUST_LOG`, which beats
/// the configured level.
pub fn filter_directive(opts: &LogOptions, rust_log: Option<&str>) -> String {
    if opts.debug {
        return "debug".to_string();
    }
    match rust_log.map(str::trim) {
        Some(env) if !env.is_empty() => env.to_string(),
        _ => opts.level.clone(),
    }
}

/// Initialize logging on stderr; stdout is reserved for command output.
///
/// Safe to call multiple times (e.g. in tests) -- subsequent calls are no-ops.
pub fn init(opts: &LogOptions) {
    let rust_log = std::env::var("RUST_LOG").ok();
    let directive = filter_directive(opts, rust_log.as_deref());
    let filter = EnvFilter::try_new(&directive).unwrap_or_else(|_| EnvFilter::new("warn"));

    match opts.format {
        LogFormat::Human => {
            fmt()
                .with_env_filter(filter)
                .with_writer(std::io::stderr)
                .with_target(opts.debug)
                .with_file(opts.debug)
                .with_line_number(opts.debug)
                .with_level(true)
                .try_init()
                .ok();
        }
        LogFormat::Json => {
            fmt()
                .json()
                .with_env_filter(filter)
                .with_writer(std::io::stderr)
                .with_target(true)
                .with_file(true)
                .with_line_number(true)
                .with_level(true)
                .try_init()
                .ok();
        }
    }

    tracing::debug!(filter = %directive, format = ?opts.format, "logging initialised");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn debug_flag_wins() {
        let opts = LogOptions {
            debug: true,
            ..Default::default()
        };
        assert_eq!(filter_directive(&opts, Some("hd_core=trace")), "debug");
    }

    #[test]
    fn rust_log_beats_config() {
        let opts = LogOptions::default();
        assert_eq!(filter_directive(&opts, Some("hd_agents=info")), "hd_agents=info");
        assert_eq!(filter_directive(&opts, Some("  ")), "warn");
        assert_eq!(filter_directive(&opts, None), "warn");
    }

    #[test]
    fn init_twice_is_harmless() {
        init(&LogOptions::default());
        init(&LogOptions {
            format: LogFormat::Json,
            ..Default::default()
        });
    }
}

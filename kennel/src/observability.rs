use kennel_core::{KennelConfigSnapshot, KennelError, KennelResult};
use tracing_subscriber::EnvFilter;

/// Log line format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

impl LogFormat {
    /// `log.format`: `json` or anything else for the human format.
    pub fn from_config(config: &KennelConfigSnapshot) -> Self {
        match config.get("log.format").map(str::trim) {
            Some(v) if v.eq_ignore_ascii_case("json") => Self::Json,
            _ => Self::Pretty,
        }
    }
}

/// Install the global tracing subscriber.
///
/// The filter comes from `RUST_LOG`, defaulting to `info`. Fails if a global
/// subscriber is already set.
pub fn init_tracing(format: LogFormat) -> KennelResult<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt().with_env_filter(filter);

    let result = match format {
        LogFormat::Pretty => builder.try_init(),
        LogFormat::Json => builder.json().try_init(),
    };
    result.map_err(|e| KennelError::configuration(format!("cannot install tracing subscriber: {}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use kennel_core::KennelConfig;

    #[test]
    fn format_from_config() {
        let mut config = KennelConfig::new();
        assert_eq!(LogFormat::from_config(&config.snapshot()), LogFormat::Pretty);
        config.set("log.format", "JSON");
        assert_eq!(LogFormat::from_config(&config.snapshot()), LogFormat::Json);
    }
}

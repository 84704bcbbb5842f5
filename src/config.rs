use std::path::PathBuf;

pub const ENV_LOG: &str = "FEELEDGERD_LOG";
pub const ENV_LOG_FORMAT: &str = "FEELEDGERD_LOG_FORMAT";
pub const ENV_WORKSPACE: &str = "FEELEDGERD_WORKSPACE";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Text,
    Json,
}

/// Process-level settings. Workspace preferences live in the database.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DaemonConfig {
    pub log_filter: String,
    pub log_format: LogFormat,
    pub workspace: Option<PathBuf>,
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self {
            log_filter: "info".to_string(),
            log_format: LogFormat::Text,
            workspace: None,
        }
    }
}

impl DaemonConfig {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut cfg = Self::default();
        if let Some(filter) = lookup(ENV_LOG).filter(|s| !s.trim().is_empty()) {
            cfg.log_filter = filter.trim().to_string();
        }
        if let Some(format) = lookup(ENV_LOG_FORMAT) {
            cfg.log_format = match format.trim().to_ascii_lowercase().as_str() {
                "json" => LogFormat::Json,
                _ => LogFormat::Text,
            };
        }
        cfg.workspace = lookup(ENV_WORKSPACE)
            .filter(|s| !s.trim().is_empty())
            .map(PathBuf::from);
        cfg
    }
}

/// Installs the global subscriber. Logs go to stderr; stdout carries
/// responses only.
pub fn init_tracing(config: &DaemonConfig) {
    use tracing_subscriber::layer::SubscriberExt;
    use tracing_subscriber::util::SubscriberInitExt;

    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&config.log_filter));

    match config.log_format {
        LogFormat::Json => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(
                    tracing_subscriber::fmt::layer()
                        .json()
                        .with_writer(std::io::stderr),
                )
                .init();
        }
        LogFormat::Text => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(
                    tracing_subscriber::fmt::layer()
                        .with_ansi(false)
                        .with_writer(std::io::stderr),
                )
                .init();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn defaults_when_unset() {
        assert_eq!(DaemonConfig::from_lookup(lookup(&[])), DaemonConfig::default());
    }

    #[test]
    fn reads_overrides() {
        let cfg = DaemonConfig::from_lookup(lookup(&[
            (ENV_LOG, "feeledgerd=debug"),
            (ENV_LOG_FORMAT, "JSON"),
            (ENV_WORKSPACE, "/tmp/ws"),
        ]));
        assert_eq!(cfg.log_filter, "feeledgerd=debug");
        assert_eq!(cfg.log_format, LogFormat::Json);
        assert_eq!(cfg.workspace, Some(PathBuf::from("/tmp/ws")));
    }

    #[test]
    fn unknown_format_and_blank_values_fall_back() {
        let cfg = DaemonConfig::from_lookup(lookup(&[
            (ENV_LOG, "  "),
            (ENV_LOG_FORMAT, "yaml"),
            (ENV_WORKSPACE, ""),
        ]));
        assert_eq!(cfg, DaemonConfig::default());
    }
}

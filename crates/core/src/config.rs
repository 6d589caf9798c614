use serde::Deserialize;

/// Root application configuration. Loaded from environment variables with
/// the prefix `DRIPFLOW__` and optional TOML config files.
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    #[serde(default = "default_node_id")]
    pub node_id: String,
    #[serde(default)]
    pub api: ApiConfig,
    #[serde(default)]
    pub metrics: MetricsConfig,
    #[serde(default)]
    pub engine: EngineConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ApiConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_http_port")]
    pub http_port: u16,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MetricsConfig {
    #[serde(default = "default_metrics_port")]
    pub port: u16,
}

/// Tunables for the campaign runner and trigger dispatcher.
#[derive(Debug, Clone, Deserialize)]
pub struct EngineConfig {
    /// Shared secret required by the periodic trigger endpoint.
    #[serde(default = "default_trigger_secret")]
    pub trigger_secret: String,
    /// Upper bound for one mail dispatch; a timeout counts as a failure.
    #[serde(default = "default_dispatch_timeout_ms")]
    pub dispatch_timeout_ms: u64,
    /// Age after which a `processing` claim is considered abandoned and may
    /// be reclaimed by a later invocation.
    #[serde(default = "default_claim_stale_secs")]
    pub claim_stale_secs: u64,
    /// Overall deadline for a full trigger pass across all campaigns.
    #[serde(default = "default_run_deadline_secs")]
    pub run_deadline_secs: u64,
}

// Default functions
fn default_node_id() -> String {
    "node-01".to_string()
}
fn default_host() -> String {
    "0.0.0.0".to_string()
}
fn default_http_port() -> u16 {
    8080
}
fn default_metrics_port() -> u16 {
    9091
}
fn default_trigger_secret() -> String {
    "change-me".to_string()
}
fn default_dispatch_timeout_ms() -> u64 {
    10_000
}
fn default_claim_stale_secs() -> u64 {
    300
}
fn default_run_deadline_secs() -> u64 {
    60
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            http_port: default_http_port(),
        }
    }
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            port: default_metrics_port(),
        }
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            trigger_secret: default_trigger_secret(),
            dispatch_timeout_ms: default_dispatch_timeout_ms(),
            claim_stale_secs: default_claim_stale_secs(),
            run_deadline_secs: default_run_deadline_secs(),
        }
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            node_id: default_node_id(),
            api: ApiConfig::default(),
            metrics: MetricsConfig::default(),
            engine: EngineConfig::default(),
        }
    }
}

impl AppConfig {
    /// Load configuration from environment variables.
    pub fn load() -> Result<Self, config::ConfigError> {
        let builder = config::Config::builder().add_source(
            config::Environment::with_prefix("DRIPFLOW")
                .separator("__")
                .try_parsing(true),
        );

        let config = builder.build()?;
        config.try_deserialize()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let cfg = AppConfig::default();
        assert_eq!(cfg.api.http_port, 8080);
        assert_eq!(cfg.engine.claim_stale_secs, 300);
        assert_eq!(cfg.engine.dispatch_timeout_ms, 10_000);
    }
}

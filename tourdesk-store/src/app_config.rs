use serde::Deserialize;
use std::env;

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub kafka: KafkaConfig,
    pub auth: AuthConfig,
    pub payments: PaymentsConfig,
    #[serde(default)]
    pub business_rules: BusinessRules,
}

#[derive(Debug, Deserialize, Clone)]
pub struct BusinessRules {
    #[serde(default = "default_tax_rate_bps")]
    pub tax_rate_bps: u32,
    #[serde(default = "default_cancellation_window_hours")]
    pub cancellation_window_hours: i64,
    #[serde(default = "default_reservation_timeout_ms")]
    pub reservation_timeout_ms: u64,
    #[serde(default = "default_currency")]
    pub currency: String,
}

fn default_tax_rate_bps() -> u32 { 1000 }
fn default_cancellation_window_hours() -> i64 { 24 }
fn default_reservation_timeout_ms() -> u64 { 3000 }
fn default_currency() -> String { "USD".to_string() }

impl Default for BusinessRules {
    fn default() -> Self {
        Self {
            tax_rate_bps: default_tax_rate_bps(),
            cancellation_window_hours: default_cancellation_window_hours(),
            reservation_timeout_ms: default_reservation_timeout_ms(),
            currency: default_currency(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct AuthConfig {
    pub jwt_secret: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct PaymentsConfig {
    pub webhook_secret: String,
    #[serde(default = "default_webhook_tolerance")]
    pub webhook_tolerance_seconds: u64,
}

fn default_webhook_tolerance() -> u64 { 300 }

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    pub port: u16,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DatabaseConfig {
    pub url: String,
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
}

fn default_max_connections() -> u32 { 5 }

#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    #[default]
    Postgres,
    Memory,
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct StorageConfig {
    #[serde(default)]
    pub backend: StorageBackend,
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct KafkaConfig {
    pub brokers: Option<String>,
}

impl Config {
    pub fn load() -> Result<Self, config::ConfigError> {
        let run_mode = env::var("RUN_MODE").unwrap_or_else(|_| "development".into());

        let s = config::Config::builder()
            .add_source(config::File::with_name("config/default"))
            // Per-environment overrides, optional
            .add_source(config::File::with_name(&format!("config/{}", run_mode)).required(false))
            // Machine-local overrides, never checked in
            .add_source(config::File::with_name("config/local").required(false))
            // Eg. `TOURDESK_PAYMENTS__WEBHOOK_SECRET=...` sets `payments.webhook_secret`
            .add_source(config::Environment::with_prefix("TOURDESK").separator("__"))
            .build()?;

        s.try_deserialize()
    }
}

impl BusinessRules {
    pub fn cancellation_window(&self) -> chrono::Duration {
        chrono::Duration::hours(self.cancellation_window_hours)
    }

    pub fn reservation_timeout(&self) -> std::time::Duration {
        std::time::Duration::from_millis(self.reservation_timeout_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_fill_missing_business_rules() {
        let source = r#"
            [server]
            port = 8080
            [database]
            url = "postgres://localhost/tourdesk"
            [auth]
            jwt_secret = "secret"
            [payments]
            webhook_secret = "whsec"
        "#;

        let config: Config = config::Config::builder()
            .add_source(config::File::from_str(source, config::FileFormat::Toml))
            .build()
            .unwrap()
            .try_deserialize()
            .unwrap();

        assert_eq!(config.storage.backend, StorageBackend::Postgres);
        assert!(config.kafka.brokers.is_none());
        assert_eq!(config.payments.webhook_tolerance_seconds, 300);
        assert_eq!(config.business_rules.tax_rate_bps, 1000);
        assert_eq!(config.business_rules.cancellation_window(), chrono::Duration::hours(24));
        assert_eq!(config.business_rules.reservation_timeout(), std::time::Duration::from_secs(3));
    }

    #[test]
    fn test_memory_backend_parses() {
        let config: StorageConfig = config::Config::builder()
            .add_source(config::File::from_str("backend = \"memory\"", config::FileFormat::Toml))
            .build()
            .unwrap()
            .try_deserialize()
            .unwrap();
        assert_eq!(config.backend, StorageBackend::Memory);
    }
}

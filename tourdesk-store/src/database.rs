use serde_json::Value;
use sqlx::postgres::PgPoolOptions;
use sqlx::{Pool, Postgres};
use std::time::Duration;
use tracing::{info, warn};

use tourdesk_booking::StoreError;

use crate::app_config::{BusinessRules, DatabaseConfig};

/// query_canceled (statement_timeout) and lock_not_available (lock_timeout).
const DEADLINE_SQLSTATES: [&str; 2] = ["57014", "55P03"];

pub(crate) fn store_error(err: sqlx::Error) -> StoreError {
    let deadline = match &err {
        sqlx::Error::Database(db) => db.code().is_some_and(|c| DEADLINE_SQLSTATES.iter().any(|s| *s == c)),
        sqlx::Error::PoolTimedOut => true,
        _ => false,
    };
    if deadline {
        StoreError::Timeout(err.to_string())
    } else {
        StoreError::Backend(err.to_string())
    }
}

pub(crate) fn is_unique_violation(err: &sqlx::Error, constraint: &str) -> bool {
    match err {
        sqlx::Error::Database(db) => db.is_unique_violation() && db.constraint() == Some(constraint),
        _ => false,
    }
}

#[derive(Clone)]
pub struct DbClient {
    pub pool: Pool<Postgres>,
}

impl DbClient {
    pub async fn new(config: &DatabaseConfig) -> Result<Self, sqlx::Error> {
        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .acquire_timeout(Duration::from_secs(3))
            .connect(&config.url)
            .await?;

        Ok(Self { pool })
    }

    pub async fn migrate(&self) -> Result<(), sqlx::migrate::MigrateError> {
        info!("Running database migrations...");
        sqlx::migrate!("../migrations").run(&self.pool).await?;
        info!("Migrations completed successfully.");
        Ok(())
    }

    /// Overlay rules stored in the `business_rules` table on top of `defaults`.
    pub async fn fetch_business_rules(&self, defaults: BusinessRules) -> Result<BusinessRules, sqlx::Error> {
        let rows: Vec<(String, Value)> = sqlx::query_as("SELECT rule_key, rule_value FROM business_rules")
            .fetch_all(&self.pool)
            .await?;

        Ok(apply_rule_overrides(defaults, rows))
    }
}

fn apply_rule_overrides(defaults: BusinessRules, rows: Vec<(String, Value)>) -> BusinessRules {
    let mut rules = defaults;

    for (key, value) in rows {
        let Some(v) = value.get("value") else {
            warn!("Business rule {} has no value, skipping", key);
            continue;
        };
        match key.as_str() {
            "tax_rate_bps" => {
                if let Some(n) = v.as_u64().and_then(|n| u32::try_from(n).ok()) {
                    rules.tax_rate_bps = n;
                }
            }
            "cancellation_window_hours" => {
                if let Some(n) = v.as_i64().filter(|n| *n >= 0) {
                    rules.cancellation_window_hours = n;
                }
            }
            "reservation_timeout_ms" => {
                if let Some(n) = v.as_u64() {
                    rules.reservation_timeout_ms = n;
                }
            }
            "currency" => {
                if let Some(s) = v.as_str() {
                    rules.currency = s.to_ascii_uppercase();
                }
            }
            _ => {}
        }
    }

    rules
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_rule_overrides() {
        let rows = vec![
            ("tax_rate_bps".to_string(), json!({ "value": 825 })),
            ("cancellation_window_hours".to_string(), json!({ "value": -5 })),
            ("currency".to_string(), json!({ "value": "eur" })),
            ("unknown".to_string(), json!({ "value": 1 })),
            ("reservation_timeout_ms".to_string(), json!(5000)),
        ];

        let rules = apply_rule_overrides(BusinessRules::default(), rows);

        assert_eq!(rules.tax_rate_bps, 825);
        assert_eq!(rules.cancellation_window_hours, 24);
        assert_eq!(rules.currency, "EUR");
        assert_eq!(rules.reservation_timeout_ms, 3000);
    }

    #[test]
    fn test_pool_timeout_is_retryable() {
        assert!(matches!(store_error(sqlx::Error::PoolTimedOut), StoreError::Timeout(_)));
        assert!(matches!(store_error(sqlx::Error::RowNotFound), StoreError::Backend(_)));
    }
}

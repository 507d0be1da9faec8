use serde_json::Value;
use sqlx::postgres::PgPoolOptions;
use sqlx::{Pool, Postgres};
use std::time::Duration;
use tracing::{info, warn};

use crate::app_config::BusinessRules;

#[derive(Clone)]
pub struct DbClient {
    pub pool: Pool<Postgres>,
}

impl DbClient {
    pub async fn new(connection_string: &str, max_connections: u32) -> Result<Self, sqlx::Error> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .acquire_timeout(Duration::from_secs(3))
            .connect(connection_string)
            .await?;

        Ok(Self { pool })
    }

    pub async fn migrate(&self) -> Result<(), sqlx::migrate::MigrateError> {
        info!("Running database migrations...");
        sqlx::migrate!("../migrations")
            .run(&self.pool)
            .await?;
        info!("Migrations completed successfully.");
        Ok(())
    }

    /// Overlay rows of the `business_rules` table on the file configuration.
    pub async fn fetch_business_rules(&self, defaults: BusinessRules) -> Result<BusinessRules, sqlx::Error> {
        let rows: Vec<(String, Value)> = sqlx::query_as("SELECT rule_key, rule_value FROM business_rules")
            .fetch_all(&self.pool)
            .await?;

        let mut rules = defaults;
        for (key, value) in rows {
            apply_rule(&mut rules, &key, &value);
        }

        Ok(rules)
    }
}

/// Rule values are stored as `{"value": <number/string>}`.
fn apply_rule(rules: &mut BusinessRules, key: &str, value: &Value) {
    let Some(v) = value.get("value") else {
        warn!("Business rule {} has no value field, ignoring", key);
        return;
    };

    match key {
        "restock_policy" => match v.as_str().map(str::parse) {
            Some(Ok(policy)) => rules.restock_policy = policy,
            _ => warn!("Business rule restock_policy has unusable value {}", v),
        },
        "max_on_sale_days" => {
            if let Some(days) = v.as_i64() {
                rules.max_on_sale_days = days;
            }
        }
        "default_carrier_code" => {
            if let Some(code) = v.as_str() {
                rules.default_carrier_code = code.to_string();
            }
        }
        _ => {}
    }
}

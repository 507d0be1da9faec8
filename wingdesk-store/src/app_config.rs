use serde::Deserialize;
use std::env;
use wingdesk_core::RestockPolicy;

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub auth: AuthConfig,
    #[serde(default)]
    pub business_rules: BusinessRules,
}

#[derive(Debug, Deserialize, Clone)]
pub struct BusinessRules {
    /// Where cancelled or moved booked tickets return their seat.
    #[serde(default)]
    pub restock_policy: RestockPolicy,
    #[serde(default = "default_max_on_sale_days")]
    pub max_on_sale_days: i64,
    #[serde(default = "default_carrier_code")]
    pub default_carrier_code: String,
}

impl Default for BusinessRules {
    fn default() -> Self {
        Self {
            restock_policy: RestockPolicy::default(),
            max_on_sale_days: default_max_on_sale_days(),
            default_carrier_code: default_carrier_code(),
        }
    }
}

fn default_max_on_sale_days() -> i64 { 365 }

fn default_carrier_code() -> String { "WZ".to_string() }

#[derive(Debug, Deserialize, Clone)]
pub struct AuthConfig {
    pub jwt_secret: String,
    pub jwt_expiration_seconds: u64,
}

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

impl Config {
    pub fn load() -> Result<Self, config::ConfigError> {
        let run_mode = env::var("RUN_MODE").unwrap_or_else(|_| "development".into());

        let s = config::Config::builder()
            .add_source(config::File::with_name("config/default"))
            // Optional per-environment overrides
            .add_source(config::File::with_name(&format!("config/{}", run_mode)).required(false))
            // Developer overrides, not checked in
            .add_source(config::File::with_name("config/local").required(false))
            // e.g. `WINGDESK_DATABASE__URL=postgres://...`
            .add_source(config::Environment::with_prefix("WINGDESK").separator("__"))
            .build()?;

        s.try_deserialize()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(toml: &str) -> Result<Config, config::ConfigError> {
        config::Config::builder()
            .add_source(config::File::from_str(toml, config::FileFormat::Toml))
            .build()?
            .try_deserialize()
    }

    #[test]
    fn test_business_rules_fall_back_to_defaults() {
        let config = parse(
            r#"
            [server]
            port = 8080
            [database]
            url = "postgres://localhost/wingdesk"
            [auth]
            jwt_secret = "secret"
            jwt_expiration_seconds = 3600
            "#,
        )
        .unwrap();

        assert_eq!(config.database.max_connections, 5);
        assert_eq!(config.business_rules.restock_policy, RestockPolicy::Legacy);
        assert_eq!(config.business_rules.max_on_sale_days, 365);
        assert_eq!(config.business_rules.default_carrier_code, "WZ");
    }

    #[test]
    fn test_restock_policy_from_file() {
        let config = parse(
            r#"
            [server]
            port = 8080
            [database]
            url = "postgres://localhost/wingdesk"
            max_connections = 20
            [auth]
            jwt_secret = "secret"
            jwt_expiration_seconds = 3600
            [business_rules]
            restock_policy = "debited_pool"
            "#,
        )
        .unwrap();

        assert_eq!(config.database.max_connections, 20);
        assert_eq!(config.business_rules.restock_policy, RestockPolicy::DebitedPool);
    }
}

//! Environment-driven configuration.

use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid value for {var}: `{value}`")]
    Invalid { var: &'static str, value: String },
    #[error("{0} and {1} must be set together")]
    Incomplete(&'static str, &'static str),
}

/// Staff account created at startup when missing.
#[derive(Clone, Debug)]
pub struct StaffAccount {
    pub email: String,
    pub password: String,
}

#[derive(Clone, Debug)]
pub struct Config {
    pub port: u16,
    pub database_url: Option<String>,
    pub database_max_connections: u32,
    pub nats_url: Option<String>,
    pub encryption_key: Option<String>,
    pub session_ttl: Duration,
    pub auth_rate_limit_attempts: u32,
    pub auth_rate_limit_window: Duration,
    pub refund_window_days: i64,
    pub mail_from: String,
    pub seed_demo_data: bool,
    pub product_manager: Option<StaffAccount>,
    pub sales_manager: Option<StaffAccount>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            port: 8083,
            database_url: None,
            database_max_connections: 10,
            nats_url: None,
            encryption_key: None,
            session_ttl: Duration::from_secs(24 * 3600),
            auth_rate_limit_attempts: 5,
            auth_rate_limit_window: Duration::from_secs(60),
            refund_window_days: 30,
            mail_from: "orders@storefront.local".to_string(),
            seed_demo_data: false,
            product_manager: None,
            sales_manager: None,
        }
    }
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|var| std::env::var(var).ok())
    }

    /// Builds a config from any variable source; `from_env` passes the process environment.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let d = Self::default();
        let get = |var: &str| lookup(var).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());
        Ok(Self {
            port: parse(&get, "PORT")?.unwrap_or(d.port),
            database_url: get("DATABASE_URL"),
            database_max_connections: parse(&get, "DATABASE_MAX_CONNECTIONS")?.unwrap_or(d.database_max_connections),
            nats_url: get("NATS_URL"),
            encryption_key: get("ENCRYPTION_KEY"),
            session_ttl: parse::<u64>(&get, "SESSION_TTL_HOURS")?.map(|h| Duration::from_secs(h * 3600)).unwrap_or(d.session_ttl),
            auth_rate_limit_attempts: parse(&get, "AUTH_RATE_LIMIT_ATTEMPTS")?.unwrap_or(d.auth_rate_limit_attempts),
            auth_rate_limit_window: parse::<u64>(&get, "AUTH_RATE_LIMIT_WINDOW_SECS")?.map(Duration::from_secs).unwrap_or(d.auth_rate_limit_window),
            refund_window_days: parse(&get, "REFUND_WINDOW_DAYS")?.unwrap_or(d.refund_window_days),
            mail_from: get("MAIL_FROM").unwrap_or(d.mail_from),
            seed_demo_data: parse(&get, "SEED_DEMO_DATA")?.unwrap_or(d.seed_demo_data),
            product_manager: staff(&get, "PRODUCT_MANAGER_EMAIL", "PRODUCT_MANAGER_PASSWORD")?,
            sales_manager: staff(&get, "SALES_MANAGER_EMAIL", "SALES_MANAGER_PASSWORD")?,
        })
    }
}

fn parse<T: FromStr>(get: &impl Fn(&str) -> Option<String>, var: &'static str) -> Result<Option<T>, ConfigError> {
    get(var).map(|value| value.parse::<T>().map_err(|_| ConfigError::Invalid { var, value })).transpose()
}

fn staff(get: &impl Fn(&str) -> Option<String>, email: &'static str, password: &'static str) -> Result<Option<StaffAccount>, ConfigError> {
    match (get(email), get(password)) {
        (Some(email), Some(password)) => Ok(Some(StaffAccount { email, password })),
        (None, None) => Ok(None),
        _ => Err(ConfigError::Incomplete(email, password)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config(vars: &[(&str, &str)]) -> Result<Config, ConfigError> {
        let map: HashMap<String, String> = vars.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
        Config::from_lookup(|k| map.get(k).cloned())
    }

    #[test]
    fn test_defaults() {
        let c = config(&[]).unwrap();
        assert_eq!(c.port, 8083);
        assert!(c.database_url.is_none());
        assert_eq!(c.refund_window_days, 30);
        assert_eq!(c.auth_rate_limit_attempts, 5);
    }

    #[test]
    fn test_overrides_and_errors() {
        let c = config(&[("PORT", "9000"), ("SESSION_TTL_HOURS", "2"), ("SEED_DEMO_DATA", "true")]).unwrap();
        assert_eq!(c.port, 9000);
        assert_eq!(c.session_ttl, Duration::from_secs(7200));
        assert!(c.seed_demo_data);
        assert!(matches!(config(&[("PORT", "eighty")]), Err(ConfigError::Invalid { var: "PORT", .. })));
        assert!(matches!(config(&[("SALES_MANAGER_EMAIL", "s@x.io")]), Err(ConfigError::Incomplete(..))));
    }
}

use std::env;

use anyhow::Context;

use crate::scheduling::reporting::FeeModel;

#[derive(Clone, Debug)]
pub struct Config {
    pub database_url: String,
    pub bind_addr: String,
    pub session_ttl_hours: i64,
    pub notification_retention_days: i64,
    pub default_fee: FeeModel,
}

fn env_i64(key: &str, default: i64) -> i64 {
    env::var(key)
        .ok()
        .and_then(|s| s.parse::<i64>().ok())
        .unwrap_or(default)
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        let database_url = env::var("DATABASE_URL").context("DATABASE_URL must be set")?;
        let bind_addr = env::var("BIND_ADDR").unwrap_or_else(|_| "127.0.0.1:8080".to_string());
        let session_ttl_hours = env_i64("SESSION_TTL_HOURS", 24);
        let notification_retention_days = env_i64("NOTIFICATION_RETENTION_DAYS", 30).max(1);

        // Billing fee used when a request does not name one.
        let fee_type = env::var("DEFAULT_FEE_TYPE").unwrap_or_else(|_| "percentage".to_string());
        let default_fee = FeeModel::from_parts(&fee_type, env_i64("DEFAULT_FEE_VALUE", 3000))
            .map_err(|e| anyhow::anyhow!("invalid default fee: {e}"))?;

        Ok(Self {
            database_url,
            bind_addr,
            session_ttl_hours,
            notification_retention_days,
            default_fee,
        })
    }
}

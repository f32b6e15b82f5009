use std::env;
use std::time::Duration;

pub const TABLE_PREFIX_VAR: &str = "DOCUMENT_TABLE_PREFIX";
pub const POLL_INTERVAL_VAR: &str = "SUBSCRIPTION_POLL_MS";

const DEFAULT_POLL_INTERVAL_MS: u64 = 1000;

#[derive(Debug)]
pub enum ConfigError {
    InvalidValue { variable: String, value: String },
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::InvalidValue { variable, value } => {
                write!(f, "Invalid value for {}: {}", variable, value)
            }
        }
    }
}

impl std::error::Error for ConfigError {}

/// Settings for the DynamoDB-backed document store. Only deployables read
/// these from the environment; the game core never does.
#[derive(Debug, Clone, PartialEq)]
pub struct StoreConfig {
    /// Prepended to a collection name to form its table name.
    pub table_prefix: String,
    pub poll_interval: Duration,
}

impl Default for StoreConfig {
    fn default() -> Self {
        StoreConfig {
            table_prefix: String::new(),
            poll_interval: Duration::from_millis(DEFAULT_POLL_INTERVAL_MS),
        }
    }
}

impl StoreConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| env::var(name).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let table_prefix = lookup(TABLE_PREFIX_VAR).unwrap_or_default();
        let poll_interval = match lookup(POLL_INTERVAL_VAR) {
            Some(raw) => {
                let millis: u64 = raw.trim().parse().map_err(|_| ConfigError::InvalidValue {
                    variable: POLL_INTERVAL_VAR.to_string(),
                    value: raw.clone(),
                })?;
                if millis == 0 {
                    return Err(ConfigError::InvalidValue {
                        variable: POLL_INTERVAL_VAR.to_string(),
                        value: raw,
                    });
                }
                Duration::from_millis(millis)
            }
            None => Duration::from_millis(DEFAULT_POLL_INTERVAL_MS),
        };

        Ok(StoreConfig {
            table_prefix,
            poll_interval,
        })
    }

    pub fn table_name(&self, collection: &str) -> String {
        format!("{}{}", self.table_prefix, collection)
    }
}

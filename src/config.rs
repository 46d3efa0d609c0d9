use std::path::PathBuf;

use crate::models::Period;

pub const DEFAULT_LEDGER_DB_RELATIVE_PATH: &str = "data/tarot-ledger.db";
pub const DEFAULT_LOG_FILTER: &str = "tarot_ledger_lib=info,tarot_ledger_adapter=info";

const ENV_DB_PATH: &str = "TAROT_LEDGER_DB";
const ENV_DEFAULT_PERIOD: &str = "TAROT_LEDGER_PERIOD";
const ENV_LOG_FILTER: &str = "TAROT_LEDGER_LOG";

#[derive(Debug, Clone, PartialEq)]
pub struct LedgerConfig {
    pub db_path: PathBuf,
    pub default_period: Period,
    pub log_filter: String,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            db_path: PathBuf::from(DEFAULT_LEDGER_DB_RELATIVE_PATH),
            default_period: Period::default(),
            log_filter: DEFAULT_LOG_FILTER.to_string(),
        }
    }
}

impl LedgerConfig {
    pub fn from_env() -> Result<Self, String> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Blank values fall back to the defaults; malformed ones are errors.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, String> {
        let read = |key: &str| {
            lookup(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };
        let mut config = Self::default();
        if let Some(path) = read(ENV_DB_PATH) {
            config.db_path = PathBuf::from(path);
        }
        if let Some(period) = read(ENV_DEFAULT_PERIOD) {
            config.default_period =
                Period::parse(&period).map_err(|e| format!("{ENV_DEFAULT_PERIOD}: {e}"))?;
        }
        if let Some(filter) = read(ENV_LOG_FILTER) {
            config.log_filter = filter;
        }
        Ok(config)
    }
}

// ⚙️ Ledger configuration
// Format constants shared by the validator, the normalizer and the stores.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Environment variable overriding the database path
pub const DB_PATH_ENV: &str = "RFID_LEDGER_DB";

/// Human-readable form of the scan date pattern (used in error messages)
pub const DATE_PATTERN_DISPLAY: &str = "yyyy-MM-dd HH:mm:ss";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LedgerConfig {
    /// chrono format for scan dates (`yyyy-MM-dd HH:mm:ss`)
    pub date_format: String,

    /// Number of digits after the `EPC` prefix
    pub epc_digits: usize,

    /// Minimum number of digits after the `TAG` prefix
    pub tag_min_digits: usize,

    /// Maximum number of digits after the `TAG` prefix
    pub tag_max_digits: usize,

    /// Exact length of a product reference code
    pub ref_code_digits: usize,

    /// Two-character separator replacing spaces in stored site/location names
    pub name_separator: String,

    /// SQLite database file
    pub database_path: PathBuf,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        LedgerConfig {
            date_format: "%Y-%m-%d %H:%M:%S".to_string(),
            epc_digits: 3,
            tag_min_digits: 1,
            tag_max_digits: 10,
            ref_code_digits: 5,
            name_separator: "..".to_string(),
            database_path: PathBuf::from("rfid_ledger.db"),
        }
    }
}

impl LedgerConfig {
    /// Load config from an optional JSON file, then apply env overrides.
    /// Missing keys fall back to defaults.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(path) => {
                let raw = std::fs::read_to_string(path)
                    .with_context(|| format!("Failed to read config file {}", path.display()))?;
                serde_json::from_str::<LedgerConfig>(&raw)
                    .with_context(|| format!("Failed to parse config file {}", path.display()))?
            }
            None => LedgerConfig::default(),
        };

        if let Ok(db_path) = std::env::var(DB_PATH_ENV) {
            if !db_path.trim().is_empty() {
                config.database_path = PathBuf::from(db_path);
            }
        }

        Ok(config)
    }
}

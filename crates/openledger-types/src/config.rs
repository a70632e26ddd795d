//! Configuration for an OpenLedger engine instance.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::{Address, LedgerError, Result, constants};

/// Engine-wide configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Authority allowed to mint and to register asset kinds.
    pub admin: Address,
    /// The engine's own account holding disbursed, unclaimed value.
    #[serde(default = "default_custody")]
    pub custody: Address,
    /// Maximum (id, value) pairs in a single batch transfer.
    #[serde(default = "default_max_batch_size")]
    pub max_batch_size: usize,
}

fn default_custody() -> Address {
    Address::derive(constants::CUSTODY_LABEL)
}

fn default_max_batch_size() -> usize {
    constants::DEFAULT_MAX_BATCH_SIZE
}

impl EngineConfig {
    /// Config with defaults for everything but the admin.
    #[must_use]
    pub fn with_admin(admin: Address) -> Self {
        Self {
            admin,
            custody: default_custody(),
            max_batch_size: default_max_batch_size(),
        }
    }

    /// Parse and validate a JSON config.
    ///
    /// # Errors
    /// Returns [`LedgerError::Configuration`] on malformed JSON or invalid values.
    pub fn from_json(json: &str) -> Result<Self> {
        let cfg: Self = serde_json::from_str(json)
            .map_err(|e| LedgerError::Configuration(format!("invalid engine config: {e}")))?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Read, parse and validate a JSON config file.
    ///
    /// # Errors
    /// Returns [`LedgerError::Io`] if the file can't be read, otherwise as
    /// [`EngineConfig::from_json`].
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let raw = std::fs::read_to_string(path)?;
        Self::from_json(&raw)
    }

    /// # Errors
    /// Returns [`LedgerError::Configuration`] describing the first problem found.
    pub fn validate(&self) -> Result<()> {
        if self.admin.is_zero() {
            return Err(LedgerError::Configuration("admin must not be zero".into()));
        }
        if self.custody.is_zero() {
            return Err(LedgerError::Configuration("custody must not be zero".into()));
        }
        if self.admin == self.custody {
            return Err(LedgerError::Configuration(
                "admin and custody must differ".into(),
            ));
        }
        if self.max_batch_size == 0 {
            return Err(LedgerError::Configuration(
                "max_batch_size must be > 0".into(),
            ));
        }
        Ok(())
    }
}

//! Reader configuration
//!
//! Reader builders accept a [`ReaderConfig`], which can be written by hand or
//! loaded from YAML:
//!
//! ```rust
//! use daqflow::{ReadTimeoutType, ReaderConfig};
//!
//! let config = ReaderConfig::from_yaml("timeout_type: Any\nblock_size: 256\noverlap: 50\n").unwrap();
//! assert_eq!(config.timeout_type, ReadTimeoutType::Any);
//! assert_eq!(config.block_size, Some(256));
//! ```

use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::reader::{ReadMode, ReadTimeoutType};
use crate::{DaqError, Result};

/// Settings shared by every reader kind.
///
/// Sizes only apply to the reader kinds that use them; the reader builders'
/// explicit arguments take precedence.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ReaderConfig {
    pub timeout_type: ReadTimeoutType,
    pub read_mode: ReadMode,
    /// Samples per block for block readers
    pub block_size: Option<usize>,
    /// Block overlap in percent, `0..100`
    pub overlap: u32,
    /// Retained samples for tail readers
    pub history_size: Option<usize>,
}

impl ReaderConfig {
    /// Parse a configuration document.
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let cleaned = strip_control_characters(yaml);
        let config = if cleaned.trim().is_empty() {
            Self::default()
        } else {
            serde_yaml_ng::from_str(&cleaned)?
        };
        config.validate()?;
        Ok(config)
    }

    /// Read and parse a configuration file.
    pub fn from_yaml_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let yaml = std::fs::read_to_string(path).map_err(|e| DaqError::Parse {
            context: format!("reader configuration '{}'", path.display()),
            details: e.to_string(),
        })?;
        Self::from_yaml(&yaml)
    }

    pub fn to_yaml(&self) -> Result<String> {
        Ok(serde_yaml_ng::to_string(self)?)
    }

    pub fn validate(&self) -> Result<()> {
        if self.overlap >= 100 {
            return Err(DaqError::configuration(format!(
                "overlap must be below 100 percent, got {}",
                self.overlap
            )));
        }
        if self.block_size == Some(0) {
            return Err(DaqError::configuration("block size must be at least 1"));
        }
        if self.history_size == Some(0) {
            return Err(DaqError::configuration("history size must be at least 1"));
        }
        Ok(())
    }
}

/// Remove control characters other than tab, newline and carriage return.
fn strip_control_characters(yaml: &str) -> String {
    yaml.chars().filter(|ch| !ch.is_control() || matches!(ch, '\n' | '\r' | '\t')).collect()
}

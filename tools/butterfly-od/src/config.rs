//! TOML configuration for compaction and loading
//!
//! ```toml
//! [filter]
//! unit = "minutes"
//! sentinel = -1.0
//!
//! [compact]
//! block_rows = 65536
//! zstd_level = 3
//!
//! [load]
//! batch_size = 65536
//! timeout_secs = 120
//! ```
//!
//! Every key is optional; missing ones take their defaults.

use butterfly_common::{Error, Result};
use serde::Deserialize;
use std::path::Path;

use crate::compact::CompactConfig;
use crate::filter::FilterConfig;
use crate::od_index::LoadConfig;

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct OdConfig {
    pub filter: FilterConfig,
    pub compact: CompactConfig,
    pub load: LoadConfig,
}

impl OdConfig {
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let text = std::fs::read_to_string(path.as_ref())?;
        Self::from_toml(&text)
            .map_err(|e| Error::invalid(format!("{}: {e}", path.as_ref().display())))
    }

    pub fn from_toml(text: &str) -> Result<Self> {
        let config: OdConfig =
            toml::from_str(text).map_err(|e| Error::invalid(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.compact.block_rows == 0 {
            return Err(Error::invalid("compact.block_rows must be at least 1"));
        }
        if self.load.batch_size == 0 {
            return Err(Error::invalid("load.batch_size must be at least 1"));
        }
        if !(1..=22).contains(&self.compact.zstd_level) {
            return Err(Error::invalid(format!(
                "compact.zstd_level {} is outside 1..=22",
                self.compact.zstd_level
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::formats::od_container::TimeUnit;

    #[test]
    fn test_empty_config_is_default() {
        assert_eq!(OdConfig::from_toml("").unwrap(), OdConfig::default());
    }

    #[test]
    fn test_partial_config() {
        let config = OdConfig::from_toml(
            "[filter]\nunit = \"minutes\"\nsentinel = -1.0\n\n[load]\nbatch_size = 10\n",
        )
        .unwrap();
        assert_eq!(config.filter.unit, TimeUnit::Minutes);
        assert_eq!(config.filter.sentinel, Some(-1.0));
        assert_eq!(config.load.batch_size, 10);
        assert_eq!(config.compact, CompactConfig::default());
    }

    #[test]
    fn test_invalid_values_rejected() {
        assert!(OdConfig::from_toml("[compact]\nblock_rows = 0\n").is_err());
        assert!(OdConfig::from_toml("[load]\nbatch_size = 0\n").is_err());
        assert!(OdConfig::from_toml("[filter]\nunit = \"hours\"\n").is_err());
        assert!(OdConfig::from_toml("[storage]\npath = \"x\"\n").is_err());
    }
}

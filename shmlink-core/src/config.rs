// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Ankit Kumar Pandey

//! Segment configuration.
//!
//! Built from the environment toggle and, optionally, a YAML file.
//! Invalid fields are rejected with a HardValidationError.

use std::path::Path;

use serde::Deserialize;

use crate::error::{HardValidationError, ShmlinkError, ShmlinkResult};
use crate::types::BackendFlavor;

/// Environment toggle selecting the memory-mapped backend flavor.
pub const FLAVOR_ENV: &str = "SHMLINK_SHAREDMEMORY_POSIX";

/// Owner read/write.
const OWNER_RW: u32 = 0o600;

fn default_lock_pages() -> bool {
    true
}

fn default_mode() -> u32 {
    OWNER_RW
}

/// Raw segment section as parsed from YAML (before validation).
#[derive(Debug, Deserialize)]
struct RawSegmentConfig {
    #[serde(default)]
    flavor: BackendFlavor,
    #[serde(default = "default_lock_pages")]
    lock_pages: bool,
    #[serde(default = "default_mode")]
    mode: u32,
}

impl Default for RawSegmentConfig {
    fn default() -> Self {
        Self {
            flavor: BackendFlavor::default(),
            lock_pages: default_lock_pages(),
            mode: default_mode(),
        }
    }
}

/// Raw root configuration file.
#[derive(Debug, Default, Deserialize)]
struct RawConfig {
    #[serde(default)]
    segment: RawSegmentConfig,
}

/// Validated settings applied when opening a segment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SegmentConfig {
    /// Diagnostic label of the memory-mapped backend.
    pub flavor: BackendFlavor,
    /// Pin mapped pages into physical memory after mapping.
    pub lock_pages: bool,
    /// Permission bits for a newly created shared memory object.
    pub mode: u32,
}

impl Default for SegmentConfig {
    fn default() -> Self {
        Self {
            flavor: BackendFlavor::default(),
            lock_pages: default_lock_pages(),
            mode: default_mode(),
        }
    }
}

impl SegmentConfig {
    /// Defaults with the flavor taken from [`FLAVOR_ENV`].
    pub fn from_env() -> Self {
        let mut config = Self::default();
        if let Some(flavor) = flavor_from_env() {
            config.flavor = flavor;
        }
        config
    }

    /// Check the fields a caller may have set by hand.
    ///
    /// `mode` must stay within the permission bits and grant the owner read
    /// and write, or attachers could not open what the creator made.
    pub fn validate(&self) -> Result<(), HardValidationError> {
        if self.mode > 0o777 {
            return Err(HardValidationError::InvalidFieldValue {
                field: "mode",
                value: format!("{:#o}", self.mode),
                reason: "Only permission bits (0o777) are allowed".to_string(),
            });
        }

        if self.mode & OWNER_RW != OWNER_RW {
            return Err(HardValidationError::InvalidFieldValue {
                field: "mode",
                value: format!("{:#o}", self.mode),
                reason: "Owner must be able to read and write the segment".to_string(),
            });
        }

        Ok(())
    }

    /// Flavor selected by a toggle value: `1...` means POSIX, anything else SysV.
    pub fn flavor_for(value: Option<&str>) -> BackendFlavor {
        match value {
            Some(v) if v.starts_with('1') => BackendFlavor::Posix,
            _ => BackendFlavor::SysV,
        }
    }
}

fn flavor_from_env() -> Option<BackendFlavor> {
    std::env::var(FLAVOR_ENV)
        .ok()
        .map(|v| SegmentConfig::flavor_for(Some(&v)))
}

/// Configuration loader with strict validation.
pub struct ConfigLoader;

impl ConfigLoader {
    /// Load and validate configuration from a YAML file.
    ///
    /// The environment toggle, when set, overrides the file's flavor.
    pub fn load_file(path: impl AsRef<Path>) -> ShmlinkResult<SegmentConfig> {
        let path = path.as_ref();

        if !path.exists() {
            return Err(ShmlinkError::ConfigNotFound {
                path: path.to_path_buf(),
            });
        }

        let content = std::fs::read_to_string(path).map_err(|e| ShmlinkError::Io {
            context: "reading config file",
            source: e,
        })?;

        let mut config = Self::load_string(&content)?;
        if let Some(flavor) = flavor_from_env() {
            config.flavor = flavor;
        }
        Ok(config)
    }

    /// Load and validate configuration from a YAML string.
    pub fn load_string(content: &str) -> ShmlinkResult<SegmentConfig> {
        // An empty document means "all defaults".
        let raw: RawConfig = if content.trim().is_empty() {
            RawConfig::default()
        } else {
            serde_yaml::from_str(content).map_err(|e| ShmlinkError::ConfigParse {
                message: format!("YAML parse error: {}", e),
            })?
        };

        Self::validate(raw.segment)
    }

    fn validate(raw: RawSegmentConfig) -> ShmlinkResult<SegmentConfig> {
        let config = SegmentConfig {
            flavor: raw.flavor,
            lock_pages: raw.lock_pages,
            mode: raw.mode,
        };
        config.validate()?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_config() {
        let config = ConfigLoader::load_string(
            r#"
segment:
  flavor: posix
  lock_pages: false
  mode: 0o660
"#,
        )
        .unwrap();

        assert_eq!(config.flavor, BackendFlavor::Posix);
        assert!(!config.lock_pages);
        assert_eq!(config.mode, 0o660);
    }

    #[test]
    fn test_defaults_for_missing_fields() {
        let config = ConfigLoader::load_string("segment: {}\n").unwrap();
        assert_eq!(config, SegmentConfig::default());

        let config = ConfigLoader::load_string("").unwrap();
        assert_eq!(config, SegmentConfig::default());
    }

    #[test]
    fn test_mode_without_owner_rw() {
        let result = ConfigLoader::load_string("segment:\n  mode: 0o400\n");
        assert!(matches!(
            result,
            Err(ShmlinkError::HardValidation(
                HardValidationError::InvalidFieldValue { field: "mode", .. }
            ))
        ));
    }

    #[test]
    fn test_mode_out_of_range() {
        let result = ConfigLoader::load_string("segment:\n  mode: 4095\n");
        assert!(result.is_err());
    }

    #[test]
    fn test_unknown_flavor() {
        let result = ConfigLoader::load_string("segment:\n  flavor: mqueue\n");
        assert!(matches!(result, Err(ShmlinkError::ConfigParse { .. })));
    }

    #[test]
    fn test_flavor_toggle_values() {
        assert_eq!(SegmentConfig::flavor_for(None), BackendFlavor::SysV);
        assert_eq!(SegmentConfig::flavor_for(Some("1")), BackendFlavor::Posix);
        assert_eq!(SegmentConfig::flavor_for(Some("10")), BackendFlavor::Posix);
        assert_eq!(SegmentConfig::flavor_for(Some("0")), BackendFlavor::SysV);
        assert_eq!(SegmentConfig::flavor_for(Some("")), BackendFlavor::SysV);
        assert_eq!(SegmentConfig::flavor_for(Some("yes")), BackendFlavor::SysV);
    }

    #[test]
    fn test_load_file() {
        use std::io::Write;

        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "segment:\n  lock_pages: false\n  mode: 0o640").unwrap();

        let config = ConfigLoader::load_file(file.path()).unwrap();
        assert!(!config.lock_pages);
        assert_eq!(config.mode, 0o640);
    }

    #[test]
    fn test_hand_built_config_validation() {
        assert!(SegmentConfig::default().validate().is_ok());

        let config = SegmentConfig {
            mode: 0o400,
            ..SegmentConfig::default()
        };
        assert!(matches!(
            config.validate(),
            Err(HardValidationError::InvalidFieldValue { field: "mode", .. })
        ));
    }

    #[test]
    fn test_missing_file() {
        let result = ConfigLoader::load_file("/nonexistent/shmlink.yaml");
        assert!(matches!(result, Err(ShmlinkError::ConfigNotFound { .. })));
    }
}

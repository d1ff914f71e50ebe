//! Driver configuration, stored as TOML.
//!
//! Every field has a default, so a partial file (or none at all) is valid.
//!
//! ```toml
//! max_sessions = 4
//! overflow = "drop_newest"
//! read_mode = { blocking = { timeout_ms = 20 } }
//!
//! [[keymap]]
//! trigger = { button = "a" }
//! key = "enter"
//!
//! [[extra_controllers]]
//! vendor_id = 0x1234
//! product_id = 0x5678
//! name = "Homebrew pad"
//! ```

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::controller::compat::CompatEntry;
use crate::mapping::{KeyMap, MappingError};
use crate::session::device_session::{ReadMode, SessionSettings};
use crate::session::event_queue::{OverflowPolicy, DEFAULT_QUEUE_CAPACITY};
use crate::session::registry::DEFAULT_MAX_SESSIONS;

const CONFIG_DIR: &str = "snespad";
const CONFIG_FILE: &str = "snespad.toml";

/// Upper bound for a blocking read so a key query never stalls the caller.
pub const MAX_BLOCKING_TIMEOUT_MS: u64 = 100;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to access {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Failed to serialize config: {0}")]
    Serialize(#[from] toml::ser::Error),

    #[error("Invalid config: {0}")]
    Invalid(String),

    #[error("Invalid key map: {0}")]
    Mapping(#[from] MappingError),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DriverConfig {
    /// Number of registry slots
    pub max_sessions: usize,
    /// Pending keys kept per session
    pub queue_capacity: usize,
    pub overflow: OverflowPolicy,
    pub read_mode: ReadMode,
    pub keymap: KeyMap,
    /// Controllers accepted in addition to the built-in table
    pub extra_controllers: Vec<CompatEntry>,
}

impl Default for DriverConfig {
    fn default() -> Self {
        Self {
            max_sessions: DEFAULT_MAX_SESSIONS,
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
            overflow: OverflowPolicy::default(),
            read_mode: ReadMode::default(),
            keymap: KeyMap::default_config(),
            extra_controllers: Vec::new(),
        }
    }
}

impl DriverConfig {
    /// `<config dir>/snespad/snespad.toml`, falling back to the working
    /// directory when the platform has no config dir.
    pub fn default_path() -> PathBuf {
        let mut path = dirs::config_dir().unwrap_or_else(|| {
            warn!("Could not determine config directory, using current directory");
            PathBuf::from(".")
        });
        path.push(CONFIG_DIR);
        path.push(CONFIG_FILE);
        path
    }

    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let config = Self::from_toml(&content)?;
        info!("Loaded config from {}", path.display());
        Ok(config)
    }

    /// Like [`load`](Self::load), but a missing file yields the defaults.
    pub fn load_or_default(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            warn!(
                "Config file {} does not exist, using default",
                path.display()
            );
            return Ok(Self::default());
        }
        Self::load(path)
    }

    pub fn save(&self, path: &Path) -> Result<(), ConfigError> {
        self.validate()?;
        let content = toml::to_string_pretty(self)?;

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|source| ConfigError::Io {
                path: parent.to_path_buf(),
                source,
            })?;
        }
        fs::write(path, content).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        debug!("Config written to {}", path.display());
        Ok(())
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_sessions == 0 {
            return Err(ConfigError::Invalid(
                "max_sessions must be at least 1".to_string(),
            ));
        }
        if self.queue_capacity == 0 {
            return Err(ConfigError::Invalid(
                "queue_capacity must be at least 1".to_string(),
            ));
        }
        if let ReadMode::Blocking { timeout_ms } = self.read_mode {
            if timeout_ms == 0 || timeout_ms > MAX_BLOCKING_TIMEOUT_MS {
                return Err(ConfigError::Invalid(format!(
                    "blocking timeout must be within 1..={} ms, got {}",
                    MAX_BLOCKING_TIMEOUT_MS, timeout_ms
                )));
            }
        }
        self.keymap.validate()?;
        Ok(())
    }

    pub fn session_settings(&self) -> SessionSettings {
        SessionSettings {
            queue_capacity: self.queue_capacity,
            overflow: self.overflow,
            read_mode: self.read_mode,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::controller::report::{Button, Direction};
    use crate::mapping::{KeyId, Trigger};
    use crate::usb::DeviceIds;

    #[test]
    fn empty_file_gives_defaults() {
        let config = DriverConfig::from_toml("").unwrap();
        assert_eq!(config, DriverConfig::default());
        assert_eq!(config.session_settings(), SessionSettings::default());
    }

    #[test]
    fn partial_file_overrides_only_named_fields() {
        let config = DriverConfig::from_toml(
            r#"
            max_sessions = 2
            overflow = "drop_newest"
            read_mode = { blocking = { timeout_ms = 20 } }

            [[keymap]]
            trigger = { button = "a" }
            key = "page_down"

            [[keymap]]
            trigger = { dpad = "up" }
            key = { char = "k" }

            [[extra_controllers]]
            vendor_id = 0x1234
            product_id = 0x5678
            name = "Homebrew pad"
            "#,
        )
        .unwrap();

        assert_eq!(config.max_sessions, 2);
        assert_eq!(config.queue_capacity, DEFAULT_QUEUE_CAPACITY);
        assert_eq!(config.overflow, OverflowPolicy::DropNewest);
        assert_eq!(config.read_mode, ReadMode::Blocking { timeout_ms: 20 });
        assert_eq!(
            config.keymap.lookup(Trigger::Button(Button::A)),
            Some(KeyId::PageDown)
        );
        assert_eq!(
            config.keymap.lookup(Trigger::Dpad(Direction::Up)),
            Some(KeyId::Char('k'))
        );
        assert_eq!(config.keymap.lookup(Trigger::Button(Button::B)), None);
        assert!(config.extra_controllers[0].matches(DeviceIds::new(0x1234, 0x5678)));
    }

    #[test]
    fn out_of_range_values_are_rejected() {
        let too_slow = DriverConfig::from_toml("read_mode = { blocking = { timeout_ms = 500 } }");
        assert!(matches!(too_slow, Err(ConfigError::Invalid(_))));

        let no_slots = DriverConfig::from_toml("max_sessions = 0");
        assert!(matches!(no_slots, Err(ConfigError::Invalid(_))));

        let duplicate = DriverConfig::from_toml(
            r#"
            [[keymap]]
            trigger = { button = "x" }
            key = "enter"

            [[keymap]]
            trigger = { button = "x" }
            key = "escape"
            "#,
        );
        assert!(matches!(duplicate, Err(ConfigError::Mapping(_))));
    }

    #[test]
    fn garbage_is_a_parse_error() {
        let result = DriverConfig::from_toml("max_sessions = \"many\"");
        assert!(matches!(result, Err(ConfigError::Parse(_))));
    }

    #[test]
    fn save_then_load_keeps_everything() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join(CONFIG_FILE);

        let mut config = DriverConfig {
            max_sessions: 3,
            overflow: OverflowPolicy::DropNewest,
            ..DriverConfig::default()
        };
        config
            .keymap
            .bind(Trigger::Button(Button::Select), KeyId::Char('x'));
        config
            .extra_controllers
            .push(CompatEntry::new(0x1234, 0x5678, "Homebrew pad"));

        config.save(&path).unwrap();
        let loaded = DriverConfig::load(&path).unwrap();
        assert_eq!(loaded, config);
    }

    #[test]
    fn missing_file_falls_back_to_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(CONFIG_FILE);

        let config = DriverConfig::load_or_default(&path).unwrap();
        assert_eq!(config, DriverConfig::default());
        assert!(matches!(
            DriverConfig::load(&path),
            Err(ConfigError::Io { .. })
        ));
    }

    #[test]
    fn default_path_ends_in_crate_dir() {
        let path = DriverConfig::default_path();
        assert!(path.ends_with("snespad/snespad.toml"));
    }
}

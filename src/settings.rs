// Key-value settings persisted as a JSON document

use std::{
    fs,
    path::{Path, PathBuf},
};

use log::{debug, info};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::TimeTrialError;

const SETTINGS_FILE_NAME: &str = "settings.json";
/// Top-level key holding one entry per game
pub const GAME_SETTINGS_KEY: &str = "game_settings";

pub const DEFAULT_UDP_PORT: u16 = 20777;
pub const DEFAULT_UDP_BUFFER_SIZE: usize = 1024;
pub const DEFAULT_POLL_INTERVAL_MS: u64 = 1;

fn default_poll_interval_ms() -> u64 {
    DEFAULT_POLL_INTERVAL_MS
}

/// Per-game listener configuration
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct GameSettings {
    pub udp_port: u16,
    pub udp_buffer_size: usize,
    /// Pause between two polls of the latest packet, `0` only yields the thread
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
}

impl Default for GameSettings {
    fn default() -> Self {
        Self {
            udp_port: DEFAULT_UDP_PORT,
            udp_buffer_size: DEFAULT_UDP_BUFFER_SIZE,
            poll_interval_ms: DEFAULT_POLL_INTERVAL_MS,
        }
    }
}

/// Interface to the settings collaborator
pub trait SettingsStore {
    /// Read a top-level setting, `None` when it was never written
    fn read_setting(&self, key: &str) -> Result<Option<Value>, TimeTrialError>;

    /// Write a top-level setting, replacing the previous value
    fn write_setting(&mut self, key: &str, value: Value) -> Result<(), TimeTrialError>;

    /// Insert `sub_key` into the object stored under `key`, creating it if needed
    fn append_setting(&mut self, key: &str, sub_key: &str, value: Value) -> Result<(), TimeTrialError> {
        let mut entries = match self.read_setting(key)? {
            Some(Value::Object(map)) => map,
            Some(_) => {
                return Err(TimeTrialError::InvalidSettings {
                    game: sub_key.to_string(),
                    reason: format!("setting '{}' is not an object", key),
                });
            }
            None => Map::new(),
        };
        entries.insert(sub_key.to_string(), value);
        self.write_setting(key, Value::Object(entries))
    }
}

/// Settings stored in a single JSON file
pub struct JsonSettings {
    path: PathBuf,
}

impl JsonSettings {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    /// Settings file in the user's config directory
    pub fn new_default() -> Result<Self, TimeTrialError> {
        Ok(Self::new(Self::default_path()?))
    }

    pub fn default_path() -> Result<PathBuf, TimeTrialError> {
        let config_dir = dirs::config_dir().ok_or(TimeTrialError::NoConfigDir)?;
        Ok(config_dir.join("timetrial").join(SETTINGS_FILE_NAME))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn load(&self) -> Result<Map<String, Value>, TimeTrialError> {
        if !self.path.exists() {
            return Ok(Map::new());
        }
        let file = fs::File::open(&self.path)
            .map_err(|e| TimeTrialError::SettingsIOError { source: e })?;
        serde_json::from_reader(file).map_err(|e| TimeTrialError::SettingsSerializeError { source: e })
    }
}

impl SettingsStore for JsonSettings {
    fn read_setting(&self, key: &str) -> Result<Option<Value>, TimeTrialError> {
        Ok(self.load()?.remove(key))
    }

    fn write_setting(&mut self, key: &str, value: Value) -> Result<(), TimeTrialError> {
        let mut settings = self.load()?;
        settings.insert(key.to_string(), value);

        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).map_err(|e| TimeTrialError::SettingsIOError { source: e })?;
        }
        let file = fs::File::create(&self.path)
            .map_err(|e| TimeTrialError::SettingsIOError { source: e })?;
        serde_json::to_writer_pretty(file, &settings)
            .map_err(|e| TimeTrialError::SettingsSerializeError { source: e })
    }
}

/// Load the settings for `game`, writing `default` back to the store the first time.
///
/// An entry that exists but cannot be parsed is an error: defaults are only ever
/// synthesized for a game that has no entry at all.
pub fn load_game_settings(
    store: &mut dyn SettingsStore,
    game: &str,
    default: GameSettings,
) -> Result<GameSettings, TimeTrialError> {
    let entry = match store.read_setting(GAME_SETTINGS_KEY)? {
        Some(Value::Object(mut games)) => games.remove(game),
        Some(_) => {
            return Err(TimeTrialError::InvalidSettings {
                game: game.to_string(),
                reason: format!("'{}' is not an object", GAME_SETTINGS_KEY),
            });
        }
        None => None,
    };

    let Some(entry) = entry else {
        info!("No settings for {}, saving defaults: {:?}", game, default);
        let value = serde_json::to_value(&default)
            .map_err(|e| TimeTrialError::SettingsSerializeError { source: e })?;
        store.append_setting(GAME_SETTINGS_KEY, game, value)?;
        return Ok(default);
    };

    let settings: GameSettings =
        serde_json::from_value(entry).map_err(|e| TimeTrialError::InvalidSettings {
            game: game.to_string(),
            reason: e.to_string(),
        })?;
    if settings.udp_buffer_size == 0 {
        return Err(TimeTrialError::InvalidSettings {
            game: game.to_string(),
            reason: "udp_buffer_size must be greater than zero".to_string(),
        });
    }

    debug!("Loaded settings for {}: {:?}", game, settings);
    Ok(settings)
}

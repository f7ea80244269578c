pub mod dirt_rally2;
pub mod identity;

use std::{collections::BTreeMap, sync::Arc};

use serde::{Deserialize, Serialize};

use crate::settings::GameSettings;

pub use dirt_rally2::DirtRally2;
pub use identity::{CarSignature, Identity, TrackSignature, UNKNOWN};

/// Size in bytes of one telemetry field on the wire
pub const FIELD_WIDTH: usize = 4;

/// Read field `index` of a flat little-endian `f32` array.
///
/// Missing payloads and payloads too short to contain the field decode to `0.0`.
pub fn read_field(payload: Option<&[u8]>, index: usize) -> f32 {
    let start = index * FIELD_WIDTH;
    payload
        .and_then(|p| p.get(start..start + FIELD_WIDTH))
        .and_then(|bytes| bytes.try_into().ok())
        .map(f32::from_le_bytes)
        .unwrap_or(0.)
}

/// The title-independent view of one telemetry packet that drives run detection.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct RunSample {
    /// Time elapsed in the current run. Zero before a run starts and after it ends.
    pub run_time_s: f32,
    /// Duration of the last completed run or lap
    pub last_run_time_s: f32,
    pub laps_completed: f32,
    pub laps_total: f32,
}

/// Capability interface implemented once per supported racing title.
///
/// A title knows its packet layout, how to turn a packet into a [`RunSample`],
/// and how to recover car and track identity from physical signatures when the
/// game does not transmit names.
pub trait Game: Send + Sync {
    /// Stable name used for settings, storage and the registry
    fn name(&self) -> &'static str;

    /// Settings written to the settings store the first time the title is used
    fn default_settings(&self) -> GameSettings {
        GameSettings::default()
    }

    /// Absolute run-time value at or below which the title is considered idle
    fn idle_threshold(&self) -> f32 {
        0.
    }

    /// Decode the run-relevant fields of a payload. Never fails.
    fn decode(&self, payload: Option<&[u8]>) -> RunSample;

    /// Resolve car and track identity from a payload captured during a run
    fn identify(&self, payload: Option<&[u8]>) -> Identity;

    /// Segment times recorded when a run ends on `sample`
    fn final_segments(&self, sample: &RunSample) -> Vec<f32> {
        vec![sample.last_run_time_s]
    }

    /// Every `(car, class)` pair the title can identify
    fn known_cars(&self) -> Vec<(String, String)>;

    /// Every track name the title can identify
    fn known_tracks(&self) -> Vec<String>;
}

/// Explicit name to implementation mapping of supported titles.
#[derive(Clone, Default)]
pub struct GameRegistry {
    games: BTreeMap<String, Arc<dyn Game>>,
}

impl GameRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with every title shipped in this crate
    pub fn builtin() -> Self {
        let mut registry = Self::new();
        registry.register(Arc::new(DirtRally2));
        registry
    }

    /// Add a title, replacing any previous registration with the same name
    pub fn register(&mut self, game: Arc<dyn Game>) {
        self.games.insert(game.name().to_string(), game);
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Game>> {
        self.games.get(name).cloned()
    }

    /// Registered title names, sorted
    pub fn names(&self) -> Vec<&str> {
        self.games.keys().map(String::as_str).collect()
    }
}

// Persisted shapes of saved runs

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::time::SystemTime;

use crate::run::RunRecord;

/// One saved segment time. A run with several segments is saved as several rows
/// sharing the same identity, date and tags.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct RunRow {
    pub game: String,
    pub track: String,
    pub track_conditions: String,
    pub car: String,
    pub car_class: String,
    pub run_date: SystemTime,
    pub runtime_seconds: f32,
    pub tags: Vec<String>,
}

impl RunRow {
    /// Expand a processed record into one row per segment time
    pub fn from_record(game: &str, record: &RunRecord) -> Vec<RunRow> {
        let run_date = record.started_at.unwrap_or_else(SystemTime::now);
        let tags: Vec<String> = normalize_tags(&record.tags).into_iter().collect();
        record
            .segment_times
            .iter()
            .map(|time| RunRow {
                game: game.to_string(),
                track: record.track_name.clone(),
                track_conditions: record.track_conditions.clone(),
                car: record.car_name.clone(),
                car_class: record.car_class.clone(),
                run_date,
                runtime_seconds: *time,
                tags: tags.clone(),
            })
            .collect()
    }
}

/// Tracks and cars seen for one game
#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq)]
pub struct GameCatalog {
    pub tracks: BTreeSet<String>,
    /// Car name to car class
    pub cars: BTreeMap<String, String>,
}

/// Dimension data shared by every saved run
#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq)]
pub struct Catalog {
    pub games: BTreeMap<String, GameCatalog>,
    pub tags: BTreeSet<String>,
}

impl Catalog {
    /// Make sure the game, track, car and tags of `record` are known
    pub fn upsert(&mut self, game: &str, record: &RunRecord) {
        let entry = self.games.entry(game.to_string()).or_default();
        if !record.track_name.is_empty() {
            entry.tracks.insert(record.track_name.clone());
        }
        if !record.car_name.is_empty() {
            entry
                .cars
                .insert(record.car_name.clone(), record.car_class.clone());
        }
        self.tags.extend(normalize_tags(&record.tags));
    }
}

/// Lower-case, trimmed, non-empty tags
pub fn normalize_tags<'a>(tags: impl IntoIterator<Item = &'a String>) -> BTreeSet<String> {
    tags.into_iter()
        .map(|tag| tag.trim().to_lowercase())
        .filter(|tag| !tag.is_empty())
        .collect()
}

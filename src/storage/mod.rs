// Run persistence
// Saves processed runs and answers the per-game lookups used to fill in run details

pub mod jsonl;
pub mod types;

pub use jsonl::JsonLinesStorage;
pub use types::{Catalog, GameCatalog, RunRow};

use crate::{TimeTrialError, run::RunRecord};

/// Interface to the run persistence collaborator
pub trait RunStorage {
    /// Save one processed run: upsert its game, track, car and tags, then write
    /// one row per segment time
    fn save_run(&mut self, game: &str, record: &RunRecord) -> Result<(), TimeTrialError>;

    /// Distinct track names saved for `game`
    fn saved_tracks(&self, game: &str) -> Result<Vec<String>, TimeTrialError>;

    /// Distinct non-empty track conditions used in `game`'s runs
    fn saved_track_conditions(&self, game: &str) -> Result<Vec<String>, TimeTrialError>;

    /// Distinct `(car, class)` pairs saved for `game`
    fn saved_cars(&self, game: &str) -> Result<Vec<(String, String)>, TimeTrialError>;

    /// Distinct car classes saved for `game`
    fn saved_car_classes(&self, game: &str) -> Result<Vec<String>, TimeTrialError>;

    /// Every known tag plus the tags used by `game`'s runs
    fn saved_tags(&self, game: &str) -> Result<Vec<String>, TimeTrialError>;
}

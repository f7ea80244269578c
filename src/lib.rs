// Library interface for timetrial
// This allows integration tests and benches to access internal modules

pub mod control;
pub mod errors;
pub mod game;
pub mod listener;
pub mod run;
pub mod settings;
pub mod storage;

// Re-export commonly used types
pub use control::{Controller, GameAttributes, RunStatus};
pub use errors::TimeTrialError;
pub use game::{DirtRally2, Game, GameRegistry, Identity, RunSample};
pub use listener::{PacketListener, PayloadSlot};
pub use run::{AggregationPolicy, RunDetails, RunLifecycle, RunRecord, RunState, format_run_time};
pub use settings::{GameSettings, JsonSettings, SettingsStore};
pub use storage::{JsonLinesStorage, RunStorage};

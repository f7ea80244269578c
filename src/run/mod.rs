pub mod aggregate;
pub mod lifecycle;
pub mod tracker;

use std::{collections::BTreeSet, time::SystemTime};

use serde::{Deserialize, Serialize};

pub use aggregate::AggregationPolicy;
pub use lifecycle::RunLifecycle;
pub use tracker::RunTracker;

/// Where a run lifecycle currently is.
///
/// `Idle` is both the initial state and the state reentered once a finished run
/// has been processed. `Finished` and `Aborted` stay put until processed.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum RunState {
    #[default]
    Idle,
    WaitingForStart,
    Running,
    Finished,
    Aborted,
}

impl RunState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, RunState::Finished | RunState::Aborted)
    }

    /// Whether a polling loop should be driving this state
    pub fn is_active(&self) -> bool {
        matches!(self, RunState::WaitingForStart | RunState::Running)
    }
}

/// One attempt at a timed stage or session, independent of the game that produced it.
#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq)]
pub struct RunRecord {
    /// Segment times in seconds. Per-lap times, or one entry with the total time.
    pub segment_times: Vec<f32>,
    /// Elapsed time as last reported by the game, only used for edge detection
    #[serde(skip)]
    pub total_elapsed_s: f32,
    #[serde(skip)]
    pub laps_total: f32,
    #[serde(skip)]
    pub laps_completed: f32,
    pub car_name: String,
    pub car_class: String,
    pub track_name: String,
    pub track_conditions: String,
    pub tags: BTreeSet<String>,
    pub started_at: Option<SystemTime>,
}

impl RunRecord {
    /// Fresh record carrying only the caller supplied details
    pub fn from_details(details: &RunDetails) -> Self {
        let mut record = Self::default();
        record.apply_details(details);
        record
    }

    /// Overwrite identity and tags with whatever `details` provides.
    /// Segment times are left alone.
    pub fn apply_details(&mut self, details: &RunDetails) {
        if let Some(car_name) = &details.car_name {
            self.car_name = car_name.clone();
        }
        if let Some(car_class) = &details.car_class {
            self.car_class = car_class.clone();
        }
        if let Some(track_name) = &details.track_name {
            self.track_name = track_name.clone();
        }
        if let Some(track_conditions) = &details.track_conditions {
            self.track_conditions = track_conditions.clone();
        }
        if let Some(tags) = &details.tags {
            self.tags = tags.clone();
        }
    }

    pub fn has_car(&self) -> bool {
        !self.car_name.is_empty()
    }

    pub fn has_track(&self) -> bool {
        !self.track_name.is_empty()
    }
}

/// Identity and tags a caller can supply when starting a run or correct when processing it
#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq, Eq)]
#[serde(default)]
pub struct RunDetails {
    pub car_name: Option<String>,
    pub car_class: Option<String>,
    pub track_name: Option<String>,
    pub track_conditions: Option<String>,
    pub tags: Option<BTreeSet<String>>,
}

/// Render seconds as `MM:SS:mmm`
pub fn format_run_time(seconds: f32) -> String {
    let total_ms = (seconds.max(0.) as f64 * 1000.).round() as u64;
    format!(
        "{:02}:{:02}:{:03}",
        total_ms / 60_000,
        (total_ms / 1000) % 60,
        total_ms % 1000
    )
}

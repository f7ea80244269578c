// Edge detection over the elapsed-time field of consecutive packets

use std::{sync::Arc, time::SystemTime};

use log::{debug, info};

use super::{RunDetails, RunRecord, RunState};
use crate::game::Game;

/// Run state machine fed one packet at a time.
///
/// A run starts when the game's elapsed time goes from idle to non-idle and ends
/// when it goes back. At the end edge the run is `Finished` if every lap was
/// completed and `Aborted` otherwise. Identity is resolved once per run, on the
/// first packet that shows a run in progress, unless the caller supplied it.
pub struct RunTracker {
    game: Arc<dyn Game>,
    state: RunState,
    record: RunRecord,
    last_run_time_s: f32,
    identity_resolved: bool,
    abort_cause: Option<String>,
}

impl RunTracker {
    pub fn new(game: Arc<dyn Game>) -> Self {
        Self {
            game,
            state: RunState::Idle,
            record: RunRecord::default(),
            last_run_time_s: 0.,
            identity_resolved: false,
            abort_cause: None,
        }
    }

    pub fn state(&self) -> RunState {
        self.state
    }

    pub fn record(&self) -> &RunRecord {
        &self.record
    }

    pub fn abort_cause(&self) -> Option<&str> {
        self.abort_cause.as_deref()
    }

    /// Start waiting for a run with a fresh record. Only valid from `Idle`.
    pub(crate) fn arm(&mut self, details: &RunDetails) {
        debug_assert_eq!(self.state, RunState::Idle);
        self.record = RunRecord::from_details(details);
        self.last_run_time_s = 0.;
        self.identity_resolved = self.record.has_car()
            && !self.record.car_class.is_empty()
            && self.record.has_track();
        self.abort_cause = None;
        self.state = RunState::WaitingForStart;
    }

    /// Feed the latest packet. Returns the new state when a transition happened.
    pub fn observe(&mut self, payload: Option<&[u8]>) -> Option<RunState> {
        if !self.state.is_active() {
            return None;
        }

        let sample = self.game.decode(payload);
        let threshold = self.game.idle_threshold();
        let was_running = self.last_run_time_s.abs() > threshold;
        let is_running = sample.run_time_s.abs() > threshold;
        self.last_run_time_s = sample.run_time_s;

        if is_running && !self.identity_resolved {
            self.resolve_identity(payload);
        }

        match self.state {
            RunState::WaitingForStart if !was_running && is_running => {
                self.record.started_at = Some(SystemTime::now());
                self.record.total_elapsed_s = sample.run_time_s;
                self.record.laps_total = sample.laps_total;
                self.record.laps_completed = sample.laps_completed;
                self.state = RunState::Running;
                info!("{}: run started", self.game.name());
                Some(self.state)
            }
            RunState::Running if was_running && !is_running => {
                self.record.total_elapsed_s = sample.run_time_s;
                self.record.laps_total = sample.laps_total;
                self.record.laps_completed = sample.laps_completed;
                self.record.segment_times = self.game.final_segments(&sample);
                self.state = if sample.laps_completed == sample.laps_total {
                    RunState::Finished
                } else {
                    RunState::Aborted
                };
                info!(
                    "{}: run ended as {:?} ({}/{} laps, times {:?})",
                    self.game.name(),
                    self.state,
                    sample.laps_completed,
                    sample.laps_total,
                    self.record.segment_times
                );
                Some(self.state)
            }
            RunState::Running => {
                self.record.total_elapsed_s = sample.run_time_s;
                self.record.laps_total = sample.laps_total;
                self.record.laps_completed = sample.laps_completed;
                None
            }
            _ => None,
        }
    }

    fn resolve_identity(&mut self, payload: Option<&[u8]>) {
        let identity = self.game.identify(payload);
        // each field the caller supplied is kept, only the empty ones are filled
        if !self.record.has_car() {
            self.record.car_name = identity.car_name;
        }
        if self.record.car_class.is_empty() {
            self.record.car_class = identity.car_class;
        }
        if !self.record.has_track() {
            self.record.track_name = identity.track_name;
        }
        self.identity_resolved = true;
        debug!(
            "{}: identified car '{}' ({}) on '{}'",
            self.game.name(),
            self.record.car_name,
            self.record.car_class,
            self.record.track_name
        );
    }

    /// Force an active run into `Aborted`. Terminal and idle states are kept.
    pub(crate) fn abort(&mut self, cause: Option<String>) -> RunState {
        if self.state.is_active() {
            info!(
                "{}: run aborted ({})",
                self.game.name(),
                cause.as_deref().unwrap_or("stopped")
            );
            self.state = RunState::Aborted;
            self.abort_cause = cause;
        }
        self.state
    }

    /// Hand the record over and go back to `Idle`
    pub(crate) fn take_record(&mut self) -> RunRecord {
        let record = std::mem::take(&mut self.record);
        self.reset();
        record
    }

    pub(crate) fn reset(&mut self) {
        self.state = RunState::Idle;
        self.record = RunRecord::default();
        self.last_run_time_s = 0.;
        self.identity_resolved = false;
        self.abort_cause = None;
    }
}

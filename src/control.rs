// Request/response facade over the registry, settings, storage and the active lifecycle.
// Every failure is reported as a message string.

use log::{debug, info, warn};
use serde::Serialize;

use crate::{
    TimeTrialError,
    game::GameRegistry,
    run::{AggregationPolicy, RunDetails, RunLifecycle, RunRecord, RunState},
    settings::SettingsStore,
    storage::RunStorage,
};

fn unknown_game(name: &str) -> String {
    TimeTrialError::UnknownGame {
        name: name.to_string(),
    }
    .to_string()
}

#[derive(Serialize, Clone, Debug, PartialEq, Eq)]
pub struct CarEntry {
    pub name: String,
    pub class: String,
}

impl From<(String, String)> for CarEntry {
    fn from((name, class): (String, String)) -> Self {
        Self { name, class }
    }
}

/// What is known about a game: its built-in signature tables plus what was saved before
#[derive(Serialize, Clone, Debug, PartialEq)]
pub struct GameAttributes {
    pub name: String,
    pub known_cars: Vec<CarEntry>,
    pub known_tracks: Vec<String>,
    pub tracks: Vec<String>,
    pub track_conditions: Vec<String>,
    pub cars: Vec<CarEntry>,
    pub car_classes: Vec<String>,
    pub tags: Vec<String>,
}

#[derive(Serialize, Clone, Debug, PartialEq)]
pub struct RunStatus {
    pub game: Option<String>,
    pub state: RunState,
    /// Only set once the run is `Finished`. The record of an `Aborted` run is
    /// read through [`Controller::progress`].
    pub result: Option<RunRecord>,
    pub abort_cause: Option<String>,
}

pub struct Controller {
    registry: GameRegistry,
    settings: Box<dyn SettingsStore + Send>,
    storage: Box<dyn RunStorage + Send>,
    active: Option<RunLifecycle>,
}

impl Controller {
    pub fn new(
        registry: GameRegistry,
        settings: Box<dyn SettingsStore + Send>,
        storage: Box<dyn RunStorage + Send>,
    ) -> Self {
        Self {
            registry,
            settings,
            storage,
            active: None,
        }
    }

    pub fn list_games(&self) -> Vec<String> {
        self.registry.names().into_iter().map(str::to_string).collect()
    }

    pub fn game_attributes(&self, game: &str) -> Result<GameAttributes, String> {
        let title = self
            .registry
            .get(game)
            .ok_or_else(|| unknown_game(game))?;
        let name = title.name();
        Ok(GameAttributes {
            name: name.to_string(),
            known_cars: title.known_cars().into_iter().map(CarEntry::from).collect(),
            known_tracks: title.known_tracks(),
            tracks: self.storage.saved_tracks(name).map_err(|e| e.to_string())?,
            track_conditions: self
                .storage
                .saved_track_conditions(name)
                .map_err(|e| e.to_string())?,
            cars: self
                .storage
                .saved_cars(name)
                .map_err(|e| e.to_string())?
                .into_iter()
                .map(CarEntry::from)
                .collect(),
            car_classes: self
                .storage
                .saved_car_classes(name)
                .map_err(|e| e.to_string())?,
            tags: self.storage.saved_tags(name).map_err(|e| e.to_string())?,
        })
    }

    /// Start watching for a run of `game`. Switching to another game shuts the
    /// previous game's lifecycle down first, dropping any unprocessed run.
    pub fn start_run(&mut self, game: &str, details: Option<RunDetails>) -> Result<String, String> {
        let title = self
            .registry
            .get(game)
            .ok_or_else(|| unknown_game(game))?;

        let reuse = self
            .active
            .as_ref()
            .is_some_and(|lifecycle| lifecycle.game().name() == title.name());
        if !reuse {
            if let Some(mut previous) = self.active.take() {
                let state = previous.state();
                if state != RunState::Idle {
                    warn!(
                        "Switching to {} while a {} run is {:?}, shutting it down",
                        title.name(),
                        previous.game().name(),
                        state
                    );
                } else {
                    debug!("Releasing lifecycle for {}", previous.game().name());
                }
                previous.shutdown();
            }
            let lifecycle =
                RunLifecycle::new(title, self.settings.as_mut()).map_err(|e| e.to_string())?;
            self.active = Some(lifecycle);
        }

        let lifecycle = self
            .active
            .as_mut()
            .ok_or_else(|| "No lifecycle available".to_string())?;
        let addr = lifecycle.start_run(details).map_err(|e| e.to_string())?;
        info!("Run started for {} on {}", game, addr);
        Ok(addr.to_string())
    }

    pub fn stop_run(&mut self) -> Result<RunState, String> {
        self.active
            .as_mut()
            .ok_or_else(|| "No run has been started".to_string())?
            .stop_run()
            .map_err(|e| e.to_string())
    }

    pub fn status(&self) -> RunStatus {
        match &self.active {
            Some(lifecycle) => {
                let state = lifecycle.state();
                RunStatus {
                    game: Some(lifecycle.game().name().to_string()),
                    state,
                    result: (state == RunState::Finished)
                        .then(|| lifecycle.run_result())
                        .flatten(),
                    abort_cause: lifecycle.abort_cause(),
                }
            }
            None => RunStatus {
                game: None,
                state: RunState::Idle,
                result: None,
                abort_cause: None,
            },
        }
    }

    /// Snapshot of the in-flight run
    pub fn progress(&self) -> Option<RunRecord> {
        self.active.as_ref().and_then(RunLifecycle::run_progress)
    }

    /// Apply `policy` to the completed run and save it. Returns what was saved.
    pub fn process_run(
        &mut self,
        policy: &str,
        edits: Option<RunDetails>,
    ) -> Result<Option<RunRecord>, String> {
        let policy = policy
            .parse::<AggregationPolicy>()
            .map_err(|e| e.to_string())?;
        let lifecycle = self
            .active
            .as_mut()
            .ok_or_else(|| "No run has been started".to_string())?;
        lifecycle
            .process_run(policy, edits, self.storage.as_mut())
            .map_err(|e| e.to_string())
    }

    pub fn shutdown(&mut self) {
        if let Some(mut lifecycle) = self.active.take() {
            lifecycle.shutdown();
        }
    }
}

impl Drop for Controller {
    fn drop(&mut self) {
        self.shutdown();
    }
}

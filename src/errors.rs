// Error types for timetrial

use crate::run::RunState;
use snafu::Snafu;
use std::io;

#[derive(Debug, Snafu)]
pub enum TimeTrialError {
    // Run lifecycle misuse
    #[snafu(display("A run is already in progress (state: {state:?})"))]
    RunInProgress { state: RunState },
    #[snafu(display("There is no active run"))]
    NoActiveRun,
    #[snafu(display("The run has not finished yet (state: {state:?})"))]
    RunNotFinished { state: RunState },
    #[snafu(display("Unknown run processing policy: {policy}"))]
    UnknownPolicy { policy: String },
    #[snafu(display("Unsupported game: {name}"))]
    UnknownGame { name: String },

    // Listener and polling errors
    #[snafu(display("Could not bind UDP socket on port {port}"))]
    SocketBind { port: u16, source: io::Error },
    #[snafu(display("Could not configure UDP socket"))]
    SocketConfig { source: io::Error },
    #[snafu(display("Could not spawn background thread {name}"))]
    ThreadSpawn { name: String, source: io::Error },

    // Settings errors
    #[snafu(display("Could not find application config directory to save settings"))]
    NoConfigDir,
    #[snafu(display("Error reading or writing settings file"))]
    SettingsIOError { source: io::Error },
    #[snafu(display("Error serializing settings file"))]
    SettingsSerializeError { source: serde_json::Error },
    #[snafu(display("Invalid settings for {game}: {reason}"))]
    InvalidSettings { game: String, reason: String },

    // Run storage errors
    #[snafu(display("Could not find application data directory to store runs"))]
    NoDataDir,
    #[snafu(display("Error reading or writing run storage"))]
    StorageIOError { source: io::Error },
    #[snafu(display("Error serializing run storage"))]
    StorageSerializeError { source: serde_json::Error },
}

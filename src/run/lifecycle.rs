// Run lifecycle: owns the packet listener and the polling thread driving a RunTracker

use std::{
    net::SocketAddr,
    panic::{self, AssertUnwindSafe},
    sync::{
        Arc, Mutex, MutexGuard, PoisonError,
        atomic::{AtomicBool, Ordering},
    },
    thread::{self, JoinHandle},
    time::Duration,
};

use log::{debug, error, info, warn};

use super::{AggregationPolicy, RunDetails, RunRecord, RunState, RunTracker, aggregate};
use crate::{
    TimeTrialError,
    game::Game,
    listener::{PacketListener, PayloadSlot},
    settings::{GameSettings, SettingsStore, load_game_settings},
    storage::RunStorage,
};

fn lock(tracker: &Mutex<RunTracker>) -> MutexGuard<'_, RunTracker> {
    tracker.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Detects, times and hands over one run at a time for a single game.
///
/// # Lifecycle
///
/// 1. [`RunLifecycle::start_run`] binds the listener and spawns a polling thread, the
///    state becomes `WaitingForStart`
/// 2. the polling thread moves the state to `Running` and then to `Finished` or
///    `Aborted` as the game's elapsed time starts and stops
/// 3. [`RunLifecycle::stop_run`] can force an active run to `Aborted` at any time
/// 4. [`RunLifecycle::process_run`] aggregates and saves the finished run and
///    returns to `Idle`, ready for the next [`RunLifecycle::start_run`]
///
/// Progress is observed by polling [`RunLifecycle::state`] and [`RunLifecycle::run_result`].
pub struct RunLifecycle {
    game: Arc<dyn Game>,
    settings: GameSettings,
    listener: PacketListener,
    tracker: Arc<Mutex<RunTracker>>,
    stop_flag: Arc<AtomicBool>,
    poller: Option<JoinHandle<()>>,
}

impl RunLifecycle {
    /// Create a lifecycle for `game` using the listener settings in `store`.
    ///
    /// Writes the game's default settings to the store if it has no entry yet.
    ///
    /// # Errors
    ///
    /// Fails if the store cannot be read or written, or if the game's entry is malformed.
    pub fn new(game: Arc<dyn Game>, store: &mut dyn SettingsStore) -> Result<Self, TimeTrialError> {
        let settings = load_game_settings(store, game.name(), game.default_settings())?;
        Ok(Self::with_settings(game, settings))
    }

    pub fn with_settings(game: Arc<dyn Game>, settings: GameSettings) -> Self {
        Self {
            tracker: Arc::new(Mutex::new(RunTracker::new(game.clone()))),
            game,
            settings,
            listener: PacketListener::new(),
            stop_flag: Arc::new(AtomicBool::new(false)),
            poller: None,
        }
    }

    pub fn game(&self) -> &Arc<dyn Game> {
        &self.game
    }

    pub fn settings(&self) -> &GameSettings {
        &self.settings
    }

    /// Address the listener is bound to while a run is being watched
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.listener.local_addr()
    }

    pub fn state(&self) -> RunState {
        lock(&self.tracker).state()
    }

    /// The completed run, only available in `Finished` or `Aborted`
    pub fn run_result(&self) -> Option<RunRecord> {
        let tracker = lock(&self.tracker);
        tracker
            .state()
            .is_terminal()
            .then(|| tracker.record().clone())
    }

    /// Snapshot of the run being recorded, available in every state but `Idle`
    pub fn run_progress(&self) -> Option<RunRecord> {
        let tracker = lock(&self.tracker);
        (tracker.state() != RunState::Idle).then(|| tracker.record().clone())
    }

    /// Why the polling thread gave up on the run, if it did
    pub fn abort_cause(&self) -> Option<String> {
        lock(&self.tracker).abort_cause().map(str::to_string)
    }

    /// Start listening and wait for the next run.
    ///
    /// Identity and tags in `details` are kept on the record, identity that is not
    /// supplied is resolved from telemetry once the run starts. Returns as soon as
    /// the background threads are running.
    ///
    /// # Errors
    ///
    /// Fails with [`TimeTrialError::RunInProgress`] unless the lifecycle is `Idle`,
    /// or if the listener cannot be started.
    pub fn start_run(&mut self, details: Option<RunDetails>) -> Result<SocketAddr, TimeTrialError> {
        let state = self.state();
        if state != RunState::Idle {
            error!("{}: start_run called while {:?}", self.game.name(), state);
            return Err(TimeTrialError::RunInProgress { state });
        }

        let addr = self
            .listener
            .start(self.settings.udp_port, self.settings.udp_buffer_size)?;
        lock(&self.tracker).arm(&details.unwrap_or_default());

        let stop_flag = Arc::new(AtomicBool::new(false));
        let slot = self.listener.slot();
        let tracker = self.tracker.clone();
        let loop_stop_flag = stop_flag.clone();
        let interval = Duration::from_millis(self.settings.poll_interval_ms);
        let spawned = thread::Builder::new()
            .name(format!("{}-poller", self.game.name()))
            .spawn(move || poll_loop(slot, tracker, loop_stop_flag, interval));

        match spawned {
            Ok(handle) => {
                self.stop_flag = stop_flag;
                self.poller = Some(handle);
                info!("{}: waiting for a run to start on {}", self.game.name(), addr);
                Ok(addr)
            }
            Err(e) => {
                self.listener.stop();
                lock(&self.tracker).reset();
                Err(TimeTrialError::ThreadSpawn {
                    name: format!("{}-poller", self.game.name()),
                    source: e,
                })
            }
        }
    }

    /// Cancel the current run.
    ///
    /// An active run becomes `Aborted` whatever the telemetry says. A run that already
    /// reached a terminal state keeps it. Either way the listener is released.
    ///
    /// # Errors
    ///
    /// Fails with [`TimeTrialError::NoActiveRun`] when `Idle`.
    pub fn stop_run(&mut self) -> Result<RunState, TimeTrialError> {
        if self.state() == RunState::Idle {
            return Err(TimeTrialError::NoActiveRun);
        }
        self.halt();
        Ok(lock(&self.tracker).abort(None))
    }

    /// Aggregate a completed run, save it unless discarded, and return to `Idle`.
    ///
    /// `edits` replace the detected identity and tags before aggregation. The
    /// lifecycle is back in `Idle` even if saving fails.
    ///
    /// # Errors
    ///
    /// Fails with [`TimeTrialError::RunNotFinished`] before a terminal state, or with
    /// the storage error if the run could not be saved.
    pub fn process_run(
        &mut self,
        policy: AggregationPolicy,
        edits: Option<RunDetails>,
        storage: &mut dyn RunStorage,
    ) -> Result<Option<RunRecord>, TimeTrialError> {
        let state = self.state();
        if !state.is_terminal() {
            return Err(TimeTrialError::RunNotFinished { state });
        }

        self.halt();
        let mut record = lock(&self.tracker).take_record();
        if let Some(edits) = edits {
            record.apply_details(&edits);
        }

        let Some(record) = aggregate::process(policy, record) else {
            info!("{}: run discarded", self.game.name());
            return Ok(None);
        };
        storage.save_run(self.game.name(), &record)?;
        info!(
            "{}: saved run {:?} with policy {}",
            self.game.name(),
            record.segment_times,
            policy
        );
        Ok(Some(record))
    }

    /// Stop everything and drop any unprocessed run, leaving the lifecycle `Idle`
    pub fn shutdown(&mut self) {
        self.halt();
        let mut tracker = lock(&self.tracker);
        if tracker.state() != RunState::Idle {
            warn!(
                "{}: shutting down with an unprocessed run in {:?}",
                self.game.name(),
                tracker.state()
            );
        }
        tracker.reset();
    }

    fn halt(&mut self) {
        self.stop_flag.store(true, Ordering::Release);
        if let Some(handle) = self.poller.take() {
            if handle.join().is_err() {
                warn!("{}: polling thread panicked", self.game.name());
            }
        }
        self.listener.stop();
    }
}

impl Drop for RunLifecycle {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn poll_loop(
    slot: PayloadSlot,
    tracker: Arc<Mutex<RunTracker>>,
    stop_flag: Arc<AtomicBool>,
    interval: Duration,
) {
    while !stop_flag.load(Ordering::Acquire) {
        if let Some(cause) = slot.failure() {
            lock(&tracker).abort(Some(format!("telemetry listener failed: {}", cause)));
            break;
        }

        let payload = slot.latest();
        let mut guard = lock(&tracker);
        // a panicking decoder aborts the run instead of killing the thread
        let observed = panic::catch_unwind(AssertUnwindSafe(|| guard.observe(payload.as_deref())));
        if observed.is_err() {
            guard.abort(Some("telemetry decoding panicked".to_string()));
            break;
        }
        if guard.state().is_terminal() {
            break;
        }
        drop(guard);

        if interval.is_zero() {
            thread::yield_now();
        } else {
            thread::sleep(interval);
        }
    }
    debug!("Polling loop exited");
}

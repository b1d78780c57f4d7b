//! Refresh controller.
//!
//! One controller serves one screen context. It runs as a task that owns
//! all of the context's refresh state and handles commands one at a time,
//! so events reach the UI in the order loads complete. Loads run on their
//! own tasks and report back through the same command queue.

use std::collections::BTreeSet;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use futures::FutureExt;
use futures::future::BoxFuture;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, warn};

use crate::domain::{DepartureBoard, JourneyTimeline, StopCode};
use crate::tracker::{RetrievalError, RetrievalErrorKind, TrackerEndpoint};

use super::config::RefreshConfig;
use super::timing::{auto_refresh_delay, last_updated_label};

/// Produces one load of the screen's data.
pub type Loader<T> =
    Arc<dyn Fn() -> BoxFuture<'static, Result<T, RetrievalError>> + Send + Sync>;

/// Where a screen context is in its load cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefreshState {
    Idle,
    Loading,
    Displaying,
    ErrorDisplayed,
}

/// What the UI should show.
#[derive(Debug)]
pub enum RefreshEvent<T> {
    /// A load has started.
    Loading,
    /// Data to display.
    Loaded {
        data: Arc<T>,
        loaded_at: DateTime<Utc>,
    },
    /// The load failed; show `message` in place of any data.
    Failed {
        kind: RetrievalErrorKind,
        message: &'static str,
    },
    /// New text for the "last updated" label.
    LastUpdated(String),
}

impl<T> Clone for RefreshEvent<T> {
    fn clone(&self) -> Self {
        match self {
            RefreshEvent::Loading => RefreshEvent::Loading,
            RefreshEvent::Loaded { data, loaded_at } => RefreshEvent::Loaded {
                data: data.clone(),
                loaded_at: *loaded_at,
            },
            RefreshEvent::Failed { kind, message } => RefreshEvent::Failed {
                kind: *kind,
                message: *message,
            },
            RefreshEvent::LastUpdated(text) => RefreshEvent::LastUpdated(text.clone()),
        }
    }
}

enum Command<T> {
    Refresh { force: bool },
    Completed {
        generation: u64,
        result: Result<T, RetrievalError>,
    },
    AutoRefreshDue { seq: u64 },
    UpdateLabel,
    Resume,
    Pause,
    SetAutoRefresh(bool),
}

/// The last completed load, kept for replay on re-entry.
enum Outcome<T> {
    Loaded {
        data: Arc<T>,
        loaded_at: DateTime<Utc>,
    },
    Failed(RetrievalErrorKind),
}

/// Handle used by the UI to drive a controller.
///
/// Dropping every handle stops the controller and its timers.
pub struct RefreshHandle<T> {
    commands: mpsc::UnboundedSender<Command<T>>,
    state: watch::Receiver<RefreshState>,
}

impl<T> Clone for RefreshHandle<T> {
    fn clone(&self) -> Self {
        Self {
            commands: self.commands.clone(),
            state: self.state.clone(),
        }
    }
}

impl<T> RefreshHandle<T> {
    /// Ask for fresh data.
    ///
    /// A non-forced request is ignored while a load is in flight and
    /// replays the last result if one exists. A forced request cancels any
    /// in-flight load and starts a new one.
    pub fn request_refresh(&self, force: bool) {
        self.send(Command::Refresh { force });
    }

    /// The context became visible. Replays the last result, or loads if
    /// there is none, and restarts the timers.
    pub fn resume(&self) {
        self.send(Command::Resume);
    }

    /// The context went away. Stops the timers; an in-flight load keeps
    /// running and its result is kept for the next `resume`.
    pub fn pause(&self) {
        self.send(Command::Pause);
    }

    pub fn set_auto_refresh(&self, enabled: bool) {
        self.send(Command::SetAutoRefresh(enabled));
    }

    pub fn state(&self) -> RefreshState {
        *self.state.borrow()
    }

    /// Wait for the controller to enter `state`.
    pub async fn wait_for(&mut self, state: RefreshState) {
        // An error means the controller is gone; nothing more will change.
        let _ = self.state.wait_for(|s| *s == state).await;
    }

    fn send(&self, command: Command<T>) {
        if self.commands.send(command).is_err() {
            debug!("refresh controller has stopped");
        }
    }
}

/// The task state behind a [`RefreshHandle`].
pub struct RefreshController<T> {
    loader: Loader<T>,
    config: RefreshConfig,
    auto_refresh: bool,
    active: bool,

    events: mpsc::UnboundedSender<RefreshEvent<T>>,
    commands: mpsc::WeakUnboundedSender<Command<T>>,
    state: watch::Sender<RefreshState>,

    generation: u64,
    in_flight: Option<JoinHandle<()>>,
    last_completed: Option<Instant>,
    outcome: Option<Outcome<T>>,

    auto_seq: u64,
    auto_timer: Option<JoinHandle<()>>,
    label_timer: Option<JoinHandle<()>>,
}

impl<T: Send + Sync + 'static> RefreshController<T> {
    /// Start a controller. It stays idle until the first `resume`.
    pub fn spawn(
        loader: Loader<T>,
        config: RefreshConfig,
    ) -> (RefreshHandle<T>, mpsc::UnboundedReceiver<RefreshEvent<T>>) {
        let (commands_tx, commands_rx) = mpsc::unbounded_channel();
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let (state_tx, state_rx) = watch::channel(RefreshState::Idle);

        let controller = RefreshController {
            loader,
            auto_refresh: config.auto_refresh,
            config,
            active: false,
            events: events_tx,
            commands: commands_tx.downgrade(),
            state: state_tx,
            generation: 0,
            in_flight: None,
            last_completed: None,
            outcome: None,
            auto_seq: 0,
            auto_timer: None,
            label_timer: None,
        };
        tokio::spawn(controller.run(commands_rx));

        let handle = RefreshHandle {
            commands: commands_tx,
            state: state_rx,
        };
        (handle, events_rx)
    }

    async fn run(mut self, mut commands: mpsc::UnboundedReceiver<Command<T>>) {
        while let Some(command) = commands.recv().await {
            match command {
                Command::Refresh { force } => self.on_refresh(force),
                Command::Completed { generation, result } => self.on_completed(generation, result),
                Command::AutoRefreshDue { seq } => self.on_auto_refresh_due(seq),
                Command::UpdateLabel => self.emit_label(),
                Command::Resume => self.on_resume(),
                Command::Pause => self.on_pause(),
                Command::SetAutoRefresh(enabled) => {
                    self.auto_refresh = enabled;
                    self.arm_auto_refresh();
                }
            }
        }

        self.cancel_timers();
        if let Some(task) = self.in_flight.take() {
            task.abort();
        }
        debug!("refresh controller stopped");
    }

    fn on_refresh(&mut self, force: bool) {
        if self.in_flight.is_some() && !force {
            debug!("load already in flight, ignoring refresh request");
            return;
        }

        if !force && self.outcome.is_some() {
            self.replay();
            self.arm_auto_refresh();
            return;
        }

        self.start_load();
    }

    fn on_completed(&mut self, generation: u64, result: Result<T, RetrievalError>) {
        if generation != self.generation {
            debug!(
                generation,
                current = self.generation,
                "discarding superseded load result"
            );
            return;
        }

        self.in_flight = None;
        self.last_completed = Some(Instant::now());

        let outcome = match result {
            Ok(data) => {
                self.set_state(RefreshState::Displaying);
                Outcome::Loaded {
                    data: Arc::new(data),
                    loaded_at: Utc::now(),
                }
            }
            Err(err) => {
                warn!(kind = ?err.kind(), error = ?err, "load failed");
                self.set_state(RefreshState::ErrorDisplayed);
                Outcome::Failed(err.kind())
            }
        };
        self.outcome = Some(outcome);

        self.replay();
        self.arm_auto_refresh();
    }

    fn on_auto_refresh_due(&mut self, seq: u64) {
        if seq != self.auto_seq {
            return;
        }
        self.auto_timer = None;

        if !self.auto_refresh || !self.active || self.in_flight.is_some() {
            return;
        }
        debug!("automatic refresh");
        self.start_load();
    }

    fn on_resume(&mut self) {
        self.active = true;
        self.start_label_timer();

        if self.in_flight.is_some() {
            self.emit(RefreshEvent::Loading);
        } else if self.outcome.is_some() {
            self.replay();
            self.arm_auto_refresh();
        } else {
            self.start_load();
        }
    }

    fn on_pause(&mut self) {
        self.active = false;
        self.cancel_timers();
    }

    fn start_load(&mut self) {
        self.cancel_auto_refresh();
        if let Some(task) = self.in_flight.take() {
            // Dropping the load future closes its connection; if it already
            // finished, the generation check discards the result.
            task.abort();
            debug!("cancelled in-flight load");
        }

        self.generation += 1;
        let generation = self.generation;
        self.set_state(RefreshState::Loading);
        self.emit(RefreshEvent::Loading);

        let load = (self.loader)();
        let commands = self.commands.clone();
        self.in_flight = Some(tokio::spawn(async move {
            let result = load.await;
            if let Some(commands) = commands.upgrade() {
                let _ = commands.send(Command::Completed { generation, result });
            }
        }));
    }

    /// Re-arm the automatic refresh for `period` after the last load.
    fn arm_auto_refresh(&mut self) {
        self.cancel_auto_refresh();
        if !self.auto_refresh || !self.active || self.in_flight.is_some() {
            return;
        }

        let since = self.last_completed.map(|t| t.elapsed());
        let delay = auto_refresh_delay(since, self.config.auto_refresh_period);
        let seq = self.auto_seq;
        let commands = self.commands.clone();

        self.auto_timer = Some(tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            if let Some(commands) = commands.upgrade() {
                let _ = commands.send(Command::AutoRefreshDue { seq });
            }
        }));
    }

    fn cancel_auto_refresh(&mut self) {
        self.auto_seq += 1;
        if let Some(timer) = self.auto_timer.take() {
            timer.abort();
        }
    }

    fn start_label_timer(&mut self) {
        if let Some(timer) = self.label_timer.take() {
            timer.abort();
        }

        let period = self.config.last_updated_period;
        let commands = self.commands.clone();
        self.label_timer = Some(tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            loop {
                interval.tick().await;
                let Some(commands) = commands.upgrade() else {
                    break;
                };
                if commands.send(Command::UpdateLabel).is_err() {
                    break;
                }
            }
        }));
    }

    fn cancel_timers(&mut self) {
        self.cancel_auto_refresh();
        if let Some(timer) = self.label_timer.take() {
            timer.abort();
        }
    }

    fn replay(&self) {
        match &self.outcome {
            Some(Outcome::Loaded { data, loaded_at }) => self.emit(RefreshEvent::Loaded {
                data: data.clone(),
                loaded_at: *loaded_at,
            }),
            Some(Outcome::Failed(kind)) => self.emit(RefreshEvent::Failed {
                kind: *kind,
                message: kind.user_message(),
            }),
            None => {}
        }
        self.emit_label();
    }

    fn emit_label(&self) {
        let since = self.last_completed.map(|t| t.elapsed());
        self.emit(RefreshEvent::LastUpdated(last_updated_label(since)));
    }

    fn emit(&self, event: RefreshEvent<T>) {
        if self.active {
            let _ = self.events.send(event);
        }
    }

    fn set_state(&self, state: RefreshState) {
        self.state.send_replace(state);
    }
}

/// Loader for a departure board screen.
pub fn departures_loader(
    endpoint: TrackerEndpoint,
    stop_codes: BTreeSet<StopCode>,
    num_departures: u8,
) -> Loader<DepartureBoard> {
    let stop_codes = Arc::new(stop_codes);
    Arc::new(move || {
        let endpoint = endpoint.clone();
        let stop_codes = stop_codes.clone();
        async move { endpoint.get_departures(&stop_codes, num_departures).await }.boxed()
    })
}

/// Loader for a journey timeline screen.
pub fn journey_loader(
    endpoint: TrackerEndpoint,
    stop_code: StopCode,
    journey_id: String,
) -> Loader<JourneyTimeline> {
    Arc::new(move || {
        let endpoint = endpoint.clone();
        let stop_code = stop_code.clone();
        let journey_id = journey_id.clone();
        async move { endpoint.get_journey(&stop_code, &journey_id).await }.boxed()
    })
}

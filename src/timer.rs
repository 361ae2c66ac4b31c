// Copyright (c) 2025 Robert August Vincent II <pillarsdotnet@gmail.com>
// Co-author: Cursor-AI.

//! The single active timer and the selected client.
//!
//! ## States
//!
//! - `Idle`
//! - `Running { client, start }`
//!
//! A record is produced only on the Running → Idle transition, for the client that was
//! active when the timer started. The display ticker runs only while `Running`.

use crate::error::{Result, TrackerError};
use crate::prompt::Prompter;
use crate::record::{truncate_to_second, SessionRecord};
use crate::store::RecordSink;
use chrono::{Local, NaiveDateTime, TimeDelta};
use std::sync::mpsc::{self, RecvTimeoutError};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tracing::{debug, warn};

/// Display refresh period while the timer runs.
pub const TICK_PERIOD: Duration = Duration::from_secs(1);

/// Source of wall-clock time (local, no zone). Cloned into the display ticker.
pub trait Clock: Clone + Send + 'static {
    fn now(&self) -> NaiveDateTime;
}

/// Whole seconds from `start` to `now`, never negative.
fn elapsed_between(start: NaiveDateTime, now: NaiveDateTime) -> TimeDelta {
    TimeDelta::seconds((now - start).num_seconds().max(0))
}

#[derive(Clone, Copy, Debug, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> NaiveDateTime {
        Local::now().naive_local()
    }
}

/// Clock that only moves when told to. Clones share the same time.
#[cfg(test)]
#[derive(Clone, Debug)]
pub struct ManualClock(Arc<std::sync::Mutex<NaiveDateTime>>);

#[cfg(test)]
impl ManualClock {
    pub fn new(at: NaiveDateTime) -> Self {
        Self(Arc::new(std::sync::Mutex::new(at)))
    }

    pub fn advance(&self, d: TimeDelta) {
        let mut now = self.0.lock().unwrap();
        *now = *now + d;
    }
}

#[cfg(test)]
impl Clock for ManualClock {
    fn now(&self) -> NaiveDateTime {
        *self.0.lock().unwrap()
    }
}

/// Called with the elapsed time on every tick.
pub type TickFn = Arc<dyn Fn(TimeDelta) + Send + Sync>;

/// Background thread invoking a callback every `period` until cancelled, with the time
/// elapsed since `start` as read from `clock` (the same reading as [`TimerController::elapsed`]).
/// Cancelling (or dropping) disconnects its channel and joins the thread, so no tick fires afterwards.
pub struct Ticker {
    cancel: Option<mpsc::Sender<()>>,
    handle: Option<JoinHandle<()>>,
}

impl Ticker {
    pub fn spawn<C: Clock>(period: Duration, clock: C, start: NaiveDateTime, on_tick: TickFn) -> Self {
        let (tx, rx) = mpsc::channel::<()>();
        let handle = thread::spawn(move || loop {
            match rx.recv_timeout(period) {
                Err(RecvTimeoutError::Timeout) => on_tick(elapsed_between(start, clock.now())),
                Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
            }
        });
        Self {
            cancel: Some(tx),
            handle: Some(handle),
        }
    }

    pub fn cancel(mut self) {
        self.shutdown();
    }

    fn shutdown(&mut self) {
        drop(self.cancel.take());
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

impl Drop for Ticker {
    fn drop(&mut self) {
        self.shutdown();
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TimerState {
    Idle,
    Running { client: String, start: NaiveDateTime },
}

/// Result of [`TimerController::select_client`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Selection {
    /// The new client is selected; `stopped` holds the session closed to allow the switch.
    Switched { stopped: Option<SessionRecord> },
    /// The user declined to stop the running timer; the previous selection stands.
    Kept,
}

pub struct TimerController<C: Clock = SystemClock> {
    clock: C,
    state: TimerState,
    selected: Option<String>,
    on_tick: Option<TickFn>,
    ticker: Option<Ticker>,
}

impl TimerController<SystemClock> {
    pub fn new() -> Self {
        Self::with_clock(SystemClock)
    }
}

impl Default for TimerController<SystemClock> {
    fn default() -> Self {
        Self::new()
    }
}

impl<C: Clock> TimerController<C> {
    pub fn with_clock(clock: C) -> Self {
        Self {
            clock,
            state: TimerState::Idle,
            selected: None,
            on_tick: None,
            ticker: None,
        }
    }

    /// Installs a display callback, run every [`TICK_PERIOD`] while the timer is running.
    pub fn on_tick(mut self, f: TickFn) -> Self {
        self.on_tick = Some(f);
        self
    }

    pub fn state(&self) -> &TimerState {
        &self.state
    }

    pub fn is_running(&self) -> bool {
        matches!(self.state, TimerState::Running { .. })
    }

    #[cfg(test)]
    pub fn is_ticking(&self) -> bool {
        self.ticker.is_some()
    }

    pub fn selected(&self) -> Option<&str> {
        self.selected.as_deref()
    }

    /// Client the running timer belongs to.
    pub fn active_client(&self) -> Option<&str> {
        match &self.state {
            TimerState::Running { client, .. } => Some(client),
            TimerState::Idle => None,
        }
    }

    /// Selects `client`. The caller checks that the client exists.
    ///
    /// While a timer runs (for any client, the selected one included), `prompter` is asked
    /// whether to stop it. Declining keeps the current selection. If stopping fails the timer is idle, the
    /// selection is unchanged, and the error is returned.
    pub fn select_client(
        &mut self,
        client: &str,
        prompter: &mut dyn Prompter,
        sink: &mut dyn RecordSink,
    ) -> Result<Selection> {
        let mut stopped = None;
        if let TimerState::Running { client: active, .. } = &self.state {
            if !prompter.confirm(
                "Switch Client",
                "A timer is running. Stop current timer and switch to selected client?",
            ) {
                debug!(kept = %active, requested = client, "switch declined");
                return Ok(Selection::Kept);
            }
            stopped = Some(self.stop(sink)?);
        }
        self.selected = Some(client.to_string());
        debug!(client, "selected client");
        Ok(Selection::Switched { stopped })
    }

    /// Clears the selection if it names `client` (e.g. after the client was removed).
    pub fn forget_client(&mut self, client: &str) -> bool {
        if self.selected.as_deref() == Some(client) {
            self.selected = None;
            true
        } else {
            false
        }
    }

    /// Starts timing `client` (which also becomes the selection). Returns the captured start time.
    pub fn start(&mut self, client: Option<&str>) -> Result<NaiveDateTime> {
        if let TimerState::Running { client: active, .. } = &self.state {
            return Err(TrackerError::AlreadyRunning(active.clone()));
        }
        let client = client.ok_or(TrackerError::NoClientSelected)?.to_string();
        let start = truncate_to_second(self.clock.now());
        debug!(client = %client, start = %start, "timer started");
        self.selected = Some(client.clone());
        self.state = TimerState::Running { client, start };
        if let Some(f) = &self.on_tick {
            self.ticker = Some(Ticker::spawn(TICK_PERIOD, self.clock.clone(), start, Arc::clone(f)));
        }
        Ok(start)
    }

    /// Starts timing the selected client.
    pub fn start_selected(&mut self) -> Result<NaiveDateTime> {
        let selected = self.selected.clone();
        self.start(selected.as_deref())
    }

    /// Stops the timer and hands the finished session to `sink`.
    /// The controller is `Idle` afterwards even if the sink fails.
    pub fn stop(&mut self, sink: &mut dyn RecordSink) -> Result<SessionRecord> {
        let TimerState::Running { client, start } = std::mem::replace(&mut self.state, TimerState::Idle) else {
            return Err(TrackerError::NotRunning);
        };
        if let Some(ticker) = self.ticker.take() {
            ticker.cancel();
        }
        let record = SessionRecord::new(start, self.clock.now());
        debug!(client = %client, duration = %record.duration_text(), "timer stopped");
        if let Err(e) = sink.append_record(&client, record.clone()) {
            warn!(client = %client, error = %e, "could not record session");
            return Err(e);
        }
        Ok(record)
    }

    /// Starts when idle (with the selected client), stops when running.
    /// Returns the finished session when this call stopped the timer.
    pub fn toggle(&mut self, sink: &mut dyn RecordSink) -> Result<Option<SessionRecord>> {
        if self.is_running() {
            self.stop(sink).map(Some)
        } else {
            self.start_selected().map(|_| None)
        }
    }

    /// Elapsed time of the running timer in whole seconds; `None` while idle.
    pub fn elapsed(&self) -> Option<TimeDelta> {
        match &self.state {
            TimerState::Running { start, .. } => Some(elapsed_between(*start, self.clock.now())),
            TimerState::Idle => None,
        }
    }

    /// Shutdown guard: closing is refused while the timer runs.
    pub fn request_close(&self) -> Result<()> {
        if self.is_running() {
            return Err(TrackerError::TimerRunning);
        }
        Ok(())
    }
}

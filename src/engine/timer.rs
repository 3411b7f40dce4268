//! Shared countdown coordination.
//!
//! The session owner runs the authoritative countdown locally and publishes
//! every tick so it can be mirrored into the shared document. Followers
//! never publish: they project the owner's last write, compensating for
//! propagation delay, and run a display-only countdown in between writes.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::model::{TimerState, now_millis};

/// One countdown reading delivered to displays and the mirror callback.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimerUpdate {
    /// Seconds left on the countdown.
    pub remaining_secs: u32,
    /// Whether the countdown is still ticking.
    pub running: bool,
}

/// Owner-authoritative timer events handed to the publish callback.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimerEvent {
    /// A tick (or control action) changed the countdown state.
    Update(TimerUpdate),
    /// The countdown reached zero. Fired exactly once per countdown.
    Expired,
}

struct Countdown {
    remaining: u32,
    task: Option<JoinHandle<()>>,
}

/// Drives the retrospective countdown for one participant.
///
/// `start`, `pause`, and `stop` are the owner-authoritative controls; the
/// caller is responsible for gating them to the session owner.
/// `sync_from_remote` is the follower path and never reaches the publish
/// callback.
pub struct TimerCoordinator {
    publish: Arc<dyn Fn(TimerEvent) + Send + Sync>,
    display: Arc<watch::Sender<TimerUpdate>>,
    countdown: Arc<Mutex<Countdown>>,
}

impl TimerCoordinator {
    /// Create a coordinator publishing authoritative events to `publish`.
    pub fn new(publish: impl Fn(TimerEvent) + Send + Sync + 'static) -> Self {
        let (display, _) = watch::channel(TimerUpdate {
            remaining_secs: 0,
            running: false,
        });
        Self {
            publish: Arc::new(publish),
            display: Arc::new(display),
            countdown: Arc::new(Mutex::new(Countdown {
                remaining: 0,
                task: None,
            })),
        }
    }

    /// Observe every local countdown reading, owner-driven or follower-projected.
    pub fn display_watcher(&self) -> watch::Receiver<TimerUpdate> {
        self.display.subscribe()
    }

    /// Seconds currently left on the local countdown.
    pub fn remaining_secs(&self) -> u32 {
        self.lock().remaining
    }

    /// Whether a countdown task is ticking.
    pub fn is_running(&self) -> bool {
        self.lock().task.as_ref().is_some_and(|task| !task.is_finished())
    }

    /// Start (or restart) the authoritative countdown at `minutes` minutes.
    ///
    /// The initial reading is reported immediately so followers observe the
    /// start without waiting for the first tick.
    pub fn start(&self, minutes: u32) {
        let update = {
            let mut countdown = self.lock();
            if let Some(task) = countdown.task.take() {
                task.abort();
            }
            countdown.remaining = minutes.saturating_mul(60);
            TimerUpdate {
                remaining_secs: countdown.remaining,
                running: true,
            }
        };
        (self.publish)(TimerEvent::Update(update));
        self.display.send_replace(update);
        self.lock().task = Some(self.spawn_ticks(true));
    }

    /// Halt the countdown without resetting the remaining time.
    ///
    /// Returns `false` when no countdown was running.
    pub fn pause(&self) -> bool {
        let update = {
            let mut countdown = self.lock();
            let Some(task) = countdown.task.take() else {
                return false;
            };
            task.abort();
            TimerUpdate {
                remaining_secs: countdown.remaining,
                running: false,
            }
        };
        (self.publish)(TimerEvent::Update(update));
        self.display.send_replace(update);
        true
    }

    /// Halt the countdown and reset the remaining time.
    pub fn stop(&self) {
        {
            let mut countdown = self.lock();
            if let Some(task) = countdown.task.take() {
                task.abort();
            }
            countdown.remaining = 0;
        }
        let update = TimerUpdate {
            remaining_secs: 0,
            running: false,
        };
        (self.publish)(TimerEvent::Update(update));
        self.display.send_replace(update);
    }

    /// Follower path: adopt the owner's last timer write.
    ///
    /// The remaining time is compensated for propagation delay; when the
    /// owner's countdown is still running, a display-only local countdown
    /// keeps the reading moving between writes. Nothing is published.
    pub fn sync_from_remote(&self, remote: TimerState) {
        let projected = project(&remote, now_millis());
        let update = {
            let mut countdown = self.lock();
            if let Some(task) = countdown.task.take() {
                task.abort();
            }
            countdown.remaining = projected.time_remaining;
            TimerUpdate {
                remaining_secs: projected.time_remaining,
                running: projected.is_running && projected.time_remaining > 0,
            }
        };
        self.display.send_replace(update);
        if update.running {
            self.lock().task = Some(self.spawn_ticks(false));
        }
    }

    /// Abort any countdown task without reporting. Used during cleanup.
    pub(crate) fn halt(&self) {
        let mut countdown = self.lock();
        if let Some(task) = countdown.task.take() {
            task.abort();
        }
        countdown.remaining = 0;
    }

    fn spawn_ticks(&self, authoritative: bool) -> JoinHandle<()> {
        let publish = self.publish.clone();
        let display = self.display.clone();
        let countdown = self.countdown.clone();
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(Duration::from_secs(1));
            // The interval fires immediately; the initial reading was
            // already reported by the caller.
            interval.tick().await;
            loop {
                interval.tick().await;
                let update = {
                    let mut guard = countdown.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
                    guard.remaining = guard.remaining.saturating_sub(1);
                    TimerUpdate {
                        remaining_secs: guard.remaining,
                        running: guard.remaining > 0,
                    }
                };
                if authoritative {
                    publish(TimerEvent::Update(update));
                }
                display.send_replace(update);
                if update.remaining_secs == 0 {
                    if authoritative {
                        publish(TimerEvent::Expired);
                    }
                    countdown
                        .lock()
                        .unwrap_or_else(|poisoned| poisoned.into_inner())
                        .task = None;
                    break;
                }
            }
        })
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Countdown> {
        self.countdown.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// Project a remotely written timer state onto the local clock.
///
/// Compensates for propagation delay by subtracting the whole seconds
/// elapsed since the owner's write, clamped at zero. A countdown whose
/// compensated remaining time is zero is reported as no longer running.
pub fn project(state: &TimerState, now_millis: u64) -> TimerState {
    if !state.is_running {
        return *state;
    }
    let elapsed_secs = now_millis.saturating_sub(state.last_update) / 1000;
    let elapsed_secs = u32::try_from(elapsed_secs).unwrap_or(u32::MAX);
    let remaining = state.time_remaining.saturating_sub(elapsed_secs);
    TimerState {
        time_remaining: remaining,
        is_running: remaining > 0,
        last_update: state.last_update,
    }
}

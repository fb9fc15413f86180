//! Geofencing coordinator
//!
//! Ties the tracker, the scorer and the audio queue together. A ticker task
//! fires every sample interval and whenever a new fix arrives; each firing
//! runs [`GeofenceCoordinator::tick`], the only place coordinator state
//! changes during a session:
//!
//! 1. read the tracker's last known location, unless tracking has halted
//! 2. skip if a check is already running or the last check was too recent
//! 3. fetch nearby memories (bounded by the fetch timeout)
//! 4. rank them and offer them to the queue until one is accepted
//! 5. report the accepted play in the background
//!
//! Errors never escape a tick; the next tick starts from a clean slate. A
//! permanent location error ends the ticker until [`GeofenceCoordinator::restart`].

use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::time::Duration;

use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::config::GeofenceConfig;
use crate::error::{HarkError, Result};
use crate::geofence::source::{MemorySource, PlayEvent, PlayRecorder};
use crate::location::{LocationError, LocationTracker, TrackerState};
use crate::memory::{LocationSample, MemoryScorer, Viewer};
use crate::playback::AudioQueue;

/// Coordinator lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CoordinatorState {
    Idle,
    Tracking,
    /// A nearby-memory check is awaiting its fetch
    Checking,
    /// Location tracking halted on a permanent error; needs `restart`
    Error,
}

/// Result of a single tick
#[derive(Debug, Clone, PartialEq)]
pub enum TickOutcome {
    /// No position fix yet
    NoLocation,
    /// Location tracking halted on a permanent error
    TrackingHalted,
    /// Host app is backgrounded and background tracking is off
    Suspended,
    /// Another check is still running
    InProgress,
    /// The last successful check is younger than the sample interval
    Throttled,
    /// The memory fetch failed or timed out
    FetchFailed,
    /// `stop` or `restart` was called while the fetch was in flight
    Cancelled,
    /// Candidates were fetched and offered to the queue
    Checked {
        candidates: usize,
        accepted: Option<Uuid>,
    },
}

struct CoordinatorInner {
    config: GeofenceConfig,
    viewer: Viewer,
    running: bool,
    backgrounded: bool,
    checking: bool,
    /// Identifies the running check so an abandoned one cannot clear a newer flag
    check_id: u64,
    last_check: Option<Instant>,
    ticker: Option<JoinHandle<()>>,
}

struct Shared {
    tracker: LocationTracker,
    queue: AudioQueue,
    scorer: MemoryScorer,
    source: Arc<dyn MemorySource>,
    recorder: Option<Arc<dyn PlayRecorder>>,
    wake: Arc<Notify>,
    inner: Mutex<CoordinatorInner>,
}

/// Handle to the geofencing coordinator; clones share state
#[derive(Clone)]
pub struct GeofenceCoordinator {
    shared: Arc<Shared>,
}

impl std::fmt::Debug for GeofenceCoordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GeofenceCoordinator")
            .field("source", &self.shared.source.name())
            .field("state", &self.state())
            .finish()
    }
}

/// Clears the check-in-progress flag when a tick ends, including when the
/// tick is cancelled mid-fetch.
struct CheckGuard {
    shared: Weak<Shared>,
    check_id: u64,
    completed_at: Option<Instant>,
}

impl CheckGuard {
    fn succeed(mut self, started: Instant) {
        self.completed_at = Some(started);
    }
}

impl Drop for CheckGuard {
    fn drop(&mut self) {
        let Some(shared) = self.shared.upgrade() else {
            return;
        };
        let mut inner = shared.inner.lock().unwrap_or_else(PoisonError::into_inner);
        if inner.check_id != self.check_id {
            return;
        }
        inner.checking = false;
        if let Some(started) = self.completed_at {
            inner.last_check = Some(started);
        }
    }
}

impl GeofenceCoordinator {
    pub fn new(
        tracker: LocationTracker,
        queue: AudioQueue,
        scorer: MemoryScorer,
        source: Arc<dyn MemorySource>,
        recorder: Option<Arc<dyn PlayRecorder>>,
        config: GeofenceConfig,
    ) -> Self {
        Self {
            shared: Arc::new(Shared {
                tracker,
                queue,
                scorer,
                source,
                recorder,
                wake: Arc::new(Notify::new()),
                inner: Mutex::new(CoordinatorInner {
                    config,
                    viewer: Viewer::anonymous(),
                    running: false,
                    backgrounded: false,
                    checking: false,
                    check_id: 0,
                    last_check: None,
                    ticker: None,
                }),
            }),
        }
    }

    pub fn tracker(&self) -> &LocationTracker {
        &self.shared.tracker
    }

    pub fn queue(&self) -> &AudioQueue {
        &self.shared.queue
    }

    pub fn config(&self) -> GeofenceConfig {
        self.lock().config.clone()
    }

    /// Identify the listener; affects privacy filtering, boosts and play events
    pub fn set_viewer(&self, viewer: Viewer) {
        self.lock().viewer = viewer;
    }

    pub fn viewer(&self) -> Viewer {
        self.lock().viewer.clone()
    }

    /// Start location tracking and the ticker. Calling `start` while running
    /// is a no-op.
    pub fn start(&self) -> Result<()> {
        let mut inner = self.lock();
        if inner.running {
            return Ok(());
        }

        self.begin_tracking(false)?;

        let interval = inner.config.sample_interval();
        inner.ticker = Some(self.spawn_ticker(interval)?);
        inner.running = true;
        info!(
            "Geofencing started (every {:?}, radius {}m, source {})",
            interval,
            inner.config.max_radius_m,
            self.shared.source.name()
        );
        Ok(())
    }

    /// Stop the ticker and location tracking. Safe to call at any time,
    /// including mid-fetch; leaves no timer or watch behind.
    pub fn stop(&self) {
        let mut inner = self.lock();
        let ticker = inner.ticker.take();
        inner.check_id += 1;
        inner.checking = false;
        let was_running = std::mem::replace(&mut inner.running, false);
        drop(inner);

        if let Some(ticker) = ticker {
            ticker.abort();
        }
        self.shared.tracker.stop();
        if was_running {
            info!("Geofencing stopped");
        }
    }

    /// Leave the error state: restart location tracking and the ticker.
    ///
    /// Works from any state; a running coordinator resumes with a fresh
    /// watch and ticker.
    pub fn restart(&self) -> Result<()> {
        let mut inner = self.lock();
        self.begin_tracking(true)?;

        let interval = inner.config.sample_interval();
        let previous = inner.ticker.replace(self.spawn_ticker(interval)?);
        inner.check_id += 1;
        inner.checking = false;
        inner.running = true;
        drop(inner);

        if let Some(ticker) = previous {
            ticker.abort();
        }
        info!("Geofencing restarted");
        Ok(())
    }

    /// Replace the geofence configuration, restarting the ticker if running
    pub fn reconfigure(&self, config: GeofenceConfig) -> Result<()> {
        let mut inner = self.lock();
        inner.config = config;
        if !inner.running {
            return Ok(());
        }
        let interval = inner.config.sample_interval();
        let previous = inner.ticker.replace(self.spawn_ticker(interval)?);
        drop(inner);

        if let Some(ticker) = previous {
            ticker.abort();
        }
        debug!("Geofencing reconfigured (every {interval:?})");
        Ok(())
    }

    /// Tell the coordinator whether the host app is in the background.
    ///
    /// Checks are suspended while backgrounded unless background tracking is
    /// enabled.
    pub fn set_backgrounded(&self, backgrounded: bool) {
        let mut inner = self.lock();
        if inner.backgrounded != backgrounded {
            debug!("Host app backgrounded: {backgrounded}");
        }
        inner.backgrounded = backgrounded;
        if !backgrounded {
            self.shared.wake.notify_one();
        }
    }

    pub fn state(&self) -> CoordinatorState {
        let halted = self.shared.tracker.state() == TrackerState::Error;
        let inner = self.lock();
        if !inner.running {
            CoordinatorState::Idle
        } else if halted {
            CoordinatorState::Error
        } else if inner.checking {
            CoordinatorState::Checking
        } else {
            CoordinatorState::Tracking
        }
    }

    pub fn is_running(&self) -> bool {
        self.lock().running
    }

    /// Whether a ticker task is alive
    pub fn has_active_ticker(&self) -> bool {
        self.lock()
            .ticker
            .as_ref()
            .is_some_and(|task| !task.is_finished())
    }

    /// Run one nearby-memory check
    pub async fn tick(&self) -> TickOutcome {
        if self.shared.tracker.state() == TrackerState::Error {
            return TickOutcome::TrackingHalted;
        }
        let Some(location) = self.shared.tracker.last_location() else {
            return TickOutcome::NoLocation;
        };

        let started = Instant::now();
        let (config, viewer, guard) = {
            let mut inner = self.lock();
            if inner.backgrounded && !inner.config.background_tracking {
                return TickOutcome::Suspended;
            }
            if inner.checking {
                return TickOutcome::InProgress;
            }
            let interval = inner.config.sample_interval();
            if inner
                .last_check
                .is_some_and(|last| started.duration_since(last) < interval)
            {
                return TickOutcome::Throttled;
            }
            inner.checking = true;
            inner.check_id += 1;
            let guard = CheckGuard {
                shared: Arc::downgrade(&self.shared),
                check_id: inner.check_id,
                completed_at: None,
            };
            (inner.config.clone(), inner.viewer.clone(), guard)
        };

        let candidates = match self.fetch(&location, &config).await {
            Ok(candidates) => candidates,
            Err(e) => {
                warn!("Nearby memory check failed: {e}");
                return TickOutcome::FetchFailed;
            }
        };
        if self.lock().check_id != guard.check_id {
            debug!("Check abandoned after stop or restart");
            return TickOutcome::Cancelled;
        }

        let ranked = self
            .shared
            .scorer
            .rank(&candidates, &location, Some(&viewer));
        let mut accepted = None;
        for scored in ranked {
            let id = scored.memory.id;
            let outcome = self.shared.queue.add_memory(
                scored.memory,
                location,
                scored.is_owner,
                scored.is_friend,
                false,
            );
            if outcome.is_accepted() {
                debug!("Accepted memory {id} at {:.1}m", scored.distance_m);
                accepted = Some(id);
                break;
            }
            debug!("Memory {id} not accepted: {outcome:?}");
        }

        if let Some(memory_id) = accepted {
            self.record_play(PlayEvent::new(memory_id, viewer.user_id, &location));
        }

        guard.succeed(started);
        TickOutcome::Checked {
            candidates: candidates.len(),
            accepted,
        }
    }

    /// Start (or restart) the tracker with callbacks that wake the ticker
    fn begin_tracking(&self, restart: bool) -> std::result::Result<(), LocationError> {
        let on_update = {
            let wake = self.shared.wake.clone();
            move |_sample: &LocationSample| wake.notify_one()
        };
        let on_error = {
            let wake = self.shared.wake.clone();
            move |error: &LocationError| {
                if error.is_permanent() {
                    warn!("Location tracking lost, geofencing paused: {error}");
                    wake.notify_one();
                } else {
                    debug!("Location error: {error}");
                }
            }
        };

        if restart {
            self.shared.tracker.restart(on_update, on_error)
        } else {
            self.shared.tracker.start(on_update, on_error)
        }
    }

    fn lock(&self) -> MutexGuard<'_, CoordinatorInner> {
        self.shared
            .inner
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    async fn fetch(
        &self,
        location: &LocationSample,
        config: &GeofenceConfig,
    ) -> Result<Vec<crate::memory::Memory>> {
        let fetch =
            self.shared
                .source
                .fetch_near(location.latitude, location.longitude, config.max_radius_m);

        let timeout = config.fetch_timeout();
        if timeout.is_zero() {
            return fetch.await;
        }
        tokio::time::timeout(timeout, fetch).await.map_err(|_| {
            HarkError::Fetch(format!(
                "{} did not respond within {timeout:?}",
                self.shared.source.name()
            ))
        })?
    }

    fn record_play(&self, event: PlayEvent) {
        let Some(recorder) = self.shared.recorder.clone() else {
            return;
        };
        tokio::spawn(async move {
            if let Err(e) = recorder.record_play(&event).await {
                warn!("Failed to record play of {}: {e}", event.memory_id);
            }
        });
    }

    fn spawn_ticker(&self, interval: Duration) -> Result<JoinHandle<()>> {
        let runtime = tokio::runtime::Handle::try_current()
            .map_err(|_| HarkError::General("no async runtime available".to_string()))?;
        let shared = Arc::downgrade(&self.shared);
        let wake = self.shared.wake.clone();

        Ok(runtime.spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    _ = ticker.tick() => {}
                    _ = wake.notified() => {}
                }
                let Some(shared) = shared.upgrade() else {
                    return;
                };
                let outcome = GeofenceCoordinator { shared }.tick().await;
                debug!("Tick: {outcome:?}");
                if outcome == TickOutcome::TrackingHalted {
                    debug!("Ticker exiting until restart");
                    return;
                }
            }
        }))
    }
}

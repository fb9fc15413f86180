//! Continuous location tracking
//!
//! Wraps a PositionSource watch and keeps the last known position and the
//! last error available at all times. Permission denial is terminal: the
//! watch is cleared, the error is surfaced once, and tracking resumes only
//! through [`LocationTracker::restart`]. Timeouts and unavailable fixes are
//! transient and leave the watch running.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::location::source::{
    LocationError, PositionReceiver, PositionSource, PositionUpdate, WatchId, WatchOptions,
};
use crate::memory::types::LocationSample;

/// Tracker lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrackerState {
    Idle,
    Tracking,
    /// Halted after a permanent error; only `restart` leaves this state
    Error,
}

struct TrackerInner {
    state: TrackerState,
    last_location: Option<(LocationSample, Instant)>,
    last_error: Option<LocationError>,
    watch: Option<WatchId>,
    task: Option<JoinHandle<()>>,
    /// Bumped on every start/stop so a stale sampling task cannot write
    session: u64,
}

struct Shared {
    source: Arc<dyn PositionSource>,
    options: WatchOptions,
    inner: Mutex<TrackerInner>,
}

impl Drop for Shared {
    fn drop(&mut self) {
        let inner = self.inner.get_mut().unwrap_or_else(PoisonError::into_inner);
        if let Some(task) = inner.task.take() {
            task.abort();
        }
        if let Some(id) = inner.watch.take() {
            debug!("Clearing watch {id:?} of dropped tracker");
            self.source.clear_watch(id);
        }
    }
}

/// Handle to a location tracker; clones share state
#[derive(Clone)]
pub struct LocationTracker {
    shared: Arc<Shared>,
}

impl std::fmt::Debug for LocationTracker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let inner = self.lock();
        f.debug_struct("LocationTracker")
            .field("source", &self.shared.source.name())
            .field("state", &inner.state)
            .field("watch", &inner.watch)
            .finish()
    }
}

impl LocationTracker {
    pub fn new(source: Arc<dyn PositionSource>, options: WatchOptions) -> Self {
        Self {
            shared: Arc::new(Shared {
                source,
                options,
                inner: Mutex::new(TrackerInner {
                    state: TrackerState::Idle,
                    last_location: None,
                    last_error: None,
                    watch: None,
                    task: None,
                    session: 0,
                }),
            }),
        }
    }

    pub fn options(&self) -> WatchOptions {
        self.shared.options
    }

    /// Begin continuous sampling.
    ///
    /// `on_update` runs for every fix, `on_error` for every reported error;
    /// a permanent error is reported once and ends the watch. Calling
    /// `start` while tracking is a no-op; calling it after a permanent error
    /// returns [`LocationError::RestartRequired`].
    pub fn start<U, E>(&self, on_update: U, on_error: E) -> Result<(), LocationError>
    where
        U: Fn(&LocationSample) + Send + 'static,
        E: Fn(&LocationError) + Send + 'static,
    {
        let mut inner = self.lock();
        match inner.state {
            TrackerState::Tracking => return Ok(()),
            TrackerState::Error => return Err(LocationError::RestartRequired),
            TrackerState::Idle => {}
        }

        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            return Err(LocationError::PositionUnavailable(
                "no async runtime available".to_string(),
            ));
        };

        let (watch_id, receiver) = match self.shared.source.watch_position(self.shared.options) {
            Ok(watch) => watch,
            Err(e) => {
                warn!("{} refused position watch: {e}", self.shared.source.name());
                inner.last_error = Some(e.clone());
                if e.is_permanent() {
                    inner.state = TrackerState::Error;
                }
                drop(inner);
                on_error(&e);
                return Err(e);
            }
        };

        inner.session += 1;
        let session = inner.session;
        inner.watch = Some(watch_id);
        inner.state = TrackerState::Tracking;

        let shared = Arc::downgrade(&self.shared);
        let timeout = self.shared.options.timeout;
        inner.task = Some(runtime.spawn(sample_loop(
            shared, session, timeout, receiver, on_update, on_error,
        )));

        info!(
            "Location tracking started on {} (watch {:?})",
            self.shared.source.name(),
            watch_id
        );
        Ok(())
    }

    /// End sampling, clearing the watch and the sampling task.
    ///
    /// Safe to call at any time. The error state survives `stop`.
    pub fn stop(&self) {
        let mut inner = self.lock();
        self.teardown(&mut inner);
        if inner.state == TrackerState::Tracking {
            inner.state = TrackerState::Idle;
            info!("Location tracking stopped");
        }
    }

    /// Leave the error state and start again
    pub fn restart<U, E>(&self, on_update: U, on_error: E) -> Result<(), LocationError>
    where
        U: Fn(&LocationSample) + Send + 'static,
        E: Fn(&LocationError) + Send + 'static,
    {
        {
            let mut inner = self.lock();
            self.teardown(&mut inner);
            inner.state = TrackerState::Idle;
            inner.last_error = None;
        }
        debug!("Restarting location tracking");
        self.start(on_update, on_error)
    }

    pub fn state(&self) -> TrackerState {
        self.lock().state
    }

    pub fn is_tracking(&self) -> bool {
        self.state() == TrackerState::Tracking
    }

    /// Last known position, however old
    pub fn last_location(&self) -> Option<LocationSample> {
        self.lock().last_location.map(|(sample, _)| sample)
    }

    /// Last known position if it is within the configured maximum age
    pub fn fresh_location(&self) -> Option<LocationSample> {
        let max_age = self.shared.options.maximum_age;
        self.lock()
            .last_location
            .filter(|(_, received)| received.elapsed() <= max_age)
            .map(|(sample, _)| sample)
    }

    pub fn last_error(&self) -> Option<LocationError> {
        self.lock().last_error.clone()
    }

    /// Id of the active platform watch, if any
    pub fn active_watch(&self) -> Option<WatchId> {
        self.lock().watch
    }

    fn lock(&self) -> MutexGuard<'_, TrackerInner> {
        self.shared
            .inner
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    fn teardown(&self, inner: &mut TrackerInner) {
        inner.session += 1;
        if let Some(task) = inner.task.take() {
            task.abort();
        }
        if let Some(id) = inner.watch.take() {
            self.shared.source.clear_watch(id);
        }
    }

    fn record_sample(&self, session: u64, sample: LocationSample) -> bool {
        let mut inner = self.lock();
        if inner.session != session {
            return false;
        }
        inner.last_location = Some((sample, Instant::now()));
        inner.last_error = None;
        true
    }

    /// Store an error; permanent errors halt tracking. Returns false when the
    /// session is stale.
    fn record_error(&self, session: u64, error: &LocationError) -> bool {
        if error.is_permanent() {
            return self.halt(session, error);
        }
        let mut inner = self.lock();
        if inner.session != session {
            return false;
        }
        debug!("Transient location error: {error}");
        inner.last_error = Some(error.clone());
        true
    }

    fn halt(&self, session: u64, error: &LocationError) -> bool {
        let mut inner = self.lock();
        if inner.session != session {
            return false;
        }
        warn!("Location tracking halted: {error}");
        inner.last_error = Some(error.clone());
        inner.state = TrackerState::Error;
        inner.session += 1;
        // Runs inside the sampling task; dropping the handle detaches it
        inner.task = None;
        if let Some(id) = inner.watch.take() {
            self.shared.source.clear_watch(id);
        }
        true
    }
}

/// Feed watch updates into the tracker until the watch ends, the session
/// goes stale, or every tracker handle is dropped.
async fn sample_loop<U, E>(
    shared: Weak<Shared>,
    session: u64,
    timeout: Duration,
    mut receiver: PositionReceiver,
    on_update: U,
    on_error: E,
) where
    U: Fn(&LocationSample),
    E: Fn(&LocationError),
{
    loop {
        let update: Option<Option<PositionUpdate>> = if timeout.is_zero() {
            Some(receiver.recv().await)
        } else {
            tokio::time::timeout(timeout, receiver.recv()).await.ok()
        };

        let Some(shared) = shared.upgrade() else {
            return;
        };
        let tracker = LocationTracker { shared };

        match update {
            Some(Some(Ok(sample))) => {
                if !tracker.record_sample(session, sample) {
                    return;
                }
                on_update(&sample);
            }
            Some(Some(Err(e))) => {
                if !tracker.record_error(session, &e) {
                    return;
                }
                on_error(&e);
                if e.is_permanent() {
                    return;
                }
            }
            Some(None) => {
                let e = LocationError::PositionUnavailable("position watch ended".to_string());
                if tracker.halt(session, &e) {
                    on_error(&e);
                }
                return;
            }
            None => {
                debug!("No position fix within {timeout:?}");
                if !tracker.record_error(session, &LocationError::Timeout) {
                    return;
                }
                on_error(&LocationError::Timeout);
            }
        }
    }
}

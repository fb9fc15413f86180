//! Recorded trace playback
//!
//! Replays a GPS trace (a JSON array of points with millisecond offsets) as a
//! position watch, so the full engine can be exercised from a desk.

use std::collections::HashMap;
use std::path::Path;
use std::sync::{Mutex, PoisonError};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::debug;

use crate::error::{HarkError, Result};
use crate::location::source::{
    LocationError, PositionReceiver, PositionSource, WatchId, WatchOptions,
};
use crate::memory::types::LocationSample;

/// One recorded fix
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TracePoint {
    pub latitude: f64,
    pub longitude: f64,
    #[serde(default)]
    pub accuracy_m: Option<f64>,
    /// Milliseconds since the start of the trace
    pub offset_ms: u64,
}

/// PositionSource that replays a fixed trace on every watch
#[derive(Debug)]
pub struct ReplayPositionSource {
    points: Vec<TracePoint>,
    next_id: AtomicU64,
    watches: Mutex<HashMap<WatchId, JoinHandle<()>>>,
}

impl ReplayPositionSource {
    /// Points are replayed in offset order
    pub fn new(mut points: Vec<TracePoint>) -> Self {
        points.sort_by_key(|p| p.offset_ms);
        Self {
            points,
            next_id: AtomicU64::new(1),
            watches: Mutex::new(HashMap::new()),
        }
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            HarkError::Config(format!("Failed to read trace {}: {}", path.display(), e))
        })?;
        let points: Vec<TracePoint> = serde_json::from_str(&content)?;
        Ok(Self::new(points))
    }

    pub fn points(&self) -> &[TracePoint] {
        &self.points
    }

    /// Total length of the trace
    pub fn duration(&self) -> Duration {
        self.points
            .last()
            .map(|p| Duration::from_millis(p.offset_ms))
            .unwrap_or_default()
    }

    pub fn active_watches(&self) -> usize {
        self.watches
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .filter(|task| !task.is_finished())
            .count()
    }
}

impl PositionSource for ReplayPositionSource {
    fn watch_position(
        &self,
        _options: WatchOptions,
    ) -> std::result::Result<(WatchId, PositionReceiver), LocationError> {
        let runtime = tokio::runtime::Handle::try_current().map_err(|_| {
            LocationError::PositionUnavailable("no async runtime available".to_string())
        })?;

        let id = WatchId(self.next_id.fetch_add(1, Ordering::Relaxed));
        let (sender, receiver) = mpsc::unbounded_channel();
        let points = self.points.clone();

        let task = runtime.spawn(async move {
            let start = tokio::time::Instant::now();
            for point in points {
                tokio::time::sleep_until(start + Duration::from_millis(point.offset_ms)).await;
                let sample = LocationSample {
                    latitude: point.latitude,
                    longitude: point.longitude,
                    accuracy_m: point.accuracy_m,
                    timestamp: Utc::now(),
                };
                if sender.send(Ok(sample)).is_err() {
                    return;
                }
            }
            debug!("Trace replay finished");
            // Keep the watch open so the tracker holds its last position
            sender.closed().await;
        });

        self.watches
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(id, task);
        Ok((id, receiver))
    }

    fn clear_watch(&self, id: WatchId) {
        let task = self
            .watches
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&id);
        if let Some(task) = task {
            task.abort();
        }
    }

    fn name(&self) -> &'static str {
        "replay"
    }
}

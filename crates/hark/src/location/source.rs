//! Platform position sources
//!
//! A PositionSource mirrors the watch-style geolocation API found on mobile
//! and web platforms: a watch is registered with options, delivers updates
//! asynchronously, and must be cleared explicitly.

use std::time::Duration;

use tokio::sync::mpsc;

use crate::config::TrackerConfig;
use crate::memory::types::LocationSample;

/// Identifier of a registered position watch
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct WatchId(pub u64);

/// Options passed to the platform when registering a watch
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WatchOptions {
    pub high_accuracy: bool,
    /// Maximum wait for a fix before a timeout is reported
    pub timeout: Duration,
    /// Oldest cached position the platform may return
    pub maximum_age: Duration,
}

impl From<&TrackerConfig> for WatchOptions {
    fn from(config: &TrackerConfig) -> Self {
        Self {
            high_accuracy: config.high_accuracy,
            timeout: Duration::from_millis(config.timeout_ms),
            maximum_age: Duration::from_millis(config.maximum_age_ms),
        }
    }
}

impl Default for WatchOptions {
    fn default() -> Self {
        Self::from(&TrackerConfig::default())
    }
}

/// Location errors reported by sources and the tracker
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LocationError {
    #[error("location permission denied")]
    PermissionDenied,
    #[error("position unavailable: {0}")]
    PositionUnavailable(String),
    #[error("timed out waiting for a position fix")]
    Timeout,
    #[error("tracker halted after a permanent error; restart required")]
    RestartRequired,
}

impl LocationError {
    /// Permanent errors stop tracking until an explicit restart
    pub fn is_permanent(&self) -> bool {
        matches!(
            self,
            LocationError::PermissionDenied | LocationError::RestartRequired
        )
    }
}

/// A single update delivered on a watch
pub type PositionUpdate = Result<LocationSample, LocationError>;

/// Receiving end of a position watch
pub type PositionReceiver = mpsc::UnboundedReceiver<PositionUpdate>;

/// Watch-style access to device position
pub trait PositionSource: Send + Sync {
    /// Register a watch. Updates arrive on the returned receiver until
    /// [`PositionSource::clear_watch`] is called with the same id.
    fn watch_position(
        &self,
        options: WatchOptions,
    ) -> Result<(WatchId, PositionReceiver), LocationError>;

    /// Cancel a watch. Unknown ids are ignored.
    fn clear_watch(&self, id: WatchId);

    /// Source name for logging
    fn name(&self) -> &'static str;
}

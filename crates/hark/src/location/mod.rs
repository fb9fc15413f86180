//! Location tracking
//!
//! Position sources deliver fixes through a watch-style API; the tracker
//! keeps the last known position and surfaces errors.

pub mod replay;
pub mod source;
pub mod tracker;

pub use replay::{ReplayPositionSource, TracePoint};
pub use source::{
    LocationError, PositionReceiver, PositionSource, PositionUpdate, WatchId, WatchOptions,
};
pub use tracker::{LocationTracker, TrackerState};

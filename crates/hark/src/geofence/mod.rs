//! Geofencing
//!
//! The coordinator that turns position fixes into queued playback, and the
//! traits through which it reaches the memory service.

pub mod coordinator;
pub mod source;

pub use coordinator::{CoordinatorState, GeofenceCoordinator, TickOutcome};
pub use source::{InMemorySource, MemorySource, PlayEvent, PlayRecorder, RecordingPlayRecorder};

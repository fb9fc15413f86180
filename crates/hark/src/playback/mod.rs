//! Audio playback
//!
//! The single-flight queue, the player abstraction it drives, and the
//! cooldown bookkeeping that keeps memories from replaying.

pub mod cooldown;
pub mod player;
pub mod queue;
pub mod simulated;

pub use cooldown::{CooldownTracker, DEFAULT_COOLDOWN_CAPACITY};
pub use player::{AudioPlayer, PlaybackError, SILENT_CLIP};
pub use queue::{AddOutcome, AudioQueue, PlaybackEvent, PlaybackState, QueueEntry, QueueState};
pub use simulated::SimulatedPlayer;

//! Hark - Geofenced audio playback for location-triggered voice memories
//!
//! This crate tracks the listener's position, finds memories whose trigger
//! radius covers it, ranks competing memories and plays the winner through
//! a single-flight audio queue with cooldown, mute and skip semantics.

pub mod config;
pub mod error;
pub mod geo;
pub mod geofence;
pub mod location;
pub mod memory;
pub mod playback;
pub mod remote;
pub mod testing;

pub use error::{HarkError, Result};

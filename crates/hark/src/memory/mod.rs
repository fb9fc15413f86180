//! Memory types and ranking
//!
//! Defines the read-only memory records fetched from the memory service,
//! location samples, viewer context, and the scorer that orders competing
//! in-range memories.

pub mod scorer;
pub mod types;

pub use scorer::{MemoryScorer, ScoredMemory};
pub use types::{LocationSample, Memory, Privacy, Viewer};

//! Audio output abstraction
//!
//! Defines the AudioPlayer trait that the queue drives. Implementations wrap
//! a single platform audio element (a browser `<audio>`, a native mixer
//! channel, or the simulated player used for trace replay).

use async_trait::async_trait;

/// A valid, zero-length 8 kHz mono WAV used to warm up audio output
pub const SILENT_CLIP: &str =
    "data:audio/wav;base64,UklGRiQAAABXQVZFZm10IBAAAAABAAEAQB8AAEAfAAABAAgAZGF0YQAAAAA=";

/// Playback-specific errors
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PlaybackError {
    #[error("audio output is locked until a user gesture unlocks it")]
    Locked,
    #[error("failed to decode audio from {0}")]
    Decode(String),
    #[error("failed to fetch audio: {0}")]
    Network(String),
    #[error("unsupported audio: {0}")]
    Unsupported(String),
}

/// A single audio output channel.
///
/// `play` resolves when the clip ends (or fails). `pause`, `resume` and
/// `stop` act on whatever clip is currently loaded and are synchronous, like
/// the equivalent media element calls.
#[async_trait]
pub trait AudioPlayer: Send + Sync {
    /// Play `url` to completion
    async fn play(&self, url: &str) -> Result<(), PlaybackError>;

    /// Pause the current clip, keeping its position
    fn pause(&self);

    /// Resume a paused clip from where it stopped
    fn resume(&self);

    /// Stop and unload the current clip
    fn stop(&self);

    /// Whether output stays blocked until [`AudioPlayer::unlock`] succeeds.
    ///
    /// True for mobile browsers that reject autoplay without a prior user
    /// interaction.
    fn requires_unlock(&self) -> bool {
        false
    }

    /// Warm up audio output by playing a near-silent clip.
    ///
    /// Must be invoked from within a user-gesture handler on platforms that
    /// require it.
    async fn unlock(&self, clip_url: &str) -> Result<(), PlaybackError> {
        self.play(clip_url).await
    }

    /// Player name for logging
    fn name(&self) -> &'static str;
}

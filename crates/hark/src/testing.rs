//! Test utilities for hark - mocks and fixtures
//!
//! - Scriptable audio player and position source that record every call
//! - Memory and location fixtures

use std::collections::{HashMap, HashSet};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{mpsc, oneshot};

use crate::geo::EARTH_RADIUS_M;
use crate::location::{
    LocationError, PositionReceiver, PositionSource, PositionUpdate, WatchId, WatchOptions,
};
use crate::memory::{LocationSample, Memory};
use crate::playback::{AudioPlayer, PlaybackError};

/// A call observed by [`MockAudioPlayer`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlayerCall {
    Play(String),
    Pause,
    Resume,
    Stop,
    Unlock(String),
}

#[derive(Default)]
struct PlayerState {
    calls: Vec<PlayerCall>,
    playing: Option<String>,
    paused: bool,
    /// Times `play` began while another clip was still loaded
    overlaps: usize,
    pending: Option<oneshot::Sender<Result<(), PlaybackError>>>,
}

/// Audio player whose clips end when the test says so.
///
/// By default `play` blocks until [`MockAudioPlayer::finish`] or
/// [`MockAudioPlayer::fail_current`]; `with_auto_finish` makes every clip
/// last a fixed duration instead.
pub struct MockAudioPlayer {
    state: Mutex<PlayerState>,
    requires_unlock: bool,
    unlock_result: Result<(), PlaybackError>,
    auto_finish: Option<Duration>,
    failing_urls: HashSet<String>,
}

impl Default for MockAudioPlayer {
    fn default() -> Self {
        Self::new()
    }
}

impl MockAudioPlayer {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(PlayerState::default()),
            requires_unlock: false,
            unlock_result: Ok(()),
            auto_finish: None,
            failing_urls: HashSet::new(),
        }
    }

    /// Block output until `unlock` succeeds, like a mobile browser
    pub fn requiring_unlock(mut self) -> Self {
        self.requires_unlock = true;
        self
    }

    pub fn with_unlock_result(mut self, result: Result<(), PlaybackError>) -> Self {
        self.unlock_result = result;
        self
    }

    pub fn with_auto_finish(mut self, clip_duration: Duration) -> Self {
        self.auto_finish = Some(clip_duration);
        self
    }

    /// `play(url)` fails immediately with a decode error
    pub fn failing_on(mut self, url: impl Into<String>) -> Self {
        self.failing_urls.insert(url.into());
        self
    }

    /// End the current clip successfully. Returns false if nothing is playing.
    pub fn finish(&self) -> bool {
        self.complete(Ok(()))
    }

    /// End the current clip with an error
    pub fn fail_current(&self, error: PlaybackError) -> bool {
        self.complete(Err(error))
    }

    pub fn calls(&self) -> Vec<PlayerCall> {
        self.lock().calls.clone()
    }

    pub fn played_urls(&self) -> Vec<String> {
        self.lock()
            .calls
            .iter()
            .filter_map(|call| match call {
                PlayerCall::Play(url) => Some(url.clone()),
                _ => None,
            })
            .collect()
    }

    pub fn play_count(&self) -> usize {
        self.played_urls().len()
    }

    /// URL of the clip currently loaded
    pub fn now_playing(&self) -> Option<String> {
        self.lock().playing.clone()
    }

    pub fn is_paused(&self) -> bool {
        self.lock().paused
    }

    /// Number of times a clip started while another was still loaded
    pub fn overlaps(&self) -> usize {
        self.lock().overlaps
    }

    fn lock(&self) -> MutexGuard<'_, PlayerState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn complete(&self, result: Result<(), PlaybackError>) -> bool {
        let sender = self.lock().pending.take();
        match sender {
            Some(sender) => sender.send(result).is_ok(),
            None => false,
        }
    }
}

#[async_trait]
impl AudioPlayer for MockAudioPlayer {
    async fn play(&self, url: &str) -> Result<(), PlaybackError> {
        let receiver = {
            let mut state = self.lock();
            state.calls.push(PlayerCall::Play(url.to_string()));
            if state.playing.is_some() {
                state.overlaps += 1;
            }
            if self.failing_urls.contains(url) {
                return Err(PlaybackError::Decode(url.to_string()));
            }
            state.playing = Some(url.to_string());
            state.paused = false;

            if self.auto_finish.is_some() {
                None
            } else {
                let (sender, receiver) = oneshot::channel();
                state.pending = Some(sender);
                Some(receiver)
            }
        };

        let result = match (receiver, self.auto_finish) {
            (Some(receiver), _) => receiver.await.unwrap_or(Ok(())),
            (None, Some(duration)) => {
                tokio::time::sleep(duration).await;
                Ok(())
            }
            (None, None) => Ok(()),
        };

        let mut state = self.lock();
        if state.playing.as_deref() == Some(url) {
            state.playing = None;
        }
        result
    }

    fn pause(&self) {
        let mut state = self.lock();
        state.calls.push(PlayerCall::Pause);
        state.paused = true;
    }

    fn resume(&self) {
        let mut state = self.lock();
        state.calls.push(PlayerCall::Resume);
        state.paused = false;
    }

    fn stop(&self) {
        let mut state = self.lock();
        state.calls.push(PlayerCall::Stop);
        state.playing = None;
        state.paused = false;
        state.pending = None;
    }

    fn requires_unlock(&self) -> bool {
        self.requires_unlock
    }

    async fn unlock(&self, clip_url: &str) -> Result<(), PlaybackError> {
        self.lock().calls.push(PlayerCall::Unlock(clip_url.to_string()));
        self.unlock_result.clone()
    }

    fn name(&self) -> &'static str {
        "mock"
    }
}

#[derive(Default)]
struct PositionState {
    next_id: u64,
    watches: HashMap<WatchId, mpsc::UnboundedSender<PositionUpdate>>,
    watch_calls: usize,
    cleared: Vec<WatchId>,
    last_options: Option<WatchOptions>,
}

/// Position source driven by the test through `push_sample`/`push_error`
#[derive(Default)]
pub struct MockPositionSource {
    state: Mutex<PositionState>,
    denied: bool,
}

impl MockPositionSource {
    pub fn new() -> Self {
        Self::default()
    }

    /// A source whose platform refuses location permission
    pub fn denying() -> Self {
        Self {
            state: Mutex::new(PositionState::default()),
            denied: true,
        }
    }

    /// Deliver a fix to every active watch. Returns the number of watches
    /// reached.
    pub fn push_sample(&self, sample: LocationSample) -> usize {
        self.push(Ok(sample))
    }

    pub fn push_error(&self, error: LocationError) -> usize {
        self.push(Err(error))
    }

    /// Drop every watch sender, as a platform does when it tears down a watch
    pub fn end_watches(&self) {
        self.lock().watches.clear();
    }

    pub fn active_watches(&self) -> usize {
        self.lock().watches.len()
    }

    pub fn watch_calls(&self) -> usize {
        self.lock().watch_calls
    }

    pub fn cleared_watches(&self) -> Vec<WatchId> {
        self.lock().cleared.clone()
    }

    pub fn last_options(&self) -> Option<WatchOptions> {
        self.lock().last_options
    }

    fn lock(&self) -> MutexGuard<'_, PositionState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn push(&self, update: PositionUpdate) -> usize {
        let mut state = self.lock();
        state.watches.retain(|_, sender| !sender.is_closed());
        state
            .watches
            .values()
            .filter(|sender| sender.send(update.clone()).is_ok())
            .count()
    }
}

impl PositionSource for MockPositionSource {
    fn watch_position(
        &self,
        options: WatchOptions,
    ) -> Result<(WatchId, PositionReceiver), LocationError> {
        let mut state = self.lock();
        state.watch_calls += 1;
        state.last_options = Some(options);
        if self.denied {
            return Err(LocationError::PermissionDenied);
        }

        state.next_id += 1;
        let id = WatchId(state.next_id);
        let (sender, receiver) = mpsc::unbounded_channel();
        state.watches.insert(id, sender);
        Ok((id, receiver))
    }

    fn clear_watch(&self, id: WatchId) {
        let mut state = self.lock();
        if state.watches.remove(&id).is_some() {
            state.cleared.push(id);
        }
    }

    fn name(&self) -> &'static str {
        "mock"
    }
}

/// Latitude/longitude `meters` due north of a point
pub fn offset_north(latitude: f64, longitude: f64, meters: f64) -> (f64, f64) {
    (latitude + (meters / EARTH_RADIUS_M).to_degrees(), longitude)
}

/// Playable public memory with a generated audio URL
pub fn playable_memory(latitude: f64, longitude: f64, radius_m: f64) -> Memory {
    let memory = Memory::new("test memory", latitude, longitude, radius_m);
    let url = format!("https://audio.test/{}.webm", memory.id);
    memory.with_audio(url)
}

/// Let spawned tasks run until they block
pub async fn settle() {
    for _ in 0..16 {
        tokio::task::yield_now().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geo;

    #[test]
    fn offset_north_moves_requested_distance() {
        let (lat, lng) = offset_north(37.872, -122.258, 111.0);
        let d = geo::distance(37.872, -122.258, lat, lng);
        assert!((d - 111.0).abs() < 0.01, "got {d}");
    }

    #[tokio::test]
    async fn mock_player_completes_on_finish() {
        let player = std::sync::Arc::new(MockAudioPlayer::new());
        let task = {
            let player = player.clone();
            tokio::spawn(async move { player.play("a").await })
        };
        settle().await;
        assert_eq!(player.now_playing().as_deref(), Some("a"));

        assert!(player.finish());
        assert!(task.await.unwrap().is_ok());
        assert!(player.now_playing().is_none());
    }

    #[tokio::test]
    async fn mock_player_failing_url() {
        let player = MockAudioPlayer::new().failing_on("bad");
        assert!(matches!(
            player.play("bad").await,
            Err(PlaybackError::Decode(_))
        ));
    }

    #[tokio::test]
    async fn mock_position_source_tracks_watches() {
        let source = MockPositionSource::new();
        let (id, mut rx) = source.watch_position(WatchOptions::default()).unwrap();
        assert_eq!(source.push_sample(LocationSample::new(1.0, 2.0)), 1);
        assert!(rx.recv().await.unwrap().is_ok());

        source.clear_watch(id);
        assert_eq!(source.active_watches(), 0);
        assert_eq!(source.cleared_watches(), vec![id]);
    }

    #[test]
    fn denying_source_refuses_watch() {
        let source = MockPositionSource::denying();
        assert_eq!(
            source.watch_position(WatchOptions::default()).unwrap_err(),
            LocationError::PermissionDenied
        );
        assert_eq!(source.watch_calls(), 1);
    }
}

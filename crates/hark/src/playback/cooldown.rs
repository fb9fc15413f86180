//! Cooldown tracking for replay suppression
//!
//! Remembers when each memory was last enqueued so that a listener standing
//! inside a geofence does not hear the same note on every check. Uses an LRU
//! cache so a long walk past many memories stays bounded in size.

use lru::LruCache;
use std::num::NonZeroUsize;
use std::time::Duration;
use tokio::time::Instant;
use uuid::Uuid;

/// Default number of memory ids remembered
pub const DEFAULT_COOLDOWN_CAPACITY: usize = 1000;

/// Tracks the last enqueue time of each memory id
#[derive(Debug)]
pub struct CooldownTracker {
    cache: LruCache<Uuid, Instant>,
    window: Duration,
}

impl CooldownTracker {
    /// Creates a tracker with the given window and capacity.
    ///
    /// A capacity of 0 falls back to [`DEFAULT_COOLDOWN_CAPACITY`].
    pub fn new(window: Duration, capacity: usize) -> Self {
        let cap = NonZeroUsize::new(capacity)
            .or(NonZeroUsize::new(DEFAULT_COOLDOWN_CAPACITY))
            .unwrap_or(NonZeroUsize::MIN);
        Self {
            cache: LruCache::new(cap),
            window,
        }
    }

    /// Starts (or restarts) the cooldown for `id` now
    pub fn mark(&mut self, id: Uuid) {
        self.cache.put(id, Instant::now());
    }

    /// Returns true while `id` is inside its cooldown window.
    ///
    /// Expired entries are dropped on lookup.
    pub fn is_cooling_down(&mut self, id: &Uuid) -> bool {
        self.remaining(id).is_some()
    }

    /// Time left before `id` may be enqueued again
    pub fn remaining(&mut self, id: &Uuid) -> Option<Duration> {
        let marked = *self.cache.peek(id)?;
        let elapsed = marked.elapsed();
        if elapsed >= self.window {
            self.cache.pop(id);
            return None;
        }
        Some(self.window - elapsed)
    }

    /// Forgets every tracked id
    pub fn clear(&mut self) {
        self.cache.clear();
    }

    pub fn len(&self) -> usize {
        self.cache.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cache.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.cache.cap().get()
    }

    pub fn window(&self) -> Duration {
        self.window
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const WINDOW: Duration = Duration::from_secs(300);

    #[test]
    fn test_new_tracker_is_empty() {
        let tracker = CooldownTracker::new(WINDOW, 100);
        assert!(tracker.is_empty());
        assert_eq!(tracker.capacity(), 100);
        assert_eq!(tracker.window(), WINDOW);
    }

    #[test]
    fn test_zero_capacity_uses_default() {
        let tracker = CooldownTracker::new(WINDOW, 0);
        assert_eq!(tracker.capacity(), DEFAULT_COOLDOWN_CAPACITY);
    }

    #[tokio::test(start_paused = true)]
    async fn test_mark_then_cooling_down() {
        let mut tracker = CooldownTracker::new(WINDOW, 10);
        let id = Uuid::new_v4();

        assert!(!tracker.is_cooling_down(&id));
        tracker.mark(id);
        assert!(tracker.is_cooling_down(&id));
        assert_eq!(tracker.remaining(&id), Some(WINDOW));
    }

    #[tokio::test(start_paused = true)]
    async fn test_cooldown_expires_after_window() {
        let mut tracker = CooldownTracker::new(WINDOW, 10);
        let id = Uuid::new_v4();
        tracker.mark(id);

        tokio::time::advance(WINDOW - Duration::from_secs(1)).await;
        assert!(tracker.is_cooling_down(&id));

        tokio::time::advance(Duration::from_secs(1)).await;
        assert!(!tracker.is_cooling_down(&id));
        assert!(tracker.is_empty(), "expired entry should be dropped");
    }

    #[tokio::test(start_paused = true)]
    async fn test_remark_restarts_window() {
        let mut tracker = CooldownTracker::new(WINDOW, 10);
        let id = Uuid::new_v4();
        tracker.mark(id);

        tokio::time::advance(Duration::from_secs(200)).await;
        tracker.mark(id);
        tokio::time::advance(Duration::from_secs(200)).await;

        assert!(tracker.is_cooling_down(&id));
    }

    #[tokio::test(start_paused = true)]
    async fn test_lru_eviction_forgets_oldest() {
        let mut tracker = CooldownTracker::new(WINDOW, 2);
        let id1 = Uuid::new_v4();
        let id2 = Uuid::new_v4();
        let id3 = Uuid::new_v4();

        tracker.mark(id1);
        tracker.mark(id2);
        tracker.mark(id3);

        assert_eq!(tracker.len(), 2);
        assert!(!tracker.is_cooling_down(&id1));
        assert!(tracker.is_cooling_down(&id2));
        assert!(tracker.is_cooling_down(&id3));
    }

    #[tokio::test(start_paused = true)]
    async fn test_clear() {
        let mut tracker = CooldownTracker::new(WINDOW, 10);
        let id = Uuid::new_v4();
        tracker.mark(id);
        tracker.clear();
        assert!(tracker.is_empty());
        assert!(!tracker.is_cooling_down(&id));
    }
}

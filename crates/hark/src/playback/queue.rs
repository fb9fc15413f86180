//! Single-flight audio queue
//!
//! Owns the one audio output of a session. Entries are played strictly one
//! at a time, in enqueue order; starting a clip always stops the previous
//! one first. A per-memory cooldown keeps repeated geofence checks from
//! replaying the same note.
//!
//! Playback runs in a spawned task per clip. Every start bumps a generation
//! counter so a completion arriving after a skip or clear is ignored.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::config::QueueConfig;
use crate::memory::types::{LocationSample, Memory};
use crate::playback::cooldown::CooldownTracker;
use crate::playback::player::{AudioPlayer, PlaybackError, SILENT_CLIP};

/// A memory staged for playback, bound to the context it was enqueued in
#[derive(Debug, Clone, PartialEq)]
pub struct QueueEntry {
    pub memory: Memory,
    /// Listener position when the entry was created
    pub location: LocationSample,
    pub is_owner: bool,
    pub is_friend: bool,
    pub enqueued_at: DateTime<Utc>,
}

/// Coarse playback state for UI rendering
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaybackState {
    Idle,
    Playing,
    Muted,
}

/// Queue state including pending work
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueueState {
    /// Nothing pending, nothing playing
    Empty,
    /// Entries pending, nothing playing (locked or between clips)
    Queued,
    /// Exactly one clip active
    Playing,
    /// Output suppressed; entries may still accumulate
    Muted,
}

/// What [`AudioQueue::add_memory`] did with a memory
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum AddOutcome {
    /// Appended behind other pending entries
    Enqueued { position: usize },
    /// Started playing immediately
    Started,
    /// Memory has no audio
    NoAudio,
    /// Listener is outside the memory's own radius
    OutOfRange { distance_m: f64 },
    /// Memory was enqueued recently
    CoolingDown { remaining: Duration },
    /// Memory is already pending or playing
    AlreadyQueued,
}

impl AddOutcome {
    /// Whether the memory is now pending or playing
    pub fn is_accepted(&self) -> bool {
        matches!(self, AddOutcome::Enqueued { .. } | AddOutcome::Started)
    }
}

/// Playback notifications for UI and debug surfaces
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum PlaybackEvent {
    Enqueued { memory_id: Uuid, position: usize },
    Started { memory_id: Uuid },
    Finished { memory_id: Uuid },
    Failed { memory_id: Uuid, error: String },
    Skipped { memory_id: Uuid },
    Muted,
    Unmuted,
    Cleared { dropped: usize },
    Unlocked,
}

struct ActivePlayback {
    entry: QueueEntry,
    generation: u64,
    task: JoinHandle<()>,
    paused: bool,
}

struct QueueInner {
    pending: VecDeque<QueueEntry>,
    current: Option<ActivePlayback>,
    muted: bool,
    unlocked: bool,
    cooldowns: CooldownTracker,
    generation: u64,
}

struct Shared {
    inner: Mutex<QueueInner>,
    player: Arc<dyn AudioPlayer>,
    events: broadcast::Sender<PlaybackEvent>,
    unlock_clip: String,
}

/// Handle to a session's audio queue.
///
/// Cloning is cheap and every clone drives the same queue. Construct one per
/// listening session and inject it wherever playback is controlled.
#[derive(Clone)]
pub struct AudioQueue {
    shared: Arc<Shared>,
}

impl std::fmt::Debug for AudioQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let inner = self.lock();
        f.debug_struct("AudioQueue")
            .field("player", &self.shared.player.name())
            .field("pending", &inner.pending.len())
            .field("playing", &inner.current.as_ref().map(|a| a.entry.memory.id))
            .field("muted", &inner.muted)
            .field("unlocked", &inner.unlocked)
            .finish()
    }
}

impl AudioQueue {
    pub fn new(player: Arc<dyn AudioPlayer>, config: &QueueConfig) -> Self {
        let (events, _) = broadcast::channel(config.event_capacity.max(1));
        let unlocked = !player.requires_unlock();
        Self {
            shared: Arc::new(Shared {
                inner: Mutex::new(QueueInner {
                    pending: VecDeque::new(),
                    current: None,
                    muted: false,
                    unlocked,
                    cooldowns: CooldownTracker::new(config.cooldown(), config.cooldown_capacity),
                    generation: 0,
                }),
                player,
                events,
                unlock_clip: config
                    .unlock_clip_url
                    .clone()
                    .unwrap_or_else(|| SILENT_CLIP.to_string()),
            }),
        }
    }

    pub fn with_defaults(player: Arc<dyn AudioPlayer>) -> Self {
        Self::new(player, &QueueConfig::default())
    }

    /// Subscribe to playback events
    pub fn subscribe(&self) -> broadcast::Receiver<PlaybackEvent> {
        self.shared.events.subscribe()
    }

    /// Stage a memory for playback.
    ///
    /// Rejects memories without audio, memories whose radius does not cover
    /// `location` (unless `skip_distance_check`), and memories inside their
    /// cooldown window. Starts playback when nothing is playing, the queue is
    /// not muted, and output is unlocked. Must be called within a Tokio
    /// runtime.
    pub fn add_memory(
        &self,
        memory: Memory,
        location: LocationSample,
        is_owner: bool,
        is_friend: bool,
        skip_distance_check: bool,
    ) -> AddOutcome {
        if !memory.is_playable() {
            debug!("Ignoring memory {} without audio", memory.id);
            return AddOutcome::NoAudio;
        }

        if !skip_distance_check {
            let distance_m = memory.distance_to(&location);
            // Negated so NaN distances are rejected
            if !(distance_m <= memory.radius_m) {
                debug!(
                    "Memory {} out of range ({distance_m:.1}m > {}m)",
                    memory.id, memory.radius_m
                );
                return AddOutcome::OutOfRange { distance_m };
            }
        }

        let mut inner = self.lock();
        let id = memory.id;

        let already_queued = inner.pending.iter().any(|e| e.memory.id == id)
            || inner.current.as_ref().is_some_and(|a| a.entry.memory.id == id);
        if already_queued {
            return AddOutcome::AlreadyQueued;
        }

        if let Some(remaining) = inner.cooldowns.remaining(&id) {
            debug!("Memory {id} cooling down for {remaining:?}");
            return AddOutcome::CoolingDown { remaining };
        }

        inner.cooldowns.mark(id);
        inner.pending.push_back(QueueEntry {
            memory,
            location,
            is_owner,
            is_friend,
            enqueued_at: Utc::now(),
        });
        let position = inner.pending.len();
        debug!("Enqueued memory {id} at position {position}");
        self.emit(PlaybackEvent::Enqueued {
            memory_id: id,
            position,
        });

        self.start_next(&mut inner);

        if inner.current.as_ref().is_some_and(|a| a.entry.memory.id == id) {
            AddOutcome::Started
        } else {
            AddOutcome::Enqueued { position }
        }
    }

    /// Suppress output. The active clip pauses; pending entries are kept.
    pub fn mute(&self) {
        let mut inner = self.lock();
        if inner.muted {
            return;
        }
        inner.muted = true;
        if let Some(active) = inner.current.as_mut() {
            self.shared.player.pause();
            active.paused = true;
        }
        info!("Audio queue muted");
        self.emit(PlaybackEvent::Muted);
    }

    /// Lift suppression. A clip paused by [`AudioQueue::mute`] resumes from its
    /// paused position; otherwise the next pending entry starts.
    pub fn unmute(&self) {
        let mut inner = self.lock();
        if !inner.muted {
            return;
        }
        inner.muted = false;
        info!("Audio queue unmuted");
        self.emit(PlaybackEvent::Unmuted);

        match inner.current.as_mut() {
            Some(active) if active.paused => {
                self.shared.player.resume();
                active.paused = false;
            }
            Some(_) => {}
            None => self.start_next(&mut inner),
        }
    }

    /// Stop the active clip and move on to the next pending entry
    pub fn skip(&self) {
        let mut inner = self.lock();
        if let Some(active) = inner.current.take() {
            let memory_id = active.entry.memory.id;
            self.halt(active);
            debug!("Skipped memory {memory_id}");
            self.emit(PlaybackEvent::Skipped { memory_id });
        }
        self.start_next(&mut inner);
    }

    /// Drop every pending entry and stop the active clip.
    ///
    /// Mute and cooldown history are left untouched.
    pub fn clear(&self) {
        let mut inner = self.lock();
        let mut dropped = inner.pending.len();
        inner.pending.clear();
        if let Some(active) = inner.current.take() {
            self.halt(active);
            dropped += 1;
        }
        debug!("Cleared audio queue ({dropped} entries)");
        self.emit(PlaybackEvent::Cleared { dropped });
    }

    /// Warm up audio output with a near-silent clip.
    ///
    /// Call from within a user-gesture handler on platforms that block
    /// autoplay. Pending entries start playing once this succeeds.
    pub async fn unlock_audio(&self) -> Result<(), PlaybackError> {
        let player = self.shared.player.clone();
        if let Err(e) = player.unlock(&self.shared.unlock_clip).await {
            warn!("Audio unlock failed on {}: {e}", player.name());
            return Err(e);
        }

        let mut inner = self.lock();
        inner.unlocked = true;
        info!("Audio output unlocked");
        self.emit(PlaybackEvent::Unlocked);
        self.start_next(&mut inner);
        Ok(())
    }

    /// Forget cooldown history so every memory may play again
    pub fn reset_cooldowns(&self) {
        self.lock().cooldowns.clear();
    }

    pub fn currently_playing(&self) -> Option<QueueEntry> {
        self.lock().current.as_ref().map(|a| a.entry.clone())
    }

    /// Number of entries waiting behind the active clip
    pub fn queue_length(&self) -> usize {
        self.lock().pending.len()
    }

    pub fn is_muted(&self) -> bool {
        self.lock().muted
    }

    pub fn is_unlocked(&self) -> bool {
        self.lock().unlocked
    }

    pub fn playback_state(&self) -> PlaybackState {
        let inner = self.lock();
        if inner.muted {
            PlaybackState::Muted
        } else if inner.current.is_some() {
            PlaybackState::Playing
        } else {
            PlaybackState::Idle
        }
    }

    pub fn queue_state(&self) -> QueueState {
        let inner = self.lock();
        if inner.muted {
            QueueState::Muted
        } else if inner.current.is_some() {
            QueueState::Playing
        } else if !inner.pending.is_empty() {
            QueueState::Queued
        } else {
            QueueState::Empty
        }
    }

    fn lock(&self) -> MutexGuard<'_, QueueInner> {
        self.shared
            .inner
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    fn emit(&self, event: PlaybackEvent) {
        // No subscribers is fine
        let _ = self.shared.events.send(event);
    }

    fn halt(&self, active: ActivePlayback) {
        active.task.abort();
        self.shared.player.stop();
    }

    /// Start the next pending entry if playback is allowed
    fn start_next(&self, inner: &mut QueueInner) {
        if inner.muted || inner.current.is_some() || !inner.unlocked {
            if !inner.unlocked && !inner.pending.is_empty() {
                debug!("Audio locked; {} entries waiting", inner.pending.len());
            }
            return;
        }

        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            warn!("No Tokio runtime; leaving {} entries queued", inner.pending.len());
            return;
        };

        let Some(entry) = inner.pending.pop_front() else {
            return;
        };

        inner.generation += 1;
        let generation = inner.generation;
        let memory_id = entry.memory.id;
        let url = entry.memory.playable_url().unwrap_or_default().to_string();

        let queue = self.clone();
        let player = self.shared.player.clone();
        let task = runtime.spawn(async move {
            let result = player.play(&url).await;
            queue.on_playback_done(generation, result);
        });

        info!("Playing memory {memory_id}");
        self.emit(PlaybackEvent::Started { memory_id });
        inner.current = Some(ActivePlayback {
            entry,
            generation,
            task,
            paused: false,
        });
    }

    fn on_playback_done(&self, generation: u64, result: Result<(), PlaybackError>) {
        let mut inner = self.lock();
        let is_current = inner
            .current
            .as_ref()
            .is_some_and(|a| a.generation == generation);
        if !is_current {
            return;
        }
        let Some(active) = inner.current.take() else {
            return;
        };

        let memory_id = active.entry.memory.id;
        match result {
            Ok(()) => {
                debug!("Finished memory {memory_id}");
                self.emit(PlaybackEvent::Finished { memory_id });
            }
            Err(e) => {
                warn!("Playback of memory {memory_id} failed: {e}");
                self.emit(PlaybackEvent::Failed {
                    memory_id,
                    error: e.to_string(),
                });
            }
        }

        self.start_next(&mut inner);
    }
}

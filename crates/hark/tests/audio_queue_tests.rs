//! Integration tests for the single-flight audio queue
//!
//! Tests verify that:
//! - Only one clip is ever loaded at a time
//! - Cooldown makes repeated adds idempotent
//! - Mute, unmute, skip and clear behave from any prior state
//! - Locked output keeps entries queued until unlocked
//! - Playback failures advance the queue

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::broadcast;

use hark::config::QueueConfig;
use hark::memory::{LocationSample, Memory};
use hark::playback::{
    AddOutcome, AudioQueue, PlaybackError, PlaybackEvent, PlaybackState, QueueState, SILENT_CLIP,
};
use hark::testing::{MockAudioPlayer, PlayerCall, offset_north, playable_memory, settle};

const LAT: f64 = 37.8720;
const LNG: f64 = -122.2580;

fn here() -> LocationSample {
    LocationSample::new(LAT, LNG)
}

fn nearby_memory() -> Memory {
    playable_memory(LAT, LNG, 20.0)
}

fn queue_with(player: MockAudioPlayer) -> (AudioQueue, Arc<MockAudioPlayer>) {
    let player = Arc::new(player);
    (AudioQueue::with_defaults(player.clone()), player)
}

fn add(queue: &AudioQueue, memory: &Memory) -> AddOutcome {
    queue.add_memory(memory.clone(), here(), false, false, false)
}

fn drain(rx: &mut broadcast::Receiver<PlaybackEvent>) -> Vec<PlaybackEvent> {
    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    events
}

// =============================================================================
// Enqueue and single-flight playback
// =============================================================================

#[tokio::test]
async fn test_first_add_starts_playback() {
    let (queue, player) = queue_with(MockAudioPlayer::new());
    let memory = nearby_memory();

    assert_eq!(add(&queue, &memory), AddOutcome::Started);
    assert_eq!(
        queue.currently_playing().map(|e| e.memory.id),
        Some(memory.id)
    );
    assert_eq!(queue.queue_length(), 0);
    assert_eq!(queue.queue_state(), QueueState::Playing);
    assert_eq!(queue.playback_state(), PlaybackState::Playing);

    settle().await;
    assert_eq!(player.played_urls(), vec![memory.audio_url.clone().unwrap()]);
}

#[tokio::test]
async fn test_entries_play_in_order_one_at_a_time() {
    let (queue, player) = queue_with(MockAudioPlayer::new());
    let first = nearby_memory();
    let second = nearby_memory();
    let third = nearby_memory();

    assert_eq!(add(&queue, &first), AddOutcome::Started);
    assert_eq!(add(&queue, &second), AddOutcome::Enqueued { position: 1 });
    assert_eq!(add(&queue, &third), AddOutcome::Enqueued { position: 2 });
    assert_eq!(queue.queue_length(), 2);

    settle().await;
    assert_eq!(player.play_count(), 1);

    assert!(player.finish());
    settle().await;
    assert_eq!(
        queue.currently_playing().map(|e| e.memory.id),
        Some(second.id)
    );

    assert!(player.finish());
    settle().await;
    assert!(player.finish());
    settle().await;

    assert_eq!(player.play_count(), 3);
    assert_eq!(player.overlaps(), 0);
    assert_eq!(queue.queue_state(), QueueState::Empty);
}

#[tokio::test(start_paused = true)]
async fn test_auto_finishing_clips_never_overlap() {
    let (queue, player) =
        queue_with(MockAudioPlayer::new().with_auto_finish(Duration::from_secs(2)));

    for _ in 0..5 {
        assert!(add(&queue, &nearby_memory()).is_accepted());
    }

    tokio::time::sleep(Duration::from_secs(11)).await;
    assert_eq!(player.play_count(), 5);
    assert_eq!(player.overlaps(), 0);
    assert!(queue.currently_playing().is_none());
}

#[tokio::test]
async fn test_events_for_a_finished_clip() {
    let (queue, player) = queue_with(MockAudioPlayer::new());
    let mut rx = queue.subscribe();
    let memory = nearby_memory();

    add(&queue, &memory);
    settle().await;
    player.finish();
    settle().await;

    assert_eq!(
        drain(&mut rx),
        vec![
            PlaybackEvent::Enqueued {
                memory_id: memory.id,
                position: 1
            },
            PlaybackEvent::Started {
                memory_id: memory.id
            },
            PlaybackEvent::Finished {
                memory_id: memory.id
            },
        ]
    );
}

// =============================================================================
// Rejections
// =============================================================================

#[tokio::test]
async fn test_memory_without_audio_is_ignored() {
    let (queue, player) = queue_with(MockAudioPlayer::new());
    let silent = Memory::new("no audio", LAT, LNG, 20.0);

    assert_eq!(add(&queue, &silent), AddOutcome::NoAudio);
    assert_eq!(queue.queue_length(), 0);
    assert!(queue.currently_playing().is_none());

    settle().await;
    assert_eq!(player.play_count(), 0);
}

#[tokio::test]
async fn test_distance_check_uses_memory_radius() {
    let (queue, _player) = queue_with(MockAudioPlayer::new());
    let memory = nearby_memory();
    let (lat, lng) = offset_north(LAT, LNG, 111.0);
    let far = LocationSample::new(lat, lng);

    let outcome = queue.add_memory(memory.clone(), far, false, false, false);
    assert!(matches!(outcome, AddOutcome::OutOfRange { distance_m } if distance_m > 100.0));
    assert_eq!(queue.queue_length(), 0);

    let outcome = queue.add_memory(memory, far, false, false, true);
    assert_eq!(outcome, AddOutcome::Started);
}

#[tokio::test(start_paused = true)]
async fn test_same_memory_within_cooldown_is_one_entry() {
    let (queue, player) = queue_with(MockAudioPlayer::new());
    let memory = nearby_memory();

    assert_eq!(add(&queue, &memory), AddOutcome::Started);
    assert_eq!(add(&queue, &memory), AddOutcome::AlreadyQueued);
    assert_eq!(queue.queue_length(), 0);

    settle().await;
    player.finish();
    settle().await;

    assert!(matches!(
        add(&queue, &memory),
        AddOutcome::CoolingDown { .. }
    ));
    assert_eq!(queue.queue_length(), 0);
    assert_eq!(player.play_count(), 1);

    tokio::time::advance(Duration::from_secs(301)).await;
    assert_eq!(add(&queue, &memory), AddOutcome::Started);
}

#[tokio::test]
async fn test_cooldown_is_configurable_and_resettable() {
    let player = Arc::new(MockAudioPlayer::new());
    let config = QueueConfig {
        cooldown_secs: 3600,
        ..QueueConfig::default()
    };
    let queue = AudioQueue::new(player.clone(), &config);
    let memory = nearby_memory();

    add(&queue, &memory);
    queue.clear();
    assert!(matches!(
        add(&queue, &memory),
        AddOutcome::CoolingDown { remaining } if remaining > Duration::from_secs(3500)
    ));

    queue.reset_cooldowns();
    assert_eq!(add(&queue, &memory), AddOutcome::Started);
}

// =============================================================================
// Mute / unmute
// =============================================================================

#[tokio::test]
async fn test_mute_then_add_does_not_play_until_unmuted() {
    let (queue, player) = queue_with(MockAudioPlayer::new());
    let memory = nearby_memory();

    queue.mute();
    assert_eq!(add(&queue, &memory), AddOutcome::Enqueued { position: 1 });
    settle().await;
    assert_eq!(player.play_count(), 0);
    assert_eq!(queue.queue_state(), QueueState::Muted);

    queue.unmute();
    assert_eq!(
        queue.currently_playing().map(|e| e.memory.id),
        Some(memory.id)
    );
    settle().await;
    assert_eq!(player.play_count(), 1);
}

#[tokio::test]
async fn test_mute_pauses_and_unmute_resumes_current_clip() {
    let (queue, player) = queue_with(MockAudioPlayer::new());
    let memory = nearby_memory();

    add(&queue, &memory);
    settle().await;

    queue.mute();
    assert!(queue.is_muted());
    assert!(player.is_paused());
    assert_eq!(queue.playback_state(), PlaybackState::Muted);

    queue.unmute();
    assert!(!player.is_paused());
    assert_eq!(player.play_count(), 1);
    assert!(player.calls().contains(&PlayerCall::Resume));
    assert_eq!(
        queue.currently_playing().map(|e| e.memory.id),
        Some(memory.id)
    );
}

#[tokio::test]
async fn test_repeated_mute_emits_once() {
    let (queue, _player) = queue_with(MockAudioPlayer::new());
    let mut rx = queue.subscribe();

    queue.mute();
    queue.mute();
    queue.unmute();
    queue.unmute();

    assert_eq!(
        drain(&mut rx),
        vec![PlaybackEvent::Muted, PlaybackEvent::Unmuted]
    );
}

// =============================================================================
// Skip / clear
// =============================================================================

#[tokio::test]
async fn test_skip_advances_to_next_entry() {
    let (queue, player) = queue_with(MockAudioPlayer::new());
    let mut rx = queue.subscribe();
    let first = nearby_memory();
    let second = nearby_memory();

    add(&queue, &first);
    add(&queue, &second);
    settle().await;

    queue.skip();
    assert_eq!(
        queue.currently_playing().map(|e| e.memory.id),
        Some(second.id)
    );
    settle().await;

    assert_eq!(player.now_playing(), second.audio_url.clone());
    assert_eq!(player.overlaps(), 0);
    assert!(drain(&mut rx).contains(&PlaybackEvent::Skipped {
        memory_id: first.id
    }));

    queue.skip();
    assert!(queue.currently_playing().is_none());
    assert_eq!(queue.queue_state(), QueueState::Empty);
}

#[tokio::test]
async fn test_skip_when_idle_is_harmless() {
    let (queue, player) = queue_with(MockAudioPlayer::new());
    queue.skip();
    assert_eq!(queue.queue_state(), QueueState::Empty);
    assert!(player.calls().is_empty());
}

#[tokio::test]
async fn test_clear_empties_queue_from_any_state() {
    let (queue, player) = queue_with(MockAudioPlayer::new());
    let mut rx = queue.subscribe();

    for _ in 0..3 {
        add(&queue, &nearby_memory());
    }
    settle().await;
    queue.mute();

    queue.clear();
    assert_eq!(queue.queue_length(), 0);
    assert!(queue.currently_playing().is_none());
    assert!(queue.is_muted());
    assert!(player.calls().contains(&PlayerCall::Stop));
    assert!(drain(&mut rx).contains(&PlaybackEvent::Cleared { dropped: 3 }));

    queue.clear();
    assert_eq!(queue.queue_length(), 0);
    assert!(queue.currently_playing().is_none());
}

#[tokio::test]
async fn test_completion_after_clear_is_ignored() {
    let (queue, player) = queue_with(MockAudioPlayer::new());
    let mut rx = queue.subscribe();

    add(&queue, &nearby_memory());
    settle().await;
    queue.clear();
    assert!(!player.finish());
    settle().await;

    let events = drain(&mut rx);
    assert!(!events
        .iter()
        .any(|e| matches!(e, PlaybackEvent::Finished { .. })));
}

// =============================================================================
// Failures and unlock
// =============================================================================

#[tokio::test]
async fn test_failed_playback_advances_queue() {
    let broken = nearby_memory();
    let healthy = nearby_memory();
    let player = MockAudioPlayer::new().failing_on(broken.audio_url.clone().unwrap());
    let (queue, player) = queue_with(player);
    let mut rx = queue.subscribe();

    assert_eq!(add(&queue, &broken), AddOutcome::Started);
    add(&queue, &healthy);
    settle().await;

    assert_eq!(
        queue.currently_playing().map(|e| e.memory.id),
        Some(healthy.id)
    );
    assert_eq!(player.now_playing(), healthy.audio_url.clone());
    assert!(drain(&mut rx).iter().any(
        |e| matches!(e, PlaybackEvent::Failed { memory_id, .. } if *memory_id == broken.id)
    ));
}

#[tokio::test]
async fn test_failure_reported_mid_clip() {
    let (queue, player) = queue_with(MockAudioPlayer::new());
    add(&queue, &nearby_memory());
    settle().await;

    assert!(player.fail_current(PlaybackError::Network("connection reset".to_string())));
    settle().await;
    assert!(queue.currently_playing().is_none());
    assert_eq!(queue.queue_state(), QueueState::Empty);
}

#[tokio::test]
async fn test_locked_output_keeps_entries_until_unlock() {
    let (queue, player) = queue_with(MockAudioPlayer::new().requiring_unlock());
    let memory = nearby_memory();

    assert!(!queue.is_unlocked());
    assert_eq!(add(&queue, &memory), AddOutcome::Enqueued { position: 1 });
    settle().await;
    assert_eq!(player.play_count(), 0);
    assert_eq!(queue.queue_state(), QueueState::Queued);

    queue.unlock_audio().await.unwrap();
    assert!(queue.is_unlocked());
    assert_eq!(
        queue.currently_playing().map(|e| e.memory.id),
        Some(memory.id)
    );
    settle().await;
    assert_eq!(
        player.calls(),
        vec![
            PlayerCall::Unlock(SILENT_CLIP.to_string()),
            PlayerCall::Play(memory.audio_url.clone().unwrap()),
        ]
    );
}

#[tokio::test]
async fn test_failed_unlock_is_reported() {
    let player = MockAudioPlayer::new()
        .requiring_unlock()
        .with_unlock_result(Err(PlaybackError::Locked));
    let (queue, player) = queue_with(player);

    add(&queue, &nearby_memory());
    assert_eq!(queue.unlock_audio().await, Err(PlaybackError::Locked));
    assert!(!queue.is_unlocked());
    assert_eq!(queue.queue_length(), 1);
    assert_eq!(player.play_count(), 0);
}

#[tokio::test]
async fn test_unlock_uses_configured_clip() {
    let player = Arc::new(MockAudioPlayer::new().requiring_unlock());
    let config = QueueConfig {
        unlock_clip_url: Some("https://cdn.example.com/silence.mp3".to_string()),
        ..QueueConfig::default()
    };
    let queue = AudioQueue::new(player.clone(), &config);

    queue.unlock_audio().await.unwrap();
    assert_eq!(
        player.calls(),
        vec![PlayerCall::Unlock(
            "https://cdn.example.com/silence.mp3".to_string()
        )]
    );
}

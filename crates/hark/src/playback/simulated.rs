//! Simulated audio output
//!
//! Logs each clip and waits for a fixed duration instead of producing sound.
//! Pausing suspends the remaining time. Used for replaying recorded traces
//! on machines without audio hardware.

use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::watch;
use tokio::time::Instant;
use tracing::{debug, info};

use crate::playback::player::{AudioPlayer, PlaybackError};

/// Player that "plays" every clip for `clip_duration`
#[derive(Debug)]
pub struct SimulatedPlayer {
    clip_duration: Duration,
    paused: watch::Sender<bool>,
    stopped: watch::Sender<u64>,
}

impl SimulatedPlayer {
    pub fn new(clip_duration: Duration) -> Self {
        Self {
            clip_duration,
            paused: watch::Sender::new(false),
            stopped: watch::Sender::new(0),
        }
    }

    pub fn clip_duration(&self) -> Duration {
        self.clip_duration
    }
}

#[async_trait]
impl AudioPlayer for SimulatedPlayer {
    async fn play(&self, url: &str) -> Result<(), PlaybackError> {
        if url.trim().is_empty() {
            return Err(PlaybackError::Unsupported("empty audio url".to_string()));
        }

        info!("Playing {url} ({:?})", self.clip_duration);
        let mut paused = self.paused.subscribe();
        let mut stopped = self.stopped.subscribe();
        let mut remaining = self.clip_duration;

        loop {
            if *paused.borrow_and_update() {
                tokio::select! {
                    changed = paused.changed() => {
                        if changed.is_err() {
                            return Ok(());
                        }
                    }
                    _ = stopped.changed() => return Ok(()),
                }
                continue;
            }

            let started = Instant::now();
            tokio::select! {
                _ = tokio::time::sleep(remaining) => {
                    debug!("Finished {url}");
                    return Ok(());
                }
                changed = paused.changed() => {
                    if changed.is_err() {
                        return Ok(());
                    }
                    remaining = remaining.saturating_sub(started.elapsed());
                }
                _ = stopped.changed() => return Ok(()),
            }
        }
    }

    fn pause(&self) {
        debug!("Pausing simulated output");
        self.paused.send_replace(true);
    }

    fn resume(&self) {
        debug!("Resuming simulated output");
        self.paused.send_replace(false);
    }

    fn stop(&self) {
        self.paused.send_replace(false);
        self.stopped.send_modify(|n| *n += 1);
    }

    async fn unlock(&self, _clip_url: &str) -> Result<(), PlaybackError> {
        debug!("Simulated output needs no unlock");
        Ok(())
    }

    fn name(&self) -> &'static str {
        "simulated"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[tokio::test(start_paused = true)]
    async fn test_play_takes_clip_duration() {
        let player = SimulatedPlayer::new(Duration::from_secs(3));
        let started = Instant::now();
        player.play("https://cdn.example.com/a.mp3").await.unwrap();
        assert_eq!(started.elapsed(), Duration::from_secs(3));
    }

    #[tokio::test(start_paused = true)]
    async fn test_pause_extends_playback() {
        let player = Arc::new(SimulatedPlayer::new(Duration::from_secs(3)));
        let started = Instant::now();

        let task = {
            let player = player.clone();
            tokio::spawn(async move { player.play("https://cdn.example.com/a.mp3").await })
        };

        tokio::time::sleep(Duration::from_secs(1)).await;
        player.pause();
        tokio::time::sleep(Duration::from_secs(10)).await;
        assert!(!task.is_finished());
        player.resume();

        task.await.unwrap().unwrap();
        assert_eq!(started.elapsed(), Duration::from_secs(13));
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_ends_playback_early() {
        let player = Arc::new(SimulatedPlayer::new(Duration::from_secs(60)));
        let task = {
            let player = player.clone();
            tokio::spawn(async move { player.play("https://cdn.example.com/a.mp3").await })
        };

        tokio::time::sleep(Duration::from_secs(1)).await;
        player.stop();
        tokio::time::timeout(Duration::from_secs(1), task)
            .await
            .expect("play should return after stop")
            .unwrap()
            .unwrap();
    }

    #[tokio::test]
    async fn test_empty_url_is_rejected() {
        let player = SimulatedPlayer::new(Duration::from_millis(1));
        assert!(matches!(
            player.play("").await,
            Err(PlaybackError::Unsupported(_))
        ));
    }
}

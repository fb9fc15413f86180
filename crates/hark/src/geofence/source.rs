//! Collaborators of the geofencing coordinator
//!
//! The coordinator reads candidate memories from a MemorySource and reports
//! plays to a PlayRecorder. Both are async traits so a remote service, a
//! local cache or an in-process fixture can stand behind them.

use std::sync::{Arc, Mutex, PoisonError};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::Result;
use crate::geo;
use crate::memory::types::{LocationSample, Memory};

/// Provides memories near a point
#[async_trait]
pub trait MemorySource: Send + Sync {
    /// Memories whose center lies within `radius_m` of the query point.
    ///
    /// An empty result is `Ok(vec![])`, never an error.
    async fn fetch_near(&self, latitude: f64, longitude: f64, radius_m: f64)
    -> Result<Vec<Memory>>;

    /// Source name for logging
    fn name(&self) -> &'static str;
}

/// A memory being played for a listener at a position
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlayEvent {
    pub memory_id: Uuid,
    /// Listener, `None` when anonymous
    pub user_id: Option<Uuid>,
    pub latitude: f64,
    pub longitude: f64,
    pub timestamp: DateTime<Utc>,
}

impl PlayEvent {
    pub fn new(memory_id: Uuid, user_id: Option<Uuid>, at: &LocationSample) -> Self {
        Self {
            memory_id,
            user_id,
            latitude: at.latitude,
            longitude: at.longitude,
            timestamp: Utc::now(),
        }
    }
}

/// Records play events for analytics
#[async_trait]
pub trait PlayRecorder: Send + Sync {
    async fn record_play(&self, event: &PlayEvent) -> Result<()>;
}

/// MemorySource over a fixed set of memories
#[derive(Debug, Clone, Default)]
pub struct InMemorySource {
    memories: Arc<Mutex<Vec<Memory>>>,
}

impl InMemorySource {
    pub fn new(memories: Vec<Memory>) -> Self {
        Self {
            memories: Arc::new(Mutex::new(memories)),
        }
    }

    pub fn from_file(path: &std::path::Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let memories: Vec<Memory> = serde_json::from_str(&content)?;
        Ok(Self::new(memories))
    }

    /// Snapshot of every stored memory
    pub fn memories(&self) -> Vec<Memory> {
        self.memories
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn insert(&self, memory: Memory) {
        self.memories
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(memory);
    }

    pub fn len(&self) -> usize {
        self.memories
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl MemorySource for InMemorySource {
    async fn fetch_near(
        &self,
        latitude: f64,
        longitude: f64,
        radius_m: f64,
    ) -> Result<Vec<Memory>> {
        let memories = self
            .memories
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        Ok(memories
            .iter()
            .filter(|m| geo::distance(latitude, longitude, m.latitude, m.longitude) <= radius_m)
            .cloned()
            .collect())
    }

    fn name(&self) -> &'static str {
        "in-memory"
    }
}

/// PlayRecorder that keeps every event in memory
#[derive(Debug, Clone, Default)]
pub struct RecordingPlayRecorder {
    events: Arc<Mutex<Vec<PlayEvent>>>,
}

impl RecordingPlayRecorder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<PlayEvent> {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn len(&self) -> usize {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl PlayRecorder for RecordingPlayRecorder {
    async fn record_play(&self, event: &PlayEvent) -> Result<()> {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(event.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_in_memory_source_filters_by_center_distance() {
        let near = Memory::new("near", 37.8720, -122.2580, 20.0);
        let far = Memory::new("far", 37.9000, -122.2580, 20.0);
        let source = InMemorySource::new(vec![near.clone(), far]);

        let found = source.fetch_near(37.8721, -122.2580, 500.0).await.unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].id, near.id);
    }

    #[tokio::test]
    async fn test_in_memory_source_empty_is_ok() {
        let source = InMemorySource::default();
        assert!(source.fetch_near(0.0, 0.0, 500.0).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_recording_play_recorder() {
        let recorder = RecordingPlayRecorder::new();
        let at = LocationSample::new(1.0, 2.0);
        let event = PlayEvent::new(Uuid::new_v4(), None, &at);

        recorder.record_play(&event).await.unwrap();
        assert_eq!(recorder.events(), vec![event]);
    }

    #[test]
    fn test_play_event_serializes_flat() {
        let event = PlayEvent::new(Uuid::nil(), None, &LocationSample::new(1.5, 2.5));
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["latitude"], 1.5);
        assert_eq!(json["user_id"], serde_json::Value::Null);
        assert!(json["timestamp"].is_string());
    }
}

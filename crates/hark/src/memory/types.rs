//! Memory types for the Hark system
//!
//! A memory is a geolocated voice note owned by the external memory
//! service. The engine only reads memories; it never mutates or persists them.

use std::collections::HashSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::geo::{self, Coordinates};

/// A geolocated audio/text note with a circular trigger region.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Memory {
    /// Unique identifier for this memory
    pub id: Uuid,
    /// Author of the memory, `None` for anonymous notes
    #[serde(rename = "user_id", default)]
    pub author_id: Option<Uuid>,
    /// Transcript or caption
    #[serde(default)]
    pub text: String,
    /// Latitude of the geofence center in degrees
    pub latitude: f64,
    /// Longitude of the geofence center in degrees
    pub longitude: f64,
    /// Trigger radius in meters
    pub radius_m: f64,
    /// Opaque fetchable audio location; memories without audio never play
    #[serde(default)]
    pub audio_url: Option<String>,
    /// Who may hear this memory
    #[serde(default)]
    pub privacy: Privacy,
    /// When this memory was created
    pub created_at: DateTime<Utc>,
}

impl Memory {
    /// Create a public, anonymous memory without audio
    pub fn new(text: impl Into<String>, latitude: f64, longitude: f64, radius_m: f64) -> Self {
        Self {
            id: Uuid::new_v4(),
            author_id: None,
            text: text.into(),
            latitude,
            longitude,
            radius_m,
            audio_url: None,
            privacy: Privacy::Public,
            created_at: Utc::now(),
        }
    }

    pub fn with_audio(mut self, url: impl Into<String>) -> Self {
        self.audio_url = Some(url.into());
        self
    }

    pub fn with_author(mut self, author_id: Uuid) -> Self {
        self.author_id = Some(author_id);
        self
    }

    pub fn with_privacy(mut self, privacy: Privacy) -> Self {
        self.privacy = privacy;
        self
    }

    pub fn with_created_at(mut self, created_at: DateTime<Utc>) -> Self {
        self.created_at = created_at;
        self
    }

    /// Audio URL if this memory can be played
    pub fn playable_url(&self) -> Option<&str> {
        self.audio_url.as_deref().filter(|url| !url.trim().is_empty())
    }

    pub fn is_playable(&self) -> bool {
        self.playable_url().is_some()
    }

    pub fn coordinates(&self) -> Coordinates {
        Coordinates::new(self.latitude, self.longitude)
    }

    /// Distance in meters from the geofence center to a sample
    pub fn distance_to(&self, at: &LocationSample) -> f64 {
        geo::distance(self.latitude, self.longitude, at.latitude, at.longitude)
    }

    /// Whether a sample lies within this memory's own trigger radius
    pub fn is_in_range(&self, at: &LocationSample) -> bool {
        self.distance_to(at) <= self.radius_m
    }
}

/// Visibility tier of a memory
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Privacy {
    /// Only the author
    Private,
    /// The author and their friends
    Friends,
    /// Everyone
    #[default]
    Public,
}

impl Privacy {
    pub fn as_str(&self) -> &'static str {
        match self {
            Privacy::Private => "private",
            Privacy::Friends => "friends",
            Privacy::Public => "public",
        }
    }
}

/// A single position fix
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LocationSample {
    pub latitude: f64,
    pub longitude: f64,
    /// Reported horizontal accuracy in meters, if known
    #[serde(default)]
    pub accuracy_m: Option<f64>,
    /// When the fix was captured
    pub timestamp: DateTime<Utc>,
}

impl LocationSample {
    /// A sample captured now with unknown accuracy
    pub fn new(latitude: f64, longitude: f64) -> Self {
        Self {
            latitude,
            longitude,
            accuracy_m: None,
            timestamp: Utc::now(),
        }
    }

    pub fn with_accuracy(mut self, accuracy_m: f64) -> Self {
        self.accuracy_m = Some(accuracy_m);
        self
    }

    pub fn coordinates(&self) -> Coordinates {
        Coordinates::new(self.latitude, self.longitude)
    }
}

/// The listening user, as far as the engine needs to know them.
///
/// Friendship resolution happens outside the engine; callers pass the
/// already-resolved friend set.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Viewer {
    pub user_id: Option<Uuid>,
    pub friend_ids: HashSet<Uuid>,
}

impl Viewer {
    pub fn anonymous() -> Self {
        Self::default()
    }

    pub fn new(user_id: Uuid) -> Self {
        Self {
            user_id: Some(user_id),
            friend_ids: HashSet::new(),
        }
    }

    pub fn with_friends(mut self, friends: impl IntoIterator<Item = Uuid>) -> Self {
        self.friend_ids.extend(friends);
        self
    }

    pub fn is_owner(&self, memory: &Memory) -> bool {
        matches!((self.user_id, memory.author_id), (Some(me), Some(author)) if me == author)
    }

    pub fn is_friend(&self, memory: &Memory) -> bool {
        memory
            .author_id
            .is_some_and(|author| self.friend_ids.contains(&author))
    }

    /// Whether this viewer may hear `memory` given its privacy tier
    pub fn can_hear(&self, memory: &Memory) -> bool {
        match memory.privacy {
            Privacy::Public => true,
            Privacy::Friends => self.is_owner(memory) || self.is_friend(memory),
            Privacy::Private => self.is_owner(memory),
        }
    }
}

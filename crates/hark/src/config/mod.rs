use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{HarkError, Result};

/// Main configuration structure for Hark
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
pub struct Config {
    /// Geofence check loop configuration
    #[serde(default)]
    pub geofence: GeofenceConfig,
    /// Audio queue configuration
    #[serde(default)]
    pub queue: QueueConfig,
    /// Candidate ranking configuration
    #[serde(default)]
    pub scoring: ScoringConfig,
    /// Location sampling configuration
    #[serde(default)]
    pub tracker: TrackerConfig,
    /// Remote memory service configuration
    #[serde(default)]
    pub remote: RemoteConfig,
}

impl Config {
    /// Load configuration from an explicit file path
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            HarkError::Config(format!(
                "Failed to read config file {}: {}",
                path.display(),
                e
            ))
        })?;
        toml::from_str(&content)
            .map_err(|e| HarkError::Config(format!("Failed to parse config: {e}")))
    }

    /// Load configuration from `path` if given, otherwise from the first
    /// default location that exists, otherwise defaults.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        if let Some(path) = path {
            tracing::info!("Loading config from: {}", path.display());
            return Self::from_file(path);
        }

        for candidate in default_config_paths() {
            if candidate.exists() {
                tracing::info!("Loading config from: {}", candidate.display());
                return Self::from_file(&candidate);
            }
        }

        tracing::info!("No config file found, using defaults");
        Ok(Config::default())
    }
}

fn default_config_paths() -> Vec<PathBuf> {
    [
        dirs::home_dir().map(|h| h.join(".hark").join("config.toml")),
        dirs::config_dir().map(|c| c.join("hark").join("config.toml")),
        Some(PathBuf::from("config.toml")),
    ]
    .into_iter()
    .flatten()
    .collect()
}

/// Geofence check loop configuration
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct GeofenceConfig {
    /// Milliseconds between nearby-memory checks
    #[serde(default = "default_sample_interval_ms")]
    pub sample_interval_ms: u64,
    /// Radius in meters passed to the memory fetch query
    #[serde(default = "default_max_radius_m")]
    pub max_radius_m: f64,
    /// Upper bound on a single memory fetch, in milliseconds
    #[serde(default = "default_fetch_timeout_ms")]
    pub fetch_timeout_ms: u64,
    /// Keep sampling while the host app is backgrounded
    #[serde(default)]
    pub background_tracking: bool,
}

impl GeofenceConfig {
    pub fn sample_interval(&self) -> Duration {
        Duration::from_millis(self.sample_interval_ms.max(1))
    }

    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_millis(self.fetch_timeout_ms)
    }
}

impl Default for GeofenceConfig {
    fn default() -> Self {
        Self {
            sample_interval_ms: default_sample_interval_ms(),
            max_radius_m: default_max_radius_m(),
            fetch_timeout_ms: default_fetch_timeout_ms(),
            background_tracking: false,
        }
    }
}

fn default_sample_interval_ms() -> u64 {
    5_000
}

fn default_max_radius_m() -> f64 {
    500.0
}

fn default_fetch_timeout_ms() -> u64 {
    10_000
}

/// Audio queue configuration
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct QueueConfig {
    /// Seconds before the same memory may be enqueued again
    #[serde(default = "default_cooldown_secs")]
    pub cooldown_secs: u64,
    /// Maximum number of memory ids remembered for cooldown purposes
    #[serde(default = "default_cooldown_capacity")]
    pub cooldown_capacity: usize,
    /// Near-silent clip used to unlock audio on autoplay-restricted platforms
    #[serde(default)]
    pub unlock_clip_url: Option<String>,
    /// Capacity of the playback event broadcast channel
    #[serde(default = "default_event_capacity")]
    pub event_capacity: usize,
}

impl QueueConfig {
    pub fn cooldown(&self) -> Duration {
        Duration::from_secs(self.cooldown_secs)
    }
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            cooldown_secs: default_cooldown_secs(),
            cooldown_capacity: default_cooldown_capacity(),
            unlock_clip_url: None,
            event_capacity: default_event_capacity(),
        }
    }
}

fn default_cooldown_secs() -> u64 {
    300
}

fn default_cooldown_capacity() -> usize {
    1000
}

fn default_event_capacity() -> usize {
    64
}

/// Candidate ranking configuration
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct ScoringConfig {
    /// Distances are compared in buckets of this many meters; the closer
    /// bucket always wins
    #[serde(default = "default_distance_resolution_m")]
    pub distance_resolution_m: f64,
    /// Priority added when the listener authored the memory
    #[serde(default = "default_owner_boost")]
    pub owner_boost: f64,
    /// Priority added when the author is a friend of the listener
    #[serde(default = "default_friend_boost")]
    pub friend_boost: f64,
    /// Weight of the freshness term
    #[serde(default = "default_freshness_weight")]
    pub freshness_weight: f64,
    /// Freshness decay per day of memory age
    #[serde(default = "default_decay_rate")]
    pub decay_rate: f64,
}

impl Default for ScoringConfig {
    fn default() -> Self {
        Self {
            distance_resolution_m: default_distance_resolution_m(),
            owner_boost: default_owner_boost(),
            friend_boost: default_friend_boost(),
            freshness_weight: default_freshness_weight(),
            decay_rate: default_decay_rate(),
        }
    }
}

fn default_distance_resolution_m() -> f64 {
    1.0
}

fn default_owner_boost() -> f64 {
    0.3
}

fn default_friend_boost() -> f64 {
    0.15
}

fn default_freshness_weight() -> f64 {
    0.2
}

fn default_decay_rate() -> f64 {
    0.05
}

/// Location sampling configuration
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct TrackerConfig {
    /// Maximum wait for a position fix, in milliseconds
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
    /// Maximum age of a cached position still considered usable
    #[serde(default = "default_maximum_age_ms")]
    pub maximum_age_ms: u64,
    /// Ask the platform for high-accuracy positioning
    #[serde(default = "default_high_accuracy")]
    pub high_accuracy: bool,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            timeout_ms: default_timeout_ms(),
            maximum_age_ms: default_maximum_age_ms(),
            high_accuracy: default_high_accuracy(),
        }
    }
}

fn default_timeout_ms() -> u64 {
    15_000
}

fn default_maximum_age_ms() -> u64 {
    30_000
}

fn default_high_accuracy() -> bool {
    true
}

/// Remote memory service (PostgREST/Supabase) configuration
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct RemoteConfig {
    /// Project base URL, e.g. "https://xyz.supabase.co"
    #[serde(default)]
    pub base_url: String,
    /// Environment variable holding the anon/service key
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,
    /// Name of the nearest-neighbour RPC function
    #[serde(default = "default_nearby_function")]
    pub nearby_function: String,
    /// Request timeout in seconds
    #[serde(default = "default_remote_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for RemoteConfig {
    fn default() -> Self {
        Self {
            base_url: String::new(),
            api_key_env: default_api_key_env(),
            nearby_function: default_nearby_function(),
            timeout_secs: default_remote_timeout_secs(),
        }
    }
}

fn default_api_key_env() -> String {
    "HARK_API_KEY".to_string()
}

fn default_nearby_function() -> String {
    "memories_near".to_string()
}

fn default_remote_timeout_secs() -> u64 {
    10
}

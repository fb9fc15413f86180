//! Supabase (PostgREST) memory service client
//!
//! Implements MemorySource and PlayRecorder over the PostgREST HTTP API.
//! Nearby memories come from an RPC function; projects that have not
//! deployed it fall back to a bounding-box query filtered locally by
//! great-circle distance.

use std::env;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, StatusCode};
use serde::Serialize;
use tracing::{debug, info, warn};
use url::Url;

use crate::config::RemoteConfig;
use crate::error::{HarkError, Result};
use crate::geo::{self, BoundingBox, Coordinates};
use crate::geofence::{MemorySource, PlayEvent, PlayRecorder};
use crate::memory::Memory;

const MEMORIES_TABLE: &str = "memories";
const PLAYS_TABLE: &str = "memory_plays";

/// Arguments of the nearest-neighbour RPC function
#[derive(Debug, Serialize)]
struct NearbyArgs {
    lat: f64,
    lng: f64,
    radius_m: f64,
}

/// Memory service client backed by a Supabase project
#[derive(Debug)]
pub struct SupabaseClient {
    client: Client,
    base_url: Url,
    api_key: String,
    nearby_function: String,
}

impl SupabaseClient {
    /// Create a client from configuration.
    ///
    /// Reads the API key from the environment variable named by
    /// `config.api_key_env`.
    pub fn new(config: &RemoteConfig) -> Result<Self> {
        let api_key = env::var(&config.api_key_env).map_err(|_| {
            HarkError::Config(format!(
                "API key env var '{}' not set",
                config.api_key_env
            ))
        })?;
        Self::with_api_key(config, api_key)
    }

    pub fn with_api_key(config: &RemoteConfig, api_key: impl Into<String>) -> Result<Self> {
        if config.base_url.trim().is_empty() {
            return Err(HarkError::Config("remote.base_url is not set".to_string()));
        }
        // Trailing slash so joins append instead of replacing the last segment
        let base = format!("{}/", config.base_url.trim_end_matches('/'));
        let base_url = Url::parse(&base)
            .map_err(|e| HarkError::Config(format!("Invalid base_url '{}': {e}", config.base_url)))?;

        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| HarkError::Config(e.to_string()))?;

        info!(
            "SupabaseClient initialized for {} (rpc: {})",
            base_url, config.nearby_function
        );

        Ok(Self {
            client,
            base_url,
            api_key: api_key.into(),
            nearby_function: config.nearby_function.clone(),
        })
    }

    fn endpoint(&self, path: &str) -> Result<Url> {
        self.base_url
            .join(path)
            .map_err(|e| HarkError::Config(format!("Invalid endpoint {path}: {e}")))
    }

    fn authorize(&self, request: RequestBuilder) -> RequestBuilder {
        request
            .header("apikey", &self.api_key)
            .header("Authorization", format!("Bearer {}", self.api_key))
    }

    /// Call the RPC function. `Ok(None)` means the function does not exist.
    async fn fetch_via_rpc(&self, args: &NearbyArgs) -> Result<Option<Vec<Memory>>> {
        let url = self.endpoint(&format!("rest/v1/rpc/{}", self.nearby_function))?;
        debug!("Calling nearby RPC at: {}", url);

        let response = self
            .authorize(self.client.post(url))
            .json(args)
            .send()
            .await
            .map_err(|e| HarkError::Fetch(e.to_string()))?;

        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(HarkError::Fetch(format!("rpc returned {status}: {body}")));
        }

        let memories = response
            .json::<Vec<Memory>>()
            .await
            .map_err(|e| HarkError::Fetch(format!("Invalid rpc response: {e}")))?;
        Ok(Some(memories))
    }

    /// Bounding-box query narrowed to the exact radius locally
    async fn fetch_via_bbox(&self, args: &NearbyArgs) -> Result<Vec<Memory>> {
        let center = Coordinates::new(args.lat, args.lng);
        let bbox = BoundingBox::around(center, args.radius_m);
        let url = self.endpoint(&format!("rest/v1/{MEMORIES_TABLE}"))?;
        debug!("Querying bounding box at: {}", url);

        let response = self
            .authorize(self.client.get(url))
            .query(&[
                ("select", "*".to_string()),
                ("latitude", format!("gte.{}", bbox.min_lat)),
                ("latitude", format!("lte.{}", bbox.max_lat)),
                ("longitude", format!("gte.{}", bbox.min_lng)),
                ("longitude", format!("lte.{}", bbox.max_lng)),
            ])
            .send()
            .await
            .map_err(|e| HarkError::Fetch(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(HarkError::Fetch(format!("query returned {status}: {body}")));
        }

        let memories = response
            .json::<Vec<Memory>>()
            .await
            .map_err(|e| HarkError::Fetch(format!("Invalid query response: {e}")))?;

        Ok(memories
            .into_iter()
            .filter(|m| geo::distance(args.lat, args.lng, m.latitude, m.longitude) <= args.radius_m)
            .collect())
    }
}

#[async_trait]
impl MemorySource for SupabaseClient {
    async fn fetch_near(
        &self,
        latitude: f64,
        longitude: f64,
        radius_m: f64,
    ) -> Result<Vec<Memory>> {
        let args = NearbyArgs {
            lat: latitude,
            lng: longitude,
            radius_m,
        };
        match self.fetch_via_rpc(&args).await? {
            Some(memories) => Ok(memories),
            None => {
                warn!(
                    "RPC '{}' not found, falling back to bounding-box query",
                    self.nearby_function
                );
                self.fetch_via_bbox(&args).await
            }
        }
    }

    fn name(&self) -> &'static str {
        "supabase"
    }
}

#[async_trait]
impl PlayRecorder for SupabaseClient {
    async fn record_play(&self, event: &PlayEvent) -> Result<()> {
        let url = self.endpoint(&format!("rest/v1/{PLAYS_TABLE}"))?;
        let response = self
            .authorize(self.client.post(url))
            .header("Prefer", "return=minimal")
            .json(event)
            .send()
            .await
            .map_err(|e| HarkError::Record(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(HarkError::Record(format!("insert returned {status}: {body}")));
        }
        debug!("Recorded play of {}", event.memory_id);
        Ok(())
    }
}

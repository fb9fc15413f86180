use clap::Parser;
use comfy_table::{ContentArrangement, Table, presets::UTF8_FULL_CONDENSED};
use hark::config::Config;
use hark::geofence::MemorySource;
use hark::memory::{LocationSample, MemoryScorer, ScoredMemory};
use hark::remote::SupabaseClient;

use crate::commands::viewer_from_args;
use crate::error::CliResult;
use crate::output::{OutputFormat, format_distance, format_timestamp, short_id, truncate_string};

#[derive(Parser)]
pub struct NearbyCommand {
    #[clap(long, allow_hyphen_values = true, help = "Latitude in degrees")]
    pub lat: f64,

    #[clap(long, allow_hyphen_values = true, help = "Longitude in degrees")]
    pub lng: f64,

    #[clap(long, help = "Query radius in meters (defaults to geofence.max_radius_m)")]
    pub radius: Option<f64>,

    #[clap(long, help = "Listener user ID (UUID format)")]
    pub user: Option<String>,

    #[clap(long, help = "Friend user ID (UUID format); may be repeated")]
    pub friend: Vec<String>,

    #[clap(long, short, default_value = "20", help = "Maximum number of memories to display")]
    pub limit: usize,
}

impl NearbyCommand {
    pub async fn execute(&self, config: &Config, format: OutputFormat) -> CliResult<()> {
        let client = SupabaseClient::new(&config.remote)?;
        let ranked = self.rank(&client, config).await?;
        print_ranked(&ranked, format)
    }

    /// Memories audible at the query point, best first
    pub async fn rank(
        &self,
        source: &dyn MemorySource,
        config: &Config,
    ) -> CliResult<Vec<ScoredMemory>> {
        let viewer = viewer_from_args(self.user.as_deref(), &self.friend)?;
        let radius = self.radius.unwrap_or(config.geofence.max_radius_m);
        if radius.is_nan() || radius <= 0.0 {
            return Err(format!("Radius must be positive, got {radius}").into());
        }

        let candidates = source.fetch_near(self.lat, self.lng, radius).await?;
        let here = LocationSample::new(self.lat, self.lng);
        let mut ranked =
            MemoryScorer::new(config.scoring.clone()).rank(&candidates, &here, Some(&viewer));
        ranked.truncate(self.limit);
        Ok(ranked)
    }
}

fn print_ranked(ranked: &[ScoredMemory], format: OutputFormat) -> CliResult<()> {
    match format {
        OutputFormat::Json => {
            let output: Vec<_> = ranked
                .iter()
                .map(|s| {
                    serde_json::json!({
                        "id": s.memory.id.to_string(),
                        "text": &s.memory.text,
                        "distance_m": s.distance_m,
                        "radius_m": s.memory.radius_m,
                        "score": s.score,
                        "privacy": s.memory.privacy.as_str(),
                        "is_owner": s.is_owner,
                        "is_friend": s.is_friend,
                        "audio_url": &s.memory.audio_url,
                        "created_at": s.memory.created_at.to_rfc3339(),
                    })
                })
                .collect();
            println!("{}", serde_json::to_string_pretty(&output)?);
        }
        OutputFormat::Table => {
            if ranked.is_empty() {
                println!("No memories in range.");
                return Ok(());
            }

            let mut table = Table::new();
            table
                .load_preset(UTF8_FULL_CONDENSED)
                .set_content_arrangement(ContentArrangement::Dynamic)
                .set_header([
                    "#", "ID", "Distance", "Radius", "Score", "Privacy", "Text", "Created",
                ]);

            for (rank, scored) in ranked.iter().enumerate() {
                table.add_row([
                    (rank + 1).to_string(),
                    short_id(&scored.memory.id),
                    format_distance(scored.distance_m),
                    format_distance(scored.memory.radius_m),
                    format!("{:.3}", scored.score),
                    scored.memory.privacy.as_str().to_string(),
                    truncate_string(&scored.memory.text, 40),
                    format_timestamp(&scored.memory.created_at),
                ]);
            }

            println!("{table}");
            println!("\nTotal: {} memories in range", ranked.len());
        }
    }

    Ok(())
}

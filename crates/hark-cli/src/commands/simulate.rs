use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use comfy_table::{ContentArrangement, Table, presets::UTF8_FULL_CONDENSED};
use hark::config::Config;
use hark::geofence::{GeofenceCoordinator, InMemorySource, PlayEvent, RecordingPlayRecorder};
use hark::location::{LocationTracker, ReplayPositionSource, WatchOptions};
use hark::memory::MemoryScorer;
use hark::playback::{AudioQueue, PlaybackEvent, QueueState, SimulatedPlayer};
use tokio::sync::broadcast::error::RecvError;
use tokio::time::Instant;
use uuid::Uuid;

use crate::commands::viewer_from_args;
use crate::error::CliResult;
use crate::output::{OutputFormat, format_timestamp, short_id, truncate_string};

#[derive(Parser)]
pub struct SimulateCommand {
    #[clap(long, help = "Recorded location trace (JSON array of points)")]
    pub trace: PathBuf,

    #[clap(long, help = "Memories to replay against (JSON array)")]
    pub memories: PathBuf,

    #[clap(long, help = "Listener user ID (UUID format)")]
    pub user: Option<String>,

    #[clap(long, help = "Friend user ID (UUID format); may be repeated")]
    pub friend: Vec<String>,

    #[clap(long, default_value = "5", help = "Simulated clip length in seconds")]
    pub clip_secs: u64,
}

/// Everything that happened during a replay
#[derive(Debug, Default)]
pub struct SimulationReport {
    /// Playback events with their offset from the start of the replay
    pub events: Vec<(Duration, PlaybackEvent)>,
    pub plays: Vec<PlayEvent>,
}

impl SimulationReport {
    /// Memories that started playing, in order
    pub fn started(&self) -> Vec<Uuid> {
        self.events
            .iter()
            .filter_map(|(_, event)| match event {
                PlaybackEvent::Started { memory_id } => Some(*memory_id),
                _ => None,
            })
            .collect()
    }
}

impl SimulateCommand {
    pub async fn execute(&self, config: &Config, format: OutputFormat) -> CliResult<()> {
        let texts: HashMap<Uuid, String> = InMemorySource::from_file(&self.memories)?
            .memories()
            .into_iter()
            .map(|m| (m.id, m.text))
            .collect();

        let run = self.run(config, |elapsed, event| {
            print_event(elapsed, event, &texts, format);
        });

        tokio::select! {
            report = run => print_summary(&report?, &texts, format),
            _ = tokio::signal::ctrl_c() => {
                println!("Interrupted");
                Ok(())
            }
        }
    }

    /// Replay the trace and collect what would have played.
    ///
    /// Runs until the trace ends and the queue has drained.
    pub async fn run<F>(&self, config: &Config, mut on_event: F) -> CliResult<SimulationReport>
    where
        F: FnMut(Duration, &PlaybackEvent),
    {
        let positions = ReplayPositionSource::from_file(&self.trace)?;
        let trace_duration = positions.duration();
        let source = InMemorySource::from_file(&self.memories)?;
        let viewer = viewer_from_args(self.user.as_deref(), &self.friend)?;
        tracing::info!(
            "Replaying {} points over {:?} against {} memories",
            positions.points().len(),
            trace_duration,
            source.len()
        );

        let clip = Duration::from_secs(self.clip_secs);
        let queue = AudioQueue::new(Arc::new(SimulatedPlayer::new(clip)), &config.queue);
        let mut events = queue.subscribe();
        let recorder = Arc::new(RecordingPlayRecorder::new());
        let coordinator = GeofenceCoordinator::new(
            LocationTracker::new(Arc::new(positions), WatchOptions::from(&config.tracker)),
            queue.clone(),
            MemoryScorer::new(config.scoring.clone()),
            Arc::new(source),
            Some(recorder.clone()),
            config.geofence.clone(),
        );
        coordinator.set_viewer(viewer);

        let started = Instant::now();
        let mut deadline = started + trace_duration + config.geofence.sample_interval();
        let mut report = SimulationReport::default();
        coordinator.start()?;

        loop {
            tokio::select! {
                received = events.recv() => match received {
                    Ok(event) => {
                        let elapsed = started.elapsed();
                        on_event(elapsed, &event);
                        report.events.push((elapsed, event));
                    }
                    Err(RecvError::Lagged(skipped)) => {
                        tracing::warn!("Dropped {skipped} playback events");
                    }
                    Err(RecvError::Closed) => break,
                },
                _ = tokio::time::sleep_until(deadline) => {
                    if matches!(queue.queue_state(), QueueState::Empty | QueueState::Muted) {
                        break;
                    }
                    deadline += clip;
                }
            }
        }

        coordinator.stop();
        report.plays = recorder.events();
        Ok(report)
    }
}

fn print_event(
    elapsed: Duration,
    event: &PlaybackEvent,
    texts: &HashMap<Uuid, String>,
    format: OutputFormat,
) {
    match format {
        OutputFormat::Json => {
            let mut value = serde_json::to_value(event).unwrap_or_default();
            if let Some(object) = value.as_object_mut() {
                object.insert(
                    "elapsed_s".to_string(),
                    serde_json::json!(elapsed.as_secs_f64()),
                );
            }
            println!("{value}");
        }
        OutputFormat::Table => {
            println!("[{:>7.1}s] {}", elapsed.as_secs_f64(), describe(event, texts));
        }
    }
}

fn describe(event: &PlaybackEvent, texts: &HashMap<Uuid, String>) -> String {
    let memory = |id: &Uuid| {
        let text = texts.get(id).map(String::as_str).unwrap_or_default();
        format!("{} \"{}\"", short_id(id), truncate_string(text, 40))
    };
    match event {
        PlaybackEvent::Enqueued {
            memory_id,
            position,
        } => format!("queued    {} at position {position}", memory(memory_id)),
        PlaybackEvent::Started { memory_id } => format!("playing   {}", memory(memory_id)),
        PlaybackEvent::Finished { memory_id } => format!("finished  {}", memory(memory_id)),
        PlaybackEvent::Failed { memory_id, error } => {
            format!("failed    {}: {error}", memory(memory_id))
        }
        PlaybackEvent::Skipped { memory_id } => format!("skipped   {}", memory(memory_id)),
        PlaybackEvent::Muted => "muted".to_string(),
        PlaybackEvent::Unmuted => "unmuted".to_string(),
        PlaybackEvent::Cleared { dropped } => format!("cleared   {dropped} entries"),
        PlaybackEvent::Unlocked => "unlocked".to_string(),
    }
}

fn print_summary(
    report: &SimulationReport,
    texts: &HashMap<Uuid, String>,
    format: OutputFormat,
) -> CliResult<()> {
    match format {
        OutputFormat::Json => {
            let output = serde_json::json!({
                "started": report.started(),
                "plays": report.plays,
            });
            println!("{}", serde_json::to_string_pretty(&output)?);
        }
        OutputFormat::Table => {
            println!();
            if report.plays.is_empty() {
                println!("No memories were played.");
                return Ok(());
            }

            let mut table = Table::new();
            table
                .load_preset(UTF8_FULL_CONDENSED)
                .set_content_arrangement(ContentArrangement::Dynamic)
                .set_header(["#", "ID", "Text", "Latitude", "Longitude", "At"]);

            for (i, play) in report.plays.iter().enumerate() {
                let text = texts.get(&play.memory_id).map(String::as_str).unwrap_or_default();
                table.add_row([
                    (i + 1).to_string(),
                    short_id(&play.memory_id),
                    truncate_string(text, 40),
                    format!("{:.5}", play.latitude),
                    format!("{:.5}", play.longitude),
                    format_timestamp(&play.timestamp),
                ]);
            }

            println!("{table}");
            println!("\nTotal: {} plays", report.plays.len());
        }
    }

    Ok(())
}

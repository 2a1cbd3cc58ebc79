use anyhow::Result;
use clap::{Arg, Command};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn};
use walkdir::WalkDir;

mod config;
mod media;
mod processing;
mod progress;
mod state;

use crate::config::ConverterConfig;
use crate::media::FfmpegConverter;
use crate::processing::BatchCoordinator;
use crate::progress::{
    spawn_drain_loop, BatchControls, PresentationSink, ProgressChannel,
};
use crate::state::{ConversionItem, ItemId};

const VIDEO_EXTENSIONS: [&str; 6] = ["mp4", "mkv", "avi", "mov", "webm", "m4v"];

/// Presentation shell for a terminal session: every sink command becomes a
/// log line on the main task, fed by the drain loop.
struct LoggingSink;

impl PresentationSink for LoggingSink {
    fn add_item_view(&self, item: &ConversionItem) {
        info!("📋 {} queued as {:?}", item.source_path.display(), item.output_base_name);
    }

    fn remove_item_view(&self, id: ItemId) {
        info!("📤 {} done, removed from queue", id);
    }

    fn update_progress(&self, id: ItemId, percent: u8) {
        info!("📊 {} at {}%", id, percent);
    }

    fn set_item_controls_enabled(&self, id: ItemId, enabled: bool) {
        if !enabled {
            info!("🔒 {} locked for conversion", id);
        }
    }

    fn set_batch_controls(&self, controls: BatchControls) {
        info!(
            "🎛 convert {}, cancel {}",
            if controls.convert_enabled { "enabled" } else { "disabled" },
            if controls.cancel_enabled { "enabled" } else { "disabled" },
        );
    }
}

/// Expand input arguments into video files: plain files are taken as-is,
/// directories are walked for known video extensions.
fn collect_videos(inputs: &[String]) -> Vec<PathBuf> {
    let mut videos = Vec::new();
    for input in inputs {
        let path = PathBuf::from(input);
        if path.is_dir() {
            for entry in WalkDir::new(&path).into_iter().filter_map(|e| e.ok()) {
                let entry_path = entry.path();
                let is_video = entry_path
                    .extension()
                    .and_then(|ext| ext.to_str())
                    .map(|ext| VIDEO_EXTENSIONS.contains(&ext.to_lowercase().as_str()))
                    .unwrap_or(false);
                if entry_path.is_file() && is_video {
                    videos.push(entry_path.to_path_buf());
                }
            }
        } else {
            videos.push(path);
        }
    }
    videos
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter("batch_audio_converter=info,warn")
        .init();

    let matches = Command::new("Batch Audio Converter")
        .version("0.1.0")
        .about("Convert a batch of video files to audio with progress and cancellation")
        .arg(
            Arg::new("input")
                .short('i')
                .long("input")
                .value_name("PATH")
                .help("Video file or directory of videos (repeatable)")
                .action(clap::ArgAction::Append)
                .required(true),
        )
        .arg(
            Arg::new("extension")
                .short('e')
                .long("extension")
                .value_name("EXT")
                .help("Output audio extension"),
        )
        .get_matches();

    let inputs: Vec<String> = matches
        .get_many::<String>("input")
        .map(|values| values.cloned().collect())
        .unwrap_or_default();

    // Load configuration
    let mut config = ConverterConfig::load().unwrap_or_else(|e| {
        warn!("Failed to load config, using defaults: {}", e);
        ConverterConfig::default()
    });
    if let Some(extension) = matches.get_one::<String>("extension") {
        config.audio.extension = extension.clone();
    }
    config.validate()?;

    let videos = collect_videos(&inputs);
    if videos.is_empty() {
        warn!("No video files found in the given inputs");
        return Ok(());
    }

    info!("🚀 Batch Audio Converter starting with {} file(s)", videos.len());

    let (events, rx) = ProgressChannel::new();
    let drain = spawn_drain_loop(rx, Arc::new(LoggingSink));

    let converter = Arc::new(FfmpegConverter::new(
        config.audio.codec.clone(),
        config.audio.bitrate.clone(),
    ));
    let coordinator = BatchCoordinator::new(config, converter, events);

    let total = coordinator.add_files(videos).await.len();
    coordinator.start_batch().await;

    // Ctrl-C maps to the cancel command; a second run of the binary resumes
    // nothing because the queue lives for one process only.
    tokio::select! {
        _ = coordinator.wait() => {}
        _ = tokio::signal::ctrl_c() => {
            coordinator.cancel_conversion().await;
            coordinator.wait().await;
        }
    }

    let remaining = coordinator.snapshot_items().await.len();
    info!("🎉 Converted {}/{} file(s)", total - remaining, total);
    if remaining > 0 {
        warn!("{} file(s) left unconverted", remaining);
    }

    // Let the drain loop flush the tail of the channel before exit.
    drop(coordinator);
    let _ = drain.await;

    Ok(())
}

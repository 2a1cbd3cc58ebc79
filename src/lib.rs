/// Batch Audio Converter
///
/// Library core for converting a batch of video files to audio files with
/// per-file progress reporting, cooperative cancellation and resume. The
/// presentation layer (GUI or CLI) stays behind the `PresentationSink`
/// contract and is fed through a single ordered progress channel.

pub mod config;
pub mod media;
pub mod processing;
pub mod progress;
pub mod state;

// Re-export main types for easy access
pub use crate::config::ConverterConfig;
pub use crate::media::{AudioStream, FfmpegConverter, MediaConverter, MediaError, MediaHandle};
pub use crate::processing::BatchCoordinator;
pub use crate::progress::{
    spawn_drain_loop, BatchControls, PresentationSink, ProgressChannel, ProgressSender, UiEvent,
};
pub use crate::state::{BatchRunState, ConversionItem, ItemId, ItemState};

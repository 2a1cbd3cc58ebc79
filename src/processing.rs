use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::config::ConverterConfig;
use crate::media::{MediaConverter, MediaError};
use crate::progress::{BatchControls, ProgressSender, UiEvent};
use crate::state::{BatchRunState, ConversionItem, ItemId, ItemState};

/// How one conversion pass over the queue ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PassOutcome {
    /// Every queued item was converted or skipped.
    Finished,
    /// The cancel flag was observed; the pass stopped at a checkpoint.
    Canceled,
}

/// Orchestrates the ordered conversion queue: one background worker at a
/// time, cooperative cancellation, progress reporting through the channel.
///
/// Presentation-side commands only read state and set flags; the worker is
/// the sole mutator of list membership and item progress while a batch runs.
pub struct BatchCoordinator {
    config: ConverterConfig,
    converter: Arc<dyn MediaConverter>,
    state: Arc<RwLock<BatchRunState>>,
    running: Arc<AtomicBool>,
    cancel_requested: Arc<AtomicBool>,
    events: ProgressSender,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl BatchCoordinator {
    pub fn new(
        config: ConverterConfig,
        converter: Arc<dyn MediaConverter>,
        events: ProgressSender,
    ) -> Self {
        Self {
            config,
            converter,
            state: Arc::new(RwLock::new(BatchRunState::default())),
            running: Arc::new(AtomicBool::new(false)),
            cancel_requested: Arc::new(AtomicBool::new(false)),
            events,
            worker: Mutex::new(None),
        }
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Clone of the current active item list, oldest first.
    pub async fn snapshot_items(&self) -> Vec<ConversionItem> {
        self.state.read().await.items.clone()
    }

    /// Queue files for conversion. Ignored while a batch is running (item
    /// controls are frozen for the whole run).
    pub async fn add_files(&self, paths: Vec<PathBuf>) -> Vec<ItemId> {
        if self.is_running() {
            warn!("add_files ignored: batch is running");
            return Vec::new();
        }

        let mut ids = Vec::with_capacity(paths.len());
        let mut state = self.state.write().await;
        for path in paths {
            let item = ConversionItem::new(path);
            ids.push(item.id);
            info!("➕ Queued {}: {}", item.id, item.source_path.display());
            self.events.send(UiEvent::ItemAdded(item.clone()));
            state.items.push(item);
        }

        if !state.is_empty() {
            self.events.send(UiEvent::BatchControls(BatchControls {
                convert_enabled: true,
                cancel_enabled: false,
            }));
        }
        ids
    }

    /// Change an item's output name. Empty or whitespace-only names are
    /// ignored; surrounding whitespace is trimmed. Ignored while running.
    pub async fn rename_item(&self, id: ItemId, new_name: &str) {
        if self.is_running() {
            warn!("rename_item ignored: batch is running");
            return;
        }

        let trimmed = new_name.trim();
        if trimmed.is_empty() {
            debug!("rename_item ignored: empty name for {}", id);
            return;
        }

        let mut state = self.state.write().await;
        if let Some(item) = state.get_mut(id) {
            info!("✏️ Renamed {} to {:?}", id, trimmed);
            item.output_base_name = trimmed.to_string();
        }
    }

    /// Remove a queued item. Ignored while running or for an unknown id.
    pub async fn delete_item(&self, id: ItemId) {
        if self.is_running() {
            warn!("delete_item ignored: batch is running");
            return;
        }

        let mut state = self.state.write().await;
        if state.remove(id).is_some() {
            info!("🗑 Removed {}", id);
            self.events.send(UiEvent::ItemRemoved(id));
            if state.is_empty() {
                self.events.send(UiEvent::BatchControls(BatchControls {
                    convert_enabled: false,
                    cancel_enabled: false,
                }));
            }
        }
    }

    /// Launch the background conversion worker.
    ///
    /// No-op when the queue is empty or a worker is already active; repeated
    /// calls can never double-launch. Returns whether a worker was launched.
    pub async fn start_batch(&self) -> bool {
        // Reap a worker that is still unwinding after cancellation. It exits
        // at its next checkpoint because the cancel flag is still set here.
        {
            let mut slot = self.worker.lock().await;
            if !self.running.load(Ordering::SeqCst) {
                if let Some(handle) = slot.take() {
                    let _ = handle.await;
                }
            }
        }

        if self.state.read().await.is_empty() {
            debug!("start_batch ignored: no items queued");
            return false;
        }

        if self
            .running
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            debug!("start_batch ignored: batch already running");
            return false;
        }

        self.cancel_requested.store(false, Ordering::SeqCst);
        self.events.send(UiEvent::BatchControls(BatchControls {
            convert_enabled: false,
            cancel_enabled: true,
        }));

        info!("🚀 Starting batch conversion");
        let worker = self.worker_context();
        let handle = tokio::spawn(async move { worker.run().await });
        *self.worker.lock().await = Some(handle);
        true
    }

    /// Request cooperative cancellation.
    ///
    /// Takes effect immediately for the presentation layer; the worker
    /// observes the flag at its next checkpoint (between simulated seconds
    /// or between items) and performs at most one more unit of work.
    pub async fn cancel_conversion(&self) {
        self.cancel_requested.store(true, Ordering::SeqCst);
        self.running.store(false, Ordering::SeqCst);

        info!("🛑 Cancellation requested");
        let state = self.state.read().await;
        for item in &state.items {
            self.events.send(UiEvent::ItemControls {
                id: item.id,
                enabled: true,
            });
        }
        self.events.send(UiEvent::BatchControls(BatchControls {
            convert_enabled: true,
            cancel_enabled: false,
        }));
    }

    /// Wait for the current worker, if any, to finish unwinding.
    pub async fn wait(&self) {
        let handle = self.worker.lock().await.take();
        if let Some(handle) = handle {
            let _ = handle.await;
        }
    }

    /// Lightweight clone of shared state for the spawned worker task.
    fn worker_context(&self) -> WorkerContext {
        WorkerContext {
            config: self.config.clone(),
            converter: Arc::clone(&self.converter),
            state: Arc::clone(&self.state),
            running: Arc::clone(&self.running),
            cancel_requested: Arc::clone(&self.cancel_requested),
            events: self.events.clone(),
        }
    }
}

/// Shared handles the worker task needs; everything else stays with the
/// coordinator on the presentation side.
struct WorkerContext {
    config: ConverterConfig,
    converter: Arc<dyn MediaConverter>,
    state: Arc<RwLock<BatchRunState>>,
    running: Arc<AtomicBool>,
    cancel_requested: Arc<AtomicBool>,
    events: ProgressSender,
}

impl WorkerContext {
    fn cancel_requested(&self) -> bool {
        self.cancel_requested.load(Ordering::SeqCst)
    }

    /// Worker entry point: run conversion passes until the queue is drained,
    /// cancellation is observed, or a fatal error aborts the batch. One
    /// automatic retry is allowed for a transient backend conflict.
    async fn run(self) {
        let mut retries_left = self.config.retry.max_transient_retries;
        loop {
            match self.run_pass().await {
                Ok(PassOutcome::Finished) => {
                    info!("🎉 Batch conversion finished");
                    self.finish_batch().await;
                    return;
                }
                Ok(PassOutcome::Canceled) => {
                    // Controls were already restored by cancel_conversion.
                    info!("⏸ Batch stopped after cancellation; queue is resumable");
                    return;
                }
                Err(e) if e.is_transient() && retries_left > 0 => {
                    retries_left -= 1;
                    warn!("Transient backend conflict, retrying batch: {}", e);
                }
                Err(e) => {
                    error!("Batch conversion aborted: {}", e);
                    self.finish_batch().await;
                    return;
                }
            }
        }
    }

    /// One pass over the queue, starting from the first incomplete item.
    async fn run_pass(&self) -> Result<PassOutcome, MediaError> {
        loop {
            if self.cancel_requested() {
                return Ok(PassOutcome::Canceled);
            }

            let (id, source, output) = {
                let mut state = self.state.write().await;

                // Items that hit 100% in an earlier partial run are skipped
                // without re-opening the source.
                for item in state.items.iter_mut() {
                    if item.progress_percent >= 100 && item.state == ItemState::Pending {
                        debug!("⏭ Skipping {} (already at 100%)", item.id);
                        item.state = ItemState::Skipped;
                    }
                }

                let Some(id) = state.next_incomplete() else {
                    return Ok(PassOutcome::Finished);
                };
                let item = match state.get_mut(id) {
                    Some(item) => item,
                    None => continue,
                };
                item.state = ItemState::InProgress;
                (
                    item.id,
                    item.source_path.clone(),
                    item.output_path(&self.config.audio.extension),
                )
            };

            self.events.send(UiEvent::ItemControls { id, enabled: false });
            info!("🎬 Converting {}: {}", id, source.display());

            match self.convert_item(id, &source, &output).await {
                Ok(true) => {}
                Ok(false) => {
                    // Interrupted mid-item. Progress restarts from zero on
                    // resume; the last reported percent stays visible.
                    self.reset_item(id).await;
                    return Ok(PassOutcome::Canceled);
                }
                Err(e) => {
                    self.reset_item(id).await;
                    return Err(e);
                }
            }
        }
    }

    /// Convert a single item. Returns Ok(false) when interrupted by
    /// cancellation before the audio was written.
    async fn convert_item(
        &self,
        id: ItemId,
        source: &std::path::Path,
        output: &std::path::Path,
    ) -> Result<bool, MediaError> {
        let handle = self.converter.open(source).await?;
        let duration = handle.duration_secs;
        let whole_seconds = duration.floor() as u64;

        for t in 1..=whole_seconds {
            if self.cancel_requested() {
                return Ok(false);
            }

            // One simulated second of conversion work.
            tokio::time::sleep(self.config.tick()).await;

            let percent = ((t as f64 / duration) * 100.0).floor() as u8;
            self.record_progress(id, percent).await;
        }

        // The write itself cannot be interrupted once started.
        if self.cancel_requested() {
            return Ok(false);
        }
        handle.stream.write_to(output).await?;

        self.finish_item(id).await;
        Ok(true)
    }

    /// Record progress on the item and push it onto the channel. The
    /// terminal 100 is pushed twice so final progress cannot be missed.
    async fn record_progress(&self, id: ItemId, percent: u8) {
        {
            let mut state = self.state.write().await;
            if let Some(item) = state.get_mut(id) {
                if percent > item.progress_percent {
                    item.progress_percent = percent;
                }
            }
        }

        self.events.progress(id, percent);
        if percent == 100 {
            self.events.progress(id, 100);
        }
    }

    /// Remove a successfully converted item from the active queue. The only
    /// mutation point that shrinks the list.
    async fn finish_item(&self, id: ItemId) {
        let mut state = self.state.write().await;
        if let Some(mut item) = state.remove(id) {
            item.state = ItemState::Completed;
            info!("✅ Completed {}: {}", id, item.source_path.display());
        }
        self.events.send(UiEvent::ItemRemoved(id));
    }

    /// Put an interrupted or failed item back into a resumable state.
    async fn reset_item(&self, id: ItemId) {
        let mut state = self.state.write().await;
        if let Some(item) = state.get_mut(id) {
            item.state = ItemState::Pending;
        }
    }

    /// Terminal reset after a finished or aborted batch: the convert control
    /// comes back, the cancel control goes away, item controls unfreeze.
    async fn finish_batch(&self) {
        self.running.store(false, Ordering::SeqCst);

        let state = self.state.read().await;
        for item in &state.items {
            self.events.send(UiEvent::ItemControls {
                id: item.id,
                enabled: true,
            });
        }
        self.events.send(UiEvent::BatchControls(BatchControls {
            convert_enabled: true,
            cancel_enabled: false,
        }));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::media::{AudioStream, MediaHandle};
    use crate::progress::ProgressChannel;
    use async_trait::async_trait;
    use std::path::Path;

    struct NeverOpened;

    #[async_trait]
    impl MediaConverter for NeverOpened {
        async fn open(&self, _path: &Path) -> Result<MediaHandle, MediaError> {
            panic!("converter must not be invoked");
        }
    }

    struct NullStream;

    #[async_trait]
    impl AudioStream for NullStream {
        async fn write_to(&self, _output_path: &Path) -> Result<(), MediaError> {
            Ok(())
        }
    }

    fn test_config() -> ConverterConfig {
        let mut config = ConverterConfig::default();
        config.pacing.tick_millis = 1;
        config
    }

    #[tokio::test]
    async fn test_start_batch_with_empty_queue_is_noop() {
        let (tx, _rx) = ProgressChannel::new();
        let coordinator = BatchCoordinator::new(test_config(), Arc::new(NeverOpened), tx);

        assert!(!coordinator.start_batch().await);
        assert!(!coordinator.is_running());
    }

    #[tokio::test]
    async fn test_rename_trims_and_ignores_empty() {
        let (tx, _rx) = ProgressChannel::new();
        let coordinator = BatchCoordinator::new(test_config(), Arc::new(NeverOpened), tx);
        let ids = coordinator
            .add_files(vec![PathBuf::from("/v/clip.mp4")])
            .await;

        coordinator.rename_item(ids[0], "  new name  ").await;
        assert_eq!(
            coordinator.snapshot_items().await[0].output_base_name,
            "new name"
        );

        coordinator.rename_item(ids[0], "   ").await;
        assert_eq!(
            coordinator.snapshot_items().await[0].output_base_name,
            "new name"
        );
    }

    #[tokio::test]
    async fn test_delete_item_removes_from_queue() {
        let (tx, _rx) = ProgressChannel::new();
        let coordinator = BatchCoordinator::new(test_config(), Arc::new(NeverOpened), tx);
        let ids = coordinator
            .add_files(vec![PathBuf::from("/v/a.mp4"), PathBuf::from("/v/b.mp4")])
            .await;

        coordinator.delete_item(ids[0]).await;
        let items = coordinator.snapshot_items().await;
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].id, ids[1]);
    }
}

use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::debug;

use crate::state::{ConversionItem, ItemId};

/// Enablement of the two batch-level controls.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BatchControls {
    pub convert_enabled: bool,
    pub cancel_enabled: bool,
}

/// A single worker-to-presentation update.
///
/// Every update the worker produces traverses the channel; the worker never
/// touches the presentation layer directly. Progress events for one item are
/// pushed in non-decreasing percent order, and the terminal 100 is pushed
/// twice on purpose so the consumer cannot miss final progress.
#[derive(Debug, Clone)]
pub enum UiEvent {
    ItemAdded(ConversionItem),
    ItemRemoved(ItemId),
    Progress { id: ItemId, percent: u8 },
    ItemControls { id: ItemId, enabled: bool },
    BatchControls(BatchControls),
}

/// Sending half of the progress channel. Cheap to clone; pushes never block
/// and never fail while the drain loop is alive.
#[derive(Debug, Clone)]
pub struct ProgressSender {
    tx: mpsc::UnboundedSender<UiEvent>,
}

impl ProgressSender {
    pub fn send(&self, event: UiEvent) {
        // The receiver lives for the whole process; a closed channel only
        // happens during shutdown, where dropping the event is fine.
        let _ = self.tx.send(event);
    }

    pub fn progress(&self, id: ItemId, percent: u8) {
        self.send(UiEvent::Progress { id, percent });
    }
}

/// Ordered, unbounded FIFO between the conversion worker and the
/// presentation layer.
pub struct ProgressChannel;

impl ProgressChannel {
    pub fn new() -> (ProgressSender, mpsc::UnboundedReceiver<UiEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (ProgressSender { tx }, rx)
    }
}

/// What the presentation layer must implement. The coordinator emits these
/// commands; it never assumes anything about how they are rendered.
pub trait PresentationSink: Send + Sync + 'static {
    fn add_item_view(&self, item: &ConversionItem);
    fn remove_item_view(&self, id: ItemId);
    fn update_progress(&self, id: ItemId, percent: u8);
    fn set_item_controls_enabled(&self, id: ItemId, enabled: bool);
    fn set_batch_controls(&self, controls: BatchControls);
}

/// Spawn the single drain loop for the process lifetime.
///
/// Strictly FIFO: each event is forwarded to the sink before the next is
/// pulled, which preserves the per-item ordering guarantee end to end. The
/// loop exits when every sender has been dropped.
pub fn spawn_drain_loop(
    mut rx: mpsc::UnboundedReceiver<UiEvent>,
    sink: Arc<dyn PresentationSink>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        while let Some(event) = rx.recv().await {
            match event {
                UiEvent::ItemAdded(item) => sink.add_item_view(&item),
                UiEvent::ItemRemoved(id) => sink.remove_item_view(id),
                UiEvent::Progress { id, percent } => sink.update_progress(id, percent),
                UiEvent::ItemControls { id, enabled } => {
                    sink.set_item_controls_enabled(id, enabled)
                }
                UiEvent::BatchControls(controls) => sink.set_batch_controls(controls),
            }
        }
        debug!("progress drain loop stopped");
    })
}

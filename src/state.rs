use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

/// Stable handle for a queued conversion item.
///
/// Handles are minted from a process-wide counter and never reused, so item
/// identity survives list mutations (deletions, completions) where a raw
/// positional index would not.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ItemId(u64);

static NEXT_ITEM_ID: AtomicU64 = AtomicU64::new(1);

impl ItemId {
    pub fn next() -> Self {
        Self(NEXT_ITEM_ID.fetch_add(1, Ordering::Relaxed))
    }
}

impl std::fmt::Display for ItemId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Lifecycle state of a single conversion item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ItemState {
    /// Queued, not yet attempted (or interrupted mid-item and resumable).
    Pending,
    /// Currently being converted. At most one item per batch holds this.
    InProgress,
    /// Audio written successfully. Completed items leave the active list.
    Completed,
    /// Reached 100% in an earlier partial run; not re-converted.
    Skipped,
}

/// One queued source-file-to-audio-file conversion unit.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversionItem {
    pub id: ItemId,

    /// Absolute path to the input media file.
    pub source_path: PathBuf,

    /// Output name without extension, user-editable between runs.
    pub output_base_name: String,

    /// Last reported progress, monotone non-decreasing in [0, 100].
    pub progress_percent: u8,

    pub state: ItemState,
}

impl ConversionItem {
    /// Create a fresh item for a selected file. The output name defaults to
    /// the source filename stem.
    pub fn new(source_path: PathBuf) -> Self {
        let output_base_name = source_path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default();

        Self {
            id: ItemId::next(),
            source_path,
            output_base_name,
            progress_percent: 0,
            state: ItemState::Pending,
        }
    }

    /// Destination path: alongside the source, trimmed base name plus the
    /// configured audio extension.
    pub fn output_path(&self, extension: &str) -> PathBuf {
        let dir = self.source_path.parent().unwrap_or_else(|| Path::new(""));
        dir.join(format!("{}.{}", self.output_base_name.trim(), extension))
    }
}

/// Mutable batch state for one application run.
///
/// Insertion order is processing order. There is no stored cursor: the next
/// item to attempt is derived by identity scan, so deletions and completions
/// can never desynchronize a positional index from the list.
#[derive(Debug, Default)]
pub struct BatchRunState {
    pub items: Vec<ConversionItem>,
}

impl BatchRunState {
    /// Id of the next item the worker should attempt: the first item in
    /// order that has not yet reached 100%. An interrupted item stays first,
    /// which is what makes cancel/resume restart at the right place.
    pub fn next_incomplete(&self) -> Option<ItemId> {
        self.items
            .iter()
            .find(|item| item.progress_percent < 100)
            .map(|item| item.id)
    }

    pub fn get(&self, id: ItemId) -> Option<&ConversionItem> {
        self.items.iter().find(|item| item.id == id)
    }

    pub fn get_mut(&mut self, id: ItemId) -> Option<&mut ConversionItem> {
        self.items.iter_mut().find(|item| item.id == id)
    }

    /// Remove an item by identity. Returns the removed item if present.
    pub fn remove(&mut self, id: ItemId) -> Option<ConversionItem> {
        let index = self.items.iter().position(|item| item.id == id)?;
        Some(self.items.remove(index))
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_item_ids_are_unique() {
        let a = ConversionItem::new(PathBuf::from("/videos/a.mp4"));
        let b = ConversionItem::new(PathBuf::from("/videos/a.mp4"));
        assert_ne!(a.id, b.id);
    }

    #[test]
    fn test_output_name_defaults_to_stem() {
        let item = ConversionItem::new(PathBuf::from("/videos/lecture 01.mp4"));
        assert_eq!(item.output_base_name, "lecture 01");
        assert_eq!(item.progress_percent, 0);
        assert_eq!(item.state, ItemState::Pending);
    }

    #[test]
    fn test_output_path_is_alongside_source() {
        let mut item = ConversionItem::new(PathBuf::from("/videos/clip.mp4"));
        item.output_base_name = "  renamed  ".to_string();
        assert_eq!(item.output_path("mp3"), PathBuf::from("/videos/renamed.mp3"));
    }

    #[test]
    fn test_next_incomplete_skips_finished_items() {
        let mut state = BatchRunState::default();
        let mut done = ConversionItem::new(PathBuf::from("/v/done.mp4"));
        done.progress_percent = 100;
        let pending = ConversionItem::new(PathBuf::from("/v/pending.mp4"));
        let pending_id = pending.id;
        state.items.push(done);
        state.items.push(pending);

        assert_eq!(state.next_incomplete(), Some(pending_id));
    }

    #[test]
    fn test_remove_by_identity() {
        let mut state = BatchRunState::default();
        let a = ConversionItem::new(PathBuf::from("/v/a.mp4"));
        let b = ConversionItem::new(PathBuf::from("/v/b.mp4"));
        let (a_id, b_id) = (a.id, b.id);
        state.items.push(a);
        state.items.push(b);

        assert!(state.remove(a_id).is_some());
        assert!(state.get(a_id).is_none());
        assert_eq!(state.next_incomplete(), Some(b_id));
    }
}

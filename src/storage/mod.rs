use std::{io, sync::Arc};

use futures::future::BoxFuture;

use crate::generation::ArtStyle;

pub mod file;
pub mod in_memory;

pub const DEFAULT_HISTORY_LIMIT: usize = 20;

/// A generated image waiting to be stored.
#[derive(Debug, Clone, PartialEq)]
pub struct HistoryRecord {
    /// PNG bytes.
    pub image: Arc<[u8]>,
    pub style: ArtStyle,
    pub timestamp_ms: u64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct HistoryEntry {
    pub id: u64,
    pub timestamp_ms: u64,
    pub style: ArtStyle,
    pub image: Arc<[u8]>,
}

impl HistoryEntry {
    fn from_record(id: u64, record: HistoryRecord) -> Self {
        Self {
            id,
            timestamp_ms: record.timestamp_ms,
            style: record.style,
            image: record.image,
        }
    }
}

/// Bounded list of past results. Listing is newest first and appending
/// beyond the limit evicts the oldest entries.
pub trait HistoryStore {
    fn append(&self, record: HistoryRecord) -> BoxFuture<'static, io::Result<HistoryEntry>>;
    fn list_all(&self) -> BoxFuture<'static, io::Result<Vec<HistoryEntry>>>;
}

/// Newest first; ids break timestamp ties.
fn sort_newest_first<T>(items: &mut [T], key: impl Fn(&T) -> (u64, u64)) {
    items.sort_unstable_by_key(|item| std::cmp::Reverse(key(item)));
}

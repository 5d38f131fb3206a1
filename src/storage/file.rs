use std::{
    io::{self, ErrorKind},
    path::{Path, PathBuf},
    sync::{Arc, Mutex},
};

use futures::{future::BoxFuture, FutureExt};
use log::{info, warn};

use super::{sort_newest_first, HistoryEntry, HistoryRecord, HistoryStore};
use crate::generation::ArtStyle;

const INDEX_FILE: &str = "index.json";

/// History persisted as one PNG per entry plus an `index.json`.
pub struct FileHistory {
    base: PathBuf,
    limit: usize,
    /// Serialises index rewrites of concurrent appends.
    lock: Arc<Mutex<()>>,
}

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
struct IndexRecord {
    id: u64,
    timestamp_ms: u64,
    style: ArtStyle,
    file: String,
}

impl FileHistory {
    pub fn new(base: impl Into<PathBuf>, limit: usize) -> Self {
        Self {
            base: base.into(),
            limit,
            lock: Default::default(),
        }
    }

    fn read_index(base: &Path) -> io::Result<Vec<IndexRecord>> {
        match std::fs::File::open(base.join(INDEX_FILE)) {
            Ok(f) => serde_json::from_reader(io::BufReader::new(f))
                .map_err(|e| io::Error::new(ErrorKind::InvalidData, e)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(Vec::new()),
            Err(e) => Err(e),
        }
    }

    fn write_index(base: &Path, index: &[IndexRecord]) -> io::Result<()> {
        let tmp = base.join(format!("{INDEX_FILE}.tmp"));
        let json = serde_json::to_vec_pretty(index).map_err(io::Error::other)?;
        std::fs::write(&tmp, json)?;
        std::fs::rename(tmp, base.join(INDEX_FILE))
    }

    fn append_blocking(
        base: &Path,
        limit: usize,
        lock: &Mutex<()>,
        record: HistoryRecord,
    ) -> io::Result<HistoryEntry> {
        let _guard = lock
            .lock()
            .map_err(|_| io::Error::other("history lock poisoned"))?;
        std::fs::create_dir_all(base)?;
        let mut index = Self::read_index(base)?;
        let id = index.iter().map(|r| r.id).max().unwrap_or(0) + 1;
        let file = format!("{id}.png");
        std::fs::write(base.join(&file), &record.image)?;

        index.push(IndexRecord {
            id,
            timestamp_ms: record.timestamp_ms,
            style: record.style,
            file,
        });
        sort_newest_first(&mut index, |r| (r.timestamp_ms, r.id));
        let keep = limit.min(index.len());
        for evicted in index.drain(keep..) {
            info!("Evict history entry {}", evicted.id);
            if let Err(e) = std::fs::remove_file(base.join(&evicted.file)) {
                warn!("Could not remove {}: {e}", evicted.file);
            }
        }
        Self::write_index(base, &index)?;
        Ok(HistoryEntry::from_record(id, record))
    }

    fn list_blocking(base: &Path) -> io::Result<Vec<HistoryEntry>> {
        let mut index = Self::read_index(base)?;
        sort_newest_first(&mut index, |r| (r.timestamp_ms, r.id));
        Ok(index
            .into_iter()
            .filter_map(|r| match std::fs::read(base.join(&r.file)) {
                Ok(bytes) => Some(HistoryEntry {
                    id: r.id,
                    timestamp_ms: r.timestamp_ms,
                    style: r.style,
                    image: bytes.into(),
                }),
                Err(e) => {
                    warn!("Skip history entry {}: {e}", r.id);
                    None
                }
            })
            .collect())
    }

    fn spawn_blocking<T: Send + 'static>(
        job: impl FnOnce() -> io::Result<T> + Send + 'static,
    ) -> BoxFuture<'static, io::Result<T>> {
        let (tx, rx) = futures::channel::oneshot::channel();
        std::thread::spawn(move || {
            let _ = tx.send(job());
        });
        async move { rx.await.map_err(io::Error::other).and_then(|r| r) }.boxed()
    }
}

impl HistoryStore for FileHistory {
    fn append(&self, record: HistoryRecord) -> BoxFuture<'static, io::Result<HistoryEntry>> {
        let base = self.base.clone();
        let limit = self.limit;
        let lock = self.lock.clone();
        Self::spawn_blocking(move || Self::append_blocking(&base, limit, &lock, record))
    }

    fn list_all(&self) -> BoxFuture<'static, io::Result<Vec<HistoryEntry>>> {
        let base = self.base.clone();
        Self::spawn_blocking(move || Self::list_blocking(&base))
    }
}

#[cfg(test)]
mod tests {
    use futures::executor::block_on;

    use super::*;
    use crate::storage::DEFAULT_HISTORY_LIMIT;

    fn temp_dir(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!("caricature-history-{name}-{}", std::process::id()));
        let _ = std::fs::remove_dir_all(&dir);
        dir
    }

    fn record(timestamp_ms: u64, style: ArtStyle) -> HistoryRecord {
        HistoryRecord {
            image: Arc::from(vec![1, 2, timestamp_ms as u8]),
            style,
            timestamp_ms,
        }
    }

    #[test]
    fn missing_directory_lists_nothing() {
        let history = FileHistory::new(temp_dir("missing"), DEFAULT_HISTORY_LIMIT);
        assert!(block_on(history.list_all()).unwrap().is_empty());
    }

    #[test]
    fn entries_survive_a_new_store_and_are_capped() {
        let dir = temp_dir("persist");
        let history = FileHistory::new(&dir, 2);
        block_on(history.append(record(10, ArtStyle::Anime))).unwrap();
        block_on(history.append(record(20, ArtStyle::Comic))).unwrap();
        block_on(history.append(record(30, ArtStyle::Cartoon))).unwrap();

        let reopened = FileHistory::new(&dir, 2);
        let entries = block_on(reopened.list_all()).unwrap();
        assert_eq!(
            vec![(30, ArtStyle::Cartoon), (20, ArtStyle::Comic)],
            entries
                .iter()
                .map(|e| (e.timestamp_ms, e.style))
                .collect::<Vec<_>>()
        );
        assert_eq!(&[1, 2, 30][..], &*entries[0].image);
        assert!(!dir.join("1.png").exists());

        std::fs::remove_dir_all(dir).unwrap();
    }
}

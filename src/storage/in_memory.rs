use std::{
    io,
    sync::{Arc, Mutex},
};

use futures::{future::BoxFuture, FutureExt};

use super::{sort_newest_first, HistoryEntry, HistoryRecord, HistoryStore, DEFAULT_HISTORY_LIMIT};

/// History kept for the lifetime of the process.
pub struct InMemoryHistory {
    state: Arc<Mutex<State>>,
    limit: usize,
}

#[derive(Default)]
struct State {
    next_id: u64,
    entries: Vec<HistoryEntry>,
}

impl InMemoryHistory {
    pub fn new(limit: usize) -> Self {
        Self {
            state: Default::default(),
            limit,
        }
    }
}

impl Default for InMemoryHistory {
    fn default() -> Self {
        Self::new(DEFAULT_HISTORY_LIMIT)
    }
}

fn poisoned<T>(_: T) -> io::Error {
    io::Error::other("history lock poisoned")
}

impl HistoryStore for InMemoryHistory {
    fn append(&self, record: HistoryRecord) -> BoxFuture<'static, io::Result<HistoryEntry>> {
        let result = self.state.lock().map_err(poisoned).map(|mut state| {
            state.next_id += 1;
            let entry = HistoryEntry::from_record(state.next_id, record);
            state.entries.push(entry.clone());
            sort_newest_first(&mut state.entries, |e| (e.timestamp_ms, e.id));
            state.entries.truncate(self.limit);
            entry
        });
        async move { result }.boxed()
    }

    fn list_all(&self) -> BoxFuture<'static, io::Result<Vec<HistoryEntry>>> {
        let result = self
            .state
            .lock()
            .map_err(poisoned)
            .map(|state| state.entries.clone());
        async move { result }.boxed()
    }
}

#[cfg(test)]
mod tests {
    use futures::executor::block_on;

    use super::*;
    use crate::generation::ArtStyle;

    fn record(timestamp_ms: u64) -> HistoryRecord {
        HistoryRecord {
            image: Arc::from(vec![timestamp_ms as u8]),
            style: ArtStyle::Cartoon,
            timestamp_ms,
        }
    }

    #[test]
    fn lists_newest_first() {
        let history = InMemoryHistory::default();
        for ts in [5, 1, 9] {
            block_on(history.append(record(ts))).unwrap();
        }
        let listed: Vec<_> = block_on(history.list_all())
            .unwrap()
            .into_iter()
            .map(|e| e.timestamp_ms)
            .collect();
        assert_eq!(vec![9, 5, 1], listed);
    }

    #[test]
    fn evicts_oldest_beyond_limit() {
        let history = InMemoryHistory::new(3);
        for ts in 1..=5 {
            block_on(history.append(record(ts))).unwrap();
        }
        let listed: Vec<_> = block_on(history.list_all())
            .unwrap()
            .into_iter()
            .map(|e| e.timestamp_ms)
            .collect();
        assert_eq!(vec![5, 4, 3], listed);
    }
}

use docsentry_protocol::{OperationKind, OperationSnapshot};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock};
use tokio::sync::broadcast;

/// Broadcast buffer per operation; a lagging subscriber loses the oldest
/// events but never blocks the producer.
const CHANNEL_CAPACITY: usize = 64;

struct Entry {
    snapshot: OperationSnapshot,
    tx: broadcast::Sender<OperationSnapshot>,
    stop: Arc<AtomicBool>,
}

/// In-memory progress for all operations this process has run.
///
/// The pull path (`snapshot`) and the push path (broadcast) read and publish
/// the same record under one lock, so the two views agree at any instant.
pub struct ProgressStore {
    entries: RwLock<HashMap<String, Entry>>,
}

impl ProgressStore {
    #[must_use]
    pub fn new() -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
        }
    }

    /// Register a new operation in the `Queued` state.
    pub fn create(&self, id: &str, kind: OperationKind, directory: String) -> OperationSnapshot {
        let snapshot = OperationSnapshot::new(id.to_string(), kind, directory);
        let (tx, _) = broadcast::channel(CHANNEL_CAPACITY);
        let entry = Entry {
            snapshot: snapshot.clone(),
            tx,
            stop: Arc::new(AtomicBool::new(false)),
        };
        self.entries
            .write()
            .expect("progress store poisoned")
            .insert(id.to_string(), entry);
        snapshot
    }

    #[must_use]
    pub fn snapshot(&self, id: &str) -> Option<OperationSnapshot> {
        self.entries
            .read()
            .expect("progress store poisoned")
            .get(id)
            .map(|e| e.snapshot.clone())
    }

    #[must_use]
    pub fn list(&self, kind: Option<OperationKind>) -> Vec<OperationSnapshot> {
        self.entries
            .read()
            .expect("progress store poisoned")
            .values()
            .filter(|e| kind.is_none() || kind == Some(e.snapshot.kind))
            .map(|e| e.snapshot.clone())
            .collect()
    }

    /// Mutate a snapshot and publish the result to subscribers.
    ///
    /// Returns the updated snapshot; `None` for unknown ids.
    pub fn update(
        &self,
        id: &str,
        mutate: impl FnOnce(&mut OperationSnapshot),
    ) -> Option<OperationSnapshot> {
        let mut entries = self.entries.write().expect("progress store poisoned");
        let entry = entries.get_mut(id)?;
        mutate(&mut entry.snapshot);
        // Send failures just mean nobody is listening right now.
        let _ = entry.tx.send(entry.snapshot.clone());
        Some(entry.snapshot.clone())
    }

    /// Subscribe to push updates for one operation.
    #[must_use]
    pub fn subscribe(&self, id: &str) -> Option<broadcast::Receiver<OperationSnapshot>> {
        self.entries
            .read()
            .expect("progress store poisoned")
            .get(id)
            .map(|e| e.tx.subscribe())
    }

    /// Request cancellation; honored at the next batch boundary.
    ///
    /// Returns `false` for unknown or already-terminal operations.
    pub fn request_stop(&self, id: &str) -> bool {
        let entries = self.entries.read().expect("progress store poisoned");
        match entries.get(id) {
            Some(entry) if !entry.snapshot.status.is_terminal() => {
                entry.stop.store(true, Ordering::SeqCst);
                true
            }
            _ => false,
        }
    }

    /// The cancellation flag polled by the operation driver.
    #[must_use]
    pub fn stop_flag(&self, id: &str) -> Option<Arc<AtomicBool>> {
        self.entries
            .read()
            .expect("progress store poisoned")
            .get(id)
            .map(|e| Arc::clone(&e.stop))
    }
}

impl Default for ProgressStore {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use docsentry_protocol::OperationStatus;
    use pretty_assertions::assert_eq;

    #[test]
    fn pull_and_push_agree() {
        let store = ProgressStore::new();
        store.create("op", OperationKind::Index, "/src".into());
        let mut rx = store.subscribe("op").unwrap();

        store.update("op", |s| {
            s.status = OperationStatus::Counting;
            s.total_files = 5;
        });

        let pushed = rx.try_recv().unwrap();
        let pulled = store.snapshot("op").unwrap();
        assert_eq!(pushed, pulled);
        assert_eq!(pulled.total_files, 5);
    }

    #[test]
    fn unknown_ids_yield_nothing() {
        let store = ProgressStore::new();
        assert!(store.snapshot("nope").is_none());
        assert!(store.subscribe("nope").is_none());
        assert!(store.update("nope", |_| {}).is_none());
        assert!(!store.request_stop("nope"));
    }

    #[test]
    fn stop_request_sets_flag_once_and_not_after_terminal() {
        let store = ProgressStore::new();
        store.create("op", OperationKind::Scan, "/dst".into());
        let flag = store.stop_flag("op").unwrap();

        assert!(!flag.load(Ordering::SeqCst));
        assert!(store.request_stop("op"));
        assert!(flag.load(Ordering::SeqCst));

        store.update("op", |s| s.status = OperationStatus::Completed);
        assert!(!store.request_stop("op"));
    }

    #[test]
    fn slow_subscriber_never_blocks_updates() {
        let store = ProgressStore::new();
        store.create("op", OperationKind::Index, "/src".into());
        let _rx = store.subscribe("op").unwrap();

        // Far more updates than channel capacity; all must go through.
        for i in 0..500 {
            let updated = store.update("op", |s| s.files_processed = i).unwrap();
            assert_eq!(updated.files_processed, i);
        }
        // The pull snapshot still reflects the latest state.
        assert_eq!(store.snapshot("op").unwrap().files_processed, 499);
    }

    #[test]
    fn list_filters_by_kind() {
        let store = ProgressStore::new();
        store.create("i1", OperationKind::Index, "/a".into());
        store.create("s1", OperationKind::Scan, "/b".into());

        assert_eq!(store.list(None).len(), 2);
        let scans = store.list(Some(OperationKind::Scan));
        assert_eq!(scans.len(), 1);
        assert_eq!(scans[0].id, "s1");
    }
}

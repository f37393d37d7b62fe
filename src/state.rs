use crate::snapshot::Snapshot;
use std::collections::VecDeque;
use std::sync::Arc;
use tokio::sync::RwLock;

pub const DEFAULT_HISTORY_LEN: usize = 120;

/// Latest snapshot plus a bounded FIFO history. Created once in `main` and shared by handle
/// between the collector (sole writer) and HTTP handlers (readers).
#[derive(Debug)]
pub struct Store {
    inner: RwLock<Inner>,
    capacity: usize,
}

#[derive(Debug, Default)]
struct Inner {
    current: Arc<Snapshot>,
    history: VecDeque<Arc<Snapshot>>,
}

impl Store {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            inner: RwLock::new(Inner {
                current: Arc::default(),
                history: VecDeque::with_capacity(capacity),
            }),
            capacity,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Replaces the current snapshot and appends it to history, evicting the oldest entry when
    /// full. Returns the history length after the insert.
    pub async fn publish(&self, snapshot: Arc<Snapshot>) -> usize {
        let mut guard = self.inner.write().await;
        while guard.history.len() >= self.capacity {
            guard.history.pop_front();
        }
        guard.history.push_back(snapshot.clone());
        guard.current = snapshot;
        guard.history.len()
    }

    /// Zero-value snapshot until the first publish.
    pub async fn current(&self) -> Arc<Snapshot> {
        self.inner.read().await.current.clone()
    }

    /// Oldest first. The returned vector is detached from the store.
    pub async fn history(&self) -> Vec<Arc<Snapshot>> {
        self.inner.read().await.history.iter().cloned().collect()
    }
}

impl Default for Store {
    fn default() -> Self {
        Self::new(DEFAULT_HISTORY_LEN)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn snap(uptime_sec: u64) -> Arc<Snapshot> {
        Arc::new(Snapshot {
            uptime_sec,
            ..Snapshot::default()
        })
    }

    #[tokio::test]
    async fn current_is_zero_value_before_first_publish() {
        let store = Store::default();
        let current = store.current().await;
        assert_eq!(current.uptime_sec, 0);
        assert!(current.hostname.is_empty());
        assert!(current.net.is_empty());
        assert!(store.history().await.is_empty());
    }

    #[tokio::test]
    async fn publish_replaces_current() {
        let store = Store::default();
        store.publish(snap(1)).await;
        store.publish(snap(2)).await;
        assert_eq!(store.current().await.uptime_sec, 2);
    }

    #[tokio::test]
    async fn history_evicts_oldest_after_capacity() {
        let store = Store::default();
        for i in 1..=121 {
            let len = store.publish(snap(i)).await;
            assert!(len <= DEFAULT_HISTORY_LEN);
        }

        let history = store.history().await;
        assert_eq!(history.len(), 120);
        assert_eq!(history.first().unwrap().uptime_sec, 2);
        assert_eq!(history.last().unwrap().uptime_sec, 121);
        assert!(history.iter().all(|s| s.uptime_sec != 1));
    }

    #[tokio::test]
    async fn zero_capacity_is_raised_to_one() {
        let store = Store::new(0);
        assert_eq!(store.capacity(), 1);
        store.publish(snap(1)).await;
        store.publish(snap(2)).await;
        let history = store.history().await;
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].uptime_sec, 2);
    }

    #[tokio::test]
    async fn history_copy_is_isolated_from_later_publishes() {
        let store = Store::new(3);
        for i in 1..=3 {
            store.publish(snap(i)).await;
        }
        let copy = store.history().await;

        store.publish(snap(4)).await;
        store.publish(snap(5)).await;

        let uptimes: Vec<u64> = copy.iter().map(|s| s.uptime_sec).collect();
        assert_eq!(uptimes, [1, 2, 3]);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn readers_see_consistent_history_during_writes() {
        let store = Arc::new(Store::new(16));

        let writer = {
            let store = store.clone();
            tokio::spawn(async move {
                for i in 1..=2_000 {
                    store.publish(snap(i)).await;
                }
            })
        };

        let readers: Vec<_> = (0..4)
            .map(|_| {
                let store = store.clone();
                tokio::spawn(async move {
                    for _ in 0..500 {
                        let history = store.history().await;
                        assert!(history.len() <= 16);
                        for pair in history.windows(2) {
                            assert_eq!(pair[1].uptime_sec, pair[0].uptime_sec + 1);
                        }
                        let current = store.current().await;
                        if let Some(last) = history.last() {
                            assert!(current.uptime_sec >= last.uptime_sec);
                        }
                        tokio::task::yield_now().await;
                    }
                })
            })
            .collect();

        writer.await.unwrap();
        for reader in readers {
            reader.await.unwrap();
        }
        assert_eq!(store.current().await.uptime_sec, 2_000);
    }
}

//! Live price state
//!
//! The table lives in a watch channel as an `Arc<LivePriceTable>`. Writers
//! copy-on-write, so a snapshot handed to a reader never changes under it.

use parking_lot::RwLock;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::watch;

use nexus_core::{AssetPriceRecord, LivePriceTable, PriceTick};

/// Shared live price store
#[derive(Debug)]
pub struct PriceStore {
    table: watch::Sender<Arc<LivePriceTable>>,

    /// Stats
    update_count: AtomicU64,
    last_update: RwLock<Option<Instant>>,
}

impl PriceStore {
    pub fn new() -> Self {
        let (table, _) = watch::channel(Arc::new(LivePriceTable::new()));
        Self {
            table,
            update_count: AtomicU64::new(0),
            last_update: RwLock::new(None),
        }
    }

    /// Insert or sparsely merge one record.
    ///
    /// `price` always replaces the stored price; `change24h` replaces the
    /// stored change only when supplied. Subscribers are notified before
    /// this returns, unless the update changed nothing.
    pub fn upsert(&self, id: &str, price: f64, change24h: Option<f64>) -> bool {
        let changed = self.table.send_if_modified(|table| {
            if let Some(existing) = table.get(id) {
                let mut candidate = existing.clone();
                if !candidate.merge(price, change24h) {
                    return false;
                }
            }
            Arc::make_mut(table).upsert(id, price, change24h)
        });

        if changed {
            self.update_count.fetch_add(1, Ordering::Relaxed);
            *self.last_update.write() = Some(Instant::now());
        }
        changed
    }

    /// Apply one live tick
    pub fn apply_tick(&self, tick: &PriceTick) -> bool {
        self.upsert(&tick.id, tick.price, None)
    }

    /// Current table. Cheap: clones the `Arc`.
    pub fn snapshot(&self) -> Arc<LivePriceTable> {
        Arc::clone(&self.table.borrow())
    }

    pub fn get(&self, id: &str) -> Option<AssetPriceRecord> {
        self.table.borrow().get(id).cloned()
    }

    /// Receiver that wakes after every change
    pub fn subscribe(&self) -> watch::Receiver<Arc<LivePriceTable>> {
        self.table.subscribe()
    }

    pub fn stats(&self) -> PriceStoreStats {
        PriceStoreStats {
            record_count: self.table.borrow().len(),
            update_count: self.update_count.load(Ordering::Relaxed),
            last_update_age: self.last_update.read().map(|t| t.elapsed()),
        }
    }
}

impl Default for PriceStore {
    fn default() -> Self {
        Self::new()
    }
}

/// Statistics about the live table
#[derive(Debug, Clone, Default)]
pub struct PriceStoreStats {
    pub record_count: usize,
    /// Upserts that changed the table
    pub update_count: u64,
    /// None until the first update
    pub last_update_age: Option<Duration>,
}

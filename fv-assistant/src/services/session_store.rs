//! Browser session records kept in process, with expired records swept.

use async_trait::async_trait;
use dashmap::{mapref::entry::Entry, DashMap};
use std::sync::Arc;
use std::time::Duration;
use time::OffsetDateTime;
use tokio::task::JoinHandle;
use tower_sessions::{
    session::{Id, Record},
    session_store, SessionStore,
};

/// In-memory [`SessionStore`]. Records past their expiry date are never
/// loaded and are removed by [`MemorySessionStore::delete_expired`].
#[derive(Debug, Clone, Default)]
pub struct MemorySessionStore {
    records: Arc<DashMap<Id, Record>>,
}

impl MemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Drop every expired record. Returns how many were removed.
    pub fn delete_expired(&self) -> usize {
        let now = OffsetDateTime::now_utc();
        let before = self.records.len();
        self.records.retain(|_, record| record.expiry_date > now);
        before.saturating_sub(self.records.len())
    }

    pub fn spawn_reaper(&self, period: Duration) -> JoinHandle<()> {
        let store = self.clone();
        let period = period.max(Duration::from_secs(1));

        tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                interval.tick().await;
                let removed = store.delete_expired();
                if removed > 0 {
                    tracing::info!(removed, remaining = store.len(), "Deleted expired sessions");
                }
            }
        })
    }
}

#[async_trait]
impl SessionStore for MemorySessionStore {
    async fn create(&self, record: &mut Record) -> session_store::Result<()> {
        loop {
            match self.records.entry(record.id) {
                Entry::Occupied(_) => record.id = Id::default(),
                Entry::Vacant(slot) => {
                    slot.insert(record.clone());
                    return Ok(());
                }
            }
        }
    }

    async fn save(&self, record: &Record) -> session_store::Result<()> {
        self.records.insert(record.id, record.clone());
        Ok(())
    }

    async fn load(&self, id: &Id) -> session_store::Result<Option<Record>> {
        let now = OffsetDateTime::now_utc();
        Ok(self
            .records
            .get(id)
            .filter(|record| record.expiry_date > now)
            .map(|record| record.value().clone()))
    }

    async fn delete(&self, id: &Id) -> session_store::Result<()> {
        self.records.remove(id);
        Ok(())
    }
}

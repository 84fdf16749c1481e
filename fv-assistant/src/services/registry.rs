use crate::services::model_session::SessionFactory;
use crate::services::relay::ChatContext;
use dashmap::DashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::task::JoinHandle;
use uuid::Uuid;

struct Entry {
    context: Arc<ChatContext>,
    last_seen: Instant,
}

/// Chat contexts keyed by the id stored in each browser session. Contexts are
/// never shared between ids.
pub struct ChatRegistry {
    factory: Arc<SessionFactory>,
    chats: DashMap<Uuid, Entry>,
}

impl ChatRegistry {
    pub fn new(factory: Arc<SessionFactory>) -> Self {
        Self {
            factory,
            chats: DashMap::new(),
        }
    }

    /// Context for `id`, created empty on first use. Refreshes its idle clock.
    pub fn open(&self, id: Uuid) -> Arc<ChatContext> {
        let mut entry = self.chats.entry(id).or_insert_with(|| {
            tracing::debug!(chat_id = %id, "Chat context created");
            Entry {
                context: Arc::new(ChatContext::new(self.factory.clone())),
                last_seen: Instant::now(),
            }
        });
        entry.last_seen = Instant::now();
        entry.context.clone()
    }

    pub fn get(&self, id: &Uuid) -> Option<Arc<ChatContext>> {
        self.chats.get(id).map(|entry| entry.context.clone())
    }

    pub fn ids(&self) -> Vec<Uuid> {
        self.chats.iter().map(|entry| *entry.key()).collect()
    }

    pub fn len(&self) -> usize {
        self.chats.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chats.is_empty()
    }

    /// Drop contexts untouched for longer than `max_idle`. A context with a
    /// turn in flight is kept. Returns how many were removed.
    pub fn prune_idle(&self, max_idle: Duration) -> usize {
        let before = self.chats.len();
        self.chats.retain(|_, entry| {
            entry.context.is_busy() || entry.last_seen.elapsed() <= max_idle
        });
        before.saturating_sub(self.chats.len())
    }

    /// Periodically prune idle contexts so memory follows the browser
    /// session store's expiry.
    pub fn spawn_reaper(self: &Arc<Self>, max_idle: Duration) -> JoinHandle<()> {
        let registry = Arc::clone(self);
        let period = (max_idle / 4).max(Duration::from_secs(1));

        tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                interval.tick().await;
                let removed = registry.prune_idle(max_idle);
                if removed > 0 {
                    tracing::info!(removed, remaining = registry.len(), "Pruned idle chats");
                }
            }
        })
    }
}

//! Single owner of the mutable engine state.
//!
//! The poll loop and the command listener never touch settings, the
//! last-positions cache or the first-seen table directly. They send
//! requests to this actor's mailbox and await a `oneshot` reply, so a
//! mutation is either fully visible to the next reader or not applied yet.

use super::settings::Settings;
use super::store::{ConfigStore, StateDocument};
use crate::engine::{PositionKey, PositionRow};
use crate::error::{ActorError, MutateError, ValidationError};
use chrono::{DateTime, Utc};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// A validated, in-place change to the settings.
pub type SettingsOp = Box<dyn FnOnce(&mut Settings) -> Result<(), ValidationError> + Send>;

/// Settings on both sides of an applied mutation.
#[derive(Debug, Clone)]
pub struct Mutation {
    pub before: Settings,
    pub after: Settings,
}

/// Whether a first-seen query may create entries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stamping {
    /// Create missing entries at `now` and run eviction for the symbol.
    Record,
    /// Only report what is already stored.
    Lookup,
}

enum ConfigRequest {
    Read(oneshot::Sender<Settings>),
    Mutate {
        op: SettingsOp,
        reply: oneshot::Sender<Result<Mutation, ValidationError>>,
    },
    FirstSeen {
        symbol: String,
        keys: Vec<PositionKey>,
        now: DateTime<Utc>,
        stamping: Stamping,
        reply: oneshot::Sender<Vec<Option<DateTime<Utc>>>>,
    },
    StorePositions {
        symbol: String,
        rows: Vec<PositionRow>,
    },
    LastPositions(oneshot::Sender<HashMap<String, Vec<PositionRow>>>),
    TrackedPositions(oneshot::Sender<usize>),
}

#[derive(Debug, Clone, Copy)]
struct FirstSeen {
    at: DateTime<Utc>,
    misses: u32,
}

/// Actor task state. Created by [`spawn_config_actor`].
pub struct ConfigActor {
    rx: mpsc::Receiver<ConfigRequest>,
    doc: StateDocument,
    store: Arc<dyn ConfigStore>,
    first_seen: HashMap<PositionKey, FirstSeen>,
    last_positions: HashMap<String, Vec<PositionRow>>,
    eviction_cycles: u32,
}

impl ConfigActor {
    /// Process requests until every handle is dropped.
    pub async fn run(mut self) {
        debug!("ConfigActor started");

        while let Some(request) = self.rx.recv().await {
            match request {
                ConfigRequest::Read(reply) => {
                    let _ = reply.send(self.doc.config.clone());
                }
                ConfigRequest::Mutate { op, reply } => {
                    let _ = reply.send(self.apply(op).await);
                }
                ConfigRequest::FirstSeen {
                    symbol,
                    keys,
                    now,
                    stamping,
                    reply,
                } => {
                    let stamps = match stamping {
                        Stamping::Record => self.record_first_seen(&symbol, &keys, now),
                        Stamping::Lookup => keys
                            .iter()
                            .map(|k| self.first_seen.get(k).map(|e| e.at))
                            .collect(),
                    };
                    let _ = reply.send(stamps);
                }
                ConfigRequest::StorePositions { symbol, rows } => {
                    self.last_positions.insert(symbol, rows);
                }
                ConfigRequest::LastPositions(reply) => {
                    let _ = reply.send(self.last_positions.clone());
                }
                ConfigRequest::TrackedPositions(reply) => {
                    let _ = reply.send(self.first_seen.len());
                }
            }
        }

        debug!("ConfigActor stopped");
    }

    async fn apply(&mut self, op: SettingsOp) -> Result<Mutation, ValidationError> {
        let before = self.doc.config.clone();
        let mut next = before.clone();
        op(&mut next)?;

        self.doc.config = next;
        self.forget_removed_symbols();

        // File I/O runs off the runtime threads; the mailbox waits so saves stay ordered.
        let store = self.store.clone();
        let doc = self.doc.clone();
        match tokio::task::spawn_blocking(move || store.save(&doc)).await {
            Ok(Ok(())) => {}
            // The in-memory copy stays authoritative; the next mutation saves again.
            Ok(Err(e)) => warn!("Failed to persist configuration: {}", e),
            Err(e) => warn!("Configuration save task failed: {}", e),
        }

        Ok(Mutation {
            before,
            after: self.doc.config.clone(),
        })
    }

    /// Drop first-seen entries and cached rows for symbols no longer configured.
    fn forget_removed_symbols(&mut self) {
        let symbols = &self.doc.config.symbols;
        let tracked = self.first_seen.len();
        self.first_seen.retain(|key, _| symbols.contains(&key.symbol));
        self.last_positions.retain(|symbol, _| symbols.contains(symbol));

        let forgotten = tracked - self.first_seen.len();
        if forgotten > 0 {
            debug!(forgotten, "Forgot first-seen times of removed symbols");
        }
    }

    fn record_first_seen(
        &mut self,
        symbol: &str,
        keys: &[PositionKey],
        now: DateTime<Utc>,
    ) -> Vec<Option<DateTime<Utc>>> {
        let stamps = keys
            .iter()
            .map(|key| {
                let entry = self.first_seen.entry(key.clone()).or_insert_with(|| {
                    info!(
                        wallet = %key.wallet,
                        symbol = %key.symbol,
                        side = %key.side,
                        "New position detected"
                    );
                    FirstSeen { at: now, misses: 0 }
                });
                entry.misses = 0;
                Some(entry.at)
            })
            .collect();

        if self.eviction_cycles > 0 {
            let present: HashSet<&PositionKey> = keys.iter().collect();
            let limit = self.eviction_cycles;
            self.first_seen.retain(|key, entry| {
                if key.symbol != symbol || present.contains(key) {
                    return true;
                }
                entry.misses += 1;
                if entry.misses >= limit {
                    debug!(
                        wallet = %key.wallet,
                        symbol = %key.symbol,
                        side = %key.side,
                        "Position gone, forgetting first-seen time"
                    );
                    false
                } else {
                    true
                }
            });
        }

        stamps
    }
}

/// Cloneable mailbox sender for the config actor.
#[derive(Clone)]
pub struct ConfigHandle {
    tx: mpsc::Sender<ConfigRequest>,
}

impl ConfigHandle {
    /// Snapshot of the current settings.
    pub async fn read(&self) -> Result<Settings, ActorError> {
        let (reply, rx) = oneshot::channel();
        self.send(ConfigRequest::Read(reply)).await?;
        rx.await.map_err(|_| ActorError)
    }

    /// Apply `op` to a copy of the settings; on success the copy replaces
    /// the live settings and is persisted.
    pub async fn mutate<F>(&self, op: F) -> Result<Mutation, MutateError>
    where
        F: FnOnce(&mut Settings) -> Result<(), ValidationError> + Send + 'static,
    {
        let (reply, rx) = oneshot::channel();
        self.send(ConfigRequest::Mutate {
            op: Box::new(op),
            reply,
        })
        .await?;
        Ok(rx.await.map_err(|_| ActorError)??)
    }

    /// First-seen times for `keys`, in the same order.
    ///
    /// With [`Stamping::Record`], `keys` must be every directional key
    /// observed for `symbol` this cycle: missing ones age toward eviction.
    pub async fn first_seen(
        &self,
        symbol: &str,
        keys: Vec<PositionKey>,
        now: DateTime<Utc>,
        stamping: Stamping,
    ) -> Result<Vec<Option<DateTime<Utc>>>, ActorError> {
        let (reply, rx) = oneshot::channel();
        self.send(ConfigRequest::FirstSeen {
            symbol: symbol.to_string(),
            keys,
            now,
            stamping,
            reply,
        })
        .await?;
        rx.await.map_err(|_| ActorError)
    }

    /// Replace the cached rows for `symbol`.
    pub async fn store_positions(
        &self,
        symbol: &str,
        rows: Vec<PositionRow>,
    ) -> Result<(), ActorError> {
        self.send(ConfigRequest::StorePositions {
            symbol: symbol.to_string(),
            rows,
        })
        .await
    }

    /// Rows from the most recent cycle, per symbol.
    pub async fn last_positions(&self) -> Result<HashMap<String, Vec<PositionRow>>, ActorError> {
        let (reply, rx) = oneshot::channel();
        self.send(ConfigRequest::LastPositions(reply)).await?;
        rx.await.map_err(|_| ActorError)
    }

    /// Number of positions with a stored first-seen time.
    pub async fn tracked_positions(&self) -> Result<usize, ActorError> {
        let (reply, rx) = oneshot::channel();
        self.send(ConfigRequest::TrackedPositions(reply)).await?;
        rx.await.map_err(|_| ActorError)
    }

    async fn send(&self, request: ConfigRequest) -> Result<(), ActorError> {
        self.tx.send(request).await.map_err(|_| ActorError)
    }
}

/// Start the config actor on the current runtime.
pub fn spawn_config_actor(
    doc: StateDocument,
    store: Arc<dyn ConfigStore>,
    eviction_cycles: u32,
    capacity: usize,
) -> (ConfigHandle, JoinHandle<()>) {
    let (tx, rx) = mpsc::channel(capacity);

    let actor = ConfigActor {
        rx,
        doc,
        store,
        first_seen: HashMap::new(),
        last_positions: HashMap::new(),
        eviction_cycles,
    };

    let handle = tokio::spawn(actor.run());
    (ConfigHandle { tx }, handle)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::Side;
    use crate::error::PersistenceError;
    use crate::state::{MemoryStore, WalletAddress};
    use chrono::Duration;

    struct FailingStore;

    impl ConfigStore for FailingStore {
        fn load(&self) -> Result<Option<StateDocument>, PersistenceError> {
            Ok(None)
        }

        fn save(&self, _doc: &StateDocument) -> Result<(), PersistenceError> {
            Err(PersistenceError::Io(std::io::Error::new(
                std::io::ErrorKind::PermissionDenied,
                "read-only",
            )))
        }
    }

    fn wallet(n: u8) -> WalletAddress {
        format!("0x{}", hex::encode([n; 20])).parse().unwrap()
    }

    fn key(n: u8, symbol: &str, side: Side) -> PositionKey {
        PositionKey {
            wallet: wallet(n),
            symbol: symbol.to_string(),
            side,
        }
    }

    fn spawn_with(store: Arc<dyn ConfigStore>, eviction: u32) -> ConfigHandle {
        spawn_config_actor(StateDocument::default(), store, eviction, 16).0
    }

    #[tokio::test]
    async fn test_mutation_is_persisted_and_visible() {
        let store = Arc::new(MemoryStore::default());
        let handle = spawn_with(store.clone(), 0);

        let mutation = handle
            .mutate(|s| s.set_consensus(3))
            .await
            .unwrap();
        assert_eq!(mutation.before.consensus_count, 1);
        assert_eq!(mutation.after.consensus_count, 3);

        assert_eq!(handle.read().await.unwrap().consensus_count, 3);
        assert_eq!(store.snapshot().unwrap().config.consensus_count, 3);
    }

    #[tokio::test]
    async fn test_rejected_mutation_leaves_settings_unchanged() {
        let store = Arc::new(MemoryStore::default());
        let handle = spawn_with(store.clone(), 0);

        let err = handle.mutate(|s| s.set_poll_seconds(5)).await.unwrap_err();
        assert!(matches!(err, MutateError::Invalid(ValidationError::OutOfRange { .. })));
        assert_eq!(handle.read().await.unwrap().poll_seconds, 12);
        assert!(store.snapshot().is_none());
    }

    #[tokio::test]
    async fn test_failed_save_keeps_in_memory_settings() {
        let handle = spawn_with(Arc::new(FailingStore), 0);
        handle.mutate(|s| s.add_symbol("sol").map(|_| ())).await.unwrap();
        assert!(handle.read().await.unwrap().symbols.contains(&"SOL".to_string()));
    }

    #[tokio::test]
    async fn test_concurrent_mutations_are_not_lost() {
        let handle = spawn_with(Arc::new(MemoryStore::default()), 0);

        let tasks: Vec<_> = (1..=20u8)
            .map(|n| {
                let handle = handle.clone();
                tokio::spawn(async move { handle.mutate(move |s| s.add_wallet(wallet(n))).await })
            })
            .collect();
        for task in tasks {
            task.await.unwrap().unwrap();
        }

        assert_eq!(handle.read().await.unwrap().wallet_count(), 20);
    }

    #[tokio::test]
    async fn test_first_seen_is_stable_and_lookup_does_not_create() {
        let handle = spawn_with(Arc::new(MemoryStore::default()), 0);
        let t0 = Utc::now();
        let t1 = t0 + Duration::seconds(30);

        let unknown = handle
            .first_seen("ETH", vec![key(1, "ETH", Side::Long)], t0, Stamping::Lookup)
            .await
            .unwrap();
        assert_eq!(unknown, vec![None]);

        let first = handle
            .first_seen("ETH", vec![key(1, "ETH", Side::Long)], t0, Stamping::Record)
            .await
            .unwrap();
        let again = handle
            .first_seen("ETH", vec![key(1, "ETH", Side::Long)], t1, Stamping::Record)
            .await
            .unwrap();
        assert_eq!(first, vec![Some(t0)]);
        assert_eq!(again, vec![Some(t0)]);
        assert_eq!(handle.tracked_positions().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_unseen_positions_are_evicted_per_symbol() {
        let handle = spawn_with(Arc::new(MemoryStore::default()), 2);
        let now = Utc::now();

        handle
            .first_seen(
                "ETH",
                vec![key(1, "ETH", Side::Long), key(2, "ETH", Side::Short)],
                now,
                Stamping::Record,
            )
            .await
            .unwrap();
        handle
            .first_seen("BTC", vec![key(1, "BTC", Side::Long)], now, Stamping::Record)
            .await
            .unwrap();

        // Wallet 2 closes its ETH short; two cycles without it evicts the key.
        for _ in 0..2 {
            handle
                .first_seen("ETH", vec![key(1, "ETH", Side::Long)], now, Stamping::Record)
                .await
                .unwrap();
        }

        assert_eq!(handle.tracked_positions().await.unwrap(), 2);
        let gone = handle
            .first_seen("ETH", vec![key(2, "ETH", Side::Short)], now, Stamping::Lookup)
            .await
            .unwrap();
        assert_eq!(gone, vec![None]);
    }

    #[tokio::test]
    async fn test_last_positions_cache() {
        let handle = spawn_with(Arc::new(MemoryStore::default()), 0);
        let rows = vec![PositionRow::absent(wallet(7))];
        handle.store_positions("ETH", rows.clone()).await.unwrap();

        let cached = handle.last_positions().await.unwrap();
        assert_eq!(cached.get("ETH"), Some(&rows));
    }

    /// Saves take long enough to notice if they block the runtime thread.
    struct SlowStore;

    impl ConfigStore for SlowStore {
        fn load(&self) -> Result<Option<StateDocument>, PersistenceError> {
            Ok(None)
        }

        fn save(&self, _doc: &StateDocument) -> Result<(), PersistenceError> {
            std::thread::sleep(std::time::Duration::from_millis(200));
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_slow_save_does_not_block_runtime() {
        let handle = spawn_with(Arc::new(SlowStore), 0);
        let mutation = tokio::spawn({
            let handle = handle.clone();
            async move { handle.mutate(|s| s.set_consensus(2)).await }
        });

        let started = std::time::Instant::now();
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        assert!(started.elapsed() < std::time::Duration::from_millis(150));

        let mutation = mutation.await.unwrap().unwrap();
        assert_eq!(mutation.after.consensus_count, 2);
    }

    #[tokio::test]
    async fn test_removing_symbol_forgets_its_positions() {
        let handle = spawn_with(Arc::new(MemoryStore::default()), 0);
        let now = Utc::now();
        handle
            .first_seen("ETH", vec![key(1, "ETH", Side::Long)], now, Stamping::Record)
            .await
            .unwrap();
        handle
            .first_seen("BTC", vec![key(2, "BTC", Side::Short)], now, Stamping::Record)
            .await
            .unwrap();
        handle.store_positions("ETH", Vec::new()).await.unwrap();
        assert_eq!(handle.tracked_positions().await.unwrap(), 2);

        handle
            .mutate(|s| s.remove_symbol("eth").map(|_| ()))
            .await
            .unwrap();

        assert_eq!(handle.tracked_positions().await.unwrap(), 1);
        assert!(!handle.last_positions().await.unwrap().contains_key("ETH"));

        // Re-adding starts the clock over.
        handle.mutate(|s| s.add_symbol("eth").map(|_| ())).await.unwrap();
        let later = now + Duration::minutes(5);
        let stamps = handle
            .first_seen("ETH", vec![key(1, "ETH", Side::Long)], later, Stamping::Record)
            .await
            .unwrap();
        assert_eq!(stamps, vec![Some(later)]);
    }
}

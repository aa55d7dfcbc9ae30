//! Dedupe-then-order pipeline.
//!
//! One [`OrderingEngine::order`] call is one render cycle:
//!
//! 1. resolve an [`IdentityKey`] for every item,
//! 2. fold each key's group down to one survivor,
//! 3. number the survivors through the [`SequenceStore`],
//! 4. sort by sequence (newest first-seen first), then by publication time.
//!
//! The engine holds no per-feed state between calls. The only thing that
//! survives a cycle is the persisted sequence record. Refresh bookkeeping
//! such as the last processed snapshot stamp lives in [`RefreshContext`].

use crate::config::NewslineConfig;
use crate::conflict::ConflictResolver;
use crate::identity::{IdentityKey, IdentityResolver};
use crate::model::{FeedSnapshot, OrderedFeed, OrderedItem, RawItem};
use crate::sequence::{KvStore, SequenceStore};
use std::cmp::Reverse;
use std::collections::HashMap;
use tracing::{debug, instrument};

/// Runs the pipeline against one sequence store.
#[derive(Debug)]
pub struct OrderingEngine<S> {
    identity: IdentityResolver,
    conflict: ConflictResolver,
    store: SequenceStore<S>,
    max_items: Option<usize>,
}

impl<S: KvStore> OrderingEngine<S> {
    /// Engine with built-in stop words and aggregator signatures.
    pub fn new(store: SequenceStore<S>) -> Self {
        Self {
            identity: IdentityResolver::default(),
            conflict: ConflictResolver::default(),
            store,
            max_items: None,
        }
    }

    /// Engine configured from `.newsline/config.toml` settings.
    pub fn from_config(config: &NewslineConfig, store: SequenceStore<S>) -> Self {
        Self {
            identity: IdentityResolver::new(&config.identity),
            conflict: ConflictResolver::new(&config.conflict),
            store,
            max_items: config.output.max_items,
        }
    }

    /// Cap the number of items [`Self::order_snapshot`] returns.
    #[must_use]
    pub const fn with_max_items(mut self, max_items: Option<usize>) -> Self {
        self.max_items = max_items;
        self
    }

    pub const fn identity(&self) -> &IdentityResolver {
        &self.identity
    }

    pub const fn store(&self) -> &SequenceStore<S> {
        &self.store
    }

    /// Dedupe and order one feed.
    ///
    /// Never fails. Storage problems are logged by the sequence store and
    /// the numbers computed for this cycle are used regardless.
    #[instrument(skip_all, fields(raw = items.len()))]
    pub fn order(&mut self, items: &[RawItem]) -> Vec<OrderedItem> {
        let survivors = self.dedupe(items);
        let keys: Vec<IdentityKey> = survivors.iter().map(|(key, _)| key.clone()).collect();
        let assignment = self.store.assign(&keys);

        let mut ordered: Vec<OrderedItem> = survivors
            .into_iter()
            .map(|(key, item)| OrderedItem {
                sequence: assignment.sequence(&key).unwrap_or_default(),
                item,
            })
            .collect();

        // Stable: items tied on both keys keep feed order.
        ordered.sort_by_key(|entry| {
            (
                Reverse(entry.sequence),
                Reverse(entry.item.published_millis()),
            )
        });

        debug!(
            raw = items.len(),
            unique = ordered.len(),
            new_keys = assignment.added,
            persisted = assignment.persisted,
            "ordering cycle complete"
        );
        ordered
    }

    /// Order a snapshot and wrap the result for rendering, applying the
    /// configured item cap after sorting.
    pub fn order_snapshot(&mut self, snapshot: &FeedSnapshot) -> OrderedFeed {
        let mut items = self.order(&snapshot.items);
        if let Some(max) = self.max_items {
            items.truncate(max);
        }
        OrderedFeed::new(snapshot.generated_utc.clone(), items)
    }

    /// One survivor per key, in first-occurrence order of the key.
    fn dedupe(&self, items: &[RawItem]) -> Vec<(IdentityKey, RawItem)> {
        let mut slots: HashMap<IdentityKey, usize> = HashMap::with_capacity(items.len());
        let mut survivors: Vec<(IdentityKey, RawItem)> = Vec::with_capacity(items.len());

        for item in items {
            let key = self.identity.resolve(item);
            if let Some(&slot) = slots.get(&key) {
                let (_, best) = &mut survivors[slot];
                let current = std::mem::take(best);
                *best = self.conflict.choose(current, item.clone());
            } else {
                slots.insert(key.clone(), survivors.len());
                survivors.push((key, item.clone()));
            }
        }
        survivors
    }
}

/// Outcome of one [`RefreshContext::refresh`] call.
#[derive(Debug, Clone, PartialEq)]
pub enum RefreshOutcome {
    /// The snapshot stamp matched the previous one; nothing was reordered.
    Unchanged,
    /// The snapshot was ordered.
    Updated(OrderedFeed),
}

/// State a refresh loop carries between cycles.
#[derive(Debug, Clone, Default)]
pub struct RefreshContext {
    last_stamp: Option<String>,
}

impl RefreshContext {
    #[must_use]
    pub const fn new() -> Self {
        Self { last_stamp: None }
    }

    /// Stamp of the last snapshot that was ordered.
    #[must_use]
    pub fn last_stamp(&self) -> Option<&str> {
        self.last_stamp.as_deref()
    }

    /// Order `snapshot` unless it carries the same stamp as the last one.
    ///
    /// Snapshots without a stamp are always ordered.
    pub fn refresh<S: KvStore>(
        &mut self,
        engine: &mut OrderingEngine<S>,
        snapshot: &FeedSnapshot,
    ) -> RefreshOutcome {
        if let Some(stamp) = snapshot.generated_utc.as_deref()
            && self.last_stamp.as_deref() == Some(stamp)
        {
            debug!(stamp, "snapshot unchanged, skipping cycle");
            return RefreshOutcome::Unchanged;
        }

        let feed = engine.order_snapshot(snapshot);
        self.last_stamp.clone_from(&snapshot.generated_utc);
        RefreshOutcome::Updated(feed)
    }
}

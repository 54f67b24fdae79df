#![forbid(unsafe_code)]

//! Per-version materialized views.
//!
//! A version's own rows only record what changed relative to its parent, so the
//! effective graph of a version is the fold of every ancestor's rows, root first,
//! with later rows replacing earlier ones per logical id (entities) or per edge key
//! (relationships). Folded views are memoized per version id.

use super::StoreError;
use super::support::{ensure_version_tx, version_entities_tx, version_relationships_tx};
use gw_core::cancel::CancelToken;
use gw_core::graph::{EdgeKey, Entity, Relationship};
use rusqlite::{Transaction, params};
use std::collections::{BTreeMap, HashMap, HashSet, VecDeque};
use std::sync::Arc;

/// Intermediate folds are memoized every this many hops so a later read of a deep
/// descendant does not restart from the root.
const CHECKPOINT_INTERVAL: usize = 16;

#[derive(Clone, Debug, Default)]
pub(in crate::store) struct Snapshot {
    /// Version ids from this version up to the root, nearest first.
    pub chain: Vec<String>,
    /// Current row per logical id.
    pub entities: BTreeMap<String, Entity>,
    /// Current row per edge key, tombstones included.
    pub relationships: BTreeMap<EdgeKey, Relationship>,
}

impl Snapshot {
    /// Child view: `self` with `entities` and `relationships` written on top, in order.
    pub(in crate::store) fn extend(
        &self,
        version_id: &str,
        entities: impl IntoIterator<Item = Entity>,
        relationships: impl IntoIterator<Item = Relationship>,
    ) -> Self {
        let mut chain = Vec::with_capacity(self.chain.len() + 1);
        chain.push(version_id.to_string());
        chain.extend(self.chain.iter().cloned());

        let mut out = Self {
            chain,
            entities: self.entities.clone(),
            relationships: self.relationships.clone(),
        };
        for entity in entities {
            out.entities.insert(entity.logical_id.clone(), entity);
        }
        for relationship in relationships {
            out.relationships.insert(relationship.key(), relationship);
        }
        out
    }

    pub(in crate::store) fn version_id(&self) -> &str {
        self.chain.first().map(String::as_str).unwrap_or_default()
    }

    pub(in crate::store) fn entity(&self, logical_id: &str) -> Option<&Entity> {
        self.entities.get(logical_id)
    }

    pub(in crate::store) fn active_relationships(&self) -> impl Iterator<Item = &Relationship> {
        self.relationships.values().filter(|rel| !rel.deleted)
    }

    pub(in crate::store) fn active_relationship(&self, key: &EdgeKey) -> Option<&Relationship> {
        self.relationships.get(key).filter(|rel| !rel.deleted)
    }

    pub(in crate::store) fn contains_version(&self, version_id: &str) -> bool {
        self.chain.iter().any(|id| id == version_id)
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct SnapshotCacheStats {
    pub entries: usize,
    pub hits: u64,
    pub misses: u64,
    pub evictions: u64,
}

#[derive(Debug)]
pub(in crate::store) struct SnapshotCache {
    capacity: usize,
    entries: HashMap<String, Arc<Snapshot>>,
    order: VecDeque<String>,
    epoch: Option<i64>,
    hits: u64,
    misses: u64,
    evictions: u64,
}

impl SnapshotCache {
    pub(in crate::store) fn new(capacity: usize) -> Self {
        Self {
            capacity,
            entries: HashMap::new(),
            order: VecDeque::new(),
            epoch: None,
            hits: 0,
            misses: 0,
            evictions: 0,
        }
    }

    pub(in crate::store) fn stats(&self) -> SnapshotCacheStats {
        SnapshotCacheStats {
            entries: self.entries.len(),
            hits: self.hits,
            misses: self.misses,
            evictions: self.evictions,
        }
    }

    /// Drops everything if another handle changed existing versions since the last sync.
    pub(in crate::store) fn sync_epoch(&mut self, epoch: i64) {
        if self.epoch != Some(epoch) {
            if !self.entries.is_empty() {
                tracing::debug!(
                    previous = ?self.epoch,
                    current = epoch,
                    dropped = self.entries.len(),
                    "content epoch moved; dropping snapshot cache"
                );
                self.evictions += self.entries.len() as u64;
            }
            self.entries.clear();
            self.order.clear();
            self.epoch = Some(epoch);
        }
    }

    /// Called after this handle committed an in-place write that moved the epoch from
    /// `observed` to `committed`. Only snapshots built on `version_id` are dropped,
    /// unless the epoch had already moved under us.
    pub(in crate::store) fn after_in_place_write(&mut self, version_id: &str, observed: i64, committed: i64) {
        if self.epoch == Some(observed) {
            self.invalidate_version(version_id);
            self.epoch = Some(committed);
        } else {
            self.sync_epoch(committed);
        }
    }

    pub(in crate::store) fn get(&mut self, version_id: &str) -> Option<Arc<Snapshot>> {
        match self.entries.get(version_id) {
            Some(snapshot) => {
                self.hits += 1;
                Some(Arc::clone(snapshot))
            }
            None => {
                self.misses += 1;
                None
            }
        }
    }

    fn peek(&self, version_id: &str) -> Option<Arc<Snapshot>> {
        self.entries.get(version_id).cloned()
    }

    pub(in crate::store) fn insert(&mut self, snapshot: Arc<Snapshot>) {
        if self.capacity == 0 {
            return;
        }
        let version_id = snapshot.version_id().to_string();
        if self.entries.insert(version_id.clone(), snapshot).is_none() {
            self.order.push_back(version_id);
        }
        while self.entries.len() > self.capacity {
            let Some(oldest) = self.order.pop_front() else {
                break;
            };
            if self.entries.remove(&oldest).is_some() {
                self.evictions += 1;
            }
        }
    }

    /// Removes the snapshot of `version_id` and of every cached descendant.
    pub(in crate::store) fn invalidate_version(&mut self, version_id: &str) {
        let stale = self
            .entries
            .iter()
            .filter(|(_, snapshot)| snapshot.contains_version(version_id))
            .map(|(id, _)| id.clone())
            .collect::<Vec<_>>();
        if stale.is_empty() {
            return;
        }
        tracing::debug!(version_id, dropped = stale.len(), "invalidating snapshots");
        for id in &stale {
            self.entries.remove(id);
        }
        self.order.retain(|id| !stale.contains(id));
        self.evictions += stale.len() as u64;
    }
}

/// Materializes `version_id` by loading its ancestor chain in one query, stopping at the
/// nearest memoized ancestor, then folding rows back down.
///
/// `max_depth` bounds the number of uncached hops folded by this call; `None` means no
/// bound.
pub(in crate::store) fn materialize_tx(
    tx: &Transaction<'_>,
    cache: &mut SnapshotCache,
    version_id: &str,
    max_depth: Option<usize>,
    cancel: &CancelToken,
) -> Result<Arc<Snapshot>, StoreError> {
    if cancel.is_cancelled() {
        return Err(StoreError::Cancelled);
    }
    if let Some(snapshot) = cache.get(version_id) {
        return Ok(snapshot);
    }

    ensure_version_tx(tx, version_id)?;

    let mut pending = Vec::new();
    let mut seen = HashSet::new();
    let mut base: Option<Arc<Snapshot>> = None;

    for id in ancestor_chain_tx(tx, version_id)? {
        if cancel.is_cancelled() {
            return Err(StoreError::Cancelled);
        }
        if !pending.is_empty()
            && let Some(cached) = cache.peek(&id)
        {
            base = Some(cached);
            break;
        }
        if !seen.insert(id.clone()) {
            return Err(StoreError::VersionCycle(id));
        }
        if let Some(limit) = max_depth
            && pending.len() >= limit
        {
            return Err(StoreError::ChainDepthExceeded(limit));
        }
        pending.push(id);
    }

    let mut snapshot = base.unwrap_or_default();
    let hops = pending.len();
    for (index, id) in pending.into_iter().rev().enumerate() {
        if cancel.is_cancelled() {
            return Err(StoreError::Cancelled);
        }
        let entities = version_entities_tx(tx, &id)?;
        let relationships = version_relationships_tx(tx, &id)?;
        snapshot = Arc::new(snapshot.extend(&id, entities, relationships));

        let remaining = hops - index - 1;
        if remaining > 0 && remaining % CHECKPOINT_INTERVAL == 0 {
            cache.insert(Arc::clone(&snapshot));
        }
    }

    tracing::debug!(version_id, hops, "materialized version");
    cache.insert(Arc::clone(&snapshot));
    Ok(snapshot)
}

/// Version ids from `version_id` up to the root, nearest first. A corrupted chain that
/// loops is cut once it is longer than the version table, so the caller sees the repeat.
fn ancestor_chain_tx(
    tx: &Transaction<'_>,
    version_id: &str,
) -> Result<Vec<String>, StoreError> {
    let mut stmt = tx.prepare(
        "WITH RECURSIVE chain(id, parent_version_id, depth) AS ( \
           SELECT id, parent_version_id, 0 FROM graph_versions WHERE id=?1 \
           UNION ALL \
           SELECT v.id, v.parent_version_id, chain.depth + 1 \
           FROM graph_versions v JOIN chain ON v.id = chain.parent_version_id \
           WHERE chain.depth <= (SELECT COUNT(*) FROM graph_versions) \
         ) \
         SELECT id FROM chain ORDER BY depth",
    )?;
    let chain = stmt
        .query_map(params![version_id], |row| row.get::<_, String>(0))?
        .collect::<Result<Vec<_>, _>>()?;
    if chain.is_empty() {
        return Err(StoreError::UnknownVersion(version_id.to_string()));
    }
    Ok(chain)
}

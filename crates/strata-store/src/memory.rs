//! In-memory index.
//!
//! [`MemoryIndex`] publishes an immutable state snapshot per commit.
//! Searchers hold the snapshot current when they were opened; writers
//! buffer their operations and validate their bulk-update predicates
//! against the latest snapshot at commit.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Arc, RwLock};

use serde_json::Value;
use tracing::debug;

use crate::document::StoredDocument;
use crate::error::{StoreError, StoreResult};
use crate::filter::Expression;
use crate::traits::{Hits, Index, Query, Searcher, Update, Writer};

type Rows = BTreeMap<String, StoredDocument>;

/// Immutable committed state. Every commit publishes a new one.
#[derive(Clone, Debug, Default)]
struct IndexState {
    types: BTreeMap<String, Rows>,
    next_seq: u64,
    generation: u64,
}

impl IndexState {
    fn get(&self, doc_type: &str, row_id: &str) -> Option<&StoredDocument> {
        self.types.get(doc_type).and_then(|rows| rows.get(row_id))
    }

    fn matching_ids(&self, doc_type: &str, filter: &Expression) -> BTreeSet<String> {
        self.types
            .get(doc_type)
            .map(|rows| {
                rows.values()
                    .filter(|doc| filter.matches(&doc.source))
                    .map(|doc| doc.row_id.clone())
                    .collect()
            })
            .unwrap_or_default()
    }

    fn insert(&mut self, mut doc: StoredDocument) {
        self.next_seq += 1;
        doc.seq_no = self.next_seq;
        self.types
            .entry(doc.doc_type.clone())
            .or_default()
            .insert(doc.row_id.clone(), doc);
    }

    fn remove(&mut self, doc_type: &str, row_id: &str) {
        if let Some(rows) = self.types.get_mut(doc_type) {
            rows.remove(row_id);
        }
    }

    fn row_count(&self) -> usize {
        self.types.values().map(BTreeMap::len).sum()
    }
}

#[derive(Debug, Default)]
struct Shared {
    state: RwLock<Arc<IndexState>>,
}

impl Shared {
    fn snapshot(&self) -> StoreResult<Arc<IndexState>> {
        let guard = self.state.read().map_err(|_| StoreError::Poisoned)?;
        Ok(Arc::clone(&guard))
    }
}

/// In-memory reference implementation of the storage contract.
///
/// Committed state is an immutable snapshot swapped atomically on every
/// commit, so searchers are point-in-time views for free. Writers buffer
/// their operations and replay them against the latest state at commit,
/// re-checking every bulk-update predicate to detect concurrent overlapping
/// writes (optimistic concurrency).
#[derive(Clone, Debug, Default)]
pub struct MemoryIndex {
    shared: Arc<Shared>,
}

impl MemoryIndex {
    /// Create a new empty index.
    pub fn new() -> Self {
        Self::default()
    }

    /// Total number of rows across all types.
    pub fn len(&self) -> StoreResult<usize> {
        Ok(self.shared.snapshot()?.row_count())
    }

    /// Returns `true` if the index holds no rows.
    pub fn is_empty(&self) -> StoreResult<bool> {
        Ok(self.len()? == 0)
    }

    /// Number of commits published so far.
    pub fn generation(&self) -> StoreResult<u64> {
        Ok(self.shared.snapshot()?.generation)
    }
}

impl Index for MemoryIndex {
    fn searcher(&self) -> StoreResult<Box<dyn Searcher>> {
        Ok(Box::new(MemorySearcher {
            snapshot: self.shared.snapshot()?,
        }))
    }

    fn writer(&self) -> StoreResult<Box<dyn Writer>> {
        Ok(Box::new(MemoryWriter {
            shared: Arc::clone(&self.shared),
            base: self.shared.snapshot()?,
            overlay: BTreeMap::new(),
            ops: Vec::new(),
            closed: false,
        }))
    }
}

/// Point-in-time searcher over a [`MemoryIndex`].
#[derive(Debug)]
pub struct MemorySearcher {
    snapshot: Arc<IndexState>,
}

impl Searcher for MemorySearcher {
    fn get(&self, doc_type: &str, row_id: &str) -> StoreResult<Option<StoredDocument>> {
        Ok(self.snapshot.get(doc_type, row_id).cloned())
    }

    fn search(&self, query: &Query) -> StoreResult<Hits<StoredDocument>> {
        let Some(rows) = self.snapshot.types.get(&query.doc_type) else {
            return Ok(Hits::empty(query.limit));
        };
        let mut total = 0;
        let mut hits = Vec::new();
        for doc in rows.values().filter(|doc| query.filter.matches(&doc.source)) {
            total += 1;
            if hits.len() < query.limit {
                hits.push(doc.clone());
            }
        }
        Ok(Hits {
            hits,
            total,
            limit: query.limit,
        })
    }
}

#[derive(Debug)]
enum Op {
    Put(StoredDocument),
    Remove {
        doc_type: String,
        row_ids: Vec<String>,
    },
    BulkUpdate {
        doc_type: String,
        filter: Expression,
        update: Update,
        matched: BTreeSet<String>,
    },
}

/// Buffered writer over a [`MemoryIndex`].
pub struct MemoryWriter {
    shared: Arc<Shared>,
    base: Arc<IndexState>,
    /// Own pending state: `None` marks a pending removal.
    overlay: BTreeMap<(String, String), Option<StoredDocument>>,
    ops: Vec<Op>,
    closed: bool,
}

impl MemoryWriter {
    fn ensure_open(&self) -> StoreResult<()> {
        if self.closed {
            Err(StoreError::WriterClosed)
        } else {
            Ok(())
        }
    }

    /// Every row of `doc_type` as this writer sees it: base plus own writes.
    fn visible_rows(&self, doc_type: &str) -> Vec<StoredDocument> {
        let mut rows: BTreeMap<&str, &StoredDocument> = self
            .base
            .types
            .get(doc_type)
            .map(|rows| rows.iter().map(|(id, doc)| (id.as_str(), doc)).collect())
            .unwrap_or_default();
        for ((t, row_id), pending) in &self.overlay {
            if t != doc_type {
                continue;
            }
            match pending {
                Some(doc) => {
                    rows.insert(row_id.as_str(), doc);
                }
                None => {
                    rows.remove(row_id.as_str());
                }
            }
        }
        rows.into_values().cloned().collect()
    }

    /// Replay buffered operations on top of `state`, validating predicates.
    fn replay(&self, state: &mut IndexState) -> StoreResult<()> {
        for op in &self.ops {
            match op {
                Op::Put(doc) => state.insert(doc.clone()),
                Op::Remove { doc_type, row_ids } => {
                    for row_id in row_ids {
                        state.remove(doc_type, row_id);
                    }
                }
                Op::BulkUpdate {
                    doc_type,
                    filter,
                    update,
                    matched,
                } => {
                    let now = state.matching_ids(doc_type, filter);
                    if &now != matched {
                        return Err(StoreError::VersionConflict {
                            doc_type: doc_type.clone(),
                            detail: format!(
                                "bulk update matched {} rows when staged but {} at commit",
                                matched.len(),
                                now.len()
                            ),
                        });
                    }
                    for row_id in &now {
                        if let Some(mut doc) = state.get(doc_type, row_id).cloned() {
                            apply_update(&mut doc, update);
                            state.insert(doc);
                        }
                    }
                }
            }
        }
        Ok(())
    }
}

impl std::fmt::Debug for MemoryWriter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryWriter")
            .field("base_generation", &self.base.generation)
            .field("ops", &self.ops.len())
            .field("closed", &self.closed)
            .finish()
    }
}

impl Writer for MemoryWriter {
    fn put(&mut self, doc: StoredDocument) -> StoreResult<()> {
        self.ensure_open()?;
        self.overlay.insert(
            (doc.doc_type.clone(), doc.row_id.clone()),
            Some(doc.clone()),
        );
        self.ops.push(Op::Put(doc));
        Ok(())
    }

    fn remove(&mut self, doc_type: &str, row_ids: &[String]) -> StoreResult<()> {
        self.ensure_open()?;
        for row_id in row_ids {
            self.overlay
                .insert((doc_type.to_string(), row_id.clone()), None);
        }
        self.ops.push(Op::Remove {
            doc_type: doc_type.to_string(),
            row_ids: row_ids.to_vec(),
        });
        Ok(())
    }

    fn bulk_update(&mut self, doc_type: &str, filter: &Expression, update: &Update) -> StoreResult<usize> {
        self.ensure_open()?;
        let mut matched = BTreeSet::new();
        for mut doc in self.visible_rows(doc_type) {
            if !filter.matches(&doc.source) {
                continue;
            }
            matched.insert(doc.row_id.clone());
            apply_update(&mut doc, update);
            self.overlay
                .insert((doc_type.to_string(), doc.row_id.clone()), Some(doc));
        }
        let count = matched.len();
        self.ops.push(Op::BulkUpdate {
            doc_type: doc_type.to_string(),
            filter: filter.clone(),
            update: update.clone(),
            matched,
        });
        Ok(count)
    }

    fn commit(&mut self) -> StoreResult<()> {
        self.ensure_open()?;
        self.closed = true;
        if self.ops.is_empty() {
            return Ok(());
        }

        let mut guard = self.shared.state.write().map_err(|_| StoreError::Poisoned)?;
        let mut next = IndexState::clone(&guard);
        self.replay(&mut next)?;
        next.generation += 1;
        debug!(
            ops = self.ops.len(),
            base_generation = self.base.generation,
            generation = next.generation,
            "committed memory writer"
        );
        *guard = Arc::new(next);
        Ok(())
    }
}

fn apply_update(doc: &mut StoredDocument, update: &Update) {
    match update {
        Update::Set { field, value } => {
            doc.source.insert(field.clone(), value.clone());
        }
        Update::Append { field, value } => match doc.source.get_mut(field) {
            Some(Value::Array(items)) => items.push(value.clone()),
            Some(Value::Null) | None => {
                doc.source
                    .insert(field.clone(), Value::Array(vec![value.clone()]));
            }
            Some(other) => {
                let previous = other.take();
                *other = Value::Array(vec![previous, value.clone()]);
            }
        },
    }
}

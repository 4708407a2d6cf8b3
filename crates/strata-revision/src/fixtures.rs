//! Shared test setup.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use strata_branch::InMemoryBranchManager;
use strata_diff::{DiffStrategy, DocumentType, TypeRegistry};
use strata_store::{Expression, Index, MemoryIndex, Searcher, StoreError, StoreResult, StoredDocument, Update, Writer};
use strata_types::CommitConfig;

use crate::context::RevisionContext;

pub(crate) fn registry() -> Arc<TypeRegistry> {
    let types = TypeRegistry::new();
    types
        .register(DocumentType::new("concept").with_property("parents", DiffStrategy::Set))
        .unwrap();
    types.register(DocumentType::new("description")).unwrap();
    Arc::new(types)
}

pub(crate) fn fast_retries() -> CommitConfig {
    CommitConfig {
        max_attempts: 3,
        initial_backoff: Duration::from_millis(1),
        max_backoff: Duration::from_millis(2),
    }
}

pub(crate) fn context() -> RevisionContext {
    context_on(Arc::new(MemoryIndex::new()))
}

pub(crate) fn context_on(index: Arc<dyn Index>) -> RevisionContext {
    RevisionContext::new(index, Arc::new(InMemoryBranchManager::new()), registry(), fast_retries())
}

/// Index whose first `failures` writer commits report a version conflict.
#[derive(Debug)]
pub(crate) struct FlakyIndex {
    inner: MemoryIndex,
    failures: Arc<AtomicU32>,
}

impl FlakyIndex {
    pub(crate) fn new(failures: u32) -> Self {
        Self {
            inner: MemoryIndex::new(),
            failures: Arc::new(AtomicU32::new(failures)),
        }
    }
}

impl Index for FlakyIndex {
    fn searcher(&self) -> StoreResult<Box<dyn Searcher>> {
        self.inner.searcher()
    }

    fn writer(&self) -> StoreResult<Box<dyn Writer>> {
        Ok(Box::new(FlakyWriter {
            inner: self.inner.writer()?,
            failures: Arc::clone(&self.failures),
        }))
    }
}

struct FlakyWriter {
    inner: Box<dyn Writer>,
    failures: Arc<AtomicU32>,
}

impl Writer for FlakyWriter {
    fn put(&mut self, doc: StoredDocument) -> StoreResult<()> {
        self.inner.put(doc)
    }

    fn remove(&mut self, doc_type: &str, row_ids: &[String]) -> StoreResult<()> {
        self.inner.remove(doc_type, row_ids)
    }

    fn bulk_update(&mut self, doc_type: &str, filter: &Expression, update: &Update) -> StoreResult<usize> {
        self.inner.bulk_update(doc_type, filter, update)
    }

    fn commit(&mut self) -> StoreResult<()> {
        let left = self.failures.load(Ordering::SeqCst);
        if left > 0 {
            self.failures.store(left - 1, Ordering::SeqCst);
            return Err(StoreError::VersionConflict {
                doc_type: "concept".into(),
                detail: "injected".into(),
            });
        }
        self.inner.commit()
    }
}

use serde_json::Value;

use crate::document::StoredDocument;
use crate::error::StoreResult;
use crate::filter::Expression;

/// A search request against one document type.
#[derive(Clone, Debug, PartialEq)]
pub struct Query {
    /// Document type to search.
    pub doc_type: String,
    /// Filter every hit must satisfy.
    pub filter: Expression,
    /// Maximum number of hits returned. `total` still counts all matches.
    pub limit: usize,
}

impl Query {
    /// Query every document of a type matching `filter`, without a limit.
    pub fn new(doc_type: impl Into<String>, filter: Expression) -> Self {
        Self {
            doc_type: doc_type.into(),
            filter,
            limit: usize::MAX,
        }
    }

    /// Cap the number of returned hits.
    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = limit;
        self
    }
}

/// A page of search results.
#[derive(Clone, Debug, PartialEq)]
pub struct Hits<T> {
    /// The returned hits, at most `limit` of them.
    pub hits: Vec<T>,
    /// Total number of matches, including those beyond `limit`.
    pub total: usize,
    /// The limit that was applied.
    pub limit: usize,
}

impl<T> Hits<T> {
    /// An empty result.
    pub fn empty(limit: usize) -> Self {
        Self {
            hits: Vec::new(),
            total: 0,
            limit,
        }
    }

    /// Returns `true` if there are no hits.
    pub fn is_empty(&self) -> bool {
        self.hits.is_empty()
    }

    /// Map every hit, keeping totals.
    pub fn map<U>(self, f: impl FnMut(T) -> U) -> Hits<U> {
        Hits {
            hits: self.hits.into_iter().map(f).collect(),
            total: self.total,
            limit: self.limit,
        }
    }

    /// Fallible variant of [`Hits::map`].
    pub fn try_map<U, E>(self, f: impl FnMut(T) -> Result<U, E>) -> Result<Hits<U>, E> {
        Ok(Hits {
            hits: self.hits.into_iter().map(f).collect::<Result<_, _>>()?,
            total: self.total,
            limit: self.limit,
        })
    }
}

impl<T> IntoIterator for Hits<T> {
    type Item = T;
    type IntoIter = std::vec::IntoIter<T>;

    fn into_iter(self) -> Self::IntoIter {
        self.hits.into_iter()
    }
}

/// In-place modification applied to every row a bulk update matches.
#[derive(Clone, Debug, PartialEq)]
pub enum Update {
    /// Replace a top-level field.
    Set { field: String, value: Value },
    /// Append to a top-level array field, creating it when absent.
    Append { field: String, value: Value },
}

/// Read access to a point-in-time view of the index.
///
/// A searcher never observes writes committed after it was opened, nor any
/// writer's uncommitted state.
pub trait Searcher: Send + Sync {
    /// Fetch a row by its storage identity.
    fn get(&self, doc_type: &str, row_id: &str) -> StoreResult<Option<StoredDocument>>;

    /// Run a filtered search. Hits are ordered by row id.
    fn search(&self, query: &Query) -> StoreResult<Hits<StoredDocument>>;
}

/// A buffered, all-or-nothing write transaction.
///
/// Operations are applied in order and are visible to later operations of
/// the same writer, but to nobody else until [`Writer::commit`] succeeds.
pub trait Writer: Send {
    /// Insert or replace a row.
    fn put(&mut self, doc: StoredDocument) -> StoreResult<()>;

    /// Delete rows by storage identity. Unknown ids are ignored.
    fn remove(&mut self, doc_type: &str, row_ids: &[String]) -> StoreResult<()>;

    /// Apply `update` to every row of `doc_type` matching `filter`.
    ///
    /// Returns the number of rows matched. Backends must fail the enclosing
    /// commit with a version conflict if the set of rows matching `filter`
    /// changed between this call and the commit.
    fn bulk_update(&mut self, doc_type: &str, filter: &Expression, update: &Update) -> StoreResult<usize>;

    /// Atomically publish every buffered operation.
    ///
    /// On error nothing is published and the writer is closed.
    fn commit(&mut self) -> StoreResult<()>;
}

/// Entry point to a storage backend.
pub trait Index: Send + Sync {
    /// Open a searcher over the latest committed state.
    fn searcher(&self) -> StoreResult<Box<dyn Searcher>>;

    /// Open a writer whose reads start from the latest committed state.
    fn writer(&self) -> StoreResult<Box<dyn Writer>>;
}

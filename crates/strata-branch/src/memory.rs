//! In-memory branch manager.
//!
//! [`InMemoryBranchManager`] keeps every branch in a `BTreeMap` behind a
//! `RwLock`. Listeners are owned by the manager instance and are invoked
//! outside the lock.

use std::collections::BTreeMap;
use std::sync::{Arc, RwLock};

use strata_types::{BranchId, Timestamp, MAIN_BRANCH_ID};
use tracing::{debug, info, warn};

use crate::error::{BranchError, Result};
use crate::names::{validate_branch_name, validate_branch_path};
use crate::traits::{BranchChangeListener, BranchManager};
use crate::types::{child_path, truncate_segments, Branch, MergeSource, Segment, MAIN};

#[derive(Debug)]
struct BranchTable {
    branches: BTreeMap<String, Branch>,
    next_id: BranchId,
}

impl BranchTable {
    fn get(&self, path: &str) -> Result<&Branch> {
        self.branches.get(path).ok_or_else(|| BranchError::BranchNotFound {
            path: path.to_string(),
        })
    }

    fn allocate_id(&mut self) -> Result<BranchId> {
        let id = self.next_id;
        self.next_id = id.checked_add(1).ok_or(BranchError::IdsExhausted)?;
        Ok(id)
    }
}

/// An in-memory implementation of [`BranchManager`].
pub struct InMemoryBranchManager {
    table: RwLock<BranchTable>,
    listeners: RwLock<Vec<Arc<dyn BranchChangeListener>>>,
}

impl InMemoryBranchManager {
    /// Create a manager holding only `MAIN`.
    pub fn new() -> Self {
        let mut branches = BTreeMap::new();
        branches.insert(MAIN.to_string(), Branch::main());
        Self {
            table: RwLock::new(BranchTable {
                branches,
                next_id: MAIN_BRANCH_ID + 1,
            }),
            listeners: RwLock::new(Vec::new()),
        }
    }

    fn notify(&self, path: &str) {
        let listeners = match self.listeners.read() {
            Ok(listeners) => listeners.clone(),
            Err(_) => {
                warn!(path, "listener registry poisoned; skipping notification");
                return;
            }
        };
        for listener in listeners {
            if let Err(e) = listener.on_branch_changed(path) {
                warn!(path, error = %e, "branch change listener failed");
            }
        }
    }
}

impl Default for InMemoryBranchManager {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for InMemoryBranchManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InMemoryBranchManager")
            .field("table", &self.table)
            .finish_non_exhaustive()
    }
}

impl BranchManager for InMemoryBranchManager {
    fn create_branch(&self, parent_path: &str, name: &str) -> Result<Branch> {
        validate_branch_name(name)?;
        validate_branch_path(parent_path)?;

        let mut table = self.table.write().map_err(|_| BranchError::Poisoned)?;
        let path = child_path(parent_path, name);
        if table.branches.contains_key(&path) {
            return Err(BranchError::BranchAlreadyExists { path });
        }
        let parent = table.get(parent_path)?.clone();
        let id = table.allocate_id()?;
        let branch = Branch::child_of(&parent, name, id);
        table.branches.insert(path.clone(), branch.clone());
        info!(path = %path, branch_id = id, base = branch.base_timestamp, "created branch");
        Ok(branch)
    }

    fn get_branch(&self, path: &str) -> Result<Branch> {
        let table = self.table.read().map_err(|_| BranchError::Poisoned)?;
        table.get(path).cloned()
    }

    fn branches(&self) -> Result<Vec<Branch>> {
        let table = self.table.read().map_err(|_| BranchError::Poisoned)?;
        Ok(table.branches.values().cloned().collect())
    }

    fn advance_head(
        &self,
        path: &str,
        branch_id: BranchId,
        ts: Timestamp,
        merge_source: Option<MergeSource>,
    ) -> Result<Branch> {
        let updated = {
            let mut table = self.table.write().map_err(|_| BranchError::Poisoned)?;
            let branch = table
                .branches
                .get_mut(path)
                .ok_or_else(|| BranchError::BranchNotFound {
                    path: path.to_string(),
                })?;
            if branch.branch_id != branch_id {
                return Err(BranchError::HeadMoved {
                    path: path.to_string(),
                    expected_id: branch_id,
                    expected_head: ts,
                    actual_id: branch.branch_id,
                    actual_head: branch.head_timestamp,
                });
            }
            branch.advance(ts);
            if let Some(source) = merge_source {
                branch.merge_sources.push(source);
            }
            branch.clone()
        };
        debug!(path, head = updated.head_timestamp, "advanced branch head");
        self.notify(path);
        Ok(updated)
    }

    fn prepare_reopen(&self, path: &str) -> Result<Branch> {
        let mut table = self.table.write().map_err(|_| BranchError::Poisoned)?;
        let current = table.get(path)?.clone();
        let Some(parent_path) = current.parent_path.as_deref() else {
            return Err(BranchError::CannotReopenRoot {
                path: path.to_string(),
            });
        };
        let parent = table.get(parent_path)?.clone();
        let id = table.allocate_id()?;

        let base = parent.head_timestamp;
        let mut segments = truncate_segments(&parent.segments, base);
        segments.push(Segment::new(id, base, base));
        Ok(Branch {
            path: current.path,
            branch_id: id,
            parent_path: current.parent_path,
            base_timestamp: base,
            head_timestamp: base,
            segments,
            merge_sources: current.merge_sources,
        })
    }

    fn publish_reopen(&self, expected: &Branch, reopened: Branch) -> Result<Branch> {
        let path = reopened.path.clone();
        {
            let mut table = self.table.write().map_err(|_| BranchError::Poisoned)?;
            let current = table
                .branches
                .get_mut(&path)
                .ok_or_else(|| BranchError::BranchNotFound { path: path.clone() })?;
            if current.branch_id != expected.branch_id || current.head_timestamp != expected.head_timestamp {
                return Err(BranchError::HeadMoved {
                    path,
                    expected_id: expected.branch_id,
                    expected_head: expected.head_timestamp,
                    actual_id: current.branch_id,
                    actual_head: current.head_timestamp,
                });
            }
            *current = reopened.clone();
        }
        info!(
            path = %path,
            old_id = expected.branch_id,
            new_id = reopened.branch_id,
            base = reopened.base_timestamp,
            "reopened branch"
        );
        self.notify(&path);
        Ok(reopened)
    }

    fn add_change_listener(&self, listener: Arc<dyn BranchChangeListener>) -> Result<()> {
        self.listeners
            .write()
            .map_err(|_| BranchError::Poisoned)?
            .push(listener);
        Ok(())
    }
}

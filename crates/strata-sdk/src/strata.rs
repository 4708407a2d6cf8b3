use std::sync::Arc;

use strata_branch::{Branch, BranchChangeListener, BranchError, BranchManager, InMemoryBranchManager};
use strata_diff::{DocumentType, TypeRegistry};
use strata_merge::{CompareRequest, MergeRequest, RevisionCompare};
use strata_revision::{
    BranchRef, Commit, RevisionContext, RevisionError, RevisionSearcher, StagingArea, COMMIT_TYPE,
};
use strata_store::{Index, MemoryIndex};
use strata_types::StrataConfig;
use tracing::{debug, info};

use crate::error::SdkResult;

/// High-level Strata API.
pub struct Strata {
    ctx: RevisionContext,
    config: StrataConfig,
}

impl Strata {
    /// Create an engine over a fresh in-memory index holding only `MAIN`.
    pub fn new(config: StrataConfig) -> SdkResult<Self> {
        Self::with_backends(
            Arc::new(MemoryIndex::new()),
            Arc::new(InMemoryBranchManager::new()),
            config,
        )
    }

    /// Create an engine from TOML configuration text.
    pub fn from_toml_str(config: &str) -> SdkResult<Self> {
        Self::new(StrataConfig::from_toml_str(config)?)
    }

    /// Create an engine over caller-provided storage and branch registry.
    pub fn with_backends(
        index: Arc<dyn Index>,
        branches: Arc<dyn BranchManager>,
        config: StrataConfig,
    ) -> SdkResult<Self> {
        config.validate()?;
        let ctx = RevisionContext::new(index, branches, Arc::new(TypeRegistry::new()), config.commit.clone());
        info!(
            max_attempts = config.commit.max_attempts,
            merge_timeout_ms = config.merge.timeout.as_millis() as u64,
            "strata engine ready"
        );
        Ok(Self { ctx, config })
    }

    // ---- Types ----

    /// Register a document type. The commit record type name is reserved.
    pub fn register_type(&self, doc_type: DocumentType) -> SdkResult<()> {
        if doc_type.name == COMMIT_TYPE {
            return Err(RevisionError::ReservedType(doc_type.name).into());
        }
        let registered = self.ctx.types.register(doc_type)?;
        debug!(doc_type = %registered.name, "registered document type");
        Ok(())
    }

    // ---- Branches ----

    /// Create `name` under `parent`, based at the parent's head. Returns the new path.
    pub fn create_branch(&self, parent: &str, name: &str) -> SdkResult<String> {
        Ok(self.ctx.branches.create_branch(parent, name)?.path)
    }

    pub fn branch(&self, path: &str) -> SdkResult<Branch> {
        Ok(self.ctx.branches.get_branch(path)?)
    }

    pub fn list_branches(&self) -> SdkResult<Vec<Branch>> {
        Ok(self.ctx.branches.branches()?)
    }

    /// Register a listener called once per successful commit on any branch.
    pub fn add_change_listener(&self, listener: Arc<dyn BranchChangeListener>) -> SdkResult<()> {
        Ok(self.ctx.branches.add_change_listener(listener)?)
    }

    // ---- Reads and writes ----

    pub fn open_writer(&self, path: &str) -> SdkResult<StagingArea> {
        Ok(self.ctx.open_writer(path)?)
    }

    /// Open a searcher on `path` or `path@timestamp`.
    pub fn open_searcher(&self, branch_ref: &str) -> SdkResult<RevisionSearcher> {
        let branch_ref = BranchRef::parse(branch_ref)?;
        Ok(self.ctx.open_searcher(&branch_ref)?)
    }

    /// Commits visible on `path` or `path@timestamp`, oldest first.
    pub fn commits(&self, branch_ref: &str) -> SdkResult<Vec<Commit>> {
        Ok(self.open_searcher(branch_ref)?.commits()?)
    }

    // ---- Compare and merge ----

    /// Changes `compare` made since it diverged from `base`.
    ///
    /// `limit` defaults to `compare.default_limit` from the configuration.
    pub fn compare(
        &self,
        base: &str,
        compare: &str,
        limit: Option<usize>,
        exclude_component_changes: bool,
    ) -> SdkResult<RevisionCompare> {
        Ok(CompareRequest::new(self.ctx.clone(), base, compare)
            .limit(limit.unwrap_or(self.config.compare.default_limit))
            .exclude_component_changes(exclude_component_changes)
            .compare()?)
    }

    /// Prepare a merge of `source` into `target` with the configured squash
    /// flag and timeout.
    pub fn prepare_merge(&self, source: &str, target: &str) -> MergeRequest {
        MergeRequest::new(self.ctx.clone(), source, target)
            .squash(self.config.merge.squash_by_default)
            .timeout(self.config.merge.timeout)
    }

    /// Prepare a rebase of `child` on its parent's head.
    pub fn prepare_rebase(&self, child: &str) -> SdkResult<MergeRequest> {
        let branch = self.ctx.branches.get_branch(child)?;
        let parent = branch.parent_path.ok_or_else(|| BranchError::CannotReopenRoot {
            path: branch.path.clone(),
        })?;
        Ok(self.prepare_merge(&parent, child))
    }

    // ---- Accessors ----

    pub fn config(&self) -> &StrataConfig {
        &self.config
    }

    /// The shared engine context, for callers composing lower-level requests.
    pub fn context(&self) -> &RevisionContext {
        &self.ctx
    }
}

impl std::fmt::Debug for Strata {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Strata")
            .field("ctx", &self.ctx)
            .field("config", &self.config)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::error::SdkError;
    use strata_branch::MAIN;
    use strata_revision::Document;
    use strata_types::ObjectId;

    fn strata() -> Strata {
        let strata = Strata::new(StrataConfig::default()).unwrap();
        strata.register_type(DocumentType::new("concept")).unwrap();
        strata
    }

    #[test]
    fn new_engine_has_only_main() {
        let strata = strata();
        let branches = strata.list_branches().unwrap();
        assert_eq!(branches.len(), 1);
        assert_eq!(branches[0].path, MAIN);
    }

    #[test]
    fn loads_config_from_toml() {
        let strata = Strata::from_toml_str("[merge]\ntimeout = 250\nsquash_by_default = false\n").unwrap();
        assert_eq!(strata.config().merge.timeout, Duration::from_millis(250));
        assert!(!strata.config().merge.squash_by_default);
    }

    #[test]
    fn invalid_config_is_rejected() {
        let err = Strata::from_toml_str("[commit]\nmax_attempts = 0\n").unwrap_err();
        assert!(matches!(err, SdkError::Config(_)));
    }

    #[test]
    fn commit_type_name_is_reserved() {
        let strata = strata();
        let err = strata.register_type(DocumentType::new(COMMIT_TYPE)).unwrap_err();
        assert!(matches!(err, SdkError::Revision(RevisionError::ReservedType(_))));
    }

    #[test]
    fn duplicate_branch_is_rejected() {
        let strata = strata();
        assert_eq!(strata.create_branch(MAIN, "x").unwrap(), "MAIN/x");
        let err = strata.create_branch(MAIN, "x").unwrap_err();
        assert!(matches!(err, SdkError::Branch(BranchError::BranchAlreadyExists { .. })));
    }

    #[test]
    fn unknown_branch_is_reported() {
        let strata = strata();
        assert!(matches!(
            strata.open_writer("MAIN/nope"),
            Err(SdkError::Revision(RevisionError::Branch(BranchError::BranchNotFound { .. })))
        ));
    }

    #[test]
    fn malformed_branch_ref_is_rejected() {
        let strata = strata();
        assert!(matches!(
            strata.open_searcher("MAIN@yesterday"),
            Err(SdkError::Revision(RevisionError::InvalidBranchRef(_)))
        ));
    }

    #[test]
    fn commits_lists_history_oldest_first() {
        let strata = strata();
        for (i, term) in ["a", "b"].into_iter().enumerate() {
            let mut w = strata.open_writer(MAIN).unwrap();
            w.put(Document::new("concept", "1").with("term", term)).unwrap();
            w.commit("alice", format!("commit {i}")).unwrap();
        }
        let commits = strata.commits(MAIN).unwrap();
        let comments: Vec<&str> = commits.iter().map(|c| c.comment.as_str()).collect();
        assert_eq!(comments, ["commit 0", "commit 1"]);
        assert_eq!((commits[0].added, commits[1].changed), (1, 1));

        let pinned = strata.commits(&format!("{MAIN}@{}", commits[0].timestamp)).unwrap();
        assert_eq!(pinned.len(), 1);
    }

    #[test]
    fn rebase_needs_a_parent() {
        let strata = strata();
        assert!(matches!(
            strata.prepare_rebase(MAIN),
            Err(SdkError::Branch(BranchError::CannotReopenRoot { .. }))
        ));
        strata.create_branch(MAIN, "x").unwrap();
        assert!(strata.prepare_rebase("MAIN/x").is_ok());
    }

    #[test]
    fn compare_uses_configured_limit() {
        let mut config = StrataConfig::default();
        config.compare.default_limit = 1;
        let strata = Strata::new(config).unwrap();
        strata.register_type(DocumentType::new("concept")).unwrap();
        let child = strata.create_branch(MAIN, "x").unwrap();
        let mut w = strata.open_writer(&child).unwrap();
        w.put(Document::new("concept", "1").with("term", "a")).unwrap();
        w.put(Document::new("concept", "2").with("term", "b")).unwrap();
        w.commit("alice", "two").unwrap();

        let result = strata.compare(MAIN, &child, None, false).unwrap();
        assert_eq!((result.added, result.details.len()), (2, 1));
        assert!(result.is_limited);
        let all = strata.compare(MAIN, &child, Some(10), false).unwrap();
        assert_eq!(all.details[1].object, ObjectId::new("concept", "2"));
    }
}

//! End-to-end behaviour of the engine through the public API.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use serde_json::{json, Value};
use strata_branch::{BranchChangeListener, ListenerError, MAIN};
use strata_diff::{DiffStrategy, DocumentType};
use strata_merge::Conflict;
use strata_revision::Document;
use strata_store::Expression;
use strata_types::{ObjectId, StrataConfig};

use crate::Strata;

fn init_tracing() {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
}

fn engine_with(config: StrataConfig) -> Strata {
    init_tracing();
    let strata = Strata::new(config).unwrap();
    strata
        .register_type(
            DocumentType::new("concept")
                .with_property("synonyms", DiffStrategy::List)
                .with_property("parents", DiffStrategy::Set)
                .with_property("descriptions", DiffStrategy::KeyedList { key: "id".into() })
                .with_property("settings", DiffStrategy::Nested),
        )
        .unwrap();
    strata.register_type(DocumentType::new("description")).unwrap();
    strata
}

fn engine() -> Strata {
    engine_with(StrataConfig::default())
}

fn put(strata: &Strata, branch: &str, id: &str, props: Value) {
    let mut w = strata.open_writer(branch).unwrap();
    w.put(Document::new("concept", id).with_properties(props)).unwrap();
    w.commit("tester", format!("put {id}")).unwrap();
}

fn remove(strata: &Strata, branch: &str, id: &str) {
    let mut w = strata.open_writer(branch).unwrap();
    w.remove("concept", [id]).unwrap();
    w.commit("tester", format!("remove {id}")).unwrap();
}

fn read(strata: &Strata, branch_ref: &str, id: &str) -> Option<Value> {
    strata
        .open_searcher(branch_ref)
        .unwrap()
        .get(&ObjectId::new("concept", id))
        .unwrap()
        .map(|r| Value::Object(r.properties))
}

/// MAIN holds concept 1 with `base`; `MAIN/x` is branched off, then each
/// side writes its own version of concept 1.
fn diverge(strata: &Strata, base: Value, on_child: Value, on_main: Value) {
    put(strata, MAIN, "1", base);
    strata.create_branch(MAIN, "x").unwrap();
    put(strata, "MAIN/x", "1", on_child);
    put(strata, MAIN, "1", on_main);
}

#[test]
fn uncommitted_writes_are_invisible() {
    let strata = engine();
    let mut first = strata.open_writer(MAIN).unwrap();
    first.put(Document::new("concept", "1").with("term", "a")).unwrap();
    let mut second = strata.open_writer(MAIN).unwrap();
    second.put(Document::new("concept", "2").with("term", "b")).unwrap();

    assert!(read(&strata, MAIN, "1").is_none());
    second.commit("bob", "two").unwrap();
    assert!(read(&strata, MAIN, "1").is_none());
    assert!(read(&strata, MAIN, "2").is_some());
    first.commit("alice", "one").unwrap();
    assert!(read(&strata, MAIN, "1").is_some());
}

#[test]
fn child_writes_stay_on_the_child() {
    let strata = engine();
    put(&strata, MAIN, "1", json!({"term": "a"}));
    strata.create_branch(MAIN, "x").unwrap();
    put(&strata, "MAIN/x", "1", json!({"term": "b"}));
    put(&strata, "MAIN/x", "2", json!({"term": "c"}));

    assert_eq!(read(&strata, MAIN, "1").unwrap(), json!({"term": "a"}));
    assert!(read(&strata, MAIN, "2").is_none());
    assert_eq!(read(&strata, "MAIN/x", "1").unwrap(), json!({"term": "b"}));
}

#[test]
fn identical_adds_merge_without_duplicates() {
    let strata = engine();
    strata.create_branch(MAIN, "a").unwrap();
    strata.create_branch(MAIN, "b").unwrap();
    put(&strata, "MAIN/a", "5", json!({"term": "same"}));
    put(&strata, "MAIN/b", "5", json!({"term": "same"}));

    strata.prepare_merge("MAIN/a", MAIN).merge().unwrap();
    let second = strata.prepare_merge("MAIN/b", MAIN).merge().unwrap();
    assert!(second.is_empty());

    let hits = strata
        .open_searcher(MAIN)
        .unwrap()
        .search("concept", Expression::exact_match("properties.term", "same"), 10)
        .unwrap();
    assert_eq!(hits.total, 1);
}

#[test]
fn different_adds_conflict_once() {
    let strata = engine();
    strata.create_branch(MAIN, "a").unwrap();
    strata.create_branch(MAIN, "b").unwrap();
    put(&strata, "MAIN/a", "5", json!({"term": "left"}));
    put(&strata, "MAIN/b", "5", json!({"term": "right"}));
    strata.prepare_merge("MAIN/a", MAIN).merge().unwrap();

    let err = strata.prepare_merge("MAIN/b", MAIN).merge().unwrap_err();
    let err = crate::SdkError::from(err);
    assert_eq!(
        err.conflicts(),
        [Conflict::AddedInSourceAndTarget {
            object: ObjectId::new("concept", "5")
        }]
    );
    assert_eq!(read(&strata, MAIN, "5").unwrap(), json!({"term": "left"}));
}

#[test]
fn removal_wins_over_change_in_both_directions() {
    let strata = engine();
    put(&strata, MAIN, "1", json!({"term": "a"}));
    put(&strata, MAIN, "2", json!({"term": "a"}));
    strata.create_branch(MAIN, "x").unwrap();
    put(&strata, "MAIN/x", "1", json!({"term": "changed on x"}));
    remove(&strata, "MAIN/x", "2");
    remove(&strata, MAIN, "1");
    put(&strata, MAIN, "2", json!({"term": "changed on main"}));

    strata.prepare_rebase("MAIN/x").unwrap().merge().unwrap();
    assert!(read(&strata, "MAIN/x", "1").is_none());
    assert!(read(&strata, "MAIN/x", "2").is_none());
}

#[test]
fn independent_identical_list_appends_duplicate() {
    let strata = engine();
    diverge(
        &strata,
        json!({"synonyms": []}),
        json!({"synonyms": ["a", "b"], "f1": "x"}),
        json!({"synonyms": ["a", "b"], "f2": "m"}),
    );
    strata.prepare_merge("MAIN/x", MAIN).merge().unwrap();
    assert_eq!(
        read(&strata, MAIN, "1").unwrap(),
        json!({"synonyms": ["a", "b", "a", "b"], "f1": "x", "f2": "m"})
    );
}

#[test]
fn independent_identical_set_adds_dedup() {
    let strata = engine();
    diverge(
        &strata,
        json!({"parents": []}),
        json!({"parents": ["a", "b"], "f1": "x"}),
        json!({"parents": ["a", "b"], "f2": "m"}),
    );
    strata.prepare_merge("MAIN/x", MAIN).merge().unwrap();
    assert_eq!(read(&strata, MAIN, "1").unwrap()["parents"], json!(["a", "b"]));
}

#[test]
fn keyed_items_merge_per_sub_property() {
    let strata = engine();
    diverge(
        &strata,
        json!({"descriptions": [{"id": "d1", "term": "heart", "lang": "en"}]}),
        json!({"descriptions": [{"id": "d1", "term": "cardiac", "lang": "en"}]}),
        json!({"descriptions": [{"id": "d1", "term": "heart", "lang": "fr"}]}),
    );
    strata.prepare_merge("MAIN/x", MAIN).merge().unwrap();
    assert_eq!(
        read(&strata, MAIN, "1").unwrap()["descriptions"],
        json!([{"id": "d1", "term": "cardiac", "lang": "fr"}])
    );
}

#[test]
fn keyed_items_conflict_on_the_same_sub_property() {
    let strata = engine();
    diverge(
        &strata,
        json!({"descriptions": [{"id": "d1", "term": "heart"}]}),
        json!({"descriptions": [{"id": "d1", "term": "cardiac"}]}),
        json!({"descriptions": [{"id": "d1", "term": "cor"}]}),
    );
    let err = strata.prepare_merge("MAIN/x", MAIN).merge().unwrap_err();
    assert_eq!(
        err.conflicts(),
        [Conflict::ChangedInSourceAndTarget {
            object: ObjectId::new("concept", "1"),
            property: "descriptions[d1].term".into(),
            source_value: json!("cardiac"),
            target_value: json!("cor"),
        }]
    );
}

#[test]
fn parent_changes_reach_the_child_on_merge() {
    let strata = engine();
    diverge(
        &strata,
        json!({"f1": "a", "f2": "b"}),
        json!({"f1": "a", "f2": "b2"}),
        json!({"f1": "a2", "f2": "b"}),
    );
    strata.prepare_merge(MAIN, "MAIN/x").merge().unwrap();
    assert_eq!(read(&strata, "MAIN/x", "1").unwrap(), json!({"f1": "a2", "f2": "b2"}));
    assert_eq!(read(&strata, MAIN, "1").unwrap(), json!({"f1": "a2", "f2": "b"}));
}

#[test]
fn repeated_rebases_keep_child_changes() {
    let strata = engine();
    put(&strata, MAIN, "1", json!({"f1": "a"}));
    strata.create_branch(MAIN, "x").unwrap();
    put(&strata, "MAIN/x", "1", json!({"f1": "a", "f2": "b"}));

    put(&strata, MAIN, "1", json!({"f1": "a2"}));
    strata.prepare_rebase("MAIN/x").unwrap().merge().unwrap();
    assert_eq!(read(&strata, "MAIN/x", "1").unwrap(), json!({"f1": "a2", "f2": "b"}));

    put(&strata, MAIN, "1", json!({"f1": "a2", "f3": "c"}));
    strata.prepare_rebase("MAIN/x").unwrap().merge().unwrap();
    assert_eq!(
        read(&strata, "MAIN/x", "1").unwrap(),
        json!({"f1": "a2", "f2": "b", "f3": "c"})
    );

    let again = strata.prepare_rebase("MAIN/x").unwrap().merge().unwrap();
    assert!(again.is_empty());
    assert_eq!(
        read(&strata, "MAIN/x", "1").unwrap(),
        json!({"f1": "a2", "f2": "b", "f3": "c"})
    );
}

#[test]
fn rebase_after_merging_child_into_parent_is_clean() {
    let strata = engine();
    put(&strata, MAIN, "1", json!({"f": "a"}));
    strata.create_branch(MAIN, "x").unwrap();
    put(&strata, "MAIN/x", "1", json!({"f": "x1"}));
    strata.prepare_merge("MAIN/x", MAIN).merge().unwrap();
    put(&strata, "MAIN/x", "1", json!({"f": "x2"}));
    put(&strata, MAIN, "2", json!({"term": "unrelated"}));

    strata.prepare_rebase("MAIN/x").unwrap().merge().unwrap();
    assert_eq!(read(&strata, "MAIN/x", "1").unwrap(), json!({"f": "x2"}));
    assert_eq!(read(&strata, "MAIN/x", "2").unwrap(), json!({"term": "unrelated"}));
    assert_eq!(read(&strata, MAIN, "1").unwrap(), json!({"f": "x1"}));
}

#[test]
fn merging_back_between_siblings_is_clean() {
    let strata = engine();
    strata.create_branch(MAIN, "a").unwrap();
    strata.create_branch(MAIN, "b").unwrap();
    put(&strata, "MAIN/a", "1", json!({"f": "a1"}));
    strata.prepare_merge("MAIN/a", "MAIN/b").merge().unwrap();
    put(&strata, "MAIN/b", "1", json!({"f": "b2"}));

    strata.prepare_merge("MAIN/b", "MAIN/a").merge().unwrap();
    assert_eq!(read(&strata, "MAIN/a", "1").unwrap(), json!({"f": "b2"}));
}

#[test]
fn nested_objects_added_on_both_sides_merge() {
    let strata = engine();
    diverge(
        &strata,
        json!({"term": "x"}),
        json!({"term": "x", "settings": {"a": 1, "b": 2}}),
        json!({"term": "x", "settings": {"a": 1, "c": 3}}),
    );
    strata.prepare_merge("MAIN/x", MAIN).merge().unwrap();
    assert_eq!(
        read(&strata, MAIN, "1").unwrap(),
        json!({"term": "x", "settings": {"a": 1, "b": 2, "c": 3}})
    );
}

#[test]
fn property_removed_on_the_child_is_dropped_on_merge() {
    let strata = engine();
    diverge(
        &strata,
        json!({"f": 1, "g": 1}),
        json!({"g": 1}),
        json!({"f": 1, "g": 2}),
    );
    strata.prepare_merge("MAIN/x", MAIN).merge().unwrap();
    assert_eq!(read(&strata, MAIN, "1").unwrap(), json!({"g": 2}));
}

#[test]
fn removed_container_conflicts_with_a_changed_component() {
    let strata = engine();
    let mut w = strata.open_writer(MAIN).unwrap();
    w.put(Document::new("concept", "1").with("term", "heart")).unwrap();
    w.put(
        Document::new("description", "d1")
            .with("term", "heart")
            .in_container(ObjectId::new("concept", "1")),
    )
    .unwrap();
    w.commit("tester", "seed").unwrap();
    strata.create_branch(MAIN, "x").unwrap();

    let mut w = strata.open_writer("MAIN/x").unwrap();
    w.put(
        Document::new("description", "d1")
            .with("term", "cardiac")
            .in_container(ObjectId::new("concept", "1")),
    )
    .unwrap();
    w.commit("tester", "edit description").unwrap();
    remove(&strata, MAIN, "1");

    let err = strata.prepare_merge("MAIN/x", MAIN).merge().unwrap_err();
    assert!(err.conflicts().iter().any(|c| matches!(
        c,
        Conflict::ContainerDetachedWithComponentChange { container, component }
            if *container == ObjectId::new("concept", "1")
                && *component == ObjectId::new("description", "d1")
    )));
}

#[test]
fn non_squash_merge_keeps_commit_boundaries() {
    let mut config = StrataConfig::default();
    config.merge.squash_by_default = false;
    let strata = engine_with(config);
    strata.create_branch(MAIN, "x").unwrap();
    put(&strata, "MAIN/x", "1", json!({"v": 1}));
    put(&strata, "MAIN/x", "2", json!({"v": 1}));

    let before = strata.commits(MAIN).unwrap().len();
    let result = strata.prepare_merge("MAIN/x", MAIN).merge().unwrap();
    assert_eq!(result.commits.len(), 2);
    assert_eq!(strata.commits(MAIN).unwrap().len(), before + 2);

    let squashed = engine();
    squashed.create_branch(MAIN, "x").unwrap();
    put(&squashed, "MAIN/x", "1", json!({"v": 1}));
    put(&squashed, "MAIN/x", "2", json!({"v": 1}));
    assert_eq!(squashed.prepare_merge("MAIN/x", MAIN).merge().unwrap().commits.len(), 1);
}

#[test]
fn reads_at_a_past_timestamp() {
    let strata = engine();
    put(&strata, MAIN, "1", json!({"term": "v1"}));
    let first = strata.branch(MAIN).unwrap().head_timestamp;
    put(&strata, MAIN, "1", json!({"term": "v2"}));
    remove(&strata, MAIN, "1");

    assert_eq!(read(&strata, &format!("MAIN@{first}"), "1").unwrap(), json!({"term": "v1"}));
    assert!(read(&strata, MAIN, "1").is_none());
    assert!(read(&strata, &format!("MAIN@{}", first - 1), "1").is_none());
}

#[derive(Default)]
struct CountingListener {
    calls: AtomicUsize,
}

impl BranchChangeListener for CountingListener {
    fn on_branch_changed(&self, _path: &str) -> Result<(), ListenerError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

#[test]
fn listeners_hear_each_commit_once() {
    let strata = engine();
    let listener = Arc::new(CountingListener::default());
    strata.add_change_listener(listener.clone()).unwrap();

    put(&strata, MAIN, "1", json!({"term": "a"}));
    assert_eq!(listener.calls.load(Ordering::SeqCst), 1);

    // Nothing staged, nothing announced.
    strata.open_writer(MAIN).unwrap().commit("tester", "noop").unwrap();
    assert_eq!(listener.calls.load(Ordering::SeqCst), 1);

    strata.create_branch(MAIN, "x").unwrap();
    put(&strata, "MAIN/x", "2", json!({"term": "b"}));
    put(&strata, MAIN, "3", json!({"term": "c"}));
    assert_eq!(listener.calls.load(Ordering::SeqCst), 3);

    strata.prepare_rebase("MAIN/x").unwrap().merge().unwrap();
    assert_eq!(listener.calls.load(Ordering::SeqCst), 4);
}

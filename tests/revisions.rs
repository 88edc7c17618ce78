use docsession::{
    DocumentStore, Error,
    commands::RevisionsResult,
    conventions::Conventions,
    revisions::GetRevisionOperation,
    testing::InMemoryExecutor,
};
use serde::Deserialize;
use serde_json::{Map as JsonMap, Value, json};
use std::sync::Arc;

#[derive(Deserialize, Debug, Clone, PartialEq)]
struct Order {
    #[serde(rename = "Id", default)]
    id: String,
    #[serde(rename = "Company")]
    company: String,
}

fn object(value: Value) -> JsonMap<String, Value> {
    match value {
        Value::Object(map) => map,
        other => panic!("expected an object, got {other}"),
    }
}

fn revision(id: &str, change_vector: &str, company: &str) -> JsonMap<String, Value> {
    object(json!({
        "Company": company,
        "@metadata": {
            "@id": id,
            "@change-vector": change_vector,
            "@collection": "Orders",
            "@flags": "HasRevisions, Revision",
        }
    }))
}

fn store() -> (Arc<InMemoryExecutor>, DocumentStore) {
    let executor = Arc::new(InMemoryExecutor::new());
    let store = DocumentStore::builder(executor.clone())
        .conventions(Conventions::builder().database("Northwind").build())
        .build();
    (executor, store)
}

#[test]
fn materialize_all_keeps_null_slots_untracked() -> anyhow::Result<()> {
    let (_, store) = store();
    let session = store.open_session();
    let mut op = GetRevisionOperation::range(&session.advanced(), "orders/1", 0, 25, false)?;
    op.attach_result(RevisionsResult::new(vec![
        Some(revision("orders/1", "A:2", "companies/2")),
        None,
        Some(revision("orders/1", "A:1", "companies/1")),
    ]));

    let revisions = op.materialize_all::<Order>()?;

    assert_eq!(revisions.len(), 3);
    assert!(revisions[1].is_none());
    let first = revisions[0].as_ref().expect("first revision");
    let third = revisions[2].as_ref().expect("third revision");
    assert_eq!(first.borrow().company, "companies/2");
    assert_eq!(first.borrow().id, "orders/1");
    assert_eq!(third.borrow().company, "companies/1");

    assert_eq!(session.tracked_count(), 2);
    assert_eq!(session.change_vector_for(first).as_deref(), Some("A:2"));
    assert_eq!(session.change_vector_for(third).as_deref(), Some("A:1"));
    let info = session.document_info(first).expect("tracked");
    assert_eq!(info.id(), "orders/1");
    assert!(info.metadata().is_some());
    Ok(())
}

#[test]
fn materialize_one_without_result_is_none() -> anyhow::Result<()> {
    let (_, store) = store();
    let session = store.open_session();
    let op = GetRevisionOperation::for_change_vector(&session.advanced(), "A:1")?;

    assert!(op.materialize_one::<Order>()?.is_none());

    let mut op = GetRevisionOperation::for_change_vector(&session.advanced(), "A:1")?;
    op.attach_result(RevisionsResult::new(vec![None]));
    assert!(op.materialize_one::<Order>()?.is_none());
    assert_eq!(session.tracked_count(), 0);
    Ok(())
}

#[test]
fn change_vector_map_follows_requested_order() -> anyhow::Result<()> {
    let (_, store) = store();
    let session = store.open_session();
    let mut op = GetRevisionOperation::for_change_vectors(
        &session.advanced(),
        vec!["".into(), "cv-1".into(), "cv-2".into()],
    )?;
    op.attach_result(RevisionsResult::new(vec![
        Some(object(json!({ "not": "an order" }))),
        Some(revision("orders/9", "cv-1", "companies/9")),
        None,
    ]));

    let by_cv = op.materialize_by_change_vector::<Order>()?;

    assert_eq!(by_cv.len(), 2);
    assert!(!by_cv.contains_key(""));
    let a = by_cv["cv-1"].as_ref().expect("entity for cv-1");
    assert_eq!(a.borrow().company, "companies/9");
    assert!(by_cv["cv-2"].is_none());
    assert_eq!(session.tracked_count(), 1);
    Ok(())
}

#[test]
fn metadata_only_view_does_not_track() -> anyhow::Result<()> {
    let (_, store) = store();
    let session = store.open_session();
    let mut op = GetRevisionOperation::range(&session.advanced(), "orders/1", 0, 10, true)?;
    op.attach_result(RevisionsResult::new(vec![
        Some(object(json!({
            "@metadata": { "@id": "orders/1", "@change-vector": "A:1" },
            "Name": "x"
        }))),
        Some(object(json!({ "Name": "no metadata" }))),
        None,
    ]));

    let views = op.materialize_all_metadata_only();

    assert_eq!(views.len(), 3);
    assert_eq!(views[0].id(), Some("orders/1"));
    assert_eq!(views[0].change_vector(), Some("A:1"));
    assert!(views[0].get("Name").is_none());
    assert!(views[1].is_empty());
    assert!(views[2].is_empty());
    assert_eq!(session.tracked_count(), 0);
    Ok(())
}

#[test]
fn empty_id_is_rejected_before_any_request() {
    let (executor, store) = store();
    let session = store.open_session();

    let err = GetRevisionOperation::range(&session.advanced(), "", 0, 10, false)
        .err()
        .expect("precondition");
    assert!(matches!(err, Error::Precondition(_)));

    let err = session
        .advanced()
        .revisions()
        .get_for::<Order>("", 0, 10)
        .expect_err("precondition");
    assert!(matches!(err, Error::Precondition(_)));
    assert_eq!(executor.request_count(), 0);
}

#[test]
fn page_size_bounds_are_enforced() {
    let executor = Arc::new(InMemoryExecutor::new());
    let store = DocumentStore::builder(executor)
        .conventions(Conventions::builder().max_revisions_page_size(5).build())
        .build();
    let session = store.open_session();

    for page_size in [0, 6] {
        let err = GetRevisionOperation::range(&session.advanced(), "orders/1", 0, page_size, false)
            .err()
            .expect("precondition");
        assert!(matches!(err, Error::Precondition(_)), "page size {page_size}");
    }
}

#[test]
fn closed_session_fails_the_request_build() -> anyhow::Result<()> {
    let (_, store) = store();
    let session = store.open_session();
    let advanced = session.advanced();
    let op = GetRevisionOperation::range(&advanced, "orders/1", 0, 10, false)?;
    assert!(op.build_request().is_ok());

    session.close();

    assert!(!advanced.is_open());
    assert!(matches!(op.build_request(), Err(Error::Precondition(_))));
    assert!(GetRevisionOperation::range(&advanced, "orders/1", 0, 10, false).is_err());
    Ok(())
}

#[test]
fn conversion_errors_name_the_slot() -> anyhow::Result<()> {
    let (_, store) = store();
    let session = store.open_session();
    let mut op = GetRevisionOperation::range(&session.advanced(), "orders/1", 0, 10, false)?;
    op.attach_result(RevisionsResult::new(vec![
        Some(revision("orders/1", "A:2", "companies/2")),
        Some(object(json!({
            "Company": 42,
            "@metadata": { "@id": "orders/1", "@change-vector": "A:1" }
        }))),
    ]));

    let err = op.materialize_all::<Order>().expect_err("bad slot");
    match &err {
        Error::Conversion { slot, id, source } => {
            assert_eq!(*slot, 1);
            assert_eq!(id, "orders/1");
            assert!(matches!(source.as_ref(), Error::Serde(_)));
        }
        other => panic!("wrong error: {other:?}"),
    }
    assert_eq!(session.tracked_count(), 0);
    Ok(())
}

#[test]
fn failed_change_vector_lookup_tracks_nothing() -> anyhow::Result<()> {
    let (_, store) = store();
    let session = store.open_session();
    let mut op = GetRevisionOperation::for_change_vectors(
        &session.advanced(),
        vec!["cv-1".into(), "cv-2".into()],
    )?;
    op.attach_result(RevisionsResult::new(vec![
        Some(revision("orders/1", "cv-1", "companies/1")),
        Some(object(json!({ "Company": ["not", "a", "string"] }))),
    ]));

    let err = op.materialize_by_change_vector::<Order>().expect_err("bad slot");
    assert!(matches!(err, Error::Conversion { slot: 1, .. }));
    assert_eq!(session.tracked_count(), 0);
    Ok(())
}

#[test]
fn nothing_attached_materializes_to_empty_collections() -> anyhow::Result<()> {
    let (_, store) = store();
    let session = store.open_session();
    let op = GetRevisionOperation::range(&session.advanced(), "orders/1", 0, 10, false)?;

    assert!(op.materialize_all::<Order>()?.is_empty());
    assert!(op.materialize_all_metadata_only().is_empty());
    assert_eq!(session.tracked_count(), 0);
    Ok(())
}

#[test]
fn range_operation_has_no_change_vectors_to_key_by() -> anyhow::Result<()> {
    let (_, store) = store();
    let session = store.open_session();
    let mut op = GetRevisionOperation::range(&session.advanced(), "orders/1", 0, 10, false)?;
    op.attach_result(RevisionsResult::new(vec![Some(revision(
        "orders/1",
        "A:1",
        "companies/1",
    ))]));

    assert!(op.materialize_by_change_vector::<Order>()?.is_empty());
    assert_eq!(session.tracked_count(), 0);
    Ok(())
}

#[test]
fn session_api_fetches_through_the_executor() -> anyhow::Result<()> {
    let (executor, store) = store();
    executor.add_revision(Value::Object(revision("orders/1", "A:1", "companies/1")))?;
    executor.add_revision(Value::Object(revision("orders/1", "A:2", "companies/2")))?;
    executor.add_revision(Value::Object(revision("orders/1", "A:3", "companies/3")))?;

    let session = store.open_session();
    let revisions = session.advanced().revisions();

    let page = revisions.get_for::<Order>("orders/1", 1, 2)?;
    let companies: Vec<String> = page
        .iter()
        .map(|rev| rev.as_ref().expect("revision").borrow().company.clone())
        .collect();
    assert_eq!(companies, vec!["companies/2", "companies/1"]);

    let meta = revisions.get_metadata_for("orders/1", 0, 10)?;
    assert_eq!(meta.len(), 3);
    assert_eq!(meta[0].change_vector(), Some("A:3"));
    assert_eq!(meta[0].collection(), Some("Orders"));
    assert_eq!(meta[0].flags(), vec!["HasRevisions", "Revision"]);

    let single = revisions.get::<Order>("A:2")?.expect("revision A:2");
    assert_eq!(single.borrow().company, "companies/2");

    let many = revisions.get_many::<Order, _, _>(["A:1", "", "missing"])?;
    assert_eq!(many.len(), 2);
    assert!(many["A:1"].is_some());
    assert!(many["missing"].is_none());

    let requests = executor.requests();
    assert_eq!(requests.len(), 4);
    assert!(requests.iter().all(|(db, _)| db == "Northwind"));
    assert!(requests[1].1.metadata_only());
    assert_eq!(requests[3].1.requested_change_vectors(), ["A:1", "", "missing"]);
    Ok(())
}

#[test]
fn transport_errors_reach_the_caller_verbatim() {
    let (executor, store) = store();
    executor.fail_next("connection reset");
    let session = store.open_session();

    let err = session
        .advanced()
        .revisions()
        .get::<Order>("A:1")
        .expect_err("transport failure");
    assert!(matches!(err, Error::Transport(msg) if msg == "connection reset"));
    assert_eq!(session.tracked_count(), 0);
}

#[test]
fn lazy_revisions_fetch_once_on_first_use() -> anyhow::Result<()> {
    let (executor, store) = store();
    executor.add_revision(Value::Object(revision("orders/1", "A:1", "companies/1")))?;
    let session = store.open_session();

    let lazy = session.advanced().revisions().lazily().get_for::<Order>("orders/1", 0, 10)?;
    assert_eq!(executor.request_count(), 0);
    assert!(!lazy.is_value_created());

    let first = lazy.get_value()?.len();
    let second = lazy.get_value()?.len();

    assert_eq!((first, second), (1, 1));
    assert_eq!(executor.request_count(), 1);
    assert_eq!(session.tracked_count(), 1);
    assert!(lazy.is_value_created());
    Ok(())
}

#[test]
fn lazy_revisions_reject_bad_arguments_eagerly() {
    let (executor, store) = store();
    let session = store.open_session();
    let lazily = session.advanced().revisions().lazily();

    assert!(matches!(lazily.get_for::<Order>("", 0, 10), Err(Error::Precondition(_))));
    assert!(matches!(lazily.get::<Order>(""), Err(Error::Precondition(_))));
    assert_eq!(executor.request_count(), 0);
}

#[test]
fn lazy_failure_is_shared_and_not_retried() -> anyhow::Result<()> {
    let (executor, store) = store();
    executor.fail_next("503");
    let session = store.open_session();
    let lazy = session.advanced().revisions().lazily().get_metadata_for("orders/1", 0, 10)?;

    let first = lazy.get_value().expect_err("first");
    let second = lazy.get_value().expect_err("second");
    match (first, second) {
        (Error::Deferred(a), Error::Deferred(b)) => assert!(Arc::ptr_eq(&a, &b)),
        other => panic!("wrong errors: {other:?}"),
    }
    assert_eq!(executor.request_count(), 1);
    Ok(())
}

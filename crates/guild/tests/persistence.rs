//! Terminal outcomes in the SQLite store.

mod common;

use common::{transformer_scenario, ScenarioBuilder, TestHarness};

use guild::{JobStatus, PipelineError, ResultStore, SqliteResultStore, StageKind};

#[test]
fn test_done_result_is_stored() {
    let harness = TestHarness::new(transformer_scenario());

    let id = harness.submit("transformer efficiency");
    harness.wait_terminal(&id);

    let stored = harness.store.load(&id).unwrap().expect("outcome saved");
    let outcome = harness.dispatcher.result(&id).unwrap();
    assert_eq!(stored, outcome);
    assert!(stored.result().is_some());
}

#[test]
fn test_failed_job_error_survives_purge() {
    let harness = TestHarness::new(ScenarioBuilder::new().build());

    let id = harness.submit("nothing here");
    let snapshot = harness.wait_terminal(&id);
    assert_eq!(snapshot.status, JobStatus::Failed);
    harness.dispatcher.purge(&id).unwrap();
    assert!(harness.dispatcher.status(&id).is_err());

    let archived = harness
        .dispatcher
        .archived_result(&id)
        .unwrap()
        .expect("outcome archived");
    assert_eq!(archived.status(), JobStatus::Failed);
    assert!(archived.result().is_none());
    match archived.error() {
        Some(PipelineError::StageFailure { stage, cause }) => {
            assert_eq!(*stage, StageKind::Fetch);
            assert!(cause.contains("no papers found for 'nothing here'"));
        }
        other => panic!("unexpected error: {:?}", other),
    }
    assert_eq!(archived.error(), snapshot.error.as_ref());
    assert_eq!(harness.store.failed_count().unwrap(), 1);
}

#[test]
fn test_archived_result_survives_purge() {
    let harness = TestHarness::new(transformer_scenario());

    let id = harness.submit("transformer efficiency");
    harness.wait_terminal(&id);
    harness.dispatcher.purge(&id).unwrap();

    let archived = harness.dispatcher.archived_result(&id).unwrap().unwrap();
    let result = archived.result().expect("done outcome");
    assert_eq!(result.query, "transformer efficiency");
    assert_eq!(result.recommendations.len(), 2);
}

#[test]
fn test_results_readable_after_reopen() {
    let harness = TestHarness::new(transformer_scenario());

    let first = harness.submit("transformer efficiency");
    let second = harness.submit("sparse attention");
    harness.wait_terminal(&first);
    harness.wait_terminal(&second);

    let reopened = SqliteResultStore::open(&harness.db_path()).unwrap();
    assert!(reopened.load(&first).unwrap().is_some());

    let recent = reopened.recent(10).unwrap();
    let mut queries: Vec<&str> = recent
        .iter()
        .filter_map(|(_, outcome)| outcome.result())
        .map(|r| r.query.as_str())
        .collect();
    queries.sort();
    assert_eq!(queries, vec!["sparse attention", "transformer efficiency"]);

    assert!(reopened.delete(&second).unwrap());
    assert!(harness.store.load(&second).unwrap().is_none());
}

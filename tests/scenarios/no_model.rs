//! Scenario B: processed data but no model yet

use crate::helpers::*;
use retrain::core::{RetrainDecision, Stage, StageState};
use retrain::execution::ExecutionEvent;
use retrain::store::{FsStore, ObjectStore};
use retrain::trigger::OutcomeClass;
use std::sync::Arc;

fn two_setosa_rows() -> Vec<u8> {
    format!(
        "{}\n5.1,3.5,1.4,0.2,setosa\n4.9,3.0,1.4,0.2,setosa\n",
        HEADER
    )
    .into_bytes()
}

#[tokio::test]
async fn test_first_run_trains_and_promotes() {
    let bucket = tempfile::tempdir().unwrap();
    let staging = tempfile::tempdir().unwrap();
    let store: Arc<dyn ObjectStore> = Arc::new(FsStore::new(bucket.path()));
    store.put(PROCESSED_KEY, two_setosa_rows()).await.unwrap();

    let log = EventLog::default();
    let engine = log
        .attach(engine_over(store.clone()))
        .with_staging_root(staging.path());

    let result = engine.run(false).await;
    let outcome = result.as_ref().unwrap();

    assert_eq!(
        outcome.initial.as_ref().map(|r| r.decision),
        Some(RetrainDecision::NoModel)
    );
    assert!(outcome.retrained);
    assert_eq!(outcome.decision(), Some(RetrainDecision::Pass));
    assert_eq!(outcome.report.as_ref().unwrap().score, Some(1.0));
    assert_eq!(OutcomeClass::of(&result).exit_code(), 0);

    // raw data is absent, so the processed blob is used as-is
    assert!(matches!(outcome.state.stage(Stage::Ingest), StageState::Skipped { .. }));
    assert!(matches!(outcome.state.stage(Stage::Promote), StageState::Completed { .. }));

    assert!(store.exists(MODEL_KEY).await.unwrap());
    assert!(store.exists(POINTER_KEY).await.unwrap());
    assert!(bucket.path().join(MODEL_KEY).is_file());
    assert!(!store.exists(LEASE_KEY).await.unwrap());

    let pointer = outcome.promoted.as_ref().unwrap();
    let versioned = store.get(&pointer.version_key).await.unwrap().unwrap();
    let canonical = store.get(MODEL_KEY).await.unwrap().unwrap();
    assert_eq!(versioned, canonical);

    assert_eq!(log.promotions(), 1);
    let decisions: Vec<bool> = log
        .events()
        .iter()
        .filter_map(|e| match e {
            ExecutionEvent::DecisionMade { after_training, .. } => Some(*after_training),
            _ => None,
        })
        .collect();
    assert_eq!(decisions, vec![false, true]);

    assert!(dir_is_empty(staging.path()));
}

#[tokio::test]
async fn test_check_reports_no_model_without_training() {
    let store = seeded_store(&[(PROCESSED_KEY, two_setosa_rows())]).await;
    let result = engine_over(store.clone()).check().await;

    let outcome = result.as_ref().unwrap();
    assert_eq!(outcome.decision(), Some(RetrainDecision::NoModel));
    assert!(!outcome.retrained);
    assert_eq!(OutcomeClass::of(&result).http_status(), 409);
    assert_eq!(store.keys().await, vec![PROCESSED_KEY.to_string()]);
}

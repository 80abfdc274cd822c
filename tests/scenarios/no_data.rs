//! Scenario A: nothing in the store

use crate::helpers::*;
use retrain::core::{RetrainDecision, Stage, StageState};
use retrain::store::InMemoryStore;
use retrain::trigger::{OutcomeClass, TriggerResponse};
use std::sync::Arc;

#[tokio::test]
async fn test_empty_store_is_no_data() {
    let store = Arc::new(InMemoryStore::new());
    let engine = engine_over(store.clone());

    let result = engine.run(false).await;
    let outcome = result.as_ref().unwrap();

    assert_eq!(outcome.decision(), Some(RetrainDecision::NoData));
    assert!(!outcome.retrained);
    assert!(outcome.promoted.is_none());
    assert!(matches!(outcome.state.stage(Stage::Train), StageState::Skipped { .. }));

    let class = OutcomeClass::of(&result);
    assert_eq!(class.exit_code(), 1);
    assert_eq!(class.http_status(), 424);

    // nothing written, in particular no model
    assert!(store.is_empty().await);
}

#[tokio::test]
async fn test_no_data_ignores_existing_model() {
    let store = seeded_store(&[(MODEL_KEY, model_bytes(&iris_csv(8, 8), 5))]).await;
    let engine = engine_over(store.clone());

    let result = engine.check().await;
    let body = TriggerResponse::from_result(&result);
    assert_eq!(body.decision, Some(RetrainDecision::NoData));
    assert_eq!(body.score, None);
    assert_eq!(store.keys().await, vec![MODEL_KEY.to_string()]);
}

#[tokio::test]
async fn test_forced_retrain_without_data_trains_nothing() {
    let store = Arc::new(InMemoryStore::new());
    let outcome = engine_over(store.clone()).retrain().await.unwrap();

    assert_eq!(outcome.decision(), Some(RetrainDecision::NoData));
    assert!(!outcome.retrained);
    assert!(store.is_empty().await);
}

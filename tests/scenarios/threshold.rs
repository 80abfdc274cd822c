//! Scenario C: accuracy exactly at the threshold passes

use crate::helpers::*;
use retrain::core::{RetrainDecision, Stage, StageState};
use retrain::store::ObjectStore;
use retrain::trigger::OutcomeClass;

/// 100 rows the reference model gets right except for one mislabeled flower
fn ninety_nine_of_hundred() -> Vec<u8> {
    let mut csv = iris_csv(50, 49);
    csv.push_str(&format!("{},virginica\n", setosa_features(3)));
    csv.into_bytes()
}

async fn store_at_099() -> std::sync::Arc<retrain::store::InMemoryStore> {
    seeded_store(&[
        (PROCESSED_KEY, ninety_nine_of_hundred()),
        (MODEL_KEY, model_bytes(&iris_csv(10, 10), 15)),
    ])
    .await
}

#[tokio::test]
async fn test_score_equal_to_threshold_passes() {
    let store = store_at_099().await;
    let result = engine_over(store.clone()).check().await;
    let report = result.as_ref().unwrap().report.clone().unwrap();

    assert_eq!(report.score, Some(0.99));
    assert_eq!(report.threshold, 0.99);
    assert_eq!(report.decision, RetrainDecision::Pass);
    assert_eq!(OutcomeClass::of(&result).exit_code(), 0);
    assert_eq!(OutcomeClass::of(&result).http_status(), 200);
}

#[tokio::test]
async fn test_passing_model_is_not_retrained() {
    let store = store_at_099().await;
    let model_before = store.get(MODEL_KEY).await.unwrap();

    let outcome = engine_over(store.clone()).run(false).await.unwrap();
    assert_eq!(outcome.decision(), Some(RetrainDecision::Pass));
    assert!(!outcome.retrained);
    assert!(matches!(outcome.state.stage(Stage::Train), StageState::Skipped { .. }));
    assert_eq!(store.get(MODEL_KEY).await.unwrap(), model_before);
    assert!(!store.exists(POINTER_KEY).await.unwrap());
}

#[tokio::test]
async fn test_threshold_just_above_fails() {
    let store = store_at_099().await;
    let mut config = test_config();
    config.threshold = 0.995;
    let engine = retrain::execution::RetrainEngine::with_store(config, store);

    let result = engine.check().await;
    assert_eq!(result.as_ref().unwrap().decision(), Some(RetrainDecision::Fail));
    assert_eq!(OutcomeClass::of(&result).exit_code(), 1);
}

//! Promotion keeps the canonical model and its pointer in step

use crate::helpers::*;
use retrain::core::{PipelineError, RetrainDecision, Stage};
use retrain::execution::RetrainEngine;
use retrain::store::{InMemoryStore, ObjectStore};
use retrain::trigger::OutcomeClass;
use std::sync::Arc;

#[tokio::test]
async fn test_failed_pointer_write_keeps_previous_model() {
    let inner = InMemoryStore::new();
    inner
        .put(PROCESSED_KEY, iris_csv(10, 10).into_bytes())
        .await
        .unwrap();
    let store = Arc::new(PointerOutageStore::new(inner));

    let engine = engine_over(store.clone());
    let v1 = engine.train().await.unwrap().promoted.unwrap();
    let v1_bytes = store.inner().get(MODEL_KEY).await.unwrap().unwrap();
    let v1_pointer = store.inner().get(POINTER_KEY).await.unwrap();

    store.set_down(true);
    let mut config = test_config();
    config.training.seed = 7;
    let reseeded = RetrainEngine::with_store(config, store.clone());
    let result = reseeded.train().await;
    assert_eq!(OutcomeClass::of(&result).exit_code(), 3);

    let err = result.unwrap_err();
    assert_eq!(err.source.stage(), Some(Stage::Promote));
    assert!(matches!(err.source.root(), PipelineError::StoreUnavailable(_)));

    assert_eq!(store.inner().get(MODEL_KEY).await.unwrap(), Some(v1_bytes));
    assert_eq!(store.inner().get(POINTER_KEY).await.unwrap(), v1_pointer);
    assert!(!store.inner().exists(LEASE_KEY).await.unwrap());

    store.set_down(false);
    let check = engine.check().await.unwrap();
    assert_eq!(check.decision(), Some(RetrainDecision::Pass));
    assert_eq!(check.report.unwrap().model_version, Some(v1.version.clone()));
    assert_eq!(
        engine.current_model().await.unwrap().map(|p| p.version),
        Some(v1.version)
    );
}

#[tokio::test]
async fn test_pointer_disagreeing_with_model_is_ignored() {
    let store = seeded_store(&[(PROCESSED_KEY, iris_csv(10, 10).into_bytes())]).await;
    let engine = engine_over(store.clone());
    engine.train().await.unwrap();

    // a promotion cut off after the canonical write
    store
        .put(MODEL_KEY, model_bytes(&iris_csv(10, 10), 3))
        .await
        .unwrap();

    let check = engine.check().await.unwrap();
    assert_eq!(check.report.unwrap().model_version, None);
    assert_eq!(engine.current_model().await.unwrap(), None);
    assert!(engine.versions().await.unwrap().iter().all(|v| !v.current));
}

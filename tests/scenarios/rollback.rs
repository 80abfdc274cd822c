//! Version listing and rollback

use crate::helpers::*;
use retrain::core::{PipelineError, RetrainDecision, Stage};
use retrain::store::ObjectStore;
use retrain::trigger::OutcomeClass;

#[tokio::test]
async fn test_rollback_restores_older_version() {
    let store = seeded_store(&[(RAW_KEY, iris_csv(10, 10).into_bytes())]).await;
    let engine = engine_over(store.clone());

    let first = engine.retrain().await.unwrap();
    let v1 = first.promoted.clone().unwrap();
    let v1_bytes = store.get(MODEL_KEY).await.unwrap().unwrap();

    store
        .put(RAW_KEY, iris_csv(16, 12).into_bytes())
        .await
        .unwrap();
    let second = engine.retrain().await.unwrap();
    let v2 = second.promoted.clone().unwrap();
    assert_ne!(v1.version, v2.version);
    assert_ne!(store.get(MODEL_KEY).await.unwrap().unwrap(), v1_bytes);

    let versions = engine.versions().await.unwrap();
    assert_eq!(versions.len(), 2);
    let current: Vec<&str> = versions
        .iter()
        .filter(|v| v.current)
        .map(|v| v.version.as_str())
        .collect();
    assert_eq!(current, vec![v2.version.as_str()]);

    let rolled = engine.rollback(&v1.version).await.unwrap();
    assert_eq!(rolled.promoted.as_ref().map(|p| p.version.clone()), Some(v1.version.clone()));
    assert_eq!(store.get(MODEL_KEY).await.unwrap(), Some(v1_bytes));
    assert_eq!(
        engine.current_model().await.unwrap().map(|p| p.version),
        Some(v1.version.clone())
    );
    assert!(!store.exists(LEASE_KEY).await.unwrap());

    // the restored model still evaluates against the current data
    let check = engine.check().await.unwrap();
    assert_eq!(check.report.as_ref().unwrap().model_version, Some(v1.version));
    assert_eq!(check.decision().map(|d| d.is_not_ready()), Some(false));
    assert!(matches!(
        check.decision(),
        Some(RetrainDecision::Pass) | Some(RetrainDecision::Fail)
    ));
}

#[tokio::test]
async fn test_rollback_to_unknown_version() {
    let store = seeded_store(&[(PROCESSED_KEY, iris_csv(10, 10).into_bytes())]).await;
    let engine = engine_over(store.clone());
    engine.train().await.unwrap();
    let before = store.get(MODEL_KEY).await.unwrap();

    let result = engine.rollback("19700101T000000Z-000000000000").await;
    assert_eq!(OutcomeClass::of(&result).exit_code(), 2);

    let err = result.unwrap_err();
    assert!(matches!(err.source.root(), PipelineError::NotFound(_)));
    assert_eq!(err.source.stage(), Some(Stage::Promote));
    assert_eq!(store.get(MODEL_KEY).await.unwrap(), before);
    assert!(!store.exists(LEASE_KEY).await.unwrap());
}

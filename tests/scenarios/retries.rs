//! Transient store failures

use crate::helpers::*;
use retrain::core::{PipelineError, RetrainDecision, Stage};
use retrain::store::{InMemoryStore, ObjectStore};
use retrain::trigger::OutcomeClass;
use std::sync::Arc;

async fn flaky(failures: usize) -> Arc<FlakyStore> {
    let inner = InMemoryStore::new();
    inner
        .put(PROCESSED_KEY, iris_csv(10, 10).into_bytes())
        .await
        .unwrap();
    Arc::new(FlakyStore::new(inner, failures))
}

#[tokio::test]
async fn test_transient_failures_are_retried() {
    let store = flaky(2).await;
    let outcome = engine_over(store.clone()).run(false).await.unwrap();

    assert!(outcome.retrained);
    assert_eq!(outcome.decision(), Some(RetrainDecision::Pass));
    assert!(store.inner().exists(MODEL_KEY).await.unwrap());
    assert!(store.calls() > 2);
}

#[tokio::test]
async fn test_exhausted_retries_surface_unavailable() {
    let store = flaky(usize::MAX).await;
    let result = engine_over(store.clone()).run(false).await;

    let class = OutcomeClass::of(&result);
    assert_eq!(class.exit_code(), 3);
    assert_eq!(class.http_status(), 503);

    let err = result.unwrap_err();
    assert!(matches!(err.source.root(), PipelineError::StoreUnavailable(_)));
    assert_eq!(err.source.stage(), Some(Stage::Ingest));
    // default policy: three attempts, then give up
    assert_eq!(store.calls(), 3);
    assert!(!store.inner().exists(MODEL_KEY).await.unwrap());
}

//! Stage deadlines

use crate::helpers::*;
use retrain::core::{PipelineError, Stage, StageState};
use retrain::store::{InMemoryStore, ObjectStore};
use retrain::trigger::OutcomeClass;
use std::sync::Arc;
use std::time::Duration;

async fn slow_store(entries: &[(&str, Vec<u8>)]) -> Arc<SlowStore> {
    let inner = InMemoryStore::new();
    for (key, bytes) in entries {
        inner.put(key, bytes.clone()).await.unwrap();
    }
    Arc::new(SlowStore::new(inner, Duration::from_secs(5)))
}

#[tokio::test]
async fn test_preprocess_deadline_publishes_nothing() {
    let store = slow_store(&[(RAW_KEY, iris_csv(10, 10).into_bytes())]).await;
    let engine = engine_over(store.clone())
        .with_stage_deadline(Stage::Preprocess, Duration::from_millis(50));

    let result = engine.run(false).await;
    let class = OutcomeClass::of(&result);
    assert_eq!(class.exit_code(), 3);
    assert_eq!(class.http_status(), 504);

    let err = result.unwrap_err();
    assert!(matches!(
        err.source,
        PipelineError::StageTimeout { stage: Stage::Preprocess, .. }
    ));
    assert!(matches!(err.state.stage(Stage::Preprocess), StageState::Failed { .. }));
    assert!(matches!(err.state.stage(Stage::Train), StageState::Pending));

    assert_eq!(store.inner().keys().await, vec![RAW_KEY.to_string()]);
}

#[tokio::test]
async fn test_promote_deadline_leaves_model_and_lease_untouched() {
    let store = slow_store(&[(PROCESSED_KEY, iris_csv(10, 10).into_bytes())]).await;
    let staging = tempfile::tempdir().unwrap();
    let engine = engine_over(store.clone())
        .with_stage_deadline(Stage::Promote, Duration::from_millis(50))
        .with_staging_root(staging.path());

    let result = engine.run(false).await;
    let err = result.unwrap_err();
    assert_eq!(err.source.stage(), Some(Stage::Promote));
    assert!(matches!(err.state.stage(Stage::Train), StageState::Completed { .. }));

    let keys = store.inner().keys().await;
    assert_eq!(keys, vec![PROCESSED_KEY.to_string()]);
    assert!(!store.exists(LEASE_KEY).await.unwrap());
    assert!(dir_is_empty(staging.path()));
}

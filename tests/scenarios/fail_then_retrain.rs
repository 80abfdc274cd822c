//! Scenario D: a failing model is replaced

use crate::helpers::*;
use retrain::core::{RetrainDecision, Stage, StageState};
use retrain::execution::{ProcessedManifest, RetrainEngine};
use retrain::stages::Shuffle;
use retrain::store::ObjectStore;
use retrain::trigger::{OutcomeClass, TriggerResponse};

#[tokio::test]
async fn test_failing_model_is_retrained_and_promoted() {
    let stale_model = model_bytes(&iris_csv(10, 0), 5);
    let store = seeded_store(&[
        (PROCESSED_KEY, iris_csv(80, 20).into_bytes()),
        (MODEL_KEY, stale_model.clone()),
    ])
    .await;
    let staging = tempfile::tempdir().unwrap();
    let log = EventLog::default();
    let engine = log
        .attach(engine_over(store.clone()))
        .with_staging_root(staging.path());

    let result = engine.run(false).await;
    let outcome = result.as_ref().unwrap();

    let initial = outcome.initial.as_ref().unwrap();
    assert_eq!(initial.decision, RetrainDecision::Fail);
    assert_eq!(initial.score, Some(0.8));

    assert!(outcome.retrained);
    let after = outcome.report.as_ref().unwrap();
    assert_eq!(after.decision, RetrainDecision::Pass);
    assert_eq!(after.score, Some(1.0));

    let pointer = outcome.promoted.as_ref().unwrap();
    assert_eq!(after.model_version.as_deref(), Some(pointer.version.as_str()));

    let canonical = store.get(MODEL_KEY).await.unwrap().unwrap();
    assert_ne!(canonical, stale_model);
    assert_eq!(store.get(&pointer.version_key).await.unwrap(), Some(canonical));

    let versions = engine.versions().await.unwrap();
    assert_eq!(versions.len(), 1);
    assert!(versions[0].current);

    assert!(dir_is_empty(staging.path()));
    assert!(!store.exists(LEASE_KEY).await.unwrap());
    assert_eq!(log.promotions(), 1);

    let body = TriggerResponse::from_result(&result);
    assert_eq!(body.decision, Some(RetrainDecision::Pass));
    assert!(body.retrained);
    assert_eq!(body.promoted_version.as_deref(), Some(pointer.version.as_str()));
    assert_eq!(OutcomeClass::of(&result).exit_code(), 0);
}

#[tokio::test]
async fn test_raw_changes_drive_reprocessing() {
    let store = seeded_store(&[(RAW_KEY, iris_csv(12, 12).into_bytes())]).await;
    let engine = engine_over(store.clone());

    let first = engine.run(false).await.unwrap();
    assert!(first.refreshed);
    assert!(first.retrained);
    let manifest = ProcessedManifest::load(engine.client(), &engine.config().keys)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(manifest.rows, 24);
    assert_eq!(manifest.columns.len(), 5);

    // same raw bytes: no reprocess, model still passes
    let second = engine.run(false).await.unwrap();
    assert!(!second.refreshed);
    assert!(!second.retrained);
    assert!(matches!(second.state.stage(Stage::Preprocess), StageState::Skipped { .. }));

    store
        .put(RAW_KEY, iris_csv(14, 14).into_bytes())
        .await
        .unwrap();
    let third = engine.run(false).await.unwrap();
    assert!(third.refreshed);
    let manifest = ProcessedManifest::load(engine.client(), &engine.config().keys)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(manifest.rows, 28);
}

#[tokio::test]
async fn test_seed_change_republishes_processed_data() {
    let store = seeded_store(&[(RAW_KEY, iris_csv(20, 20).into_bytes())]).await;
    let engine = engine_over(store.clone());
    assert!(engine.run(false).await.unwrap().refreshed);
    let before = store.get(PROCESSED_KEY).await.unwrap().unwrap();

    let mut config = test_config();
    config.preprocess.seed = 7;
    let reseeded = RetrainEngine::with_store(config, store.clone());
    let outcome = reseeded.run(false).await.unwrap();
    assert!(outcome.refreshed);
    assert!(matches!(outcome.state.stage(Stage::Preprocess), StageState::Completed { .. }));

    let manifest = ProcessedManifest::load(reseeded.client(), &reseeded.config().keys)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(manifest.shuffle, Shuffle::Seeded(7));
    assert_ne!(store.get(PROCESSED_KEY).await.unwrap().unwrap(), before);

    // same seed again: nothing to redo
    let again = reseeded.run(false).await.unwrap();
    assert!(!again.refreshed);
}

#[tokio::test]
async fn test_seeded_preprocess_is_reproducible() {
    let store = seeded_store(&[(RAW_KEY, iris_csv(20, 20).into_bytes())]).await;
    let engine = engine_over(store.clone());

    engine.preprocess().await.unwrap();
    let first = store.get(PROCESSED_KEY).await.unwrap().unwrap();
    engine.preprocess().await.unwrap();
    let second = store.get(PROCESSED_KEY).await.unwrap().unwrap();
    assert_eq!(first, second);

    let text = String::from_utf8(first).unwrap();
    let mut rows: Vec<&str> = text.lines().skip(1).collect();
    let raw = iris_csv(20, 20);
    let mut expected: Vec<&str> = raw.lines().skip(1).collect();
    rows.sort();
    expected.sort();
    assert_eq!(rows, expected);
    assert_eq!(text.lines().next(), Some(HEADER));
}

//! Promotion lease: one trainer at a time

use crate::helpers::*;
use chrono::{Duration, Utc};
use retrain::core::{PipelineError, RetrainDecision, Stage};
use retrain::core::config::RetryConfig;
use retrain::execution::{LeaseRecord, PromotionLease};
use retrain::store::{ArtifactClient, InMemoryStore, ObjectStore};
use retrain::trigger::OutcomeClass;
use std::sync::Arc;
use uuid::Uuid;

fn lease_bytes(expires_in: Duration) -> (Uuid, Vec<u8>) {
    let owner = Uuid::new_v4();
    let record = LeaseRecord {
        owner,
        acquired_at: Utc::now() - Duration::minutes(1),
        expires_at: Utc::now() + expires_in,
    };
    (owner, serde_json::to_vec(&record).unwrap())
}

#[tokio::test]
async fn test_live_lease_blocks_training() {
    let (owner, lease) = lease_bytes(Duration::minutes(10));
    let store = seeded_store(&[
        (PROCESSED_KEY, iris_csv(10, 10).into_bytes()),
        (LEASE_KEY, lease.clone()),
    ])
    .await;

    let result = engine_over(store.clone()).run(false).await;
    let class = OutcomeClass::of(&result);
    assert_eq!(class.exit_code(), 75);
    assert_eq!(class.http_status(), 423);

    let err = result.unwrap_err();
    assert_eq!(err.source.stage(), Some(Stage::Train));
    match err.source.root() {
        PipelineError::LockHeld { owner: holder, .. } => assert_eq!(*holder, owner),
        other => panic!("Expected LockHeld, got {:?}", other),
    }
    assert!(err.source.is_retryable());

    assert!(!store.exists(MODEL_KEY).await.unwrap());
    assert_eq!(store.get(LEASE_KEY).await.unwrap(), Some(lease));
}

#[tokio::test]
async fn test_check_ignores_lease() {
    let (_, lease) = lease_bytes(Duration::minutes(10));
    let store = seeded_store(&[
        (PROCESSED_KEY, iris_csv(10, 10).into_bytes()),
        (MODEL_KEY, model_bytes(&iris_csv(10, 10), 15)),
        (LEASE_KEY, lease),
    ])
    .await;

    let outcome = engine_over(store).check().await.unwrap();
    assert_eq!(outcome.decision(), Some(RetrainDecision::Pass));
}

#[tokio::test]
async fn test_expired_lease_is_broken() {
    let (_, lease) = lease_bytes(-Duration::minutes(5));
    let store = seeded_store(&[
        (PROCESSED_KEY, iris_csv(10, 10).into_bytes()),
        (LEASE_KEY, lease),
    ])
    .await;

    let outcome = engine_over(store.clone()).run(false).await.unwrap();
    assert!(outcome.retrained);
    assert!(store.exists(MODEL_KEY).await.unwrap());
    assert!(!store.exists(LEASE_KEY).await.unwrap());
}

#[tokio::test]
async fn test_racing_breakers_leave_one_holder() {
    let (_, stale) = lease_bytes(-Duration::minutes(5));
    let inner = InMemoryStore::new();
    inner.put(LEASE_KEY, stale).await.unwrap();
    let store = Arc::new(RacingLeaseStore::new(inner));
    let client = ArtifactClient::new(store.clone(), RetryConfig::default());
    let ttl = std::time::Duration::from_secs(60);

    let (a, b) = tokio::join!(
        PromotionLease::acquire(&client, LEASE_KEY, Uuid::new_v4(), ttl),
        PromotionLease::acquire(&client, LEASE_KEY, Uuid::new_v4(), ttl),
    );
    let (held, refused) = match (a, b) {
        (Ok(lease), Err(e)) | (Err(e), Ok(lease)) => (lease, e),
        other => panic!("Expected exactly one holder, got {:?}", other),
    };
    match refused.root() {
        PipelineError::LockHeld { owner, .. } => assert_eq!(*owner, held.owner()),
        other => panic!("Expected LockHeld, got {:?}", other),
    }

    let stored: LeaseRecord =
        serde_json::from_slice(&store.inner().get(LEASE_KEY).await.unwrap().unwrap()).unwrap();
    assert_eq!(stored.owner, held.owner());

    held.release().await.unwrap();
    assert!(!store.inner().exists(LEASE_KEY).await.unwrap());
}

#[tokio::test]
async fn test_lease_lost_during_training_blocks_promotion() {
    let (usurper, lease) = lease_bytes(Duration::minutes(10));
    let inner = InMemoryStore::new();
    inner
        .put(PROCESSED_KEY, iris_csv(10, 10).into_bytes())
        .await
        .unwrap();
    let store = Arc::new(TakeoverStore::new(inner, lease.clone()));
    let log = EventLog::default();

    let result = log.attach(engine_over(store.clone())).train().await;
    assert_eq!(OutcomeClass::of(&result).exit_code(), 75);

    let err = result.unwrap_err();
    assert_eq!(err.source.stage(), Some(Stage::Promote));
    match err.source.root() {
        PipelineError::LockHeld { owner, .. } => assert_eq!(*owner, usurper),
        other => panic!("Expected LockHeld, got {:?}", other),
    }

    assert_eq!(log.promotions(), 0);
    assert!(store.inner().list("models/").await.unwrap().is_empty());
    assert_eq!(store.inner().get(LEASE_KEY).await.unwrap(), Some(lease));
}

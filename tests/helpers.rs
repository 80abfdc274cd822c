//! Test utility functions for the retrain pipeline

#![allow(dead_code)]

use async_trait::async_trait;
use retrain::core::{Dataset, PipelineConfig, Table};
use retrain::execution::{ExecutionEvent, RetrainEngine};
use retrain::model::{ForestParams, ModelArtifact};
use retrain::store::{InMemoryStore, ObjectStore, StoreError};
use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::{Barrier, Semaphore};

pub const HEADER: &str = "sepal_length,sepal_width,petal_length,petal_width,species";

pub const RAW_KEY: &str = "data/iris.csv";
pub const PROCESSED_KEY: &str = "processed_data/iris_processed.csv";
pub const MODEL_KEY: &str = "models/model.json";
pub const POINTER_KEY: &str = "models/model.json.pointer";
pub const LEASE_KEY: &str = "locks/model.json.lease";

/// Features of a setosa-like flower; `i` varies the measurements slightly
pub fn setosa_features(i: usize) -> String {
    let d = (i % 10) as f64 * 0.05;
    format!("{:.2},{:.2},{:.2},0.20", 4.8 + d, 3.3 + d, 1.4 + d)
}

/// Features of a virginica-like flower, far from every setosa row
pub fn virginica_features(i: usize) -> String {
    let d = (i % 10) as f64 * 0.05;
    format!("{:.2},{:.2},{:.2},2.00", 6.4 + d, 2.5 + d, 5.5 + d)
}

/// CSV with `setosa` setosa rows followed by `virginica` virginica rows
pub fn iris_csv(setosa: usize, virginica: usize) -> String {
    let mut csv = format!("{}\n", HEADER);
    for i in 0..setosa {
        csv.push_str(&format!("{},setosa\n", setosa_features(i)));
    }
    for i in 0..virginica {
        csv.push_str(&format!("{},virginica\n", virginica_features(i)));
    }
    csv
}

/// Serialized model trained on `csv`
pub fn model_bytes(csv: &str, n_estimators: usize) -> Vec<u8> {
    let table = Table::from_csv(csv).unwrap();
    let dataset = Dataset::from_table(&table, "species").unwrap();
    let params = ForestParams {
        n_estimators,
        ..Default::default()
    };
    ModelArtifact::train(&dataset, params)
        .unwrap()
        .to_bytes()
        .unwrap()
}

/// Small, fast configuration for scenarios
pub fn test_config() -> PipelineConfig {
    let mut config = PipelineConfig::default();
    config.name = "iris-scenario".to_string();
    config.training.n_estimators = 15;
    config.retry.initial_backoff_ms = 1;
    config.retry.max_backoff_ms = 5;
    config
}

pub fn engine_over(store: Arc<dyn ObjectStore>) -> RetrainEngine {
    RetrainEngine::with_store(test_config(), store)
}

/// Store pre-populated with the given keys
pub async fn seeded_store(entries: &[(&str, Vec<u8>)]) -> Arc<InMemoryStore> {
    let store = Arc::new(InMemoryStore::new());
    for (key, bytes) in entries {
        store.put(key, bytes.clone()).await.unwrap();
    }
    store
}

/// Events collected by an engine handler
#[derive(Clone, Default)]
pub struct EventLog(Arc<Mutex<Vec<ExecutionEvent>>>);

impl EventLog {
    pub fn attach(&self, engine: RetrainEngine) -> RetrainEngine {
        let log = self.0.clone();
        engine.with_event_handler(move |event| log.lock().unwrap().push(event))
    }

    pub fn events(&self) -> Vec<ExecutionEvent> {
        self.0.lock().unwrap().clone()
    }

    pub fn promotions(&self) -> usize {
        self.events()
            .iter()
            .filter(|e| matches!(e, ExecutionEvent::ModelPromoted { .. }))
            .count()
    }
}

/// Whether a directory holds no entries
pub fn dir_is_empty(dir: &Path) -> bool {
    std::fs::read_dir(dir).unwrap().next().is_none()
}

/// Store whose next `failures` calls fail with a transient error
pub struct FlakyStore {
    inner: InMemoryStore,
    failures: AtomicUsize,
    calls: AtomicUsize,
}

impl FlakyStore {
    pub fn new(inner: InMemoryStore, failures: usize) -> Self {
        Self {
            inner,
            failures: AtomicUsize::new(failures),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn inner(&self) -> &InMemoryStore {
        &self.inner
    }

    /// Total calls seen, failed ones included
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn trip(&self) -> Result<(), StoreError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let tripped = self
            .failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if tripped {
            Err(StoreError::Unavailable("connection reset by peer".to_string()))
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl ObjectStore for FlakyStore {
    async fn exists(&self, key: &str) -> Result<bool, StoreError> {
        self.trip()?;
        self.inner.exists(key).await
    }

    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StoreError> {
        self.trip()?;
        self.inner.get(key).await
    }

    async fn put(&self, key: &str, bytes: Vec<u8>) -> Result<(), StoreError> {
        self.trip()?;
        self.inner.put(key, bytes).await
    }

    async fn put_if_absent(&self, key: &str, bytes: Vec<u8>) -> Result<bool, StoreError> {
        self.trip()?;
        self.inner.put_if_absent(key, bytes).await
    }

    async fn delete(&self, key: &str) -> Result<bool, StoreError> {
        self.trip()?;
        self.inner.delete(key).await
    }

    async fn delete_if_matches(&self, key: &str, expected: &[u8]) -> Result<bool, StoreError> {
        self.trip()?;
        self.inner.delete_if_matches(key, expected).await
    }

    async fn list(&self, prefix: &str) -> Result<Vec<String>, StoreError> {
        self.trip()?;
        self.inner.list(prefix).await
    }
}

/// Store that stalls every `put` before writing
pub struct SlowStore {
    inner: InMemoryStore,
    delay: Duration,
}

impl SlowStore {
    pub fn new(inner: InMemoryStore, delay: Duration) -> Self {
        Self { inner, delay }
    }

    pub fn inner(&self) -> &InMemoryStore {
        &self.inner
    }
}

#[async_trait]
impl ObjectStore for SlowStore {
    async fn exists(&self, key: &str) -> Result<bool, StoreError> {
        self.inner.exists(key).await
    }

    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StoreError> {
        self.inner.get(key).await
    }

    async fn put(&self, key: &str, bytes: Vec<u8>) -> Result<(), StoreError> {
        tokio::time::sleep(self.delay).await;
        self.inner.put(key, bytes).await
    }

    async fn put_if_absent(&self, key: &str, bytes: Vec<u8>) -> Result<bool, StoreError> {
        self.inner.put_if_absent(key, bytes).await
    }

    async fn delete(&self, key: &str) -> Result<bool, StoreError> {
        self.inner.delete(key).await
    }

    async fn delete_if_matches(&self, key: &str, expected: &[u8]) -> Result<bool, StoreError> {
        self.inner.delete_if_matches(key, expected).await
    }

    async fn list(&self, prefix: &str) -> Result<Vec<String>, StoreError> {
        self.inner.list(prefix).await
    }
}

/// Store whose writes to the model pointer fail while it is marked down
pub struct PointerOutageStore {
    inner: InMemoryStore,
    down: AtomicBool,
}

impl PointerOutageStore {
    pub fn new(inner: InMemoryStore) -> Self {
        Self {
            inner,
            down: AtomicBool::new(false),
        }
    }

    pub fn inner(&self) -> &InMemoryStore {
        &self.inner
    }

    pub fn set_down(&self, down: bool) {
        self.down.store(down, Ordering::SeqCst);
    }
}

#[async_trait]
impl ObjectStore for PointerOutageStore {
    async fn exists(&self, key: &str) -> Result<bool, StoreError> {
        self.inner.exists(key).await
    }

    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StoreError> {
        self.inner.get(key).await
    }

    async fn put(&self, key: &str, bytes: Vec<u8>) -> Result<(), StoreError> {
        if key == POINTER_KEY && self.down.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("pointer write refused".to_string()));
        }
        self.inner.put(key, bytes).await
    }

    async fn put_if_absent(&self, key: &str, bytes: Vec<u8>) -> Result<bool, StoreError> {
        self.inner.put_if_absent(key, bytes).await
    }

    async fn delete(&self, key: &str) -> Result<bool, StoreError> {
        self.inner.delete(key).await
    }

    async fn delete_if_matches(&self, key: &str, expected: &[u8]) -> Result<bool, StoreError> {
        self.inner.delete_if_matches(key, expected).await
    }

    async fn list(&self, prefix: &str) -> Result<Vec<String>, StoreError> {
        self.inner.list(prefix).await
    }
}

/// Store on which another run replaces the lease the first time training
/// reads the processed data
pub struct TakeoverStore {
    inner: InMemoryStore,
    usurper: Vec<u8>,
    armed: AtomicBool,
}

impl TakeoverStore {
    pub fn new(inner: InMemoryStore, usurper: Vec<u8>) -> Self {
        Self {
            inner,
            usurper,
            armed: AtomicBool::new(true),
        }
    }

    pub fn inner(&self) -> &InMemoryStore {
        &self.inner
    }
}

#[async_trait]
impl ObjectStore for TakeoverStore {
    async fn exists(&self, key: &str) -> Result<bool, StoreError> {
        self.inner.exists(key).await
    }

    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StoreError> {
        if key == PROCESSED_KEY
            && self.inner.exists(LEASE_KEY).await?
            && self.armed.swap(false, Ordering::SeqCst)
        {
            self.inner.put(LEASE_KEY, self.usurper.clone()).await?;
        }
        self.inner.get(key).await
    }

    async fn put(&self, key: &str, bytes: Vec<u8>) -> Result<(), StoreError> {
        self.inner.put(key, bytes).await
    }

    async fn put_if_absent(&self, key: &str, bytes: Vec<u8>) -> Result<bool, StoreError> {
        self.inner.put_if_absent(key, bytes).await
    }

    async fn delete(&self, key: &str) -> Result<bool, StoreError> {
        self.inner.delete(key).await
    }

    async fn delete_if_matches(&self, key: &str, expected: &[u8]) -> Result<bool, StoreError> {
        self.inner.delete_if_matches(key, expected).await
    }

    async fn list(&self, prefix: &str) -> Result<Vec<String>, StoreError> {
        self.inner.list(prefix).await
    }
}

/// Store that lines up two runs breaking the same expired lease
///
/// The first two lease reads meet at a barrier, so both runs see the same
/// record. The second removal of the lease key then waits until some run
/// has created a fresh lease.
pub struct RacingLeaseStore {
    inner: InMemoryStore,
    reads: Barrier,
    gated_reads: AtomicUsize,
    removals: AtomicUsize,
    created: Semaphore,
}

impl RacingLeaseStore {
    pub fn new(inner: InMemoryStore) -> Self {
        Self {
            inner,
            reads: Barrier::new(2),
            gated_reads: AtomicUsize::new(2),
            removals: AtomicUsize::new(0),
            created: Semaphore::new(0),
        }
    }

    pub fn inner(&self) -> &InMemoryStore {
        &self.inner
    }

    async fn hold_removal(&self, key: &str) {
        if key == LEASE_KEY && self.removals.fetch_add(1, Ordering::SeqCst) == 1 {
            self.created.acquire().await.expect("semaphore closed").forget();
        }
    }
}

#[async_trait]
impl ObjectStore for RacingLeaseStore {
    async fn exists(&self, key: &str) -> Result<bool, StoreError> {
        self.inner.exists(key).await
    }

    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StoreError> {
        let gated = key == LEASE_KEY
            && self
                .gated_reads
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
                .is_ok();
        let bytes = self.inner.get(key).await?;
        if gated {
            self.reads.wait().await;
        }
        Ok(bytes)
    }

    async fn put(&self, key: &str, bytes: Vec<u8>) -> Result<(), StoreError> {
        self.inner.put(key, bytes).await
    }

    async fn put_if_absent(&self, key: &str, bytes: Vec<u8>) -> Result<bool, StoreError> {
        let created = self.inner.put_if_absent(key, bytes).await?;
        if created && key == LEASE_KEY {
            self.created.add_permits(1);
        }
        Ok(created)
    }

    async fn delete(&self, key: &str) -> Result<bool, StoreError> {
        self.hold_removal(key).await;
        self.inner.delete(key).await
    }

    async fn delete_if_matches(&self, key: &str, expected: &[u8]) -> Result<bool, StoreError> {
        self.hold_removal(key).await;
        self.inner.delete_if_matches(key, expected).await
    }

    async fn list(&self, prefix: &str) -> Result<Vec<String>, StoreError> {
        self.inner.list(prefix).await
    }
}

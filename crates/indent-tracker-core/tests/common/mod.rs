//! Store wrappers shared by the integration tests.

#![allow(dead_code)]

use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use indent_tracker_core::store::{
    CollectionPath, CollectionSnapshot, DocPath, DocumentSnapshot, Record, RemoteStore,
    SqliteStore, StoreError, StoreResult, Subscription,
};

/// SQLite store that counts writes per kind.
#[derive(Clone)]
pub struct CountingStore {
    pub inner: SqliteStore,
    pub sets: Arc<AtomicUsize>,
    pub updates: Arc<AtomicUsize>,
    pub deletes: Arc<AtomicUsize>,
}

impl CountingStore {
    pub fn new() -> Self {
        Self {
            inner: SqliteStore::open_in_memory("test").unwrap(),
            sets: Arc::default(),
            updates: Arc::default(),
            deletes: Arc::default(),
        }
    }

    pub fn writes(&self) -> usize {
        self.sets.load(Ordering::SeqCst)
            + self.updates.load(Ordering::SeqCst)
            + self.deletes.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl RemoteStore for CountingStore {
    async fn create(&self, collection: &CollectionPath, record: Record) -> StoreResult<String> {
        self.sets.fetch_add(1, Ordering::SeqCst);
        self.inner.create(collection, record).await
    }

    async fn set(&self, doc: &DocPath, record: Record) -> StoreResult<()> {
        self.sets.fetch_add(1, Ordering::SeqCst);
        self.inner.set(doc, record).await
    }

    async fn update(&self, doc: &DocPath, fields: Record) -> StoreResult<()> {
        self.updates.fetch_add(1, Ordering::SeqCst);
        self.inner.update(doc, fields).await
    }

    async fn delete(&self, doc: &DocPath) -> StoreResult<()> {
        self.deletes.fetch_add(1, Ordering::SeqCst);
        self.inner.delete(doc).await
    }

    async fn subscribe_collection(
        &self,
        collection: &CollectionPath,
    ) -> StoreResult<Subscription<CollectionSnapshot>> {
        self.inner.subscribe_collection(collection).await
    }

    async fn subscribe_document(
        &self,
        doc: &DocPath,
    ) -> StoreResult<Subscription<DocumentSnapshot>> {
        self.inner.subscribe_document(doc).await
    }
}

/// SQLite store that fails deletes of chosen ids and can break
/// subscriptions on demand.
#[derive(Clone)]
pub struct FaultyStore {
    pub inner: SqliteStore,
    failing_deletes: Arc<Mutex<HashSet<String>>>,
    failing_subscriptions: Arc<AtomicUsize>,
}

impl FaultyStore {
    pub fn new() -> Self {
        Self {
            inner: SqliteStore::open_in_memory("test").unwrap(),
            failing_deletes: Arc::default(),
            failing_subscriptions: Arc::default(),
        }
    }

    pub fn fail_delete_of(&self, id: &str) {
        self.failing_deletes.lock().unwrap().insert(id.to_string());
    }

    /// The next `n` subscribe calls fail outright.
    pub fn fail_next_subscriptions(&self, n: usize) {
        self.failing_subscriptions.store(n, Ordering::SeqCst);
    }

    fn take_subscription_failure(&self) -> bool {
        self.failing_subscriptions
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
    }
}

#[async_trait]
impl RemoteStore for FaultyStore {
    async fn create(&self, collection: &CollectionPath, record: Record) -> StoreResult<String> {
        self.inner.create(collection, record).await
    }

    async fn set(&self, doc: &DocPath, record: Record) -> StoreResult<()> {
        self.inner.set(doc, record).await
    }

    async fn update(&self, doc: &DocPath, fields: Record) -> StoreResult<()> {
        self.inner.update(doc, fields).await
    }

    async fn delete(&self, doc: &DocPath) -> StoreResult<()> {
        let fail = self.failing_deletes.lock().unwrap().contains(doc.id());
        if fail {
            // Let the other deletes of a batch run first.
            tokio::time::sleep(Duration::from_millis(5)).await;
            return Err(StoreError::Unavailable(format!("delete of {doc} refused")));
        }
        self.inner.delete(doc).await
    }

    async fn subscribe_collection(
        &self,
        collection: &CollectionPath,
    ) -> StoreResult<Subscription<CollectionSnapshot>> {
        if self.take_subscription_failure() {
            return Err(StoreError::SubscriptionLost("listener rejected".into()));
        }
        self.inner.subscribe_collection(collection).await
    }

    async fn subscribe_document(
        &self,
        doc: &DocPath,
    ) -> StoreResult<Subscription<DocumentSnapshot>> {
        if self.take_subscription_failure() {
            return Err(StoreError::SubscriptionLost("listener rejected".into()));
        }
        self.inner.subscribe_document(doc).await
    }
}

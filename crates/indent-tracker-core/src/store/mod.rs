//! Remote store adapter: document collections with live subscriptions.
//!
//! The store is the single source of truth. Writes are acknowledged once
//! committed and are never retried here; every subscriber, including the
//! writer, learns about a committed write through its subscription.
//!
//! Conflict policy is last-write-wins per document: `set` replaces the whole
//! body, `update` shallow-merges top-level fields, and concurrent writers to
//! the same document silently overwrite each other.

mod schema;
mod sqlite;

pub use schema::*;
pub use sqlite::*;

use std::fmt;
use std::pin::Pin;
use std::task::{Context, Poll};

use async_trait::async_trait;
use futures_util::stream::{BoxStream, Stream, StreamExt};
use serde::Serialize;
use thiserror::Error;

/// A document body: a JSON object.
pub type Record = serde_json::Map<String, serde_json::Value>;

/// Store errors.
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Document not found: {0}")]
    NotFound(String),

    #[error("Subscription lost: {0}")]
    SubscriptionLost(String),

    #[error("Store unavailable: {0}")]
    Unavailable(String),

    #[error("Store lock poisoned")]
    LockPoisoned,
}

pub type StoreResult<T> = Result<T, StoreError>;

/// Serialize a value that must encode as a JSON object.
pub fn to_record<T: Serialize>(value: &T) -> Result<Record, serde_json::Error> {
    match serde_json::to_value(value)? {
        serde_json::Value::Object(map) => Ok(map),
        other => Err(<serde_json::Error as serde::ser::Error>::custom(format!(
            "expected a JSON object, got {other}"
        ))),
    }
}

// =========================================================================
// Paths
// =========================================================================

/// A named collection, e.g. `indents`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CollectionPath(String);

impl CollectionPath {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Path of a document inside this collection.
    pub fn doc(&self, id: impl Into<String>) -> DocPath {
        DocPath {
            collection: self.clone(),
            id: id.into(),
        }
    }
}

impl fmt::Display for CollectionPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A single document, e.g. `config/units`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DocPath {
    collection: CollectionPath,
    id: String,
}

impl DocPath {
    pub fn new(collection: impl Into<String>, id: impl Into<String>) -> Self {
        CollectionPath::new(collection).doc(id)
    }

    pub fn collection(&self) -> &CollectionPath {
        &self.collection
    }

    pub fn id(&self) -> &str {
        &self.id
    }
}

impl fmt::Display for DocPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.collection, self.id)
    }
}

// =========================================================================
// Snapshots
// =========================================================================

/// One document inside a collection snapshot.
#[derive(Debug, Clone, PartialEq)]
pub struct StoredDocument {
    pub id: String,
    pub data: Record,
}

/// Full state of a collection at one committed point.
#[derive(Debug, Clone, PartialEq)]
pub struct CollectionSnapshot {
    pub collection: CollectionPath,
    pub documents: Vec<StoredDocument>,
}

/// Full state of one document; `data` is `None` while the document is absent.
#[derive(Debug, Clone, PartialEq)]
pub struct DocumentSnapshot {
    pub path: DocPath,
    pub data: Option<Record>,
}

impl DocumentSnapshot {
    pub fn exists(&self) -> bool {
        self.data.is_some()
    }
}

// =========================================================================
// Subscription
// =========================================================================

/// Live sequence of snapshots for one path.
///
/// Yields the current state first, then one snapshot per committed change,
/// in commit order. If the feed itself fails it yields a single error and
/// ends; recovering means subscribing again. Dropping the subscription (or
/// calling [`Subscription::unsubscribe`]) stops delivery immediately and
/// leaves in-flight writes alone.
pub struct Subscription<T> {
    inner: BoxStream<'static, StoreResult<T>>,
}

impl<T> Subscription<T> {
    pub fn new(stream: impl Stream<Item = StoreResult<T>> + Send + 'static) -> Self {
        Self {
            inner: stream.boxed(),
        }
    }

    pub fn unsubscribe(self) {}

    /// Transform each delivered item, keeping delivery order.
    pub fn map<U, F>(self, mut f: F) -> Subscription<U>
    where
        F: FnMut(StoreResult<T>) -> StoreResult<U> + Send + 'static,
        T: 'static,
        U: 'static,
    {
        Subscription::new(self.inner.map(move |item| f(item)))
    }
}

impl<T> Stream for Subscription<T> {
    type Item = StoreResult<T>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.inner.poll_next_unpin(cx)
    }
}

// =========================================================================
// Adapter contract
// =========================================================================

/// Document-oriented store with live subscriptions.
///
/// Implementations must be object-safe and `Send + Sync` so one store can
/// back every repository and config document of a client.
#[async_trait]
pub trait RemoteStore: Send + Sync {
    /// Add a document with a store-assigned id; returns the id.
    async fn create(&self, collection: &CollectionPath, record: Record) -> StoreResult<String>;

    /// Replace the whole document, creating it if absent.
    async fn set(&self, doc: &DocPath, record: Record) -> StoreResult<()>;

    /// Merge top-level fields into an existing document.
    ///
    /// Fails with [`StoreError::NotFound`] when the document is absent.
    async fn update(&self, doc: &DocPath, fields: Record) -> StoreResult<()>;

    /// Delete a document. Deleting an absent document succeeds.
    async fn delete(&self, doc: &DocPath) -> StoreResult<()>;

    async fn subscribe_collection(
        &self,
        collection: &CollectionPath,
    ) -> StoreResult<Subscription<CollectionSnapshot>>;

    async fn subscribe_document(&self, doc: &DocPath)
        -> StoreResult<Subscription<DocumentSnapshot>>;
}

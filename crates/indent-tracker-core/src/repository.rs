//! Indent repository: writes and subscription over `indents/{id}`.
//!
//! Writes return once the store acknowledges them. Nothing is echoed
//! locally; the next subscription snapshot is the canonical state.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use futures_util::future::join_all;
use thiserror::Error;

use crate::models::{Indent, IndentPatch, NewIndent};
use crate::store::{CollectionPath, RemoteStore, StoreError, Subscription};

/// Collection holding every indent.
pub const INDENTS: &str = "indents";

/// Repository errors.
#[derive(Error, Debug)]
pub enum RepositoryError {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("Invalid indent document: {0}")]
    Encode(#[from] serde_json::Error),

    /// Some deletes of a batch failed; the rest were committed.
    #[error("Batch delete incomplete: {deleted} deleted, {} failed", .failed.len())]
    PartialBatch {
        deleted: usize,
        failed: Vec<(String, StoreError)>,
    },
}

pub type RepositoryResult<T> = Result<T, RepositoryError>;

/// CRUD and live view over the indent collection.
#[derive(Clone)]
pub struct IndentRepository {
    store: Arc<dyn RemoteStore>,
    collection: CollectionPath,
}

impl IndentRepository {
    pub fn new(store: Arc<dyn RemoteStore>) -> Self {
        Self {
            store,
            collection: CollectionPath::new(INDENTS),
        }
    }

    /// Submit a new indent as `PENDING`; returns the store-assigned id.
    pub async fn add(&self, indent: NewIndent, now: DateTime<Utc>) -> RepositoryResult<String> {
        let record = indent.into_document(now)?;
        let id = self
            .store
            .create(&self.collection, record)
            .await
            .inspect_err(|e| tracing::warn!(error = %e, "indent create failed"))?;
        tracing::debug!(%id, "indent created");
        Ok(id)
    }

    /// Send a partial update. Only the fields set in `patch` are written.
    pub async fn apply_update(&self, id: &str, patch: &IndentPatch) -> RepositoryResult<()> {
        let fields = patch.to_fields()?;
        self.store
            .update(&self.collection.doc(id), fields)
            .await
            .inspect_err(|e| tracing::warn!(%id, error = %e, "indent update failed"))?;
        Ok(())
    }

    pub async fn remove(&self, id: &str) -> RepositoryResult<()> {
        self.store
            .delete(&self.collection.doc(id))
            .await
            .inspect_err(|e| tracing::warn!(%id, error = %e, "indent delete failed"))?;
        Ok(())
    }

    /// Delete every id concurrently and wait for all of them.
    ///
    /// Not atomic: on failure the successful deletes stay committed and the
    /// error lists the ids that were not deleted. Returns the number deleted.
    pub async fn remove_many<I, S>(&self, ids: I) -> RepositoryResult<usize>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let ids: Vec<String> = ids.into_iter().map(Into::into).collect();
        let deletes = ids.iter().map(|id| {
            let doc = self.collection.doc(id.as_str());
            async move { self.store.delete(&doc).await }
        });
        let results = join_all(deletes).await;

        let mut deleted = 0;
        let mut failed = Vec::new();
        for (id, result) in ids.into_iter().zip(results) {
            match result {
                Ok(()) => deleted += 1,
                Err(e) => failed.push((id, e)),
            }
        }

        if failed.is_empty() {
            tracing::debug!(deleted, "batch delete complete");
            Ok(deleted)
        } else {
            tracing::warn!(deleted, failed = failed.len(), "batch delete incomplete");
            Err(RepositoryError::PartialBatch { deleted, failed })
        }
    }

    /// Live sequence of the whole collection, decoded.
    ///
    /// Documents that do not decode as an indent are skipped with a warning.
    pub async fn subscribe_all(&self) -> RepositoryResult<Subscription<Vec<Indent>>> {
        let sub = self.store.subscribe_collection(&self.collection).await?;
        Ok(sub.map(|snapshot| {
            let snapshot = snapshot?;
            let indents = snapshot
                .documents
                .iter()
                .filter_map(|doc| match Indent::from_document(&doc.id, &doc.data) {
                    Ok(indent) => Some(indent),
                    Err(e) => {
                        tracing::warn!(id = %doc.id, error = %e, "skipping malformed indent");
                        None
                    }
                })
                .collect();
            Ok(indents)
        }))
    }
}

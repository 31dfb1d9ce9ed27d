//! Singleton configuration documents under `config/`.
//!
//! Each document is initialized with its built-in value the first time a
//! subscriber finds it absent. Saves replace the whole document and race
//! with other clients' saves; the last committed write wins.

use std::marker::PhantomData;
use std::sync::Arc;

use futures_util::{stream, StreamExt};
use serde::de::DeserializeOwned;
use serde::Serialize;
use thiserror::Error;

use crate::models::{AppInfo, UnitConfig, ValidationError};
use crate::store::{
    to_record, DocPath, DocumentSnapshot, RemoteStore, StoreError, StoreResult, Subscription,
};

/// Collection holding the singleton documents.
pub const CONFIG: &str = "config";

/// Config store errors.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("Invalid config document: {0}")]
    Encode(#[from] serde_json::Error),

    #[error(transparent)]
    Invalid(#[from] ValidationError),
}

pub type ConfigResult<T> = Result<T, ConfigError>;

/// A value stored as one document under `config/`.
pub trait ConfigDocument:
    Serialize + DeserializeOwned + Clone + PartialEq + Send + Sync + 'static
{
    /// Document id inside `config/`.
    const DOC_ID: &'static str;

    /// Value written when the document is absent.
    fn builtin() -> Self;
}

impl ConfigDocument for UnitConfig {
    const DOC_ID: &'static str = "units";

    fn builtin() -> Self {
        UnitConfig::builtin()
    }
}

impl ConfigDocument for AppInfo {
    const DOC_ID: &'static str = "appInfo";

    fn builtin() -> Self {
        AppInfo::builtin()
    }
}

/// Manager for one singleton config document.
pub struct SingletonDocument<T> {
    store: Arc<dyn RemoteStore>,
    path: DocPath,
    _value: PhantomData<fn() -> T>,
}

pub type UnitsDocument = SingletonDocument<UnitConfig>;
pub type AppInfoDocument = SingletonDocument<AppInfo>;

impl<T> Clone for SingletonDocument<T> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            path: self.path.clone(),
            _value: PhantomData,
        }
    }
}

impl<T: ConfigDocument> SingletonDocument<T> {
    pub fn new(store: Arc<dyn RemoteStore>) -> Self {
        Self {
            store,
            path: DocPath::new(CONFIG, T::DOC_ID),
            _value: PhantomData,
        }
    }

    pub fn path(&self) -> &DocPath {
        &self.path
    }

    /// Overwrite the whole document.
    pub async fn save(&self, value: &T) -> ConfigResult<()> {
        let record = to_record(value)?;
        self.store
            .set(&self.path, record)
            .await
            .inspect_err(|e| tracing::warn!(path = %self.path, error = %e, "config save failed"))?;
        tracing::debug!(path = %self.path, "config saved");
        Ok(())
    }

    /// Live value of the document.
    ///
    /// An absent document is written with [`ConfigDocument::builtin`] and the
    /// default is reported once; its echo is not delivered again. Stored
    /// values are reported as-is. A failed feed, initialization write, or
    /// decode yields one error and ends the stream.
    pub async fn subscribe(&self) -> StoreResult<Subscription<T>> {
        let snapshots = self.store.subscribe_document(&self.path).await?;
        let feed = Feed {
            store: Arc::clone(&self.store),
            path: self.path.clone(),
            snapshots,
            last: None,
        };

        Ok(Subscription::new(stream::unfold(Some(feed), |state| async move {
            let mut feed = state?;
            match feed.next_value().await? {
                Ok(value) => Some((Ok(value), Some(feed))),
                Err(err) => {
                    tracing::error!(path = %feed.path, error = %err, "config feed lost");
                    Some((Err(err), None))
                }
            }
        })))
    }
}

struct Feed<T> {
    store: Arc<dyn RemoteStore>,
    path: DocPath,
    snapshots: Subscription<DocumentSnapshot>,
    last: Option<T>,
}

impl<T: ConfigDocument> Feed<T> {
    /// Next distinct value, `None` once the underlying feed has ended.
    async fn next_value(&mut self) -> Option<StoreResult<T>> {
        loop {
            let snapshot = match self.snapshots.next().await? {
                Ok(snapshot) => snapshot,
                Err(e) => return Some(Err(e)),
            };

            let value = match snapshot.data {
                None => match initialize::<T>(&self.store, &self.path).await {
                    Ok(value) => value,
                    Err(e) => return Some(Err(e)),
                },
                Some(data) => match serde_json::from_value(serde_json::Value::Object(data)) {
                    Ok(value) => value,
                    Err(e) => return Some(Err(e.into())),
                },
            };

            if self.last.as_ref() == Some(&value) {
                continue;
            }
            self.last = Some(value.clone());
            return Some(Ok(value));
        }
    }
}

/// Write the built-in value to an absent document.
async fn initialize<T: ConfigDocument>(
    store: &Arc<dyn RemoteStore>,
    path: &DocPath,
) -> StoreResult<T> {
    let value = T::builtin();
    store
        .set(path, to_record(&value)?)
        .await
        .inspect_err(|e| tracing::warn!(%path, error = %e, "config init failed"))?;
    tracing::info!(%path, "config document initialized with defaults");
    Ok(value)
}

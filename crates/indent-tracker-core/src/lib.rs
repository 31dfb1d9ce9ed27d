//! Indent Tracker Core Library
//!
//! Real-time pharmacy indent tracking shared by many client devices.
//!
//! # Architecture
//!
//! ```text
//!                 ┌──────────────────────────────┐
//!                 │  RemoteStore (SQLite + log)  │
//!                 └──────┬───────────────▲───────┘
//!          snapshots     │               │   create / set / update / delete
//!            ┌───────────┼───────────┐   │
//!            ▼           ▼           ▼   │
//!        indents    config/units  config/appInfo
//!            │           │           │   │
//!            └───────────┼───────────┘   │
//!                        ▼               │
//!                  TrackerSession ───────┘
//!                  (watch replica)
//!                        │
//!          ┌─────────────┼─────────────┐
//!          ▼             ▼             ▼
//!      Projection    Lifecycle     Workload
//!      (list view)   (transitions) (assist input)
//! ```
//!
//! # Core Principle
//!
//! **The store is the only source of truth.** Clients never apply their own
//! writes locally; every change, including a client's own, arrives through
//! its subscriptions. Concurrent writes to one document are last-write-wins.
//!
//! # Modules
//!
//! - [`store`]: Document store contract and the SQLite backend
//! - [`models`]: Domain types (Indent, UnitConfig, AppInfo)
//! - [`repository`]: Indent collection writes and subscription
//! - [`lifecycle`]: Status transition rules
//! - [`config_store`]: Singleton config documents
//! - [`projection`]: Filtered and sorted list view
//! - [`session`]: Per-client synchronized replica

pub mod config_store;
pub mod lifecycle;
pub mod models;
pub mod projection;
pub mod repository;
pub mod session;
pub mod store;

// Re-export commonly used types
pub use config_store::{AppInfoDocument, ConfigDocument, ConfigError, UnitsDocument};
pub use lifecycle::{plan_transition, LifecycleEvent, TransitionError};
pub use models::{
    AppInfo, Indent, IndentPatch, IndentStatus, NewIndent, UnitConfig, ValidationError,
};
pub use projection::{UnitFilter, ViewQuery};
pub use repository::{IndentRepository, RepositoryError};
pub use session::{Feed, FeedHealth, TrackerError, TrackerSession, TrackerState};
pub use store::{RemoteStore, SqliteStore, StoreConfig, StoreError};

// UniFFI setup - using proc macros
uniffi::setup_scaffolding!();

use std::sync::Arc;

use tokio::runtime::Runtime;

// =========================================================================
// FFI Error Type
// =========================================================================

#[derive(Debug, thiserror::Error, uniffi::Error)]
pub enum IndentTrackerError {
    #[error("Store error: {0}")]
    StoreError(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Transition rejected: {0}")]
    TransitionRejected(String),

    #[error("Batch incomplete: {0}")]
    PartialBatch(String),

    #[error("Sync error: {0}")]
    SyncError(String),

    #[error("Runtime error: {0}")]
    RuntimeError(String),
}

impl From<TrackerError> for IndentTrackerError {
    fn from(e: TrackerError) -> Self {
        let message = e.to_string();
        match e {
            TrackerError::Validation(_) => IndentTrackerError::InvalidInput(message),
            TrackerError::Transition(_) | TrackerError::NotReady { .. } => {
                IndentTrackerError::TransitionRejected(message)
            }
            TrackerError::Repository(RepositoryError::PartialBatch { .. }) => {
                IndentTrackerError::PartialBatch(message)
            }
            TrackerError::Config(ConfigError::Invalid(_)) => {
                IndentTrackerError::InvalidInput(message)
            }
            TrackerError::FeedFailed { .. } | TrackerError::Closed => {
                IndentTrackerError::SyncError(message)
            }
            TrackerError::Repository(_) | TrackerError::Config(_) | TrackerError::Store(_) => {
                IndentTrackerError::StoreError(message)
            }
        }
    }
}

impl From<StoreError> for IndentTrackerError {
    fn from(e: StoreError) -> Self {
        IndentTrackerError::StoreError(e.to_string())
    }
}

impl From<std::io::Error> for IndentTrackerError {
    fn from(e: std::io::Error) -> Self {
        IndentTrackerError::RuntimeError(e.to_string())
    }
}

// =========================================================================
// Factory Functions (exported to FFI)
// =========================================================================

/// Open or create a tracker database at the given path.
#[uniffi::export]
pub fn open_tracker(
    path: String,
    namespace: String,
) -> Result<Arc<IndentTrackerCore>, IndentTrackerError> {
    let store = SqliteStore::open(&StoreConfig::at_path(path, namespace))?;
    IndentTrackerCore::start(store)
}

/// Create an in-memory tracker (for testing).
#[uniffi::export]
pub fn open_tracker_in_memory(
    namespace: String,
) -> Result<Arc<IndentTrackerCore>, IndentTrackerError> {
    let store = SqliteStore::open_in_memory(&namespace)?;
    IndentTrackerCore::start(store)
}

// =========================================================================
// Main API Object
// =========================================================================

/// Blocking tracker handle for FFI, backed by its own Tokio runtime.
#[derive(uniffi::Object)]
pub struct IndentTrackerCore {
    // Declared first so feed tasks are aborted before the runtime shuts down.
    session: TrackerSession,
    runtime: Runtime,
}

impl IndentTrackerCore {
    fn start(store: SqliteStore) -> Result<Arc<Self>, IndentTrackerError> {
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(2)
            .enable_all()
            .build()?;
        let session = {
            let _guard = runtime.enter();
            TrackerSession::start(Arc::new(store))
        };
        runtime.block_on(session.ready())?;
        Ok(Arc::new(Self { session, runtime }))
    }
}

#[uniffi::export]
impl IndentTrackerCore {
    // =========================================================================
    // Indent Operations
    // =========================================================================

    /// Filtered, sorted indents. `unit` of `None` shows every unit.
    pub fn list_indents(&self, unit: Option<String>, search: String) -> Vec<FfiIndent> {
        let mut query = ViewQuery::all().search(search);
        if let Some(unit) = unit {
            query = query.unit(unit);
        }
        self.session
            .view(&query)
            .into_iter()
            .map(|i| i.into())
            .collect()
    }

    /// Get an indent by ID from the local replica.
    pub fn get_indent(&self, id: String) -> Option<FfiIndent> {
        self.session.indent(&id).map(|i| i.into())
    }

    /// The DONE indent whose ready notification may be drafted.
    pub fn ready_for_notification(&self, id: String) -> Result<FfiIndent, IndentTrackerError> {
        Ok(self.session.ready_for_notification(&id)?.into())
    }

    /// Submit a new indent; returns its ID.
    pub fn add_indent(
        &self,
        unit: String,
        ward: String,
        staff: String,
        category: String,
    ) -> Result<String, IndentTrackerError> {
        Ok(self
            .runtime
            .block_on(self.session.add_indent(&unit, &ward, &staff, &category))?)
    }

    pub fn mark_ready(&self, id: String) -> Result<(), IndentTrackerError> {
        Ok(self.runtime.block_on(self.session.mark_ready(&id))?)
    }

    pub fn confirm_pickup(&self, id: String, collector: String) -> Result<(), IndentTrackerError> {
        Ok(self
            .runtime
            .block_on(self.session.confirm_pickup(&id, &collector))?)
    }

    pub fn annotate(&self, id: String, note: String) -> Result<(), IndentTrackerError> {
        Ok(self.runtime.block_on(self.session.annotate(&id, &note))?)
    }

    pub fn remove_indent(&self, id: String) -> Result<(), IndentTrackerError> {
        Ok(self.runtime.block_on(self.session.remove_indent(&id))?)
    }

    /// Delete every collected indent; returns how many were deleted.
    pub fn clear_collected(&self) -> Result<u32, IndentTrackerError> {
        let deleted = self.runtime.block_on(self.session.clear_collected())?;
        Ok(deleted as u32)
    }

    pub fn clear_all(&self) -> Result<u32, IndentTrackerError> {
        let deleted = self.runtime.block_on(self.session.clear_all())?;
        Ok(deleted as u32)
    }

    // =========================================================================
    // Config Operations
    // =========================================================================

    pub fn units(&self) -> Vec<FfiUnit> {
        self.session
            .units()
            .iter()
            .map(|(name, categories)| FfiUnit {
                name: name.to_string(),
                categories: categories.to_vec(),
            })
            .collect()
    }

    /// Add or replace a unit; categories are comma-separated.
    pub fn add_unit(&self, name: String, categories: String) -> Result<(), IndentTrackerError> {
        Ok(self
            .runtime
            .block_on(self.session.add_unit(&name, &categories))?)
    }

    pub fn remove_unit(&self, name: String) -> Result<(), IndentTrackerError> {
        Ok(self.runtime.block_on(self.session.remove_unit(&name))?)
    }

    /// Display name, falling back to the default when none is stored.
    pub fn app_name(&self) -> String {
        self.session.app_info().display_name().to_string()
    }

    pub fn save_app_name(&self, name: String) -> Result<(), IndentTrackerError> {
        Ok(self.runtime.block_on(self.session.save_app_name(&name))?)
    }

    pub fn workload_by_unit(&self) -> Vec<FfiUnitWorkload> {
        self.session
            .workload_by_unit()
            .into_iter()
            .map(|(unit, count)| FfiUnitWorkload {
                unit,
                count: count as u32,
            })
            .collect()
    }

    // =========================================================================
    // Sync Operations
    // =========================================================================

    /// Feeds currently failed, as `feed: reason`.
    pub fn failed_feeds(&self) -> Vec<String> {
        Feed::ALL
            .into_iter()
            .filter_map(|feed| match self.session.feed_health(feed) {
                FeedHealth::Failed(reason) => Some(format!("{feed}: {reason}")),
                _ => None,
            })
            .collect()
    }

    /// Restart failed feeds; returns how many were restarted.
    pub fn resubscribe(&self) -> u32 {
        let _guard = self.runtime.enter();
        self.session.resubscribe().len() as u32
    }
}

// =========================================================================
// FFI Types
// =========================================================================

/// FFI-safe indent. Timestamps are RFC 3339.
#[derive(Debug, Clone, uniffi::Record)]
pub struct FfiIndent {
    pub id: String,
    pub unit: String,
    pub ward: String,
    pub staff: String,
    pub category: String,
    pub status: String,
    pub created_at: String,
    pub done_at: Option<String>,
    pub collected_at: Option<String>,
    pub collected_by: Option<String>,
    pub note: String,
}

impl From<Indent> for FfiIndent {
    fn from(indent: Indent) -> Self {
        Self {
            id: indent.id,
            unit: indent.unit,
            ward: indent.ward,
            staff: indent.staff,
            category: indent.category,
            status: indent.status.as_str().to_string(),
            created_at: indent.created_at.to_rfc3339(),
            done_at: indent.done_at.map(|t| t.to_rfc3339()),
            collected_at: indent.collected_at.map(|t| t.to_rfc3339()),
            collected_by: indent.collected_by,
            note: indent.note,
        }
    }
}

/// FFI-safe unit with its categories.
#[derive(Debug, Clone, uniffi::Record)]
pub struct FfiUnit {
    pub name: String,
    pub categories: Vec<String>,
}

/// FFI-safe per-unit indent count.
#[derive(Debug, Clone, uniffi::Record)]
pub struct FfiUnitWorkload {
    pub unit: String,
    pub count: u32,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ffi_round_trip_through_blocking_api() {
        let core = open_tracker_in_memory("ffi".to_string()).unwrap();
        assert_eq!(core.app_name(), models::DEFAULT_APP_NAME);
        assert_eq!(core.units().len(), 5);

        let id = core
            .add_indent(
                "Farmasi Satelit 1".into(),
                "4a".into(),
                "".into(),
                "Floor Stock".into(),
            )
            .unwrap();

        let mut found = None;
        for _ in 0..200 {
            found = core.get_indent(id.clone());
            if found.is_some() {
                break;
            }
            std::thread::sleep(std::time::Duration::from_millis(10));
        }
        let indent = found.expect("indent replicated");
        assert_eq!(indent.ward, "4A");
        assert_eq!(indent.status, "PENDING");
        assert!(core.failed_feeds().is_empty());
    }

    #[test]
    fn test_ffi_error_mapping() {
        let core = open_tracker_in_memory("ffi".to_string()).unwrap();
        let err = core
            .add_indent("Farmasi Luar".into(), "4A".into(), "".into(), "IV Drip".into())
            .unwrap_err();
        assert!(matches!(err, IndentTrackerError::InvalidInput(_)));

        let err = core.mark_ready("missing".into()).unwrap_err();
        assert!(matches!(err, IndentTrackerError::TransitionRejected(_)));

        let id = core
            .add_indent("Farmasi Satelit 1".into(), "4A".into(), "".into(), "Floor Stock".into())
            .unwrap();
        for _ in 0..200 {
            if core.get_indent(id.clone()).is_some() {
                break;
            }
            std::thread::sleep(std::time::Duration::from_millis(10));
        }
        let err = core.ready_for_notification(id).unwrap_err();
        assert!(matches!(err, IndentTrackerError::TransitionRejected(_)));
    }
}

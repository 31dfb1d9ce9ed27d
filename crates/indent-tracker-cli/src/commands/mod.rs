//! Command handler modules for indent-tracker.
//!
//! Shared utilities used by multiple command paths live here.
//! Command-specific logic lives in the submodules.

pub mod assist;
pub mod config;
pub mod indents;

use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::{DateTime, Local, Utc};
use indent_tracker_core::{Indent, SqliteStore, TrackerSession};

use crate::settings::Settings;

// ---------------------------------------------------------------------------
// Session
// ---------------------------------------------------------------------------

/// Open the configured store and wait for the first snapshot of every feed.
pub async fn open_session(settings: &Settings) -> Result<TrackerSession> {
    let store = SqliteStore::open(&settings.store_config())
        .with_context(|| format!("open store failed: {}", settings.db_path.display()))?;
    tracing::debug!(
        db = %settings.db_path.display(),
        namespace = store.namespace(),
        "store opened"
    );
    let session = TrackerSession::start(Arc::new(store));
    session.ready().await.context("initial sync failed")?;
    Ok(session)
}

/// Look up an indent in the replica or fail with a readable message.
pub fn require_indent(session: &TrackerSession, id: &str) -> Result<Indent> {
    session
        .indent(id)
        .with_context(|| format!("no indent with id '{id}'"))
}

// ---------------------------------------------------------------------------
// Rendering
// ---------------------------------------------------------------------------

/// `dd/mm | HH:MM` in local time.
pub fn format_time(at: DateTime<Utc>) -> String {
    at.with_timezone(&Local).format("%d/%m | %H:%M").to_string()
}

/// One indent per line.
pub fn render_indent(indent: &Indent) -> String {
    let mut line = format!(
        "{}  {:<9}  WAD {:<6}  {} / {}  staff={}  created={}",
        indent.id,
        indent.status.as_str(),
        indent.ward,
        indent.unit,
        indent.category,
        indent.staff,
        format_time(indent.created_at),
    );
    if let Some(done_at) = indent.done_at {
        line.push_str(&format!("  ready={}", format_time(done_at)));
    }
    if let Some(collected_at) = indent.collected_at {
        line.push_str(&format!("  collected={}", format_time(collected_at)));
    }
    if let Some(by) = &indent.collected_by {
        line.push_str(&format!("  by={by}"));
    }
    if !indent.note.is_empty() {
        line.push_str(&format!("  note={}", indent.note));
    }
    line
}

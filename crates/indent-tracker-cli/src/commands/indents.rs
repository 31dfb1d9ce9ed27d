//! Indent command handlers.
//!
//! Covers add, list, watch, ready, collect, note, remove, clear-collected
//! and clear-all.

use std::time::Duration;

use anyhow::{Context, Result};
use indent_tracker_core::{FeedHealth, TrackerSession, TrackerState, ViewQuery};

use super::{render_indent, require_indent};

/// Delay before a failed feed is resubscribed while watching.
const RESUBSCRIBE_AFTER: Duration = Duration::from_secs(5);

pub fn view_query(unit: Option<String>, search: Option<String>) -> ViewQuery {
    let mut query = ViewQuery::all();
    if let Some(unit) = unit {
        query = query.unit(unit);
    }
    if let Some(search) = search {
        query = query.search(search);
    }
    query
}

// ---------------------------------------------------------------------------
// add
// ---------------------------------------------------------------------------

/// Submit an indent. Unit and category default to the first configured ones.
pub async fn add(
    session: &TrackerSession,
    unit: Option<String>,
    ward: String,
    staff: Option<String>,
    category: Option<String>,
) -> Result<()> {
    let units = session.units();
    let unit = match unit {
        Some(unit) => unit,
        None => units
            .first_unit()
            .context("no units configured")?
            .to_string(),
    };
    let category = match category {
        Some(category) => category,
        None => units
            .categories(&unit)
            .and_then(|c| c.first())
            .cloned()
            .with_context(|| format!("unit '{unit}' has no categories; pass --category"))?,
    };

    let id = session
        .add_indent(&unit, &ward, staff.as_deref().unwrap_or(""), &category)
        .await?;
    println!("indent_id={id}");
    Ok(())
}

// ---------------------------------------------------------------------------
// list / watch
// ---------------------------------------------------------------------------

pub fn list(session: &TrackerSession, query: &ViewQuery) -> Result<()> {
    print_board(&session.snapshot(), query);
    Ok(())
}

/// Reprint the board on every change until interrupted.
pub async fn watch(session: &TrackerSession, query: &ViewQuery) -> Result<()> {
    let mut changes = session.changes();
    print_board(&changes.borrow_and_update(), query);

    let mut retry = tokio::time::interval(RESUBSCRIBE_AFTER);
    retry.tick().await;

    loop {
        tokio::select! {
            changed = changes.changed() => {
                changed.context("session closed")?;
                let state = changes.borrow_and_update().clone();
                println!();
                print_board(&state, query);
            }
            _ = retry.tick() => {
                let restarted = session.resubscribe();
                if !restarted.is_empty() {
                    eprintln!("WARN: resubscribed feeds={restarted:?}");
                }
            }
            signal = tokio::signal::ctrl_c() => {
                signal.context("listen for ctrl-c failed")?;
                return Ok(());
            }
        }
    }
}

fn print_board(state: &TrackerState, query: &ViewQuery) {
    let rows = indent_tracker_core::projection::project(&state.indents, query);
    println!("== {} == ({} shown)", state.app_info.display_name(), rows.len());
    for (feed, feed_state) in &state.feeds {
        if let FeedHealth::Failed(reason) = &feed_state.health {
            eprintln!("WARN: feed {feed} failed: {reason}");
        }
    }
    for indent in &rows {
        println!("{}", render_indent(indent));
    }
}

// ---------------------------------------------------------------------------
// lifecycle
// ---------------------------------------------------------------------------

pub async fn ready(session: &TrackerSession, id: &str) -> Result<()> {
    session.mark_ready(id).await?;
    println!("indent_id={id} status=DONE");
    Ok(())
}

pub async fn collect(session: &TrackerSession, id: &str, by: &str) -> Result<()> {
    session.confirm_pickup(id, by).await?;
    println!("indent_id={id} status=COLLECTED");
    Ok(())
}

pub async fn note(session: &TrackerSession, id: &str, text: &str) -> Result<()> {
    session.annotate(id, text).await?;
    println!("indent_id={id} noted=true");
    Ok(())
}

// ---------------------------------------------------------------------------
// removal
// ---------------------------------------------------------------------------

pub async fn remove(session: &TrackerSession, id: &str) -> Result<()> {
    require_indent(session, id)?;
    session.remove_indent(id).await?;
    println!("indent_id={id} removed=true");
    Ok(())
}

pub async fn clear_collected(session: &TrackerSession) -> Result<()> {
    let removed = session.clear_collected().await?;
    println!("removed={removed}");
    Ok(())
}

/// Guardrail: deleting every indent needs an explicit `--yes`.
pub async fn clear_all(session: &TrackerSession, yes: bool) -> Result<()> {
    let total = session.snapshot().indents.len();
    if !yes {
        anyhow::bail!(
            "REFUSING CLEAR-ALL: this deletes {} indent(s) for every client. Re-run with: `indent-tracker clear-all --yes`",
            total
        );
    }
    let removed = session.clear_all().await?;
    println!("removed={removed}");
    Ok(())
}

//! Assist command handlers: ready-notification drafts and workload summaries.

use anyhow::{Context, Result};
use indent_tracker_assist::{AssistClient, AssistConfig, AssistReply, ReplyOutcome};
use indent_tracker_core::TrackerSession;

use super::require_indent;

pub fn client(config: &AssistConfig) -> Result<AssistClient> {
    AssistClient::new(config).context("assist client setup failed")
}

/// Only DONE indents are announced; anything else fails before any request.
pub async fn notify(session: &TrackerSession, client: &AssistClient, id: &str) -> Result<()> {
    require_indent(session, id)?;
    let indent = session.ready_for_notification(id)?;
    let reply = client
        .draft_ready_notification(&indent.ward, &indent.category, &indent.unit)
        .await;
    print_reply(&reply);
    Ok(())
}

pub async fn workload(session: &TrackerSession, client: &AssistClient) -> Result<()> {
    let counts = session.workload_by_unit();
    for (unit, count) in &counts {
        eprintln!("{unit}={count}");
    }
    let reply = client.summarize_workload(&counts).await;
    print_reply(&reply);
    Ok(())
}

fn print_reply(reply: &AssistReply) {
    if reply.outcome == ReplyOutcome::Fallback {
        eprintln!("WARN: assist unavailable, showing fallback text");
    }
    println!("{}", reply.display_text());
}

//! Unit and application-name command handlers.

use anyhow::Result;
use indent_tracker_core::TrackerSession;

// ---------------------------------------------------------------------------
// units
// ---------------------------------------------------------------------------

pub fn units_list(session: &TrackerSession) -> Result<()> {
    for (unit, categories) in session.units().iter() {
        println!("{unit}: {}", categories.join(", "));
    }
    Ok(())
}

/// Add a unit, or replace its categories when it already exists.
pub async fn units_add(session: &TrackerSession, name: &str, categories: &str) -> Result<()> {
    session.add_unit(name, categories).await?;
    println!("unit={} saved=true", name.trim());
    Ok(())
}

pub async fn units_remove(session: &TrackerSession, name: &str) -> Result<()> {
    session.remove_unit(name).await?;
    println!("unit={name} removed=true");
    Ok(())
}

// ---------------------------------------------------------------------------
// app-name
// ---------------------------------------------------------------------------

pub fn app_name_show(session: &TrackerSession) -> Result<()> {
    println!("{}", session.app_info().display_name());
    Ok(())
}

pub async fn app_name_set(session: &TrackerSession, name: &str) -> Result<()> {
    session.save_app_name(name).await?;
    println!("app_name={}", name.trim());
    Ok(())
}

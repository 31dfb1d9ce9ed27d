//! Domain models for the indent tracker.

mod config;
mod indent;

pub use config::*;
pub use indent::*;

use thiserror::Error;

/// Input rejected before anything is written.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("Ward is required")]
    BlankWard,

    #[error("Unknown unit: {0}")]
    UnknownUnit(String),

    #[error("Unit {unit} has no category {category}")]
    UnknownCategory { unit: String, category: String },

    #[error("Unit name is required")]
    BlankUnitName,

    #[error("Unit {0} needs at least one category")]
    NoCategories(String),

    #[error("Cannot remove {0}: at least one unit must remain")]
    LastUnit(String),

    #[error("Application name is required")]
    BlankAppName,
}

/// Entry normalization for free-text fields: trimmed, uppercase.
pub fn normalize_text(raw: &str) -> String {
    raw.trim().to_uppercase()
}

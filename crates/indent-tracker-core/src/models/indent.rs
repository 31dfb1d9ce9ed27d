//! Indent models: one pharmacy supply request and its partial updates.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{normalize_text, UnitConfig, ValidationError};
use crate::store::{to_record, Record};

/// Staff placeholder stored when the requester leaves the name empty.
pub const UNNAMED_STAFF: &str = "TIADA NAMA";

/// Lifecycle status of an indent.
///
/// Declaration order is the lifecycle order, so `Ord` gives
/// `Pending < Done < Collected`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum IndentStatus {
    /// Submitted by the ward, not prepared yet
    Pending,
    /// Prepared by the pharmacy, waiting for pickup
    Done,
    /// Picked up by ward staff
    Collected,
}

impl IndentStatus {
    /// Wire name of the status.
    pub fn as_str(&self) -> &'static str {
        match self {
            IndentStatus::Pending => "PENDING",
            IndentStatus::Done => "DONE",
            IndentStatus::Collected => "COLLECTED",
        }
    }
}

impl std::fmt::Display for IndentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A pharmacy indent as stored under `indents/{id}`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Indent {
    /// Store-assigned document id (the document key, not part of the body)
    #[serde(skip)]
    pub id: String,
    /// Supplying unit
    pub unit: String,
    /// Requesting ward, uppercase
    pub ward: String,
    /// Requesting staff member, uppercase
    pub staff: String,
    /// Category from the unit's category list
    #[serde(rename = "type")]
    pub category: String,
    /// Lifecycle status
    pub status: IndentStatus,
    /// Submission time
    pub created_at: DateTime<Utc>,
    /// Time the pharmacy marked it ready
    #[serde(default)]
    pub done_at: Option<DateTime<Utc>>,
    /// Pickup time
    #[serde(default)]
    pub collected_at: Option<DateTime<Utc>>,
    /// Who picked it up
    #[serde(default)]
    pub collected_by: Option<String>,
    /// Free-text annotation, uppercase
    #[serde(default)]
    pub note: String,
}

impl Indent {
    /// Decode a stored document body.
    pub fn from_document(id: &str, body: &Record) -> Result<Self, serde_json::Error> {
        let mut indent: Indent = serde_json::from_value(serde_json::Value::Object(body.clone()))?;
        indent.id = id.to_string();
        Ok(indent)
    }

    pub fn is_collected(&self) -> bool {
        self.status == IndentStatus::Collected
    }

    /// Local effect of a partial update, mirroring the store's shallow merge.
    pub fn apply(&self, patch: &IndentPatch) -> Indent {
        let mut next = self.clone();
        if let Some(status) = patch.status {
            next.status = status;
        }
        if let Some(done_at) = patch.done_at {
            next.done_at = Some(done_at);
        }
        if let Some(collected_at) = patch.collected_at {
            next.collected_at = Some(collected_at);
        }
        if let Some(collected_by) = &patch.collected_by {
            next.collected_by = Some(collected_by.clone());
        }
        if let Some(note) = &patch.note {
            next.note = note.clone();
        }
        next
    }

    /// First violated timestamp invariant, if any.
    pub fn invariant_violation(&self) -> Option<&'static str> {
        let pending = self.status == IndentStatus::Pending;
        if self.done_at.is_none() != pending {
            return Some("done_at must be set exactly when status is past PENDING");
        }
        let collected = self.is_collected();
        if self.collected_at.is_some() != collected || self.collected_by.is_some() != collected {
            return Some("collected_at/collected_by must be set exactly when COLLECTED");
        }
        None
    }
}

/// Input for a new indent, normalized at construction.
#[derive(Debug, Clone, PartialEq)]
pub struct NewIndent {
    pub unit: String,
    pub ward: String,
    pub staff: String,
    pub category: String,
}

impl NewIndent {
    /// Normalize entry fields: ward and staff are trimmed and uppercased,
    /// a blank staff name becomes [`UNNAMED_STAFF`].
    pub fn new(
        unit: impl Into<String>,
        ward: &str,
        staff: &str,
        category: impl Into<String>,
    ) -> Result<Self, ValidationError> {
        let ward = normalize_text(ward);
        if ward.is_empty() {
            return Err(ValidationError::BlankWard);
        }
        let staff = match normalize_text(staff) {
            s if s.is_empty() => UNNAMED_STAFF.to_string(),
            s => s,
        };
        Ok(Self {
            unit: unit.into(),
            ward,
            staff,
            category: category.into(),
        })
    }

    /// Check the unit exists and offers the category.
    pub fn validate_against(&self, units: &UnitConfig) -> Result<(), ValidationError> {
        let categories = units
            .categories(&self.unit)
            .ok_or_else(|| ValidationError::UnknownUnit(self.unit.clone()))?;
        if !categories.iter().any(|c| c == &self.category) {
            return Err(ValidationError::UnknownCategory {
                unit: self.unit.clone(),
                category: self.category.clone(),
            });
        }
        Ok(())
    }

    /// Full document body for a freshly submitted indent.
    pub fn into_document(self, now: DateTime<Utc>) -> Result<Record, serde_json::Error> {
        let indent = Indent {
            id: String::new(),
            unit: self.unit,
            ward: self.ward,
            staff: self.staff,
            category: self.category,
            status: IndentStatus::Pending,
            created_at: now,
            done_at: None,
            collected_at: None,
            collected_by: None,
            note: String::new(),
        };
        to_record(&indent)
    }
}

/// Partial update of an indent; only the set fields are written.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct IndentPatch {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<IndentStatus>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub done_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub collected_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub collected_by: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
}

impl IndentPatch {
    pub fn is_empty(&self) -> bool {
        *self == IndentPatch::default()
    }

    /// Field map sent to the store's `update`.
    pub fn to_fields(&self) -> Result<Record, serde_json::Error> {
        to_record(self)
    }
}

//! Indent lifecycle: `PENDING → DONE → COLLECTED`, plus notes in any state.
//!
//! Planning is pure: it takes the latest known status and returns the
//! partial update to send, or rejects the event before anything is written.

use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::models::{normalize_text, IndentPatch, IndentStatus};

/// Something that happens to an indent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LifecycleEvent {
    /// Pharmacy finished preparing the indent
    MarkReady,
    /// Ward staff picked it up
    ConfirmPickup { collector: String },
    /// Replace the note
    Annotate { note: String },
}

impl LifecycleEvent {
    pub fn name(&self) -> &'static str {
        match self {
            LifecycleEvent::MarkReady => "mark ready",
            LifecycleEvent::ConfirmPickup { .. } => "confirm pickup",
            LifecycleEvent::Annotate { .. } => "annotate",
        }
    }
}

/// Rejected transitions. Nothing has been written when these are returned.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransitionError {
    #[error("Cannot {event} an indent that is {from}")]
    NotAllowed {
        from: IndentStatus,
        event: &'static str,
    },

    #[error("Collector name is required")]
    MissingCollector,

    #[error("Unknown indent: {0}")]
    UnknownIndent(String),
}

/// Validate `event` against `current` and build the partial update.
pub fn plan_transition(
    current: IndentStatus,
    event: &LifecycleEvent,
    now: DateTime<Utc>,
) -> Result<IndentPatch, TransitionError> {
    match (current, event) {
        (IndentStatus::Pending, LifecycleEvent::MarkReady) => Ok(IndentPatch {
            status: Some(IndentStatus::Done),
            done_at: Some(now),
            ..IndentPatch::default()
        }),
        (IndentStatus::Done, LifecycleEvent::ConfirmPickup { collector }) => {
            let collector = normalize_text(collector);
            if collector.is_empty() {
                return Err(TransitionError::MissingCollector);
            }
            Ok(IndentPatch {
                status: Some(IndentStatus::Collected),
                collected_at: Some(now),
                collected_by: Some(collector),
                ..IndentPatch::default()
            })
        }
        (_, LifecycleEvent::Annotate { note }) => Ok(IndentPatch {
            note: Some(normalize_text(note)),
            ..IndentPatch::default()
        }),
        (from, event) => Err(TransitionError::NotAllowed {
            from,
            event: event.name(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Indent;
    use chrono::TimeZone;
    use proptest::prelude::*;

    fn at(minute: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 1, 8, minute, 0).unwrap()
    }

    fn pending() -> Indent {
        Indent {
            id: "i1".into(),
            unit: "Farmasi Satelit 1".into(),
            ward: "4A".into(),
            staff: "AMINAH".into(),
            category: "Floor Stock".into(),
            status: IndentStatus::Pending,
            created_at: at(0),
            done_at: None,
            collected_at: None,
            collected_by: None,
            note: String::new(),
        }
    }

    #[test]
    fn test_mark_ready_sets_done_at() {
        let patch = plan_transition(IndentStatus::Pending, &LifecycleEvent::MarkReady, at(5)).unwrap();
        assert_eq!(patch.status, Some(IndentStatus::Done));
        assert_eq!(patch.done_at, Some(at(5)));
        assert!(patch.collected_at.is_none());
    }

    #[test]
    fn test_confirm_pickup_uppercases_collector() {
        let event = LifecycleEvent::ConfirmPickup {
            collector: "  siti ".into(),
        };
        let patch = plan_transition(IndentStatus::Done, &event, at(9)).unwrap();
        assert_eq!(patch.status, Some(IndentStatus::Collected));
        assert_eq!(patch.collected_by.as_deref(), Some("SITI"));
        assert_eq!(patch.collected_at, Some(at(9)));
    }

    #[test]
    fn test_confirm_pickup_rejects_blank_collector() {
        for collector in ["", "   "] {
            let event = LifecycleEvent::ConfirmPickup {
                collector: collector.into(),
            };
            assert_eq!(
                plan_transition(IndentStatus::Done, &event, at(9)),
                Err(TransitionError::MissingCollector)
            );
        }
    }

    #[test]
    fn test_out_of_order_transitions_rejected() {
        let pickup = LifecycleEvent::ConfirmPickup {
            collector: "ALI".into(),
        };
        assert!(matches!(
            plan_transition(IndentStatus::Pending, &pickup, at(1)),
            Err(TransitionError::NotAllowed { from: IndentStatus::Pending, .. })
        ));
        assert!(plan_transition(IndentStatus::Done, &LifecycleEvent::MarkReady, at(1)).is_err());
        assert!(plan_transition(IndentStatus::Collected, &LifecycleEvent::MarkReady, at(1)).is_err());
        assert!(plan_transition(IndentStatus::Collected, &pickup, at(1)).is_err());
    }

    #[test]
    fn test_annotate_allowed_in_every_state() {
        let event = LifecycleEvent::Annotate {
            note: "ubat habis".into(),
        };
        for status in [IndentStatus::Pending, IndentStatus::Done, IndentStatus::Collected] {
            let patch = plan_transition(status, &event, at(2)).unwrap();
            assert_eq!(patch.note.as_deref(), Some("UBAT HABIS"));
            assert!(patch.status.is_none());
        }
    }

    fn event_strategy() -> impl Strategy<Value = LifecycleEvent> {
        prop_oneof![
            Just(LifecycleEvent::MarkReady),
            "[a-z ]{0,6}".prop_map(|collector| LifecycleEvent::ConfirmPickup { collector }),
            "[a-z ]{0,6}".prop_map(|note| LifecycleEvent::Annotate { note }),
        ]
    }

    proptest! {
        #[test]
        fn test_status_never_regresses(events in prop::collection::vec(event_strategy(), 0..20)) {
            let mut indent = pending();
            for (minute, event) in events.iter().enumerate() {
                let before = indent.clone();
                match plan_transition(indent.status, event, at(minute as u32 + 1)) {
                    Ok(patch) => indent = indent.apply(&patch),
                    Err(_) => prop_assert_eq!(&indent, &before),
                }
                prop_assert!(indent.status >= before.status);
                prop_assert!(indent.invariant_violation().is_none());
                if before.done_at.is_some() {
                    prop_assert_eq!(indent.done_at, before.done_at);
                }
            }
        }
    }
}

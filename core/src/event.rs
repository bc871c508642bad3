//! Stipend audit log.
//!
//! RULE: Every write to a student or stipend record appends exactly one
//! event. The log is append-only; financial history is never rewritten.

use crate::{
    stipend::PaymentStatus,
    types::{Period, StipendId, StudentId},
};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Variants are only ever added, never removed or reordered.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StipendEvent {
    StudentEnrolled {
        kollel_student_id: StudentId,
        student_ref: String,
        base_stipend_amount: Decimal,
        is_elite: bool,
    },
    StudentDeactivated {
        kollel_student_id: StudentId,
    },
    StipendCreated {
        stipend_id: StipendId,
        kollel_student_id: StudentId,
        period: Period,
    },
    StipendEdited {
        stipend_id: StipendId,
        fields: Vec<String>,
        final_amount: Decimal,
    },
    StipendRecalculated {
        stipend_id: StipendId,
        total_credits: Decimal,
        final_amount: Decimal,
    },
    BreakCreditsApplied {
        stipend_id: StipendId,
        batch_id: Uuid,
        prorated_credits: Decimal,
        final_amount: Decimal,
    },
    StipendPaid {
        stipend_id: StipendId,
        final_amount: Decimal,
    },
    PaymentStatusChanged {
        stipend_id: StipendId,
        status: PaymentStatus,
    },
}

impl StipendEvent {
    /// Stable name stored in the event_type column.
    pub fn type_name(&self) -> &'static str {
        match self {
            StipendEvent::StudentEnrolled { .. }      => "student_enrolled",
            StipendEvent::StudentDeactivated { .. }   => "student_deactivated",
            StipendEvent::StipendCreated { .. }       => "stipend_created",
            StipendEvent::StipendEdited { .. }        => "stipend_edited",
            StipendEvent::StipendRecalculated { .. }  => "stipend_recalculated",
            StipendEvent::BreakCreditsApplied { .. }  => "break_credits_applied",
            StipendEvent::StipendPaid { .. }          => "stipend_paid",
            StipendEvent::PaymentStatusChanged { .. } => "payment_status_changed",
        }
    }
}

/// A persisted row from the stipend_event table.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventLogEntry {
    pub id:         Option<i64>,
    pub stipend_id: Option<StipendId>,
    pub batch_id:   Option<String>,
    pub event_type: String,
    pub payload:    String,
}

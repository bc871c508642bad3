//! Kollel enrollment records.

use crate::{
    error::{StipendError, StipendResult},
    types::StudentId,
};
use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct KollelStudent {
    pub id:                  StudentId,
    /// Identity of the underlying student in the wider student-records system.
    pub student_ref:         String,
    pub name:                String,
    pub base_stipend_amount: Decimal,
    /// Kollel Elyon: earns the flat elite-tier bonus every month.
    pub is_elite:            bool,
    pub active:              bool,
    pub join_date:           NaiveDate,
    pub leave_date:          Option<NaiveDate>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NewKollelStudent {
    pub student_ref:         String,
    pub name:                String,
    pub base_stipend_amount: Decimal,
    pub is_elite:            bool,
    pub join_date:           NaiveDate,
}

impl NewKollelStudent {
    pub fn validate(&self) -> StipendResult<()> {
        if self.student_ref.trim().is_empty() {
            return Err(StipendError::InvalidInput {
                field: "student_ref",
                reason: "must not be empty".into(),
            });
        }
        if self.base_stipend_amount < Decimal::ZERO {
            return Err(StipendError::InvalidInput {
                field: "base_stipend_amount",
                reason: format!("must not be negative, got {}", self.base_stipend_amount),
            });
        }
        Ok(())
    }
}

//! Break proration: estimate the credits a student would have earned
//! during break days from their trailing daily earning rate.
//!
//! rate      = sum(actual credits) / sum(non-break days) over the history window
//! prorated  = rate × break days in the target month (stored at full precision)
//! paid      = prorated truncated toward zero (partial credits are not paid)

use crate::{
    error::StipendResult,
    stipend::out_of_range,
    types::{AcademicYearId, Period, StipendId, StudentId},
};
use rust_decimal::Decimal;
use serde::Serialize;
use uuid::Uuid;

/// One month of a student's history window, reduced to what proration needs.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct HistoryBasis {
    pub period:         Period,
    pub actual_credits: Decimal,
    pub non_break_days: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProratedCredits {
    pub history_periods:      usize,
    pub total_actual_credits: Decimal,
    pub total_non_break_days: i64,
    pub daily_rate:           Decimal,
    pub calculated_credits:   Decimal,
    pub floored_credits:      Decimal,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    /// Admin entered prorated credits by hand.
    CreditsOverride,
    /// No stipend record in the month before the target month.
    NoHistory,
    /// Every month in the history window was entirely break days.
    NoLearningDays,
}

/// Compute prorated credits for `break_days` from a history window.
///
/// The inner `Err` is a per-student skip. The outer error is an amount too
/// large to compute and fails the whole batch.
pub fn prorate(history: &[HistoryBasis], break_days: i64) -> StipendResult<Result<ProratedCredits, SkipReason>> {
    if history.is_empty() {
        return Ok(Err(SkipReason::NoHistory));
    }
    let total_actual_credits = history
        .iter()
        .try_fold(Decimal::ZERO, |acc, h| acc.checked_add(h.actual_credits))
        .ok_or_else(|| out_of_range("prorated_credits"))?;
    let total_non_break_days: i64 = history.iter().map(|h| h.non_break_days).sum();
    if total_non_break_days <= 0 {
        return Ok(Err(SkipReason::NoLearningDays));
    }

    let days = Decimal::from(total_non_break_days);
    let daily_rate = total_actual_credits
        .checked_div(days)
        .ok_or_else(|| out_of_range("prorated_credits"))?;
    // Multiply before dividing so whole results stay whole.
    let calculated_credits = total_actual_credits
        .checked_mul(Decimal::from(break_days))
        .and_then(|scaled| scaled.checked_div(days))
        .ok_or_else(|| out_of_range("prorated_credits"))?
        .normalize();

    Ok(Ok(ProratedCredits {
        history_periods: history.len(),
        total_actual_credits,
        total_non_break_days,
        daily_rate,
        calculated_credits,
        floored_credits: calculated_credits.trunc(),
    }))
}

/// Audit detail for one student updated by a proration batch.
#[derive(Debug, Clone, Serialize)]
pub struct StudentProrationDetail {
    pub kollel_student_id: StudentId,
    pub student_name:      String,
    pub stipend_id:        StipendId,
    pub previous_prorated: Decimal,
    pub credits:           ProratedCredits,
    pub final_amount:      Decimal,
}

#[derive(Debug, Clone, Serialize)]
pub struct SkippedStudent {
    pub kollel_student_id: StudentId,
    pub stipend_id:        StipendId,
    pub reason:            SkipReason,
}

/// Outcome of one `apply_break_credits` run. Expected failures (no academic
/// year, no break days) are reported here with `success == false`.
#[derive(Debug, Clone, Serialize)]
pub struct ProrationReport {
    pub success:          bool,
    pub message:          String,
    pub period:           Period,
    pub academic_year_id: Option<AcademicYearId>,
    pub break_days:       i64,
    pub batch_id:         Option<Uuid>,
    pub updated_count:    usize,
    pub details:          Vec<StudentProrationDetail>,
    pub skipped:          Vec<SkippedStudent>,
}

impl ProrationReport {
    pub fn failed(period: Period, academic_year_id: Option<AcademicYearId>, message: impl Into<String>) -> Self {
        Self {
            success: false,
            message: message.into(),
            period,
            academic_year_id,
            break_days: 0,
            batch_id: None,
            updated_count: 0,
            details: Vec::new(),
            skipped: Vec::new(),
        }
    }
}

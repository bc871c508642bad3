//! The kollel stipend engine: every administrative operation over the store.
//!
//! RULES:
//!   - Derived stipend fields are only ever written by `stipend::recompute`.
//!   - Every write appends one audit event (see event.rs).
//!   - Writes to an existing stipend carry the version the caller read;
//!     a stale version fails with `VersionConflict` and writes nothing.
//!   - Break proration runs as one transaction: either every eligible
//!     student is updated or none is.

use crate::{
    break_calendar::{self, AcademicYear, KollelBreakCredit},
    break_proration::{
        prorate, HistoryBasis, ProrationReport, SkipReason, SkippedStudent, StudentProrationDetail,
    },
    config::StipendRules,
    enrollment::{KollelStudent, NewKollelStudent},
    error::{StipendError, StipendResult},
    event::{EventLogEntry, StipendEvent},
    pay_history::{self, PayPeriodEntry},
    stipend::{self, MonthlyStipend, PaymentStatus, StipendUpdate},
    store::KollelStore,
    types::{AcademicYearId, Period, StipendId, StudentId},
};
use chrono::{NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::Serialize;
use std::collections::HashMap;
use uuid::Uuid;

/// Totals for one pay period, read by reporting and export.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct PeriodSummary {
    pub period:             Period,
    pub stipend_count:      usize,
    pub total_credits:      Decimal,
    pub total_final_amount: Decimal,
    pub paid_count:         usize,
    pub unpaid_count:       usize,
}

pub struct KollelEngine {
    store: KollelStore,
    rules: StipendRules,
}

impl KollelEngine {
    pub fn new(store: KollelStore, rules: StipendRules) -> Self {
        Self { store, rules }
    }

    /// Migrated in-memory store with default rules.
    pub fn build_test() -> StipendResult<Self> {
        let store = KollelStore::in_memory()?;
        store.migrate()?;
        Ok(Self::new(store, StipendRules::default_rules()))
    }

    pub fn rules(&self) -> &StipendRules {
        &self.rules
    }

    pub fn store(&self) -> &KollelStore {
        &self.store
    }

    // ── Academic calendar ─────────────────────────────────────────

    pub fn add_academic_year(
        &self,
        name:       &str,
        start_year: i32,
        start_date: NaiveDate,
        end_date:   NaiveDate,
    ) -> StipendResult<AcademicYearId> {
        if start_date > end_date {
            return Err(StipendError::InvalidInput {
                field: "end_date",
                reason: format!("academic year '{name}' ends ({end_date}) before it starts ({start_date})"),
            });
        }
        self.store.insert_academic_year(name, start_year, start_date, end_date)
    }

    /// The academic year covering `period`, resolved through the school-year boundary.
    pub fn academic_year_for(&self, period: Period) -> StipendResult<Option<AcademicYear>> {
        let start_year =
            break_calendar::school_year_start(period, self.rules.proration.school_year_start_month);
        self.store.academic_year_by_start_year(start_year)
    }

    pub fn add_break_credit(
        &self,
        academic_year_id: AcademicYearId,
        name:             &str,
        start_date:       NaiveDate,
        end_date:         NaiveDate,
    ) -> StipendResult<i64> {
        if start_date > end_date {
            return Err(StipendError::InvalidBreakRange { name: name.to_string() });
        }
        let id = self.store.insert_break_credit(academic_year_id, name, start_date, end_date)?;
        log::info!("Break '{name}' ({start_date}..={end_date}) added to academic year {academic_year_id}");
        Ok(id)
    }

    pub fn deactivate_break_credit(&self, id: i64) -> StipendResult<bool> {
        self.store.set_break_credit_active(id, false)
    }

    pub fn active_break_credits(&self, academic_year_id: AcademicYearId) -> StipendResult<Vec<KollelBreakCredit>> {
        self.store.active_break_credits(academic_year_id)
    }

    pub fn break_days_in_month(&self, period: Period, academic_year_id: AcademicYearId) -> StipendResult<i64> {
        let breaks = self.store.active_break_credits(academic_year_id)?;
        Ok(break_calendar::break_days_in_month(period, &breaks))
    }

    pub fn non_break_days_in_month(&self, period: Period, academic_year_id: AcademicYearId) -> StipendResult<i64> {
        let breaks = self.store.active_break_credits(academic_year_id)?;
        Ok(break_calendar::non_break_days_in_month(period, &breaks))
    }

    /// Learning days in `period` under its own academic year.
    /// A month with no configured academic year has no breaks.
    fn learning_days(&self, period: Period) -> StipendResult<i64> {
        match self.academic_year_for(period)? {
            Some(year) => self.non_break_days_in_month(period, year.id),
            None => Ok(period.days_in_month()),
        }
    }

    // ── Enrollment ────────────────────────────────────────────────

    pub fn enroll_student(&self, new: NewKollelStudent) -> StipendResult<KollelStudent> {
        new.validate()?;
        if self.store.active_enrollment_for(&new.student_ref)?.is_some() {
            return Err(StipendError::AlreadyEnrolled { student_ref: new.student_ref });
        }
        let id = self.store.in_transaction(|| {
            let id = self.store.insert_student(&new)?;
            self.store.append_event(
                None,
                None,
                &StipendEvent::StudentEnrolled {
                    kollel_student_id: id,
                    student_ref: new.student_ref.clone(),
                    base_stipend_amount: new.base_stipend_amount,
                    is_elite: new.is_elite,
                },
            )?;
            Ok(id)
        })?;
        log::info!("Enrolled '{}' as kollel student {id}", new.student_ref);
        self.student(id)
    }

    /// Deactivate, never delete: stipend history stays attached.
    pub fn deactivate_student(&self, id: StudentId, leave_date: NaiveDate) -> StipendResult<()> {
        let changed = self.store.in_transaction(|| {
            if !self.store.deactivate_student(id, leave_date)? {
                return Ok(false);
            }
            self.store.append_event(None, None, &StipendEvent::StudentDeactivated { kollel_student_id: id })?;
            Ok(true)
        })?;
        if !changed {
            // Either unknown or already inactive.
            self.student(id)?;
            return Ok(());
        }
        log::info!("Kollel student {id} deactivated as of {leave_date}");
        Ok(())
    }

    pub fn student(&self, id: StudentId) -> StipendResult<KollelStudent> {
        self.store
            .student(id)?
            .ok_or(StipendError::StudentNotFound { id })
    }

    pub fn active_students(&self) -> StipendResult<Vec<KollelStudent>> {
        self.store.active_students()
    }

    // ── Monthly stipends ──────────────────────────────────────────

    pub fn stipend(&self, id: StipendId) -> StipendResult<MonthlyStipend> {
        self.store
            .stipend(id)?
            .ok_or(StipendError::StipendNotFound { id })
    }

    pub fn stipend_for(&self, student_id: StudentId, period: Period) -> StipendResult<Option<MonthlyStipend>> {
        self.store.stipend_for(student_id, period)
    }

    /// The student's record for `period`, created on first access with the
    /// base amount snapshotted and the elite bonus seeded from the student.
    pub fn ensure_monthly_stipend(&self, student_id: StudentId, period: Period) -> StipendResult<MonthlyStipend> {
        if let Some(existing) = self.store.stipend_for(student_id, period)? {
            return Ok(existing);
        }
        let student = self.student(student_id)?;

        let mut fresh = MonthlyStipend::blank(student.id, period, student.base_stipend_amount);
        if student.is_elite {
            fresh.elite_tier_bonus = self.rules.bonuses.elite_tier_bonus;
        }
        stipend::recompute(&mut fresh, &self.rules, Utc::now())?;

        let id = self.store.in_transaction(|| {
            let id = self.store.insert_stipend(&fresh)?;
            self.store.append_event(
                Some(id),
                None,
                &StipendEvent::StipendCreated {
                    stipend_id: id,
                    kollel_student_id: student.id,
                    period,
                },
            )?;
            Ok(id)
        })?;
        log::debug!("Created stipend {id} for student {} ({period})", student.id);
        self.stipend(id)
    }

    /// One row per active student for `period`, creating missing rows.
    pub fn monthly_dashboard(&self, period: Period) -> StipendResult<Vec<MonthlyStipend>> {
        self.store
            .active_students()?
            .iter()
            .map(|s| self.ensure_monthly_stipend(s.id, period))
            .collect()
    }

    /// Apply an admin edit and recompute. `expected_version` is the version
    /// the admin's form was rendered from.
    pub fn update_stipend(
        &self,
        id:               StipendId,
        update:           &StipendUpdate,
        expected_version: i64,
    ) -> StipendResult<MonthlyStipend> {
        let mut record = self.stipend(id)?;
        if record.version != expected_version {
            return Err(StipendError::VersionConflict {
                id,
                expected: expected_version,
                actual: record.version,
            });
        }

        let fields = update.apply_to(&mut record, &self.rules)?;
        self.store.in_transaction(|| {
            self.save_recomputed(&mut record)?;
            self.store.append_event(
                Some(id),
                None,
                &StipendEvent::StipendEdited {
                    stipend_id: id,
                    fields: fields.iter().map(|f| f.to_string()).collect(),
                    final_amount: record.final_amount,
                },
            )
        })?;
        Ok(record)
    }

    /// Re-derive and persist one record from its current inputs.
    pub fn recompute_stipend(&self, id: StipendId) -> StipendResult<MonthlyStipend> {
        let mut record = self.stipend(id)?;
        self.store.in_transaction(|| {
            self.save_recomputed(&mut record)?;
            self.store.append_event(
                Some(id),
                None,
                &StipendEvent::StipendRecalculated {
                    stipend_id: id,
                    total_credits: record.total_credits,
                    final_amount: record.final_amount,
                },
            )
        })?;
        Ok(record)
    }

    /// Recompute every stipend in `period`. Returns how many were refreshed.
    pub fn recompute_period(&self, period: Period) -> StipendResult<usize> {
        let stipends = self.store.stipends_for_period(period, false)?;
        self.store.in_transaction(|| {
            for s in &stipends {
                self.recompute_stipend(s.id)?;
            }
            Ok(())
        })?;
        log::info!("Recomputed {} stipends for {period}", stipends.len());
        Ok(stipends.len())
    }

    pub fn set_payment_status(
        &self,
        id:               StipendId,
        status:           PaymentStatus,
        expected_version: i64,
    ) -> StipendResult<MonthlyStipend> {
        let mut record = self.stipend(id)?;
        record.version = expected_version;
        record.payment_status = status;
        let event = match status {
            PaymentStatus::Paid => StipendEvent::StipendPaid {
                stipend_id: id,
                final_amount: record.final_amount,
            },
            other => StipendEvent::PaymentStatusChanged { stipend_id: id, status: other },
        };

        record.version = self.store.in_transaction(|| {
            let version = self.store.update_stipend(&record)?;
            self.store.append_event(Some(id), None, &event)?;
            Ok(version)
        })?;
        Ok(record)
    }

    pub fn mark_paid(&self, id: StipendId, expected_version: i64) -> StipendResult<MonthlyStipend> {
        self.set_payment_status(id, PaymentStatus::Paid, expected_version)
    }

    fn save_recomputed(&self, record: &mut MonthlyStipend) -> StipendResult<()> {
        stipend::recompute(record, &self.rules, Utc::now())?;
        record.version = self.store.update_stipend(record)?;
        Ok(())
    }

    // ── Pay history ───────────────────────────────────────────────

    /// Up to `n` contiguous stipend records before `current`, newest first.
    pub fn last_n_pay_periods(
        &self,
        student_id: StudentId,
        current:    Period,
        n:          usize,
    ) -> StipendResult<Vec<PayPeriodEntry>> {
        pay_history::last_n_pay_periods(current, n, |p| self.store.stipend_for(student_id, p))
    }

    // ── Break proration ───────────────────────────────────────────

    /// Prorate break-day credits for every eligible stipend in `period`,
    /// then recompute each updated record.
    pub fn apply_break_credits(&self, period: Period) -> StipendResult<ProrationReport> {
        let Some(academic_year) = self.academic_year_for(period)? else {
            log::info!("{period}: no academic year found, break credits not applied");
            return Ok(ProrationReport::failed(period, None, "No academic year found for this period"));
        };
        let break_days = self.break_days_in_month(period, academic_year.id)?;
        if break_days == 0 {
            log::info!("{period}: no break days, break credits not applied");
            return Ok(ProrationReport::failed(
                period,
                Some(academic_year.id),
                "No break days found for this month",
            ));
        }

        let batch_id = Uuid::new_v4();
        let batch_tag = batch_id.to_string();
        let names: HashMap<StudentId, String> = self
            .store
            .active_students()?
            .into_iter()
            .map(|s| (s.id, s.name))
            .collect();
        let window = self.rules.proration.history_window;

        let mut details = Vec::new();
        let mut skipped = Vec::new();
        let mut learning_days: HashMap<Period, i64> = HashMap::new();

        self.store.in_transaction(|| {
            for mut record in self.store.stipends_for_period(period, true)? {
                if record.credits_override {
                    skipped.push(SkippedStudent {
                        kollel_student_id: record.kollel_student_id,
                        stipend_id: record.id,
                        reason: SkipReason::CreditsOverride,
                    });
                    continue;
                }

                let history = self.last_n_pay_periods(record.kollel_student_id, period, window)?;
                let mut basis = Vec::with_capacity(history.len());
                for entry in &history {
                    let days = match learning_days.get(&entry.period) {
                        Some(d) => *d,
                        None => {
                            let d = self.learning_days(entry.period)?;
                            learning_days.insert(entry.period, d);
                            d
                        }
                    };
                    basis.push(HistoryBasis {
                        period: entry.period,
                        actual_credits: entry.stipend.actual_credits_earned,
                        non_break_days: days,
                    });
                }

                let credits = match prorate(&basis, break_days)? {
                    Ok(c) => c,
                    Err(reason) => {
                        log::warn!(
                            "{period}: stipend {} (student {}) skipped: {reason:?}",
                            record.id,
                            record.kollel_student_id,
                        );
                        skipped.push(SkippedStudent {
                            kollel_student_id: record.kollel_student_id,
                            stipend_id: record.id,
                            reason,
                        });
                        continue;
                    }
                };

                let previous_prorated = record.prorated_credits;
                record.prorated_credits = credits.calculated_credits;
                self.save_recomputed(&mut record)?;
                self.store.append_event(
                    Some(record.id),
                    Some(&batch_tag),
                    &StipendEvent::BreakCreditsApplied {
                        stipend_id: record.id,
                        batch_id,
                        prorated_credits: record.prorated_credits,
                        final_amount: record.final_amount,
                    },
                )?;
                details.push(StudentProrationDetail {
                    kollel_student_id: record.kollel_student_id,
                    student_name: names.get(&record.kollel_student_id).cloned().unwrap_or_default(),
                    stipend_id: record.id,
                    previous_prorated,
                    credits,
                    final_amount: record.final_amount,
                });
            }
            Ok(())
        })?;

        log::info!(
            "{period}: break credits applied to {} students ({} skipped, {break_days} break days, batch {batch_id})",
            details.len(),
            skipped.len(),
        );
        Ok(ProrationReport {
            success: true,
            message: format!(
                "Applied break credits to {} students for {break_days} break days",
                details.len()
            ),
            period,
            academic_year_id: Some(academic_year.id),
            break_days,
            batch_id: Some(batch_id),
            updated_count: details.len(),
            details,
            skipped,
        })
    }

    // ── Reporting ─────────────────────────────────────────────────

    pub fn period_summary(&self, period: Period) -> StipendResult<PeriodSummary> {
        let stipends = self.store.stipends_for_period(period, false)?;
        let paid_count = stipends
            .iter()
            .filter(|s| s.payment_status == PaymentStatus::Paid)
            .count();
        let total = |field: &'static str, pick: fn(&MonthlyStipend) -> Decimal| {
            stipends
                .iter()
                .try_fold(Decimal::ZERO, |acc, s| acc.checked_add(pick(s)))
                .ok_or_else(|| stipend::out_of_range(field))
        };
        Ok(PeriodSummary {
            period,
            stipend_count: stipends.len(),
            total_credits: total("total_credits", |s| s.total_credits)?,
            total_final_amount: total("total_final_amount", |s| s.final_amount)?,
            paid_count,
            unpaid_count: stipends.len() - paid_count,
        })
    }

    pub fn audit_trail(&self, id: StipendId) -> StipendResult<Vec<EventLogEntry>> {
        self.store.events_for_stipend(id)
    }
}

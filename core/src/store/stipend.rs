//! Store methods for monthly stipend records.
//!
//! Writes are guarded by the `version` column: an update carrying a stale
//! version changes nothing and reports a conflict.

use super::{decimal_at, decimal_text, KollelStore};
use crate::{
    error::{StipendError, StipendResult},
    stipend::{MonthlyStipend, PaymentStatus},
    types::{Period, StipendId, StudentId},
};
use rusqlite::{params, types::Type, OptionalExtension, Row};

const STIPEND_COLUMNS: &str = "s.id, s.kollel_student_id, s.month, s.year,
    s.base_stipend_amount, s.actual_credits_earned, s.prorated_credits, s.credits_override,
    s.total_credits, s.incentive_amount, s.base_plus_incentive, s.elite_tier_bonus,
    s.retufin_pay, s.chabura_bonus_1, s.chabura_bonus_2, s.special_pay,
    s.missed_time_deduction, s.other_deductions, s.final_amount, s.payment_status,
    s.last_recalculated, s.version";

impl KollelStore {
    // ── Monthly stipend ───────────────────────────────────────────

    /// Insert a new record. The stored version starts at 1.
    pub fn insert_stipend(&self, s: &MonthlyStipend) -> StipendResult<StipendId> {
        self.conn.execute(
            "INSERT INTO monthly_stipend (
                kollel_student_id, month, year, base_stipend_amount, actual_credits_earned,
                prorated_credits, credits_override, total_credits, incentive_amount,
                base_plus_incentive, elite_tier_bonus, retufin_pay, chabura_bonus_1,
                chabura_bonus_2, special_pay, missed_time_deduction, other_deductions,
                final_amount, payment_status, last_recalculated, version
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17, ?18, ?19, ?20, 1)",
            params![
                s.kollel_student_id,
                s.period.month,
                s.period.year,
                decimal_text(s.base_stipend_amount),
                decimal_text(s.actual_credits_earned),
                decimal_text(s.prorated_credits),
                s.credits_override as i32,
                decimal_text(s.total_credits),
                decimal_text(s.incentive_amount),
                decimal_text(s.base_plus_incentive),
                decimal_text(s.elite_tier_bonus),
                decimal_text(s.retufin_pay),
                decimal_text(s.chabura_bonus_1),
                decimal_text(s.chabura_bonus_2),
                decimal_text(s.special_pay),
                decimal_text(s.missed_time_deduction),
                decimal_text(s.other_deductions),
                decimal_text(s.final_amount),
                s.payment_status.as_str(),
                s.last_recalculated,
            ],
        )?;
        Ok(self.conn.last_insert_rowid())
    }

    /// Overwrite every field of `s`, provided the stored version still equals
    /// `s.version`. Returns the new version.
    pub fn update_stipend(&self, s: &MonthlyStipend) -> StipendResult<i64> {
        let changed = self.conn.execute(
            "UPDATE monthly_stipend SET
                base_stipend_amount = ?1, actual_credits_earned = ?2, prorated_credits = ?3,
                credits_override = ?4, total_credits = ?5, incentive_amount = ?6,
                base_plus_incentive = ?7, elite_tier_bonus = ?8, retufin_pay = ?9,
                chabura_bonus_1 = ?10, chabura_bonus_2 = ?11, special_pay = ?12,
                missed_time_deduction = ?13, other_deductions = ?14, final_amount = ?15,
                payment_status = ?16, last_recalculated = ?17, version = version + 1
             WHERE id = ?18 AND version = ?19",
            params![
                decimal_text(s.base_stipend_amount),
                decimal_text(s.actual_credits_earned),
                decimal_text(s.prorated_credits),
                s.credits_override as i32,
                decimal_text(s.total_credits),
                decimal_text(s.incentive_amount),
                decimal_text(s.base_plus_incentive),
                decimal_text(s.elite_tier_bonus),
                decimal_text(s.retufin_pay),
                decimal_text(s.chabura_bonus_1),
                decimal_text(s.chabura_bonus_2),
                decimal_text(s.special_pay),
                decimal_text(s.missed_time_deduction),
                decimal_text(s.other_deductions),
                decimal_text(s.final_amount),
                s.payment_status.as_str(),
                s.last_recalculated,
                s.id,
                s.version,
            ],
        )?;
        if changed == 1 {
            return Ok(s.version + 1);
        }

        let current: Option<i64> = self
            .conn
            .query_row(
                "SELECT version FROM monthly_stipend WHERE id = ?1",
                params![s.id],
                |row| row.get(0),
            )
            .optional()?;
        match current {
            Some(actual) => Err(StipendError::VersionConflict {
                id: s.id,
                expected: s.version,
                actual,
            }),
            None => Err(StipendError::StipendNotFound { id: s.id }),
        }
    }

    pub fn stipend(&self, id: StipendId) -> StipendResult<Option<MonthlyStipend>> {
        let sql = format!("SELECT {STIPEND_COLUMNS} FROM monthly_stipend s WHERE s.id = ?1");
        let stipend = self
            .conn
            .query_row(&sql, params![id], stipend_from_row)
            .optional()?;
        Ok(stipend)
    }

    pub fn stipend_for(&self, student_id: StudentId, period: Period) -> StipendResult<Option<MonthlyStipend>> {
        let sql = format!(
            "SELECT {STIPEND_COLUMNS} FROM monthly_stipend s
             WHERE s.kollel_student_id = ?1 AND s.month = ?2 AND s.year = ?3"
        );
        let stipend = self
            .conn
            .query_row(&sql, params![student_id, period.month, period.year], stipend_from_row)
            .optional()?;
        Ok(stipend)
    }

    /// Stipends for a period. With `active_only`, rows of deactivated students are excluded.
    pub fn stipends_for_period(&self, period: Period, active_only: bool) -> StipendResult<Vec<MonthlyStipend>> {
        let sql = format!(
            "SELECT {STIPEND_COLUMNS} FROM monthly_stipend s
             JOIN kollel_student k ON k.id = s.kollel_student_id
             WHERE s.month = ?1 AND s.year = ?2 AND (?3 = 0 OR k.active = 1)
             ORDER BY k.name, s.id"
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt.query_map(
            params![period.month, period.year, active_only as i32],
            stipend_from_row,
        )?;
        rows.collect::<Result<Vec<_>, _>>().map_err(Into::into)
    }
}

fn stipend_from_row(row: &Row<'_>) -> rusqlite::Result<MonthlyStipend> {
    let status: String = row.get(19)?;
    let payment_status = status
        .parse::<PaymentStatus>()
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(19, Type::Text, Box::new(e)))?;
    Ok(MonthlyStipend {
        id:                    row.get(0)?,
        kollel_student_id:     row.get(1)?,
        period: Period {
            month: row.get(2)?,
            year:  row.get(3)?,
        },
        base_stipend_amount:   decimal_at(row, 4)?,
        actual_credits_earned: decimal_at(row, 5)?,
        prorated_credits:      decimal_at(row, 6)?,
        credits_override:      row.get::<_, i32>(7)? != 0,
        total_credits:         decimal_at(row, 8)?,
        incentive_amount:      decimal_at(row, 9)?,
        base_plus_incentive:   decimal_at(row, 10)?,
        elite_tier_bonus:      decimal_at(row, 11)?,
        retufin_pay:           decimal_at(row, 12)?,
        chabura_bonus_1:       decimal_at(row, 13)?,
        chabura_bonus_2:       decimal_at(row, 14)?,
        special_pay:           decimal_at(row, 15)?,
        missed_time_deduction: decimal_at(row, 16)?,
        other_deductions:      decimal_at(row, 17)?,
        final_amount:          decimal_at(row, 18)?,
        payment_status,
        last_recalculated:     row.get(20)?,
        version:               row.get(21)?,
    })
}

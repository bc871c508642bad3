//! Store methods for academic years and break periods.

use super::KollelStore;
use crate::{
    break_calendar::{AcademicYear, KollelBreakCredit},
    error::StipendResult,
    types::AcademicYearId,
};
use chrono::NaiveDate;
use rusqlite::{params, OptionalExtension, Row};

impl KollelStore {
    // ── Academic year ─────────────────────────────────────────────

    pub fn insert_academic_year(
        &self,
        name:       &str,
        start_year: i32,
        start_date: NaiveDate,
        end_date:   NaiveDate,
    ) -> StipendResult<AcademicYearId> {
        self.conn.execute(
            "INSERT INTO academic_year (name, start_year, start_date, end_date)
             VALUES (?1, ?2, ?3, ?4)",
            params![name, start_year, start_date, end_date],
        )?;
        Ok(self.conn.last_insert_rowid())
    }

    pub fn academic_year_by_start_year(&self, start_year: i32) -> StipendResult<Option<AcademicYear>> {
        let year = self
            .conn
            .query_row(
                "SELECT id, name, start_year, start_date, end_date
                 FROM academic_year WHERE start_year = ?1",
                params![start_year],
                academic_year_from_row,
            )
            .optional()?;
        Ok(year)
    }

    // ── Break periods ─────────────────────────────────────────────

    pub fn insert_break_credit(
        &self,
        academic_year_id: AcademicYearId,
        name:             &str,
        start_date:       NaiveDate,
        end_date:         NaiveDate,
    ) -> StipendResult<i64> {
        self.conn.execute(
            "INSERT INTO kollel_break_credit (academic_year_id, name, start_date, end_date, active)
             VALUES (?1, ?2, ?3, ?4, 1)",
            params![academic_year_id, name, start_date, end_date],
        )?;
        Ok(self.conn.last_insert_rowid())
    }

    pub fn set_break_credit_active(&self, id: i64, active: bool) -> StipendResult<bool> {
        let changed = self.conn.execute(
            "UPDATE kollel_break_credit SET active = ?1 WHERE id = ?2",
            params![active as i32, id],
        )?;
        Ok(changed == 1)
    }

    pub fn active_break_credits(&self, academic_year_id: AcademicYearId) -> StipendResult<Vec<KollelBreakCredit>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, academic_year_id, name, start_date, end_date, active
             FROM kollel_break_credit
             WHERE academic_year_id = ?1 AND active = 1
             ORDER BY start_date, id",
        )?;
        let rows = stmt.query_map(params![academic_year_id], |row| {
            Ok(KollelBreakCredit {
                id:               row.get(0)?,
                academic_year_id: row.get(1)?,
                name:             row.get(2)?,
                start_date:       row.get(3)?,
                end_date:         row.get(4)?,
                active:           row.get::<_, i32>(5)? != 0,
            })
        })?;
        rows.collect::<Result<Vec<_>, _>>().map_err(Into::into)
    }
}

fn academic_year_from_row(row: &Row<'_>) -> rusqlite::Result<AcademicYear> {
    Ok(AcademicYear {
        id:         row.get(0)?,
        name:       row.get(1)?,
        start_year: row.get(2)?,
        start_date: row.get(3)?,
        end_date:   row.get(4)?,
    })
}

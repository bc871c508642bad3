//! Store methods for kollel enrollment.

use super::{decimal_at, decimal_text, KollelStore};
use crate::{
    enrollment::{KollelStudent, NewKollelStudent},
    error::StipendResult,
    types::StudentId,
};
use chrono::NaiveDate;
use rusqlite::{params, OptionalExtension, Row};

const STUDENT_COLUMNS: &str =
    "id, student_ref, name, base_stipend_amount, is_elite, active, join_date, leave_date";

impl KollelStore {
    // ── Kollel student ────────────────────────────────────────────

    pub fn insert_student(&self, s: &NewKollelStudent) -> StipendResult<StudentId> {
        self.conn.execute(
            "INSERT INTO kollel_student (student_ref, name, base_stipend_amount, is_elite, active, join_date)
             VALUES (?1, ?2, ?3, ?4, 1, ?5)",
            params![
                s.student_ref,
                s.name,
                decimal_text(s.base_stipend_amount),
                s.is_elite as i32,
                s.join_date,
            ],
        )?;
        Ok(self.conn.last_insert_rowid())
    }

    pub fn student(&self, id: StudentId) -> StipendResult<Option<KollelStudent>> {
        let sql = format!("SELECT {STUDENT_COLUMNS} FROM kollel_student WHERE id = ?1");
        let student = self
            .conn
            .query_row(&sql, params![id], student_from_row)
            .optional()?;
        Ok(student)
    }

    /// Id of the active enrollment for an underlying student, if any.
    pub fn active_enrollment_for(&self, student_ref: &str) -> StipendResult<Option<StudentId>> {
        let id = self
            .conn
            .query_row(
                "SELECT id FROM kollel_student WHERE student_ref = ?1 AND active = 1",
                params![student_ref],
                |row| row.get(0),
            )
            .optional()?;
        Ok(id)
    }

    pub fn active_students(&self) -> StipendResult<Vec<KollelStudent>> {
        let sql = format!(
            "SELECT {STUDENT_COLUMNS} FROM kollel_student WHERE active = 1 ORDER BY name, id"
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt.query_map([], student_from_row)?;
        rows.collect::<Result<Vec<_>, _>>().map_err(Into::into)
    }

    /// Mark an enrollment inactive. Returns false if it was not active.
    pub fn deactivate_student(&self, id: StudentId, leave_date: NaiveDate) -> StipendResult<bool> {
        let changed = self.conn.execute(
            "UPDATE kollel_student SET active = 0, leave_date = ?1 WHERE id = ?2 AND active = 1",
            params![leave_date, id],
        )?;
        Ok(changed == 1)
    }
}

fn student_from_row(row: &Row<'_>) -> rusqlite::Result<KollelStudent> {
    Ok(KollelStudent {
        id:                  row.get(0)?,
        student_ref:         row.get(1)?,
        name:                row.get(2)?,
        base_stipend_amount: decimal_at(row, 3)?,
        is_elite:            row.get::<_, i32>(4)? != 0,
        active:              row.get::<_, i32>(5)? != 0,
        join_date:           row.get(6)?,
        leave_date:          row.get(7)?,
    })
}

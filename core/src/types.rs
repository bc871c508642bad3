//! Shared primitive types used across the stipend engine.

use crate::error::{StipendError, StipendResult};
use chrono::{Datelike, NaiveDate};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Row id of a `kollel_student` record.
pub type StudentId = i64;

/// Row id of a `monthly_stipend` record.
pub type StipendId = i64;

/// Row id of an `academic_year` record.
pub type AcademicYearId = i64;

/// One calendar month of one calendar year. The unit of pay.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Period {
    pub year:  i32,
    pub month: u32,
}

impl Period {
    pub fn new(month: u32, year: i32) -> StipendResult<Self> {
        if !(1..=12).contains(&month) || !(1..=9999).contains(&year) {
            return Err(StipendError::InvalidPeriod { month, year });
        }
        Ok(Self { year, month })
    }

    /// The period containing `date`.
    pub fn containing(date: NaiveDate) -> Self {
        Self { year: date.year(), month: date.month() }
    }

    /// The calendar month before this one. January wraps to December of the prior year.
    pub fn previous(self) -> Self {
        if self.month == 1 {
            Self { year: self.year - 1, month: 12 }
        } else {
            Self { year: self.year, month: self.month - 1 }
        }
    }

    pub fn first_day(self) -> NaiveDate {
        NaiveDate::from_ymd_opt(self.year, self.month, 1)
            .unwrap_or(NaiveDate::MIN)
    }

    pub fn last_day(self) -> NaiveDate {
        let next_first = if self.month == 12 {
            NaiveDate::from_ymd_opt(self.year + 1, 1, 1)
        } else {
            NaiveDate::from_ymd_opt(self.year, self.month + 1, 1)
        };
        next_first
            .and_then(|d| d.pred_opt())
            .unwrap_or(NaiveDate::MAX)
    }

    pub fn days_in_month(self) -> i64 {
        (self.last_day() - self.first_day()).num_days() + 1
    }
}

impl fmt::Display for Period {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:04}-{:02}", self.year, self.month)
    }
}

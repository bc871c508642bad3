//! Break calendar: academic years and institutional break periods.
//!
//! Break days in a month are the sum of each active break's overlap with
//! the month, clipped to the month boundaries. Breaks that overlap each
//! other are counted once per break; payroll history already reflects
//! that, so it is reported but not corrected.

use crate::types::{AcademicYearId, Period};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AcademicYear {
    pub id:         AcademicYearId,
    pub name:       String,
    /// Calendar year in which this school year begins.
    pub start_year: i32,
    pub start_date: NaiveDate,
    pub end_date:   NaiveDate,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct KollelBreakCredit {
    pub id:               i64,
    pub academic_year_id: AcademicYearId,
    pub name:             String,
    pub start_date:       NaiveDate,
    pub end_date:         NaiveDate,
    pub active:           bool,
}

impl KollelBreakCredit {
    /// Days of this break falling inside `period`, zero if disjoint.
    pub fn overlap_days(&self, period: Period) -> i64 {
        let start = self.start_date.max(period.first_day());
        let end = self.end_date.min(period.last_day());
        if start > end {
            0
        } else {
            (end - start).num_days() + 1
        }
    }
}

/// Calendar year in which the school year covering `period` began.
/// Months before `start_month` belong to the school year that started the year before.
pub fn school_year_start(period: Period, start_month: u32) -> i32 {
    if period.month >= start_month {
        period.year
    } else {
        period.year - 1
    }
}

/// Total break days in `period` across all active `breaks`.
pub fn break_days_in_month(period: Period, breaks: &[KollelBreakCredit]) -> i64 {
    let active: Vec<&KollelBreakCredit> = breaks.iter().filter(|b| b.active).collect();

    for (i, a) in active.iter().enumerate() {
        for b in &active[i + 1..] {
            let start = a.start_date.max(b.start_date).max(period.first_day());
            let end = a.end_date.min(b.end_date).min(period.last_day());
            if start <= end {
                log::warn!(
                    "{period}: breaks '{}' and '{}' overlap ({start}..={end}); overlapping days are counted twice",
                    a.name,
                    b.name,
                );
            }
        }
    }

    active.iter().map(|b| b.overlap_days(period)).sum()
}

/// Learning days in `period`: month length minus break days, never negative.
pub fn non_break_days_in_month(period: Period, breaks: &[KollelBreakCredit]) -> i64 {
    (period.days_in_month() - break_days_in_month(period, breaks)).max(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn brk(name: &str, start: NaiveDate, end: NaiveDate) -> KollelBreakCredit {
        KollelBreakCredit {
            id: 0,
            academic_year_id: 1,
            name: name.into(),
            start_date: start,
            end_date: end,
            active: true,
        }
    }

    #[test]
    fn school_year_rolls_back_before_start_month() {
        assert_eq!(school_year_start(Period::new(7, 2025).unwrap(), 8), 2024);
        assert_eq!(school_year_start(Period::new(8, 2025).unwrap(), 8), 2025);
        assert_eq!(school_year_start(Period::new(12, 2025).unwrap(), 8), 2025);
    }

    #[test]
    fn overlapping_breaks_are_summed() {
        let breaks = vec![
            brk("a", date(2024, 4, 10), date(2024, 4, 20)),
            brk("b", date(2024, 4, 15), date(2024, 4, 25)),
        ];
        let april = Period::new(4, 2024).unwrap();
        assert_eq!(break_days_in_month(april, &breaks), 11 + 11);
        assert_eq!(non_break_days_in_month(april, &breaks), 30 - 22);
    }

    #[test]
    fn non_break_days_clamp_at_zero() {
        let breaks = vec![
            brk("a", date(2024, 2, 1), date(2024, 2, 29)),
            brk("b", date(2024, 2, 1), date(2024, 2, 29)),
        ];
        let feb = Period::new(2, 2024).unwrap();
        assert_eq!(break_days_in_month(feb, &breaks), 58);
        assert_eq!(non_break_days_in_month(feb, &breaks), 0);
    }

    #[test]
    fn inactive_breaks_are_ignored() {
        let mut b = brk("a", date(2024, 4, 1), date(2024, 4, 5));
        b.active = false;
        assert_eq!(break_days_in_month(Period::new(4, 2024).unwrap(), &[b]), 0);
    }
}

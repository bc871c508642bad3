//! Pay history lookup: the contiguous trailing run of stipend records
//! that forms the basis for break proration.

use crate::{error::StipendResult, stipend::MonthlyStipend, types::Period};
use serde::Serialize;

#[derive(Debug, Clone, Serialize)]
pub struct PayPeriodEntry {
    pub period:  Period,
    pub stipend: MonthlyStipend,
}

/// Walk backward from the month before `current`, collecting at most `n`
/// stipend records. Stops at the first month without a record: a gap means
/// the student was not enrolled that far back, so older rows never count.
pub fn last_n_pay_periods<F>(current: Period, n: usize, mut lookup: F) -> StipendResult<Vec<PayPeriodEntry>>
where
    F: FnMut(Period) -> StipendResult<Option<MonthlyStipend>>,
{
    let mut entries = Vec::with_capacity(n);
    let mut period = current;
    while entries.len() < n {
        period = period.previous();
        match lookup(period)? {
            Some(stipend) => entries.push(PayPeriodEntry { period, stipend }),
            None => break,
        }
    }
    Ok(entries)
}

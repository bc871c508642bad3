//! Monthly stipend record and calculator.
//!
//! The calculator is a pure function of the record's raw inputs:
//!   total credits  -> tiered incentive
//!   base+incentive -> capped by base-pay class
//!   capped sum + flat bonuses - deductions -> final amount
//!
//! All arithmetic is exact decimal. No rounding happens until the
//! prorated credits are truncated for payout.

use crate::{
    config::{BonusRules, StipendRules},
    error::{StipendError, StipendResult},
    types::{Period, StipendId, StudentId},
};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::{fmt, str::FromStr};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum PaymentStatus {
    Pending,
    Approved,
    Paid,
    OnHold,
}

impl PaymentStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            PaymentStatus::Pending  => "pending",
            PaymentStatus::Approved => "approved",
            PaymentStatus::Paid     => "paid",
            PaymentStatus::OnHold   => "on_hold",
        }
    }
}

impl fmt::Display for PaymentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PaymentStatus {
    type Err = StipendError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending"  => Ok(PaymentStatus::Pending),
            "approved" => Ok(PaymentStatus::Approved),
            "paid"     => Ok(PaymentStatus::Paid),
            "on_hold"  => Ok(PaymentStatus::OnHold),
            other => Err(StipendError::InvalidInput {
                field: "payment_status",
                reason: format!("unknown status '{other}'"),
            }),
        }
    }
}

/// One student's stipend for one calendar month.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MonthlyStipend {
    pub id:                    StipendId,
    pub kollel_student_id:     StudentId,
    pub period:                Period,
    pub base_stipend_amount:   Decimal,
    pub actual_credits_earned: Decimal,
    pub prorated_credits:      Decimal,
    /// Set when an admin entered prorated credits by hand. Proration never touches these rows.
    pub credits_override:      bool,
    pub total_credits:         Decimal,
    pub incentive_amount:      Decimal,
    pub base_plus_incentive:   Decimal,
    pub elite_tier_bonus:      Decimal,
    pub retufin_pay:           Decimal,
    pub chabura_bonus_1:       Decimal,
    pub chabura_bonus_2:       Decimal,
    pub special_pay:           Decimal,
    pub missed_time_deduction: Decimal,
    pub other_deductions:      Decimal,
    pub final_amount:          Decimal,
    pub payment_status:        PaymentStatus,
    pub last_recalculated:     Option<DateTime<Utc>>,
    /// Optimistic concurrency token, bumped on every write.
    pub version:               i64,
}

impl MonthlyStipend {
    /// A fresh, unsaved record with every amount at zero.
    pub fn blank(kollel_student_id: StudentId, period: Period, base_stipend_amount: Decimal) -> Self {
        Self {
            id: 0,
            kollel_student_id,
            period,
            base_stipend_amount,
            actual_credits_earned: Decimal::ZERO,
            prorated_credits:      Decimal::ZERO,
            credits_override:      false,
            total_credits:         Decimal::ZERO,
            incentive_amount:      Decimal::ZERO,
            base_plus_incentive:   Decimal::ZERO,
            elite_tier_bonus:      Decimal::ZERO,
            retufin_pay:           Decimal::ZERO,
            chabura_bonus_1:       Decimal::ZERO,
            chabura_bonus_2:       Decimal::ZERO,
            special_pay:           Decimal::ZERO,
            missed_time_deduction: Decimal::ZERO,
            other_deductions:      Decimal::ZERO,
            final_amount:          Decimal::ZERO,
            payment_status:        PaymentStatus::Pending,
            last_recalculated:     None,
            version:               0,
        }
    }

    /// Credits that generate pay: fractional prorated credits are not paid.
    pub fn payable_credits(&self) -> StipendResult<Decimal> {
        self.actual_credits_earned
            .checked_add(self.prorated_credits.trunc())
            .ok_or_else(|| out_of_range("total_credits"))
    }

    fn raw_inputs(&self) -> [(&'static str, Decimal); 10] {
        [
            ("base_stipend_amount",   self.base_stipend_amount),
            ("actual_credits_earned", self.actual_credits_earned),
            ("prorated_credits",      self.prorated_credits),
            ("elite_tier_bonus",      self.elite_tier_bonus),
            ("retufin_pay",           self.retufin_pay),
            ("chabura_bonus_1",       self.chabura_bonus_1),
            ("chabura_bonus_2",       self.chabura_bonus_2),
            ("special_pay",           self.special_pay),
            ("missed_time_deduction", self.missed_time_deduction),
            ("other_deductions",      self.other_deductions),
        ]
    }
}

/// A typed admin edit. Absent fields are left as they are.
///
/// Chabura bonuses may be given either as a session count (converted with
/// the configured per-session rate) or as a ready amount, not both.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct StipendUpdate {
    pub actual_credits_earned: Option<Decimal>,
    /// Entering prorated credits by hand also sets the override flag,
    /// unless `credits_override` is given explicitly.
    pub prorated_credits:      Option<Decimal>,
    pub credits_override:      Option<bool>,
    pub base_stipend_amount:   Option<Decimal>,
    pub elite_tier_bonus:      Option<Decimal>,
    pub retufin_pay:           Option<Decimal>,
    pub chabura_1_count:       Option<u32>,
    pub chabura_2_count:       Option<u32>,
    pub chabura_bonus_1:       Option<Decimal>,
    pub chabura_bonus_2:       Option<Decimal>,
    pub special_pay:           Option<Decimal>,
    pub missed_time_deduction: Option<Decimal>,
    pub other_deductions:      Option<Decimal>,
    pub payment_status:        Option<PaymentStatus>,
}

impl StipendUpdate {
    /// Check every supplied value before anything is written.
    pub fn validate(&self) -> StipendResult<()> {
        let amounts = [
            ("actual_credits_earned", self.actual_credits_earned),
            ("prorated_credits",      self.prorated_credits),
            ("base_stipend_amount",   self.base_stipend_amount),
            ("elite_tier_bonus",      self.elite_tier_bonus),
            ("retufin_pay",           self.retufin_pay),
            ("chabura_bonus_1",       self.chabura_bonus_1),
            ("chabura_bonus_2",       self.chabura_bonus_2),
            ("special_pay",           self.special_pay),
            ("missed_time_deduction", self.missed_time_deduction),
            ("other_deductions",      self.other_deductions),
        ];
        for (field, value) in amounts {
            if let Some(v) = value {
                if v < Decimal::ZERO {
                    return Err(StipendError::InvalidInput {
                        field,
                        reason: format!("must not be negative, got {v}"),
                    });
                }
            }
        }
        if self.chabura_1_count.is_some() && self.chabura_bonus_1.is_some() {
            return Err(StipendError::InvalidInput {
                field: "chabura_bonus_1",
                reason: "give either a session count or an amount, not both".into(),
            });
        }
        if self.chabura_2_count.is_some() && self.chabura_bonus_2.is_some() {
            return Err(StipendError::InvalidInput {
                field: "chabura_bonus_2",
                reason: "give either a session count or an amount, not both".into(),
            });
        }
        Ok(())
    }

    /// Validate, then copy the supplied values onto `stipend`.
    /// Returns the names of the fields that were set.
    pub fn apply_to(&self, stipend: &mut MonthlyStipend, rules: &StipendRules) -> StipendResult<Vec<&'static str>> {
        self.validate()?;
        let chabura_1 = self.chabura_1_count.map(|n| chabura_amount(ChaburaKind::First, n, rules)).transpose()?;
        let chabura_2 = self.chabura_2_count.map(|n| chabura_amount(ChaburaKind::Second, n, rules)).transpose()?;
        let mut set = Vec::new();

        let mut assign = |field: &'static str, target: &mut Decimal, value: Option<Decimal>| {
            if let Some(v) = value {
                *target = v;
                set.push(field);
            }
        };
        assign("actual_credits_earned", &mut stipend.actual_credits_earned, self.actual_credits_earned);
        assign("prorated_credits",      &mut stipend.prorated_credits,      self.prorated_credits);
        assign("base_stipend_amount",   &mut stipend.base_stipend_amount,   self.base_stipend_amount);
        assign("elite_tier_bonus",      &mut stipend.elite_tier_bonus,      self.elite_tier_bonus);
        assign("retufin_pay",           &mut stipend.retufin_pay,           self.retufin_pay);
        assign("chabura_bonus_1",       &mut stipend.chabura_bonus_1,       self.chabura_bonus_1);
        assign("chabura_bonus_2",       &mut stipend.chabura_bonus_2,       self.chabura_bonus_2);
        assign("special_pay",           &mut stipend.special_pay,           self.special_pay);
        assign("missed_time_deduction", &mut stipend.missed_time_deduction, self.missed_time_deduction);
        assign("other_deductions",      &mut stipend.other_deductions,      self.other_deductions);
        assign("chabura_bonus_1",       &mut stipend.chabura_bonus_1,       chabura_1);
        assign("chabura_bonus_2",       &mut stipend.chabura_bonus_2,       chabura_2);

        match (self.credits_override, self.prorated_credits) {
            (Some(flag), _) => {
                stipend.credits_override = flag;
                set.push("credits_override");
            }
            (None, Some(_)) => {
                stipend.credits_override = true;
                set.push("credits_override");
            }
            (None, None) => {}
        }
        if let Some(status) = self.payment_status {
            stipend.payment_status = status;
            set.push("payment_status");
        }
        Ok(set)
    }
}

/// Tiered incentive: nothing below the threshold, a flat amount at it,
/// and a linear per-credit scale above it.
pub fn incentive_for(total_credits: Decimal, rules: &StipendRules) -> StipendResult<Decimal> {
    let tier = &rules.incentive;
    if total_credits < tier.credit_threshold {
        return Ok(Decimal::ZERO);
    }
    total_credits
        .checked_sub(tier.credit_threshold)
        .and_then(|above| above.checked_mul(tier.per_credit_above))
        .and_then(|scaled| scaled.checked_add(tier.threshold_amount))
        .ok_or_else(|| out_of_range("incentive_amount"))
}

/// Base + incentive, capped. Students without base pay are capped on incentive alone.
pub fn capped_base_plus_incentive(base: Decimal, incentive: Decimal, rules: &StipendRules) -> Decimal {
    if base.is_zero() {
        incentive.min(rules.caps.zero_base_cap)
    } else {
        // A sum too large to represent is above any cap.
        base.checked_add(incentive)
            .map_or(rules.caps.combined_cap, |sum| sum.min(rules.caps.combined_cap))
    }
}

pub(crate) fn out_of_range(field: &'static str) -> StipendError {
    StipendError::InvalidInput {
        field,
        reason: "amount is too large to compute".into(),
    }
}

fn checked_sum(field: &'static str, values: &[Decimal]) -> StipendResult<Decimal> {
    values
        .iter()
        .try_fold(Decimal::ZERO, |acc, v| acc.checked_add(*v))
        .ok_or_else(|| out_of_range(field))
}

/// Which of the two chabura bonus fields a session count feeds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChaburaKind {
    First,
    Second,
}

impl ChaburaKind {
    pub fn rate(self, bonuses: &BonusRules) -> Decimal {
        match self {
            ChaburaKind::First  => bonuses.chabura_1_rate,
            ChaburaKind::Second => bonuses.chabura_2_rate,
        }
    }
}

/// Bonus amount for `count` sessions of one chabura type.
pub fn chabura_amount(kind: ChaburaKind, count: u32, rules: &StipendRules) -> StipendResult<Decimal> {
    Decimal::from(count)
        .checked_mul(kind.rate(&rules.bonuses))
        .ok_or_else(|| out_of_range("chabura_bonus"))
}

/// Derive every computed field of `stipend` from its raw inputs.
///
/// Fails with `InvalidInput` (leaving the record untouched) if any raw
/// input is negative or a derived amount overflows.
pub fn recompute(
    stipend: &mut MonthlyStipend,
    rules:   &StipendRules,
    now:     DateTime<Utc>,
) -> StipendResult<()> {
    for (field, value) in stipend.raw_inputs() {
        if value < Decimal::ZERO {
            return Err(StipendError::InvalidInput {
                field,
                reason: format!("must not be negative, got {value}"),
            });
        }
    }

    let total_credits = checked_sum("total_credits", &[stipend.actual_credits_earned, stipend.prorated_credits])?;
    let incentive_amount = incentive_for(stipend.payable_credits()?, rules)?;
    let base_plus_incentive =
        capped_base_plus_incentive(stipend.base_stipend_amount, incentive_amount, rules);

    let additions = checked_sum(
        "final_amount",
        &[
            base_plus_incentive,
            stipend.elite_tier_bonus,
            stipend.retufin_pay,
            stipend.chabura_bonus_1,
            stipend.chabura_bonus_2,
            stipend.special_pay,
        ],
    )?;
    let deductions = checked_sum(
        "final_amount",
        &[stipend.missed_time_deduction, stipend.other_deductions],
    )?;
    let final_amount = additions
        .checked_sub(deductions)
        .ok_or_else(|| out_of_range("final_amount"))?;

    stipend.total_credits = total_credits;
    stipend.incentive_amount = incentive_amount;
    stipend.base_plus_incentive = base_plus_incentive;
    stipend.final_amount = final_amount;
    stipend.last_recalculated = Some(now);

    log::debug!(
        "stipend {} ({}) credits={} incentive={} capped={} final={}",
        stipend.id,
        stipend.period,
        stipend.total_credits,
        stipend.incentive_amount,
        stipend.base_plus_incentive,
        stipend.final_amount,
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn rules() -> StipendRules {
        StipendRules::default_rules()
    }

    #[test]
    fn incentive_tiers() {
        let r = rules();
        assert_eq!(incentive_for(dec!(0), &r).unwrap(), dec!(0));
        assert_eq!(incentive_for(dec!(9.99), &r).unwrap(), dec!(0));
        assert_eq!(incentive_for(dec!(10), &r).unwrap(), dec!(200));
        assert_eq!(incentive_for(dec!(10.4), &r).unwrap(), dec!(210));
        assert_eq!(incentive_for(dec!(20), &r).unwrap(), dec!(450));
    }

    #[test]
    fn incentive_is_monotonic() {
        let r = rules();
        let mut prev = Decimal::ZERO;
        for tenths in 0..=400 {
            let credits = Decimal::new(tenths, 1);
            let current = incentive_for(credits, &r).unwrap();
            assert!(current >= prev, "incentive dropped at {credits}: {prev} -> {current}");
            prev = current;
        }
    }

    #[test]
    fn caps_depend_on_base_pay() {
        let r = rules();
        assert_eq!(capped_base_plus_incentive(dec!(0), dec!(600), &r), dec!(500));
        assert_eq!(capped_base_plus_incentive(dec!(900), dec!(300), &r), dec!(1000));
        assert_eq!(capped_base_plus_incentive(dec!(400), dec!(100), &r), dec!(500));
    }

    #[test]
    fn chabura_counts_use_distinct_rates() {
        let r = rules();
        assert_eq!(chabura_amount(ChaburaKind::First, 3, &r).unwrap(), dec!(75));
        assert_eq!(chabura_amount(ChaburaKind::Second, 3, &r).unwrap(), dec!(150));
    }

    #[test]
    fn manual_prorated_credits_set_override() {
        let r = rules();
        let mut s = MonthlyStipend::blank(1, Period::new(1, 2025).unwrap(), dec!(400));
        let update = StipendUpdate {
            prorated_credits: Some(dec!(3)),
            chabura_2_count: Some(2),
            ..Default::default()
        };
        let fields = update.apply_to(&mut s, &r).unwrap();
        assert!(s.credits_override);
        assert_eq!(s.chabura_bonus_2, dec!(100));
        assert!(fields.contains(&"credits_override"));
    }

    #[test]
    fn negative_edit_is_rejected_before_mutation() {
        let r = rules();
        let mut s = MonthlyStipend::blank(1, Period::new(1, 2025).unwrap(), dec!(400));
        let before = s.clone();
        let update = StipendUpdate {
            actual_credits_earned: Some(dec!(12)),
            other_deductions: Some(dec!(-5)),
            ..Default::default()
        };
        assert!(matches!(
            update.apply_to(&mut s, &r),
            Err(StipendError::InvalidInput { field: "other_deductions", .. })
        ));
        assert_eq!(s, before);
    }

    #[test]
    fn overflowing_amounts_fail_without_touching_the_record() {
        let r = rules();
        let mut s = MonthlyStipend::blank(1, Period::new(1, 2025).unwrap(), dec!(400));
        s.actual_credits_earned = Decimal::MAX / dec!(10);
        let before = s.clone();
        assert!(matches!(
            recompute(&mut s, &r, Utc::now()),
            Err(StipendError::InvalidInput { field: "incentive_amount", .. })
        ));
        assert_eq!(s, before);

        let mut s = MonthlyStipend::blank(1, Period::new(1, 2025).unwrap(), dec!(400));
        s.special_pay = Decimal::MAX;
        s.retufin_pay = Decimal::MAX;
        assert!(matches!(
            recompute(&mut s, &r, Utc::now()),
            Err(StipendError::InvalidInput { field: "final_amount", .. })
        ));
        assert_eq!(capped_base_plus_incentive(Decimal::MAX, Decimal::MAX, &r), dec!(1000));
    }

    #[test]
    fn payment_status_round_trips_through_text() {
        for status in [PaymentStatus::Pending, PaymentStatus::Approved, PaymentStatus::Paid, PaymentStatus::OnHold] {
            assert_eq!(status.as_str().parse::<PaymentStatus>().unwrap(), status);
        }
        assert!("refunded".parse::<PaymentStatus>().is_err());
    }
}

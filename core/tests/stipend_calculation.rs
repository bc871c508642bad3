//! Stipend calculator tests: incentive tiers and caps.

use chrono::NaiveDate;
use kollel_core::{
    engine::KollelEngine,
    enrollment::{KollelStudent, NewKollelStudent},
    error::StipendError,
    stipend::StipendUpdate,
    types::Period,
};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;

fn build() -> KollelEngine {
    KollelEngine::build_test().expect("build test engine")
}

fn enroll(engine: &KollelEngine, student_ref: &str, base: Decimal, is_elite: bool) -> KollelStudent {
    engine
        .enroll_student(NewKollelStudent {
            student_ref: student_ref.into(),
            name: format!("Student {student_ref}"),
            base_stipend_amount: base,
            is_elite,
            join_date: NaiveDate::from_ymd_opt(2024, 9, 1).unwrap(),
        })
        .expect("enroll student")
}

fn period(month: u32, year: i32) -> Period {
    Period::new(month, year).unwrap()
}

/// The worked example: every additive field and one deduction.
#[test]
fn final_amount_sums_every_component() {
    let engine = build();
    let student = enroll(&engine, "S-1", dec!(300), true);
    let row = engine.ensure_monthly_stipend(student.id, period(11, 2024)).unwrap();
    assert_eq!(row.elite_tier_bonus, dec!(1000), "elite bonus seeded from the student flag");

    let update = StipendUpdate {
        actual_credits_earned: Some(dec!(10)),
        retufin_pay: Some(dec!(50)),
        chabura_1_count: Some(1),
        chabura_2_count: Some(2),
        other_deductions: Some(dec!(20)),
        ..Default::default()
    };
    let row = engine.update_stipend(row.id, &update, row.version).unwrap();

    assert_eq!(row.incentive_amount, dec!(200));
    assert_eq!(row.base_plus_incentive, dec!(500));
    assert_eq!(row.chabura_bonus_1, dec!(25));
    assert_eq!(row.chabura_bonus_2, dec!(100));
    assert_eq!(row.final_amount, dec!(1655));
}

#[test]
fn zero_base_students_are_capped_on_incentive() {
    let engine = build();
    let student = enroll(&engine, "S-2", dec!(0), false);
    let row = engine.ensure_monthly_stipend(student.id, period(11, 2024)).unwrap();

    // 26 credits -> 200 + 16 × 25 = 600 incentive, capped at 500.
    let update = StipendUpdate { actual_credits_earned: Some(dec!(26)), ..Default::default() };
    let row = engine.update_stipend(row.id, &update, row.version).unwrap();

    assert_eq!(row.incentive_amount, dec!(600));
    assert_eq!(row.base_plus_incentive, dec!(500));
    assert_eq!(row.final_amount, dec!(500));
}

#[test]
fn combined_cap_applies_to_base_and_incentive() {
    let engine = build();
    let student = enroll(&engine, "S-3", dec!(900), false);
    let row = engine.ensure_monthly_stipend(student.id, period(11, 2024)).unwrap();

    // 14 credits -> 300 incentive; 900 + 300 capped at 1000.
    let update = StipendUpdate { actual_credits_earned: Some(dec!(14)), ..Default::default() };
    let row = engine.update_stipend(row.id, &update, row.version).unwrap();

    assert_eq!(row.incentive_amount, dec!(300));
    assert_eq!(row.base_plus_incentive, dec!(1000));
}

#[test]
fn below_threshold_earns_base_only() {
    let engine = build();
    let student = enroll(&engine, "S-4", dec!(400), false);
    let row = engine.ensure_monthly_stipend(student.id, period(11, 2024)).unwrap();

    let update = StipendUpdate { actual_credits_earned: Some(dec!(9.5)), ..Default::default() };
    let row = engine.update_stipend(row.id, &update, row.version).unwrap();

    assert_eq!(row.total_credits, dec!(9.5));
    assert_eq!(row.incentive_amount, dec!(0));
    assert_eq!(row.final_amount, dec!(400));
}

#[test]
fn fractional_actual_credits_scale_above_threshold() {
    let engine = build();
    let student = enroll(&engine, "S-5", dec!(100), false);
    let row = engine.ensure_monthly_stipend(student.id, period(11, 2024)).unwrap();

    let update = StipendUpdate { actual_credits_earned: Some(dec!(10.4)), ..Default::default() };
    let row = engine.update_stipend(row.id, &update, row.version).unwrap();

    assert_eq!(row.incentive_amount, dec!(210));
    assert_eq!(row.final_amount, dec!(310));
}

/// Fractional prorated credits count toward total credits but are not paid.
#[test]
fn fractional_prorated_credits_are_not_paid() {
    let engine = build();
    let student = enroll(&engine, "S-6", dec!(100), false);
    let row = engine.ensure_monthly_stipend(student.id, period(11, 2024)).unwrap();

    let update = StipendUpdate {
        actual_credits_earned: Some(dec!(8)),
        prorated_credits: Some(dec!(2.75)),
        ..Default::default()
    };
    let row = engine.update_stipend(row.id, &update, row.version).unwrap();

    assert_eq!(row.total_credits, dec!(10.75));
    assert_eq!(row.incentive_amount, dec!(200), "only 8 + 2 credits are payable");
}

#[test]
fn recompute_is_idempotent() {
    let engine = build();
    let student = enroll(&engine, "S-7", dec!(350), true);
    let row = engine.ensure_monthly_stipend(student.id, period(11, 2024)).unwrap();
    let update = StipendUpdate {
        actual_credits_earned: Some(dec!(17.3)),
        special_pay: Some(dec!(75.25)),
        missed_time_deduction: Some(dec!(12.10)),
        ..Default::default()
    };
    engine.update_stipend(row.id, &update, row.version).unwrap();

    let first = engine.recompute_stipend(row.id).unwrap();
    let second = engine.recompute_stipend(row.id).unwrap();

    assert_eq!(first.total_credits, second.total_credits);
    assert_eq!(first.incentive_amount, second.incentive_amount);
    assert_eq!(first.base_plus_incentive, second.base_plus_incentive);
    assert_eq!(first.final_amount, second.final_amount);
    assert_eq!(second.version, first.version + 1);
}

/// Repeated store round-trips must not drift by a single cent.
#[test]
fn decimal_amounts_survive_round_trips_exactly() {
    let engine = build();
    let student = enroll(&engine, "S-8", dec!(333.33), false);
    let row = engine.ensure_monthly_stipend(student.id, period(11, 2024)).unwrap();
    let update = StipendUpdate {
        actual_credits_earned: Some(dec!(11.1)),
        retufin_pay: Some(dec!(0.1)),
        special_pay: Some(dec!(0.2)),
        ..Default::default()
    };
    let row = engine.update_stipend(row.id, &update, row.version).unwrap();
    let expected = dec!(333.33) + dec!(227.5) + dec!(0.3);
    assert_eq!(row.final_amount, expected);

    for _ in 0..20 {
        engine.recompute_stipend(row.id).unwrap();
    }
    assert_eq!(engine.stipend(row.id).unwrap().final_amount, expected);
}

#[test]
fn negative_inputs_are_rejected_without_writing() {
    let engine = build();
    let student = enroll(&engine, "S-9", dec!(400), false);
    let row = engine.ensure_monthly_stipend(student.id, period(11, 2024)).unwrap();

    let update = StipendUpdate { actual_credits_earned: Some(dec!(-1)), ..Default::default() };
    let err = engine.update_stipend(row.id, &update, row.version).unwrap_err();
    assert!(matches!(err, StipendError::InvalidInput { field: "actual_credits_earned", .. }));

    let stored = engine.stipend(row.id).unwrap();
    assert_eq!(stored.version, row.version);
    assert_eq!(stored.actual_credits_earned, dec!(0));
}

#[test]
fn chabura_count_and_amount_together_are_rejected() {
    let engine = build();
    let student = enroll(&engine, "S-10", dec!(400), false);
    let row = engine.ensure_monthly_stipend(student.id, period(11, 2024)).unwrap();

    let update = StipendUpdate {
        chabura_1_count: Some(3),
        chabura_bonus_1: Some(dec!(10)),
        ..Default::default()
    };
    assert!(matches!(
        engine.update_stipend(row.id, &update, row.version),
        Err(StipendError::InvalidInput { field: "chabura_bonus_1", .. })
    ));
}

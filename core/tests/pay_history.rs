//! Pay history tests: contiguous trailing windows.

use chrono::NaiveDate;
use kollel_core::{
    engine::KollelEngine,
    enrollment::{KollelStudent, NewKollelStudent},
    types::Period,
};
use rust_decimal_macros::dec;

fn build() -> KollelEngine {
    KollelEngine::build_test().expect("build test engine")
}

fn enroll(engine: &KollelEngine, student_ref: &str) -> KollelStudent {
    engine
        .enroll_student(NewKollelStudent {
            student_ref: student_ref.into(),
            name: student_ref.into(),
            base_stipend_amount: dec!(500),
            is_elite: false,
            join_date: NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(),
        })
        .expect("enroll student")
}

fn period(month: u32, year: i32) -> Period {
    Period::new(month, year).unwrap()
}

/// Records for M, M-1, M-2, a gap at M-3, and an older M-4.
fn gapped_history(engine: &KollelEngine, student: &KollelStudent) {
    for p in [period(6, 2024), period(5, 2024), period(4, 2024), period(2, 2024)] {
        engine.ensure_monthly_stipend(student.id, p).unwrap();
    }
}

#[test]
fn window_stops_at_first_gap() {
    let engine = build();
    let student = enroll(&engine, "H-1");
    gapped_history(&engine, &student);

    // Anchored at M: looks from M-1 backward, stops at the M-3 gap.
    let got = engine.last_n_pay_periods(student.id, period(6, 2024), 5).unwrap();
    let periods: Vec<Period> = got.iter().map(|e| e.period).collect();
    assert_eq!(periods, vec![period(5, 2024), period(4, 2024)]);

    // Anchored at M+1: M, M-1, M-2, never the older M-4.
    let got = engine.last_n_pay_periods(student.id, period(7, 2024), 5).unwrap();
    assert_eq!(got.len(), 3);
    assert!(got.iter().all(|e| e.period != period(2, 2024)));
}

#[test]
fn window_crosses_year_boundary() {
    let engine = build();
    let student = enroll(&engine, "H-2");
    for p in [period(10, 2024), period(11, 2024), period(12, 2024), period(1, 2025)] {
        engine.ensure_monthly_stipend(student.id, p).unwrap();
    }

    let got = engine.last_n_pay_periods(student.id, period(2, 2025), 5).unwrap();
    let periods: Vec<Period> = got.iter().map(|e| e.period).collect();
    assert_eq!(
        periods,
        vec![period(1, 2025), period(12, 2024), period(11, 2024), period(10, 2024)]
    );
}

#[test]
fn window_is_capped_at_n() {
    let engine = build();
    let student = enroll(&engine, "H-3");
    for month in 1..=9 {
        engine.ensure_monthly_stipend(student.id, period(month, 2024)).unwrap();
    }

    let got = engine.last_n_pay_periods(student.id, period(10, 2024), 5).unwrap();
    assert_eq!(got.len(), 5);
    assert_eq!(got[0].period, period(9, 2024));
    assert_eq!(got[4].period, period(5, 2024));
}

#[test]
fn history_is_per_student() {
    let engine = build();
    let a = enroll(&engine, "H-4");
    let b = enroll(&engine, "H-5");
    engine.ensure_monthly_stipend(a.id, period(3, 2024)).unwrap();

    assert_eq!(engine.last_n_pay_periods(a.id, period(4, 2024), 5).unwrap().len(), 1);
    assert!(engine.last_n_pay_periods(b.id, period(4, 2024), 5).unwrap().is_empty());
}

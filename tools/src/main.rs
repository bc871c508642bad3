//! stipend-runner: headless administration for the kollel stipend engine.
//!
//! Usage:
//!   stipend-runner --db kollel.db migrate
//!   stipend-runner --db kollel.db add-year --start-year 2024
//!   stipend-runner --db kollel.db add-break --year-id 1 --name Pesach --start 2025-04-11 --end 2025-04-20
//!   stipend-runner --db kollel.db enroll --ref S-100 --name "Levi Cohen" --base 600 [--elite]
//!   stipend-runner --db kollel.db edit --stipend-id 7 --version 2 --json '{"actual_credits_earned":"12"}'
//!   stipend-runner --db kollel.db dashboard    --month 4 --year 2025
//!   stipend-runner --db kollel.db apply-breaks --month 4 --year 2025
//!   stipend-runner --db kollel.db recompute    --month 4 --year 2025
//!   stipend-runner --db kollel.db summary      --month 4 --year 2025
//!
//! Every command prints its result as JSON on stdout.

use anyhow::{bail, Context, Result};
use chrono::{Datelike, NaiveDate, Utc};
use kollel_core::{
    config::StipendRules,
    engine::KollelEngine,
    enrollment::NewKollelStudent,
    stipend::StipendUpdate,
    store::KollelStore,
    types::Period,
};
use rust_decimal::Decimal;
use serde::Serialize;
use std::env;

const COMMANDS: &[&str] = &[
    "migrate",
    "add-year",
    "add-break",
    "enroll",
    "edit",
    "dashboard",
    "apply-breaks",
    "recompute",
    "summary",
];

fn main() -> Result<()> {
    env_logger::init();

    let args: Vec<String> = env::args().collect();
    let db = flag_value(&args, "--db").unwrap_or("kollel.db");
    let data_dir = flag_value(&args, "--data-dir").unwrap_or("./data");
    let Some(command) = args.iter().skip(1).find(|a| COMMANDS.contains(&a.as_str())) else {
        bail!("expected one of: {}", COMMANDS.join(", "));
    };

    let store = KollelStore::open(db).with_context(|| format!("opening {db}"))?;
    store.migrate()?;
    let rules = StipendRules::load(data_dir)?;
    let engine = KollelEngine::new(store, rules);
    log::debug!("stipend-runner: {command} on {db}");

    match command.as_str() {
        "migrate" => print_json(&serde_json::json!({ "migrated": db })),
        "add-year" => {
            let start_year: i32 = parse_arg(&args, "--start-year", Utc::now().year());
            let start_month = engine.rules().proration.school_year_start_month;
            let start = NaiveDate::from_ymd_opt(start_year, start_month, 1)
                .context("invalid school year start")?;
            let end = NaiveDate::from_ymd_opt(start_year + 1, start_month, 1)
                .and_then(|d| d.pred_opt())
                .context("invalid school year end")?;
            let name = format!("{start_year}-{}", start_year + 1);
            let id = engine.add_academic_year(&name, start_year, start, end)?;
            print_json(&serde_json::json!({ "academic_year_id": id, "name": name }))
        }
        "add-break" => {
            let year_id: i64 = required_id(&args, "--year-id")?;
            let name = required(&args, "--name")?;
            let start = parse_date(required(&args, "--start")?)?;
            let end = parse_date(required(&args, "--end")?)?;
            let id = engine.add_break_credit(year_id, name, start, end)?;
            print_json(&serde_json::json!({ "break_credit_id": id }))
        }
        "enroll" => {
            let base: Decimal = required(&args, "--base")?
                .parse()
                .context("--base must be a decimal amount")?;
            let student = engine.enroll_student(NewKollelStudent {
                student_ref: required(&args, "--ref")?.to_string(),
                name: required(&args, "--name")?.to_string(),
                base_stipend_amount: base,
                is_elite: args.iter().any(|a| a == "--elite"),
                join_date: Utc::now().date_naive(),
            })?;
            print_json(&student)
        }
        "edit" => {
            let stipend_id = required_id(&args, "--stipend-id")?;
            let version = required_id(&args, "--version")?;
            let update: StipendUpdate = serde_json::from_str(required(&args, "--json")?)
                .context("--json must be a stipend update object")?;
            print_json(&engine.update_stipend(stipend_id, &update, version)?)
        }
        "dashboard" => print_json(&engine.monthly_dashboard(period_arg(&args)?)?),
        "apply-breaks" => {
            let report = engine.apply_break_credits(period_arg(&args)?)?;
            if !report.success {
                log::warn!("{}", report.message);
            }
            print_json(&report)
        }
        "recompute" => {
            let period = period_arg(&args)?;
            let count = engine.recompute_period(period)?;
            print_json(&serde_json::json!({ "period": period.to_string(), "recomputed": count }))
        }
        "summary" => print_json(&engine.period_summary(period_arg(&args)?)?),
        other => bail!("unknown command: {other}"),
    }
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

/// `--month`/`--year`, defaulting to the current month.
fn period_arg(args: &[String]) -> Result<Period> {
    let today = Utc::now().date_naive();
    let month = parse_arg(args, "--month", today.month());
    let year = parse_arg(args, "--year", today.year());
    Ok(Period::new(month, year)?)
}

fn parse_date(s: &str) -> Result<NaiveDate> {
    NaiveDate::parse_from_str(s, "%Y-%m-%d").with_context(|| format!("invalid date '{s}', expected YYYY-MM-DD"))
}

fn flag_value<'a>(args: &'a [String], flag: &str) -> Option<&'a str> {
    args.windows(2)
        .find(|w| w[0] == flag)
        .map(|w| w[1].as_str())
}

fn required<'a>(args: &'a [String], flag: &str) -> Result<&'a str> {
    flag_value(args, flag).with_context(|| format!("missing required {flag}"))
}

fn required_id(args: &[String], flag: &str) -> Result<i64> {
    let raw = required(args, flag)?;
    raw.parse()
        .with_context(|| format!("{flag} must be an integer, got '{raw}'"))
}

fn parse_arg<T: std::str::FromStr + Copy>(args: &[String], flag: &str, default: T) -> T {
    args.windows(2)
        .find(|w| w[0] == flag)
        .and_then(|w| w[1].parse().ok())
        .unwrap_or(default)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn argv(parts: &[&str]) -> Vec<String> {
        parts.iter().map(|p| p.to_string()).collect()
    }

    #[test]
    fn mandatory_ids_are_never_defaulted() {
        let missing = argv(&["stipend-runner", "edit", "--version", "2"]);
        let err = required_id(&missing, "--stipend-id").unwrap_err();
        assert!(err.to_string().contains("missing required --stipend-id"));

        let malformed = argv(&["stipend-runner", "edit", "--stipend-id", "seven"]);
        let err = required_id(&malformed, "--stipend-id").unwrap_err();
        assert!(err.to_string().contains("must be an integer"));

        let ok = argv(&["stipend-runner", "add-break", "--year-id", "3"]);
        assert_eq!(required_id(&ok, "--year-id").unwrap(), 3);
    }
}

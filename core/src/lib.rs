//! Kollel monthly stipend engine.
//!
//! Computes kollel stipends from credits, tiered incentives, capped bonus
//! stacking and break-period credit proration, persisted in SQLite.

pub mod break_calendar;
pub mod break_proration;
pub mod config;
pub mod engine;
pub mod enrollment;
pub mod error;
pub mod event;
pub mod pay_history;
pub mod stipend;
pub mod store;
pub mod types;

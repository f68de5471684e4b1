#![forbid(unsafe_code)]

//! Core domain model and business logic for the Medilog medication tracker.
//!
//! This crate provides:
//! - Domain types (drugs, schedules, dose records, progress stats)
//! - Pharmacokinetic curve model
//! - Dose status classification and daily dose selection
//! - Adherence aggregation and streaks
//! - Data sources (in-memory mock, local store with WAL and registry)
//! - CSV export and reminder planning

pub mod types;
pub mod error;
pub mod catalog;
pub mod config;
pub mod logging;
pub mod pk_curve;
pub mod classify;
pub mod selector;
pub mod adherence;
pub mod schedule;
pub mod wal;
pub mod state;
pub mod source;
pub mod mock;
pub mod store;
pub mod export;
pub mod reminder;

// Re-export commonly used types
pub use error::{Error, Result};
pub use types::*;
pub use catalog::get_default_catalog;
pub use config::{Backend, Config};
pub use pk_curve::{CurveParams, PkCurve, Sample};
pub use classify::{classify, DoseState, Presentation};
pub use selector::{filter_doses, select_daily, select_today, DailyDoses, DoseFilter};
pub use adherence::{compute_progress, compute_stats, ProgressReport};
pub use source::{open_source, register_medication, DataSource};
pub use mock::MockSource;
pub use store::LocalStore;
pub use export::export_doses_csv;
pub use reminder::{pending_reminders, Reminder};

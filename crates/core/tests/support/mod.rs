//! Shared test helpers for `calsync-core` integration tests.
//!
//! In-memory adapters for every core port so pipeline and reconciliation
//! behaviour can be exercised without SQLite or HTTP.

#![allow(dead_code)]

pub mod calendar;
pub mod timetable;

use chrono::{NaiveDate, NaiveTime};

pub const TERM: &str = "2024-2025-2";

pub fn date(value: &str) -> NaiveDate {
    value.parse().expect("valid date")
}

pub fn time(value: &str) -> NaiveTime {
    NaiveTime::parse_from_str(value, "%H:%M").expect("valid time")
}

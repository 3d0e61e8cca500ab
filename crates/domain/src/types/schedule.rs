//! Timetable source rows, materialized aggregates and propagation markers

use chrono::{NaiveDate, NaiveTime, Timelike};
use serde::{Deserialize, Serialize};

use crate::constants::AFTERNOON_START_HOUR;
use crate::errors::{Result, SyncError};
use crate::impl_domain_status_conversions;

// ============================================================================
// Propagation marker
// ============================================================================

/// Lifecycle state of a schedule row or aggregate with respect to the
/// external calendar.
///
/// `Unpropagated -> SoftDeletePending -> SoftDeleteDone`. Ordering follows
/// the lifecycle, so `a < b` means `b` is further along.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PropagationMarker {
    Unpropagated,
    SoftDeletePending,
    SoftDeleteDone,
}

impl_domain_status_conversions!(PropagationMarker {
    Unpropagated => "unpropagated",
    SoftDeletePending => "soft_delete_pending",
    SoftDeleteDone => "soft_delete_done",
});

impl PropagationMarker {
    /// The state this marker advances to, if any
    pub const fn next(self) -> Option<Self> {
        match self {
            Self::Unpropagated => Some(Self::SoftDeletePending),
            Self::SoftDeletePending => Some(Self::SoftDeleteDone),
            Self::SoftDeleteDone => None,
        }
    }

    /// Whether moving from `self` to `target` is a single forward step
    pub fn can_advance_to(self, target: Self) -> bool {
        self.next() == Some(target)
    }
}

// ============================================================================
// Day period
// ============================================================================

/// Morning/afternoon partition used for aggregates
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum DayPeriod {
    #[serde(rename = "am")]
    Morning,
    #[serde(rename = "pm")]
    Afternoon,
}

impl_domain_status_conversions!(DayPeriod {
    Morning => "am",
    Afternoon => "pm",
});

impl DayPeriod {
    pub fn for_start(start: NaiveTime) -> Self {
        if start.hour() < AFTERNOON_START_HOUR {
            Self::Morning
        } else {
            Self::Afternoon
        }
    }
}

// ============================================================================
// Terms and pairs
// ============================================================================

/// Check that a term looks like `2024-2025-2`.
pub fn validate_term(term: &str) -> Result<()> {
    let parts: Vec<&str> = term.split('-').collect();
    let valid = match parts.as_slice() {
        [start, end, ordinal] => {
            start.len() == 4
                && end.len() == 4
                && start.chars().all(|c| c.is_ascii_digit())
                && end.chars().all(|c| c.is_ascii_digit())
                && !ordinal.is_empty()
                && ordinal.len() <= 2
                && ordinal.chars().all(|c| c.is_ascii_digit())
                && *ordinal != "0"
        }
        _ => false,
    };

    if valid {
        Ok(())
    } else {
        Err(SyncError::Validation(format!("invalid term '{term}', expected e.g. 2024-2025-1")))
    }
}

/// A (course, date) pair whose source rows changed
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CourseDatePair {
    pub course_code: String,
    pub session_date: NaiveDate,
}

impl CourseDatePair {
    pub fn new(course_code: impl Into<String>, session_date: NaiveDate) -> Self {
        Self { course_code: course_code.into(), session_date }
    }
}

// ============================================================================
// Source rows and aggregates
// ============================================================================

/// One raw scheduled session, owned upstream
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScheduleRecord {
    pub id: i64,
    pub course_code: String,
    pub term: String,
    pub session_date: NaiveDate,
    pub start_time: NaiveTime,
    pub end_time: NaiveTime,
    pub room: Option<String>,
    pub teacher_id: Option<String>,
    /// Upstream tombstone; deleted rows are not regenerated
    pub is_deleted: bool,
    pub marker: PropagationMarker,
}

impl ScheduleRecord {
    pub fn period(&self) -> DayPeriod {
        DayPeriod::for_start(self.start_time)
    }

    pub fn pair(&self) -> CourseDatePair {
        CourseDatePair::new(self.course_code.clone(), self.session_date)
    }
}

/// Materialized per-session record derived from schedule rows.
///
/// The natural key is (course, term, date, period).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CourseAggregate {
    pub course_code: String,
    pub term: String,
    pub session_date: NaiveDate,
    pub period: DayPeriod,
    pub start_time: NaiveTime,
    pub end_time: NaiveTime,
    pub rooms: Vec<String>,
    pub teacher_ids: Vec<String>,
    pub session_count: u32,
}

/// Counts of aggregates written by one regeneration
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegenerationSummary {
    pub am_records: usize,
    pub pm_records: usize,
    pub total: usize,
    /// Live aggregates no longer derivable from any source row
    #[serde(default)]
    pub retired: usize,
}

impl RegenerationSummary {
    pub const fn new(am_records: usize, pm_records: usize) -> Self {
        Self { am_records, pm_records, total: am_records + pm_records, retired: 0 }
    }

    #[must_use]
    pub const fn with_retired(mut self, retired: usize) -> Self {
        self.retired = retired;
        self
    }
}

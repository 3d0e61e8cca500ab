//! Aggregate regeneration from current source rows

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use calsync_domain::{CourseAggregate, DayPeriod, RegenerationSummary, Result, ScheduleRecord};
use chrono::{NaiveDate, NaiveTime};
use tracing::{info, instrument};

use super::ports::{AggregateRepository, ScheduleRepository};

/// Rebuilds course aggregates for a whole term.
///
/// Not marker-gated: every live source row of the term contributes, and the
/// upsert on (course, term, date, period) makes repeated runs converge.
pub struct AggregateRegenerator {
    schedules: Arc<dyn ScheduleRepository>,
    aggregates: Arc<dyn AggregateRepository>,
}

impl AggregateRegenerator {
    pub fn new(
        schedules: Arc<dyn ScheduleRepository>,
        aggregates: Arc<dyn AggregateRepository>,
    ) -> Self {
        Self { schedules, aggregates }
    }

    /// Upsert every derivable aggregate, then retire live aggregates whose
    /// source rows are gone.
    #[instrument(skip(self))]
    pub async fn regenerate(&self, term: &str) -> Result<RegenerationSummary> {
        let records = self.schedules.find_term_records(term).await?;
        let derived = derive_aggregates(&records);
        let (morning, afternoon): (Vec<_>, Vec<_>) = derived
            .iter()
            .cloned()
            .partition(|aggregate| aggregate.period == DayPeriod::Morning);

        let am_records = self.aggregates.upsert_aggregates(&morning).await?;
        let pm_records = self.aggregates.upsert_aggregates(&afternoon).await?;
        let retired = self.aggregates.retire_stale_aggregates(term, &derived).await?;
        let summary = RegenerationSummary::new(am_records, pm_records).with_retired(retired);

        info!(
            term,
            source_rows = records.len(),
            am_records,
            pm_records,
            retired,
            "regenerator.completed"
        );
        Ok(summary)
    }
}

#[derive(Default)]
struct SessionAccumulator {
    start: Option<NaiveTime>,
    end: Option<NaiveTime>,
    rooms: BTreeSet<String>,
    teacher_ids: BTreeSet<String>,
    sessions: u32,
}

/// Group live source rows by (course, term, date, period).
///
/// Each aggregate spans the earliest start to the latest end of its rows and
/// lists distinct rooms and teachers in sorted order. Tombstoned rows are
/// skipped. Output is ordered by the natural key.
pub fn derive_aggregates(records: &[ScheduleRecord]) -> Vec<CourseAggregate> {
    let mut groups: BTreeMap<(String, String, NaiveDate, DayPeriod), SessionAccumulator> =
        BTreeMap::new();

    for record in records.iter().filter(|record| !record.is_deleted) {
        let key = (
            record.course_code.clone(),
            record.term.clone(),
            record.session_date,
            record.period(),
        );
        let acc = groups.entry(key).or_default();

        acc.start = Some(acc.start.map_or(record.start_time, |s| s.min(record.start_time)));
        acc.end = Some(acc.end.map_or(record.end_time, |e| e.max(record.end_time)));
        if let Some(room) = record.room.as_deref().filter(|r| !r.trim().is_empty()) {
            acc.rooms.insert(room.trim().to_string());
        }
        if let Some(teacher) = record.teacher_id.as_deref().filter(|t| !t.trim().is_empty()) {
            acc.teacher_ids.insert(teacher.trim().to_string());
        }
        acc.sessions = acc.sessions.saturating_add(1);
    }

    groups
        .into_iter()
        .filter_map(|((course_code, term, session_date, period), acc)| {
            Some(CourseAggregate {
                course_code,
                term,
                session_date,
                period,
                start_time: acc.start?,
                end_time: acc.end?,
                rooms: acc.rooms.into_iter().collect(),
                teacher_ids: acc.teacher_ids.into_iter().collect(),
                session_count: acc.sessions,
            })
        })
        .collect()
}

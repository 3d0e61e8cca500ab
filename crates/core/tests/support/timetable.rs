//! In-memory timetable store
//!
//! Implements the schedule, aggregate, roster and mapping ports over one
//! shared state so a test can seed data, run the pipeline and inspect
//! markers afterwards.

use std::collections::BTreeSet;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use calsync_core::{
    AggregateRepository, CalendarMappingRepository, RosterRepository, ScheduleRepository,
};
use calsync_domain::{
    CourseAggregate, CourseDatePair, CourseMapping, DayPeriod, Participant, PropagationMarker,
    Result as DomainResult, ScheduleRecord, SyncError,
};

use super::{date, time, TERM};

#[derive(Debug, Clone)]
pub struct StoredAggregate {
    pub aggregate: CourseAggregate,
    pub marker: PropagationMarker,
    pub deleted: bool,
}

#[derive(Default)]
struct State {
    records: Vec<ScheduleRecord>,
    aggregates: Vec<StoredAggregate>,
    course_teachers: HashMap<String, Vec<String>>,
    course_students: HashMap<String, Vec<String>>,
    mappings: Vec<CourseMapping>,
    marker_log: Vec<(i64, PropagationMarker)>,
    barrier_calls: Vec<Vec<CourseDatePair>>,
    fail_rosters: bool,
}

#[derive(Clone, Default)]
pub struct MemoryTimetable {
    state: Arc<Mutex<State>>,
}

impl MemoryTimetable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Unpropagated source row of the default term
    pub fn record(
        id: i64,
        course: &str,
        day: &str,
        start: &str,
        end: &str,
        teacher: &str,
    ) -> ScheduleRecord {
        ScheduleRecord {
            id,
            course_code: course.to_string(),
            term: TERM.to_string(),
            session_date: date(day),
            start_time: time(start),
            end_time: time(end),
            room: Some(format!("B{id}")),
            teacher_id: Some(teacher.to_string()),
            is_deleted: false,
            marker: PropagationMarker::Unpropagated,
        }
    }

    /// Live aggregate as an earlier regeneration would have written it
    pub fn aggregate(course: &str, day: &str, period: DayPeriod) -> CourseAggregate {
        let (start, end) = match period {
            DayPeriod::Morning => ("08:00", "09:40"),
            DayPeriod::Afternoon => ("14:00", "15:40"),
        };
        CourseAggregate {
            course_code: course.to_string(),
            term: TERM.to_string(),
            session_date: date(day),
            period,
            start_time: time(start),
            end_time: time(end),
            rooms: Vec::new(),
            teacher_ids: Vec::new(),
            session_count: 1,
        }
    }

    pub fn add_record(&self, record: ScheduleRecord) {
        self.state.lock().unwrap().records.push(record);
    }

    pub fn add_aggregate(&self, aggregate: CourseAggregate) {
        self.state.lock().unwrap().aggregates.push(StoredAggregate {
            aggregate,
            marker: PropagationMarker::Unpropagated,
            deleted: false,
        });
    }

    pub fn assign_teacher(&self, course: &str, user_id: &str) {
        let mut state = self.state.lock().unwrap();
        state.course_teachers.entry(course.to_string()).or_default().push(user_id.to_string());
    }

    pub fn enroll_student(&self, course: &str, user_id: &str) {
        let mut state = self.state.lock().unwrap();
        state.course_students.entry(course.to_string()).or_default().push(user_id.to_string());
    }

    pub fn add_mapping(&self, course: &str, calendar_id: &str) {
        self.state.lock().unwrap().mappings.push(CourseMapping {
            course_code: course.to_string(),
            term: TERM.to_string(),
            calendar_id: calendar_id.to_string(),
        });
    }

    /// Upstream edit of a source row; resets it to unpropagated
    pub fn touch_record(&self, id: i64, room: &str) {
        let mut state = self.state.lock().unwrap();
        if let Some(record) = state.records.iter_mut().find(|r| r.id == id) {
            record.room = Some(room.to_string());
            record.marker = PropagationMarker::Unpropagated;
        }
    }

    pub fn fail_rosters(&self, fail: bool) {
        self.state.lock().unwrap().fail_rosters = fail;
    }

    pub fn marker_of(&self, id: i64) -> Option<PropagationMarker> {
        self.state.lock().unwrap().records.iter().find(|r| r.id == id).map(|r| r.marker)
    }

    /// Every marker write made through the ports, in order
    pub fn marker_log(&self) -> Vec<(i64, PropagationMarker)> {
        self.state.lock().unwrap().marker_log.clone()
    }

    pub fn aggregates(&self) -> Vec<StoredAggregate> {
        self.state.lock().unwrap().aggregates.clone()
    }

    pub fn live_aggregates(&self) -> Vec<CourseAggregate> {
        self.aggregates().into_iter().filter(|a| !a.deleted).map(|a| a.aggregate).collect()
    }

    pub fn barrier_calls(&self) -> Vec<Vec<CourseDatePair>> {
        self.state.lock().unwrap().barrier_calls.clone()
    }
}

fn same_key(left: &CourseAggregate, right: &CourseAggregate) -> bool {
    left.course_code == right.course_code
        && left.term == right.term
        && left.session_date == right.session_date
        && left.period == right.period
}

fn in_pair(record: &ScheduleRecord, term: &str, pair: &CourseDatePair) -> bool {
    record.term == term
        && record.course_code == pair.course_code
        && record.session_date == pair.session_date
}

fn pairs_with(records: &[ScheduleRecord], term: &str, marker: PropagationMarker) -> Vec<CourseDatePair> {
    records.iter().filter(|r| r.term == term && r.marker == marker).map(ScheduleRecord::pair).collect()
}

#[async_trait]
impl ScheduleRepository for MemoryTimetable {
    async fn find_unpropagated_pairs(&self, term: &str) -> DomainResult<Vec<CourseDatePair>> {
        let state = self.state.lock().unwrap();
        Ok(pairs_with(&state.records, term, PropagationMarker::Unpropagated))
    }

    async fn find_pending_pairs(&self, term: &str) -> DomainResult<Vec<CourseDatePair>> {
        let state = self.state.lock().unwrap();
        let pairs: BTreeSet<_> =
            pairs_with(&state.records, term, PropagationMarker::SoftDeletePending)
                .into_iter()
                .collect();
        Ok(pairs.into_iter().collect())
    }

    async fn find_term_records(&self, term: &str) -> DomainResult<Vec<ScheduleRecord>> {
        let state = self.state.lock().unwrap();
        Ok(state.records.iter().filter(|r| r.term == term).cloned().collect())
    }
}

#[async_trait]
impl AggregateRepository for MemoryTimetable {
    async fn soft_delete_for_pair(&self, term: &str, pair: &CourseDatePair) -> DomainResult<usize> {
        let mut state = self.state.lock().unwrap();
        let mut affected = 0;
        for stored in &mut state.aggregates {
            let aggregate = &stored.aggregate;
            if aggregate.term == term
                && aggregate.course_code == pair.course_code
                && aggregate.session_date == pair.session_date
                && !stored.deleted
                && stored.marker == PropagationMarker::Unpropagated
            {
                stored.marker = PropagationMarker::SoftDeletePending;
                stored.deleted = true;
                affected += 1;
            }
        }

        let mut log = Vec::new();
        for record in &mut state.records {
            if in_pair(record, term, pair) && record.marker == PropagationMarker::Unpropagated {
                record.marker = PropagationMarker::SoftDeletePending;
                log.push((record.id, record.marker));
            }
        }
        state.marker_log.extend(log);
        Ok(affected)
    }

    async fn complete_pairs(&self, term: &str, pairs: &[CourseDatePair]) -> DomainResult<usize> {
        let mut state = self.state.lock().unwrap();
        state.barrier_calls.push(pairs.to_vec());

        let mut advanced = 0;
        let mut log = Vec::new();
        for record in &mut state.records {
            if record.marker == PropagationMarker::SoftDeletePending
                && pairs.iter().any(|pair| in_pair(record, term, pair))
            {
                record.marker = PropagationMarker::SoftDeleteDone;
                log.push((record.id, record.marker));
                advanced += 1;
            }
        }
        for stored in &mut state.aggregates {
            let aggregate = &stored.aggregate;
            if stored.marker == PropagationMarker::SoftDeletePending
                && aggregate.term == term
                && pairs.iter().any(|pair| {
                    pair.course_code == aggregate.course_code
                        && pair.session_date == aggregate.session_date
                })
            {
                stored.marker = PropagationMarker::SoftDeleteDone;
                advanced += 1;
            }
        }
        state.marker_log.extend(log);
        Ok(advanced)
    }

    async fn upsert_aggregates(&self, aggregates: &[CourseAggregate]) -> DomainResult<usize> {
        let mut state = self.state.lock().unwrap();
        let mut written = 0;
        for aggregate in aggregates {
            let position = state
                .aggregates
                .iter()
                .position(|stored| !stored.deleted && same_key(&stored.aggregate, aggregate));
            match position {
                Some(index) if state.aggregates[index].aggregate == *aggregate => {}
                Some(index) => {
                    state.aggregates[index].aggregate = aggregate.clone();
                    written += 1;
                }
                None => {
                    state.aggregates.push(StoredAggregate {
                        aggregate: aggregate.clone(),
                        marker: PropagationMarker::Unpropagated,
                        deleted: false,
                    });
                    written += 1;
                }
            }
        }
        Ok(written)
    }

    async fn retire_stale_aggregates(
        &self,
        term: &str,
        current: &[CourseAggregate],
    ) -> DomainResult<usize> {
        let mut state = self.state.lock().unwrap();
        let mut retired = 0;
        for stored in &mut state.aggregates {
            if !stored.deleted
                && stored.aggregate.term == term
                && !current.iter().any(|aggregate| same_key(&stored.aggregate, aggregate))
            {
                stored.marker = PropagationMarker::SoftDeleteDone;
                stored.deleted = true;
                retired += 1;
            }
        }
        Ok(retired)
    }
}

#[async_trait]
impl RosterRepository for MemoryTimetable {
    async fn teachers_for_pair(
        &self,
        term: &str,
        pair: &CourseDatePair,
    ) -> DomainResult<Vec<Participant>> {
        let state = self.state.lock().unwrap();
        if state.fail_rosters {
            return Err(SyncError::Database("roster tables unavailable".into()));
        }

        let mut ids: BTreeSet<String> = state
            .records
            .iter()
            .filter(|record| in_pair(record, term, pair))
            .filter_map(|record| record.teacher_id.clone())
            .collect();
        if let Some(assigned) = state.course_teachers.get(&pair.course_code) {
            ids.extend(assigned.iter().cloned());
        }
        Ok(ids.into_iter().map(Participant::teacher).collect())
    }

    async fn students_for_pair(
        &self,
        _term: &str,
        pair: &CourseDatePair,
    ) -> DomainResult<Vec<Participant>> {
        let state = self.state.lock().unwrap();
        if state.fail_rosters {
            return Err(SyncError::Database("roster tables unavailable".into()));
        }
        Ok(state
            .course_students
            .get(&pair.course_code)
            .map(|ids| ids.iter().cloned().map(Participant::student).collect())
            .unwrap_or_default())
    }

    async fn course_participants(&self, course_code: &str) -> DomainResult<Vec<Participant>> {
        let state = self.state.lock().unwrap();
        if state.fail_rosters {
            return Err(SyncError::Database("roster tables unavailable".into()));
        }

        let teachers = state.course_teachers.get(course_code).into_iter().flatten();
        let students = state.course_students.get(course_code).into_iter().flatten();
        Ok(teachers
            .cloned()
            .map(Participant::teacher)
            .chain(students.cloned().map(Participant::student))
            .collect())
    }
}

#[async_trait]
impl CalendarMappingRepository for MemoryTimetable {
    async fn find_valid_mappings(&self) -> DomainResult<Vec<CourseMapping>> {
        Ok(self.state.lock().unwrap().mappings.clone())
    }

    async fn find_mapping(&self, course_code: &str) -> DomainResult<Option<CourseMapping>> {
        let state = self.state.lock().unwrap();
        Ok(state.mappings.iter().find(|m| m.course_code == course_code).cloned())
    }
}

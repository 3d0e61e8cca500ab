//! Port interfaces for roster and calendar mapping lookups

use async_trait::async_trait;
use calsync_domain::{CourseDatePair, CourseMapping, Participant, Result};

/// Read access to teacher and student rosters
#[async_trait]
pub trait RosterRepository: Send + Sync {
    /// Live teachers assigned to the course on the pair's date
    async fn teachers_for_pair(&self, term: &str, pair: &CourseDatePair)
        -> Result<Vec<Participant>>;

    /// Live students enrolled in the pair's course
    async fn students_for_pair(&self, term: &str, pair: &CourseDatePair)
        -> Result<Vec<Participant>>;

    /// All live teachers and students of a course, tagged with role
    async fn course_participants(&self, course_code: &str) -> Result<Vec<Participant>>;
}

/// Read access to course calendar mappings
#[async_trait]
pub trait CalendarMappingRepository: Send + Sync {
    /// Mappings whose course is live and whose mapping is not soft-deleted
    async fn find_valid_mappings(&self) -> Result<Vec<CourseMapping>>;

    /// Valid mapping for a single course, if any
    async fn find_mapping(&self, course_code: &str) -> Result<Option<CourseMapping>>;
}

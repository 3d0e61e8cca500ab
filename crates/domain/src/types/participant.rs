//! Roster participants, calendar mappings and external grants

use serde::{Deserialize, Serialize};

use crate::impl_domain_status_conversions;

/// Role of a participant in a course roster
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ParticipantRole {
    Teacher,
    Student,
}

impl_domain_status_conversions!(ParticipantRole {
    Teacher => "teacher",
    Student => "student",
});

impl ParticipantRole {
    /// Teachers write to the course calendar, students read it.
    pub const fn grant_role(self) -> GrantRole {
        match self {
            Self::Teacher => GrantRole::Writer,
            Self::Student => GrantRole::Reader,
        }
    }
}

/// Permission level on an external calendar
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GrantRole {
    Writer,
    Reader,
}

impl_domain_status_conversions!(GrantRole {
    Writer => "writer",
    Reader => "reader",
});

/// A person who should have access to a course calendar
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Participant {
    pub user_id: String,
    pub role: ParticipantRole,
    pub display_name: Option<String>,
}

impl Participant {
    pub fn teacher(user_id: impl Into<String>) -> Self {
        Self { user_id: user_id.into(), role: ParticipantRole::Teacher, display_name: None }
    }

    pub fn student(user_id: impl Into<String>) -> Self {
        Self { user_id: user_id.into(), role: ParticipantRole::Student, display_name: None }
    }

    #[must_use]
    pub fn with_display_name(mut self, name: impl Into<String>) -> Self {
        self.display_name = Some(name.into());
        self
    }

    pub fn to_grant_request(&self) -> GrantRequest {
        GrantRequest { user_id: self.user_id.clone(), role: self.role.grant_role() }
    }
}

/// (course, term) bound to an external calendar id
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CourseMapping {
    pub course_code: String,
    pub term: String,
    pub calendar_id: String,
}

/// Access grant as reported by the calendar service
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExternalGrant {
    pub grant_id: Option<String>,
    pub user_id: String,
    pub role: GrantRole,
}

/// Grant to be created on the calendar service
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GrantRequest {
    pub user_id: String,
    pub role: GrantRole,
}

/// One page of a grant listing
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GrantPage {
    pub grants: Vec<ExternalGrant>,
    pub next_page_token: Option<String>,
}

//! Desired-versus-external grant diff

use std::collections::HashSet;

use calsync_domain::{ExternalGrant, Participant};

/// Grants to create and grants to revoke for one calendar
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GrantDiff {
    pub to_add: Vec<Participant>,
    pub to_remove: Vec<ExternalGrant>,
}

impl GrantDiff {
    pub fn is_empty(&self) -> bool {
        self.to_add.is_empty() && self.to_remove.is_empty()
    }
}

/// `to_add = desired \ external`, `to_remove = external \ desired`, keyed by
/// user id. Input order is kept and duplicate user ids are emitted once.
///
/// Role changes for an existing user are not part of the diff.
pub fn diff(external: &[ExternalGrant], desired: &[Participant]) -> GrantDiff {
    let external_ids: HashSet<&str> = external.iter().map(|g| g.user_id.as_str()).collect();
    let desired_ids: HashSet<&str> = desired.iter().map(|p| p.user_id.as_str()).collect();

    let mut to_add = Vec::new();
    let mut added: HashSet<&str> = HashSet::new();
    for participant in desired {
        let id = participant.user_id.as_str();
        if !external_ids.contains(id) && added.insert(id) {
            to_add.push(participant.clone());
        }
    }

    let mut to_remove = Vec::new();
    let mut removed: HashSet<&str> = HashSet::new();
    for grant in external {
        let id = grant.user_id.as_str();
        if !desired_ids.contains(id) && removed.insert(id) {
            to_remove.push(grant.clone());
        }
    }

    GrantDiff { to_add, to_remove }
}

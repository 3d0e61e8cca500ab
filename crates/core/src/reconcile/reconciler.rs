//! Per-course participant reconciliation and bounded fan-out

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use calsync_common::resilience::Bulkhead;
use calsync_domain::constants::{ADD_BATCH_SIZE, DEFAULT_COURSE_CONCURRENCY, DEFAULT_MAX_GRANT_PAGES};
use calsync_domain::{
    CourseMapping, CourseSyncResult, ExternalGrant, GrantRequest, Participant, ParticipantRole,
    Result, SyncConfig, SyncError,
};
use tracing::{debug, error, info, instrument, warn};

use super::diff::diff;
use super::ports::CalendarGrantClient;
use crate::roster_ports::{CalendarMappingRepository, RosterRepository};
use crate::run::RunControl;

/// Permit pool name for the course fan-out
const COURSE_BULKHEAD: &str = "course_reconcile";

/// Tuning knobs for reconciliation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReconcilerSettings {
    /// Grants per batch-create call, at most 100
    pub add_batch_size: usize,
    /// Courses reconciled at the same time
    pub course_concurrency: usize,
    /// Upper bound on pages fetched per calendar
    pub max_grant_pages: usize,
}

impl Default for ReconcilerSettings {
    fn default() -> Self {
        Self {
            add_batch_size: ADD_BATCH_SIZE,
            course_concurrency: DEFAULT_COURSE_CONCURRENCY,
            max_grant_pages: DEFAULT_MAX_GRANT_PAGES,
        }
    }
}

impl From<&SyncConfig> for ReconcilerSettings {
    fn from(config: &SyncConfig) -> Self {
        Self {
            add_batch_size: config.add_batch_size,
            course_concurrency: config.course_concurrency,
            max_grant_pages: config.max_grant_pages,
        }
    }
}

impl ReconcilerSettings {
    fn sanitized(self) -> Self {
        Self {
            add_batch_size: self.add_batch_size.clamp(1, ADD_BATCH_SIZE),
            course_concurrency: self.course_concurrency.max(1),
            max_grant_pages: self.max_grant_pages.max(1),
        }
    }
}

/// Result of applying one side of a diff
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ApplyOutcome {
    pub succeeded: usize,
    pub failed: usize,
    pub errors: Vec<String>,
}

/// Brings each course calendar's grants in line with its roster.
#[derive(Clone)]
pub struct ParticipantReconciler {
    mappings: Arc<dyn CalendarMappingRepository>,
    rosters: Arc<dyn RosterRepository>,
    grants: Arc<dyn CalendarGrantClient>,
    settings: ReconcilerSettings,
}

impl ParticipantReconciler {
    pub fn new(
        mappings: Arc<dyn CalendarMappingRepository>,
        rosters: Arc<dyn RosterRepository>,
        grants: Arc<dyn CalendarGrantClient>,
    ) -> Self {
        Self { mappings, rosters, grants, settings: ReconcilerSettings::default() }
    }

    /// Replace the settings; out-of-range values are clamped
    #[must_use]
    pub fn with_settings(mut self, settings: ReconcilerSettings) -> Self {
        self.settings = settings.sanitized();
        self
    }

    pub const fn settings(&self) -> ReconcilerSettings {
        self.settings
    }

    /// Mappings of live, non-deleted courses
    #[instrument(skip(self))]
    pub async fn get_valid_mappings(&self) -> Result<Vec<CourseMapping>> {
        let mappings = self.mappings.find_valid_mappings().await?;
        debug!(mappings = mappings.len(), "reconciler.valid_mappings");
        Ok(mappings)
    }

    /// Live roster of the course, one entry per user id.
    ///
    /// A user listed both as teacher and student is kept as teacher.
    pub async fn get_desired_participants(&self, course_code: &str) -> Result<Vec<Participant>> {
        let participants = self.rosters.course_participants(course_code).await?;
        Ok(dedupe_participants(participants))
    }

    /// All grants on the calendar. A failed fetch yields an empty list; a
    /// listing cut off by the page limit yields the pages fetched so far.
    pub async fn get_external_grants(&self, calendar_id: &str) -> Vec<ExternalGrant> {
        self.list_external(calendar_id).await.grants
    }

    async fn list_external(&self, calendar_id: &str) -> GrantListing {
        match self.fetch_all_grants(calendar_id).await {
            Ok(listing) => listing,
            Err(err) => {
                warn!(calendar_id, error = %err, "reconciler.grant_fetch_failed");
                GrantListing::default()
            }
        }
    }

    async fn fetch_all_grants(&self, calendar_id: &str) -> Result<GrantListing> {
        let mut grants = Vec::new();
        let mut page_token: Option<String> = None;

        for _ in 0..self.settings.max_grant_pages {
            let page = self.grants.list_grants(calendar_id, page_token.as_deref()).await?;
            grants.extend(page.grants);

            match page.next_page_token {
                Some(next) if !next.is_empty() => page_token = Some(next),
                _ => return Ok(GrantListing { grants, truncated: false }),
            }
        }

        warn!(
            calendar_id,
            max_pages = self.settings.max_grant_pages,
            fetched = grants.len(),
            "reconciler.page_limit_reached"
        );
        Ok(GrantListing { grants, truncated: true })
    }

    /// Create grants in batches; a failed batch is logged and skipped
    pub async fn apply_add(&self, calendar_id: &str, participants: &[Participant]) -> ApplyOutcome {
        let mut outcome = ApplyOutcome::default();

        for batch in participants.chunks(self.settings.add_batch_size) {
            let requests: Vec<GrantRequest> =
                batch.iter().map(Participant::to_grant_request).collect();

            match self.grants.batch_create_grants(calendar_id, &requests).await {
                Ok(()) => outcome.succeeded = outcome.succeeded.saturating_add(batch.len()),
                Err(err) => {
                    let failure =
                        SyncError::PartialBatchFailure { attempted: batch.len(), failed: batch.len() };
                    warn!(
                        calendar_id,
                        batch_size = batch.len(),
                        error = %err,
                        "reconciler.add_batch_failed"
                    );
                    outcome.failed = outcome.failed.saturating_add(batch.len());
                    outcome.errors.push(format!("{failure}: {err}"));
                }
            }
        }

        outcome
    }

    /// Revoke grants one participant at a time; failures are skipped
    pub async fn apply_remove(&self, calendar_id: &str, grants: &[ExternalGrant]) -> ApplyOutcome {
        let mut outcome = ApplyOutcome::default();

        for grant in grants {
            match self.remove_grant(calendar_id, grant).await {
                Ok(true) => outcome.succeeded = outcome.succeeded.saturating_add(1),
                Ok(false) => {
                    debug!(calendar_id, user_id = %grant.user_id, "reconciler.grant_already_gone");
                }
                Err(err) => {
                    warn!(
                        calendar_id,
                        user_id = %grant.user_id,
                        error = %err,
                        "reconciler.remove_failed"
                    );
                    outcome.failed = outcome.failed.saturating_add(1);
                    outcome.errors.push(format!("remove {}: {err}", grant.user_id));
                }
            }
        }

        outcome
    }

    async fn remove_grant(&self, calendar_id: &str, grant: &ExternalGrant) -> Result<bool> {
        let grant_id = match grant.grant_id.as_deref() {
            Some(id) => id.to_string(),
            None => match self.grants.find_grant_id(calendar_id, &grant.user_id).await? {
                Some(id) => id,
                None => return Ok(false),
            },
        };

        self.grants.delete_grant(calendar_id, &grant_id).await?;
        Ok(true)
    }

    /// Reconcile one course. Never fails; problems are reported in the result.
    #[instrument(skip(self))]
    pub async fn sync_course(&self, course_code: &str, calendar_id: &str) -> CourseSyncResult {
        let started = Instant::now();
        let mut result = CourseSyncResult::new(course_code, calendar_id);

        let desired = match self.get_desired_participants(course_code).await {
            Ok(desired) if desired.is_empty() => {
                let err = SyncError::NotFound(format!("no live roster for course {course_code}"));
                warn!(course_code, calendar_id, "reconciler.empty_roster");
                return finish(fail(result, &err), started);
            }
            Ok(desired) => desired,
            Err(err) => {
                error!(course_code, calendar_id, error = %err, "reconciler.roster_failed");
                return finish(fail(result, &err), started);
            }
        };

        let listing = self.list_external(calendar_id).await;
        if listing.truncated {
            // A partial listing cannot be diffed
            let err = SyncError::ExternalService(format!(
                "grant listing for {calendar_id} exceeds {} pages",
                self.settings.max_grant_pages
            ));
            return finish(fail(result, &err), started);
        }
        let external = listing.grants;
        let plan = diff(&external, &desired);
        debug!(
            course_code,
            desired = desired.len(),
            external = external.len(),
            to_add = plan.to_add.len(),
            to_remove = plan.to_remove.len(),
            "reconciler.diff"
        );

        let added = self.apply_add(calendar_id, &plan.to_add).await;
        let removed = self.apply_remove(calendar_id, &plan.to_remove).await;

        result.added_count = added.succeeded;
        result.removed_count = removed.succeeded;
        result.failed_count = added.failed.saturating_add(removed.failed);
        result.errors.extend(added.errors);
        result.errors.extend(removed.errors);
        result.success = result.failed_count == 0;

        let result = finish(result, started);
        info!(
            course_code,
            calendar_id,
            added = result.added_count,
            removed = result.removed_count,
            failed = result.failed_count,
            duration_ms = result.duration_ms,
            "reconciler.course_synced"
        );
        result
    }

    /// Reconcile many courses with at most `course_concurrency` in flight.
    ///
    /// Returns one result per mapping, in input order. Courses not started
    /// before cancellation are reported as failed.
    pub async fn sync_many(
        &self,
        mappings: Vec<CourseMapping>,
        control: &RunControl,
    ) -> Vec<CourseSyncResult> {
        if mappings.is_empty() {
            return Vec::new();
        }

        let bulkhead = match Bulkhead::new(COURSE_BULKHEAD, self.settings.course_concurrency) {
            Ok(bulkhead) => bulkhead,
            Err(err) => {
                error!(error = %err, "reconciler.bulkhead_unavailable");
                return mappings
                    .into_iter()
                    .map(|m| {
                        CourseSyncResult::failure(m.course_code, m.calendar_id, err.to_string())
                    })
                    .collect();
            }
        };

        let courses = mappings.len();
        let keys: Vec<(String, String)> =
            mappings.iter().map(|m| (m.course_code.clone(), m.calendar_id.clone())).collect();

        let reconciler = self.clone();
        let control = control.clone();
        let results = bulkhead
            .execute_all(mappings, move |mapping: CourseMapping| {
                let reconciler = reconciler.clone();
                let control = control.clone();
                async move {
                    if let Err(err) = control.checkpoint().await {
                        return CourseSyncResult::failure(
                            mapping.course_code,
                            mapping.calendar_id,
                            err.to_string(),
                        );
                    }
                    reconciler.sync_course(&mapping.course_code, &mapping.calendar_id).await
                }
            })
            .await;

        let metrics = bulkhead.metrics();
        info!(
            courses,
            concurrency = self.settings.course_concurrency,
            peak_concurrent = metrics.peak_concurrent,
            waves = metrics.waves_for(courses),
            "reconciler.fan_out_completed"
        );

        results
            .into_iter()
            .zip(keys)
            .map(|(outcome, (course_code, calendar_id))| {
                outcome.unwrap_or_else(|err| {
                    error!(course_code, calendar_id, error = %err, "reconciler.course_task_aborted");
                    CourseSyncResult::failure(
                        course_code,
                        calendar_id,
                        format!("course task aborted: {err}"),
                    )
                })
            })
            .collect()
    }
}

fn dedupe_participants(participants: Vec<Participant>) -> Vec<Participant> {
    let mut index: HashMap<String, usize> = HashMap::new();
    let mut unique: Vec<Participant> = Vec::with_capacity(participants.len());

    for participant in participants {
        match index.get(&participant.user_id) {
            Some(&at) => {
                if participant.role == ParticipantRole::Teacher {
                    unique[at] = participant;
                }
            }
            None => {
                index.insert(participant.user_id.clone(), unique.len());
                unique.push(participant);
            }
        }
    }

    unique
}

/// Grants fetched for one calendar; `truncated` when the page limit cut the
/// listing short.
#[derive(Default)]
struct GrantListing {
    grants: Vec<ExternalGrant>,
    truncated: bool,
}

fn fail(mut result: CourseSyncResult, err: &SyncError) -> CourseSyncResult {
    result.success = false;
    result.errors.push(err.to_string());
    result
}

fn finish(mut result: CourseSyncResult, started: Instant) -> CourseSyncResult {
    result.duration_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);
    result
}

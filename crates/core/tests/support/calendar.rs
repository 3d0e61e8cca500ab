//! Calendar-side mocks: binding gateway and grant client

use std::collections::{BTreeSet, HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use calsync_core::{BindingGateway, CalendarGrantClient};
use calsync_domain::{
    CourseDatePair, ExternalGrant, GrantPage, GrantRequest, GrantRole, Participant,
    ParticipantRole, Result as DomainResult, SyncError,
};

/* -------------------------------------------------------------------------- */
/* Binding gateway */
/* -------------------------------------------------------------------------- */

#[derive(Default)]
struct BindingState {
    deleted: Vec<(String, ParticipantRole, CourseDatePair)>,
    failing_users: HashSet<String>,
    unbound_users: HashSet<String>,
}

/// Records every deletion; selected users fail or have nothing bound
#[derive(Clone, Default)]
pub struct RecordingBindingGateway {
    state: Arc<Mutex<BindingState>>,
}

impl RecordingBindingGateway {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_for(&self, user_id: &str) {
        self.state.lock().unwrap().failing_users.insert(user_id.to_string());
    }

    pub fn unbound(&self, user_id: &str) {
        self.state.lock().unwrap().unbound_users.insert(user_id.to_string());
    }

    pub fn deletions(&self) -> Vec<(String, ParticipantRole, CourseDatePair)> {
        self.state.lock().unwrap().deleted.clone()
    }
}

#[async_trait]
impl BindingGateway for RecordingBindingGateway {
    async fn delete_binding(
        &self,
        _term: &str,
        pair: &CourseDatePair,
        participant: &Participant,
    ) -> DomainResult<bool> {
        let mut state = self.state.lock().unwrap();
        if state.failing_users.contains(&participant.user_id) {
            return Err(SyncError::ExternalService(format!(
                "calendar rejected delete for {}",
                participant.user_id
            )));
        }
        if state.unbound_users.contains(&participant.user_id) {
            return Ok(false);
        }
        state.deleted.push((participant.user_id.clone(), participant.role, pair.clone()));
        Ok(true)
    }
}

/* -------------------------------------------------------------------------- */
/* Grant client */
/* -------------------------------------------------------------------------- */

struct GrantState {
    grants: HashMap<String, Vec<ExternalGrant>>,
    next_id: u64,
    page_size: usize,
    hide_grant_ids: bool,
    fail_listing: bool,
    failing_batches: HashSet<usize>,
    failing_deletes: HashSet<String>,
    batch_sizes: Vec<usize>,
    list_calls: usize,
    lookups: usize,
}

impl Default for GrantState {
    fn default() -> Self {
        Self {
            grants: HashMap::new(),
            next_id: 1,
            page_size: 50,
            hide_grant_ids: false,
            fail_listing: false,
            failing_batches: HashSet::new(),
            failing_deletes: HashSet::new(),
            batch_sizes: Vec::new(),
            list_calls: 0,
            lookups: 0,
        }
    }
}

/// In-memory calendar grant API with failure injection and in-flight
/// tracking on the listing call.
#[derive(Clone, Default)]
pub struct MockGrantClient {
    state: Arc<Mutex<GrantState>>,
    latency: Duration,
    in_flight: Arc<AtomicUsize>,
    peak: Arc<AtomicUsize>,
}

impl MockGrantClient {
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    pub fn seed(&self, calendar_id: &str, users: &[(&str, GrantRole)]) {
        let mut state = self.state.lock().unwrap();
        for (user_id, role) in users {
            let grant_id = format!("g-{}", state.next_id);
            state.next_id += 1;
            state.grants.entry(calendar_id.to_string()).or_default().push(ExternalGrant {
                grant_id: Some(grant_id),
                user_id: (*user_id).to_string(),
                role: *role,
            });
        }
    }

    pub fn set_page_size(&self, page_size: usize) {
        self.state.lock().unwrap().page_size = page_size;
    }

    /// Listings omit grant ids, forcing a lookup before each delete
    pub fn hide_grant_ids(&self) {
        self.state.lock().unwrap().hide_grant_ids = true;
    }

    pub fn fail_listing(&self) {
        self.state.lock().unwrap().fail_listing = true;
    }

    /// Fail the n-th batch-create call (zero based)
    pub fn fail_batch(&self, index: usize) {
        self.state.lock().unwrap().failing_batches.insert(index);
    }

    pub fn fail_delete_for(&self, user_id: &str) {
        self.state.lock().unwrap().failing_deletes.insert(user_id.to_string());
    }

    pub fn user_ids(&self, calendar_id: &str) -> BTreeSet<String> {
        let state = self.state.lock().unwrap();
        state
            .grants
            .get(calendar_id)
            .map(|grants| grants.iter().map(|g| g.user_id.clone()).collect())
            .unwrap_or_default()
    }

    pub fn batch_sizes(&self) -> Vec<usize> {
        self.state.lock().unwrap().batch_sizes.clone()
    }

    pub fn list_calls(&self) -> usize {
        self.state.lock().unwrap().list_calls
    }

    pub fn lookups(&self) -> usize {
        self.state.lock().unwrap().lookups
    }

    pub fn peak_in_flight(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }

    fn page(&self, calendar_id: &str, page_token: Option<&str>) -> DomainResult<GrantPage> {
        let mut state = self.state.lock().unwrap();
        state.list_calls += 1;
        if state.fail_listing {
            return Err(SyncError::ExternalService("grant listing returned 503".into()));
        }

        let start = page_token.and_then(|token| token.parse::<usize>().ok()).unwrap_or(0);
        let all = state.grants.get(calendar_id).cloned().unwrap_or_default();
        let end = (start + state.page_size).min(all.len());
        let hide = state.hide_grant_ids;
        let grants = all[start.min(end)..end]
            .iter()
            .cloned()
            .map(|mut grant| {
                if hide {
                    grant.grant_id = None;
                }
                grant
            })
            .collect();

        Ok(GrantPage {
            grants,
            next_page_token: (end < all.len()).then(|| end.to_string()),
        })
    }
}

#[async_trait]
impl CalendarGrantClient for MockGrantClient {
    async fn list_grants(
        &self,
        calendar_id: &str,
        page_token: Option<&str>,
    ) -> DomainResult<GrantPage> {
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }
        let page = self.page(calendar_id, page_token);
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        page
    }

    async fn batch_create_grants(
        &self,
        calendar_id: &str,
        grants: &[GrantRequest],
    ) -> DomainResult<()> {
        let mut state = self.state.lock().unwrap();
        let index = state.batch_sizes.len();
        state.batch_sizes.push(grants.len());
        if state.failing_batches.contains(&index) {
            return Err(SyncError::ExternalService(format!("batch {index} rejected")));
        }

        for request in grants {
            let grant_id = format!("g-{}", state.next_id);
            state.next_id += 1;
            state.grants.entry(calendar_id.to_string()).or_default().push(ExternalGrant {
                grant_id: Some(grant_id),
                user_id: request.user_id.clone(),
                role: request.role,
            });
        }
        Ok(())
    }

    async fn find_grant_id(&self, calendar_id: &str, user_id: &str) -> DomainResult<Option<String>> {
        let mut state = self.state.lock().unwrap();
        state.lookups += 1;
        Ok(state
            .grants
            .get(calendar_id)
            .and_then(|grants| grants.iter().find(|g| g.user_id == user_id))
            .and_then(|grant| grant.grant_id.clone()))
    }

    async fn delete_grant(&self, calendar_id: &str, grant_id: &str) -> DomainResult<()> {
        let mut state = self.state.lock().unwrap();
        let failing = state.failing_deletes.clone();
        let grants = state.grants.entry(calendar_id.to_string()).or_default();
        let Some(position) = grants.iter().position(|g| g.grant_id.as_deref() == Some(grant_id))
        else {
            return Err(SyncError::NotFound(format!("grant {grant_id}")));
        };
        if failing.contains(&grants[position].user_id) {
            return Err(SyncError::ExternalService("delete returned 500".into()));
        }
        grants.remove(position);
        Ok(())
    }
}

//! HTTP adapter for the calendar grant and event API

use async_trait::async_trait;
use calsync_core::CalendarGrantClient;
use calsync_domain::{CalendarApiConfig, GrantPage, GrantRequest, Result, SyncError};
use reqwest::{Method, StatusCode};
use tracing::{debug, instrument};
use url::Url;

use super::types::{BatchCreateRequest, GrantListResponse};
use crate::errors::InfraError;
use crate::http::HttpClient;

/// Calendar service client.
///
/// Endpoints are resolved under `base_url`:
/// `calendars/{id}/grants`, `calendars/{id}/grants:batchCreate`,
/// `calendars/{id}/grants/{grantId}` and `calendars/{id}/events/{eventId}`.
#[derive(Clone)]
pub struct CalendarApiClient {
    http: HttpClient,
    base_url: Url,
}

impl CalendarApiClient {
    pub fn new(http: HttpClient, base_url: &str) -> Result<Self> {
        let base_url = Url::parse(base_url).map_err(|err| SyncError::from(InfraError::from(err)))?;
        if base_url.cannot_be_a_base() {
            return Err(SyncError::Config(format!("calendar base URL {base_url} cannot be a base")));
        }
        Ok(Self { http, base_url })
    }

    pub fn from_config(config: &CalendarApiConfig) -> Result<Self> {
        Self::new(HttpClient::for_calendar(config)?, &config.base_url)
    }

    fn endpoint(&self, segments: &[&str]) -> Result<Url> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|()| SyncError::Config("calendar base URL cannot be a base".into()))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    /// Delete an event. `Ok(false)` when the service no longer has it.
    #[instrument(skip(self))]
    pub async fn delete_event(&self, calendar_id: &str, event_id: &str) -> Result<bool> {
        let url = self.endpoint(&["calendars", calendar_id, "events", event_id])?;
        self.delete(url).await
    }

    async fn delete(&self, url: Url) -> Result<bool> {
        let response = self.http.send(self.http.request(Method::DELETE, url)).await?;
        if response.status() == StatusCode::NOT_FOUND {
            debug!("resource already gone");
            return Ok(false);
        }
        response.error_for_status().map_err(|err| SyncError::from(InfraError::from(err)))?;
        Ok(true)
    }

    async fn get_grants(&self, url: Url) -> Result<GrantListResponse> {
        let response = self.http.send_checked(self.http.request(Method::GET, url)).await?;
        response.json::<GrantListResponse>().await.map_err(|err| SyncError::from(InfraError::from(err)))
    }
}

#[async_trait]
impl CalendarGrantClient for CalendarApiClient {
    #[instrument(skip(self))]
    async fn list_grants(&self, calendar_id: &str, page_token: Option<&str>) -> Result<GrantPage> {
        let mut url = self.endpoint(&["calendars", calendar_id, "grants"])?;
        if let Some(token) = page_token {
            url.query_pairs_mut().append_pair("pageToken", token);
        }
        Ok(self.get_grants(url).await?.into())
    }

    #[instrument(skip(self, grants), fields(count = grants.len()))]
    async fn batch_create_grants(&self, calendar_id: &str, grants: &[GrantRequest]) -> Result<()> {
        if grants.is_empty() {
            return Ok(());
        }
        let url = self.endpoint(&["calendars", calendar_id, "grants:batchCreate"])?;
        let request = self.http.request(Method::POST, url).json(&BatchCreateRequest { grants });
        self.http.send_checked(request).await?;
        Ok(())
    }

    #[instrument(skip(self))]
    async fn find_grant_id(&self, calendar_id: &str, user_id: &str) -> Result<Option<String>> {
        let mut url = self.endpoint(&["calendars", calendar_id, "grants"])?;
        url.query_pairs_mut().append_pair("userId", user_id);
        let listing = self.get_grants(url).await?;
        Ok(listing.items.into_iter().find(|item| item.user_id == user_id).and_then(|item| item.id))
    }

    /// A grant that is already gone counts as deleted.
    #[instrument(skip(self))]
    async fn delete_grant(&self, calendar_id: &str, grant_id: &str) -> Result<()> {
        let url = self.endpoint(&["calendars", calendar_id, "grants", grant_id])?;
        self.delete(url).await.map(|_| ())
    }
}

//! Port interface for the external calendar grant API

use async_trait::async_trait;
use calsync_domain::{GrantPage, GrantRequest, Result};

/// Access grants on external calendars
#[async_trait]
pub trait CalendarGrantClient: Send + Sync {
    /// Fetch one page of grants; `None` requests the first page
    async fn list_grants(&self, calendar_id: &str, page_token: Option<&str>) -> Result<GrantPage>;

    /// Create all grants in one call
    async fn batch_create_grants(&self, calendar_id: &str, grants: &[GrantRequest]) -> Result<()>;

    /// Resolve the grant id held by `user_id`, if any
    async fn find_grant_id(&self, calendar_id: &str, user_id: &str) -> Result<Option<String>>;

    async fn delete_grant(&self, calendar_id: &str, grant_id: &str) -> Result<()>;
}

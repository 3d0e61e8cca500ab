//! Wire types of the calendar grant API

use calsync_domain::{ExternalGrant, GrantPage, GrantRequest, GrantRole};
use serde::{Deserialize, Serialize};
use tracing::warn;

/// `GET /calendars/{id}/grants` response body
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GrantListResponse {
    #[serde(default)]
    pub items: Vec<GrantResource>,
    #[serde(default)]
    pub next_page_token: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GrantResource {
    #[serde(default)]
    pub id: Option<String>,
    pub user_id: String,
    pub role: String,
}

/// `POST /calendars/{id}/grants:batchCreate` request body
#[derive(Debug, Serialize)]
pub struct BatchCreateRequest<'a> {
    pub grants: &'a [GrantRequest],
}

impl GrantResource {
    /// Roles other than reader/writer (owner, freeBusy, ...) still count as
    /// a grant; owners read as writers, the rest as readers.
    pub fn into_grant(self) -> ExternalGrant {
        let role = match self.role.parse::<GrantRole>() {
            Ok(role) => role,
            Err(_) if self.role.eq_ignore_ascii_case("owner") => GrantRole::Writer,
            Err(_) => {
                warn!(user_id = %self.user_id, role = %self.role, "unrecognised grant role");
                GrantRole::Reader
            }
        };
        ExternalGrant { grant_id: self.id.filter(|id| !id.is_empty()), user_id: self.user_id, role }
    }
}

impl From<GrantListResponse> for GrantPage {
    fn from(response: GrantListResponse) -> Self {
        Self {
            grants: response.items.into_iter().map(GrantResource::into_grant).collect(),
            next_page_token: response.next_page_token.filter(|token| !token.is_empty()),
        }
    }
}

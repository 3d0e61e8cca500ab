//! Binding removal against the calendar service

use std::sync::Arc;

use async_trait::async_trait;
use calsync_core::BindingGateway;
use calsync_domain::{CourseDatePair, Participant, Result};
use tracing::{debug, instrument};

use super::client::CalendarApiClient;
use crate::database::SqliteBindingRepository;

/// Deletes a participant's external events for one course session and
/// soft-deletes the local binding rows.
pub struct CalendarBindingGateway {
    bindings: Arc<SqliteBindingRepository>,
    client: Arc<CalendarApiClient>,
}

impl CalendarBindingGateway {
    pub fn new(bindings: Arc<SqliteBindingRepository>, client: Arc<CalendarApiClient>) -> Self {
        Self { bindings, client }
    }
}

#[async_trait]
impl BindingGateway for CalendarBindingGateway {
    #[instrument(
        skip(self, pair, participant),
        fields(
            course_code = %pair.course_code,
            session_date = %pair.session_date,
            user_id = %participant.user_id,
            role = %participant.role,
        )
    )]
    async fn delete_binding(
        &self,
        term: &str,
        pair: &CourseDatePair,
        participant: &Participant,
    ) -> Result<bool> {
        let live =
            self.bindings.find_live(term, pair, &participant.user_id, participant.role).await?;
        if live.is_empty() {
            debug!("no live binding");
            return Ok(false);
        }

        for binding in &live {
            let existed =
                self.client.delete_event(&binding.calendar_id, &binding.external_event_id).await?;
            self.bindings.mark_deleted(binding.id).await?;
            debug!(
                binding_id = binding.id,
                calendar_id = %binding.calendar_id,
                existed,
                "binding removed"
            );
        }
        Ok(true)
    }
}

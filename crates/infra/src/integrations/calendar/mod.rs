//! Calendar service integration
//!
//! HTTP client for grants and events plus the binding gateway used by the
//! removal stage.

pub mod client;
pub mod gateway;
pub mod types;

pub use client::CalendarApiClient;
pub use gateway::CalendarBindingGateway;
pub use types::{BatchCreateRequest, GrantListResponse, GrantResource};

//! Calendar operations and the backends they run against.
//!
//! - [`CalendarOperations`] - list, add, edit and delete, including query
//!   resolution and time normalization
//! - [`SessionSource`] / [`CalendarApi`] - the seams a backend implements
//! - [`tools`] - the JSON tool surface for a tool-calling host
//! - [`google`] - OAuth credential lifecycle and the Google Calendar client
//!
//! ```text
//! tools::invoke ──▶ CalendarOperations ──▶ CalendarApi (GoogleCalendarClient)
//!                          │
//!                          ▼
//!                   SessionSource (CredentialManager)
//!                          │
//!                 TokenStore + GrantFlow (FileTokenStore, OAuthClient)
//! ```

pub mod error;
#[cfg(feature = "google")]
pub mod google;
pub mod operations;
pub mod provider;
pub mod remote_event;
pub mod session;
#[cfg(test)]
mod testing;
pub mod tools;

pub use error::{ErrorCategory, ProviderError, ProviderErrorCode, ProviderResult};
pub use operations::{
    CalendarOperations, Clock, CreatedEvent, EventDraft, EventPatch, ListRequest, MutationOutcome,
};
pub use provider::{BoxFuture, CalendarApi, EventQuery, SessionSource};
pub use remote_event::{EventDateTime, RemoteEvent};
pub use session::Session;
pub use tools::{ToolDefinition, ToolError, invoke, tool_definitions};

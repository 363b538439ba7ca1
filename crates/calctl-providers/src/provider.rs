//! Backend seams.
//!
//! [`SessionSource`] hands out authenticated sessions and [`CalendarApi`]
//! performs the remote calls. `CalendarOperations` only talks to these two
//! traits, so tests swap in fakes.

use std::future::Future;
use std::pin::Pin;

use calctl_core::TimeWindow;

use crate::error::ProviderResult;
use crate::remote_event::RemoteEvent;
use crate::session::Session;

/// A boxed future for async trait methods.
///
/// Boxed futures keep the traits object-safe so they can be used as
/// `Arc<dyn Trait>`.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// A search over the calendar.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventQuery {
    /// Events overlapping this window are returned.
    pub window: TimeWindow,
    /// Server-side free-text filter.
    pub text: Option<String>,
    /// Cap on the number of events returned; `None` fetches every page.
    pub max_results: Option<u32>,
}

impl EventQuery {
    pub fn new(window: TimeWindow) -> Self {
        Self {
            window,
            text: None,
            max_results: None,
        }
    }

    #[must_use]
    pub fn with_text(mut self, text: impl Into<String>) -> Self {
        self.text = Some(text.into());
        self
    }

    #[must_use]
    pub fn with_max_results(mut self, max: u32) -> Self {
        self.max_results = Some(max);
        self
    }
}

/// Produces valid sessions on demand.
pub trait SessionSource: Send + Sync {
    /// Returns a session whose credential is valid right now.
    ///
    /// May refresh the stored grant or run the interactive flow.
    fn session(&self) -> BoxFuture<'_, ProviderResult<Session>>;

    /// Marks the current credential as rejected by the API.
    ///
    /// The next [`session`](Self::session) call refreshes or re-acquires it.
    fn invalidate(&self) -> BoxFuture<'_, ProviderResult<()>>;
}

/// The remote calendar operations used by this tool.
///
/// Listing always expands recurring events into single instances and orders
/// them by start time.
pub trait CalendarApi: Send + Sync {
    /// Returns the backend name (e.g. "google").
    fn name(&self) -> &str;

    /// Lists events matching `query`, following pagination.
    fn list_events<'a>(
        &'a self,
        session: &'a Session,
        query: &'a EventQuery,
    ) -> BoxFuture<'a, ProviderResult<Vec<RemoteEvent>>>;

    /// Fetches the full document of one event.
    fn get_event<'a>(
        &'a self,
        session: &'a Session,
        event_id: &'a str,
    ) -> BoxFuture<'a, ProviderResult<RemoteEvent>>;

    /// Creates an event and returns the stored document.
    fn insert_event<'a>(
        &'a self,
        session: &'a Session,
        event: &'a RemoteEvent,
    ) -> BoxFuture<'a, ProviderResult<RemoteEvent>>;

    /// Replaces the whole document of an event.
    fn update_event<'a>(
        &'a self,
        session: &'a Session,
        event_id: &'a str,
        event: &'a RemoteEvent,
    ) -> BoxFuture<'a, ProviderResult<RemoteEvent>>;

    /// Deletes an event.
    fn delete_event<'a>(
        &'a self,
        session: &'a Session,
        event_id: &'a str,
    ) -> BoxFuture<'a, ProviderResult<()>>;
}

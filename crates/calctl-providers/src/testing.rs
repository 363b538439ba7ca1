//! Fakes shared by the operation and tool tests.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex as StdMutex};

use chrono::{DateTime, Duration, TimeZone, Utc};
use url::Url;

use crate::error::{ProviderError, ProviderResult};
use crate::operations::CalendarOperations;
use crate::provider::{BoxFuture, CalendarApi, EventQuery, SessionSource};
use crate::remote_event::RemoteEvent;
use crate::session::Session;

#[derive(Default)]
pub struct FakeSessions {
    pub sessions: AtomicUsize,
    pub invalidations: AtomicUsize,
}

impl SessionSource for FakeSessions {
    fn session(&self) -> BoxFuture<'_, ProviderResult<Session>> {
        Box::pin(async move {
            self.sessions.fetch_add(1, Ordering::SeqCst);
            Ok(Session::new(
                "token",
                Url::parse("https://calendar.test/v3/").unwrap(),
                Utc::now() + Duration::hours(1),
            ))
        })
    }

    fn invalidate(&self) -> BoxFuture<'_, ProviderResult<()>> {
        Box::pin(async move {
            self.invalidations.fetch_add(1, Ordering::SeqCst);
            Ok(())
        })
    }
}

#[derive(Default)]
pub struct FakeApi {
    pub events: StdMutex<Vec<RemoteEvent>>,
    pub queries: StdMutex<Vec<EventQuery>>,
    pub inserted: StdMutex<Vec<RemoteEvent>>,
    pub updated: StdMutex<Vec<(String, RemoteEvent)>>,
    pub deleted: StdMutex<Vec<String>>,
    pub reject_token: bool,
}

impl FakeApi {
    pub fn with_events(events: Vec<RemoteEvent>) -> Self {
        Self {
            events: StdMutex::new(events),
            ..Default::default()
        }
    }

    pub fn mutations(&self) -> usize {
        self.inserted.lock().unwrap().len()
            + self.updated.lock().unwrap().len()
            + self.deleted.lock().unwrap().len()
    }
}

impl CalendarApi for FakeApi {
    fn name(&self) -> &str {
        "fake"
    }

    fn list_events<'a>(
        &'a self,
        _session: &'a Session,
        query: &'a EventQuery,
    ) -> BoxFuture<'a, ProviderResult<Vec<RemoteEvent>>> {
        Box::pin(async move {
            if self.reject_token {
                return Err(ProviderError::authentication("token rejected"));
            }
            self.queries.lock().unwrap().push(query.clone());
            let needle = query.text.as_deref().map(str::to_lowercase);
            let mut found: Vec<RemoteEvent> = self
                .events
                .lock()
                .unwrap()
                .iter()
                .filter(|e| match &needle {
                    Some(n) => e.display_title().to_lowercase().contains(n),
                    None => true,
                })
                .cloned()
                .collect();
            if let Some(max) = query.max_results {
                found.truncate(max as usize);
            }
            Ok(found)
        })
    }

    fn get_event<'a>(
        &'a self,
        _session: &'a Session,
        event_id: &'a str,
    ) -> BoxFuture<'a, ProviderResult<RemoteEvent>> {
        Box::pin(async move {
            self.events
                .lock()
                .unwrap()
                .iter()
                .find(|e| e.id.as_deref() == Some(event_id))
                .cloned()
                .ok_or_else(|| ProviderError::not_found(event_id))
        })
    }

    fn insert_event<'a>(
        &'a self,
        _session: &'a Session,
        event: &'a RemoteEvent,
    ) -> BoxFuture<'a, ProviderResult<RemoteEvent>> {
        Box::pin(async move {
            let mut stored = event.clone();
            stored.id = Some(format!("evt-{}", self.inserted.lock().unwrap().len() + 1));
            self.inserted.lock().unwrap().push(event.clone());
            self.events.lock().unwrap().push(stored.clone());
            Ok(stored)
        })
    }

    fn update_event<'a>(
        &'a self,
        _session: &'a Session,
        event_id: &'a str,
        event: &'a RemoteEvent,
    ) -> BoxFuture<'a, ProviderResult<RemoteEvent>> {
        Box::pin(async move {
            self.updated
                .lock()
                .unwrap()
                .push((event_id.to_string(), event.clone()));
            Ok(event.clone())
        })
    }

    fn delete_event<'a>(
        &'a self,
        _session: &'a Session,
        event_id: &'a str,
    ) -> BoxFuture<'a, ProviderResult<()>> {
        Box::pin(async move {
            self.deleted.lock().unwrap().push(event_id.to_string());
            Ok(())
        })
    }
}

/// Tuesday 2025-07-01, noon in New York.
pub fn fixed_now() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 7, 1, 16, 0, 0).unwrap()
}

pub fn operations(api: &Arc<FakeApi>, sessions: &Arc<FakeSessions>) -> CalendarOperations {
    CalendarOperations::new(sessions.clone(), api.clone(), chrono_tz::America::New_York)
        .with_clock(Arc::new(fixed_now))
}

pub fn event(json: serde_json::Value) -> RemoteEvent {
    serde_json::from_value(json).unwrap()
}

pub fn standup() -> RemoteEvent {
    event(serde_json::json!({
        "id": "standup-1",
        "summary": "Standup",
        "description": "Daily sync",
        "start": {"dateTime": "2025-07-03T09:00:00-04:00", "timeZone": "America/New_York"},
        "end": {"dateTime": "2025-07-03T09:15:00-04:00", "timeZone": "America/New_York"},
        "attendees": [{"email": "bob@example.com"}]
    }))
}

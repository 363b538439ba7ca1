//! Google Calendar API v3 client.

use chrono::SecondsFormat;
use reqwest::{Method, RequestBuilder, Response, StatusCode};
use serde::Deserialize;
use tracing::{debug, warn};
use url::Url;

use crate::error::{ProviderError, ProviderResult};
use crate::provider::{BoxFuture, CalendarApi, EventQuery};
use crate::remote_event::RemoteEvent;
use crate::session::Session;

use super::config::GoogleConfig;

/// Largest page the events.list endpoint serves.
const MAX_PAGE_SIZE: u32 = 2500;

/// Google Calendar API client bound to one calendar.
#[derive(Debug)]
pub struct GoogleCalendarClient {
    http_client: reqwest::Client,
    calendar_id: String,
}

impl GoogleCalendarClient {
    /// Creates a client for the configured calendar.
    pub fn new(config: &GoogleConfig) -> ProviderResult<Self> {
        let http_client = reqwest::Client::builder()
            .timeout(config.timeout)
            .user_agent(config.user_agent.clone())
            .build()
            .map_err(|e| {
                ProviderError::internal(format!("failed to create HTTP client: {e}")).with_source(e)
            })?;

        Ok(Self {
            http_client,
            calendar_id: config.calendar_id.clone(),
        })
    }

    fn events_url(&self, session: &Session, event_id: Option<&str>) -> ProviderResult<Url> {
        let mut path = format!("calendars/{}/events", urlencoding::encode(&self.calendar_id));
        if let Some(id) = event_id {
            path.push('/');
            path.push_str(&urlencoding::encode(id));
        }
        session
            .base_url()
            .join(&path)
            .map_err(|e| ProviderError::internal(format!("invalid API URL: {e}")))
    }

    fn request(&self, session: &Session, method: Method, url: Url) -> RequestBuilder {
        self.http_client
            .request(method, url)
            .bearer_auth(session.access_token())
    }

    async fn list_page(
        &self,
        session: &Session,
        query: &EventQuery,
        page_size: Option<u32>,
        page_token: Option<&str>,
    ) -> ProviderResult<EventListResponse> {
        let url = self.events_url(session, None)?;
        let mut request = self.request(session, Method::GET, url).query(&[
            (
                "timeMin",
                query.window.start.to_rfc3339_opts(SecondsFormat::Secs, true),
            ),
            (
                "timeMax",
                query.window.end.to_rfc3339_opts(SecondsFormat::Secs, true),
            ),
            ("singleEvents", "true".to_string()),
            ("orderBy", "startTime".to_string()),
        ]);

        if let Some(text) = &query.text {
            request = request.query(&[("q", text)]);
        }
        if let Some(size) = page_size {
            request = request.query(&[("maxResults", size.to_string())]);
        }
        if let Some(token) = page_token {
            request = request.query(&[("pageToken", token)]);
        }

        let response = send(request).await?;
        parse_json(response).await
    }

    /// Lists events, following `nextPageToken` until `max_results` is reached.
    pub async fn list(&self, session: &Session, query: &EventQuery) -> ProviderResult<Vec<RemoteEvent>> {
        let mut events = Vec::new();
        let mut page_token: Option<String> = None;

        loop {
            let remaining = query
                .max_results
                .map(|max| max.saturating_sub(events.len() as u32));
            if remaining == Some(0) {
                break;
            }
            let page_size = remaining.map(|r| r.min(MAX_PAGE_SIZE));

            let page = self
                .list_page(session, query, page_size, page_token.as_deref())
                .await?;
            events.extend(page.items);

            match page.next_page_token {
                Some(token) => page_token = Some(token),
                None => break,
            }
        }

        if let Some(max) = query.max_results {
            events.truncate(max as usize);
        }
        debug!(count = events.len(), calendar = %self.calendar_id, "listed events");
        Ok(events)
    }

    pub async fn get(&self, session: &Session, event_id: &str) -> ProviderResult<RemoteEvent> {
        let url = self.events_url(session, Some(event_id))?;
        let response = send(self.request(session, Method::GET, url)).await?;
        parse_json(response).await
    }

    pub async fn insert(&self, session: &Session, event: &RemoteEvent) -> ProviderResult<RemoteEvent> {
        let url = self.events_url(session, None)?;
        let response = send(self.request(session, Method::POST, url).json(event)).await?;
        let created: RemoteEvent = parse_json(response).await?;
        debug!(id = ?created.id, "inserted event");
        Ok(created)
    }

    pub async fn update(
        &self,
        session: &Session,
        event_id: &str,
        event: &RemoteEvent,
    ) -> ProviderResult<RemoteEvent> {
        let url = self.events_url(session, Some(event_id))?;
        let response = send(self.request(session, Method::PUT, url).json(event)).await?;
        debug!(id = event_id, "updated event");
        parse_json(response).await
    }

    pub async fn delete(&self, session: &Session, event_id: &str) -> ProviderResult<()> {
        let url = self.events_url(session, Some(event_id))?;
        send(self.request(session, Method::DELETE, url)).await?;
        debug!(id = event_id, "deleted event");
        Ok(())
    }
}

impl CalendarApi for GoogleCalendarClient {
    fn name(&self) -> &str {
        "google"
    }

    fn list_events<'a>(
        &'a self,
        session: &'a Session,
        query: &'a EventQuery,
    ) -> BoxFuture<'a, ProviderResult<Vec<RemoteEvent>>> {
        Box::pin(self.list(session, query))
    }

    fn get_event<'a>(
        &'a self,
        session: &'a Session,
        event_id: &'a str,
    ) -> BoxFuture<'a, ProviderResult<RemoteEvent>> {
        Box::pin(self.get(session, event_id))
    }

    fn insert_event<'a>(
        &'a self,
        session: &'a Session,
        event: &'a RemoteEvent,
    ) -> BoxFuture<'a, ProviderResult<RemoteEvent>> {
        Box::pin(self.insert(session, event))
    }

    fn update_event<'a>(
        &'a self,
        session: &'a Session,
        event_id: &'a str,
        event: &'a RemoteEvent,
    ) -> BoxFuture<'a, ProviderResult<RemoteEvent>> {
        Box::pin(self.update(session, event_id, event))
    }

    fn delete_event<'a>(
        &'a self,
        session: &'a Session,
        event_id: &'a str,
    ) -> BoxFuture<'a, ProviderResult<()>> {
        Box::pin(self.delete(session, event_id))
    }
}

/// Sends a request and maps transport failures and error statuses.
async fn send(request: RequestBuilder) -> ProviderResult<Response> {
    let response = request.send().await.map_err(|e| {
        let message = if e.is_timeout() {
            "request timeout".to_string()
        } else if e.is_connect() {
            format!("connection failed: {e}")
        } else {
            format!("request failed: {e}")
        };
        ProviderError::network(message).with_source(e)
    })?;

    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let retry_after = response
        .headers()
        .get("Retry-After")
        .and_then(|v| v.to_str().ok())
        .and_then(|s| s.parse::<u64>().ok());
    let body = response.text().await.unwrap_or_default();
    let detail = ApiErrorBody::parse(&body);
    warn!(%status, reason = ?detail.reason, "calendar API error");
    Err(map_status(status, retry_after, detail))
}

fn map_status(status: StatusCode, retry_after: Option<u64>, detail: ApiErrorBody) -> ProviderError {
    let message = detail.message.unwrap_or_else(|| status.to_string());
    let rate_limit_reason = matches!(
        detail.reason.as_deref(),
        Some("rateLimitExceeded" | "userRateLimitExceeded" | "quotaExceeded")
    );

    match status {
        StatusCode::TOO_MANY_REQUESTS => ProviderError::rate_limited(format!(
            "rate limit exceeded{}",
            retry_after
                .map(|s| format!(", retry after {s} seconds"))
                .unwrap_or_default()
        )),
        StatusCode::FORBIDDEN if rate_limit_reason => {
            ProviderError::rate_limited(format!("rate limit exceeded: {message}"))
        }
        StatusCode::UNAUTHORIZED => {
            ProviderError::authentication(format!("access token rejected: {message}"))
        }
        StatusCode::FORBIDDEN => ProviderError::permission_denied(format!("access denied: {message}")),
        StatusCode::NOT_FOUND | StatusCode::GONE => ProviderError::not_found(message),
        StatusCode::BAD_REQUEST => ProviderError::new(
            crate::error::ProviderErrorCode::InvalidInput,
            format!("request rejected by the calendar API: {message}"),
        ),
        _ => ProviderError::server(format!("API error ({status}): {message}")),
    }
}

async fn parse_json<T: serde::de::DeserializeOwned>(response: Response) -> ProviderResult<T> {
    let body = response
        .text()
        .await
        .map_err(|e| ProviderError::network(format!("failed to read response: {e}")))?;
    serde_json::from_str(&body)
        .map_err(|e| ProviderError::invalid_response(format!("failed to parse response: {e}")))
}

/// Response from the events.list endpoint.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct EventListResponse {
    #[serde(default)]
    items: Vec<RemoteEvent>,
    next_page_token: Option<String>,
}

/// The useful parts of `{"error": {"message": ..., "errors": [{"reason": ...}]}}`.
#[derive(Debug, Default)]
struct ApiErrorBody {
    message: Option<String>,
    reason: Option<String>,
}

impl ApiErrorBody {
    fn parse(body: &str) -> Self {
        #[derive(Deserialize)]
        struct Envelope {
            error: Inner,
        }
        #[derive(Deserialize)]
        struct Inner {
            message: Option<String>,
            #[serde(default)]
            errors: Vec<Reason>,
        }
        #[derive(Deserialize)]
        struct Reason {
            reason: Option<String>,
        }

        match serde_json::from_str::<Envelope>(body) {
            Ok(envelope) => Self {
                message: envelope.error.message,
                reason: envelope.error.errors.into_iter().find_map(|r| r.reason),
            },
            Err(_) => Self::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ProviderErrorCode;
    use calctl_core::TimeWindow;
    use chrono::{TimeZone, Utc};
    use mockito::Matcher;

    fn session(server: &mockito::ServerGuard) -> Session {
        let base = Url::parse(&format!("{}/calendar/v3/", server.url())).unwrap();
        Session::new("test-token", base, Utc::now() + chrono::Duration::hours(1))
    }

    fn client() -> GoogleCalendarClient {
        GoogleCalendarClient::new(&GoogleConfig::new()).unwrap()
    }

    fn query() -> EventQuery {
        let start = Utc.with_ymd_and_hms(2025, 7, 1, 12, 0, 0).unwrap();
        EventQuery::new(TimeWindow::days_ahead(start, 7).unwrap())
    }

    #[tokio::test]
    async fn list_sends_window_and_expansion_flags() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/calendar/v3/calendars/primary/events")
            .match_header("authorization", "Bearer test-token")
            .match_query(Matcher::AllOf(vec![
                Matcher::UrlEncoded("timeMin".into(), "2025-07-01T12:00:00Z".into()),
                Matcher::UrlEncoded("timeMax".into(), "2025-07-08T12:00:00Z".into()),
                Matcher::UrlEncoded("singleEvents".into(), "true".into()),
                Matcher::UrlEncoded("orderBy".into(), "startTime".into()),
                Matcher::UrlEncoded("maxResults".into(), "10".into()),
                Matcher::UrlEncoded("q".into(), "standup".into()),
            ]))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(
                r#"{"items": [{"id": "e1", "summary": "Standup",
                    "start": {"dateTime": "2025-07-03T09:00:00-04:00"},
                    "end": {"dateTime": "2025-07-03T09:15:00-04:00"}}]}"#,
            )
            .create_async()
            .await;

        let query = query().with_text("standup").with_max_results(10);
        let events = client().list(&session(&server), &query).await.unwrap();

        mock.assert_async().await;
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].id.as_deref(), Some("e1"));
    }

    #[tokio::test]
    async fn list_follows_pages() {
        let mut server = mockito::Server::new_async().await;
        let first = server
            .mock("GET", "/calendar/v3/calendars/primary/events")
            .match_query(Matcher::UrlEncoded("maxResults".into(), "3".into()))
            .with_status(200)
            .with_body(r#"{"items": [{"id": "e1"}], "nextPageToken": "p2"}"#)
            .create_async()
            .await;
        let second = server
            .mock("GET", "/calendar/v3/calendars/primary/events")
            .match_query(Matcher::AllOf(vec![
                Matcher::UrlEncoded("maxResults".into(), "2".into()),
                Matcher::UrlEncoded("pageToken".into(), "p2".into()),
            ]))
            .with_status(200)
            .with_body(r#"{"items": [{"id": "e2"}, {"id": "e3"}], "nextPageToken": "p3"}"#)
            .create_async()
            .await;

        let query = query().with_max_results(3);
        let events = client().list(&session(&server), &query).await.unwrap();
        first.assert_async().await;
        second.assert_async().await;
        let ids: Vec<_> = events.iter().filter_map(|e| e.id.as_deref()).collect();
        assert_eq!(ids, vec!["e1", "e2", "e3"]);
    }

    #[tokio::test]
    async fn insert_posts_document() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/calendar/v3/calendars/primary/events")
            .match_body(Matcher::PartialJsonString(
                r#"{"summary": "Standup", "start": {"date": "2025-07-04"}}"#.to_string(),
            ))
            .with_status(200)
            .with_body(r#"{"id": "new-id", "summary": "Standup"}"#)
            .create_async()
            .await;

        let event: RemoteEvent = serde_json::from_str(
            r#"{"summary": "Standup", "start": {"date": "2025-07-04"}, "end": {"date": "2025-07-05"}}"#,
        )
        .unwrap();
        let created = client().insert(&session(&server), &event).await.unwrap();
        mock.assert_async().await;
        assert_eq!(created.id.as_deref(), Some("new-id"));
    }

    #[tokio::test]
    async fn update_and_delete_address_the_event() {
        let mut server = mockito::Server::new_async().await;
        let put = server
            .mock("PUT", "/calendar/v3/calendars/primary/events/abc%40123")
            .with_status(200)
            .with_body(r#"{"id": "abc@123"}"#)
            .create_async()
            .await;
        let delete = server
            .mock("DELETE", "/calendar/v3/calendars/primary/events/abc%40123")
            .with_status(204)
            .create_async()
            .await;

        let session = session(&server);
        client()
            .update(&session, "abc@123", &RemoteEvent::default())
            .await
            .unwrap();
        client().delete(&session, "abc@123").await.unwrap();
        put.assert_async().await;
        delete.assert_async().await;
    }

    #[tokio::test]
    async fn status_mapping() {
        let cases = [
            (401, "{}", ProviderErrorCode::AuthenticationFailed),
            (
                403,
                r#"{"error": {"message": "Forbidden", "errors": [{"reason": "forbidden"}]}}"#,
                ProviderErrorCode::PermissionDenied,
            ),
            (
                403,
                r#"{"error": {"message": "Rate Limit Exceeded", "errors": [{"reason": "rateLimitExceeded"}]}}"#,
                ProviderErrorCode::RateLimited,
            ),
            (404, "{}", ProviderErrorCode::NotFound),
            (429, "{}", ProviderErrorCode::RateLimited),
            (500, "{}", ProviderErrorCode::ServerError),
        ];

        for (status, body, expected) in cases {
            let mut server = mockito::Server::new_async().await;
            server
                .mock("GET", "/calendar/v3/calendars/primary/events/e1")
                .with_status(status)
                .with_body(body)
                .create_async()
                .await;
            let err = client().get(&session(&server), "e1").await.unwrap_err();
            assert_eq!(err.code(), expected, "status {status}");
        }
    }

    #[tokio::test]
    async fn error_message_is_surfaced() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/calendar/v3/calendars/primary/events/e1")
            .with_status(403)
            .with_body(r#"{"error": {"code": 403, "message": "The user does not have write access"}}"#)
            .create_async()
            .await;
        let err = client().get(&session(&server), "e1").await.unwrap_err();
        assert!(err.message().contains("does not have write access"));
    }

    #[tokio::test]
    async fn garbage_body_is_invalid_response() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/calendar/v3/calendars/primary/events/e1")
            .with_status(200)
            .with_body("<html>")
            .create_async()
            .await;
        let err = client().get(&session(&server), "e1").await.unwrap_err();
        assert_eq!(err.code(), ProviderErrorCode::InvalidResponse);
    }
}

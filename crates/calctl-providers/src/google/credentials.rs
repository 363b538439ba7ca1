//! Credential lifecycle.
//!
//! [`CredentialState`] is the single credential slot of a process. Its
//! transitions are pure: [`CredentialState::next_step`] decides what to do and
//! [`CredentialState::apply`] folds the result back in. [`CredentialManager`]
//! performs the side effects (token store, refresh, interactive grant) under
//! one lock, so concurrent callers never race a refresh or run two grants.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};
use url::Url;

use crate::error::{ProviderError, ProviderErrorCode, ProviderResult};
use crate::provider::{BoxFuture, SessionSource};
use crate::session::Session;

use super::tokens::{Credential, TokenStore};

/// Obtains credentials from the provider.
pub trait GrantFlow: Send + Sync {
    /// Runs the interactive consent flow.
    fn authorize<'a>(&'a self, scopes: &'a [String]) -> BoxFuture<'a, ProviderResult<Credential>>;

    /// Exchanges the refresh token of `credential` for a new access token.
    ///
    /// A rejection by the provider is reported as `refresh_failed`.
    fn refresh<'a>(&'a self, credential: &'a Credential)
    -> BoxFuture<'a, ProviderResult<Credential>>;
}

/// The in-memory credential slot.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum CredentialState {
    /// The token store has not been read yet.
    #[default]
    Unloaded,
    /// No usable credential exists.
    NoCredential,
    /// A credential was read from the store but not checked yet.
    Loaded(Credential),
    /// A credential that was valid when last checked.
    Ready(Credential),
}

/// What the manager has to do next to reach a valid session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    /// Read the token store.
    Load,
    /// Promote the loaded credential to `Ready`.
    Accept,
    /// Hand out a session for the ready credential.
    Serve,
    /// Renew the access token with the refresh token.
    Refresh,
    /// Drop the credential from memory and the store.
    Discard,
    /// Run the interactive grant.
    Authorize,
}

/// Something that happened while driving the state machine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    Loaded(Option<Credential>),
    Accepted,
    Refreshed(Credential),
    RefreshRejected,
    Authorized(Credential),
    Discarded,
    /// The API rejected the access token.
    Invalidated,
}

impl CredentialState {
    /// Returns the credential held in this state, if any.
    pub fn credential(&self) -> Option<&Credential> {
        match self {
            Self::Loaded(c) | Self::Ready(c) => Some(c),
            Self::Unloaded | Self::NoCredential => None,
        }
    }

    /// Decides the next step towards a valid session at `now`.
    pub fn next_step(&self, now: DateTime<Utc>, required_scopes: &[String]) -> Step {
        match self {
            Self::Unloaded => Step::Load,
            Self::NoCredential => Step::Authorize,
            Self::Loaded(c) if !c.has_scopes(required_scopes) => Step::Discard,
            Self::Loaded(c) if c.is_valid(now) => Step::Accept,
            Self::Ready(c) if c.is_valid(now) => Step::Serve,
            Self::Loaded(c) | Self::Ready(c) if c.is_refreshable() => Step::Refresh,
            Self::Loaded(_) | Self::Ready(_) => Step::Discard,
        }
    }

    /// Applies an event and returns the new state.
    #[must_use]
    pub fn apply(self, event: Event) -> Self {
        match (self, event) {
            (_, Event::Loaded(Some(c))) => Self::Loaded(c),
            (_, Event::Loaded(None)) => Self::NoCredential,
            (Self::Loaded(c), Event::Accepted) => Self::Ready(c),
            (_, Event::Refreshed(c)) | (_, Event::Authorized(c)) => Self::Ready(c),
            (_, Event::RefreshRejected) | (_, Event::Discarded) => Self::NoCredential,
            (Self::Loaded(mut c) | Self::Ready(mut c), Event::Invalidated) => {
                if c.is_refreshable() {
                    c.access_token.clear();
                    Self::Loaded(c)
                } else {
                    Self::NoCredential
                }
            }
            (state, _) => state,
        }
    }
}

/// A read-only view of the stored grant.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CredentialStatus {
    /// Nothing stored.
    Missing,
    /// Usable without any network call.
    Valid { expiry: DateTime<Utc>, scopes: Vec<String> },
    /// Expired; `refreshable` tells whether a refresh can renew it.
    Expired { expiry: DateTime<Utc>, refreshable: bool },
    /// Stored, but granted without a required scope.
    InsufficientScopes { missing: Vec<String> },
}

/// Produces valid sessions, refreshing or re-acquiring the grant as needed.
pub struct CredentialManager {
    state: Mutex<CredentialState>,
    store: Arc<dyn TokenStore>,
    flow: Arc<dyn GrantFlow>,
    scopes: Vec<String>,
    api_base_url: Url,
    interactive: bool,
}

impl CredentialManager {
    pub fn new(
        store: Arc<dyn TokenStore>,
        flow: Arc<dyn GrantFlow>,
        scopes: Vec<String>,
        api_base_url: Url,
    ) -> Self {
        Self {
            state: Mutex::new(CredentialState::Unloaded),
            store,
            flow,
            scopes,
            api_base_url,
            interactive: true,
        }
    }

    /// Sets whether a missing or revoked grant may start the browser flow.
    #[must_use]
    pub fn with_interactive(mut self, interactive: bool) -> Self {
        self.interactive = interactive;
        self
    }

    /// Returns a session whose credential is valid right now.
    pub async fn authenticated_session(&self) -> ProviderResult<Session> {
        self.acquire(self.interactive).await
    }

    /// Obtains a usable grant, always allowing the browser flow.
    ///
    /// With `force` the stored grant is dropped first so consent is asked again.
    pub async fn sign_in(&self, force: bool) -> ProviderResult<Session> {
        if force {
            self.sign_out().await?;
        }
        self.acquire(true).await
    }

    async fn acquire(&self, interactive: bool) -> ProviderResult<Session> {
        let mut state = self.state.lock().await;
        loop {
            let now = Utc::now();
            let step = state.next_step(now, &self.scopes);
            debug!(?step, "credential step");
            match step {
                Step::Serve => {
                    let credential = state
                        .credential()
                        .ok_or_else(|| ProviderError::internal("ready state without credential"))?;
                    return Ok(Session::new(
                        credential.access_token.clone(),
                        self.api_base_url.clone(),
                        credential.expiry,
                    ));
                }
                Step::Load => {
                    let loaded = self.store.load()?;
                    *state = std::mem::take(&mut *state).apply(Event::Loaded(loaded));
                }
                Step::Accept => {
                    *state = std::mem::take(&mut *state).apply(Event::Accepted);
                }
                Step::Discard => {
                    info!("discarding stored credential");
                    self.store.clear()?;
                    *state = std::mem::take(&mut *state).apply(Event::Discarded);
                }
                Step::Refresh => {
                    let current = state
                        .credential()
                        .cloned()
                        .ok_or_else(|| ProviderError::internal("refresh without credential"))?;
                    match self.flow.refresh(&current).await {
                        Ok(fresh) => {
                            let renewed = current.renewed(fresh);
                            ensure_usable(&renewed, Utc::now())?;
                            self.store.save(&renewed)?;
                            info!(expiry = %renewed.expiry, "refreshed access token");
                            *state = std::mem::take(&mut *state).apply(Event::Refreshed(renewed));
                        }
                        Err(err) if err.code() == ProviderErrorCode::RefreshFailed => {
                            warn!(error = %err, "refresh rejected, dropping stored credential");
                            self.store.clear()?;
                            *state = std::mem::take(&mut *state).apply(Event::RefreshRejected);
                            if !interactive {
                                return Err(err);
                            }
                        }
                        Err(err) => return Err(err),
                    }
                }
                Step::Authorize => {
                    if !interactive {
                        return Err(ProviderError::authentication_required(
                            "no stored credential; run `calctl auth login` to authorize",
                        ));
                    }
                    info!("starting interactive authorization");
                    let credential = self.flow.authorize(&self.scopes).await?;
                    ensure_usable(&credential, Utc::now())?;
                    if !credential.has_scopes(&self.scopes) {
                        return Err(ProviderError::consent(format!(
                            "required scopes not granted: {}",
                            missing_scopes(&credential, &self.scopes).join(", ")
                        )));
                    }
                    self.store.save(&credential)?;
                    *state = std::mem::take(&mut *state).apply(Event::Authorized(credential));
                }
            }
        }
    }

    /// Forgets the current access token after the API rejected it.
    pub async fn invalidate(&self) -> ProviderResult<()> {
        let mut state = self.state.lock().await;
        let next = std::mem::take(&mut *state).apply(Event::Invalidated);
        if next == CredentialState::NoCredential {
            self.store.clear()?;
        }
        info!("access token rejected by the API");
        *state = next;
        Ok(())
    }

    /// Removes the stored grant.
    pub async fn sign_out(&self) -> ProviderResult<()> {
        let mut state = self.state.lock().await;
        self.store.clear()?;
        *state = CredentialState::NoCredential;
        info!("signed out");
        Ok(())
    }

    /// Reports the stored grant without refreshing or prompting.
    pub async fn status(&self) -> ProviderResult<CredentialStatus> {
        let mut state = self.state.lock().await;
        if *state == CredentialState::Unloaded {
            let loaded = self.store.load()?;
            *state = std::mem::take(&mut *state).apply(Event::Loaded(loaded));
        }
        let Some(credential) = state.credential() else {
            return Ok(CredentialStatus::Missing);
        };
        let now = Utc::now();
        let status = if !credential.has_scopes(&self.scopes) {
            CredentialStatus::InsufficientScopes {
                missing: missing_scopes(credential, &self.scopes),
            }
        } else if credential.is_valid(now) {
            CredentialStatus::Valid {
                expiry: credential.expiry,
                scopes: credential.scopes.clone(),
            }
        } else {
            CredentialStatus::Expired {
                expiry: credential.expiry,
                refreshable: credential.is_refreshable(),
            }
        };
        Ok(status)
    }
}

impl std::fmt::Debug for CredentialManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CredentialManager")
            .field("scopes", &self.scopes)
            .field("api_base_url", &self.api_base_url.as_str())
            .field("interactive", &self.interactive)
            .finish_non_exhaustive()
    }
}

impl SessionSource for CredentialManager {
    fn session(&self) -> BoxFuture<'_, ProviderResult<Session>> {
        Box::pin(self.authenticated_session())
    }

    fn invalidate(&self) -> BoxFuture<'_, ProviderResult<()>> {
        Box::pin(CredentialManager::invalidate(self))
    }
}

fn ensure_usable(credential: &Credential, now: DateTime<Utc>) -> ProviderResult<()> {
    if credential.is_valid(now) {
        Ok(())
    } else {
        Err(ProviderError::invalid_response(
            "token endpoint returned an empty or already expired access token",
        ))
    }
}

fn missing_scopes(credential: &Credential, required: &[String]) -> Vec<String> {
    required
        .iter()
        .filter(|s| !credential.scopes.contains(s))
        .cloned()
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use std::sync::Mutex as StdMutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    const SCOPE: &str = "https://www.googleapis.com/auth/calendar";

    fn scopes() -> Vec<String> {
        vec![SCOPE.to_string()]
    }

    fn valid(token: &str) -> Credential {
        Credential::from_grant(token, Some("refresh".to_string()), Some(3600), scopes(), Utc::now())
    }

    fn expired(refresh: Option<&str>) -> Credential {
        Credential {
            access_token: "stale".to_string(),
            refresh_token: refresh.map(String::from),
            expiry: Utc::now() - Duration::minutes(5),
            scopes: scopes(),
        }
    }

    #[derive(Default)]
    struct MemoryStore {
        record: StdMutex<Option<Credential>>,
        saves: AtomicUsize,
        clears: AtomicUsize,
    }

    impl MemoryStore {
        fn with(credential: Credential) -> Self {
            Self {
                record: StdMutex::new(Some(credential)),
                ..Default::default()
            }
        }

        fn record(&self) -> Option<Credential> {
            self.record.lock().unwrap().clone()
        }
    }

    impl TokenStore for MemoryStore {
        fn load(&self) -> ProviderResult<Option<Credential>> {
            Ok(self.record())
        }

        fn save(&self, credential: &Credential) -> ProviderResult<()> {
            self.saves.fetch_add(1, Ordering::SeqCst);
            *self.record.lock().unwrap() = Some(credential.clone());
            Ok(())
        }

        fn clear(&self) -> ProviderResult<()> {
            self.clears.fetch_add(1, Ordering::SeqCst);
            *self.record.lock().unwrap() = None;
            Ok(())
        }
    }

    #[derive(Default)]
    struct FakeFlow {
        refresh_result: StdMutex<Option<ProviderResult<Credential>>>,
        authorize_result: StdMutex<Option<ProviderResult<Credential>>>,
        refreshes: AtomicUsize,
        authorizations: AtomicUsize,
    }

    impl FakeFlow {
        fn refreshing_to(credential: Credential) -> Self {
            let flow = Self::default();
            *flow.refresh_result.lock().unwrap() = Some(Ok(credential));
            flow
        }

        fn rejecting_refresh() -> Self {
            let flow = Self::default();
            *flow.refresh_result.lock().unwrap() =
                Some(Err(ProviderError::refresh_failed("invalid_grant")));
            flow
        }

        fn authorizing_to(self, credential: Credential) -> Self {
            *self.authorize_result.lock().unwrap() = Some(Ok(credential));
            self
        }
    }

    impl GrantFlow for FakeFlow {
        fn authorize<'a>(
            &'a self,
            _scopes: &'a [String],
        ) -> BoxFuture<'a, ProviderResult<Credential>> {
            Box::pin(async move {
                self.authorizations.fetch_add(1, Ordering::SeqCst);
                self.authorize_result
                    .lock()
                    .unwrap()
                    .take()
                    .unwrap_or_else(|| Err(ProviderError::consent("access_denied")))
            })
        }

        fn refresh<'a>(
            &'a self,
            _credential: &'a Credential,
        ) -> BoxFuture<'a, ProviderResult<Credential>> {
            Box::pin(async move {
                self.refreshes.fetch_add(1, Ordering::SeqCst);
                self.refresh_result
                    .lock()
                    .unwrap()
                    .take()
                    .unwrap_or_else(|| Err(ProviderError::network("offline")))
            })
        }
    }

    fn manager(store: &Arc<MemoryStore>, flow: &Arc<FakeFlow>) -> CredentialManager {
        CredentialManager::new(
            store.clone(),
            flow.clone(),
            scopes(),
            Url::parse("https://www.googleapis.com/calendar/v3/").unwrap(),
        )
    }

    mod transitions {
        use super::*;

        #[test]
        fn unloaded_loads_first() {
            assert_eq!(CredentialState::Unloaded.next_step(Utc::now(), &scopes()), Step::Load);
        }

        #[test]
        fn loaded_valid_is_accepted_then_served() {
            let now = Utc::now();
            let state = CredentialState::Loaded(valid("a"));
            assert_eq!(state.next_step(now, &scopes()), Step::Accept);
            let state = state.apply(Event::Accepted);
            assert_eq!(state.next_step(now, &scopes()), Step::Serve);
        }

        #[test]
        fn expired_refreshable_refreshes() {
            let state = CredentialState::Loaded(expired(Some("r")));
            assert_eq!(state.next_step(Utc::now(), &scopes()), Step::Refresh);
        }

        #[test]
        fn expired_without_refresh_token_is_discarded() {
            let state = CredentialState::Loaded(expired(None));
            assert_eq!(state.next_step(Utc::now(), &scopes()), Step::Discard);
            assert_eq!(state.apply(Event::Discarded), CredentialState::NoCredential);
        }

        #[test]
        fn insufficient_scopes_are_discarded() {
            let state = CredentialState::Loaded(valid("a"));
            let wider = vec![SCOPE.to_string(), "extra".to_string()];
            assert_eq!(state.next_step(Utc::now(), &wider), Step::Discard);
        }

        #[test]
        fn rejected_refresh_goes_to_no_credential() {
            let state = CredentialState::Ready(expired(Some("r"))).apply(Event::RefreshRejected);
            assert_eq!(state, CredentialState::NoCredential);
            assert_eq!(state.next_step(Utc::now(), &scopes()), Step::Authorize);
        }

        #[test]
        fn invalidation_forces_refresh_or_reacquire() {
            let refreshable = CredentialState::Ready(valid("a")).apply(Event::Invalidated);
            assert_eq!(refreshable.next_step(Utc::now(), &scopes()), Step::Refresh);

            let mut bare = valid("a");
            bare.refresh_token = None;
            let state = CredentialState::Ready(bare).apply(Event::Invalidated);
            assert_eq!(state, CredentialState::NoCredential);
        }

        #[test]
        fn unrelated_events_leave_state_alone() {
            let state = CredentialState::NoCredential.apply(Event::Accepted);
            assert_eq!(state, CredentialState::NoCredential);
        }
    }

    #[tokio::test]
    async fn valid_stored_credential_needs_no_network() {
        let store = Arc::new(MemoryStore::with(valid("cached")));
        let flow = Arc::new(FakeFlow::default());
        let manager = manager(&store, &flow);

        let session = manager.authenticated_session().await.unwrap();
        assert_eq!(session.access_token(), "cached");
        let again = manager.authenticated_session().await.unwrap();
        assert_eq!(again.access_token(), "cached");

        assert_eq!(flow.refreshes.load(Ordering::SeqCst), 0);
        assert_eq!(flow.authorizations.load(Ordering::SeqCst), 0);
        assert_eq!(store.saves.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn successful_refresh_replaces_record() {
        let store = Arc::new(MemoryStore::with(expired(Some("keep-me"))));
        let fresh = Credential::from_grant("fresh", None, Some(3600), vec![], Utc::now());
        let flow = Arc::new(FakeFlow::refreshing_to(fresh));
        let manager = manager(&store, &flow);

        let session = manager.authenticated_session().await.unwrap();
        assert_eq!(session.access_token(), "fresh");

        let record = store.record().unwrap();
        assert_eq!(record.access_token, "fresh");
        assert_eq!(record.refresh_token.as_deref(), Some("keep-me"));
        assert_eq!(record.scopes, scopes());
        assert!(record.is_valid(Utc::now()));
        assert_eq!(flow.authorizations.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn failed_refresh_removes_record_and_authorizes() {
        let store = Arc::new(MemoryStore::with(expired(Some("revoked"))));
        let flow = Arc::new(FakeFlow::rejecting_refresh().authorizing_to(valid("granted")));
        let manager = manager(&store, &flow);

        let session = manager.authenticated_session().await.unwrap();
        assert_eq!(session.access_token(), "granted");
        assert_eq!(store.clears.load(Ordering::SeqCst), 1);
        assert_eq!(flow.authorizations.load(Ordering::SeqCst), 1);
        assert_eq!(store.record().unwrap().access_token, "granted");
    }

    #[tokio::test]
    async fn failed_refresh_without_interaction_surfaces_error() {
        let store = Arc::new(MemoryStore::with(expired(Some("revoked"))));
        let flow = Arc::new(FakeFlow::rejecting_refresh());
        let manager = manager(&store, &flow).with_interactive(false);

        let err = manager.authenticated_session().await.unwrap_err();
        assert_eq!(err.code(), ProviderErrorCode::RefreshFailed);
        assert!(store.record().is_none());

        let err = manager.authenticated_session().await.unwrap_err();
        assert_eq!(err.code(), ProviderErrorCode::AuthenticationRequired);
        assert_eq!(flow.authorizations.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn transient_refresh_failure_keeps_record() {
        let store = Arc::new(MemoryStore::with(expired(Some("r"))));
        let flow = Arc::new(FakeFlow::default());
        let manager = manager(&store, &flow);

        let err = manager.authenticated_session().await.unwrap_err();
        assert_eq!(err.code(), ProviderErrorCode::NetworkError);
        assert!(store.record().is_some());
    }

    #[tokio::test]
    async fn consent_denied_is_not_retried() {
        let store = Arc::new(MemoryStore::default());
        let flow = Arc::new(FakeFlow::default());
        let manager = manager(&store, &flow);

        let err = manager.authenticated_session().await.unwrap_err();
        assert_eq!(err.code(), ProviderErrorCode::Consent);
        assert_eq!(flow.authorizations.load(Ordering::SeqCst), 1);
        assert!(store.record().is_none());
    }

    #[tokio::test]
    async fn grant_without_required_scope_is_rejected() {
        let store = Arc::new(MemoryStore::default());
        let narrow = Credential::from_grant("a", None, Some(3600), vec!["other".into()], Utc::now());
        let flow = Arc::new(FakeFlow::default().authorizing_to(narrow));
        let manager = manager(&store, &flow);

        let err = manager.authenticated_session().await.unwrap_err();
        assert_eq!(err.code(), ProviderErrorCode::Consent);
        assert!(store.record().is_none());
    }

    #[tokio::test]
    async fn concurrent_callers_share_one_grant() {
        let store = Arc::new(MemoryStore::default());
        let flow = Arc::new(FakeFlow::default().authorizing_to(valid("granted")));
        let manager = Arc::new(manager(&store, &flow));

        let (a, b) = tokio::join!(
            manager.authenticated_session(),
            manager.authenticated_session()
        );
        assert_eq!(a.unwrap().access_token(), "granted");
        assert_eq!(b.unwrap().access_token(), "granted");
        assert_eq!(flow.authorizations.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn invalidate_then_refresh() {
        let store = Arc::new(MemoryStore::with(valid("rejected")));
        let flow = Arc::new(FakeFlow::refreshing_to(valid("renewed")));
        let manager = manager(&store, &flow);

        manager.authenticated_session().await.unwrap();
        manager.invalidate().await.unwrap();
        let session = manager.authenticated_session().await.unwrap();
        assert_eq!(session.access_token(), "renewed");
        assert_eq!(flow.refreshes.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn status_and_sign_out() {
        let store = Arc::new(MemoryStore::with(expired(Some("r"))));
        let flow = Arc::new(FakeFlow::default());
        let manager = manager(&store, &flow);

        assert!(matches!(
            manager.status().await.unwrap(),
            CredentialStatus::Expired { refreshable: true, .. }
        ));
        manager.sign_out().await.unwrap();
        assert_eq!(manager.status().await.unwrap(), CredentialStatus::Missing);
        assert!(store.record().is_none());
        assert_eq!(flow.refreshes.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn forced_sign_in_asks_again_even_when_non_interactive() {
        let store = Arc::new(MemoryStore::with(valid("old")));
        let flow = Arc::new(FakeFlow::default().authorizing_to(valid("fresh")));
        let manager = manager(&store, &flow).with_interactive(false);

        let session = manager.sign_in(true).await.unwrap();
        assert_eq!(session.access_token(), "fresh");
        assert_eq!(flow.authorizations.load(Ordering::SeqCst), 1);
        assert_eq!(store.record().unwrap().access_token, "fresh");

        // an existing grant is reused without force
        manager.sign_in(false).await.unwrap();
        assert_eq!(flow.authorizations.load(Ordering::SeqCst), 1);
    }
}

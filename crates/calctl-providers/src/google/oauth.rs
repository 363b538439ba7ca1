//! OAuth 2.0 PKCE flow for Google APIs.
//!
//! Authorization Code flow with PKCE (RFC 7636) and a loopback redirect, as
//! recommended for installed applications:
//!
//! 1. Generate a code verifier, its SHA-256 challenge and a random state
//! 2. Bind a listener on 127.0.0.1 within the configured port range
//! 3. Open the browser on Google's consent page (or print the URL)
//! 4. Receive the redirect, check the state, extract the code
//! 5. Exchange the code (with the verifier) for tokens
//!
//! The client registration file is only read when a grant or refresh needs
//! it, so a valid stored token never touches it.

use std::io::{BufRead, BufReader, ErrorKind, Write};
use std::net::{TcpListener, TcpStream};
use std::path::PathBuf;
use std::thread;
use std::time::{Duration, Instant};

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use chrono::Utc;
use rand::Rng as _;
use serde::Deserialize;
use sha2::{Digest, Sha256};
use tracing::{debug, error, info, warn};
use url::Url;

use crate::error::{ProviderError, ProviderResult};
use crate::provider::BoxFuture;

use super::config::{GoogleConfig, OAuthCredentials};
use super::credentials::GrantFlow;
use super::tokens::Credential;

/// The PKCE code verifier length (in bytes, before base64 encoding).
const CODE_VERIFIER_LENGTH: usize = 32;

/// Timeout for waiting for the OAuth callback.
const CALLBACK_TIMEOUT: Duration = Duration::from_secs(300);

/// How often the loopback listener is polled for a connection.
const ACCEPT_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// How long a connected browser may take to send its request line.
const REQUEST_READ_TIMEOUT: Duration = Duration::from_secs(5);

/// Token endpoint error codes that mean the user or their organisation
/// refused consent.
const CONSENT_ERRORS: &[&str] = &["access_denied", "admin_policy_enforced", "org_internal"];

/// OAuth client for Google APIs.
#[derive(Debug)]
pub struct OAuthClient {
    client_secret_path: PathBuf,
    auth_endpoint: Url,
    token_endpoint: Url,
    port_range: (u16, u16),
    open_browser: bool,
    callback_timeout: Duration,
    http_client: reqwest::Client,
}

impl OAuthClient {
    /// Creates an OAuth client from the backend configuration.
    pub fn new(config: &GoogleConfig) -> ProviderResult<Self> {
        let http_client = reqwest::Client::builder()
            .timeout(config.timeout)
            .user_agent(config.user_agent.clone())
            .build()
            .map_err(|e| {
                ProviderError::internal(format!("failed to create HTTP client: {e}")).with_source(e)
            })?;

        Ok(Self {
            client_secret_path: config.client_secret_path.clone(),
            auth_endpoint: config.auth_endpoint.clone(),
            token_endpoint: config.token_endpoint.clone(),
            port_range: config.loopback_port_range,
            open_browser: config.open_browser,
            callback_timeout: CALLBACK_TIMEOUT,
            http_client,
        })
    }

    /// Disables launching a browser; the URL is only printed.
    #[must_use]
    pub fn without_browser(mut self) -> Self {
        self.open_browser = false;
        self
    }

    fn credentials(&self) -> ProviderResult<OAuthCredentials> {
        OAuthCredentials::from_file(&self.client_secret_path)
    }

    /// Runs the interactive consent flow.
    pub async fn authorize_interactively(&self, scopes: &[String]) -> ProviderResult<Credential> {
        let credentials = self.credentials()?;
        let pkce = PkceFlow::new();

        let (listener, port) = bind_loopback_server(self.port_range)?;
        let redirect_uri = format!("http://127.0.0.1:{port}/callback");
        let auth_url = pkce.build_auth_url(
            &self.auth_endpoint,
            &credentials.client_id,
            &redirect_uri,
            scopes,
        );

        info!(port, "waiting for OAuth callback");
        if !self.open_browser {
            eprintln!("\nOpen this URL in your browser to authorize calctl:\n\n{auth_url}\n");
        } else if let Err(e) = open::that(auth_url.as_str()) {
            warn!(error = %e, "failed to open browser");
            eprintln!("\nOpen this URL in your browser to authorize calctl:\n\n{auth_url}\n");
        }

        let timeout = self.callback_timeout;
        let callback = tokio::task::spawn_blocking(move || wait_for_callback(listener, timeout))
            .await
            .map_err(|e| ProviderError::internal(format!("callback listener failed: {e}")))??;

        let code = match callback {
            Callback::Code { code, state } if state == pkce.state => code,
            Callback::Code { .. } => {
                return Err(ProviderError::authentication(
                    "OAuth state mismatch, authorization response rejected",
                ));
            }
            Callback::Denied(reason) => return Err(ProviderError::consent(reason)),
        };

        info!("received authorization code, exchanging for tokens");
        let params = [
            ("client_id", credentials.client_id.as_str()),
            ("client_secret", credentials.client_secret.as_str()),
            ("code", code.as_str()),
            ("code_verifier", pkce.verifier.as_str()),
            ("grant_type", "authorization_code"),
            ("redirect_uri", redirect_uri.as_str()),
        ];
        let response = self.post_token(&params).await.map_err(|err| match err {
            TokenEndpointError::Rejected { error, description } => {
                if CONSENT_ERRORS.contains(&error.as_str()) {
                    ProviderError::consent(error)
                } else {
                    ProviderError::authentication(format!(
                        "token exchange rejected: {error}{}",
                        description.map(|d| format!(" ({d})")).unwrap_or_default()
                    ))
                }
            }
            TokenEndpointError::Provider(e) => e,
        })?;

        info!("obtained tokens");
        Ok(response.into_credential(scopes))
    }

    /// Exchanges the refresh token for a new access token.
    pub async fn refresh_credential(&self, credential: &Credential) -> ProviderResult<Credential> {
        let refresh_token = credential
            .refresh_token
            .as_deref()
            .ok_or_else(|| ProviderError::refresh_failed("credential has no refresh token"))?;
        let credentials = self.credentials()?;

        let params = [
            ("client_id", credentials.client_id.as_str()),
            ("client_secret", credentials.client_secret.as_str()),
            ("refresh_token", refresh_token),
            ("grant_type", "refresh_token"),
        ];
        let response = self.post_token(&params).await.map_err(|err| match err {
            TokenEndpointError::Rejected { error, description } => ProviderError::refresh_failed(
                format!(
                    "token refresh rejected: {error}{}",
                    description.map(|d| format!(" ({d})")).unwrap_or_default()
                ),
            ),
            TokenEndpointError::Provider(e) => e,
        })?;

        debug!("token endpoint accepted refresh");
        Ok(response.into_credential(&[]))
    }

    async fn post_token(&self, params: &[(&str, &str)]) -> Result<TokenResponse, TokenEndpointError> {
        let response = self
            .http_client
            .post(self.token_endpoint.clone())
            .form(params)
            .send()
            .await
            .map_err(|e| {
                TokenEndpointError::Provider(
                    ProviderError::network(format!("token request failed: {e}")).with_source(e),
                )
            })?;

        let status = response.status();
        let body = response.text().await.map_err(|e| {
            TokenEndpointError::Provider(ProviderError::network(format!(
                "failed to read token response: {e}"
            )))
        })?;

        if status.is_server_error() {
            return Err(TokenEndpointError::Provider(ProviderError::server(format!(
                "token endpoint error ({status})"
            ))));
        }

        if !status.is_success() {
            let parsed: TokenErrorResponse = serde_json::from_str(&body).unwrap_or(TokenErrorResponse {
                error: format!("http_{}", status.as_u16()),
                error_description: None,
            });
            return Err(TokenEndpointError::Rejected {
                error: parsed.error,
                description: parsed.error_description,
            });
        }

        serde_json::from_str(&body).map_err(|e| {
            TokenEndpointError::Provider(ProviderError::invalid_response(format!(
                "invalid token response: {e}"
            )))
        })
    }
}

impl GrantFlow for OAuthClient {
    fn authorize<'a>(&'a self, scopes: &'a [String]) -> BoxFuture<'a, ProviderResult<Credential>> {
        Box::pin(self.authorize_interactively(scopes))
    }

    fn refresh<'a>(
        &'a self,
        credential: &'a Credential,
    ) -> BoxFuture<'a, ProviderResult<Credential>> {
        Box::pin(self.refresh_credential(credential))
    }
}

enum TokenEndpointError {
    /// The endpoint answered with an OAuth error (4xx).
    Rejected {
        error: String,
        description: Option<String>,
    },
    Provider(ProviderError),
}

/// Response from Google's token endpoint.
#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    refresh_token: Option<String>,
    #[serde(default)]
    expires_in: Option<i64>,
    /// Space-separated granted scopes.
    #[serde(default)]
    scope: Option<String>,
}

impl TokenResponse {
    fn into_credential(self, requested: &[String]) -> Credential {
        let scopes = match self.scope {
            Some(scope) => scope.split_whitespace().map(String::from).collect(),
            None => requested.to_vec(),
        };
        Credential::from_grant(
            self.access_token,
            self.refresh_token,
            self.expires_in,
            scopes,
            Utc::now(),
        )
    }
}

#[derive(Debug, Deserialize)]
struct TokenErrorResponse {
    error: String,
    #[serde(default)]
    error_description: Option<String>,
}

/// What the browser redirect carried.
#[derive(Debug, Clone, PartialEq, Eq)]
enum Callback {
    Code { code: String, state: String },
    Denied(String),
}

/// Tries to bind a TCP listener on an available port in the given range.
fn bind_loopback_server(port_range: (u16, u16)) -> ProviderResult<(TcpListener, u16)> {
    for port in port_range.0..=port_range.1 {
        if let Ok(listener) = TcpListener::bind(("127.0.0.1", port)) {
            debug!(port, "bound loopback listener");
            return Ok((listener, port));
        }
    }
    Err(ProviderError::setup(format!(
        "no available port for the OAuth redirect in range {}-{}",
        port_range.0, port_range.1
    )))
}

/// Blocks until the browser hits the callback path or the timeout elapses.
///
/// The listener is dropped on return, so the port is released either way.
fn wait_for_callback(listener: TcpListener, timeout: Duration) -> ProviderResult<Callback> {
    listener.set_nonblocking(true).map_err(|e| {
        ProviderError::internal(format!("failed to configure callback listener: {e}"))
    })?;
    let deadline = Instant::now() + timeout;

    loop {
        if Instant::now() >= deadline {
            return Err(ProviderError::authentication(format!(
                "no authorization response within {} seconds",
                timeout.as_secs()
            )));
        }

        match listener.accept() {
            Ok((stream, _)) => {
                if let Err(e) = prepare_stream(&stream) {
                    warn!(error = %e, "dropping callback connection");
                    continue;
                }
                if let Some(callback) = handle_callback(stream) {
                    return Ok(callback);
                }
            }
            Err(e) if e.kind() == ErrorKind::WouldBlock => thread::sleep(ACCEPT_POLL_INTERVAL),
            Err(e) => {
                error!(error = %e, "failed to accept connection");
                thread::sleep(ACCEPT_POLL_INTERVAL);
            }
        }
    }
}

/// Switches an accepted connection back to blocking reads with a timeout.
fn prepare_stream(stream: &TcpStream) -> std::io::Result<()> {
    stream.set_nonblocking(false)?;
    stream.set_read_timeout(Some(REQUEST_READ_TIMEOUT))
}

/// Answers one loopback request; returns `None` for unrelated requests.
fn handle_callback(mut stream: TcpStream) -> Option<Callback> {
    let mut request_line = String::new();
    BufReader::new(&stream).read_line(&mut request_line).ok()?;

    let callback = parse_callback(&request_line)?;

    let response = match callback {
        Callback::Code { .. } => {
            "HTTP/1.1 200 OK\r\nContent-Type: text/html\r\nConnection: close\r\n\r\n\
            <html><body><h1>Authorization Successful</h1>\
            <p>You can close this window and return to the terminal.</p></body></html>"
        }
        Callback::Denied(_) => {
            "HTTP/1.1 400 Bad Request\r\nContent-Type: text/html\r\nConnection: close\r\n\r\n\
            <html><body><h1>Authorization Failed</h1>\
            <p>You can close this window.</p></body></html>"
        }
    };
    let _ = stream.write_all(response.as_bytes());
    let _ = stream.flush();

    Some(callback)
}

/// Parses `GET /callback?code=...&state=... HTTP/1.1`.
fn parse_callback(request_line: &str) -> Option<Callback> {
    let mut parts = request_line.split_whitespace();
    if parts.next()? != "GET" {
        return None;
    }
    let target = parts.next()?;
    if !target.starts_with("/callback") {
        return None;
    }

    let url = Url::parse(&format!("http://127.0.0.1{target}")).ok()?;
    let mut code = None;
    let mut state = None;
    let mut error = None;
    for (key, value) in url.query_pairs() {
        match key.as_ref() {
            "code" => code = Some(value.into_owned()),
            "state" => state = Some(value.into_owned()),
            "error" => error = Some(value.into_owned()),
            _ => {}
        }
    }

    Some(match (error, code) {
        (Some(error), _) => Callback::Denied(error),
        (None, Some(code)) => Callback::Code {
            code,
            state: state.unwrap_or_default(),
        },
        (None, None) => Callback::Denied("missing authorization code".to_string()),
    })
}

/// PKCE flow state (RFC 7636).
#[derive(Debug)]
pub struct PkceFlow {
    /// The code verifier (high-entropy random string).
    pub verifier: String,
    /// The code challenge (SHA-256 hash of verifier, base64url encoded).
    pub challenge: String,
    /// Random state for CSRF protection.
    pub state: String,
}

impl PkceFlow {
    /// Creates a new PKCE flow with random verifier and state.
    pub fn new() -> Self {
        let verifier = random_token(CODE_VERIFIER_LENGTH);
        let challenge = Self::compute_challenge(&verifier);
        Self {
            verifier,
            challenge,
            state: random_token(16),
        }
    }

    /// Computes the SHA-256 challenge for a code verifier.
    fn compute_challenge(verifier: &str) -> String {
        URL_SAFE_NO_PAD.encode(Sha256::digest(verifier.as_bytes()))
    }

    /// Builds the authorization URL for offline access.
    pub fn build_auth_url(
        &self,
        endpoint: &Url,
        client_id: &str,
        redirect_uri: &str,
        scopes: &[String],
    ) -> Url {
        let mut url = endpoint.clone();
        url.query_pairs_mut()
            .append_pair("client_id", client_id)
            .append_pair("redirect_uri", redirect_uri)
            .append_pair("response_type", "code")
            .append_pair("scope", &scopes.join(" "))
            .append_pair("code_challenge", &self.challenge)
            .append_pair("code_challenge_method", "S256")
            .append_pair("state", &self.state)
            .append_pair("access_type", "offline")
            .append_pair("prompt", "consent");
        url
    }
}

impl Default for PkceFlow {
    fn default() -> Self {
        Self::new()
    }
}

fn random_token(len: usize) -> String {
    let mut rng = rand::rng();
    let bytes: Vec<u8> = (0..len).map(|_| rng.random()).collect();
    URL_SAFE_NO_PAD.encode(&bytes)
}

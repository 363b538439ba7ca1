//! Google Calendar backend configuration.

use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono_tz::Tz;
use serde::Deserialize;
use url::Url;

use crate::error::{ProviderError, ProviderResult};

/// OAuth 2.0 client registration for Google API access.
///
/// Users must provide their own OAuth client ID and secret, as Google
/// requires registered applications for API access.
#[derive(Clone)]
pub struct OAuthCredentials {
    /// The OAuth 2.0 client ID from Google Cloud Console.
    pub client_id: String,
    /// The OAuth 2.0 client secret from Google Cloud Console.
    pub client_secret: String,
}

impl std::fmt::Debug for OAuthCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OAuthCredentials")
            .field("client_id", &self.client_id)
            .field("client_secret", &"<redacted>")
            .finish()
    }
}

/// Structure of Google's OAuth client JSON file.
///
/// Supports the Cloud Console download (`installed` or `web` section) and a
/// flat form with `client_id`/`client_secret` at the root.
#[derive(Debug, Deserialize)]
struct ClientSecretFile {
    installed: Option<NestedCredentials>,
    web: Option<NestedCredentials>,
    client_id: Option<String>,
    client_secret: Option<String>,
}

#[derive(Debug, Deserialize)]
struct NestedCredentials {
    client_id: String,
    client_secret: String,
}

impl OAuthCredentials {
    /// Creates new OAuth credentials.
    pub fn new(client_id: impl Into<String>, client_secret: impl Into<String>) -> Self {
        Self {
            client_id: client_id.into(),
            client_secret: client_secret.into(),
        }
    }

    /// Loads the client registration file.
    ///
    /// A missing file is a setup error naming the expected path.
    pub fn from_file(path: impl AsRef<Path>) -> ProviderResult<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                ProviderError::missing_client_secret(path)
            } else {
                ProviderError::setup(format!(
                    "failed to read credentials file {}: {e}",
                    path.display()
                ))
                .with_source(e)
            }
        })?;
        Self::from_json(&content).map_err(|e| {
            ProviderError::setup(format!("invalid credentials file {}: {e}", path.display()))
        })
    }

    /// Parses a client registration JSON string.
    pub fn from_json(json: &str) -> Result<Self, String> {
        let file: ClientSecretFile = serde_json::from_str(json)
            .map_err(|e| format!("failed to parse credentials JSON: {e}"))?;

        if let Some(creds) = file.installed.or(file.web) {
            return Ok(Self::new(creds.client_id, creds.client_secret));
        }

        if let (Some(client_id), Some(client_secret)) = (file.client_id, file.client_secret) {
            return Ok(Self::new(client_id, client_secret));
        }

        Err("expected an 'installed' or 'web' section, or 'client_id'/'client_secret' at the root".to_string())
    }

    /// Checks that the client ID and secret look like a Google registration.
    pub fn validate(&self) -> Result<(), &'static str> {
        if self.client_id.is_empty() {
            return Err("client_id is required");
        }
        if !self.client_id.ends_with(".apps.googleusercontent.com") {
            return Err("client_id should end with .apps.googleusercontent.com");
        }
        if self.client_secret.is_empty() {
            return Err("client_secret is required");
        }
        Ok(())
    }
}

/// Configuration for the Google Calendar backend.
#[derive(Debug, Clone)]
pub struct GoogleConfig {
    /// Path of the OAuth client registration JSON.
    ///
    /// Only read when an interactive grant or a refresh needs it.
    pub client_secret_path: PathBuf,

    /// Path of the stored credential record.
    pub token_path: PathBuf,

    /// OAuth scopes to request and require.
    pub scopes: Vec<String>,

    /// Calendar to operate on.
    pub calendar_id: String,

    /// Calendar API root, e.g. `https://www.googleapis.com/calendar/v3/`.
    pub api_base_url: Url,

    pub auth_endpoint: Url,
    pub token_endpoint: Url,

    /// Per-request timeout.
    pub timeout: Duration,

    pub user_agent: String,

    /// Port range for the loopback OAuth redirect listener.
    pub loopback_port_range: (u16, u16),

    /// IANA zone attached to times this tool creates.
    pub time_zone: String,

    /// Whether a missing or revoked grant may start the browser flow.
    pub interactive: bool,

    /// Launch the browser for consent; otherwise only print the URL.
    pub open_browser: bool,
}

impl GoogleConfig {
    /// Default timeout in seconds.
    pub const DEFAULT_TIMEOUT_SECS: u64 = 30;

    /// Default OAuth scope (read/write calendar access).
    pub const DEFAULT_SCOPE: &'static str = "https://www.googleapis.com/auth/calendar";

    pub const DEFAULT_API_BASE: &'static str = "https://www.googleapis.com/calendar/v3/";
    pub const DEFAULT_AUTH_ENDPOINT: &'static str = "https://accounts.google.com/o/oauth2/v2/auth";
    pub const DEFAULT_TOKEN_ENDPOINT: &'static str = "https://oauth2.googleapis.com/token";

    pub const DEFAULT_TIME_ZONE: &'static str = "America/New_York";

    /// Creates a configuration with default paths and endpoints.
    pub fn new() -> Self {
        Self {
            client_secret_path: Self::default_client_secret_path(),
            token_path: Self::default_token_path(),
            scopes: vec![Self::DEFAULT_SCOPE.to_string()],
            calendar_id: "primary".to_string(),
            api_base_url: parse_static_url(Self::DEFAULT_API_BASE),
            auth_endpoint: parse_static_url(Self::DEFAULT_AUTH_ENDPOINT),
            token_endpoint: parse_static_url(Self::DEFAULT_TOKEN_ENDPOINT),
            timeout: Duration::from_secs(Self::DEFAULT_TIMEOUT_SECS),
            user_agent: format!("calctl/{}", env!("CARGO_PKG_VERSION")),
            loopback_port_range: (8080, 8090),
            time_zone: Self::DEFAULT_TIME_ZONE.to_string(),
            interactive: true,
            open_browser: true,
        }
    }

    /// Returns `~/credentials.json`.
    pub fn default_client_secret_path() -> PathBuf {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("credentials.json")
    }

    /// Returns `<data dir>/calctl/google-token.json`.
    pub fn default_token_path() -> PathBuf {
        dirs::data_dir()
            .or_else(|| dirs::home_dir().map(|h| h.join(".local").join("share")))
            .unwrap_or_else(|| PathBuf::from("."))
            .join("calctl")
            .join("google-token.json")
    }

    pub fn with_client_secret_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.client_secret_path = path.into();
        self
    }

    pub fn with_token_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.token_path = path.into();
        self
    }

    pub fn with_scopes(mut self, scopes: Vec<String>) -> Self {
        self.scopes = scopes;
        self
    }

    pub fn with_calendar_id(mut self, id: impl Into<String>) -> Self {
        self.calendar_id = id.into();
        self
    }

    /// Points API calls at another root (used by tests).
    pub fn with_api_base_url(mut self, url: Url) -> Self {
        self.api_base_url = url;
        self
    }

    pub fn with_oauth_endpoints(mut self, auth: Url, token: Url) -> Self {
        self.auth_endpoint = auth;
        self.token_endpoint = token;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = user_agent.into();
        self
    }

    pub fn with_loopback_port_range(mut self, start: u16, end: u16) -> Self {
        self.loopback_port_range = (start, end);
        self
    }

    pub fn with_time_zone(mut self, zone: impl Into<String>) -> Self {
        self.time_zone = zone.into();
        self
    }

    pub fn with_interactive(mut self, interactive: bool) -> Self {
        self.interactive = interactive;
        self
    }

    pub fn with_open_browser(mut self, open_browser: bool) -> Self {
        self.open_browser = open_browser;
        self
    }

    /// Parses the configured time zone.
    pub fn tz(&self) -> ProviderResult<Tz> {
        self.time_zone.parse::<Tz>().map_err(|_| {
            ProviderError::setup(format!("unknown time zone '{}'", self.time_zone))
        })
    }

    /// Validates the configuration.
    pub fn validate(&self) -> Result<(), String> {
        if self.scopes.is_empty() {
            return Err("at least one OAuth scope is required".to_string());
        }

        if self.calendar_id.trim().is_empty() {
            return Err("calendar_id must not be empty".to_string());
        }

        if self.loopback_port_range.0 > self.loopback_port_range.1 {
            return Err("invalid loopback port range".to_string());
        }

        if self.timeout.is_zero() {
            return Err("timeout must be greater than zero".to_string());
        }

        if self.time_zone.parse::<Tz>().is_err() {
            return Err(format!("unknown time zone '{}'", self.time_zone));
        }

        Ok(())
    }
}

impl Default for GoogleConfig {
    fn default() -> Self {
        Self::new()
    }
}

/// Parses one of the URL constants above.
fn parse_static_url(raw: &'static str) -> Url {
    match Url::parse(raw) {
        Ok(url) => url,
        Err(e) => unreachable!("invalid built-in URL {raw}: {e}"),
    }
}

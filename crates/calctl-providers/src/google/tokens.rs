//! OAuth credential record and its on-disk store.

use std::fmt;
use std::fs;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::error::{ProviderError, ProviderResult};

/// Access tokens are treated as expired this long before the provider says so.
const EXPIRY_BUFFER_SECS: i64 = 60;

/// Lifetime assumed when the token endpoint omits `expires_in`.
const DEFAULT_EXPIRES_IN_SECS: i64 = 3600;

/// An OAuth2 grant.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credential {
    pub access_token: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
    /// When the access token stops being usable (already includes the safety buffer).
    pub expiry: DateTime<Utc>,
    #[serde(default)]
    pub scopes: Vec<String>,
}

impl Credential {
    /// Builds a credential from a token endpoint response received at `now`.
    pub fn from_grant(
        access_token: impl Into<String>,
        refresh_token: Option<String>,
        expires_in_secs: Option<i64>,
        scopes: Vec<String>,
        now: DateTime<Utc>,
    ) -> Self {
        let lifetime = expires_in_secs.unwrap_or(DEFAULT_EXPIRES_IN_SECS);
        Self {
            access_token: access_token.into(),
            refresh_token: refresh_token.filter(|t| !t.is_empty()),
            expiry: now + Duration::seconds(lifetime - EXPIRY_BUFFER_SECS),
            scopes,
        }
    }

    /// Returns true if the access token is non-empty and not expired at `now`.
    pub fn is_valid(&self, now: DateTime<Utc>) -> bool {
        !self.access_token.is_empty() && self.expiry > now
    }

    /// Returns true if a non-empty refresh token is present.
    pub fn is_refreshable(&self) -> bool {
        self.refresh_token.as_deref().is_some_and(|t| !t.is_empty())
    }

    /// Returns true if every required scope was granted.
    pub fn has_scopes(&self, required: &[String]) -> bool {
        required.iter().all(|scope| self.scopes.contains(scope))
    }

    /// Merges a refreshed grant into this one.
    ///
    /// Token endpoints usually omit the refresh token and scopes on refresh;
    /// the previous values are kept in that case.
    #[must_use]
    pub fn renewed(&self, mut fresh: Credential) -> Credential {
        if fresh.refresh_token.is_none() {
            fresh.refresh_token = self.refresh_token.clone();
        }
        if fresh.scopes.is_empty() {
            fresh.scopes = self.scopes.clone();
        }
        fresh
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credential")
            .field("access_token", &"<redacted>")
            .field("refresh_token", &self.refresh_token.as_ref().map(|_| "<redacted>"))
            .field("expiry", &self.expiry)
            .field("scopes", &self.scopes)
            .finish()
    }
}

/// Persistence for the single credential record of an installation.
pub trait TokenStore: Send + Sync {
    /// Loads the stored credential, if any.
    fn load(&self) -> ProviderResult<Option<Credential>>;

    /// Replaces the stored credential.
    fn save(&self, credential: &Credential) -> ProviderResult<()>;

    /// Removes the stored credential. Removing a missing record is not an error.
    fn clear(&self) -> ProviderResult<()>;
}

/// JSON file token store.
///
/// Writes go to a sibling temp file which is then renamed over the record, so
/// a failed write leaves the previous record intact.
#[derive(Debug, Clone)]
pub struct FileTokenStore {
    path: PathBuf,
}

impl FileTokenStore {
    /// Creates a store backed by `path`.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Returns the token file path.
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn setup_error(&self, action: &str, err: std::io::Error) -> ProviderError {
        ProviderError::setup(format!(
            "failed to {action} token file {}: {err}",
            self.path.display()
        ))
        .with_source(err)
    }
}

impl TokenStore for FileTokenStore {
    fn load(&self) -> ProviderResult<Option<Credential>> {
        let content = match fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                debug!(path = %self.path.display(), "no token file");
                return Ok(None);
            }
            Err(e) => return Err(self.setup_error("read", e)),
        };

        match serde_json::from_str::<Credential>(&content) {
            Ok(credential) => {
                debug!(path = %self.path.display(), "loaded credential");
                Ok(Some(credential))
            }
            Err(e) => {
                warn!(path = %self.path.display(), error = %e, "ignoring unreadable token file");
                Ok(None)
            }
        }
    }

    fn save(&self, credential: &Credential) -> ProviderResult<()> {
        if let Some(parent) = self.path.parent()
            && !parent.as_os_str().is_empty()
        {
            fs::create_dir_all(parent).map_err(|e| {
                ProviderError::setup(format!(
                    "failed to create token directory {}: {e}",
                    parent.display()
                ))
                .with_source(e)
            })?;
        }

        let content = serde_json::to_string_pretty(credential).map_err(|e| {
            ProviderError::internal(format!("failed to serialize credential: {e}")).with_source(e)
        })?;

        let temp_path = self.path.with_extension("json.tmp");
        write_private(&temp_path, content.as_bytes()).map_err(|e| self.setup_error("write", e))?;

        if let Err(e) = fs::rename(&temp_path, &self.path) {
            let _ = fs::remove_file(&temp_path);
            return Err(self.setup_error("replace", e));
        }

        info!(path = %self.path.display(), "saved credential");
        Ok(())
    }

    fn clear(&self) -> ProviderResult<()> {
        match fs::remove_file(&self.path) {
            Ok(()) => {
                info!(path = %self.path.display(), "removed stored credential");
                Ok(())
            }
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(self.setup_error("remove", e)),
        }
    }
}

/// Creates `path` readable by the owner only and writes `content` to it.
///
/// A leftover file is removed first so the mode applies to a fresh file.
fn write_private(path: &Path, content: &[u8]) -> std::io::Result<()> {
    match fs::remove_file(path) {
        Err(e) if e.kind() != ErrorKind::NotFound => {
            debug!(path = %path.display(), error = %e, "could not remove stale temp file");
        }
        _ => {}
    }

    let mut options = fs::OpenOptions::new();
    options.write(true).create_new(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        options.mode(0o600);
    }

    let mut file = options.open(path)?;
    file.write_all(content)?;
    file.sync_all()
}

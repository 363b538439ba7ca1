//! Authenticated session handle.

use std::fmt;

use chrono::{DateTime, Utc};
use url::Url;

/// A ready-to-use bearer token bound to the API root it is valid for.
///
/// Sessions are handed out per operation call and never retained; the
/// token was valid when the session was created.
#[derive(Clone, PartialEq, Eq)]
pub struct Session {
    access_token: String,
    base_url: Url,
    expiry: DateTime<Utc>,
}

impl Session {
    pub fn new(access_token: impl Into<String>, base_url: Url, expiry: DateTime<Utc>) -> Self {
        Self {
            access_token: access_token.into(),
            base_url,
            expiry,
        }
    }

    /// Returns the bearer token.
    pub fn access_token(&self) -> &str {
        &self.access_token
    }

    /// Returns the API root; resource paths are joined onto it.
    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    pub fn expiry(&self) -> DateTime<Utc> {
        self.expiry
    }
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("access_token", &"<redacted>")
            .field("base_url", &self.base_url.as_str())
            .field("expiry", &self.expiry)
            .finish()
    }
}

//! Google Calendar backend.
//!
//! - OAuth 2.0 PKCE authorization with a loopback redirect
//! - Credential persistence in a private JSON file
//! - Refresh before expiry, re-authorization when the grant is revoked
//! - Calendar API v3 list/get/insert/update/delete with server-side
//!   recurring event expansion
//!
//! # Example
//!
//! ```ignore
//! use calctl_providers::google::{GoogleConfig, connect};
//! use calctl_providers::ListRequest;
//!
//! let backend = connect(&GoogleConfig::new())?;
//! let text = backend.operations.list(&ListRequest::default()).await?;
//! ```

mod client;
mod config;
mod credentials;
mod oauth;
mod tokens;

use std::sync::Arc;

use tracing::debug;

pub use client::GoogleCalendarClient;
pub use config::{GoogleConfig, OAuthCredentials};
pub use credentials::{CredentialManager, CredentialState, CredentialStatus, GrantFlow};
pub use oauth::{OAuthClient, PkceFlow};
pub use tokens::{Credential, FileTokenStore, TokenStore};

use crate::error::{ProviderError, ProviderResult};
use crate::operations::CalendarOperations;

/// The wired Google backend: the credential manager and the operations
/// that draw sessions from it.
#[derive(Debug)]
pub struct GoogleBackend {
    pub credentials: Arc<CredentialManager>,
    pub operations: CalendarOperations,
}

/// Builds the Google backend from `config`.
///
/// Nothing is read from disk or the network until the first operation.
pub fn connect(config: &GoogleConfig) -> ProviderResult<GoogleBackend> {
    config.validate().map_err(ProviderError::setup)?;
    let tz = config.tz()?;

    let store = Arc::new(FileTokenStore::new(config.token_path.clone()));
    let flow = Arc::new(OAuthClient::new(config)?);
    let credentials = Arc::new(
        CredentialManager::new(
            store,
            flow,
            config.scopes.clone(),
            config.api_base_url.clone(),
        )
        .with_interactive(config.interactive),
    );
    let api = Arc::new(GoogleCalendarClient::new(config)?);
    debug!(
        calendar = %config.calendar_id,
        token_path = %config.token_path.display(),
        time_zone = %tz,
        "google backend ready"
    );

    let operations = CalendarOperations::new(credentials.clone(), api, tz);
    Ok(GoogleBackend {
        credentials,
        operations,
    })
}

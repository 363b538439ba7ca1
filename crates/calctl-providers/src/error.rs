//! Error types for calendar operations.
//!
//! Every failure that reaches a tool caller is a [`ProviderError`]. Its
//! [`ProviderErrorCode`] is the machine-readable kind; [`ErrorCategory`]
//! groups codes by who has to act on them.

use std::fmt;
use std::path::Path;

use thiserror::Error;

/// Who has to act on an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCategory {
    /// Local setup is missing or broken (client registration, token directory).
    Setup,
    /// The provider refused consent or requires allow-listing the user.
    Consent,
    /// The stored grant could not be used or renewed.
    Credential,
    /// The caller supplied an unusable argument.
    Input,
    /// The remote API call failed.
    Remote,
    /// A bug or unexpected state.
    Internal,
}

impl ErrorCategory {
    /// Returns the stable wire name of this category.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Setup => "setup",
            Self::Consent => "consent",
            Self::Credential => "credential",
            Self::Input => "input",
            Self::Remote => "remote",
            Self::Internal => "internal",
        }
    }

    /// Returns true if the user must fix something before retrying.
    pub fn needs_user_action(&self) -> bool {
        matches!(self, Self::Setup | Self::Consent | Self::Input)
    }
}

/// The machine-readable kind of a provider error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProviderErrorCode {
    /// Missing client registration or unusable token store location.
    Setup,
    /// Authorization was rejected or blocked by provider policy.
    Consent,
    /// The provider rejected a refresh (revoked or expired grant).
    RefreshFailed,
    /// No credential is available and interactive grants are disabled.
    AuthenticationRequired,
    /// The grant flow or the API rejected the credential.
    AuthenticationFailed,
    /// Unparseable or inconsistent caller input.
    InvalidInput,
    /// Rate limit exceeded.
    RateLimited,
    /// The account lacks permission for the calendar or event.
    PermissionDenied,
    /// Resource not found (404/410).
    NotFound,
    /// Connection failed, timed out, or DNS resolution failed.
    NetworkError,
    /// Server returned a 5xx status.
    ServerError,
    /// The response could not be parsed.
    InvalidResponse,
    /// Unexpected state.
    InternalError,
}

impl ProviderErrorCode {
    /// Returns the stable wire name of this code.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Setup => "setup",
            Self::Consent => "consent",
            Self::RefreshFailed => "refresh_failed",
            Self::AuthenticationRequired => "authentication_required",
            Self::AuthenticationFailed => "authentication_failed",
            Self::InvalidInput => "invalid_input",
            Self::RateLimited => "rate_limited",
            Self::PermissionDenied => "permission_denied",
            Self::NotFound => "not_found",
            Self::NetworkError => "network_error",
            Self::ServerError => "server_error",
            Self::InvalidResponse => "invalid_response",
            Self::InternalError => "internal_error",
        }
    }

    /// Folds this code into its category.
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::Setup => ErrorCategory::Setup,
            Self::Consent => ErrorCategory::Consent,
            Self::RefreshFailed | Self::AuthenticationRequired | Self::AuthenticationFailed => {
                ErrorCategory::Credential
            }
            Self::InvalidInput => ErrorCategory::Input,
            Self::RateLimited
            | Self::PermissionDenied
            | Self::NotFound
            | Self::NetworkError
            | Self::ServerError
            | Self::InvalidResponse => ErrorCategory::Remote,
            Self::InternalError => ErrorCategory::Internal,
        }
    }
}

impl fmt::Display for ProviderErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// An error raised by a calendar operation.
#[derive(Debug, Error)]
pub struct ProviderError {
    code: ProviderErrorCode,
    message: String,
    #[source]
    source: Option<Box<dyn std::error::Error + Send + Sync>>,
}

impl ProviderError {
    /// Creates a new error with the given code and message.
    pub fn new(code: ProviderErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            source: None,
        }
    }

    /// Creates a setup error.
    pub fn setup(message: impl Into<String>) -> Self {
        Self::new(ProviderErrorCode::Setup, message)
    }

    /// The client registration file is missing.
    pub fn missing_client_secret(path: &Path) -> Self {
        Self::setup(format!(
            "Credentials file not found at {}. Please download OAuth 2.0 credentials \
             (Desktop app) from Google Cloud Console and save them there.",
            path.display()
        ))
    }

    /// Creates a consent error that points at the consent screen settings.
    pub fn consent(detail: impl fmt::Display) -> Self {
        Self::new(
            ProviderErrorCode::Consent,
            format!(
                "Authorization was denied ({detail}). If the app is unverified, add your \
                 account as a test user on the OAuth consent screen in Google Cloud Console."
            ),
        )
    }

    /// Creates a refresh failure.
    pub fn refresh_failed(message: impl Into<String>) -> Self {
        Self::new(ProviderErrorCode::RefreshFailed, message)
    }

    /// Creates an authentication-required error.
    pub fn authentication_required(message: impl Into<String>) -> Self {
        Self::new(ProviderErrorCode::AuthenticationRequired, message)
    }

    /// Creates an authentication error.
    pub fn authentication(message: impl Into<String>) -> Self {
        Self::new(ProviderErrorCode::AuthenticationFailed, message)
    }

    /// Creates an input error naming the argument and its literal value.
    pub fn invalid_input(argument: &str, value: &str, reason: impl fmt::Display) -> Self {
        Self::new(
            ProviderErrorCode::InvalidInput,
            format!("invalid {argument} '{value}': {reason}"),
        )
    }

    /// Creates a rate limit error.
    pub fn rate_limited(message: impl Into<String>) -> Self {
        Self::new(ProviderErrorCode::RateLimited, message)
    }

    /// Creates a permission error.
    pub fn permission_denied(message: impl Into<String>) -> Self {
        Self::new(ProviderErrorCode::PermissionDenied, message)
    }

    /// Creates a not found error.
    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(ProviderErrorCode::NotFound, message)
    }

    /// Creates a network error.
    pub fn network(message: impl Into<String>) -> Self {
        Self::new(ProviderErrorCode::NetworkError, message)
    }

    /// Creates a server error.
    pub fn server(message: impl Into<String>) -> Self {
        Self::new(ProviderErrorCode::ServerError, message)
    }

    /// Creates an invalid response error.
    pub fn invalid_response(message: impl Into<String>) -> Self {
        Self::new(ProviderErrorCode::InvalidResponse, message)
    }

    /// Creates an internal error.
    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(ProviderErrorCode::InternalError, message)
    }

    /// Sets the source error for this error.
    pub fn with_source<E>(mut self, source: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        self.source = Some(Box::new(source));
        self
    }

    /// Returns the error code.
    pub fn code(&self) -> ProviderErrorCode {
        self.code
    }

    /// Returns the error message.
    pub fn message(&self) -> &str {
        &self.message
    }

    /// Returns the category of this error.
    pub fn category(&self) -> ErrorCategory {
        self.code.category()
    }
}

impl fmt::Display for ProviderError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.code, self.message)
    }
}

/// A specialized Result type for provider operations.
pub type ProviderResult<T> = Result<T, ProviderError>;

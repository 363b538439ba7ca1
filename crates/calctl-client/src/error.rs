//! Client error types.

use std::process::ExitCode;

use calctl_providers::{ProviderError, ToolError};
use thiserror::Error;

/// Result type for client operations.
pub type ClientResult<T> = Result<T, ClientError>;

/// Errors that can occur in the client.
#[derive(Debug, Error)]
pub enum ClientError {
    /// The configuration file is unreadable or invalid.
    #[error("{0}")]
    Config(String),

    /// A calendar or credential operation failed.
    #[error(transparent)]
    Provider(#[from] ProviderError),

    /// A tool call failed; the JSON error was already printed.
    #[error("{0}")]
    Tool(ToolError),

    /// Command-line arguments that clap cannot check.
    #[error("{0}")]
    Usage(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl ClientError {
    /// Returns the short code printed next to the message.
    pub fn code(&self) -> &'static str {
        match self {
            Self::Config(_) => "config",
            Self::Provider(err) => err.code().as_str(),
            Self::Tool(err) => err.code,
            Self::Usage(_) => "usage",
            Self::Io(_) => "io",
        }
    }

    /// Returns the message without the code prefix.
    pub fn message(&self) -> String {
        match self {
            Self::Provider(err) => err.message().to_string(),
            other => other.to_string(),
        }
    }

    /// Returns true if the user has to fix something before retrying.
    pub fn needs_user_action(&self) -> bool {
        match self {
            Self::Config(_) | Self::Usage(_) => true,
            Self::Provider(err) => err.category().needs_user_action(),
            Self::Tool(err) => matches!(err.kind, "setup" | "consent" | "input"),
            Self::Io(_) => false,
        }
    }

    /// Process exit status: 2 when the user has to act, 1 otherwise.
    pub fn exit_code(&self) -> ExitCode {
        if self.needs_user_action() {
            ExitCode::from(2)
        } else {
            ExitCode::FAILURE
        }
    }
}

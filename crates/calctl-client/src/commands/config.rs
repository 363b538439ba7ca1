//! Configuration commands.

use std::path::Path;

use calctl_providers::google::OAuthCredentials;

use crate::config::ClientConfig;
use crate::error::{ClientError, ClientResult};

/// Dump the current configuration to stdout.
pub fn dump(config: &ClientConfig, path: &Path) -> ClientResult<()> {
    let toml_str = toml::to_string_pretty(config)
        .map_err(|e| ClientError::Config(format!("failed to serialize config: {e}")))?;
    println!("# config.toml ({})", path.display());
    println!("{toml_str}");

    let google = config.google.to_provider_config();
    println!("# effective google settings");
    println!("# credentials_file = {}", google.client_secret_path.display());
    println!("# token_path = {}", google.token_path.display());
    println!("# calendar_id = {}", google.calendar_id);
    println!("# time_zone = {}", google.time_zone);
    Ok(())
}

/// Validate the configuration.
pub fn validate(config: &ClientConfig) -> ClientResult<()> {
    let google = config.google.to_provider_config();
    google
        .validate()
        .map_err(|e| ClientError::Config(format!("invalid [google] settings: {e}")))?;

    if google.client_secret_path.exists() {
        let registration = OAuthCredentials::from_file(&google.client_secret_path)?;
        registration.validate().map_err(|e| {
            ClientError::Config(format!(
                "invalid client registration {}: {e}",
                google.client_secret_path.display()
            ))
        })?;
        println!(
            "Client registration found at {}.",
            google.client_secret_path.display()
        );
    } else {
        println!(
            "warning: no client registration at {}; authorization will fail until it exists.",
            google.client_secret_path.display()
        );
    }

    println!("Configuration is valid.");
    Ok(())
}

/// Show the configuration file path.
pub fn path(path: &Path) -> ClientResult<()> {
    println!("config: {}", path.display());
    Ok(())
}

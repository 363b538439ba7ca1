//! Authentication commands.

use calctl_providers::google::{CredentialManager, CredentialStatus, GoogleConfig};
use chrono::Local;
use tracing::info;

use crate::error::ClientResult;

/// Run the OAuth consent flow unless a usable grant is already stored.
pub async fn login(
    credentials: &CredentialManager,
    config: &GoogleConfig,
    force: bool,
) -> ClientResult<()> {
    if !force && let CredentialStatus::Valid { .. } = credentials.status().await? {
        println!("Already authorized with Google Calendar.");
        println!("Use --force to authorize again.");
        return Ok(());
    }

    println!("Starting Google Calendar authorization...");
    println!(
        "Client registration: {}",
        config.client_secret_path.display()
    );
    println!("A browser window will open; if it does not, open the URL printed below.");
    println!();

    let session = credentials.sign_in(force).await?;

    info!("google authorization successful");
    println!("Authorization successful.");
    println!("Grant saved to {}", config.token_path.display());
    println!(
        "Access token valid until {}",
        session.expiry().with_timezone(&Local).format("%Y-%m-%d %H:%M")
    );
    Ok(())
}

/// Remove the stored grant.
pub async fn logout(credentials: &CredentialManager, config: &GoogleConfig) -> ClientResult<()> {
    credentials.sign_out().await?;
    println!("Removed {}", config.token_path.display());
    Ok(())
}

/// Describe the stored grant.
pub async fn status(credentials: &CredentialManager, config: &GoogleConfig) -> ClientResult<()> {
    let status = credentials.status().await?;
    println!("token: {}", config.token_path.display());
    println!("{}", describe(&status));
    Ok(())
}

fn describe(status: &CredentialStatus) -> String {
    match status {
        CredentialStatus::Missing => {
            "not authorized; run `calctl auth login`".to_string()
        }
        CredentialStatus::Valid { expiry, scopes } => format!(
            "authorized until {} (scopes: {})",
            expiry.with_timezone(&Local).format("%Y-%m-%d %H:%M"),
            scopes.join(" ")
        ),
        CredentialStatus::Expired {
            refreshable: true, ..
        } => "access token expired; it will be refreshed on next use".to_string(),
        CredentialStatus::Expired {
            refreshable: false, ..
        } => "access token expired and cannot be refreshed; run `calctl auth login`".to_string(),
        CredentialStatus::InsufficientScopes { missing } => format!(
            "grant lacks required scopes ({}); run `calctl auth login --force`",
            missing.join(" ")
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    #[test]
    fn status_descriptions_point_to_the_fix() {
        assert!(describe(&CredentialStatus::Missing).contains("calctl auth login"));
        assert!(
            describe(&CredentialStatus::Expired {
                expiry: Utc::now(),
                refreshable: true
            })
            .contains("refreshed")
        );
        assert!(
            describe(&CredentialStatus::InsufficientScopes {
                missing: vec!["calendar".to_string()]
            })
            .contains("--force")
        );
    }
}

//! Client configuration.
//!
//! All settings live in a single `config.toml` file at
//! `~/.config/calctl/config.toml` by default. Every key is optional:
//!
//! ```toml
//! [google]
//! credentials_file = "~/credentials.json"
//! token_path = "~/.local/share/calctl/google-token.json"
//! calendar_id = "primary"
//! time_zone = "Europe/Paris"
//! timeout_secs = 30
//! loopback_ports = [8080, 8090]
//! interactive = true
//! open_browser = true
//! ```

use std::path::{Path, PathBuf};
use std::time::Duration;

use calctl_core::TracingConfig;
use calctl_providers::google::GoogleConfig;
use tracing::Level;
use serde::{Deserialize, Serialize};

use crate::error::{ClientError, ClientResult};

/// Configuration for the calctl client.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ClientConfig {
    /// Google Calendar settings.
    pub google: GoogleSettings,

    /// Debug logging.
    pub debug: bool,
}

impl ClientConfig {
    /// Loads configuration from the default path, or defaults if it does not exist.
    pub fn load() -> ClientResult<Self> {
        let path = Self::default_path();
        if path.exists() {
            Self::load_from(&path)
        } else {
            Ok(Self::default())
        }
    }

    /// Loads configuration from a specific path.
    pub fn load_from(path: &Path) -> ClientResult<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            ClientError::Config(format!("failed to read {}: {e}", path.display()))
        })?;
        toml::from_str(&content).map_err(|e| {
            ClientError::Config(format!("failed to parse {}: {e}", path.display()))
        })
    }

    /// Picks the log setup from the command-line flags and the `debug` key.
    pub fn tracing_config(&self, cli_debug: bool, log_json: bool) -> TracingConfig {
        let debug = cli_debug || self.debug;
        match (log_json, debug) {
            (true, true) => TracingConfig::structured().with_level(Level::DEBUG),
            (true, false) => TracingConfig::structured(),
            (false, true) => TracingConfig::cli_debug(),
            (false, false) => TracingConfig::default(),
        }
    }

    /// Returns the default configuration file path.
    pub fn default_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("calctl")
            .join("config.toml")
    }
}

/// Google Calendar backend settings.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct GoogleSettings {
    /// OAuth client registration JSON downloaded from Google Cloud Console.
    pub credentials_file: Option<PathBuf>,

    /// Where the OAuth grant is stored.
    pub token_path: Option<PathBuf>,

    pub calendar_id: Option<String>,

    /// IANA zone attached to times calctl creates.
    pub time_zone: Option<String>,

    pub scopes: Option<Vec<String>>,

    /// Per-request timeout in seconds.
    pub timeout_secs: Option<u64>,

    /// First and last port tried for the OAuth redirect listener.
    pub loopback_ports: Option<[u16; 2]>,

    /// Whether a missing grant may start the browser flow.
    pub interactive: Option<bool>,

    pub open_browser: Option<bool>,
}

impl GoogleSettings {
    /// Converts to backend configuration, filling unset keys with defaults.
    pub fn to_provider_config(&self) -> GoogleConfig {
        let mut config = GoogleConfig::new();

        if let Some(path) = &self.credentials_file {
            config = config.with_client_secret_path(expand_home(path));
        }
        if let Some(path) = &self.token_path {
            config = config.with_token_path(expand_home(path));
        }
        if let Some(id) = &self.calendar_id {
            config = config.with_calendar_id(id);
        }
        if let Some(zone) = &self.time_zone {
            config = config.with_time_zone(zone);
        }
        if let Some(scopes) = &self.scopes {
            config = config.with_scopes(scopes.clone());
        }
        if let Some(secs) = self.timeout_secs {
            config = config.with_timeout(Duration::from_secs(secs));
        }
        if let Some([first, last]) = self.loopback_ports {
            config = config.with_loopback_port_range(first, last);
        }
        if let Some(interactive) = self.interactive {
            config = config.with_interactive(interactive);
        }
        if let Some(open_browser) = self.open_browser {
            config = config.with_open_browser(open_browser);
        }

        config
    }
}

/// Expands a leading `~/` to the home directory.
fn expand_home(path: &Path) -> PathBuf {
    match (path.strip_prefix("~"), dirs::home_dir()) {
        (Ok(rest), Some(home)) => home.join(rest),
        _ => path.to_path_buf(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_file_uses_defaults() {
        let config: ClientConfig = toml::from_str("").unwrap();
        assert_eq!(config, ClientConfig::default());

        let google = config.google.to_provider_config();
        assert_eq!(google.calendar_id, "primary");
        assert_eq!(google.time_zone, "America/New_York");
        assert!(google.interactive);
    }

    #[test]
    fn debug_key_enables_debug_logging() {
        use calctl_core::TracingOutputFormat;

        let config: ClientConfig = toml::from_str("debug = true\n").unwrap();
        let tracing = config.tracing_config(false, false);
        assert_eq!(tracing.default_level, Level::DEBUG);
        assert_eq!(tracing.output_format, TracingOutputFormat::Compact);

        let json = config.tracing_config(false, true);
        assert_eq!(json.default_level, Level::DEBUG);
        assert_eq!(json.output_format, TracingOutputFormat::Json);

        let quiet = ClientConfig::default().tracing_config(false, false);
        assert_eq!(quiet.default_level, Level::WARN);
        assert_eq!(ClientConfig::default().tracing_config(true, false).default_level, Level::DEBUG);
    }

    #[test]
    fn google_section_overrides() {
        let toml_content = r#"
[google]
credentials_file = "/etc/calctl/client.json"
calendar_id = "team@example.com"
time_zone = "Europe/Paris"
timeout_secs = 5
loopback_ports = [9000, 9005]
interactive = false
"#;
        let config: ClientConfig = toml::from_str(toml_content).unwrap();
        let google = config.google.to_provider_config();

        assert_eq!(google.client_secret_path, PathBuf::from("/etc/calctl/client.json"));
        assert_eq!(google.calendar_id, "team@example.com");
        assert_eq!(google.time_zone, "Europe/Paris");
        assert_eq!(google.timeout, Duration::from_secs(5));
        assert_eq!(google.loopback_port_range, (9000, 9005));
        assert!(!google.interactive);
        assert!(google.validate().is_ok());
    }

    #[test]
    fn unknown_keys_are_rejected() {
        let result: Result<ClientConfig, _> = toml::from_str("[google]\ncalendar = \"x\"\n");
        assert!(result.is_err());
    }

    #[test]
    fn home_is_expanded() {
        let settings = GoogleSettings {
            token_path: Some(PathBuf::from("~/tokens/google.json")),
            ..Default::default()
        };
        let config = settings.to_provider_config();
        if let Some(home) = dirs::home_dir() {
            assert_eq!(config.token_path, home.join("tokens/google.json"));
        }
    }

    #[test]
    fn load_from_reports_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "debug = \"yes\"\n").unwrap();

        let err = ClientConfig::load_from(&path).unwrap_err();
        assert!(err.to_string().contains("config.toml"));

        std::fs::write(&path, "debug = true\n").unwrap();
        assert!(ClientConfig::load_from(&path).unwrap().debug);
    }
}

//! calctl CLI entry point.

use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;

use calctl_client::cli::{AuthAction, Cli, Command, ConfigAction};
use calctl_client::commands;
use calctl_client::config::ClientConfig;
use calctl_client::error::{ClientError, ClientResult};
use calctl_core::init_tracing;
use calctl_providers::google::{GoogleBackend, connect};
use calctl_providers::{EventDraft, EventPatch};

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let loaded = match &cli.config {
        Some(path) => ClientConfig::load_from(path).map(|config| (config, path.clone())),
        None => ClientConfig::load().map(|config| (config, ClientConfig::default_path())),
    };
    let (config, config_path) = match loaded {
        Ok(loaded) => loaded,
        Err(e) => return report(e),
    };

    let tracing_config = config.tracing_config(cli.debug, cli.log_json);
    if let Err(e) = init_tracing(tracing_config) {
        eprintln!("warning: {e}");
    }

    match run(cli, config, config_path).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => report(e),
    }
}

fn report(e: ClientError) -> ExitCode {
    // tool failures were already printed as JSON on stdout
    if !matches!(e, ClientError::Tool(_)) {
        eprintln!("error [{}]: {}", e.code(), e.message());
    }
    e.exit_code()
}

async fn run(cli: Cli, config: ClientConfig, config_path: PathBuf) -> ClientResult<()> {
    let mut google_config = config.google.to_provider_config();
    if cli.non_interactive {
        google_config = google_config.with_interactive(false);
    }

    // commands that need no backend
    match &cli.command {
        Command::Config { action } => {
            return match action {
                ConfigAction::Dump => commands::config::dump(&config, &config_path),
                ConfigAction::Validate => commands::config::validate(&config),
                ConfigAction::Path => commands::config::path(&config_path),
            };
        }
        Command::Tools => return commands::tool::definitions(),
        _ => {}
    }

    let GoogleBackend {
        credentials,
        operations,
    } = connect(&google_config)?;

    match cli.command {
        Command::List {
            days,
            max_results,
            from,
            to,
        } => commands::events::list(&operations, days, max_results, from, to).await,
        Command::Add {
            title,
            start,
            end,
            description,
            location,
            all_day,
        } => {
            let draft = EventDraft {
                title,
                start_time: start,
                end_time: end,
                description,
                location,
                all_day,
            };
            commands::events::add(&operations, draft).await
        }
        Command::Edit {
            query,
            title,
            start,
            end,
            description,
            location,
        } => {
            let patch = EventPatch {
                title,
                start_time: start,
                end_time: end,
                description,
                location,
            };
            commands::events::edit(&operations, &query, patch).await
        }
        Command::Delete { query } => commands::events::delete(&operations, &query).await,
        Command::Auth { action } => match action {
            AuthAction::Login { force } => {
                commands::auth::login(&credentials, &google_config, force).await
            }
            AuthAction::Logout => commands::auth::logout(&credentials, &google_config).await,
            AuthAction::Status => commands::auth::status(&credentials, &google_config).await,
        },
        Command::Tool { name, args } => commands::tool::run(&operations, &name, args).await,
        Command::Config { .. } | Command::Tools => Ok(()),
    }
}

//! Backoffice - back-office API client and reference auth server

use std::process::ExitCode;
use std::sync::Arc;

use chrono::Utc;
use clap::Parser;
use serde_json::Value;
use tracing::{error, info};

use backoffice_client::{
    api::ApiClient,
    app::Backoffice,
    auth_failure::LogReauthHook,
    cli::{Cli, Command},
    config::Config,
    credentials::{self, CredentialStore},
    server::{AuthServer, hash_password},
    setup_tracing,
    transport::ApiRequest,
};

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    // Setup tracing
    if let Err(e) = setup_tracing(&cli.log_level, cli.log_format.as_deref()) {
        eprintln!("Failed to setup tracing: {e}");
        return ExitCode::FAILURE;
    }

    if let Command::HashPassword { password } = &cli.command {
        println!("{}", hash_password(password));
        return ExitCode::SUCCESS;
    }

    // Load configuration
    let config = match Config::load(cli.config.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            error!("Failed to load configuration: {e}");
            return ExitCode::FAILURE;
        }
    };

    match cli.command {
        Command::Serve { port, host } => run_server(config, port, host).await,
        command => run_client(&config, command).await,
    }
}

/// Run the reference auth server
async fn run_server(mut config: Config, port: Option<u16>, host: Option<String>) -> ExitCode {
    // Apply CLI overrides
    if let Some(port) = port {
        config.server.port = port;
    }
    if let Some(host) = host {
        config.server.host = host;
    }

    info!(
        version = env!("CARGO_PKG_VERSION"),
        port = config.server.port,
        users = config.server.users.len(),
        "Starting auth server"
    );

    let server = match AuthServer::from_config(&config) {
        Ok(s) => s,
        Err(e) => {
            error!("Failed to create server: {e}");
            return ExitCode::FAILURE;
        }
    };

    // Run with graceful shutdown
    if let Err(e) = server.run().await {
        error!("Server error: {e}");
        return ExitCode::FAILURE;
    }

    info!("Server shutdown complete");
    ExitCode::SUCCESS
}

/// Run a client subcommand
async fn run_client(config: &Config, command: Command) -> ExitCode {
    let app = match Backoffice::from_config(config, Arc::new(LogReauthHook)) {
        Ok(app) => app,
        Err(e) => {
            error!("Failed to initialise client: {e}");
            return ExitCode::FAILURE;
        }
    };

    match command {
        Command::Login { email, password } => match app.session().login(&email, &password).await {
            Ok(user) => {
                println!("Logged in as {} <{}> ({})", user.name, user.email, user.role);
                ExitCode::SUCCESS
            }
            Err(e) => {
                eprintln!("Login failed: {e}");
                ExitCode::FAILURE
            }
        },
        Command::Logout => match app.session().logout().await {
            Ok(()) => {
                println!("Logged out");
                ExitCode::SUCCESS
            }
            Err(e) => {
                // Local credentials are gone either way.
                eprintln!("Logged out locally; server logout failed: {e}");
                ExitCode::SUCCESS
            }
        },
        Command::Whoami => whoami(&app),
        Command::Status => status(app.store().as_ref()),
        Command::Get { path, query } => get(app.api(), &path, query).await,
        Command::Serve { .. } | Command::HashPassword { .. } => ExitCode::SUCCESS,
    }
}

fn whoami(app: &Backoffice) -> ExitCode {
    let Some(claims) = app.session().current_user() else {
        eprintln!("Not logged in");
        return ExitCode::FAILURE;
    };
    println!(
        "{} <{}> role={} id={}",
        claims.name.as_deref().unwrap_or("?"),
        claims.email.as_deref().unwrap_or("?"),
        claims.role.as_deref().unwrap_or("?"),
        claims.user_id.as_deref().unwrap_or("?"),
    );
    ExitCode::SUCCESS
}

fn status(store: &dyn CredentialStore) -> ExitCode {
    match store.access() {
        Some(token) => {
            let expires = credentials::parse(token.as_str())
                .and_then(|c| c.expires_at())
                .map_or_else(|| "unknown".to_string(), |at| at.to_rfc3339());
            let state = if credentials::is_expired(token.as_str()) {
                "expired"
            } else {
                "valid"
            };
            println!("access:  {state} (expires {expires}, now {})", Utc::now().to_rfc3339());
        }
        None => println!("access:  none"),
    }
    println!(
        "refresh: {}",
        if store.refresh().is_some() { "present" } else { "none" }
    );
    ExitCode::SUCCESS
}

async fn get(api: &ApiClient, path: &str, query: Vec<(String, String)>) -> ExitCode {
    let request = query
        .into_iter()
        .fold(ApiRequest::get(path), |req, (k, v)| req.query(k, v));

    match api.send(&request).await.and_then(|res| res.json::<Value>()) {
        Ok(body) => {
            println!(
                "{}",
                serde_json::to_string_pretty(&body).unwrap_or_default()
            );
            ExitCode::SUCCESS
        }
        Err(e) => {
            eprintln!("Request failed: {e}");
            ExitCode::FAILURE
        }
    }
}

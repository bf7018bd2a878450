//! Command-line interface

use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// Back-office API client with transparent credential refresh
#[derive(Parser, Debug)]
#[command(name = "backoffice")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Path to configuration file (YAML)
    #[arg(short, long, env = "BACKOFFICE_CONFIG", global = true)]
    pub config: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(
        long,
        default_value = "info",
        env = "BACKOFFICE_LOG_LEVEL",
        global = true
    )]
    pub log_level: String,

    /// Log format (text, json)
    #[arg(long, env = "BACKOFFICE_LOG_FORMAT", global = true)]
    pub log_format: Option<String>,

    /// Subcommand
    #[command(subcommand)]
    pub command: Command,
}

/// Available subcommands
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run the reference auth server
    Serve {
        /// Port to listen on
        #[arg(short, long, env = "BACKOFFICE_PORT")]
        port: Option<u16>,

        /// Host to bind to
        #[arg(long, env = "BACKOFFICE_HOST")]
        host: Option<String>,
    },

    /// Log in and store the credential pair
    Login {
        /// Account email
        #[arg(short, long)]
        email: String,

        /// Account password
        #[arg(short, long, env = "BACKOFFICE_PASSWORD", hide_env_values = true)]
        password: String,
    },

    /// Log out and forget stored credentials
    Logout,

    /// Show the user of the stored credential
    Whoami,

    /// Show whether credentials are stored and when they expire
    Status,

    /// Authenticated GET; prints the JSON response
    Get {
        /// API path, e.g. `/api/auth/me`
        #[arg(required = true)]
        path: String,

        /// Query parameters as `key=value`
        #[arg(short, long = "query", value_parser = parse_key_value)]
        query: Vec<(String, String)>,
    },

    /// Print the SHA-256 digest to put in `server.users[].password_sha256`
    HashPassword {
        /// Password to hash
        #[arg(required = true)]
        password: String,
    },
}

fn parse_key_value(s: &str) -> Result<(String, String), String> {
    s.split_once('=')
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .ok_or_else(|| format!("expected key=value, got '{s}'"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_get_with_query() {
        let cli = Cli::parse_from([
            "backoffice",
            "--log-level",
            "debug",
            "get",
            "/api/orders",
            "-q",
            "status=pending",
        ]);
        assert_eq!(cli.log_level, "debug");
        match cli.command {
            Command::Get { path, query } => {
                assert_eq!(path, "/api/orders");
                assert_eq!(query, vec![("status".to_string(), "pending".to_string())]);
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn rejects_malformed_query() {
        assert!(Cli::try_parse_from(["backoffice", "get", "/x", "-q", "nope"]).is_err());
    }

    #[test]
    fn global_config_after_subcommand() {
        let cli = Cli::parse_from(["backoffice", "whoami", "--config", "bo.yaml"]);
        assert_eq!(cli.config, Some(PathBuf::from("bo.yaml")));
    }

    #[test]
    fn cli_definition_is_consistent() {
        use clap::CommandFactory;
        Cli::command().debug_assert();
    }
}

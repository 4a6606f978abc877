use clap::Parser;
use tracing_subscriber::EnvFilter;

mod commands;

use commands::config::ConfigAction;
use commands::logs::LogsArgs;

#[derive(Parser)]
#[command(name = "dirsync", about = "LDAP directory synchronization", version)]
struct Cli {
    /// Path to configuration file
    #[arg(long, default_value = "dirsync.toml")]
    config: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(clap::Subcommand)]
enum Commands {
    /// Write a default configuration file and set up the database
    Init {
        /// Data directory path
        #[arg(long, default_value = "/var/lib/dirsync")]
        data_dir: String,
    },
    /// Run a sync now and follow its progress (Ctrl-C cancels)
    Sync,
    /// Show the current sync status
    Status,
    /// Show totals across runs and the most recent runs
    Stats {
        /// Print JSON instead of a table
        #[arg(long)]
        json: bool,
    },
    /// List sync log entries, newest first
    Logs {
        /// Only entries of this level (info, warning, error)
        #[arg(long)]
        level: Option<String>,
        /// Only entries of this run
        #[arg(long)]
        run: Option<String>,
        /// Only entries about this user
        #[arg(long)]
        username: Option<String>,
        /// Only entries at or after this time (RFC 3339 or YYYY-MM-DD)
        #[arg(long)]
        since: Option<String>,
        /// Only entries at or before this time (RFC 3339 or YYYY-MM-DD)
        #[arg(long)]
        until: Option<String>,
        /// Maximum number of entries
        #[arg(long)]
        limit: Option<i64>,
        /// Print JSON
        #[arg(long)]
        json: bool,
    },
    /// Show one sync log entry in full
    Log {
        id: i64,
        /// Print JSON
        #[arg(long)]
        json: bool,
    },
    /// Bind to the directory with the current or a candidate configuration
    TestConnection {
        /// Directory configuration (TOML) to test instead of the current one
        #[arg(long)]
        file: Option<String>,
    },
    /// Inspect or change the directory configuration
    Config {
        #[command(subcommand)]
        action: ConfigCommand,
    },
    /// Run scheduled syncs until interrupted
    Daemon,
}

#[derive(clap::Subcommand)]
enum ConfigCommand {
    /// Print the current configuration with the password redacted
    Show,
    /// Turn directory synchronization off
    Disable,
    /// Re-read the stored configuration
    Reload,
    /// Replace the configuration with the contents of a TOML file
    Update {
        #[arg(long)]
        file: String,
    },
}

impl From<ConfigCommand> for ConfigAction {
    fn from(cmd: ConfigCommand) -> Self {
        match cmd {
            ConfigCommand::Show => ConfigAction::Show,
            ConfigCommand::Disable => ConfigAction::Disable,
            ConfigCommand::Reload => ConfigAction::Reload,
            ConfigCommand::Update { file } => ConfigAction::Update { file },
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Init { data_dir } => {
            commands::init::run(&cli.config, &data_dir).await?;
        }
        Commands::Sync => {
            commands::sync::run(&cli.config).await?;
        }
        Commands::Status => {
            commands::status::run(&cli.config).await?;
        }
        Commands::Stats { json } => {
            commands::stats::run(&cli.config, json).await?;
        }
        Commands::Logs {
            level,
            run,
            username,
            since,
            until,
            limit,
            json,
        } => {
            let args = LogsArgs {
                level,
                run,
                username,
                since,
                until,
                limit,
                json,
            };
            commands::logs::run(&cli.config, &args).await?;
        }
        Commands::Log { id, json } => {
            commands::log::run(&cli.config, id, json).await?;
        }
        Commands::TestConnection { file } => {
            commands::test_connection::run(&cli.config, file.as_deref()).await?;
        }
        Commands::Config { action } => {
            commands::config::run(&cli.config, action.into()).await?;
        }
        Commands::Daemon => {
            commands::daemon::run(&cli.config).await?;
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use clap::Parser;

    use super::*;

    #[test]
    fn cli_parse_init_defaults() {
        let cli = Cli::parse_from(["dirsync", "init"]);
        assert_eq!(cli.config, "dirsync.toml");
        match cli.command {
            Commands::Init { data_dir } => assert_eq!(data_dir, "/var/lib/dirsync"),
            _ => panic!("expected Init command"),
        }
    }

    #[test]
    fn cli_parse_custom_config() {
        let cli = Cli::parse_from(["dirsync", "--config", "/etc/dirsync.toml", "sync"]);
        assert_eq!(cli.config, "/etc/dirsync.toml");
        assert!(matches!(cli.command, Commands::Sync));
    }

    #[test]
    fn cli_parse_status_and_daemon() {
        let cli = Cli::parse_from(["dirsync", "status"]);
        assert!(matches!(cli.command, Commands::Status));
        let cli = Cli::parse_from(["dirsync", "daemon"]);
        assert!(matches!(cli.command, Commands::Daemon));
    }

    #[test]
    fn cli_parse_logs_filters() {
        let cli = Cli::parse_from([
            "dirsync",
            "logs",
            "--level",
            "error",
            "--run",
            "run-1",
            "--since",
            "2025-06-01",
            "--limit",
            "20",
        ]);
        match cli.command {
            Commands::Logs {
                level,
                run,
                username,
                since,
                until,
                limit,
                json,
            } => {
                assert_eq!(level.as_deref(), Some("error"));
                assert_eq!(run.as_deref(), Some("run-1"));
                assert!(username.is_none());
                assert_eq!(since.as_deref(), Some("2025-06-01"));
                assert!(until.is_none());
                assert_eq!(limit, Some(20));
                assert!(!json);
            }
            _ => panic!("expected Logs command"),
        }
    }

    #[test]
    fn cli_parse_log_by_id() {
        let cli = Cli::parse_from(["dirsync", "log", "42", "--json"]);
        match cli.command {
            Commands::Log { id, json } => {
                assert_eq!(id, 42);
                assert!(json);
            }
            _ => panic!("expected Log command"),
        }
    }

    #[test]
    fn cli_parse_test_connection() {
        let cli = Cli::parse_from(["dirsync", "test-connection"]);
        assert!(matches!(
            cli.command,
            Commands::TestConnection { file: None }
        ));
        let cli = Cli::parse_from(["dirsync", "test-connection", "--file", "dir.toml"]);
        match cli.command {
            Commands::TestConnection { file } => assert_eq!(file.as_deref(), Some("dir.toml")),
            _ => panic!("expected TestConnection command"),
        }
    }

    #[test]
    fn cli_parse_config_actions() {
        let action = |args: &[&str]| match Cli::parse_from(args.iter().copied()).command {
            Commands::Config { action } => ConfigAction::from(action),
            _ => panic!("expected Config command"),
        };
        assert_eq!(action(&["dirsync", "config", "show"]), ConfigAction::Show);
        assert_eq!(action(&["dirsync", "config", "disable"]), ConfigAction::Disable);
        assert_eq!(action(&["dirsync", "config", "reload"]), ConfigAction::Reload);
        assert_eq!(
            action(&["dirsync", "config", "update", "--file", "dir.toml"]),
            ConfigAction::Update {
                file: "dir.toml".into()
            }
        );
    }

    #[test]
    fn cli_rejects_unknown_subcommand() {
        assert!(Cli::try_parse_from(["dirsync", "export"]).is_err());
    }
}

use clap::{Args, Parser, Subcommand};
use consent_core::{AppConfig, AppContext};
use serde::Serialize;

#[derive(Parser)]
#[command(name = "consent")]
#[command(about = "Consent study operator CLI")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Backup operations
    #[command(subcommand)]
    Backup(BackupCommand),
    /// Remote storage token maintenance
    #[command(subcommand)]
    Token(TokenCommand),
    /// Credentials file checks
    #[command(subcommand)]
    Users(UsersCommand),
}

#[derive(Subcommand)]
enum BackupCommand {
    /// Snapshot the database into the local backup directory
    Local,
    /// Export consent responses and patient lists as CSV to remote storage
    Csv,
    /// Upload a copy of the database to remote storage
    Db,
    /// Run the local, CSV and database backups in sequence
    Full,
    /// Delete local snapshots past the retention window
    Cleanup(CleanupArgs),
    /// Show local backups and remote storage state
    Status,
    /// List files under the remote backup folder
    ListRemote,
}

#[derive(Args)]
struct CleanupArgs {
    /// Days to keep (defaults to BACKUP_RETENTION_DAYS)
    #[arg(long)]
    retention_days: Option<u32>,
}

#[derive(Subcommand)]
enum TokenCommand {
    /// Check the refresh token by fetching the account it belongs to
    Validate,
    /// Force a new access token
    Refresh,
}

#[derive(Subcommand)]
enum UsersCommand {
    /// Report whether a username exists in the credentials file
    Check {
        /// Username to look up
        username: String,
    },
}

fn print_json<T: Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("consent_core=warn".parse()?),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let Some(command) = cli.command else {
        println!("Use 'consent --help' for commands");
        return Ok(());
    };

    let ctx = AppContext::initialise(AppConfig::from_env()?)?;
    let backups = &ctx.backups;

    let success = match command {
        Commands::Backup(BackupCommand::Local) => {
            print_json(&backups.snapshot_local().await?)?;
            true
        }
        Commands::Backup(BackupCommand::Csv) => {
            print_json(&backups.export_csv().await?)?;
            true
        }
        Commands::Backup(BackupCommand::Db) => {
            print_json(&backups.export_database().await?)?;
            true
        }
        Commands::Backup(BackupCommand::Full) => {
            let report = backups.run_all().await;
            print_json(&report)?;
            report.success
        }
        Commands::Backup(BackupCommand::Cleanup(args)) => {
            let days = args
                .retention_days
                .unwrap_or_else(|| backups.retention_days());
            let removed = backups.cleanup(days).await?;
            if removed.is_empty() {
                println!("No backups older than {days} days.");
            } else {
                for name in &removed {
                    println!("Removed {name}");
                }
            }
            true
        }
        Commands::Backup(BackupCommand::Status) => {
            print_json(&backups.status().await?)?;
            true
        }
        Commands::Backup(BackupCommand::ListRemote) => {
            let entries = backups.list_remote().await?;
            if entries.is_empty() {
                println!("No remote backups found.");
            }
            for entry in entries {
                println!(
                    "{}  {} bytes",
                    entry.path_display.unwrap_or(entry.name),
                    entry.size.unwrap_or_default()
                );
            }
            true
        }
        Commands::Token(TokenCommand::Validate) => {
            let outcome = backups.validate_token().await;
            print_json(&outcome)?;
            outcome.success
        }
        Commands::Token(TokenCommand::Refresh) => {
            let outcome = backups.refresh_token().await;
            print_json(&outcome)?;
            outcome.success
        }
        Commands::Users(UsersCommand::Check { username }) => {
            let credentials = ctx.credentials.read().await;
            match credentials.find(&username) {
                Some(user) => {
                    let user = user.public();
                    println!(
                        "{}: {} ({:?}), language {}, list '{}'",
                        user.username, user.name, user.role, user.language, user.list
                    );
                    true
                }
                None => {
                    eprintln!("No account named '{username}'.");
                    false
                }
            }
        }
    };

    if !success {
        std::process::exit(1);
    }
    Ok(())
}

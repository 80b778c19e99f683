pub mod export;
pub mod purge;
pub mod request;

use std::path::PathBuf;

use clap::{Parser, Subcommand};

use crate::auth::{Actor, Role};
use crate::config::{STORAGE_KEY_ENV, STORAGE_URL_ENV};
use crate::db::models::DeletionStatus;

#[derive(Parser)]
#[command(
    name = "vehicle-archive",
    version,
    about = "Export a vehicle's data as a portable archive, then purge it for good"
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// SQLite database file (defaults to the user data directory)
    #[arg(long, global = true)]
    pub db: Option<PathBuf>,

    /// Local directory backing the object store
    #[arg(long, global = true)]
    pub storage_dir: Option<PathBuf>,

    /// Base URL of a remote object store; takes precedence over --storage-dir
    #[arg(long, global = true, env = STORAGE_URL_ENV)]
    pub storage_url: Option<String>,

    /// API key for the remote object store
    #[arg(long, global = true, env = STORAGE_KEY_ENV, hide_env_values = true)]
    pub storage_key: Option<String>,

    /// ID of the user performing the action
    #[arg(long, global = true)]
    pub actor: Option<String>,

    /// Account the acting user belongs to
    #[arg(long, global = true)]
    pub account: Option<String>,

    /// Role of the acting user within the account (member, manager, admin)
    #[arg(long, global = true, default_value = "member")]
    pub role: Role,

    /// Increase logging verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,
}

impl Cli {
    /// The caller, as given by --actor, --account and --role.
    pub fn actor(&self) -> anyhow::Result<Actor> {
        match (&self.actor, &self.account) {
            (Some(id), Some(account)) => Ok(Actor::new(id, account, self.role)),
            _ => anyhow::bail!("--actor and --account are required for this command"),
        }
    }
}

#[derive(Subcommand)]
pub enum Command {
    /// Create and inspect deletion requests
    Request {
        #[command(subcommand)]
        command: RequestCommand,
    },
    /// Build the data archive for a deletion request
    Export {
        /// Deletion request ID
        request_id: String,
        /// Directory the archive is written to
        #[arg(long, default_value = ".")]
        output: PathBuf,
    },
    /// Permanently delete a vehicle's data and stored files
    Purge {
        /// Deletion request ID
        request_id: String,
        /// Required: acknowledge that this cannot be undone
        #[arg(long)]
        confirm: bool,
    },
}

#[derive(Subcommand)]
pub enum RequestCommand {
    /// Record a request to delete a vehicle's data
    Create {
        /// Vehicle ID
        #[arg(long)]
        vehicle: String,
        /// Workshop account that owns the vehicle record
        #[arg(long)]
        workshop: String,
        /// Customer account the vehicle is registered to
        #[arg(long)]
        customer: String,
        /// Free-text reason for the request
        #[arg(long)]
        reason: Option<String>,
    },
    /// List deletion requests
    List {
        /// Filter by status (pending, exported, deleted)
        #[arg(long)]
        status: Option<DeletionStatus>,
    },
    /// Show one deletion request in full
    Show {
        /// Deletion request ID
        id: String,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_is_well_formed() {
        use clap::CommandFactory;
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_export_with_actor() {
        let cli = Cli::try_parse_from([
            "vehicle-archive",
            "export",
            "req-1",
            "--actor",
            "u1",
            "--account",
            "ws-1",
            "--role",
            "Manager",
            "--output",
            "/tmp/out",
        ])
        .unwrap();
        let actor = cli.actor().unwrap();
        assert_eq!(actor, Actor::new("u1", "ws-1", Role::Manager));
        match cli.command {
            Command::Export { request_id, output } => {
                assert_eq!(request_id, "req-1");
                assert_eq!(output, PathBuf::from("/tmp/out"));
            }
            _ => panic!("expected export"),
        }
    }

    #[test]
    fn test_actor_requires_account() {
        let cli = Cli::try_parse_from(["vehicle-archive", "purge", "req-1", "--actor", "u1"]).unwrap();
        assert!(cli.actor().is_err());
    }

    #[test]
    fn test_list_status_filter_parses() {
        let cli =
            Cli::try_parse_from(["vehicle-archive", "request", "list", "--status", "exported"]).unwrap();
        match cli.command {
            Command::Request {
                command: RequestCommand::List { status },
            } => assert_eq!(status, Some(DeletionStatus::Exported)),
            _ => panic!("expected request list"),
        }
        assert!(
            Cli::try_parse_from(["vehicle-archive", "request", "list", "--status", "gone"]).is_err()
        );
    }
}

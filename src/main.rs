mod archive;
mod auth;
mod cli;
mod collect;
mod config;
mod db;
mod error;
mod export;
mod fetch;
mod purge;
mod storage;
#[cfg(test)]
mod testutil;

use clap::Parser;
use cli::{Cli, Command, RequestCommand};

use crate::auth::RoleAuthorizer;
use crate::config::StorageConfig;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Set up tracing
    let filter = match cli.verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(filter)),
        )
        .with_target(false)
        .init();

    // Open database
    let db_path = config::db_path(cli.db.as_deref())?;
    let db = db::Database::open(&db_path)?;
    tracing::debug!("Using database {}", db_path.display());

    match &cli.command {
        Command::Request { command } => match command {
            RequestCommand::Create {
                vehicle,
                workshop,
                customer,
                reason,
            } => cli::request::create_request(&db, vehicle, workshop, customer, reason.clone())?,
            RequestCommand::List { status } => cli::request::list_requests(&db, *status)?,
            RequestCommand::Show { id } => cli::request::show_request(&db, id)?,
        },
        Command::Export { request_id, output } => {
            let actor = cli.actor()?;
            let store = object_store(&cli)?;
            cli::export::export(&db, store.as_ref(), &RoleAuthorizer, &actor, request_id, output)
                .await?;
        }
        Command::Purge {
            request_id,
            confirm,
        } => {
            let actor = cli.actor()?;
            let store = object_store(&cli)?;
            cli::purge::purge(&db, store.as_ref(), &RoleAuthorizer, &actor, request_id, *confirm)
                .await?;
        }
    }

    Ok(())
}

fn object_store(cli: &Cli) -> anyhow::Result<std::sync::Arc<dyn storage::ObjectStore>> {
    let config = StorageConfig::resolve(
        cli.storage_url.as_deref(),
        cli.storage_key.as_deref(),
        cli.storage_dir.as_deref(),
    )?;
    storage::build_object_store(&config)
}

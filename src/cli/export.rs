use std::path::Path;

use crate::auth::{Actor, Authorizer};
use crate::db::Database;
use crate::export::export_request;
use crate::storage::ObjectStore;

pub async fn export(
    db: &Database,
    store: &dyn ObjectStore,
    authz: &dyn Authorizer,
    actor: &Actor,
    request_id: &str,
    output_dir: &Path,
) -> anyhow::Result<()> {
    let archive = export_request(db, store, authz, actor, request_id, chrono::Utc::now()).await?;

    std::fs::create_dir_all(output_dir)?;
    let path = output_dir.join(&archive.file_name);
    std::fs::write(&path, &archive.bytes)?;

    println!("Archive written to {}", path.display());
    println!(
        "  {} bytes, {} file(s) archived, {} skipped",
        archive.bytes.len(),
        archive.files_archived,
        archive.files_skipped
    );
    Ok(())
}

use crate::auth::{Actor, Authorizer};
use crate::db::Database;
use crate::purge::purge_request;
use crate::storage::ObjectStore;

pub async fn purge(
    db: &Database,
    store: &dyn ObjectStore,
    authz: &dyn Authorizer,
    actor: &Actor,
    request_id: &str,
    confirm: bool,
) -> anyhow::Result<()> {
    if !confirm {
        anyhow::bail!(
            "Purging permanently deletes the vehicle and its files. Re-run with --confirm to proceed."
        );
    }

    let report = purge_request(db, store, authz, actor, request_id, chrono::Utc::now()).await?;

    println!("Purged data for deletion request {request_id}");
    println!(
        "  {} stored object(s) removed, {} failed batch(es)",
        report.storage_objects_removed, report.storage_failures
    );
    for (table, count) in report.rows_deleted.iter().filter(|(_, n)| **n > 0) {
        println!("  {table}: {count} row(s)");
    }
    if report.storage_failures > 0 {
        println!("Some stored files could not be removed; see the log for details.");
    }
    Ok(())
}

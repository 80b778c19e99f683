//! Export of a vehicle's full data set as one ZIP archive.

use chrono::{DateTime, SecondsFormat, Utc};
use serde_json::{Map, Value, json};

use crate::archive::{self, ArchiveEntry};
use crate::auth::{Action, Actor, Authorizer, authorize_request};
use crate::collect::{TenantScope, VehicleGraph, collect_vehicle_graph};
use crate::db::Database;
use crate::db::models::{DeletionStatus, Row, VehicleTable};
use crate::error::{AppError, Result};
use crate::fetch::{FetchedBlobs, fetch_blobs};
use crate::storage::ObjectStore;

pub const EXPORT_EVENT_TYPE: &str = "data_exported";

#[derive(Debug, Clone)]
pub struct ExportedArchive {
    pub file_name: String,
    pub bytes: Vec<u8>,
    pub files_archived: usize,
    pub files_skipped: usize,
}

/// `vehicle-<id>-archive-<timestamp>.zip`, with `:` and `.` in the timestamp
/// replaced so the name is safe on every filesystem.
pub fn archive_file_name(vehicle_id: &str, now: DateTime<Utc>) -> String {
    let stamp = now
        .to_rfc3339_opts(SecondsFormat::Millis, true)
        .replace([':', '.'], "-");
    format!("vehicle-{vehicle_id}-archive-{stamp}.zip")
}

/// Build the archive for a deletion request and record the export.
///
/// Safe to repeat: the request moves to `exported` on the first call only,
/// while every call appends one `data_exported` timeline event.
pub async fn export_request(
    db: &Database,
    store: &dyn ObjectStore,
    authz: &dyn Authorizer,
    actor: &Actor,
    request_id: &str,
    now: DateTime<Utc>,
) -> Result<ExportedArchive> {
    let request = authorize_request(db, authz, actor, request_id, Action::Export)?;
    if request.status == DeletionStatus::Deleted {
        return Err(AppError::AlreadyDeleted(request.id));
    }

    tracing::info!(
        "Exporting vehicle {} for request {} ({})",
        request.vehicle_id,
        request.id,
        request.status
    );
    let graph = collect_vehicle_graph(db, &request.vehicle_id, &TenantScope::of_request(&request))
        .await?;
    let blobs = fetch_blobs(store, &graph.storage_refs).await;

    let mut entries = data_entries(&graph, &blobs)?;
    let files_archived = blobs.entries.len();
    let files_skipped = blobs.skipped();
    entries.extend(blobs.entries);
    let bytes = archive::encode(&entries)?;

    let timestamp = now.to_rfc3339_opts(SecondsFormat::Millis, true);
    let updated = db.update_deletion_request(&request.id, |req| {
        if req.status == DeletionStatus::Deleted {
            return Err(AppError::AlreadyDeleted(req.id.clone()));
        }
        if req.status == DeletionStatus::Pending {
            req.status = DeletionStatus::Exported;
            req.exported_at = Some(timestamp.clone());
        }
        let count = req
            .metadata
            .get("export_count")
            .and_then(Value::as_u64)
            .unwrap_or(0);

        let mut patch = Map::new();
        patch.insert("exported_by".into(), Value::from(actor.id.as_str()));
        patch.insert("last_exported_at".into(), Value::from(timestamp.as_str()));
        patch.insert("export_count".into(), Value::from(count + 1));
        req.merge_metadata(patch);
        Ok(())
    })?;

    db.insert_row(
        VehicleTable::TimelineEvents,
        &export_event(&updated.vehicle_id, &updated.id, actor, &timestamp, files_archived),
    )?;

    let file_name = archive_file_name(&updated.vehicle_id, now);
    tracing::info!(
        "Exported {file_name}: {} bytes, {files_archived} file(s), {files_skipped} skipped",
        bytes.len()
    );
    Ok(ExportedArchive {
        file_name,
        bytes,
        files_archived,
        files_skipped,
    })
}

/// One `data/<name>.json` document per table plus the storage manifest.
fn data_entries(graph: &VehicleGraph, blobs: &FetchedBlobs) -> Result<Vec<ArchiveEntry>> {
    let mut entries = Vec::with_capacity(VehicleTable::ALL.len() + 1);
    for table in VehicleTable::ALL {
        let doc = match table {
            VehicleTable::Vehicle => serde_json::to_vec_pretty(&graph.vehicle)?,
            _ => serde_json::to_vec_pretty(graph.rows(table))?,
        };
        entries.push(ArchiveEntry::new(
            format!("data/{}.json", table.export_name()),
            doc,
        ));
    }

    let manifest: Vec<Value> = graph
        .storage_refs
        .iter()
        .zip(&blobs.archived_as)
        .map(|(r, archived_as)| {
            json!({
                "bucket": r.bucket,
                "path": r.path,
                "origin_entity_id": r.origin_entity_id,
                "archived_as": archived_as,
            })
        })
        .collect();
    entries.push(ArchiveEntry::new(
        "data/storage_manifest.json",
        serde_json::to_vec_pretty(&manifest)?,
    ));
    Ok(entries)
}

fn export_event(
    vehicle_id: &str,
    request_id: &str,
    actor: &Actor,
    timestamp: &str,
    files_archived: usize,
) -> Row {
    let mut row = Row::new();
    row.insert("id".into(), Value::from(uuid::Uuid::new_v4().to_string()));
    row.insert("vehicle_id".into(), Value::from(vehicle_id));
    row.insert("event_type".into(), Value::from(EXPORT_EVENT_TYPE));
    row.insert("title".into(), Value::from("Vehicle data exported"));
    row.insert(
        "description".into(),
        Value::from("Full data archive generated ahead of deletion"),
    );
    row.insert(
        "metadata".into(),
        json!({ "deletion_request_id": request_id, "files_archived": files_archived }),
    );
    row.insert("created_by".into(), Value::from(actor.id.as_str()));
    row.insert("created_at".into(), Value::from(timestamp));
    row
}

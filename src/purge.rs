//! Irreversible removal of a vehicle: stored objects first, then every
//! relational row in one transaction.

use std::collections::BTreeMap;

use chrono::{DateTime, SecondsFormat, Utc};
use serde_json::{Map, Value};

use crate::auth::{Action, Actor, Authorizer, authorize_request};
use crate::collect::TenantScope;
use crate::db::Database;
use crate::db::models::DeletionStatus;
use crate::error::{AppError, Result};
use crate::storage::{Bucket, ObjectStore, StorageRef};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PurgeReport {
    pub storage_objects_removed: usize,
    pub storage_failures: usize,
    /// Rows removed per table.
    pub rows_deleted: BTreeMap<String, usize>,
}

impl PurgeReport {
    pub fn total_rows(&self) -> usize {
        self.rows_deleted.values().sum()
    }
}

pub async fn purge_request(
    db: &Database,
    store: &dyn ObjectStore,
    authz: &dyn Authorizer,
    actor: &Actor,
    request_id: &str,
    now: DateTime<Utc>,
) -> Result<PurgeReport> {
    let request = authorize_request(db, authz, actor, request_id, Action::Purge)?;
    if request.status == DeletionStatus::Deleted {
        return Err(AppError::AlreadyDeleted(request.id));
    }
    let vehicle_id = request.vehicle_id.clone();
    let scope = TenantScope::of_request(&request);
    if db
        .get_vehicle(
            &vehicle_id,
            &scope.workshop_account_id,
            scope.customer_account_id.as_deref(),
        )?
        .is_none()
    {
        tracing::warn!(
            "Request {} names vehicle {vehicle_id}, which its accounts do not own",
            request.id
        );
        return Err(AppError::VehicleNotFound(vehicle_id));
    }
    tracing::info!("Purging vehicle {vehicle_id} for request {}", request.id);

    let refs = db.storage_refs_for_vehicle(&vehicle_id)?;
    let (removed, failures) = remove_objects(store, refs).await;

    let timestamp = now.to_rfc3339_opts(SecondsFormat::Millis, true);
    let (_, rows_deleted) = db.purge_vehicle(
        &request.id,
        &vehicle_id,
        &scope.workshop_account_id,
        scope.customer_account_id.as_deref(),
        |req, deleted| {
            req.status = DeletionStatus::Deleted;
            req.processed_at = Some(timestamp);
            req.processed_by = Some(actor.id.clone());

            let mut patch = Map::new();
            patch.insert("storage_objects_removed".into(), Value::from(removed));
            patch.insert("storage_failures".into(), Value::from(failures));
            patch.insert("rows_deleted".into(), serde_json::to_value(deleted)?);
            req.merge_metadata(patch);
            Ok(())
        },
    )?;

    let report = PurgeReport {
        storage_objects_removed: removed,
        storage_failures: failures,
        rows_deleted,
    };
    tracing::info!(
        "Purged vehicle {vehicle_id}: {} row(s), {removed} stored object(s), {failures} failed batch(es)",
        report.total_rows()
    );
    Ok(report)
}

/// One removal call per bucket. A failed batch is logged and counted; the
/// relational purge still goes ahead.
async fn remove_objects(store: &dyn ObjectStore, refs: Vec<StorageRef>) -> (usize, usize) {
    let mut by_bucket: BTreeMap<Bucket, Vec<String>> = BTreeMap::new();
    for r in refs {
        by_bucket.entry(r.bucket).or_default().push(r.path);
    }

    let mut removed = 0;
    let mut failures = 0;
    for (bucket, paths) in by_bucket {
        match store.remove(bucket, &paths).await {
            Ok(()) => {
                tracing::debug!("Removed {} object(s) from {bucket}", paths.len());
                removed += paths.len();
            }
            Err(e) => {
                tracing::warn!("Removing {} object(s) from {bucket} failed: {e:#}", paths.len());
                failures += 1;
            }
        }
    }
    (removed, failures)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::{Role, RoleAuthorizer};
    use crate::collect::collect_vehicle_graph;
    use crate::db::models::{DeletionRequest, VehicleTable};
    use crate::export::export_request;
    use crate::storage::fs::FsObjectStore;
    use crate::storage::memory::MemoryObjectStore;
    use crate::testutil::{
        CUSTOMER, TENANT, actor, now, row, seed_full_vehicle, seed_request, seed_vehicle,
    };

    fn store_with_objects(vehicle_id: &str) -> MemoryObjectStore {
        let store = MemoryObjectStore::new();
        store.put(
            Bucket::VehicleDocuments,
            &format!("{vehicle_id}/docs/registration.pdf"),
            b"pdf",
        );
        store.put(Bucket::VehicleMedia, &format!("{vehicle_id}/photos/front.jpg"), b"jpg");
        store.put(
            Bucket::Attachments,
            &format!("{vehicle_id}/attachments/receipt.pdf"),
            b"pdf",
        );
        store
    }

    fn count(db: &Database, table: VehicleTable, parent_id: &str) -> usize {
        db.select_rows(table, &[parent_id.to_string()]).unwrap().len()
    }

    #[tokio::test]
    async fn test_purge_removes_objects_and_rows() {
        let db = Database::open_in_memory().unwrap();
        seed_full_vehicle(&db, "v1");
        seed_full_vehicle(&db, "v2");
        db.insert_row(
            VehicleTable::Media,
            &row(&[
                ("id", "v1-media-2".into()),
                ("vehicle_id", "v1".into()),
                ("media_type", "photo".into()),
                ("storage_bucket", "vehicle-media".into()),
                ("storage_path", "v1/photos/rear.jpg".into()),
            ]),
        )
        .unwrap();
        let req = seed_request(&db, "v1");
        let store = store_with_objects("v1");
        store.put(Bucket::VehicleMedia, "v1/photos/rear.jpg", b"jpg");

        let report = purge_request(&db, &store, &RoleAuthorizer, &actor(Role::Admin), &req.id, now())
            .await
            .unwrap();

        assert_eq!(report.storage_objects_removed, 4);
        assert_eq!(report.storage_failures, 0);
        assert_eq!(store.len(), 0);
        let removals = store.removals();
        assert_eq!(removals.len(), 3, "one batch per bucket");
        assert_eq!(
            removals
                .iter()
                .find(|(b, _)| *b == Bucket::VehicleMedia)
                .map(|(_, paths)| paths.len()),
            Some(2)
        );

        assert_eq!(report.rows_deleted["vehicles"], 1);
        assert_eq!(report.rows_deleted["quote_line_items"], 2);
        assert_eq!(report.rows_deleted["vehicle_media"], 2);
        assert!(db.get_vehicle("v1", TENANT, None).unwrap().is_none());
        for table in VehicleTable::TOP_LEVEL {
            assert_eq!(count(&db, table, "v1"), 0, "{table:?} not purged");
        }
        assert_eq!(count(&db, VehicleTable::QuoteLineItems, "v1-quote"), 0);

        // The other vehicle is intact.
        let scope = TenantScope::of_request(&req);
        let graph = collect_vehicle_graph(&db, "v2", &scope).await.unwrap();
        assert_eq!(graph.rows(VehicleTable::QuoteLineItems).len(), 2);

        let stored = db.get_deletion_request(&req.id).unwrap().unwrap();
        assert_eq!(stored.status, DeletionStatus::Deleted);
        assert_eq!(stored.processed_at.as_deref(), Some("2026-03-14T09:26:53.000Z"));
        assert_eq!(stored.processed_by.as_deref(), Some("user-admin"));
        assert_eq!(stored.metadata["storage_objects_removed"], 4);
        assert_eq!(stored.metadata["rows_deleted"]["vehicles"], 1);
        assert_eq!(stored.reason, req.reason);
    }

    #[tokio::test]
    async fn test_manager_cannot_purge() {
        let db = Database::open_in_memory().unwrap();
        seed_full_vehicle(&db, "v1");
        let req = seed_request(&db, "v1");
        let store = store_with_objects("v1");

        let err = purge_request(&db, &store, &RoleAuthorizer, &actor(Role::Manager), &req.id, now())
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Forbidden { action: "purge", .. }));
        assert!(store.removals().is_empty());
        assert!(db.get_vehicle("v1", TENANT, None).unwrap().is_some());
    }

    #[tokio::test]
    async fn test_failed_root_delete_rolls_back_rows() {
        let db = Database::open_in_memory().unwrap();
        seed_full_vehicle(&db, "v1");
        let req = seed_request(&db, "v1");
        let store = store_with_objects("v1");
        db.execute_batch(
            "CREATE TRIGGER lock_vehicles BEFORE DELETE ON vehicles
             BEGIN SELECT RAISE(ABORT, 'locked'); END;",
        )
        .unwrap();

        let err = purge_request(&db, &store, &RoleAuthorizer, &actor(Role::Admin), &req.id, now())
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Database(_)));

        for table in VehicleTable::TOP_LEVEL {
            assert_eq!(count(&db, table, "v1"), 1, "{table:?} should be rolled back");
        }
        assert_eq!(count(&db, VehicleTable::QuoteLineItems, "v1-quote"), 2);
        let stored = db.get_deletion_request(&req.id).unwrap().unwrap();
        assert_eq!(stored.status, DeletionStatus::Pending);
        assert!(stored.processed_at.is_none());

        // Re-running once the blocker is gone completes the purge.
        db.execute_batch("DROP TRIGGER lock_vehicles;").unwrap();
        let report = purge_request(&db, &store, &RoleAuthorizer, &actor(Role::Admin), &req.id, now())
            .await
            .unwrap();
        assert_eq!(report.rows_deleted["vehicles"], 1);
    }

    #[tokio::test]
    async fn test_storage_failure_is_tolerated() {
        let db = Database::open_in_memory().unwrap();
        seed_full_vehicle(&db, "v1");
        let req = seed_request(&db, "v1");
        let store = store_with_objects("v1");
        store.fail_removals(Bucket::VehicleMedia);

        let report = purge_request(&db, &store, &RoleAuthorizer, &actor(Role::Admin), &req.id, now())
            .await
            .unwrap();
        assert_eq!(report.storage_objects_removed, 2);
        assert_eq!(report.storage_failures, 1);
        assert!(store.contains(Bucket::VehicleMedia, "v1/photos/front.jpg"));
        assert!(db.get_vehicle("v1", TENANT, None).unwrap().is_none());
    }

    #[tokio::test]
    async fn test_repeat_purge_is_rejected() {
        let db = Database::open_in_memory().unwrap();
        seed_vehicle(&db, "v1");
        let req = seed_request(&db, "v1");
        let store = MemoryObjectStore::new();
        let admin = actor(Role::Admin);

        let report = purge_request(&db, &store, &RoleAuthorizer, &admin, &req.id, now())
            .await
            .unwrap();
        assert_eq!(report.storage_objects_removed, 0);
        assert!(store.removals().is_empty());

        let err = purge_request(&db, &store, &RoleAuthorizer, &admin, &req.id, now())
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::AlreadyDeleted(_)));
    }

    #[tokio::test]
    async fn test_request_for_foreign_vehicle_deletes_nothing() {
        let db = Database::open_in_memory().unwrap();
        seed_full_vehicle(&db, "v1");
        let forged = DeletionRequest::new(
            "v1",
            "ws-evil",
            "cust-evil",
            None,
            "2026-03-01T08:00:00.000Z".into(),
        );
        db.insert_deletion_request(&forged).unwrap();
        let store = store_with_objects("v1");
        let mallory = Actor::new("mallory", "ws-evil", Role::Admin);

        let err = purge_request(&db, &store, &RoleAuthorizer, &mallory, &forged.id, now())
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::VehicleNotFound(_)));

        assert!(store.removals().is_empty());
        assert_eq!(store.len(), 3);
        assert!(db.get_vehicle("v1", TENANT, None).unwrap().is_some());
        for table in VehicleTable::TOP_LEVEL {
            assert_eq!(count(&db, table, "v1"), 1, "{table:?} should be untouched");
        }
        let stored = db.get_deletion_request(&forged.id).unwrap().unwrap();
        assert_eq!(stored.status, DeletionStatus::Pending);
    }

    #[test]
    fn test_root_delete_is_tenant_scoped() {
        let db = Database::open_in_memory().unwrap();
        seed_full_vehicle(&db, "v1");
        let req = seed_request(&db, "v1");

        let err = db
            .purge_vehicle(&req.id, "v1", "ws-evil", Some("cust-evil"), |r, _| {
                r.status = DeletionStatus::Deleted;
                Ok(())
            })
            .unwrap_err();
        assert!(matches!(err, AppError::VehicleNotFound(_)));
        for table in VehicleTable::TOP_LEVEL {
            assert_eq!(count(&db, table, "v1"), 1, "{table:?} should be rolled back");
        }

        // The customer account alone is enough to own the vehicle.
        let (stored, deleted) = db
            .purge_vehicle(&req.id, "v1", "ws-other", Some(CUSTOMER), |r, _| {
                r.status = DeletionStatus::Deleted;
                Ok(())
            })
            .unwrap();
        assert_eq!(stored.status, DeletionStatus::Deleted);
        assert_eq!(deleted["vehicles"], 1);
    }

    #[tokio::test]
    async fn test_purge_after_export() {
        let db = Database::open_in_memory().unwrap();
        seed_full_vehicle(&db, "v1");
        let req = seed_request(&db, "v1");
        let store = store_with_objects("v1");
        let admin = actor(Role::Admin);

        let archive = export_request(&db, &store, &RoleAuthorizer, &admin, &req.id, now())
            .await
            .unwrap();
        assert_eq!(archive.files_archived, 3);
        let exported = db.get_deletion_request(&req.id).unwrap().unwrap();
        assert_eq!(exported.status, DeletionStatus::Exported);

        let report = purge_request(&db, &store, &RoleAuthorizer, &admin, &req.id, now())
            .await
            .unwrap();
        assert_eq!(report.storage_objects_removed, 3);
        // Timeline holds the seeded event plus the export event.
        assert_eq!(report.rows_deleted["vehicle_timeline_events"], 2);

        let stored = db.get_deletion_request(&req.id).unwrap().unwrap();
        assert_eq!(stored.status, DeletionStatus::Deleted);
        assert_eq!(stored.exported_at, exported.exported_at);
        assert_eq!(stored.metadata["export_count"], 1);
        assert!(db.get_vehicle("v1", TENANT, None).unwrap().is_none());
        assert!(db.get_vehicle("v1", TENANT, Some(CUSTOMER)).unwrap().is_none());
    }

    #[tokio::test]
    async fn test_unusable_storage_key_counts_as_failure() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsObjectStore::new(dir.path().to_path_buf());
        let db = Database::open_in_memory().unwrap();
        seed_full_vehicle(&db, "v1");
        db.insert_row(
            VehicleTable::Attachments,
            &row(&[
                ("id", "v1-attachment-2".into()),
                ("vehicle_id", "v1".into()),
                ("file_name", "dots".into()),
                ("storage_bucket", "attachments".into()),
                ("storage_path", "../".into()),
            ]),
        )
        .unwrap();
        store
            .put(Bucket::Attachments, "v1/attachments/receipt.pdf", b"pdf")
            .await
            .unwrap();
        store
            .put(Bucket::VehicleMedia, "v1/photos/front.jpg", b"jpg")
            .await
            .unwrap();
        let req = seed_request(&db, "v1");

        let report = purge_request(&db, &store, &RoleAuthorizer, &actor(Role::Admin), &req.id, now())
            .await
            .unwrap();
        // Documents and media batches succeed; the attachments batch does not.
        assert_eq!(report.storage_objects_removed, 2);
        assert_eq!(report.storage_failures, 1);
        assert!(
            store
                .download(Bucket::Attachments, "v1/attachments/receipt.pdf")
                .await
                .unwrap()
                .is_some()
        );
        assert!(
            store
                .download(Bucket::VehicleMedia, "v1/photos/front.jpg")
                .await
                .unwrap()
                .is_none()
        );
    }
}

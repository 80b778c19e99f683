//! Gathers the full relational graph of one vehicle.
//!
//! Every foreign key points toward the vehicle, so collection is a fixed list
//! of (table, parent ids) fetches run in two stages: tables keyed by the
//! vehicle id, then the line items keyed by the quote and invoice ids that
//! stage one returned.

use std::collections::BTreeMap;

use serde_json::Value;
use tokio::task::JoinSet;

use crate::db::Database;
use crate::db::models::{DeletionRequest, Row, VehicleTable};
use crate::error::{AppError, Result};
use crate::storage::{StorageRef, dedup_refs};

/// Accounts whose data the caller may see.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TenantScope {
    pub workshop_account_id: String,
    pub customer_account_id: Option<String>,
}

impl TenantScope {
    pub fn of_request(request: &DeletionRequest) -> Self {
        Self {
            workshop_account_id: request.workshop_account_id.clone(),
            customer_account_id: Some(request.customer_account_id.clone()),
        }
    }
}

#[derive(Debug, Clone)]
pub struct VehicleGraph {
    pub vehicle: Row,
    /// One entry per dependent table; a table with no rows maps to an empty list.
    pub collections: BTreeMap<VehicleTable, Vec<Row>>,
    pub storage_refs: Vec<StorageRef>,
}

impl VehicleGraph {
    pub fn rows(&self, table: VehicleTable) -> &[Row] {
        self.collections
            .get(&table)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }
}

pub async fn collect_vehicle_graph(
    db: &Database,
    vehicle_id: &str,
    scope: &TenantScope,
) -> Result<VehicleGraph> {
    let vehicle_task = {
        let db = db.clone();
        let vehicle_id = vehicle_id.to_string();
        let scope = scope.clone();
        tokio::task::spawn_blocking(move || {
            db.get_vehicle(
                &vehicle_id,
                &scope.workshop_account_id,
                scope.customer_account_id.as_deref(),
            )
        })
    };

    let by_vehicle = vec![vehicle_id.to_string()];
    let stage_one = VehicleTable::TOP_LEVEL
        .into_iter()
        .map(|table| (table, by_vehicle.clone()))
        .collect();
    let (vehicle, mut collections) =
        tokio::join!(vehicle_task, fetch_best_effort(db, stage_one));

    let vehicle = match vehicle {
        Ok(Ok(Some(row))) => row,
        Ok(Ok(None)) => return Err(AppError::VehicleNotFound(vehicle_id.to_string())),
        Ok(Err(e)) => {
            tracing::warn!("Fetching vehicle {vehicle_id} failed: {e}");
            return Err(AppError::VehicleNotFound(vehicle_id.to_string()));
        }
        Err(e) => {
            tracing::warn!("Vehicle fetch task for {vehicle_id} failed: {e}");
            return Err(AppError::VehicleNotFound(vehicle_id.to_string()));
        }
    };

    let mut stage_two = Vec::new();
    for (child, parent) in [
        (VehicleTable::QuoteLineItems, VehicleTable::Quotes),
        (VehicleTable::InvoiceLineItems, VehicleTable::Invoices),
    ] {
        let parent_ids = row_ids(
            collections
                .get(&parent)
                .map(Vec::as_slice)
                .unwrap_or_default(),
        );
        if parent_ids.is_empty() {
            tracing::debug!(
                "No {} for vehicle {vehicle_id}, skipping {}",
                parent.export_name(),
                child.export_name()
            );
            continue;
        }
        stage_two.push((child, parent_ids));
    }
    collections.extend(fetch_best_effort(db, stage_two).await);

    for table in VehicleTable::ALL {
        if table != VehicleTable::Vehicle {
            collections.entry(table).or_default();
        }
    }

    let storage_refs = storage_refs_from_rows(&collections);
    tracing::info!(
        "Collected vehicle {vehicle_id}: {} row(s) across {} table(s), {} stored object(s)",
        collections.values().map(Vec::len).sum::<usize>() + 1,
        collections.len() + 1,
        storage_refs.len()
    );

    Ok(VehicleGraph {
        vehicle,
        collections,
        storage_refs,
    })
}

/// Run each fetch on the blocking pool. A failed fetch yields an empty list.
///
/// Fetches are separate tasks so one failure or panic stays contained, but
/// they share the `Database` connection: the queries themselves are
/// serialized on its lock.
async fn fetch_best_effort(
    db: &Database,
    fetches: Vec<(VehicleTable, Vec<String>)>,
) -> BTreeMap<VehicleTable, Vec<Row>> {
    let mut tasks = JoinSet::new();
    for (table, parent_ids) in fetches {
        let db = db.clone();
        tasks.spawn_blocking(move || (table, db.select_rows(table, &parent_ids)));
    }

    let mut out = BTreeMap::new();
    while let Some(joined) = tasks.join_next().await {
        match joined {
            Ok((table, Ok(rows))) => {
                tracing::debug!("Fetched {} row(s) from {}", rows.len(), table.table_name());
                out.insert(table, rows);
            }
            Ok((table, Err(e))) => {
                tracing::warn!("Fetching {} failed, exporting it empty: {e}", table.table_name());
                out.insert(table, Vec::new());
            }
            // The table is filled in empty by the caller.
            Err(e) => tracing::warn!("Collection fetch task failed: {e}"),
        }
    }
    out
}

fn row_ids(rows: &[Row]) -> Vec<String> {
    rows.iter()
        .filter_map(|r| r.get("id").and_then(Value::as_str))
        .map(String::from)
        .collect()
}

fn storage_refs_from_rows(collections: &BTreeMap<VehicleTable, Vec<Row>>) -> Vec<StorageRef> {
    let mut refs = Vec::new();
    for table in VehicleTable::WITH_BINARIES {
        for row in collections.get(&table).map(Vec::as_slice).unwrap_or_default() {
            let column = |name: &str| row.get(name).and_then(Value::as_str);
            let Some(id) = column("id") else { continue };
            refs.extend(StorageRef::from_columns(
                column("storage_bucket"),
                column("storage_path"),
                id,
            ));
        }
    }
    dedup_refs(refs)
}

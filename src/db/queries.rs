use std::collections::BTreeMap;

use rusqlite::types::{Type, Value as SqlValue, ValueRef};
use rusqlite::{Connection, OptionalExtension, params, params_from_iter};
use serde_json::{Map, Value};

use super::Database;
use super::models::{DeletionRequest, DeletionStatus, Row, VehicleTable};
use crate::error::{AppError, Result};
use crate::storage::{StorageRef, dedup_refs};

/// Stay well below SQLite's bound-parameter limit.
const MAX_BIND_PARAMS: usize = 500;

const REQUEST_COLUMNS: &str = "id, vehicle_id, customer_account_id, workshop_account_id, status, requested_at, exported_at, processed_at, processed_by, reason, metadata";

impl Database {
    // --- Generic vehicle rows ---

    pub fn insert_row(&self, table: VehicleTable, row: &Row) -> Result<()> {
        if let Some(bad) = row.keys().find(|k| !is_identifier(k)) {
            return Err(rusqlite::Error::InvalidColumnName(bad.clone()).into());
        }
        let columns = row.keys().map(String::as_str).collect::<Vec<_>>().join(", ");
        let sql = format!(
            "INSERT INTO {} ({columns}) VALUES ({})",
            table.table_name(),
            placeholders(row.len())
        );
        let values: Vec<SqlValue> = row.values().map(json_to_sql).collect();

        let conn = self.lock();
        conn.execute(&sql, params_from_iter(values.iter()))?;
        Ok(())
    }

    /// All rows of `table` whose parent key is one of `parent_ids`, in insertion order.
    pub fn select_rows(&self, table: VehicleTable, parent_ids: &[String]) -> Result<Vec<Row>> {
        let conn = self.lock();
        let mut rows = Vec::new();

        for chunk in parent_ids.chunks(MAX_BIND_PARAMS) {
            let sql = format!(
                "SELECT * FROM {} WHERE {} IN ({}) ORDER BY rowid",
                table.table_name(),
                table.parent_key(),
                placeholders(chunk.len())
            );
            let mut stmt = conn.prepare(&sql)?;
            let columns: Vec<String> = stmt.column_names().into_iter().map(String::from).collect();
            let mapped = stmt.query_map(params_from_iter(chunk.iter()), |row| {
                row_to_json(row, &columns)
            })?;
            for row in mapped {
                rows.push(row?);
            }
        }

        Ok(rows)
    }

    /// The vehicle row, if it belongs to the workshop or customer account in scope.
    pub fn get_vehicle(
        &self,
        vehicle_id: &str,
        workshop_account_id: &str,
        customer_account_id: Option<&str>,
    ) -> Result<Option<Row>> {
        let conn = self.lock();
        let mut stmt = conn.prepare(
            "SELECT * FROM vehicles
             WHERE id = ?1
               AND (workshop_account_id = ?2 OR (?3 IS NOT NULL AND customer_account_id = ?3))",
        )?;
        let columns: Vec<String> = stmt.column_names().into_iter().map(String::from).collect();
        let row = stmt
            .query_row(
                params![vehicle_id, workshop_account_id, customer_account_id],
                |row| row_to_json(row, &columns),
            )
            .optional()?;
        Ok(row)
    }

    /// Valid, deduplicated storage references for a vehicle: documents, then
    /// media, then attachments.
    pub fn storage_refs_for_vehicle(&self, vehicle_id: &str) -> Result<Vec<StorageRef>> {
        let conn = self.lock();
        let mut refs = Vec::new();

        for table in VehicleTable::WITH_BINARIES {
            let sql = format!(
                "SELECT id, storage_bucket, storage_path FROM {} WHERE vehicle_id = ?1 ORDER BY rowid",
                table.table_name()
            );
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt.query_map(params![vehicle_id], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, Option<String>>(1)?,
                    row.get::<_, Option<String>>(2)?,
                ))
            })?;
            for row in rows {
                let (id, bucket, path) = row?;
                refs.extend(StorageRef::from_columns(
                    bucket.as_deref(),
                    path.as_deref(),
                    id,
                ));
            }
        }

        Ok(dedup_refs(refs))
    }

    // --- Deletion Requests ---

    pub fn insert_deletion_request(&self, req: &DeletionRequest) -> Result<()> {
        let metadata = serde_json::to_string(&req.metadata)?;
        let conn = self.lock();
        conn.execute(
            &format!(
                "INSERT INTO deletion_requests ({REQUEST_COLUMNS})
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)"
            ),
            params![
                req.id,
                req.vehicle_id,
                req.customer_account_id,
                req.workshop_account_id,
                req.status,
                req.requested_at,
                req.exported_at,
                req.processed_at,
                req.processed_by,
                req.reason,
                metadata,
            ],
        )?;
        Ok(())
    }

    pub fn get_deletion_request(&self, id: &str) -> Result<Option<DeletionRequest>> {
        let conn = self.lock();
        load_request(&conn, id)
    }

    pub fn list_deletion_requests(
        &self,
        status: Option<DeletionStatus>,
    ) -> Result<Vec<DeletionRequest>> {
        let conn = self.lock();
        let mut requests = Vec::new();

        if let Some(status) = status {
            let mut stmt = conn.prepare(&format!(
                "SELECT {REQUEST_COLUMNS} FROM deletion_requests WHERE status = ?1 ORDER BY requested_at DESC"
            ))?;
            let rows = stmt.query_map(params![status], map_request_row)?;
            for row in rows {
                requests.push(row?);
            }
        } else {
            let mut stmt = conn.prepare(&format!(
                "SELECT {REQUEST_COLUMNS} FROM deletion_requests ORDER BY requested_at DESC"
            ))?;
            let rows = stmt.query_map([], map_request_row)?;
            for row in rows {
                requests.push(row?);
            }
        }

        Ok(requests)
    }

    /// Read-modify-write a deletion request in one transaction. The status
    /// may only move forward.
    pub fn update_deletion_request<F>(&self, id: &str, apply: F) -> Result<DeletionRequest>
    where
        F: FnOnce(&mut DeletionRequest) -> Result<()>,
    {
        let mut conn = self.lock();
        let tx = conn.transaction()?;

        let mut req =
            load_request(&tx, id)?.ok_or_else(|| AppError::RequestNotFound(id.to_string()))?;
        let before = req.status;
        apply(&mut req)?;
        check_transition(before, req.status)?;
        write_request(&tx, &req)?;

        tx.commit()?;
        Ok(req)
    }

    /// Delete every relational row of a vehicle, children before parents and
    /// the vehicle row last, then let `finish` stamp the request. Everything
    /// happens in one transaction: any failure leaves all rows in place.
    ///
    /// The vehicle must belong to the given workshop or customer account;
    /// otherwise nothing is deleted and `VehicleNotFound` is returned.
    ///
    /// Returns the updated request and the number of rows removed per table.
    pub fn purge_vehicle<F>(
        &self,
        request_id: &str,
        vehicle_id: &str,
        workshop_account_id: &str,
        customer_account_id: Option<&str>,
        finish: F,
    ) -> Result<(DeletionRequest, BTreeMap<String, usize>)>
    where
        F: FnOnce(&mut DeletionRequest, &BTreeMap<String, usize>) -> Result<()>,
    {
        let mut conn = self.lock();
        let tx = conn.transaction()?;
        let mut deleted = BTreeMap::new();

        for (child, parent) in [
            (VehicleTable::QuoteLineItems, VehicleTable::Quotes),
            (VehicleTable::InvoiceLineItems, VehicleTable::Invoices),
        ] {
            let n = tx.execute(
                &format!(
                    "DELETE FROM {} WHERE {} IN (SELECT id FROM {} WHERE vehicle_id = ?1)",
                    child.table_name(),
                    child.parent_key(),
                    parent.table_name()
                ),
                params![vehicle_id],
            )?;
            deleted.insert(child.table_name().to_string(), n);
        }

        for table in VehicleTable::TOP_LEVEL {
            let n = tx.execute(
                &format!("DELETE FROM {} WHERE vehicle_id = ?1", table.table_name()),
                params![vehicle_id],
            )?;
            deleted.insert(table.table_name().to_string(), n);
        }

        let n = tx.execute(
            "DELETE FROM vehicles
             WHERE id = ?1
               AND (workshop_account_id = ?2 OR (?3 IS NOT NULL AND customer_account_id = ?3))",
            params![vehicle_id, workshop_account_id, customer_account_id],
        )?;
        if n == 0 {
            return Err(AppError::VehicleNotFound(vehicle_id.to_string()));
        }
        deleted.insert(VehicleTable::Vehicle.table_name().to_string(), n);

        let mut req = load_request(&tx, request_id)?
            .ok_or_else(|| AppError::RequestNotFound(request_id.to_string()))?;
        let before = req.status;
        finish(&mut req, &deleted)?;
        check_transition(before, req.status)?;
        write_request(&tx, &req)?;

        tx.commit()?;
        Ok((req, deleted))
    }
}

fn check_transition(from: DeletionStatus, to: DeletionStatus) -> Result<()> {
    if from != to && !from.can_advance_to(to) {
        return Err(AppError::InvalidTransition { from, to });
    }
    Ok(())
}

fn load_request(conn: &Connection, id: &str) -> Result<Option<DeletionRequest>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {REQUEST_COLUMNS} FROM deletion_requests WHERE id = ?1"
    ))?;
    let req = stmt.query_row(params![id], map_request_row).optional()?;
    Ok(req)
}

fn write_request(conn: &Connection, req: &DeletionRequest) -> Result<()> {
    let metadata = serde_json::to_string(&req.metadata)?;
    conn.execute(
        "UPDATE deletion_requests
         SET status = ?2, exported_at = ?3, processed_at = ?4, processed_by = ?5, metadata = ?6
         WHERE id = ?1",
        params![
            req.id,
            req.status,
            req.exported_at,
            req.processed_at,
            req.processed_by,
            metadata,
        ],
    )?;
    Ok(())
}

fn map_request_row(row: &rusqlite::Row) -> rusqlite::Result<DeletionRequest> {
    let raw_metadata: String = row.get(10)?;
    let metadata: Map<String, Value> = serde_json::from_str(&raw_metadata)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(10, Type::Text, Box::new(e)))?;
    Ok(DeletionRequest {
        id: row.get(0)?,
        vehicle_id: row.get(1)?,
        customer_account_id: row.get(2)?,
        workshop_account_id: row.get(3)?,
        status: row.get(4)?,
        requested_at: row.get(5)?,
        exported_at: row.get(6)?,
        processed_at: row.get(7)?,
        processed_by: row.get(8)?,
        reason: row.get(9)?,
        metadata,
    })
}

fn row_to_json(row: &rusqlite::Row, columns: &[String]) -> rusqlite::Result<Row> {
    let mut out = Row::new();
    for (i, name) in columns.iter().enumerate() {
        let value = match row.get_ref(i)? {
            ValueRef::Null => Value::Null,
            ValueRef::Integer(n) => Value::from(n),
            ValueRef::Real(f) => serde_json::Number::from_f64(f)
                .map(Value::Number)
                .unwrap_or(Value::Null),
            ValueRef::Text(t) => Value::String(String::from_utf8_lossy(t).into_owned()),
            ValueRef::Blob(b) => Value::String(b.iter().map(|x| format!("{x:02x}")).collect()),
        };
        out.insert(name.clone(), value);
    }
    Ok(out)
}

fn json_to_sql(value: &Value) -> SqlValue {
    match value {
        Value::Null => SqlValue::Null,
        Value::Bool(b) => SqlValue::Integer(i64::from(*b)),
        Value::Number(n) => n
            .as_i64()
            .map(SqlValue::Integer)
            .or_else(|| n.as_f64().map(SqlValue::Real))
            .unwrap_or(SqlValue::Null),
        Value::String(s) => SqlValue::Text(s.clone()),
        other => SqlValue::Text(other.to_string()),
    }
}

fn placeholders(n: usize) -> String {
    (1..=n).map(|i| format!("?{i}")).collect::<Vec<_>>().join(", ")
}

fn is_identifier(s: &str) -> bool {
    !s.is_empty()
        && s.chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_')
}

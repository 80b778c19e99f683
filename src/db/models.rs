use std::fmt;
use std::str::FromStr;

use rusqlite::ToSql;
use rusqlite::types::{FromSql, FromSqlError, FromSqlResult, ToSqlOutput, ValueRef};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// A relational row projected as column name → JSON value.
pub type Row = Map<String, Value>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeletionStatus {
    Pending,
    Exported,
    Deleted,
}

impl DeletionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            DeletionStatus::Pending => "pending",
            DeletionStatus::Exported => "exported",
            DeletionStatus::Deleted => "deleted",
        }
    }

    /// Status only moves forward: pending → exported → deleted, or pending → deleted.
    pub fn can_advance_to(&self, next: DeletionStatus) -> bool {
        matches!(
            (self, next),
            (DeletionStatus::Pending, DeletionStatus::Exported)
                | (DeletionStatus::Pending, DeletionStatus::Deleted)
                | (DeletionStatus::Exported, DeletionStatus::Deleted)
        )
    }
}

impl fmt::Display for DeletionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DeletionStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(DeletionStatus::Pending),
            "exported" => Ok(DeletionStatus::Exported),
            "deleted" => Ok(DeletionStatus::Deleted),
            other => Err(format!("unknown deletion status '{other}'")),
        }
    }
}

impl ToSql for DeletionStatus {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(ToSqlOutput::from(self.as_str()))
    }
}

impl FromSql for DeletionStatus {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        value
            .as_str()?
            .parse()
            .map_err(|e: String| FromSqlError::Other(e.into()))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeletionRequest {
    pub id: String,
    pub vehicle_id: String,
    pub customer_account_id: String,
    pub workshop_account_id: String,
    pub status: DeletionStatus,
    pub requested_at: String,
    pub exported_at: Option<String>,
    pub processed_at: Option<String>,
    pub processed_by: Option<String>,
    pub reason: Option<String>,
    pub metadata: Map<String, Value>,
}

impl DeletionRequest {
    pub fn new(
        vehicle_id: &str,
        workshop_account_id: &str,
        customer_account_id: &str,
        reason: Option<String>,
        requested_at: String,
    ) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            vehicle_id: vehicle_id.to_string(),
            customer_account_id: customer_account_id.to_string(),
            workshop_account_id: workshop_account_id.to_string(),
            status: DeletionStatus::Pending,
            requested_at,
            exported_at: None,
            processed_at: None,
            processed_by: None,
            reason,
            metadata: Map::new(),
        }
    }

    /// Shallow merge: keys in `patch` replace existing keys, others are kept.
    pub fn merge_metadata(&mut self, patch: Map<String, Value>) {
        self.metadata.extend(patch);
    }

    pub fn owned_by(&self, account_id: &str) -> bool {
        self.workshop_account_id == account_id || self.customer_account_id == account_id
    }
}

/// Every table holding vehicle data.
///
/// All foreign keys point toward the vehicle. Line items are the only
/// grandchildren; they hang off quotes and invoices.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum VehicleTable {
    Vehicle,
    OwnershipHistory,
    Documents,
    Media,
    TimelineEvents,
    WorkRequests,
    Quotes,
    QuoteLineItems,
    Invoices,
    InvoiceLineItems,
    Recommendations,
    ServiceJobs,
    ProblemReports,
    Attachments,
    ConsentRecords,
}

impl VehicleTable {
    /// Every table, root first, in export order.
    pub const ALL: [VehicleTable; 15] = [
        VehicleTable::Vehicle,
        VehicleTable::OwnershipHistory,
        VehicleTable::Documents,
        VehicleTable::Media,
        VehicleTable::TimelineEvents,
        VehicleTable::WorkRequests,
        VehicleTable::Quotes,
        VehicleTable::QuoteLineItems,
        VehicleTable::Invoices,
        VehicleTable::InvoiceLineItems,
        VehicleTable::Recommendations,
        VehicleTable::ServiceJobs,
        VehicleTable::ProblemReports,
        VehicleTable::Attachments,
        VehicleTable::ConsentRecords,
    ];

    /// Tables keyed directly by `vehicle_id`.
    pub const TOP_LEVEL: [VehicleTable; 12] = [
        VehicleTable::OwnershipHistory,
        VehicleTable::Documents,
        VehicleTable::Media,
        VehicleTable::TimelineEvents,
        VehicleTable::WorkRequests,
        VehicleTable::Quotes,
        VehicleTable::Invoices,
        VehicleTable::Recommendations,
        VehicleTable::ServiceJobs,
        VehicleTable::ProblemReports,
        VehicleTable::Attachments,
        VehicleTable::ConsentRecords,
    ];

    /// Tables whose rows reference binaries, in traversal order.
    pub const WITH_BINARIES: [VehicleTable; 3] = [
        VehicleTable::Documents,
        VehicleTable::Media,
        VehicleTable::Attachments,
    ];

    pub fn table_name(&self) -> &'static str {
        match self {
            VehicleTable::Vehicle => "vehicles",
            VehicleTable::OwnershipHistory => "vehicle_ownership_history",
            VehicleTable::Documents => "vehicle_documents",
            VehicleTable::Media => "vehicle_media",
            VehicleTable::TimelineEvents => "vehicle_timeline_events",
            VehicleTable::WorkRequests => "work_requests",
            VehicleTable::Quotes => "quotes",
            VehicleTable::QuoteLineItems => "quote_line_items",
            VehicleTable::Invoices => "invoices",
            VehicleTable::InvoiceLineItems => "invoice_line_items",
            VehicleTable::Recommendations => "recommendations",
            VehicleTable::ServiceJobs => "service_jobs",
            VehicleTable::ProblemReports => "problem_reports",
            VehicleTable::Attachments => "attachments",
            VehicleTable::ConsentRecords => "consent_records",
        }
    }

    /// Name of the `data/<name>.json` document in an export.
    pub fn export_name(&self) -> &'static str {
        match self {
            VehicleTable::Vehicle => "vehicle",
            VehicleTable::OwnershipHistory => "ownership_history",
            VehicleTable::Documents => "documents",
            VehicleTable::Media => "media",
            VehicleTable::TimelineEvents => "timeline_events",
            VehicleTable::WorkRequests => "work_requests",
            VehicleTable::Quotes => "quotes",
            VehicleTable::QuoteLineItems => "quote_line_items",
            VehicleTable::Invoices => "invoices",
            VehicleTable::InvoiceLineItems => "invoice_line_items",
            VehicleTable::Recommendations => "recommendations",
            VehicleTable::ServiceJobs => "service_jobs",
            VehicleTable::ProblemReports => "problem_reports",
            VehicleTable::Attachments => "attachments",
            VehicleTable::ConsentRecords => "consent_records",
        }
    }

    /// Column that links a row to its parent.
    pub fn parent_key(&self) -> &'static str {
        match self {
            VehicleTable::Vehicle => "id",
            VehicleTable::QuoteLineItems => "quote_id",
            VehicleTable::InvoiceLineItems => "invoice_id",
            _ => "vehicle_id",
        }
    }
}

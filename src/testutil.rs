//! Fixtures shared by the unit tests.

use std::io::Read;

use chrono::{DateTime, TimeZone, Utc};
use serde_json::Value;

use crate::auth::{Actor, Role};
use crate::db::Database;
use crate::db::models::{DeletionRequest, Row, VehicleTable};

pub const TENANT: &str = "ws-1";
pub const CUSTOMER: &str = "cust-1";

pub fn row(pairs: &[(&str, Value)]) -> Row {
    pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.clone()))
        .collect()
}

pub fn now() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 3, 14, 9, 26, 53).unwrap()
}

pub fn actor(role: Role) -> Actor {
    Actor::new(format!("user-{role}"), TENANT, role)
}

/// A bare vehicle owned by `TENANT`, registered to `CUSTOMER`.
pub fn seed_vehicle(db: &Database, id: &str) {
    db.insert_row(
        VehicleTable::Vehicle,
        &row(&[
            ("id", id.into()),
            ("workshop_account_id", TENANT.into()),
            ("customer_account_id", CUSTOMER.into()),
            ("registration", format!("REG-{id}").into()),
            ("make", "Volvo".into()),
            ("model", "V70".into()),
            ("year", 2012.into()),
        ]),
    )
    .unwrap();
}

/// A vehicle with at least one row in every dependent table. Ids are
/// prefixed with the vehicle id so several vehicles can coexist.
pub fn seed_full_vehicle(db: &Database, id: &str) {
    seed_vehicle(db, id);
    let vid = || Value::from(id);
    let key = |suffix: &str| Value::from(format!("{id}-{suffix}"));

    insert_row(
        db,
        VehicleTable::OwnershipHistory,
        &[
            ("id", key("owner")),
            ("vehicle_id", vid()),
            ("customer_account_id", CUSTOMER.into()),
            ("started_at", "2020-05-01T00:00:00Z".into()),
        ],
    );
    insert_row(
        db,
        VehicleTable::Documents,
        &[
            ("id", key("doc")),
            ("vehicle_id", vid()),
            ("title", "Registration".into()),
            ("storage_bucket", "vehicle-documents".into()),
            ("storage_path", format!("{id}/docs/registration.pdf").into()),
        ],
    );
    insert_row(
        db,
        VehicleTable::Media,
        &[
            ("id", key("media")),
            ("vehicle_id", vid()),
            ("media_type", "photo".into()),
            ("storage_bucket", "vehicle-media".into()),
            ("storage_path", format!("{id}/photos/front.jpg").into()),
        ],
    );
    insert_row(
        db,
        VehicleTable::TimelineEvents,
        &[
            ("id", key("event")),
            ("vehicle_id", vid()),
            ("event_type", "service".into()),
            ("title", "Annual service".into()),
        ],
    );
    insert_row(
        db,
        VehicleTable::WorkRequests,
        &[
            ("id", key("wr")),
            ("vehicle_id", vid()),
            ("description", "Rattle from rear axle".into()),
        ],
    );
    insert_row(
        db,
        VehicleTable::Quotes,
        &[("id", key("quote")), ("vehicle_id", vid()), ("total_cents", 42000.into())],
    );
    for n in 1..=2 {
        insert_row(
            db,
            VehicleTable::QuoteLineItems,
            &[
                ("id", key(&format!("qli-{n}"))),
                ("quote_id", key("quote")),
                ("description", format!("Part {n}").into()),
                ("unit_price_cents", 21000.into()),
            ],
        );
    }
    insert_row(
        db,
        VehicleTable::Invoices,
        &[("id", key("invoice")), ("vehicle_id", vid()), ("total_cents", 42000.into())],
    );
    insert_row(
        db,
        VehicleTable::InvoiceLineItems,
        &[
            ("id", key("ili-1")),
            ("invoice_id", key("invoice")),
            ("description", "Labour".into()),
            ("quantity", 1.5.into()),
        ],
    );
    insert_row(
        db,
        VehicleTable::Recommendations,
        &[
            ("id", key("rec")),
            ("vehicle_id", vid()),
            ("title", "Replace wiper blades".into()),
            ("severity", "low".into()),
        ],
    );
    insert_row(
        db,
        VehicleTable::ServiceJobs,
        &[("id", key("job")), ("vehicle_id", vid()), ("title", "Oil change".into())],
    );
    insert_row(
        db,
        VehicleTable::ProblemReports,
        &[
            ("id", key("problem")),
            ("vehicle_id", vid()),
            ("description", "Check engine light".into()),
        ],
    );
    insert_row(
        db,
        VehicleTable::Attachments,
        &[
            ("id", key("attachment")),
            ("vehicle_id", vid()),
            ("entity_type", "invoice".into()),
            ("entity_id", key("invoice")),
            ("file_name", "receipt.pdf".into()),
            ("storage_bucket", "attachments".into()),
            ("storage_path", format!("{id}/attachments/receipt.pdf").into()),
        ],
    );
    insert_row(
        db,
        VehicleTable::ConsentRecords,
        &[
            ("id", key("consent")),
            ("vehicle_id", vid()),
            ("customer_account_id", CUSTOMER.into()),
            ("consent_type", "marketing".into()),
            ("granted", true.into()),
        ],
    );
}

fn insert_row(db: &Database, table: VehicleTable, pairs: &[(&str, Value)]) {
    db.insert_row(table, &row(pairs)).unwrap();
}

pub fn seed_request(db: &Database, vehicle_id: &str) -> DeletionRequest {
    let req = DeletionRequest::new(
        vehicle_id,
        TENANT,
        CUSTOMER,
        Some("customer request".into()),
        "2026-03-01T08:00:00.000Z".into(),
    );
    db.insert_deletion_request(&req).unwrap();
    req
}

#[derive(Debug)]
pub struct UnpackedFile {
    pub name: String,
    pub content: Vec<u8>,
    pub crc32: u32,
}

/// Decode an archive with the `zip` crate and check every entry is stored,
/// carries a CRC that matches its bytes, and names a path inside the
/// extraction root. Panics on anything else.
pub fn read_zip(bytes: &[u8]) -> Vec<UnpackedFile> {
    let mut archive = zip::ZipArchive::new(std::io::Cursor::new(bytes)).unwrap();
    let mut files = Vec::with_capacity(archive.len());
    for i in 0..archive.len() {
        let mut file = archive.by_index(i).unwrap();
        let name = file.name().to_string();
        assert_eq!(
            file.compression(),
            zip::CompressionMethod::Stored,
            "{name} should be stored"
        );
        assert!(file.enclosed_name().is_some(), "{name} escapes the archive root");

        let mut content = Vec::new();
        file.read_to_end(&mut content).unwrap();
        assert_eq!(content.len() as u64, file.size());
        assert_eq!(crc32fast::hash(&content), file.crc32(), "CRC mismatch for {name}");

        files.push(UnpackedFile {
            name,
            content,
            crc32: file.crc32(),
        });
    }
    files
}

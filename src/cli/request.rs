use comfy_table::{Cell, Table};

use crate::db::Database;
use crate::db::models::{DeletionRequest, DeletionStatus};

pub fn create_request(
    db: &Database,
    vehicle_id: &str,
    workshop_account_id: &str,
    customer_account_id: &str,
    reason: Option<String>,
) -> anyhow::Result<()> {
    let requested_at = chrono::Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Millis, true);
    let req = DeletionRequest::new(
        vehicle_id,
        workshop_account_id,
        customer_account_id,
        reason,
        requested_at,
    );
    db.insert_deletion_request(&req)?;
    tracing::info!("Created deletion request {} for vehicle {vehicle_id}", req.id);

    println!("Created deletion request {}", req.id);
    Ok(())
}

pub fn list_requests(db: &Database, status: Option<DeletionStatus>) -> anyhow::Result<()> {
    let requests = db.list_deletion_requests(status)?;

    if requests.is_empty() {
        println!("No deletion requests found.");
        return Ok(());
    }

    let mut table = Table::new();
    table.set_header(vec!["ID", "Vehicle", "Workshop", "Status", "Requested", "Exported"]);

    for req in &requests {
        table.add_row(vec![
            Cell::new(short_id(&req.id)),
            Cell::new(&req.vehicle_id),
            Cell::new(&req.workshop_account_id),
            Cell::new(req.status),
            Cell::new(&req.requested_at),
            Cell::new(req.exported_at.as_deref().unwrap_or("-")),
        ]);
    }

    println!("{table}");
    Ok(())
}

pub fn show_request(db: &Database, id: &str) -> anyhow::Result<()> {
    let Some(req) = db.get_deletion_request(id)? else {
        anyhow::bail!("Deletion request '{id}' not found");
    };

    println!("Request:   {}", req.id);
    println!("Vehicle:   {}", req.vehicle_id);
    println!("Workshop:  {}", req.workshop_account_id);
    println!("Customer:  {}", req.customer_account_id);
    println!("Status:    {}", req.status);
    println!("Requested: {}", req.requested_at);
    if let Some(exported_at) = &req.exported_at {
        println!("Exported:  {exported_at}");
    }
    if let Some(processed_at) = &req.processed_at {
        println!(
            "Processed: {processed_at} by {}",
            req.processed_by.as_deref().unwrap_or("unknown")
        );
    }
    if let Some(reason) = &req.reason {
        println!("Reason:    {reason}");
    }
    if !req.metadata.is_empty() {
        println!("Metadata:\n{}", serde_json::to_string_pretty(&req.metadata)?);
    }
    Ok(())
}

fn short_id(id: &str) -> &str {
    id.get(..8).unwrap_or(id)
}

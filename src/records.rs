//! Store boundary: loosely-typed rows in, typed [`ServiceOrder`]s out.
//!
//! Every backend hands back rows as a column-name → cell map. Cells may be
//! strings (CSV-ish sheets, SQLite text), numbers or booleans (sheets read
//! with unformatted values). Decoding coerces once here so the rest of the
//! crate only sees typed orders.

use chrono::NaiveDate;
use serde_json::{Map, Value};
use tracing::warn;

use crate::order_id;
use crate::orders::{OrderStatus, ServiceOrder, DATE_FORMAT};
use crate::printers::{
    legacy_columns, normalize_printers, printers_json, COL_PRINTERS_JSON, COL_PRINTER_BRAND,
    COL_PRINTER_MODEL, COL_PRINTER_SERIAL,
};

pub type RawRecord = Map<String, Value>;

pub const COL_ORDER_ID: &str = "order_id";

/// Canonical column order: sheet header and SQLite schema.
pub const COLUMNS: [&str; 22] = [
    COL_ORDER_ID,
    "client_name",
    "client_phone",
    "client_email",
    COL_PRINTER_BRAND,
    COL_PRINTER_MODEL,
    COL_PRINTER_SERIAL,
    COL_PRINTERS_JSON,
    "issue_description",
    "accessories",
    "notes",
    "date_received",
    "date_pickup_scheduled",
    "date_completed",
    "date_picked_up",
    "status",
    "technician",
    "repair_details",
    "parts_used",
    "labor_cost",
    "parts_cost",
    "total_cost",
];

pub const NUMERIC_COLUMNS: [&str; 3] = ["labor_cost", "parts_cost", "total_cost"];

// ---------------------------------------------------------------------------
// Cell coercion
// ---------------------------------------------------------------------------

/// Render a cell as trimmed text. Null becomes empty; whole numbers lose
/// their trailing `.0` so phone numbers typed into a sheet survive.
pub fn value_text(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.trim().to_string(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                i.to_string()
            } else if let Some(f) = n.as_f64() {
                if f.fract() == 0.0 && f.abs() < 1e15 {
                    format!("{f:.0}")
                } else {
                    f.to_string()
                }
            } else {
                n.to_string()
            }
        }
        other => other.to_string(),
    }
}

pub fn parse_number(value: &Value) -> Option<f64> {
    if let Some(number) = value.as_f64() {
        return Some(number);
    }
    if let Some(text) = value.as_str() {
        let trimmed = text.trim();
        if trimmed.is_empty() {
            return None;
        }
        return trimmed.replace(',', ".").parse::<f64>().ok();
    }
    None
}

/// Sheet booleans arrive as real booleans, 0/1 or words (`TRUE`, `da`).
pub fn parse_bool(value: &Value) -> Option<bool> {
    if let Some(flag) = value.as_bool() {
        return Some(flag);
    }
    if let Some(number) = value.as_f64() {
        return Some(number != 0.0);
    }
    if let Some(text) = value.as_str() {
        let normalized = text.trim().to_ascii_lowercase();
        if matches!(normalized.as_str(), "1" | "true" | "yes" | "da" | "on") {
            return Some(true);
        }
        if matches!(normalized.as_str(), "" | "0" | "false" | "no" | "nu" | "off") {
            return Some(false);
        }
    }
    None
}

fn text(record: &RawRecord, key: &str) -> String {
    record.get(key).map(value_text).unwrap_or_default()
}

fn number(record: &RawRecord, key: &str) -> f64 {
    record.get(key).and_then(parse_number).unwrap_or(0.0)
}

/// Keep dates only in `YYYY-MM-DD`. Sheets sometimes add a time part.
fn date(record: &RawRecord, key: &str) -> String {
    let raw = text(record, key);
    let candidate = raw.get(..10).unwrap_or(&raw);
    if NaiveDate::parse_from_str(candidate, DATE_FORMAT).is_ok() {
        candidate.to_string()
    } else {
        String::new()
    }
}

// ---------------------------------------------------------------------------
// Decode / encode
// ---------------------------------------------------------------------------

/// Decode one stored row. Rows without a valid identifier are skipped.
pub fn decode_order(record: &RawRecord) -> Option<ServiceOrder> {
    let order_id = text(record, COL_ORDER_ID);
    if !order_id::is_valid_order_id(&order_id) {
        if !order_id.is_empty() {
            warn!(order_id = %order_id, "skipping row with malformed order id");
        }
        return None;
    }

    let raw_status = text(record, "status");
    let status = match OrderStatus::parse(&raw_status) {
        Some(s) => s,
        None => {
            if !raw_status.is_empty() {
                warn!(order_id = %order_id, status = %raw_status, "unknown status, treating as Received");
            }
            OrderStatus::Received
        }
    };

    let labor_cost = number(record, "labor_cost");
    let parts_cost = number(record, "parts_cost");
    let total_cost = match record.get("total_cost").and_then(parse_number) {
        Some(total) => total,
        None => labor_cost + parts_cost,
    };

    Some(ServiceOrder {
        order_id,
        client_name: text(record, "client_name"),
        client_phone: text(record, "client_phone"),
        client_email: text(record, "client_email"),
        printers: normalize_printers(record),
        issue_description: text(record, "issue_description"),
        accessories: text(record, "accessories"),
        notes: text(record, "notes"),
        date_received: date(record, "date_received"),
        date_pickup_scheduled: date(record, "date_pickup_scheduled"),
        date_completed: date(record, "date_completed"),
        date_picked_up: date(record, "date_picked_up"),
        status,
        technician: text(record, "technician"),
        repair_details: text(record, "repair_details"),
        parts_used: text(record, "parts_used"),
        labor_cost,
        parts_cost,
        total_cost,
    })
}

pub fn decode_orders(records: &[RawRecord]) -> Vec<ServiceOrder> {
    records.iter().filter_map(decode_order).collect()
}

/// Encode an order into a full row, including both printer representations.
pub fn encode_order(order: &ServiceOrder) -> RawRecord {
    let (brand, model, serial) = legacy_columns(&order.printers);
    let mut rec = RawRecord::new();
    let mut put = |key: &str, value: Value| {
        rec.insert(key.to_string(), value);
    };
    put(COL_ORDER_ID, Value::from(order.order_id.clone()));
    put("client_name", Value::from(order.client_name.clone()));
    put("client_phone", Value::from(order.client_phone.clone()));
    put("client_email", Value::from(order.client_email.clone()));
    put(COL_PRINTER_BRAND, Value::from(brand));
    put(COL_PRINTER_MODEL, Value::from(model));
    put(COL_PRINTER_SERIAL, Value::from(serial));
    put(COL_PRINTERS_JSON, Value::from(printers_json(&order.printers)));
    put("issue_description", Value::from(order.issue_description.clone()));
    put("accessories", Value::from(order.accessories.clone()));
    put("notes", Value::from(order.notes.clone()));
    put("date_received", Value::from(order.date_received.clone()));
    put("date_pickup_scheduled", Value::from(order.date_pickup_scheduled.clone()));
    put("date_completed", Value::from(order.date_completed.clone()));
    put("date_picked_up", Value::from(order.date_picked_up.clone()));
    put("status", Value::from(order.status.label()));
    put("technician", Value::from(order.technician.clone()));
    put("repair_details", Value::from(order.repair_details.clone()));
    put("parts_used", Value::from(order.parts_used.clone()));
    put("labor_cost", Value::from(order.labor_cost));
    put("parts_cost", Value::from(order.parts_cost));
    put("total_cost", Value::from(order.total_cost));
    rec
}

/// Fingerprint of an order as it would be stored. Clients echo it back as
/// `expected_version` so a stale edit is refused instead of overwriting.
pub fn record_version(order: &ServiceOrder) -> String {
    let rec = encode_order(order);
    let canonical: Vec<String> = COLUMNS
        .iter()
        .map(|col| rec.get(*col).map(value_text).unwrap_or_default())
        .collect();
    format!("{:x}", md5::compute(canonical.join("\u{1f}").as_bytes()))
}

/// Identifier of a raw row, if any. Used by stores for addressed updates.
pub fn row_order_id(record: &RawRecord) -> String {
    text(record, COL_ORDER_ID)
}

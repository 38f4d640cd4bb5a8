//! Service-order domain model: status lifecycle, intake and update forms,
//! and the cost rules applied when an order is edited.

use chrono::{Local, NaiveDate};
use serde::{Deserialize, Serialize};

use crate::error::{CrmError, CrmResult};
use crate::printers::PrinterEntry;

pub const DATE_FORMAT: &str = "%Y-%m-%d";

#[derive(
    Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord,
)]
pub enum OrderStatus {
    #[default]
    #[serde(rename = "Received", alias = "received")]
    Received,
    #[serde(rename = "In Progress", alias = "in_progress")]
    InProgress,
    #[serde(rename = "Awaiting Parts", alias = "awaiting_parts")]
    AwaitingParts,
    #[serde(rename = "Ready for Pickup", alias = "ready_for_pickup")]
    ReadyForPickup,
    #[serde(rename = "Completed", alias = "completed")]
    Completed,
    #[serde(rename = "Picked Up", alias = "picked_up")]
    PickedUp,
    #[serde(rename = "Canceled", alias = "canceled")]
    Canceled,
}

impl OrderStatus {
    pub const ALL: [OrderStatus; 7] = [
        OrderStatus::Received,
        OrderStatus::InProgress,
        OrderStatus::AwaitingParts,
        OrderStatus::ReadyForPickup,
        OrderStatus::Completed,
        OrderStatus::PickedUp,
        OrderStatus::Canceled,
    ];

    pub fn label(self) -> &'static str {
        match self {
            OrderStatus::Received => "Received",
            OrderStatus::InProgress => "In Progress",
            OrderStatus::AwaitingParts => "Awaiting Parts",
            OrderStatus::ReadyForPickup => "Ready for Pickup",
            OrderStatus::Completed => "Completed",
            OrderStatus::PickedUp => "Picked Up",
            OrderStatus::Canceled => "Canceled",
        }
    }

    /// Parse a stored or submitted status. Labels match case-insensitively;
    /// `in_progress` / `ready-for-pickup` style spellings are accepted too.
    pub fn parse(raw: &str) -> Option<Self> {
        let normalized: String = raw
            .trim()
            .chars()
            .map(|c| match c {
                '_' | '-' => ' ',
                other => other.to_ascii_lowercase(),
            })
            .collect();
        let normalized = normalized.split_whitespace().collect::<Vec<_>>().join(" ");
        match normalized.as_str() {
            "received" => Some(OrderStatus::Received),
            "in progress" => Some(OrderStatus::InProgress),
            "awaiting parts" => Some(OrderStatus::AwaitingParts),
            "ready for pickup" => Some(OrderStatus::ReadyForPickup),
            "completed" => Some(OrderStatus::Completed),
            "picked up" => Some(OrderStatus::PickedUp),
            "canceled" | "cancelled" => Some(OrderStatus::Canceled),
            _ => None,
        }
    }

    /// Still in the shop and not yet finished.
    pub fn is_open(self) -> bool {
        !matches!(
            self,
            OrderStatus::Completed | OrderStatus::PickedUp | OrderStatus::Canceled
        )
    }

    /// Work is done and billable.
    pub fn is_completed(self) -> bool {
        matches!(self, OrderStatus::Completed | OrderStatus::PickedUp)
    }
}

impl std::fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ServiceOrder {
    pub order_id: String,
    pub client_name: String,
    pub client_phone: String,
    pub client_email: String,
    pub printers: Vec<PrinterEntry>,
    pub issue_description: String,
    pub accessories: String,
    pub notes: String,
    pub date_received: String,
    pub date_pickup_scheduled: String,
    pub date_completed: String,
    pub date_picked_up: String,
    pub status: OrderStatus,
    pub technician: String,
    pub repair_details: String,
    pub parts_used: String,
    pub labor_cost: f64,
    pub parts_cost: f64,
    pub total_cost: f64,
}

impl ServiceOrder {
    pub fn has_warranty(&self) -> bool {
        self.printers.iter().any(|p| p.warranty)
    }
}

/// Intake form submitted when equipment is dropped off.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct NewOrder {
    pub client_name: String,
    pub client_phone: String,
    pub client_email: String,
    pub printers: Vec<PrinterEntry>,
    pub issue_description: String,
    pub accessories: String,
    pub notes: String,
    pub date_received: Option<String>,
    pub date_pickup_scheduled: Option<String>,
}

impl NewOrder {
    pub fn validate(&self) -> CrmResult<()> {
        if self.client_name.trim().is_empty() {
            return Err(CrmError::Validation("Client name is required".into()));
        }
        if !self.printers.iter().any(|p| !p.is_blank()) {
            return Err(CrmError::Validation(
                "At least one printer with a brand or model is required".into(),
            ));
        }
        if let Some(date) = self.date_received.as_deref() {
            normalize_date(date, "date_received")?;
        }
        if let Some(date) = self.date_pickup_scheduled.as_deref() {
            normalize_date(date, "date_pickup_scheduled")?;
        }
        Ok(())
    }

    /// Build the stored order. All service fields start empty and costs zero.
    pub fn into_order(self, order_id: String, today: NaiveDate) -> ServiceOrder {
        let date_received = self
            .date_received
            .map(|d| canonical_date(&d))
            .filter(|d| !d.is_empty())
            .unwrap_or_else(|| today.format(DATE_FORMAT).to_string());
        ServiceOrder {
            order_id,
            client_name: self.client_name.trim().to_string(),
            client_phone: self.client_phone.trim().to_string(),
            client_email: self.client_email.trim().to_string(),
            printers: self
                .printers
                .into_iter()
                .filter(|p| !p.is_blank())
                .map(PrinterEntry::trimmed)
                .collect(),
            issue_description: self.issue_description.trim().to_string(),
            accessories: self.accessories.trim().to_string(),
            notes: self.notes.trim().to_string(),
            date_received,
            date_pickup_scheduled: self
                .date_pickup_scheduled
                .map(|d| canonical_date(&d))
                .unwrap_or_default(),
            status: OrderStatus::Received,
            ..ServiceOrder::default()
        }
    }
}

/// Partial update from the service workflow. Absent fields are left as is.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct OrderUpdate {
    pub client_name: Option<String>,
    pub client_phone: Option<String>,
    pub client_email: Option<String>,
    pub printers: Option<Vec<PrinterEntry>>,
    pub issue_description: Option<String>,
    pub accessories: Option<String>,
    pub notes: Option<String>,
    pub date_pickup_scheduled: Option<String>,
    pub date_completed: Option<String>,
    pub date_picked_up: Option<String>,
    pub status: Option<OrderStatus>,
    pub technician: Option<String>,
    pub repair_details: Option<String>,
    pub parts_used: Option<String>,
    pub labor_cost: Option<f64>,
    pub parts_cost: Option<f64>,
    /// Explicit total; when absent the total is labor + parts.
    pub total_cost: Option<f64>,
}

pub fn derived_total(labor_cost: f64, parts_cost: f64, override_total: Option<f64>) -> f64 {
    override_total.unwrap_or(labor_cost + parts_cost)
}

/// Validate a date cell and return it zero-padded (`2026-3-5` becomes
/// `2026-03-05`). Blank stays blank.
fn normalize_date(value: &str, field: &str) -> CrmResult<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Ok(String::new());
    }
    NaiveDate::parse_from_str(trimmed, DATE_FORMAT)
        .map(|d| d.format(DATE_FORMAT).to_string())
        .map_err(|_| {
            CrmError::Validation(format!("{field} must be a YYYY-MM-DD date, got '{trimmed}'"))
        })
}

fn canonical_date(value: &str) -> String {
    normalize_date(value, "date").unwrap_or_else(|_| value.trim().to_string())
}

fn require_cost(value: Option<f64>, field: &str) -> CrmResult<()> {
    match value {
        Some(v) if !v.is_finite() || v < 0.0 => Err(CrmError::Validation(format!(
            "{field} must be a non-negative number"
        ))),
        _ => Ok(()),
    }
}

fn set_text(target: &mut String, value: Option<String>) {
    if let Some(v) = value {
        *target = v.trim().to_string();
    }
}

/// Apply an update in place. `order_id` never changes.
pub fn apply_update(order: &mut ServiceOrder, update: OrderUpdate, today: NaiveDate) -> CrmResult<()> {
    require_cost(update.labor_cost, "labor_cost")?;
    require_cost(update.parts_cost, "parts_cost")?;
    require_cost(update.total_cost, "total_cost")?;
    let date = |value: Option<String>, field: &str| {
        value.map(|v| normalize_date(&v, field)).transpose()
    };
    let date_pickup_scheduled = date(update.date_pickup_scheduled, "date_pickup_scheduled")?;
    let date_completed = date(update.date_completed, "date_completed")?;
    let date_picked_up = date(update.date_picked_up, "date_picked_up")?;
    if let Some(name) = update.client_name.as_deref() {
        if name.trim().is_empty() {
            return Err(CrmError::Validation("Client name cannot be empty".into()));
        }
    }

    set_text(&mut order.client_name, update.client_name);
    set_text(&mut order.client_phone, update.client_phone);
    set_text(&mut order.client_email, update.client_email);
    if let Some(printers) = update.printers {
        order.printers = printers
            .into_iter()
            .filter(|p| !p.is_blank())
            .map(PrinterEntry::trimmed)
            .collect();
    }
    set_text(&mut order.issue_description, update.issue_description);
    set_text(&mut order.accessories, update.accessories);
    set_text(&mut order.notes, update.notes);
    set_text(&mut order.date_pickup_scheduled, date_pickup_scheduled);
    set_text(&mut order.date_completed, date_completed);
    set_text(&mut order.date_picked_up, date_picked_up);
    set_text(&mut order.technician, update.technician);
    set_text(&mut order.repair_details, update.repair_details);
    set_text(&mut order.parts_used, update.parts_used);

    if let Some(labor) = update.labor_cost {
        order.labor_cost = labor;
    }
    if let Some(parts) = update.parts_cost {
        order.parts_cost = parts;
    }
    // A stored override survives edits that touch neither cost nor total.
    let costs_changed = update.labor_cost.is_some() || update.parts_cost.is_some();
    if costs_changed || update.total_cost.is_some() {
        order.total_cost = derived_total(order.labor_cost, order.parts_cost, update.total_cost);
    }

    if let Some(status) = update.status {
        apply_status(order, status, today);
    }
    Ok(())
}

/// Change status and stamp the completion / pickup dates when they are
/// still empty.
pub fn apply_status(order: &mut ServiceOrder, status: OrderStatus, today: NaiveDate) {
    let stamp = today.format(DATE_FORMAT).to_string();
    match status {
        OrderStatus::Completed => {
            if order.date_completed.is_empty() {
                order.date_completed = stamp;
            }
        }
        OrderStatus::PickedUp => {
            if order.date_completed.is_empty() {
                order.date_completed = stamp.clone();
            }
            if order.date_picked_up.is_empty() {
                order.date_picked_up = stamp;
            }
        }
        _ => {}
    }
    order.status = status;
}

pub fn today() -> NaiveDate {
    Local::now().date_naive()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn day(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, DATE_FORMAT).expect("valid date")
    }

    fn printer(brand: &str, model: &str) -> PrinterEntry {
        PrinterEntry {
            brand: brand.into(),
            model: model.into(),
            ..PrinterEntry::default()
        }
    }

    fn sample_order() -> ServiceOrder {
        NewOrder {
            client_name: "Ion Popescu".into(),
            printers: vec![printer("HP", "M1")],
            ..NewOrder::default()
        }
        .into_order("SRV-00001".into(), day("2026-03-02"))
    }

    #[test]
    fn total_is_derived_from_labor_and_parts() {
        let mut order = sample_order();
        let update = OrderUpdate {
            labor_cost: Some(50.0),
            parts_cost: Some(30.0),
            ..OrderUpdate::default()
        };
        apply_update(&mut order, update, day("2026-03-03")).expect("update");
        assert_eq!(order.total_cost, 80.0);
    }

    #[test]
    fn override_survives_edits_that_skip_costs() {
        let mut order = sample_order();
        apply_update(
            &mut order,
            OrderUpdate {
                labor_cost: Some(50.0),
                parts_cost: Some(30.0),
                total_cost: Some(70.0),
                ..OrderUpdate::default()
            },
            day("2026-03-03"),
        )
        .expect("priced");
        apply_update(
            &mut order,
            OrderUpdate {
                notes: Some("client called".into()),
                technician: Some("Mihai".into()),
                ..OrderUpdate::default()
            },
            day("2026-03-04"),
        )
        .expect("notes only");
        assert_eq!(order.total_cost, 70.0);
        assert_eq!(order.notes, "client called");
    }

    #[test]
    fn unpadded_dates_are_stored_padded() {
        let mut order = sample_order();
        apply_update(
            &mut order,
            OrderUpdate {
                date_pickup_scheduled: Some("2026-3-5".into()),
                ..OrderUpdate::default()
            },
            day("2026-03-03"),
        )
        .expect("update");
        assert_eq!(order.date_pickup_scheduled, "2026-03-05");

        let intake = NewOrder {
            client_name: "Ana".into(),
            printers: vec![PrinterEntry {
                brand: "HP".into(),
                ..PrinterEntry::default()
            }],
            date_received: Some(" 2026-4-7 ".into()),
            ..NewOrder::default()
        };
        intake.validate().expect("valid");
        let created = intake.into_order("SRV-00009".into(), day("2026-04-08"));
        assert_eq!(created.date_received, "2026-04-07");
    }

    #[test]
    fn explicit_total_overrides_derivation() {
        let mut order = sample_order();
        let update = OrderUpdate {
            labor_cost: Some(50.0),
            parts_cost: Some(30.0),
            total_cost: Some(70.0),
            ..OrderUpdate::default()
        };
        apply_update(&mut order, update, day("2026-03-03")).expect("update");
        assert_eq!(order.total_cost, 70.0);
    }

    #[test]
    fn later_update_without_override_recomputes_total() {
        let mut order = sample_order();
        apply_update(
            &mut order,
            OrderUpdate {
                labor_cost: Some(50.0),
                total_cost: Some(10.0),
                ..OrderUpdate::default()
            },
            day("2026-03-03"),
        )
        .expect("first update");
        apply_update(
            &mut order,
            OrderUpdate {
                parts_cost: Some(30.0),
                ..OrderUpdate::default()
            },
            day("2026-03-04"),
        )
        .expect("second update");
        assert_eq!(order.total_cost, 80.0);
    }

    #[test]
    fn negative_cost_is_rejected() {
        let mut order = sample_order();
        let err = apply_update(
            &mut order,
            OrderUpdate {
                labor_cost: Some(-1.0),
                ..OrderUpdate::default()
            },
            day("2026-03-03"),
        )
        .unwrap_err();
        assert!(matches!(err, CrmError::Validation(_)));
    }

    #[test]
    fn new_order_starts_received_with_empty_service_fields() {
        let order = sample_order();
        assert_eq!(order.status, OrderStatus::Received);
        assert_eq!(order.date_received, "2026-03-02");
        assert!(order.technician.is_empty());
        assert!(order.date_completed.is_empty());
        assert_eq!(order.total_cost, 0.0);
    }

    #[test]
    fn intake_requires_client_and_printer() {
        let missing_client = NewOrder {
            printers: vec![printer("HP", "")],
            ..NewOrder::default()
        };
        assert!(missing_client.validate().is_err());

        let blank_printer = NewOrder {
            client_name: "Ana".into(),
            printers: vec![PrinterEntry::default()],
            ..NewOrder::default()
        };
        assert!(blank_printer.validate().is_err());

        let bad_date = NewOrder {
            client_name: "Ana".into(),
            printers: vec![printer("Epson", "L3110")],
            date_received: Some("02/03/2026".into()),
            ..NewOrder::default()
        };
        assert!(bad_date.validate().is_err());
    }

    #[test]
    fn completing_stamps_completion_date_once() {
        let mut order = sample_order();
        apply_status(&mut order, OrderStatus::Completed, day("2026-03-05"));
        assert_eq!(order.date_completed, "2026-03-05");
        apply_status(&mut order, OrderStatus::Completed, day("2026-03-09"));
        assert_eq!(order.date_completed, "2026-03-05");
    }

    #[test]
    fn pickup_fills_missing_completion_date() {
        let mut order = sample_order();
        apply_status(&mut order, OrderStatus::PickedUp, day("2026-03-06"));
        assert_eq!(order.date_completed, "2026-03-06");
        assert_eq!(order.date_picked_up, "2026-03-06");
        assert_eq!(order.status, OrderStatus::PickedUp);
    }

    #[test]
    fn status_parse_accepts_label_variants() {
        assert_eq!(OrderStatus::parse("Ready for Pickup"), Some(OrderStatus::ReadyForPickup));
        assert_eq!(OrderStatus::parse("in_progress"), Some(OrderStatus::InProgress));
        assert_eq!(OrderStatus::parse(" PICKED-UP "), Some(OrderStatus::PickedUp));
        assert_eq!(OrderStatus::parse("cancelled"), Some(OrderStatus::Canceled));
        assert_eq!(OrderStatus::parse("lost"), None);
        for status in OrderStatus::ALL {
            assert_eq!(OrderStatus::parse(status.label()), Some(status));
        }
    }

    #[test]
    fn status_serializes_as_label() {
        let json = serde_json::to_string(&OrderStatus::AwaitingParts).expect("serialize");
        assert_eq!(json, "\"Awaiting Parts\"");
    }
}

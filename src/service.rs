//! Order workflow on top of an [`OrderStore`]: intake, lookup, updates.
//!
//! The store is the only source of truth. Each operation re-reads it, so
//! rows edited or deleted directly in the sheet are picked up immediately
//! and the next identifier is computed from what is actually stored.

use chrono::NaiveDate;
use serde::Deserialize;
use std::sync::Arc;
use tracing::{info, warn};

use crate::error::{CrmError, CrmResult};
use crate::order_id;
use crate::orders::{self, NewOrder, OrderStatus, OrderUpdate, ServiceOrder, DATE_FORMAT};
use crate::records::{decode_orders, encode_order, record_version};
use crate::store::OrderStore;

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct OrderFilter {
    pub status: Option<OrderStatus>,
    /// Free text matched against id, client, phone, email and printers.
    pub query: Option<String>,
    pub date_from: Option<String>,
    pub date_to: Option<String>,
    /// Only orders still in the shop.
    pub open_only: bool,
}

fn parse_bound(raw: Option<&str>) -> CrmResult<Option<NaiveDate>> {
    match raw.map(str::trim).filter(|s| !s.is_empty()) {
        None => Ok(None),
        Some(s) => NaiveDate::parse_from_str(s, DATE_FORMAT)
            .map(Some)
            .map_err(|_| CrmError::Validation(format!("Invalid date '{s}', expected YYYY-MM-DD"))),
    }
}

/// Inclusive `date_received` range check. Orders without a parseable
/// received date only match an unbounded range.
pub fn received_in_range(order: &ServiceOrder, from: Option<NaiveDate>, to: Option<NaiveDate>) -> bool {
    if from.is_none() && to.is_none() {
        return true;
    }
    let Ok(received) = NaiveDate::parse_from_str(&order.date_received, DATE_FORMAT) else {
        return false;
    };
    from.map_or(true, |f| received >= f) && to.map_or(true, |t| received <= t)
}

fn matches_query(order: &ServiceOrder, needle: &str) -> bool {
    let haystacks = [
        order.order_id.as_str(),
        order.client_name.as_str(),
        order.client_phone.as_str(),
        order.client_email.as_str(),
    ];
    if haystacks.iter().any(|h| h.to_lowercase().contains(needle)) {
        return true;
    }
    order.printers.iter().any(|p| {
        [p.brand.as_str(), p.model.as_str(), p.serial.as_str()]
            .iter()
            .any(|h| h.to_lowercase().contains(needle))
    })
}

/// An order plus the version token a client must echo on update.
#[derive(Debug, Clone, serde::Serialize)]
pub struct VersionedOrder {
    #[serde(flatten)]
    pub order: ServiceOrder,
    pub version: String,
}

impl From<ServiceOrder> for VersionedOrder {
    fn from(order: ServiceOrder) -> Self {
        let version = record_version(&order);
        Self { order, version }
    }
}

#[derive(Clone)]
pub struct OrderService {
    store: Arc<dyn OrderStore>,
}

impl OrderService {
    pub fn new(store: Arc<dyn OrderStore>) -> Self {
        Self { store }
    }

    pub fn backend_name(&self) -> &'static str {
        self.store.backend_name()
    }

    fn load(&self) -> CrmResult<Vec<ServiceOrder>> {
        let rows = self.store.read_all()?;
        Ok(decode_orders(&rows))
    }

    pub fn all_orders(&self) -> CrmResult<Vec<ServiceOrder>> {
        self.load()
    }

    /// The identifier the next intake would receive right now.
    pub fn preview_next_id(&self) -> CrmResult<String> {
        let rows = self.store.read_all()?;
        let ids: Vec<String> = rows.iter().map(crate::records::row_order_id).collect();
        Ok(order_id::next_order_id(ids.iter().map(String::as_str)))
    }

    /// Register a new order. Identifiers come from the raw rows, so a row
    /// whose other cells are damaged still holds on to its number.
    pub fn create_order(&self, new_order: NewOrder) -> CrmResult<ServiceOrder> {
        self.create_order_on(new_order, orders::today())
    }

    pub fn create_order_on(&self, new_order: NewOrder, today: NaiveDate) -> CrmResult<ServiceOrder> {
        new_order.validate()?;
        let next_id = self.preview_next_id()?;
        let order = new_order.into_order(next_id, today);
        self.store.upsert(&encode_order(&order))?;
        info!(
            order_id = %order.order_id,
            printers = order.printers.len(),
            backend = self.backend_name(),
            "service order created"
        );
        Ok(order)
    }

    pub fn get_order(&self, id: &str) -> CrmResult<ServiceOrder> {
        let wanted = id.trim();
        self.load()?
            .into_iter()
            .find(|o| o.order_id == wanted)
            .ok_or_else(|| CrmError::NotFound(format!("Order {wanted} not found")))
    }

    /// Filtered list, newest identifier first.
    pub fn list_orders(&self, filter: &OrderFilter) -> CrmResult<Vec<ServiceOrder>> {
        let from = parse_bound(filter.date_from.as_deref())?;
        let to = parse_bound(filter.date_to.as_deref())?;
        let needle = filter
            .query
            .as_deref()
            .map(|q| q.trim().to_lowercase())
            .filter(|q| !q.is_empty());

        let mut orders: Vec<ServiceOrder> = self
            .load()?
            .into_iter()
            .filter(|o| filter.status.map_or(true, |s| o.status == s))
            .filter(|o| !filter.open_only || o.status.is_open())
            .filter(|o| received_in_range(o, from, to))
            .filter(|o| needle.as_deref().map_or(true, |n| matches_query(o, n)))
            .collect();
        orders.sort_by_key(|o| std::cmp::Reverse(order_id::parse_order_number(&o.order_id)));
        Ok(orders)
    }

    /// Apply an update. With `expected_version`, the update is refused when
    /// the stored order changed since the client read it.
    pub fn update_order(
        &self,
        id: &str,
        update: OrderUpdate,
        expected_version: Option<&str>,
    ) -> CrmResult<ServiceOrder> {
        self.update_order_on(id, update, expected_version, orders::today())
    }

    pub fn update_order_on(
        &self,
        id: &str,
        update: OrderUpdate,
        expected_version: Option<&str>,
        today: NaiveDate,
    ) -> CrmResult<ServiceOrder> {
        let mut order = self.get_order(id)?;
        check_version(&order, expected_version)?;
        orders::apply_update(&mut order, update, today)?;
        self.store.upsert(&encode_order(&order))?;
        info!(order_id = %order.order_id, status = %order.status, "service order updated");
        Ok(order)
    }

    pub fn set_status(&self, id: &str, status: OrderStatus) -> CrmResult<ServiceOrder> {
        self.set_status_on(id, status, orders::today())
    }

    pub fn set_status_on(
        &self,
        id: &str,
        status: OrderStatus,
        today: NaiveDate,
    ) -> CrmResult<ServiceOrder> {
        let mut order = self.get_order(id)?;
        let previous = order.status;
        orders::apply_status(&mut order, status, today);
        self.store.upsert(&encode_order(&order))?;
        info!(order_id = %order.order_id, from = %previous, to = %status, "status changed");
        Ok(order)
    }
}

fn check_version(order: &ServiceOrder, expected: Option<&str>) -> CrmResult<()> {
    let Some(expected) = expected.map(str::trim).filter(|v| !v.is_empty()) else {
        return Ok(());
    };
    let current = record_version(order);
    if current != expected {
        warn!(order_id = %order.order_id, "stale update rejected");
        return Err(CrmError::Conflict(format!(
            "Order {} was changed by someone else; reload and try again",
            order.order_id
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::printers::PrinterEntry;
    use crate::records::RawRecord;
    use crate::store::MemoryStore;
    use serde_json::json;

    fn day(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, DATE_FORMAT).expect("valid date")
    }

    fn intake(name: &str, brand: &str, model: &str) -> NewOrder {
        NewOrder {
            client_name: name.into(),
            client_phone: "0722 123 456".into(),
            printers: vec![PrinterEntry {
                brand: brand.into(),
                model: model.into(),
                serial: format!("{brand}-SN"),
                warranty: false,
            }],
            issue_description: "Paper jam".into(),
            ..NewOrder::default()
        }
    }

    fn service() -> (OrderService, Arc<MemoryStore>) {
        let store = Arc::new(MemoryStore::new());
        (OrderService::new(store.clone()), store)
    }

    #[test]
    fn first_order_gets_first_id() {
        let (svc, _) = service();
        let order = svc
            .create_order_on(intake("Ana", "HP", "M1"), day("2026-04-01"))
            .expect("create");
        assert_eq!(order.order_id, "SRV-00001");
        assert_eq!(order.date_received, "2026-04-01");
        assert_eq!(order.status, OrderStatus::Received);
    }

    #[test]
    fn deleted_row_gap_is_reused() {
        let (svc, store) = service();
        for name in ["A", "B", "C", "D"] {
            svc.create_order_on(intake(name, "HP", "M1"), day("2026-04-01"))
                .expect("create");
        }
        // Someone deletes SRV-00003 directly in the sheet.
        let rows: Vec<RawRecord> = store
            .read_all()
            .expect("read")
            .into_iter()
            .filter(|r| r["order_id"] != json!("SRV-00003"))
            .collect();
        store.write_all(&rows).expect("write");

        let order = svc
            .create_order_on(intake("E", "Epson", "L3110"), day("2026-04-02"))
            .expect("create");
        assert_eq!(order.order_id, "SRV-00003");
        assert_eq!(svc.preview_next_id().expect("preview"), "SRV-00005");
    }

    #[test]
    fn malformed_rows_do_not_block_allocation() {
        let store = Arc::new(MemoryStore::with_rows(vec![
            json!({ "order_id": "SRV-00001" }).as_object().cloned().expect("row"),
            json!({ "order_id": "#REF!" }).as_object().cloned().expect("row"),
        ]));
        let svc = OrderService::new(store);
        assert_eq!(svc.preview_next_id().expect("preview"), "SRV-00002");
        assert_eq!(svc.all_orders().expect("orders").len(), 1);
    }

    #[test]
    fn invalid_intake_is_not_stored() {
        let (svc, store) = service();
        let err = svc
            .create_order_on(intake("  ", "HP", "M1"), day("2026-04-01"))
            .unwrap_err();
        assert!(matches!(err, CrmError::Validation(_)));
        assert!(store.read_all().expect("read").is_empty());
    }

    #[test]
    fn update_recomputes_total_and_persists() {
        let (svc, _) = service();
        let created = svc
            .create_order_on(intake("Ana", "HP", "M1"), day("2026-04-01"))
            .expect("create");
        let update = OrderUpdate {
            technician: Some("Mihai".into()),
            labor_cost: Some(50.0),
            parts_cost: Some(30.0),
            status: Some(OrderStatus::Completed),
            ..OrderUpdate::default()
        };
        svc.update_order_on(&created.order_id, update, None, day("2026-04-03"))
            .expect("update");

        let stored = svc.get_order("SRV-00001").expect("get");
        assert_eq!(stored.total_cost, 80.0);
        assert_eq!(stored.technician, "Mihai");
        assert_eq!(stored.date_completed, "2026-04-03");
        assert_eq!(stored.order_id, created.order_id);
    }

    #[test]
    fn stale_version_is_rejected() {
        let (svc, _) = service();
        let created = svc
            .create_order_on(intake("Ana", "HP", "M1"), day("2026-04-01"))
            .expect("create");
        let seen = record_version(&created);

        svc.update_order(
            "SRV-00001",
            OrderUpdate {
                notes: Some("first edit".into()),
                ..OrderUpdate::default()
            },
            Some(seen.as_str()),
        )
        .expect("first edit wins");

        let err = svc
            .update_order(
                "SRV-00001",
                OrderUpdate {
                    notes: Some("second edit".into()),
                    ..OrderUpdate::default()
                },
                Some(seen.as_str()),
            )
            .unwrap_err();
        assert!(matches!(err, CrmError::Conflict(_)));
        assert_eq!(svc.get_order("SRV-00001").expect("get").notes, "first edit");
    }

    #[test]
    fn missing_order_is_not_found() {
        let (svc, _) = service();
        assert!(matches!(svc.get_order("SRV-00042"), Err(CrmError::NotFound(_))));
        assert!(matches!(
            svc.set_status("SRV-00042", OrderStatus::Completed),
            Err(CrmError::NotFound(_))
        ));
    }

    #[test]
    fn list_filters_and_sorts_newest_first() {
        let (svc, _) = service();
        svc.create_order_on(intake("Ana Pop", "HP", "M1"), day("2026-04-01"))
            .expect("create");
        svc.create_order_on(intake("Dan Ene", "Epson", "L3110"), day("2026-04-05"))
            .expect("create");
        svc.create_order_on(intake("Ion Pop", "Canon", "MF3010"), day("2026-04-09"))
            .expect("create");
        svc.set_status_on("SRV-00002", OrderStatus::PickedUp, day("2026-04-10"))
            .expect("status");

        let all = svc.list_orders(&OrderFilter::default()).expect("list");
        let ids: Vec<&str> = all.iter().map(|o| o.order_id.as_str()).collect();
        assert_eq!(ids, vec!["SRV-00003", "SRV-00002", "SRV-00001"]);

        let pop = svc
            .list_orders(&OrderFilter {
                query: Some("pop".into()),
                ..OrderFilter::default()
            })
            .expect("list");
        assert_eq!(pop.len(), 2);

        let epson = svc
            .list_orders(&OrderFilter {
                query: Some("l3110".into()),
                ..OrderFilter::default()
            })
            .expect("list");
        assert_eq!(epson[0].order_id, "SRV-00002");

        let open = svc
            .list_orders(&OrderFilter {
                open_only: true,
                ..OrderFilter::default()
            })
            .expect("list");
        assert_eq!(open.len(), 2);

        let ranged = svc
            .list_orders(&OrderFilter {
                date_from: Some("2026-04-02".into()),
                date_to: Some("2026-04-09".into()),
                ..OrderFilter::default()
            })
            .expect("list");
        assert_eq!(ranged.len(), 2);

        let bad = svc.list_orders(&OrderFilter {
            date_from: Some("April".into()),
            ..OrderFilter::default()
        });
        assert!(matches!(bad, Err(CrmError::Validation(_))));
    }
}

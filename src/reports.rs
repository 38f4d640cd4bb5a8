//! Shop summary for a period: order counts, revenue and workload.
//!
//! Aggregates the decoded order list in memory. Revenue only counts orders
//! that reached `Completed` or `Picked Up`.

use chrono::NaiveDate;
use serde::Serialize;
use std::collections::BTreeMap;

use crate::orders::{OrderStatus, ServiceOrder};
use crate::service::received_in_range;

#[derive(Debug, Clone, Default, Serialize, PartialEq)]
pub struct TechnicianLoad {
    pub technician: String,
    pub orders: usize,
    pub completed: usize,
    pub revenue: f64,
}

#[derive(Debug, Clone, Default, Serialize, PartialEq)]
pub struct ServiceSummary {
    pub period_from: Option<String>,
    pub period_to: Option<String>,
    pub total_orders: usize,
    /// Keyed by status label, every status present even when zero.
    pub by_status: BTreeMap<String, usize>,
    pub open_orders: usize,
    pub completed_orders: usize,
    pub warranty_orders: usize,
    pub printers_received: usize,
    pub revenue: f64,
    pub labor_total: f64,
    pub parts_total: f64,
    pub average_ticket: f64,
    pub technicians: Vec<TechnicianLoad>,
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// Summarize orders whose `date_received` falls in `[from, to]`.
pub fn summarize(
    orders: &[ServiceOrder],
    from: Option<NaiveDate>,
    to: Option<NaiveDate>,
) -> ServiceSummary {
    let mut summary = ServiceSummary {
        period_from: from.map(|d| d.to_string()),
        period_to: to.map(|d| d.to_string()),
        by_status: OrderStatus::ALL
            .iter()
            .map(|s| (s.label().to_string(), 0))
            .collect(),
        ..ServiceSummary::default()
    };

    let mut loads: BTreeMap<String, TechnicianLoad> = BTreeMap::new();
    let mut ticketed = 0usize;

    for order in orders.iter().filter(|o| received_in_range(o, from, to)) {
        summary.total_orders += 1;
        *summary.by_status.entry(order.status.label().to_string()).or_default() += 1;
        summary.printers_received += order.printers.len();
        if order.has_warranty() {
            summary.warranty_orders += 1;
        }
        if order.status.is_open() {
            summary.open_orders += 1;
        }

        let done = order.status.is_completed();
        if done {
            summary.completed_orders += 1;
            summary.revenue += order.total_cost;
            summary.labor_total += order.labor_cost;
            summary.parts_total += order.parts_cost;
            if order.total_cost > 0.0 {
                ticketed += 1;
            }
        }

        let tech = order.technician.trim();
        if !tech.is_empty() {
            let load = loads.entry(tech.to_string()).or_insert_with(|| TechnicianLoad {
                technician: tech.to_string(),
                ..TechnicianLoad::default()
            });
            load.orders += 1;
            if done {
                load.completed += 1;
                load.revenue += order.total_cost;
            }
        }
    }

    if ticketed > 0 {
        summary.average_ticket = round2(summary.revenue / ticketed as f64);
    }
    summary.revenue = round2(summary.revenue);
    summary.labor_total = round2(summary.labor_total);
    summary.parts_total = round2(summary.parts_total);

    let mut technicians: Vec<TechnicianLoad> = loads
        .into_values()
        .map(|mut l| {
            l.revenue = round2(l.revenue);
            l
        })
        .collect();
    technicians.sort_by(|a, b| b.orders.cmp(&a.orders).then(a.technician.cmp(&b.technician)));
    summary.technicians = technicians;
    summary
}

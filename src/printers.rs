//! Printers attached to a service order.
//!
//! Orders carry two representations of their equipment: the `printers_json`
//! column (list of printers, each with a warranty flag) and the legacy flat
//! columns `printer_brand` / `printer_model` / `printer_serial` written before
//! multi-printer support existed. Reads reconcile both into one list; writes
//! always emit both so older sheet formulas keep working.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

use crate::records::{parse_bool, value_text, RawRecord};

pub const COL_PRINTERS_JSON: &str = "printers_json";
pub const COL_PRINTER_BRAND: &str = "printer_brand";
pub const COL_PRINTER_MODEL: &str = "printer_model";
pub const COL_PRINTER_SERIAL: &str = "printer_serial";

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct PrinterEntry {
    pub brand: String,
    pub model: String,
    pub serial: String,
    pub warranty: bool,
}

impl PrinterEntry {
    /// No brand and no model: nothing identifies the equipment.
    pub fn is_blank(&self) -> bool {
        self.brand.trim().is_empty() && self.model.trim().is_empty()
    }

    pub fn trimmed(self) -> Self {
        Self {
            brand: self.brand.trim().to_string(),
            model: self.model.trim().to_string(),
            serial: self.serial.trim().to_string(),
            warranty: self.warranty,
        }
    }

    /// "Brand Model", skipping whichever part is empty.
    pub fn display_name(&self) -> String {
        [self.brand.trim(), self.model.trim()]
            .iter()
            .filter(|part| !part.is_empty())
            .copied()
            .collect::<Vec<_>>()
            .join(" ")
    }
}

fn entry_from_value(value: &Value) -> Option<PrinterEntry> {
    let obj = value.as_object()?;
    let text = |key: &str| obj.get(key).map(value_text).unwrap_or_default();
    Some(PrinterEntry {
        brand: text("brand"),
        model: text("model"),
        serial: text("serial"),
        warranty: obj.get("warranty").and_then(parse_bool).unwrap_or(false),
    })
}

/// Parse the JSON column. `None` means "no usable data": absent, blank,
/// not valid JSON, or not a list.
fn printers_from_json(raw: &Value) -> Option<Vec<PrinterEntry>> {
    let parsed = match raw {
        Value::Array(_) => raw.clone(),
        Value::String(text) if !text.trim().is_empty() => match serde_json::from_str(text) {
            Ok(value) => value,
            Err(e) => {
                debug!(error = %e, "printers_json is not valid JSON, using legacy columns");
                return None;
            }
        },
        _ => return None,
    };
    let items = parsed.as_array()?;
    let entries: Vec<PrinterEntry> = items.iter().filter_map(entry_from_value).collect();
    if entries.is_empty() {
        return None;
    }
    Some(entries)
}

/// Reconcile the JSON list and the legacy columns into one printer list.
///
/// The JSON column wins whenever it yields at least one entry. Otherwise a
/// single entry is synthesized from the legacy columns with `warranty`
/// false, since that format never stored it. Both empty gives an empty list.
pub fn normalize_printers(record: &RawRecord) -> Vec<PrinterEntry> {
    if let Some(entries) = record.get(COL_PRINTERS_JSON).and_then(printers_from_json) {
        return entries;
    }

    let cell = |key: &str| record.get(key).map(value_text).unwrap_or_default();
    let legacy = PrinterEntry {
        brand: cell(COL_PRINTER_BRAND),
        model: cell(COL_PRINTER_MODEL),
        serial: cell(COL_PRINTER_SERIAL),
        warranty: false,
    };
    if legacy.is_blank() && legacy.serial.trim().is_empty() {
        return Vec::new();
    }
    vec![legacy]
}

/// Values for the legacy flat columns: a copy of the first printer.
pub fn legacy_columns(printers: &[PrinterEntry]) -> (String, String, String) {
    match printers.first() {
        Some(p) => (p.brand.clone(), p.model.clone(), p.serial.clone()),
        None => (String::new(), String::new(), String::new()),
    }
}

pub fn printers_json(printers: &[PrinterEntry]) -> String {
    serde_json::to_string(printers).unwrap_or_else(|_| "[]".to_string())
}

//! Receipt generation for service orders.
//!
//! Builds intake / completion documents from a stored order, renders them
//! as HTML pages or ESC/POS tickets, and writes HTML artifacts into the
//! receipts directory. The company logo is decoded once at startup and kept
//! as a PNG data URL.

use std::fs;
use std::io::Cursor;
use std::path::{Path, PathBuf};

use base64::Engine as _;
use chrono::Local;
use image::ImageFormat;
use tracing::{info, warn};

use crate::config::AppConfig;
use crate::error::{CrmError, CrmResult};
use crate::orders::ServiceOrder;
use crate::receipt_renderer::{
    self, CompletionReceiptDoc, IntakeReceiptDoc, LayoutConfig, ReceiptDocument, ReceiptKind,
};

/// Bounding box for the header logo, in pixels.
const LOGO_MAX_WIDTH: u32 = 150;
const LOGO_MAX_HEIGHT: u32 = 95;

pub fn intake_doc(order: &ServiceOrder) -> IntakeReceiptDoc {
    IntakeReceiptDoc {
        order_id: order.order_id.clone(),
        client_name: order.client_name.clone(),
        client_phone: order.client_phone.clone(),
        client_email: order.client_email.clone(),
        printers: order.printers.clone(),
        date_received: order.date_received.clone(),
        date_pickup_scheduled: order.date_pickup_scheduled.clone(),
        accessories: order.accessories.clone(),
        issue_description: order.issue_description.clone(),
    }
}

pub fn completion_doc(order: &ServiceOrder) -> CompletionReceiptDoc {
    CompletionReceiptDoc {
        intake: intake_doc(order),
        technician: order.technician.clone(),
        repair_details: order.repair_details.clone(),
        parts_used: order.parts_used.clone(),
        labor_cost: order.labor_cost,
        parts_cost: order.parts_cost,
        total_cost: order.total_cost,
        date_completed: order.date_completed.clone(),
        date_picked_up: order.date_picked_up.clone(),
    }
}

pub fn build_document(order: &ServiceOrder, kind: ReceiptKind) -> ReceiptDocument {
    match kind {
        ReceiptKind::Intake => ReceiptDocument::Intake(intake_doc(order)),
        ReceiptKind::Completion => ReceiptDocument::Completion(completion_doc(order)),
    }
}

// ---------------------------------------------------------------------------
// Logo
// ---------------------------------------------------------------------------

fn parse_data_url_image(source: &str) -> Option<Vec<u8>> {
    let trimmed = source.trim();
    if !trimmed.starts_with("data:image/") {
        return None;
    }
    let (_, payload) = trimmed.split_once(',')?;
    base64::engine::general_purpose::STANDARD
        .decode(payload)
        .ok()
}

fn read_logo_source_bytes(source: &str) -> CrmResult<Vec<u8>> {
    let trimmed = source.trim();
    if trimmed.is_empty() {
        return Err(CrmError::Receipt("Logo source is empty".into()));
    }
    if trimmed.starts_with("data:image/") {
        return parse_data_url_image(trimmed)
            .ok_or_else(|| CrmError::Receipt("logo data URL is not valid base64".into()));
    }

    let path_value = trimmed.strip_prefix("file://").unwrap_or(trimmed);
    fs::read(path_value)
        .map_err(|e| CrmError::Receipt(format!("logo file read failed ({path_value}): {e}")))
}

/// Decode a logo (file path or data URL), shrink it into the header box and
/// re-encode it as a PNG data URL.
pub fn logo_data_url(source: &str) -> CrmResult<String> {
    let bytes = read_logo_source_bytes(source)?;
    let decoded =
        image::load_from_memory(&bytes).map_err(|e| CrmError::Receipt(format!("logo decode: {e}")))?;
    if decoded.width() == 0 || decoded.height() == 0 {
        return Err(CrmError::Receipt("logo image has invalid dimensions".into()));
    }
    let thumb = decoded.thumbnail(LOGO_MAX_WIDTH, LOGO_MAX_HEIGHT);

    let mut png = Vec::new();
    thumb
        .write_to(&mut Cursor::new(&mut png), ImageFormat::Png)
        .map_err(|e| CrmError::Receipt(format!("logo encode: {e}")))?;
    Ok(format!(
        "data:image/png;base64,{}",
        base64::engine::general_purpose::STANDARD.encode(png)
    ))
}

/// Logo for receipts, or `None` (placeholder) when missing or unreadable.
pub fn load_logo(source: Option<&str>) -> Option<String> {
    let source = source.map(str::trim).filter(|s| !s.is_empty())?;
    match logo_data_url(source) {
        Ok(url) => Some(url),
        Err(e) => {
            warn!(error = %e, "logo unavailable, receipts will show the placeholder");
            None
        }
    }
}

// ---------------------------------------------------------------------------
// Printer
// ---------------------------------------------------------------------------

pub struct ReceiptPrinter {
    layout: LayoutConfig,
    receipts_dir: PathBuf,
}

impl ReceiptPrinter {
    pub fn new(layout: LayoutConfig, receipts_dir: PathBuf) -> Self {
        Self {
            layout,
            receipts_dir,
        }
    }

    pub fn from_config(config: &AppConfig) -> Self {
        let logo_source = config
            .logo_path
            .as_deref()
            .map(|p| p.to_string_lossy().to_string());
        let layout = LayoutConfig {
            paper_width: config.paper_width,
            company: config.company.clone(),
            logo_data_url: load_logo(logo_source.as_deref()),
            ..LayoutConfig::default()
        };
        Self::new(layout, config.receipts_dir())
    }

    pub fn receipts_dir(&self) -> &Path {
        &self.receipts_dir
    }

    pub fn render_html(&self, order: &ServiceOrder, kind: ReceiptKind) -> String {
        receipt_renderer::render_html(&build_document(order, kind), &self.layout)
    }

    pub fn render_escpos(&self, order: &ServiceOrder, kind: ReceiptKind) -> Vec<u8> {
        receipt_renderer::render_escpos(&build_document(order, kind), &self.layout)
    }

    /// Render and write `{order}_{kind}_{timestamp}.html`; returns its path.
    pub fn write_html(&self, order: &ServiceOrder, kind: ReceiptKind) -> CrmResult<PathBuf> {
        let document = build_document(order, kind);
        let html = receipt_renderer::render_html(&document, &self.layout);
        fs::create_dir_all(&self.receipts_dir)
            .map_err(|e| CrmError::Receipt(format!("create receipts dir: {e}")))?;
        let timestamp = Local::now().format("%Y%m%d_%H%M%S");
        let file_path = self
            .receipts_dir
            .join(format!("{}_{timestamp}.html", document.file_stem()));
        fs::write(&file_path, html)
            .map_err(|e| CrmError::Receipt(format!("write receipt: {e}")))?;
        info!(order_id = %order.order_id, kind = %kind, path = %file_path.display(), "receipt file generated");
        Ok(file_path)
    }
}

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::escpos::{remove_diacritics, wrap, EscPosBuilder, PaperWidth};
use crate::printers::PrinterEntry;

/// Static shop details printed in every receipt header.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct CompanyInfo {
    pub company_name: String,
    pub company_address: String,
    pub cui: String,
    pub reg_com: String,
    pub phone: String,
    pub email: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReceiptKind {
    Intake,
    Completion,
}

impl ReceiptKind {
    pub fn slug(self) -> &'static str {
        match self {
            ReceiptKind::Intake => "predare",
            ReceiptKind::Completion => "ridicare",
        }
    }
}

impl FromStr for ReceiptKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "intake" | "initial" | "predare" => Ok(ReceiptKind::Intake),
            "completion" | "final" | "ridicare" => Ok(ReceiptKind::Completion),
            other => Err(format!("unknown receipt kind '{other}'")),
        }
    }
}

impl fmt::Display for ReceiptKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ReceiptKind::Intake => "intake",
            ReceiptKind::Completion => "completion",
        })
    }
}

/// Hand-over slip given to the client when equipment is dropped off.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct IntakeReceiptDoc {
    pub order_id: String,
    pub client_name: String,
    pub client_phone: String,
    pub client_email: String,
    pub printers: Vec<PrinterEntry>,
    pub date_received: String,
    #[serde(default)]
    pub date_pickup_scheduled: String,
    #[serde(default)]
    pub accessories: String,
    pub issue_description: String,
}

/// Pick-up slip: the intake details plus the work performed and its cost.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct CompletionReceiptDoc {
    pub intake: IntakeReceiptDoc,
    pub technician: String,
    pub repair_details: String,
    pub parts_used: String,
    pub labor_cost: f64,
    pub parts_cost: f64,
    pub total_cost: f64,
    pub date_completed: String,
    #[serde(default)]
    pub date_picked_up: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "doc", rename_all = "snake_case")]
pub enum ReceiptDocument {
    Intake(IntakeReceiptDoc),
    Completion(CompletionReceiptDoc),
}

impl ReceiptDocument {
    pub fn kind(&self) -> ReceiptKind {
        match self {
            ReceiptDocument::Intake(_) => ReceiptKind::Intake,
            ReceiptDocument::Completion(_) => ReceiptKind::Completion,
        }
    }

    fn intake(&self) -> &IntakeReceiptDoc {
        match self {
            ReceiptDocument::Intake(doc) => doc,
            ReceiptDocument::Completion(doc) => &doc.intake,
        }
    }

    pub fn order_id(&self) -> &str {
        &self.intake().order_id
    }

    /// File name stem, e.g. `SRV-00007_predare`.
    pub fn file_stem(&self) -> String {
        format!("{}_{}", self.order_id(), self.kind().slug())
    }

    fn title(&self) -> &'static str {
        match self {
            ReceiptDocument::Intake(_) => "BON PREDARE ECHIPAMENT IN SERVICE",
            ReceiptDocument::Completion(_) => "BON RIDICARE ECHIPAMENT DIN SERVICE",
        }
    }

    fn footer(&self) -> &'static str {
        match self {
            ReceiptDocument::Intake(_) => {
                "Acest document constituie dovada predarii echipamentului in service."
            }
            ReceiptDocument::Completion(_) => {
                "Acest document constituie dovada ridicarii echipamentului din service."
            }
        }
    }
}

#[derive(Debug, Clone)]
pub struct LayoutConfig {
    pub paper_width: PaperWidth,
    pub company: CompanyInfo,
    /// PNG data URL; the `[LOGO]` placeholder is drawn when absent.
    pub logo_data_url: Option<String>,
    pub currency: String,
}

impl Default for LayoutConfig {
    fn default() -> Self {
        Self {
            paper_width: PaperWidth::Mm80,
            company: CompanyInfo::default(),
            logo_data_url: None,
            currency: "RON".to_string(),
        }
    }
}

fn esc(input: &str) -> String {
    input
        .replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

/// Transliterate then escape for HTML.
fn txt(input: &str) -> String {
    esc(&remove_diacritics(input.trim()))
}

fn money(value: f64, currency: &str) -> String {
    format!("{value:.2} {currency}")
}

fn warranty_label(printer: &PrinterEntry) -> &'static str {
    if printer.warranty {
        "DA"
    } else {
        "NU"
    }
}

fn non_empty(value: &str) -> Option<&str> {
    Some(value.trim()).filter(|v| !v.is_empty())
}

// ---------------------------------------------------------------------------
// HTML (A5 landscape, 210 x 148.5 mm)
// ---------------------------------------------------------------------------

const PAGE_WIDTH_MM: f64 = 210.0;
const PAGE_HEIGHT_MM: f64 = 148.5;
/// Characters per line for the issue text at 8pt across 190 mm.
const ISSUE_WRAP_CHARS: usize = 110;

fn html_shell(title: &str, body: &str) -> String {
    format!(
        r#"<!DOCTYPE html>
<html lang="ro">
<head>
<meta charset="UTF-8"/>
<title>{title}</title>
<style>
@page {{ size: {w}mm {h}mm; margin: 0; }}
html, body {{ margin: 0; padding: 0; }}
body {{ font-family: Helvetica, Arial, sans-serif; font-size: 8pt; color: #000; }}
.page {{ position: relative; width: {w}mm; height: {h}mm; overflow: hidden; }}
.blk {{ position: absolute; line-height: 3.5mm; }}
.b {{ font-weight: bold; }}
.h9 {{ font-size: 9pt; font-weight: bold; }}
.h10 {{ font-size: 10pt; font-weight: bold; }}
.h11 {{ font-size: 11pt; font-weight: bold; }}
.h12 {{ font-size: 12pt; font-weight: bold; }}
.center {{ left: 0; width: {w}mm; text-align: center; }}
.order-no {{ color: #0066cc; }}
.logo {{ width: 40mm; height: 25mm; display: flex; align-items: center; justify-content: center; }}
.logo img {{ max-width: 40mm; max-height: 25mm; }}
.logo.placeholder {{ background: #f0f0f0; border: 1px solid #000; font-weight: bold; font-size: 10pt; }}
.sign {{ width: 85mm; height: 20mm; border: 1px solid #000; box-sizing: border-box; padding: 0.5mm 2mm; }}
.sign .bottom {{ position: absolute; bottom: 1mm; font-size: 7pt; }}
.footer {{ font-size: 6pt; }}
.rule {{ position: absolute; left: 5mm; width: 200mm; bottom: 1mm; border-top: 1px dashed #000; }}
</style>
</head>
<body><div class="page">{body}</div></body>
</html>"#,
        title = esc(title),
        w = PAGE_WIDTH_MM,
        h = PAGE_HEIGHT_MM,
        body = body
    )
}

fn block(left_mm: f64, top_mm: f64, class: &str, inner: &str) -> String {
    format!(
        "<div class=\"blk {class}\" style=\"left:{left_mm}mm;top:{top_mm}mm\">{inner}</div>"
    )
}

fn line(text: &str) -> String {
    format!("<div>{text}</div>")
}

fn logo_html(cfg: &LayoutConfig) -> String {
    match cfg.logo_data_url.as_deref().and_then(non_empty) {
        Some(url) => block(
            10.0,
            5.0,
            "logo",
            &format!("<img src=\"{}\" alt=\"logo\"/>", esc(url)),
        ),
        None => block(10.0, 5.0, "logo placeholder", "[LOGO]"),
    }
}

fn company_html(company: &CompanyInfo) -> String {
    let mut inner = format!("<div class=\"h11\">{}</div>", txt(&company.company_name));
    inner.push_str(&line(&txt(&company.company_address)));
    inner.push_str(&line(&format!(
        "CUI: {} | Reg.Com: {}",
        txt(&company.cui),
        txt(&company.reg_com)
    )));
    inner.push_str(&line(&format!(
        "Tel: {} | {}",
        txt(&company.phone),
        txt(&company.email)
    )));
    block(10.0, 31.5, "", &inner)
}

fn client_html(doc: &IntakeReceiptDoc) -> String {
    let mut inner = String::from("<div class=\"h9\">CLIENT</div>");
    inner.push_str(&line(&format!("Nume: {}", txt(&doc.client_name))));
    inner.push_str(&line(&format!("Tel: {}", txt(&doc.client_phone))));
    if let Some(email) = non_empty(&doc.client_email) {
        inner.push_str(&line(&format!("Email: {}", txt(email))));
    }
    block(120.0, 11.5, "", &inner)
}

fn equipment_lines(doc: &IntakeReceiptDoc) -> String {
    let mut inner = String::from("<div class=\"h9\">DETALII ECHIPAMENT:</div>");
    if doc.printers.is_empty() {
        inner.push_str(&line("Imprimanta: -"));
    }
    for (idx, printer) in doc.printers.iter().enumerate() {
        let label = if doc.printers.len() > 1 {
            format!("Imprimanta {}", idx + 1)
        } else {
            "Imprimanta".to_string()
        };
        inner.push_str(&line(&format!(
            "{label}: {} {}",
            txt(&printer.brand),
            txt(&printer.model)
        )));
        let serial = non_empty(&printer.serial).unwrap_or("N/A");
        inner.push_str(&line(&format!("Serie: {}", txt(serial))));
        inner.push_str(&line(&format!(
            "<span class=\"b\">GARANTIE: {}</span>",
            warranty_label(printer)
        )));
    }
    inner.push_str(&line(&format!("Data predarii: {}", txt(&doc.date_received))));
    if let Some(date) = non_empty(&doc.date_pickup_scheduled) {
        inner.push_str(&line(&format!("Data estimata ridicare: {}", txt(date))));
    }
    if let Some(accessories) = non_empty(&doc.accessories) {
        inner.push_str(&line(&format!("Accesorii: {}", txt(accessories))));
    }
    inner
}

fn issue_lines(doc: &IntakeReceiptDoc) -> String {
    let mut inner = String::from("<div class=\"h9\" style=\"margin-top:2mm\">PROBLEMA RAPORTATA:</div>");
    for wrapped in wrap(&remove_diacritics(&doc.issue_description), ISSUE_WRAP_CHARS) {
        inner.push_str(&line(&esc(&wrapped)));
    }
    inner
}

fn work_lines(doc: &CompletionReceiptDoc, currency: &str) -> String {
    let mut inner = String::from("<div class=\"h9\">LUCRARI EFECTUATE:</div>");
    if let Some(tech) = non_empty(&doc.technician) {
        inner.push_str(&line(&format!("Tehnician: {}", txt(tech))));
    }
    for wrapped in wrap(&remove_diacritics(&doc.repair_details), 55) {
        inner.push_str(&line(&esc(&wrapped)));
    }
    if let Some(parts) = non_empty(&doc.parts_used) {
        inner.push_str(&line(&format!("Piese utilizate: {}", txt(parts))));
    }
    inner.push_str(&line(&format!("Manopera: {}", money(doc.labor_cost, currency))));
    inner.push_str(&line(&format!("Piese: {}", money(doc.parts_cost, currency))));
    inner.push_str(&format!(
        "<div class=\"h10\">TOTAL: {}</div>",
        money(doc.total_cost, currency)
    ));
    if let Some(date) = non_empty(&doc.date_completed) {
        inner.push_str(&line(&format!("Data finalizarii: {}", txt(date))));
    }
    if let Some(date) = non_empty(&doc.date_picked_up) {
        inner.push_str(&line(&format!("Data ridicarii: {}", txt(date))));
    }
    inner
}

fn signatures_html(client_name: &str) -> String {
    let top = PAGE_HEIGHT_MM - 45.0;
    let operator = "<div class=\"b\">OPERATOR SERVICE</div>\
                    <div class=\"bottom\">Semnatura si Stampila</div>";
    let client = format!(
        "<div class=\"b\">CLIENT</div><div>Nume: {}</div><div class=\"bottom\">Semnatura</div>",
        txt(client_name)
    );
    format!(
        "{}{}",
        block(10.0, top, "sign", operator),
        block(115.0, top, "sign", &client)
    )
}

/// Print-ready A5 landscape page for the document.
pub fn render_html(document: &ReceiptDocument, cfg: &LayoutConfig) -> String {
    let intake = document.intake();
    let mut body = String::new();
    body.push_str(&logo_html(cfg));
    body.push_str(&company_html(&cfg.company));
    body.push_str(&client_html(intake));
    body.push_str(&block(0.0, 51.0, "center h12", document.title()));
    body.push_str(&block(
        0.0,
        58.0,
        "center h10 order-no",
        &format!("Nr. Comanda: {}", txt(&intake.order_id)),
    ));

    match document {
        ReceiptDocument::Intake(doc) => {
            let mut inner = equipment_lines(doc);
            inner.push_str(&issue_lines(doc));
            body.push_str(&block(10.0, 68.5, "", &inner));
        }
        ReceiptDocument::Completion(doc) => {
            let mut left = equipment_lines(&doc.intake);
            left.push_str(&issue_lines(&doc.intake));
            body.push_str(&block(10.0, 68.5, "", &left));
            body.push_str(&block(115.0, 68.5, "", &work_lines(doc, &cfg.currency)));
        }
    }

    body.push_str(&signatures_html(&intake.client_name));
    body.push_str(&block(
        0.0,
        PAGE_HEIGHT_MM - 5.5,
        "center footer",
        document.footer(),
    ));
    body.push_str("<div class=\"rule\"></div>");

    let title = format!("{} {}", document.title(), intake.order_id);
    html_shell(&title, &body)
}

// ---------------------------------------------------------------------------
// ESC/POS
// ---------------------------------------------------------------------------

fn emit_header(builder: &mut EscPosBuilder, company: &CompanyInfo) {
    builder.center();
    if let Some(name) = non_empty(&company.company_name) {
        builder.bold(true).double_height().line(name).normal_size().bold(false);
    }
    if let Some(address) = non_empty(&company.company_address) {
        builder.wrapped(address);
    }
    if non_empty(&company.cui).is_some() || non_empty(&company.reg_com).is_some() {
        builder.line(&format!("CUI: {} | Reg.Com: {}", company.cui, company.reg_com));
    }
    if non_empty(&company.phone).is_some() || non_empty(&company.email).is_some() {
        builder.line(&format!("Tel: {} | {}", company.phone, company.email));
    }
    builder.left().separator();
}

fn emit_intake_body(builder: &mut EscPosBuilder, doc: &IntakeReceiptDoc) {
    builder.bold(true).line("CLIENT").bold(false);
    builder.line(&format!("Nume: {}", doc.client_name.trim()));
    builder.line(&format!("Tel: {}", doc.client_phone.trim()));
    if let Some(email) = non_empty(&doc.client_email) {
        builder.line(&format!("Email: {email}"));
    }
    builder.separator();

    builder.bold(true).line("DETALII ECHIPAMENT:").bold(false);
    for printer in &doc.printers {
        builder.wrapped(&format!("Imprimanta: {}", printer.display_name()));
        builder.line(&format!(
            "Serie: {}",
            non_empty(&printer.serial).unwrap_or("N/A")
        ));
        builder
            .bold(true)
            .line(&format!("GARANTIE: {}", warranty_label(printer)))
            .bold(false);
    }
    builder.line_pair("Data predarii:", doc.date_received.trim());
    if let Some(date) = non_empty(&doc.date_pickup_scheduled) {
        builder.line_pair("Ridicare estimata:", date);
    }
    if let Some(accessories) = non_empty(&doc.accessories) {
        builder.wrapped(&format!("Accesorii: {accessories}"));
    }
    builder.lf().bold(true).line("PROBLEMA RAPORTATA:").bold(false);
    builder.wrapped(&doc.issue_description);
}

fn emit_work_body(builder: &mut EscPosBuilder, doc: &CompletionReceiptDoc, currency: &str) {
    builder.separator();
    builder.bold(true).line("LUCRARI EFECTUATE:").bold(false);
    if let Some(tech) = non_empty(&doc.technician) {
        builder.line(&format!("Tehnician: {tech}"));
    }
    if let Some(details) = non_empty(&doc.repair_details) {
        builder.wrapped(details);
    }
    if let Some(parts) = non_empty(&doc.parts_used) {
        builder.wrapped(&format!("Piese utilizate: {parts}"));
    }
    builder.separator();
    builder.line_pair("Manopera", &money(doc.labor_cost, currency));
    builder.line_pair("Piese", &money(doc.parts_cost, currency));
    builder
        .bold(true)
        .line_pair("TOTAL", &money(doc.total_cost, currency))
        .bold(false);
    if let Some(date) = non_empty(&doc.date_completed) {
        builder.line_pair("Data finalizarii:", date);
    }
    if let Some(date) = non_empty(&doc.date_picked_up) {
        builder.line_pair("Data ridicarii:", date);
    }
}

/// Thermal-printer rendition of the same document.
pub fn render_escpos(document: &ReceiptDocument, cfg: &LayoutConfig) -> Vec<u8> {
    let mut builder = EscPosBuilder::new().with_paper(cfg.paper_width);
    builder.init();
    emit_header(&mut builder, &cfg.company);

    builder.center().bold(true);
    for title_line in wrap(document.title(), cfg.paper_width.chars()) {
        builder.line(&title_line);
    }
    builder
        .bold(false)
        .line(&format!("Nr. Comanda: {}", document.order_id()))
        .left()
        .separator();

    match document {
        ReceiptDocument::Intake(doc) => emit_intake_body(&mut builder, doc),
        ReceiptDocument::Completion(doc) => {
            emit_intake_body(&mut builder, &doc.intake);
            emit_work_body(&mut builder, doc, &cfg.currency);
        }
    }

    builder.separator().lf();
    builder.line("Operator service: ______________");
    builder.lf();
    builder.line("Semnatura client: ______________");
    builder.lf().center();
    builder.wrapped(document.footer());
    builder.feed(4).cut();
    builder.build()
}

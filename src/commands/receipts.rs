use axum::extract::{Path, Query, State};
use axum::http::header;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Deserialize;
use serde_json::{json, Value};

use super::blocking;
use crate::error::{CrmError, CrmResult};
use crate::receipt_renderer::ReceiptKind;
use crate::AppState;

#[derive(Debug, Default, Deserialize)]
pub struct ReceiptQuery {
    #[serde(default)]
    format: Option<String>,
}

fn parse_kind(raw: &str) -> CrmResult<ReceiptKind> {
    raw.parse().map_err(CrmError::Validation)
}

pub async fn render(
    State(state): State<AppState>,
    Path((order_id, kind)): Path<(String, String)>,
    Query(query): Query<ReceiptQuery>,
) -> CrmResult<Response> {
    let kind = parse_kind(&kind)?;
    let format = query
        .format
        .as_deref()
        .map(str::trim)
        .unwrap_or("html")
        .to_ascii_lowercase();
    let service = state.orders.clone();
    let order = blocking(move || service.get_order(&order_id)).await?;

    match format.as_str() {
        "html" => {
            let html = state.receipts.render_html(&order, kind);
            Ok(([(header::CONTENT_TYPE, "text/html; charset=utf-8")], html).into_response())
        }
        "escpos" => {
            let bytes = state.receipts.render_escpos(&order, kind);
            let disposition = format!(
                "attachment; filename=\"{}_{}.bin\"",
                order.order_id,
                kind.slug()
            );
            Ok((
                [
                    (header::CONTENT_TYPE, "application/octet-stream".to_string()),
                    (header::CONTENT_DISPOSITION, disposition),
                ],
                bytes,
            )
                .into_response())
        }
        other => Err(CrmError::Validation(format!(
            "unknown receipt format '{other}', expected html or escpos"
        ))),
    }
}

/// Write the HTML receipt into the receipts directory.
pub async fn save(
    State(state): State<AppState>,
    Path((order_id, kind)): Path<(String, String)>,
) -> CrmResult<Json<Value>> {
    let kind = parse_kind(&kind)?;
    let service = state.orders.clone();
    let receipts = state.receipts.clone();
    let path = blocking(move || {
        let order = service.get_order(&order_id)?;
        receipts.write_html(&order, kind)
    })
    .await?;
    Ok(Json(json!({ "success": true, "path": path.to_string_lossy() })))
}

#[cfg(test)]
mod tests {
    use axum::http::StatusCode;
    use serde_json::json;

    use super::super::test_support::*;

    async fn with_order() -> (axum::Router, String) {
        let (app, token) = logged_in().await;
        let (status, _) = send_json(
            &app,
            "POST",
            "/api/orders",
            Some(&token),
            Some(json!({
                "client_name": "Ion Pârvu",
                "printers": [{ "brand": "Brother", "model": "HL-1110", "warranty": true }],
                "issue_description": "Blocaj hartie"
            })),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        (app, token)
    }

    #[tokio::test]
    async fn html_receipt() {
        let (app, token) = with_order().await;
        let (status, bytes) = send(
            &app,
            "GET",
            "/api/orders/SRV-00001/receipt/intake",
            Some(&token),
            None,
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        let html = String::from_utf8(bytes).expect("utf8");
        assert!(html.contains("BON PREDARE ECHIPAMENT IN SERVICE"));
        assert!(html.contains("Nume: Ion Parvu"));
        assert!(html.contains("GARANTIE: DA"));
    }

    #[tokio::test]
    async fn escpos_receipt_and_bad_inputs() {
        let (app, token) = with_order().await;
        let (status, bytes) = send(
            &app,
            "GET",
            "/api/orders/SRV-00001/receipt/completion?format=escpos",
            Some(&token),
            None,
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(&bytes[..2], &[0x1B, 0x40]);

        let (status, _) = send(
            &app,
            "GET",
            "/api/orders/SRV-00001/receipt/invoice",
            Some(&token),
            None,
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, _) = send(
            &app,
            "GET",
            "/api/orders/SRV-00001/receipt/intake?format=pdf",
            Some(&token),
            None,
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn save_writes_file() {
        let (app, token) = with_order().await;
        let (status, body) = send_json(
            &app,
            "POST",
            "/api/orders/SRV-00001/receipt/intake/save",
            Some(&token),
            None,
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        let path = body["path"].as_str().expect("path");
        assert!(std::path::Path::new(path).exists());
        let _ = std::fs::remove_file(path);
    }
}

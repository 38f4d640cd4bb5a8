use axum::extract::{Query, State};
use axum::Json;
use chrono::NaiveDate;
use serde::Deserialize;

use super::blocking;
use crate::error::{CrmError, CrmResult};
use crate::orders::DATE_FORMAT;
use crate::reports::{summarize, ServiceSummary};
use crate::AppState;

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct PeriodQuery {
    date_from: Option<String>,
    date_to: Option<String>,
}

fn parse_date(raw: Option<&str>) -> CrmResult<Option<NaiveDate>> {
    match raw.map(str::trim).filter(|s| !s.is_empty()) {
        None => Ok(None),
        Some(s) => NaiveDate::parse_from_str(s, DATE_FORMAT)
            .map(Some)
            .map_err(|_| CrmError::Validation(format!("Invalid date '{s}', expected YYYY-MM-DD"))),
    }
}

pub async fn summary(
    State(state): State<AppState>,
    Query(period): Query<PeriodQuery>,
) -> CrmResult<Json<ServiceSummary>> {
    let from = parse_date(period.date_from.as_deref())?;
    let to = parse_date(period.date_to.as_deref())?;
    if let (Some(f), Some(t)) = (from, to) {
        if f > t {
            return Err(CrmError::Validation("date_from is after date_to".into()));
        }
    }
    let service = state.orders.clone();
    let orders = blocking(move || service.all_orders()).await?;
    Ok(Json(summarize(&orders, from, to)))
}

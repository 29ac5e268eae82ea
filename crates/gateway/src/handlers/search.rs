//! Search and statistics handlers

use axum::{
    extract::{Query, State},
    Json,
};
use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use std::time::Instant;
use uuid::Uuid;

use crate::AppState;
use dossier_common::{
    domain::{DocumentStatistics, SearchFilter, SearchPage},
    errors::{AppError, Result},
    metrics,
};

/// Search documents.
///
/// Query parameters: `query`, `category`, `tags` (repeatable or
/// comma-separated), `classification`, `status`, `uploadedBy`, `dateFrom`,
/// `dateTo` (RFC 3339 or `YYYY-MM-DD`), `limit`, `skip`.
pub async fn search_documents(
    State(state): State<AppState>,
    Query(params): Query<Vec<(String, String)>>,
) -> Result<Json<SearchPage>> {
    let filter = parse_search_params(&params)?;
    let mode = if filter.text_query().is_some() { "text" } else { "filter" };

    let start = Instant::now();
    let page = state.store.search(&filter).await?;
    metrics::record_search(start.elapsed().as_secs_f64(), mode, page.total);

    tracing::debug!(
        mode,
        total = page.total,
        returned = page.data.len(),
        "Search completed"
    );

    Ok(Json(page))
}

/// Live document counts by status and category
pub async fn statistics(State(state): State<AppState>) -> Result<Json<DocumentStatistics>> {
    Ok(Json(state.store.statistics().await?))
}

/// Build a filter from raw query pairs. Blank values are ignored.
pub fn parse_search_params(params: &[(String, String)]) -> Result<SearchFilter> {
    let mut filter = SearchFilter::default();

    for (key, value) in params {
        let value = value.trim();
        if value.is_empty() {
            continue;
        }

        match key.as_str() {
            "query" | "q" => filter.query = Some(value.to_string()),
            "category" => filter.category = Some(value.parse()?),
            "tags" | "tag" => filter.tags.extend(
                value
                    .split(',')
                    .map(|tag| tag.trim().to_lowercase())
                    .filter(|tag| !tag.is_empty()),
            ),
            "classification" => filter.classification = Some(value.parse()?),
            "status" => filter.status = Some(value.parse()?),
            "uploadedBy" => {
                filter.uploaded_by = Some(
                    Uuid::parse_str(value)
                        .map_err(|_| AppError::validation("uploadedBy", "must be a UUID"))?,
                )
            }
            "dateFrom" => filter.date_from = Some(parse_date(key, value, NaiveTime::MIN)?),
            "dateTo" => filter.date_to = Some(parse_date(key, value, end_of_day())?),
            "limit" => {
                filter.limit = Some(
                    value
                        .parse()
                        .map_err(|_| AppError::validation("limit", "must be an integer"))?,
                )
            }
            "skip" => {
                filter.skip = value
                    .parse()
                    .map_err(|_| AppError::validation("skip", "must be a non-negative integer"))?
            }
            _ => {}
        }
    }

    if let (Some(from), Some(to)) = (filter.date_from, filter.date_to) {
        if from > to {
            return Err(AppError::validation("dateFrom", "dateFrom must not be after dateTo"));
        }
    }

    Ok(filter)
}

/// RFC 3339 timestamp, or a bare date taken at `time_of_day` UTC.
fn parse_date(field: &str, value: &str, time_of_day: NaiveTime) -> Result<DateTime<Utc>> {
    if let Ok(ts) = DateTime::parse_from_rfc3339(value) {
        return Ok(ts.with_timezone(&Utc));
    }

    NaiveDate::parse_from_str(value, "%Y-%m-%d")
        .map(|date| date.and_time(time_of_day).and_utc())
        .map_err(|_| AppError::validation(field, "expected RFC 3339 timestamp or YYYY-MM-DD"))
}

fn end_of_day() -> NaiveTime {
    NaiveTime::from_hms_milli_opt(23, 59, 59, 999).unwrap_or(NaiveTime::MIN)
}

//! REST endpoint for paginated message history.

use axum::{
    extract::{Query, State},
    http::StatusCode,
    Json,
};
use serde::{Deserialize, Serialize};

use crate::db::models::ChatMessage;
use crate::state::AppState;

/// Default page size for message history.
const DEFAULT_LIMIT: i64 = 50;
/// Maximum page size for message history.
const MAX_LIMIT: i64 = 200;

#[derive(Debug, Deserialize)]
pub struct HistoryQuery {
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

#[derive(Debug, Serialize)]
pub struct HistoryResponse {
    pub count: usize,
    pub items: Vec<ChatMessage>,
}

/// Validate paging parameters. `limit` must be in 1..=200, `offset` >= 0.
pub fn page_bounds(query: &HistoryQuery) -> Option<(u32, i64)> {
    let limit = query.limit.unwrap_or(DEFAULT_LIMIT);
    let offset = query.offset.unwrap_or(0);
    if !(1..=MAX_LIMIT).contains(&limit) || offset < 0 {
        return None;
    }
    Some((limit as u32, offset))
}

/// GET /messages?limit=&offset=
/// Most recent messages first.
pub async fn list_messages(
    State(state): State<AppState>,
    Query(query): Query<HistoryQuery>,
) -> Result<Json<HistoryResponse>, StatusCode> {
    let (limit, offset) = page_bounds(&query).ok_or(StatusCode::BAD_REQUEST)?;

    let items = state.store.get_messages(limit, offset).await.map_err(|e| {
        tracing::error!(error = %e, "Failed to load message history");
        StatusCode::INTERNAL_SERVER_ERROR
    })?;

    Ok(Json(HistoryResponse {
        count: items.len(),
        items,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn query(limit: Option<i64>, offset: Option<i64>) -> HistoryQuery {
        HistoryQuery { limit, offset }
    }

    #[test]
    fn test_defaults() {
        assert_eq!(page_bounds(&query(None, None)), Some((50, 0)));
    }

    #[test]
    fn test_limit_range() {
        assert_eq!(page_bounds(&query(Some(1), None)), Some((1, 0)));
        assert_eq!(page_bounds(&query(Some(200), Some(10))), Some((200, 10)));
        assert_eq!(page_bounds(&query(Some(0), None)), None);
        assert_eq!(page_bounds(&query(Some(201), None)), None);
    }

    #[test]
    fn test_negative_offset_rejected() {
        assert_eq!(page_bounds(&query(None, Some(-1))), None);
    }

    #[test]
    fn test_offset_beyond_u32_accepted() {
        let offset = i64::from(u32::MAX) + 1;
        assert_eq!(page_bounds(&query(None, Some(offset))), Some((50, offset)));
    }
}

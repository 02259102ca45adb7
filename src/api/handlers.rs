use axum::{
    Json,
    extract::{
        Query, State,
        rejection::{JsonRejection, QueryRejection},
    },
    http::{HeaderValue, StatusCode, header},
    response::{IntoResponse, Response},
};
use reqwest::Url;
use std::sync::Arc;
use std::time::Instant;

use crate::index::ProductIndex;
use crate::query_engine::QueryEngine;

use super::error::ApiError;
use super::models::{
    ClickParams, HealthResponse, Pagination, SearchParams, SearchRequest, SearchResponse,
};

/// Liveness only; never touches the index.
pub async fn health_handler() -> Json<HealthResponse> {
    Json(HealthResponse { ok: true })
}

pub async fn search_handler<I: ProductIndex>(
    State(query_engine): State<Arc<QueryEngine<I>>>,
    payload: Result<Json<SearchRequest>, JsonRejection>,
) -> Result<Json<SearchResponse>, ApiError> {
    let Json(request) =
        payload.map_err(|e| ApiError::bad_request("invalid_request", e.body_text()))?;
    run_search(&query_engine, request).await
}

/// Query-string form of [`search_handler`].
pub async fn search_get_handler<I: ProductIndex>(
    State(query_engine): State<Arc<QueryEngine<I>>>,
    params: Result<Query<SearchParams>, QueryRejection>,
) -> Result<Json<SearchResponse>, ApiError> {
    let Query(params) =
        params.map_err(|e| ApiError::bad_request("invalid_request", e.body_text()))?;
    run_search(&query_engine, params.into_request()).await
}

async fn run_search<I: ProductIndex>(
    query_engine: &QueryEngine<I>,
    request: SearchRequest,
) -> Result<Json<SearchResponse>, ApiError> {
    let start = Instant::now();

    // Validation happens before the index is contacted
    let query = request.into_query()?;
    let page = query_engine.search(&query).await?;

    let pagination = Pagination::new(query.offset, query.limit, page.total);
    let processing_time_ms = start.elapsed().as_millis();

    Ok(Json(SearchResponse {
        query: query.text,
        filters: query.filters,
        sort: query.sort,
        pagination,
        results: page.products,
        processing_time_ms,
    }))
}

pub async fn click_handler<I: ProductIndex>(
    State(query_engine): State<Arc<QueryEngine<I>>>,
    params: Result<Query<ClickParams>, QueryRejection>,
) -> Result<Response, ApiError> {
    let Query(params) =
        params.map_err(|e| ApiError::bad_request("invalid_request", e.body_text()))?;

    let target = query_engine
        .resolve_click(params.id.as_deref().unwrap_or_default())
        .await?;

    let location = HeaderValue::from_str(&target.url).map_err(|_| {
        log::error!("seller URL for {} is not a valid header value", target.id);
        ApiError::BadGateway("Stored seller URL is malformed".to_string())
    })?;

    let host = Url::parse(&target.url)
        .ok()
        .and_then(|u| u.host_str().map(str::to_string))
        .unwrap_or_default();
    log::info!("click id={} seller_host={}", target.id, host);

    Ok((StatusCode::FOUND, [(header::LOCATION, location)]).into_response())
}

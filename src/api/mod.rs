use axum::{
    Router,
    http::{HeaderValue, Method, header},
    routing::get,
};
use std::sync::Arc;
use std::time::Duration;
use tower::ServiceBuilder;
use tower_http::{
    cors::{AllowOrigin, Any, CorsLayer},
    trace::TraceLayer,
};

use crate::index::ProductIndex;
use crate::query_engine::QueryEngine;

pub mod error;
pub mod handlers;
pub mod models;

pub fn create_router<I: ProductIndex>(
    query_engine: Arc<QueryEngine<I>>,
    cors_origins: &str,
) -> Router {
    Router::new()
        .route("/health", get(handlers::health_handler))
        .route(
            "/search",
            get(handlers::search_get_handler::<I>).post(handlers::search_handler::<I>),
        )
        .route("/click", get(handlers::click_handler::<I>))
        .with_state(query_engine)
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(build_cors_layer(cors_origins)),
        )
}

/// `*` allows any origin; otherwise a comma-separated allow-list.
fn build_cors_layer(origins: &str) -> CorsLayer {
    let cors = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE, header::ACCEPT])
        .max_age(Duration::from_secs(3600));

    if origins.trim() == "*" {
        return cors.allow_origin(Any);
    }

    let allowed: Vec<HeaderValue> = origins
        .split(',')
        .map(str::trim)
        .filter(|o| !o.is_empty())
        .filter_map(|o| match HeaderValue::from_str(o) {
            Ok(v) => Some(v),
            Err(_) => {
                log::warn!("Ignoring invalid CORS origin: {}", o);
                None
            }
        })
        .collect();
    cors.allow_origin(AllowOrigin::list(allowed))
}

use anyhow::Result;
use axum::{
    Json, Router,
    extract::{Path, Query, State},
    http::{HeaderMap, StatusCode, header},
    routing::{get, post},
};
use reqwest::Url;
use serde_json::{Value, json};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tokio::net::TcpListener;

use webcloset::data_models::{FilterField, SearchQuery, SortOrder};
use webcloset::elasticsearch::ElasticIndex;
use webcloset::error::IndexError;
use webcloset::index::ProductIndex;

const API_KEY: &str = "test-key";

mod test_helpers {
    use super::*;

    /// Requests seen by the fake cluster.
    #[derive(Default)]
    pub struct Recorded {
        pub auth: Vec<Option<String>>,
        pub bodies: Vec<Value>,
        pub queries: Vec<HashMap<String, String>>,
        pub calls: usize,
    }

    pub type Shared = Arc<Mutex<Recorded>>;

    fn record_auth(state: &Shared, headers: &HeaderMap) {
        let auth = headers
            .get(header::AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        let mut recorded = state.lock().unwrap();
        recorded.auth.push(auth);
        recorded.calls += 1;
    }

    async fn search(
        State(state): State<Shared>,
        headers: HeaderMap,
        Json(body): Json<Value>,
    ) -> Json<Value> {
        record_auth(&state, &headers);
        state.lock().unwrap().bodies.push(body);
        Json(json!({
            "took": 3,
            "hits": {
                "total": { "value": 57, "relation": "eq" },
                "hits": [
                    { "_id": "a", "_score": 2.0, "_source": { "id": "src-1", "title": "Air Max 90", "brand": "nike", "price_cents": 8999, "currency": "EUR", "seller_urls": ["https://seller.example/1"] } },
                    { "_id": "b", "_score": 1.5, "_source": { "title": "Air Force 1", "seller_urls": [] } }
                ]
            }
        }))
    }

    async fn get_doc(
        State(state): State<Shared>,
        headers: HeaderMap,
        Path(id): Path<String>,
        Query(params): Query<HashMap<String, String>>,
    ) -> (StatusCode, Json<Value>) {
        record_auth(&state, &headers);
        state.lock().unwrap().queries.push(params);
        match id.as_str() {
            "src-123" => (
                StatusCode::OK,
                Json(json!({
                    "_index": "products",
                    "_id": "src-123",
                    "found": true,
                    "_source": { "seller_urls": ["https://seller.example/item/123", "https://other.example/123"] }
                })),
            ),
            "a/b" => (
                StatusCode::OK,
                Json(json!({ "found": true, "_source": {} })),
            ),
            _ => (
                StatusCode::NOT_FOUND,
                Json(json!({ "_index": "products", "_id": id, "found": false })),
            ),
        }
    }

    async fn missing_index() -> (StatusCode, Json<Value>) {
        (
            StatusCode::NOT_FOUND,
            Json(json!({
                "error": { "type": "index_not_found_exception", "reason": "no such index [missing]" },
                "status": 404
            })),
        )
    }

    async fn broken() -> (StatusCode, &'static str) {
        (StatusCode::INTERNAL_SERVER_ERROR, "search_phase_execution_exception")
    }

    /// Fails the first request by stalling past the client timeout, then answers.
    async fn flaky(State(state): State<Shared>) -> Json<Value> {
        let call = {
            let mut recorded = state.lock().unwrap();
            recorded.calls += 1;
            recorded.calls
        };
        if call == 1 {
            tokio::time::sleep(Duration::from_secs(2)).await;
        }
        Json(json!({ "hits": { "total": { "value": 0 }, "hits": [] } }))
    }

    pub async fn spawn_cluster() -> Result<(Url, Shared)> {
        let state: Shared = Arc::new(Mutex::new(Recorded::default()));
        let app = Router::new()
            .route("/products/_search", post(search))
            .route("/products/_doc/:id", get(get_doc))
            .route("/missing/_doc/:id", get(missing_index))
            .route("/broken/_search", post(broken))
            .route("/flaky/_search", post(flaky))
            .with_state(state.clone());

        let listener = TcpListener::bind("127.0.0.1:0").await?;
        let addr = listener.local_addr()?;
        tokio::spawn(async move {
            axum::serve(listener, app).await.ok();
        });
        Ok((Url::parse(&format!("http://{addr}/"))?, state))
    }

    pub fn client(base: &Url, index: &str, max_retries: u32) -> Result<ElasticIndex> {
        ElasticIndex::new(
            base.clone(),
            index,
            API_KEY,
            Duration::from_millis(300),
            max_retries,
        )
    }
}

use test_helpers::*;

#[tokio::test]
async fn test_search_sends_dsl_and_maps_hits() -> Result<()> {
    let (base, state) = spawn_cluster().await?;
    let index = client(&base, "products", 0)?;

    let mut query = SearchQuery {
        text: Some("air".to_string()),
        sort: SortOrder::PriceAsc,
        offset: 24,
        limit: 24,
        ..Default::default()
    };
    query
        .filters
        .insert(FilterField::Brand, vec!["Nike".to_string()]);

    let page = index.search(&query).await?;
    assert_eq!(page.total, 57);
    assert_eq!(page.products.len(), 2);
    assert_eq!(page.products[0].id, "src-1");
    assert_eq!(page.products[0].price_cents, Some(8999));
    assert_eq!(page.products[1].id, "b");

    let recorded = state.lock().unwrap();
    assert_eq!(recorded.auth, vec![Some(format!("ApiKey {API_KEY}"))]);
    let body = &recorded.bodies[0];
    assert_eq!(body["from"], 24);
    assert_eq!(body["size"], 24);
    assert_eq!(body["track_total_hits"], true);
    assert_eq!(body["sort"], json!([{ "price_cents": "asc" }, { "_score": "desc" }]));
    assert_eq!(
        body["query"]["bool"]["filter"],
        json!([{ "terms": { "brand": ["nike"] } }])
    );
    Ok(())
}

#[tokio::test]
async fn test_lookup_returns_seller_urls() -> Result<()> {
    let (base, state) = spawn_cluster().await?;
    let index = client(&base, "products", 0)?;

    let urls = index.seller_urls("src-123").await?;
    assert_eq!(
        urls,
        Some(vec![
            "https://seller.example/item/123".to_string(),
            "https://other.example/123".to_string()
        ])
    );
    assert_eq!(
        state.lock().unwrap().queries[0].get("_source_includes"),
        Some(&"seller_urls".to_string())
    );

    // Ids are path-encoded, and a record without urls yields an empty list
    assert_eq!(index.seller_urls("a/b").await?, Some(vec![]));
    Ok(())
}

#[tokio::test]
async fn test_lookup_unknown_id_is_none() -> Result<()> {
    let (base, _state) = spawn_cluster().await?;
    let index = client(&base, "products", 0)?;
    assert_eq!(index.seller_urls("nope").await?, None);
    Ok(())
}

#[tokio::test]
async fn test_lookup_dot_segment_ids_are_none() -> Result<()> {
    let (base, state) = spawn_cluster().await?;
    let index = client(&base, "products", 0)?;
    assert_eq!(index.seller_urls(".").await?, None);
    assert_eq!(index.seller_urls("..").await?, None);
    assert_eq!(state.lock().unwrap().calls, 0);

    // Dots inside a longer id are still looked up
    assert_eq!(index.seller_urls("a.b").await?, None);
    assert_eq!(state.lock().unwrap().calls, 1);
    Ok(())
}

#[tokio::test]
async fn test_missing_index_is_an_upstream_error() -> Result<()> {
    let (base, _state) = spawn_cluster().await?;
    let index = client(&base, "missing", 0)?;
    match index.seller_urls("src-123").await {
        Err(IndexError::Upstream { status: 404, message }) => {
            assert!(message.contains("index_not_found_exception"));
        }
        other => panic!("expected upstream error, got {other:?}"),
    }
    Ok(())
}

#[tokio::test]
async fn test_server_error_is_an_upstream_error() -> Result<()> {
    let (base, _state) = spawn_cluster().await?;
    let index = client(&base, "broken", 0)?;
    match index.search(&SearchQuery::default()).await {
        Err(IndexError::Upstream { status: 500, message }) => {
            assert_eq!(message, "search_phase_execution_exception");
        }
        other => panic!("expected upstream error, got {other:?}"),
    }
    Ok(())
}

#[tokio::test]
async fn test_unreachable_cluster_is_retried_then_unavailable() -> Result<()> {
    // Grab a free port, then close it so nothing is listening
    let listener = TcpListener::bind("127.0.0.1:0").await?;
    let addr = listener.local_addr()?;
    drop(listener);
    let base = Url::parse(&format!("http://{addr}/"))?;

    let index = client(&base, "products", 0)?;
    let started = Instant::now();
    assert!(matches!(
        index.search(&SearchQuery::default()).await,
        Err(IndexError::Unavailable(_))
    ));
    assert!(started.elapsed() < Duration::from_millis(250));

    // Each refused connect is followed by a 250ms pause before the next attempt
    let index = client(&base, "products", 2)?;
    let started = Instant::now();
    assert!(matches!(
        index.search(&SearchQuery::default()).await,
        Err(IndexError::Unavailable(_))
    ));
    assert!(started.elapsed() >= Duration::from_millis(500));
    Ok(())
}

#[tokio::test]
async fn test_timeout_is_not_retried_by_default() -> Result<()> {
    let (base, state) = spawn_cluster().await?;
    let index = client(&base, "flaky", 0)?;
    assert!(matches!(
        index.search(&SearchQuery::default()).await,
        Err(IndexError::Unavailable(_))
    ));
    assert_eq!(state.lock().unwrap().calls, 1);
    Ok(())
}

#[tokio::test]
async fn test_timeout_is_retried_when_enabled() -> Result<()> {
    let (base, state) = spawn_cluster().await?;
    let index = client(&base, "flaky", 1)?;
    let page = index.search(&SearchQuery::default()).await?;
    assert_eq!(page.total, 0);
    assert_eq!(state.lock().unwrap().calls, 2);
    Ok(())
}

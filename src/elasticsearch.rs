//! Elasticsearch-backed [`ProductIndex`].
//!
//! Translates a [`SearchQuery`] into the query DSL, talks to the cluster over
//! its REST API with an API key, and maps hits back into [`Product`]s.

use std::time::Duration;

use anyhow::{Context, Result};
use reqwest::header::{AUTHORIZATION, HeaderMap, HeaderValue};
use reqwest::{Client, RequestBuilder, Response, StatusCode, Url};
use serde::Deserialize;
use serde_json::{Map, Number, Value, json};

use crate::config::Config;
use crate::data_models::{FilterField, OneOrMany, Product, SearchPage, SearchQuery, SortOrder};
use crate::error::IndexError;
use crate::index::ProductIndex;

/// Stored fields requested for every search hit.
pub const SOURCE_FIELDS: [&str; 10] = [
    "id",
    "title",
    "brand",
    "condition",
    "price_cents",
    "currency",
    "image",
    "seller_urls",
    "marketplace",
    "updated_at",
];

/// Longest upstream error body kept in an [`IndexError`].
const MAX_ERROR_BODY_CHARS: usize = 512;

// =============================================================================
// Query DSL
// =============================================================================

/// Full `_search` request body for `query`.
pub fn build_search_body(query: &SearchQuery) -> Value {
    json!({
        "from": query.offset,
        "size": query.limit,
        "track_total_hits": true,
        "query": build_query(query),
        "sort": build_sort(query.sort),
        "_source": SOURCE_FIELDS,
    })
}

pub fn build_query(query: &SearchQuery) -> Value {
    let must = match query.text.as_deref() {
        Some(text) => {
            let mut should = vec![
                json!({ "multi_match": { "query": text, "fields": ["title^2", "brand^1"] } }),
                json!({ "match_phrase_prefix": { "title": { "query": text } } }),
            ];
            // A bare `*` would match every titled document
            let escaped = escape_query_string(text);
            if !escaped.trim().is_empty() {
                should.push(json!({
                    "query_string": {
                        "query": format!("{escaped}*"),
                        "default_field": "title",
                        "analyze_wildcard": true
                    }
                }));
            }
            json!({ "bool": { "should": should, "minimum_should_match": 1 } })
        }
        None => json!({ "match_all": {} }),
    };

    let mut filters = Vec::new();
    for (field, values) in &query.filters {
        if values.is_empty() {
            continue;
        }
        // brand is indexed through a lowercase normalizer
        let terms: Vec<String> = match field {
            FilterField::Brand => values.iter().map(|v| v.to_lowercase()).collect(),
            _ => values.clone(),
        };
        filters.push(json!({ "terms": { field.as_str(): terms } }));
    }

    if !query.price.is_unbounded() {
        let mut range = Map::new();
        if let Some(min) = query.price.min_cents {
            range.insert("gte".to_string(), json!(min));
        }
        if let Some(max) = query.price.max_cents {
            range.insert("lte".to_string(), json!(max));
        }
        filters.push(json!({ "range": { "price_cents": range } }));
    }

    let mut bool_query = Map::new();
    bool_query.insert("must".to_string(), json!([must]));
    if !filters.is_empty() {
        bool_query.insert("filter".to_string(), Value::Array(filters));
    }
    json!({ "bool": bool_query })
}

pub fn build_sort(sort: SortOrder) -> Value {
    match sort {
        SortOrder::Best => json!(["_score"]),
        SortOrder::PriceAsc => json!([{ "price_cents": "asc" }, { "_score": "desc" }]),
        SortOrder::PriceDesc => json!([{ "price_cents": "desc" }, { "_score": "desc" }]),
        SortOrder::Newest => json!([{ "updated_at": "desc" }]),
    }
}

/// Escape query_string syntax so user text is matched literally.
///
/// `<` and `>` cannot be escaped and are dropped.
pub fn escape_query_string(text: &str) -> String {
    const RESERVED: &str = "+-=&|!(){}[]^\"~*?:\\/";
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '<' | '>' => {}
            c if RESERVED.contains(c) => {
                out.push('\\');
                out.push(c);
            }
            c => out.push(c),
        }
    }
    out
}

// =============================================================================
// Response shapes
// =============================================================================

#[derive(Deserialize, Debug)]
struct EsSearchResponse {
    hits: EsHits,
}

#[derive(Deserialize, Debug)]
struct EsHits {
    total: Option<EsTotal>,
    #[serde(default)]
    hits: Vec<EsHit>,
}

/// `hits.total` is an object since 7.x and a bare number before.
#[derive(Deserialize, Debug)]
#[serde(untagged)]
enum EsTotal {
    Object { value: u64 },
    Count(u64),
}

#[derive(Deserialize, Debug)]
struct EsHit {
    #[serde(rename = "_id")]
    id: String,
    #[serde(rename = "_source")]
    source: Option<ProductSource>,
}

#[derive(Deserialize, Debug, Default)]
struct ProductSource {
    id: Option<Value>,
    title: Option<String>,
    brand: Option<String>,
    condition: Option<String>,
    price_cents: Option<Number>,
    currency: Option<String>,
    image: Option<String>,
    seller_urls: Option<OneOrMany<String>>,
    marketplace: Option<String>,
}

#[derive(Deserialize, Debug)]
struct EsGetResponse {
    found: Option<bool>,
    #[serde(rename = "_source")]
    source: Option<SellerUrlsSource>,
}

#[derive(Deserialize, Debug)]
struct SellerUrlsSource {
    seller_urls: Option<OneOrMany<String>>,
}

impl EsHit {
    fn into_product(self) -> Product {
        let source = self.source.unwrap_or_default();
        // Prefer the stored id so links stay stable across reindexing
        let id = match source.id {
            Some(Value::String(s)) if !s.is_empty() => s,
            Some(Value::Number(n)) => n.to_string(),
            _ => self.id,
        };
        let price_cents = source
            .price_cents
            .and_then(|n| n.as_i64().or_else(|| n.as_f64().map(|f| f.round() as i64)));

        Product {
            id,
            title: source.title,
            brand: source.brand,
            condition: source.condition,
            price_cents,
            currency: source.currency,
            image: source.image,
            seller_urls: source.seller_urls.map(OneOrMany::into_vec).unwrap_or_default(),
            marketplace: source.marketplace,
        }
    }
}

impl EsSearchResponse {
    fn into_page(self) -> SearchPage {
        let products: Vec<Product> = self
            .hits
            .hits
            .into_iter()
            .map(EsHit::into_product)
            .collect();
        let total = match self.hits.total {
            Some(EsTotal::Object { value }) | Some(EsTotal::Count(value)) => value,
            None => products.len() as u64,
        };
        SearchPage { products, total }
    }
}

// =============================================================================
// Client
// =============================================================================

/// REST client for one index of an Elasticsearch cluster.
#[derive(Debug, Clone)]
pub struct ElasticIndex {
    client: Client,
    base_url: Url,
    index: String,
    max_retries: u32,
}

impl ElasticIndex {
    /// Pause before retrying a request that failed to connect or timed out.
    const RETRY_DELAY: Duration = Duration::from_millis(250);

    pub fn new(
        base_url: Url,
        index: &str,
        api_key: &str,
        timeout: Duration,
        max_retries: u32,
    ) -> Result<Self> {
        let mut auth = HeaderValue::from_str(&format!("ApiKey {api_key}"))
            .context("ES_API_KEY contains characters not allowed in an HTTP header")?;
        auth.set_sensitive(true);
        let mut headers = HeaderMap::new();
        headers.insert(AUTHORIZATION, auth);

        let client = Client::builder()
            .user_agent(concat!("webcloset/", env!("CARGO_PKG_VERSION")))
            .default_headers(headers)
            .timeout(timeout)
            .build()
            .context("Failed to build Elasticsearch HTTP client")?;

        log::info!("Using Elasticsearch index '{}' at {}", index, base_url);

        Ok(Self {
            client,
            base_url,
            index: index.to_string(),
            max_retries,
        })
    }

    pub fn from_config(config: &Config) -> Result<Self> {
        Self::new(
            config.elasticsearch_url.clone(),
            &config.elasticsearch_index,
            &config.es_api_key,
            config.request_timeout,
            config.max_retries,
        )
    }

    /// `base_url` with `segments` appended as percent-encoded path segments.
    fn endpoint(&self, segments: &[&str]) -> Url {
        let mut url = self.base_url.clone();
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty().extend(segments);
        }
        url
    }

    /// Send a request, retrying connect/timeout failures up to `max_retries`.
    async fn send<F>(&self, build: F) -> Result<Response, IndexError>
    where
        F: Fn() -> RequestBuilder,
    {
        let mut attempt = 0;
        loop {
            match build().send().await {
                Ok(response) => return Ok(response),
                Err(e) if (e.is_connect() || e.is_timeout()) && attempt < self.max_retries => {
                    attempt += 1;
                    log::warn!(
                        "Elasticsearch request failed, retry {}/{}: {}",
                        attempt,
                        self.max_retries,
                        e
                    );
                    tokio::time::sleep(Self::RETRY_DELAY).await;
                }
                Err(e) => return Err(e.into()),
            }
        }
    }
}

async fn upstream_error(response: Response) -> IndexError {
    let status = response.status().as_u16();
    let body = response.text().await.unwrap_or_default();
    IndexError::Upstream {
        status,
        message: body.chars().take(MAX_ERROR_BODY_CHARS).collect(),
    }
}

impl ProductIndex for ElasticIndex {
    async fn search(&self, query: &SearchQuery) -> Result<SearchPage, IndexError> {
        let url = self.endpoint(&[self.index.as_str(), "_search"]);
        let body = build_search_body(query);
        log::debug!("POST {} {}", url, body);

        let response = self
            .send(|| self.client.post(url.clone()).json(&body))
            .await?;
        if !response.status().is_success() {
            return Err(upstream_error(response).await);
        }

        let parsed: EsSearchResponse = response
            .json()
            .await
            .map_err(|e| IndexError::Decode(e.to_string()))?;
        Ok(parsed.into_page())
    }

    async fn seller_urls(&self, id: &str) -> Result<Option<Vec<String>>, IndexError> {
        // Dot segments are dropped from URL paths, so no document can be addressed by them
        if id == "." || id == ".." {
            return Ok(None);
        }

        let mut url = self.endpoint(&[self.index.as_str(), "_doc", id]);
        url.query_pairs_mut()
            .append_pair("_source_includes", "seller_urls");

        let response = self.send(|| self.client.get(url.clone())).await?;
        let status = response.status();

        if status == StatusCode::NOT_FOUND {
            // A missing document says found=false; a missing index carries an error object.
            let body: Value = response.json().await.unwrap_or(Value::Null);
            if body.get("found") == Some(&Value::Bool(false)) {
                return Ok(None);
            }
            return Err(IndexError::Upstream {
                status: status.as_u16(),
                message: body.to_string().chars().take(MAX_ERROR_BODY_CHARS).collect(),
            });
        }
        if !status.is_success() {
            return Err(upstream_error(response).await);
        }

        let doc: EsGetResponse = response
            .json()
            .await
            .map_err(|e| IndexError::Decode(e.to_string()))?;
        if doc.found == Some(false) {
            return Ok(None);
        }
        Ok(Some(
            doc.source
                .and_then(|s| s.seller_urls)
                .map(OneOrMany::into_vec)
                .unwrap_or_default(),
        ))
    }
}

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::data_models::{
    DEFAULT_LIMIT, FilterField, Filters, MAX_LIMIT, MAX_RESULT_WINDOW, OneOrMany, PriceRange,
    Product, SearchQuery, SortOrder,
};
use crate::error::AppError;

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub ok: bool,
}

/// Body of `POST /search`.
///
/// Pagination is either `offset`/`limit` or 1-based `page`/`per_page`.
/// The flat `brand`/`size`/`condition`/`marketplace` lists are merged into `filters`.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct SearchRequest {
    pub q: Option<String>,
    pub filters: BTreeMap<String, OneOrMany<String>>,
    pub brand: OneOrMany<String>,
    pub size: OneOrMany<String>,
    pub condition: OneOrMany<String>,
    pub marketplace: OneOrMany<String>,
    /// Cents, inclusive.
    pub price_min: Option<i64>,
    /// Cents, inclusive.
    pub price_max: Option<i64>,
    pub sort: SortOrder,
    pub offset: Option<i64>,
    #[serde(alias = "per_page")]
    pub limit: Option<i64>,
    pub page: Option<i64>,
}

impl SearchRequest {
    pub fn into_query(self) -> Result<SearchQuery, AppError> {
        let mut filters = Filters::new();
        for (name, values) in self.filters {
            let field = FilterField::parse(&name).ok_or_else(|| {
                AppError::invalid("invalid_filter", format!("unknown filter '{name}'"))
            })?;
            add_filter(&mut filters, field, values.into_vec());
        }
        add_filter(&mut filters, FilterField::Brand, self.brand.into_vec());
        add_filter(&mut filters, FilterField::Size, self.size.into_vec());
        add_filter(&mut filters, FilterField::Condition, self.condition.into_vec());
        add_filter(&mut filters, FilterField::Marketplace, self.marketplace.into_vec());

        let (offset, limit) = resolve_pagination(self.offset, self.limit, self.page)?;

        Ok(SearchQuery {
            text: self
                .q
                .map(|q| q.trim().to_string())
                .filter(|q| !q.is_empty()),
            filters,
            price: resolve_price(self.price_min, self.price_max)?,
            sort: self.sort,
            offset,
            limit,
        })
    }
}

/// Query string of `GET /search`. List filters are comma-separated.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct SearchParams {
    pub q: Option<String>,
    #[serde(alias = "brands")]
    pub brand: Option<String>,
    #[serde(alias = "sizes")]
    pub size: Option<String>,
    #[serde(alias = "conditions")]
    pub condition: Option<String>,
    #[serde(alias = "marketplaces")]
    pub marketplace: Option<String>,
    pub price_min: Option<i64>,
    pub price_max: Option<i64>,
    pub sort: Option<String>,
    pub offset: Option<i64>,
    #[serde(alias = "per_page")]
    pub limit: Option<i64>,
    pub page: Option<i64>,
}

impl SearchParams {
    /// Unknown sort names fall back to relevance on this route.
    pub fn into_request(self) -> SearchRequest {
        SearchRequest {
            q: self.q,
            filters: BTreeMap::new(),
            brand: split_csv(self.brand),
            size: split_csv(self.size),
            condition: split_csv(self.condition),
            marketplace: split_csv(self.marketplace),
            price_min: self.price_min,
            price_max: self.price_max,
            sort: self
                .sort
                .as_deref()
                .and_then(SortOrder::parse)
                .unwrap_or_default(),
            offset: self.offset,
            limit: self.limit,
            page: self.page,
        }
    }
}

fn split_csv(raw: Option<String>) -> OneOrMany<String> {
    OneOrMany::Many(
        raw.unwrap_or_default()
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect(),
    )
}

/// Append trimmed, non-blank, not-yet-present values for `field`.
fn add_filter(filters: &mut Filters, field: FilterField, values: Vec<String>) {
    for value in values {
        let value = value.trim();
        if value.is_empty() {
            continue;
        }
        let entry = filters.entry(field).or_default();
        if !entry.iter().any(|v| v == value) {
            entry.push(value.to_string());
        }
    }
}

fn resolve_pagination(
    offset: Option<i64>,
    limit: Option<i64>,
    page: Option<i64>,
) -> Result<(u64, u64), AppError> {
    let limit = limit.unwrap_or(DEFAULT_LIMIT as i64);
    if limit < 1 || limit as u64 > MAX_LIMIT {
        return Err(AppError::invalid(
            "invalid_pagination",
            format!("limit must be between 1 and {MAX_LIMIT}"),
        ));
    }
    let limit = limit as u64;

    let offset = match (offset, page) {
        (Some(_), Some(_)) => {
            return Err(AppError::invalid(
                "invalid_pagination",
                "use either offset or page, not both",
            ));
        }
        (Some(offset), None) if offset < 0 => {
            return Err(AppError::invalid(
                "invalid_pagination",
                "offset must not be negative",
            ));
        }
        (Some(offset), None) => offset as u64,
        (None, Some(page)) if page < 1 => {
            return Err(AppError::invalid("invalid_pagination", "page must be at least 1"));
        }
        (None, Some(page)) => (page as u64 - 1).saturating_mul(limit),
        (None, None) => 0,
    };

    if offset.saturating_add(limit) > MAX_RESULT_WINDOW {
        return Err(AppError::invalid(
            "invalid_pagination",
            format!("offset + limit must not exceed {MAX_RESULT_WINDOW}"),
        ));
    }
    Ok((offset, limit))
}

fn resolve_price(min: Option<i64>, max: Option<i64>) -> Result<PriceRange, AppError> {
    let to_cents = |value: Option<i64>, name: &str| match value {
        Some(v) if v < 0 => Err(AppError::invalid(
            "invalid_price_range",
            format!("{name} must not be negative"),
        )),
        other => Ok(other.map(|v| v as u64)),
    };
    let price = PriceRange {
        min_cents: to_cents(min, "price_min")?,
        max_cents: to_cents(max, "price_max")?,
    };
    if let (Some(lo), Some(hi)) = (price.min_cents, price.max_cents) {
        if lo > hi {
            return Err(AppError::invalid(
                "invalid_price_range",
                "price_min must not exceed price_max",
            ));
        }
    }
    Ok(price)
}

#[derive(Debug, Serialize, PartialEq, Eq)]
pub struct Pagination {
    pub offset: u64,
    pub limit: u64,
    pub page: u64,
    pub per_page: u64,
    pub total: u64,
    pub total_pages: u64,
    pub has_more: bool,
}

impl Pagination {
    pub fn new(offset: u64, limit: u64, total: u64) -> Self {
        Pagination {
            offset,
            limit,
            page: offset / limit + 1,
            per_page: limit,
            total,
            total_pages: total.div_ceil(limit),
            has_more: offset + limit < total,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct SearchResponse {
    pub query: Option<String>,
    pub filters: Filters,
    pub sort: SortOrder,
    pub pagination: Pagination,
    pub results: Vec<Product>,
    pub processing_time_ms: u128,
}

#[derive(Debug, Default, Deserialize)]
pub struct ClickParams {
    #[serde(default)]
    pub id: Option<String>,
}

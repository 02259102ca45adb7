use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

pub const DEFAULT_LIMIT: u64 = 24;
pub const MAX_LIMIT: u64 = 100;
/// Deepest hit reachable through `offset + limit` (the index's default result window).
pub const MAX_RESULT_WINDOW: u64 = 10_000;

/// Fields the search can be narrowed on.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "lowercase")]
pub enum FilterField {
    Brand,
    Size,
    Condition,
    Marketplace,
}

impl FilterField {
    pub const ALL: [FilterField; 4] = [
        FilterField::Brand,
        FilterField::Size,
        FilterField::Condition,
        FilterField::Marketplace,
    ];

    /// Name of the matching field in the product index.
    pub fn as_str(&self) -> &'static str {
        match self {
            FilterField::Brand => "brand",
            FilterField::Size => "size",
            FilterField::Condition => "condition",
            FilterField::Marketplace => "marketplace",
        }
    }

    pub fn parse(name: &str) -> Option<FilterField> {
        FilterField::ALL.into_iter().find(|f| f.as_str() == name)
    }
}

impl fmt::Display for FilterField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Accepted filter values, keyed by field. Fields with no values are absent.
pub type Filters = BTreeMap<FilterField, Vec<String>>;

/// A JSON value that may be a single item or a list of them.
#[derive(Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(untagged)]
pub enum OneOrMany<T> {
    One(T),
    Many(Vec<T>),
}

impl<T> OneOrMany<T> {
    pub fn into_vec(self) -> Vec<T> {
        match self {
            OneOrMany::One(v) => vec![v],
            OneOrMany::Many(v) => v,
        }
    }
}

impl<T> Default for OneOrMany<T> {
    fn default() -> Self {
        OneOrMany::Many(Vec::new())
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, Default, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SortOrder {
    /// Relevance as scored by the index.
    #[default]
    Best,
    PriceAsc,
    PriceDesc,
    Newest,
}

impl SortOrder {
    pub fn parse(name: &str) -> Option<SortOrder> {
        match name {
            "best" => Some(SortOrder::Best),
            "price_asc" => Some(SortOrder::PriceAsc),
            "price_desc" => Some(SortOrder::PriceDesc),
            "newest" => Some(SortOrder::Newest),
            _ => None,
        }
    }
}

/// Inclusive price bounds in cents.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PriceRange {
    pub min_cents: Option<u64>,
    pub max_cents: Option<u64>,
}

impl PriceRange {
    pub fn is_unbounded(&self) -> bool {
        self.min_cents.is_none() && self.max_cents.is_none()
    }
}

/// A validated search, built per request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchQuery {
    /// Trimmed free text; `None` matches everything.
    pub text: Option<String>,
    pub filters: Filters,
    pub price: PriceRange,
    pub sort: SortOrder,
    pub offset: u64,
    pub limit: u64,
}

impl Default for SearchQuery {
    fn default() -> Self {
        SearchQuery {
            text: None,
            filters: Filters::new(),
            price: PriceRange::default(),
            sort: SortOrder::default(),
            offset: 0,
            limit: DEFAULT_LIMIT,
        }
    }
}

impl SearchQuery {
    pub fn filter_values(&self, field: FilterField) -> &[String] {
        self.filters.get(&field).map(Vec::as_slice).unwrap_or_default()
    }
}

/// A product record as stored in the index.
#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct Product {
    pub id: String,
    pub title: Option<String>,
    pub brand: Option<String>,
    pub condition: Option<String>,
    pub price_cents: Option<i64>,
    pub currency: Option<String>,
    pub image: Option<String>,
    pub seller_urls: Vec<String>,
    pub marketplace: Option<String>,
}

impl Product {
    pub fn new(id: impl Into<String>, seller_urls: Vec<String>) -> Product {
        Product {
            id: id.into(),
            title: None,
            brand: None,
            condition: None,
            price_cents: None,
            currency: None,
            image: None,
            seller_urls,
            marketplace: None,
        }
    }
}

/// One page of hits, in index order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SearchPage {
    pub products: Vec<Product>,
    /// Total matching records across all pages.
    pub total: u64,
}

/// Where a click on a product should send the shopper.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClickTarget {
    pub id: String,
    pub url: String,
}

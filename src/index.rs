//! Boundary to the external product index.
//!
//! The HTTP layer only ever talks to a [`ProductIndex`]. Production wires in
//! [`crate::elasticsearch::ElasticIndex`]; tests substitute in-memory fakes.

use std::future::Future;

use crate::data_models::{SearchPage, SearchQuery};
use crate::error::IndexError;

pub trait ProductIndex: Send + Sync + 'static {
    /// Run a search and return one page of results plus the total hit count.
    fn search(
        &self,
        query: &SearchQuery,
    ) -> impl Future<Output = Result<SearchPage, IndexError>> + Send;

    /// Seller URLs stored for `id`, or `None` when no such record exists.
    fn seller_urls(
        &self,
        id: &str,
    ) -> impl Future<Output = Result<Option<Vec<String>>, IndexError>> + Send;
}

use reqwest::Url;

use crate::data_models::{ClickTarget, SearchPage, SearchQuery};
use crate::error::AppError;
use crate::index::ProductIndex;

/// Thin layer between the HTTP handlers and the product index.
pub struct QueryEngine<I> {
    index: I,
}

impl<I: ProductIndex> QueryEngine<I> {
    pub fn new(index: I) -> Self {
        Self { index }
    }

    pub fn index(&self) -> &I {
        &self.index
    }

    pub async fn search(&self, query: &SearchQuery) -> Result<SearchPage, AppError> {
        let page = self.index.search(query).await?;
        log::debug!(
            "search {:?} returned {} of {} hits",
            query.text,
            page.products.len(),
            page.total
        );
        Ok(page)
    }

    /// Resolve a product id to the seller URL a click should redirect to.
    ///
    /// The first stored seller URL wins; it must be an absolute http(s) URL.
    /// Ids are opaque: only blank ids are rejected, and lookups use the id as given.
    pub async fn resolve_click(&self, id: &str) -> Result<ClickTarget, AppError> {
        if id.trim().is_empty() {
            return Err(AppError::invalid("missing_id", "missing id"));
        }

        let urls = self
            .index
            .seller_urls(id)
            .await?
            .ok_or_else(|| AppError::not_found("doc_not_found", format!("doc_not_found: {id}")))?;

        let target = urls
            .into_iter()
            .map(|u| u.trim().to_string())
            .find(|u| !u.is_empty())
            .ok_or_else(|| AppError::not_found("no_seller_url", "no_seller_url"))?;

        if !is_redirectable(&target) {
            return Err(AppError::invalid("invalid_url_scheme", "invalid_url_scheme"));
        }

        Ok(ClickTarget {
            id: id.to_string(),
            url: target,
        })
    }
}

fn is_redirectable(target: &str) -> bool {
    Url::parse(target)
        .map(|url| matches!(url.scheme(), "http" | "https") && url.has_host())
        .unwrap_or(false)
}

#[test]
fn test_is_redirectable() {
    assert!(is_redirectable("https://seller.example/item/123"));
    assert!(is_redirectable("http://seller.example"));
    assert!(!is_redirectable("javascript:alert(1)"));
    assert!(!is_redirectable("ftp://seller.example/file"));
    assert!(!is_redirectable("/relative/path"));
    assert!(!is_redirectable("https://"));
}

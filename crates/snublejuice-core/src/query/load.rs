use std::future::Future;

use chrono::NaiveDate;
use serde::Serialize;
use thiserror::Error;

use crate::metadata::Metadata;
use crate::products::Product;

use super::builder::build_pipeline;
use super::pipeline::Pipeline;
use super::ProductQuery;

#[derive(Debug, Error)]
pub enum SourceError {
    #[error("product query failed: {0}")]
    Backend(#[source] Box<dyn std::error::Error + Send + Sync>),

    #[error("stored product {index} could not be decoded: {reason}")]
    InvalidDocument { index: i64, reason: String },
}

/// Storage that can execute a product [`Pipeline`].
pub trait ProductSource {
    /// Run every stage and return the resulting products in order.
    fn aggregate(
        &self,
        pipeline: &Pipeline,
    ) -> impl Future<Output = Result<Vec<Product>, SourceError>> + Send;

    /// Count the products matched by the pipeline's filtering stages.
    fn count(&self, pipeline: &Pipeline) -> impl Future<Output = Result<u64, SourceError>> + Send;
}

/// One page of listing results.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProductPage {
    pub data: Vec<Product>,
    /// Total page count; `None` when the request did not ask for it.
    pub total: Option<u64>,
    /// Stock recency label for the channel, e.g. `"i går"`.
    pub updated: Option<String>,
}

impl ProductPage {
    /// The "nothing available" page returned when the source fails.
    #[must_use]
    pub fn empty() -> Self {
        Self {
            data: Vec::new(),
            total: Some(1),
            updated: None,
        }
    }
}

/// Page count for `count` matches: always rounds down and adds one, so an
/// empty result still has one page.
#[must_use]
pub fn total_pages(count: u64, per_page: u64) -> u64 {
    count / per_page.max(1) + 1
}

/// Build and execute the listing for `query`.
///
/// Source failures are logged and reported as an empty page with one total
/// page; they never reach the caller.
pub async fn load<S>(
    source: &S,
    query: &ProductQuery,
    metadata: &Metadata,
    today: NaiveDate,
) -> ProductPage
where
    S: ProductSource + Sync,
{
    let built = build_pipeline(query, metadata, today);

    let total = match &built.count {
        Some(count_pipeline) => match source.count(count_pipeline).await {
            Ok(count) => Some(total_pages(count, query.per_page())),
            Err(e) => {
                tracing::warn!(error = %e, channel = %query.channel, "product count failed");
                return ProductPage::empty();
            }
        },
        None => None,
    };

    let mut data = match source.aggregate(&built.pipeline).await {
        Ok(data) => data,
        Err(e) => {
            tracing::warn!(error = %e, channel = %query.channel, "product query failed");
            return ProductPage::empty();
        }
    };

    if query.delta > 1 {
        for product in &mut data {
            product.rebase_discount(query.delta);
        }
    }

    tracing::debug!(
        channel = %query.channel,
        page = query.page(),
        returned = data.len(),
        total = ?total,
        "loaded product page"
    );

    ProductPage {
        data,
        total,
        updated: built.updated,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn total_pages_rounds_down_then_adds_one() {
        assert_eq!(total_pages(0, 15), 1);
        assert_eq!(total_pages(14, 15), 1);
        assert_eq!(total_pages(15, 15), 2);
        assert_eq!(total_pages(20, 15), 2);
        assert_eq!(total_pages(31, 15), 3);
    }

    #[test]
    fn total_pages_never_divides_by_zero() {
        assert_eq!(total_pages(3, 0), 4);
    }

    #[test]
    fn empty_page_reports_one_page() {
        let page = ProductPage::empty();
        assert!(page.data.is_empty());
        assert_eq!(page.total, Some(1));
        assert!(page.updated.is_none());
    }
}

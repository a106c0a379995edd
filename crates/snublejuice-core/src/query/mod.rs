//! Storefront product queries: request shape, pipeline construction and
//! execution against a [`ProductSource`].

mod builder;
mod field;
mod load;
mod memory;
mod params;
mod pipeline;

use serde::{Deserialize, Serialize};

use crate::metadata::Channel;

pub use builder::{build_pipeline, BuiltQuery};
pub use field::{Field, SortKey};
pub use load::{load, total_pages, ProductPage, ProductSource, SourceError};
pub use memory::MemoryCatalog;
pub use params::QueryParams;
pub use pipeline::{word_pattern, Clause, CompareOp, Fuzzy, Pipeline, SearchStage, Stage};

pub const DEFAULT_PER_PAGE: u64 = 15;

/// A numeric filter that is either an exact match or a one-sided bound.
///
/// Which side the bound is on depends on the field (ceiling for price and
/// year, floor for volume and alcohol).
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct RangeFilter {
    pub value: Option<f64>,
    #[serde(default)]
    pub exact: bool,
}

impl RangeFilter {
    #[must_use]
    pub fn new(value: f64, exact: bool) -> Self {
        Self {
            value: Some(value),
            exact,
        }
    }

    /// Parse a raw query-string value. Anything that is not a finite, non-zero
    /// number means "no filter" rather than an error.
    #[must_use]
    pub fn parse(raw: Option<&str>, exact: bool) -> Self {
        let value = raw
            .and_then(|s| s.trim().parse::<f64>().ok())
            .filter(|v| v.is_finite() && *v != 0.0);
        Self { value, exact }
    }

    /// The bound to apply, if any. Zero counts as unset.
    #[must_use]
    pub fn active(&self) -> Option<f64> {
        self.value.filter(|v| v.is_finite() && *v != 0.0)
    }
}

/// One storefront listing request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProductQuery {
    pub channel: Channel,
    /// When set, only these product indices are listed and buyability is not
    /// required.
    pub favourites: Option<Vec<i64>>,
    pub category: Option<String>,
    pub country: Option<String>,
    /// Include products without a positive alcohol content.
    pub nonalcoholic: bool,
    pub orderable: bool,
    pub instores: bool,
    /// Exact store name on the request's channel.
    pub store: Option<String>,
    pub price: RangeFilter,
    pub volume: RangeFilter,
    pub alcohol: RangeFilter,
    pub year: RangeFilter,
    pub sort: SortKey,
    pub ascending: bool,
    /// 1-indexed.
    pub page: u64,
    pub per_page: u64,
    pub search: Option<String>,
    pub storelike: Option<String>,
    /// Compute the total page count.
    pub fresh: bool,
    /// Compare prices against this many scrape cycles back.
    pub delta: usize,
}

impl Default for ProductQuery {
    fn default() -> Self {
        Self::new(Channel::Vinmonopolet)
    }
}

impl ProductQuery {
    #[must_use]
    pub fn new(channel: Channel) -> Self {
        Self {
            channel,
            favourites: None,
            category: None,
            country: None,
            nonalcoholic: false,
            orderable: true,
            instores: false,
            store: None,
            price: RangeFilter::default(),
            volume: RangeFilter::default(),
            alcohol: RangeFilter::default(),
            year: RangeFilter::default(),
            sort: SortKey::default(),
            ascending: true,
            page: 1,
            per_page: DEFAULT_PER_PAGE,
            search: None,
            storelike: None,
            fresh: true,
            delta: 1,
        }
    }

    #[must_use]
    pub fn is_search(&self) -> bool {
        self.search.is_some()
    }

    #[must_use]
    pub fn page(&self) -> u64 {
        self.page.max(1)
    }

    #[must_use]
    pub fn per_page(&self) -> u64 {
        self.per_page.max(1)
    }

    /// Number of matching products to skip for the requested page.
    #[must_use]
    pub fn offset(&self) -> u64 {
        (self.page() - 1).saturating_mul(self.per_page())
    }
}

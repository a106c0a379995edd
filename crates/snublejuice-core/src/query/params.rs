use serde::Deserialize;

use crate::catalog::CatalogConfig;
use crate::metadata::Channel;

use super::field::SortKey;
use super::{ProductQuery, RangeFilter};

/// Raw listing query string as sent by the storefront form.
///
/// Every field is kept as text; [`QueryParams::into_query`] decides what each
/// value means so malformed input degrades to "no filter" instead of a 400.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct QueryParams {
    pub channel: Option<String>,
    pub page: Option<String>,
    pub sort: Option<String>,
    pub ascending: Option<String>,
    pub delta: Option<String>,
    pub category: Option<String>,
    pub country: Option<String>,
    pub price: Option<String>,
    pub cprice: Option<String>,
    pub volume: Option<String>,
    pub cvolume: Option<String>,
    pub alcohol: Option<String>,
    pub calcohol: Option<String>,
    pub year: Option<String>,
    pub cyear: Option<String>,
    pub search: Option<String>,
    pub storelike: Option<String>,
    #[serde(rename = "store-vinmonopolet")]
    pub store_vinmonopolet: Option<String>,
    #[serde(rename = "store-taxfree")]
    pub store_taxfree: Option<String>,
    /// Comma-separated product indices.
    pub favourites: Option<String>,
    pub nonalcoholic: Option<String>,
    pub instores: Option<String>,
    pub fresh: Option<String>,
}

fn checked(raw: Option<&str>) -> bool {
    matches!(raw.map(str::trim), Some("on" | "true" | "1"))
}

/// Trimmed, non-empty text that is not the dropdown's `"null"` sentinel.
fn text(raw: Option<&str>) -> Option<String> {
    raw.map(str::trim)
        .filter(|s| !s.is_empty() && *s != "null")
        .map(str::to_string)
}

fn positive_int(raw: Option<&str>) -> Option<u64> {
    raw.and_then(|s| s.trim().parse::<u64>().ok())
        .filter(|n| *n > 0)
}

fn parse_favourites(raw: &str) -> Vec<i64> {
    raw.split(',')
        .filter_map(|s| s.trim().parse::<i64>().ok())
        .collect()
}

impl QueryParams {
    /// Resolve the raw parameters into a [`ProductQuery`] for `channel`.
    ///
    /// Only the store dropdown belonging to `channel` is read. Placeholder
    /// labels from the catalog ("all stores", "all countries") mean no filter.
    #[must_use]
    pub fn into_query(self, channel: Channel, catalog: &CatalogConfig, per_page: u64) -> ProductQuery {
        let store_raw = match channel {
            Channel::Vinmonopolet => self.store_vinmonopolet.as_deref(),
            Channel::Taxfree => self.store_taxfree.as_deref(),
        };
        let store =
            text(store_raw).filter(|s| !catalog.is_store_placeholder(channel, s));

        let country = text(self.country.as_deref()).filter(|c| !catalog.is_country_placeholder(c));
        let category = self
            .category
            .as_deref()
            .and_then(|slug| catalog.category_name(slug))
            .map(str::to_string);

        // Years are whole numbers; fractional input is truncated.
        let mut year = RangeFilter::parse(self.year.as_deref(), checked(self.cyear.as_deref()));
        year.value = year.value.map(f64::trunc).filter(|v| *v != 0.0);

        let sort = self
            .sort
            .as_deref()
            .and_then(SortKey::from_param)
            .unwrap_or_default();

        let delta = positive_int(self.delta.as_deref())
            .and_then(|d| usize::try_from(d).ok())
            .unwrap_or(1);

        ProductQuery {
            channel,
            favourites: self.favourites.as_deref().map(parse_favourites),
            category,
            country,
            nonalcoholic: checked(self.nonalcoholic.as_deref()),
            orderable: store.is_none(),
            instores: checked(self.instores.as_deref()),
            store,
            price: RangeFilter::parse(self.price.as_deref(), checked(self.cprice.as_deref())),
            volume: RangeFilter::parse(self.volume.as_deref(), checked(self.cvolume.as_deref())),
            alcohol: RangeFilter::parse(
                self.alcohol.as_deref(),
                checked(self.calcohol.as_deref()),
            ),
            year,
            sort,
            ascending: self.ascending.as_deref().map(str::trim) != Some("false"),
            page: positive_int(self.page.as_deref()).unwrap_or(1),
            per_page: per_page.max(1),
            search: text(self.search.as_deref()),
            storelike: text(self.storelike.as_deref()),
            fresh: self.fresh.as_deref().map(str::trim) != Some("false"),
            delta,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params(pairs: &[(&str, &str)]) -> QueryParams {
        let value = serde_json::Value::Object(
            pairs
                .iter()
                .map(|(k, v)| ((*k).to_string(), serde_json::Value::String((*v).to_string())))
                .collect(),
        );
        serde_json::from_value(value).expect("params deserialize")
    }

    fn resolve(pairs: &[(&str, &str)], channel: Channel) -> ProductQuery {
        params(pairs).into_query(channel, &CatalogConfig::default(), 15)
    }

    #[test]
    fn empty_params_give_default_query() {
        let query = resolve(&[], Channel::Vinmonopolet);
        assert_eq!(query, ProductQuery::default());
    }

    #[test]
    fn range_checkboxes_mark_exact() {
        let query = resolve(
            &[("price", "200"), ("cprice", "on"), ("volume", "70"), ("year", "2015.9")],
            Channel::Vinmonopolet,
        );
        assert_eq!(query.price, RangeFilter::new(200.0, true));
        assert_eq!(query.volume, RangeFilter::new(70.0, false));
        assert_eq!(query.year, RangeFilter::new(2015.0, false));
        assert_eq!(query.alcohol.active(), None);
    }

    #[test]
    fn unparseable_numbers_are_ignored() {
        let query = resolve(
            &[("price", "cheap"), ("page", "-2"), ("delta", "0"), ("alcohol", "0")],
            Channel::Vinmonopolet,
        );
        assert_eq!(query.price.active(), None);
        assert_eq!(query.alcohol.active(), None);
        assert_eq!(query.page, 1);
        assert_eq!(query.delta, 1);
    }

    #[test]
    fn category_slug_maps_to_stored_name() {
        let query = resolve(&[("category", "rødvin")], Channel::Vinmonopolet);
        assert_eq!(query.category.as_deref(), Some("Rødvin"));

        let query = resolve(&[("category", "null")], Channel::Vinmonopolet);
        assert!(query.category.is_none());
    }

    #[test]
    fn placeholders_mean_no_filter() {
        let query = resolve(
            &[("country", "Alle land"), ("store-vinmonopolet", "Spesifikk butikk")],
            Channel::Vinmonopolet,
        );
        assert!(query.country.is_none());
        assert!(query.store.is_none());
        assert!(query.orderable);
    }

    #[test]
    fn store_is_read_from_the_channel_dropdown() {
        let pairs = [
            ("store-vinmonopolet", "Oslo, Vika"),
            ("store-taxfree", "Oslo lufthavn"),
        ];
        let vinmonopolet = resolve(&pairs, Channel::Vinmonopolet);
        assert_eq!(vinmonopolet.store.as_deref(), Some("Oslo, Vika"));
        assert!(!vinmonopolet.orderable);

        let taxfree = resolve(&pairs, Channel::Taxfree);
        assert_eq!(taxfree.store.as_deref(), Some("Oslo lufthavn"));
    }

    #[test]
    fn search_and_storelike_are_trimmed() {
        let query = resolve(
            &[("search", "  barolo "), ("storelike", "null")],
            Channel::Vinmonopolet,
        );
        assert_eq!(query.search.as_deref(), Some("barolo"));
        assert!(query.storelike.is_none());

        let query = resolve(&[("search", "   ")], Channel::Vinmonopolet);
        assert!(query.search.is_none());
    }

    #[test]
    fn sort_and_direction() {
        let query = resolve(
            &[("sort", "literprice"), ("ascending", "false")],
            Channel::Vinmonopolet,
        );
        assert_eq!(query.sort, SortKey::LiterPrice);
        assert!(!query.ascending);

        let query = resolve(&[("sort", "$where")], Channel::Vinmonopolet);
        assert_eq!(query.sort, SortKey::Discount);
    }

    #[test]
    fn favourites_parse_as_index_list() {
        let query = resolve(&[("favourites", "10, 20,x,30")], Channel::Vinmonopolet);
        assert_eq!(query.favourites, Some(vec![10, 20, 30]));
    }
}

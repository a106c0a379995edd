//! `query` command: run a storefront listing from the terminal.

use chrono::Utc;
use clap::Args;
use snublejuice_core::{load, CatalogConfig, Channel, Product, QueryParams};
use snublejuice_db::PgCatalog;
use sqlx::PgPool;

/// Listing filters, spelled like the storefront's query parameters.
#[derive(Debug, Args)]
pub struct QueryArgs {
    #[arg(long, default_value = "vinmonopolet")]
    pub channel: Channel,
    #[arg(long)]
    pub page: Option<u64>,
    /// discount, price, literprice, alcoholprice, alcohol, volume, year, rating or name
    #[arg(long)]
    pub sort: Option<String>,
    /// Sort descending
    #[arg(long)]
    pub descending: bool,
    /// Category slug, e.g. `rødvin`
    #[arg(long)]
    pub category: Option<String>,
    #[arg(long)]
    pub country: Option<String>,
    /// Maximum price
    #[arg(long)]
    pub price: Option<f64>,
    /// Minimum volume in centilitres
    #[arg(long)]
    pub volume: Option<f64>,
    /// Minimum alcohol percentage
    #[arg(long)]
    pub alcohol: Option<f64>,
    /// Latest vintage
    #[arg(long)]
    pub year: Option<i32>,
    /// Treat numeric filters as exact matches
    #[arg(long)]
    pub exact: bool,
    #[arg(long)]
    pub search: Option<String>,
    /// Exact store name for the channel
    #[arg(long)]
    pub store: Option<String>,
    /// Store name word, e.g. a city
    #[arg(long)]
    pub storelike: Option<String>,
    /// Compare against the price this many cycles back
    #[arg(long)]
    pub delta: Option<usize>,
    #[arg(long)]
    pub nonalcoholic: bool,
}

fn on(flag: bool) -> Option<String> {
    flag.then(|| "on".to_string())
}

impl QueryArgs {
    /// The request the storefront would send for these arguments.
    pub(crate) fn to_params(&self) -> QueryParams {
        let store = self.store.clone();
        let (store_vinmonopolet, store_taxfree) = match self.channel {
            Channel::Vinmonopolet => (store, None),
            Channel::Taxfree => (None, store),
        };

        QueryParams {
            channel: Some(self.channel.to_string()),
            page: self.page.map(|p| p.to_string()),
            sort: self.sort.clone(),
            ascending: self.descending.then(|| "false".to_string()),
            delta: self.delta.map(|d| d.to_string()),
            category: self.category.clone(),
            country: self.country.clone(),
            price: self.price.map(|v| v.to_string()),
            cprice: on(self.exact),
            volume: self.volume.map(|v| v.to_string()),
            cvolume: on(self.exact),
            alcohol: self.alcohol.map(|v| v.to_string()),
            calcohol: on(self.exact),
            year: self.year.map(|v| v.to_string()),
            cyear: on(self.exact),
            search: self.search.clone(),
            storelike: self.storelike.clone(),
            store_vinmonopolet,
            store_taxfree,
            nonalcoholic: on(self.nonalcoholic),
            ..QueryParams::default()
        }
    }
}

fn format_price(value: Option<f64>) -> String {
    value.map_or_else(|| "-".to_string(), |v| format!("{v:.2}"))
}

fn format_row(product: &Product, channel: Channel) -> String {
    let (price, discount) = match (channel, &product.taxfree) {
        (Channel::Taxfree, Some(overlay)) => (overlay.price, overlay.discount),
        _ => (product.price, product.discount),
    };
    format!(
        "{:>9}  {:<50}  {:>10}  {:>7}",
        product.index,
        product.name,
        format_price(price),
        discount.map_or_else(|| "-".to_string(), |d| format!("{d:+.1}%")),
    )
}

pub(crate) async fn run_query(
    pool: &PgPool,
    catalog: &CatalogConfig,
    per_page: u64,
    args: QueryArgs,
) -> anyhow::Result<()> {
    let channel = args.channel;
    let query = args.to_params().into_query(channel, catalog, per_page);

    let metadata = snublejuice_db::get_metadata(pool).await?;
    if !metadata.prices_fresh(channel) {
        tracing::warn!(channel = %channel, "prices are not fresh; results may be stale");
    }

    let source = PgCatalog::new(pool.clone());
    let page = load(&source, &query, &metadata, Utc::now().date_naive()).await;

    for product in &page.data {
        println!("{}", format_row(product, channel));
    }
    println!(
        "page {} of {}{}",
        query.page(),
        page.total.unwrap_or(1),
        page.updated
            .map(|u| format!(", lager oppdatert {u}"))
            .unwrap_or_default()
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    #[derive(Debug, Parser)]
    struct Harness {
        #[command(flatten)]
        args: QueryArgs,
    }

    fn parse(argv: &[&str]) -> QueryArgs {
        let mut full = vec!["query"];
        full.extend_from_slice(argv);
        Harness::try_parse_from(full).expect("valid args").args
    }

    #[test]
    fn args_translate_to_storefront_params() {
        let args = parse(&[
            "--channel",
            "taxfree",
            "--price",
            "300",
            "--exact",
            "--store",
            "Oslo lufthavn",
            "--descending",
        ]);
        let query = args
            .to_params()
            .into_query(Channel::Taxfree, &CatalogConfig::default(), 15);

        assert_eq!(query.channel, Channel::Taxfree);
        assert_eq!(query.store.as_deref(), Some("Oslo lufthavn"));
        assert_eq!(query.price.active(), Some(300.0));
        assert!(query.price.exact);
        assert!(!query.ascending);
    }

    #[test]
    fn category_slug_resolves_through_catalog() {
        let args = parse(&["--category", "hvitvin"]);
        let query = args
            .to_params()
            .into_query(Channel::Vinmonopolet, &CatalogConfig::default(), 15);
        assert_eq!(query.category.as_deref(), Some("Hvitvin"));
        assert!(query.orderable);
    }

    #[test]
    fn format_row_uses_overlay_on_taxfree() {
        let product = Product {
            index: 42,
            name: "Linie".to_string(),
            price: Some(500.0),
            taxfree: Some(snublejuice_core::TaxfreeOverlay {
                index: 7,
                price: Some(350.0),
                discount: Some(-30.0),
                ..Default::default()
            }),
            ..Product::default()
        };
        let row = format_row(&product, Channel::Taxfree);
        assert!(row.contains("350.00"));
        assert!(row.contains("-30.0%"));
    }
}

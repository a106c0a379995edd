use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A catalog entry, identified by the monopoly retailer's product number.
///
/// Numeric fields are optional because scrapes routinely return partial
/// records; the query layer treats a missing value like the document store
/// does (it never satisfies a comparison).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Product {
    pub index: i64,
    pub name: String,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default)]
    pub subcategory: Option<String>,
    #[serde(default)]
    pub country: Option<String>,
    #[serde(default)]
    pub year: Option<i32>,

    #[serde(default)]
    pub price: Option<f64>,
    #[serde(default)]
    pub oldprice: Option<f64>,
    /// Price history, oldest first. Only ever appended to.
    #[serde(default)]
    pub prices: Vec<f64>,
    /// Percentage change between the two latest prices; negative is cheaper.
    #[serde(default)]
    pub discount: Option<f64>,
    /// Volume in centilitres.
    #[serde(default)]
    pub volume: Option<f64>,
    #[serde(default)]
    pub literprice: Option<f64>,
    /// Alcohol by volume, in percent.
    #[serde(default)]
    pub alcohol: Option<f64>,
    #[serde(default)]
    pub alcoholprice: Option<f64>,

    #[serde(default)]
    pub buyable: bool,
    #[serde(default)]
    pub orderable: bool,
    #[serde(default)]
    pub instores: bool,
    /// Set when the latest scrape cycle refreshed this entry.
    #[serde(default)]
    pub updated: bool,
    #[serde(default)]
    pub stores: Vec<String>,

    #[serde(default)]
    pub rating: Option<Rating>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub taxfree: Option<TaxfreeOverlay>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Rating {
    pub value: Option<f64>,
    #[serde(default)]
    pub count: Option<i64>,
    pub updated: DateTime<Utc>,
}

/// Duty-free channel view of a product. Prices and stock are scraped
/// independently from the monopoly channel.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TaxfreeOverlay {
    pub index: i64,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub price: Option<f64>,
    #[serde(default)]
    pub oldprice: Option<f64>,
    #[serde(default)]
    pub prices: Vec<f64>,
    /// Percentage difference against the monopoly price of the same product.
    #[serde(default)]
    pub discount: Option<f64>,
    #[serde(default)]
    pub literprice: Option<f64>,
    #[serde(default)]
    pub alcoholprice: Option<f64>,
    #[serde(default)]
    pub updated: bool,
    #[serde(default)]
    pub stores: Vec<String>,
}

/// Percentage change from `old` to `new`.
///
/// Zero unless both prices are positive and differ.
#[must_use]
pub fn compute_discount(new: Option<f64>, old: Option<f64>) -> f64 {
    match (new, old) {
        (Some(new), Some(old)) if new > 0.0 && old > 0.0 && (new - old).abs() > f64::EPSILON => {
            (new - old) * 100.0 / old
        }
        _ => 0.0,
    }
}

fn per_liter(price: Option<f64>, volume: Option<f64>) -> Option<f64> {
    match (price, volume) {
        (Some(p), Some(v)) if p > 0.0 && v > 0.0 => Some(p / v * 100.0),
        _ => None,
    }
}

fn per_alcohol(literprice: Option<f64>, alcohol: Option<f64>) -> Option<f64> {
    match (literprice, alcohol) {
        (Some(l), Some(a)) if l > 0.0 && a > 0.0 => Some(l / a),
        _ => None,
    }
}

impl Product {
    /// Record a freshly scraped monopoly price.
    ///
    /// Appends to the history, shifts the previous price into `oldprice`, and
    /// re-derives `discount`, `literprice` and `alcoholprice`.
    pub fn record_price(&mut self, price: f64) {
        self.oldprice = self.price;
        self.price = Some(price);
        self.prices.push(price);
        self.discount = Some(compute_discount(self.price, self.oldprice));
        self.literprice = per_liter(self.price, self.volume);
        self.alcoholprice = per_alcohol(self.literprice, self.alcohol);
    }

    /// Record a freshly scraped duty-free price into the overlay, creating it
    /// if needed. The overlay discount compares against the monopoly price.
    pub fn record_taxfree_price(&mut self, taxfree_index: i64, price: f64) {
        let volume = self.volume;
        let alcohol = self.alcohol;
        let monopoly_price = self.price;

        let overlay = self.taxfree.get_or_insert_with(|| TaxfreeOverlay {
            index: taxfree_index,
            ..TaxfreeOverlay::default()
        });
        overlay.oldprice = overlay.price;
        overlay.price = Some(price);
        overlay.prices.push(price);
        overlay.discount = Some(compute_discount(overlay.price, monopoly_price));
        overlay.literprice = per_liter(overlay.price, volume);
        overlay.alcoholprice = per_alcohol(overlay.literprice, alcohol);
        overlay.updated = true;
    }

    /// Compare the current price against the one `delta` scrape cycles back
    /// instead of the previous one. A `delta` of 0 or 1 leaves the product
    /// untouched.
    pub fn rebase_discount(&mut self, delta: usize) {
        if delta <= 1 || self.prices.is_empty() {
            return;
        }
        let at = self.prices.len().saturating_sub(delta + 1);
        self.oldprice = self.prices.get(at).copied();
        self.discount = Some(compute_discount(self.price, self.oldprice));
    }

    /// Channel-independent alcohol check used by the non-alcoholic exclusion.
    #[must_use]
    pub fn is_alcoholic(&self) -> bool {
        self.alcohol.is_some_and(|a| a > 0.0)
    }
}

//! Catalog metadata snapshots: per-channel stock freshness and visitor counts.

use std::collections::BTreeMap;
use std::str::FromStr;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::CoreError;

/// Retail channel a request is served from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Channel {
    /// The monopoly retailer.
    Vinmonopolet,
    /// Duty-free airport shops; data lives in the `taxfree` overlay.
    Taxfree,
}

impl Channel {
    pub const ALL: [Channel; 2] = [Channel::Vinmonopolet, Channel::Taxfree];

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Channel::Vinmonopolet => "vinmonopolet",
            Channel::Taxfree => "taxfree",
        }
    }

    #[must_use]
    pub fn is_taxfree(self) -> bool {
        self == Channel::Taxfree
    }

    /// Resolve a channel from a request host such as `taxfree.snublejuice.no`.
    ///
    /// Returns `None` for bare/landing hosts.
    #[must_use]
    pub fn from_host(host: &str) -> Option<Self> {
        if host.starts_with("taxfree") {
            Some(Channel::Taxfree)
        } else if host.starts_with("vinmonopolet") {
            Some(Channel::Vinmonopolet)
        } else {
            None
        }
    }
}

impl std::fmt::Display for Channel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Channel {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "vinmonopolet" => Ok(Channel::Vinmonopolet),
            "taxfree" => Ok(Channel::Taxfree),
            other => Err(CoreError::UnknownChannel(other.to_string())),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelFlags {
    #[serde(default)]
    pub vinmonopolet: bool,
    #[serde(default)]
    pub taxfree: bool,
}

impl ChannelFlags {
    #[must_use]
    pub fn get(&self, channel: Channel) -> bool {
        match channel {
            Channel::Vinmonopolet => self.vinmonopolet,
            Channel::Taxfree => self.taxfree,
        }
    }

    pub fn set(&mut self, channel: Channel, value: bool) {
        match channel {
            Channel::Vinmonopolet => self.vinmonopolet = value,
            Channel::Taxfree => self.taxfree = value,
        }
    }
}

/// The `stock` metadata document.
///
/// `prices` says whether the latest price scrape completed for a channel; the
/// per-channel timestamps record when stock data was last refreshed.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StockMetadata {
    #[serde(default)]
    pub prices: ChannelFlags,
    #[serde(default)]
    pub vinmonopolet: Option<DateTime<Utc>>,
    #[serde(default)]
    pub taxfree: Option<DateTime<Utc>>,
}

impl StockMetadata {
    #[must_use]
    pub fn updated_at(&self, channel: Channel) -> Option<DateTime<Utc>> {
        match channel {
            Channel::Vinmonopolet => self.vinmonopolet,
            Channel::Taxfree => self.taxfree,
        }
    }

    pub fn set_updated_at(&mut self, channel: Channel, at: Option<DateTime<Utc>>) {
        match channel {
            Channel::Vinmonopolet => self.vinmonopolet = at,
            Channel::Taxfree => self.taxfree = at,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelCounts {
    #[serde(default)]
    pub vinmonopolet: i64,
    #[serde(default)]
    pub taxfree: i64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VisitBucket {
    #[serde(default)]
    pub total: i64,
    /// Keyed by `YYYY-MM`.
    #[serde(default)]
    pub month: BTreeMap<String, ChannelCounts>,
}

/// The `visitors` metadata document. `fresh` counts landings without query
/// parameters, `newpage` counts filter/pagination follow-ups.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VisitorCounts {
    #[serde(default)]
    pub fresh: VisitBucket,
    #[serde(default)]
    pub newpage: VisitBucket,
}

impl VisitorCounts {
    pub fn record(&mut self, month: &str, channel: Channel, fresh: bool) {
        let bucket = if fresh {
            &mut self.fresh
        } else {
            &mut self.newpage
        };
        bucket.total += 1;
        let counts = bucket.month.entry(month.to_string()).or_default();
        match channel {
            Channel::Vinmonopolet => counts.vinmonopolet += 1,
            Channel::Taxfree => counts.taxfree += 1,
        }
    }

    #[must_use]
    pub fn fresh_for(&self, month: &str, channel: Channel) -> i64 {
        self.fresh.month.get(month).map_or(0, |c| match channel {
            Channel::Vinmonopolet => c.vinmonopolet,
            Channel::Taxfree => c.taxfree,
        })
    }
}

/// Snapshot of every metadata document, read once per request.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Metadata {
    #[serde(default)]
    pub stock: StockMetadata,
    #[serde(default)]
    pub visitors: VisitorCounts,
}

impl Metadata {
    /// Whether the channel's latest price scrape completed. Channels with stale
    /// prices are not served.
    #[must_use]
    pub fn prices_fresh(&self, channel: Channel) -> bool {
        self.stock.prices.get(channel)
    }

    #[must_use]
    pub fn stock_updated(&self, channel: Channel) -> Option<DateTime<Utc>> {
        self.stock.updated_at(channel)
    }
}

/// Human readable recency of `updated` relative to `today`, on calendar days.
///
/// Timestamps later than `today` count as today.
#[must_use]
pub fn freshness_label(today: NaiveDate, updated: DateTime<Utc>) -> String {
    let diff = (today - updated.date_naive()).num_days().max(0);
    match diff {
        0 => "i dag".to_string(),
        1 => "i går".to_string(),
        n => format!("for {n} dager siden"),
    }
}

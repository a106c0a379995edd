use serde::{Deserialize, Serialize};

use crate::metadata::Channel;

/// A filterable or sortable product field, named by its document path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Field {
    Index,
    Name,
    Category,
    Country,
    Year,
    Volume,
    Alcohol,
    RatingValue,
    Price,
    OldPrice,
    Discount,
    LiterPrice,
    AlcoholPrice,
    Buyable,
    Orderable,
    Instores,
    Updated,
    Stores,
    TaxfreePrice,
    TaxfreeOldPrice,
    TaxfreeDiscount,
    TaxfreeLiterPrice,
    TaxfreeAlcoholPrice,
    TaxfreeUpdated,
    TaxfreeStores,
}

impl Field {
    #[must_use]
    pub fn path(self) -> &'static str {
        match self {
            Field::Index => "index",
            Field::Name => "name",
            Field::Category => "category",
            Field::Country => "country",
            Field::Year => "year",
            Field::Volume => "volume",
            Field::Alcohol => "alcohol",
            Field::RatingValue => "rating.value",
            Field::Price => "price",
            Field::OldPrice => "oldprice",
            Field::Discount => "discount",
            Field::LiterPrice => "literprice",
            Field::AlcoholPrice => "alcoholprice",
            Field::Buyable => "buyable",
            Field::Orderable => "orderable",
            Field::Instores => "instores",
            Field::Updated => "updated",
            Field::Stores => "stores",
            Field::TaxfreePrice => "taxfree.price",
            Field::TaxfreeOldPrice => "taxfree.oldprice",
            Field::TaxfreeDiscount => "taxfree.discount",
            Field::TaxfreeLiterPrice => "taxfree.literprice",
            Field::TaxfreeAlcoholPrice => "taxfree.alcoholprice",
            Field::TaxfreeUpdated => "taxfree.updated",
            Field::TaxfreeStores => "taxfree.stores",
        }
    }

    /// The field carrying this value on `channel`. Price data, the updated
    /// flag and the store list live in the `taxfree` overlay on the duty-free
    /// channel; everything else is shared.
    #[must_use]
    pub fn for_channel(self, channel: Channel) -> Field {
        if !channel.is_taxfree() {
            return self;
        }
        match self {
            Field::Price => Field::TaxfreePrice,
            Field::OldPrice => Field::TaxfreeOldPrice,
            Field::Discount => Field::TaxfreeDiscount,
            Field::LiterPrice => Field::TaxfreeLiterPrice,
            Field::AlcoholPrice => Field::TaxfreeAlcoholPrice,
            Field::Updated => Field::TaxfreeUpdated,
            Field::Stores => Field::TaxfreeStores,
            other => other,
        }
    }

    #[must_use]
    pub fn is_taxfree(self) -> bool {
        self.path().starts_with("taxfree.")
    }
}

impl std::fmt::Display for Field {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.path())
    }
}

/// Sort options offered by the storefront.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortKey {
    #[default]
    Discount,
    Price,
    OldPrice,
    LiterPrice,
    AlcoholPrice,
    Alcohol,
    Volume,
    Year,
    Rating,
    Name,
}

impl SortKey {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            SortKey::Discount => "discount",
            SortKey::Price => "price",
            SortKey::OldPrice => "oldprice",
            SortKey::LiterPrice => "literprice",
            SortKey::AlcoholPrice => "alcoholprice",
            SortKey::Alcohol => "alcohol",
            SortKey::Volume => "volume",
            SortKey::Year => "year",
            SortKey::Rating => "rating",
            SortKey::Name => "name",
        }
    }

    /// Parse a `sort` query parameter. Returns `None` for unknown names.
    #[must_use]
    pub fn from_param(raw: &str) -> Option<Self> {
        match raw.trim() {
            "discount" => Some(SortKey::Discount),
            "price" => Some(SortKey::Price),
            "oldprice" => Some(SortKey::OldPrice),
            "literprice" => Some(SortKey::LiterPrice),
            "alcoholprice" => Some(SortKey::AlcoholPrice),
            "alcohol" => Some(SortKey::Alcohol),
            "volume" => Some(SortKey::Volume),
            "year" => Some(SortKey::Year),
            "rating" => Some(SortKey::Rating),
            "name" => Some(SortKey::Name),
            _ => None,
        }
    }

    /// The field to sort on for `channel`.
    ///
    /// `rating` sorts on the nested rating value. On the duty-free channel the
    /// price-derived keys move to the overlay; alcohol content is the same in
    /// both channels and stays top level.
    #[must_use]
    pub fn resolve(self, channel: Channel) -> Field {
        let field = match self {
            SortKey::Discount => Field::Discount,
            SortKey::Price => Field::Price,
            SortKey::OldPrice => Field::OldPrice,
            SortKey::LiterPrice => Field::LiterPrice,
            SortKey::AlcoholPrice => Field::AlcoholPrice,
            SortKey::Alcohol => Field::Alcohol,
            SortKey::Volume => Field::Volume,
            SortKey::Year => Field::Year,
            SortKey::Rating => Field::RatingValue,
            SortKey::Name => Field::Name,
        };
        field.for_channel(channel)
    }
}

impl std::fmt::Display for SortKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn taxfree_price_sort_uses_overlay() {
        assert_eq!(
            SortKey::Price.resolve(Channel::Taxfree).path(),
            "taxfree.price"
        );
        assert_eq!(
            SortKey::Discount.resolve(Channel::Taxfree),
            Field::TaxfreeDiscount
        );
    }

    #[test]
    fn alcohol_sort_stays_top_level_on_taxfree() {
        assert_eq!(SortKey::Alcohol.resolve(Channel::Taxfree).path(), "alcohol");
    }

    #[test]
    fn rating_sort_uses_nested_value() {
        assert_eq!(
            SortKey::Rating.resolve(Channel::Vinmonopolet).path(),
            "rating.value"
        );
        assert_eq!(
            SortKey::Rating.resolve(Channel::Taxfree).path(),
            "rating.value"
        );
    }

    #[test]
    fn vinmonopolet_fields_are_not_remapped() {
        for key in [SortKey::Price, SortKey::Discount, SortKey::LiterPrice] {
            assert!(!key.resolve(Channel::Vinmonopolet).is_taxfree());
        }
    }

    #[test]
    fn from_param_rejects_unknown_fields() {
        assert_eq!(SortKey::from_param("price"), Some(SortKey::Price));
        assert_eq!(SortKey::from_param("$where"), None);
        assert_eq!(SortKey::from_param(""), None);
    }
}

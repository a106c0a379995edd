use std::collections::HashSet;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::metadata::Channel;
use crate::ConfigError;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CategoryConfig {
    /// Lowercase key used in query strings, e.g. `rødvin`.
    pub slug: String,
    /// Value stored on products, e.g. `Rødvin`.
    pub name: String,
}

/// Dropdown labels that mean "no store selected".
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StorePlaceholders {
    pub vinmonopolet: String,
    pub taxfree: String,
}

impl StorePlaceholders {
    #[must_use]
    pub fn get(&self, channel: Channel) -> &str {
        match channel {
            Channel::Vinmonopolet => &self.vinmonopolet,
            Channel::Taxfree => &self.taxfree,
        }
    }
}

/// Immutable lookup tables handed to the query layer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CatalogConfig {
    pub categories: Vec<CategoryConfig>,
    pub stores: StorePlaceholders,
    pub all_countries: String,
}

impl Default for CatalogConfig {
    fn default() -> Self {
        let categories = [
            ("alkoholfritt", "Alkoholfritt"),
            ("aromatisert", "Aromatisert vin"),
            ("brennevin", "Brennevin"),
            ("fruktvin", "Fruktvin"),
            ("hvitvin", "Hvitvin"),
            ("mjød", "Mjød"),
            ("musserende", "Musserende vin"),
            ("perlende", "Perlende vin"),
            ("rosévin", "Rosévin"),
            ("rødvin", "Rødvin"),
            ("sake", "Sake"),
            ("sider", "Sider"),
            ("sterkvin", "Sterkvin"),
            ("øl", "Øl"),
        ]
        .into_iter()
        .map(|(slug, name)| CategoryConfig {
            slug: slug.to_string(),
            name: name.to_string(),
        })
        .collect();

        Self {
            categories,
            stores: StorePlaceholders {
                vinmonopolet: "Spesifikk butikk".to_string(),
                taxfree: "Alle flyplasser".to_string(),
            },
            all_countries: "Alle land".to_string(),
        }
    }
}

impl CatalogConfig {
    /// Translate a query-string category slug to the stored category name.
    ///
    /// Unknown slugs (including the literal `"null"` sent by the dropdown)
    /// mean "no category filter".
    #[must_use]
    pub fn category_name(&self, slug: &str) -> Option<&str> {
        let slug = slug.trim().to_lowercase();
        self.categories
            .iter()
            .find(|c| c.slug == slug)
            .map(|c| c.name.as_str())
    }

    #[must_use]
    pub fn is_store_placeholder(&self, channel: Channel, label: &str) -> bool {
        self.stores.get(channel) == label
    }

    #[must_use]
    pub fn is_country_placeholder(&self, label: &str) -> bool {
        self.all_countries == label
    }
}

/// Load and validate the catalog tables from a YAML file.
///
/// # Errors
///
/// Returns `ConfigError` if the file cannot be read, parsed, or fails validation.
pub fn load_catalog(path: &Path) -> Result<CatalogConfig, ConfigError> {
    let content = std::fs::read_to_string(path).map_err(|e| ConfigError::CatalogFileIo {
        path: path.display().to_string(),
        source: e,
    })?;

    let catalog: CatalogConfig =
        serde_yaml::from_str(&content).map_err(ConfigError::CatalogFileParse)?;

    validate_catalog(&catalog)?;

    Ok(catalog)
}

fn validate_catalog(catalog: &CatalogConfig) -> Result<(), ConfigError> {
    let mut seen_slugs = HashSet::new();
    let mut seen_names = HashSet::new();

    for category in &catalog.categories {
        if category.slug.trim().is_empty() || category.name.trim().is_empty() {
            return Err(ConfigError::Validation(
                "category slug and name must be non-empty".to_string(),
            ));
        }

        if category.slug != category.slug.to_lowercase() {
            return Err(ConfigError::Validation(format!(
                "category slug '{}' must be lowercase",
                category.slug
            )));
        }

        if !seen_slugs.insert(category.slug.as_str()) {
            return Err(ConfigError::Validation(format!(
                "duplicate category slug: '{}'",
                category.slug
            )));
        }

        if !seen_names.insert(category.name.as_str()) {
            return Err(ConfigError::Validation(format!(
                "duplicate category name: '{}'",
                category.name
            )));
        }
    }

    for channel in Channel::ALL {
        if catalog.stores.get(channel).trim().is_empty() {
            return Err(ConfigError::Validation(format!(
                "store placeholder for {channel} must be non-empty"
            )));
        }
    }

    if catalog.all_countries.trim().is_empty() {
        return Err(ConfigError::Validation(
            "all_countries placeholder must be non-empty".to_string(),
        ));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn category(slug: &str, name: &str) -> CategoryConfig {
        CategoryConfig {
            slug: slug.to_string(),
            name: name.to_string(),
        }
    }

    #[test]
    fn category_name_translates_slug() {
        let catalog = CatalogConfig::default();
        assert_eq!(catalog.category_name("rødvin"), Some("Rødvin"));
        assert_eq!(catalog.category_name("Musserende"), Some("Musserende vin"));
        assert_eq!(catalog.category_name("null"), None);
    }

    #[test]
    fn placeholders_are_recognized_per_channel() {
        let catalog = CatalogConfig::default();
        assert!(catalog.is_store_placeholder(Channel::Vinmonopolet, "Spesifikk butikk"));
        assert!(!catalog.is_store_placeholder(Channel::Taxfree, "Spesifikk butikk"));
        assert!(catalog.is_store_placeholder(Channel::Taxfree, "Alle flyplasser"));
        assert!(catalog.is_country_placeholder("Alle land"));
    }

    #[test]
    fn validate_accepts_default_tables() {
        assert!(validate_catalog(&CatalogConfig::default()).is_ok());
    }

    #[test]
    fn validate_rejects_duplicate_slug() {
        let mut catalog = CatalogConfig::default();
        catalog.categories.push(category("øl", "Pils"));
        let err = validate_catalog(&catalog).unwrap_err();
        assert!(err.to_string().contains("duplicate category slug"));
    }

    #[test]
    fn validate_rejects_uppercase_slug() {
        let mut catalog = CatalogConfig::default();
        catalog.categories = vec![category("Cider", "Cider")];
        let err = validate_catalog(&catalog).unwrap_err();
        assert!(err.to_string().contains("must be lowercase"));
    }

    #[test]
    fn validate_rejects_blank_store_placeholder() {
        let mut catalog = CatalogConfig::default();
        catalog.stores.taxfree = "  ".to_string();
        let err = validate_catalog(&catalog).unwrap_err();
        assert!(err.to_string().contains("taxfree"));
    }

    #[test]
    fn load_catalog_from_real_file() {
        let path = Path::new(env!("CARGO_MANIFEST_DIR"))
            .join("..")
            .join("..")
            .join("config")
            .join("catalog.yaml");
        let catalog = load_catalog(&path).expect("catalog.yaml should load");
        assert_eq!(catalog, CatalogConfig::default());
    }
}

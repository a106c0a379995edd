pub mod app_config;
pub mod catalog;
pub mod config;
pub mod metadata;
pub mod products;
pub mod query;

use thiserror::Error;

pub use app_config::{AppConfig, Environment};
pub use catalog::{load_catalog, CatalogConfig, CategoryConfig, StorePlaceholders};
pub use config::{load_app_config, load_app_config_from_env};
pub use metadata::{
    freshness_label, Channel, ChannelFlags, Metadata, StockMetadata, VisitorCounts,
};
pub use products::{compute_discount, Product, Rating, TaxfreeOverlay};
pub use query::{
    build_pipeline, load, total_pages, word_pattern, BuiltQuery, Clause, CompareOp, Field,
    MemoryCatalog, Pipeline, ProductPage, ProductQuery, ProductSource, QueryParams, RangeFilter,
    SearchStage, SortKey, SourceError, Stage, DEFAULT_PER_PAGE,
};

#[derive(Debug, Error)]
pub enum CoreError {
    #[error("unknown channel: {0}")]
    UnknownChannel(String),
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing required environment variable: {0}")]
    MissingEnvVar(String),

    #[error("invalid value for {var}: {reason}")]
    InvalidEnvVar { var: String, reason: String },

    #[error("failed to read catalog file {path}: {source}")]
    CatalogFileIo {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse catalog file: {0}")]
    CatalogFileParse(#[source] serde_yaml::Error),

    #[error("catalog validation failed: {0}")]
    Validation(String),
}

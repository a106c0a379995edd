use std::net::SocketAddr;
use std::path::PathBuf;
use std::str::FromStr;

use crate::app_config::{AppConfig, Environment};
use crate::ConfigError;

/// Load application configuration from environment variables.
///
/// Calls `dotenvy::dotenv().ok()` to load `.env` files before reading env vars.
///
/// # Errors
///
/// Returns `ConfigError` if required env vars are missing or values are invalid.
pub fn load_app_config() -> Result<AppConfig, ConfigError> {
    dotenvy::dotenv().ok();
    load_app_config_from_env()
}

/// Load application configuration from environment variables already in the process.
///
/// Unlike [`load_app_config`], this does NOT load `.env` files.
///
/// # Errors
///
/// Returns `ConfigError` if required env vars are missing or values are invalid.
pub fn load_app_config_from_env() -> Result<AppConfig, ConfigError> {
    build_app_config(|key| std::env::var(key).ok())
}

/// Typed reads over an env-var lookup.
struct EnvReader<F> {
    lookup: F,
}

impl<F> EnvReader<F>
where
    F: Fn(&str) -> Option<String>,
{
    fn require(&self, var: &str) -> Result<String, ConfigError> {
        (self.lookup)(var).ok_or_else(|| ConfigError::MissingEnvVar(var.to_string()))
    }

    fn text(&self, var: &str, default: &str) -> String {
        (self.lookup)(var).unwrap_or_else(|| default.to_string())
    }

    fn parse<T>(&self, var: &str, default: T) -> Result<T, ConfigError>
    where
        T: FromStr,
        T::Err: std::fmt::Display,
    {
        match (self.lookup)(var) {
            None => Ok(default),
            Some(raw) => raw.trim().parse().map_err(|e: T::Err| invalid(var, e.to_string())),
        }
    }
}

fn invalid(var: &str, reason: impl Into<String>) -> ConfigError {
    ConfigError::InvalidEnvVar {
        var: var.to_string(),
        reason: reason.into(),
    }
}

/// Build application configuration from `lookup`, which returns `None` for
/// unset variables.
fn build_app_config<F>(lookup: F) -> Result<AppConfig, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    let env_vars = EnvReader { lookup };

    let database_url = env_vars.require("DATABASE_URL")?;
    let env = env_vars.parse("SNUBLEJUICE_ENV", Environment::Development)?;
    let bind_addr = env_vars.parse(
        "SNUBLEJUICE_BIND_ADDR",
        SocketAddr::from(([0, 0, 0, 0], 8080)),
    )?;
    let log_level = env_vars.text("SNUBLEJUICE_LOG_LEVEL", "info");
    let catalog_path = PathBuf::from(env_vars.text(
        "SNUBLEJUICE_CATALOG_PATH",
        "./config/catalog.yaml",
    ));

    let db_max_connections: u32 = env_vars.parse("SNUBLEJUICE_DB_MAX_CONNECTIONS", 10)?;
    let db_min_connections: u32 = env_vars.parse("SNUBLEJUICE_DB_MIN_CONNECTIONS", 1)?;
    if db_min_connections > db_max_connections {
        return Err(invalid(
            "SNUBLEJUICE_DB_MIN_CONNECTIONS",
            format!("{db_min_connections} exceeds max connections {db_max_connections}"),
        ));
    }

    let per_page: u64 = env_vars.parse("SNUBLEJUICE_PER_PAGE", crate::DEFAULT_PER_PAGE)?;
    if per_page == 0 {
        return Err(invalid("SNUBLEJUICE_PER_PAGE", "must be at least 1"));
    }

    Ok(AppConfig {
        database_url,
        env,
        bind_addr,
        log_level,
        catalog_path,
        db_max_connections,
        db_min_connections,
        db_acquire_timeout_secs: env_vars.parse("SNUBLEJUICE_DB_ACQUIRE_TIMEOUT_SECS", 10)?,
        per_page,
        rate_limit_max_requests: env_vars.parse("SNUBLEJUICE_RATE_LIMIT_MAX", 500)?,
        rate_limit_window_secs: env_vars.parse("SNUBLEJUICE_RATE_LIMIT_WINDOW_SECS", 600)?,
    })
}

#[cfg(test)]
#[path = "config_test.rs"]
mod tests;

use application::DatabaseSettings;
use std::env;
use std::str::FromStr;
use tracing::{info, warn};

pub const DEFAULT_PORT: u16 = 8000;
pub const DEFAULT_DATABASE_NAME: &str = "smylor";

/// Settings read once from the environment at startup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    pub port: u16,
    pub database_url: Option<String>,
    pub database_name: Option<String>,
}

/// Loads `.env` (if present) and then reads the process environment.
pub fn load() -> Config {
    match dotenvy::dotenv() {
        Ok(path) => info!("Loaded environment from {}", path.display()),
        Err(_) => info!("No .env file found, using process environment only."),
    }
    Config::from_lookup(|key| env::var(key).ok())
}

impl Config {
    /// Builds the config from any key lookup. Empty values count as unset.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let non_empty = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());

        let port = match non_empty("PORT") {
            Some(port_str) => match u16::from_str(port_str.trim()) {
                Ok(port_num) => {
                    info!("Using port {} from environment variable PORT.", port_num);
                    port_num
                }
                Err(_) => {
                    warn!(
                        "Invalid PORT value '{}' in environment variable. Using default port {}.",
                        port_str, DEFAULT_PORT
                    );
                    DEFAULT_PORT
                }
            },
            None => {
                info!(
                    "PORT environment variable not set. Using default port {}.",
                    DEFAULT_PORT
                );
                DEFAULT_PORT
            }
        };

        Self {
            port,
            database_url: non_empty("DATABASE_URL"),
            database_name: non_empty("DATABASE_NAME"),
        }
    }

    pub fn database_settings(&self) -> DatabaseSettings {
        DatabaseSettings {
            url_set: self.database_url.is_some(),
            name_set: self.database_name.is_some(),
        }
    }

    /// Name given to the document store.
    pub fn store_name(&self) -> &str {
        self.database_name.as_deref().unwrap_or(DEFAULT_DATABASE_NAME)
    }
}

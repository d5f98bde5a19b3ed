//! Layered configuration: an optional `configuration` file overlaid by
//! `APP__`-prefixed environment variables (e.g. `APP__PORT=8081`).

use crate::error::AppError;
use config::{Config as Loader, Environment, File};
use serde::Deserialize;

/// Settings every service binary shares. Service crates flatten this into
/// their own config struct and add their domain sections on top.
#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    #[serde(default = "default_port")]
    pub port: u16,
}

fn default_port() -> u16 {
    8080
}

impl Config {
    /// Load `.env`, then the `configuration` file if present, then the
    /// environment. Later sources win.
    pub fn load() -> Result<Self, AppError> {
        dotenvy::dotenv().ok();

        let loader = Loader::builder()
            .add_source(File::with_name("configuration").required(false))
            .add_source(Environment::with_prefix("APP").separator("__"))
            .build()?;

        Ok(loader.try_deserialize()?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn port_defaults_when_absent() {
        let config: Config = serde_json::from_str("{}").unwrap();
        assert_eq!(config.port, 8080);
    }

    #[test]
    fn explicit_port_is_kept() {
        let config: Config = serde_json::from_str(r#"{"port": 9000}"#).unwrap();
        assert_eq!(config.port, 9000);
    }
}

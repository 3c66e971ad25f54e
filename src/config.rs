use std::path::PathBuf;

use crate::response::StatusMode;

/// Process configuration read from the environment at startup.
#[derive(Debug, Clone)]
pub struct Config {
    pub bind_addr: String,
    pub port: u16,
    pub database_url: Option<String>,
    pub db_max_connections: u32,
    pub data_dir: PathBuf,
    pub status_mode: StatusMode,
    pub frontend_url: Option<String>,
    pub enable_hsts: bool,
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("{name} has an invalid value '{value}': {reason}")]
    Invalid { name: &'static str, value: String, reason: String },
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Build from any variable source; `from_env` passes the process env.
    pub fn from_lookup<F>(get: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        fn parsed<T, F>(get: &F, name: &'static str, default: T) -> Result<T, ConfigError>
        where
            T: std::str::FromStr,
            T::Err: std::fmt::Display,
            F: Fn(&str) -> Option<String>,
        {
            match get(name) {
                None => Ok(default),
                Some(v) => v.trim().parse().map_err(|e: T::Err| ConfigError::Invalid {
                    name,
                    value: v.clone(),
                    reason: e.to_string(),
                }),
            }
        }

        let enable_hsts = get("ENABLE_HSTS")
            .map(|v| v == "1" || v.eq_ignore_ascii_case("true"))
            .unwrap_or(false);

        Ok(Self {
            bind_addr: get("BIND_ADDR").unwrap_or_else(|| "0.0.0.0".to_string()),
            port: parsed(&get, "PORT", 8080)?,
            database_url: get("DATABASE_URL").filter(|v| !v.is_empty()),
            db_max_connections: parsed(&get, "DB_MAX_CONNECTIONS", 5)?,
            data_dir: get("BOARD_DATA_DIR").map(PathBuf::from).unwrap_or_else(|| PathBuf::from("data")),
            status_mode: parsed(&get, "BOARD_STATUS_MODE", StatusMode::Compat)?,
            frontend_url: get("FRONTEND_URL").filter(|v| !v.is_empty()),
            enable_hsts,
        })
    }
}

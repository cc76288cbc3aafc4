//! Server configuration.
//!
//! Built once at startup (from environment variables) and passed by
//! reference into the server and store constructors — never a global.

use serde::{Deserialize, Serialize};

use saltern_core::{Error, Result};

/// Configuration for the saltern API server.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// HTTP server port.
    pub http_port: u16,

    /// Enable debug mode.
    ///
    /// When enabled:
    /// - logs are pretty-printed instead of JSON
    /// - the in-memory device store is permitted when no store path is set
    /// - CORS may allow `*`
    pub debug: bool,

    /// CORS configuration.
    #[serde(default)]
    pub cors: CorsConfig,

    /// Device record store configuration.
    #[serde(default)]
    pub store: StoreConfig,
}

/// CORS configuration for browser-based operator access.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CorsConfig {
    /// Allowed origins. Use `["*"]` to allow all origins (development only).
    /// Empty list disables CORS entirely.
    pub allowed_origins: Vec<String>,

    /// Max age for preflight cache (seconds).
    pub max_age_seconds: u64,
}

impl Default for CorsConfig {
    fn default() -> Self {
        Self {
            // Default: disabled (secure-by-default).
            allowed_origins: Vec::new(),
            max_age_seconds: 3600,
        }
    }
}

/// Device record store configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StoreConfig {
    /// Path to the SQLite database file. Unset selects the in-memory
    /// store, which is permitted only in debug mode.
    #[serde(default)]
    pub path: Option<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            http_port: 3000,
            debug: false,
            cors: CorsConfig::default(),
            store: StoreConfig::default(),
        }
    }
}

impl Config {
    /// Loads configuration from `SALTERN_*` environment variables,
    /// falling back to defaults for anything unset.
    ///
    /// # Errors
    ///
    /// Returns an error if any variable is present but cannot be parsed.
    pub fn from_env() -> Result<Self> {
        let mut config = Self::default();

        if let Some(port) = env_u16("SALTERN_HTTP_PORT")? {
            config.http_port = port;
        }
        if let Some(debug) = env_bool("SALTERN_DEBUG")? {
            config.debug = debug;
        }
        if let Some(origins) = env_string("SALTERN_CORS_ALLOWED_ORIGINS") {
            config.cors.allowed_origins = parse_cors_allowed_origins(&origins);
        }
        if let Some(max_age) = env_u64("SALTERN_CORS_MAX_AGE_SECONDS")? {
            config.cors.max_age_seconds = max_age;
        }
        if let Some(path) = env_string("SALTERN_STORE_PATH") {
            config.store.path = Some(path);
        }

        Ok(config)
    }
}

fn env_string(name: &str) -> Option<String> {
    std::env::var(name).ok().and_then(|v| {
        let trimmed = v.trim();
        if trimmed.is_empty() {
            None
        } else {
            Some(trimmed.to_string())
        }
    })
}

fn env_u16(name: &str) -> Result<Option<u16>> {
    let Some(v) = env_string(name) else {
        return Ok(None);
    };
    v.parse()
        .map(Some)
        .map_err(|_| Error::InvalidInput(format!("{name} must be a port number (got {v})")))
}

fn env_u64(name: &str) -> Result<Option<u64>> {
    let Some(v) = env_string(name) else {
        return Ok(None);
    };
    v.parse()
        .map(Some)
        .map_err(|_| Error::InvalidInput(format!("{name} must be an integer (got {v})")))
}

fn env_bool(name: &str) -> Result<Option<bool>> {
    let Some(v) = env_string(name) else {
        return Ok(None);
    };
    parse_bool(name, &v).map(Some)
}

fn parse_bool(name: &str, value: &str) -> Result<bool> {
    match value.to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" => Ok(true),
        "false" | "0" | "no" => Ok(false),
        _ => Err(Error::InvalidInput(format!(
            "{name} must be true or false (got {value})"
        ))),
    }
}

fn parse_cors_allowed_origins(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let config = Config::default();
        assert_eq!(config.http_port, 3000);
        assert!(!config.debug);
        assert!(config.cors.allowed_origins.is_empty());
        assert!(config.store.path.is_none());
    }

    #[test]
    fn parse_bool_accepts_common_spellings() {
        assert!(parse_bool("X", "true").unwrap());
        assert!(parse_bool("X", "1").unwrap());
        assert!(parse_bool("X", "YES").unwrap());
        assert!(!parse_bool("X", "false").unwrap());
        assert!(!parse_bool("X", "0").unwrap());
        assert!(parse_bool("X", "maybe").is_err());
    }

    #[test]
    fn cors_origins_split_on_commas_and_trim() {
        let origins =
            parse_cors_allowed_origins("https://app.example.com, https://ops.example.com ,");
        assert_eq!(
            origins,
            vec!["https://app.example.com", "https://ops.example.com"]
        );
    }
}

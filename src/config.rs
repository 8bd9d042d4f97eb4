//! Engine configuration.
//!
//! Loaded from a TOML file with every field optional, then overridden from
//! the environment (a `.env` file is honored via `dotenv`).

use crate::logging::LogLevel;
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;

pub const ENV_API_BASE_URL: &str = "MANVIZ_API_BASE_URL";
pub const ENV_LOG_LEVEL: &str = "MANVIZ_LOG_LEVEL";
pub const ENV_LOG_FILE: &str = "MANVIZ_LOG_FILE";

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Root of the measurement API, without a trailing slash.
    pub api_base_url: String,
    pub request_timeout_secs: u64,
    /// Same-site re-click window that exits isolation.
    pub reclick_window_ms: i64,
    /// Opacity of markers outside the isolated site.
    pub dimmed_opacity: f64,
    /// Fill opacity of markers in the normal state.
    pub marker_opacity: f64,
    /// Stroke width of trace segments.
    pub trace_weight: f64,
    /// Zoom level used for the radius until the canvas reports one.
    pub initial_zoom: f64,
    pub log_level: String,
    pub log_file: Option<String>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            api_base_url: "http://localhost:8000".to_string(),
            request_timeout_secs: 30,
            reclick_window_ms: 1000,
            dimmed_opacity: 0.3,
            marker_opacity: 0.9,
            trace_weight: 3.0,
            initial_zoom: 2.0,
            log_level: "info".to_string(),
            log_file: None,
        }
    }
}

impl EngineConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn reclick_window(&self) -> chrono::Duration {
        chrono::Duration::milliseconds(self.reclick_window_ms)
    }

    /// Parsed `log_level`, falling back to `Info` for unknown names.
    pub fn min_log_level(&self) -> LogLevel {
        self.log_level.parse().unwrap_or(LogLevel::Info)
    }

    /// Applies `MANVIZ_*` overrides from the given lookup.
    fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(url) = lookup(ENV_API_BASE_URL) {
            self.api_base_url = url;
        }
        if let Some(level) = lookup(ENV_LOG_LEVEL) {
            self.log_level = level;
        }
        if let Some(file) = lookup(ENV_LOG_FILE) {
            self.log_file = Some(file);
        }
        while self.api_base_url.ends_with('/') {
            self.api_base_url.pop();
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ConfigError {
    Io(String),
    Parse(String),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::Io(msg) => write!(f, "Config read error: {}", msg),
            ConfigError::Parse(msg) => write!(f, "Config parse error: {}", msg),
        }
    }
}

impl std::error::Error for ConfigError {}

/// Parses a TOML document into a config. Missing keys take their defaults.
pub fn parse_config(content: &str) -> Result<EngineConfig, ConfigError> {
    toml::from_str(content).map_err(|e| ConfigError::Parse(e.to_string()))
}

/// Loads the config file at `path` and applies environment overrides.
///
/// A missing file yields the defaults; an unreadable or malformed one is an error.
pub fn load_config(path: &Path) -> Result<EngineConfig, ConfigError> {
    let mut config = match std::fs::read_to_string(path) {
        Ok(content) => parse_config(&content)?,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => EngineConfig::default(),
        Err(e) => return Err(ConfigError::Io(format!("{}: {}", path.display(), e))),
    };

    dotenv::dotenv().ok();
    config.apply_overrides(|key| std::env::var(key).ok());
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_empty_document_yields_defaults() {
        let config = parse_config("").expect("empty TOML is valid");
        assert_eq!(config, EngineConfig::default());
        assert_eq!(config.reclick_window(), chrono::Duration::milliseconds(1000));
    }

    #[test]
    fn test_partial_document_overrides_only_named_fields() {
        let config = parse_config(
            "api_base_url = \"https://man.example.org\"\nreclick_window_ms = 400\n",
        )
        .expect("valid config");
        assert_eq!(config.api_base_url, "https://man.example.org");
        assert_eq!(config.reclick_window_ms, 400);
        assert_eq!(config.dimmed_opacity, 0.3);
    }

    #[test]
    fn test_malformed_document_is_parse_error() {
        let result = parse_config("reclick_window_ms = \"soon\"");
        assert!(matches!(result, Err(ConfigError::Parse(_))), "got {:?}", result);
    }

    #[test]
    fn test_env_overrides_and_trailing_slash_trim() {
        let env: HashMap<&str, &str> = [
            (ENV_API_BASE_URL, "http://10.0.0.5:8000//"),
            (ENV_LOG_LEVEL, "debug"),
        ]
        .into_iter()
        .collect();

        let mut config = EngineConfig::default();
        config.apply_overrides(|k| env.get(k).map(|v| v.to_string()));
        assert_eq!(config.api_base_url, "http://10.0.0.5:8000");
        assert_eq!(config.min_log_level(), LogLevel::Debug);
        assert_eq!(config.log_file, None);
    }

    #[test]
    fn test_missing_file_yields_defaults() {
        let config = load_config(Path::new("/nonexistent/manviz.toml")).expect("missing file is not an error");
        assert_eq!(config.reclick_window_ms, 1000);
    }
}

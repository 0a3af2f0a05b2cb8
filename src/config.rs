use std::env;
use std::path::PathBuf;
use std::time::Duration;

/// Process configuration, read once from the environment at startup.
///
/// A `.env` file is honored when present (loaded in `main`); defaults keep
/// the binary runnable against a local stub without any configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// Base URL of the smart-meter service API
    pub api_url: String,

    /// Login credentials; both optional so token-only setups work
    pub username: Option<String>,
    pub password: Option<String>,

    /// Where stored authentication tokens live between runs
    pub token_path: PathBuf,

    /// Timeout applied to every HTTP request
    pub http_timeout: Duration,

    /// Include raw data previews in scale buckets and the report
    pub debug: bool,
}

impl Config {
    pub fn from_env() -> Self {
        let api_url = env::var("METER_API_URL")
            .unwrap_or_else(|_| "http://localhost:8080".to_string());

        let token_path = env::var("METER_TOKEN_FILE")
            .map(PathBuf::from)
            .unwrap_or_else(|_| default_token_path());

        let http_timeout = Duration::from_secs(
            env::var("HTTP_TIMEOUT_SECS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(10),
        );

        let debug = env::var("DEBUG")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(false);

        Self {
            api_url,
            username: env::var("METER_USERNAME").ok(),
            password: env::var("METER_PASSWORD").ok(),
            token_path,
            http_timeout,
            debug,
        }
    }

    pub fn has_credentials(&self) -> bool {
        self.username.is_some() && self.password.is_some()
    }
}

fn default_token_path() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".meter-tokens.json")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        // Build without touching process env to keep the test hermetic.
        let config = Config {
            api_url: "http://localhost:8080".to_string(),
            username: None,
            password: None,
            token_path: default_token_path(),
            http_timeout: Duration::from_secs(10),
            debug: false,
        };

        assert!(!config.has_credentials());
        assert!(config.token_path.ends_with(".meter-tokens.json"));
    }

    #[test]
    fn test_has_credentials() {
        let config = Config {
            api_url: String::new(),
            username: Some("user@example.com".to_string()),
            password: Some("hunter2".to_string()),
            token_path: PathBuf::from("/tmp/tokens.json"),
            http_timeout: Duration::from_secs(10),
            debug: true,
        };
        assert!(config.has_credentials());
    }
}

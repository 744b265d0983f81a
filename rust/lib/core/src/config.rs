use std::time::Duration;

use crate::ConfigError;

/// Connection settings for the CRM REST API.
///
/// Built from defaults, then overridden from command-line style arguments
/// or environment variables.
#[derive(Debug, Clone, PartialEq)]
pub struct ClientConfig {
    /// Versioned REST root, e.g. `http://localhost:8000/api/`.
    /// Always stored with a trailing slash.
    pub base_url: String,

    /// Login endpoint, relative to `base_url`.
    pub login_path: String,

    /// Token refresh endpoint, relative to `base_url`.
    pub refresh_path: String,

    /// Per-request timeout. `None` keeps the HTTP client's default.
    pub timeout: Option<Duration>,

    /// User-Agent header sent with every request.
    pub user_agent: String,
}

pub const DEFAULT_BASE_URL: &str = "http://localhost:8000/api/";
pub const ENV_BASE_URL: &str = "CRM_BASE_URL";
pub const ENV_TIMEOUT_SECS: &str = "CRM_TIMEOUT_SECS";

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            login_path: "auth/login/".to_string(),
            refresh_path: "auth/refresh-token/".to_string(),
            timeout: None,
            user_agent: format!("crm-client/{}", env!("CARGO_PKG_VERSION")),
        }
    }
}

impl ClientConfig {
    /// Defaults with the given API root.
    pub fn new(base_url: impl Into<String>) -> Self {
        Self::default().with_base_url(base_url)
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = with_trailing_slash(base_url.into());
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Parse configuration from command-line arguments.
    ///
    /// Supported flags:
    /// - `--base-url=URL`
    /// - `--login-path=PATH`
    /// - `--refresh-path=PATH`
    /// - `--timeout-secs=N`
    pub fn from_args(args: &[String]) -> Result<Self, ConfigError> {
        let mut config = ClientConfig::default();

        for arg in args {
            if let Some(val) = arg.strip_prefix("--base-url=") {
                config = config.with_base_url(val);
            } else if let Some(val) = arg.strip_prefix("--login-path=") {
                config.login_path = val.to_string();
            } else if let Some(val) = arg.strip_prefix("--refresh-path=") {
                config.refresh_path = val.to_string();
            } else if let Some(val) = arg.strip_prefix("--timeout-secs=") {
                config.timeout = Some(parse_timeout("timeout-secs", val)?);
            }
        }

        config.validate()?;
        Ok(config)
    }

    /// Read `CRM_BASE_URL` and `CRM_TIMEOUT_SECS` from the environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Same as [`from_env`](Self::from_env) over an arbitrary lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = ClientConfig::default();
        if let Some(url) = lookup(ENV_BASE_URL).filter(|v| !v.trim().is_empty()) {
            config = config.with_base_url(url.trim());
        }
        if let Some(secs) = lookup(ENV_TIMEOUT_SECS).filter(|v| !v.trim().is_empty()) {
            config.timeout = Some(parse_timeout(ENV_TIMEOUT_SECS, &secs)?);
        }
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.base_url.trim_end_matches('/').is_empty() {
            return Err(ConfigError::Missing("base_url".into()));
        }
        if !(self.base_url.starts_with("http://") || self.base_url.starts_with("https://")) {
            return Err(ConfigError::invalid(
                "base_url",
                format!("{:?} must start with http:// or https://", self.base_url),
            ));
        }
        Ok(())
    }

    /// Absolute URL for an API path.
    pub fn endpoint(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path.trim_start_matches('/'))
    }
}

fn with_trailing_slash(mut url: String) -> String {
    if !url.ends_with('/') {
        url.push('/');
    }
    url
}

fn parse_timeout(key: &str, value: &str) -> Result<Duration, ConfigError> {
    value
        .trim()
        .parse::<u64>()
        .map(Duration::from_secs)
        .map_err(|e| ConfigError::invalid(key, e.to_string()))
}

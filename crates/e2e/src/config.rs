//! Harness configuration

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{E2eError, E2eResult};
use crate::selector::SelectorPolicy;
use crate::wait::PollPolicy;

/// Prefix for environment overrides, e.g. `STOREFRONT_E2E_BASE_URL`
pub const ENV_PREFIX: &str = "STOREFRONT_E2E_";

/// Harness configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HarnessConfig {
    /// Site under test; suite `visit` paths are joined onto it
    pub base_url: String,

    /// WebDriver endpoint (chromedriver, geckodriver, selenium)
    pub webdriver_url: String,

    /// Browser requested from the WebDriver endpoint
    pub browser: Browser,

    /// Run the browser without a window
    pub headless: bool,

    /// Browser window size
    pub viewport: Viewport,

    /// Poll-until-timeout behaviour for assertions and interactions
    pub poll: PollConfig,

    /// Upper bound on a single page load
    pub page_load_timeout_ms: u64,

    /// Fail navigation when a preflight GET returns a non-2xx status
    pub fatal_http_status: bool,

    /// Stop the run after the first failing test case
    pub fail_fast: bool,

    /// Which selectors tests are allowed to use
    pub selector_policy: SelectorPolicy,

    /// Output directory for results
    pub output_dir: PathBuf,
}

impl Default for HarnessConfig {
    fn default() -> Self {
        Self {
            base_url: "https://hyf-react-w2-example.netlify.app/".to_string(),
            webdriver_url: "http://localhost:4444".to_string(),
            browser: Browser::Chrome,
            headless: true,
            viewport: Viewport::default(),
            poll: PollConfig::default(),
            page_load_timeout_ms: 30_000,
            fatal_http_status: false,
            fail_fast: false,
            selector_policy: SelectorPolicy::AttributesOnly,
            output_dir: PathBuf::from("test-results"),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Browser {
    #[default]
    Chrome,
    Firefox,
}

impl Browser {
    pub fn as_str(&self) -> &'static str {
        match self {
            Browser::Chrome => "chrome",
            Browser::Firefox => "firefox",
        }
    }
}

impl std::str::FromStr for Browser {
    type Err = E2eError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "chrome" | "chromium" => Ok(Browser::Chrome),
            "firefox" => Ok(Browser::Firefox),
            other => Err(E2eError::Config(format!("unknown browser: {}", other))),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct Viewport {
    pub width: u32,
    pub height: u32,
}

impl Default for Viewport {
    fn default() -> Self {
        Self { width: 1280, height: 720 }
    }
}

/// Serialized form of [`PollPolicy`]
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PollConfig {
    pub timeout_ms: u64,
    pub initial_interval_ms: u64,
    pub max_interval_ms: u64,
    pub multiplier: f64,
}

impl Default for PollConfig {
    fn default() -> Self {
        Self {
            timeout_ms: 4_000,
            initial_interval_ms: 25,
            max_interval_ms: 500,
            multiplier: 2.0,
        }
    }
}

impl PollConfig {
    pub fn policy(&self) -> PollPolicy {
        PollPolicy {
            timeout: Duration::from_millis(self.timeout_ms),
            initial_interval: Duration::from_millis(self.initial_interval_ms),
            max_interval: Duration::from_millis(self.max_interval_ms),
            multiplier: self.multiplier,
        }
    }
}

impl HarnessConfig {
    /// Load configuration from a TOML file; a missing file yields defaults
    pub fn load(path: &Path) -> E2eResult<Self> {
        if path.exists() {
            let content = std::fs::read_to_string(path)?;
            Self::from_toml(&content)
        } else {
            Ok(Self::default())
        }
    }

    pub fn from_toml(content: &str) -> E2eResult<Self> {
        let config: Self = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Apply `STOREFRONT_E2E_*` overrides from the process environment
    pub fn apply_env(self) -> E2eResult<Self> {
        self.apply_vars(std::env::vars())
    }

    /// Apply overrides from an explicit variable list
    pub fn apply_vars<I>(mut self, vars: I) -> E2eResult<Self>
    where
        I: IntoIterator<Item = (String, String)>,
    {
        for (key, value) in vars {
            let Some(name) = key.strip_prefix(ENV_PREFIX) else {
                continue;
            };
            match name {
                "BASE_URL" => self.base_url = value,
                "WEBDRIVER_URL" => self.webdriver_url = value,
                "BROWSER" => self.browser = value.parse()?,
                "HEADLESS" => self.headless = parse_bool(&key, &value)?,
                "TIMEOUT_MS" => {
                    self.poll.timeout_ms = value
                        .parse()
                        .map_err(|_| E2eError::Config(format!("{} is not a number: {}", key, value)))?;
                }
                "FAIL_FAST" => self.fail_fast = parse_bool(&key, &value)?,
                _ => {}
            }
        }
        self.validate()?;
        Ok(self)
    }

    pub fn validate(&self) -> E2eResult<()> {
        let poll = &self.poll;
        if poll.timeout_ms == 0 {
            return Err(E2eError::Config("poll.timeout_ms must be > 0".into()));
        }
        if poll.initial_interval_ms == 0 || poll.max_interval_ms == 0 {
            return Err(E2eError::Config("poll intervals must be > 0".into()));
        }
        if poll.initial_interval_ms > poll.max_interval_ms {
            return Err(E2eError::Config(
                "poll.initial_interval_ms must not exceed poll.max_interval_ms".into(),
            ));
        }
        if !(poll.multiplier >= 1.0) || !poll.multiplier.is_finite() {
            return Err(E2eError::Config("poll.multiplier must be a finite number >= 1.0".into()));
        }

        let url = reqwest::Url::parse(&self.base_url)
            .map_err(|e| E2eError::Config(format!("base_url {:?}: {}", self.base_url, e)))?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(E2eError::Config(format!(
                "base_url must be http(s), got {}",
                url.scheme()
            )));
        }
        Ok(())
    }

    /// Resolve a suite `visit` path against `base_url`
    pub fn resolve_url(&self, visit: &str) -> E2eResult<String> {
        if visit.is_empty() || visit == "/" {
            return Ok(self.base_url.clone());
        }
        let base = reqwest::Url::parse(&self.base_url)
            .map_err(|e| E2eError::Config(format!("base_url {:?}: {}", self.base_url, e)))?;
        let joined = base
            .join(visit)
            .map_err(|e| E2eError::Config(format!("visit {:?}: {}", visit, e)))?;
        Ok(joined.to_string())
    }

    pub fn page_load_timeout(&self) -> Duration {
        Duration::from_millis(self.page_load_timeout_ms)
    }
}

fn parse_bool(key: &str, value: &str) -> E2eResult<bool> {
    match value.to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(E2eError::Config(format!("{} is not a boolean: {}", key, value))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vars(pairs: &[(&str, &str)]) -> Vec<(String, String)> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_defaults_are_valid() {
        let config = HarnessConfig::default();
        config.validate().unwrap();
        assert_eq!(config.poll.timeout_ms, 4_000);
        assert_eq!(config.selector_policy, SelectorPolicy::AttributesOnly);
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let config = HarnessConfig::from_toml(
            r#"
base_url = "http://127.0.0.1:3000/"
fail_fast = true

[poll]
timeout_ms = 8000
"#,
        )
        .unwrap();
        assert_eq!(config.base_url, "http://127.0.0.1:3000/");
        assert!(config.fail_fast);
        assert_eq!(config.poll.timeout_ms, 8000);
        assert_eq!(config.poll.max_interval_ms, 500);
        assert_eq!(config.browser, Browser::Chrome);
    }

    #[test]
    fn test_missing_file_yields_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = HarnessConfig::load(&dir.path().join("absent.toml")).unwrap();
        assert_eq!(config.webdriver_url, "http://localhost:4444");
    }

    #[test]
    fn test_env_overrides() {
        let config = HarnessConfig::default()
            .apply_vars(vars(&[
                ("STOREFRONT_E2E_BROWSER", "firefox"),
                ("STOREFRONT_E2E_TIMEOUT_MS", "10000"),
                ("STOREFRONT_E2E_FAIL_FAST", "yes"),
                ("UNRELATED", "ignored"),
            ]))
            .unwrap();
        assert_eq!(config.browser, Browser::Firefox);
        assert_eq!(config.poll.timeout_ms, 10_000);
        assert!(config.fail_fast);
    }

    #[test]
    fn test_env_override_rejects_garbage() {
        let err = HarnessConfig::default()
            .apply_vars(vars(&[("STOREFRONT_E2E_HEADLESS", "maybe")]))
            .unwrap_err();
        assert!(matches!(err, E2eError::Config(_)));
    }

    #[test]
    fn test_validate_rejects_inverted_intervals() {
        let mut config = HarnessConfig::default();
        config.poll.initial_interval_ms = 900;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_bad_multiplier() {
        let mut config = HarnessConfig::default();
        config.poll.multiplier = f64::INFINITY;
        assert!(config.validate().is_err());
        config.poll.multiplier = 0.5;
        assert!(config.validate().is_err());

        // Large but finite is accepted; backoff saturates at max_interval
        let config = HarnessConfig::from_toml("[poll]\ntimeout_ms = 4000\nmultiplier = 1e20\n").unwrap();
        let policy = config.poll.policy();
        assert_eq!(policy.multiplier, 1e20);
    }

    #[test]
    fn test_validate_rejects_non_http_base() {
        let config = HarnessConfig {
            base_url: "file:///tmp/index.html".to_string(),
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_resolve_url() {
        let config = HarnessConfig {
            base_url: "http://shop.test/app/".to_string(),
            ..Default::default()
        };
        assert_eq!(config.resolve_url("").unwrap(), "http://shop.test/app/");
        assert_eq!(config.resolve_url("/").unwrap(), "http://shop.test/app/");
        assert_eq!(
            config.resolve_url("product/3").unwrap(),
            "http://shop.test/app/product/3"
        );
    }
}

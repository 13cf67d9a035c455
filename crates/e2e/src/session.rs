//! Page session controller - one fresh page context per test case

use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::config::HarnessConfig;
use crate::driver::{BrowserDriver, DriverFactory};
use crate::error::{E2eError, E2eResult};
use crate::scope::{Query, Scope};
use crate::selector::{IntoSelector, Selector, SelectorPolicy};
use crate::wait::PollPolicy;

/// Opens isolated, freshly loaded pages
pub struct SessionController {
    factory: Arc<dyn DriverFactory>,
    config: HarnessConfig,
    http: reqwest::Client,
}

impl SessionController {
    pub fn new(factory: Arc<dyn DriverFactory>, config: HarnessConfig) -> E2eResult<Self> {
        config.validate()?;
        let http = reqwest::Client::builder()
            .timeout(config.page_load_timeout())
            .connect_timeout(Duration::from_secs(10))
            .build()?;
        Ok(Self { factory, config, http })
    }

    pub fn config(&self) -> &HarnessConfig {
        &self.config
    }

    /// Open a clean page context and load `url` into it.
    ///
    /// Returns once the page's load event has fired. Nothing is retried:
    /// a page that cannot be loaded fails the test case before any step runs.
    pub async fn begin(&self, url: &str) -> E2eResult<Page> {
        if self.config.fatal_http_status {
            self.preflight(url).await?;
        }

        let driver = self.factory.open().await?;
        info!("Visiting {} ({})", url, driver.backend());

        if let Err(e) = driver.navigate(url).await {
            if let Err(close_err) = driver.close().await {
                warn!("Failed to close page after navigation error: {}", close_err);
            }
            return Err(e);
        }

        Ok(Page {
            driver,
            url: url.to_string(),
            poll: self.config.poll.policy(),
            selector_policy: self.config.selector_policy,
        })
    }

    /// GET `url` and require a 2xx status
    async fn preflight(&self, url: &str) -> E2eResult<()> {
        let navigation = |reason: String| E2eError::Navigation {
            url: url.to_string(),
            reason,
        };

        let response = self
            .http
            .get(url)
            .send()
            .await
            .map_err(|e| navigation(e.to_string()))?;
        let status = response.status();
        debug!("Preflight {} -> {}", url, status);

        if status.is_success() {
            Ok(())
        } else {
            Err(navigation(format!("HTTP {}", status)))
        }
    }
}

/// A loaded page, exclusively owned by the running test case
pub struct Page {
    driver: Box<dyn BrowserDriver>,
    url: String,
    poll: PollPolicy,
    selector_policy: SelectorPolicy,
}

impl fmt::Debug for Page {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Page")
            .field("backend", &self.driver.backend())
            .field("url", &self.url)
            .field("poll", &self.poll)
            .field("selector_policy", &self.selector_policy)
            .finish()
    }
}

impl Page {
    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn driver(&self) -> &dyn BrowserDriver {
        self.driver.as_ref()
    }

    pub fn poll_policy(&self) -> PollPolicy {
        self.poll
    }

    /// The whole document
    pub fn root(&self) -> Scope<'_> {
        Scope::new(self, Vec::new())
    }

    pub fn get(&self, selector: impl IntoSelector) -> E2eResult<Query<'_>> {
        self.root().get(selector)
    }

    pub fn within(&self, selector: impl IntoSelector) -> E2eResult<Scope<'_>> {
        self.root().within(selector)
    }

    pub(crate) fn check_selector(&self, selector: impl IntoSelector) -> E2eResult<Selector> {
        let selector = selector.into_selector()?;
        self.selector_policy.check(&selector)?;
        Ok(selector)
    }

    pub async fn close(self) -> E2eResult<()> {
        self.driver.close().await
    }
}

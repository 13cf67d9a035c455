//! WebDriver backend
//!
//! A thin [`BrowserDriver`] adapter over `thirtyfour`, talking to
//! chromedriver, geckodriver or a Selenium grid. Element clicks go through
//! the endpoint's element click command, which performs its own
//! actionability checks and emits the full pointer/mouse/focus/click sequence.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::{BTreeMap, HashMap};
use thirtyfour::error::WebDriverError;
use thirtyfour::prelude::*;
use thirtyfour::{Capabilities, ChromiumLikeCapabilities};
use tracing::{debug, info, warn};

use crate::config::{Browser, HarnessConfig};
use crate::driver::{BrowserDriver, DriverFactory, ElementHandle, ElementSnapshot};
use crate::error::{E2eError, E2eResult};
use crate::selector::Selector;

const ATTRIBUTES_SCRIPT: &str =
    "return Array.from(arguments[0].attributes).map(function (a) { return [a.name, a.value]; });";

/// Map a WebDriver failure on `element` into the harness taxonomy
fn element_error(err: WebDriverError, element: &ElementHandle) -> E2eError {
    let selector = element.to_string();
    match err {
        WebDriverError::StaleElementReference(_) | WebDriverError::NoSuchElement(_) => {
            E2eError::DetachedElement { selector }
        }
        err @ (WebDriverError::ElementNotInteractable(_) | WebDriverError::ElementClickIntercepted(_)) => {
            E2eError::NotActionable {
                selector,
                reason: err.to_string(),
            }
        }
        other => driver_error(other),
    }
}

fn driver_error(err: WebDriverError) -> E2eError {
    E2eError::Driver(err.to_string())
}

/// Capabilities requested for the configured browser
pub fn capabilities(config: &HarnessConfig) -> E2eResult<Capabilities> {
    let width = config.viewport.width;
    let height = config.viewport.height;

    let caps: Capabilities = match config.browser {
        Browser::Chrome => {
            let mut caps = DesiredCapabilities::chrome();
            caps.add_arg(&format!("--window-size={},{}", width, height))
                .map_err(driver_error)?;
            if config.headless {
                caps.add_arg("--headless=new").map_err(driver_error)?;
            }
            caps.into()
        }
        Browser::Firefox => {
            let mut caps = DesiredCapabilities::firefox();
            caps.add_arg(&format!("--width={}", width)).map_err(driver_error)?;
            caps.add_arg(&format!("--height={}", height)).map_err(driver_error)?;
            if config.headless {
                caps.set_headless().map_err(driver_error)?;
            }
            caps.into()
        }
    };
    Ok(caps)
}

/// Opens one WebDriver session per test case
#[derive(Clone)]
pub struct WebDriverFactory {
    endpoint: String,
    capabilities: Capabilities,
    page_load_timeout: std::time::Duration,
}

impl WebDriverFactory {
    pub fn new(config: &HarnessConfig) -> E2eResult<Self> {
        Ok(Self {
            endpoint: config.webdriver_url.clone(),
            capabilities: capabilities(config)?,
            page_load_timeout: config.page_load_timeout(),
        })
    }
}

#[async_trait]
impl DriverFactory for WebDriverFactory {
    async fn open(&self) -> E2eResult<Box<dyn BrowserDriver>> {
        let driver = WebDriver::new(&self.endpoint, self.capabilities.clone())
            .await
            .map_err(|e| E2eError::Driver(format!("could not create session: {}", e)))?;
        driver
            .set_page_load_timeout(self.page_load_timeout)
            .await
            .map_err(driver_error)?;
        info!("Opened WebDriver session at {}", self.endpoint);

        Ok(Box::new(WebDriverSession {
            driver,
            elements: Mutex::new(HashMap::new()),
        }))
    }
}

/// A live browser session. Elements handed out as [`ElementHandle`]s are
/// kept here so later commands can address them again.
pub struct WebDriverSession {
    driver: WebDriver,
    elements: Mutex<HashMap<String, WebElement>>,
}

impl WebDriverSession {
    fn register(&self, found: Vec<WebElement>) -> Vec<ElementHandle> {
        let mut elements = self.elements.lock();
        found
            .into_iter()
            .map(|element| {
                let id = element.element_id().to_string();
                elements.insert(id.clone(), element);
                ElementHandle::new(id)
            })
            .collect()
    }

    fn element(&self, handle: &ElementHandle) -> E2eResult<WebElement> {
        self.elements
            .lock()
            .get(handle.id())
            .cloned()
            .ok_or_else(|| E2eError::Driver(format!("unknown element handle {}", handle)))
    }
}

#[async_trait]
impl BrowserDriver for WebDriverSession {
    fn backend(&self) -> &'static str {
        "webdriver"
    }

    async fn navigate(&self, url: &str) -> E2eResult<()> {
        self.elements.lock().clear();
        self.driver.goto(url).await.map_err(|e| E2eError::Navigation {
            url: url.to_string(),
            reason: e.to_string(),
        })
    }

    async fn query(
        &self,
        selector: &Selector,
        scope: Option<&ElementHandle>,
    ) -> E2eResult<Vec<ElementHandle>> {
        let css = selector.to_string();
        let found = match scope {
            Some(root) => self
                .element(root)?
                .find_all(By::Css(css.as_str()))
                .await
                .map_err(|e| element_error(e, root))?,
            None => self
                .driver
                .find_all(By::Css(css.as_str()))
                .await
                .map_err(|e| match e {
                    err @ WebDriverError::InvalidSelector(_) => E2eError::InvalidSelector {
                        selector: css.clone(),
                        reason: err.to_string(),
                    },
                    other => driver_error(other),
                })?,
        };
        debug!("{} matched {} element(s)", css, found.len());
        Ok(self.register(found))
    }

    async fn dispatch_click(&self, element: &ElementHandle) -> E2eResult<()> {
        self.element(element)?
            .click()
            .await
            .map_err(|e| element_error(e, element))
    }

    async fn is_visible(&self, element: &ElementHandle) -> E2eResult<bool> {
        let web = self.element(element)?;
        if !web.is_displayed().await.map_err(|e| element_error(e, element))? {
            return Ok(false);
        }
        let rect = web.rect().await.map_err(|e| element_error(e, element))?;
        Ok(rect.width > 0.0 && rect.height > 0.0)
    }

    async fn attribute(&self, element: &ElementHandle, name: &str) -> E2eResult<Option<String>> {
        self.element(element)?
            .attr(name)
            .await
            .map_err(|e| element_error(e, element))
    }

    async fn describe(&self, element: &ElementHandle) -> E2eResult<ElementSnapshot> {
        let web = self.element(element)?;
        let tag = web.tag_name().await.map_err(|e| element_error(e, element))?;
        let arg = web.to_json().map_err(driver_error)?;
        let pairs: Vec<(String, String)> = self
            .driver
            .execute(ATTRIBUTES_SCRIPT, vec![arg])
            .await
            .map_err(|e| element_error(e, element))?
            .convert()
            .map_err(driver_error)?;

        Ok(ElementSnapshot {
            tag: tag.to_ascii_lowercase(),
            attributes: pairs.into_iter().collect::<BTreeMap<_, _>>(),
        })
    }

    async fn close(&self) -> E2eResult<()> {
        self.elements.lock().clear();
        match self.driver.clone().quit().await {
            Ok(()) => {
                debug!("Closed WebDriver session");
                Ok(())
            }
            Err(e) => {
                warn!("Closing WebDriver session failed: {}", e);
                Err(driver_error(e))
            }
        }
    }
}

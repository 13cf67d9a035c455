//! Browser capability interface
//!
//! The harness never talks to a browser directly. Everything it needs from
//! one goes through [`BrowserDriver`]: navigate, query, click, and read back
//! visibility and attributes. [`crate::webdriver`] implements it over the W3C
//! WebDriver protocol and [`crate::memory`] implements it in-process.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

use crate::error::E2eResult;
use crate::selector::Selector;

/// Opaque reference to an element inside one page session
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ElementHandle(String);

impl ElementHandle {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn id(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ElementHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Tag name and attributes of an element, captured for diagnostics
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ElementSnapshot {
    pub tag: String,
    pub attributes: BTreeMap<String, String>,
}

impl fmt::Display for ElementSnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "<{}", self.tag)?;
        for (name, value) in &self.attributes {
            write!(f, " {}=\"{}\"", name, value)?;
        }
        f.write_str(">")
    }
}

/// Elements matched by one resolution of a selector. Never cached: any page
/// mutation may invalidate it, so every poll resolves a fresh set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ElementSet {
    pub selector: Selector,
    pub elements: Vec<ElementHandle>,
    /// Set when an enclosing scope resolved to nothing
    pub missing_scope: Option<Selector>,
}

impl ElementSet {
    pub fn new(selector: Selector, elements: Vec<ElementHandle>) -> Self {
        Self {
            selector,
            elements,
            missing_scope: None,
        }
    }

    pub fn len(&self) -> usize {
        self.elements.len()
    }

    pub fn is_empty(&self) -> bool {
        self.elements.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, ElementHandle> {
        self.elements.iter()
    }
}

/// Minimal browser capability surface consumed by the harness
#[async_trait]
pub trait BrowserDriver: Send + Sync {
    /// Short backend name for logs
    fn backend(&self) -> &'static str;

    /// Load `url` and return once the page's load event has fired
    async fn navigate(&self, url: &str) -> E2eResult<()>;

    /// Elements matching `selector`, in document order, restricted to
    /// descendants of `scope` when given
    async fn query(
        &self,
        selector: &Selector,
        scope: Option<&ElementHandle>,
    ) -> E2eResult<Vec<ElementHandle>>;

    /// Deliver a genuine user click to `element`
    async fn dispatch_click(&self, element: &ElementHandle) -> E2eResult<()>;

    /// Non-zero rendered size and no hiding ancestor
    async fn is_visible(&self, element: &ElementHandle) -> E2eResult<bool>;

    async fn attribute(&self, element: &ElementHandle, name: &str) -> E2eResult<Option<String>>;

    async fn describe(&self, element: &ElementHandle) -> E2eResult<ElementSnapshot>;

    /// Tear down the page context
    async fn close(&self) -> E2eResult<()>;
}

/// Provisions a fresh, isolated page context per test case
#[async_trait]
pub trait DriverFactory: Send + Sync {
    async fn open(&self) -> E2eResult<Box<dyn BrowserDriver>>;
}

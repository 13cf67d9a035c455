//! Scoped query engine
//!
//! A [`Scope`] is a chain of root selectors. Queries made through it only
//! match descendants of whatever the chain resolves to at the moment the
//! query runs. Nothing is cached between polls.
//!
//! ```ignore
//! let list = page.within(r#"[data-testid="categories-list"]"#)?;
//! list.get(r#"[data-elementid="electronics"]"#)?.click().await?;
//! list.get(r#"[data-selected="true"]"#)?.should_have_length(1).await?;
//! ```

use async_trait::async_trait;
use std::time::Duration;
use tracing::warn;

use crate::assertion::{assert_that, Predicate};
use crate::driver::{BrowserDriver, ElementHandle, ElementSet};
use crate::error::{E2eError, E2eResult};
use crate::interaction;
use crate::selector::{IntoSelector, Selector};
use crate::session::Page;
use crate::wait::PollPolicy;

/// Something that can be resolved to a fresh element set on demand
#[async_trait]
pub trait Resolve: Send + Sync {
    fn driver(&self) -> &dyn BrowserDriver;

    /// Human-readable target for logs and failures
    fn describe_target(&self) -> String;

    async fn resolve(&self) -> E2eResult<ElementSet>;
}

/// Queries restricted to the descendants of a chain of roots
#[derive(Clone)]
pub struct Scope<'p> {
    page: &'p Page,
    chain: Vec<Selector>,
}

impl<'p> Scope<'p> {
    pub(crate) fn new(page: &'p Page, chain: Vec<Selector>) -> Self {
        Self { page, chain }
    }

    pub fn chain(&self) -> &[Selector] {
        &self.chain
    }

    pub fn get(&self, selector: impl IntoSelector) -> E2eResult<Query<'p>> {
        let selector = self.page.check_selector(selector)?;
        Ok(Query {
            page: self.page,
            chain: self.chain.clone(),
            selector,
            policy: self.page.poll_policy(),
        })
    }

    /// A nested scope; `self` is left untouched
    pub fn within(&self, selector: impl IntoSelector) -> E2eResult<Scope<'p>> {
        let selector = self.page.check_selector(selector)?;
        let mut chain = self.chain.clone();
        chain.push(selector);
        Ok(Scope::new(self.page, chain))
    }
}

/// A selector bound to a scope, ready to be asserted on or clicked
pub struct Query<'p> {
    page: &'p Page,
    chain: Vec<Selector>,
    selector: Selector,
    policy: PollPolicy,
}

impl<'p> Query<'p> {
    /// Override the poll timeout for this query only
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.policy = self.policy.with_timeout(timeout);
        self
    }

    pub async fn should(&self, predicate: Predicate) -> E2eResult<ElementSet> {
        assert_that(self, &predicate, &self.policy).await
    }

    pub async fn should_have_length(&self, n: usize) -> E2eResult<ElementSet> {
        self.should(Predicate::HaveLength(n)).await
    }

    pub async fn should_not_exist(&self) -> E2eResult<ElementSet> {
        self.should(Predicate::NotExist).await
    }

    pub async fn should_exist(&self) -> E2eResult<ElementSet> {
        self.should(Predicate::Exist).await
    }

    pub async fn should_be_visible(&self) -> E2eResult<ElementSet> {
        self.should(Predicate::BeVisible).await
    }

    pub async fn should_have_attribute(&self, name: &str, value: &str) -> E2eResult<ElementSet> {
        self.should(Predicate::HaveAttribute {
            name: name.to_string(),
            value: value.to_string(),
        })
        .await
    }

    pub async fn click(&self) -> E2eResult<()> {
        interaction::click(self, &self.policy).await
    }

    async fn query_under(
        &self,
        selector: &Selector,
        roots: &[Option<ElementHandle>],
    ) -> E2eResult<Vec<ElementHandle>> {
        let driver = self.page.driver();
        let mut found: Vec<ElementHandle> = Vec::new();
        for root in roots {
            for handle in driver.query(selector, root.as_ref()).await? {
                if !found.contains(&handle) {
                    found.push(handle);
                }
            }
        }
        Ok(found)
    }

    async fn resolve_once(&self) -> E2eResult<ElementSet> {
        let mut roots: Vec<Option<ElementHandle>> = vec![None];
        for scope in &self.chain {
            let next = self.query_under(scope, &roots).await?;
            if next.is_empty() {
                return Ok(ElementSet {
                    selector: self.selector.clone(),
                    elements: Vec::new(),
                    missing_scope: Some(scope.clone()),
                });
            }
            roots = next.into_iter().map(Some).collect();
        }
        let elements = self.query_under(&self.selector, &roots).await?;
        Ok(ElementSet::new(self.selector.clone(), elements))
    }
}

#[async_trait]
impl<'p> Resolve for Query<'p> {
    fn driver(&self) -> &dyn BrowserDriver {
        self.page.driver()
    }

    fn describe_target(&self) -> String {
        let mut parts: Vec<String> = self.chain.iter().map(Selector::to_string).collect();
        parts.push(self.selector.to_string());
        parts.join(" >> ")
    }

    /// A root that goes stale between resolving it and querying under it
    /// gets one fresh attempt
    async fn resolve(&self) -> E2eResult<ElementSet> {
        match self.resolve_once().await {
            Err(e) if e.is_detached() => {
                warn!("Scope went stale while resolving {}; retrying", self.describe_target());
                self.resolve_once().await.map_err(|e| {
                    if e.is_detached() {
                        E2eError::DetachedElement {
                            selector: self.describe_target(),
                        }
                    } else {
                        e
                    }
                })
            }
            other => other,
        }
    }
}

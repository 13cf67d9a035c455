//! Assertion engine
//!
//! An assertion is a predicate over a freshly resolved element set, retried
//! under a [`PollPolicy`] until it holds. On timeout the error carries what
//! was last observed so a failure reads as expected-vs-actual.

use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::debug;

use crate::driver::{BrowserDriver, ElementSet};
use crate::error::{E2eError, E2eResult};
use crate::scope::Resolve;
use crate::selector::Selector;
use crate::wait::{poll_until, Attempt, PollOutcome, PollPolicy};

/// Most elements rendered into a failure message
const MAX_OBSERVED: usize = 10;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Predicate {
    /// Cardinality is exactly `n`
    HaveLength(usize),
    NotExist,
    Exist,
    /// Non-empty, and every element is rendered and not hidden
    BeVisible,
    /// Non-empty, and every element carries `name="value"`
    HaveAttribute { name: String, value: String },
}

impl fmt::Display for Predicate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Predicate::HaveLength(n) => write!(f, "have length {}", n),
            Predicate::NotExist => f.write_str("not exist"),
            Predicate::Exist => f.write_str("exist"),
            Predicate::BeVisible => f.write_str("be visible"),
            Predicate::HaveAttribute { name, value } => {
                write!(f, "have attribute {}=\"{}\"", name, value)
            }
        }
    }
}

impl Predicate {
    /// Evaluate against one resolution. A handle that went stale mid-check
    /// counts as "not yet"; the next poll re-resolves.
    pub async fn holds(&self, driver: &dyn BrowserDriver, set: &ElementSet) -> E2eResult<bool> {
        let result = match self {
            Predicate::HaveLength(n) => Ok(set.len() == *n),
            Predicate::NotExist => Ok(set.is_empty()),
            Predicate::Exist => Ok(!set.is_empty()),
            Predicate::BeVisible => all_visible(driver, set).await,
            Predicate::HaveAttribute { name, value } => {
                all_have_attribute(driver, set, name, value).await
            }
        };
        match result {
            Err(e) if e.is_detached() => Ok(false),
            other => other,
        }
    }
}

async fn all_visible(driver: &dyn BrowserDriver, set: &ElementSet) -> E2eResult<bool> {
    if set.is_empty() {
        return Ok(false);
    }
    for element in set.iter() {
        if !driver.is_visible(element).await? {
            return Ok(false);
        }
    }
    Ok(true)
}

async fn all_have_attribute(
    driver: &dyn BrowserDriver,
    set: &ElementSet,
    name: &str,
    value: &str,
) -> E2eResult<bool> {
    if set.is_empty() {
        return Ok(false);
    }
    for element in set.iter() {
        if driver.attribute(element, name).await?.as_deref() != Some(value) {
            return Ok(false);
        }
    }
    Ok(true)
}

/// What the page looked like at the last poll
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Observation {
    pub count: usize,
    pub elements: Vec<String>,
    pub missing_scope: Option<String>,
}

impl Observation {
    pub async fn capture(driver: &dyn BrowserDriver, set: &ElementSet) -> Self {
        let mut elements = Vec::new();
        for element in set.iter().take(MAX_OBSERVED) {
            let rendered = match driver.describe(element).await {
                Ok(snapshot) => snapshot.to_string(),
                Err(e) if e.is_detached() => "<detached>".to_string(),
                Err(e) => format!("<unavailable: {}>", e),
            };
            elements.push(rendered);
        }
        Self {
            count: set.len(),
            elements,
            missing_scope: set.missing_scope.as_ref().map(Selector::to_string),
        }
    }
}

impl fmt::Display for Observation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let noun = if self.count == 1 { "element" } else { "elements" };
        write!(f, "{} {}", self.count, noun)?;
        if !self.elements.is_empty() {
            write!(f, ": {}", self.elements.join(", "))?;
            if self.count > self.elements.len() {
                write!(f, ", ... ({} more)", self.count - self.elements.len())?;
            }
        }
        if let Some(scope) = &self.missing_scope {
            write!(f, " (scope {} matched nothing)", scope)?;
        }
        Ok(())
    }
}

/// Re-resolve `target` until `predicate` holds; returns the passing set
pub async fn assert_that(
    target: &dyn Resolve,
    predicate: &Predicate,
    policy: &PollPolicy,
) -> E2eResult<ElementSet> {
    let driver = target.driver();
    let outcome = poll_until(policy, move || async move {
        let set = target.resolve().await?;
        if predicate.holds(driver, &set).await? {
            Ok(Attempt::Done(set))
        } else {
            Ok(Attempt::Retry(set))
        }
    })
    .await?;

    match outcome {
        PollOutcome::Done(set) => {
            debug!("{} should {}: ok", target.describe_target(), predicate);
            Ok(set)
        }
        PollOutcome::TimedOut { last, attempts, .. } => {
            let observed = Observation::capture(driver, &last).await;
            debug!("{} should {}: failed after {} attempt(s)", target.describe_target(), predicate, attempts);
            Err(E2eError::AssertionTimeout {
                selector: target.describe_target(),
                predicate: predicate.to_string(),
                timeout_ms: policy.timeout.as_millis() as u64,
                observed: observed.to_string(),
            })
        }
    }
}

//! Interaction dispatcher
//!
//! Clicks go to exactly one element that is visible and attached. The
//! dispatcher only delivers the event; whatever the page does in response
//! is checked by later assertions.

use tracing::{debug, warn};

use crate::assertion::Observation;
use crate::driver::{ElementHandle, ElementSet};
use crate::error::{E2eError, E2eResult};
use crate::scope::Resolve;
use crate::wait::{poll_until, Attempt, PollOutcome, PollPolicy};

/// Why a target was not clickable yet
enum Blocker {
    Missing(ElementSet),
    Hidden,
}

/// Wait until `target` resolves to exactly one visible element
async fn actionable(target: &dyn Resolve, policy: &PollPolicy) -> E2eResult<ElementHandle> {
    let driver = target.driver();
    let outcome = poll_until(policy, move || async move {
        let set = target.resolve().await?;
        match set.len() {
            0 => Ok(Attempt::Retry(Blocker::Missing(set))),
            1 => {
                let element = set.elements[0].clone();
                match driver.is_visible(&element).await {
                    Ok(true) => Ok(Attempt::Done(element)),
                    Ok(false) => Ok(Attempt::Retry(Blocker::Hidden)),
                    Err(e) if e.is_detached() => Ok(Attempt::Retry(Blocker::Missing(set))),
                    Err(e) => Err(e),
                }
            }
            count => Err(E2eError::AmbiguousTarget {
                selector: target.describe_target(),
                count,
            }),
        }
    })
    .await?;

    match outcome {
        PollOutcome::Done(element) => Ok(element),
        PollOutcome::TimedOut { last: Blocker::Missing(set), .. } => {
            let observed = Observation::capture(driver, &set).await;
            Err(E2eError::AssertionTimeout {
                selector: target.describe_target(),
                predicate: "exist for click".to_string(),
                timeout_ms: policy.timeout.as_millis() as u64,
                observed: observed.to_string(),
            })
        }
        PollOutcome::TimedOut { last: Blocker::Hidden, elapsed, .. } => Err(E2eError::NotActionable {
            selector: target.describe_target(),
            reason: format!("still not visible after {} ms", elapsed.as_millis()),
        }),
    }
}

/// Click the single element `target` resolves to.
///
/// If the element is replaced between resolution and dispatch it is
/// re-resolved and the click retried once.
pub async fn click(target: &dyn Resolve, policy: &PollPolicy) -> E2eResult<()> {
    let driver = target.driver();
    let mut retried = false;

    loop {
        let element = actionable(target, policy).await?;
        match driver.dispatch_click(&element).await {
            Ok(()) => {
                debug!("Clicked {}", target.describe_target());
                return Ok(());
            }
            Err(e) if e.is_detached() && !retried => {
                warn!("{} detached before click; re-resolving", target.describe_target());
                retried = true;
            }
            Err(E2eError::DetachedElement { .. }) => {
                return Err(E2eError::DetachedElement {
                    selector: target.describe_target(),
                });
            }
            Err(E2eError::NotActionable { reason, .. }) => {
                return Err(E2eError::NotActionable {
                    selector: target.describe_target(),
                    reason,
                });
            }
            Err(e) => return Err(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::config::HarnessConfig;
    use crate::error::E2eError;
    use crate::fixture;
    use crate::memory::{Faults, MemoryFactory};
    use crate::session::SessionController;
    use std::sync::Arc;
    use std::time::Duration;

    const BASE: &str = "http://shop.test/";

    fn controller(factory: MemoryFactory) -> SessionController {
        let config = HarnessConfig {
            base_url: BASE.to_string(),
            ..Default::default()
        };
        SessionController::new(Arc::new(factory), config).unwrap()
    }

    #[tokio::test(start_paused = true)]
    async fn test_click_selects_category() {
        let page = controller(fixture::storefront(BASE)).begin(BASE).await.unwrap();
        let list = page.within(r#"[data-testid="categories-list"]"#).unwrap();

        list.get(r#"[data-elementid="electronics"]"#).unwrap().click().await.unwrap();

        list.get(r#"[data-elementid="electronics"]"#)
            .unwrap()
            .should_have_attribute("data-selected", "true")
            .await
            .unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_click_on_many_is_ambiguous() {
        let page = controller(fixture::storefront(BASE)).begin(BASE).await.unwrap();
        let err = page
            .get(r#"[data-testid="category-item"]"#)
            .unwrap()
            .click()
            .await
            .unwrap_err();

        match err {
            E2eError::AmbiguousTarget { count, .. } => assert_eq!(count, 4),
            other => panic!("expected AmbiguousTarget, got {other}"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_click_on_nothing_times_out() {
        let page = controller(fixture::storefront(BASE)).begin(BASE).await.unwrap();
        let err = page
            .get(r#"[data-elementid="books"]"#)
            .unwrap()
            .timeout(Duration::from_millis(200))
            .click()
            .await
            .unwrap_err();

        assert!(matches!(err, E2eError::AssertionTimeout { timeout_ms: 200, .. }));
    }

    #[tokio::test(start_paused = true)]
    async fn test_detached_click_is_retried_once() {
        let factory = fixture::storefront(BASE).with_faults(Faults { stale_clicks: 1, ..Default::default() });
        let page = controller(factory).begin(BASE).await.unwrap();

        page.get(r#"[data-elementid="jewelery"]"#).unwrap().click().await.unwrap();
        page.get(r#"[data-selected="true"]"#)
            .unwrap()
            .should_have_attribute("data-elementid", "jewelery")
            .await
            .unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_detached_twice_fails() {
        let factory = fixture::storefront(BASE).with_faults(Faults { stale_clicks: 2, ..Default::default() });
        let page = controller(factory).begin(BASE).await.unwrap();

        let err = page
            .get(r#"[data-elementid="jewelery"]"#)
            .unwrap()
            .click()
            .await
            .unwrap_err();

        match err {
            E2eError::DetachedElement { selector } => {
                assert_eq!(selector, r#"[data-elementid="jewelery"]"#)
            }
            other => panic!("expected DetachedElement, got {other}"),
        }
    }
}

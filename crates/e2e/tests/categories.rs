//! Category selection on the storefront
//!
//! Every scenario starts from a freshly loaded page. The in-process variants
//! always run; the live variants drive a real browser through WebDriver and
//! are ignored by default:
//!
//! cargo test --package storefront-e2e --test categories -- --ignored

use std::sync::Arc;

use storefront_e2e::fixture;
use storefront_e2e::webdriver::WebDriverFactory;
use storefront_e2e::{E2eError, E2eResult, HarnessConfig, Page, SessionController};

const CATEGORIES_LIST: &str = r#"[data-testid="categories-list"]"#;
const CATEGORY_ITEM: &str = r#"[data-testid="category-item"]"#;
const PRODUCT_LINK: &str = r#"[data-testid="product-link"]"#;
const SELECTED: &str = r#"[data-selected="true"]"#;
const UNSELECTED: &str = r#"[data-selected="false"]"#;
const ELECTRONICS: &str = r#"[data-elementid="electronics"]"#;
const JEWELERY: &str = r#"[data-elementid="jewelery"]"#;

fn in_process() -> SessionController {
    let config = HarnessConfig::default();
    let factory = fixture::storefront(config.base_url.clone());
    SessionController::new(Arc::new(factory), config).expect("valid default config")
}

fn live() -> SessionController {
    let config = HarnessConfig::default()
        .apply_env()
        .expect("valid STOREFRONT_E2E_* overrides");
    let factory = WebDriverFactory::new(&config).expect("webdriver capabilities");
    SessionController::new(Arc::new(factory), config).expect("valid config")
}

/// Load the page fresh, like a `beforeEach`
async fn visit(controller: &SessionController) -> E2eResult<Page> {
    let url = controller.config().base_url.clone();
    controller.begin(&url).await
}

async fn starts_with_no_categories_selected(controller: &SessionController) -> E2eResult<()> {
    let page = visit(controller).await?;
    let list = page.within(CATEGORIES_LIST)?;

    list.get(CATEGORY_ITEM)?.should_have_length(4).await?;
    list.get(UNSELECTED)?.should_have_length(4).await?;

    page.close().await
}

async fn selecting_a_category_filters_the_list(controller: &SessionController) -> E2eResult<()> {
    let page = visit(controller).await?;
    let list = page.within(CATEGORIES_LIST)?;

    list.get(UNSELECTED)?.should_have_length(4).await?;
    page.get(PRODUCT_LINK)?.should_have_length(20).await?;

    list.get(ELECTRONICS)?.click().await?;
    list.get(SELECTED)?.should_have_length(1).await?;
    list.get(UNSELECTED)?.should_have_length(3).await?;

    page.get(PRODUCT_LINK)?.should_have_length(6).await?;

    page.close().await
}

async fn selecting_a_new_category_deselects_the_old_one(controller: &SessionController) -> E2eResult<()> {
    let page = visit(controller).await?;
    let list = page.within(CATEGORIES_LIST)?;

    list.get(SELECTED)?.should_not_exist().await?;

    list.get(ELECTRONICS)?.click().await?;
    list.get(SELECTED)?.should_have_length(1).await?;

    let jewelery = list.get(JEWELERY)?;
    jewelery.should_be_visible().await?;
    jewelery.click().await?;

    // Settling is the assertion's job: it polls until the old selection is gone
    jewelery.should_have_attribute("data-selected", "true").await?;
    list.get(SELECTED)?.should_have_length(1).await?;
    list.get(UNSELECTED)?.should_have_length(3).await?;
    list.get(ELECTRONICS)?
        .should_have_attribute("data-selected", "false")
        .await?;

    page.close().await
}

#[tokio::test]
async fn starts_with_no_categories_selected_in_process() {
    starts_with_no_categories_selected(&in_process()).await.unwrap();
}

#[tokio::test]
async fn selecting_a_category_filters_the_list_in_process() {
    selecting_a_category_filters_the_list(&in_process()).await.unwrap();
}

#[tokio::test]
async fn selecting_a_new_category_deselects_the_old_one_in_process() {
    selecting_a_new_category_deselects_the_old_one(&in_process()).await.unwrap();
}

#[tokio::test]
async fn wrong_expectation_reports_last_observed_state() {
    let controller = in_process();
    let page = visit(&controller).await.unwrap();

    let err = page
        .get(PRODUCT_LINK)
        .unwrap()
        .timeout(std::time::Duration::from_millis(150))
        .should_have_length(19)
        .await
        .unwrap_err();

    match err {
        E2eError::AssertionTimeout { selector, predicate, observed, .. } => {
            assert_eq!(selector, PRODUCT_LINK);
            assert_eq!(predicate, "have length 19");
            assert!(observed.starts_with("20 elements: <a "), "{observed}");
        }
        other => panic!("expected AssertionTimeout, got {other}"),
    }
}

/// Requires a WebDriver endpoint (e.g. `chromedriver --port=4444`) and network access.
#[tokio::test]
#[ignore]
async fn starts_with_no_categories_selected_live() {
    starts_with_no_categories_selected(&live()).await.unwrap();
}

#[tokio::test]
#[ignore]
async fn selecting_a_category_filters_the_list_live() {
    selecting_a_category_filters_the_list(&live()).await.unwrap();
}

#[tokio::test]
#[ignore]
async fn selecting_a_new_category_deselects_the_old_one_live() {
    selecting_a_new_category_deselects_the_old_one(&live()).await.unwrap();
}

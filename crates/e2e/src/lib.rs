//! Storefront E2E Test Harness
//!
//! End-to-end tests for the storefront categories page, written against a
//! small browser capability interface rather than a specific browser:
//! - Opens a fresh page context and waits for load before every test case
//! - Restricts queries to descendants of a scope root (`within`)
//! - Re-resolves and polls every assertion until it holds or times out
//! - Clicks exactly one visible element, re-resolving once if it went stale
//! - Runs declarative YAML suites strictly one test case at a time
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                    E2E Test Runner (Rust)                   │
//! ├─────────────────────────────────────────────────────────────┤
//! │  TestRunner                                                 │
//! │    └── run_case(case) -> TestResult                         │
//! │          └── SessionController::begin(url) -> Page          │
//! │                └── Page / Scope                             │
//! │                      └── Query                              │
//! │                            ├── should(Predicate)  (poll)    │
//! │                            └── click()            (poll)    │
//! ├─────────────────────────────────────────────────────────────┤
//! │  BrowserDriver                                              │
//! │    ├── WebDriverSession  (WebDriver via thirtyfour)         │
//! │    └── MemoryBrowser     (in-process DOM + PageModel)       │
//! └─────────────────────────────────────────────────────────────┘
//! ```

pub mod assertion;
pub mod config;
pub mod driver;
pub mod error;
pub mod fixture;
pub mod interaction;
pub mod memory;
pub mod runner;
pub mod scope;
pub mod selector;
pub mod session;
pub mod spec;
pub mod wait;
pub mod webdriver;

pub use assertion::Predicate;
pub use config::HarnessConfig;
pub use driver::{BrowserDriver, DriverFactory, ElementHandle, ElementSet};
pub use error::{E2eError, E2eResult};
pub use runner::{RunReport, TestRunner};
pub use scope::{Query, Resolve, Scope};
pub use selector::Selector;
pub use session::{Page, SessionController};
pub use spec::{TestCase, TestStep, TestSuite};

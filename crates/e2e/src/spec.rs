//! Declarative YAML test suites

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

use crate::assertion::Predicate;
use crate::error::{E2eError, E2eResult};
use crate::selector::Selector;

/// A suite of test cases that all start from the same page
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TestSuite {
    /// Unique name for this suite
    pub name: String,

    /// Human-readable description
    #[serde(default)]
    pub description: String,

    /// Path (or absolute URL) loaded before every test case, resolved
    /// against `base_url`
    #[serde(default)]
    pub visit: String,

    /// Tags for filtering suites
    #[serde(default)]
    pub tags: Vec<String>,

    pub tests: Vec<TestCase>,
}

/// One independent test case
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TestCase {
    pub name: String,

    /// Steps to execute in order
    pub steps: Vec<TestStep>,
}

/// A single step in a test case
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum TestStep {
    /// Run nested steps with queries restricted to `selector`
    Within {
        selector: Selector,
        steps: Vec<TestStep>,
    },

    /// Assert something about the elements matching `selector`
    Assert {
        selector: Selector,
        #[serde(default)]
        length: Option<usize>,
        #[serde(default)]
        exists: Option<bool>,
        #[serde(default)]
        visible: bool,
        #[serde(default)]
        attribute: Option<AttributeAssertion>,
        #[serde(default)]
        timeout_ms: Option<u64>,
    },

    /// Click the single element matching `selector`
    Click {
        selector: Selector,
        #[serde(default)]
        timeout_ms: Option<u64>,
    },

    /// Log a message (for debugging)
    Log {
        message: String,
    },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AttributeAssertion {
    pub name: String,
    pub value: String,
}

impl TestStep {
    /// Short name used in results, e.g. `assert:[data-selected="true"]`
    pub fn name(&self) -> String {
        match self {
            TestStep::Within { selector, .. } => format!("within:{}", selector),
            TestStep::Assert { selector, .. } => format!("assert:{}", selector),
            TestStep::Click { selector, .. } => format!("click:{}", selector),
            TestStep::Log { message } => {
                let short: String = message.chars().take(30).collect();
                format!("log:{}", short)
            }
        }
    }

    /// Predicates of an `assert` step, in the order they are checked
    pub fn predicates(&self) -> Vec<Predicate> {
        let TestStep::Assert { length, exists, visible, attribute, .. } = self else {
            return Vec::new();
        };
        let mut predicates = Vec::new();
        match exists {
            Some(true) => predicates.push(Predicate::Exist),
            Some(false) => predicates.push(Predicate::NotExist),
            None => {}
        }
        if let Some(n) = length {
            predicates.push(Predicate::HaveLength(*n));
        }
        if *visible {
            predicates.push(Predicate::BeVisible);
        }
        if let Some(attr) = attribute {
            predicates.push(Predicate::HaveAttribute {
                name: attr.name.clone(),
                value: attr.value.clone(),
            });
        }
        predicates
    }

    /// Per-step timeout override
    pub fn timeout(&self) -> Option<Duration> {
        match self {
            TestStep::Assert { timeout_ms, .. } | TestStep::Click { timeout_ms, .. } => {
                timeout_ms.map(Duration::from_millis)
            }
            _ => None,
        }
    }

    fn validate(&self, case: &str) -> E2eResult<()> {
        match self {
            TestStep::Assert { exists: Some(false), length: Some(n), .. } if *n > 0 => {
                Err(E2eError::SpecParse(format!(
                    "{}: {} asks for exists: false and length: {}",
                    case,
                    self.name(),
                    n
                )))
            }
            TestStep::Assert { .. } if self.predicates().is_empty() => Err(E2eError::SpecParse(format!(
                "{}: {} has nothing to assert",
                case,
                self.name()
            ))),
            TestStep::Within { steps, .. } => steps.iter().try_for_each(|s| s.validate(case)),
            _ => Ok(()),
        }
    }
}

impl TestSuite {
    /// Parse a suite from YAML string
    pub fn from_yaml(yaml: &str) -> E2eResult<Self> {
        let suite: Self = serde_yaml::from_str(yaml)?;
        suite.validate()?;
        Ok(suite)
    }

    /// Parse a suite from a YAML file
    pub fn from_file(path: &Path) -> E2eResult<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml(&content)
            .map_err(|e| E2eError::SpecParse(format!("{}: {}", path.display(), e)))
    }

    /// Load one file, or every `.yaml`/`.yml` file under a directory
    pub fn load_all(path: &Path) -> E2eResult<Vec<Self>> {
        if path.is_file() {
            return Ok(vec![Self::from_file(path)?]);
        }

        let mut files: Vec<_> = walkdir::WalkDir::new(path)
            .into_iter()
            .filter_map(|e| e.ok())
            .filter(|e| {
                e.path()
                    .extension()
                    .map(|ext| ext == "yaml" || ext == "yml")
                    .unwrap_or(false)
            })
            .map(|e| e.into_path())
            .collect();
        files.sort();

        files.iter().map(|f| Self::from_file(f)).collect()
    }

    /// Filter suites by tag
    pub fn filter_by_tag<'a>(suites: &'a [Self], tag: &str) -> Vec<&'a Self> {
        suites.iter().filter(|s| s.tags.iter().any(|t| t == tag)).collect()
    }

    pub fn validate(&self) -> E2eResult<()> {
        if self.tests.is_empty() {
            return Err(E2eError::SpecParse(format!("suite {} has no tests", self.name)));
        }
        for case in &self.tests {
            for step in &case.steps {
                step.validate(&case.name)?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const CATEGORIES: &str = r#"
name: categories
description: Category selection filters the product list
visit: /
tags:
  - smoke
tests:
  - name: starts with no categories selected
    steps:
      - action: within
        selector: '[data-testid="categories-list"]'
        steps:
          - action: assert
            selector: '[data-testid="category-item"]'
            length: 4
          - action: assert
            selector: '[data-selected="false"]'
            length: 4
  - name: selecting a category filters the list
    steps:
      - action: click
        selector: '[data-elementid="electronics"]'
        timeout_ms: 8000
      - action: assert
        selector: '[data-testid="product-link"]'
        length: 6
"#;

    #[test]
    fn test_parse_suite() {
        let suite = TestSuite::from_yaml(CATEGORIES).unwrap();
        assert_eq!(suite.name, "categories");
        assert_eq!(suite.tests.len(), 2);

        let TestStep::Within { selector, steps } = &suite.tests[0].steps[0] else {
            panic!("expected a within step");
        };
        assert_eq!(selector, &Selector::test_id("categories-list"));
        assert_eq!(steps[1].predicates(), vec![Predicate::HaveLength(4)]);

        let click = &suite.tests[1].steps[0];
        assert_eq!(click.name(), r#"click:[data-elementid="electronics"]"#);
        assert_eq!(click.timeout(), Some(Duration::from_millis(8000)));
    }

    #[test]
    fn test_predicates_combine_in_order() {
        let step: TestStep = serde_yaml::from_str(
            r#"
action: assert
selector: '[data-elementid="jewelery"]'
exists: true
visible: true
attribute:
  name: data-selected
  value: "true"
"#,
        )
        .unwrap();
        assert_eq!(
            step.predicates(),
            vec![
                Predicate::Exist,
                Predicate::BeVisible,
                Predicate::HaveAttribute {
                    name: "data-selected".into(),
                    value: "true".into()
                },
            ]
        );
    }

    #[test]
    fn test_empty_assert_is_rejected() {
        let yaml = r#"
name: broken
tests:
  - name: nothing to check
    steps:
      - action: assert
        selector: '[data-testid="product-link"]'
"#;
        assert!(matches!(TestSuite::from_yaml(yaml), Err(E2eError::SpecParse(_))));
    }

    #[test]
    fn test_contradictory_assert_is_rejected() {
        let yaml = r#"
name: broken
tests:
  - name: both
    steps:
      - action: within
        selector: '[data-testid="categories-list"]'
        steps:
          - action: assert
            selector: '[data-selected="true"]'
            exists: false
            length: 1
"#;
        assert!(matches!(TestSuite::from_yaml(yaml), Err(E2eError::SpecParse(_))));
    }

    #[test]
    fn test_bad_selector_fails_parse() {
        let yaml = r#"
name: broken
tests:
  - name: bad
    steps:
      - action: click
        selector: '[data-elementid="electronics"'
"#;
        assert!(TestSuite::from_yaml(yaml).is_err());
    }

    #[test]
    fn test_sleep_is_not_a_step() {
        let yaml = r#"
name: sleepy
tests:
  - name: waits
    steps:
      - action: sleep
        ms: 1000
"#;
        assert!(TestSuite::from_yaml(yaml).is_err());
    }

    #[test]
    fn test_load_all_from_directory() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("b.yaml"), CATEGORIES.replace("name: categories", "name: b")).unwrap();
        std::fs::write(dir.path().join("a.yml"), CATEGORIES.replace("name: categories", "name: a")).unwrap();
        std::fs::write(dir.path().join("notes.txt"), "not a suite").unwrap();

        let suites = TestSuite::load_all(dir.path()).unwrap();
        let names: Vec<_> = suites.iter().map(|s| s.name.as_str()).collect();
        assert_eq!(names, vec!["a", "b"]);
        assert_eq!(TestSuite::filter_by_tag(&suites, "smoke").len(), 2);
    }
}

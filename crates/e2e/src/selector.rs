//! Attribute selectors
//!
//! Tests address the page through `data-*` attributes rather than CSS
//! classes or ids, so styling changes never break a test. The grammar is a
//! small CSS subset: compound selectors (`li[data-testid="category-item"]`)
//! joined by whitespace as descendant combinators.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::{E2eError, E2eResult};

static TOKEN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r#"^(?:(?P<tag>[A-Za-z][A-Za-z0-9-]*)|#(?P<id>[\w-]+)|\.(?P<class>[\w-]+)|\[\s*(?P<attr>[A-Za-z_][\w:.-]*)\s*(?:=\s*(?:"(?P<dq>(?:[^"\\]|\\.)*)"|'(?P<sq>(?:[^'\\]|\\.)*)'|(?P<bare>[\w-]+))\s*)?\])"#,
    )
    .expect("selector token regex")
});

/// A parsed selector: one or more compounds joined by descendant combinators
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Selector {
    compounds: Vec<Compound>,
}

/// A single compound selector such as `li[data-selected="true"]`
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct Compound {
    pub tag: Option<String>,
    pub id: Option<String>,
    pub classes: Vec<String>,
    pub attributes: Vec<AttributeFilter>,
}

/// `[name]` or `[name="value"]`
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct AttributeFilter {
    pub name: String,
    pub value: Option<String>,
}

/// Anything a selector can be matched against
pub trait Matchable {
    fn tag_name(&self) -> &str;
    fn attribute(&self, name: &str) -> Option<&str>;
}

impl Selector {
    pub fn parse(input: &str) -> E2eResult<Self> {
        let invalid = |reason: &str| E2eError::InvalidSelector {
            selector: input.to_string(),
            reason: reason.to_string(),
        };

        let source = input.trim();
        if source.is_empty() {
            return Err(invalid("empty selector"));
        }

        let mut compounds = Vec::new();
        let mut current = Compound::default();
        let mut rest = source;

        while !rest.is_empty() {
            let trimmed = rest.trim_start();
            if trimmed.len() != rest.len() {
                // Descendant combinator
                compounds.push(std::mem::take(&mut current));
                rest = trimmed;
                continue;
            }

            let caps = TOKEN
                .captures(rest)
                .ok_or_else(|| invalid(&format!("unexpected input at {:?}", rest)))?;

            if let Some(tag) = caps.name("tag") {
                if !current.is_empty() {
                    return Err(invalid("tag name must start a compound selector"));
                }
                current.tag = Some(tag.as_str().to_ascii_lowercase());
            } else if let Some(id) = caps.name("id") {
                current.id = Some(id.as_str().to_string());
            } else if let Some(class) = caps.name("class") {
                current.classes.push(class.as_str().to_string());
            } else if let Some(attr) = caps.name("attr") {
                let value = caps
                    .name("dq")
                    .or_else(|| caps.name("sq"))
                    .map(|m| unescape(m.as_str()))
                    .or_else(|| caps.name("bare").map(|m| m.as_str().to_string()));
                current.attributes.push(AttributeFilter {
                    name: attr.as_str().to_ascii_lowercase(),
                    value,
                });
            }

            rest = &rest[caps[0].len()..];
        }
        compounds.push(current);

        Ok(Self { compounds })
    }

    /// `[data-testid="<id>"]`
    pub fn test_id(id: &str) -> Self {
        Self::attr("data-testid", id)
    }

    /// `[<name>="<value>"]`
    pub fn attr(name: &str, value: &str) -> Self {
        Self {
            compounds: vec![Compound {
                attributes: vec![AttributeFilter {
                    name: name.to_ascii_lowercase(),
                    value: Some(value.to_string()),
                }],
                ..Default::default()
            }],
        }
    }

    pub fn compounds(&self) -> &[Compound] {
        &self.compounds
    }

    /// The right-most compound, which is what a match actually returns
    pub fn subject(&self) -> &Compound {
        // parse() and the constructors never produce an empty list
        &self.compounds[self.compounds.len() - 1]
    }

    /// True when no part of the selector relies on ids or classes
    pub fn is_attribute_based(&self) -> bool {
        self.compounds
            .iter()
            .all(|c| c.id.is_none() && c.classes.is_empty() && !c.attributes.is_empty())
    }
}

/// Drop the backslash from every `\X` pair in a quoted value
fn unescape(quoted: &str) -> String {
    let mut out = String::with_capacity(quoted.len());
    let mut chars = quoted.chars();
    while let Some(c) = chars.next() {
        match c {
            '\\' => out.extend(chars.next()),
            c => out.push(c),
        }
    }
    out
}

impl Compound {
    fn is_empty(&self) -> bool {
        self.tag.is_none() && self.id.is_none() && self.classes.is_empty() && self.attributes.is_empty()
    }

    pub fn matches<M: Matchable + ?Sized>(&self, element: &M) -> bool {
        if let Some(tag) = &self.tag {
            if !element.tag_name().eq_ignore_ascii_case(tag) {
                return false;
            }
        }
        if let Some(id) = &self.id {
            if element.attribute("id") != Some(id.as_str()) {
                return false;
            }
        }
        if !self.classes.is_empty() {
            let class_attr = element.attribute("class").unwrap_or("");
            let present: Vec<&str> = class_attr.split_whitespace().collect();
            if !self.classes.iter().all(|c| present.contains(&c.as_str())) {
                return false;
            }
        }
        self.attributes.iter().all(|filter| match (&filter.value, element.attribute(&filter.name)) {
            (_, None) => false,
            (None, Some(_)) => true,
            (Some(expected), Some(actual)) => expected == actual,
        })
    }
}

impl fmt::Display for Compound {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(tag) = &self.tag {
            f.write_str(tag)?;
        }
        if let Some(id) = &self.id {
            write!(f, "#{}", id)?;
        }
        for class in &self.classes {
            write!(f, ".{}", class)?;
        }
        for attr in &self.attributes {
            match &attr.value {
                Some(value) => {
                    let escaped = value.replace('\\', "\\\\").replace('"', "\\\"");
                    write!(f, "[{}=\"{}\"]", attr.name, escaped)?;
                }
                None => write!(f, "[{}]", attr.name)?,
            }
        }
        Ok(())
    }
}

impl fmt::Display for Selector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, compound) in self.compounds.iter().enumerate() {
            if i > 0 {
                f.write_str(" ")?;
            }
            write!(f, "{}", compound)?;
        }
        Ok(())
    }
}

impl FromStr for Selector {
    type Err = E2eError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for Selector {
    type Error = E2eError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<Selector> for String {
    fn from(selector: Selector) -> Self {
        selector.to_string()
    }
}

/// Conversion used by the query APIs so callers can pass `&str` or a `Selector`
pub trait IntoSelector {
    fn into_selector(self) -> E2eResult<Selector>;
}

impl IntoSelector for Selector {
    fn into_selector(self) -> E2eResult<Selector> {
        Ok(self)
    }
}

impl IntoSelector for &Selector {
    fn into_selector(self) -> E2eResult<Selector> {
        Ok(self.clone())
    }
}

impl IntoSelector for &str {
    fn into_selector(self) -> E2eResult<Selector> {
        Selector::parse(self)
    }
}

impl IntoSelector for String {
    fn into_selector(self) -> E2eResult<Selector> {
        Selector::parse(&self)
    }
}

/// Which selectors a page accepts
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SelectorPolicy {
    /// Every compound must carry an attribute filter and no id/class
    #[default]
    AttributesOnly,
    Any,
}

impl SelectorPolicy {
    pub fn check(&self, selector: &Selector) -> E2eResult<()> {
        match self {
            SelectorPolicy::Any => Ok(()),
            SelectorPolicy::AttributesOnly if selector.is_attribute_based() => Ok(()),
            SelectorPolicy::AttributesOnly => Err(E2eError::SelectorPolicy {
                selector: selector.to_string(),
            }),
        }
    }
}

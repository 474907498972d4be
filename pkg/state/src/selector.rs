use anyhow::{Result, bail};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use pkg_types::meta::Resource;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Operator {
    Equals,
    NotEquals,
    Exists,
    DoesNotExist,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Requirement {
    pub key: String,
    pub operator: Operator,
    pub value: String,
}

impl Requirement {
    fn matches(&self, values: &HashMap<String, String>) -> bool {
        let current = values.get(&self.key);
        match self.operator {
            Operator::Equals => current == Some(&self.value),
            Operator::NotEquals => current != Some(&self.value),
            Operator::Exists => current.is_some(),
            Operator::DoesNotExist => current.is_none(),
        }
    }
}

/// Equality-based selector over labels or fields: `a=b,c!=d,e,!f`.
///
/// An empty selector matches everything.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Selector {
    requirements: Vec<Requirement>,
}

impl Selector {
    pub fn everything() -> Self {
        Self::default()
    }

    pub fn parse(expr: &str) -> Result<Self> {
        let mut requirements = Vec::new();
        for raw in expr.split(',') {
            let term = raw.trim();
            if term.is_empty() {
                continue;
            }

            let requirement = if let Some(key) = term.strip_prefix('!') {
                Requirement {
                    key: key.trim().to_string(),
                    operator: Operator::DoesNotExist,
                    value: String::new(),
                }
            } else if let Some((key, value)) = term.split_once("!=") {
                Requirement {
                    key: key.trim().to_string(),
                    operator: Operator::NotEquals,
                    value: value.trim().to_string(),
                }
            } else if let Some((key, value)) = term
                .split_once("==")
                .or_else(|| term.split_once('='))
            {
                Requirement {
                    key: key.trim().to_string(),
                    operator: Operator::Equals,
                    value: value.trim().to_string(),
                }
            } else {
                Requirement {
                    key: term.to_string(),
                    operator: Operator::Exists,
                    value: String::new(),
                }
            };

            if requirement.key.is_empty() {
                bail!("invalid selector term '{}': empty key", term);
            }
            requirements.push(requirement);
        }
        Ok(Self { requirements })
    }

    pub fn is_empty(&self) -> bool {
        self.requirements.is_empty()
    }

    pub fn requirements(&self) -> &[Requirement] {
        &self.requirements
    }

    pub fn matches(&self, values: &HashMap<String, String>) -> bool {
        self.requirements.iter().all(|r| r.matches(values))
    }
}

impl FromStr for Selector {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl fmt::Display for Selector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let terms: Vec<String> = self
            .requirements
            .iter()
            .map(|r| match r.operator {
                Operator::Equals => format!("{}={}", r.key, r.value),
                Operator::NotEquals => format!("{}!={}", r.key, r.value),
                Operator::Exists => r.key.clone(),
                Operator::DoesNotExist => format!("!{}", r.key),
            })
            .collect();
        write!(f, "{}", terms.join(","))
    }
}

/// Label and field selector expressions for a list or watch call.
///
/// The cache passes these through untouched; only the source interprets them.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ListOptions {
    pub label_selector: Option<String>,
    pub field_selector: Option<String>,
}

impl ListOptions {
    pub fn with_label_selector(mut self, selector: Option<String>) -> Self {
        self.label_selector = selector.filter(|s| !s.is_empty());
        self
    }

    /// Append `selector` to the field selector, comma-separated.
    pub fn append_field_selector(mut self, selector: &str) -> Self {
        self.field_selector = Some(match self.field_selector.take() {
            Some(existing) if !existing.is_empty() => format!("{},{}", existing, selector),
            _ => selector.to_string(),
        });
        self
    }
}

/// Parsed form of `ListOptions`, applied to objects by a source.
#[derive(Debug, Clone, Default)]
pub struct ObjectFilter {
    labels: Selector,
    fields: Selector,
}

impl ObjectFilter {
    pub fn from_options(options: &ListOptions) -> Result<Self> {
        let labels = match &options.label_selector {
            Some(s) => Selector::parse(s)?,
            None => Selector::everything(),
        };
        let fields = match &options.field_selector {
            Some(s) => Selector::parse(s)?,
            None => Selector::everything(),
        };
        Ok(Self { labels, fields })
    }

    pub fn admits<K: Resource>(&self, obj: &K) -> bool {
        self.labels.matches(obj.labels()) && (self.fields.is_empty() || self.fields.matches(&obj.fields()))
    }
}

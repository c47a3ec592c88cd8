//! Expected and observed entities
//!
//! Both sides address attributes by dotted path (`master_auth.username`,
//! `config.shielded_instance_config.enable_secure_boot`). Numeric segments
//! index into lists on the observed side.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;

/// Whether list comparison cares about element order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Order {
    /// Elements must appear in the same order
    #[default]
    Sensitive,
    /// Elements are compared as a multiset
    Insensitive,
}

/// Comparator rule for one attribute
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "rule", content = "value", rename_all = "snake_case")]
pub enum Expected {
    /// Must be missing or null; an empty string or zero does not qualify
    Absent,
    /// Must be present and non-null, any value
    Present,
    /// Scalar equality (string, number, bool)
    Exact(Value),
    /// Observed string must fully match this regular expression
    Pattern(String),
    /// List with per-element rules
    List {
        /// Element rules
        items: Vec<Expected>,
        /// Ordering policy
        order: Order,
    },
    /// Map with exact key set; `Absent` entries tolerate missing keys
    Map(BTreeMap<String, Expected>),
    /// Observed value must equal one of these
    OneOf(Vec<Value>),
    /// Observed list must contain this element
    Contains(Value),
    /// Observed list, map or string must have this length
    Len(usize),
}

impl Expected {
    /// Rule requiring an observed string to start with a literal prefix
    ///
    /// Used for version checks: `version_prefix("1.27.")` accepts
    /// `"1.27.3-gke.100"`.
    pub fn version_prefix(prefix: &str) -> Self {
        Self::Pattern(format!("{}.*", regex::escape(prefix)))
    }

    /// Convert a declared value, treating any list as a multiset
    pub fn unordered(value: Value) -> Self {
        match Self::from(value) {
            Self::List { items, .. } => Self::List {
                items,
                order: Order::Insensitive,
            },
            other => other,
        }
    }

    /// Whether this rule is the `Absent` sentinel
    pub fn is_absent(&self) -> bool {
        matches!(self, Self::Absent)
    }
}

impl From<Value> for Expected {
    fn from(value: Value) -> Self {
        match value {
            Value::Null => Self::Absent,
            Value::Array(items) => Self::List {
                items: items.into_iter().map(Self::from).collect(),
                order: Order::Sensitive,
            },
            Value::Object(map) => {
                Self::Map(map.into_iter().map(|(k, v)| (k, Self::from(v))).collect())
            }
            scalar => Self::Exact(scalar),
        }
    }
}

impl From<&str> for Expected {
    fn from(value: &str) -> Self {
        Self::Exact(Value::String(value.to_string()))
    }
}

impl From<String> for Expected {
    fn from(value: String) -> Self {
        Self::Exact(Value::String(value))
    }
}

impl From<bool> for Expected {
    fn from(value: bool) -> Self {
        Self::Exact(Value::Bool(value))
    }
}

impl From<i64> for Expected {
    fn from(value: i64) -> Self {
        Self::Exact(Value::from(value))
    }
}

impl From<i32> for Expected {
    fn from(value: i32) -> Self {
        Self::Exact(Value::from(value))
    }
}

impl fmt::Display for Expected {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Absent => write!(f, "<absent>"),
            Self::Present => write!(f, "<present>"),
            Self::Exact(v) => write!(f, "{v}"),
            Self::Pattern(p) => write!(f, "/{p}/"),
            Self::List { items, order } => {
                let parts: Vec<String> = items.iter().map(ToString::to_string).collect();
                match order {
                    Order::Sensitive => write!(f, "[{}]", parts.join(", ")),
                    Order::Insensitive => write!(f, "unordered [{}]", parts.join(", ")),
                }
            }
            Self::Map(entries) => {
                let parts: Vec<String> = entries.iter().map(|(k, v)| format!("{k}: {v}")).collect();
                write!(f, "{{{}}}", parts.join(", "))
            }
            Self::OneOf(values) => {
                let parts: Vec<String> = values.iter().map(ToString::to_string).collect();
                write!(f, "one of [{}]", parts.join(", "))
            }
            Self::Contains(v) => write!(f, "contains {v}"),
            Self::Len(n) => write!(f, "length {n}"),
        }
    }
}

/// Attribute path → expected rule, ordered by path
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExpectedEntity {
    attributes: BTreeMap<String, Expected>,
}

impl ExpectedEntity {
    /// Create an empty entity
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the rule for a path, replacing any earlier rule
    pub fn insert(&mut self, path: impl Into<String>, expected: impl Into<Expected>) {
        self.attributes.insert(path.into(), expected.into());
    }

    /// Builder-style insert
    pub fn with(mut self, path: impl Into<String>, expected: impl Into<Expected>) -> Self {
        self.insert(path, expected);
        self
    }

    /// Rule for a path
    pub fn get(&self, path: &str) -> Option<&Expected> {
        self.attributes.get(path)
    }

    /// Iterate in path order
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Expected)> {
        self.attributes.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Number of attribute rules
    pub fn len(&self) -> usize {
        self.attributes.len()
    }

    /// Whether no attribute is asserted
    pub fn is_empty(&self) -> bool {
        self.attributes.is_empty()
    }
}

/// Observed resource state as reported by an observation provider
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ObservedEntity {
    value: Value,
}

impl ObservedEntity {
    /// Wrap an observed value tree
    pub fn new(value: Value) -> Self {
        Self { value }
    }

    /// Resolve a dotted attribute path
    pub fn get(&self, path: &str) -> Option<&Value> {
        lookup_path(&self.value, path)
    }

    /// Platform-assigned resource name
    pub fn name(&self) -> Option<&str> {
        self.get("name").and_then(Value::as_str)
    }

    /// The whole value tree
    pub fn value(&self) -> &Value {
        &self.value
    }
}

impl From<Value> for ObservedEntity {
    fn from(value: Value) -> Self {
        Self::new(value)
    }
}

/// Walk a dotted path through maps and lists
pub fn lookup_path<'a>(root: &'a Value, path: &str) -> Option<&'a Value> {
    if path.is_empty() {
        return Some(root);
    }
    path.split('.').try_fold(root, |node, segment| match node {
        Value::Object(map) => map.get(segment),
        Value::Array(items) => segment.parse::<usize>().ok().and_then(|i| items.get(i)),
        _ => None,
    })
}

//! Expectation resolver
//!
//! Every attribute a control asserts is described by an [`AttributeRule`]:
//! an ordered list of `(predicate, resolution)` arms. The first arm whose
//! predicate holds decides the expected value; when no arm holds the
//! attribute resolves to [`Expected::Absent`].

use crate::declaration::Declaration;
use crate::entity::{Expected, ExpectedEntity, Order};
use crate::error::{Error, Result};
use crate::flags::{FeatureFlags, Predicate};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;

/// Custom resolution function for attributes that need computation
pub type DeriveFn = fn(&Scope<'_>) -> Result<Expected>;

/// How an arm produces its expected value
#[derive(Clone)]
pub enum Resolution {
    /// The attribute must be missing or null
    Absent,
    /// The attribute is not asserted in this configuration
    Unchecked,
    /// A constant, overriding anything declared
    Fixed(Expected),
    /// A declared setting; missing, null or empty resolves to `Absent`
    Setting {
        /// Setting key (group spec first, then control settings)
        key: &'static str,
        /// Ordering policy when the setting is a list
        order: Order,
    },
    /// A boolean setting: `true` expects `true`, anything else `Absent`
    Switch(&'static str),
    /// A setting that must be declared
    Required(&'static str),
    /// Computed from the scope
    Derive(DeriveFn),
}

impl Resolution {
    /// Order-sensitive setting lookup
    pub fn setting(key: &'static str) -> Self {
        Self::Setting {
            key,
            order: Order::Sensitive,
        }
    }

    /// Setting lookup whose list value is compared as a multiset
    pub fn setting_unordered(key: &'static str) -> Self {
        Self::Setting {
            key,
            order: Order::Insensitive,
        }
    }

    /// Constant expectation
    pub fn fixed(expected: impl Into<Expected>) -> Self {
        Self::Fixed(expected.into())
    }
}

impl fmt::Debug for Resolution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Absent => write!(f, "Absent"),
            Self::Unchecked => write!(f, "Unchecked"),
            Self::Fixed(e) => write!(f, "Fixed({e})"),
            Self::Setting { key, order } => write!(f, "Setting({key}, {order:?})"),
            Self::Switch(key) => write!(f, "Switch({key})"),
            Self::Required(key) => write!(f, "Required({key})"),
            Self::Derive(_) => write!(f, "Derive(..)"),
        }
    }
}

/// One `(predicate, resolution)` pair
#[derive(Debug, Clone)]
pub struct Arm {
    pub when: Predicate,
    pub then: Resolution,
}

/// Ordered resolution arms for one attribute path
#[derive(Debug, Clone)]
pub struct AttributeRule {
    pub path: &'static str,
    pub arms: Vec<Arm>,
}

impl AttributeRule {
    /// Start a rule for a path
    pub fn new(path: &'static str) -> Self {
        Self {
            path,
            arms: Vec::new(),
        }
    }

    /// Rule with a single unconditional resolution
    pub fn always(path: &'static str, then: Resolution) -> Self {
        Self::new(path).otherwise(then)
    }

    /// Add a conditional arm
    pub fn when(mut self, when: Predicate, then: Resolution) -> Self {
        self.arms.push(Arm { when, then });
        self
    }

    /// Add the fallback arm
    pub fn otherwise(self, then: Resolution) -> Self {
        self.when(Predicate::Always, then)
    }

    /// The resolution selected for a flag set
    pub fn select(&self, flags: &FeatureFlags) -> Option<&Resolution> {
        self.arms
            .iter()
            .find(|arm| arm.when.holds(flags))
            .map(|arm| &arm.then)
    }
}

/// The checks of one entity kind
#[derive(Debug, Clone, Default)]
pub struct RuleTable {
    pub kind: String,
    pub rules: Vec<AttributeRule>,
}

impl RuleTable {
    /// Create an empty table for an entity kind
    pub fn new(kind: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            rules: Vec::new(),
        }
    }

    /// Append a rule
    pub fn rule(mut self, rule: AttributeRule) -> Self {
        self.rules.push(rule);
        self
    }

    /// Every attribute path, in table order
    pub fn paths(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.rules.iter().map(|r| r.path)
    }

    /// Number of rules
    pub fn len(&self) -> usize {
        self.rules.len()
    }

    /// Whether the table has no rules
    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }
}

/// Everything a resolution may read
#[derive(Debug, Clone, Copy)]
pub struct Scope<'a> {
    /// The run's declaration
    pub declaration: &'a Declaration,
    /// Active flags (global flags overlaid with group flags)
    pub flags: &'a FeatureFlags,
    /// Control-wide settings
    pub settings: &'a BTreeMap<String, Value>,
    /// Logical group name, when resolving a correlated instance
    pub group_name: Option<&'a str>,
    /// Logical group spec, when resolving a correlated instance
    pub group: Option<&'a Value>,
    /// Observed instance name
    pub instance: &'a str,
}

impl<'a> Scope<'a> {
    /// Look a setting up in the group spec, then in the control settings
    pub fn setting(&self, key: &str) -> Option<&'a Value> {
        self.group
            .and_then(|g| g.get(key))
            .or_else(|| self.settings.get(key))
    }

    /// String setting, treating blank as unset
    pub fn setting_str(&self, key: &str) -> Option<&'a str> {
        self.setting(key)
            .and_then(Value::as_str)
            .filter(|s| !s.trim().is_empty())
    }

    /// Required string setting
    pub fn require_str(&self, key: &str) -> Result<&'a str> {
        self.setting_str(key).ok_or_else(|| Error::MissingKey {
            key: key.to_string(),
        })
    }
}

/// Whether a declared value counts as "not specified"
pub fn is_empty_or_null(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::String(s) => s.is_empty(),
        Value::Array(items) => items.is_empty(),
        Value::Object(map) => map.is_empty(),
        _ => false,
    }
}

/// Resolve one resolution within a scope; `None` means unchecked
pub fn resolve_one(resolution: &Resolution, scope: &Scope<'_>) -> Result<Option<Expected>> {
    let expected = match resolution {
        Resolution::Unchecked => return Ok(None),
        Resolution::Absent => Expected::Absent,
        Resolution::Fixed(expected) => expected.clone(),
        Resolution::Setting { key, order } => match scope.setting(key) {
            Some(value) if !is_empty_or_null(value) => match order {
                Order::Sensitive => Expected::from(value.clone()),
                Order::Insensitive => Expected::unordered(value.clone()),
            },
            _ => Expected::Absent,
        },
        Resolution::Switch(key) => match scope.setting(key) {
            Some(Value::Bool(true)) => Expected::from(true),
            _ => Expected::Absent,
        },
        Resolution::Required(key) => match scope.setting(key) {
            Some(value) if !value.is_null() => Expected::from(value.clone()),
            _ => {
                return Err(Error::MissingKey {
                    key: (*key).to_string(),
                });
            }
        },
        Resolution::Derive(derive) => derive(scope)?,
    };
    Ok(Some(expected))
}

/// Produce the expected entity for one instance
///
/// Deterministic: the same table and scope always yield an equal entity.
pub fn resolve(table: &RuleTable, scope: &Scope<'_>) -> Result<ExpectedEntity> {
    let mut entity = ExpectedEntity::new();
    for rule in &table.rules {
        let expected = match rule.select(scope.flags) {
            Some(resolution) => resolve_one(resolution, scope)?,
            None => Some(Expected::Absent),
        };
        if let Some(expected) = expected {
            entity.insert(rule.path, expected);
        }
    }
    log::trace!(
        "Resolved {} attributes for {} '{}'",
        entity.len(),
        table.kind,
        scope.instance
    );
    Ok(entity)
}

/// Shallow label merge: start from `base`, overlay wins on key collision
pub fn merge_labels(
    base: &BTreeMap<String, String>,
    overlay: &BTreeMap<String, String>,
) -> BTreeMap<String, String> {
    let mut merged = base.clone();
    merged.extend(overlay.iter().map(|(k, v)| (k.clone(), v.clone())));
    merged
}

/// Collect a decoded map of strings; non-string values are stringified
pub fn string_map(value: &Value) -> BTreeMap<String, String> {
    value
        .as_object()
        .map(|map| {
            map.iter()
                .map(|(k, v)| {
                    let v = match v {
                        Value::String(s) => s.clone(),
                        other => other.to_string(),
                    };
                    (k.clone(), v)
                })
                .collect()
        })
        .unwrap_or_default()
}

/// Expected rule for a string map
pub fn expected_string_map(map: &BTreeMap<String, String>) -> Expected {
    Expected::Map(
        map.iter()
            .map(|(k, v)| (k.clone(), Expected::from(v.as_str())))
            .collect(),
    )
}

/// Full override: a present, non-blank override replaces the computed value
pub fn override_value(computed: &str, override_with: Option<&str>) -> String {
    match override_with {
        Some(value) if !value.trim().is_empty() => value.to_string(),
        _ => computed.to_string(),
    }
}

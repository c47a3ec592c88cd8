//! Control definitions

use crate::flags::{FeatureFlags, Predicate};
use crate::resolver::RuleTable;
use serde_json::Value;
use std::collections::BTreeMap;

/// What a control observes
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Target {
    /// Named resources, fetched one by one
    Entities {
        /// Resource kind
        kind: String,
        /// Exact resource names
        names: Vec<String>,
    },
    /// Listed resources correlated exactly against the control's groups
    Groups {
        /// Resource kind
        kind: String,
    },
    /// Listed resources correlated by name prefix; at least one required
    Prefixed {
        /// Resource kind
        kind: String,
        /// Name prefix
        prefix: String,
    },
}

impl Target {
    /// Resource kind this target observes
    pub fn kind(&self) -> &str {
        match self {
            Self::Entities { kind, .. } | Self::Groups { kind } | Self::Prefixed { kind, .. } => {
                kind
            }
        }
    }
}

/// Condition under which a control is not evaluated
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Skip {
    pub when: Predicate,
    pub reason: String,
}

/// A named logical group (for example a declared node pool)
#[derive(Debug, Clone, PartialEq)]
pub struct Group {
    /// Settings consulted before the control-wide settings
    pub spec: Value,
    /// Flags overlaid on the run's global flags
    pub flags: FeatureFlags,
}

/// A named, impact-weighted set of checks
#[derive(Debug, Clone)]
pub struct Control {
    pub id: String,
    pub title: String,
    /// Severity in `[0.0, 1.0]`
    pub impact: f64,
    pub skip: Option<Skip>,
    pub target: Target,
    pub rules: RuleTable,
    /// Control-wide settings read by `Setting` resolutions
    pub settings: BTreeMap<String, Value>,
    /// Logical groups, keyed by logical name
    pub groups: BTreeMap<String, Group>,
}

impl Control {
    /// Create a control with no skip condition, settings or groups
    pub fn new(
        id: impl Into<String>,
        title: impl Into<String>,
        impact: f64,
        target: Target,
        rules: RuleTable,
    ) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            impact,
            skip: None,
            target,
            rules,
            settings: BTreeMap::new(),
            groups: BTreeMap::new(),
        }
    }

    /// Skip the control when a predicate holds
    pub fn skip_when(mut self, when: Predicate, reason: impl Into<String>) -> Self {
        self.skip = Some(Skip {
            when,
            reason: reason.into(),
        });
        self
    }

    /// Add a control-wide setting
    pub fn setting(mut self, key: impl Into<String>, value: Value) -> Self {
        self.settings.insert(key.into(), value);
        self
    }

    /// Replace all control-wide settings
    pub fn with_settings(mut self, settings: BTreeMap<String, Value>) -> Self {
        self.settings = settings;
        self
    }

    /// Add a logical group
    pub fn group(mut self, name: impl Into<String>, spec: Value, flags: FeatureFlags) -> Self {
        self.groups.insert(name.into(), Group { spec, flags });
        self
    }

    /// Skip reason, if the control is skipped under these flags
    pub fn skip_reason(&self, flags: &FeatureFlags) -> Option<&str> {
        self.skip
            .as_ref()
            .filter(|skip| skip.when.holds(flags))
            .map(|skip| skip.reason.as_str())
    }
}

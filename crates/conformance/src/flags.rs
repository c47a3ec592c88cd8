//! Feature flags and the predicates evaluated over them

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Value of a single feature toggle
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Flag {
    /// On/off toggle
    Bool(bool),
    /// One of several named modes (e.g. a release channel)
    Choice(String),
}

/// Named feature toggles extracted from a declaration
///
/// A flag that was never set is "not requested": [`FeatureFlags::enabled`]
/// reports `false` and [`FeatureFlags::choice`] reports `None`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeatureFlags {
    values: BTreeMap<String, Flag>,
}

impl FeatureFlags {
    /// Create an empty flag set
    pub fn new() -> Self {
        Self::default()
    }

    /// Set a boolean flag
    pub fn set_bool(&mut self, name: impl Into<String>, value: bool) -> &mut Self {
        self.values.insert(name.into(), Flag::Bool(value));
        self
    }

    /// Set an enumerated flag
    pub fn set_choice(&mut self, name: impl Into<String>, value: impl Into<String>) -> &mut Self {
        self.values.insert(name.into(), Flag::Choice(value.into()));
        self
    }

    /// Builder-style boolean flag
    pub fn with_bool(mut self, name: impl Into<String>, value: bool) -> Self {
        self.set_bool(name, value);
        self
    }

    /// Builder-style enumerated flag
    pub fn with_choice(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.set_choice(name, value);
        self
    }

    /// Whether a flag is switched on
    ///
    /// A choice flag counts as enabled when it holds a non-blank value.
    pub fn enabled(&self, name: &str) -> bool {
        match self.values.get(name) {
            Some(Flag::Bool(b)) => *b,
            Some(Flag::Choice(c)) => !c.trim().is_empty(),
            None => false,
        }
    }

    /// Current value of an enumerated flag
    pub fn choice(&self, name: &str) -> Option<&str> {
        match self.values.get(name) {
            Some(Flag::Choice(c)) => Some(c.as_str()),
            _ => None,
        }
    }

    /// Get the raw flag
    pub fn get(&self, name: &str) -> Option<&Flag> {
        self.values.get(name)
    }

    /// Combine with another set; flags in `other` win
    pub fn overlay(&self, other: &FeatureFlags) -> FeatureFlags {
        let mut values = self.values.clone();
        values.extend(other.values.iter().map(|(k, v)| (k.clone(), v.clone())));
        FeatureFlags { values }
    }

    /// Iterate over every flag
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Flag)> {
        self.values.iter().map(|(k, v)| (k.as_str(), v))
    }
}

/// Condition over feature flags, kept as data so rule tables stay inspectable
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Predicate {
    /// Always holds
    Always,
    /// Holds when the named flag is enabled
    Enabled(&'static str),
    /// Holds when the named flag is not enabled (including unset)
    Disabled(&'static str),
    /// Holds when the named choice flag equals the value
    Choice(&'static str, &'static str),
    /// Holds when any inner predicate holds
    Any(Vec<Predicate>),
    /// Holds when every inner predicate holds
    All(Vec<Predicate>),
    /// Negation
    Not(Box<Predicate>),
}

impl Predicate {
    /// Shorthand for [`Predicate::Any`] over enabled flags
    pub fn any_enabled(names: &[&'static str]) -> Self {
        Self::Any(names.iter().map(|n| Self::Enabled(*n)).collect())
    }

    /// Negate this predicate
    pub fn negate(self) -> Self {
        Self::Not(Box::new(self))
    }

    /// Evaluate against a flag set
    pub fn holds(&self, flags: &FeatureFlags) -> bool {
        match self {
            Self::Always => true,
            Self::Enabled(name) => flags.enabled(name),
            Self::Disabled(name) => !flags.enabled(name),
            Self::Choice(name, value) => flags.choice(name) == Some(*value),
            Self::Any(inner) => inner.iter().any(|p| p.holds(flags)),
            Self::All(inner) => inner.iter().all(|p| p.holds(flags)),
            Self::Not(inner) => !inner.holds(flags),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_flags_are_not_requested() {
        let flags = FeatureFlags::new();
        assert!(!flags.enabled("autopilot"));
        assert_eq!(flags.choice("release_channel"), None);
    }

    #[test]
    fn test_choice_flags() {
        let flags = FeatureFlags::new()
            .with_choice("release_channel", "STABLE")
            .with_choice("blank", "  ");
        assert_eq!(flags.choice("release_channel"), Some("STABLE"));
        assert!(flags.enabled("release_channel"));
        assert!(!flags.enabled("blank"));
    }

    #[test]
    fn test_overlay_prefers_other() {
        let global = FeatureFlags::new()
            .with_bool("autopilot", false)
            .with_bool("tpu", true);
        let group = FeatureFlags::new().with_bool("autopilot", true);
        let merged = global.overlay(&group);
        assert!(merged.enabled("autopilot"));
        assert!(merged.enabled("tpu"));
    }

    #[test]
    fn test_predicates() {
        let flags = FeatureFlags::new()
            .with_bool("autopilot", true)
            .with_bool("l7_lb", false)
            .with_choice("release_channel", "UNSPECIFIED");

        assert!(Predicate::Always.holds(&flags));
        assert!(Predicate::Enabled("autopilot").holds(&flags));
        assert!(Predicate::Disabled("l7_lb").holds(&flags));
        assert!(Predicate::Disabled("never_set").holds(&flags));
        assert!(Predicate::Choice("release_channel", "UNSPECIFIED").holds(&flags));
        assert!(!Predicate::Choice("release_channel", "STABLE").holds(&flags));
        assert!(Predicate::any_enabled(&["l7_lb", "autopilot"]).holds(&flags));
        assert!(
            !Predicate::All(vec![Predicate::Enabled("autopilot"), Predicate::Enabled("l7_lb")])
                .holds(&flags)
        );
        assert!(Predicate::Enabled("l7_lb").negate().holds(&flags));
    }
}

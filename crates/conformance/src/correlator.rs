//! Resource correlator
//!
//! The platform names instances `<logical-name>-<revision>`. The correlator
//! maps observed names back to the logical names that were declared.

use crate::error::{Error, Result};
use regex::Regex;
use std::collections::BTreeMap;

/// How observed names relate to logical names
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Mode {
    /// Every logical name must match `<name>-<digits>`
    Exact(Vec<String>),
    /// Any name starting with the prefix belongs to the single group
    Prefix(String),
}

/// Compiled matcher for observed instance names
#[derive(Debug, Clone)]
pub struct Correlator {
    mode: Mode,
    pattern: Regex,
}

/// Observed instances grouped by logical name
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Correlation {
    /// Logical name → matching instance names, in candidate order
    pub matches: BTreeMap<String, Vec<String>>,
    /// Prefix mode correlation
    prefix: bool,
}

impl Correlator {
    /// Exact correlation against a set of logical names
    ///
    /// An empty name set compiles to a pattern that matches nothing.
    pub fn exact<I, S>(names: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let names: Vec<String> = names.into_iter().map(Into::into).collect();
        let pattern = if names.is_empty() {
            // matches nothing
            r"$.^".to_string()
        } else {
            let alternatives: Vec<String> = names.iter().map(|n| regex::escape(n)).collect();
            format!(r"^(?:{})-\d+$", alternatives.join("|"))
        };
        Ok(Self {
            pattern: Regex::new(&pattern)?,
            mode: Mode::Exact(names),
        })
    }

    /// Prefix correlation: every name starting with `prefix` is one group
    pub fn prefix(prefix: &str) -> Result<Self> {
        Ok(Self {
            pattern: Regex::new(&format!("^{}", regex::escape(prefix)))?,
            mode: Mode::Prefix(prefix.to_string()),
        })
    }

    /// The compiled expression, as passed to a provider's `list`
    pub fn pattern(&self) -> &str {
        self.pattern.as_str()
    }

    /// Matching mode
    pub fn mode(&self) -> &Mode {
        &self.mode
    }

    /// Whether an observed name matches
    pub fn is_match(&self, candidate: &str) -> bool {
        self.pattern.is_match(candidate)
    }

    /// Group candidate names by logical name; non-matching names are ignored
    pub fn correlate<'a, I>(&self, candidates: I) -> Correlation
    where
        I: IntoIterator<Item = &'a str>,
    {
        let mut matches: BTreeMap<String, Vec<String>> = match &self.mode {
            Mode::Exact(names) => names.iter().map(|n| (n.clone(), Vec::new())).collect(),
            Mode::Prefix(prefix) => BTreeMap::from([(prefix.clone(), Vec::new())]),
        };

        for candidate in candidates {
            if !self.is_match(candidate) {
                log::trace!("Ignoring '{}' (no match for {})", candidate, self.pattern);
                continue;
            }
            let logical = match &self.mode {
                Mode::Exact(_) => logical_name(candidate).to_string(),
                Mode::Prefix(prefix) => prefix.clone(),
            };
            matches
                .entry(logical)
                .or_default()
                .push(candidate.to_string());
        }

        log::debug!(
            "Correlated {} instances against {}",
            matches.values().map(Vec::len).sum::<usize>(),
            self.pattern
        );

        Correlation {
            matches,
            prefix: matches!(self.mode, Mode::Prefix(_)),
        }
    }
}

impl Correlation {
    /// Every logical name must have at least one instance
    ///
    /// Returns one error per unmatched name. In prefix mode the single
    /// group must be non-empty.
    pub fn require_all(&self) -> std::result::Result<(), Vec<Error>> {
        let errors: Vec<Error> = self
            .matches
            .iter()
            .filter(|(_, instances)| instances.is_empty())
            .map(|(name, _)| Error::Correlation { name: name.clone() })
            .collect();
        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }

    /// `(logical, instance)` pairs in logical-name order
    pub fn pairs(&self) -> impl Iterator<Item = (&str, &str)> {
        self.matches.iter().flat_map(|(logical, instances)| {
            instances
                .iter()
                .map(move |instance| (logical.as_str(), instance.as_str()))
        })
    }

    /// Instances of one logical name
    pub fn instances(&self, logical: &str) -> &[String] {
        self.matches.get(logical).map_or(&[][..], Vec::as_slice)
    }

    /// Whether this came from prefix correlation
    pub fn is_prefix(&self) -> bool {
        self.prefix
    }

    /// Total matched instances
    pub fn len(&self) -> usize {
        self.matches.values().map(Vec::len).sum()
    }

    /// Whether nothing matched
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Strip a trailing `-<digits>` revision
pub fn logical_name(instance: &str) -> &str {
    match instance.rsplit_once('-') {
        Some((base, rev)) if !rev.is_empty() && rev.bytes().all(|b| b.is_ascii_digit()) => base,
        _ => instance,
    }
}

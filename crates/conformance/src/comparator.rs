//! Structural comparison of expected against observed entities

use crate::entity::{Expected, ExpectedEntity, ObservedEntity, Order};
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

/// Outcome of one attribute check
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CheckStatus {
    Pass,
    Fail,
    Skipped,
}

impl fmt::Display for CheckStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pass => write!(f, "pass"),
            Self::Fail => write!(f, "fail"),
            Self::Skipped => write!(f, "skipped"),
        }
    }
}

/// Result of checking one attribute path
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComparisonResult {
    /// Attribute path
    pub path: String,
    /// Rule that was applied; `None` when the check was skipped
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expected: Option<Expected>,
    /// Observed value; `None` when the attribute is missing
    #[serde(skip_serializing_if = "Option::is_none")]
    pub actual: Option<Value>,
    /// Outcome
    pub status: CheckStatus,
    /// Instance the check ran against; empty when no instance was resolved
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub instance: String,
    /// Why the check failed or was skipped
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

impl ComparisonResult {
    /// A check that was not evaluated, so it carries no expectation
    pub fn skipped(path: &str, instance: &str, reason: &str) -> Self {
        Self {
            path: path.to_string(),
            expected: None,
            actual: None,
            status: CheckStatus::Skipped,
            instance: instance.to_string(),
            detail: Some(reason.to_string()),
        }
    }

    /// Whether the check passed
    pub fn passed(&self) -> bool {
        self.status == CheckStatus::Pass
    }

    /// Whether the check failed
    pub fn failed(&self) -> bool {
        self.status == CheckStatus::Fail
    }
}

/// Compare every expected path against the observed entity
///
/// Never raises: each expected path yields exactly one result, and a
/// failing path does not stop sibling paths from being checked.
pub fn compare(
    expected: &ExpectedEntity,
    observed: &ObservedEntity,
    instance: &str,
) -> Vec<ComparisonResult> {
    expected
        .iter()
        .map(|(path, rule)| {
            let actual = observed.get(path);
            let outcome = check(rule, actual);
            ComparisonResult {
                path: path.to_string(),
                expected: Some(rule.clone()),
                actual: actual.cloned(),
                status: if outcome.is_ok() {
                    CheckStatus::Pass
                } else {
                    CheckStatus::Fail
                },
                instance: instance.to_string(),
                detail: outcome.err(),
            }
        })
        .collect()
}

/// Check a single rule against an optional observed value
///
/// `Err` carries a human readable mismatch description.
pub fn check(rule: &Expected, actual: Option<&Value>) -> Result<(), String> {
    let actual = actual.filter(|v| !v.is_null());
    match (rule, actual) {
        (Expected::Absent, None) => Ok(()),
        (Expected::Absent, Some(v)) => Err(format!("expected absent, found {v}")),
        (_, None) => Err("attribute is missing".to_string()),
        (Expected::Present, Some(_)) => Ok(()),
        (Expected::Exact(want), Some(got)) => scalar_eq(want, got),
        (Expected::Pattern(pattern), Some(got)) => full_match(pattern, got),
        (Expected::List { items, order }, Some(got)) => list_eq(items, *order, got),
        (Expected::Map(entries), Some(got)) => map_eq(entries, got),
        (Expected::OneOf(options), Some(got)) => {
            if options.iter().any(|o| scalar_eq(o, got).is_ok()) {
                Ok(())
            } else {
                Err(format!("{got} is not one of the allowed values"))
            }
        }
        (Expected::Contains(item), Some(got)) => match got {
            Value::Array(items) if items.iter().any(|i| values_eq(item, i)) => Ok(()),
            Value::Array(_) => Err(format!("list does not contain {item}")),
            other => Err(format!("expected a list, found {}", kind_of(other))),
        },
        (Expected::Len(n), Some(got)) => {
            let len = match got {
                Value::Array(items) => items.len(),
                Value::Object(map) => map.len(),
                Value::String(s) => s.chars().count(),
                other => return Err(format!("{} has no length", kind_of(other))),
            };
            if len == *n {
                Ok(())
            } else {
                Err(format!("expected length {n}, found {len}"))
            }
        }
    }
}

fn scalar_eq(want: &Value, got: &Value) -> Result<(), String> {
    if values_eq(want, got) {
        Ok(())
    } else if kind_of(want) != kind_of(got) {
        Err(format!(
            "expected {} {want}, found {} {got}",
            kind_of(want),
            kind_of(got)
        ))
    } else {
        Err(format!("expected {want}, found {got}"))
    }
}

/// Value equality with numeric comparison across integer/float encodings
fn values_eq(want: &Value, got: &Value) -> bool {
    match (want, got) {
        (Value::Number(a), Value::Number(b)) => match (a.as_i64(), b.as_i64()) {
            (Some(x), Some(y)) => x == y,
            _ => match (a.as_u64(), b.as_u64()) {
                (Some(x), Some(y)) => x == y,
                _ => a.as_f64() == b.as_f64(),
            },
        },
        (Value::Array(a), Value::Array(b)) => {
            a.len() == b.len() && a.iter().zip(b).all(|(x, y)| values_eq(x, y))
        }
        (Value::Object(a), Value::Object(b)) => {
            a.len() == b.len()
                && a
                    .iter()
                    .all(|(k, v)| b.get(k).is_some_and(|other| values_eq(v, other)))
        }
        _ => want == got,
    }
}

fn full_match(pattern: &str, got: &Value) -> Result<(), String> {
    let Value::String(text) = got else {
        return Err(format!("expected a string, found {}", kind_of(got)));
    };
    let re = Regex::new(&format!("^(?:{pattern})$"))
        .map_err(|e| format!("invalid pattern /{pattern}/: {e}"))?;
    if re.is_match(text) {
        Ok(())
    } else {
        Err(format!("'{text}' does not match /{pattern}/"))
    }
}

fn list_eq(items: &[Expected], order: Order, got: &Value) -> Result<(), String> {
    let Value::Array(actual) = got else {
        return Err(format!("expected a list, found {}", kind_of(got)));
    };
    if items.len() != actual.len() {
        return Err(format!("expected {} elements, found {}", items.len(), actual.len()));
    }
    match order {
        Order::Sensitive => {
            for (i, (rule, value)) in items.iter().zip(actual).enumerate() {
                check(rule, Some(value)).map_err(|e| format!("element {i}: {e}"))?;
            }
            Ok(())
        }
        Order::Insensitive => {
            // Multiset match: each rule claims one unused observed element
            let mut used = vec![false; actual.len()];
            for rule in items {
                let slot = actual
                    .iter()
                    .enumerate()
                    .find(|(j, value)| !used[*j] && check(rule, Some(value)).is_ok())
                    .map(|(j, _)| j);
                match slot {
                    Some(j) => used[j] = true,
                    None => return Err(format!("no element matches {rule}")),
                }
            }
            Ok(())
        }
    }
}

fn map_eq(
    entries: &std::collections::BTreeMap<String, Expected>,
    got: &Value,
) -> Result<(), String> {
    let Value::Object(actual) = got else {
        return Err(format!("expected a map, found {}", kind_of(got)));
    };
    let mut problems = Vec::new();
    for (key, rule) in entries {
        if let Err(e) = check(rule, actual.get(key)) {
            problems.push(format!("{key}: {e}"));
        }
    }
    for key in actual.keys() {
        if !entries.contains_key(key) {
            problems.push(format!("{key}: unexpected key"));
        }
    }
    if problems.is_empty() {
        Ok(())
    } else {
        Err(problems.join("; "))
    }
}

fn kind_of(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "list",
        Value::Object(_) => "map",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn run(rule: Expected, observed: Value) -> ComparisonResult {
        let expected = ExpectedEntity::new().with("attr", rule);
        let observed = ObservedEntity::new(json!({ "attr": observed }));
        compare(&expected, &observed, "demo").remove(0)
    }

    fn run_missing(rule: Expected) -> ComparisonResult {
        let expected = ExpectedEntity::new().with("attr", rule);
        compare(&expected, &ObservedEntity::new(json!({})), "demo").remove(0)
    }

    #[test]
    fn test_absent_semantics() {
        assert!(run_missing(Expected::Absent).passed());
        assert!(run(Expected::Absent, Value::Null).passed());
        assert!(run(Expected::Absent, json!("")).failed());
        assert!(run(Expected::Absent, json!(0)).failed());
        assert!(run(Expected::Absent, json!(false)).failed());
        assert!(run(Expected::Absent, json!([])).failed());
    }

    #[test]
    fn test_missing_fails_non_absent_rules() {
        let result = run_missing(Expected::from("x"));
        assert!(result.failed());
        assert_eq!(result.actual, None);
        assert!(run_missing(Expected::Present).failed());
        assert!(run(Expected::Present, Value::Null).failed());
        assert!(run(Expected::Present, json!("")).passed());
    }

    #[test]
    fn test_scalars() {
        assert!(run(Expected::from("RUNNING"), json!("RUNNING")).passed());
        assert!(run(Expected::from("RUNNING"), json!("running")).failed());
        assert!(run(Expected::from(true), json!(true)).passed());
        assert!(run(Expected::from(true), json!("true")).failed());
        assert!(run(Expected::from(110), json!(110)).passed());
        assert!(run(Expected::from(110), json!(110.0)).passed());
        assert!(run(Expected::from(110), json!(111)).failed());
        assert!(run(Expected::from(1), json!("1")).failed());
    }

    #[test]
    fn test_patterns_are_full_match() {
        assert!(run(Expected::Pattern(r"v1\.\d+".into()), json!("v1.27")).passed());
        assert!(run(Expected::Pattern(r"v1\.\d+".into()), json!("v1.27-gke")).failed());
        assert!(run(Expected::version_prefix("1.27."), json!("1.27.3-gke.100")).passed());
        assert!(run(Expected::version_prefix("1.27."), json!("1.270.1")).failed());

        let invalid = run(Expected::Pattern("(".into()), json!("x"));
        assert!(invalid.failed());
        assert!(invalid.detail.unwrap().contains("invalid pattern"));
    }

    #[test]
    fn test_lists() {
        let ordered = Expected::from(json!(["a", "b"]));
        assert!(run(ordered.clone(), json!(["a", "b"])).passed());
        assert!(run(ordered, json!(["b", "a"])).failed());

        let unordered = Expected::unordered(json!(["a", "b", "a"]));
        assert!(run(unordered.clone(), json!(["b", "a", "a"])).passed());
        assert!(run(unordered.clone(), json!(["b", "a", "b"])).failed());
        assert!(run(unordered, json!(["a", "b"])).failed());
    }

    #[test]
    fn test_maps() {
        let rule = Expected::from(json!({"team": "infra", "env": "prod"}));
        assert!(run(rule.clone(), json!({"env": "prod", "team": "infra"})).passed());
        assert!(run(rule.clone(), json!({"team": "infra"})).failed());
        assert!(run(rule, json!({"team": "infra", "env": "prod", "x": "y"})).failed());

        let tolerant = Expected::Map(
            [
                ("name".to_string(), Expected::from("x")),
                ("optional".to_string(), Expected::Absent),
            ]
            .into(),
        );
        assert!(run(tolerant.clone(), json!({"name": "x"})).passed());
        assert!(run(tolerant.clone(), json!({"name": "x", "optional": null})).passed());
        assert!(run(tolerant, json!({"name": "x", "optional": "set"})).failed());
    }

    #[test]
    fn test_one_of_contains_len() {
        let one_of = Expected::OneOf(vec![json!("RUNNING"), json!("RECONCILING")]);
        assert!(run(one_of.clone(), json!("RECONCILING")).passed());
        assert!(run(one_of, json!("ERROR")).failed());

        let member = Expected::Contains(json!("serviceAccount:sa@p.iam.gserviceaccount.com"));
        assert!(
            run(
                member.clone(),
                json!(["user:a@b.c", "serviceAccount:sa@p.iam.gserviceaccount.com"])
            )
            .passed()
        );
        assert!(run(member.clone(), json!(["user:a@b.c"])).failed());
        assert!(run(member, json!("serviceAccount:sa@p.iam.gserviceaccount.com")).failed());

        assert!(run(Expected::Len(1), json!([{"cidr_block": "10.0.0.0/8"}])).passed());
        assert!(run(Expected::Len(2), json!({"a": 1})).failed());
        assert!(run(Expected::Len(3), json!("abc")).passed());
        assert!(run(Expected::Len(0), json!(0)).failed());
    }

    #[test]
    fn test_siblings_are_independent() {
        let expected = ExpectedEntity::new()
            .with("a", "x")
            .with("b", "wrong")
            .with("c", "z");
        let observed = ObservedEntity::new(json!({"a": "x", "b": "y", "c": "z"}));
        let results = compare(&expected, &observed, "demo");
        let statuses: Vec<_> = results.iter().map(|r| r.status).collect();
        assert_eq!(
            statuses,
            [CheckStatus::Pass, CheckStatus::Fail, CheckStatus::Pass]
        );
        assert!(results.iter().all(|r| r.instance == "demo"));
    }

    #[test]
    fn test_compare_is_idempotent() {
        let expected = ExpectedEntity::new()
            .with("status", Expected::OneOf(vec![json!("RUNNING")]))
            .with("tags", Expected::unordered(json!(["b", "a"])))
            .with("master_auth.username", Expected::Absent);
        let observed = ObservedEntity::new(json!({
            "status": "RUNNING",
            "tags": ["a", "b"],
            "master_auth": {"username": null}
        }));
        let first = compare(&expected, &observed, "demo");
        let second = compare(&expected, &observed, "demo");
        assert_eq!(first, second);
        assert!(first.iter().all(ComparisonResult::passed));
    }
}

//! Node pool controls
//!
//! Declared pools are observed as `<name>-<revision>` and correlated back to
//! the pool spec they came from. Auto-provisioned pools have no declared
//! names; any pool under the `nap-` prefix is checked against the
//! provisioning defaults.

use super::{ControlInfo, Profile, fixed, kinds, setting};
use crate::inputs::{ClusterInputs, truthy};
use conformance::resolver::{Scope, expected_string_map, string_map};
use conformance::{
    AttributeRule, Control, Expected, FeatureFlags, Predicate, Resolution, Result, RuleTable,
    Target, merge_labels,
};
use serde_json::{Value, json};
use std::collections::BTreeMap;

pub const NODE_POOLS: ControlInfo = ControlInfo {
    id: "node_pools",
    title: "Ensure GKE node pools meet expectations",
    impact: 1.0,
    profile: Profile::Cluster,
};

pub const NAP_POOLS: ControlInfo = ControlInfo {
    id: "nap_pools",
    title: "Ensure GKE auto-provisioned node pools meet expectations",
    impact: 1.0,
    profile: Profile::Cluster,
};

/// Name prefix GKE gives auto-provisioned pools
pub const NAP_PREFIX: &str = "nap-";

const CLOUD_PLATFORM: &str = "https://www.googleapis.com/auth/cloud-platform";

/// Declared node pools, one group per pool
pub fn node_pools(inputs: &ClusterInputs) -> Control {
    let mut control = Control::new(
        NODE_POOLS.id,
        NODE_POOLS.title,
        NODE_POOLS.impact,
        Target::Groups {
            kind: kinds::NODE_POOL.to_string(),
        },
        pool_rules(),
    )
    .skip_when(
        Predicate::Enabled("autopilot"),
        "Autopilot node pools are not configured by module",
    )
    .setting("cluster_name", json!(inputs.name))
    .setting("service_account", json!(inputs.service_account))
    .setting("labels", json!(inputs.node_pool_labels()));

    for (name, spec) in inputs.node_pools().into_iter().flatten() {
        let mut flags = FeatureFlags::new();
        flags.set_bool("autoscaling", truthy(spec.get("autoscaling")));
        control = control.group(name, spec.clone(), flags);
    }
    control
}

/// Auto-provisioned pools, checked against the provisioning defaults
pub fn nap_pools(inputs: &ClusterInputs) -> Control {
    let settings: BTreeMap<String, Value> = inputs
        .nap()
        .into_iter()
        .flatten()
        .map(|(k, v)| (k.clone(), v.clone()))
        .collect();

    Control::new(
        NAP_POOLS.id,
        NAP_POOLS.title,
        NAP_POOLS.impact,
        Target::Prefixed {
            kind: kinds::NODE_POOL.to_string(),
            prefix: NAP_PREFIX.to_string(),
        },
        nap_rules(),
    )
    .skip_when(
        Predicate::Disabled("nap"),
        "Node autoprovisioning is not enabled",
    )
    .with_settings(settings)
    .setting("service_account", json!(inputs.service_account))
}

fn scopes() -> AttributeRule {
    fixed("config.oauth_scopes", json!([CLOUD_PLATFORM]))
}

fn shielded() -> [AttributeRule; 2] {
    [
        AttributeRule::always(
            "config.shielded_instance_config.enable_secure_boot",
            Resolution::Switch("enable_secure_boot"),
        ),
        AttributeRule::always(
            "config.shielded_instance_config.enable_integrity_monitoring",
            Resolution::Switch("enable_integrity_monitoring"),
        ),
    ]
}

fn tags() -> AttributeRule {
    AttributeRule::always("config.tags", Resolution::setting_unordered("tags"))
}

/// Attribute rules for a declared pool
pub fn pool_rules() -> RuleTable {
    let autoscaling = Predicate::Enabled("autoscaling");
    let [secure_boot, integrity] = shielded();

    RuleTable::new(kinds::NODE_POOL)
        .rule(setting("config.machine_type", "machine_type"))
        .rule(setting("config.disk_size_gb", "disk_size"))
        .rule(scopes())
        .rule(setting("config.service_account", "service_account"))
        .rule(AttributeRule::always(
            "config.metadata",
            Resolution::Derive(pool_metadata),
        ))
        .rule(setting("config.image_type", "image_type"))
        .rule(AttributeRule::always(
            "config.labels",
            Resolution::Derive(pool_labels),
        ))
        .rule(tags())
        .rule(AttributeRule::always(
            "config.preemptible",
            Resolution::Switch("preemptible"),
        ))
        .rule(setting("config.disk_type", "disk_type"))
        .rule(setting("config.min_cpu_platform", "min_cpu_platform"))
        .rule(AttributeRule::always(
            "config.taints",
            Resolution::setting_unordered("taints"),
        ))
        .rule(secure_boot)
        .rule(integrity)
        .rule(fixed("config.workload_metadata_config.mode", "GKE_METADATA"))
        .rule(fixed("status", "RUNNING"))
        .rule(setting("initial_node_count", "min_nodes_per_zone"))
        .rule(
            AttributeRule::new("autoscaling.enabled")
                .when(autoscaling.clone(), Resolution::fixed(true))
                .otherwise(Resolution::Absent),
        )
        .rule(
            AttributeRule::new("autoscaling.min_node_count")
                .when(autoscaling.clone(), Resolution::setting("min_nodes_per_zone"))
                .otherwise(Resolution::Unchecked),
        )
        .rule(
            AttributeRule::new("autoscaling.max_node_count")
                .when(autoscaling, Resolution::setting("max_nodes_per_zone"))
                .otherwise(Resolution::Unchecked),
        )
        .rule(setting("management.auto_upgrade", "auto_upgrade"))
        .rule(setting("management.auto_repair", "auto_repair"))
}

/// Attribute rules for an auto-provisioned pool
pub fn nap_rules() -> RuleTable {
    let [secure_boot, integrity] = shielded();

    RuleTable::new(kinds::NODE_POOL)
        .rule(setting("config.min_cpu_platform", "min_cpu_platform"))
        .rule(setting("config.disk_size_gb", "disk_size"))
        .rule(scopes())
        .rule(setting("config.service_account", "service_account"))
        .rule(fixed(
            "config.metadata",
            json!({"disable-legacy-endpoints": "true"}),
        ))
        .rule(setting("config.image_type", "image_type"))
        .rule(tags())
        .rule(setting("config.disk_type", "disk_type"))
        .rule(integrity)
        .rule(secure_boot)
        .rule(fixed("status", "RUNNING"))
        .rule(setting("management.auto_upgrade", "auto_upgrade"))
        .rule(setting("management.auto_repair", "auto_repair"))
}

/// Identity entries every module-managed pool carries
fn pool_identity(scope: &Scope<'_>) -> Result<BTreeMap<String, String>> {
    let pool = scope.group_name.unwrap_or(scope.instance);
    Ok(BTreeMap::from([
        ("node_pool".to_string(), pool.to_string()),
        (
            "cluster_name".to_string(),
            scope.require_str("cluster_name")?.to_string(),
        ),
    ]))
}

fn pool_metadata(scope: &Scope<'_>) -> Result<Expected> {
    let mut base = pool_identity(scope)?;
    base.insert("disable-legacy-endpoints".to_string(), "true".to_string());
    let declared = scope
        .group
        .and_then(|g| g.get("metadata"))
        .map(string_map)
        .unwrap_or_default();
    Ok(expected_string_map(&merge_labels(&base, &declared)))
}

// Control-wide labels; a pool spec never overrides them
fn pool_labels(scope: &Scope<'_>) -> Result<Expected> {
    let labels = scope
        .settings
        .get("labels")
        .map(string_map)
        .unwrap_or_default();
    Ok(expected_string_map(&merge_labels(
        &labels,
        &pool_identity(scope)?,
    )))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::inputs::names;
    use crate::inputs::tests::{standard_declaration, standard_with};
    use conformance::{
        CallPolicy, ControlResult, ControlStatus, Declaration, MemoryProvider, Observer, Registry,
        Runner,
    };
    use std::sync::Arc;

    fn observed_pool(name: &str) -> Value {
        json!({
            "name": name,
            "config": {
                "machine_type": "e2-standard-4",
                "disk_size_gb": 100,
                "oauth_scopes": [CLOUD_PLATFORM],
                "service_account": "demo-sa@my-project.iam.gserviceaccount.com",
                "metadata": {
                    "node_pool": "pool-a",
                    "cluster_name": "demo",
                    "disable-legacy-endpoints": "true",
                    "Owner": "infra"
                },
                "image_type": "COS_CONTAINERD",
                "labels": {
                    "terraform_module": "private-gke-cluster",
                    "Team": "infra",
                    "node_pool": "pool-a",
                    "cluster_name": "demo"
                },
                "tags": ["a", "b"],
                "disk_type": "pd-ssd",
                "shielded_instance_config": {"enable_secure_boot": true},
                "workload_metadata_config": {"mode": "GKE_METADATA"}
            },
            "status": "RUNNING",
            "initial_node_count": 1,
            "autoscaling": {"enabled": true, "min_node_count": 1, "max_node_count": 3},
            "management": {"auto_upgrade": true, "auto_repair": true}
        })
    }

    fn run(declaration: &Declaration, provider: MemoryProvider, id: &str) -> ControlResult {
        let inputs = ClusterInputs::from_declaration(declaration).unwrap();
        let flags = inputs.flags();
        let mut registry = Registry::new();
        registry
            .register_all([node_pools(&inputs), nap_pools(&inputs)])
            .unwrap();
        let observer = Observer::new(Arc::new(provider), CallPolicy::default());
        let report = Runner::new(declaration, &flags, observer)
            .run(&registry)
            .unwrap();
        report.control(id).unwrap().clone()
    }

    #[test]
    fn test_declared_pool_conforms() {
        let provider = MemoryProvider::new().with(kinds::NODE_POOL, observed_pool("pool-a-1"));
        let result = run(&standard_declaration(), provider, "node_pools");
        let failed: Vec<_> = result.failures().map(|c| c.path.as_str()).collect();
        assert_eq!(result.status, ControlStatus::Passed, "{failed:?}");
        assert!(result.checks.iter().all(|c| c.instance == "pool-a-1"));
    }

    #[test]
    fn test_pool_without_autoscaling() {
        let declaration = standard_with(
            names::NODE_POOLS,
            json!(r#"{"pool-a": {"machine_type": "e2-standard-4", "disk_size": 100, "image_type": "COS_CONTAINERD", "disk_type": "pd-ssd", "tags": ["b", "a"], "min_nodes_per_zone": 1, "auto_upgrade": true, "auto_repair": true, "enable_secure_boot": true, "metadata": {"Owner": "infra"}}}"#),
        );
        let mut observed = observed_pool("pool-a-2");
        observed["autoscaling"] = json!({"enabled": true, "min_node_count": 1});
        let provider = MemoryProvider::new().with(kinds::NODE_POOL, observed);
        let result = run(&declaration, provider, "node_pools");
        let failed: Vec<_> = result.failures().map(|c| c.path.as_str()).collect();
        assert_eq!(failed, ["autoscaling.enabled"]);
        assert!(
            !result
                .checks
                .iter()
                .any(|c| c.path == "autoscaling.min_node_count")
        );
    }

    #[test]
    fn test_missing_pool_is_diagnosed() {
        let declaration = standard_with(
            names::NODE_POOLS,
            json!(r#"{"pool-a": {"machine_type": "e2-standard-4"}, "pool-b": {"machine_type": "e2-small"}}"#),
        );
        let provider = MemoryProvider::new().with(kinds::NODE_POOL, observed_pool("pool-a-1"));
        let result = run(&declaration, provider, "node_pools");
        assert_eq!(result.status, ControlStatus::Failed);
        assert_eq!(result.diagnostics.len(), 1);
        assert!(result.diagnostics[0].contains("pool-b"));
    }

    #[test]
    fn test_autopilot_skips_node_pools() {
        let declaration = standard_with(names::IS_AUTOPILOT, json!(true));
        let result = run(&declaration, MemoryProvider::new(), "node_pools");
        assert_eq!(result.status, ControlStatus::Skipped);
        assert!(result.checks.iter().all(|c| c.detail.is_some()));
    }

    #[test]
    fn test_nap_skipped_without_autoprovisioning() {
        let result = run(&standard_declaration(), MemoryProvider::new(), "nap_pools");
        assert_eq!(result.status, ControlStatus::Skipped);
    }

    #[test]
    fn test_nap_pools_checked_by_prefix() {
        let declaration = standard_with(
            names::AUTOSCALING,
            json!(r#"{"nap": {"disk_size": 50, "image_type": "COS_CONTAINERD", "disk_type": "pd-standard", "auto_upgrade": true, "auto_repair": true}}"#),
        );
        let nap = json!({
            "name": "nap-e2-standard-2-abc123",
            "config": {
                "disk_size_gb": 50,
                "oauth_scopes": [CLOUD_PLATFORM],
                "service_account": "demo-sa@my-project.iam.gserviceaccount.com",
                "metadata": {"disable-legacy-endpoints": "true"},
                "image_type": "COS_CONTAINERD",
                "disk_type": "pd-standard"
            },
            "status": "RUNNING",
            "management": {"auto_upgrade": true, "auto_repair": true}
        });
        let provider = MemoryProvider::new()
            .with(kinds::NODE_POOL, observed_pool("pool-a-1"))
            .with(kinds::NODE_POOL, nap);
        let result = run(&declaration, provider, "nap_pools");
        let failed: Vec<_> = result.failures().map(|c| c.path.as_str()).collect();
        assert_eq!(result.status, ControlStatus::Passed, "{failed:?}");
        assert!(
            result
                .checks
                .iter()
                .all(|c| c.instance == "nap-e2-standard-2-abc123")
        );
    }

    #[test]
    fn test_nap_requires_at_least_one_pool() {
        let declaration = standard_with(names::AUTOSCALING, json!(r#"{"nap": {"disk_size": 50}}"#));
        let result = run(&declaration, MemoryProvider::new(), "nap_pools");
        assert_eq!(result.status, ControlStatus::Failed);
        assert!(!result.diagnostics.is_empty());
    }
}

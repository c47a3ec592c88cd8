//! Cluster control

use super::{ControlInfo, Profile, absent, field, fixed, kinds, present, setting};
use crate::inputs::ClusterInputs;
use conformance::resolver::Scope;
use conformance::{
    AttributeRule, Control, Expected, Predicate, Resolution, Result, RuleTable, Target,
};
use serde_json::{Value, json};
use std::collections::BTreeMap;

pub const INFO: ControlInfo = ControlInfo {
    id: "cluster",
    title: "Ensure private GKE cluster meets expectations",
    impact: 1.0,
    profile: Profile::Cluster,
};

const UNSPECIFIED: &str = "UNSPECIFIED";

/// Build the cluster control
pub fn control(inputs: &ClusterInputs) -> Control {
    log::debug!(
        "Cluster '{}' in {} ({})",
        inputs.name,
        inputs.location,
        inputs.project_id
    );
    let authorized_cidr = inputs
        .master_authorized_networks
        .get(0)
        .map_or(Value::Null, |network| field(network, "cidr_block"));

    let settings: BTreeMap<String, Value> = [
        ("expected_name", json!(inputs.expected_name)),
        ("kms", field(&inputs.options, "kms")),
        ("master_cidr", field(&inputs.subnet, "master_cidr")),
        ("subnetwork", json!(inputs.subnetwork())),
        ("labels", json!(inputs.cluster_labels())),
        ("max_pods_per_node", field(&inputs.options, "max_pods_per_node")),
        ("pods_range_name", field(&inputs.subnet, "pods_range_name")),
        (
            "services_range_name",
            field(&inputs.subnet, "services_range_name"),
        ),
        ("authorized_cidr", authorized_cidr),
        ("release_channel", field(&inputs.options, "release_channel")),
        ("version", field(&inputs.options, "version")),
        ("location", json!(inputs.region())),
        ("workload_pool", json!(inputs.workload_pool())),
    ]
    .into_iter()
    .map(|(k, v)| (k.to_string(), v))
    .collect();

    Control::new(
        INFO.id,
        INFO.title,
        INFO.impact,
        Target::Entities {
            kind: kinds::CLUSTER.to_string(),
            names: vec![inputs.name.clone()],
        },
        rules(),
    )
    .with_settings(settings)
}

/// Attribute rules for a cluster
pub fn rules() -> RuleTable {
    let autopilot = Predicate::Enabled("autopilot");
    let private_endpoint = Predicate::Enabled("private_endpoint");
    let unspecified_channel = Predicate::Choice("release_channel", UNSPECIFIED);

    RuleTable::new(kinds::CLUSTER)
        .rule(setting("name", "expected_name"))
        .rule(
            AttributeRule::new("initial_node_count")
                .when(autopilot.clone(), Resolution::Absent)
                .otherwise(Resolution::fixed(1)),
        )
        .rule(absent("master_auth.username"))
        .rule(absent("master_auth.password"))
        .rule(absent(
            "master_auth.client_certificate_config.issue_client_certificate",
        ))
        .rule(absent("master_auth.client_certificate"))
        .rule(absent("master_auth.client_key"))
        .rule(fixed("logging_service", "logging.googleapis.com/kubernetes"))
        .rule(fixed("monitoring_service", "monitoring.googleapis.com/kubernetes"))
        .rule(
            AttributeRule::new("database_encryption.state")
                .when(Predicate::Enabled("kms"), Resolution::fixed("ENCRYPTED"))
                .otherwise(Resolution::fixed("DECRYPTED")),
        )
        .rule(setting("database_encryption.key_name", "kms"))
        .rule(fixed("private_cluster_config.enable_private_nodes", true))
        .rule(
            AttributeRule::new("private_cluster_config.enable_private_endpoint")
                .when(private_endpoint.clone(), Resolution::fixed(true))
                .otherwise(Resolution::Absent),
        )
        .rule(setting(
            "private_cluster_config.master_ipv4_cidr_block",
            "master_cidr",
        ))
        .rule(present("private_cluster_config.private_endpoint"))
        .rule(
            AttributeRule::new("enable_tpu")
                .when(Predicate::Enabled("tpu"), Resolution::fixed(true)),
        )
        .rule(
            AttributeRule::new("addons_config.http_load_balancing.disabled")
                .when(
                    Predicate::any_enabled(&["autopilot", "l7_lb"]),
                    Resolution::Absent,
                )
                .otherwise(Resolution::fixed(true)),
        )
        .rule(
            AttributeRule::new("addons_config.horizontal_pod_autoscaling.disabled")
                .when(
                    Predicate::any_enabled(&["autopilot", "hpa"]),
                    Resolution::Absent,
                )
                .otherwise(Resolution::fixed(true)),
        )
        .rule(fixed("addons_config.kubernetes_dashboard.disabled", true))
        .rule(fixed("addons_config.network_policy_config.disabled", true))
        .rule(
            AttributeRule::new("addons_config.gce_persistent_disk_csi_driver_config.enabled")
                .when(
                    Predicate::any_enabled(&["autopilot", "csi_gce_pd"]),
                    Resolution::fixed(true),
                ),
        )
        .rule(setting("subnetwork", "subnetwork"))
        .rule(setting("resource_labels", "labels"))
        .rule(absent("legacy_abac.enabled"))
        .rule(absent("network_policy.enabled"))
        .rule(
            AttributeRule::new("default_max_pods_constraint.max_pods_per_node")
                .when(autopilot.clone(), Resolution::fixed(110))
                .otherwise(Resolution::setting("max_pods_per_node")),
        )
        .rule(fixed("ip_allocation_policy.use_ip_aliases", true))
        .rule(absent("ip_allocation_policy.create_subnetwork"))
        .rule(absent("ip_allocation_policy.subnetwork_name"))
        .rule(setting(
            "ip_allocation_policy.cluster_secondary_range_name",
            "pods_range_name",
        ))
        .rule(setting(
            "ip_allocation_policy.services_secondary_range_name",
            "services_range_name",
        ))
        .rule(present("ip_allocation_policy.cluster_ipv4_cidr_block"))
        .rule(absent("ip_allocation_policy.node_ipv4_cidr_block"))
        .rule(present("ip_allocation_policy.services_ipv4_cidr_block"))
        .rule(absent("ip_allocation_policy.tpu_ipv4_cidr_block"))
        .rule(AttributeRule::always(
            "status",
            Resolution::Fixed(Expected::OneOf(vec![json!("RUNNING"), json!("RECONCILING")])),
        ))
        .rule(
            AttributeRule::new("master_authorized_networks_config.enabled")
                .when(private_endpoint.clone(), Resolution::fixed(true))
                .otherwise(Resolution::Unchecked),
        )
        .rule(
            AttributeRule::new("master_authorized_networks_config.cidr_blocks")
                .when(private_endpoint.clone(), Resolution::Fixed(Expected::Len(1)))
                .otherwise(Resolution::Unchecked),
        )
        .rule(
            AttributeRule::new("master_authorized_networks_config.cidr_blocks.0.cidr_block")
                .when(private_endpoint, Resolution::setting("authorized_cidr"))
                .otherwise(Resolution::Unchecked),
        )
        .rule(
            AttributeRule::new("binary_authorization.enabled")
                .when(
                    Predicate::Enabled("binary_authorization"),
                    Resolution::fixed(true),
                ),
        )
        .rule(
            AttributeRule::new("release_channel.channel")
                .when(unspecified_channel.clone(), Resolution::Absent)
                .otherwise(Resolution::setting("release_channel")),
        )
        .rule(
            AttributeRule::new("initial_cluster_version")
                .when(unspecified_channel, Resolution::Derive(version_prefix))
                .otherwise(Resolution::Unchecked),
        )
        .rule(
            AttributeRule::new("enable_kubernetes_alpha")
                .when(autopilot.clone(), Resolution::Absent)
                .when(Predicate::Enabled("alpha"), Resolution::fixed(true)),
        )
        .rule(setting("location", "location"))
        .rule(
            AttributeRule::new("autopilot.enabled")
                .when(autopilot, Resolution::fixed(true)),
        )
        .rule(setting("workload_identity_config.workload_pool", "workload_pool"))
        .rule(fixed("shielded_nodes.enabled", true))
}

/// Pinned version must start with the declared prefix
fn version_prefix(scope: &Scope<'_>) -> Result<Expected> {
    Ok(match scope.setting_str("version") {
        Some(version) => Expected::version_prefix(version),
        None => Expected::Present,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::inputs::names;
    use crate::inputs::tests::{standard_declaration, standard_with};
    use conformance::{
        CallPolicy, ControlStatus, Declaration, MemoryProvider, Observer, Registry, Runner,
    };
    use std::sync::Arc;

    /// Observed cluster matching `standard_declaration`
    fn observed_standard() -> Value {
        json!({
            "name": "demo",
            "initial_node_count": 1,
            "master_auth": {"client_certificate_config": {}},
            "logging_service": "logging.googleapis.com/kubernetes",
            "monitoring_service": "monitoring.googleapis.com/kubernetes",
            "database_encryption": {"state": "DECRYPTED"},
            "private_cluster_config": {
                "enable_private_nodes": true,
                "enable_private_endpoint": true,
                "master_ipv4_cidr_block": "192.168.0.0/28",
                "private_endpoint": "192.168.0.2"
            },
            "addons_config": {
                "http_load_balancing": {},
                "horizontal_pod_autoscaling": {},
                "kubernetes_dashboard": {"disabled": true},
                "network_policy_config": {"disabled": true},
                "gce_persistent_disk_csi_driver_config": {}
            },
            "subnetwork": "demo-sb",
            "resource_labels": {
                "cluster_name": "demo",
                "terraform_module": "private-gke-cluster",
                "Team": "infra"
            },
            "default_max_pods_constraint": {"max_pods_per_node": "64"},
            "ip_allocation_policy": {
                "use_ip_aliases": true,
                "cluster_secondary_range_name": "pods",
                "services_secondary_range_name": "services",
                "cluster_ipv4_cidr_block": "10.100.0.0/16",
                "services_ipv4_cidr_block": "10.101.0.0/16"
            },
            "status": "RUNNING",
            "master_authorized_networks_config": {
                "enabled": true,
                "cidr_blocks": [{"cidr_block": "10.0.0.0/8", "display_name": "internal"}]
            },
            "binary_authorization": {},
            "release_channel": {"channel": "STABLE"},
            "initial_cluster_version": "1.27.3-gke.100",
            "location": "us-west1",
            "workload_identity_config": {"workload_pool": "my-project.svc.id.goog"},
            "shielded_nodes": {"enabled": true}
        })
    }

    fn run(declaration: &Declaration, observed: Value) -> conformance::ControlResult {
        let inputs = ClusterInputs::from_declaration(declaration).unwrap();
        let flags = inputs.flags();
        let mut registry = Registry::new();
        registry.register(control(&inputs)).unwrap();
        let provider = MemoryProvider::new().with(kinds::CLUSTER, observed);
        let observer = Observer::new(Arc::new(provider), CallPolicy::default());
        let report = Runner::new(declaration, &flags, observer)
            .run(&registry)
            .unwrap();
        report.control("cluster").unwrap().clone()
    }

    fn failed_paths(result: &conformance::ControlResult) -> Vec<String> {
        result.failures().map(|c| c.path.clone()).collect()
    }

    #[test]
    fn test_standard_cluster_conforms() {
        let mut observed = observed_standard();
        // numbers in the declaration match numbers in the API
        observed["default_max_pods_constraint"]["max_pods_per_node"] = json!(64);
        let result = run(&standard_declaration(), observed);
        assert_eq!(result.status, ControlStatus::Passed, "{:?}", failed_paths(&result));
    }

    #[test]
    fn test_type_mismatch_is_reported() {
        let result = run(&standard_declaration(), observed_standard());
        assert_eq!(
            failed_paths(&result),
            ["default_max_pods_constraint.max_pods_per_node"]
        );
    }

    #[test]
    fn test_unexpected_label_fails() {
        let mut observed = observed_standard();
        observed["default_max_pods_constraint"]["max_pods_per_node"] = json!(64);
        observed["resource_labels"]["extra"] = json!("x");
        let result = run(&standard_declaration(), observed);
        assert_eq!(failed_paths(&result), ["resource_labels"]);
    }

    #[test]
    fn test_unspecified_release_channel_checks_version_prefix() {
        let declaration = standard_with(
            names::OPTIONS,
            json!(r#"{"release_channel": "UNSPECIFIED", "version": "1.27.", "private_endpoint": true, "max_pods_per_node": 64}"#),
        );

        let mut observed = observed_standard();
        observed["default_max_pods_constraint"]["max_pods_per_node"] = json!(64);
        observed["release_channel"] = json!({});
        let result = run(&declaration, observed.clone());
        assert_eq!(result.status, ControlStatus::Passed, "{:?}", failed_paths(&result));

        observed["initial_cluster_version"] = json!("1.28.1-gke.200");
        let result = run(&declaration, observed);
        assert_eq!(failed_paths(&result), ["initial_cluster_version"]);
    }

    #[test]
    fn test_authorized_networks_unchecked_without_private_endpoint() {
        let inputs = ClusterInputs::from_declaration(&standard_declaration()).unwrap();
        let control = control(&inputs);
        let flags = conformance::FeatureFlags::new();
        let declaration = standard_declaration();
        let scope = Scope {
            declaration: &declaration,
            flags: &flags,
            settings: &control.settings,
            group_name: None,
            group: None,
            instance: "demo",
        };
        let expected = conformance::resolve(&control.rules, &scope).unwrap();
        assert!(expected.get("master_authorized_networks_config.enabled").is_none());
        assert_eq!(
            expected.get("private_cluster_config.enable_private_endpoint"),
            Some(&Expected::Absent)
        );
        assert_eq!(
            expected.get("addons_config.http_load_balancing.disabled"),
            Some(&Expected::from(true))
        );
    }

    #[test]
    fn test_autopilot_expectations() {
        let inputs = ClusterInputs::from_declaration(&standard_declaration()).unwrap();
        let control = control(&inputs);
        let flags = inputs.flags().with_bool("autopilot", true);
        let declaration = standard_declaration();
        let scope = Scope {
            declaration: &declaration,
            flags: &flags,
            settings: &control.settings,
            group_name: None,
            group: None,
            instance: "demo",
        };
        let expected = conformance::resolve(&control.rules, &scope).unwrap();
        assert_eq!(expected.get("initial_node_count"), Some(&Expected::Absent));
        assert_eq!(
            expected.get("default_max_pods_constraint.max_pods_per_node"),
            Some(&Expected::from(110))
        );
        assert_eq!(
            expected.get("addons_config.gce_persistent_disk_csi_driver_config.enabled"),
            Some(&Expected::from(true))
        );
        assert_eq!(
            expected.get("addons_config.horizontal_pod_autoscaling.disabled"),
            Some(&Expected::Absent)
        );
        assert_eq!(expected.get("autopilot.enabled"), Some(&Expected::from(true)));
    }
}

//! Typed extraction of declared infrastructure outputs
//!
//! Each profile reads its own subset of outputs so that a declaration for
//! the service account module alone can still be checked with `--profile sa`.

use conformance::{Declaration, FeatureFlags, KeyStyle, Result, merge_labels, override_value};
use regex::Regex;
use serde_json::{Map, Value};
use std::collections::BTreeMap;

/// Declaration output names
pub mod names {
    pub const PROJECT_ID: &str = "input_project_id";
    pub const EXPECTED_NAME: &str = "input_name";
    pub const LOCATION: &str = "output_location";
    pub const NAME: &str = "output_name";
    pub const SUBNET: &str = "output_subnet_json";
    pub const OPTIONS: &str = "output_options_json";
    pub const FEATURES: &str = "output_features_json";
    pub const MASTER_AUTHORIZED_NETWORKS: &str = "output_master_authorized_networks_json";
    pub const IS_AUTOPILOT: &str = "output_is_autopilot";
    pub const LABELS: &str = "output_labels_json";
    pub const SERVICE_ACCOUNT: &str = "output_service_account";
    pub const NODE_POOLS: &str = "output_node_pools_json";
    pub const AUTOSCALING: &str = "output_autoscaling_json";
    pub const MEMBER: &str = "output_member";
    pub const REPOSITORIES: &str = "output_repositories_json";
    pub const ID: &str = "output_id";
    pub const EMAIL: &str = "output_email";
    pub const DISPLAY_NAME: &str = "input_display_name";
    pub const DESCRIPTION: &str = "input_description";
    pub const ENDPOINT_URL: &str = "output_endpoint_url";
    pub const PUBLIC_ENDPOINT_URL: &str = "output_public_endpoint_url";
}

/// Display name given to the node service account when none was declared
pub const DEFAULT_DISPLAY_NAME: &str = "Generated GKE Service Account";

/// Description given to the node service account when none was declared
pub const DEFAULT_DESCRIPTION: &str = "A Terraform generated Service Account suitable for use by GKE nodes. The service account is intended to have minimal roles required to log and report base metrics to Google Cloud Operations.";

const MODULE: &str = "private-gke-cluster";
const AUTOPILOT_MODULE: &str = "private-gke-cluster_autopilot";

/// Truthiness of a declared value: anything but missing, null or `false`
pub fn truthy(value: Option<&Value>) -> bool {
    !matches!(value, None | Some(Value::Null | Value::Bool(false)))
}

/// Whether a declared value is missing or an empty string, list or map
pub fn blank(value: Option<&Value>) -> bool {
    value.is_none_or(conformance::resolver::is_empty_or_null)
}

/// Outputs of the cluster module
#[derive(Debug, Clone)]
pub struct ClusterInputs {
    pub project_id: String,
    pub expected_name: String,
    pub location: String,
    pub name: String,
    pub subnet: Value,
    pub options: Value,
    pub features: Value,
    pub master_authorized_networks: Value,
    pub is_autopilot: bool,
    pub labels: BTreeMap<String, String>,
    pub service_account: String,
    /// Pool name → pool spec; keys are data, kept verbatim
    pub node_pools: Value,
    pub autoscaling: Value,
}

impl ClusterInputs {
    /// Extract and decode every cluster output
    pub fn from_declaration(declaration: &Declaration) -> Result<Self> {
        let labels = declaration.decode(names::LABELS, KeyStyle::Verbatim)?;
        Ok(Self {
            project_id: declaration.string(names::PROJECT_ID)?.to_string(),
            expected_name: declaration.string(names::EXPECTED_NAME)?.to_string(),
            location: declaration.string(names::LOCATION)?.to_string(),
            name: declaration.string(names::NAME)?.to_string(),
            subnet: declaration.decode(names::SUBNET, KeyStyle::Symbol)?,
            options: declaration.decode(names::OPTIONS, KeyStyle::Symbol)?,
            features: declaration.decode(names::FEATURES, KeyStyle::Symbol)?,
            master_authorized_networks: declaration
                .decode_or_null(names::MASTER_AUTHORIZED_NETWORKS, KeyStyle::Symbol)?,
            is_autopilot: declaration.bool_or(names::IS_AUTOPILOT, false),
            labels: conformance::resolver::string_map(&labels),
            service_account: declaration.string(names::SERVICE_ACCOUNT)?.to_string(),
            node_pools: declaration.decode_or_null(names::NODE_POOLS, KeyStyle::Verbatim)?,
            autoscaling: declaration.decode_or_null(names::AUTOSCALING, KeyStyle::Symbol)?,
        })
    }

    /// Global feature toggles for cluster controls
    pub fn flags(&self) -> FeatureFlags {
        let mut flags = FeatureFlags::new();
        flags
            .set_bool("autopilot", self.is_autopilot)
            .set_bool("private_endpoint", truthy(self.options.get("private_endpoint")))
            .set_bool("kms", !blank(self.options.get("kms")))
            .set_bool("nap", self.nap().is_some_and(|nap| !nap.is_empty()));
        for feature in [
            "tpu",
            "l7_lb",
            "hpa",
            "csi_gce_pd",
            "binary_authorization",
            "alpha",
        ] {
            flags.set_bool(feature, truthy(self.features.get(feature)));
        }
        if let Some(channel) = self.options.get("release_channel").and_then(Value::as_str) {
            flags.set_choice("release_channel", channel);
        }
        flags
    }

    fn self_link(&self) -> &str {
        self.subnet
            .get("self_link")
            .and_then(Value::as_str)
            .unwrap_or_default()
    }

    /// Subnetwork name: last segment of the subnet self link
    pub fn subnetwork(&self) -> Option<&str> {
        self.self_link().rsplit('/').next().filter(|s| !s.is_empty())
    }

    /// Region: third segment from the end of the subnet self link
    pub fn region(&self) -> Option<&str> {
        self.self_link().rsplit('/').nth(2).filter(|s| !s.is_empty())
    }

    /// Value of the `terraform_module` label for this cluster flavour
    pub fn terraform_module(&self) -> &'static str {
        if self.is_autopilot {
            AUTOPILOT_MODULE
        } else {
            MODULE
        }
    }

    /// Expected cluster resource labels
    pub fn cluster_labels(&self) -> BTreeMap<String, String> {
        let base = BTreeMap::from([
            ("cluster_name".to_string(), self.name.clone()),
            (
                "terraform_module".to_string(),
                self.terraform_module().to_string(),
            ),
        ]);
        merge_labels(&base, &self.labels)
    }

    /// Labels every module-managed node pool carries before per-pool labels
    pub fn node_pool_labels(&self) -> BTreeMap<String, String> {
        let base = BTreeMap::from([("terraform_module".to_string(), MODULE.to_string())]);
        merge_labels(&base, &self.labels)
    }

    /// Declared node pools by logical name
    pub fn node_pools(&self) -> Option<&Map<String, Value>> {
        self.node_pools.as_object()
    }

    /// Node auto-provisioning defaults, when requested
    pub fn nap(&self) -> Option<&Map<String, Value>> {
        self.autoscaling.get("nap").and_then(Value::as_object)
    }

    /// Workload identity pool derived from the project
    pub fn workload_pool(&self) -> String {
        format!("{}.svc.id.goog", self.project_id)
    }
}

/// Outputs of the service account module
#[derive(Debug, Clone)]
pub struct AccountInputs {
    pub project_id: String,
    pub member: String,
    pub id: String,
    pub email: String,
    pub display_name: String,
    pub description: String,
    pub repositories: Vec<String>,
}

impl AccountInputs {
    /// Extract every service account output
    pub fn from_declaration(declaration: &Declaration) -> Result<Self> {
        let repositories = declaration.decode_or_null(names::REPOSITORIES, KeyStyle::Verbatim)?;
        Ok(Self {
            project_id: declaration.string(names::PROJECT_ID)?.to_string(),
            member: declaration.string(names::MEMBER)?.to_string(),
            id: declaration.string(names::ID)?.to_string(),
            email: declaration.string(names::EMAIL)?.to_string(),
            display_name: declaration
                .string_or(names::DISPLAY_NAME, DEFAULT_DISPLAY_NAME)
                .to_string(),
            description: declaration
                .string_or(names::DESCRIPTION, DEFAULT_DESCRIPTION)
                .to_string(),
            repositories: repositories
                .as_array()
                .map(|repos| {
                    repos
                        .iter()
                        .filter_map(Value::as_str)
                        .map(ToString::to_string)
                        .collect()
                })
                .unwrap_or_default(),
        })
    }

    /// Feature toggles for account controls
    pub fn flags(&self) -> Result<FeatureFlags> {
        let mut flags = FeatureFlags::new();
        flags
            .set_bool("gcr", !self.gcr_buckets()?.is_empty())
            .set_bool("gar", !self.gar_repositories()?.is_empty());
        Ok(flags)
    }

    /// Storage buckets backing the declared Container Registry repositories
    ///
    /// `us.gcr.io/my-project` is backed by `us.artifacts.my-project.appspot.com`.
    pub fn gcr_buckets(&self) -> Result<Vec<String>> {
        let repo = Regex::new(r"^(?<location>[^./]+\.)?gcr\.io/(?<name>[^/]+)")?;
        let hosts = Regex::new(r"^(?:(?:asia|eu|us)\.)?gcr\.io")?;
        Ok(self
            .repositories
            .iter()
            .filter(|r| hosts.is_match(r))
            .filter_map(|r| repo.captures(r))
            .map(|caps| {
                let location = caps.name("location").map_or("", |m| m.as_str());
                format!("{location}artifacts.{}.appspot.com", &caps["name"])
            })
            .collect())
    }

    /// Artifact Registry repository resource names
    pub fn gar_repositories(&self) -> Result<Vec<String>> {
        let repo = Regex::new(
            r"^(?<location>[a-z]{2,}(?:-[a-z]+[1-9])?)-docker\.pkg\.dev/(?<project>[^/]+)/(?<name>[^/]+)",
        )?;
        Ok(self
            .repositories
            .iter()
            .filter_map(|r| repo.captures(r))
            .map(|caps| {
                format!(
                    "projects/{}/locations/{}/repositories/{}",
                    &caps["project"], &caps["location"], &caps["name"]
                )
            })
            .collect())
    }
}

/// Outputs needed to reach the cluster API
#[derive(Debug, Clone)]
pub struct AccessInputs {
    /// Address checked; the public endpoint wins when declared
    pub endpoint_url: String,
}

impl AccessInputs {
    /// Extract the endpoint address
    pub fn from_declaration(declaration: &Declaration) -> Result<Self> {
        let computed = declaration.string(names::ENDPOINT_URL)?;
        let public = declaration.optional_string(names::PUBLIC_ENDPOINT_URL);
        Ok(Self {
            endpoint_url: override_value(computed, public),
        })
    }
}

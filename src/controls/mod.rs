//! GKE control catalogue
//!
//! Controls are grouped into profiles the same way the cluster, service
//! account and access checks are run in practice: each profile reads only
//! the outputs of the module it verifies.

pub mod access;
pub mod account;
pub mod cluster;
pub mod node_pools;

use crate::inputs::{AccessInputs, AccountInputs, ClusterInputs};
use clap::ValueEnum;
use conformance::{AttributeRule, Declaration, FeatureFlags, Registry, Resolution, Result};
use serde_json::Value;
use std::fmt;

/// Observed resource kinds
pub mod kinds {
    pub const CLUSTER: &str = "container.cluster";
    pub const NODE_POOL: &str = "container.node_pool";
    pub const SERVICE_ACCOUNT: &str = "iam.service_account";
    pub const PROJECT_BINDING: &str = "iam.project_binding";
    pub const BUCKET_BINDING: &str = "storage.bucket_binding";
    pub const REPOSITORY_BINDING: &str = "artifactregistry.repository_binding";
    pub const HTTP_ENDPOINT: &str = "http.endpoint";
    pub const COMMAND: &str = "command";
}

/// A group of controls that verify one module
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Profile {
    /// Cluster, node pools and auto-provisioned pools
    Cluster,
    /// Node service account and its role bindings
    Sa,
    /// Control plane reachability
    Access,
    /// Every profile
    All,
}

impl Profile {
    fn includes(self, other: Profile) -> bool {
        self == Profile::All || self == other
    }
}

impl fmt::Display for Profile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Cluster => write!(f, "cluster"),
            Self::Sa => write!(f, "sa"),
            Self::Access => write!(f, "access"),
            Self::All => write!(f, "all"),
        }
    }
}

/// Static description of a control
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ControlInfo {
    pub id: &'static str,
    pub title: &'static str,
    pub impact: f64,
    pub profile: Profile,
}

/// Every control, in catalogue order
pub static CATALOGUE: [ControlInfo; 9] = [
    cluster::INFO,
    node_pools::NODE_POOLS,
    node_pools::NAP_POOLS,
    account::SERVICE_ACCOUNT,
    account::PROJECT,
    account::GCR_ROLE,
    account::GAR_ROLE,
    access::API,
    access::KUBECONFIG,
];

/// Controls in a profile
pub fn describe(profile: Profile) -> impl Iterator<Item = &'static ControlInfo> {
    CATALOGUE.iter().filter(move |c| profile.includes(c.profile))
}

/// Registered controls plus the flags they are evaluated under
#[derive(Debug)]
pub struct Catalogue {
    pub registry: Registry,
    pub flags: FeatureFlags,
}

/// Build every control in a profile from the declaration
///
/// Fails when an output the profile needs is missing or malformed.
pub fn build(profile: Profile, declaration: &Declaration) -> Result<Catalogue> {
    let mut registry = Registry::new();
    let mut flags = FeatureFlags::new();

    if profile.includes(Profile::Cluster) {
        let inputs = ClusterInputs::from_declaration(declaration)?;
        flags = flags.overlay(&inputs.flags());
        registry.register_all([
            cluster::control(&inputs),
            node_pools::node_pools(&inputs),
            node_pools::nap_pools(&inputs),
        ])?;
    }

    if profile.includes(Profile::Sa) {
        let inputs = AccountInputs::from_declaration(declaration)?;
        flags = flags.overlay(&inputs.flags()?);
        registry.register_all([
            account::service_account(&inputs),
            account::project(&inputs),
            account::gcr_role(&inputs)?,
            account::gar_role(&inputs)?,
        ])?;
    }

    if profile.includes(Profile::Access) {
        let inputs = AccessInputs::from_declaration(declaration)?;
        registry.register_all([access::api(&inputs), access::kubeconfig()])?;
    }

    log::debug!("Built {} controls for '{}'", registry.len(), profile);
    Ok(Catalogue { registry, flags })
}

// Shorthands for the common rule shapes

fn fixed(path: &'static str, value: impl Into<conformance::Expected>) -> AttributeRule {
    AttributeRule::always(path, Resolution::fixed(value))
}

fn absent(path: &'static str) -> AttributeRule {
    AttributeRule::always(path, Resolution::Absent)
}

fn present(path: &'static str) -> AttributeRule {
    AttributeRule::always(path, Resolution::Fixed(conformance::Expected::Present))
}

fn setting(path: &'static str, key: &'static str) -> AttributeRule {
    AttributeRule::always(path, Resolution::setting(key))
}

/// Copy a field of a decoded document, null when missing
fn field(document: &Value, key: &str) -> Value {
    document.get(key).cloned().unwrap_or(Value::Null)
}

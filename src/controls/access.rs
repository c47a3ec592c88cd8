//! Control plane access controls

use super::{ControlInfo, Profile, fixed, kinds};
use crate::inputs::AccessInputs;
use conformance::{AttributeRule, Control, Expected, Resolution, RuleTable, Target};

pub const API: ControlInfo = ControlInfo {
    id: "api",
    title: "Ensure proxied API access to private GKE cluster succeeds",
    impact: 1.0,
    profile: Profile::Access,
};

pub const KUBECONFIG: ControlInfo = ControlInfo {
    id: "kubeconfig",
    title: "Verify generated Kubeconfig via kubectl",
    impact: 0.7,
    profile: Profile::Access,
};

/// GKE server version reported by `/version`
const GIT_VERSION: &str = r"v1\.[12][0-9]\.[1-9][0-9]+-gke\.[1-9][0-9]+";

/// `kubectl version` output naming a GKE server
const SERVER_VERSION: &str = r"(?s).*Server Version:.*v1\.[123][0-9]\.[0-9]+-gke\.[0-9]+.*";

/// Command whose output is observed for the kubeconfig check
pub const KUBECTL_VERSION: &str = "kubectl version";

fn pattern(path: &'static str, pattern: &str) -> AttributeRule {
    AttributeRule::always(
        path,
        Resolution::Fixed(Expected::Pattern(pattern.to_string())),
    )
}

/// The API server answers `/version` at the declared endpoint
pub fn api(inputs: &AccessInputs) -> Control {
    let url = format!("{}/version", inputs.endpoint_url.trim_end_matches('/'));
    let rules = RuleTable::new(kinds::HTTP_ENDPOINT)
        .rule(fixed("status", 200))
        .rule(pattern("body.gitVersion", GIT_VERSION));

    Control::new(
        API.id,
        API.title,
        API.impact,
        Target::Entities {
            kind: kinds::HTTP_ENDPOINT.to_string(),
            names: vec![url],
        },
        rules,
    )
}

/// The generated kubeconfig reaches a GKE server
pub fn kubeconfig() -> Control {
    let rules = RuleTable::new(kinds::COMMAND)
        .rule(fixed("exit_status", 0))
        .rule(pattern("stdout", SERVER_VERSION));

    Control::new(
        KUBECONFIG.id,
        KUBECONFIG.title,
        KUBECONFIG.impact,
        Target::Entities {
            kind: kinds::COMMAND.to_string(),
            names: vec![KUBECTL_VERSION.to_string()],
        },
        rules,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use conformance::comparator::check;
    use serde_json::json;

    #[test]
    fn test_api_url_uses_endpoint() {
        let inputs = AccessInputs {
            endpoint_url: "https://34.1.2.3/".to_string(),
        };
        let control = api(&inputs);
        let Target::Entities { names, .. } = &control.target else {
            panic!("expected named entities");
        };
        assert_eq!(names, &["https://34.1.2.3/version"]);
    }

    #[test]
    fn test_git_version_pattern() {
        let rule = Expected::Pattern(GIT_VERSION.to_string());
        assert!(check(&rule, Some(&json!("v1.27.10-gke.1300"))).is_ok());
        assert!(check(&rule, Some(&json!("v1.27.10"))).is_err());
        assert!(check(&rule, Some(&json!("v1.9.10-gke.100"))).is_err());
    }

    #[test]
    fn test_server_version_pattern() {
        let rule = Expected::Pattern(SERVER_VERSION.to_string());
        let stdout = "Client Version: v1.28.2\nKustomize Version: v5.0.4\nServer Version: v1.27.3-gke.100\n";
        assert!(check(&rule, Some(&json!(stdout))).is_ok());
        assert!(check(&rule, Some(&json!("Client Version: v1.28.2\n"))).is_err());
    }
}

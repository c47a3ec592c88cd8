//! Node service account controls

use super::{ControlInfo, Profile, fixed, kinds, setting};
use crate::inputs::AccountInputs;
use conformance::resolver::Scope;
use conformance::{
    AttributeRule, Control, Expected, Predicate, Resolution, Result, RuleTable, Target,
};
use serde_json::{Value, json};

pub const SERVICE_ACCOUNT: ControlInfo = ControlInfo {
    id: "service_account",
    title: "Ensure GKE service account meets expectations",
    impact: 1.0,
    profile: Profile::Sa,
};

pub const PROJECT: ControlInfo = ControlInfo {
    id: "project",
    title: "Ensure GKE service account has appropriate roles on the project",
    impact: 1.0,
    profile: Profile::Sa,
};

pub const GCR_ROLE: ControlInfo = ControlInfo {
    id: "gcr_role",
    title: "Ensure GKE service account has role on backing storage for GCR repos",
    impact: 0.5,
    profile: Profile::Sa,
};

pub const GAR_ROLE: ControlInfo = ControlInfo {
    id: "gar_role",
    title: "Ensure GKE service account has role to access GAR repos",
    impact: 0.5,
    profile: Profile::Sa,
};

/// Project roles the node service account needs
pub const PROJECT_ROLES: [&str; 4] = [
    "roles/logging.logWriter",
    "roles/monitoring.metricWriter",
    "roles/monitoring.viewer",
    "roles/stackdriver.resourceMetadata.writer",
];

const GCR_READER: &str = "roles/storage.objectViewer";
const GAR_READER: &str = "roles/artifactregistry.reader";

fn entities(kind: &str, names: Vec<String>) -> Target {
    Target::Entities {
        kind: kind.to_string(),
        names,
    }
}

/// The account itself, addressed by its resource name
pub fn service_account(inputs: &AccountInputs) -> Control {
    log::debug!("Service account '{}' in {}", inputs.email, inputs.project_id);
    let rules = RuleTable::new(kinds::SERVICE_ACCOUNT)
        .rule(setting("name", "id"))
        .rule(setting("email", "email"))
        .rule(setting("display_name", "display_name"))
        .rule(setting("description", "description"));

    Control::new(
        SERVICE_ACCOUNT.id,
        SERVICE_ACCOUNT.title,
        SERVICE_ACCOUNT.impact,
        entities(kinds::SERVICE_ACCOUNT, vec![inputs.id.clone()]),
        rules,
    )
    .setting("id", json!(inputs.id))
    .setting("email", json!(inputs.email))
    .setting("display_name", json!(inputs.display_name))
    .setting("description", json!(inputs.description))
}

/// Project-level role bindings, one entity per role
pub fn project(inputs: &AccountInputs) -> Control {
    let rules = RuleTable::new(kinds::PROJECT_BINDING).rule(member_rule());

    Control::new(
        PROJECT.id,
        PROJECT.title,
        PROJECT.impact,
        entities(
            kinds::PROJECT_BINDING,
            PROJECT_ROLES.iter().map(ToString::to_string).collect(),
        ),
        rules,
    )
    .setting("member", json!(inputs.member))
}

/// Reader role on the buckets backing Container Registry repositories
pub fn gcr_role(inputs: &AccountInputs) -> Result<Control> {
    let rules = RuleTable::new(kinds::BUCKET_BINDING)
        .rule(fixed("role", GCR_READER))
        .rule(member_rule());

    Ok(Control::new(
        GCR_ROLE.id,
        GCR_ROLE.title,
        GCR_ROLE.impact,
        entities(kinds::BUCKET_BINDING, inputs.gcr_buckets()?),
        rules,
    )
    .skip_when(Predicate::Disabled("gcr"), "GCR access was not requested")
    .setting("member", json!(inputs.member)))
}

/// Reader role on Artifact Registry repositories
pub fn gar_role(inputs: &AccountInputs) -> Result<Control> {
    let rules = RuleTable::new(kinds::REPOSITORY_BINDING)
        .rule(fixed("role", GAR_READER))
        .rule(member_rule());

    Ok(Control::new(
        GAR_ROLE.id,
        GAR_ROLE.title,
        GAR_ROLE.impact,
        entities(kinds::REPOSITORY_BINDING, inputs.gar_repositories()?),
        rules,
    )
    .skip_when(Predicate::Disabled("gar"), "GAR access was not requested")
    .setting("member", json!(inputs.member)))
}

fn member_rule() -> AttributeRule {
    AttributeRule::always("members", Resolution::Derive(includes_member))
}

fn includes_member(scope: &Scope<'_>) -> Result<Expected> {
    let member = scope.require_str("member")?;
    Ok(Expected::Contains(Value::String(member.to_string())))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::inputs::{DEFAULT_DESCRIPTION, DEFAULT_DISPLAY_NAME, names};
    use conformance::{
        CallPolicy, ControlStatus, Declaration, MemoryProvider, Observer, Registry, RunReport,
        Runner,
    };
    use std::sync::Arc;

    const MEMBER: &str = "serviceAccount:demo@my-project.iam.gserviceaccount.com";
    const EMAIL: &str = "demo@my-project.iam.gserviceaccount.com";

    fn declaration(repositories: &str) -> Declaration {
        declaration_with(repositories, &[])
    }

    fn declaration_with(repositories: &str, extra: &[(&str, Value)]) -> Declaration {
        let mut values = vec![
            (names::PROJECT_ID, json!("my-project")),
            (names::MEMBER, json!(MEMBER)),
            (
                names::ID,
                json!(format!("projects/my-project/serviceAccounts/{EMAIL}")),
            ),
            (names::EMAIL, json!(EMAIL)),
            (names::REPOSITORIES, json!(repositories)),
        ];
        values.extend(extra.iter().cloned());
        Declaration::from_values(values)
    }

    fn run(declaration: &Declaration, provider: MemoryProvider) -> RunReport {
        let inputs = AccountInputs::from_declaration(declaration).unwrap();
        let flags = inputs.flags().unwrap();
        let mut registry = Registry::new();
        registry
            .register_all([
                service_account(&inputs),
                project(&inputs),
                gcr_role(&inputs).unwrap(),
                gar_role(&inputs).unwrap(),
            ])
            .unwrap();
        let observer = Observer::new(Arc::new(provider), CallPolicy::default());
        Runner::new(declaration, &flags, observer)
            .run(&registry)
            .unwrap()
    }

    fn bindings(
        provider: MemoryProvider,
        kind: &str,
        names: &[&str],
        role: Option<&str>,
    ) -> MemoryProvider {
        names.iter().fold(provider, |provider, name| {
            let mut binding =
                json!({"name": name, "members": ["user:someone@example.com", MEMBER]});
            if let Some(role) = role {
                binding["role"] = json!(role);
            }
            provider.with(kind, binding)
        })
    }

    fn account_entity(display_name: &str, description: &str) -> Value {
        json!({
            "name": format!("projects/my-project/serviceAccounts/{EMAIL}"),
            "email": EMAIL,
            "display_name": display_name,
            "description": description
        })
    }

    #[test]
    fn test_account_conforms() {
        let provider = MemoryProvider::new().with(
            kinds::SERVICE_ACCOUNT,
            account_entity(DEFAULT_DISPLAY_NAME, DEFAULT_DESCRIPTION),
        );
        let provider = bindings(provider, kinds::PROJECT_BINDING, &PROJECT_ROLES, None);
        let report = run(&declaration("[]"), provider);

        let account = report.control("service_account").unwrap();
        assert_eq!(account.status, ControlStatus::Passed);
        assert_eq!(account.checks.len(), 5);

        let project = report.control("project").unwrap();
        assert_eq!(project.status, ControlStatus::Passed);
        assert_eq!(project.checks.len(), PROJECT_ROLES.len() * 2);
        assert_eq!(report.control("gcr_role").unwrap().status, ControlStatus::Skipped);
        assert_eq!(report.control("gar_role").unwrap().status, ControlStatus::Skipped);
    }

    #[test]
    fn test_declared_description() {
        let declaration = declaration_with(
            "[]",
            &[(names::DESCRIPTION, json!("Provisioned for unit tests"))],
        );

        let provider = MemoryProvider::new().with(
            kinds::SERVICE_ACCOUNT,
            account_entity(DEFAULT_DISPLAY_NAME, "Provisioned for unit tests"),
        );
        let report = run(&declaration, provider);
        assert_eq!(
            report.control("service_account").unwrap().status,
            ControlStatus::Passed
        );

        let provider = MemoryProvider::new().with(
            kinds::SERVICE_ACCOUNT,
            account_entity(DEFAULT_DISPLAY_NAME, DEFAULT_DESCRIPTION),
        );
        let report = run(&declaration, provider);
        let failed: Vec<_> = report
            .control("service_account")
            .unwrap()
            .failures()
            .map(|c| c.path.as_str())
            .collect();
        assert_eq!(failed, ["description"]);
    }

    #[test]
    fn test_missing_project_role_fails() {
        let provider = bindings(
            MemoryProvider::new(),
            kinds::PROJECT_BINDING,
            &PROJECT_ROLES[..3],
            None,
        );
        let report = run(&declaration("[]"), provider);
        let project = report.control("project").unwrap();
        let failed: Vec<_> = project
            .failures()
            .map(|c| (c.instance.as_str(), c.path.as_str()))
            .collect();
        assert_eq!(failed, [("roles/stackdriver.resourceMetadata.writer", "exists")]);
    }

    #[test]
    fn test_registry_roles() {
        let declaration = declaration(
            r#"["us.gcr.io/my-project", "us-west1-docker.pkg.dev/my-project/images"]"#,
        );
        let provider = bindings(
            MemoryProvider::new(),
            kinds::BUCKET_BINDING,
            &["us.artifacts.my-project.appspot.com"],
            Some(GCR_READER),
        );
        let provider = provider.with(
            kinds::REPOSITORY_BINDING,
            json!({
                "name": "projects/my-project/locations/us-west1/repositories/images",
                "role": GAR_READER,
                "members": ["user:someone@example.com"]
            }),
        );
        let report = run(&declaration, provider);
        assert_eq!(report.control("gcr_role").unwrap().status, ControlStatus::Passed);

        let gar = report.control("gar_role").unwrap();
        let failed: Vec<_> = gar.failures().map(|c| c.path.as_str()).collect();
        assert_eq!(failed, ["members"]);
    }
}

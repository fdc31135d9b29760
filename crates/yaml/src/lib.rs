//! The `turnip.yaml` model: adapters, workflows and the projects bound to them.

pub mod adapter;
pub mod image;
pub mod project;
pub mod workflow;

use std::collections::{BTreeMap, HashSet};

pub use adapter::{Adapter, AdapterError, AdapterKind, AdapterSettings, InstallStrategy};
pub use project::{Project, ProjectDocument, ProjectError};
use serde::{Deserialize, Serialize};
pub use workflow::{CommandAction, InitCommand, Workflow, WorkflowDocument, WorkflowError};

/// Schema version understood by this release.
pub const SUPPORTED_VERSION: &str = "v1alpha1";

/// Repository path of the configuration file.
pub const CONFIG_FILE: &str = "turnip.yaml";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("invalid YAML: {0}")]
    Yaml(#[from] serde_yaml::Error),
    #[error("unsupported version {found:?}, expected {SUPPORTED_VERSION}")]
    Version { found: String },
    #[error("workflow {name}: {source}")]
    Workflow { name: String, source: WorkflowError },
    #[error("project {dir}: {source}")]
    Project { dir: String, source: ProjectError },
}

/// A loaded and validated `turnip.yaml`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    pub version: String,
    pub workflows: BTreeMap<String, Workflow>,
    pub projects: Vec<Project>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
struct ConfigDocument {
    version: String,
    workflows: BTreeMap<String, WorkflowDocument>,
    projects: Vec<ProjectDocument>,
}

impl Config {
    /// Parse, resolve every project's workflow and validate the result.
    /// The first malformed declaration aborts the load.
    pub fn load(data: &[u8]) -> Result<Self, ConfigError> {
        let config = Self::parse(data)?;
        config.validate()?;
        Ok(config)
    }

    /// Check the schema version, then parse and resolve workflow references
    /// without validating adapters or images.
    pub fn parse(data: &[u8]) -> Result<Self, ConfigError> {
        let document: ConfigDocument = serde_yaml::from_slice(data)?;
        if document.version != SUPPORTED_VERSION {
            return Err(ConfigError::Version { found: document.version });
        }
        let workflows = document
            .workflows
            .into_iter()
            .map(|(name, workflow)| match Workflow::try_from(workflow) {
                Ok(workflow) => Ok((name, workflow)),
                Err(source) => Err(ConfigError::Workflow { name, source }),
            })
            .collect::<Result<BTreeMap<_, _>, _>>()?;
        let projects = document
            .projects
            .into_iter()
            .map(|project| {
                let resolved = project.check().and_then(|_| {
                    workflows
                        .get(&project.workflow)
                        .cloned()
                        .ok_or_else(|| ProjectError::UnknownWorkflow(project.workflow.clone()))
                });
                match resolved {
                    Ok(workflow) => Ok(Project::bind(project, workflow)),
                    Err(source) => Err(ConfigError::Project { dir: project.dir, source }),
                }
            })
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self { version: document.version, workflows, projects })
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.version != SUPPORTED_VERSION {
            return Err(ConfigError::Version { found: self.version.clone() });
        }
        for (name, workflow) in &self.workflows {
            workflow
                .validate()
                .map_err(|source| ConfigError::Workflow { name: name.clone(), source })?;
        }
        let mut seen = HashSet::new();
        for project in &self.projects {
            let project_error =
                |source| ConfigError::Project { dir: project.dir.clone(), source };
            if !self.workflows.contains_key(&project.workflow) {
                return Err(project_error(ProjectError::UnknownWorkflow(project.workflow.clone())));
            }
            if !seen.insert((project.dir.as_str(), project.workspace_key())) {
                return Err(project_error(ProjectError::Duplicate {
                    field: project.adapter().kind().workspace_field(),
                    value: project.workspace_key().to_string(),
                }));
            }
        }
        Ok(())
    }

    pub fn to_yaml(&self) -> Result<String, serde_yaml::Error> {
        let document = ConfigDocument {
            version: self.version.clone(),
            workflows: self
                .workflows
                .iter()
                .map(|(name, workflow)| (name.clone(), WorkflowDocument::from(workflow.clone())))
                .collect(),
            projects: self.projects.iter().map(|p| p.document(false)).collect(),
        };
        serde_yaml::to_string(&document)
    }

    /// Find a project by directory whose workspace key equals one of `keys`.
    pub fn find_project(&self, dir: &str, keys: &[&str]) -> Option<&Project> {
        self.projects.iter().find(|p| p.dir == dir && keys.contains(&p.workspace_key()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const CONFIG: &str = r#"
version: v1alpha1
workflows:
  tf:
    terraform:
      version: 1.7.5
    image: alpine:3.19
    env:
      TF_IN_AUTOMATION: "1"
    initCommands:
      - run: terraform init -input=false
  charts:
    helmfile:
      versionFrom: .helmfile-version
    image: debian
projects:
  - dir: infra
    workflow: tf
    workspace: staging
    autoPlan: true
  - dir: infra
    workflow: tf
    workspace: production
  - dir: charts
    workflow: charts
    environment: prod
    autoDiff: true
    whenModified:
      - "*.yaml"
      - ../values/**/*.yaml
"#;

    fn load_err(yaml: &str) -> String { Config::load(yaml.as_bytes()).unwrap_err().to_string() }

    #[test]
    fn test_load() {
        let config = Config::load(CONFIG.as_bytes()).unwrap();
        assert_eq!(config.workflows.len(), 2);
        assert_eq!(config.projects.len(), 3);
        let charts = &config.projects[2];
        assert_eq!(charts.adapter().kind(), AdapterKind::Helmfile);
        assert!(charts.auto_plot);
        assert_eq!(charts.workspace_key(), "prod");
        assert_eq!(charts.when_modified, vec!["*.yaml", "../values/**/*.yaml"]);
        assert!(config.find_project("infra", &["production"]).is_some_and(|p| !p.auto_plot));
        assert!(config.find_project("infra", &["", "qa"]).is_none());
    }

    #[test]
    fn test_round_trip() {
        let config = Config::load(CONFIG.as_bytes()).unwrap();
        let yaml = config.to_yaml().unwrap();
        assert!(!yaml.contains("__loadedWorkflow"));
        assert_eq!(Config::load(yaml.as_bytes()).unwrap(), config);
    }

    #[test]
    fn test_version() {
        assert_eq!(
            load_err("version: v1\nworkflows: {}\nprojects: []"),
            "unsupported version \"v1\", expected v1alpha1"
        );
        assert_eq!(load_err("projects: []"), "unsupported version \"\", expected v1alpha1");
    }

    #[test]
    fn test_version_checked_before_workflows() {
        let yaml = "version: v2\nworkflows:\n  tf: {image: alpine}\nprojects:\n  - {dir: a, workflow: missing}\n";
        assert_eq!(load_err(yaml), "unsupported version \"v2\", expected v1alpha1");
        assert!(matches!(
            Config::parse(yaml.as_bytes()),
            Err(ConfigError::Version { found }) if found == "v2"
        ));
    }

    #[test]
    fn test_unknown_workflow_aborts_load() {
        let yaml = "version: v1alpha1\nworkflows:\n  tf: {terraform: {version: 1.0.0}, image: alpine}\nprojects:\n  - dir: a\n    workflow: tf\n  - dir: b\n    workflow: missing\n";
        assert_eq!(load_err(yaml), "project b: workflow missing not found");
        let yaml = "version: v1alpha1\nprojects:\n  - dir: a\n";
        assert_eq!(load_err(yaml), "project a: workflow not set");
    }

    #[test]
    fn test_workflow_errors() {
        let cases: &[(&str, &str)] = &[
            (
                "tf: {terraform: {version: 1.0.0}, pulumi: {version: 3.0.0}, image: alpine}",
                "workflow tf: multiple adapters set (terraform, pulumi), must be only one of terraform, helmfile or pulumi",
            ),
            ("tf: {image: alpine}", "workflow tf: no adapter set, must be one of terraform, helmfile or pulumi"),
            (
                "tf: {terraform: {version: 1.0.0, versionFrom: .tfver}, image: alpine}",
                "workflow tf: adapter terraform: version and versionFrom cannot be set at the same time",
            ),
            (
                "tf: {terraform: {}, image: alpine}",
                "workflow tf: adapter terraform: version, versionFrom, or skipInstall must be set",
            ),
            (
                "tf: {terraform: {skipInstall: true}, image: hashicorp/terraform}",
                "workflow tf: invalid image hashicorp/terraform (docker.io/hashicorp/terraform): must be alpine or debian",
            ),
        ];
        for &(workflows, expected) in cases {
            let yaml = format!("version: v1alpha1\nworkflows:\n  {workflows}\n");
            assert_eq!(load_err(&yaml), expected);
        }
    }

    #[test]
    fn test_duplicate_project() {
        let yaml = "version: v1alpha1\nworkflows:\n  tf: {terraform: {version: 1.0.0}, image: alpine}\nprojects:\n  - {dir: a, workflow: tf, workspace: x}\n  - {dir: a, workflow: tf, workspace: x}\n";
        assert_eq!(load_err(yaml), "project a: declared more than once for workspace \"x\"");
    }

    #[test]
    fn test_invalid_yaml() {
        assert!(load_err("version: [").starts_with("invalid YAML: "));
    }
}

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use turnip_core::models::Command;

use crate::{
    ConfigError,
    adapter::{Adapter, AdapterKind},
    workflow::{Workflow, WorkflowDocument, WorkflowError},
};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ProjectError {
    #[error("workflow not set")]
    WorkflowNotSet,
    #[error("workflow {0} not found")]
    UnknownWorkflow(String),
    #[error("workflow not loaded")]
    WorkflowNotLoaded,
    #[error("dir must be relative to the repository root")]
    AbsoluteDir,
    #[error("declared more than once for {field} {value:?}")]
    Duplicate { field: &'static str, value: String },
    #[error("workflow {name}: {source}")]
    Workflow { name: String, source: WorkflowError },
}

/// A directory-scoped unit of infrastructure bound to its workflow.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Project {
    /// Repository-relative directory.
    pub dir: String,
    pub workspace: String,
    pub environment: String,
    pub stack: String,
    /// Whether pull requests plot this project automatically. Read from the
    /// adapter's own key (`autoPlan`, `autoDiff` or `autoPreview`).
    pub auto_plot: bool,
    pub when_modified: Vec<String>,
    pub env: BTreeMap<String, String>,
    pub pod_annotations: BTreeMap<String, String>,
    /// Name of the workflow this project references.
    pub workflow: String,
    pub loaded_workflow: Workflow,
}

/// A project as written in `turnip.yaml`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ProjectDocument {
    pub dir: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub stack: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub workspace: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub environment: String,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub auto_plan: bool,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub auto_preview: bool,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub auto_diff: bool,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub pod_annotations: BTreeMap<String, String>,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub env: BTreeMap<String, String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub when_modified: Vec<String>,
    pub workflow: String,
    #[serde(rename = "__loadedWorkflow", skip_serializing_if = "Option::is_none")]
    pub loaded_workflow: Option<WorkflowDocument>,
}

impl ProjectDocument {
    pub(crate) fn check(&self) -> Result<(), ProjectError> {
        if self.workflow.is_empty() {
            return Err(ProjectError::WorkflowNotSet);
        }
        if self.dir.starts_with('/') {
            return Err(ProjectError::AbsoluteDir);
        }
        Ok(())
    }
}

impl Project {
    /// Bind a project declaration to its resolved workflow.
    pub fn bind(document: ProjectDocument, workflow: Workflow) -> Self {
        let auto_plot = match workflow.adapter.kind() {
            AdapterKind::Terraform => document.auto_plan,
            AdapterKind::Helmfile => document.auto_diff,
            AdapterKind::Pulumi => document.auto_preview,
        };
        Self {
            dir: document.dir,
            workspace: document.workspace,
            environment: document.environment,
            stack: document.stack,
            auto_plot,
            when_modified: document.when_modified,
            env: document.env,
            pod_annotations: document.pod_annotations,
            workflow: document.workflow,
            loaded_workflow: workflow,
        }
    }

    /// Convert back into its `turnip.yaml` form, optionally embedding the
    /// bound workflow.
    pub fn document(&self, include_workflow: bool) -> ProjectDocument {
        let kind = self.adapter().kind();
        ProjectDocument {
            dir: self.dir.clone(),
            stack: self.stack.clone(),
            workspace: self.workspace.clone(),
            environment: self.environment.clone(),
            auto_plan: kind == AdapterKind::Terraform && self.auto_plot,
            auto_preview: kind == AdapterKind::Pulumi && self.auto_plot,
            auto_diff: kind == AdapterKind::Helmfile && self.auto_plot,
            pod_annotations: self.pod_annotations.clone(),
            env: self.env.clone(),
            when_modified: self.when_modified.clone(),
            workflow: self.workflow.clone(),
            loaded_workflow: include_workflow
                .then(|| WorkflowDocument::from(self.loaded_workflow.clone())),
        }
    }

    /// Serialize the project together with its bound workflow, the form a
    /// dispatched job receives.
    pub fn to_yaml(&self) -> Result<String, serde_yaml::Error> {
        serde_yaml::to_string(&self.document(true))
    }

    /// Restore a project serialized with [`Project::to_yaml`].
    pub fn from_yaml(data: &str) -> Result<Self, ConfigError> {
        let mut document: ProjectDocument = serde_yaml::from_str(data)?;
        let project_error = |dir: &str, source| ConfigError::Project { dir: dir.to_string(), source };
        document.check().map_err(|e| project_error(&document.dir, e))?;
        let Some(workflow) = document.loaded_workflow.take() else {
            return Err(project_error(&document.dir, ProjectError::WorkflowNotLoaded));
        };
        let workflow = Workflow::try_from(workflow)
            .and_then(|w| w.validate().map(|_| w))
            .map_err(|source| {
                project_error(&document.dir, ProjectError::Workflow {
                    name: document.workflow.clone(),
                    source,
                })
            })?;
        Ok(Self::bind(document, workflow))
    }

    pub fn adapter(&self) -> &Adapter { &self.loaded_workflow.adapter }

    pub fn adapter_name(&self) -> &'static str { self.adapter().name() }

    /// Workspace, environment or stack, depending on the adapter.
    pub fn workspace_key(&self) -> &str { self.adapter().workspace_key(self) }

    pub fn command_name(&self, command: Command) -> &'static str {
        self.adapter().kind().command_name(command)
    }

    /// Commit status context identifying this project and command, e.g.
    /// `turnip/terraform/plan/infra/staging`.
    pub fn check_context(&self, command: Command) -> String {
        format!(
            "turnip/{}/{}/{}/{}",
            self.adapter_name(),
            self.command_name(command),
            self.dir,
            self.workspace_key()
        )
    }
}

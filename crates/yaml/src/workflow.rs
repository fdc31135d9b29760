use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::{
    adapter::{Adapter, AdapterError, AdapterKind, AdapterSettings},
    image::ImageReference,
};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum WorkflowError {
    #[error(transparent)]
    Selection(AdapterError),
    #[error("adapter {adapter}: {source}")]
    Adapter { adapter: AdapterKind, source: AdapterError },
    #[error("image not set")]
    MissingImage,
    #[error("invalid image {image}: {reason}")]
    InvalidImage { image: String, reason: String },
    #[error("invalid image {image} ({path}): must be alpine or debian")]
    DisallowedImage { image: String, path: String },
    #[error("command {index}: {source}")]
    Command { index: usize, source: CommandError },
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CommandError {
    #[error("one of run, login or aws must be set")]
    NoAction,
    #[error("only one of run, login or aws may be set")]
    MultipleActions,
}

/// What an init command does.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommandAction {
    /// Shell invocation.
    Run(String),
    /// Tool login shortcut, e.g. a Pulumi backend URL.
    Login(String),
    /// AWS profile setup.
    Aws(String),
}

/// A command run before the tool itself.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "CommandDocument", into = "CommandDocument")]
pub struct InitCommand {
    pub action: CommandAction,
    pub env: BTreeMap<String, String>,
    /// Keep the command's output out of the reported result, even on success.
    pub omit_output: bool,
}

impl InitCommand {
    /// Environment overrides as `KEY=value` pairs.
    pub fn env_pairs(&self) -> Vec<String> { env_pairs(&self.env) }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct CommandDocument {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub run: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub login: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub aws: Option<String>,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub env: BTreeMap<String, String>,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub omit_output: bool,
}

impl TryFrom<CommandDocument> for InitCommand {
    type Error = CommandError;

    fn try_from(value: CommandDocument) -> Result<Self, Self::Error> {
        let mut actions = [
            value.run.map(CommandAction::Run),
            value.login.map(CommandAction::Login),
            value.aws.map(CommandAction::Aws),
        ]
        .into_iter()
        .flatten();
        let action = actions.next().ok_or(CommandError::NoAction)?;
        if actions.next().is_some() {
            return Err(CommandError::MultipleActions);
        }
        Ok(Self { action, env: value.env, omit_output: value.omit_output })
    }
}

impl From<InitCommand> for CommandDocument {
    fn from(value: InitCommand) -> Self {
        let mut document =
            CommandDocument { env: value.env, omit_output: value.omit_output, ..Default::default() };
        match value.action {
            CommandAction::Run(run) => document.run = Some(run),
            CommandAction::Login(login) => document.login = Some(login),
            CommandAction::Aws(aws) => document.aws = Some(aws),
        }
        document
    }
}

/// A named execution environment: one adapter, its image, environment and
/// init commands.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "WorkflowDocument", into = "WorkflowDocument")]
pub struct Workflow {
    pub adapter: Adapter,
    pub image: String,
    pub env: BTreeMap<String, String>,
    pub pod_annotations: BTreeMap<String, String>,
    pub init_commands: Vec<InitCommand>,
}

/// A workflow as written in `turnip.yaml`, before adapter selection.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct WorkflowDocument {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub terraform: Option<AdapterSettings>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub helmfile: Option<AdapterSettings>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pulumi: Option<AdapterSettings>,
    pub image: String,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub env: BTreeMap<String, String>,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub pod_annotations: BTreeMap<String, String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub init_commands: Vec<CommandDocument>,
}

impl TryFrom<WorkflowDocument> for Workflow {
    type Error = WorkflowError;

    fn try_from(value: WorkflowDocument) -> Result<Self, Self::Error> {
        let adapter = Adapter::resolve(value.terraform, value.helmfile, value.pulumi)
            .map_err(WorkflowError::Selection)?;
        let init_commands = value
            .init_commands
            .into_iter()
            .enumerate()
            .map(|(index, command)| {
                InitCommand::try_from(command).map_err(|source| WorkflowError::Command { index, source })
            })
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self {
            adapter,
            image: value.image,
            env: value.env,
            pod_annotations: value.pod_annotations,
            init_commands,
        })
    }
}

impl From<Workflow> for WorkflowDocument {
    fn from(value: Workflow) -> Self {
        let mut document = WorkflowDocument {
            image: value.image,
            env: value.env,
            pod_annotations: value.pod_annotations,
            init_commands: value.init_commands.into_iter().map(CommandDocument::from).collect(),
            ..Default::default()
        };
        match value.adapter.into_parts() {
            (AdapterKind::Terraform, settings) => document.terraform = Some(settings),
            (AdapterKind::Helmfile, settings) => document.helmfile = Some(settings),
            (AdapterKind::Pulumi, settings) => document.pulumi = Some(settings),
        }
        document
    }
}

impl Workflow {
    pub fn validate(&self) -> Result<(), WorkflowError> {
        self.adapter
            .validate()
            .map_err(|source| WorkflowError::Adapter { adapter: self.adapter.kind(), source })?;

        if self.image.is_empty() {
            return Err(WorkflowError::MissingImage);
        }
        let reference = ImageReference::parse(&self.image).map_err(|reason| {
            WorkflowError::InvalidImage { image: self.image.clone(), reason }
        })?;
        if !reference.is_allowed() {
            return Err(WorkflowError::DisallowedImage {
                image: self.image.clone(),
                path: format!("{}/{}", reference.domain, reference.path),
            });
        }
        Ok(())
    }

    /// Environment as `KEY=value` pairs.
    pub fn env_pairs(&self) -> Vec<String> { env_pairs(&self.env) }
}

fn env_pairs(env: &BTreeMap<String, String>) -> Vec<String> {
    env.iter().map(|(k, v)| format!("{k}={v}")).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(yaml: &str) -> Result<Workflow, WorkflowError> {
        let document: WorkflowDocument = serde_yaml::from_str(yaml).unwrap();
        Workflow::try_from(document)
    }

    #[test]
    fn test_single_adapter() {
        let workflow = parse(
            r#"
terraform:
  version: 1.7.5
image: alpine:3.19
env:
  TF_IN_AUTOMATION: "1"
initCommands:
  - run: terraform init
  - aws: production
    omitOutput: true
"#,
        )
        .unwrap();
        assert_eq!(workflow.adapter.kind(), AdapterKind::Terraform);
        assert_eq!(workflow.env_pairs(), vec!["TF_IN_AUTOMATION=1".to_string()]);
        assert_eq!(workflow.init_commands.len(), 2);
        assert_eq!(workflow.init_commands[0].action, CommandAction::Run("terraform init".into()));
        assert!(workflow.init_commands[1].omit_output);
        workflow.validate().unwrap();
    }

    #[test]
    fn test_adapter_selection_errors() {
        assert_eq!(
            parse("image: alpine").unwrap_err(),
            WorkflowError::Selection(AdapterError::NoAdapter)
        );
        let err = parse("terraform: {version: 1.0.0}\nhelmfile: {version: 0.1.0}\nimage: alpine")
            .unwrap_err();
        assert_eq!(
            err.to_string(),
            "multiple adapters set (terraform, helmfile), must be only one of terraform, helmfile or pulumi"
        );
    }

    #[test]
    fn test_validate_errors() {
        let cases: &[(&str, &str)] = &[
            ("pulumi: {}\nimage: alpine", "adapter pulumi: version, versionFrom, or skipInstall must be set"),
            (
                "pulumi: {version: 3.0.0, versionFrom: .pulumi-version}\nimage: alpine",
                "adapter pulumi: version and versionFrom cannot be set at the same time",
            ),
            ("pulumi: {skipInstall: true}", "image not set"),
            (
                "pulumi: {skipInstall: true}\nimage: ubuntu:22.04",
                "invalid image ubuntu:22.04 (docker.io/library/ubuntu): must be alpine or debian",
            ),
            ("pulumi: {skipInstall: true}\nimage: Alpine", "invalid image Alpine: repository name must be lowercase"),
        ];
        for &(yaml, expected) in cases {
            let workflow = parse(yaml).unwrap();
            assert_eq!(workflow.validate().unwrap_err().to_string(), expected, "{yaml}");
        }
    }

    #[test]
    fn test_command_requires_one_action() {
        let err = parse("helmfile: {skipInstall: true}\nimage: debian\ninitCommands:\n  - env: {A: b}")
            .unwrap_err();
        assert_eq!(err.to_string(), "command 0: one of run, login or aws must be set");
        let err = parse(
            "helmfile: {skipInstall: true}\nimage: debian\ninitCommands:\n  - run: a\n  - run: b\n    login: c",
        )
        .unwrap_err();
        assert_eq!(err.to_string(), "command 1: only one of run, login or aws may be set");
    }

    #[test]
    fn test_yaml_round_trip() {
        let workflow = parse(
            "pulumi: {versionFrom: .pulumi-version}\nimage: debian\npodAnnotations: {a: b}\ninitCommands:\n  - login: s3://state",
        )
        .unwrap();
        let yaml = serde_yaml::to_string(&workflow).unwrap();
        let parsed: Workflow = serde_yaml::from_str(&yaml).unwrap();
        assert_eq!(parsed, workflow);
    }
}

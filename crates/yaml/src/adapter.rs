use std::fmt;

use serde::{Deserialize, Serialize};
use turnip_core::models::Command;

use crate::project::Project;

/// The IaC tools turnip knows how to drive.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AdapterKind {
    Terraform,
    Helmfile,
    Pulumi,
}

impl AdapterKind {
    pub const fn variants() -> &'static [Self] { &[Self::Terraform, Self::Helmfile, Self::Pulumi] }

    pub fn name(&self) -> &'static str {
        match self {
            Self::Terraform => "terraform",
            Self::Helmfile => "helmfile",
            Self::Pulumi => "pulumi",
        }
    }

    /// Tool subcommand for the read-only preview.
    pub fn plot_name(&self) -> &'static str {
        match self {
            Self::Terraform => "plan",
            Self::Helmfile => "diff",
            Self::Pulumi => "preview",
        }
    }

    /// Tool subcommand for the mutating apply.
    pub fn lift_name(&self) -> &'static str {
        match self {
            Self::Terraform | Self::Helmfile => "apply",
            Self::Pulumi => "up",
        }
    }

    pub fn command_name(&self, command: Command) -> &'static str {
        match command {
            Command::Plot => self.plot_name(),
            Command::Lift => self.lift_name(),
        }
    }

    /// Name of the project key holding the workspace identifier.
    pub fn workspace_field(&self) -> &'static str {
        match self {
            Self::Terraform => "workspace",
            Self::Helmfile => "environment",
            Self::Pulumi => "stack",
        }
    }

    /// Name of the project key enabling automatic plots.
    pub fn auto_plot_field(&self) -> &'static str {
        match self {
            Self::Terraform => "autoPlan",
            Self::Helmfile => "autoDiff",
            Self::Pulumi => "autoPreview",
        }
    }
}

impl fmt::Display for AdapterKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str(self.name()) }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AdapterError {
    #[error("no adapter set, must be one of terraform, helmfile or pulumi")]
    NoAdapter,
    #[error("multiple adapters set ({}), must be only one of terraform, helmfile or pulumi", .0.join(", "))]
    MultipleAdapters(Vec<&'static str>),
    #[error("version, versionFrom, or skipInstall must be set")]
    MissingInstall,
    #[error("version and versionFrom cannot be set at the same time")]
    VersionConflict,
    #[error("skipInstall cannot be combined with version or versionFrom")]
    SkipInstallConflict,
}

/// Install policy of an adapter as written in `turnip.yaml`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct AdapterSettings {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub version_from: Option<String>,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub skip_install: bool,
}

/// How the runner obtains the tool binary.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InstallStrategy<'a> {
    Version(&'a str),
    /// Path of a file in the repository holding the version.
    VersionFrom(&'a str),
    Skip,
}

impl AdapterSettings {
    pub fn install_strategy(&self) -> Result<InstallStrategy<'_>, AdapterError> {
        let version = self.version.as_deref().filter(|v| !v.is_empty());
        let version_from = self.version_from.as_deref().filter(|v| !v.is_empty());
        match (version, version_from, self.skip_install) {
            (Some(_), Some(_), _) => Err(AdapterError::VersionConflict),
            (Some(_), None, true) | (None, Some(_), true) => Err(AdapterError::SkipInstallConflict),
            (Some(version), None, false) => Ok(InstallStrategy::Version(version)),
            (None, Some(path), false) => Ok(InstallStrategy::VersionFrom(path)),
            (None, None, true) => Ok(InstallStrategy::Skip),
            (None, None, false) => Err(AdapterError::MissingInstall),
        }
    }
}

/// A workflow's tool binding: exactly one adapter kind with its settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Adapter {
    Terraform(AdapterSettings),
    Helmfile(AdapterSettings),
    Pulumi(AdapterSettings),
}

impl Adapter {
    /// Select the single configured adapter. Zero or several is an error.
    pub fn resolve(
        terraform: Option<AdapterSettings>,
        helmfile: Option<AdapterSettings>,
        pulumi: Option<AdapterSettings>,
    ) -> Result<Self, AdapterError> {
        let mut adapters = [
            terraform.map(Self::Terraform),
            helmfile.map(Self::Helmfile),
            pulumi.map(Self::Pulumi),
        ]
        .into_iter()
        .flatten()
        .collect::<Vec<_>>();
        match adapters.len() {
            0 => Err(AdapterError::NoAdapter),
            1 => Ok(adapters.remove(0)),
            _ => Err(AdapterError::MultipleAdapters(
                adapters.iter().map(|a| a.kind().name()).collect(),
            )),
        }
    }

    pub fn kind(&self) -> AdapterKind {
        match self {
            Self::Terraform(_) => AdapterKind::Terraform,
            Self::Helmfile(_) => AdapterKind::Helmfile,
            Self::Pulumi(_) => AdapterKind::Pulumi,
        }
    }

    pub fn settings(&self) -> &AdapterSettings {
        match self {
            Self::Terraform(settings) | Self::Helmfile(settings) | Self::Pulumi(settings) => {
                settings
            }
        }
    }

    pub fn name(&self) -> &'static str { self.kind().name() }

    pub fn version(&self) -> Option<&str> { self.settings().version.as_deref() }

    pub fn validate(&self) -> Result<(), AdapterError> {
        self.settings().install_strategy().map(|_| ())
    }

    /// The project's workspace identifier for this tool. An empty string
    /// selects the tool's default workspace.
    pub fn workspace_key<'a>(&self, project: &'a Project) -> &'a str {
        match self {
            Self::Terraform(_) => &project.workspace,
            Self::Helmfile(_) => &project.environment,
            Self::Pulumi(_) => &project.stack,
        }
    }

    pub(crate) fn into_parts(self) -> (AdapterKind, AdapterSettings) {
        match self {
            Self::Terraform(settings) => (AdapterKind::Terraform, settings),
            Self::Helmfile(settings) => (AdapterKind::Helmfile, settings),
            Self::Pulumi(settings) => (AdapterKind::Pulumi, settings),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn version(v: &str) -> AdapterSettings {
        AdapterSettings { version: Some(v.to_string()), ..Default::default() }
    }

    #[test]
    fn test_resolve_requires_exactly_one() {
        assert_eq!(Adapter::resolve(None, None, None), Err(AdapterError::NoAdapter));
        assert_eq!(
            Adapter::resolve(Some(version("1.5.0")), None, Some(version("3.0.0"))),
            Err(AdapterError::MultipleAdapters(vec!["terraform", "pulumi"]))
        );
        let adapter = Adapter::resolve(None, Some(version("0.160.0")), None).unwrap();
        assert_eq!(adapter.kind(), AdapterKind::Helmfile);
        assert_eq!(adapter.version(), Some("0.160.0"));
    }

    #[test]
    fn test_install_strategy() {
        let cases: &[(AdapterSettings, Result<InstallStrategy, AdapterError>)] = &[
            (version("1.5.0"), Ok(InstallStrategy::Version("1.5.0"))),
            (
                AdapterSettings { version_from: Some(".terraform-version".into()), ..Default::default() },
                Ok(InstallStrategy::VersionFrom(".terraform-version")),
            ),
            (AdapterSettings { skip_install: true, ..Default::default() }, Ok(InstallStrategy::Skip)),
            (AdapterSettings::default(), Err(AdapterError::MissingInstall)),
            (
                AdapterSettings { version: Some(String::new()), ..Default::default() },
                Err(AdapterError::MissingInstall),
            ),
            (
                AdapterSettings {
                    version: Some("1.5.0".into()),
                    version_from: Some(".terraform-version".into()),
                    skip_install: false,
                },
                Err(AdapterError::VersionConflict),
            ),
            (
                AdapterSettings { version: Some("1.5.0".into()), skip_install: true, ..Default::default() },
                Err(AdapterError::SkipInstallConflict),
            ),
        ];
        for (settings, expected) in cases {
            assert_eq!(&settings.install_strategy(), expected, "{settings:?}");
        }
    }

    #[test]
    fn test_command_names() {
        assert_eq!(AdapterKind::Terraform.command_name(Command::Plot), "plan");
        assert_eq!(AdapterKind::Helmfile.command_name(Command::Plot), "diff");
        assert_eq!(AdapterKind::Pulumi.command_name(Command::Plot), "preview");
        assert_eq!(AdapterKind::Terraform.command_name(Command::Lift), "apply");
        assert_eq!(AdapterKind::Helmfile.command_name(Command::Lift), "apply");
        assert_eq!(AdapterKind::Pulumi.command_name(Command::Lift), "up");
    }
}

//! The `/turnip` chat command grammar.

use std::str::FromStr;

use turnip_core::models::Command;
use turnip_yaml::Project;

/// Token a comment must start with to be addressed to turnip.
pub const TRIGGER: &str = "/turnip";

pub const USAGE: &str = "\
Usage:
  /turnip [command] [flags]

Available Commands:
  plot        Plot your infrastructure (aliases: diff, plan, preview, pre)
  lift        Lift your infrastructure (aliases: apply, deploy, up)
  help        Show this message

Flags:
  -d, --directory string     the directory containing the IaC
  -w, --workspace string     the Terraform workspace to use
  -e, --environment string   the Helmfile environment to use
  -s, --stack string         the Pulumi stack to use

--workspace, --environment and --stack are mutually exclusive.
";

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ParseError {
    #[error("unknown command {0:?} for \"/turnip\"")]
    UnknownCommand(String),
    #[error("unknown flag {0}")]
    UnknownFlag(String),
    #[error("flag needs an argument: {0}")]
    MissingValue(String),
    #[error("flag {0} given more than once")]
    DuplicateFlag(String),
    #[error("only one of --workspace, --environment or --stack may be set")]
    ExclusiveFlags,
    #[error("unexpected argument {0:?}")]
    UnexpectedArgument(String),
}

/// Which adapter-specific workspace identifier a command is scoped to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WorkspaceFilter {
    Workspace(String),
    Environment(String),
    Stack(String),
}

impl WorkspaceFilter {
    pub fn value(&self) -> &str {
        match self {
            Self::Workspace(v) | Self::Environment(v) | Self::Stack(v) => v,
        }
    }

    /// Project key the filter applies to, as named by the adapter.
    pub fn field(&self) -> &'static str {
        match self {
            Self::Workspace(_) => "workspace",
            Self::Environment(_) => "environment",
            Self::Stack(_) => "stack",
        }
    }

    fn flag(&self) -> &'static str {
        match self {
            Self::Workspace(_) => "--workspace",
            Self::Environment(_) => "--environment",
            Self::Stack(_) => "--stack",
        }
    }
}

/// A parsed `plot` or `lift` request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatCommand {
    pub command: Command,
    pub directory: Option<String>,
    pub workspace: Option<WorkspaceFilter>,
}

impl ChatCommand {
    /// Whether `project` is within the command's scope. A workspace filter
    /// only matches projects whose adapter uses that kind of key.
    pub fn selects(&self, project: &Project) -> bool {
        if let Some(directory) = &self.directory
            && project.dir != *directory
        {
            return false;
        }
        match &self.workspace {
            Some(filter) => {
                project.adapter().kind().workspace_field() == filter.field()
                    && project.workspace_key() == filter.value()
            }
            None => true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChatRequest {
    Help,
    Run(ChatCommand),
}

impl ChatRequest {
    /// Parse a comment body. Returns `Ok(None)` when the comment is not
    /// addressed to turnip at all. Only the first line is considered.
    pub fn parse(body: &str) -> Result<Option<Self>, ParseError> {
        let line = body.lines().next().unwrap_or_default();
        let mut tokens = line.split_whitespace();
        if tokens.next() != Some(TRIGGER) {
            return Ok(None);
        }
        let Some(subcommand) = tokens.next() else {
            return Ok(Some(Self::Help));
        };
        if matches!(subcommand, "help" | "-h" | "--help") {
            return Ok(Some(Self::Help));
        }
        let command = Command::from_str(subcommand)
            .map_err(|_| ParseError::UnknownCommand(subcommand.to_string()))?;

        let mut directory = None;
        let mut workspace: Option<WorkspaceFilter> = None;
        while let Some(token) = tokens.next() {
            if matches!(token, "-h" | "--help") {
                return Ok(Some(Self::Help));
            }
            if !token.starts_with('-') {
                return Err(ParseError::UnexpectedArgument(token.to_string()));
            }
            let (flag, inline) = match token.split_once('=') {
                Some((flag, value)) => (flag, Some(value)),
                None => (token, None),
            };
            let flag = match flag {
                "-d" | "--directory" => "--directory",
                "-w" | "--workspace" => "--workspace",
                "-e" | "--environment" => "--environment",
                "-s" | "--stack" => "--stack",
                _ => return Err(ParseError::UnknownFlag(flag.to_string())),
            };
            let value = match inline {
                Some(value) => value,
                None => tokens.next().ok_or_else(|| ParseError::MissingValue(flag.to_string()))?,
            }
            .to_string();

            if flag == "--directory" {
                if directory.replace(value).is_some() {
                    return Err(ParseError::DuplicateFlag(flag.to_string()));
                }
                continue;
            }
            let filter = match flag {
                "--workspace" => WorkspaceFilter::Workspace(value),
                "--environment" => WorkspaceFilter::Environment(value),
                _ => WorkspaceFilter::Stack(value),
            };
            if let Some(existing) = &workspace {
                return Err(if existing.flag() == flag {
                    ParseError::DuplicateFlag(flag.to_string())
                } else {
                    ParseError::ExclusiveFlags
                });
            }
            workspace = Some(filter);
        }
        Ok(Some(Self::Run(ChatCommand { command, directory, workspace })))
    }
}

use anyhow::Result;
use argp::FromArgs;
use turnip_yaml::{Config, Project};
use typed_path::Utf8NativePathBuf;

use crate::util::{load_config, native_path};

#[derive(FromArgs, PartialEq, Eq, Debug)]
/// Load and validate a turnip.yaml, then print its projects.
#[argp(subcommand, name = "validate")]
pub struct Args {
    #[argp(option, short = 'c', default = "Utf8NativePathBuf::from(\"turnip.yaml\")", from_str_fn(native_path))]
    /// config file (default: turnip.yaml)
    config: Utf8NativePathBuf,
}

pub fn run(args: Args) -> Result<()> {
    let config = load_config(&args.config)?;
    print!("{}", summary(&config));
    Ok(())
}

fn project_line(project: &Project) -> String {
    let workspace = project.workspace_key();
    format!(
        "{}\t{}\t{}\tworkflow={}\tauto={}",
        project.dir,
        project.adapter_name(),
        if workspace.is_empty() { "-" } else { workspace },
        project.workflow,
        project.auto_plot
    )
}

fn summary(config: &Config) -> String {
    let mut out = format!(
        "{}: {} workflows, {} projects\n",
        config.version,
        config.workflows.len(),
        config.projects.len()
    );
    for project in &config.projects {
        out.push_str(&project_line(project));
        out.push('\n');
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_summary() {
        let config = Config::load(
            br#"
version: v1alpha1
workflows:
  tf:
    terraform:
      version: 1.7.5
    image: alpine
  charts:
    helmfile:
      versionFrom: .helmfile-version
    image: debian
projects:
  - dir: infra
    workflow: tf
    workspace: staging
    autoPlan: true
  - dir: charts
    workflow: charts
"#,
        )
        .unwrap();
        assert_eq!(
            summary(&config),
            "v1alpha1: 2 workflows, 2 projects\n\
             infra\tterraform\tstaging\tworkflow=tf\tauto=true\n\
             charts\thelmfile\t-\tworkflow=charts\tauto=false\n"
        );
    }
}

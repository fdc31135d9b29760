use anyhow::Result;
use argp::FromArgs;
use turnip_core::models::Command;
use turnip_trigger::{ChangedFile, TriggerMode, projects_to_trigger};
use turnip_yaml::Config;
use typed_path::Utf8NativePathBuf;

use crate::util::{load_config, native_path};

#[derive(FromArgs, PartialEq, Eq, Debug)]
/// Print the projects a set of changed paths would trigger.
#[argp(subcommand, name = "match")]
pub struct Args {
    #[argp(option, short = 'c', default = "Utf8NativePathBuf::from(\"turnip.yaml\")", from_str_fn(native_path))]
    /// config file (default: turnip.yaml)
    config: Utf8NativePathBuf,
    #[argp(switch)]
    /// match as a chat command would, ignoring auto-plot flags
    explicit: bool,
    #[argp(positional, greedy)]
    /// changed paths, relative to the repository root
    paths: Vec<String>,
}

pub fn run(args: Args) -> Result<()> {
    let config = load_config(&args.config)?;
    let mode = if args.explicit { TriggerMode::Explicit } else { TriggerMode::Auto };
    for context in matched_contexts(&config, &args.paths, mode) {
        println!("{context}");
    }
    Ok(())
}

fn matched_contexts(config: &Config, paths: &[String], mode: TriggerMode) -> Vec<String> {
    let changes = paths.iter().map(|p| ChangedFile::from(p.as_str())).collect::<Vec<_>>();
    projects_to_trigger(&changes, &config.projects, mode)
        .into_iter()
        .map(|project| project.check_context(Command::Plot))
        .collect()
}

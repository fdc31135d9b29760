use globset::{GlobBuilder, GlobSet, GlobSetBuilder};
use turnip_yaml::Project;

use crate::changes::ChangedFile;

/// Rule used when a project declares no `whenModified` rules: everything
/// below the project directory.
pub const DEFAULT_RULE: &str = "./**/*";

/// Whether triggering honours the per-project auto-plot flag.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TriggerMode {
    /// Pull request driven; projects with auto-plot disabled are skipped.
    Auto,
    /// Chat or API driven; every matching project is considered.
    Explicit,
}

#[derive(Debug, thiserror::Error)]
pub enum MatchError {
    #[error("invalid rule {rule:?}: {source}")]
    Rule { rule: String, source: globset::Error },
    #[error("can't make {path:?} relative to {dir:?}")]
    Relative { path: String, dir: String },
}

/// Anchor a rule to the project directory. Rules already starting with
/// `./` or `../` are kept as written.
pub fn normalize_rule(rule: &str) -> String {
    if rule.starts_with("./") || rule.starts_with("../") {
        rule.to_string()
    } else {
        format!("./{rule}")
    }
}

/// The compiled `whenModified` rules of one project.
#[derive(Debug, Clone)]
pub struct RuleSet {
    rules: Vec<String>,
    globs: GlobSet,
}

impl RuleSet {
    pub fn new<S: AsRef<str>>(rules: &[S]) -> Result<Self, MatchError> {
        let rules = if rules.is_empty() {
            vec![DEFAULT_RULE.to_string()]
        } else {
            rules.iter().map(|r| normalize_rule(r.as_ref())).collect()
        };
        let mut builder = GlobSetBuilder::new();
        for rule in &rules {
            let glob = GlobBuilder::new(rule)
                .literal_separator(true)
                .build()
                .map_err(|source| MatchError::Rule { rule: rule.clone(), source })?;
            builder.add(glob);
        }
        let globs =
            builder.build().map_err(|source| MatchError::Rule { rule: rules.join(", "), source })?;
        Ok(Self { rules, globs })
    }

    pub fn for_project(project: &Project) -> Result<Self, MatchError> {
        Self::new(project.when_modified.as_slice())
    }

    pub fn rules(&self) -> &[String] { &self.rules }

    /// Match an anchored relative path, as produced by [`relative_path`].
    pub fn is_match(&self, relative: &str) -> bool { self.globs.is_match(relative) }
}

/// Split a path into its components, dropping `.` and resolving `..`
/// lexically. Fails when `..` climbs above the start of the path.
fn components(path: &str) -> Option<Vec<&str>> {
    let mut parts = Vec::new();
    for part in path.split('/') {
        match part {
            "" | "." => {}
            ".." => {
                parts.pop()?;
            }
            part => parts.push(part),
        }
    }
    Some(parts)
}

/// Express `path` relative to `dir`, both repository-relative. The result is
/// anchored with `./` unless it leaves `dir`, in which case it starts with
/// `..`.
pub fn relative_path(dir: &str, path: &str) -> Result<String, MatchError> {
    let error = || MatchError::Relative { path: path.to_string(), dir: dir.to_string() };
    if dir.starts_with('/') != path.starts_with('/') {
        return Err(error());
    }
    let (Some(base), Some(target)) = (components(dir), components(path)) else {
        return Err(error());
    };
    let common = base.iter().zip(&target).take_while(|(a, b)| a == b).count();
    let mut relative = vec![".."; base.len() - common];
    relative.extend_from_slice(&target[common..]);
    if relative.is_empty() {
        return Ok(".".to_string());
    }
    let relative = relative.join("/");
    if relative.starts_with("..") { Ok(relative) } else { Ok(format!("./{relative}")) }
}

/// Whether any of the changes touches a path covered by `rules`, seen from
/// `dir`. Paths that can't be made relative are logged and skipped.
pub fn matches_changes(dir: &str, rules: &RuleSet, changes: &[ChangedFile]) -> bool {
    changes.iter().any(|change| match relative_path(dir, change.path()) {
        Ok(relative) => rules.is_match(&relative),
        Err(e) => {
            tracing::warn!("Skipping {} for project {dir}: {e}", change.path());
            false
        }
    })
}

/// Projects that must run for the given changes, in declaration order and
/// without duplicates.
pub fn projects_to_trigger<'a>(
    changes: &[ChangedFile],
    projects: &'a [Project],
    mode: TriggerMode,
) -> Vec<&'a Project> {
    let mut triggered: Vec<&'a Project> = Vec::new();
    for project in projects {
        if mode == TriggerMode::Auto && !project.auto_plot {
            tracing::debug!("Skipping {} ({}): auto plot disabled", project.dir, project.workspace_key());
            continue;
        }
        let rules = match RuleSet::for_project(project) {
            Ok(rules) => rules,
            Err(e) => {
                tracing::warn!("Skipping project {}: {e}", project.dir);
                continue;
            }
        };
        if matches_changes(&project.dir, &rules, changes) && !triggered.contains(&project) {
            triggered.push(project);
        }
    }
    triggered
}

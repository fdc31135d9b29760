//! Decides which projects run for a change: path-rule matching against the
//! files a pull request touches, and the `/turnip` chat grammar.

pub mod changes;
pub mod command;
pub mod matching;

pub use changes::ChangedFile;
pub use command::{ChatCommand, ChatRequest, ParseError, USAGE, WorkspaceFilter};
pub use matching::{MatchError, RuleSet, TriggerMode, projects_to_trigger, relative_path};

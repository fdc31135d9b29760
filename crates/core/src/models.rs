use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};

/// The two actions turnip runs against a project.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Command {
    /// Read-only preview (`plan`, `diff`, `preview`).
    Plot,
    /// Mutating apply (`apply`, `up`).
    Lift,
}

impl Command {
    pub const fn variants() -> &'static [Self] { &[Self::Plot, Self::Lift] }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Plot => "plot",
            Self::Lift => "lift",
        }
    }

    pub fn aliases(&self) -> &'static [&'static str] {
        match self {
            Self::Plot => &["diff", "plan", "preview", "pre"],
            Self::Lift => &["apply", "deploy", "up"],
        }
    }
}

impl FromStr for Command {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::variants()
            .iter()
            .find(|c| c.as_str() == s || c.aliases().contains(&s))
            .copied()
            .ok_or(())
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str(self.as_str()) }
}

/// Lifecycle of a check run. Terminal states are absorbing.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Serialize, Deserialize)]
pub enum CheckState {
    Queued,
    Running,
    Succeeded,
    Failed,
}

impl CheckState {
    pub fn is_terminal(&self) -> bool { matches!(self, Self::Succeeded | Self::Failed) }

    pub fn can_transition_to(&self, next: CheckState) -> bool {
        match (self, next) {
            (Self::Queued, Self::Running) => true,
            // A job may fail to start (or finish before its start report lands).
            (Self::Queued | Self::Running, Self::Succeeded | Self::Failed) => true,
            (Self::Running, Self::Running) => true,
            _ => false,
        }
    }

    /// Commit status `state` value for this check state.
    pub fn status_state(&self) -> &'static str {
        match self {
            Self::Queued | Self::Running => "pending",
            Self::Succeeded => "success",
            Self::Failed => "failure",
        }
    }

    pub fn description(&self) -> &'static str {
        match self {
            Self::Queued => "Queued",
            Self::Running => "Turnip is running",
            Self::Succeeded => "Turnip succeeded",
            Self::Failed => "Turnip failed",
        }
    }
}

#[derive(Debug, Clone, Copy, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Conclusion {
    Success,
    Failure,
}

impl From<Conclusion> for CheckState {
    fn from(value: Conclusion) -> Self {
        match value {
            Conclusion::Success => Self::Succeeded,
            Conclusion::Failure => Self::Failed,
        }
    }
}

/// Terminal status reported back by a dispatched job.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum JobStatus {
    Succeeded,
    Failed,
}

impl JobStatus {
    pub fn conclusion(&self) -> Conclusion {
        match self {
            Self::Succeeded => Conclusion::Success,
            Self::Failed => Conclusion::Failure,
        }
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Succeeded => "Succeeded",
            Self::Failed => "Failed",
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_command_aliases() {
        for (input, expected) in [
            ("plot", Command::Plot),
            ("plan", Command::Plot),
            ("diff", Command::Plot),
            ("preview", Command::Plot),
            ("pre", Command::Plot),
            ("lift", Command::Lift),
            ("apply", Command::Lift),
            ("deploy", Command::Lift),
            ("up", Command::Lift),
        ] {
            assert_eq!(input.parse::<Command>(), Ok(expected), "{input}");
        }
        assert!("bogus".parse::<Command>().is_err());
        assert!("Plan".parse::<Command>().is_err());
    }

    #[test]
    fn test_terminal_states_are_absorbing() {
        use CheckState::*;
        for terminal in [Succeeded, Failed] {
            for next in [Queued, Running, Succeeded, Failed] {
                assert!(!terminal.can_transition_to(next));
            }
        }
        assert!(Queued.can_transition_to(Running));
        assert!(Running.can_transition_to(Succeeded));
        assert!(Queued.can_transition_to(Failed));
        assert!(!Running.can_transition_to(Queued));
    }

    #[test]
    fn test_job_status_wire_format() {
        let status: JobStatus = serde_json::from_str("\"SUCCEEDED\"").unwrap();
        assert_eq!(status, JobStatus::Succeeded);
        assert_eq!(status.conclusion(), Conclusion::Success);
        assert_eq!(CheckState::from(JobStatus::Failed.conclusion()), CheckState::Failed);
    }
}

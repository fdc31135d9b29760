use serde::{Deserialize, Serialize};

/// One file touched by a pull request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum ChangedFile {
    Added { path: String },
    Modified { path: String },
    Renamed { old_path: String, new_path: String },
    Deleted { old_path: String },
}

impl ChangedFile {
    /// The path that counts for matching: the new path, unless the file was
    /// deleted, in which case only the old path exists.
    pub fn path(&self) -> &str {
        match self {
            Self::Added { path } | Self::Modified { path } => path,
            Self::Renamed { new_path, .. } => new_path,
            Self::Deleted { old_path } => old_path,
        }
    }

    pub fn is_delete(&self) -> bool { matches!(self, Self::Deleted { .. }) }
}

impl From<&str> for ChangedFile {
    fn from(path: &str) -> Self { Self::Modified { path: path.to_string() } }
}

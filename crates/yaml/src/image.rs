use std::sync::OnceLock;

use regex::Regex;

/// Base image families a workflow may run in.
pub const ALLOWED_IMAGES: &[&str] = &["library/alpine", "library/debian"];

const DEFAULT_DOMAIN: &str = "docker.io";

/// A normalized container image reference.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageReference {
    pub domain: String,
    pub path: String,
    pub tag: Option<String>,
    pub digest: Option<String>,
}

impl ImageReference {
    /// Parse a Docker-style reference, filling in the Docker Hub defaults
    /// (`alpine` becomes `docker.io/library/alpine`).
    pub fn parse(image: &str) -> Result<Self, String> {
        if image.is_empty() {
            return Err("empty reference".to_string());
        }
        let (name, digest) = match image.split_once('@') {
            Some((name, digest)) => {
                static DIGEST: OnceLock<Regex> = OnceLock::new();
                let regex = DIGEST.get_or_init(|| {
                    Regex::new(r"^[A-Za-z][A-Za-z0-9]*(?:[-_+.][A-Za-z][A-Za-z0-9]*)*:[0-9a-fA-F]{32,}$")
                        .unwrap()
                });
                if !regex.is_match(digest) {
                    return Err(format!("invalid digest {digest}"));
                }
                (name, Some(digest.to_string()))
            }
            None => (image, None),
        };

        let (domain, remainder) = match name.split_once('/') {
            Some((first, rest))
                if first.contains('.') || first.contains(':') || first == "localhost" =>
            {
                (first, rest)
            }
            _ => (DEFAULT_DOMAIN, name),
        };
        let domain = if domain == "index.docker.io" { DEFAULT_DOMAIN } else { domain };

        let (path, tag) = match remainder.rsplit_once(':') {
            Some((path, tag)) => {
                static TAG: OnceLock<Regex> = OnceLock::new();
                let regex = TAG.get_or_init(|| Regex::new(r"^\w[\w.-]{0,127}$").unwrap());
                if !regex.is_match(tag) {
                    return Err(format!("invalid tag {tag}"));
                }
                (path, Some(tag.to_string()))
            }
            None => (remainder, None),
        };

        static COMPONENT: OnceLock<Regex> = OnceLock::new();
        let component = COMPONENT
            .get_or_init(|| Regex::new(r"^[a-z0-9]+(?:(?:[._]|__|-+)[a-z0-9]+)*$").unwrap());
        for part in path.split('/') {
            if !component.is_match(part) {
                if part.chars().any(|c| c.is_ascii_uppercase()) {
                    return Err("repository name must be lowercase".to_string());
                }
                return Err(format!("invalid path component {part:?}"));
            }
        }

        let path = if domain == DEFAULT_DOMAIN && !path.contains('/') {
            format!("library/{path}")
        } else {
            path.to_string()
        };
        Ok(Self { domain: domain.to_string(), path, tag, digest })
    }

    pub fn is_allowed(&self) -> bool {
        self.domain == DEFAULT_DOMAIN && ALLOWED_IMAGES.contains(&self.path.as_str())
    }
}

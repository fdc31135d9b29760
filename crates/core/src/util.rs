use anyhow::{Context, Result};
use url::Url;

pub trait UrlExt {
    fn path_and_query(&self) -> &str;
}

impl UrlExt for Url {
    #[inline]
    fn path_and_query(&self) -> &str { &self[url::Position::BeforePath..] }
}

/// Reduce an absolute API URL (as found in webhook payloads) to the route
/// relative to the API host, e.g. `https://api.github.com/repos/o/r` -> `/repos/o/r`.
/// Routes that are already relative are returned unchanged.
pub fn api_route(url: &str) -> Result<String> {
    if url.starts_with('/') {
        return Ok(url.to_string());
    }
    let parsed = Url::parse(url).with_context(|| format!("Invalid URL {url}"))?;
    Ok(parsed.path_and_query().to_string())
}

/// Replace `/` and `_` so a value can be used in a Kubernetes name or label.
pub fn normalize_name(value: &str) -> String { value.replace(['/', '_'], "-") }

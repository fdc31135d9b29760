use anyhow::{Context, Result};
use turnip_yaml::Config;
use typed_path::Utf8NativePathBuf;

// For argp::FromArgs
pub fn native_path(value: &str) -> Result<Utf8NativePathBuf, String> {
    Ok(Utf8NativePathBuf::from(value))
}

pub fn load_config(path: &Utf8NativePathBuf) -> Result<Config> {
    let data = std::fs::read(path.with_platform_encoding())
        .with_context(|| format!("Failed to read {path}"))?;
    let config = Config::load(&data).with_context(|| format!("Failed to load {path}"))?;
    tracing::debug!("Loaded {} projects from {path}", config.projects.len());
    Ok(config)
}

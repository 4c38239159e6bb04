use anyhow::{Context, Result};
use serde::Deserialize;
use std::{fs, path::PathBuf};

/// OAuth app settings, read from `~/.gitship.toml`. Only `client_id` is
/// required; everything else defaults to the public github.com endpoints.
#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub client_id: String,
    #[serde(default = "default_redirect_uri")]
    pub redirect_uri: String,
    #[serde(default = "default_auth_base")]
    pub auth_base: String,
    #[serde(default = "default_api_base")]
    pub api_base: String,
    #[serde(default = "default_scope")]
    pub scope: String,
}

fn default_redirect_uri() -> String {
    "http://localhost:8080/callback".to_string()
}

fn default_auth_base() -> String {
    "https://github.com".to_string()
}

fn default_api_base() -> String {
    "https://api.github.com".to_string()
}

fn default_scope() -> String {
    "repo".to_string()
}

impl Config {
    pub fn load() -> Result<Self> {
        let mut path: PathBuf = dirs::home_dir().context("could not find home directory")?;
        path.push(".gitship.toml");

        let s = fs::read_to_string(&path)
            .with_context(|| format!("failed to read {}", path.display()))?;

        let cfg: Config = toml::from_str(&s).context("failed to parse .gitship.toml")?;

        Ok(cfg)
    }

    /// API base for building sessions: the configured one when
    /// `~/.gitship.toml` exists, the public endpoint otherwise. Only `login`
    /// needs the full config; a missing file is fine everywhere else, but a
    /// malformed one is still an error.
    pub fn api_base_or_default() -> Result<String> {
        let mut path: PathBuf = dirs::home_dir().context("could not find home directory")?;
        path.push(".gitship.toml");
        api_base_from(&path)
    }
}

fn api_base_from(path: &std::path::Path) -> Result<String> {
    if !path.try_exists()? {
        return Ok(default_api_base());
    }
    let s = fs::read_to_string(path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    let cfg: Config = toml::from_str(&s).context("failed to parse .gitship.toml")?;
    Ok(cfg.api_base)
}

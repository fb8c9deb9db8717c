//! Pipeline configuration stored under `.factory/config.toml`.

use std::collections::BTreeMap;
use std::env;
use std::fs;
use std::path::Path;

use anyhow::{Context, Result, anyhow};
use serde::{Deserialize, Serialize};

/// Pipeline configuration (TOML).
///
/// This file is intended to be edited by humans and must remain stable and
/// automatable. Missing fields default to sensible values. Credentials are
/// the exception: the access token is read from the environment only and is
/// never written to disk.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct PipelineConfig {
    /// Events retained for replay to late subscribers.
    pub event_buffer_capacity: usize,

    pub export: ExportConfig,

    pub git: GitSettings,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct ExportConfig {
    /// Total byte budget for file bodies embedded in an archive.
    pub max_bytes: u64,

    /// Per-file byte budget; larger files are truncated.
    pub max_file_bytes: u64,
}

impl Default for ExportConfig {
    fn default() -> Self {
        Self {
            max_bytes: 10_000_000,
            max_file_bytes: 1_000_000,
        }
    }
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            event_buffer_capacity: 1000,
            export: ExportConfig::default(),
            git: GitSettings::default(),
        }
    }
}

impl PipelineConfig {
    pub fn validate(&self) -> Result<()> {
        if self.event_buffer_capacity == 0 {
            return Err(anyhow!("event_buffer_capacity must be > 0"));
        }
        if self.export.max_bytes == 0 {
            return Err(anyhow!("export.max_bytes must be > 0"));
        }
        if self.export.max_file_bytes == 0 {
            return Err(anyhow!("export.max_file_bytes must be > 0"));
        }
        Ok(())
    }
}

/// Git identity and push credentials.
///
/// Constructed explicitly and passed to the git manager, so its behavior is
/// a pure function of inputs rather than ambient process state. Use
/// [`GitSettings::from_env`] (or [`GitSettings::merged_with_env`]) at the
/// edge to pick up `GIT_USER_NAME`, `GIT_USER_EMAIL`, `GIT_REPO_URL`, and
/// `GIT_PAT`.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct GitSettings {
    pub user_name: Option<String>,
    pub user_email: Option<String>,
    pub repo_url: Option<String>,
    /// Personal-access token. Environment-only: never serialized.
    #[serde(skip)]
    pub token: Option<String>,
}

impl GitSettings {
    /// Read settings from the process environment. Empty values count as
    /// unset.
    pub fn from_env() -> Self {
        Self {
            user_name: env_nonempty("GIT_USER_NAME"),
            user_email: env_nonempty("GIT_USER_EMAIL"),
            repo_url: env_nonempty("GIT_REPO_URL"),
            token: env_nonempty("GIT_PAT"),
        }
    }

    /// Overlay environment values on top of file-sourced settings; the
    /// environment wins where both are present.
    pub fn merged_with_env(self) -> Self {
        let env = Self::from_env();
        Self {
            user_name: env.user_name.or(self.user_name),
            user_email: env.user_email.or(self.user_email),
            repo_url: env.repo_url.or(self.repo_url),
            token: env.token.or(self.token),
        }
    }

    /// Both halves of the commit identity are present.
    pub fn has_identity(&self) -> bool {
        self.user_name.is_some() && self.user_email.is_some()
    }

    /// Names of the push prerequisites that are missing, in a fixed order.
    pub fn missing_push_settings(&self) -> Vec<&'static str> {
        let mut missing = Vec::new();
        if self.repo_url.is_none() {
            missing.push("GIT_REPO_URL");
        }
        if self.user_name.is_none() {
            missing.push("GIT_USER_NAME");
        }
        if self.token.is_none() {
            missing.push("GIT_PAT");
        }
        missing
    }
}

fn env_nonempty(name: &str) -> Option<String> {
    match env::var(name) {
        Ok(value) if !value.is_empty() => Some(value),
        _ => None,
    }
}

/// Load config from a TOML file.
///
/// If the file is missing, returns `PipelineConfig::default()`.
pub fn load_config(path: &Path) -> Result<PipelineConfig> {
    if !path.exists() {
        let cfg = PipelineConfig::default();
        cfg.validate()?;
        return Ok(cfg);
    }
    let contents = fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
    let cfg: PipelineConfig =
        toml::from_str(&contents).with_context(|| format!("parse {}", path.display()))?;
    cfg.validate()?;
    Ok(cfg)
}

/// Atomically write config to disk (temp file + rename).
pub fn write_config(path: &Path, cfg: &PipelineConfig) -> Result<()> {
    cfg.validate()?;
    let mut buf = toml::to_string_pretty(cfg).context("serialize config toml")?;
    buf.push('\n');
    let parent = path
        .parent()
        .with_context(|| format!("config path missing parent {}", path.display()))?;
    fs::create_dir_all(parent).with_context(|| format!("create directory {}", parent.display()))?;
    let tmp_path = path.with_extension("toml.tmp");
    fs::write(&tmp_path, &buf)
        .with_context(|| format!("write temp config {}", tmp_path.display()))?;
    fs::rename(&tmp_path, path).with_context(|| format!("replace config {}", path.display()))?;
    Ok(())
}

/// Free-form labels attached to a run by the orchestrator, as read from
/// config or CLI `key=value` pairs.
pub fn parse_labels(pairs: &[String]) -> Result<BTreeMap<String, String>> {
    let mut labels = BTreeMap::new();
    for pair in pairs {
        let (key, value) = pair
            .split_once('=')
            .with_context(|| format!("label {pair:?} must be key=value"))?;
        labels.insert(key.to_string(), value.to_string());
    }
    Ok(labels)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn load_missing_returns_default() {
        let temp = tempfile::tempdir().expect("tempdir");
        let cfg = load_config(&temp.path().join("missing.toml")).expect("load");
        assert_eq!(cfg, PipelineConfig::default());
    }

    #[test]
    fn write_then_load_round_trips() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().join("config.toml");
        let mut cfg = PipelineConfig::default();
        cfg.event_buffer_capacity = 64;
        write_config(&path, &cfg).expect("write");
        let loaded = load_config(&path).expect("load");
        assert_eq!(loaded, cfg);
    }

    #[test]
    fn token_is_never_serialized() {
        let mut cfg = PipelineConfig::default();
        cfg.git.token = Some("ghp_secret".to_string());
        let raw = toml::to_string_pretty(&cfg).expect("serialize");
        assert!(!raw.contains("ghp_secret"));
        assert!(!raw.contains("token"));
    }

    #[test]
    fn zero_capacity_fails_validation() {
        let mut cfg = PipelineConfig::default();
        cfg.event_buffer_capacity = 0;
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn missing_push_settings_are_named_in_order() {
        let settings = GitSettings {
            user_name: Some("dev".to_string()),
            ..GitSettings::default()
        };
        assert_eq!(settings.missing_push_settings(), vec!["GIT_REPO_URL", "GIT_PAT"]);
        assert!(!settings.has_identity());
    }

    #[test]
    fn parse_labels_requires_key_value() {
        let labels = parse_labels(&["env=ci".to_string(), "team=core".to_string()]).expect("parse");
        assert_eq!(labels.get("env").map(String::as_str), Some("ci"));
        assert!(parse_labels(&["bare".to_string()]).is_err());
    }
}

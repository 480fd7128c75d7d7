//! Configuration for the registry tool.
//!
//! One JSON file (default `~/.regfile`) supplies the store location, the
//! journal location and the commit policy. A missing file is created with
//! defaults and reported distinctly so the caller can show the one-time
//! first-run warning and cancel the requested operation. Environment
//! variables override individual values:
//!
//! - `REGFILE_DB`      store file path
//! - `REGFILE_LOG`     journal file path
//! - `REGFILE_COMMIT`  auto | confirm | problem

use anyhow::{Context, Result};
use log::warn;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::engine::commit::CommitMode;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RegfileConfig {
    /// Registry store file.
    pub db: PathBuf,
    /// Append-only mutation journal.
    pub log: PathBuf,
    /// Commit policy applied when no CLI override is given.
    #[serde(default)]
    pub commit: CommitMode,
}

impl Default for RegfileConfig {
    fn default() -> Self {
        let home = home_dir();
        Self {
            db: home.join("dbfile.db"),
            log: home.join("dbfile.log"),
            commit: CommitMode::Auto,
        }
    }
}

/// A loaded configuration plus where it came from.
#[derive(Debug)]
pub struct LoadedConfig {
    pub config: RegfileConfig,
    pub path: PathBuf,
    /// True when the file did not exist and a default one was written.
    pub created: bool,
}

pub fn default_config_path() -> PathBuf {
    home_dir().join(".regfile")
}

/// Load the configuration, writing a default file when none exists.
pub fn load_or_init(path: Option<&Path>) -> Result<LoadedConfig> {
    let path = path.map(Path::to_path_buf).unwrap_or_else(default_config_path);
    if path.exists() {
        let text = fs::read_to_string(&path)
            .with_context(|| format!("read config {}", path.display()))?;
        let mut config: RegfileConfig = serde_json::from_str(&text)
            .with_context(|| format!("parse config {}", path.display()))?;
        apply_env(&mut config);
        Ok(LoadedConfig {
            config,
            path,
            created: false,
        })
    } else {
        let config = RegfileConfig::default();
        let text = serde_json::to_string_pretty(&config)?;
        fs::write(&path, text + "\n")
            .with_context(|| format!("write default config {}", path.display()))?;
        Ok(LoadedConfig {
            config,
            path,
            created: true,
        })
    }
}

fn apply_env(config: &mut RegfileConfig) {
    if let Ok(v) = std::env::var("REGFILE_DB") {
        config.db = PathBuf::from(v);
    }
    if let Ok(v) = std::env::var("REGFILE_LOG") {
        config.log = PathBuf::from(v);
    }
    if let Ok(v) = std::env::var("REGFILE_COMMIT") {
        match v.parse::<CommitMode>() {
            Ok(mode) => config.commit = mode,
            Err(e) => warn!("REGFILE_COMMIT ignored: {}", e),
        }
    }
}

fn home_dir() -> PathBuf {
    std::env::var_os("HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("."))
}

//! Station configuration stored as TOML (default `station.toml`).

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use serde::{Deserialize, Serialize};

/// Upper bound for `timeout_secs` (one week).
pub const MAX_TIMEOUT_SECS: u64 = 7 * 24 * 60 * 60;

/// Station configuration (TOML).
///
/// Missing fields default to values suitable for a local `tofu` install.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct StationConfig {
    /// Engine binary: a path, or a bare name looked up on `PATH`.
    pub engine_path: PathBuf,

    /// Working directory used when a request carries no override.
    pub working_dir: PathBuf,

    /// Wall-clock budget for one engine run, in seconds.
    pub timeout_secs: u64,

    /// Merged output kept per run; the rest is counted and dropped.
    pub output_limit_bytes: usize,

    /// Serialize plan/apply/destroy/state runs per working directory within this process.
    pub serialize_mutations: bool,

    /// Directory for JSON Lines operation records. No records are written when unset.
    pub records_dir: Option<PathBuf>,

    /// Default tracing filter when `RUST_LOG` is unset.
    pub log_level: String,

    pub id_prefix: String,
}

impl Default for StationConfig {
    fn default() -> Self {
        Self {
            engine_path: PathBuf::from("tofu"),
            working_dir: PathBuf::from("./tofu"),
            timeout_secs: 30 * 60,
            output_limit_bytes: 1_000_000,
            serialize_mutations: false,
            records_dir: None,
            log_level: "info".to_string(),
            id_prefix: "tofu".to_string(),
        }
    }
}

impl StationConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn validate(&self) -> Result<()> {
        if self.engine_path.as_os_str().is_empty() {
            return Err(anyhow!("engine_path must be set"));
        }
        if self.timeout_secs == 0 {
            return Err(anyhow!("timeout_secs must be > 0"));
        }
        if self.timeout_secs > MAX_TIMEOUT_SECS {
            return Err(anyhow!("timeout_secs must be <= {MAX_TIMEOUT_SECS}"));
        }
        if self.output_limit_bytes == 0 {
            return Err(anyhow!("output_limit_bytes must be > 0"));
        }
        if self.id_prefix.trim().is_empty() {
            return Err(anyhow!("id_prefix must be non-empty"));
        }
        Ok(())
    }
}

/// Load config from a TOML file.
///
/// If the file is missing, returns `StationConfig::default()`.
pub fn load_config(path: &Path) -> Result<StationConfig> {
    if !path.exists() {
        let cfg = StationConfig::default();
        cfg.validate()?;
        return Ok(cfg);
    }
    let contents = fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
    let cfg: StationConfig =
        toml::from_str(&contents).with_context(|| format!("parse {}", path.display()))?;
    cfg.validate()
        .with_context(|| format!("invalid config {}", path.display()))?;
    Ok(cfg)
}

/// Atomically write config to disk (temp file + rename).
pub fn write_config(path: &Path, cfg: &StationConfig) -> Result<()> {
    cfg.validate()?;
    let mut buf = toml::to_string_pretty(cfg).context("serialize config toml")?;
    buf.push('\n');
    write_atomic(path, &buf)
}

fn write_atomic(path: &Path, contents: &str) -> Result<()> {
    let parent = path
        .parent()
        .with_context(|| format!("config path missing parent {}", path.display()))?;
    fs::create_dir_all(parent).with_context(|| format!("create directory {}", parent.display()))?;
    let tmp_path = path.with_extension("toml.tmp");
    fs::write(&tmp_path, contents)
        .with_context(|| format!("write temp config {}", tmp_path.display()))?;
    fs::rename(&tmp_path, path).with_context(|| format!("replace config {}", path.display()))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn load_missing_returns_default() {
        let temp = tempfile::tempdir().expect("tempdir");
        let cfg = load_config(&temp.path().join("missing.toml")).expect("load");
        assert_eq!(cfg, StationConfig::default());
    }

    #[test]
    fn write_then_load_round_trips() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().join("station.toml");
        let cfg = StationConfig {
            records_dir: Some(temp.path().join("records")),
            serialize_mutations: true,
            ..StationConfig::default()
        };
        write_config(&path, &cfg).expect("write");
        let loaded = load_config(&path).expect("load");
        assert_eq!(loaded, cfg);
    }

    #[test]
    fn partial_file_fills_defaults() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().join("station.toml");
        fs::write(&path, "engine_path = \"/usr/local/bin/tofu\"\ntimeout_secs = 90\n")
            .expect("write");

        let cfg = load_config(&path).expect("load");
        assert_eq!(cfg.engine_path, PathBuf::from("/usr/local/bin/tofu"));
        assert_eq!(cfg.timeout(), Duration::from_secs(90));
        assert_eq!(cfg.output_limit_bytes, 1_000_000);
    }

    #[test]
    fn zero_timeout_is_rejected() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().join("station.toml");
        fs::write(&path, "timeout_secs = 0\n").expect("write");

        let err = load_config(&path).unwrap_err();
        assert!(format!("{err:#}").contains("timeout_secs must be > 0"));
    }

    #[test]
    fn oversized_timeout_is_rejected() {
        let cfg = StationConfig {
            timeout_secs: i64::MAX as u64,
            ..StationConfig::default()
        };
        let err = cfg.validate().unwrap_err();
        assert!(err.to_string().contains("timeout_secs must be <="));

        let cfg = StationConfig {
            timeout_secs: MAX_TIMEOUT_SECS,
            ..StationConfig::default()
        };
        assert!(cfg.validate().is_ok());
    }
}

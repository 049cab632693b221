// Copyright 2025 Lablup Inc. and Jeongkyu Shin
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Configuration file handling for sshfan.

use anyhow::{Context, Result};
use directories::BaseDirs;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tokio::fs;

pub const DEFAULT_PARALLEL: usize = 5;
pub const DEFAULT_CONNECT_TIMEOUT: u64 = 30;

#[derive(Debug, Serialize, Deserialize, Default, Clone)]
pub struct Config {
    #[serde(default)]
    pub defaults: Defaults,
}

/// Values used when the command line leaves them unset.
#[derive(Debug, Serialize, Deserialize, Default, Clone, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct Defaults {
    pub user: Option<String>,
    pub port: Option<u16>,
    pub ssh_key: Option<String>,
    pub parallel: Option<usize>,
    /// Transport connect timeout in seconds. Remote commands never time out.
    pub connect_timeout: Option<u64>,
}

impl Config {
    /// Load configuration from a file.
    ///
    /// A missing file yields the default configuration unless `required` is
    /// set, which is the case when the path was given explicitly.
    pub async fn load(path: &Path, required: bool) -> Result<Self> {
        let expanded_path = expand_tilde(path);

        if !expanded_path.exists() {
            if required {
                anyhow::bail!(
                    "Configuration file not found at {}",
                    expanded_path.display()
                );
            }
            tracing::debug!(
                "Config file not found at {:?}, using defaults",
                expanded_path
            );
            return Ok(Self::default());
        }

        let content = fs::read_to_string(&expanded_path)
            .await
            .with_context(|| format!("Failed to read configuration file at {}. Please check file permissions and ensure the file is accessible.", expanded_path.display()))?;

        Self::parse(&content).with_context(|| {
            format!(
                "Failed to parse YAML configuration file at {}",
                expanded_path.display()
            )
        })
    }

    pub fn parse(content: &str) -> Result<Self> {
        if content.trim().is_empty() {
            return Ok(Self::default());
        }
        let config: Config = serde_yaml::from_str(content).context(
            "Invalid YAML. Common issues:\n  - Incorrect indentation (use spaces, not tabs)\n  - Missing colons after keys\n  - Unknown keys under 'defaults'",
        )?;
        if config.defaults.parallel == Some(0) {
            anyhow::bail!("'defaults.parallel' must be at least 1");
        }
        Ok(config)
    }

    pub fn default_path() -> Option<PathBuf> {
        BaseDirs::new().map(|dirs| {
            dirs.home_dir()
                .join(".config")
                .join(env!("CARGO_PKG_NAME"))
                .join("config.yaml")
        })
    }

    pub fn ssh_key_path(&self) -> Option<PathBuf> {
        self.defaults
            .ssh_key
            .as_ref()
            .map(|key| expand_tilde(Path::new(key)))
    }
}

/// Read a host file: one host per line, blank lines and `#` comments ignored.
pub async fn load_hostfile(path: &Path) -> Result<Vec<String>> {
    let expanded_path = expand_tilde(path);
    let content = fs::read_to_string(&expanded_path)
        .await
        .with_context(|| format!("Failed to read host file {}", expanded_path.display()))?;

    Ok(parse_hostfile(&content))
}

fn parse_hostfile(content: &str) -> Vec<String> {
    content
        .lines()
        .map(|line| match line.find('#') {
            Some(pos) => &line[..pos],
            None => line,
        })
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(str::to_string)
        .collect()
}

/// Expand tilde (~) in path to home directory.
pub fn expand_tilde(path: &Path) -> PathBuf {
    if let Some(path_str) = path.to_str() {
        if path_str.starts_with("~/") {
            if let Ok(home) = std::env::var("HOME") {
                return PathBuf::from(path_str.replacen('~', &home, 1));
            }
        }
    }
    path.to_path_buf()
}

/// Get current username from environment.
pub fn get_current_username() -> String {
    std::env::var("USER")
        .or_else(|_| std::env::var("USERNAME"))
        .or_else(|_| std::env::var("LOGNAME"))
        .unwrap_or_else(|_| "root".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    #[serial]
    fn test_expand_tilde() {
        let original = std::env::var("HOME").ok();
        std::env::set_var("HOME", "/home/user");
        let expanded = expand_tilde(Path::new("~/.ssh/id_ed25519"));
        assert_eq!(expanded, PathBuf::from("/home/user/.ssh/id_ed25519"));
        assert_eq!(
            expand_tilde(Path::new("/etc/hosts")),
            PathBuf::from("/etc/hosts")
        );
        match original {
            Some(home) => std::env::set_var("HOME", home),
            None => std::env::remove_var("HOME"),
        }
    }

    #[test]
    fn test_config_parsing() {
        let yaml = r#"
defaults:
  user: admin
  port: 2222
  ssh_key: ~/.ssh/id_rsa
  parallel: 10
  connect_timeout: 5
"#;
        let config = Config::parse(yaml).unwrap();
        assert_eq!(config.defaults.user.as_deref(), Some("admin"));
        assert_eq!(config.defaults.port, Some(2222));
        assert_eq!(config.defaults.parallel, Some(10));
        assert_eq!(config.defaults.connect_timeout, Some(5));
    }

    #[test]
    fn test_config_rejects_zero_parallel() {
        assert!(Config::parse("defaults:\n  parallel: 0\n").is_err());
    }

    #[test]
    fn test_config_rejects_unknown_default() {
        assert!(Config::parse("defaults:\n  paralel: 3\n").is_err());
    }

    #[test]
    fn test_empty_config_is_default() {
        let config = Config::parse("{}").unwrap();
        assert_eq!(config.defaults, Defaults::default());
    }

    #[tokio::test]
    async fn test_missing_optional_file_is_default() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("absent.yaml");
        let config = Config::load(&path, false).await.unwrap();
        assert_eq!(config.defaults, Defaults::default());
        assert!(Config::load(&path, true).await.is_err());
    }

    #[tokio::test]
    async fn test_load_hostfile_skips_comments() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "# web tier").unwrap();
        writeln!(file, "web1").unwrap();
        writeln!(file).unwrap();
        writeln!(file, "  deploy@web2:2222  # canary").unwrap();
        let hosts = load_hostfile(file.path()).await.unwrap();
        assert_eq!(hosts, vec!["web1", "deploy@web2:2222"]);
    }
}

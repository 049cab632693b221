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

//! Selection of the SSH authentication method for a run.
//!
//! The method is chosen once, before any host is contacted, so password and
//! passphrase prompts happen a single time no matter how many hosts run.

use anyhow::{Context, Result};
use directories::BaseDirs;
use std::path::{Path, PathBuf};

use super::tokio_client::AuthMethod;
use crate::security::prompt_secret;

/// Inputs for choosing an authentication method.
#[derive(Debug, Clone, Default)]
pub struct AuthContext {
    pub key_path: Option<PathBuf>,
    pub use_agent: bool,
    pub use_password: bool,
}

impl AuthContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_key_path(mut self, key_path: Option<PathBuf>) -> Self {
        self.key_path = key_path;
        self
    }

    pub fn with_agent(mut self, use_agent: bool) -> Self {
        self.use_agent = use_agent;
        self
    }

    pub fn with_password(mut self, use_password: bool) -> Self {
        self.use_password = use_password;
        self
    }

    /// Determine the authentication method.
    ///
    /// Priority: password (if requested), SSH agent (if requested and
    /// `SSH_AUTH_SOCK` is set), explicit key file, then the default keys
    /// under `~/.ssh`.
    pub fn determine_method(&self) -> Result<AuthMethod> {
        if self.use_password {
            tracing::debug!("Using password authentication");
            let password = prompt_secret("Enter SSH password: ")?;
            return Ok(AuthMethod::with_password(&password));
        }

        #[cfg(not(target_os = "windows"))]
        if self.use_agent {
            if std::env::var("SSH_AUTH_SOCK").is_ok() {
                tracing::debug!("Using SSH agent for authentication");
                return Ok(AuthMethod::with_agent());
            }
            tracing::warn!("SSH agent requested but SSH_AUTH_SOCK environment variable not set");
        }

        if let Some(key_path) = &self.key_path {
            return key_file_auth(key_path);
        }

        default_key_auth()
    }
}

/// Key file authentication, prompting for a passphrase when the key is
/// encrypted.
fn key_file_auth(key_path: &Path) -> Result<AuthMethod> {
    tracing::debug!("Authenticating with key: {:?}", key_path);

    if !key_path.exists() {
        anyhow::bail!("SSH key file not found: {}", key_path.display());
    }

    let passphrase = match russh::keys::load_secret_key(key_path, None) {
        Ok(_) => None,
        Err(russh::keys::Error::KeyIsEncrypted) => {
            tracing::debug!("Detected encrypted SSH key, prompting for passphrase");
            Some(prompt_secret(&format!(
                "Enter passphrase for key {}: ",
                key_path.display()
            ))?)
        }
        Err(e) => {
            return Err(e)
                .with_context(|| format!("Failed to load SSH key {}", key_path.display()))
        }
    };

    Ok(AuthMethod::with_key_file(
        key_path,
        passphrase.as_ref().map(|p| p.as_str()),
    ))
}

fn default_key_candidates() -> Vec<PathBuf> {
    let Some(dirs) = BaseDirs::new() else {
        return Vec::new();
    };
    let ssh_dir = dirs.home_dir().join(".ssh");
    ["id_ed25519", "id_ecdsa", "id_rsa"]
        .iter()
        .map(|name| ssh_dir.join(name))
        .collect()
}

fn default_key_auth() -> Result<AuthMethod> {
    if let Some(default_key) = default_key_candidates().into_iter().find(|p| p.exists()) {
        tracing::debug!("Using default key: {:?}", default_key);
        return key_file_auth(&default_key);
    }

    anyhow::bail!(
        "SSH authentication failed: No authentication method available.\n\
         Tried:\n\
         - SSH agent: {}\n\
         - Default key files (~/.ssh/id_ed25519, ~/.ssh/id_ecdsa, ~/.ssh/id_rsa not found)\n\
         \n\
         Solutions:\n\
         - Use --password for password authentication\n\
         - Start SSH agent and use -A/--use-agent\n\
         - Specify a key file with -i/--identity",
        if std::env::var("SSH_AUTH_SOCK").is_ok() {
            "available but not requested"
        } else {
            "not available (SSH_AUTH_SOCK not set)"
        }
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use tempfile::TempDir;

    #[test]
    fn test_auth_context_builders() {
        let ctx = AuthContext::new()
            .with_key_path(Some(PathBuf::from("/path/to/key")))
            .with_agent(true)
            .with_password(false);
        assert_eq!(ctx.key_path, Some(PathBuf::from("/path/to/key")));
        assert!(ctx.use_agent);
        assert!(!ctx.use_password);
    }

    #[test]
    fn test_missing_key_file_is_an_error() {
        let temp_dir = TempDir::new().unwrap();
        let ctx = AuthContext::new().with_key_path(Some(temp_dir.path().join("nope")));
        let err = ctx.determine_method().unwrap_err();
        assert!(err.to_string().contains("not found"));
    }

    #[test]
    fn test_unparseable_key_file_is_an_error() {
        let temp_dir = TempDir::new().unwrap();
        let key_path = temp_dir.path().join("garbage");
        std::fs::write(&key_path, "not a key").unwrap();
        let ctx = AuthContext::new().with_key_path(Some(key_path));
        assert!(ctx.determine_method().is_err());
    }

    #[cfg(not(target_os = "windows"))]
    #[test]
    #[serial]
    fn test_determine_method_with_agent() {
        let original = std::env::var("SSH_AUTH_SOCK").ok();
        std::env::set_var("SSH_AUTH_SOCK", "/tmp/test-ssh-agent.sock");

        let auth = AuthContext::new().with_agent(true).determine_method();

        match original {
            Some(sock) => std::env::set_var("SSH_AUTH_SOCK", sock),
            None => std::env::remove_var("SSH_AUTH_SOCK"),
        }
        assert_eq!(auth.unwrap(), AuthMethod::Agent);
    }

    #[test]
    #[serial]
    fn test_no_method_available() {
        let original_home = std::env::var("HOME").ok();
        let temp_dir = TempDir::new().unwrap();
        std::env::set_var("HOME", temp_dir.path());

        let result = AuthContext::new().determine_method();

        match original_home {
            Some(home) => std::env::set_var("HOME", home),
            None => std::env::remove_var("HOME"),
        }
        assert!(result.is_err());
    }
}

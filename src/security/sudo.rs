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

//! Sudo password handling with automatic memory clearing.
//!
//! The password is read once per run, before any host is contacted, and is
//! shared read-only by every host session. It is written to a remote pty at
//! most once per session.
//!
//! # Security Considerations
//! - Passwords are cleared from memory when dropped
//! - Never log or print sudo passwords
//! - Environment variable usage is discouraged due to security risks

use anyhow::Result;
use secrecy::{ExposeSecret, SecretString};
use std::fmt;
use zeroize::Zeroizing;

/// Environment variable consulted for a non-interactive sudo password.
pub const SUDO_PASSWORD_ENV: &str = "SSHFAN_SUDO_PASSWORD";

/// A wrapper for sudo passwords that clears memory on drop.
///
/// Debug output never reveals the password.
#[derive(Clone)]
pub struct SudoPassword {
    inner: SecretString,
}

impl SudoPassword {
    /// Create a new SudoPassword. Empty passwords are rejected.
    pub fn new(password: String) -> Result<Self> {
        if password.is_empty() {
            anyhow::bail!("Password cannot be empty");
        }
        Ok(Self {
            inner: SecretString::new(password.into_boxed_str()),
        })
    }

    /// Get the password with a newline appended, ready to submit to sudo.
    ///
    /// The returned copy is zeroized on drop as well.
    pub fn with_newline(&self) -> Zeroizing<Vec<u8>> {
        let mut bytes = self.inner.expose_secret().as_bytes().to_vec();
        bytes.push(b'\n');
        Zeroizing::new(bytes)
    }
}

impl fmt::Debug for SudoPassword {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SudoPassword")
            .field("password", &"[REDACTED]")
            .finish()
    }
}

/// Prompt the operator for a secret without echoing it.
pub fn prompt_secret(prompt: &str) -> Result<Zeroizing<String>> {
    let secret = rpassword::prompt_password(prompt)
        .map_err(|e| anyhow::anyhow!("Failed to read password from terminal: {e}"))?;
    Ok(Zeroizing::new(secret))
}

/// Prompt the user for a sudo password.
pub fn prompt_sudo_password() -> Result<SudoPassword> {
    let password = prompt_secret("Enter sudo password: ")?;
    if password.is_empty() {
        anyhow::bail!("Empty password not allowed. Please enter a valid sudo password.");
    }
    SudoPassword::new(password.to_string())
}

/// Get sudo password from the environment (if set).
///
/// # Returns
/// * `Some(SudoPassword)` if `SSHFAN_SUDO_PASSWORD` is set and non-empty
/// * `None` if the variable is not set
/// * `Err` if it is set but empty
pub fn get_sudo_password_from_env() -> Result<Option<SudoPassword>> {
    match std::env::var(SUDO_PASSWORD_ENV) {
        Ok(password) if !password.is_empty() => Ok(Some(SudoPassword::new(password)?)),
        Ok(_) => anyhow::bail!(
            "{SUDO_PASSWORD_ENV} is set but empty. Empty passwords are not allowed."
        ),
        Err(_) => Ok(None),
    }
}

/// Resolve the sudo password for this run.
///
/// The environment wins. When it is unset and `ask` is true the operator is
/// prompted once; otherwise no password is configured and any sudo prompt
/// fails the host with `PasswordRequired`.
pub fn resolve_sudo_password(ask: bool) -> Result<Option<SudoPassword>> {
    if let Some(password) = get_sudo_password_from_env()? {
        tracing::debug!("Using sudo password from {}", SUDO_PASSWORD_ENV);
        return Ok(Some(password));
    }
    if ask {
        return prompt_sudo_password().map(Some);
    }
    Ok(None)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    #[test]
    fn test_sudo_password_empty_rejection() {
        let result = SudoPassword::new(String::new());
        assert!(result.is_err());
        assert!(result.unwrap_err().to_string().contains("cannot be empty"));
    }

    #[test]
    fn test_sudo_password_with_newline() {
        let password = SudoPassword::new("test123".to_string()).unwrap();
        let with_newline = password.with_newline();
        assert_eq!(&*with_newline, b"test123\n");
    }

    #[test]
    fn test_sudo_password_debug_redaction() {
        let password = SudoPassword::new("secret".to_string()).unwrap();
        let debug_output = format!("{password:?}");
        assert!(!debug_output.contains("secret"));
        assert!(debug_output.contains("[REDACTED]"));
    }

    #[test]
    #[serial]
    fn test_get_sudo_password_from_env_empty() {
        std::env::set_var(SUDO_PASSWORD_ENV, "");
        let result = get_sudo_password_from_env();
        std::env::remove_var(SUDO_PASSWORD_ENV);

        assert!(result.is_err());
        assert!(result.unwrap_err().to_string().contains("empty"));
    }

    #[test]
    #[serial]
    fn test_get_sudo_password_from_env_valid() {
        std::env::set_var(SUDO_PASSWORD_ENV, "test_password");
        let result = get_sudo_password_from_env();
        std::env::remove_var(SUDO_PASSWORD_ENV);

        let password = result.unwrap().unwrap();
        assert_eq!(&*password.with_newline(), b"test_password\n");
    }

    #[test]
    #[serial]
    fn test_resolve_without_env_or_prompt_is_none() {
        std::env::remove_var(SUDO_PASSWORD_ENV);
        assert!(resolve_sudo_password(false).unwrap().is_none());
    }
}

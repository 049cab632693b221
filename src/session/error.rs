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

//! Error types for a single host session

use thiserror::Error;

/// Exit code reported for a host whose session failed before a remote exit
/// status could be observed.
pub const FAILURE_EXIT_CODE: u32 = 255;

/// Failures that end one host's session.
///
/// None of these abort the run; the host driver turns each one into an
/// outcome for its host.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum HostError {
    /// Transport or authentication failure
    #[error("connection failed: {0}")]
    Connect(String),

    /// Script upload, chmod or remote process start failed
    #[error("failed to start remote command: {0}")]
    Spawn(String),

    /// A sudo prompt appeared but no password was configured
    #[error("sudo password required but none was provided")]
    PasswordRequired,

    /// The sudo prompt appeared again after the password was sent
    #[error("sudo password was rejected")]
    PasswordRejected,

    /// The operator interrupted the run
    #[error("cancelled")]
    Cancelled,

    /// Unexpected I/O failure on an established session
    #[error("channel error: {0}")]
    Channel(String),

    /// The host's worker task died before reporting
    #[error("internal error: {0}")]
    Internal(String),
}

impl HostError {
    pub fn exit_code(&self) -> u32 {
        FAILURE_EXIT_CODE
    }
}

/// Render an error chain on one line for per-host reporting.
pub(crate) fn describe(err: &anyhow::Error) -> String {
    format!("{err:#}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_messages() {
        assert_eq!(
            HostError::Connect("timed out".into()).to_string(),
            "connection failed: timed out"
        );
        assert_eq!(
            HostError::PasswordRequired.to_string(),
            "sudo password required but none was provided"
        );
        assert_eq!(HostError::Cancelled.exit_code(), 255);
    }

    #[test]
    fn test_describe_keeps_context_chain() {
        let err = anyhow::anyhow!("permission denied").context("upload failed");
        assert_eq!(describe(&err), "upload failed: permission denied");
    }
}

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

use anyhow::Result;
use std::time::Duration;

use super::known_hosts::{get_check_method, StrictHostKeyChecking};
use super::tokio_client::{self, AuthMethod, Client};
use crate::config::DEFAULT_CONNECT_TIMEOUT;

/// Interval between keepalive probes on an idle transport. Remote commands
/// may stay silent for any length of time; keepalives only detect a dead peer.
const KEEPALIVE_INTERVAL_SECS: u64 = 60;
const KEEPALIVE_MAX: usize = 3;

/// Connection settings shared by every host of a run.
#[derive(Debug, Clone)]
pub struct ConnectionConfig {
    pub auth: AuthMethod,
    pub strict_mode: StrictHostKeyChecking,
    /// Bound on transport setup and authentication only.
    pub connect_timeout: Duration,
}

impl ConnectionConfig {
    pub fn new(auth: AuthMethod) -> Self {
        Self {
            auth,
            strict_mode: StrictHostKeyChecking::default(),
            connect_timeout: Duration::from_secs(DEFAULT_CONNECT_TIMEOUT),
        }
    }

    pub fn with_strict_mode(mut self, strict_mode: StrictHostKeyChecking) -> Self {
        self.strict_mode = strict_mode;
        self
    }

    pub fn with_connect_timeout(mut self, connect_timeout: Duration) -> Self {
        self.connect_timeout = connect_timeout;
        self
    }
}

pub struct SshClient {
    host: String,
    port: u16,
    username: String,
}

impl SshClient {
    pub fn new(host: String, port: u16, username: String) -> Self {
        Self {
            host,
            port,
            username,
        }
    }

    /// Connect and authenticate, giving up after the configured timeout.
    pub async fn connect(&self, config: &ConnectionConfig) -> Result<Client> {
        let check_method = get_check_method(config.strict_mode);
        let ssh_config = tokio_client::Config {
            keepalive_interval: Some(Duration::from_secs(KEEPALIVE_INTERVAL_SECS)),
            keepalive_max: KEEPALIVE_MAX,
            ..Default::default()
        };

        tracing::debug!(
            "Connecting to {}@{}:{}",
            self.username,
            self.host,
            self.port
        );

        match tokio::time::timeout(
            config.connect_timeout,
            Client::connect_with_config(
                &self.host,
                self.port,
                &self.username,
                config.auth.clone(),
                check_method,
                ssh_config,
            ),
        )
        .await
        {
            Ok(Ok(client)) => Ok(client),
            Ok(Err(e)) => {
                let message = describe_connect_error(&e);
                Err(anyhow::Error::new(e).context(message))
            }
            Err(_) => Err(anyhow::anyhow!(
                "Connection timeout after {} seconds. \
                 Please check if the host is reachable and SSH service is running.",
                config.connect_timeout.as_secs()
            )),
        }
    }
}

/// Operator-facing explanation of a connection failure.
fn describe_connect_error(e: &tokio_client::Error) -> String {
    match e {
        tokio_client::Error::KeyAuthFailed => {
            "Authentication failed. The private key was rejected by the server.".to_string()
        }
        tokio_client::Error::PasswordWrong => "Password authentication failed.".to_string(),
        tokio_client::Error::ServerCheckFailed => {
            "Host key verification failed. The server's host key was not recognized or has changed."
                .to_string()
        }
        tokio_client::Error::KeyInvalid(key_err) => {
            format!("Failed to load SSH key: {key_err}. Please check the key file format and passphrase.")
        }
        tokio_client::Error::AgentConnectionFailed => {
            "Failed to connect to SSH agent. Please ensure SSH_AUTH_SOCK is set and the agent is running."
                .to_string()
        }
        tokio_client::Error::AgentNoIdentities => {
            "SSH agent has no identities. Please add your key to the agent using 'ssh-add'."
                .to_string()
        }
        tokio_client::Error::AgentAuthenticationFailed => {
            "SSH agent authentication failed.".to_string()
        }
        tokio_client::Error::AddressInvalid(io_err) => {
            format!("Could not resolve host: {io_err}")
        }
        tokio_client::Error::SshError(ssh_err) => format!("SSH connection error: {ssh_err}"),
        _ => format!("Failed to connect: {e}"),
    }
}

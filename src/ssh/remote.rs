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

//! russh-backed implementation of the session transport traits.

use anyhow::{Context, Result};
use async_trait::async_trait;
use russh::client::Msg;
use russh::{Channel, ChannelMsg, Sig};
use std::collections::VecDeque;
use std::io;
use std::path::Path;
use std::sync::Arc;

use super::client::{ConnectionConfig, SshClient};
use super::tokio_client::{Client, PtyProcess};
use crate::node::Node;
use crate::session::{shell_quote, ChannelEvent, Connector, RemoteHost, SessionChannel};

/// Opens real SSH connections.
pub struct SshConnector {
    config: Arc<ConnectionConfig>,
}

impl SshConnector {
    pub fn new(config: ConnectionConfig) -> Self {
        Self {
            config: Arc::new(config),
        }
    }
}

#[async_trait]
impl Connector for SshConnector {
    async fn connect(&self, node: &Node) -> Result<Box<dyn RemoteHost>> {
        let client = SshClient::new(node.host.clone(), node.port, node.username.clone())
            .connect(&self.config)
            .await?;
        tracing::debug!(
            "Connected to {} at {}",
            node.label(),
            client.get_connection_address()
        );
        Ok(Box::new(SshRemoteHost { client }))
    }
}

pub struct SshRemoteHost {
    client: Client,
}

impl SshRemoteHost {
    /// Run a short housekeeping command and require exit status 0.
    async fn run_checked(&self, command: &str) -> Result<()> {
        let result = self
            .client
            .execute(command)
            .await
            .with_context(|| format!("Failed to run `{command}`"))?;
        if result.exit_status != 0 {
            anyhow::bail!(
                "`{}` exited with status {}: {}",
                command,
                result.exit_status,
                result.stderr.trim()
            );
        }
        Ok(())
    }
}

#[async_trait]
impl RemoteHost for SshRemoteHost {
    async fn upload_script(&self, local_path: &Path, remote_path: &str) -> Result<()> {
        self.client
            .upload_file(local_path, remote_path)
            .await
            .with_context(|| format!("SFTP upload to {remote_path} failed"))?;
        self.run_checked(&format!("chmod 0700 {}", shell_quote(remote_path)))
            .await
    }

    async fn remove_file(&self, remote_path: &str) -> Result<()> {
        self.run_checked(&format!("rm -f {}", shell_quote(remote_path)))
            .await
    }

    async fn spawn(&self, command: &str) -> Result<Box<dyn SessionChannel>> {
        let PtyProcess { channel, backlog } = self
            .client
            .exec_with_pty(command)
            .await
            .context("Failed to start remote command")?;
        Ok(Box::new(PtyChannel {
            channel,
            backlog,
            closed: false,
        }))
    }

    async fn disconnect(&self) -> Result<()> {
        if !self.client.is_closed() {
            self.client.disconnect().await?;
        }
        Ok(())
    }
}

/// A pty-backed exec channel.
///
/// SSH has no separate end-of-stream for extended data, so stderr ends with
/// the channel EOF.
struct PtyChannel {
    channel: Channel<Msg>,
    backlog: VecDeque<ChannelMsg>,
    closed: bool,
}

#[async_trait]
impl SessionChannel for PtyChannel {
    async fn next_event(&mut self) -> Option<ChannelEvent> {
        loop {
            if self.closed {
                return None;
            }
            let msg = match self.backlog.pop_front() {
                Some(msg) => msg,
                None => match self.channel.wait().await {
                    Some(msg) => msg,
                    None => {
                        self.closed = true;
                        return Some(ChannelEvent::Closed);
                    }
                },
            };
            if let Some(event) = map_message(msg) {
                if event == ChannelEvent::Closed {
                    self.closed = true;
                }
                return Some(event);
            }
        }
    }

    async fn write_input(&mut self, data: &[u8]) -> io::Result<()> {
        // russh only refuses channel data once the channel is gone.
        self.channel
            .data(data)
            .await
            .map_err(|e| io::Error::new(io::ErrorKind::BrokenPipe, e))
    }

    async fn close_input(&mut self) -> io::Result<()> {
        self.channel.eof().await.map_err(io::Error::other)
    }

    async fn terminate(&mut self) -> io::Result<()> {
        self.channel.signal(Sig::TERM).await.map_err(io::Error::other)
    }

    async fn close(&mut self) -> io::Result<()> {
        self.closed = true;
        self.channel.close().await.map_err(io::Error::other)
    }
}

fn map_message(msg: ChannelMsg) -> Option<ChannelEvent> {
    match msg {
        ChannelMsg::Data { data } => Some(ChannelEvent::Stdout(data.to_vec())),
        ChannelMsg::ExtendedData { data, ext: 1 } => Some(ChannelEvent::Stderr(data.to_vec())),
        ChannelMsg::Eof => Some(ChannelEvent::Eof),
        ChannelMsg::ExitStatus { exit_status } => Some(ChannelEvent::ExitStatus(exit_status)),
        ChannelMsg::ExitSignal { signal_name, .. } => {
            Some(ChannelEvent::ExitSignal(signal_label(&signal_name)))
        }
        ChannelMsg::Close => Some(ChannelEvent::Closed),
        _ => None,
    }
}

fn signal_label(sig: &Sig) -> String {
    match sig {
        Sig::Custom(name) => name.clone(),
        other => format!("{other:?}"),
    }
}

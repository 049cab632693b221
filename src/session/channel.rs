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

//! Transport seam between the host driver and an SSH implementation.
//!
//! The driver only sees these traits, so the session state machine can be
//! exercised against scripted channels without a network.

use anyhow::Result;
use async_trait::async_trait;
use std::io;
use std::path::Path;

use crate::node::Node;

/// Something that happened on a running remote process.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChannelEvent {
    /// Bytes from the pseudo-terminal (combined stdin/stdout)
    Stdout(Vec<u8>),
    /// Bytes from the extended-data (stderr) stream
    Stderr(Vec<u8>),
    /// The stderr stream will produce no more data
    StderrClosed,
    /// The pty stream will produce no more data
    Eof,
    ExitStatus(u32),
    /// Process was killed by the named signal
    ExitSignal(String),
    /// The channel is gone; no further events follow
    Closed,
}

/// An established remote process with a pty and a separate stderr stream.
#[async_trait]
pub trait SessionChannel: Send {
    /// Wait for the next event. Returns `None` once the channel is gone.
    async fn next_event(&mut self) -> Option<ChannelEvent>;

    /// Write bytes to the pty.
    async fn write_input(&mut self, data: &[u8]) -> io::Result<()>;

    /// Signal end of input to the remote process.
    async fn close_input(&mut self) -> io::Result<()>;

    /// Ask the remote process to terminate.
    async fn terminate(&mut self) -> io::Result<()>;

    async fn close(&mut self) -> io::Result<()>;
}

/// An authenticated connection to one host.
#[async_trait]
pub trait RemoteHost: Send + Sync {
    /// Copy a local script to `remote_path` and make it executable (mode 0700).
    async fn upload_script(&self, local_path: &Path, remote_path: &str) -> Result<()>;

    async fn remove_file(&self, remote_path: &str) -> Result<()>;

    /// Start `command` with a pseudo-terminal attached.
    async fn spawn(&self, command: &str) -> Result<Box<dyn SessionChannel>>;

    async fn disconnect(&self) -> Result<()>;
}

/// Opens connections to hosts.
#[async_trait]
pub trait Connector: Send + Sync {
    async fn connect(&self, node: &Node) -> Result<Box<dyn RemoteHost>>;
}

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

//! SSH channel operations: plain command execution and pty-backed processes.

use russh::client::Msg;
use russh::{Channel, ChannelMsg, Pty};
use std::collections::VecDeque;

use super::connection::Client;

/// Terminal type requested for pty-backed commands.
pub const PTY_TERM: &str = "xterm";
pub const PTY_COLUMNS: u32 = 200;
pub const PTY_ROWS: u32 = 50;

/// Result of a command execution.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CommandExecutedResult {
    pub stdout: String,
    pub stderr: String,
    /// The unix exit status (`$?` in bash).
    pub exit_status: u32,
}

/// A remote process started on a pty.
///
/// `backlog` holds messages that arrived while waiting for the server to
/// acknowledge the pty and exec requests; they must be consumed before
/// reading from `channel`.
pub struct PtyProcess {
    pub channel: Channel<Msg>,
    pub backlog: VecDeque<ChannelMsg>,
}

/// Terminal modes for a non-interactive pty: canonical input with echo,
/// NL to CR-NL on output, 8-bit characters.
fn batch_terminal_modes() -> Vec<(Pty, u32)> {
    vec![
        (Pty::VINTR, 0x03),
        (Pty::VEOF, 0x04),
        (Pty::ICRNL, 1),
        (Pty::IXON, 0),
        (Pty::ISIG, 1),
        (Pty::ICANON, 1),
        (Pty::ECHO, 1),
        (Pty::OPOST, 1),
        (Pty::ONLCR, 1),
        (Pty::CS8, 1),
    ]
}

impl Client {
    pub async fn get_channel(&self) -> Result<Channel<Msg>, super::Error> {
        self.connection_handle
            .channel_open_session()
            .await
            .map_err(super::Error::SshError)
    }

    /// Execute a remote command without a pty and collect its output.
    ///
    /// Every invocation is a new shell context.
    pub async fn execute(&self, command: &str) -> Result<CommandExecutedResult, super::Error> {
        let mut stdout_buffer = Vec::new();
        let mut stderr_buffer = Vec::new();
        let mut channel = self.connection_handle.channel_open_session().await?;
        channel.exec(true, command).await?;

        let mut result: Option<u32> = None;

        while let Some(msg) = channel.wait().await {
            match msg {
                ChannelMsg::Data { ref data } => stdout_buffer.extend_from_slice(data),
                ChannelMsg::ExtendedData { ref data, ext } => {
                    if ext == 1 {
                        stderr_buffer.extend_from_slice(data)
                    }
                }
                // The exit status may precede trailing data, so keep reading
                // until the channel closes.
                ChannelMsg::ExitStatus { exit_status } => result = Some(exit_status),
                _ => {}
            }
        }

        match result {
            Some(exit_status) => Ok(CommandExecutedResult {
                stdout: String::from_utf8_lossy(&stdout_buffer).into_owned(),
                stderr: String::from_utf8_lossy(&stderr_buffer).into_owned(),
                exit_status,
            }),
            None => Err(super::Error::CommandDidntExit),
        }
    }

    /// Start `command` with a pseudo-terminal attached.
    ///
    /// Stdin and stdout share the pty; stderr arrives as extended data.
    pub async fn exec_with_pty(&self, command: &str) -> Result<PtyProcess, super::Error> {
        let mut channel = self.connection_handle.channel_open_session().await?;
        let mut backlog = VecDeque::new();

        channel
            .request_pty(
                true,
                PTY_TERM,
                PTY_COLUMNS,
                PTY_ROWS,
                0,
                0,
                &batch_terminal_modes(),
            )
            .await?;
        await_reply(&mut channel, &mut backlog, "pty").await?;

        channel.exec(true, command).await?;
        await_reply(&mut channel, &mut backlog, "exec").await?;

        Ok(PtyProcess { channel, backlog })
    }
}

/// Wait for the reply to a `want_reply` channel request.
async fn await_reply(
    channel: &mut Channel<Msg>,
    backlog: &mut VecDeque<ChannelMsg>,
    request: &'static str,
) -> Result<(), super::Error> {
    while let Some(msg) = channel.wait().await {
        match msg {
            ChannelMsg::Success => return Ok(()),
            ChannelMsg::Failure => return Err(super::Error::ChannelRequestFailed(request)),
            other => backlog.push_back(other),
        }
    }
    Err(super::Error::ChannelRequestFailed(request))
}

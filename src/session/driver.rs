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

//! Drives one host from connection to final outcome.
//!
//! States: opening (connect, stage, spawn), running (pump pty and stderr),
//! draining (pty closed, waiting for the exit status) and done (remove the
//! staged script, disconnect). Every path ends in done.

use std::future::Future;
use std::io;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

use super::channel::{ChannelEvent, Connector, RemoteHost, SessionChannel};
use super::error::{describe, HostError, FAILURE_EXIT_CODE};
use super::framer::LineFramer;
use super::prompt::PromptDetector;
use super::staging::{remote_script_path, ExecutionPlan};
use crate::executor::{OutputSink, Outcome, RemoteExit};
use crate::node::Node;

pub struct HostDriver {
    node: Node,
    label: String,
    plan: Arc<ExecutionPlan>,
    connector: Arc<dyn Connector>,
    sink: Arc<dyn OutputSink>,
    cancel: CancellationToken,
}

/// Mutable per-session state owned by the event loop.
struct SessionState {
    stdout: LineFramer,
    stderr: LineFramer,
    detector: PromptDetector,
    stderr_open: bool,
    draining: bool,
    exit_code: Option<u32>,
    signal: Option<String>,
}

impl HostDriver {
    pub fn new(
        node: Node,
        plan: Arc<ExecutionPlan>,
        connector: Arc<dyn Connector>,
        sink: Arc<dyn OutputSink>,
        cancel: CancellationToken,
    ) -> Self {
        let label = node.label();
        Self {
            node,
            label,
            plan,
            connector,
            sink,
            cancel,
        }
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    /// Run the host to completion. Never fails: errors become the outcome.
    pub async fn run(self) -> Outcome {
        tracing::debug!("Starting session on {}", self.node);
        match self.drive().await {
            Ok(exit) => {
                tracing::debug!(
                    "{} exited with code {} (signal: {:?})",
                    self.label,
                    exit.exit_code,
                    exit.signal
                );
                Outcome::exited(exit)
            }
            Err(err) => {
                tracing::warn!("{}: {}", self.label, err);
                Outcome::failed(err)
            }
        }
    }

    async fn drive(&self) -> Result<RemoteExit, HostError> {
        let host = self
            .cancellable(self.connector.connect(&self.node))
            .await?
            .map_err(|e| HostError::Connect(describe(&e)))?;

        let staged = self.plan.script.as_deref().map(remote_script_path);
        let result = self.execute(host.as_ref(), staged.as_deref()).await;

        if let Some(path) = &staged {
            match host.remove_file(path).await {
                Ok(()) => tracing::debug!("Removed staged script {} on {}", path, self.label),
                Err(e) => tracing::warn!(
                    "Failed to remove staged script {} on {}: {:#}",
                    path,
                    self.label,
                    e
                ),
            }
        }
        if let Err(e) = host.disconnect().await {
            tracing::debug!("Disconnect from {} failed: {:#}", self.label, e);
        }

        result
    }

    async fn execute(
        &self,
        host: &dyn RemoteHost,
        staged: Option<&str>,
    ) -> Result<RemoteExit, HostError> {
        if let (Some(local), Some(remote)) = (self.plan.script.as_deref(), staged) {
            tracing::debug!("Staging {:?} as {} on {}", local, remote, self.label);
            self.cancellable(host.upload_script(local, remote))
                .await?
                .map_err(|e| HostError::Spawn(describe(&e)))?;
        }

        let command = self.plan.remote_command(staged);
        let mut channel = self
            .cancellable(host.spawn(&command))
            .await?
            .map_err(|e| HostError::Spawn(describe(&e)))?;

        let result = self.pump(channel.as_mut()).await;

        if result.is_err() {
            if let Err(e) = channel.terminate().await {
                tracing::debug!("Failed to signal {}: {}", self.label, e);
            }
        }
        if let Err(e) = channel.close().await {
            tracing::debug!("Failed to close channel to {}: {}", self.label, e);
        }

        result
    }

    /// Await `fut` unless the run is cancelled first.
    async fn cancellable<F: Future>(&self, fut: F) -> Result<F::Output, HostError> {
        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => Err(HostError::Cancelled),
            out = fut => Ok(out),
        }
    }

    async fn pump(&self, channel: &mut dyn SessionChannel) -> Result<RemoteExit, HostError> {
        let mut state = SessionState {
            stdout: LineFramer::new(),
            stderr: LineFramer::new(),
            detector: PromptDetector::new(self.plan.marker.clone()),
            stderr_open: true,
            draining: false,
            exit_code: None,
            signal: None,
        };

        loop {
            let event = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => {
                    tracing::info!("Cancelling session on {}", self.label);
                    self.flush(&mut state);
                    return Err(HostError::Cancelled);
                }
                event = channel.next_event() => event,
            };

            match event {
                Some(ChannelEvent::Stdout(data)) => {
                    if state.draining {
                        continue;
                    }
                    for line in state.stdout.push(&data) {
                        self.sink.stdout_line(&self.label, &line);
                    }
                    if let Some(prompt) = state.detector.observe(&mut state.stdout) {
                        self.sink.stdout_line(&self.label, &prompt);
                    }
                    if state.detector.rejected() {
                        return Err(HostError::PasswordRejected);
                    }
                    if state.detector.needs_password() {
                        self.send_password(channel, &mut state).await?;
                    }
                }
                Some(ChannelEvent::Stderr(data)) => {
                    if !state.stderr_open {
                        continue;
                    }
                    for line in state.stderr.push(&data) {
                        self.sink.stderr_line(&self.label, &line);
                    }
                }
                Some(ChannelEvent::StderrClosed) => self.close_stderr(&mut state),
                Some(ChannelEvent::Eof) => {
                    if state.draining {
                        continue;
                    }
                    if let Some(line) = state.stdout.finish() {
                        self.sink.stdout_line(&self.label, &line);
                    }
                    state.draining = true;
                    if let Err(e) = channel.close_input().await {
                        tracing::debug!("Failed to close input on {}: {}", self.label, e);
                    }
                    self.close_stderr(&mut state);
                }
                Some(ChannelEvent::ExitStatus(code)) => state.exit_code = Some(code),
                Some(ChannelEvent::ExitSignal(name)) => state.signal = Some(name),
                Some(ChannelEvent::Closed) | None => break,
            }
        }

        self.flush(&mut state);

        match (state.exit_code, state.signal) {
            (None, None) => Err(HostError::Channel(
                "channel closed without an exit status".to_string(),
            )),
            (code, signal) => Ok(RemoteExit {
                exit_code: code.unwrap_or(FAILURE_EXIT_CODE),
                signal,
            }),
        }
    }

    async fn send_password(
        &self,
        channel: &mut dyn SessionChannel,
        state: &mut SessionState,
    ) -> Result<(), HostError> {
        let bytes = state
            .detector
            .take_password(self.plan.sudo_password.as_deref())?;

        match channel.write_input(&bytes).await {
            Ok(()) => {
                tracing::debug!("Sent sudo password to {}", self.label);
                Ok(())
            }
            Err(e) if e.kind() == io::ErrorKind::BrokenPipe => {
                tracing::warn!("{}: pty closed before sudo password was written", self.label);
                Ok(())
            }
            Err(e) => Err(HostError::Channel(format!(
                "failed to write sudo password: {e}"
            ))),
        }
    }

    fn close_stderr(&self, state: &mut SessionState) {
        if !state.stderr_open {
            return;
        }
        state.stderr_open = false;
        if let Some(line) = state.stderr.finish() {
            self.sink.stderr_line(&self.label, &line);
        }
    }

    fn flush(&self, state: &mut SessionState) {
        if let Some(line) = state.stdout.finish() {
            self.sink.stdout_line(&self.label, &line);
        }
        self.close_stderr(state);
    }
}

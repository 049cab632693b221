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

//! Sudo prompt detection and one-shot password injection.
//!
//! The remote command runs with `SUDO_PROMPT` set to a marker unique to this
//! program, so `sudo` prints exactly that text on the pty when it wants a
//! password. Detection is a literal suffix match on the unterminated tail of
//! the pty stream: a marker followed by a newline is ordinary output.

use zeroize::Zeroizing;

use super::error::HostError;
use super::framer::LineFramer;
use crate::security::SudoPassword;

/// The prompt text `sudo` is told to print.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PromptMarker(String);

impl Default for PromptMarker {
    fn default() -> Self {
        Self::for_program(env!("CARGO_PKG_NAME"))
    }
}

impl PromptMarker {
    pub fn for_program(program: &str) -> Self {
        Self(format!("[sudo via {program}] password: "))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Prefix `command` so every `sudo` inside it prints this marker.
    pub fn wrap_command(&self, command: &str) -> String {
        format!("export SUDO_PROMPT='{}'; {command}", self.0)
    }
}

/// Per-session prompt state.
#[derive(Debug)]
pub struct PromptDetector {
    marker: PromptMarker,
    need_password: bool,
    password_sent: bool,
    rejected: bool,
}

impl PromptDetector {
    pub fn new(marker: PromptMarker) -> Self {
        Self {
            marker,
            need_password: false,
            password_sent: false,
            rejected: false,
        }
    }

    /// Check the pty framer after a framing step.
    ///
    /// When the unterminated tail ends with the marker, the tail is consumed
    /// and returned so it can be shown as a line.
    pub fn observe(&mut self, framer: &mut LineFramer) -> Option<String> {
        if !framer.ends_with(self.marker.as_str().as_bytes()) {
            return None;
        }

        if self.password_sent {
            self.rejected = true;
        } else {
            self.need_password = true;
        }
        Some(framer.take_pending())
    }

    pub fn needs_password(&self) -> bool {
        self.need_password
    }

    /// True once the prompt has come back after the password was written.
    pub fn rejected(&self) -> bool {
        self.rejected
    }

    /// Hand out the password bytes for the pending prompt.
    ///
    /// Succeeds at most once per session; afterwards the flag stays clear.
    pub fn take_password(
        &mut self,
        password: Option<&SudoPassword>,
    ) -> Result<Zeroizing<Vec<u8>>, HostError> {
        let password = password.ok_or(HostError::PasswordRequired)?;
        self.need_password = false;
        self.password_sent = true;
        Ok(password.with_newline())
    }
}

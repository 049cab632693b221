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

//! Re-assembly of raw output chunks into complete lines.

/// Largest amount of unterminated output held back before it is emitted
/// as a line of its own.
pub const CHUNK_CAPACITY: usize = 64 * 1024;

/// Splits a byte stream into lines on `\r?\n`, holding the unterminated tail
/// (`keep`) until the next chunk arrives.
///
/// Bytes are decoded as UTF-8 only once a line is complete, so characters
/// split across chunks come out intact.
#[derive(Debug)]
pub struct LineFramer {
    keep: Vec<u8>,
    capacity: usize,
}

impl Default for LineFramer {
    fn default() -> Self {
        Self::new()
    }
}

impl LineFramer {
    pub fn new() -> Self {
        Self::with_capacity(CHUNK_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            keep: Vec::new(),
            capacity,
        }
    }

    /// Feed one chunk and return every line it completes.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<String> {
        let mut lines = Vec::new();
        let mut rest = chunk;

        while let Some(pos) = rest.iter().position(|&b| b == b'\n') {
            self.keep.extend_from_slice(&rest[..pos]);
            if self.keep.last() == Some(&b'\r') {
                self.keep.pop();
            }
            lines.push(self.take_pending());
            rest = &rest[pos + 1..];
        }
        self.keep.extend_from_slice(rest);

        if self.keep.len() > self.capacity {
            lines.push(self.take_pending());
        }

        lines
    }

    /// Flush the unterminated tail at end of stream, if any.
    pub fn finish(&mut self) -> Option<String> {
        if self.keep.is_empty() {
            None
        } else {
            Some(self.take_pending())
        }
    }

    /// Whether the unterminated tail ends with `suffix`.
    pub fn ends_with(&self, suffix: &[u8]) -> bool {
        self.keep.ends_with(suffix)
    }

    pub fn pending(&self) -> &[u8] {
        &self.keep
    }

    /// Remove and decode the unterminated tail.
    pub fn take_pending(&mut self) -> String {
        let line = String::from_utf8_lossy(&self.keep).into_owned();
        self.keep.clear();
        line
    }
}

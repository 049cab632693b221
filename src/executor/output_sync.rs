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

//! Host-prefixed line output shared by all concurrently running hosts.
//!
//! Each line is written and flushed while holding a process-wide lock, so
//! lines from different hosts never interleave mid-line.

use once_cell::sync::Lazy;
use std::io::{self, Write};
use std::sync::{Mutex, MutexGuard};

static STDOUT_MUTEX: Lazy<Mutex<io::Stdout>> = Lazy::new(|| Mutex::new(io::stdout()));

static STDERR_MUTEX: Lazy<Mutex<io::Stderr>> = Lazy::new(|| Mutex::new(io::stderr()));

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Destination for complete, framed lines of remote output.
pub trait OutputSink: Send + Sync {
    /// A line from the remote pty (stdout side).
    fn stdout_line(&self, host: &str, line: &str);

    /// A line from the remote stderr stream.
    fn stderr_line(&self, host: &str, line: &str);
}

/// Format a line with its host prefix.
pub fn prefixed(host: &str, line: &str) -> String {
    format!("[{host}] {line}")
}

/// Writes `[<host>] <line>` to the process stdout and stderr.
#[derive(Debug, Default, Clone, Copy)]
pub struct ConsoleSink;

impl ConsoleSink {
    fn write_line(target: &Mutex<impl Write>, text: &str) -> io::Result<()> {
        let mut out = lock(target);
        writeln!(out, "{text}")?;
        out.flush()
    }
}

impl OutputSink for ConsoleSink {
    fn stdout_line(&self, host: &str, line: &str) {
        if let Err(e) = Self::write_line(&STDOUT_MUTEX, &prefixed(host, line)) {
            tracing::error!("Failed to write stdout for {}: {}", host, e);
        }
    }

    fn stderr_line(&self, host: &str, line: &str) {
        if let Err(e) = Self::write_line(&STDERR_MUTEX, &prefixed(host, line)) {
            tracing::error!("Failed to write stderr for {}: {}", host, e);
        }
    }
}

/// Which stream a captured line came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stream {
    Stdout,
    Stderr,
}

/// Keeps every line in memory, in arrival order.
#[derive(Debug, Default)]
pub struct MemorySink {
    lines: Mutex<Vec<(Stream, String)>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    /// All captured lines, already prefixed.
    pub fn lines(&self) -> Vec<(Stream, String)> {
        lock(&self.lines).clone()
    }

    /// Captured lines of one stream, already prefixed.
    pub fn stream(&self, stream: Stream) -> Vec<String> {
        lock(&self.lines)
            .iter()
            .filter(|(s, _)| *s == stream)
            .map(|(_, line)| line.clone())
            .collect()
    }
}

impl OutputSink for MemorySink {
    fn stdout_line(&self, host: &str, line: &str) {
        lock(&self.lines).push((Stream::Stdout, prefixed(host, line)));
    }

    fn stderr_line(&self, host: &str, line: &str) {
        lock(&self.lines).push((Stream::Stderr, prefixed(host, line)));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn test_prefix_format() {
        assert_eq!(prefixed("web1", "ok"), "[web1] ok");
        assert_eq!(prefixed("web1:2222", ""), "[web1:2222] ");
    }

    #[test]
    fn test_memory_sink_separates_streams() {
        let sink = MemorySink::new();
        sink.stdout_line("a", "out");
        sink.stderr_line("a", "err");
        sink.stdout_line("b", "out2");
        assert_eq!(sink.stream(Stream::Stdout), vec!["[a] out", "[b] out2"]);
        assert_eq!(sink.stream(Stream::Stderr), vec!["[a] err"]);
    }

    #[test]
    fn test_concurrent_writers_keep_whole_lines() {
        let sink = Arc::new(MemorySink::new());
        let handles: Vec<_> = (0..4)
            .map(|i| {
                let sink = Arc::clone(&sink);
                std::thread::spawn(move || {
                    for n in 0..100 {
                        sink.stdout_line(&format!("h{i}"), &format!("line {n}"));
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }
        let lines = sink.stream(Stream::Stdout);
        assert_eq!(lines.len(), 400);
        for i in 0..4 {
            let own: Vec<_> = lines
                .iter()
                .filter(|l| l.starts_with(&format!("[h{i}] ")))
                .collect();
            assert_eq!(own.len(), 100);
            assert_eq!(own[99], &format!("[h{i}] line 99"));
        }
    }

    #[test]
    fn test_console_sink_does_not_panic() {
        ConsoleSink.stdout_line("test-host", "stdout line");
        ConsoleSink.stderr_line("test-host", "stderr line");
    }
}

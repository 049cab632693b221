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

//! Scripted in-memory transport for driving sessions without a network.

#![allow(dead_code)]

use anyhow::Result;
use async_trait::async_trait;
use sshfan::node::Node;
use sshfan::session::{ChannelEvent, Connector, RemoteHost, SessionChannel};
use std::collections::{HashMap, VecDeque};
use std::io;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// One step of a scripted remote process.
#[derive(Debug, Clone)]
pub enum Step {
    Event(ChannelEvent),
    Sleep(Duration),
    /// Block until the session is cancelled.
    Hang,
}

/// Behaviour of one fake host.
#[derive(Debug, Clone, Default)]
pub struct HostScript {
    pub connect_delay: Duration,
    pub connect_error: Option<String>,
    pub panic_on_connect: bool,
    pub upload_error: Option<String>,
    pub spawn_error: Option<String>,
    pub write_error: Option<io::ErrorKind>,
    pub steps: Vec<Step>,
}

impl HostScript {
    pub fn new() -> Self {
        Self::default()
    }

    /// A process that prints `lines` and exits with `code`.
    pub fn exits_with(code: u32, lines: &[&str]) -> Self {
        let mut script = Self::new();
        for line in lines {
            script = script.stdout(&format!("{line}\r\n"));
        }
        script.finish(code)
    }

    pub fn connect_fails(message: &str) -> Self {
        Self {
            connect_error: Some(message.to_string()),
            ..Self::default()
        }
    }

    pub fn stdout(self, data: &str) -> Self {
        self.event(ChannelEvent::Stdout(data.as_bytes().to_vec()))
    }

    pub fn stderr(self, data: &str) -> Self {
        self.event(ChannelEvent::Stderr(data.as_bytes().to_vec()))
    }

    pub fn event(mut self, event: ChannelEvent) -> Self {
        self.steps.push(Step::Event(event));
        self
    }

    pub fn sleep(mut self, duration: Duration) -> Self {
        self.steps.push(Step::Sleep(duration));
        self
    }

    pub fn hang(mut self) -> Self {
        self.steps.push(Step::Hang);
        self
    }

    /// End of output, exit status and channel close.
    pub fn finish(self, code: u32) -> Self {
        self.event(ChannelEvent::Eof)
            .event(ChannelEvent::ExitStatus(code))
            .event(ChannelEvent::Closed)
    }
}

/// Everything the fake hosts observed, keyed by host label.
#[derive(Debug, Default)]
pub struct Record {
    pub connects: Vec<String>,
    pub uploads: Vec<(String, String)>,
    pub removals: Vec<(String, String)>,
    pub commands: Vec<(String, String)>,
    pub writes: Vec<(String, Vec<u8>)>,
    pub terminated: Vec<String>,
    pub closed: Vec<String>,
    pub disconnects: Vec<String>,
}

#[derive(Default)]
pub struct FakeConnector {
    scripts: HashMap<String, HostScript>,
    record: Arc<Mutex<Record>>,
    active: Arc<AtomicUsize>,
    peak: Arc<AtomicUsize>,
}

impl FakeConnector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn host(mut self, label: &str, script: HostScript) -> Self {
        self.scripts.insert(label.to_string(), script);
        self
    }

    pub fn record(&self) -> std::sync::MutexGuard<'_, Record> {
        self.record.lock().unwrap()
    }

    /// Highest number of hosts connected at the same moment.
    pub fn peak_connections(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Connector for FakeConnector {
    async fn connect(&self, node: &Node) -> Result<Box<dyn RemoteHost>> {
        let label = node.label();
        let script = self.scripts.get(&label).cloned().unwrap_or_default();
        self.record.lock().unwrap().connects.push(label.clone());

        let now = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);

        if !script.connect_delay.is_zero() {
            tokio::time::sleep(script.connect_delay).await;
        }
        if script.panic_on_connect {
            self.active.fetch_sub(1, Ordering::SeqCst);
            panic!("scripted panic for {label}");
        }
        if let Some(message) = &script.connect_error {
            self.active.fetch_sub(1, Ordering::SeqCst);
            anyhow::bail!("{message}");
        }

        Ok(Box::new(FakeHost {
            label,
            script,
            record: Arc::clone(&self.record),
            active: Arc::clone(&self.active),
        }))
    }
}

struct FakeHost {
    label: String,
    script: HostScript,
    record: Arc<Mutex<Record>>,
    active: Arc<AtomicUsize>,
}

#[async_trait]
impl RemoteHost for FakeHost {
    async fn upload_script(&self, _local_path: &Path, remote_path: &str) -> Result<()> {
        if let Some(message) = &self.script.upload_error {
            anyhow::bail!("{message}");
        }
        self.record
            .lock()
            .unwrap()
            .uploads
            .push((self.label.clone(), remote_path.to_string()));
        Ok(())
    }

    async fn remove_file(&self, remote_path: &str) -> Result<()> {
        self.record
            .lock()
            .unwrap()
            .removals
            .push((self.label.clone(), remote_path.to_string()));
        Ok(())
    }

    async fn spawn(&self, command: &str) -> Result<Box<dyn SessionChannel>> {
        if let Some(message) = &self.script.spawn_error {
            anyhow::bail!("{message}");
        }
        self.record
            .lock()
            .unwrap()
            .commands
            .push((self.label.clone(), command.to_string()));
        Ok(Box::new(FakeChannel {
            label: self.label.clone(),
            steps: self.script.steps.iter().cloned().collect(),
            write_error: self.script.write_error,
            record: Arc::clone(&self.record),
        }))
    }

    async fn disconnect(&self) -> Result<()> {
        self.active.fetch_sub(1, Ordering::SeqCst);
        self.record
            .lock()
            .unwrap()
            .disconnects
            .push(self.label.clone());
        Ok(())
    }
}

struct FakeChannel {
    label: String,
    steps: VecDeque<Step>,
    write_error: Option<io::ErrorKind>,
    record: Arc<Mutex<Record>>,
}

#[async_trait]
impl SessionChannel for FakeChannel {
    async fn next_event(&mut self) -> Option<ChannelEvent> {
        loop {
            match self.steps.pop_front()? {
                Step::Event(event) => return Some(event),
                Step::Sleep(duration) => tokio::time::sleep(duration).await,
                Step::Hang => std::future::pending::<()>().await,
            }
        }
    }

    async fn write_input(&mut self, data: &[u8]) -> io::Result<()> {
        if let Some(kind) = self.write_error {
            return Err(io::Error::new(kind, "scripted write failure"));
        }
        self.record
            .lock()
            .unwrap()
            .writes
            .push((self.label.clone(), data.to_vec()));
        Ok(())
    }

    async fn close_input(&mut self) -> io::Result<()> {
        Ok(())
    }

    async fn terminate(&mut self) -> io::Result<()> {
        self.record
            .lock()
            .unwrap()
            .terminated
            .push(self.label.clone());
        Ok(())
    }

    async fn close(&mut self) -> io::Result<()> {
        self.record.lock().unwrap().closed.push(self.label.clone());
        Ok(())
    }
}

pub fn node(label: &str) -> Node {
    Node::parse(label, Some("tester"), None).unwrap()
}

pub fn nodes(labels: &[&str]) -> Vec<Node> {
    labels.iter().map(|label| node(label)).collect()
}

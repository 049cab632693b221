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

//! Core parallel executor implementation.

use futures::future::join_all;
use futures::FutureExt;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use tokio::sync::{mpsc, Semaphore};
use tokio_util::sync::CancellationToken;

use crate::config::DEFAULT_PARALLEL;
use crate::node::Node;
use crate::session::{Connector, ExecutionPlan, HostDriver, HostError};

use super::output_sync::{ConsoleSink, OutputSink};
use super::result_types::{Outcome, Outcomes, RunReport};

/// Launching stops once more than this many hosts have failed.
pub const DEFAULT_FAILURE_THRESHOLD: usize = 2;

/// Runs one host driver per node with at most `max_parallel` active at once.
pub struct ParallelExecutor {
    pub(crate) nodes: Vec<Node>,
    pub(crate) max_parallel: usize,
    pub(crate) failure_threshold: usize,
    connector: Arc<dyn Connector>,
    sink: Arc<dyn OutputSink>,
    cancel: CancellationToken,
}

impl ParallelExecutor {
    pub fn new(nodes: Vec<Node>, max_parallel: usize, connector: Arc<dyn Connector>) -> Self {
        Self {
            nodes,
            max_parallel: max_parallel.max(1),
            failure_threshold: DEFAULT_FAILURE_THRESHOLD,
            connector,
            sink: Arc::new(ConsoleSink),
            cancel: CancellationToken::new(),
        }
    }

    pub fn with_default_parallelism(nodes: Vec<Node>, connector: Arc<dyn Connector>) -> Self {
        Self::new(nodes, DEFAULT_PARALLEL, connector)
    }

    pub fn with_sink(mut self, sink: Arc<dyn OutputSink>) -> Self {
        self.sink = sink;
        self
    }

    /// Share a cancellation token; cancelling it makes every running host
    /// terminate its remote process and clean up.
    pub fn with_cancel_token(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn with_failure_threshold(mut self, threshold: usize) -> Self {
        self.failure_threshold = threshold;
        self
    }

    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Run `plan` on every node and collect one outcome per launched host.
    pub async fn execute(&self, plan: ExecutionPlan) -> RunReport {
        let plan = Arc::new(plan);
        let semaphore = Arc::new(Semaphore::new(self.max_parallel));
        let (tx, mut rx) = mpsc::unbounded_channel::<(String, Outcome)>();

        let mut outcomes = Outcomes::new();
        let mut not_started = Vec::new();
        let mut handles = Vec::with_capacity(self.nodes.len());

        for (index, node) in self.nodes.iter().enumerate() {
            let permit = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => None,
                permit = Arc::clone(&semaphore).acquire_owned() => permit.ok(),
            };

            while let Ok((host, outcome)) = rx.try_recv() {
                outcomes.record(host, outcome);
            }

            let Some(permit) = permit else {
                tracing::info!("Run cancelled; not launching remaining hosts");
                not_started.extend(self.nodes[index..].iter().map(Node::label));
                break;
            };

            let failures = outcomes.failure_count();
            if failures > self.failure_threshold {
                tracing::warn!(
                    "{} hosts failed (threshold {}); not launching remaining hosts",
                    failures,
                    self.failure_threshold
                );
                not_started.extend(self.nodes[index..].iter().map(Node::label));
                break;
            }

            let driver = HostDriver::new(
                node.clone(),
                Arc::clone(&plan),
                Arc::clone(&self.connector),
                Arc::clone(&self.sink),
                self.cancel.clone(),
            );
            let label = driver.label().to_string();
            let tx = tx.clone();

            tracing::debug!("Launching {}", label);
            let handle = tokio::spawn({
                let label = label.clone();
                async move {
                    let outcome = match AssertUnwindSafe(driver.run()).catch_unwind().await {
                        Ok(outcome) => outcome,
                        Err(panic) => {
                            let message = panic_message(panic.as_ref());
                            tracing::error!("Task for {} panicked: {}", label, message);
                            Outcome::failed(HostError::Internal(message))
                        }
                    };
                    if tx.send((label, outcome)).is_err() {
                        tracing::error!("Outcome receiver dropped");
                    }
                    // Release the slot only after the outcome is queued.
                    drop(permit);
                }
            });
            handles.push((label, handle));
        }
        drop(tx);

        let (labels, handles): (Vec<String>, Vec<_>) = handles.into_iter().unzip();
        let joined = join_all(handles).await;

        while let Some((host, outcome)) = rx.recv().await {
            outcomes.record(host, outcome);
        }

        for (label, result) in labels.into_iter().zip(joined) {
            if let Err(e) = result {
                tracing::error!("Task for {} failed: {}", label, e);
                if !outcomes.contains(&label) {
                    outcomes.record(label, Outcome::failed(HostError::Internal(e.to_string())));
                }
            }
        }

        RunReport {
            outcomes,
            not_started,
        }
    }
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        format!("host task panicked: {message}")
    } else if let Some(message) = panic.downcast_ref::<String>() {
        format!("host task panicked: {message}")
    } else {
        "host task panicked".to_string()
    }
}

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

//! Per-host outcomes and the run-level collection of them.

use std::collections::btree_map::Entry;
use std::collections::BTreeMap;

use crate::session::HostError;

/// How the remote process ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteExit {
    pub exit_code: u32,
    pub signal: Option<String>,
}

/// Final result for one launched host.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Outcome {
    pub exit_code: u32,
    pub signal: Option<String>,
    pub error: Option<HostError>,
}

impl Outcome {
    pub fn exited(exit: RemoteExit) -> Self {
        Self {
            exit_code: exit.exit_code,
            signal: exit.signal,
            error: None,
        }
    }

    pub fn failed(error: HostError) -> Self {
        Self {
            exit_code: error.exit_code(),
            signal: None,
            error: Some(error),
        }
    }

    /// Exit code 0, no signal and no error.
    pub fn succeeded(&self) -> bool {
        self.exit_code == 0 && self.signal.is_none() && self.error.is_none()
    }

    /// One-line description of why the host failed.
    pub fn failure_reason(&self) -> String {
        if let Some(error) = &self.error {
            return error.to_string();
        }
        match &self.signal {
            Some(signal) => format!("killed by signal {signal}"),
            None => format!("exit code {}", self.exit_code),
        }
    }
}

/// Outcomes keyed by host label, iterated in label order.
///
/// Only the controller inserts; a recorded outcome is never replaced.
#[derive(Debug, Default, Clone)]
pub struct Outcomes {
    map: BTreeMap<String, Outcome>,
}

impl Outcomes {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record `outcome` for `host`. Returns false if one was already recorded.
    pub fn record(&mut self, host: String, outcome: Outcome) -> bool {
        match self.map.entry(host) {
            Entry::Vacant(slot) => {
                slot.insert(outcome);
                true
            }
            Entry::Occupied(slot) => {
                tracing::warn!("Ignoring duplicate outcome for {}", slot.key());
                false
            }
        }
    }

    pub fn get(&self, host: &str) -> Option<&Outcome> {
        self.map.get(host)
    }

    pub fn contains(&self, host: &str) -> bool {
        self.map.contains_key(host)
    }

    pub fn failure_count(&self) -> usize {
        self.map.values().filter(|o| !o.succeeded()).count()
    }

    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Outcome)> {
        self.map.iter()
    }
}

/// Everything the run produced: one outcome per launched host plus the
/// hosts the early-abort policy never launched.
#[derive(Debug, Default, Clone)]
pub struct RunReport {
    pub outcomes: Outcomes,
    pub not_started: Vec<String>,
}

impl RunReport {
    pub fn successes(&self) -> Vec<&str> {
        self.outcomes
            .iter()
            .filter(|(_, o)| o.succeeded())
            .map(|(host, _)| host.as_str())
            .collect()
    }

    pub fn failures(&self) -> Vec<(&str, &Outcome)> {
        self.outcomes
            .iter()
            .filter(|(_, o)| !o.succeeded())
            .map(|(host, o)| (host.as_str(), o))
            .collect()
    }

    /// Process exit status: 0 only when every host ran and succeeded.
    pub fn exit_status(&self) -> i32 {
        if self.outcomes.failure_count() > 0 || !self.not_started.is_empty() {
            1
        } else {
            0
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn exit(code: u32) -> Outcome {
        Outcome::exited(RemoteExit {
            exit_code: code,
            signal: None,
        })
    }

    #[test]
    fn test_success_requires_zero_and_no_signal() {
        assert!(exit(0).succeeded());
        assert!(!exit(1).succeeded());
        let signalled = Outcome::exited(RemoteExit {
            exit_code: 0,
            signal: Some("KILL".to_string()),
        });
        assert!(!signalled.succeeded());
        assert_eq!(signalled.failure_reason(), "killed by signal KILL");
        assert!(!Outcome::failed(HostError::Cancelled).succeeded());
        assert_eq!(Outcome::failed(HostError::Cancelled).exit_code, 255);
    }

    #[test]
    fn test_record_never_overwrites() {
        let mut outcomes = Outcomes::new();
        assert!(outcomes.record("a".into(), exit(0)));
        assert!(!outcomes.record("a".into(), exit(3)));
        assert_eq!(outcomes.get("a").unwrap().exit_code, 0);
        assert_eq!(outcomes.len(), 1);
    }

    #[test]
    fn test_partition_is_sorted_and_disjoint() {
        let mut report = RunReport::default();
        report.outcomes.record("c".into(), exit(0));
        report.outcomes.record("a".into(), exit(2));
        report.outcomes.record("b".into(), exit(0));

        assert_eq!(report.successes(), vec!["b", "c"]);
        let failed: Vec<&str> = report.failures().iter().map(|(h, _)| *h).collect();
        assert_eq!(failed, vec!["a"]);
        assert_eq!(report.exit_status(), 1);
    }

    #[test]
    fn test_all_success_exit_status() {
        let mut report = RunReport::default();
        report.outcomes.record("a".into(), exit(0));
        assert_eq!(report.exit_status(), 0);
        assert_eq!(RunReport::default().exit_status(), 0);
    }

    #[test]
    fn test_not_started_hosts_fail_the_run() {
        let mut report = RunReport::default();
        report.outcomes.record("a".into(), exit(0));
        report.not_started.push("b".into());
        assert!(report.failures().is_empty());
        assert_eq!(report.exit_status(), 1);
    }
}

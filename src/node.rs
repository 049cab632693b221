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

use anyhow::{bail, Context, Result};
use std::collections::HashSet;
use std::fmt;

pub const DEFAULT_SSH_PORT: u16 = 22;

/// A remote host targeted by one session.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Node {
    pub host: String,
    pub port: u16,
    pub username: String,
}

impl Node {
    pub fn new(host: String, port: u16, username: String) -> Self {
        Self {
            host,
            port,
            username,
        }
    }

    pub fn parse(
        node_str: &str,
        default_user: Option<&str>,
        default_port: Option<u16>,
    ) -> Result<Self> {
        // Parse formats:
        // - host
        // - host:port
        // - user@host
        // - user@host:port
        // - [v6addr] / [v6addr]:port
        let node_str = node_str.trim();
        if node_str.is_empty() {
            bail!("Empty host specification");
        }

        let (user_part, host_part) = match node_str.find('@') {
            Some(at_pos) => (Some(&node_str[..at_pos]), &node_str[at_pos + 1..]),
            None => (None, node_str),
        };

        if matches!(user_part, Some("")) {
            bail!("Empty username in host specification '{node_str}'");
        }

        let default_port = default_port.unwrap_or(DEFAULT_SSH_PORT);
        let (host, port) = if let Some(rest) = host_part.strip_prefix('[') {
            let close = rest
                .find(']')
                .with_context(|| format!("Unclosed '[' in host specification '{node_str}'"))?;
            let host = &rest[..close];
            let port = match rest[close + 1..].strip_prefix(':') {
                Some(port_str) => port_str.parse::<u16>().context("Invalid port number")?,
                None => default_port,
            };
            (host, port)
        } else if host_part.matches(':').count() > 1 {
            // Bare IPv6 address; a port needs the bracketed form.
            (host_part, default_port)
        } else if let Some(colon_pos) = host_part.rfind(':') {
            let host = &host_part[..colon_pos];
            let port_str = &host_part[colon_pos + 1..];
            let port = port_str.parse::<u16>().context("Invalid port number")?;
            (host, port)
        } else {
            (host_part, default_port)
        };

        if host.is_empty() {
            bail!("Empty hostname in host specification '{node_str}'");
        }

        let username = user_part
            .or(default_user)
            .map(|s| s.to_string())
            .unwrap_or_else(crate::config::get_current_username);

        Ok(Node {
            host: host.to_string(),
            port,
            username,
        })
    }

    /// Identifier used for output prefixes, outcome keys and report ordering.
    pub fn label(&self) -> String {
        if self.port == DEFAULT_SSH_PORT {
            self.host.clone()
        } else if self.host.contains(':') {
            format!("[{}]:{}", self.host, self.port)
        } else {
            format!("{}:{}", self.host, self.port)
        }
    }
}

impl fmt::Display for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}:{}", self.username, self.host, self.port)
    }
}

/// Drop repeated hosts while keeping submission order.
pub fn dedup_nodes(nodes: Vec<Node>) -> Vec<Node> {
    let mut seen = HashSet::new();
    nodes
        .into_iter()
        .filter(|node| seen.insert(node.label()))
        .collect()
}

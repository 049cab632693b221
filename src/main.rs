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

use anyhow::{Context, Result};
use clap::Parser;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

use sshfan::{
    cli::Cli,
    config::{load_hostfile, Config, DEFAULT_CONNECT_TIMEOUT, DEFAULT_PARALLEL},
    executor::{print_summary, should_use_colors, ParallelExecutor},
    node::{dedup_nodes, Node},
    security::resolve_sudo_password,
    session::ExecutionPlan,
    ssh::{AuthContext, ConnectionConfig, SshConnector},
    utils::{init_logging, spawn_interrupt_listener},
};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let config = load_config(&cli).await?;
    let nodes = resolve_nodes(&cli, &config).await?;
    let plan = build_plan(&cli)?;

    let max_parallel = cli
        .parallel
        .or(config.defaults.parallel)
        .unwrap_or(DEFAULT_PARALLEL);
    if max_parallel == 0 {
        anyhow::bail!("--parallel must be at least 1");
    }

    // Every prompt happens here, before the first host is contacted.
    let auth = AuthContext::new()
        .with_key_path(cli.identity.clone().or_else(|| config.ssh_key_path()))
        .with_agent(cli.use_agent)
        .with_password(cli.password)
        .determine_method()?;
    let connect_timeout = cli
        .connect_timeout
        .or(config.defaults.connect_timeout)
        .unwrap_or(DEFAULT_CONNECT_TIMEOUT);
    let connection = ConnectionConfig::new(auth)
        .with_strict_mode(cli.strict_host_key_checking)
        .with_connect_timeout(Duration::from_secs(connect_timeout));

    tracing::info!(
        "Running on {} host(s) with up to {} concurrent sessions",
        nodes.len(),
        max_parallel
    );

    let cancel = CancellationToken::new();
    let listener = spawn_interrupt_listener(cancel.clone());

    let executor = ParallelExecutor::new(nodes, max_parallel, Arc::new(SshConnector::new(connection)))
        .with_cancel_token(cancel.clone());
    let report = executor.execute(plan).await;

    cancel.cancel();
    if let Err(e) = listener.await {
        tracing::debug!("Signal listener ended abnormally: {}", e);
    }

    print_summary(&report, !cli.no_color && should_use_colors());
    std::process::exit(report.exit_status());
}

async fn load_config(cli: &Cli) -> Result<Config> {
    match &cli.config {
        Some(path) => Config::load(path, true).await,
        None => match Config::default_path() {
            Some(path) => Config::load(&path, false).await,
            None => Ok(Config::default()),
        },
    }
}

/// Collect hosts from `-H` and the host file, in that order, first
/// occurrence winning.
async fn resolve_nodes(cli: &Cli, config: &Config) -> Result<Vec<Node>> {
    let mut specs = cli.hosts.clone();
    if let Some(hostfile) = &cli.hostfile {
        specs.extend(load_hostfile(hostfile).await?);
    }

    let default_user = cli.user.as_deref().or(config.defaults.user.as_deref());
    let nodes = specs
        .iter()
        .map(|spec| {
            Node::parse(spec, default_user, config.defaults.port)
                .with_context(|| format!("Invalid host '{spec}'"))
        })
        .collect::<Result<Vec<_>>>()?;

    let nodes = dedup_nodes(nodes);
    if nodes.is_empty() {
        anyhow::bail!("No hosts specified. Use -H host1,host2 or -f hostfile.");
    }
    Ok(nodes)
}

fn build_plan(cli: &Cli) -> Result<ExecutionPlan> {
    let plan = match &cli.script {
        Some(script) => {
            let metadata = std::fs::metadata(script)
                .with_context(|| format!("Cannot read script {}", script.display()))?;
            if !metadata.is_file() {
                anyhow::bail!("Script {} is not a regular file", script.display());
            }
            ExecutionPlan::script(script.clone(), cli.command.clone())
        }
        None if cli.has_command() => ExecutionPlan::command(cli.command.clone()),
        None => anyhow::bail!("No command specified. Pass a command after -- or use --script."),
    };

    Ok(plan.with_sudo_password(resolve_sudo_password(cli.ask_sudo_password)?))
}

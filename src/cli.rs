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

use clap::Parser;
use std::path::PathBuf;

use crate::ssh::StrictHostKeyChecking;

#[derive(Parser, Debug)]
#[command(
    name = "sshfan",
    version,
    about = "Run one command or local script on many hosts over SSH",
    long_about = "sshfan runs a command, or stages and runs a local script, on every target host\nwith a bounded number of concurrent SSH sessions. Output lines are prefixed with\nthe host they came from. When sudo asks for a password, sshfan answers it once per host.\nLaunching stops once more than two hosts have failed.",
    after_help = "EXAMPLES:\n  Run a command:            sshfan -H \"web1,web2,db1:2222\" -- uptime\n  Run a script with sudo:   sshfan -f hosts.txt -S -s ./patch.sh\n  Widen the worker pool:    sshfan -f hosts.txt -p 20 -- df -h\n\nExit codes: 0 (every host succeeded), 1 (any failure or host not started)"
)]
pub struct Cli {
    #[arg(
        short = 'H',
        long,
        value_delimiter = ',',
        help = "Comma-separated list of hosts in [user@]hostname[:port] format\nMay be given more than once"
    )]
    pub hosts: Vec<String>,

    #[arg(
        short = 'f',
        long,
        help = "File with one host per line (# comments and blank lines ignored)"
    )]
    pub hostfile: Option<PathBuf>,

    #[arg(
        short = 's',
        long,
        help = "Local script to upload to each host and run\nRemaining arguments are passed to the script"
    )]
    pub script: Option<PathBuf>,

    #[arg(
        short = 'p',
        long,
        help = "Maximum concurrent hosts [default: 5, or defaults.parallel from config]"
    )]
    pub parallel: Option<usize>,

    #[arg(short = 'u', long, help = "Default username for SSH connections")]
    pub user: Option<String>,

    #[arg(
        short = 'i',
        long,
        help = "SSH private key file path (prompts for passphrase if encrypted)\nFalls back to default keys (~/.ssh/id_ed25519, ~/.ssh/id_rsa, etc.) if not specified"
    )]
    pub identity: Option<PathBuf>,

    #[arg(
        short = 'A',
        long,
        help = "Use SSH agent for authentication\nAuto-detected when SSH_AUTH_SOCK is set"
    )]
    pub use_agent: bool,

    #[arg(long, help = "Use SSH password authentication (prompted once)")]
    pub password: bool,

    #[arg(
        short = 'S',
        long,
        help = "Prompt once for the sudo password sent to every host\nSSHFAN_SUDO_PASSWORD is used instead when set"
    )]
    pub ask_sudo_password: bool,

    #[arg(
        long,
        value_enum,
        default_value_t = StrictHostKeyChecking::AcceptNew,
        help = "Host key checking mode\n  yes        - Strict checking against known_hosts\n  no         - Accept all host keys (insecure, testing only)\n  accept-new - Accept new hosts, reject changed keys"
    )]
    pub strict_host_key_checking: StrictHostKeyChecking,

    #[arg(
        long,
        help = "SSH connection timeout in seconds [default: 30]\nBounds transport setup only, never the remote command"
    )]
    pub connect_timeout: Option<u64>,

    #[arg(
        long,
        help = "Configuration file path [default: ~/.config/sshfan/config.yaml]"
    )]
    pub config: Option<PathBuf>,

    #[arg(
        short = 'v',
        long,
        action = clap::ArgAction::Count,
        help = "Increase verbosity (-v, -vv, -vvv)"
    )]
    pub verbose: u8,

    #[arg(long, help = "Disable colored summary output")]
    pub no_color: bool,

    #[arg(
        trailing_var_arg = true,
        allow_hyphen_values = true,
        help = "Command to run on remote hosts (or arguments for --script)"
    )]
    pub command: Vec<String>,
}

impl Cli {
    pub fn has_command(&self) -> bool {
        !self.command.is_empty()
    }
}

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

//! Remote staging of local scripts and construction of the remote command line.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use super::prompt::PromptMarker;
use crate::security::SudoPassword;

/// Everything a host driver needs to know about what to run.
///
/// Shared read-only by all hosts of a run.
#[derive(Debug, Clone)]
pub struct ExecutionPlan {
    /// Command tokens, or the script's arguments when `script` is set
    pub args: Vec<String>,
    pub script: Option<PathBuf>,
    pub sudo_password: Option<Arc<SudoPassword>>,
    pub marker: PromptMarker,
}

impl ExecutionPlan {
    pub fn command(args: Vec<String>) -> Self {
        Self {
            args,
            script: None,
            sudo_password: None,
            marker: PromptMarker::default(),
        }
    }

    pub fn script(script: PathBuf, args: Vec<String>) -> Self {
        Self {
            args,
            script: Some(script),
            sudo_password: None,
            marker: PromptMarker::default(),
        }
    }

    pub fn with_sudo_password(mut self, password: Option<SudoPassword>) -> Self {
        self.sudo_password = password.map(Arc::new);
        self
    }

    /// Full remote command line, with the staged script path substituted
    /// in front of the arguments when a script is run.
    pub fn remote_command(&self, staged_path: Option<&str>) -> String {
        let mut parts = Vec::with_capacity(self.args.len() + 1);
        if let Some(path) = staged_path {
            parts.push(shell_quote(path));
        }
        parts.extend(self.args.iter().cloned());
        self.marker.wrap_command(&parts.join(" "))
    }
}

/// Remote temp path for a staged copy of `script`:
/// `/tmp/<program>.<timestamp>.<pid>.<random>.<basename>`.
pub fn remote_script_path(script: &Path) -> String {
    let basename = script
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| "script".to_string());
    format!(
        "/tmp/{}.{}.{}.{:08x}.{}",
        env!("CARGO_PKG_NAME"),
        chrono::Local::now().format("%Y%m%d%H%M%S"),
        std::process::id(),
        fastrand::u32(..),
        basename
    )
}

/// Quote `s` for a POSIX shell.
pub fn shell_quote(s: &str) -> String {
    if !s.is_empty()
        && s.bytes()
            .all(|b| b.is_ascii_alphanumeric() || b"/._-+:=,@%".contains(&b))
    {
        return s.to_string();
    }
    format!("'{}'", s.replace('\'', r"'\''"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_remote_script_path_shape() {
        let path = remote_script_path(Path::new("/home/me/deploy.sh"));
        assert!(path.starts_with("/tmp/sshfan."));
        assert!(path.ends_with(".deploy.sh"));
        let fields: Vec<&str> = path.trim_start_matches("/tmp/").split('.').collect();
        assert_eq!(fields.len(), 6);
        assert_eq!(fields[1].len(), 14);
        assert_eq!(fields[2], std::process::id().to_string());
        assert_eq!(fields[3].len(), 8);
    }

    #[test]
    fn test_remote_script_paths_differ() {
        let a = remote_script_path(Path::new("x.sh"));
        let b = remote_script_path(Path::new("x.sh"));
        assert_ne!(a, b);
    }

    #[test]
    fn test_shell_quote() {
        assert_eq!(shell_quote("/tmp/a.sh"), "/tmp/a.sh");
        assert_eq!(shell_quote("my script.sh"), "'my script.sh'");
        assert_eq!(shell_quote("it's"), r"'it'\''s'");
        assert_eq!(shell_quote(""), "''");
    }

    #[test]
    fn test_remote_command_for_plain_command() {
        let plan = ExecutionPlan::command(vec!["uptime".into(), "-p".into()]);
        assert_eq!(
            plan.remote_command(None),
            "export SUDO_PROMPT='[sudo via sshfan] password: '; uptime -p"
        );
    }

    #[test]
    fn test_remote_command_for_script() {
        let plan = ExecutionPlan::script("run.sh".into(), vec!["--fast".into()]);
        assert_eq!(
            plan.remote_command(Some("/tmp/x.run.sh")),
            "export SUDO_PROMPT='[sudo via sshfan] password: '; /tmp/x.run.sh --fast"
        );
    }
}

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

//! Final per-host report.

use owo_colors::{OwoColorize, Style};
use std::fmt::Write;

use super::result_types::RunReport;

/// Check if stdout is an interactive terminal outside CI.
pub fn is_tty() -> bool {
    use std::io::IsTerminal;

    let is_terminal = std::io::stdout().is_terminal();
    let is_ci = std::env::var("CI").is_ok() || std::env::var("GITHUB_ACTIONS").is_ok();

    is_terminal && !is_ci
}

/// Colors are used on a terminal unless `NO_COLOR` is set or TERM is dumb.
pub fn should_use_colors() -> bool {
    if !is_tty() || std::env::var("NO_COLOR").is_ok() {
        return false;
    }
    !matches!(std::env::var("TERM").as_deref(), Ok("dumb"))
}

struct Palette {
    color: bool,
}

impl Palette {
    fn paint(&self, text: &str, style: Style) -> String {
        if self.color {
            text.style(style).to_string()
        } else {
            text.to_string()
        }
    }
}

/// Render the summary: a headline, then successes, failures and hosts that
/// were never started, each sorted by host.
pub fn render_summary(report: &RunReport, color: bool) -> String {
    let palette = Palette { color };
    let green = Style::new().green();
    let red = Style::new().red();
    let dimmed = Style::new().dimmed();

    let successes = report.successes();
    let failures = report.failures();
    let mut not_started: Vec<&str> = report.not_started.iter().map(String::as_str).collect();
    not_started.sort_unstable();

    let total = successes.len() + failures.len() + not_started.len();
    let mut parts = vec![format!(
        "{} {}",
        total,
        if total == 1 { "host" } else { "hosts" }
    )];
    if !successes.is_empty() {
        parts.push(palette.paint(&format!("{} successful", successes.len()), green));
    }
    if !failures.is_empty() {
        parts.push(palette.paint(&format!("{} failed", failures.len()), red));
    }
    if !not_started.is_empty() {
        parts.push(palette.paint(&format!("{} not started", not_started.len()), dimmed));
    }

    let mut out = String::new();
    let _ = writeln!(out);
    let _ = writeln!(
        out,
        "{}",
        palette.paint(&format!("Summary: {}", parts.join(" • ")), Style::new().bold())
    );

    if !successes.is_empty() {
        let _ = writeln!(out, "Succeeded:");
        for host in &successes {
            let _ = writeln!(out, "  {} {}", palette.paint("●", green), host);
        }
    }

    if !failures.is_empty() {
        let _ = writeln!(out, "Failed:");
        for (host, outcome) in &failures {
            let _ = writeln!(
                out,
                "  {} {}: {}",
                palette.paint("●", red),
                host,
                palette.paint(&outcome.failure_reason(), red)
            );
        }
    }

    if !not_started.is_empty() {
        let _ = writeln!(out, "Not started:");
        for host in &not_started {
            let _ = writeln!(out, "  {} {}", palette.paint("○", dimmed), host);
        }
    }

    out
}

pub fn print_summary(report: &RunReport, color: bool) {
    print!("{}", render_summary(report, color));
}

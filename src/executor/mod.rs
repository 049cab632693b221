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

//! Bounded parallel execution across hosts and result reporting.

mod output_sync;
mod parallel;
mod result_types;
mod summary;

pub use output_sync::{prefixed, ConsoleSink, MemorySink, OutputSink, Stream};
pub use parallel::{ParallelExecutor, DEFAULT_FAILURE_THRESHOLD};
pub use result_types::{Outcome, Outcomes, RemoteExit, RunReport};
pub use summary::{print_summary, render_summary, should_use_colors};

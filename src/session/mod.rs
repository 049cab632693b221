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

//! Per-host remote sessions: line framing, sudo prompt handling and the
//! driver that runs one host from connect to outcome.

mod channel;
mod driver;
mod error;
mod framer;
mod prompt;
mod staging;

pub use channel::{ChannelEvent, Connector, RemoteHost, SessionChannel};
pub use driver::HostDriver;
pub use error::{HostError, FAILURE_EXIT_CODE};
pub use framer::{LineFramer, CHUNK_CAPACITY};
pub use prompt::{PromptDetector, PromptMarker};
pub use staging::{remote_script_path, shell_quote, ExecutionPlan};

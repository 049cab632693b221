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

//! Error type for the low-level SSH client.

use std::io;

#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("Key authentication failed")]
    KeyAuthFailed,

    #[error("Unable to load key, bad format or passphrase: {0}")]
    KeyInvalid(russh::keys::Error),

    #[error("Password authentication failed")]
    PasswordWrong,

    #[error("Invalid address was provided: {0}")]
    AddressInvalid(io::Error),

    #[error("The executed command didn't send an exit code")]
    CommandDidntExit,

    #[error("Server check failed")]
    ServerCheckFailed,

    #[error("Remote refused the {0} request")]
    ChannelRequestFailed(&'static str),

    #[error("Failed to connect to SSH agent")]
    AgentConnectionFailed,

    #[error("Failed to request identities from SSH agent")]
    AgentRequestIdentitiesFailed,

    #[error("SSH agent has no identities")]
    AgentNoIdentities,

    #[error("SSH agent authentication failed")]
    AgentAuthenticationFailed,

    #[error("Ssh error occured: {0}")]
    SshError(#[from] russh::Error),

    #[error("SFTP error occured: {0}")]
    SftpError(#[from] russh_sftp::client::error::Error),

    #[error("I/O error: {0}")]
    IoError(#[from] io::Error),
}

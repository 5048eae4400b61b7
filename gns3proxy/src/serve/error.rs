/*
 * Copyright 2025 gns3proxy and/or its affiliates.
 *
 * Licensed under the Apache License, Version 2.0 (the "License");
 * you may not use this file except in compliance with the License.
 * You may obtain a copy of the License at
 *
 *     http://www.apache.org/licenses/LICENSE-2.0
 *
 * Unless required by applicable law or agreed to in writing, software
 * distributed under the License is distributed on an "AS IS" BASIS,
 * WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
 * See the License for the specific language governing permissions and
 * limitations under the License.
 */

use std::io;
use std::time::Duration;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum ServerTaskError {
    #[error("internal server error: {0}")]
    InternalServerError(&'static str),
    #[error("client authentication required")]
    AuthRequired,
    #[error("request denied by rule")]
    DeniedByRule,
    #[error("invalid client protocol: {0}")]
    InvalidClientProtocol(&'static str),
    #[error("invalid upstream protocol: {0}")]
    InvalidUpstreamProtocol(&'static str),
    #[error("tcp write to client: {0:?}")]
    ClientTcpWriteFailed(io::Error),
    #[error("client app timeout: {0}")]
    ClientAppTimeout(&'static str),
    #[error("no upstream selected for user")]
    UpstreamNotSelected,
    #[error("upstream not connected: {0:?}")]
    UpstreamNotConnected(io::Error),
    #[error("upstream misconfigured: {0}")]
    UpstreamMisconfigured(&'static str),
    #[error("write to upstream: {0:?}")]
    UpstreamWriteFailed(io::Error),
    #[error("upstream app timeout: {0}")]
    UpstreamAppTimeout(&'static str),
    #[error("closed by upstream")]
    ClosedByUpstream,
    #[error("idle after {0:?}")]
    Idle(Duration),
    #[error("finished")]
    Finished, // this isn't an error, for log only
}

impl ServerTaskError {
    pub fn brief(&self) -> &'static str {
        match self {
            ServerTaskError::InternalServerError(_) => "InternalServerError",
            ServerTaskError::AuthRequired => "AuthRequired",
            ServerTaskError::DeniedByRule => "DeniedByRule",
            ServerTaskError::InvalidClientProtocol(_) => "InvalidClientProtocol",
            ServerTaskError::InvalidUpstreamProtocol(_) => "InvalidUpstreamProtocol",
            ServerTaskError::ClientTcpWriteFailed(_) => "ClientTcpWriteFailed",
            ServerTaskError::ClientAppTimeout(_) => "ClientAppTimeout",
            ServerTaskError::UpstreamNotSelected => "UpstreamNotSelected",
            ServerTaskError::UpstreamNotConnected(_) => "UpstreamNotConnected",
            ServerTaskError::UpstreamMisconfigured(_) => "UpstreamMisconfigured",
            ServerTaskError::UpstreamWriteFailed(_) => "UpstreamWriteFailed",
            ServerTaskError::UpstreamAppTimeout(_) => "UpstreamAppTimeout",
            ServerTaskError::ClosedByUpstream => "ClosedByUpstream",
            ServerTaskError::Idle(_) => "Idle",
            ServerTaskError::Finished => "Finished",
        }
    }
}

pub type ServerTaskResult<T> = Result<T, ServerTaskError>;

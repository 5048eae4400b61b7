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

use std::net::IpAddr;

use indexmap::IndexMap;
use log::{debug, error};

use crate::auth::UserGroup;
use crate::config::MappingRule;
use crate::serve::{ServerTaskError, ServerTaskResult};

/// Fallback target used when no mapping rule fires.
#[derive(Debug, Clone)]
pub enum DefaultBackend {
    /// symbolic name from the `[servers]` section
    Named(String),
    /// literal IP address
    Literal(IpAddr),
}

/// Picks a backend address for an authenticated identity by applying
/// the ordered mapping rules, falling back to the default backend.
pub struct BackendRouter {
    servers: IndexMap<String, IpAddr>,
    mappings: Vec<MappingRule>,
    default_backend: Option<DefaultBackend>,
}

impl BackendRouter {
    pub fn new(
        servers: IndexMap<String, IpAddr>,
        mappings: Vec<MappingRule>,
        default_backend: Option<DefaultBackend>,
    ) -> Self {
        BackendRouter {
            servers,
            mappings,
            default_backend,
        }
    }

    /// First matching mapping wins. A mapping naming an unknown server
    /// is a fatal misconfiguration, not a silent fallback; config
    /// loading rejects it, so hitting that branch here means the
    /// session must die without a 401.
    pub(crate) fn select(&self, username: &str, users: &UserGroup) -> ServerTaskResult<IpAddr> {
        for rule in &self.mappings {
            for user in users.names() {
                if !rule.user.is_match(user) || user != username {
                    continue;
                }
                debug!(
                    "user {username} matched mapping {}, choosing server {}",
                    rule.user.as_str(),
                    rule.server
                );
                return self.servers.get(&rule.server).copied().ok_or_else(|| {
                    error!("mapped server {} not found in config", rule.server);
                    ServerTaskError::InternalServerError("mapped server not found in config")
                });
            }
        }

        match &self.default_backend {
            Some(DefaultBackend::Named(name)) => {
                self.servers.get(name).copied().ok_or_else(|| {
                    error!("default server {name} not found in config");
                    ServerTaskError::InternalServerError("default server not found in config")
                })
            }
            Some(DefaultBackend::Literal(ip)) => Ok(*ip),
            None => {
                error!(
                    "cannot find appropriate server using mapping and no \
                     default server defined in config"
                );
                Err(ServerTaskError::UpstreamNotSelected)
            }
        }
    }
}

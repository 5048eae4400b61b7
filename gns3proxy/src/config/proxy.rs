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
use std::str::FromStr;

use anyhow::{anyhow, Context};
use base64::engine::general_purpose::STANDARD as B64;
use base64::Engine;
use indexmap::IndexMap;

use super::rule::{DenyRule, MappingRule, ProjectFilterRule};
use crate::route::DefaultBackend;

const DEFAULT_LISTEN_HOST: &str = "127.0.0.1";
const DEFAULT_LISTEN_PORT: u16 = 13080;
const DEFAULT_BACKEND_USER: &str = "admin";
const DEFAULT_BACKEND_PASSWORD: &str = "password";
const DEFAULT_BACKEND_PORT: u16 = 3080;
const DEFAULT_BACKLOG: u32 = 100;
const DEFAULT_RECVBUF_SIZE: usize = 81920;
const DEFAULT_OPEN_FILE_LIMIT: u64 = 1024;

/// Typed proxy configuration, immutable once loaded and shared
/// read-only by every session.
#[derive(Debug)]
pub struct ProxyConfig {
    pub hostname: String,
    pub port: u16,
    backend_user: String,
    backend_password: String,
    /// pre-encoded `Basic ...` value used for every forwarded request
    pub backend_auth_code: String,
    pub backend_port: u16,
    default_server: Option<String>,
    pub default_backend: Option<DefaultBackend>,
    pub backlog: u32,
    pub server_recvbuf_size: usize,
    pub client_recvbuf_size: usize,
    pub open_file_limit: u64,
    pub servers: IndexMap<String, IpAddr>,
    pub users: IndexMap<String, String>,
    pub mappings: Vec<MappingRule>,
    pub project_filters: Vec<ProjectFilterRule>,
    pub deny_rules: Vec<DenyRule>,
}

impl Default for ProxyConfig {
    fn default() -> Self {
        ProxyConfig {
            hostname: DEFAULT_LISTEN_HOST.to_string(),
            port: DEFAULT_LISTEN_PORT,
            backend_user: DEFAULT_BACKEND_USER.to_string(),
            backend_password: DEFAULT_BACKEND_PASSWORD.to_string(),
            backend_auth_code: String::new(),
            backend_port: DEFAULT_BACKEND_PORT,
            default_server: None,
            default_backend: None,
            backlog: DEFAULT_BACKLOG,
            server_recvbuf_size: DEFAULT_RECVBUF_SIZE,
            client_recvbuf_size: DEFAULT_RECVBUF_SIZE,
            open_file_limit: DEFAULT_OPEN_FILE_LIMIT,
            servers: IndexMap::new(),
            users: IndexMap::new(),
            mappings: Vec::new(),
            project_filters: Vec::new(),
            deny_rules: Vec::new(),
        }
    }
}

impl ProxyConfig {
    /// Handle one key of the `[proxy]` section. An empty value keeps
    /// the built-in default, matching how deployed config files leave
    /// keys blank.
    pub(super) fn set(&mut self, k: &str, v: &str) -> anyhow::Result<()> {
        if v.is_empty() {
            return Ok(());
        }
        match k {
            "hostname" => {
                self.hostname = v.to_string();
                Ok(())
            }
            "port" => {
                self.port = u16::from_str(v).context("invalid port value")?;
                Ok(())
            }
            "backend_user" => {
                self.backend_user = v.to_string();
                Ok(())
            }
            "backend_password" => {
                self.backend_password = v.to_string();
                Ok(())
            }
            "backend_port" => {
                self.backend_port = u16::from_str(v).context("invalid backend_port value")?;
                Ok(())
            }
            "default_server" => {
                self.default_server = Some(v.to_string());
                Ok(())
            }
            "backlog" => {
                self.backlog = u32::from_str(v).context("invalid backlog value")?;
                Ok(())
            }
            "server-recvbuf-size" => {
                self.server_recvbuf_size =
                    usize::from_str(v).context("invalid server-recvbuf-size value")?;
                Ok(())
            }
            "client-recvbuf-size" => {
                self.client_recvbuf_size =
                    usize::from_str(v).context("invalid client-recvbuf-size value")?;
                Ok(())
            }
            "open-file-limit" => {
                self.open_file_limit =
                    u64::from_str(v).context("invalid open-file-limit value")?;
                Ok(())
            }
            _ => Err(anyhow!("invalid key {k}")),
        }
    }

    pub(super) fn add_server(&mut self, name: &str, addr: &str) -> anyhow::Result<()> {
        let ip = IpAddr::from_str(addr)
            .map_err(|_| anyhow!("server {name} address '{addr}' is not a valid IP address"))?;
        self.servers.insert(name.to_string(), ip);
        Ok(())
    }

    pub(super) fn add_user(&mut self, name: &str, password: &str) {
        self.users.insert(name.to_string(), password.to_string());
    }

    pub(super) fn check(&mut self) -> anyhow::Result<()> {
        self.backend_auth_code = format!(
            "Basic {}",
            B64.encode(format!("{}:{}", self.backend_user, self.backend_password))
        );

        for rule in &self.mappings {
            if !self.servers.contains_key(&rule.server) {
                return Err(anyhow!(
                    "mapped server {} is not defined in servers",
                    rule.server
                ));
            }
        }

        if let Some(name) = &self.default_server {
            self.default_backend = if self.servers.contains_key(name) {
                Some(DefaultBackend::Named(name.clone()))
            } else {
                let ip = IpAddr::from_str(name).map_err(|_| {
                    anyhow!(
                        "default_server {name} is neither an entry in servers \
                         nor a valid IP address"
                    )
                })?;
                Some(DefaultBackend::Literal(ip))
            };
        }

        if self.users.is_empty() {
            log::warn!("no users defined, every request will be rejected");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let config = ProxyConfig::default();
        assert_eq!(config.hostname, "127.0.0.1");
        assert_eq!(config.port, 13080);
        assert_eq!(config.backend_port, 3080);
        assert_eq!(config.backlog, 100);
        assert_eq!(config.server_recvbuf_size, 81920);
        assert_eq!(config.client_recvbuf_size, 81920);
        assert_eq!(config.open_file_limit, 1024);
    }

    #[test]
    fn empty_value_keeps_default() {
        let mut config = ProxyConfig::default();
        config.set("port", "").unwrap();
        assert_eq!(config.port, 13080);
    }

    #[test]
    fn backend_credential_is_pre_encoded() {
        let mut config = ProxyConfig::default();
        config.check().unwrap();
        // admin:password
        assert_eq!(config.backend_auth_code, "Basic YWRtaW46cGFzc3dvcmQ=");
    }

    #[test]
    fn unknown_key_is_rejected() {
        let mut config = ProxyConfig::default();
        assert!(config.set("no-such-key", "1").is_err());
    }

    #[test]
    fn server_address_must_be_ip() {
        let mut config = ProxyConfig::default();
        assert!(config.add_server("lab", "10.0.0.1").is_ok());
        assert!(config.add_server("bad", "gns3.example.net").is_err());
    }

    #[test]
    fn mapping_must_reference_known_server() {
        let mut config = ProxyConfig::default();
        config.add_server("lab", "10.0.0.1").unwrap();
        config
            .mappings
            .push(crate::config::rule::MappingRule::parse("\"alice\":\"lab\"").unwrap());
        assert!(config.check().is_ok());

        config
            .mappings
            .push(crate::config::rule::MappingRule::parse("\"bob\":\"nolab\"").unwrap());
        assert!(config.check().is_err());
    }

    #[test]
    fn default_server_name_or_literal_ip() {
        let mut config = ProxyConfig::default();
        config.add_server("lab", "10.0.0.1").unwrap();

        config.default_server = Some("lab".to_string());
        config.check().unwrap();
        assert!(matches!(
            config.default_backend,
            Some(DefaultBackend::Named(_))
        ));

        config.default_server = Some("192.0.2.7".to_string());
        config.check().unwrap();
        assert!(matches!(
            config.default_backend,
            Some(DefaultBackend::Literal(_))
        ));

        config.default_server = Some("not-a-server".to_string());
        assert!(config.check().is_err());
    }
}

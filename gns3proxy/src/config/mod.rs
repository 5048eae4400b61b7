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

use std::path::Path;

use anyhow::{anyhow, Context};
use ini::{Ini, ParseOption};

mod proxy;
mod rule;

pub use proxy::ProxyConfig;
pub use rule::{DenyRule, FullMatchRegex, MappingRule, ProjectFilterRule};

/// Load and validate the INI config file. All patterns are compiled
/// here, so a malformed rule aborts startup instead of a session.
pub fn load(path: &Path) -> anyhow::Result<ProxyConfig> {
    // rule values look like "user(.*)":"server-1", so the quote and
    // escape handling of the INI layer must stay out of the way
    let opt = ParseOption {
        enabled_quote: false,
        enabled_escape: false,
        ..Default::default()
    };
    let ini = Ini::load_from_file_opt(path, opt)
        .map_err(|e| anyhow!("failed to load {}: {e}", path.display()))?;

    let mut config = ProxyConfig::default();

    if let Some(section) = ini.section(Some("proxy")) {
        for (k, v) in section.iter() {
            config
                .set(k, v)
                .context(format!("invalid key {k} in section [proxy]"))?;
        }
    }

    if let Some(section) = ini.section(Some("servers")) {
        for (name, addr) in section.iter() {
            config
                .add_server(name, addr)
                .context("invalid entry in section [servers]")?;
        }
    }

    if let Some(section) = ini.section(Some("users")) {
        for (name, password) in section.iter() {
            config.add_user(name, password);
        }
    }

    if let Some(section) = ini.section(Some("mapping")) {
        for (_, value) in section.iter() {
            let rule =
                MappingRule::parse(value).context("invalid entry in section [mapping]")?;
            config.mappings.push(rule);
        }
    }

    if let Some(section) = ini.section(Some("project-filter")) {
        for (_, value) in section.iter() {
            let rule = ProjectFilterRule::parse(value)
                .context("invalid entry in section [project-filter]")?;
            config.project_filters.push(rule);
        }
    }

    if let Some(section) = ini.section(Some("deny")) {
        for (_, value) in section.iter() {
            let rule = DenyRule::parse(value).context("invalid entry in section [deny]")?;
            config.deny_rules.push(rule);
        }
    }

    config.check().context("invalid config")?;
    Ok(config)
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;

    fn load_str(content: &str) -> anyhow::Result<ProxyConfig> {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(content.as_bytes()).unwrap();
        load(file.path())
    }

    #[test]
    fn full_config_loads() {
        let config = load_str(
            r#"
[proxy]
hostname = 0.0.0.0
port = 14080
backend_user = admin
backend_password = secret
backend_port = 3080
default_server = gns3-1
backlog = 50
server-recvbuf-size = 16384
client-recvbuf-size = 16384
open-file-limit = 2048

[servers]
gns3-1 = 192.168.76.205
gns3-2 = 192.168.76.206

[users]
user1 = pw1
user2 = pw2

[mapping]
m1 = "user(.*)":"gns3-1"
m2 = "user2":"gns3-2"

[project-filter]
f1 = "user(.*)":"(.*)Group1(.*)"

[deny]
d1 = "user(.*)":"POST":"/v2/projects$":"":""
"#,
        )
        .unwrap();

        assert_eq!(config.hostname, "0.0.0.0");
        assert_eq!(config.port, 14080);
        assert_eq!(config.backlog, 50);
        assert_eq!(config.open_file_limit, 2048);
        assert_eq!(config.servers.len(), 2);
        assert_eq!(config.users.len(), 2);
        assert_eq!(config.mappings.len(), 2);
        assert_eq!(config.project_filters.len(), 1);
        assert_eq!(config.deny_rules.len(), 1);
        // admin:secret
        assert_eq!(config.backend_auth_code, "Basic YWRtaW46c2VjcmV0");
    }

    #[test]
    fn rule_order_is_preserved() {
        let config = load_str(
            r#"
[servers]
a = 10.0.0.1
b = 10.0.0.2

[mapping]
m1 = "x":"a"
m2 = "y":"b"
"#,
        )
        .unwrap();
        assert_eq!(config.mappings[0].server, "a");
        assert_eq!(config.mappings[1].server, "b");
    }

    #[test]
    fn regex_metacharacters_survive_the_ini_layer() {
        let config = load_str(
            r#"
[deny]
d1 = "user\d+":"":"/v2/projects/[0-9a-f-]{36}":"":""
"#,
        )
        .unwrap();
        let rule = &config.deny_rules[0];
        assert!(rule.user.is_match("user12"));
        assert!(!rule.user.is_match("user"));
    }

    #[test]
    fn bad_server_address_fails() {
        assert!(load_str("[servers]\nlab = not-an-ip\n").is_err());
    }

    #[test]
    fn unknown_mapping_server_fails() {
        let result = load_str(
            r#"
[servers]
a = 10.0.0.1

[mapping]
m1 = "x":"missing"
"#,
        );
        assert!(result.is_err());
    }

    #[test]
    fn malformed_rule_fails() {
        assert!(load_str("[mapping]\nm1 = user:server\n").is_err());
    }

    #[test]
    fn missing_sections_use_defaults() {
        let config = load_str("[proxy]\nport = 15080\n").unwrap();
        assert_eq!(config.port, 15080);
        assert!(config.servers.is_empty());
        assert!(config.users.is_empty());
        assert!(config.mappings.is_empty());
    }
}

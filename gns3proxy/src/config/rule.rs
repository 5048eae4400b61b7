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

use std::fmt;
use std::sync::LazyLock;

use anyhow::anyhow;
use regex::Regex;

static QUOTED_PAIR: LazyLock<Regex> =
    LazyLock::new(|| Regex::new("^\"([^\"]*)\":\"([^\"]*)\"$").unwrap());
static QUOTED_QUINTUPLE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new("^\"([^\"]*)\":\"([^\"]*)\":\"([^\"]*)\":\"([^\"]*)\":\"([^\"]*)\"$").unwrap()
});

/// A regular expression matched against the full subject string, the
/// way all rule patterns in the config file behave.
#[derive(Clone)]
pub struct FullMatchRegex {
    raw: String,
    inner: Regex,
}

impl FullMatchRegex {
    pub fn new(pattern: &str) -> anyhow::Result<Self> {
        let inner = Regex::new(&format!("^(?:{pattern})$"))
            .map_err(|e| anyhow!("invalid pattern '{pattern}': {e}"))?;
        Ok(FullMatchRegex {
            raw: pattern.to_string(),
            inner,
        })
    }

    pub fn is_match(&self, subject: &str) -> bool {
        self.inner.is_match(subject)
    }

    pub fn as_str(&self) -> &str {
        &self.raw
    }
}

impl fmt::Debug for FullMatchRegex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

/// Ordered routing rule: requests of users matching `user` go to the
/// backend registered under `server`.
#[derive(Clone, Debug)]
pub struct MappingRule {
    pub user: FullMatchRegex,
    pub server: String,
}

impl MappingRule {
    pub fn parse(value: &str) -> anyhow::Result<Self> {
        let (user, server) = split_quoted_pair(value)?;
        Ok(MappingRule {
            user: FullMatchRegex::new(&user)?,
            server,
        })
    }
}

/// Ordered visibility rule: users matching `user` may see projects
/// whose name matches `project`.
#[derive(Clone, Debug)]
pub struct ProjectFilterRule {
    pub user: FullMatchRegex,
    pub project: FullMatchRegex,
}

impl ProjectFilterRule {
    pub fn parse(value: &str) -> anyhow::Result<Self> {
        let (user, project) = split_quoted_pair(value)?;
        Ok(ProjectFilterRule {
            user: FullMatchRegex::new(&user)?,
            project: FullMatchRegex::new(&project)?,
        })
    }
}

/// Ordered reject rule. An empty pattern field means "match anything".
#[derive(Clone, Debug)]
pub struct DenyRule {
    pub user: FullMatchRegex,
    pub method: Option<FullMatchRegex>,
    pub url: Option<FullMatchRegex>,
    pub header: Option<FullMatchRegex>,
    pub body: Option<FullMatchRegex>,
}

impl DenyRule {
    pub fn parse(value: &str) -> anyhow::Result<Self> {
        let caps = QUOTED_QUINTUPLE.captures(value).ok_or_else(|| {
            anyhow!(
                "deny rule '{value}' is not in format \
                 \"<user>\":\"<method>\":\"<url>\":\"<header>\":\"<body>\""
            )
        })?;
        let field = |i: usize| -> anyhow::Result<Option<FullMatchRegex>> {
            let pattern = &caps[i];
            if pattern.is_empty() {
                Ok(None)
            } else {
                FullMatchRegex::new(pattern).map(Some)
            }
        };
        Ok(DenyRule {
            user: FullMatchRegex::new(&caps[1])?,
            method: field(2)?,
            url: field(3)?,
            header: field(4)?,
            body: field(5)?,
        })
    }
}

fn split_quoted_pair(value: &str) -> anyhow::Result<(String, String)> {
    let caps = QUOTED_PAIR.captures(value).ok_or_else(|| {
        anyhow!("rule '{value}' is not in format \"<user match>\":\"<value>\"")
    })?;
    Ok((caps[1].to_string(), caps[2].to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn full_match_is_anchored() {
        let re = FullMatchRegex::new("user(.*)").unwrap();
        assert!(re.is_match("user1"));
        assert!(re.is_match("user"));
        assert!(!re.is_match("auser1"));

        let re = FullMatchRegex::new("Lab.*").unwrap();
        assert!(re.is_match("LabA"));
        assert!(!re.is_match("MyLabA"));
    }

    #[test]
    fn empty_pattern_matches_only_empty() {
        let re = FullMatchRegex::new("").unwrap();
        assert!(re.is_match(""));
        assert!(!re.is_match("x"));
    }

    #[test]
    fn mapping_rule_parse() {
        let rule = MappingRule::parse("\"user(.*)\":\"gns3-server-1\"").unwrap();
        assert!(rule.user.is_match("user2"));
        assert_eq!(rule.server, "gns3-server-1");
    }

    #[test]
    fn mapping_rule_rejects_bad_shape() {
        assert!(MappingRule::parse("user:server").is_err());
        assert!(MappingRule::parse("\"user\":server").is_err());
        assert!(MappingRule::parse("\"user\":\"a\":\"b\"").is_err());
    }

    #[test]
    fn project_filter_rule_parse() {
        let rule = ProjectFilterRule::parse("\"user2\":\"Test Lab\"").unwrap();
        assert!(rule.user.is_match("user2"));
        assert!(rule.project.is_match("Test Lab"));
        assert!(!rule.project.is_match("Test Lab 2"));
    }

    #[test]
    fn deny_rule_parse() {
        let rule = DenyRule::parse("\"user(.*)\":\"POST\":\"/v2/projects.*\":\"\":\"\"").unwrap();
        assert!(rule.user.is_match("user1"));
        assert!(rule.method.as_ref().unwrap().is_match("POST"));
        assert!(rule.url.as_ref().unwrap().is_match("/v2/projects/x"));
        assert!(rule.header.is_none());
        assert!(rule.body.is_none());
    }

    #[test]
    fn deny_rule_rejects_wrong_arity() {
        assert!(DenyRule::parse("\"u\":\"m\":\"p\"").is_err());
    }

    #[test]
    fn invalid_pattern_is_a_config_error() {
        assert!(MappingRule::parse("\"user(\":\"srv\"").is_err());
    }
}

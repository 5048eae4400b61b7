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

use log::{debug, info};

use super::UserGroup;
use crate::config::{DenyRule, FullMatchRegex};
use crate::protocol::{HttpHeaderMap, HttpMessage};
use crate::serve::{ServerTaskError, ServerTaskResult};

/// Evaluate the deny rules in declaration order against a complete,
/// authenticated request. A rule's user pattern is matched against the
/// known user table and the hit compared with the authenticated name,
/// so one regex can cover many identities.
///
/// A rejected request is reported to the client exactly like an
/// authentication failure.
pub(crate) fn evaluate_deny_rules(
    rules: &[DenyRule],
    users: &UserGroup,
    username: &str,
    req: &HttpMessage,
) -> ServerTaskResult<()> {
    if rules.is_empty() {
        return Ok(());
    }
    if users.is_empty() {
        info!("cannot evaluate deny rules, no users found in config");
        return Err(ServerTaskError::AuthRequired);
    }

    let method = String::from_utf8_lossy(req.method.as_deref().unwrap_or_default());
    let path = String::from_utf8_lossy(req.url_path());
    let headers = render_headers(&req.headers);
    let body = String::from_utf8_lossy(req.body.as_deref().unwrap_or_default());

    for (index, rule) in rules.iter().enumerate() {
        for user in users.names() {
            if !rule.user.is_match(user) || user != username {
                continue;
            }
            debug!("user {username} matched deny rule #{index}, evaluating");
            if field_matches(&rule.method, &method)
                && field_matches(&rule.url, &path)
                && field_matches(&rule.header, &headers)
                && field_matches(&rule.body, &body)
            {
                info!("request denied due to matching rule #{index}");
                return Err(ServerTaskError::DeniedByRule);
            }
        }
    }
    Ok(())
}

fn field_matches(field: &Option<FullMatchRegex>, subject: &str) -> bool {
    field.as_ref().map(|re| re.is_match(subject)).unwrap_or(true)
}

/// The rendering the deny `header` pattern is matched against:
/// `Name: value` lines in received order with original casing, joined
/// by CRLF.
fn render_headers(headers: &HttpHeaderMap) -> String {
    let mut out = String::new();
    for (_, entry) in headers.iter() {
        if !out.is_empty() {
            out.push_str("\r\n");
        }
        out.push_str(entry.name());
        out.push_str(": ");
        out.push_str(&String::from_utf8_lossy(entry.value()));
    }
    out
}

#[cfg(test)]
mod tests {
    use indexmap::IndexMap;

    use super::*;
    use crate::protocol::HttpMessageKind;

    fn users() -> UserGroup {
        let mut map = IndexMap::new();
        map.insert("alice".to_string(), "pw1".to_string());
        map.insert("bob".to_string(), "pw2".to_string());
        UserGroup::new(map)
    }

    fn request(raw: &[u8]) -> HttpMessage {
        let mut req = HttpMessage::new(HttpMessageKind::Request);
        req.parse(raw).unwrap();
        assert!(req.is_complete());
        req
    }

    #[test]
    fn matching_rule_denies() {
        let rules = vec![DenyRule::parse("\"alice\":\"POST\":\"/v2/projects.*\":\"\":\"\"").unwrap()];
        let req = request(b"POST /v2/projects/x HTTP/1.1\r\nContent-Length: 2\r\n\r\n{}");
        assert!(matches!(
            evaluate_deny_rules(&rules, &users(), "alice", &req),
            Err(ServerTaskError::DeniedByRule)
        ));
    }

    #[test]
    fn other_user_is_not_denied() {
        let rules = vec![DenyRule::parse("\"alice\":\"POST\":\"/v2/projects.*\":\"\":\"\"").unwrap()];
        let req = request(b"POST /v2/projects/x HTTP/1.1\r\nContent-Length: 2\r\n\r\n{}");
        assert!(evaluate_deny_rules(&rules, &users(), "bob", &req).is_ok());
    }

    #[test]
    fn method_mismatch_passes() {
        let rules = vec![DenyRule::parse("\"alice\":\"POST\":\"\":\"\":\"\"").unwrap()];
        let req = request(b"GET /v2/projects HTTP/1.1\r\n\r\n");
        assert!(evaluate_deny_rules(&rules, &users(), "alice", &req).is_ok());
    }

    #[test]
    fn empty_fields_match_anything() {
        let rules = vec![DenyRule::parse("\"(.*)\":\"\":\"\":\"\":\"\"").unwrap()];
        let req = request(b"GET /v2/version HTTP/1.1\r\n\r\n");
        assert!(evaluate_deny_rules(&rules, &users(), "alice", &req).is_err());
    }

    #[test]
    fn url_pattern_matches_path_only() {
        let rules = vec![DenyRule::parse("\"alice\":\"\":\"/v2/projects\":\"\":\"\"").unwrap()];
        let req = request(b"GET /v2/projects?page=2 HTTP/1.1\r\n\r\n");
        assert!(evaluate_deny_rules(&rules, &users(), "alice", &req).is_err());
    }

    #[test]
    fn header_pattern_sees_rendered_lines() {
        let rules =
            vec![DenyRule::parse("\"alice\":\"\":\"\":\"(?s).*X-Evil: yes.*\":\"\"").unwrap()];
        let req = request(b"GET /v2/version HTTP/1.1\r\nX-Evil: yes\r\n\r\n");
        assert!(evaluate_deny_rules(&rules, &users(), "alice", &req).is_err());

        let req = request(b"GET /v2/version HTTP/1.1\r\nHost: gns3\r\n\r\n");
        assert!(evaluate_deny_rules(&rules, &users(), "alice", &req).is_ok());
    }

    #[test]
    fn body_pattern_matches() {
        let rules = vec![DenyRule::parse("\"alice\":\"PUT\":\"\":\"\":\"(.*)xyz(.*)\"").unwrap()];
        let req = request(b"PUT /v2/nodes HTTP/1.1\r\nContent-Length: 9\r\n\r\n{\"xyz\":1}");
        assert!(evaluate_deny_rules(&rules, &users(), "alice", &req).is_err());
    }

    #[test]
    fn rules_checked_in_order() {
        let rules = vec![
            DenyRule::parse("\"bob\":\"\":\"\":\"\":\"\"").unwrap(),
            DenyRule::parse("\"alice\":\"GET\":\"\":\"\":\"\"").unwrap(),
        ];
        let req = request(b"GET /v2/version HTTP/1.1\r\n\r\n");
        assert!(evaluate_deny_rules(&rules, &users(), "alice", &req).is_err());
    }
}

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

use base64::engine::general_purpose::STANDARD as B64;
use base64::Engine;
use constant_time_eq::constant_time_eq;
use indexmap::IndexMap;
use log::{debug, error};

use crate::protocol::HttpHeaderMap;
use crate::serve::{ServerTaskError, ServerTaskResult};

mod deny;
pub(crate) use deny::evaluate_deny_rules;

/// The proxy's own credential database: username to cleartext password,
/// in config order.
pub struct UserGroup {
    users: IndexMap<String, String>,
}

impl UserGroup {
    pub fn new(users: IndexMap<String, String>) -> Self {
        UserGroup { users }
    }

    pub fn is_empty(&self) -> bool {
        self.users.is_empty()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.users.keys().map(String::as_str)
    }

    /// Check the `Authorization` header of a complete request against
    /// the user table. The decoded password may be empty: GNS3 clients
    /// send empty passwords while probing for servers, and those probes
    /// must fail cleanly with the canonical 401, not crash the session.
    pub(crate) fn authenticate(&self, headers: &HttpHeaderMap) -> ServerTaskResult<String> {
        let Some(value) = headers.get("authorization") else {
            error!(
                "request did not contain an Authorization header, \
                 please provide username and password in the client"
            );
            return Err(ServerTaskError::AuthRequired);
        };
        if value.len() < 6 || !value[..6].eq_ignore_ascii_case(b"basic ") {
            error!("unsupported Authorization scheme");
            return Err(ServerTaskError::AuthRequired);
        }
        let decoded = B64.decode(&value[6..]).map_err(|_| {
            error!("Authorization header is not valid base64");
            ServerTaskError::AuthRequired
        })?;
        let decoded = String::from_utf8(decoded).map_err(|_| {
            error!("Authorization credential is not valid UTF-8");
            ServerTaskError::AuthRequired
        })?;
        let Some((username, password)) = decoded.split_once(':') else {
            error!("Authorization credential contains no password");
            return Err(ServerTaskError::AuthRequired);
        };

        let Some(stored) = self.users.get(username) else {
            error!("user {username} not found in config");
            return Err(ServerTaskError::AuthRequired);
        };
        if !constant_time_eq(stored.as_bytes(), password.as_bytes()) {
            error!("wrong password for user {username}");
            return Err(ServerTaskError::AuthRequired);
        }

        debug!("successfully authenticated user {username}");
        Ok(username.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn user_group() -> UserGroup {
        let mut users = IndexMap::new();
        users.insert("alice".to_string(), "pw1".to_string());
        users.insert("probe".to_string(), "".to_string());
        UserGroup::new(users)
    }

    fn headers_with_auth(value: &[u8]) -> HttpHeaderMap {
        let mut headers = HttpHeaderMap::default();
        headers.insert(b"Authorization", value);
        headers
    }

    #[test]
    fn valid_credentials() {
        let group = user_group();
        // alice:pw1
        let headers = headers_with_auth(b"Basic YWxpY2U6cHcx");
        assert_eq!(group.authenticate(&headers).unwrap(), "alice");
    }

    #[test]
    fn wrong_password() {
        let group = user_group();
        // alice:bogus
        let headers = headers_with_auth(b"Basic YWxpY2U6Ym9ndXM=");
        assert!(matches!(
            group.authenticate(&headers),
            Err(ServerTaskError::AuthRequired)
        ));
    }

    #[test]
    fn unknown_user() {
        let group = user_group();
        // mallory:pw1
        let headers = headers_with_auth(b"Basic bWFsbG9yeTpwdzE=");
        assert!(group.authenticate(&headers).is_err());
    }

    #[test]
    fn missing_header() {
        let group = user_group();
        assert!(group.authenticate(&HttpHeaderMap::default()).is_err());
    }

    #[test]
    fn non_basic_scheme() {
        let group = user_group();
        let headers = headers_with_auth(b"Bearer abcdef");
        assert!(group.authenticate(&headers).is_err());
    }

    #[test]
    fn empty_password_probe() {
        let group = user_group();
        // probe:
        let headers = headers_with_auth(b"Basic cHJvYmU6");
        assert_eq!(group.authenticate(&headers).unwrap(), "probe");

        // alice: (empty password against a non-empty stored one)
        let headers = headers_with_auth(b"Basic YWxpY2U6");
        assert!(group.authenticate(&headers).is_err());
    }

    #[test]
    fn credential_without_colon() {
        let group = user_group();
        // "alice" with no colon at all
        let headers = headers_with_auth(b"Basic YWxpY2U=");
        assert!(group.authenticate(&headers).is_err());
    }
}

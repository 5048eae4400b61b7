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

use chrono::Utc;

use super::ServerTaskError;

pub(crate) const TUNNEL_ESTABLISHED_PKT: &[u8] = b"HTTP/1.1 200 Connection established\r\n\r\n";

pub(crate) const BAD_GATEWAY_PKT: &[u8] =
    b"HTTP/1.1 502 Bad Gateway\r\nContent-Length: 11\r\nConnection: close\r\n\r\nBad Gateway";

/// The 401 a real GNS3 server emits, byte for byte. The literal
/// `Server` header value is load-bearing: the GNS3 client uses it to
/// recognise the endpoint as a GNS3 server and raise its credential
/// prompt.
pub(crate) fn auth_required_pkt() -> Vec<u8> {
    let date = Utc::now().format("%a, %d %b %Y %H:%M:%S GMT");
    format!(
        "HTTP/1.1 401 Unauthorized\r\n\
         X-Route: /v2/version\r\n\
         Connection: close\r\n\
         Server: Python/3.4 GNS3/2.1.11\r\n\
         WWW-Authenticate: Basic realm=\"GNS3 server\"\r\n\
         Content-Length: 0\r\n\
         Content-Type: application/octet-stream\r\n\
         Date: {date}\r\n\
         \r\n"
    )
    .into_bytes()
}

/// Map a terminal session error to the synthetic response owed to the
/// client, if any. This is the single place where error kinds turn
/// into wire bytes.
pub(crate) fn for_error(e: &ServerTaskError) -> Option<Vec<u8>> {
    match e {
        ServerTaskError::AuthRequired
        | ServerTaskError::DeniedByRule
        | ServerTaskError::UpstreamNotSelected => Some(auth_required_pkt()),
        ServerTaskError::UpstreamNotConnected(_) => Some(BAD_GATEWAY_PKT.to_vec()),
        _ => None,
    }
}

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

use std::time::Duration;

use log::{debug, error, info, warn};
use serde_json::Value;
use tokio::io::{AsyncRead, AsyncWrite};

use super::connection::BufferedStream;
use super::{ServerTaskError, ServerTaskResult};
use crate::config::ProjectFilterRule;
use crate::protocol::HttpMessage;

const HEADER_BODY_SPLIT: &[u8] = b"\r\n\r\n";
const CONSOLE_HOST_UNREACHABLE: &[u8] = b"\"console_host\": \"0.0.0.0\",";

/// Inspects parsed upstream responses by their `X-Route` header and
/// rewrites or vetoes the ones the proxy cares about. Everything else
/// passes through verbatim.
pub(crate) struct ResponseFilter<'a> {
    project_filters: &'a [ProjectFilterRule],
    username: &'a str,
    idle_timeout: Duration,
}

impl<'a> ResponseFilter<'a> {
    pub(crate) fn new(
        project_filters: &'a [ProjectFilterRule],
        username: &'a str,
        idle_timeout: Duration,
    ) -> Self {
        ResponseFilter {
            project_filters,
            username,
            idle_timeout,
        }
    }

    /// Run the received chunk through the route checks, returning the
    /// bytes to forward to the client. May read ahead on the backend
    /// connection to complete a body it needs to rewrite.
    pub(crate) async fn apply<R, W>(
        &self,
        mut data: Vec<u8>,
        rsp: &mut HttpMessage,
        ups: &mut BufferedStream<R, W>,
    ) -> ServerTaskResult<Vec<u8>>
    where
        R: AsyncRead + Unpin,
        W: AsyncWrite + Unpin,
    {
        let Some(route) = rsp.headers.get("x-route").map(|v| v.to_ascii_lowercase()) else {
            return Ok(data);
        };

        if route == b"/v2/projects" && !self.project_filters.is_empty() {
            let active: Vec<&ProjectFilterRule> = self
                .project_filters
                .iter()
                .filter(|f| f.user.is_match(self.username))
                .collect();
            if !active.is_empty() {
                debug!("filtering project library in response for user {}", self.username);
                data = self.rewrite_project_list(data, &active, rsp, ups).await?;
            }
        }

        if route == b"/v2/projects/{project_id}/nodes"
            && memchr::memmem::find(&data, CONSOLE_HOST_UNREACHABLE).is_some()
        {
            error!(
                "backend is likely to be misconfigured: gns3_server.conf has \
                 host = 0.0.0.0, so node consoles will not be reachable through \
                 the proxy; set host to the primary IP address of the backend"
            );
            return Err(ServerTaskError::UpstreamMisconfigured(
                "console_host is 0.0.0.0",
            ));
        }

        Ok(data)
    }

    /// Rebuild the `/v2/projects` listing so it only contains the
    /// projects this user may see. The whole body must be on hand
    /// before it can be decoded, so missing bytes are read from the
    /// backend synchronously.
    async fn rewrite_project_list<R, W>(
        &self,
        mut data: Vec<u8>,
        active: &[&ProjectFilterRule],
        rsp: &mut HttpMessage,
        ups: &mut BufferedStream<R, W>,
    ) -> ServerTaskResult<Vec<u8>>
    where
        R: AsyncRead + Unpin,
        W: AsyncWrite + Unpin,
    {
        let Some(split) = memchr::memmem::find(&data, HEADER_BODY_SPLIT) else {
            warn!("project list response chunk has no header block, passing through");
            return Ok(data);
        };
        let body_start = split + HEADER_BODY_SPLIT.len();

        let Some(content_length) = find_content_length(&data[..split]) else {
            warn!("project list response has no Content-Length, passing through");
            return Ok(data);
        };

        while data.len() - body_start < content_length {
            debug!(
                "body is not complete (len {} of content-length {}), \
                 receiving further content",
                data.len() - body_start,
                content_length
            );
            let more = tokio::time::timeout(self.idle_timeout, ups.recv())
                .await
                .map_err(|_| ServerTaskError::UpstreamAppTimeout("reading project list body"))?
                .ok_or(ServerTaskError::ClosedByUpstream)?;
            rsp.parse(&more)
                .map_err(|_| ServerTaskError::InvalidUpstreamProtocol("invalid response body"))?;
            data.extend_from_slice(&more);
        }

        let body = &data[body_start..];
        let projects: Vec<Value> = match serde_json::from_slice(body) {
            Ok(projects) => projects,
            Err(e) => {
                error!("JSON decode error during project filtering: {e}");
                return Ok(data);
            }
        };

        let mut filtered: Vec<Value> = Vec::new();
        for rule in active {
            for project in &projects {
                let Some(name) = project.get("name").and_then(Value::as_str) else {
                    continue;
                };
                if rule.project.is_match(name) && !filtered.contains(project) {
                    debug!("allowing project {name} for user {}", self.username);
                    filtered.push(project.clone());
                }
            }
        }

        info!(
            "filtered project library for user {} from {} to {} entries",
            self.username,
            projects.len(),
            filtered.len()
        );

        let new_body = serde_json::to_vec(&filtered)
            .map_err(|_| ServerTaskError::InternalServerError("project list re-encode failed"))?;

        let mut out = Vec::with_capacity(split + new_body.len() + 64);
        for line in split_crlf(&data[..split]) {
            if is_content_length_line(line) {
                out.extend_from_slice(format!("Content-Length: {}", new_body.len()).as_bytes());
            } else {
                out.extend_from_slice(line);
            }
            out.extend_from_slice(b"\r\n");
        }
        out.extend_from_slice(b"\r\n");
        out.extend_from_slice(&new_body);
        Ok(out)
    }
}

fn is_content_length_line(line: &[u8]) -> bool {
    line.len() >= 15 && line[..15].eq_ignore_ascii_case(b"content-length:")
}

fn find_content_length(header_block: &[u8]) -> Option<usize> {
    for line in split_crlf(header_block) {
        if is_content_length_line(line) {
            let value = &line[15..];
            let start = value.iter().position(|b| !b.is_ascii_whitespace())?;
            return atoi::atoi(&value[start..]);
        }
    }
    None
}

fn split_crlf(data: &[u8]) -> impl Iterator<Item = &[u8]> {
    let mut rest = data;
    std::iter::from_fn(move || {
        if rest.is_empty() {
            return None;
        }
        match memchr::memmem::find(rest, b"\r\n") {
            Some(pos) => {
                let line = &rest[..pos];
                rest = &rest[pos + 2..];
                Some(line)
            }
            None => {
                let line = rest;
                rest = &rest[rest.len()..];
                Some(line)
            }
        }
    })
}

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

use std::net::SocketAddr;
use std::time::Duration;

use slog::{slog_info, Logger};

use crate::serve::ServerTaskError;

/// End-of-session summary, one line per proxied connection.
pub(crate) struct TaskLogForHttpForward<'a> {
    pub(crate) username: Option<&'a str>,
    pub(crate) client_addr: SocketAddr,
    pub(crate) method: String,
    pub(crate) url: String,
    pub(crate) upstream: Option<SocketAddr>,
    pub(crate) rsp_status: String,
    pub(crate) total_time: Duration,
    pub(crate) client_rd_bytes: u64,
    pub(crate) client_wr_bytes: u64,
    pub(crate) remote_rd_bytes: u64,
    pub(crate) remote_wr_bytes: u64,
}

impl TaskLogForHttpForward<'_> {
    pub(crate) fn log(&self, logger: &Logger, e: &ServerTaskError) {
        slog_info!(logger, "{}", e;
            "task_type" => "HttpForward",
            "user" => self.username.unwrap_or_default(),
            "client_addr" => self.client_addr.to_string(),
            "method" => self.method.as_str(),
            "url" => self.url.as_str(),
            "upstream" => self.upstream.map(|a| a.to_string()).unwrap_or_default(),
            "rsp_status" => self.rsp_status.as_str(),
            "reason" => e.brief(),
            "total_time_ms" => self.total_time.as_millis() as u64,
            "c_rd_bytes" => self.client_rd_bytes,
            "c_wr_bytes" => self.client_wr_bytes,
            "r_rd_bytes" => self.remote_rd_bytes,
            "r_wr_bytes" => self.remote_wr_bytes,
        )
    }
}

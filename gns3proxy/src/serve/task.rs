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
use std::net::SocketAddr;
use std::time::Duration;

use log::debug;
use tokio::io::{AsyncRead, AsyncWrite, ReadHalf, WriteHalf};
use tokio::net::TcpStream;
use tokio::time::Instant;

use super::connection::BufferedStream;
use super::filter::ResponseFilter;
use super::reply;
use super::{CommonTaskContext, ServerTaskError, ServerTaskResult};
use crate::log::TaskLogForHttpForward;
use crate::protocol::{HttpMessage, HttpMessageKind};

const RELAY_TICK: Duration = Duration::from_secs(1);

type UpstreamStream = BufferedStream<ReadHalf<TcpStream>, WriteHalf<TcpStream>>;

enum RelayEvent {
    Client(Option<Vec<u8>>),
    Upstream(Option<Vec<u8>>),
    Tick,
}

/// One proxied client connection. Owns both endpoints and both parsers
/// and drives them from a single readiness loop with a 1 second tick.
///
/// The backend endpoint stays unset until an authenticated, allowed
/// request has been fully parsed; once connected it remains bound for
/// the rest of the session.
pub(crate) struct HttpForwardTask {
    ctx: CommonTaskContext,
    req: HttpMessage,
    rsp: HttpMessage,
    username: Option<String>,
    upstream_addr: Option<SocketAddr>,
    ups: Option<UpstreamStream>,
    started: Instant,
    last_activity: Instant,
}

impl HttpForwardTask {
    pub(crate) fn new(ctx: CommonTaskContext) -> Self {
        let now = Instant::now();
        HttpForwardTask {
            ctx,
            req: HttpMessage::new(HttpMessageKind::Request),
            rsp: HttpMessage::new(HttpMessageKind::Response),
            username: None,
            upstream_addr: None,
            ups: None,
            started: now,
            last_activity: now,
        }
    }

    pub(crate) async fn into_running(mut self, stream: TcpStream) {
        debug!("proxying connection from {}", self.ctx.client_addr);
        let _ = stream.set_nodelay(true);
        let (r, w) = tokio::io::split(stream);
        let mut clt =
            BufferedStream::new(r, w, self.ctx.config.client_recvbuf_size, "client");

        let e = match self.run(&mut clt).await {
            Ok(()) => ServerTaskError::Finished,
            Err(e) => e,
        };

        if let Some(pkt) = reply::for_error(&e) {
            clt.queue(&pkt);
            let _ = clt.flush().await;
        }

        let (c_rd, c_wr) = (clt.rd_bytes(), clt.wr_bytes());
        let (r_rd, r_wr) = self
            .ups
            .as_ref()
            .map(|s| (s.rd_bytes(), s.wr_bytes()))
            .unwrap_or_default();
        if let Some(ups) = self.ups.as_mut() {
            if !ups.is_closed() {
                ups.mark_closed().await;
            }
        }
        clt.close().await;

        self.log_task(&e, c_rd, c_wr, r_rd, r_wr);
        debug!("closed proxied connection from {}", self.ctx.client_addr);
    }

    fn log_task(&self, e: &ServerTaskError, c_rd: u64, c_wr: u64, r_rd: u64, r_wr: u64) {
        TaskLogForHttpForward {
            username: self.username.as_deref(),
            client_addr: self.ctx.client_addr,
            method: String::from_utf8_lossy(self.req.method.as_deref().unwrap_or_default())
                .into_owned(),
            url: String::from_utf8_lossy(&self.req.build_url()).into_owned(),
            upstream: self.upstream_addr,
            rsp_status: String::from_utf8_lossy(self.rsp.code.as_deref().unwrap_or_default())
                .into_owned(),
            total_time: self.started.elapsed(),
            client_rd_bytes: c_rd,
            client_wr_bytes: c_wr,
            remote_rd_bytes: r_rd,
            remote_wr_bytes: r_wr,
        }
        .log(&self.ctx.task_logger, e)
    }

    async fn run<CR, CW>(&mut self, clt: &mut BufferedStream<CR, CW>) -> ServerTaskResult<()>
    where
        CR: AsyncRead + Unpin,
        CW: AsyncWrite + Unpin,
    {
        loop {
            if clt.has_buffer() {
                tokio::time::timeout(self.ctx.idle_timeout, clt.flush())
                    .await
                    .map_err(|_| ServerTaskError::ClientAppTimeout("writing to client"))?
                    .map_err(ServerTaskError::ClientTcpWriteFailed)?;
            }
            if let Some(ups) = self.ups.as_mut() {
                if !ups.is_closed() && ups.has_buffer() {
                    tokio::time::timeout(self.ctx.idle_timeout, ups.flush())
                        .await
                        .map_err(|_| ServerTaskError::UpstreamAppTimeout("writing to upstream"))?
                        .map_err(ServerTaskError::UpstreamWriteFailed)?;
                }
            }

            if !clt.has_buffer() {
                if self.rsp.is_complete() {
                    debug!("client buffer is empty and response state is complete");
                    return Ok(());
                }
                if self.last_activity.elapsed() > self.ctx.idle_timeout {
                    return Err(ServerTaskError::Idle(self.ctx.idle_timeout));
                }
            }

            let event = {
                let ups = &mut self.ups;
                tokio::select! {
                    biased;

                    r = clt.recv() => RelayEvent::Client(r),
                    r = async {
                        match ups.as_mut().filter(|s| !s.is_closed()) {
                            Some(s) => s.recv().await,
                            None => std::future::pending().await,
                        }
                    } => RelayEvent::Upstream(r),
                    _ = tokio::time::sleep(RELAY_TICK) => RelayEvent::Tick,
                }
            };

            match event {
                RelayEvent::Client(None) => {
                    debug!("client closed connection");
                    return Ok(());
                }
                RelayEvent::Client(Some(data)) => {
                    self.last_activity = Instant::now();
                    self.handle_client_data(clt, data).await?;
                }
                RelayEvent::Upstream(None) => {
                    debug!("server closed connection");
                    self.last_activity = Instant::now();
                    if let Some(ups) = self.ups.as_mut() {
                        ups.mark_closed().await;
                    }
                }
                RelayEvent::Upstream(Some(data)) => {
                    self.last_activity = Instant::now();
                    self.handle_upstream_data(clt, data).await?;
                }
                RelayEvent::Tick => {}
            }
        }
    }

    /// Before the backend is bound, client bytes feed the request
    /// parser; a complete request triggers authentication, deny
    /// evaluation, backend selection and the connect. Afterwards the
    /// bytes are piped verbatim.
    async fn handle_client_data<CR, CW>(
        &mut self,
        clt: &mut BufferedStream<CR, CW>,
        data: Vec<u8>,
    ) -> ServerTaskResult<()>
    where
        CR: AsyncRead + Unpin,
        CW: AsyncWrite + Unpin,
    {
        if let Some(ups) = self.ups.as_mut() {
            if !ups.is_closed() {
                ups.queue(&data);
                return Ok(());
            }
        }

        self.req
            .parse(&data)
            .map_err(|_| ServerTaskError::InvalidClientProtocol("invalid http request"))?;

        if !self.req.is_complete() || self.ups.is_some() {
            return Ok(());
        }
        debug!("request parser is in state complete");

        let username = self.ctx.users.authenticate(&self.req.headers)?;
        crate::auth::evaluate_deny_rules(
            &self.ctx.config.deny_rules,
            &self.ctx.users,
            &username,
            &self.req,
        )?;

        let ip = self.ctx.router.select(&username, &self.ctx.users)?;
        self.username = Some(username);
        let addr = SocketAddr::new(ip, self.ctx.config.backend_port);
        self.upstream_addr = Some(addr);

        debug!("connecting to server {addr}");
        let stream = tokio::time::timeout(self.ctx.idle_timeout, TcpStream::connect(addr))
            .await
            .map_err(|_| {
                ServerTaskError::UpstreamNotConnected(io::Error::from(io::ErrorKind::TimedOut))
            })?
            .map_err(ServerTaskError::UpstreamNotConnected)?;
        debug!("connected to server {addr}");
        let _ = stream.set_nodelay(true);
        let (r, w) = tokio::io::split(stream);
        let mut ups = BufferedStream::new(r, w, self.ctx.config.server_recvbuf_size, "server");

        if self.req.method_is("CONNECT") {
            // acknowledged for protocol compatibility only, no raw
            // tunnel is set up; GNS3 clients never use this path
            clt.queue(reply::TUNNEL_ESTABLISHED_PKT);
        } else {
            ups.queue(&self.req.build(
                &["authorization"],
                &[(
                    "Authorization",
                    self.ctx.config.backend_auth_code.as_bytes(),
                )],
            ));
        }
        self.ups = Some(ups);
        Ok(())
    }

    async fn handle_upstream_data<CR, CW>(
        &mut self,
        clt: &mut BufferedStream<CR, CW>,
        data: Vec<u8>,
    ) -> ServerTaskResult<()>
    where
        CR: AsyncRead + Unpin,
        CW: AsyncWrite + Unpin,
    {
        let data = if self.req.method_is("CONNECT") {
            data
        } else {
            self.rsp
                .parse(&data)
                .map_err(|_| ServerTaskError::InvalidUpstreamProtocol("invalid http response"))?;

            let Some(ups) = self.ups.as_mut() else {
                return Err(ServerTaskError::InternalServerError("upstream endpoint missing"));
            };
            let filter = ResponseFilter::new(
                &self.ctx.config.project_filters,
                self.username.as_deref().unwrap_or_default(),
                self.ctx.idle_timeout,
            );
            filter.apply(data, &mut self.rsp, ups).await?
        };
        clt.queue(&data);
        Ok(())
    }
}

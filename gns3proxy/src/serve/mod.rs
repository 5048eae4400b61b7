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

use std::net::{SocketAddr, ToSocketAddrs};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, Context};
use log::info;
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;

use crate::auth::UserGroup;
use crate::config::ProxyConfig;
use crate::route::BackendRouter;

mod connection;
mod filter;
mod reply;
mod runtime;
mod task;

mod error;
pub use error::{ServerTaskError, ServerTaskResult};

use runtime::HttpProxyServerRuntime;

/// Sessions die after this long without a successful read on either
/// side; tuned against the GNS3 client's polling behaviour.
pub(crate) const TASK_IDLE_TIMEOUT: Duration = Duration::from_secs(30);

pub(crate) struct CommonTaskContext {
    pub(crate) config: Arc<ProxyConfig>,
    pub(crate) users: Arc<UserGroup>,
    pub(crate) router: Arc<BackendRouter>,
    pub(crate) client_addr: SocketAddr,
    pub(crate) task_logger: slog::Logger,
    pub(crate) idle_timeout: Duration,
}

/// The accepting proxy server: holds the shared immutable state and
/// spawns one listener runtime plus one task per connection.
pub struct ProxyServer {
    config: Arc<ProxyConfig>,
    users: Arc<UserGroup>,
    router: Arc<BackendRouter>,
    quit_sender: broadcast::Sender<()>,
}

impl ProxyServer {
    pub fn new(config: ProxyConfig) -> Self {
        let users = Arc::new(UserGroup::new(config.users.clone()));
        let router = Arc::new(BackendRouter::new(
            config.servers.clone(),
            config.mappings.clone(),
            config.default_backend.clone(),
        ));
        let (quit_sender, _) = broadcast::channel(4);
        ProxyServer {
            config: Arc::new(config),
            users,
            router,
            quit_sender,
        }
    }

    /// Bind the listen socket and start accepting. Returns the bound
    /// address (useful when the config asked for port 0) and the
    /// runtime handle.
    pub fn spawn(&self) -> anyhow::Result<(SocketAddr, JoinHandle<()>)> {
        let listener = self
            .listen_socket()
            .context("failed to bind listen socket")?;
        let local_addr = listener
            .local_addr()
            .context("failed to read bound listen address")?;
        let listener = TcpListener::from_std(listener)
            .context("failed to register listen socket with the runtime")?;

        let runtime = HttpProxyServerRuntime::new(
            Arc::clone(&self.config),
            Arc::clone(&self.users),
            Arc::clone(&self.router),
        );
        let handle = tokio::spawn(runtime.run(listener, self.quit_sender.subscribe()));
        info!("started proxy server on {local_addr}");
        Ok((local_addr, handle))
    }

    pub fn quit(&self) {
        let _ = self.quit_sender.send(());
    }

    fn listen_socket(&self) -> anyhow::Result<std::net::TcpListener> {
        use socket2::{Domain, Socket, Type};

        let addr = (self.config.hostname.as_str(), self.config.port)
            .to_socket_addrs()
            .context(format!(
                "failed to resolve listen address {}:{}",
                self.config.hostname, self.config.port
            ))?
            .next()
            .ok_or_else(|| {
                anyhow!(
                    "listen address {}:{} resolved to nothing",
                    self.config.hostname,
                    self.config.port
                )
            })?;

        let socket = Socket::new(Domain::for_address(addr), Type::STREAM, None)?;
        socket.set_reuse_address(true)?;
        socket.bind(&addr.into())?;
        socket.listen(self.config.backlog as i32)?;
        socket.set_nonblocking(true)?;
        Ok(socket.into())
    }
}

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

use std::sync::Arc;

use log::{debug, info, warn};
use tokio::net::TcpListener;
use tokio::sync::broadcast;

use super::task::HttpForwardTask;
use super::CommonTaskContext;
use crate::auth::UserGroup;
use crate::config::ProxyConfig;
use crate::route::BackendRouter;

/// Accept loop of one listen socket: every accepted connection gets an
/// independent task, sessions share no mutable state.
pub(super) struct HttpProxyServerRuntime {
    config: Arc<ProxyConfig>,
    users: Arc<UserGroup>,
    router: Arc<BackendRouter>,
    task_logger: slog::Logger,
}

impl HttpProxyServerRuntime {
    pub(super) fn new(
        config: Arc<ProxyConfig>,
        users: Arc<UserGroup>,
        router: Arc<BackendRouter>,
    ) -> Self {
        HttpProxyServerRuntime {
            config,
            users,
            router,
            task_logger: crate::log::task_logger(),
        }
    }

    pub(super) async fn run(
        self,
        listener: TcpListener,
        mut quit_receiver: broadcast::Receiver<()>,
    ) {
        loop {
            tokio::select! {
                biased;

                _ = quit_receiver.recv() => {
                    info!("proxy server runtime will go offline");
                    break;
                }
                result = listener.accept() => {
                    match result {
                        Ok((stream, peer_addr)) => {
                            debug!("accepted connection from {peer_addr}");
                            let ctx = CommonTaskContext {
                                config: Arc::clone(&self.config),
                                users: Arc::clone(&self.users),
                                router: Arc::clone(&self.router),
                                client_addr: peer_addr,
                                task_logger: self.task_logger.clone(),
                                idle_timeout: super::TASK_IDLE_TIMEOUT,
                            };
                            tokio::spawn(async move {
                                HttpForwardTask::new(ctx).into_running(stream).await;
                            });
                        }
                        Err(e) => {
                            warn!("accept: {e:?}");
                        }
                    }
                }
            }
        }
        info!("proxy server runtime stopped");
    }
}

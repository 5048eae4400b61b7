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

use anyhow::Context;
use log::{debug, error, info};

use gns3proxy::config::ProxyConfig;
use gns3proxy::serve::ProxyServer;

fn main() -> anyhow::Result<()> {
    let Some(proc_args) =
        gns3proxy::opts::parse_clap().context("failed to parse command line options")?
    else {
        return Ok(());
    };

    let _log_guard =
        gns3proxy::log::setup(proc_args.log_level).context("failed to setup logger")?;

    let config = gns3proxy::config::load(&proc_args.config_file).context(format!(
        "failed to load config file {}",
        proc_args.config_file.display()
    ))?;
    debug!("loaded config from {}", proc_args.config_file.display());

    if proc_args.test_config {
        info!("the format of the config file is ok");
        return Ok(());
    }

    set_open_file_limit(config.open_file_limit);

    match tokio_run(config) {
        Ok(()) => Ok(()),
        Err(e) => {
            error!("{e:?}");
            Err(e)
        }
    }
}

fn tokio_run(config: ProxyConfig) -> anyhow::Result<()> {
    let rt = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("failed to start runtime")?;
    rt.block_on(async {
        let server = ProxyServer::new(config);
        let (_, handle) = server.spawn().context("failed to start proxy server")?;

        gns3proxy::signal::quit().await?;
        info!("shutting down");
        server.quit();
        let _ = handle.await;
        Ok(())
    })
}

/// Raise the open file descriptor soft limit where the platform
/// supports it; each session holds two sockets.
#[cfg(unix)]
fn set_open_file_limit(soft_limit: u64) {
    use rlimit::Resource;

    match Resource::NOFILE.get() {
        Ok((soft, hard)) => {
            if soft < soft_limit && soft_limit < hard {
                match Resource::NOFILE.set(soft_limit, hard) {
                    Ok(()) => info!("open file descriptor soft limit set to {soft_limit}"),
                    Err(e) => log::warn!("failed to raise open file limit: {e}"),
                }
            }
        }
        Err(e) => log::warn!("failed to read open file limit: {e}"),
    }
}

#[cfg(not(unix))]
fn set_open_file_limit(_soft_limit: u64) {}

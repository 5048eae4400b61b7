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

use std::sync::OnceLock;

use anyhow::anyhow;
use slog::{o, Drain, Logger};

mod task;
pub(crate) use task::TaskLogForHttpForward;

static PROCESS_LOGGER: OnceLock<Logger> = OnceLock::new();

/// Keeps the global logger plumbing alive for the lifetime of the
/// process; dropping it tears the async drain down cleanly.
pub struct LogGuard {
    _scope: slog_scope::GlobalLoggerGuard,
}

/// Install the process logger: a slog term drain behind an async
/// worker, published through slog-scope, with the `log` crate macros
/// bridged in via slog-stdlog.
pub fn setup(level: slog::Level) -> anyhow::Result<LogGuard> {
    let decorator = slog_term::TermDecorator::new().stdout().build();
    let drain = slog_term::FullFormat::new(decorator)
        .use_utc_timestamp()
        .build()
        .fuse();
    let drain = slog_async::Async::new(drain)
        .build()
        .filter_level(level)
        .ignore_res();
    let logger = Logger::root(drain, o!());

    let _ = PROCESS_LOGGER.set(logger.clone());
    let scope = slog_scope::set_global_logger(logger);
    slog_stdlog::init_with_level(stdlog_level(level))
        .map_err(|e| anyhow!("failed to register stdlog bridge: {e}"))?;
    Ok(LogGuard { _scope: scope })
}

fn stdlog_level(level: slog::Level) -> log::Level {
    match level {
        slog::Level::Critical | slog::Level::Error => log::Level::Error,
        slog::Level::Warning => log::Level::Warn,
        slog::Level::Info => log::Level::Info,
        slog::Level::Debug => log::Level::Debug,
        slog::Level::Trace => log::Level::Trace,
    }
}

/// Logger for the structured per-session task log. Falls back to a
/// discard logger when no process logger is installed (tests).
pub(crate) fn task_logger() -> Logger {
    match PROCESS_LOGGER.get() {
        Some(logger) => logger.new(o!("log_type" => "Task")),
        None => Logger::root(slog::Discard, o!()),
    }
}

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

use std::path::PathBuf;

use anyhow::anyhow;
use clap::{value_parser, Arg, ArgAction, Command, ValueHint};

const ARGS_VERSION: &str = "version";
const ARGS_VERBOSE: &str = "verbose";
const ARGS_CONFIG_FILE: &str = "config-file";
const ARGS_LOG_LEVEL: &str = "log-level";
const ARGS_TEST_CONFIG: &str = "test-config";

const DEFAULT_CONFIG_FILE: &str = "gns3_proxy_config.ini";

#[derive(Debug)]
pub struct ProcArgs {
    pub config_file: PathBuf,
    pub log_level: slog::Level,
    pub test_config: bool,
}

impl Default for ProcArgs {
    fn default() -> Self {
        ProcArgs {
            config_file: PathBuf::from(DEFAULT_CONFIG_FILE),
            log_level: slog::Level::Info,
            test_config: false,
        }
    }
}

fn build_cli_args() -> Command {
    Command::new(crate::build::PKG_NAME)
        .disable_version_flag(true)
        .arg(
            Arg::new(ARGS_VERBOSE)
                .help("Show verbose output")
                .num_args(0)
                .action(ArgAction::Count)
                .short('v')
                .long("verbose"),
        )
        .arg(
            Arg::new(ARGS_VERSION)
                .help("Show version")
                .action(ArgAction::SetTrue)
                .short('V')
                .long("version"),
        )
        .arg(
            Arg::new(ARGS_TEST_CONFIG)
                .help("Test the format of the config file and exit")
                .action(ArgAction::SetTrue)
                .short('t')
                .long("test-config"),
        )
        .arg(
            Arg::new(ARGS_CONFIG_FILE)
                .help("Location of the proxy config file")
                .num_args(1)
                .value_name("CONFIG FILE")
                .value_hint(ValueHint::FilePath)
                .value_parser(value_parser!(PathBuf))
                .default_value(DEFAULT_CONFIG_FILE)
                .long("config-file"),
        )
        .arg(
            Arg::new(ARGS_LOG_LEVEL)
                .help(
                    "Log level: DEBUG, INFO (default), WARNING, ERROR, CRITICAL. \
                     Both upper and lowercase values are allowed, as is the \
                     leading character, e.g. --log-level d",
                )
                .num_args(1)
                .value_name("LOG LEVEL")
                .long("log-level"),
        )
}

pub fn parse_clap() -> anyhow::Result<Option<ProcArgs>> {
    let args = build_cli_args().get_matches();

    if args.get_flag(ARGS_VERSION) {
        crate::build::print_version(args.get_count(ARGS_VERBOSE));
        return Ok(None);
    }

    let mut proc_args = ProcArgs::default();
    if let Some(config_file) = args.get_one::<PathBuf>(ARGS_CONFIG_FILE) {
        proc_args.config_file.clone_from(config_file);
    }
    if let Some(log_level) = args.get_one::<String>(ARGS_LOG_LEVEL) {
        proc_args.log_level = parse_log_level(log_level)?;
    }
    proc_args.test_config = args.get_flag(ARGS_TEST_CONFIG);

    Ok(Some(proc_args))
}

fn parse_log_level(value: &str) -> anyhow::Result<slog::Level> {
    match value.to_ascii_uppercase().as_str() {
        "DEBUG" | "D" => Ok(slog::Level::Debug),
        "INFO" | "I" => Ok(slog::Level::Info),
        "WARNING" | "W" => Ok(slog::Level::Warning),
        "ERROR" | "E" => Ok(slog::Level::Error),
        "CRITICAL" | "C" => Ok(slog::Level::Critical),
        _ => Err(anyhow!("invalid log level {value}")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn log_level_aliases() {
        assert_eq!(parse_log_level("DEBUG").unwrap(), slog::Level::Debug);
        assert_eq!(parse_log_level("debug").unwrap(), slog::Level::Debug);
        assert_eq!(parse_log_level("d").unwrap(), slog::Level::Debug);
        assert_eq!(parse_log_level("WARNING").unwrap(), slog::Level::Warning);
        assert_eq!(parse_log_level("critical").unwrap(), slog::Level::Critical);
        assert!(parse_log_level("chatty").is_err());
    }

    #[test]
    fn default_args() {
        let args = ProcArgs::default();
        assert_eq!(args.config_file, PathBuf::from("gns3_proxy_config.ini"));
        assert_eq!(args.log_level, slog::Level::Info);
        assert!(!args.test_config);
    }
}

/*
    Copyright 2025 TII (SSRC) and the contributors
    SPDX-License-Identifier: Apache-2.0
*/
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use clap::ValueEnum;
use lazy_static::lazy_static;

use crate::engine::EngineConfig;
use crate::probe::ExpressVpnCli;
use crate::settings::SettingsStore;

lazy_static! {
    static ref CLI_ARGS: Args = {
        let args = Args::parse();
        println!("{args:?}");
        args
    };
}

#[derive(ValueEnum, Default, Debug, Clone, Copy, PartialEq)]
pub enum LogOutput {
    #[default]
    Syslog,
    Stdout,
}

/// ExpressVPN GUI for Ghaf
#[derive(Parser, Debug)]
#[command(name = "ExpressVPN GUI")]
#[command(about = "ExpressVPN Graphical User Interface")]
#[command(long_about = None)]
pub struct Args {
    /// Log severity
    #[arg(long, default_value_t = log::Level::Info)]
    pub log_level: log::Level,

    /// Log output
    #[arg(long, value_enum, default_value_t)]
    pub log_output: LogOutput,

    /// VPN client executable
    #[arg(long, default_value = "expressvpn")]
    pub binary: String,

    /// Seconds between status polls
    #[arg(long, default_value_t = 2, value_parser = clap::value_parser!(u64).range(1..))]
    pub poll_interval: u64,

    /// Seconds to wait for a connect or disconnect to take effect
    #[arg(long, default_value_t = 60)]
    pub action_timeout: u64,

    /// Seconds before a single client invocation is killed
    #[arg(long, default_value_t = 10)]
    pub command_timeout: u64,

    /// File holding the last used location
    #[arg(long)]
    pub settings_file: Option<PathBuf>,

    /// Address probed at startup to detect a missing network
    #[arg(long, default_value = "www.example.com:80")]
    pub reachability_host: String,
}

impl Args {
    pub fn engine_config(&self) -> EngineConfig {
        EngineConfig {
            poll_interval: Duration::from_secs(self.poll_interval),
            action_timeout: Duration::from_secs(self.action_timeout),
            ..EngineConfig::default()
        }
    }

    pub fn provider(&self) -> Arc<ExpressVpnCli> {
        Arc::new(ExpressVpnCli::new(
            self.binary.as_str(),
            Duration::from_secs(self.command_timeout),
            self.reachability_host.as_str(),
        ))
    }

    pub fn settings_store(&self) -> SettingsStore {
        let path = self.settings_file.clone().unwrap_or_else(default_settings_file);
        SettingsStore::new(path)
    }
}

/// `<config dir>/expressvpn-gui/last_location`, or the working directory
/// when no home directory is known.
fn default_settings_file() -> PathBuf {
    directories::ProjectDirs::from("", "", "expressvpn-gui")
        .map(|dirs| dirs.config_dir().to_path_buf())
        .unwrap_or_default()
        .join("last_location")
}

pub fn get_args() -> &'static Args {
    &CLI_ARGS
}

pub fn get_log_level() -> &'static log::Level {
    &CLI_ARGS.log_level
}

pub fn get_log_output() -> &'static LogOutput {
    &CLI_ARGS.log_output
}

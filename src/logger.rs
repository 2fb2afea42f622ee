/*
    Copyright 2025 TII (SSRC) and the contributors
    SPDX-License-Identifier: Apache-2.0
*/
use anyhow::{Context, Result};
use syslog::{BasicLogger, Facility, Formatter3164};

use crate::cli::LogOutput;

/// Install the global logger. Can only succeed once per process.
pub fn init(level: log::Level, output: LogOutput) -> Result<()> {
    let filter = level.to_level_filter();

    match output {
        LogOutput::Syslog => {
            let formatter = Formatter3164 {
                facility: Facility::LOG_USER,
                hostname: None,
                process: env!("CARGO_PKG_NAME").into(),
                pid: std::process::id(),
            };
            let logger = syslog::unix(formatter)
                .map_err(|e| anyhow::anyhow!("Could not connect to syslog: {e}"))?;
            log::set_boxed_logger(Box::new(BasicLogger::new(logger)))
                .context("Logger already installed")?;
            log::set_max_level(filter);
        }
        LogOutput::Stdout => {
            env_logger::Builder::new()
                .filter_level(filter)
                .target(env_logger::Target::Stdout)
                .try_init()
                .context("Logger already installed")?;
        }
    }

    Ok(())
}

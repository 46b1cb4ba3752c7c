// Copyright 2023 the taproot developers.
//
// Licensed under the Apache License, Version 2.0 (the "License"); you
// may not use this file except in compliance with the License. You may
// obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or
// implied. See the License for the specific language governing
// permissions and limitations under the License.

//! Implements the server configuration file.

use std::fs;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::{Path, PathBuf};

use anyhow::{anyhow, Context, Result};
use log::debug;
use serde::Deserialize;

use taproot::io::BlockingIoConfig;

use crate::args::RunArgs;

////////////////////////////////////////////////////////////////////////
// CONFIGURATION LOADING                                              //
////////////////////////////////////////////////////////////////////////

/// Loads the server configuration from the file given by `path`. The
/// zone file path is interpreted relative to the configuration file's
/// directory.
pub fn load_from_path(path: impl AsRef<Path>) -> Result<Config> {
    let dir = path
        .as_ref()
        .parent()
        .ok_or_else(|| anyhow!("the configuration file path has no parent"))?;
    let raw_config = fs::read_to_string(path.as_ref())
        .context("failed to read the configuration file")?;
    let mut config: Config =
        toml::from_str(&raw_config).context("failed to parse the configuration file")?;
    if config.zone.is_relative() {
        config.zone = dir.join(&config.zone);
    }
    log_config_summary(&config);
    Ok(config)
}

/// Loads the server configuration from the parsed command-line
/// arguments. The caller (through clap) guarantees that a zone file
/// was given when no configuration file is.
pub fn load_from_args(args: RunArgs) -> Result<Config> {
    let config = Config {
        bind: args.bind.unwrap_or_else(default_bind),
        io: IoConfig {
            udp_workers: args.udp_workers.unwrap_or_else(default_udp_workers),
            tcp_listeners: args.tcp_listeners.unwrap_or_else(default_tcp_listeners),
        },
        zone: args
            .zone
            .ok_or_else(|| anyhow!("no zone file was given"))?,
    };
    log_config_summary(&config);
    Ok(config)
}

/// Summarizes the configuration in the log.
fn log_config_summary(config: &Config) {
    debug!(
        "Configuration loaded:\n\
         Bind address:  {}\n\
         UDP workers:   {}\n\
         TCP listeners: {}\n\
         Zone file:     {}",
        config.bind,
        config.io.udp_workers,
        config.io.tcp_listeners,
        config.zone.display(),
    );
}

////////////////////////////////////////////////////////////////////////
// CONFIGURATION FILE STRUCTURE                                       //
////////////////////////////////////////////////////////////////////////

/// The complete configuration file.
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    #[serde(default = "default_bind")]
    pub bind: SocketAddr,
    #[serde(default)]
    pub io: IoConfig,
    pub zone: PathBuf,
}

/// The `io` section, mirroring
/// [`BlockingIoConfig`](taproot::io::BlockingIoConfig) with defaults.
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct IoConfig {
    #[serde(default = "default_udp_workers")]
    pub udp_workers: usize,
    #[serde(default = "default_tcp_listeners")]
    pub tcp_listeners: usize,
}

impl Default for IoConfig {
    fn default() -> Self {
        Self {
            udp_workers: default_udp_workers(),
            tcp_listeners: default_tcp_listeners(),
        }
    }
}

impl From<&IoConfig> for BlockingIoConfig {
    fn from(config: &IoConfig) -> Self {
        Self {
            udp_workers: config.udp_workers,
            tcp_listeners: config.tcp_listeners,
        }
    }
}

fn default_bind() -> SocketAddr {
    SocketAddr::new(IpAddr::V4(Ipv4Addr::LOCALHOST), 53)
}

fn default_udp_workers() -> usize {
    BlockingIoConfig::default().udp_workers
}

fn default_tcp_listeners() -> usize {
    BlockingIoConfig::default().tcp_listeners
}

////////////////////////////////////////////////////////////////////////
// TESTS                                                              //
////////////////////////////////////////////////////////////////////////

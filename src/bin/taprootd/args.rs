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

//! Implements command-line argument parsing.

use std::net::SocketAddr;
use std::path::PathBuf;

use clap::{ArgGroup, Parser, Subcommand};

/// Parses the command line arguments.
pub fn parse() -> Args {
    Args::parse()
}

/// The taproot authoritative root-zone DNS server
#[derive(Debug, Parser)]
#[command(author, version)]
pub struct Args {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Run the server
    Run(RunArgs),
}

#[derive(Debug, Parser)]
#[command(group(ArgGroup::new("source").required(true).args(["config", "zone"])))]
pub struct RunArgs {
    /// Set the configuration file to use
    #[arg(long, value_name = "FILE", conflicts_with_all = ["zone", "bind", "udp_workers", "tcp_listeners"])]
    pub config: Option<PathBuf>,

    /// Set the zone file to serve
    #[arg(long, value_name = "FILE")]
    pub zone: Option<PathBuf>,

    /// Set the server bind IP address and port
    #[arg(long, value_name = "IP:PORT")]
    pub bind: Option<SocketAddr>,

    /// Set the number of UDP worker threads
    #[arg(long, value_name = "N")]
    pub udp_workers: Option<usize>,

    /// Set the number of TCP listener threads
    #[arg(long, value_name = "N")]
    pub tcp_listeners: Option<usize>,
}

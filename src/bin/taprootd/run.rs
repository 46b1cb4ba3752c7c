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

//! Implements the `run` command (i.e., running the server).

use std::fmt::Write;
use std::process;
use std::sync::Arc;
use std::time::Instant;

use anyhow::{Context, Result};
use env_logger::Env;
use log::{error, info};
use signal_hook::consts::signal::{SIGINT, SIGTERM};
use signal_hook::iterator::Signals;

use taproot::io::BlockingIoProvider;
use taproot::zone::Zone;

use crate::args::RunArgs;
use crate::config;

/// Runs the server.
pub fn run(args: RunArgs) {
    env_logger::init_from_env(Env::new().default_filter_or("warn"));

    if let Err(e) = try_running(args) {
        let mut message = String::from("Failed to run:");
        for (i, cause) in e.chain().enumerate() {
            write!(message, "\n[{}] {}", i + 1, cause).unwrap();
        }
        message.push_str("\nExiting with failure.");
        error!("{}", message);
        process::exit(1);
    }
    info!("Exiting with success.");
}

fn try_running(run_args: RunArgs) -> Result<()> {
    info!(
        "taproot daemon v{}.{}.{} starting.",
        env!("CARGO_PKG_VERSION_MAJOR"),
        env!("CARGO_PKG_VERSION_MINOR"),
        env!("CARGO_PKG_VERSION_PATCH"),
    );

    // Get the configuration, either from the file system or from the
    // command line arguments, as appropriate.
    let config = if let Some(ref config) = run_args.config {
        info!("Loading the configuration from {}.", config.display());
        config::load_from_path(config).context("failed to load the configuration")?
    } else {
        info!("Loading the configuration from the command line.");
        config::load_from_args(run_args)?
    };

    // Bind the sockets before the (possibly expensive) zone load, so
    // that address problems fail fast.
    let provider = BlockingIoProvider::bind((&config.io).into(), config.bind)
        .context("failed to bind sockets")?;

    info!("Loading the zone from {}.", config.zone.display());
    let start = Instant::now();
    let zone = Zone::load(&config.zone).context("failed to load the zone")?;
    info!(
        "Loaded {} names in {} ms; all answers precomputed.",
        zone.name_count(),
        start.elapsed().as_millis(),
    );

    // Set up signal handling before starting the workers.
    let mut signals =
        Signals::new([SIGINT, SIGTERM]).context("failed to set up signal handling")?;

    let zone = Arc::new(zone);
    provider.start(&zone).context("failed to start the I/O workers")?;
    info!("Set-up is complete; serving.");

    // Wait for a termination signal.
    for signal in signals.forever() {
        match signal {
            s @ (SIGINT | SIGTERM) => {
                let name = match s {
                    SIGINT => "SIGINT",
                    _ => "SIGTERM",
                };
                info!("Received {}; shutting down.", name);
                break;
            }
            _ => unreachable!(),
        }
    }
    Ok(())
}

// Copyright (C) 2025, 2026 Ethpoolv2 Developers (see AUTHORS)
//
// This file is part of Ethpoolv2
//
// Ethpoolv2 is free software: you can redistribute it and/or modify it under
// the terms of the GNU General Public License as published by the Free
// Software Foundation, either version 3 of the License, or (at your option)
// any later version.
//
// Ethpoolv2 is distributed in the hope that it will be useful, but WITHOUT ANY
// WARRANTY; without even the implied warranty of MERCHANTABILITY or FITNESS
// FOR A PARTICULAR PURPOSE. See the GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License along with
// Ethpoolv2. If not, see <https://www.gnu.org/licenses/>.

mod signal;

use clap::Parser;
use ethpoolv2_lib::config::Config;
use ethpoolv2_lib::logging;
use ethpoolv2_lib::payouts::{BlockUnlocker, EthashSchedule};
use ethpoolv2_lib::store::Store;
use gethrpc::GethRpcClient;
use std::sync::Arc;
use tracing::{error, info};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    #[arg(short, long)]
    config: String,
}

#[tokio::main]
async fn main() -> Result<(), String> {
    let args = Args::parse();

    let config = match Config::load(&args.config) {
        Ok(config) => config,
        Err(err) => {
            error!("Failed to load config: {err}");
            return Err(format!("Failed to load config: {err}"));
        }
    };

    // hold guard to ensure logging is flushed on exit
    let _guard = match logging::init(&config.logging) {
        Ok(guard) => guard,
        Err(e) => {
            error!("Failed to set up logging: {e}");
            return Err(format!("Failed to set up logging: {e}"));
        }
    };

    info!("Starting Ethpool v2...");

    if !config.unlocker.enabled {
        info!("Block unlocker disabled in config, nothing to do");
        return Ok(());
    }

    let store = match Store::new(config.store.path.clone()) {
        Ok(store) => Arc::new(store),
        Err(e) => {
            error!("Failed to open store at {}: {e}", config.store.path);
            return Err(format!("Failed to open store: {e}"));
        }
    };

    let rpc = GethRpcClient::new(
        "BlockUnlocker",
        &config.unlocker.daemon,
        config.unlocker.timeout,
    )
    .map_err(|e| format!("Failed to create node RPC client: {e}"))?;

    let schedule = EthashSchedule::new(config.network);

    let unlocker = BlockUnlocker::new(config.unlocker.clone(), store, rpc, schedule)
        .map_err(|e| format!("Failed to start block unlocker: {e}"))?;

    let (exit_tx, exit_rx) = tokio::sync::watch::channel(false);
    signal::notify_on_shutdown(exit_tx);

    // The unlocker services shutdown only between ticks; waiting on its
    // handle guarantees no pass is in flight when the process exits.
    let handle = tokio::spawn(unlocker.run(exit_rx));
    if let Err(e) = handle.await {
        error!("Block unlocker task failed: {e}");
        return Err(format!("Block unlocker task failed: {e}"));
    }

    info!("Block unlocker stopped");
    Ok(())
}

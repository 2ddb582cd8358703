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

//! Process signal handling. Shutdown is announced on a watch channel that
//! long-running tasks poll between units of work.

use tokio::signal::unix::{SignalKind, signal};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{error, info};

/// Spawn a task that waits for SIGINT, SIGTERM or SIGHUP and announces
/// shutdown on the given channel. The task also exits once every receiver
/// is gone, so it never outlives the work it would be interrupting.
pub fn notify_on_shutdown(shutdown_tx: watch::Sender<bool>) -> JoinHandle<()> {
    tokio::spawn(async move {
        let name = tokio::select! {
            _ = wait_for(SignalKind::interrupt()) => "SIGINT",
            _ = wait_for(SignalKind::terminate()) => "SIGTERM",
            _ = wait_for(SignalKind::hangup()) => "SIGHUP",
            _ = shutdown_tx.closed() => return,
        };

        info!("{name} received, shutting down");
        let _ = shutdown_tx.send(true);
    })
}

async fn wait_for(kind: SignalKind) {
    match signal(kind) {
        Ok(mut stream) => {
            stream.recv().await;
        }
        Err(err) => {
            // Without a handler this branch can never fire; park instead of
            // taking the whole select down.
            error!("Failed to install handler for {kind:?}: {err}");
            std::future::pending::<()>().await;
        }
    }
}

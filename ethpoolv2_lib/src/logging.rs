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

//! Tracing setup. Console output by default, plus an optional daily-rotated
//! log file behind a non-blocking writer.

use crate::config::LoggingConfig;
use std::error::Error;
use std::path::Path;
use tracing::warn;
use tracing_appender::non_blocking::{NonBlocking, WorkerGuard};
use tracing_appender::rolling;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Install the global tracing subscriber.
///
/// `RUST_LOG` overrides the configured level when present. The returned
/// guard keeps the file writer's worker alive; hold it until process exit
/// or buffered lines are dropped.
pub fn init(config: &LoggingConfig) -> Result<Option<WorkerGuard>, Box<dyn Error>> {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.level));

    // Turning the console off without configuring a file would leave the
    // node mute; keep the console in that case.
    let console_wanted = config.console.unwrap_or(true);
    let console_forced = !console_wanted && config.file.is_none();

    let (file_layer, guard) = match &config.file {
        Some(path) => {
            let (writer, guard) = file_writer(path)?;
            let layer = fmt::layer().with_writer(writer).with_ansi(false);
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    let console_layer = if console_wanted || console_forced {
        Some(fmt::layer())
    } else {
        None
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(file_layer)
        .with(console_layer)
        .init();

    if console_forced {
        warn!("No log file configured and console disabled, keeping console output");
    }

    Ok(guard)
}

/// Non-blocking writer appending to a daily-rotated file at `path`.
fn file_writer(path: &str) -> Result<(NonBlocking, WorkerGuard), Box<dyn Error>> {
    let path = Path::new(path);
    let name = path
        .file_name()
        .ok_or_else(|| format!("log file path {} has no file name", path.display()))?;
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    std::fs::create_dir_all(dir)?;

    Ok(tracing_appender::non_blocking(rolling::daily(dir, name)))
}

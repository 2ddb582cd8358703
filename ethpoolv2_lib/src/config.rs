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

use serde::Deserialize;
use std::time::Duration;

/// Which reward schedule the pool follows. The chain itself does not tell
/// us; it has to come from configuration.
#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Network {
    Main,
    #[serde(alias = "testnet")]
    Test,
}

/// Settings for the block unlocker.
#[derive(Debug, Deserialize, Clone)]
pub struct UnlockerConfig {
    /// If false, the unlocker never schedules ticks
    pub enabled: bool,
    /// Percentage of block revenue retained as pool profit
    pub pool_fee: f64,
    /// On-chain address credited with pool profit; empty means the profit
    /// stays uncredited
    #[serde(default)]
    pub pool_fee_address: String,
    /// Donate 10% of pool profit to the developers
    #[serde(default)]
    pub donate: bool,
    /// Confirmations before a block is considered matured
    pub depth: i64,
    /// Confirmations before immature handling
    pub immature_depth: i64,
    /// If true, transaction fees are kept by the pool instead of being
    /// folded into the miners' revenue base
    #[serde(default)]
    pub keep_tx_fees: bool,
    /// Period between unlocker ticks, e.g. "10m"
    #[serde(with = "humantime_serde")]
    pub interval: Duration,
    /// URL of the Ethereum node RPC endpoint
    pub daemon: String,
    /// Per-request timeout for node RPC calls, e.g. "10s"
    #[serde(with = "humantime_serde")]
    pub timeout: Duration,
}

#[derive(Debug, Deserialize, Clone)]
pub struct StoreConfig {
    pub path: String,
}

#[derive(Debug, Deserialize, Default, Clone)]
pub struct LoggingConfig {
    /// Log to file if specified
    pub file: Option<String>,
    /// Log level (defaults to "info")
    #[serde(default = "default_log_level")]
    pub level: String,
    /// Log to console (defaults to true)
    pub console: Option<bool>,
}

fn default_log_level() -> String {
    "info".to_string()
}

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub network: Network,
    pub store: StoreConfig,
    pub unlocker: UnlockerConfig,
    pub logging: LoggingConfig,
}

impl Config {
    pub fn load(path: &str) -> Result<Self, config::ConfigError> {
        config::Config::builder()
            .add_source(config::File::with_name(path))
            .add_source(config::Environment::with_prefix("ETHPOOL").separator("_"))
            .build()?
            .try_deserialize()
    }
}

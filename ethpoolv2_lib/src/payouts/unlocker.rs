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

//! The block unlocker: matches block candidates against the chain, computes
//! rewards and advances each candidate through the immature -> matured
//! pipeline, or records it as an orphan.
//!
//! Any infrastructure error halts the unlocker until the process restarts.
//! Reward movement is money; partial progress on an unknown error could
//! double-credit or silently drop credits, so the policy is fail-stop and
//! recovery is operator-driven.

use crate::config::UnlockerConfig;
use crate::payouts::reward_tables::RewardSchedule;
use crate::store::types::BlockData;
use crate::store::{CandidateStore, ShareStore, StoreError};
use crate::utils::hex::{is_valid_hex_address, parse_hex_big, parse_hex_i64};
use crate::utils::units::{format_rat_reward, format_reward, wei_to_shannon};
use gethrpc::{GetBlockReply, GethRpcClient, GethRpcError};
use num_bigint::BigInt;
use num_rational::BigRational;
use num_traits::{Signed, Zero};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::watch;
use tracing::{error, info, warn};

/// Minimum confirmation depth; also the half-width of the candidate search
/// window.
const MIN_DEPTH: i64 = 16;

/// Donate 10% from pool fees to developers
const DONATION_FEE: f64 = 10.0;
const DONATION_ACCOUNT: &str = "0xb05146ed865f0ab592dd763bd84a2191700f3dfb";

/// Error type for the unlocker. Everything here is fatal for the running
/// pass and flips the sticky halt flag; the one non-fatal condition (a
/// round with no share data) is not an error but a `None` distribution.
#[derive(Debug)]
pub enum UnlockerError {
    Config(String),
    Rpc(GethRpcError),
    Store(StoreError),
    Decode(String),
    /// The node returned a null block inside the search window.
    WrongNodeHeight(i64),
    /// The node listed an uncle hash but would not serve the uncle.
    MissingUncle { height: i64, index: usize },
}

impl fmt::Display for UnlockerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UnlockerError::Config(msg) => write!(f, "Invalid unlocker config: {msg}"),
            UnlockerError::Rpc(err) => write!(f, "Node error: {err}"),
            UnlockerError::Store(err) => write!(f, "Backend error: {err}"),
            UnlockerError::Decode(msg) => write!(f, "Decode error: {msg}"),
            UnlockerError::WrongNodeHeight(height) => {
                write!(
                    f,
                    "Error while retrieving block {height} from node, wrong node height"
                )
            }
            UnlockerError::MissingUncle { height, index } => {
                write!(
                    f,
                    "Error while retrieving uncle {index} of block {height} from node"
                )
            }
        }
    }
}

impl std::error::Error for UnlockerError {}

impl From<GethRpcError> for UnlockerError {
    fn from(err: GethRpcError) -> Self {
        UnlockerError::Rpc(err)
    }
}

impl From<StoreError> for UnlockerError {
    fn from(err: StoreError) -> Self {
        UnlockerError::Store(err)
    }
}

/// Result of the reward calculation for one confirmed block. Transient:
/// only the Shannon amounts in `rewards` reach the ledger.
#[derive(Debug, Clone)]
pub struct RewardDistribution {
    pub revenue: BigRational,
    pub miners_profit: BigRational,
    pub pool_profit: BigRational,
    pub rewards: HashMap<String, i64>,
    pub percents: HashMap<String, BigRational>,
}

#[derive(Default)]
struct UnlockResult {
    matured_blocks: Vec<BlockData>,
    orphaned_blocks: Vec<BlockData>,
    blocks: usize,
    uncles: usize,
    orphans: usize,
}

/// The unlocker scheduler. Owns its halt state; a single worker task is the
/// only mutator, so no synchronisation is needed beyond task ownership.
pub struct BlockUnlocker<S, R> {
    config: UnlockerConfig,
    store: Arc<S>,
    rpc: GethRpcClient,
    schedule: R,
    halt: bool,
    last_fail: Option<UnlockerError>,
}

impl<S, R> BlockUnlocker<S, R>
where
    S: CandidateStore + ShareStore,
    R: RewardSchedule,
{
    pub fn new(
        config: UnlockerConfig,
        store: Arc<S>,
        rpc: GethRpcClient,
        schedule: R,
    ) -> Result<Self, UnlockerError> {
        if !config.pool_fee_address.is_empty() && !is_valid_hex_address(&config.pool_fee_address) {
            return Err(UnlockerError::Config(format!(
                "invalid pool fee address {}",
                config.pool_fee_address
            )));
        }
        if !(0.0..=100.0).contains(&config.pool_fee) {
            return Err(UnlockerError::Config(format!(
                "pool fee must be within 0..100, got {}",
                config.pool_fee
            )));
        }
        if config.depth < MIN_DEPTH * 2 {
            return Err(UnlockerError::Config(format!(
                "block maturity depth can't be < {}, got {}",
                MIN_DEPTH * 2,
                config.depth
            )));
        }
        if config.immature_depth < MIN_DEPTH {
            return Err(UnlockerError::Config(format!(
                "immature depth can't be < {}, got {}",
                MIN_DEPTH, config.immature_depth
            )));
        }

        Ok(Self {
            config,
            store,
            rpc,
            schedule,
            halt: false,
            last_fail: None,
        })
    }

    pub fn halted(&self) -> bool {
        self.halt
    }

    pub fn last_fail(&self) -> Option<&UnlockerError> {
        self.last_fail.as_ref()
    }

    /// Runs the unlocker until shutdown is signalled.
    ///
    /// One immediate round of both passes, then a tick every interval. The
    /// timer is re-armed only after both passes return, so ticks never
    /// overlap and pass 1 always precedes pass 2 within a tick. Shutdown is
    /// serviced between ticks only; a running pass is never cancelled
    /// mid-flight.
    pub async fn run(mut self, mut shutdown_rx: watch::Receiver<bool>) {
        info!(
            "Starting block unlocker, interval {:?}",
            self.config.interval
        );

        self.unlock_pending_blocks().await;
        self.unlock_and_credit_miners().await;

        loop {
            tokio::select! {
                _ = shutdown_rx.changed() => {
                    info!("Block unlocker shutting down");
                    return;
                }
                _ = tokio::time::sleep(self.config.interval) => {
                    self.unlock_pending_blocks().await;
                    self.unlock_and_credit_miners().await;
                }
            }
        }
    }

    /// Pass 1: promote confirmed candidates to immature.
    pub async fn unlock_pending_blocks(&mut self) {
        if self.halt {
            if let Some(err) = &self.last_fail {
                warn!("Unlocking suspended due to last critical error: {err}");
            }
            return;
        }

        if let Err(err) = self.pending_pass().await {
            error!(pass = "pending-block", "Failed to unlock pending blocks: {err}");
            self.halt = true;
            self.last_fail = Some(err);
        }
    }

    /// Pass 2: promote immature blocks deep enough in the chain to matured
    /// and credit miner balances.
    pub async fn unlock_and_credit_miners(&mut self) {
        if self.halt {
            if let Some(err) = &self.last_fail {
                warn!("Unlocking suspended due to last critical error: {err}");
            }
            return;
        }

        if let Err(err) = self.matured_pass().await {
            error!(pass = "matured-block", "Failed to credit miners: {err}");
            self.halt = true;
            self.last_fail = Some(err);
        }
    }

    async fn pending_pass(&self) -> Result<(), UnlockerError> {
        let current_height = self.current_height().await?;

        let candidates = self
            .store
            .get_candidates(current_height - self.config.immature_depth)?;
        if candidates.is_empty() {
            info!("No block candidates to unlock");
            return Ok(());
        }

        let result = self.unlock_candidates(candidates).await?;
        info!(
            "Immature {} blocks, {} uncles, {} orphans",
            result.blocks, result.uncles, result.orphans
        );

        self.store.write_pending_orphans(&result.orphaned_blocks)?;
        if result.orphans > 0 {
            info!("Inserted {} orphaned blocks to backend", result.orphans);
        }

        let mut total_revenue = BigRational::zero();
        let mut total_miners_profit = BigRational::zero();
        let mut total_pool_profit = BigRational::zero();

        let start = Instant::now();
        for block in &result.matured_blocks {
            let Some(dist) = self.calculate_rewards(block)? else {
                self.store.write_immature_error(block, 0, 1)?;
                warn!(
                    "No shares recorded for round {}, unable to credit",
                    block.round_key()
                );
                continue;
            };

            self.store
                .write_immature_block(block, &dist.rewards, &dist.percents)?;

            total_revenue += dist.revenue.clone();
            total_miners_profit += dist.miners_profit.clone();
            total_pool_profit += dist.pool_profit.clone();

            info!(
                "IMMATURE {}: size: {}, revenue {}, miners profit {}, pool profit: {}",
                block_name(block),
                dist.rewards.len(),
                format_rat_reward(&dist.revenue),
                format_rat_reward(&dist.miners_profit),
                format_rat_reward(&dist.pool_profit),
            );
        }

        info!(
            "({:.2?}) IMMATURE SESSION: blocks: {}, revenue {}, miners profit {}, pool profit: {}",
            start.elapsed(),
            result.matured_blocks.len(),
            format_rat_reward(&total_revenue),
            format_rat_reward(&total_miners_profit),
            format_rat_reward(&total_pool_profit),
        );
        Ok(())
    }

    async fn matured_pass(&self) -> Result<(), UnlockerError> {
        let current_height = self.current_height().await?;

        let immature = self
            .store
            .get_immature_blocks(current_height - self.config.depth)?;
        if immature.is_empty() {
            info!("No immature blocks to credit miners");
            return Ok(());
        }

        let result = self.unlock_candidates(immature).await?;
        info!(
            "Unlocked {} blocks, {} uncles, {} orphans",
            result.blocks, result.uncles, result.orphans
        );

        // A reorg can reclassify a block that already went immature.
        for block in &result.orphaned_blocks {
            self.store.write_orphan(block)?;
        }
        if result.orphans > 0 {
            info!("Inserted {} orphaned blocks to backend", result.orphans);
        }

        let mut total_revenue = BigRational::zero();
        let mut total_miners_profit = BigRational::zero();
        let mut total_pool_profit = BigRational::zero();

        let start = Instant::now();
        for block in &result.matured_blocks {
            let Some(dist) = self.calculate_rewards(block)? else {
                self.store.write_immature_error(block, block.state, 2)?;
                warn!(
                    "No shares recorded for round {}, unable to credit",
                    block.round_key()
                );
                continue;
            };

            self.store
                .write_matured_block(block, &dist.rewards, &dist.percents)?;

            total_revenue += dist.revenue.clone();
            total_miners_profit += dist.miners_profit.clone();
            total_pool_profit += dist.pool_profit.clone();

            info!(
                "MATURED {}: size: {}, revenue {}, miners profit {}, pool profit: {}",
                block.round_key(),
                dist.rewards.len(),
                format_rat_reward(&dist.revenue),
                format_rat_reward(&dist.miners_profit),
                format_rat_reward(&dist.pool_profit),
            );
        }

        info!(
            "({:.2?}) MATURED SESSION: blocks: {}, revenue {}, miners profit {}, pool profit: {}",
            start.elapsed(),
            result.matured_blocks.len(),
            format_rat_reward(&total_revenue),
            format_rat_reward(&total_miners_profit),
            format_rat_reward(&total_pool_profit),
        );
        Ok(())
    }

    async fn current_height(&self) -> Result<i64, UnlockerError> {
        let current = self.rpc.get_pending_block().await?;
        parse_hex_i64(&current.number).map_err(|e| {
            UnlockerError::Decode(format!(
                "can't parse pending block number {:?}: {e}",
                current.number
            ))
        })
    }

    /// Match each candidate against the chain.
    ///
    /// The height the pool recorded at share time is only a reference
    /// point: the node assigns the canonical height later, and the two
    /// drift (https://github.com/ethereum/go-ethereum/issues/2333). So each
    /// candidate is searched for in the window of 16 blocks either side of
    /// its recorded height, as a block or as an uncle of one. Candidates
    /// found nowhere in the window are orphans.
    async fn unlock_candidates(
        &self,
        candidates: Vec<BlockData>,
    ) -> Result<UnlockResult, UnlockerError> {
        let mut result = UnlockResult::default();

        'candidates: for mut candidate in candidates {
            for i in -MIN_DEPTH..MIN_DEPTH {
                let height = candidate.height + i;
                if height < 0 {
                    continue;
                }

                let block = self
                    .rpc
                    .get_block_by_height(height)
                    .await?
                    .ok_or(UnlockerError::WrongNodeHeight(height))?;

                if match_candidate(&block, &candidate) {
                    self.handle_block(&block, &mut candidate).await?;
                    result.blocks += 1;
                    info!(
                        "Mature block {} with {} tx, hash: {}",
                        candidate.height,
                        block.transactions.len(),
                        short_hash(&candidate.hash)
                    );
                    result.matured_blocks.push(candidate);
                    continue 'candidates;
                }

                for index in 0..block.uncles.len() {
                    let uncle = self
                        .rpc
                        .get_uncle_by_block_number_and_index(height, index)
                        .await?
                        .ok_or(UnlockerError::MissingUncle { height, index })?;

                    if match_candidate(&uncle, &candidate) {
                        self.handle_uncle(height, &uncle, &mut candidate)?;
                        result.uncles += 1;
                        info!(
                            "Mature uncle {}/{} of reward {} with hash: {}",
                            candidate.height,
                            candidate.uncle_height,
                            format_reward(&candidate.reward),
                            short_hash(&candidate.hash)
                        );
                        result.matured_blocks.push(candidate);
                        continue 'candidates;
                    }
                }
            }

            // Lost: nothing in the window matches what the pool recorded.
            candidate.orphan = true;
            result.orphans += 1;
            warn!(
                "Orphaned block {}:{}",
                candidate.round_height, candidate.nonce
            );
            result.orphaned_blocks.push(candidate);
        }
        Ok(result)
    }

    async fn handle_block(
        &self,
        block: &GetBlockReply,
        candidate: &mut BlockData,
    ) -> Result<(), UnlockerError> {
        let correct_height = parse_hex_i64(&block.number).map_err(|e| {
            UnlockerError::Decode(format!("can't parse block number {:?}: {e}", block.number))
        })?;
        candidate.height = correct_height;

        let mut reward = self.schedule.block_reward(candidate.height);

        let extra_tx_reward = self.get_extra_reward_for_tx(block).await?;
        if self.config.keep_tx_fees {
            candidate.extra_reward = Some(extra_tx_reward);
        } else {
            reward += extra_tx_reward;
        }

        let uncle_reward = self.schedule.uncle_inclusion_reward(candidate.height);
        reward += uncle_reward * BigInt::from(block.uncles.len() as u64);

        candidate.orphan = false;
        candidate.hash = block.hash.clone();
        candidate.reward = reward;
        candidate.uncle_height = 0;
        Ok(())
    }

    fn handle_uncle(
        &self,
        height: i64,
        uncle: &GetBlockReply,
        candidate: &mut BlockData,
    ) -> Result<(), UnlockerError> {
        let uncle_height = parse_hex_i64(&uncle.number).map_err(|e| {
            UnlockerError::Decode(format!("can't parse uncle number {:?}: {e}", uncle.number))
        })?;

        let mut reward = self.schedule.uncle_reward(uncle_height, height);
        if reward.is_negative() {
            reward = BigInt::zero();
        }

        candidate.height = height;
        candidate.uncle_height = uncle_height;
        candidate.orphan = false;
        candidate.hash = uncle.hash.clone();
        candidate.reward = reward;
        Ok(())
    }

    /// Sum of gas_used * gas_price over the block's transactions.
    async fn get_extra_reward_for_tx(
        &self,
        block: &GetBlockReply,
    ) -> Result<BigInt, UnlockerError> {
        let mut amount = BigInt::zero();

        for tx in &block.transactions {
            let receipt = self.rpc.get_tx_receipt(&tx.hash).await?;
            if let Some(receipt) = receipt {
                let gas_used = parse_hex_big(&receipt.gas_used).ok_or_else(|| {
                    UnlockerError::Decode(format!(
                        "can't parse gas used {:?} of tx {}",
                        receipt.gas_used, tx.hash
                    ))
                })?;
                let gas_price = parse_hex_big(&tx.gas_price).ok_or_else(|| {
                    UnlockerError::Decode(format!(
                        "can't parse gas price {:?} of tx {}",
                        tx.gas_price, tx.hash
                    ))
                })?;
                amount += gas_used * gas_price;
            }
        }
        Ok(amount)
    }

    /// Apportion a confirmed block's reward. Returns `None` when no share
    /// data exists for the round: the block is real but the pool lost the
    /// contribution map, which is a recorded data condition, not a fault.
    fn calculate_rewards(
        &self,
        block: &BlockData,
    ) -> Result<Option<RewardDistribution>, UnlockerError> {
        let mut revenue = BigRational::from_integer(block.reward.clone());
        let (miners_profit, mut pool_profit) = charge_fee(&revenue, self.config.pool_fee);

        let shares = self
            .store
            .get_round_shares(block.round_height, &block.nonce)?;
        let total: i64 = shares.values().sum();
        if shares.is_empty() || total <= 0 {
            return Ok(None);
        }

        let (mut rewards, percents) = calculate_rewards_for_shares(&shares, total, &miners_profit);

        if let Some(extra) = &block.extra_reward {
            let extra = BigRational::from_integer(extra.clone());
            pool_profit += extra.clone();
            revenue += extra;
        }

        if self.config.donate {
            let (kept, donation) = charge_fee(&pool_profit, DONATION_FEE);
            pool_profit = kept;
            *rewards.entry(DONATION_ACCOUNT.to_lowercase()).or_insert(0) +=
                wei_to_shannon(&donation);
        }

        if !self.config.pool_fee_address.is_empty() {
            let address = self.config.pool_fee_address.to_lowercase();
            *rewards.entry(address).or_insert(0) += wei_to_shannon(&pool_profit);
        }

        Ok(Some(RewardDistribution {
            revenue,
            miners_profit,
            pool_profit,
            rewards,
            percents,
        }))
    }
}

/// Does this block or uncle reply confirm the candidate?
fn match_candidate(block: &GetBlockReply, candidate: &BlockData) -> bool {
    // Just compare the hash if the block was already unlocked as immature
    if !candidate.hash.is_empty() && candidate.hash.eq_ignore_ascii_case(&block.hash) {
        return true;
    }
    // Geth-style candidate matching
    if !block.nonce.is_empty() {
        return block.nonce.eq_ignore_ascii_case(&candidate.nonce);
    }
    // Parity's EIP: https://github.com/ethereum/EIPs/issues/95
    if block.seal_fields.len() == 2 {
        return candidate.nonce.eq_ignore_ascii_case(&block.seal_fields[1]);
    }
    false
}

fn calculate_rewards_for_shares(
    shares: &HashMap<String, i64>,
    total: i64,
    reward: &BigRational,
) -> (HashMap<String, i64>, HashMap<String, BigRational>) {
    let mut rewards = HashMap::new();
    let mut percents = HashMap::new();

    for (login, n) in shares {
        let percent = BigRational::new(BigInt::from(*n), BigInt::from(total));
        let worker_reward = reward.clone() * percent.clone();
        *rewards.entry(login.clone()).or_insert(0) += wei_to_shannon(&worker_reward);
        percents.insert(login.clone(), percent);
    }
    (rewards, percents)
}

/// Returns new value after fee deduction and the fee value. The percentage
/// is applied as an exact rational, so a 1% fee is exactly 1/100.
fn charge_fee(value: &BigRational, fee: f64) -> (BigRational, BigRational) {
    let fee_percent = BigRational::from_float(fee).unwrap_or_else(BigRational::zero)
        / BigRational::from_integer(BigInt::from(100));
    let fee_value = value.clone() * fee_percent;
    (value.clone() - fee_value.clone(), fee_value)
}

fn block_name(block: &BlockData) -> String {
    if block.uncle_height > 0 {
        format!(
            "uncle({}):{}:{}",
            block.height - block.uncle_height,
            block.uncle_height,
            short_hash(&block.hash)
        )
    } else {
        format!("{}:{}", block.height, short_hash(&block.hash))
    }
}

fn short_hash(hash: &str) -> &str {
    &hash[..hash.len().min(10)]
}

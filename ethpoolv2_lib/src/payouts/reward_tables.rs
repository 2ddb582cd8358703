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

//! The reward schedule. These tables are the single place where the
//! network's emission rules live; the unlocker treats them as oracles.

use crate::config::Network;
use num_bigint::BigInt;

/// Rewards owed for blocks and uncles at given heights, in wei.
pub trait RewardSchedule {
    /// Constant reward for a block mined at `height`.
    fn block_reward(&self, height: i64) -> BigInt;
    /// Bonus paid to a block at `height` for each uncle it includes.
    fn uncle_inclusion_reward(&self, height: i64) -> BigInt;
    /// Reward for an uncle mined at `uncle_height` and included by the
    /// block at `height`. May come out negative for deep uncles; callers
    /// clamp.
    fn uncle_reward(&self, uncle_height: i64, height: i64) -> BigInt;
}

fn ether(units: u64) -> BigInt {
    BigInt::from(units) * BigInt::from(10u64).pow(18)
}

/// The Ethash emission schedule: 5 ETH at genesis, 3 ETH from Byzantium,
/// 2 ETH from Constantinople, with fork heights per network. Uncle
/// inclusion pays 1/32 of the block reward per uncle; an uncle itself earns
/// (uncle_height + 8 - height) / 8 of the block reward.
#[derive(Debug, Clone, Copy)]
pub struct EthashSchedule {
    byzantium_height: i64,
    constantinople_height: i64,
}

impl EthashSchedule {
    pub fn new(network: Network) -> Self {
        match network {
            Network::Main => Self {
                byzantium_height: 4_370_000,
                constantinople_height: 7_280_000,
            },
            Network::Test => Self {
                byzantium_height: 1_700_000,
                constantinople_height: 4_230_000,
            },
        }
    }
}

impl RewardSchedule for EthashSchedule {
    fn block_reward(&self, height: i64) -> BigInt {
        if height >= self.constantinople_height {
            ether(2)
        } else if height >= self.byzantium_height {
            ether(3)
        } else {
            ether(5)
        }
    }

    fn uncle_inclusion_reward(&self, height: i64) -> BigInt {
        self.block_reward(height) / 32
    }

    fn uncle_reward(&self, uncle_height: i64, height: i64) -> BigInt {
        self.block_reward(height) * BigInt::from(uncle_height + 8 - height) / 8
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use num_traits::Signed;

    #[test]
    fn test_block_reward_eras_main() {
        let schedule = EthashSchedule::new(Network::Main);
        assert_eq!(schedule.block_reward(0), ether(5));
        assert_eq!(schedule.block_reward(4_369_999), ether(5));
        assert_eq!(schedule.block_reward(4_370_000), ether(3));
        assert_eq!(schedule.block_reward(7_279_999), ether(3));
        assert_eq!(schedule.block_reward(7_280_000), ether(2));
        assert_eq!(schedule.block_reward(20_000_000), ether(2));
    }

    #[test]
    fn test_block_reward_eras_test() {
        let schedule = EthashSchedule::new(Network::Test);
        assert_eq!(schedule.block_reward(1_699_999), ether(5));
        assert_eq!(schedule.block_reward(1_700_000), ether(3));
        assert_eq!(schedule.block_reward(4_230_000), ether(2));
    }

    #[test]
    fn test_uncle_inclusion_reward() {
        let schedule = EthashSchedule::new(Network::Main);
        assert_eq!(
            schedule.uncle_inclusion_reward(100),
            ether(5) / 32
        );
        assert_eq!(
            schedule.uncle_inclusion_reward(8_000_000),
            ether(2) / 32
        );
    }

    #[test]
    fn test_uncle_reward_by_depth() {
        let schedule = EthashSchedule::new(Network::Main);
        // depth 1: 7/8 of the block reward
        assert_eq!(
            schedule.uncle_reward(99, 100),
            ether(5) * BigInt::from(7) / 8
        );
        // depth 6: 2/8 of the block reward
        assert_eq!(
            schedule.uncle_reward(94, 100),
            ether(5) * BigInt::from(2) / 8
        );
    }

    #[test]
    fn test_uncle_reward_can_go_negative() {
        let schedule = EthashSchedule::new(Network::Main);
        // deeper than 8: negative, clamping is the caller's concern
        assert!(schedule.uncle_reward(80, 100).is_negative());
    }
}

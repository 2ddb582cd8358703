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

use num_bigint::BigInt;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// A pool-side record of a share believed to have found a block, moving
/// through the candidate -> immature -> matured (or orphan) pipeline.
///
/// `round_height` is the height the pool thought it was mining and is the
/// record's identity together with `nonce`; it never changes. `height`
/// becomes authoritative once the unlocker matches the record against the
/// chain. `hash` stays empty until matched.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct BlockData {
    pub height: i64,
    pub round_height: i64,
    pub nonce: String,
    pub pow_hash: String,
    pub mix_digest: String,
    pub timestamp: u64,
    pub difficulty: i64,
    pub total_shares: i64,
    pub uncle_height: i64,
    pub orphan: bool,
    pub hash: String,
    pub reward: BigInt,
    pub extra_reward: Option<BigInt>,
    pub state: i32,
}

impl BlockData {
    pub fn round_key(&self) -> String {
        format!("{}:{}", self.round_height, self.nonce)
    }
}

/// A credited block row as stored in the immature and matured column
/// families: the block itself plus the per-miner Shannon amounts granted
/// for it. The recorded rewards are what gets reversed when an immature
/// block matures or is reclassified as an orphan. Percents are kept as f64
/// approximations for display; ledger amounts are the exact integers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredRound {
    pub block: BlockData,
    pub rewards: HashMap<String, i64>,
    pub percents: HashMap<String, f64>,
}

/// Marker recorded when a confirmed round could not be credited because no
/// share data exists for it. The source row stays in place so the next
/// pass retries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreditError {
    pub state: i32,
    pub errcode: i32,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_round_key() {
        let block = BlockData {
            round_height: 100,
            nonce: "0xabc".to_string(),
            ..Default::default()
        };
        assert_eq!(block.round_key(), "100:0xabc");
    }

    #[test]
    fn test_block_data_roundtrip() {
        let block = BlockData {
            height: 203,
            round_height: 200,
            nonce: "0xdead".to_string(),
            hash: "0xaaa".to_string(),
            reward: BigInt::parse_bytes(b"2000000000000000000", 10).unwrap(),
            extra_reward: Some(BigInt::from(42)),
            ..Default::default()
        };

        let mut buf = Vec::new();
        ciborium::ser::into_writer(&block, &mut buf).unwrap();
        let decoded: BlockData = ciborium::de::from_reader(buf.as_slice()).unwrap();

        assert_eq!(decoded, block);
    }
}

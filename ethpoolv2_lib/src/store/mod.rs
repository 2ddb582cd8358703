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

use crate::store::column_families::ColumnFamily;
use crate::store::types::{BlockData, CreditError, StoredRound};
use num_rational::BigRational;
use num_traits::ToPrimitive;
use rocksdb::{ColumnFamilyDescriptor, DB, Options as RocksDbOptions, WriteBatch};
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::collections::HashMap;
use std::fmt;

pub mod column_families;
pub mod types;

/// Error type for store operations.
#[derive(Debug)]
pub enum StoreError {
    Database(String),
    Serialization(String),
    Corruption(String),
}

impl fmt::Display for StoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StoreError::Database(msg) => write!(f, "Database error: {msg}"),
            StoreError::Serialization(msg) => write!(f, "Serialization error: {msg}"),
            StoreError::Corruption(msg) => write!(f, "Corrupt store data: {msg}"),
        }
    }
}

impl std::error::Error for StoreError {}

impl From<rocksdb::Error> for StoreError {
    fn from(err: rocksdb::Error) -> Self {
        StoreError::Database(err.to_string())
    }
}

/// The unlocker's view of block candidate persistence. Every write moves a
/// round atomically: a round is always in exactly one of the candidate,
/// immature, matured or orphan sets.
pub trait CandidateStore {
    /// Candidates whose recorded height is at or below `max_height`.
    fn get_candidates(&self, max_height: i64) -> Result<Vec<BlockData>, StoreError>;
    /// Immature blocks whose confirmed height is at or below `max_height`.
    fn get_immature_blocks(&self, max_height: i64) -> Result<Vec<BlockData>, StoreError>;
    /// Promote a candidate to immature and grant per-miner immature credits.
    fn write_immature_block(
        &self,
        block: &BlockData,
        rewards: &HashMap<String, i64>,
        percents: &HashMap<String, BigRational>,
    ) -> Result<(), StoreError>;
    /// Promote an immature block to matured: reverse the immature grant and
    /// credit the freshly computed rewards to miner balances.
    fn write_matured_block(
        &self,
        block: &BlockData,
        rewards: &HashMap<String, i64>,
        percents: &HashMap<String, BigRational>,
    ) -> Result<(), StoreError>;
    /// Candidates that never confirmed; removed and recorded as orphans.
    fn write_pending_orphans(&self, blocks: &[BlockData]) -> Result<(), StoreError>;
    /// An immature block reclassified as an orphan after a reorg; the
    /// immature grant is reversed.
    fn write_orphan(&self, block: &BlockData) -> Result<(), StoreError>;
    /// Record that a confirmed round could not be credited (no share data).
    fn write_immature_error(
        &self,
        block: &BlockData,
        state: i32,
        errcode: i32,
    ) -> Result<(), StoreError>;
}

/// Read access to per-round share contributions, written by the share
/// intake pipeline.
pub trait ShareStore {
    fn get_round_shares(
        &self,
        round_height: i64,
        nonce: &str,
    ) -> Result<HashMap<String, i64>, StoreError>;
}

/// RocksDB-backed store for block candidates, round shares and the miner
/// credit ledger. Column families keep compactions independent per type.
/// Keys for round-scoped rows are big-endian round height followed by the
/// nonce, so scans come out in height order; credit rows are keyed by
/// miner login and hold big-endian i64 Shannon amounts.
pub struct Store {
    path: String,
    db: DB,
}

impl Store {
    pub fn new(path: String) -> Result<Self, StoreError> {
        let cfs = vec![
            ColumnFamilyDescriptor::new(ColumnFamily::Candidates, RocksDbOptions::default()),
            ColumnFamilyDescriptor::new(ColumnFamily::Immature, RocksDbOptions::default()),
            ColumnFamilyDescriptor::new(ColumnFamily::Matured, RocksDbOptions::default()),
            ColumnFamilyDescriptor::new(ColumnFamily::Orphans, RocksDbOptions::default()),
            ColumnFamilyDescriptor::new(ColumnFamily::RoundShares, RocksDbOptions::default()),
            ColumnFamilyDescriptor::new(ColumnFamily::ImmatureCredits, RocksDbOptions::default()),
            ColumnFamilyDescriptor::new(ColumnFamily::Balances, RocksDbOptions::default()),
            ColumnFamilyDescriptor::new(ColumnFamily::UnlockErrors, RocksDbOptions::default()),
        ];

        let mut db_options = RocksDbOptions::default();
        db_options.create_missing_column_families(true);
        db_options.create_if_missing(true);
        let db = DB::open_cf_descriptors(&db_options, path.clone(), cfs)?;
        Ok(Self { path, db })
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    /// Key for round-scoped rows: round height (big-endian) then nonce.
    fn round_key(round_height: i64, nonce: &str) -> Vec<u8> {
        let mut key = round_height.to_be_bytes().to_vec();
        key.extend_from_slice(nonce.as_bytes());
        key
    }

    fn encode<T: Serialize>(value: &T) -> Result<Vec<u8>, StoreError> {
        let mut buf = Vec::new();
        ciborium::ser::into_writer(value, &mut buf)
            .map_err(|e| StoreError::Serialization(e.to_string()))?;
        Ok(buf)
    }

    fn decode<T: DeserializeOwned>(bytes: &[u8]) -> Result<T, StoreError> {
        ciborium::de::from_reader(bytes).map_err(|e| StoreError::Serialization(e.to_string()))
    }

    /// Record a fresh candidate from the share pipeline.
    pub fn write_candidate(&self, block: &BlockData) -> Result<(), StoreError> {
        let cf = self.db.cf_handle(&ColumnFamily::Candidates).unwrap();
        let key = Self::round_key(block.round_height, &block.nonce);
        self.db.put_cf(cf, key, Self::encode(block)?)?;
        Ok(())
    }

    /// Record the share contributions of a round. Intake-side API; the
    /// unlocker only reads these.
    pub fn write_round_shares(
        &self,
        round_height: i64,
        nonce: &str,
        shares: &HashMap<String, i64>,
    ) -> Result<(), StoreError> {
        let cf = self.db.cf_handle(&ColumnFamily::RoundShares).unwrap();
        let key = Self::round_key(round_height, nonce);
        self.db.put_cf(cf, key, Self::encode(shares)?)?;
        Ok(())
    }

    /// Matured blocks at or below `max_height`, for payout processing.
    pub fn get_matured_blocks(&self, max_height: i64) -> Result<Vec<BlockData>, StoreError> {
        self.collect_rounds(ColumnFamily::Matured, max_height)
    }

    pub fn get_orphaned_blocks(&self) -> Result<Vec<BlockData>, StoreError> {
        let cf = self.db.cf_handle(&ColumnFamily::Orphans).unwrap();
        let mut blocks = Vec::new();
        for entry in self.db.iterator_cf(cf, rocksdb::IteratorMode::Start) {
            let (_, value) = entry?;
            blocks.push(Self::decode::<BlockData>(&value)?);
        }
        Ok(blocks)
    }

    /// A miner's unconfirmed credit, in Shannon.
    pub fn get_immature_credit(&self, login: &str) -> Result<i64, StoreError> {
        self.read_credit(ColumnFamily::ImmatureCredits, login)
    }

    /// A miner's spendable balance, in Shannon. Consumed by the payout
    /// sender.
    pub fn get_balance(&self, login: &str) -> Result<i64, StoreError> {
        self.read_credit(ColumnFamily::Balances, login)
    }

    pub fn get_credit_error(
        &self,
        round_height: i64,
        nonce: &str,
    ) -> Result<Option<CreditError>, StoreError> {
        let cf = self.db.cf_handle(&ColumnFamily::UnlockErrors).unwrap();
        let key = Self::round_key(round_height, nonce);
        match self.db.get_cf(cf, key)? {
            Some(bytes) => Ok(Some(Self::decode(&bytes)?)),
            None => Ok(None),
        }
    }

    fn read_credit(&self, family: ColumnFamily, login: &str) -> Result<i64, StoreError> {
        let cf = self.db.cf_handle(&family).unwrap();
        match self.db.get_cf(cf, login.as_bytes())? {
            Some(bytes) => {
                let raw: [u8; 8] = bytes.as_slice().try_into().map_err(|_| {
                    StoreError::Corruption(format!("bad credit value for {login}"))
                })?;
                Ok(i64::from_be_bytes(raw))
            }
            None => Ok(0),
        }
    }

    /// Stage `login += delta` into the batch. Reads see only committed
    /// state, so a login must appear at most once per family per batch.
    fn stage_credit(
        &self,
        batch: &mut WriteBatch,
        family: ColumnFamily,
        login: &str,
        delta: i64,
    ) -> Result<(), StoreError> {
        let current = self.read_credit(family, login)?;
        let cf = self.db.cf_handle(&family).unwrap();
        batch.put_cf(cf, login.as_bytes(), (current + delta).to_be_bytes());
        Ok(())
    }

    fn read_stored_round(
        &self,
        family: ColumnFamily,
        round_height: i64,
        nonce: &str,
    ) -> Result<Option<StoredRound>, StoreError> {
        let cf = self.db.cf_handle(&family).unwrap();
        let key = Self::round_key(round_height, nonce);
        match self.db.get_cf(cf, key)? {
            Some(bytes) => Ok(Some(Self::decode(&bytes)?)),
            None => Ok(None),
        }
    }

    fn collect_rounds(
        &self,
        family: ColumnFamily,
        max_height: i64,
    ) -> Result<Vec<BlockData>, StoreError> {
        let cf = self.db.cf_handle(&family).unwrap();
        let mut blocks = Vec::new();
        for entry in self.db.iterator_cf(cf, rocksdb::IteratorMode::Start) {
            let (_, value) = entry?;
            let round: StoredRound = Self::decode(&value)?;
            if round.block.height <= max_height {
                blocks.push(round.block);
            }
        }
        Ok(blocks)
    }

    fn percents_for_storage(percents: &HashMap<String, BigRational>) -> HashMap<String, f64> {
        percents
            .iter()
            .map(|(login, percent)| (login.clone(), percent.to_f64().unwrap_or_default()))
            .collect()
    }
}

impl CandidateStore for Store {
    fn get_candidates(&self, max_height: i64) -> Result<Vec<BlockData>, StoreError> {
        let cf = self.db.cf_handle(&ColumnFamily::Candidates).unwrap();
        let mut blocks = Vec::new();
        for entry in self.db.iterator_cf(cf, rocksdb::IteratorMode::Start) {
            let (_, value) = entry?;
            let block: BlockData = Self::decode(&value)?;
            if block.height <= max_height {
                blocks.push(block);
            }
        }
        Ok(blocks)
    }

    fn get_immature_blocks(&self, max_height: i64) -> Result<Vec<BlockData>, StoreError> {
        self.collect_rounds(ColumnFamily::Immature, max_height)
    }

    fn write_immature_block(
        &self,
        block: &BlockData,
        rewards: &HashMap<String, i64>,
        percents: &HashMap<String, BigRational>,
    ) -> Result<(), StoreError> {
        let candidates_cf = self.db.cf_handle(&ColumnFamily::Candidates).unwrap();
        let immature_cf = self.db.cf_handle(&ColumnFamily::Immature).unwrap();
        let key = Self::round_key(block.round_height, &block.nonce);

        let mut stored = block.clone();
        stored.state = 1;
        let round = StoredRound {
            block: stored,
            rewards: rewards.clone(),
            percents: Self::percents_for_storage(percents),
        };

        let mut batch = WriteBatch::default();
        batch.delete_cf(candidates_cf, &key);
        batch.put_cf(immature_cf, &key, Self::encode(&round)?);
        for (login, amount) in rewards {
            self.stage_credit(&mut batch, ColumnFamily::ImmatureCredits, login, *amount)?;
        }
        self.db.write(batch)?;
        Ok(())
    }

    fn write_matured_block(
        &self,
        block: &BlockData,
        rewards: &HashMap<String, i64>,
        percents: &HashMap<String, BigRational>,
    ) -> Result<(), StoreError> {
        let previous = self
            .read_stored_round(ColumnFamily::Immature, block.round_height, &block.nonce)?
            .ok_or_else(|| {
                StoreError::Corruption(format!(
                    "matured write without immature record for round {}",
                    block.round_key()
                ))
            })?;

        let immature_cf = self.db.cf_handle(&ColumnFamily::Immature).unwrap();
        let matured_cf = self.db.cf_handle(&ColumnFamily::Matured).unwrap();
        let key = Self::round_key(block.round_height, &block.nonce);

        let mut stored = block.clone();
        stored.state = 2;
        let round = StoredRound {
            block: stored,
            rewards: rewards.clone(),
            percents: Self::percents_for_storage(percents),
        };

        let mut batch = WriteBatch::default();
        batch.delete_cf(immature_cf, &key);
        batch.put_cf(matured_cf, &key, Self::encode(&round)?);
        for (login, amount) in &previous.rewards {
            self.stage_credit(&mut batch, ColumnFamily::ImmatureCredits, login, -amount)?;
        }
        for (login, amount) in rewards {
            self.stage_credit(&mut batch, ColumnFamily::Balances, login, *amount)?;
        }
        self.db.write(batch)?;
        Ok(())
    }

    fn write_pending_orphans(&self, blocks: &[BlockData]) -> Result<(), StoreError> {
        let candidates_cf = self.db.cf_handle(&ColumnFamily::Candidates).unwrap();
        let orphans_cf = self.db.cf_handle(&ColumnFamily::Orphans).unwrap();

        let mut batch = WriteBatch::default();
        for block in blocks {
            let key = Self::round_key(block.round_height, &block.nonce);
            batch.delete_cf(candidates_cf, &key);
            batch.put_cf(orphans_cf, &key, Self::encode(block)?);
        }
        self.db.write(batch)?;
        Ok(())
    }

    fn write_orphan(&self, block: &BlockData) -> Result<(), StoreError> {
        let immature_cf = self.db.cf_handle(&ColumnFamily::Immature).unwrap();
        let orphans_cf = self.db.cf_handle(&ColumnFamily::Orphans).unwrap();
        let key = Self::round_key(block.round_height, &block.nonce);

        let previous =
            self.read_stored_round(ColumnFamily::Immature, block.round_height, &block.nonce)?;

        let mut batch = WriteBatch::default();
        batch.delete_cf(immature_cf, &key);
        batch.put_cf(orphans_cf, &key, Self::encode(block)?);
        if let Some(previous) = previous {
            for (login, amount) in &previous.rewards {
                self.stage_credit(&mut batch, ColumnFamily::ImmatureCredits, login, -amount)?;
            }
        }
        self.db.write(batch)?;
        Ok(())
    }

    fn write_immature_error(
        &self,
        block: &BlockData,
        state: i32,
        errcode: i32,
    ) -> Result<(), StoreError> {
        let cf = self.db.cf_handle(&ColumnFamily::UnlockErrors).unwrap();
        let key = Self::round_key(block.round_height, &block.nonce);
        let marker = CreditError { state, errcode };
        self.db.put_cf(cf, key, Self::encode(&marker)?)?;
        Ok(())
    }
}

impl ShareStore for Store {
    fn get_round_shares(
        &self,
        round_height: i64,
        nonce: &str,
    ) -> Result<HashMap<String, i64>, StoreError> {
        let cf = self.db.cf_handle(&ColumnFamily::RoundShares).unwrap();
        let key = Self::round_key(round_height, nonce);
        match self.db.get_cf(cf, key)? {
            Some(bytes) => Self::decode(&bytes),
            None => Ok(HashMap::new()),
        }
    }
}

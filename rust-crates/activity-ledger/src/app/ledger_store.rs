use crate::ledger::Ledger;
use alloy_primitives::Address;

/// The (contract, player) pair a ledger belongs to.
#[derive(PartialEq, Eq, Hash, Debug, Copy, Clone)]
pub struct AccountKey {
    pub contract: Address,
    pub user: Address,
}

impl AccountKey {
    pub fn new(contract: Address, user: Address) -> Self {
        Self { contract, user }
    }
}

/// A ledger together with the block it has been read up to.
#[derive(PartialEq, Eq, Debug, Clone, Default)]
pub struct Checkpoint {
    pub ledger: Ledger,
    pub last_block: u64,
}

pub trait LedgerStore {
    /// retrieve the latest checkpoint for the account, if any
    fn checkpoint(&self, key: &AccountKey) -> Option<Checkpoint>;

    /// write or overwrite the checkpoint for the account
    fn store_checkpoint(&mut self, key: &AccountKey, checkpoint: Checkpoint);

    /// forget the account, the next read starts from genesis
    fn clear(&mut self, key: &AccountKey);
}

/// Keeps nothing: every read is a full scan from genesis.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopLedgerStore;

impl LedgerStore for NoopLedgerStore {
    fn checkpoint(&self, _key: &AccountKey) -> Option<Checkpoint> {
        None
    }

    fn store_checkpoint(&mut self, _key: &AccountKey, _checkpoint: Checkpoint) {}

    fn clear(&mut self, _key: &AccountKey) {}
}

use crate::events::{
    EventKind,
    LedgerEntry,
};
use serde::{
    Deserialize,
    Serialize,
};

/// Decoded entries of every tracked event, in chain order.
#[derive(PartialEq, Eq, Debug, Clone, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Ledger {
    entries: Vec<LedgerEntry>,
}

impl Ledger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Merges per-event batches into one ordered ledger.
    ///
    /// Batches are concatenated in [`EventKind::ALL`] order whatever order they arrive
    /// in, then stably sorted, so the result depends only on the entries themselves.
    pub fn from_batches(
        batches: impl IntoIterator<Item = (EventKind, Vec<LedgerEntry>)>,
    ) -> Self {
        let mut batches: Vec<_> = batches.into_iter().collect();
        batches.sort_by_key(|(kind, _)| kind.rank());
        let entries = batches
            .into_iter()
            .flat_map(|(_, entries)| entries)
            .collect();
        Self::from_entries(entries)
    }

    pub fn from_entries(mut entries: Vec<LedgerEntry>) -> Self {
        entries.sort_by_key(LedgerEntry::sort_key);
        Self { entries }
    }

    /// Folds `other` into this ledger. Entries already present are kept once, so merging
    /// the same range twice is a no-op.
    pub fn merge(&mut self, other: Ledger) {
        self.entries.extend(other.entries);
        self.entries.sort_by_key(LedgerEntry::sort_key);
        self.entries.dedup_by(|later, earlier| {
            later.sort_key() == earlier.sort_key() && later.tx_hash == earlier.tx_hash
        });
    }

    pub fn entries(&self) -> &[LedgerEntry] {
        &self.entries
    }

    pub fn iter(&self) -> impl Iterator<Item = &LedgerEntry> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn last_block(&self) -> Option<u64> {
        self.entries.last().map(|entry| entry.position.block_number)
    }

    pub fn into_entries(self) -> Vec<LedgerEntry> {
        self.entries
    }
}

impl<'a> IntoIterator for &'a Ledger {
    type Item = &'a LedgerEntry;
    type IntoIter = std::slice::Iter<'a, LedgerEntry>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.iter()
    }
}

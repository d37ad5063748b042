use crate::{
    events::{
        EntryKind,
        LedgerEntry,
    },
    ledger::Ledger,
};
use alloy_primitives::U256;
use serde::{
    Deserialize,
    Serialize,
};

pub const WEI_PER_ETH: u64 = 1_000_000_000_000_000_000;
/// 0.1 ETH, paid for a slot 0 race outcome.
pub const SLOT_0_REWARD_WEI: u64 = 100_000_000_000_000_000;
/// 0.01 ETH, paid for a slot 1 race outcome.
pub const SLOT_1_REWARD_WEI: u64 = 10_000_000_000_000_000;
/// GM charged for every race bought.
pub const GM_PER_RACE: u64 = 10;

/// Aggregate economy estimate for one player.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Snapshot {
    pub available_races: u64,
    pub gm_estimated: u128,
    pub pending_eth: String,
    pub pending_eth_wei: U256,
    pub last_slot: Option<u8>,
    pub races_bought: u64,
    pub races_done: u64,
    pub checkins: u64,
}

impl Snapshot {
    pub fn empty() -> Self {
        Tally::default().finish()
    }
}

/// Running totals of the ledger fold.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Tally {
    races_bought: u64,
    checkins: u64,
    races_done: u64,
    gm_from_prizes: i128,
    pending_eth_wei: U256,
    last_slot: Option<u8>,
}

impl Tally {
    pub fn apply(&mut self, entry: &LedgerEntry) {
        match &entry.kind {
            EntryKind::CheckIn => self.checkins = self.checkins.saturating_add(1),
            EntryKind::BuyRaces { count } => {
                self.races_bought = self.races_bought.saturating_add(*count)
            }
            EntryKind::Race {
                slot,
                gm_delta,
                prize_wei,
            } => {
                self.races_done = self.races_done.saturating_add(1);
                self.last_slot = Some(*slot);
                match *slot {
                    0 => self.add_wei(U256::from(SLOT_0_REWARD_WEI)),
                    1 => self.add_wei(U256::from(SLOT_1_REWARD_WEI)),
                    _ => {}
                }
                self.gm_from_prizes = self.gm_from_prizes.saturating_add(*gm_delta);
                if !prize_wei.is_zero() {
                    self.add_wei(*prize_wei);
                }
            }
            // public purchases are not credited to the estimate
            EntryKind::BuyGmPublic { .. } => {}
            // encrypted amount, nothing to infer
            EntryKind::BuyGmFhe => {}
        }
    }

    fn add_wei(&mut self, wei: U256) {
        self.pending_eth_wei = self.pending_eth_wei.saturating_add(wei);
    }

    pub fn finish(self) -> Snapshot {
        let credits = self.races_bought.saturating_add(self.checkins);
        let available_races = credits.saturating_sub(self.races_done);
        let gm_cost = i128::from(self.races_bought).saturating_mul(i128::from(GM_PER_RACE));
        let gm_net = self.gm_from_prizes.saturating_sub(gm_cost);
        let gm_estimated = u128::try_from(gm_net.max(0)).unwrap_or_default();
        Snapshot {
            available_races,
            gm_estimated,
            pending_eth: format_ether(self.pending_eth_wei),
            pending_eth_wei: self.pending_eth_wei,
            last_slot: self.last_slot,
            races_bought: self.races_bought,
            races_done: self.races_done,
            checkins: self.checkins,
        }
    }
}

/// Folds the ledger, in order, into a snapshot.
pub fn compute_snapshot(ledger: &Ledger) -> Snapshot {
    let mut tally = Tally::default();
    for entry in ledger {
        tally.apply(entry);
    }
    tally.finish()
}

/// Exact decimal ETH for a wei amount, without trailing zeros.
pub fn format_ether(wei: U256) -> String {
    let unit = U256::from(WEI_PER_ETH);
    let whole = wei / unit;
    let fraction = wei % unit;
    if fraction.is_zero() {
        return whole.to_string();
    }
    let digits = format!("{:0>18}", fraction.to_string());
    format!("{whole}.{}", digits.trim_end_matches('0'))
}

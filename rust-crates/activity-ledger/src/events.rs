use alloy_primitives::{
    B256,
    U256,
    keccak256,
};
use serde::{
    Deserialize,
    Deserializer,
    Serialize,
    de::Error as _,
};
use std::fmt;

/// The contract events a ledger is reconstructed from.
#[derive(PartialEq, Eq, PartialOrd, Ord, Hash, Debug, Copy, Clone, Serialize, Deserialize)]
pub enum EventKind {
    CheckInCompleted,
    RaceBoughtWithGm,
    RaceOutcome,
    GmTokensBought,
    GmTokensBoughtFhe,
}

/// How a single 32-byte word of a log payload is interpreted.
#[derive(PartialEq, Eq, Debug, Copy, Clone)]
pub enum WordType {
    Uint(usize),
    Int(usize),
}

#[derive(PartialEq, Eq, Debug, Copy, Clone)]
pub struct WordField {
    pub name: &'static str,
    pub ty: WordType,
}

const fn uint(name: &'static str, bits: usize) -> WordField {
    WordField {
        name,
        ty: WordType::Uint(bits),
    }
}

const fn int(name: &'static str, bits: usize) -> WordField {
    WordField {
        name,
        ty: WordType::Int(bits),
    }
}

// Only non-indexed parameters are part of `data`; the player address is topic1.
const CHECK_IN_LAYOUT: &[WordField] = &[];
const RACE_BOUGHT_LAYOUT: &[WordField] = &[uint("count", 256)];
const RACE_OUTCOME_LAYOUT: &[WordField] = &[
    uint("slot", 8),
    uint("prize_wei", 256),
    int("gm_delta", 256),
];
const GM_BOUGHT_LAYOUT: &[WordField] = &[uint("amount", 256)];
const GM_BOUGHT_FHE_LAYOUT: &[WordField] = &[];

impl EventKind {
    /// Canonical order, also the order batches are concatenated in.
    pub const ALL: [EventKind; 5] = [
        EventKind::CheckInCompleted,
        EventKind::RaceBoughtWithGm,
        EventKind::RaceOutcome,
        EventKind::GmTokensBought,
        EventKind::GmTokensBoughtFhe,
    ];

    pub fn signature(self) -> &'static str {
        match self {
            EventKind::CheckInCompleted => "CheckInCompleted(address,uint256)",
            EventKind::RaceBoughtWithGm => "RaceBoughtWithGm(address,uint64)",
            EventKind::RaceOutcome => "RaceOutcome(address,uint8,uint256,uint64)",
            EventKind::GmTokensBought => "GmTokensBought(address,uint256)",
            EventKind::GmTokensBoughtFhe => "GmTokensBoughtFHE(address)",
        }
    }

    pub fn topic0(self) -> B256 {
        keccak256(self.signature().as_bytes())
    }

    pub fn layout(self) -> &'static [WordField] {
        match self {
            EventKind::CheckInCompleted => CHECK_IN_LAYOUT,
            EventKind::RaceBoughtWithGm => RACE_BOUGHT_LAYOUT,
            EventKind::RaceOutcome => RACE_OUTCOME_LAYOUT,
            EventKind::GmTokensBought => GM_BOUGHT_LAYOUT,
            EventKind::GmTokensBoughtFhe => GM_BOUGHT_FHE_LAYOUT,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            EventKind::CheckInCompleted => "checkin",
            EventKind::RaceBoughtWithGm => "buy_races",
            EventKind::RaceOutcome => "race",
            EventKind::GmTokensBought => "buy_gm_public",
            EventKind::GmTokensBoughtFhe => "buy_gm_fhe",
        }
    }

    pub fn rank(self) -> u8 {
        match self {
            EventKind::CheckInCompleted => 0,
            EventKind::RaceBoughtWithGm => 1,
            EventKind::RaceOutcome => 2,
            EventKind::GmTokensBought => 3,
            EventKind::GmTokensBoughtFhe => 4,
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.label())
    }
}

/// One log as returned by the explorer `getLogs` endpoint.
#[derive(PartialEq, Eq, Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LogRecord {
    #[serde(deserialize_with = "quantity")]
    pub block_number: u64,
    #[serde(deserialize_with = "quantity")]
    pub transaction_index: u64,
    #[serde(default, deserialize_with = "quantity")]
    pub log_index: u64,
    pub transaction_hash: B256,
    #[serde(default = "empty_data")]
    pub data: String,
    #[serde(default)]
    pub topics: Vec<B256>,
    #[serde(default, rename = "timeStamp", deserialize_with = "optional_quantity")]
    pub timestamp: Option<u64>,
}

fn empty_data() -> String {
    "0x".to_string()
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RawQuantity {
    Number(u64),
    Text(String),
}

impl RawQuantity {
    fn parse(self) -> Result<u64, String> {
        match self {
            RawQuantity::Number(n) => Ok(n),
            RawQuantity::Text(text) => parse_quantity(&text),
        }
    }
}

/// Explorers encode quantities as `0x` hex (with `0x` alone meaning zero) or as decimal.
pub fn parse_quantity(text: &str) -> Result<u64, String> {
    let text = text.trim();
    match text.strip_prefix("0x").or_else(|| text.strip_prefix("0X")) {
        Some("") => Ok(0),
        Some(hex) => u64::from_str_radix(hex, 16)
            .map_err(|e| format!("invalid hex quantity '{text}': {e}")),
        None => text
            .parse::<u64>()
            .map_err(|e| format!("invalid quantity '{text}': {e}")),
    }
}

fn quantity<'de, D: Deserializer<'de>>(deserializer: D) -> Result<u64, D::Error> {
    RawQuantity::deserialize(deserializer)?
        .parse()
        .map_err(D::Error::custom)
}

fn optional_quantity<'de, D: Deserializer<'de>>(
    deserializer: D,
) -> Result<Option<u64>, D::Error> {
    Option::<RawQuantity>::deserialize(deserializer)?
        .map(RawQuantity::parse)
        .transpose()
        .map_err(D::Error::custom)
}

/// `i128` as a JSON number when it fits in `i64`, as a decimal string otherwise.
///
/// Flattened entries go through serde's buffered content, which has no 128-bit integers.
mod signed_amount {
    use serde::{
        Deserialize,
        Deserializer,
        Serializer,
        de::Error as _,
    };

    #[derive(Deserialize)]
    #[serde(untagged)]
    enum RawAmount {
        Signed(i64),
        Unsigned(u64),
        Text(String),
    }

    pub fn serialize<S: Serializer>(value: &i128, serializer: S) -> Result<S::Ok, S::Error> {
        match i64::try_from(*value) {
            Ok(small) => serializer.serialize_i64(small),
            Err(_) => serializer.serialize_str(&value.to_string()),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<i128, D::Error> {
        match RawAmount::deserialize(deserializer)? {
            RawAmount::Signed(n) => Ok(i128::from(n)),
            RawAmount::Unsigned(n) => Ok(i128::from(n)),
            RawAmount::Text(text) => text
                .trim()
                .parse::<i128>()
                .map_err(|e| D::Error::custom(format!("invalid amount '{text}': {e}"))),
        }
    }
}

/// Where a log sits on chain. Ordering is block, then transaction, then receipt position.
#[derive(
    PartialEq, Eq, PartialOrd, Ord, Hash, Debug, Copy, Clone, Default, Serialize, Deserialize,
)]
#[serde(rename_all = "camelCase")]
pub struct LogPosition {
    pub block_number: u64,
    pub tx_index: u64,
    pub log_index: u64,
}

#[derive(PartialEq, Eq, Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EntryKind {
    #[serde(rename = "checkin")]
    CheckIn,
    BuyRaces {
        count: u64,
    },
    Race {
        slot: u8,
        #[serde(rename = "gmDelta", with = "signed_amount")]
        gm_delta: i128,
        #[serde(rename = "prizeWei")]
        prize_wei: U256,
    },
    BuyGmPublic {
        amount: U256,
    },
    BuyGmFhe,
}

impl EntryKind {
    pub fn event_kind(&self) -> EventKind {
        match self {
            EntryKind::CheckIn => EventKind::CheckInCompleted,
            EntryKind::BuyRaces { .. } => EventKind::RaceBoughtWithGm,
            EntryKind::Race { .. } => EventKind::RaceOutcome,
            EntryKind::BuyGmPublic { .. } => EventKind::GmTokensBought,
            EntryKind::BuyGmFhe => EventKind::GmTokensBoughtFhe,
        }
    }
}

/// A decoded, immutable ledger line.
#[derive(PartialEq, Eq, Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LedgerEntry {
    #[serde(flatten)]
    pub position: LogPosition,
    pub tx_hash: B256,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time: Option<u64>,
    #[serde(flatten)]
    pub kind: EntryKind,
}

impl LedgerEntry {
    pub fn new(position: LogPosition, tx_hash: B256, kind: EntryKind) -> Self {
        Self {
            position,
            tx_hash,
            time: None,
            kind,
        }
    }

    pub fn with_time(mut self, time: Option<u64>) -> Self {
        self.time = time;
        self
    }

    pub fn event_kind(&self) -> EventKind {
        self.kind.event_kind()
    }

    /// Total order used by the ledger: position first, then canonical event order.
    pub fn sort_key(&self) -> (LogPosition, u8) {
        (self.position, self.event_kind().rank())
    }

    pub fn checkin(position: LogPosition, tx_hash: B256) -> Self {
        Self::new(position, tx_hash, EntryKind::CheckIn)
    }

    pub fn buy_races(position: LogPosition, tx_hash: B256, count: u64) -> Self {
        Self::new(position, tx_hash, EntryKind::BuyRaces { count })
    }

    pub fn race(
        position: LogPosition,
        tx_hash: B256,
        slot: u8,
        gm_delta: i128,
        prize_wei: U256,
    ) -> Self {
        Self::new(
            position,
            tx_hash,
            EntryKind::Race {
                slot,
                gm_delta,
                prize_wei,
            },
        )
    }

    pub fn buy_gm_public(position: LogPosition, tx_hash: B256, amount: U256) -> Self {
        Self::new(position, tx_hash, EntryKind::BuyGmPublic { amount })
    }

    pub fn buy_gm_fhe(position: LogPosition, tx_hash: B256) -> Self {
        Self::new(position, tx_hash, EntryKind::BuyGmFhe)
    }
}

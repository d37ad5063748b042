//! Positional decoding of log payloads.
//!
//! Payloads are read word by word through [`WordCursor`]; each event declares its
//! word layout in [`EventKind::layout`], so a record is rejected before any field is
//! read when it is too short.

use crate::events::{
    EntryKind,
    EventKind,
    LedgerEntry,
    LogPosition,
    LogRecord,
    WordType,
};
use alloy_primitives::{
    B256,
    U256,
};

pub const WORD_SIZE: usize = 32;

#[derive(Debug, thiserror::Error, PartialEq, Eq, Clone)]
pub enum DecodeError {
    #[error("{kind} log {tx_hash} has invalid hex payload: {reason}")]
    InvalidHex {
        kind: EventKind,
        tx_hash: B256,
        reason: String,
    },
    #[error(
        "{kind} log {tx_hash} is truncated: {required} words required, {actual} present"
    )]
    Truncated {
        kind: EventKind,
        tx_hash: B256,
        required: usize,
        actual: usize,
    },
    #[error("{kind} log {tx_hash} carries topic0 {found}, expected {expected}")]
    UnexpectedTopic {
        kind: EventKind,
        tx_hash: B256,
        expected: B256,
        found: B256,
    },
    #[error("{kind} log {tx_hash}: field {field} does not fit in {bits} bits")]
    Overflow {
        kind: EventKind,
        tx_hash: B256,
        field: &'static str,
        bits: usize,
    },
    #[error("{kind} log {tx_hash}: field {field} has unexpected type")]
    InvalidField {
        kind: EventKind,
        tx_hash: B256,
        field: &'static str,
    },
}

/// A value read off one payload word.
#[derive(PartialEq, Eq, Debug, Copy, Clone)]
pub enum WordValue {
    Uint(U256),
    Int(i128),
}

/// Failure of a single cursor read, before it is attributed to a log.
#[derive(PartialEq, Eq, Debug, Copy, Clone)]
pub enum CursorError {
    OutOfWords,
    Overflow,
}

/// Length-checked reader over a sequence of big-endian 32-byte words.
#[derive(Debug, Clone)]
pub struct WordCursor<'a> {
    bytes: &'a [u8],
    offset: usize,
}

impl<'a> WordCursor<'a> {
    pub fn new(bytes: &'a [u8]) -> Self {
        Self { bytes, offset: 0 }
    }

    /// Whole words left; a trailing partial word does not count.
    pub fn remaining_words(&self) -> usize {
        (self.bytes.len() - self.offset) / WORD_SIZE
    }

    pub fn read_word(&mut self) -> Result<[u8; WORD_SIZE], CursorError> {
        let end = self.offset + WORD_SIZE;
        let slice = self
            .bytes
            .get(self.offset..end)
            .ok_or(CursorError::OutOfWords)?;
        let mut word = [0u8; WORD_SIZE];
        word.copy_from_slice(slice);
        self.offset = end;
        Ok(word)
    }

    /// Reads the next word as an unsigned integer, keeping its low `bits` bits.
    pub fn read_uint(&mut self, bits: usize) -> Result<U256, CursorError> {
        let word = self.read_word()?;
        let value = U256::from_be_bytes(word);
        if bits >= 256 {
            return Ok(value);
        }
        let mask = (U256::from(1u8) << bits) - U256::from(1u8);
        Ok(value & mask)
    }

    /// Reads the next word as a two's-complement integer of width `bits`.
    ///
    /// Values outside the i128 range are reported as [`CursorError::Overflow`].
    pub fn read_int(&mut self, bits: usize) -> Result<i128, CursorError> {
        let word = self.read_word()?;
        let bits = bits.clamp(1, 256);
        let value = U256::from_be_bytes(word);
        let negative = value.bit(bits - 1);
        let extended = if bits == 256 {
            value
        } else if negative {
            value | (U256::MAX << bits)
        } else {
            value & ((U256::from(1u8) << bits) - U256::from(1u8))
        };
        let bytes = extended.to_be_bytes::<WORD_SIZE>();
        let (high, low) = bytes.split_at(16);
        let fill = if negative { 0xff } else { 0x00 };
        if high.iter().any(|b| *b != fill) {
            return Err(CursorError::Overflow);
        }
        let mut low_bytes = [0u8; 16];
        low_bytes.copy_from_slice(low);
        let narrowed = i128::from_be_bytes(low_bytes);
        // the sign of the low half must agree with the discarded high half
        if (narrowed < 0) != negative {
            return Err(CursorError::Overflow);
        }
        Ok(narrowed)
    }

    pub fn read_typed(&mut self, ty: WordType) -> Result<WordValue, CursorError> {
        match ty {
            WordType::Uint(bits) => self.read_uint(bits).map(WordValue::Uint),
            WordType::Int(bits) => self.read_int(bits).map(WordValue::Int),
        }
    }
}

/// Hex-decodes the words `kind` needs. Anything after them is ignored.
fn payload_bytes(kind: EventKind, record: &LogRecord) -> Result<Vec<u8>, DecodeError> {
    let data = record.data.trim();
    let hex_body = data
        .strip_prefix("0x")
        .or_else(|| data.strip_prefix("0X"))
        .unwrap_or(data);
    let required = kind.layout().len();
    let needed = required * WORD_SIZE * 2;
    if hex_body.len() < needed {
        return Err(DecodeError::Truncated {
            kind,
            tx_hash: record.transaction_hash,
            required,
            actual: hex_body.len() / (WORD_SIZE * 2),
        });
    }
    let invalid = |reason: String| DecodeError::InvalidHex {
        kind,
        tx_hash: record.transaction_hash,
        reason,
    };
    let words = hex_body
        .get(..needed)
        .ok_or_else(|| invalid("payload is not ascii hex".to_string()))?;
    hex::decode(words).map_err(|e| invalid(e.to_string()))
}

/// Decodes one log known to belong to `kind`.
pub fn decode_log(kind: EventKind, record: &LogRecord) -> Result<LedgerEntry, DecodeError> {
    let tx_hash = record.transaction_hash;
    if let Some(found) = record.topics.first() {
        let expected = kind.topic0();
        if *found != expected {
            return Err(DecodeError::UnexpectedTopic {
                kind,
                tx_hash,
                expected,
                found: *found,
            });
        }
    }

    let bytes = payload_bytes(kind, record)?;
    let mut cursor = WordCursor::new(&bytes);
    let layout = kind.layout();
    if cursor.remaining_words() < layout.len() {
        return Err(DecodeError::Truncated {
            kind,
            tx_hash,
            required: layout.len(),
            actual: cursor.remaining_words(),
        });
    }

    let mut values = Vec::with_capacity(layout.len());
    for field in layout {
        let value = cursor.read_typed(field.ty).map_err(|e| match e {
            CursorError::OutOfWords => DecodeError::Truncated {
                kind,
                tx_hash,
                required: layout.len(),
                actual: values.len(),
            },
            CursorError::Overflow => DecodeError::Overflow {
                kind,
                tx_hash,
                field: field.name,
                bits: 128,
            },
        })?;
        values.push(value);
    }

    let uint_at = |index: usize| match values.get(index) {
        Some(WordValue::Uint(value)) => Ok(*value),
        _ => Err(DecodeError::InvalidField {
            kind,
            tx_hash,
            field: layout.get(index).map(|f| f.name).unwrap_or("?"),
        }),
    };
    let int_at = |index: usize| match values.get(index) {
        Some(WordValue::Int(value)) => Ok(*value),
        _ => Err(DecodeError::InvalidField {
            kind,
            tx_hash,
            field: layout.get(index).map(|f| f.name).unwrap_or("?"),
        }),
    };

    let entry_kind = match kind {
        EventKind::CheckInCompleted => EntryKind::CheckIn,
        EventKind::RaceBoughtWithGm => {
            let count =
                u64::try_from(uint_at(0)?).map_err(|_| DecodeError::Overflow {
                    kind,
                    tx_hash,
                    field: "count",
                    bits: 64,
                })?;
            EntryKind::BuyRaces { count }
        }
        EventKind::RaceOutcome => {
            // the slot word is masked to 8 bits by its layout
            let slot = u8::try_from(uint_at(0)?).map_err(|_| DecodeError::Overflow {
                kind,
                tx_hash,
                field: "slot",
                bits: 8,
            })?;
            EntryKind::Race {
                slot,
                prize_wei: uint_at(1)?,
                gm_delta: int_at(2)?,
            }
        }
        EventKind::GmTokensBought => EntryKind::BuyGmPublic {
            amount: uint_at(0)?,
        },
        EventKind::GmTokensBoughtFhe => EntryKind::BuyGmFhe,
    };

    let position = LogPosition {
        block_number: record.block_number,
        tx_index: record.transaction_index,
        log_index: record.log_index,
    };
    Ok(LedgerEntry::new(position, tx_hash, entry_kind).with_time(record.timestamp))
}

/// Decodes every record of one kind, keeping going past bad records.
///
/// Records that fail are left out of the entries and returned alongside them.
pub fn decode_logs(
    kind: EventKind,
    records: &[LogRecord],
) -> (Vec<LedgerEntry>, Vec<DecodeError>) {
    let mut entries = Vec::with_capacity(records.len());
    let mut errors = Vec::new();
    for record in records {
        match decode_log(kind, record) {
            Ok(entry) => entries.push(entry),
            Err(e) => {
                tracing::warn!("dropping undecodable log: {e}");
                errors.push(e);
            }
        }
    }
    (entries, errors)
}

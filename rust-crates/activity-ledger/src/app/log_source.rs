use crate::{
    error::FetchError,
    events::LogRecord,
};
use alloy_primitives::{
    Address,
    B256,
};
use std::fmt;

#[derive(PartialEq, Eq, Debug, Copy, Clone)]
pub enum BlockTag {
    Latest,
    Number(u64),
}

impl fmt::Display for BlockTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BlockTag::Latest => write!(f, "latest"),
            BlockTag::Number(n) => write!(f, "{n}"),
        }
    }
}

/// One filtered log query: a single event signature for a single player.
#[derive(PartialEq, Eq, Debug, Clone)]
pub struct LogQuery {
    pub contract: Address,
    pub topic0: B256,
    pub topic1: B256,
    pub from_block: u64,
    pub to_block: BlockTag,
}

impl LogQuery {
    pub fn new(contract: Address, topic0: B256, user: Address, from_block: u64) -> Self {
        Self {
            contract,
            topic0,
            topic1: user.into_word(),
            from_block,
            to_block: BlockTag::Latest,
        }
    }
}

pub trait LogSource {
    fn fetch_logs(
        &self,
        query: &LogQuery,
    ) -> impl Future<Output = Result<Vec<LogRecord>, FetchError>> + Send;
}

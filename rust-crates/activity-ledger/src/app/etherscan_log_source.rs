use crate::{
    Result,
    app::log_source::{
        LogQuery,
        LogSource,
    },
    error::{
        FetchError,
        LedgerError,
    },
    events::LogRecord,
};
use alloy_primitives::B256;
use explorer_config::ExplorerConfig;
use serde::Deserialize;
use std::collections::HashSet;


const NO_RECORDS_MESSAGE: &str = "No records found";
/// Upper bound on requests for a single query.
pub const MAX_PAGES: usize = 1_000;

/// [`LogSource`] backed by an Etherscan-compatible `module=logs&action=getLogs` API.
#[derive(Clone)]
pub struct EtherscanLogSource {
    base_url: String,
    api_key: String,
    chain_id: Option<u64>,
    page_size: u64,
    http: reqwest::Client,
}

#[derive(Deserialize)]
struct LogsResponseDto {
    status: String,
    #[serde(default)]
    message: String,
    #[serde(default)]
    result: serde_json::Value,
}

impl EtherscanLogSource {
    /// Fails with a config error, before any request is made, when no API key is set.
    pub fn new(config: &ExplorerConfig) -> Result<Self> {
        let api_key = config.api_key()?.to_string();
        let mut builder = reqwest::Client::builder();
        if let Some(timeout) = config.request_timeout {
            builder = builder.timeout(timeout);
        }
        let http = builder.build().map_err(LedgerError::Client)?;
        Ok(Self {
            base_url: config.base_url.clone(),
            api_key,
            chain_id: config.chain_id,
            page_size: config.page_size.max(1),
            http,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Always asks for the first page; later pages move `fromBlock` instead, which keeps
    /// clear of the `page * offset` window limit.
    fn query_params(&self, query: &LogQuery, from_block: u64) -> Vec<(&'static str, String)> {
        let mut params = vec![
            ("module", "logs".to_string()),
            ("action", "getLogs".to_string()),
            ("fromBlock", from_block.to_string()),
            ("toBlock", query.to_block.to_string()),
            ("address", format!("{:#x}", query.contract)),
            ("topic0", query.topic0.to_string()),
            ("topic1", query.topic1.to_string()),
            ("topic0_1_opr", "and".to_string()),
            ("page", "1".to_string()),
            ("offset", self.page_size.to_string()),
            ("apikey", self.api_key.clone()),
        ];
        if let Some(chain_id) = self.chain_id {
            params.push(("chainid", chain_id.to_string()));
        }
        params
    }

    async fn fetch_page(
        &self,
        query: &LogQuery,
        from_block: u64,
    ) -> std::result::Result<Vec<LogRecord>, FetchError> {
        let res = self
            .http
            .get(&self.base_url)
            .query(&self.query_params(query, from_block))
            .send()
            .await?;
        let status = res.status();
        let bytes = res.bytes().await?;
        if !status.is_success() {
            let body = String::from_utf8_lossy(&bytes).into_owned();
            return Err(FetchError::Status { status, body });
        }
        let dto: LogsResponseDto = serde_json::from_slice(&bytes)?;
        parse_logs_response(dto)
    }
}

fn parse_logs_response(
    dto: LogsResponseDto,
) -> std::result::Result<Vec<LogRecord>, FetchError> {
    if dto.status != "1" {
        let empty_result = dto.result.as_array().is_some_and(Vec::is_empty);
        if dto.message.starts_with(NO_RECORDS_MESSAGE) && empty_result {
            return Ok(Vec::new());
        }
        let detail = match &dto.result {
            serde_json::Value::String(text) => format!("{} ({text})", dto.message),
            _ => dto.message,
        };
        return Err(FetchError::Api {
            status: dto.status,
            message: detail,
        });
    }
    if !dto.result.is_array() {
        return Err(FetchError::MalformedResult(dto.result.to_string()));
    }
    Ok(serde_json::from_value(dto.result)?)
}

type RecordKey = (u64, u64, u64, B256);

fn record_key(record: &LogRecord) -> RecordKey {
    (
        record.block_number,
        record.transaction_index,
        record.log_index,
        record.transaction_hash,
    )
}

impl LogSource for EtherscanLogSource {
    /// Reads pages until one comes back short. Each full page restarts the window at its
    /// last block, so records of that block are seen twice and kept once. A full page that
    /// adds nothing ends the read.
    async fn fetch_logs(
        &self,
        query: &LogQuery,
    ) -> std::result::Result<Vec<LogRecord>, FetchError> {
        let mut records = Vec::new();
        let mut seen: HashSet<RecordKey> = HashSet::new();
        let mut from_block = query.from_block;
        for _ in 0..MAX_PAGES {
            let batch = self.fetch_page(query, from_block).await?;
            let batch_len = batch.len() as u64;
            let last_block = batch.iter().map(|r| r.block_number).max();
            let mut fresh = 0;
            for record in batch {
                if seen.insert(record_key(&record)) {
                    records.push(record);
                    fresh += 1;
                }
            }
            tracing::trace!(
                "topic {} from block {from_block}: {batch_len} logs, {fresh} new",
                query.topic0
            );
            if batch_len < self.page_size {
                return Ok(records);
            }
            match last_block {
                Some(last) if fresh > 0 && last >= from_block => from_block = last,
                _ => {
                    tracing::warn!(
                        "topic {} made no progress past block {from_block}; keeping {} logs",
                        query.topic0,
                        records.len()
                    );
                    return Ok(records);
                }
            }
        }
        Err(FetchError::PageLimit { pages: MAX_PAGES })
    }
}

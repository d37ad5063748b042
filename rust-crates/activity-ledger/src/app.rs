use crate::{
    Result,
    app::{
        etherscan_log_source::EtherscanLogSource,
        fetcher::fetch_all,
        ledger_store::{
            AccountKey,
            Checkpoint,
            LedgerStore,
            NoopLedgerStore,
        },
        log_source::LogSource,
        query_api::{
            AccountQuery,
            Query,
            QueryAPI,
        },
    },
    decode::decode_logs,
    error::LedgerError,
    events::EventKind,
    ledger::Ledger,
    snapshot::{
        Snapshot,
        compute_snapshot,
    },
};
use alloy_primitives::Address;
use explorer_config::ExplorerConfig;
use serde::Serialize;

pub mod actix_query_api;
pub mod etherscan_log_source;
pub mod fetcher;
pub mod in_memory_ledger_store;
pub mod ledger_store;
pub mod log_source;
pub mod query_api;

#[cfg(test)]
mod tests;

/// What to do when a query or a record fails.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum FailurePolicy {
    /// Failed queries count as empty and bad records are dropped.
    #[default]
    Tolerate,
    /// The first failure aborts the reconstruction.
    Strict,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case", rename_all_fields = "camelCase")]
pub enum ReconstructionStatus {
    Complete,
    Degraded {
        failed_queries: Vec<EventKind>,
        dropped_records: usize,
    },
}

impl ReconstructionStatus {
    pub fn is_complete(&self) -> bool {
        matches!(self, ReconstructionStatus::Complete)
    }

    pub fn has_failed_queries(&self) -> bool {
        match self {
            ReconstructionStatus::Complete => false,
            ReconstructionStatus::Degraded { failed_queries, .. } => {
                !failed_queries.is_empty()
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Reconstruction {
    pub ledger: Ledger,
    #[serde(flatten)]
    pub status: ReconstructionStatus,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SnapshotReport {
    pub snapshot: Snapshot,
    #[serde(flatten)]
    pub status: ReconstructionStatus,
    pub last_block: Option<u64>,
}

impl SnapshotReport {
    pub fn from_reconstruction(reconstruction: &Reconstruction) -> Self {
        Self {
            snapshot: compute_snapshot(&reconstruction.ledger),
            status: reconstruction.status.clone(),
            last_block: reconstruction.ledger.last_block(),
        }
    }
}

pub enum RunState {
    Continue,
    Exit,
}

pub struct ActivityLedger<Source, Store> {
    source: Source,
    store: Store,
    policy: FailurePolicy,
}

impl<Source, Store> ActivityLedger<Source, Store> {
    pub fn new(source: Source, store: Store) -> Self {
        Self {
            source,
            store,
            policy: FailurePolicy::default(),
        }
    }

    pub fn with_policy(mut self, policy: FailurePolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn policy(&self) -> FailurePolicy {
        self.policy
    }
}

impl<Source: LogSource, Store: LedgerStore> ActivityLedger<Source, Store> {
    /// Full scan from genesis, ignoring any stored checkpoint.
    pub async fn reconstruct(
        &self,
        contract: Address,
        user: Address,
    ) -> Result<Reconstruction> {
        self.read_from(contract, user, 0).await
    }

    pub async fn build_ledger(&self, contract: Address, user: Address) -> Result<Ledger> {
        Ok(self.reconstruct(contract, user).await?.ledger)
    }

    /// Reads only what happened since the stored checkpoint and merges it in.
    ///
    /// The checkpoint advances only when every query succeeded, so a failed query
    /// is retried over the same range next time.
    pub async fn refresh(
        &mut self,
        contract: Address,
        user: Address,
    ) -> Result<Reconstruction> {
        let key = AccountKey::new(contract, user);
        let checkpoint = self.store.checkpoint(&key);
        let from_block = checkpoint.as_ref().map_or(0, |c| c.last_block);
        let delta = self.read_from(contract, user, from_block).await?;

        let mut ledger = checkpoint.map(|c| c.ledger).unwrap_or_default();
        ledger.merge(delta.ledger);

        if delta.status.has_failed_queries() {
            tracing::warn!(
                "refresh of {user} on {contract} degraded; keeping checkpoint at block {from_block}"
            );
        } else {
            let last_block = ledger.last_block().unwrap_or(from_block).max(from_block);
            self.store.store_checkpoint(
                &key,
                Checkpoint {
                    ledger: ledger.clone(),
                    last_block,
                },
            );
        }

        Ok(Reconstruction {
            ledger,
            status: delta.status,
        })
    }

    pub async fn snapshot(
        &mut self,
        contract: Address,
        user: Address,
    ) -> Result<SnapshotReport> {
        let reconstruction = self.refresh(contract, user).await?;
        Ok(SnapshotReport::from_reconstruction(&reconstruction))
    }

    async fn read_from(
        &self,
        contract: Address,
        user: Address,
        from_block: u64,
    ) -> Result<Reconstruction> {
        tracing::info!("reading activity of {user} on {contract} from block {from_block}");
        let outcomes = fetch_all(&self.source, contract, user, from_block).await;

        let mut batches = Vec::with_capacity(outcomes.len());
        let mut failed_queries = Vec::new();
        let mut dropped_records = 0;
        for (kind, outcome) in outcomes {
            let records = match (outcome, self.policy) {
                (Ok(records), _) => records,
                (Err(source), FailurePolicy::Strict) => {
                    return Err(LedgerError::Fetch { kind, source });
                }
                (Err(_), FailurePolicy::Tolerate) => {
                    failed_queries.push(kind);
                    Vec::new()
                }
            };
            let (entries, errors) = decode_logs(kind, &records);
            if self.policy == FailurePolicy::Strict {
                if let Some(error) = errors.into_iter().next() {
                    return Err(LedgerError::Decode(error));
                }
            } else {
                dropped_records += errors.len();
            }
            batches.push((kind, entries));
        }

        let ledger = Ledger::from_batches(batches);
        let status = if failed_queries.is_empty() && dropped_records == 0 {
            ReconstructionStatus::Complete
        } else {
            ReconstructionStatus::Degraded {
                failed_queries,
                dropped_records,
            }
        };
        tracing::info!("ledger of {user} holds {} entries ({status:?})", ledger.len());
        Ok(Reconstruction { ledger, status })
    }

    /// Serves one query, or returns [`RunState::Exit`] once `interrupt` resolves.
    pub async fn run<API: QueryAPI>(
        &mut self,
        api: &mut API,
        interrupt: impl Future<Output = ()>,
    ) -> anyhow::Result<RunState> {
        tokio::select! {
            query = api.query() => {
                self.handle_query(query?).await;
                Ok(RunState::Continue)
            }
            _ = interrupt => Ok(RunState::Exit),
        }
    }

    async fn handle_query(&mut self, query: Query) {
        match query {
            Query::Snapshot(AccountQuery { key, sender }) => {
                let report = self.snapshot(key.contract, key.user).await;
                if sender.send(report).is_err() {
                    tracing::warn!("snapshot requester for {} went away", key.user);
                }
            }
            Query::Ledger(AccountQuery { key, sender }) => {
                let reconstruction = self.refresh(key.contract, key.user).await;
                if sender.send(reconstruction).is_err() {
                    tracing::warn!("ledger requester for {} went away", key.user);
                }
            }
        }
    }
}

/// One-shot reconstruction against the configured explorer.
///
/// Only configuration problems are errors; failed queries and bad records show up in
/// the returned status.
pub async fn reconstruct(
    config: &ExplorerConfig,
    contract: Address,
    user: Address,
) -> Result<Reconstruction> {
    let source = EtherscanLogSource::new(config)?;
    ActivityLedger::new(source, NoopLedgerStore)
        .reconstruct(contract, user)
        .await
}

pub async fn build_ledger(
    config: &ExplorerConfig,
    contract: Address,
    user: Address,
) -> Result<Ledger> {
    Ok(reconstruct(config, contract, user).await?.ledger)
}

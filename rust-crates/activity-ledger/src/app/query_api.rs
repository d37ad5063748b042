use crate::{
    app::{
        Reconstruction,
        SnapshotReport,
        ledger_store::AccountKey,
    },
    error::LedgerError,
};
use tokio::sync::oneshot;

pub trait QueryAPI {
    fn query(&mut self) -> impl Future<Output = anyhow::Result<Query>>;
}

pub type Responder<T> = oneshot::Sender<Result<T, LedgerError>>;

#[derive(Debug)]
pub struct AccountQuery<T> {
    pub key: AccountKey,
    pub sender: Responder<T>,
}

#[derive(Debug)]
pub enum Query {
    Snapshot(AccountQuery<SnapshotReport>),
    Ledger(AccountQuery<Reconstruction>),
}

impl Query {
    pub fn snapshot(key: AccountKey, sender: Responder<SnapshotReport>) -> Self {
        Query::Snapshot(AccountQuery { key, sender })
    }

    pub fn ledger(key: AccountKey, sender: Responder<Reconstruction>) -> Self {
        Query::Ledger(AccountQuery { key, sender })
    }
}

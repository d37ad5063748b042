use crate::{
    app::log_source::{
        LogQuery,
        LogSource,
    },
    error::FetchError,
    events::{
        EventKind,
        LogRecord,
    },
};
use alloy_primitives::Address;
use futures::future::join_all;

pub type QueryOutcome = (EventKind, Result<Vec<LogRecord>, FetchError>);

/// Runs one query per tracked event concurrently and waits for all of them.
///
/// Outcomes come back in [`EventKind::ALL`] order; failures are returned, not acted on.
pub async fn fetch_all<S: LogSource>(
    source: &S,
    contract: Address,
    user: Address,
    from_block: u64,
) -> Vec<QueryOutcome> {
    let queries: Vec<(EventKind, LogQuery)> = EventKind::ALL
        .iter()
        .map(|kind| {
            (
                *kind,
                LogQuery::new(contract, kind.topic0(), user, from_block),
            )
        })
        .collect();
    let fetches = queries.iter().map(|(kind, query)| async move {
        let outcome = source.fetch_logs(query).await;
        match &outcome {
            Ok(records) => {
                tracing::debug!("{kind}: fetched {} logs", records.len())
            }
            Err(e) => tracing::warn!("{kind}: log query failed: {e}"),
        }
        (*kind, outcome)
    });
    join_all(fetches).await
}

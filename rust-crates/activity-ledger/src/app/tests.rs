#![allow(non_snake_case)]

use super::*;
use crate::{
    app::{
        in_memory_ledger_store::InMemoryLedgerStore,
        log_source::LogQuery,
    },
    decode::DecodeError,
    error::FetchError,
    events::{
        EntryKind,
        LogRecord,
    },
};
use alloy_primitives::{
    B256,
    U256,
    address,
};
use std::{
    collections::{
        HashMap,
        HashSet,
    },
    future::pending,
    sync::{
        Arc,
        Mutex,
    },
};
use tokio::sync::{
    mpsc,
    oneshot,
};

const CONTRACT: Address = address!("00000000000000000000000000000000000000c0");
const USER: Address = address!("00000000000000000000000000000000000000aa");

#[derive(Clone, Default)]
struct FakeLogSource {
    logs: Arc<Mutex<HashMap<B256, Vec<LogRecord>>>>,
    failing: Arc<Mutex<HashSet<B256>>>,
    seen: Arc<Mutex<Vec<(EventKind, u64)>>>,
}

impl FakeLogSource {
    fn new() -> Self {
        Self::default()
    }

    fn push(&self, kind: EventKind, record: LogRecord) {
        self.logs
            .lock()
            .unwrap()
            .entry(kind.topic0())
            .or_default()
            .push(record);
    }

    fn fail(&self, kind: EventKind) {
        self.failing.lock().unwrap().insert(kind.topic0());
    }

    fn recover(&self, kind: EventKind) {
        self.failing.lock().unwrap().remove(&kind.topic0());
    }

    fn from_blocks(&self) -> Vec<u64> {
        let mut seen = self.seen.lock().unwrap().clone();
        seen.sort();
        seen.into_iter().map(|(_, from)| from).collect()
    }
}

impl LogSource for FakeLogSource {
    async fn fetch_logs(
        &self,
        query: &LogQuery,
    ) -> std::result::Result<Vec<LogRecord>, FetchError> {
        let kind = EventKind::ALL
            .into_iter()
            .find(|kind| kind.topic0() == query.topic0)
            .unwrap();
        self.seen.lock().unwrap().push((kind, query.from_block));
        if self.failing.lock().unwrap().contains(&query.topic0) {
            return Err(FetchError::Api {
                status: "0".to_string(),
                message: "NOTOK".to_string(),
            });
        }
        let logs = self.logs.lock().unwrap();
        Ok(logs
            .get(&query.topic0)
            .map(|records| {
                records
                    .iter()
                    .filter(|r| r.block_number >= query.from_block)
                    .cloned()
                    .collect()
            })
            .unwrap_or_default())
    }
}

struct FakeQueryApi {
    recv: mpsc::Receiver<Query>,
}

impl FakeQueryApi {
    fn new_with_sender() -> (Self, mpsc::Sender<Query>) {
        let (send, recv) = mpsc::channel(10);
        (FakeQueryApi { recv }, send)
    }
}

impl QueryAPI for FakeQueryApi {
    async fn query(&mut self) -> anyhow::Result<Query> {
        self.recv
            .recv()
            .await
            .ok_or_else(|| anyhow::anyhow!("no more queries"))
    }
}

fn word(value: u64) -> String {
    format!("{value:064x}")
}

fn signed_word(value: i64) -> String {
    let fill = if value < 0 { "f" } else { "0" };
    format!("{}{:016x}", fill.repeat(48), value)
}

fn log(kind: EventKind, block: u64, tx_index: u64, data: String) -> LogRecord {
    LogRecord {
        block_number: block,
        transaction_index: tx_index,
        log_index: 0,
        transaction_hash: B256::with_last_byte(block as u8),
        data,
        topics: vec![kind.topic0(), USER.into_word()],
        timestamp: None,
    }
}

fn checkin_log(block: u64) -> LogRecord {
    log(EventKind::CheckInCompleted, block, 0, "0x".to_string())
}

fn buy_races_log(block: u64, count: u64) -> LogRecord {
    log(
        EventKind::RaceBoughtWithGm,
        block,
        0,
        format!("0x{}", word(count)),
    )
}

fn race_log(block: u64, slot: u64, gm_delta: i64, prize_wei: u64) -> LogRecord {
    log(
        EventKind::RaceOutcome,
        block,
        0,
        format!(
            "0x{}{}{}",
            word(slot),
            word(prize_wei),
            signed_word(gm_delta)
        ),
    )
}

fn seeded_source() -> FakeLogSource {
    let source = FakeLogSource::new();
    source.push(EventKind::CheckInCompleted, checkin_log(10));
    source.push(EventKind::RaceBoughtWithGm, buy_races_log(11, 2));
    source.push(EventKind::RaceOutcome, race_log(12, 0, -10, 0));
    source.push(EventKind::RaceOutcome, race_log(13, 1, 5, 0));
    source
}

#[tokio::test]
async fn reconstruct__checkin_buy_and_two_races__produces_expected_snapshot() {
    // given
    let app = ActivityLedger::new(seeded_source(), NoopLedgerStore);

    // when
    let reconstruction = app.reconstruct(CONTRACT, USER).await.unwrap();

    // then
    assert_eq!(reconstruction.status, ReconstructionStatus::Complete);
    let kinds: Vec<EventKind> = reconstruction
        .ledger
        .iter()
        .map(|e| e.event_kind())
        .collect();
    assert_eq!(
        kinds,
        vec![
            EventKind::CheckInCompleted,
            EventKind::RaceBoughtWithGm,
            EventKind::RaceOutcome,
            EventKind::RaceOutcome,
        ]
    );
    let snapshot = compute_snapshot(&reconstruction.ledger);
    assert_eq!(snapshot.checkins, 1);
    assert_eq!(snapshot.races_bought, 2);
    assert_eq!(snapshot.races_done, 2);
    assert_eq!(snapshot.available_races, 1);
    assert_eq!(snapshot.gm_estimated, 0);
    assert_eq!(snapshot.pending_eth, "0.11");
    assert_eq!(snapshot.last_slot, Some(1));
}

#[tokio::test]
async fn reconstruct__repeated__is_identical() {
    let app = ActivityLedger::new(seeded_source(), NoopLedgerStore);

    let first = app.reconstruct(CONTRACT, USER).await.unwrap();
    let second = app.reconstruct(CONTRACT, USER).await.unwrap();

    assert_eq!(first, second);
    assert_eq!(
        serde_json::to_vec(&compute_snapshot(&first.ledger)).unwrap(),
        serde_json::to_vec(&compute_snapshot(&second.ledger)).unwrap()
    );
}

#[tokio::test]
async fn reconstruct__no_logs__is_complete_and_empty() {
    let app = ActivityLedger::new(FakeLogSource::new(), NoopLedgerStore);

    let reconstruction = app.reconstruct(CONTRACT, USER).await.unwrap();

    assert!(reconstruction.ledger.is_empty());
    assert_eq!(reconstruction.status, ReconstructionStatus::Complete);
    assert_eq!(compute_snapshot(&reconstruction.ledger), Snapshot::empty());
}

#[tokio::test]
async fn reconstruct__failed_query__counts_as_empty_and_is_degraded() {
    // given
    let source = seeded_source();
    source.fail(EventKind::RaceOutcome);
    let app = ActivityLedger::new(source, NoopLedgerStore);

    // when
    let reconstruction = app.reconstruct(CONTRACT, USER).await.unwrap();

    // then
    assert_eq!(reconstruction.ledger.len(), 2);
    assert_eq!(
        reconstruction.status,
        ReconstructionStatus::Degraded {
            failed_queries: vec![EventKind::RaceOutcome],
            dropped_records: 0,
        }
    );
}

#[tokio::test]
async fn reconstruct__strict_policy__failed_query_is_error() {
    let source = seeded_source();
    source.fail(EventKind::GmTokensBought);
    let app = ActivityLedger::new(source, NoopLedgerStore).with_policy(FailurePolicy::Strict);

    let result = app.reconstruct(CONTRACT, USER).await;

    assert!(matches!(
        result,
        Err(LedgerError::Fetch {
            kind: EventKind::GmTokensBought,
            ..
        })
    ));
}

#[tokio::test]
async fn reconstruct__truncated_race__is_dropped_and_rest_still_counts() {
    // given
    let source = seeded_source();
    source.push(
        EventKind::RaceOutcome,
        log(EventKind::RaceOutcome, 14, 0, format!("0x{}", word(0))),
    );
    let app = ActivityLedger::new(source, NoopLedgerStore);

    // when
    let reconstruction = app.reconstruct(CONTRACT, USER).await.unwrap();

    // then
    assert_eq!(
        reconstruction.status,
        ReconstructionStatus::Degraded {
            failed_queries: vec![],
            dropped_records: 1,
        }
    );
    let snapshot = compute_snapshot(&reconstruction.ledger);
    assert_eq!(snapshot.races_done, 2);
    assert_eq!(snapshot.pending_eth, "0.11");
    assert_eq!(snapshot.last_slot, Some(1));
}

#[tokio::test]
async fn reconstruct__strict_policy__truncated_race_is_decode_error() {
    let source = FakeLogSource::new();
    source.push(
        EventKind::RaceOutcome,
        log(EventKind::RaceOutcome, 14, 0, format!("0x{}", word(0))),
    );
    let app = ActivityLedger::new(source, NoopLedgerStore).with_policy(FailurePolicy::Strict);

    let result = app.reconstruct(CONTRACT, USER).await;

    assert!(matches!(
        result,
        Err(LedgerError::Decode(DecodeError::Truncated { .. }))
    ));
}

#[tokio::test]
async fn reconstruct__same_transaction_events__keep_receipt_order() {
    // given
    let source = FakeLogSource::new();
    let mut race = race_log(20, 3, 1, 0);
    race.log_index = 0;
    let mut buy = buy_races_log(20, 1);
    buy.log_index = 1;
    source.push(EventKind::RaceOutcome, race);
    source.push(EventKind::RaceBoughtWithGm, buy);
    let app = ActivityLedger::new(source, NoopLedgerStore);

    // when
    let ledger = app.build_ledger(CONTRACT, USER).await.unwrap();

    // then
    let kinds: Vec<EventKind> = ledger.iter().map(|e| e.event_kind()).collect();
    assert_eq!(kinds, vec![EventKind::RaceOutcome, EventKind::RaceBoughtWithGm]);
}

#[tokio::test]
async fn refresh__second_call__reads_from_checkpoint_and_merges() {
    // given
    let source = seeded_source();
    let store = InMemoryLedgerStore::new();
    let mut app = ActivityLedger::new(source.clone(), store.clone());
    let first = app.refresh(CONTRACT, USER).await.unwrap();

    // when
    source.push(EventKind::CheckInCompleted, checkin_log(30));
    let second = app.refresh(CONTRACT, USER).await.unwrap();

    // then
    assert_eq!(first.ledger.len(), 4);
    assert_eq!(second.ledger.len(), 5);
    assert_eq!(second.status, ReconstructionStatus::Complete);
    assert_eq!(source.from_blocks(), vec![0, 13, 0, 13, 0, 13, 0, 13, 0, 13]);
    let checkpoint = store.checkpoint(&AccountKey::new(CONTRACT, USER)).unwrap();
    assert_eq!(checkpoint.last_block, 30);
    assert_eq!(checkpoint.ledger, second.ledger);
}

#[tokio::test]
async fn refresh__failed_query__keeps_checkpoint_in_place() {
    // given
    let source = seeded_source();
    let store = InMemoryLedgerStore::new();
    let mut app = ActivityLedger::new(source.clone(), store.clone());
    app.refresh(CONTRACT, USER).await.unwrap();

    // when
    source.fail(EventKind::CheckInCompleted);
    source.push(EventKind::RaceBoughtWithGm, buy_races_log(40, 1));
    let degraded = app.refresh(CONTRACT, USER).await.unwrap();

    // then
    assert!(degraded.status.has_failed_queries());
    let checkpoint = store.checkpoint(&AccountKey::new(CONTRACT, USER)).unwrap();
    assert_eq!(checkpoint.last_block, 13);

    // and the next healthy refresh catches up
    source.recover(EventKind::CheckInCompleted);
    let recovered = app.refresh(CONTRACT, USER).await.unwrap();
    assert_eq!(recovered.status, ReconstructionStatus::Complete);
    assert_eq!(recovered.ledger.len(), 5);
    let checkpoint = store.checkpoint(&AccountKey::new(CONTRACT, USER)).unwrap();
    assert_eq!(checkpoint.last_block, 40);
}

#[tokio::test]
async fn snapshot__matches_fold_of_refreshed_ledger() {
    let mut app = ActivityLedger::new(seeded_source(), InMemoryLedgerStore::new());

    let report = app.snapshot(CONTRACT, USER).await.unwrap();

    assert_eq!(report.snapshot.available_races, 1);
    assert_eq!(report.last_block, Some(13));
    assert!(report.status.is_complete());
}

#[tokio::test]
async fn run__snapshot_query__is_answered() {
    // given
    let (mut api, query_sender) = FakeQueryApi::new_with_sender();
    let mut app = ActivityLedger::new(seeded_source(), NoopLedgerStore);
    let (response_sender, response_receiver) = oneshot::channel();

    // when
    query_sender
        .send(Query::snapshot(
            AccountKey::new(CONTRACT, USER),
            response_sender,
        ))
        .await
        .unwrap();
    let state = app.run(&mut api, pending()).await.unwrap();

    // then
    assert!(matches!(state, RunState::Continue));
    let report = response_receiver.await.unwrap().unwrap();
    assert_eq!(report.snapshot.pending_eth, "0.11");
}

#[tokio::test]
async fn run__ledger_query__is_answered() {
    // given
    let (mut api, query_sender) = FakeQueryApi::new_with_sender();
    let mut app = ActivityLedger::new(seeded_source(), NoopLedgerStore);
    let (response_sender, response_receiver) = oneshot::channel();

    // when
    query_sender
        .send(Query::ledger(AccountKey::new(CONTRACT, USER), response_sender))
        .await
        .unwrap();
    app.run(&mut api, pending()).await.unwrap();

    // then
    let reconstruction = response_receiver.await.unwrap().unwrap();
    let last = reconstruction.ledger.entries().last().unwrap();
    assert_eq!(
        last.kind,
        EntryKind::Race {
            slot: 1,
            gm_delta: 5,
            prize_wei: U256::ZERO,
        }
    );
}

#[tokio::test]
async fn run__interrupt__exits() {
    let (mut api, _query_sender) = FakeQueryApi::new_with_sender();
    let mut app = ActivityLedger::new(FakeLogSource::new(), NoopLedgerStore);

    let state = app.run(&mut api, async {}).await.unwrap();

    assert!(matches!(state, RunState::Exit));
}

#[tokio::test]
async fn build_ledger__missing_api_key__is_config_error() {
    let config = ExplorerConfig::default();

    let result = build_ledger(&config, CONTRACT, USER).await;

    assert!(matches!(
        result,
        Err(LedgerError::Config(explorer_config::ConfigError::MissingApiKey))
    ));
}

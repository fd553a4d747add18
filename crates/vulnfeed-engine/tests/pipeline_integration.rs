//! Integration tests for the runner: checkpoint handling, partial failures,
//! cancellation and both ingestion paths, driven by in-memory fakes.

use std::collections::BTreeSet;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{mpsc as std_mpsc, Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use futures::stream::{self, StreamExt};
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use vulnfeed_engine::config::types::{CheckpointBackend, ConvertErrorPolicy, EmitMode, OutputKind};
use vulnfeed_engine::config::{parser, validator};
use vulnfeed_engine::{
    ExecutionOptions, Ingest, PipelineError, RunState, Runner, Sink, VecSink,
};
use vulnfeed_sdk::capability::{Convertible, Decoder, Fetcher, VendorStream};
use vulnfeed_sdk::decode::JsonMapDecoder;
use vulnfeed_state::{CheckpointStore, SqliteCheckpointStore, StateError};
use vulnfeed_types::error::{ConvertError, FetchError, SinkError};
use vulnfeed_types::nvd::CveItem;
use vulnfeed_types::state::{Checkpoint, FeedId};

// ---------------------------------------------------------------------------
// Fakes
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
struct FakeRecord {
    id: String,
    #[serde(default)]
    broken: bool,
}

impl FakeRecord {
    fn ok(id: &str) -> Self {
        Self {
            id: id.to_string(),
            broken: false,
        }
    }

    fn broken(id: &str) -> Self {
        Self {
            id: id.to_string(),
            broken: true,
        }
    }
}

impl Convertible for FakeRecord {
    fn convert(&self) -> Result<CveItem, ConvertError> {
        if self.broken {
            return Err(ConvertError::invalid("released", "never", "not a date"));
        }
        Ok(CveItem::new(self.id.clone()))
    }

    fn record_id(&self) -> Option<String> {
        Some(self.id.clone())
    }
}

#[derive(Default)]
struct FakeFetcher {
    records: Vec<FakeRecord>,
    /// Yield this error after all records.
    trailing_error: Option<fn() -> FetchError>,
    setup_error: bool,
    /// Never end the stream.
    endless: bool,
    seen_since: Mutex<Vec<Checkpoint>>,
}

impl FakeFetcher {
    fn with_records(records: Vec<FakeRecord>) -> Self {
        Self {
            records,
            ..Self::default()
        }
    }

    fn seen_since(&self) -> Vec<Checkpoint> {
        self.seen_since.lock().unwrap().clone()
    }
}

#[async_trait]
impl Fetcher for FakeFetcher {
    type Record = FakeRecord;

    async fn fetch_since(
        &self,
        _cancel: CancellationToken,
        since: Checkpoint,
    ) -> Result<VendorStream<FakeRecord>, FetchError> {
        self.seen_since.lock().unwrap().push(since);
        if self.setup_error {
            return Err(FetchError::Setup(
                "please set FLEXERA_TOKEN in environment".into(),
            ));
        }
        if self.endless {
            let endless = stream::unfold(0u64, |n| async move {
                tokio::task::yield_now().await;
                Some((Ok(FakeRecord::ok(&format!("SA{n}"))), n + 1))
            });
            return Ok(endless.boxed());
        }
        let mut items: Vec<Result<FakeRecord, FetchError>> =
            self.records.iter().cloned().map(Ok).collect();
        if let Some(make_err) = self.trailing_error {
            items.push(Err(make_err()));
        }
        Ok(stream::iter(items).boxed())
    }
}

/// Cancels the run after `after` writes.
struct CancellingSink {
    inner: VecSink,
    cancel: CancellationToken,
    after: usize,
    written: usize,
}

impl Sink for CancellingSink {
    fn write(&mut self, item: CveItem) -> Result<(), SinkError> {
        self.written += 1;
        if self.written == self.after {
            self.cancel.cancel();
        }
        self.inner.write(item)
    }

    fn finish(&mut self) -> Result<(), SinkError> {
        self.inner.finish()
    }
}

struct FailingSink;

impl Sink for FailingSink {
    fn write(&mut self, _item: CveItem) -> Result<(), SinkError> {
        Err(SinkError::Io(std::io::Error::new(
            std::io::ErrorKind::BrokenPipe,
            "broken pipe",
        )))
    }

    fn finish(&mut self) -> Result<(), SinkError> {
        Ok(())
    }
}

/// Endless-looking feed of `total` records that counts how many were pulled.
struct CountingFetcher {
    total: u64,
    pulled: Arc<AtomicU64>,
}

#[async_trait]
impl Fetcher for CountingFetcher {
    type Record = FakeRecord;

    async fn fetch_since(
        &self,
        _cancel: CancellationToken,
        _since: Checkpoint,
    ) -> Result<VendorStream<FakeRecord>, FetchError> {
        let pulled = self.pulled.clone();
        let total = self.total;
        let records = stream::unfold(0u64, move |n| {
            let pulled = pulled.clone();
            async move {
                if n == total {
                    return None;
                }
                pulled.fetch_add(1, Ordering::SeqCst);
                Some((Ok(FakeRecord::ok(&format!("SA{n}"))), n + 1))
            }
        });
        Ok(records.boxed())
    }
}

/// Blocks inside its first write until the gate opens.
struct GatedSink {
    inner: VecSink,
    entered: Arc<AtomicBool>,
    gate: Option<std_mpsc::Receiver<()>>,
}

impl Sink for GatedSink {
    fn write(&mut self, item: CveItem) -> Result<(), SinkError> {
        if let Some(gate) = self.gate.take() {
            self.entered.store(true, Ordering::SeqCst);
            let _ = gate.recv();
        }
        self.inner.write(item)
    }

    fn finish(&mut self) -> Result<(), SinkError> {
        self.inner.finish()
    }
}

/// Loads fine, never saves.
struct ReadOnlyStore;

impl CheckpointStore for ReadOnlyStore {
    fn load(&self, _feed: &FeedId) -> Result<Option<Checkpoint>, StateError> {
        Ok(None)
    }

    fn save(&self, _feed: &FeedId, _checkpoint: Checkpoint) -> Result<(), StateError> {
        Err(StateError::LockPoisoned)
    }
}

struct BrokenStore;

impl CheckpointStore for BrokenStore {
    fn load(&self, _feed: &FeedId) -> Result<Option<Checkpoint>, StateError> {
        Err(StateError::LockPoisoned)
    }

    fn save(&self, _feed: &FeedId, _checkpoint: Checkpoint) -> Result<(), StateError> {
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn feed() -> FeedId {
    FeedId::new("flexera_test")
}

fn store() -> Arc<SqliteCheckpointStore> {
    Arc::new(SqliteCheckpointStore::in_memory().expect("in-memory store"))
}

fn runner(store: &Arc<SqliteCheckpointStore>, options: ExecutionOptions) -> Runner {
    Runner::new(feed(), options).with_store(store.clone() as Arc<dyn CheckpointStore>)
}

fn options(emit_mode: EmitMode, policy: ConvertErrorPolicy) -> ExecutionOptions {
    ExecutionOptions {
        emit_mode,
        on_convert_error: policy,
        queue_capacity: 2,
        ..ExecutionOptions::default()
    }
}

fn ids(sink: &VecSink) -> BTreeSet<String> {
    sink.items().iter().map(|i| i.id().to_string()).collect()
}

fn incremental(fetcher: &Arc<FakeFetcher>) -> Ingest<FakeRecord> {
    Ingest::Incremental(fetcher.clone() as Arc<dyn Fetcher<Record = FakeRecord>>)
}

fn snapshot(json: &'static str) -> Ingest<FakeRecord> {
    Ingest::Snapshot {
        decoder: Arc::new(JsonMapDecoder::<FakeRecord>::new())
            as Arc<dyn Decoder<Record = FakeRecord>>,
        input: Box::new(json.as_bytes()),
    }
}

// ---------------------------------------------------------------------------
// Incremental path
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_run_emits_all_and_advances_checkpoint() {
    let store = store();
    let fetcher = Arc::new(FakeFetcher::with_records(vec![
        FakeRecord::ok("SA1"),
        FakeRecord::ok("SA2"),
        FakeRecord::ok("SA3"),
    ]));
    let sink = VecSink::new();

    let result = runner(&store, ExecutionOptions::default())
        .run(
            incremental(&fetcher),
            Box::new(sink.clone()),
            CancellationToken::new(),
        )
        .await;

    assert!(result.is_success(), "error: {:?}", result.error);
    assert_eq!(result.state, RunState::Done);
    assert_eq!(result.since, Checkpoint::EPOCH);
    assert_eq!(fetcher.seen_since(), vec![Checkpoint::EPOCH]);
    assert_eq!(result.counts.fetched, 3);
    assert_eq!(result.counts.converted, 3);
    assert_eq!(result.counts.emitted, 3);
    assert_eq!(result.counts.skipped, 0);
    assert_eq!(ids(&sink), BTreeSet::from(["SA1".into(), "SA2".into(), "SA3".into()]));
    assert!(sink.is_finished());

    let expected = Checkpoint::from(result.started_at);
    assert_eq!(result.checkpoint, Some(expected));
    assert_eq!(store.load(&feed()).unwrap(), Some(expected));
}

#[tokio::test]
async fn test_second_run_starts_from_stored_checkpoint() {
    let store = store();
    let stored = Checkpoint::from_unix_secs(1_600_000_000);
    store.save(&feed(), stored).unwrap();
    let fetcher = Arc::new(FakeFetcher::with_records(vec![FakeRecord::ok("SA1")]));

    let result = runner(&store, ExecutionOptions::default())
        .run(
            incremental(&fetcher),
            Box::new(VecSink::new()),
            CancellationToken::new(),
        )
        .await;

    assert!(result.is_success());
    assert_eq!(fetcher.seen_since(), vec![stored]);
    let advanced = store.load(&feed()).unwrap().unwrap();
    assert!(advanced >= stored);
}

#[tokio::test]
async fn test_checkpoint_is_monotonic_across_runs() {
    let store = store();
    let future = Checkpoint::from(chrono::Utc::now() + chrono::Duration::days(1));
    store.save(&feed(), future).unwrap();
    let fetcher = Arc::new(FakeFetcher::default());

    let result = runner(&store, ExecutionOptions::default())
        .run(
            incremental(&fetcher),
            Box::new(VecSink::new()),
            CancellationToken::new(),
        )
        .await;

    assert!(result.is_success());
    assert_eq!(store.load(&feed()).unwrap(), Some(future));
}

#[tokio::test]
async fn test_since_override_ignores_stored_checkpoint() {
    let store = store();
    store
        .save(&feed(), Checkpoint::from_unix_secs(1_600_000_000))
        .unwrap();
    let fetcher = Arc::new(FakeFetcher::default());
    let override_since = Checkpoint::from_unix_secs(1_000);

    let result = runner(
        &store,
        ExecutionOptions::default().with_since(Some(override_since)),
    )
    .run(
        incremental(&fetcher),
        Box::new(VecSink::new()),
        CancellationToken::new(),
    )
    .await;

    assert!(result.is_success());
    assert_eq!(result.since, override_since);
    assert_eq!(fetcher.seen_since(), vec![override_since]);
}

#[tokio::test]
async fn test_empty_feed_succeeds_and_advances() {
    let store = store();
    let fetcher = Arc::new(FakeFetcher::default());
    let sink = VecSink::new();

    let result = runner(&store, ExecutionOptions::default())
        .run(
            incremental(&fetcher),
            Box::new(sink.clone()),
            CancellationToken::new(),
        )
        .await;

    assert!(result.is_success());
    assert_eq!(result.counts.fetched, 0);
    assert!(sink.items().is_empty());
    assert!(sink.is_finished());
    assert_eq!(
        store.load(&feed()).unwrap(),
        Some(Checkpoint::from(result.started_at))
    );
}

#[tokio::test]
async fn test_single_bad_record_is_skipped() {
    for mode in [EmitMode::Queued, EmitMode::Inline] {
        let store = store();
        let fetcher = Arc::new(FakeFetcher::with_records(vec![
            FakeRecord::ok("SA1"),
            FakeRecord::broken("SA2"),
            FakeRecord::ok("SA3"),
        ]));
        let sink = VecSink::new();

        let result = runner(&store, options(mode, ConvertErrorPolicy::Skip))
            .run(
                incremental(&fetcher),
                Box::new(sink.clone()),
                CancellationToken::new(),
            )
            .await;

        assert!(result.is_success(), "{mode:?}: {:?}", result.error);
        assert_eq!(result.counts.fetched, 3);
        assert_eq!(result.counts.converted, 2);
        assert_eq!(result.counts.skipped, 1);
        assert_eq!(ids(&sink), BTreeSet::from(["SA1".into(), "SA3".into()]));
        assert!(store.load(&feed()).unwrap().is_some());
    }
}

#[tokio::test]
async fn test_fail_policy_stops_run_without_checkpoint() {
    for mode in [EmitMode::Queued, EmitMode::Inline] {
        let store = store();
        let fetcher = Arc::new(FakeFetcher::with_records(vec![
            FakeRecord::ok("SA1"),
            FakeRecord::broken("SA2"),
            FakeRecord::ok("SA3"),
        ]));
        let sink = VecSink::new();

        let result = runner(&store, options(mode, ConvertErrorPolicy::Fail))
            .run(
                incremental(&fetcher),
                Box::new(sink.clone()),
                CancellationToken::new(),
            )
            .await;

        assert_eq!(result.state, RunState::Failed);
        match result.error {
            Some(PipelineError::Convert { ref record_id, .. }) => {
                assert_eq!(record_id.as_deref(), Some("SA2"));
            }
            ref other => panic!("{mode:?}: unexpected error {other:?}"),
        }
        assert!(result.checkpoint.is_none());
        assert_eq!(store.load(&feed()).unwrap(), None);
        assert!(sink.is_finished());
    }
}

#[tokio::test]
async fn test_stream_error_fails_without_checkpoint() {
    let store = store();
    let fetcher = Arc::new(FakeFetcher {
        records: vec![FakeRecord::ok("SA1"), FakeRecord::ok("SA2")],
        trailing_error: Some(|| FetchError::Status {
            status: 502,
            url: "https://api.example.com/api/advisories/".into(),
            retry_after_secs: None,
        }),
        ..FakeFetcher::default()
    });
    let sink = VecSink::new();

    let result = runner(&store, ExecutionOptions::default())
        .run(
            incremental(&fetcher),
            Box::new(sink.clone()),
            CancellationToken::new(),
        )
        .await;

    assert_eq!(result.state, RunState::Failed);
    assert_eq!(result.failed_in, Some(RunState::Emitting));
    assert!(matches!(result.error, Some(PipelineError::Fetch(_))));
    assert_eq!(result.counts.fetched, 2);
    assert_eq!(store.load(&feed()).unwrap(), None);
    assert!(sink.is_finished(), "sink must be closed on failure");
}

#[tokio::test]
async fn test_setup_error_fails_before_ingest() {
    let store = store();
    let fetcher = Arc::new(FakeFetcher {
        setup_error: true,
        ..FakeFetcher::default()
    });

    let result = runner(&store, ExecutionOptions::default())
        .run(
            incremental(&fetcher),
            Box::new(VecSink::new()),
            CancellationToken::new(),
        )
        .await;

    assert_eq!(result.state, RunState::Failed);
    assert_eq!(
        result.failed_in,
        Some(RunState::LoadingCheckpoint),
        "setup errors stop before ingestion starts"
    );
    let err = result.error.expect("setup error");
    assert!(matches!(err, PipelineError::Setup(_)));
    assert!(err.to_string().contains("FLEXERA_TOKEN"));
    assert_eq!(result.counts.fetched, 0);
    assert_eq!(store.load(&feed()).unwrap(), None);
}

#[tokio::test]
async fn test_checkpoint_load_failure_fails_run() {
    let fetcher = Arc::new(FakeFetcher::with_records(vec![FakeRecord::ok("SA1")]));
    let result = Runner::new(feed(), ExecutionOptions::default())
        .with_store(Arc::new(BrokenStore))
        .run(
            incremental(&fetcher),
            Box::new(VecSink::new()),
            CancellationToken::new(),
        )
        .await;

    assert!(matches!(result.error, Some(PipelineError::CheckpointLoad(_))));
    assert!(fetcher.seen_since().is_empty(), "no fetch after load failure");
}

#[tokio::test]
async fn test_checkpoint_save_failure_keeps_output() {
    let fetcher = Arc::new(FakeFetcher::with_records(vec![FakeRecord::ok("SA1")]));
    let sink = VecSink::new();
    let result = Runner::new(feed(), ExecutionOptions::default())
        .with_store(Arc::new(ReadOnlyStore))
        .run(
            incremental(&fetcher),
            Box::new(sink.clone()),
            CancellationToken::new(),
        )
        .await;

    assert_eq!(result.state, RunState::Failed);
    assert_eq!(result.failed_in, Some(RunState::PersistingCheckpoint));
    let err = result.error.expect("save error");
    assert!(matches!(err, PipelineError::CheckpointSave(_)));
    assert!(err.output_delivered());
    assert_eq!(result.counts.emitted, 1);
    assert_eq!(sink.items().len(), 1);
}

#[tokio::test]
async fn test_sink_failure_fails_run() {
    let store = store();
    let fetcher = Arc::new(FakeFetcher::with_records(vec![
        FakeRecord::ok("SA1"),
        FakeRecord::ok("SA2"),
        FakeRecord::ok("SA3"),
        FakeRecord::ok("SA4"),
    ]));

    let result = runner(&store, options(EmitMode::Queued, ConvertErrorPolicy::Skip))
        .run(
            incremental(&fetcher),
            Box::new(FailingSink),
            CancellationToken::new(),
        )
        .await;

    assert!(matches!(result.error, Some(PipelineError::Sink(_))));
    assert_eq!(store.load(&feed()).unwrap(), None);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_cancellation_halts_run_and_keeps_checkpoint() {
    for mode in [EmitMode::Queued, EmitMode::Inline] {
        let store = store();
        let fetcher = Arc::new(FakeFetcher {
            endless: true,
            ..FakeFetcher::default()
        });
        let cancel = CancellationToken::new();
        let collected = VecSink::new();
        let sink = CancellingSink {
            inner: collected.clone(),
            cancel: cancel.clone(),
            after: 5,
            written: 0,
        };

        let result = tokio::time::timeout(
            std::time::Duration::from_secs(10),
            runner(&store, options(mode, ConvertErrorPolicy::Skip)).run(
                incremental(&fetcher),
                Box::new(sink),
                cancel,
            ),
        )
        .await
        .expect("cancelled run must finish promptly");

        assert_eq!(result.state, RunState::Failed, "{mode:?}");
        assert!(matches!(result.error, Some(PipelineError::Cancelled)));
        assert!(result.checkpoint.is_none());
        assert_eq!(store.load(&feed()).unwrap(), None);
        assert!(collected.items().len() >= 5);
        assert!(collected.is_finished());
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_slow_sink_stalls_fetcher() {
    const CAPACITY: usize = 4;
    let pulled = Arc::new(AtomicU64::new(0));
    let fetcher = Arc::new(CountingFetcher {
        total: 1_000,
        pulled: pulled.clone(),
    });
    let entered = Arc::new(AtomicBool::new(false));
    let (release, gate) = std_mpsc::channel();
    let collected = VecSink::new();
    let sink = GatedSink {
        inner: collected.clone(),
        entered: entered.clone(),
        gate: Some(gate),
    };
    let options = ExecutionOptions {
        emit_mode: EmitMode::Queued,
        queue_capacity: CAPACITY,
        ..ExecutionOptions::default()
    };
    let runner = Runner::new(feed(), options);

    let control = async {
        while !entered.load(Ordering::SeqCst) {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        // Give ingestion time to fill the queue and park on it.
        tokio::time::sleep(Duration::from_millis(200)).await;
        let stalled_at = pulled.load(Ordering::SeqCst);
        release.send(()).unwrap();
        stalled_at
    };
    let run = runner.run(
        Ingest::Incremental(fetcher as Arc<dyn Fetcher<Record = FakeRecord>>),
        Box::new(sink),
        CancellationToken::new(),
    );

    let (result, stalled_at) = tokio::time::timeout(
        Duration::from_secs(30),
        async { tokio::join!(run, control) },
    )
    .await
    .expect("run must finish once the sink is released");

    assert!(
        stalled_at <= CAPACITY as u64 + 2,
        "fetcher pulled {stalled_at} records while the sink was blocked"
    );
    assert!(result.is_success(), "error: {:?}", result.error);
    assert_eq!(result.counts.fetched, 1_000);
    assert_eq!(result.counts.emitted, 1_000);
    assert_eq!(collected.items().len(), 1_000);
}

#[tokio::test]
async fn test_same_checkpoint_yields_same_records() {
    let records = vec![
        FakeRecord::ok("SA1"),
        FakeRecord::broken("SA2"),
        FakeRecord::ok("SA3"),
    ];
    let since = Checkpoint::from_unix_secs(1_700_000_000);
    let mut outputs = Vec::new();
    for _ in 0..2 {
        let fetcher = Arc::new(FakeFetcher::with_records(records.clone()));
        let sink = VecSink::new();
        let result = Runner::new(feed(), ExecutionOptions::default().with_since(Some(since)))
            .run(
                incremental(&fetcher),
                Box::new(sink.clone()),
                CancellationToken::new(),
            )
            .await;
        assert!(result.is_success());
        let mut items = sink.items();
        items.sort_by(|a, b| a.id().cmp(b.id()));
        outputs.push(items);
    }
    assert_eq!(outputs[0], outputs[1]);
}

// ---------------------------------------------------------------------------
// Snapshot path
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_snapshot_yields_exactly_two_records() {
    let store = store();
    let sink = VecSink::new();
    let result = runner(&store, ExecutionOptions::default())
        .run(
            snapshot(r#"{"CVE-A": {"id": "CVE-A"}, "CVE-B": {"id": "CVE-B"}}"#),
            Box::new(sink.clone()),
            CancellationToken::new(),
        )
        .await;

    assert!(result.is_success(), "error: {:?}", result.error);
    assert_eq!(result.counts.fetched, 2);
    assert_eq!(ids(&sink), BTreeSet::from(["CVE-A".into(), "CVE-B".into()]));
    assert!(result.checkpoint.is_none(), "snapshots never advance");
    assert_eq!(store.load(&feed()).unwrap(), None);
}

#[tokio::test]
async fn test_snapshot_never_reads_checkpoint_store() {
    let sink = VecSink::new();
    let result = Runner::new(feed(), ExecutionOptions::default())
        .with_store(Arc::new(BrokenStore))
        .run(
            snapshot(r#"{"CVE-A": {"id": "CVE-A"}}"#),
            Box::new(sink.clone()),
            CancellationToken::new(),
        )
        .await;

    assert!(result.is_success(), "error: {:?}", result.error);
    assert_eq!(result.since, Checkpoint::EPOCH);
    assert!(result.checkpoint.is_none());
    assert_eq!(sink.items().len(), 1);
}

#[tokio::test]
async fn test_truncated_snapshot_is_fatal() {
    let sink = VecSink::new();
    let result = Runner::new(feed(), ExecutionOptions::default())
        .run(
            snapshot(r#"{"CVE-A": {"id": "CVE-A"}, "CVE-B": {"id""#),
            Box::new(sink.clone()),
            CancellationToken::new(),
        )
        .await;

    assert_eq!(result.state, RunState::Failed);
    assert!(matches!(result.error, Some(PipelineError::Decode(_))));
    assert!(sink.items().is_empty());
    assert_eq!(result.counts.emitted, 0);
}

// ---------------------------------------------------------------------------
// Download
// ---------------------------------------------------------------------------

/// `Write` handle over a shared buffer.
#[derive(Clone, Default)]
struct SharedBuf(Arc<Mutex<Vec<u8>>>);

impl std::io::Write for SharedBuf {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

#[tokio::test]
async fn test_download_writes_decodable_snapshot() {
    let store = store();
    store
        .save(&feed(), Checkpoint::from_unix_secs(1_600_000_000))
        .unwrap();
    let fetcher = Arc::new(FakeFetcher::with_records(vec![
        FakeRecord::ok("SA1"),
        FakeRecord::broken("SA2"),
    ]));
    let buf = SharedBuf::default();

    let summary = runner(&store, ExecutionOptions::default())
        .download(
            fetcher.clone() as Arc<dyn Fetcher<Record = FakeRecord>>,
            Box::new(buf.clone()),
            CancellationToken::new(),
        )
        .await
        .unwrap();

    assert_eq!(summary.records, 2);
    assert_eq!(summary.since, Checkpoint::from_unix_secs(1_600_000_000));
    // Download never advances the checkpoint.
    assert_eq!(
        store.load(&feed()).unwrap(),
        Some(Checkpoint::from_unix_secs(1_600_000_000))
    );

    let bytes = buf.0.lock().unwrap().clone();
    let decoded = JsonMapDecoder::<FakeRecord>::new()
        .decode(&mut bytes.as_slice())
        .unwrap();
    assert_eq!(decoded.len(), 2);
    assert!(decoded.iter().any(|r| r.id == "SA2" && r.broken));
}

#[tokio::test]
async fn test_failed_download_leaves_readable_partial_snapshot() {
    let fetcher = Arc::new(FakeFetcher {
        records: vec![FakeRecord::ok("SA1"), FakeRecord::ok("SA2")],
        trailing_error: Some(|| FetchError::Status {
            status: 503,
            url: "https://api.example.com/api/advisories/?page=2".into(),
            retry_after_secs: None,
        }),
        ..FakeFetcher::default()
    });
    let buf = SharedBuf::default();

    let err = Runner::new(feed(), ExecutionOptions::default())
        .download(
            fetcher as Arc<dyn Fetcher<Record = FakeRecord>>,
            Box::new(buf.clone()),
            CancellationToken::new(),
        )
        .await
        .unwrap_err();

    assert!(matches!(err, PipelineError::Fetch(_)));
    let bytes = buf.0.lock().unwrap().clone();
    let decoded = JsonMapDecoder::<FakeRecord>::new()
        .decode(&mut bytes.as_slice())
        .expect("partial snapshot must still be a complete document");
    let ids: BTreeSet<_> = decoded.into_iter().map(|r| r.id).collect();
    assert_eq!(ids, BTreeSet::from(["SA1".to_string(), "SA2".to_string()]));
}

// ---------------------------------------------------------------------------
// Config fixtures
// ---------------------------------------------------------------------------

fn fixture(name: &str) -> std::path::PathBuf {
    std::path::Path::new(env!("CARGO_MANIFEST_DIR"))
        .parent()
        .unwrap()
        .parent()
        .unwrap()
        .join("tests/fixtures/pipelines")
        .join(name)
}

#[test]
fn test_parse_and_validate_fixture_pipeline() {
    std::env::set_var("TEST_FEED_NAME", "flexera_fixture");
    std::env::set_var("TEST_FLEXERA_BASE_URL", "https://flexera.example.com");

    let config = parser::parse_pipeline(&fixture("flexera_incremental.yaml"))
        .expect("Failed to parse fixture pipeline");

    assert_eq!(config.feed, "flexera_fixture");
    assert_eq!(config.source.use_ref, "flexera");
    assert_eq!(
        config.source.config["base_url"],
        "https://flexera.example.com"
    );
    assert_eq!(config.output.kind, OutputKind::File);
    assert_eq!(config.checkpoint.backend, CheckpointBackend::Sqlite);
    assert_eq!(config.resources.queue_capacity, 32);
    validator::validate_pipeline(&config).expect("Validation should pass");

    std::env::remove_var("TEST_FEED_NAME");
    std::env::remove_var("TEST_FLEXERA_BASE_URL");
}

#[test]
fn test_parse_invalid_fixture() {
    let err = parser::parse_pipeline(&fixture("invalid_pipeline.yaml"))
        .unwrap_err()
        .to_string();
    assert!(
        err.contains("Failed to parse pipeline YAML"),
        "Expected serde parse error, got: {err}"
    );
}

//! Pipeline orchestrator: checkpoint load, ingest, convert, emit, and
//! checkpoint persist.
//!
//! The incremental path runs two stages joined by a bounded channel: an
//! async ingestion stage pulling from the fetcher, and a blocking emission
//! stage converting records and writing them to the sink. A full queue
//! suspends ingestion, so a slow sink stalls the fetcher instead of growing
//! memory.

use std::io::{Read, Write};
use std::sync::Arc;
use std::time::Instant;

use chrono::{DateTime, Utc};
use futures::stream::{self, StreamExt};
use serde::Serialize;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use vulnfeed_sdk::capability::{Convertible, Decoder, Fetcher, VendorStream};
use vulnfeed_sdk::snapshot::SnapshotWriter;
use vulnfeed_state::CheckpointStore;
use vulnfeed_types::error::FetchError;
use vulnfeed_types::state::{Checkpoint, FeedId};

use crate::checkpoint::{load_checkpoint, next_checkpoint, persist_checkpoint};
use crate::config::types::EmitMode;
use crate::emit::{drain, Emitter};
use crate::errors::PipelineError;
use crate::execution::ExecutionOptions;
use crate::result::{RunCounts, RunResult, RunState};
use crate::sink::Sink;

/// Ingestion path for one run, chosen by adapter configuration.
pub enum Ingest<R> {
    /// Pull records changed since the checkpoint.
    Incremental(Arc<dyn Fetcher<Record = R>>),
    /// Decode a whole vendor snapshot. Never advances the checkpoint.
    Snapshot {
        decoder: Arc<dyn Decoder<Record = R>>,
        input: Box<dyn Read + Send>,
    },
}

impl<R> Ingest<R> {
    fn mode(&self) -> &'static str {
        match self {
            Self::Incremental(_) => "incremental",
            Self::Snapshot { .. } => "snapshot",
        }
    }
}

/// Summary of a raw snapshot download.
#[derive(Debug, Clone, Copy)]
pub struct DownloadSummary {
    pub since: Checkpoint,
    pub records: u64,
    pub duration_secs: f64,
}

/// Tracks and logs run state transitions.
struct StateTracker<'a> {
    feed: &'a FeedId,
    state: RunState,
}

impl<'a> StateTracker<'a> {
    fn new(feed: &'a FeedId) -> Self {
        Self {
            feed,
            state: RunState::Idle,
        }
    }

    fn transition(&mut self, to: RunState) {
        tracing::debug!(
            feed = self.feed.as_str(),
            from = %self.state,
            to = %to,
            "Run state transition"
        );
        self.state = to;
    }

    /// Move to `Failed`, returning the state the run failed in.
    fn fail(&mut self) -> RunState {
        let failed_in = self.state;
        self.transition(RunState::Failed);
        failed_in
    }
}

struct RunClock {
    started_at: DateTime<Utc>,
    timer: Instant,
}

impl RunClock {
    fn start() -> Self {
        Self {
            started_at: Utc::now(),
            timer: Instant::now(),
        }
    }

    fn elapsed_secs(&self) -> f64 {
        self.timer.elapsed().as_secs_f64()
    }
}

/// Outcome of the ingest/emit phase.
struct Emission {
    /// `None` only if the emission task panicked and took the sink with it.
    emitter: Option<Emitter>,
    fetched: u64,
    result: Result<(), PipelineError>,
}

/// Runs pipelines for one feed.
///
/// Callers must not run the same feed concurrently: the checkpoint store
/// assumes a single writer per feed.
pub struct Runner {
    feed: FeedId,
    store: Option<Arc<dyn CheckpointStore>>,
    options: ExecutionOptions,
}

impl Runner {
    #[must_use]
    pub fn new(feed: FeedId, options: ExecutionOptions) -> Self {
        Self {
            feed,
            store: None,
            options,
        }
    }

    /// Attach a checkpoint store. Without one every run starts from the
    /// epoch and nothing is persisted.
    #[must_use]
    pub fn with_store(mut self, store: Arc<dyn CheckpointStore>) -> Self {
        self.store = Some(store);
        self
    }

    #[must_use]
    pub fn feed(&self) -> &FeedId {
        &self.feed
    }

    /// Checkpoint a run would start from right now.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::CheckpointLoad`] if the store can't be read.
    pub async fn resolve_since(&self) -> Result<Checkpoint, PipelineError> {
        if let Some(since) = self.options.since_override {
            return Ok(since);
        }
        match &self.store {
            Some(store) => load_checkpoint(store.clone(), self.feed.clone()).await,
            None => Ok(Checkpoint::EPOCH),
        }
    }

    /// Execute one run. Never panics on pipeline failures: the terminal error,
    /// if any, is carried in [`RunResult::error`].
    ///
    /// `sink.finish()` is called exactly once, on success and failure alike.
    /// The checkpoint advances to the run start time only when an
    /// incremental run completes and the sink confirms delivery.
    pub async fn run<R>(
        &self,
        ingest: Ingest<R>,
        sink: Box<dyn Sink>,
        cancel: CancellationToken,
    ) -> RunResult
    where
        R: Convertible + Send + 'static,
    {
        let clock = RunClock::start();
        let mut tracker = StateTracker::new(&self.feed);
        let mut emitter = Emitter::new(self.feed.clone(), sink, self.options.on_convert_error);

        // 1. Checkpoint. Snapshots ignore it entirely.
        tracker.transition(RunState::LoadingCheckpoint);
        let incremental = matches!(ingest, Ingest::Incremental(_));
        let since = if incremental {
            match self.resolve_since().await {
                Ok(since) => since,
                Err(e) => {
                    return self.failed(&mut tracker, &clock, Some(emitter), Checkpoint::EPOCH, 0, e)
                }
            }
        } else {
            Checkpoint::EPOCH
        };
        tracing::info!(
            feed = self.feed.as_str(),
            since = %since,
            mode = ingest.mode(),
            emit_mode = ?self.options.emit_mode,
            "Starting run"
        );

        // 2. Ingest. A fetcher setup error leaves the run in LoadingCheckpoint;
        // snapshot decoding is itself ingestion.
        if !incremental {
            tracker.transition(RunState::Ingesting);
        }
        let records = match open_stream(ingest, since, &cancel).await {
            Ok(records) => records,
            Err(e) => return self.failed(&mut tracker, &clock, Some(emitter), since, 0, e),
        };
        if incremental {
            tracker.transition(RunState::Ingesting);
        }

        // 3. Convert + emit
        tracker.transition(RunState::Emitting);
        let Emission {
            emitter,
            fetched,
            result,
        } = match self.options.emit_mode {
            EmitMode::Queued => {
                emit_queued(records, emitter, self.options.queue_capacity, &cancel).await
            }
            EmitMode::Inline => {
                let mut fetched = 0;
                let result = emit_inline(records, &mut emitter, &cancel, &mut fetched).await;
                Emission {
                    emitter: Some(emitter),
                    fetched,
                    result,
                }
            }
        };
        if let Err(e) = result {
            return self.failed(&mut tracker, &clock, emitter, since, fetched, e);
        }
        let Some(mut emitter) = emitter else {
            let e = PipelineError::Infrastructure(anyhow::anyhow!("emission stage lost the sink"));
            return self.failed(&mut tracker, &clock, None, since, fetched, e);
        };
        if cancel.is_cancelled() {
            let e = PipelineError::Cancelled;
            return self.failed(&mut tracker, &clock, Some(emitter), since, fetched, e);
        }
        if let Err(e) = emitter.close() {
            let failed_in = tracker.fail();
            return self.report_failure(&clock, failed_in, emitter.counts(), fetched, since, e);
        }
        let counts = RunCounts {
            fetched,
            ..emitter.counts()
        };

        // 4. Checkpoint persist, only after the sink confirmed delivery
        let mut checkpoint = None;
        if let (true, Some(store)) = (incremental, &self.store) {
            tracker.transition(RunState::PersistingCheckpoint);
            let next = next_checkpoint(since, Checkpoint::from(clock.started_at));
            if let Err(e) = persist_checkpoint(store.clone(), self.feed.clone(), next).await {
                let failed_in = tracker.fail();
                tracing::warn!(
                    feed = self.feed.as_str(),
                    "Output delivered but checkpoint not saved; records will be reprocessed"
                );
                return self.report_failure(&clock, failed_in, counts, fetched, since, e);
            }
            checkpoint = Some(next);
        }

        tracker.transition(RunState::Done);
        let duration_secs = clock.elapsed_secs();
        tracing::info!(
            feed = self.feed.as_str(),
            fetched = counts.fetched,
            converted = counts.converted,
            skipped = counts.skipped,
            emitted = counts.emitted,
            duration_secs,
            "Run complete"
        );
        RunResult {
            feed: self.feed.clone(),
            state: RunState::Done,
            counts,
            since,
            started_at: clock.started_at,
            checkpoint,
            duration_secs,
            failed_in: None,
            error: None,
        }
    }

    /// Close the sink (best effort) and build the failed result.
    fn failed(
        &self,
        tracker: &mut StateTracker<'_>,
        clock: &RunClock,
        emitter: Option<Emitter>,
        since: Checkpoint,
        fetched: u64,
        error: PipelineError,
    ) -> RunResult {
        let mut counts = RunCounts::default();
        if let Some(mut emitter) = emitter {
            if let Err(finish_err) = emitter.close() {
                tracing::warn!(
                    feed = self.feed.as_str(),
                    error = %finish_err,
                    "Sink finish failed after run error"
                );
            }
            counts = emitter.counts();
        }
        let failed_in = tracker.fail();
        self.report_failure(clock, failed_in, counts, fetched, since, error)
    }

    fn report_failure(
        &self,
        clock: &RunClock,
        failed_in: RunState,
        counts: RunCounts,
        fetched: u64,
        since: Checkpoint,
        error: PipelineError,
    ) -> RunResult {
        tracing::error!(
            feed = self.feed.as_str(),
            failed_in = %failed_in,
            category = %error.category(),
            error = %error,
            "Run failed"
        );
        RunResult {
            feed: self.feed.clone(),
            state: RunState::Failed,
            counts: RunCounts { fetched, ..counts },
            since,
            started_at: clock.started_at,
            checkpoint: None,
            duration_secs: clock.elapsed_secs(),
            failed_in: Some(failed_in),
            error: Some(error),
        }
    }

    /// Fetch raw vendor records since the checkpoint and write them as a
    /// `{ id: record }` snapshot. The checkpoint is never advanced.
    ///
    /// Records without a vendor id are keyed by their position. If the
    /// stream fails or is cancelled, the document is still closed so the
    /// records written so far remain a readable partial snapshot.
    ///
    /// # Errors
    ///
    /// Returns the setup, transport, output or cancellation error that
    /// stopped the download.
    pub async fn download<R>(
        &self,
        fetcher: Arc<dyn Fetcher<Record = R>>,
        out: Box<dyn Write + Send>,
        cancel: CancellationToken,
    ) -> Result<DownloadSummary, PipelineError>
    where
        R: Convertible + Serialize + Send + 'static,
    {
        let timer = Instant::now();
        let since = self.resolve_since().await?;
        tracing::info!(feed = self.feed.as_str(), since = %since, "Starting download");

        let mut records = fetcher
            .fetch_since(cancel.clone(), since)
            .await
            .map_err(setup_error)?;
        let mut writer = SnapshotWriter::new(out);
        let copied = copy_records(&mut records, &mut writer, &cancel).await;
        let finished = writer.finish().map_err(|e| PipelineError::Sink(e.into()));
        let count = writer.written();
        if let Err(e) = copied {
            if finished.is_ok() {
                tracing::warn!(
                    feed = self.feed.as_str(),
                    records = count,
                    error = %e,
                    "Download stopped early; partial snapshot written"
                );
            }
            return Err(e);
        }
        finished?;

        let duration_secs = timer.elapsed().as_secs_f64();
        tracing::info!(
            feed = self.feed.as_str(),
            records = count,
            duration_secs,
            "Download complete"
        );
        Ok(DownloadSummary {
            since,
            records: count,
            duration_secs,
        })
    }
}

/// Copy the stream into the snapshot until it ends, fails or is cancelled.
async fn copy_records<R, W>(
    records: &mut VendorStream<R>,
    writer: &mut SnapshotWriter<W>,
    cancel: &CancellationToken,
) -> Result<(), PipelineError>
where
    R: Convertible + Serialize + Send + 'static,
    W: Write,
{
    loop {
        let next = tokio::select! {
            biased;
            () = cancel.cancelled() => return Err(PipelineError::Cancelled),
            next = records.next() => next,
        };
        let Some(item) = next else { return Ok(()) };
        let record = item.map_err(PipelineError::from_stream)?;
        let key = record
            .record_id()
            .unwrap_or_else(|| writer.written().to_string());
        writer
            .write(&key, &record)
            .map_err(|e| PipelineError::Sink(e.into()))?;
    }
}

/// `fetch_since` may only fail before I/O, so anything but cancellation is a
/// setup failure.
fn setup_error(e: FetchError) -> PipelineError {
    match e {
        FetchError::Cancelled => PipelineError::Cancelled,
        other => PipelineError::Setup(other),
    }
}

async fn open_stream<R>(
    ingest: Ingest<R>,
    since: Checkpoint,
    cancel: &CancellationToken,
) -> Result<VendorStream<R>, PipelineError>
where
    R: Convertible + Send + 'static,
{
    match ingest {
        Ingest::Incremental(fetcher) => fetcher
            .fetch_since(cancel.clone(), since)
            .await
            .map_err(setup_error),
        Ingest::Snapshot { decoder, mut input } => {
            let records = tokio::task::spawn_blocking(move || decoder.decode(&mut *input))
                .await
                .map_err(|e| {
                    PipelineError::Infrastructure(anyhow::anyhow!(
                        "snapshot decode task panicked: {e}"
                    ))
                })?
                .map_err(PipelineError::Decode)?;
            Ok(stream::iter(records.into_iter().map(Ok)).boxed())
        }
    }
}

/// Wait for the next stream item unless `cancel` fires first.
async fn next_record<R>(
    records: &mut VendorStream<R>,
    cancel: &CancellationToken,
) -> Result<Option<R>, PipelineError> {
    let next = tokio::select! {
        biased;
        () = cancel.cancelled() => return Err(PipelineError::Cancelled),
        next = records.next() => next,
    };
    next.transpose().map_err(PipelineError::from_stream)
}

async fn emit_inline<R: Convertible>(
    mut records: VendorStream<R>,
    emitter: &mut Emitter,
    cancel: &CancellationToken,
    fetched: &mut u64,
) -> Result<(), PipelineError> {
    while let Some(record) = next_record(&mut records, cancel).await? {
        *fetched += 1;
        emitter.accept(record)?;
    }
    Ok(())
}

/// Ingestion stage: forward records into the queue, waiting on a full
/// queue unless cancelled.
async fn produce<R>(
    records: &mut VendorStream<R>,
    tx: &mpsc::Sender<R>,
    cancel: &CancellationToken,
    fetched: &mut u64,
) -> Result<(), PipelineError> {
    while let Some(record) = next_record(records, cancel).await? {
        *fetched += 1;
        tokio::select! {
            biased;
            () = cancel.cancelled() => return Err(PipelineError::Cancelled),
            sent = tx.send(record) => {
                // Receiver gone: the emission stage stopped and reports why.
                if sent.is_err() {
                    return Ok(());
                }
            }
        }
    }
    Ok(())
}

async fn emit_queued<R>(
    mut records: VendorStream<R>,
    mut emitter: Emitter,
    capacity: usize,
    cancel: &CancellationToken,
) -> Emission
where
    R: Convertible + Send + 'static,
{
    let (tx, mut rx) = mpsc::channel::<R>(capacity.max(1));
    // Fires on user cancellation, or when ingestion fails so the emission
    // stage stops without draining the queue.
    let stop = cancel.child_token();

    let consumer_stop = stop.clone();
    let consumer = tokio::task::spawn_blocking(move || {
        let result = drain(&mut rx, &mut emitter, &consumer_stop);
        (emitter, result)
    });

    let mut fetched = 0u64;
    let produced = produce(&mut records, &tx, cancel, &mut fetched).await;
    if produced.is_err() {
        stop.cancel();
    }
    drop(tx);
    drop(records);

    match consumer.await {
        Ok((emitter, consumed)) => {
            let result = match (produced, consumed) {
                (Err(PipelineError::Cancelled), Err(e)) | (Err(e), _) | (Ok(()), Err(e)) => Err(e),
                (Ok(()), Ok(())) => Ok(()),
            };
            Emission {
                emitter: Some(emitter),
                fetched,
                result,
            }
        }
        Err(join_err) => Emission {
            emitter: None,
            fetched,
            result: Err(PipelineError::Infrastructure(anyhow::anyhow!(
                "emission task panicked: {join_err}"
            ))),
        },
    }
}

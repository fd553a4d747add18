//! Conversion and emission stage.
//!
//! Converts vendor records one at a time and hands canonical records to the
//! sink, applying the configured conversion-error policy.

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use vulnfeed_sdk::capability::Convertible;
use vulnfeed_types::state::FeedId;

use crate::config::types::ConvertErrorPolicy;
use crate::errors::PipelineError;
use crate::result::RunCounts;
use crate::sink::Sink;

pub(crate) struct Emitter {
    feed: FeedId,
    sink: Box<dyn Sink>,
    policy: ConvertErrorPolicy,
    counts: RunCounts,
}

impl Emitter {
    pub(crate) fn new(feed: FeedId, sink: Box<dyn Sink>, policy: ConvertErrorPolicy) -> Self {
        Self {
            feed,
            sink,
            policy,
            counts: RunCounts::default(),
        }
    }

    /// Convert and write one record. The record is dropped afterwards.
    pub(crate) fn accept<R: Convertible>(&mut self, record: R) -> Result<(), PipelineError> {
        match record.convert() {
            Ok(item) => {
                self.counts.converted += 1;
                self.sink.write(item)?;
                self.counts.emitted += 1;
                Ok(())
            }
            Err(source) => {
                let record_id = record.record_id();
                match self.policy {
                    ConvertErrorPolicy::Skip => {
                        self.counts.skipped += 1;
                        tracing::warn!(
                            feed = self.feed.as_str(),
                            record_id = record_id.as_deref(),
                            error = %source,
                            "Skipping record that failed conversion"
                        );
                        Ok(())
                    }
                    ConvertErrorPolicy::Fail => Err(PipelineError::Convert { record_id, source }),
                }
            }
        }
    }

    /// Finish the sink. Called once per run, whatever the outcome.
    pub(crate) fn close(&mut self) -> Result<(), PipelineError> {
        self.sink.finish().map_err(PipelineError::Sink)
    }

    pub(crate) fn counts(&self) -> RunCounts {
        self.counts
    }
}

/// Blocking consumer loop for the queued emission stage.
///
/// Returns when every sender is gone, a record fails fatally, or `stop`
/// fires. `stop` is checked between records.
pub(crate) fn drain<R: Convertible>(
    rx: &mut mpsc::Receiver<R>,
    emitter: &mut Emitter,
    stop: &CancellationToken,
) -> Result<(), PipelineError> {
    while let Some(record) = rx.blocking_recv() {
        if stop.is_cancelled() {
            return Err(PipelineError::Cancelled);
        }
        emitter.accept(record)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sink::VecSink;
    use vulnfeed_types::error::ConvertError;
    use vulnfeed_types::nvd::CveItem;

    struct Rec {
        id: &'static str,
        ok: bool,
    }

    impl Convertible for Rec {
        fn convert(&self) -> Result<CveItem, ConvertError> {
            if self.ok {
                Ok(CveItem::new(self.id))
            } else {
                Err(ConvertError::MissingField("advisory_identifier"))
            }
        }

        fn record_id(&self) -> Option<String> {
            Some(self.id.to_string())
        }
    }

    fn emitter(sink: &VecSink, policy: ConvertErrorPolicy) -> Emitter {
        Emitter::new(FeedId::new("test"), Box::new(sink.clone()), policy)
    }

    #[test]
    fn skip_policy_counts_failures() {
        let sink = VecSink::new();
        let mut em = emitter(&sink, ConvertErrorPolicy::Skip);
        em.accept(Rec { id: "a", ok: true }).unwrap();
        em.accept(Rec { id: "b", ok: false }).unwrap();
        em.accept(Rec { id: "c", ok: true }).unwrap();
        em.close().unwrap();
        let counts = em.counts();
        assert_eq!(counts.converted, 2);
        assert_eq!(counts.skipped, 1);
        assert_eq!(counts.emitted, 2);
        assert_eq!(sink.items().len(), 2);
        assert!(sink.is_finished());
    }

    #[test]
    fn fail_policy_stops_with_record_id() {
        let sink = VecSink::new();
        let mut em = emitter(&sink, ConvertErrorPolicy::Fail);
        let err = em.accept(Rec { id: "bad", ok: false }).unwrap_err();
        match err {
            PipelineError::Convert { record_id, .. } => {
                assert_eq!(record_id.as_deref(), Some("bad"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn drain_consumes_until_senders_drop() {
        let sink = VecSink::new();
        let mut em = emitter(&sink, ConvertErrorPolicy::Skip);
        let (tx, mut rx) = mpsc::channel(4);
        tx.try_send(Rec { id: "a", ok: true }).unwrap();
        tx.try_send(Rec { id: "b", ok: true }).unwrap();
        drop(tx);
        drain(&mut rx, &mut em, &CancellationToken::new()).unwrap();
        assert_eq!(em.counts().emitted, 2);
    }

    #[test]
    fn drain_stops_when_cancelled() {
        let sink = VecSink::new();
        let mut em = emitter(&sink, ConvertErrorPolicy::Skip);
        let (tx, mut rx) = mpsc::channel(4);
        tx.try_send(Rec { id: "a", ok: true }).unwrap();
        let stop = CancellationToken::new();
        stop.cancel();
        let err = drain(&mut rx, &mut em, &stop).unwrap_err();
        assert!(matches!(err, PipelineError::Cancelled));
        assert!(sink.items().is_empty());
    }
}

//! Batched, concurrent note delivery with partial-failure accounting.

use std::collections::BTreeMap;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::{Duration, Instant};

use futures::FutureExt;
use tokio::task::JoinSet;
use tracing::{debug, info, instrument, warn};

use margin_core::{
    Deadline, DeliveryFailure, DeliveryOutcome, Note, NoteSink, ProgressStatus, SinkError,
    SyncProgress, SyncProgressFn,
};

use crate::config::PipelineConfig;

/// Sends notes to a sink in fixed-size concurrent batches.
///
/// Within a batch every note is sent on its own task; one failure never
/// cancels its siblings. Batches run sequentially with a pause in between.
pub struct BatchDeliverer {
    sink: Arc<dyn NoteSink>,
    batch_size: usize,
    batch_delay: Duration,
}

impl BatchDeliverer {
    pub fn new(sink: Arc<dyn NoteSink>) -> Self {
        Self::from_config(sink, &PipelineConfig::default())
    }

    pub fn from_config(sink: Arc<dyn NoteSink>, config: &PipelineConfig) -> Self {
        Self {
            sink,
            batch_size: config.batch_size.max(1),
            batch_delay: config.batch_delay,
        }
    }

    pub fn with_batch_size(mut self, size: usize) -> Self {
        self.batch_size = size.max(1);
        self
    }

    pub fn with_batch_delay(mut self, delay: Duration) -> Self {
        self.batch_delay = delay;
        self
    }

    /// Deliver `notes`, returning counts and per-note failures.
    ///
    /// `synced + errors == notes.len()` holds for every run. Notes left when
    /// the deadline passes are recorded as failures without being sent.
    #[instrument(skip_all, fields(subsystem = "pipeline", component = "deliverer", op = "deliver", note_count = notes.len()))]
    pub async fn deliver(
        &self,
        notes: Vec<Note>,
        progress: Option<&SyncProgressFn<'_>>,
        deadline: &Deadline,
    ) -> DeliveryOutcome {
        let start = Instant::now();
        let total = notes.len();
        let total_batches = total.div_ceil(self.batch_size);
        let mut outcome = DeliveryOutcome::default();

        let mut remaining = notes.into_iter().peekable();
        let mut batch = 0usize;

        while remaining.peek().is_some() {
            if deadline.is_expired() {
                let skipped: Vec<Note> = remaining.by_ref().collect();
                warn!(
                    skipped = skipped.len(),
                    batch = batch + 1,
                    "Delivery deadline passed, remaining notes not sent"
                );
                for note in skipped {
                    outcome.errors += 1;
                    outcome.error_details.push(DeliveryFailure {
                        note,
                        error: SinkError::deadline("Delivery deadline exceeded before note was sent"),
                    });
                }
                break;
            }

            batch += 1;
            let chunk: Vec<Note> = remaining.by_ref().take(self.batch_size).collect();

            emit(
                progress,
                SyncProgress {
                    total,
                    synced: outcome.synced,
                    errors: outcome.errors,
                    status: ProgressStatus::InProgress,
                    current_batch: Some(batch),
                    total_batches: Some(total_batches),
                },
            );

            let (synced, failures) = self.deliver_chunk(chunk, deadline).await;
            debug!(batch, synced, failed = failures.len(), "Batch delivered");

            outcome.synced += synced;
            outcome.errors += failures.len();
            outcome.error_details.extend(failures);

            if remaining.peek().is_some() && !self.batch_delay.is_zero() {
                tokio::time::sleep(self.batch_delay).await;
            }
        }

        emit(
            progress,
            SyncProgress {
                total,
                synced: outcome.synced,
                errors: outcome.errors,
                status: ProgressStatus::Complete,
                current_batch: Some(batch),
                total_batches: Some(total_batches),
            },
        );

        info!(
            synced = outcome.synced,
            failed = outcome.errors,
            batches = batch,
            duration_ms = start.elapsed().as_millis() as u64,
            "Delivery complete"
        );

        outcome
    }

    /// Send one chunk concurrently; failures come back in input order.
    async fn deliver_chunk(
        &self,
        chunk: Vec<Note>,
        deadline: &Deadline,
    ) -> (usize, Vec<DeliveryFailure>) {
        let mut tasks = JoinSet::new();
        let mut pending: BTreeMap<usize, Note> = BTreeMap::new();

        for (idx, note) in chunk.into_iter().enumerate() {
            let sink = Arc::clone(&self.sink);
            let deadline = *deadline;
            let task_note = note.clone();
            pending.insert(idx, note);

            tasks.spawn(async move {
                let send = AssertUnwindSafe(send_one(sink, &task_note, deadline)).catch_unwind();
                let result = match send.await {
                    Ok(result) => result,
                    Err(_) => Err(SinkError::transport("Delivery task panicked")),
                };
                (idx, result)
            });
        }

        let mut synced = 0usize;
        let mut failed: BTreeMap<usize, DeliveryFailure> = BTreeMap::new();

        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((idx, Ok(_created))) => {
                    pending.remove(&idx);
                    synced += 1;
                }
                Ok((idx, Err(error))) => {
                    if let Some(note) = pending.remove(&idx) {
                        failed.insert(idx, DeliveryFailure { note, error });
                    }
                }
                Err(e) => {
                    warn!(error = %e, "Delivery task did not complete");
                }
            }
        }

        // tasks that never reported back
        for (idx, note) in pending {
            failed.insert(
                idx,
                DeliveryFailure {
                    note,
                    error: SinkError::transport("Delivery task did not complete"),
                },
            );
        }

        (synced, failed.into_values().collect())
    }
}

async fn send_one(
    sink: Arc<dyn NoteSink>,
    note: &Note,
    deadline: Deadline,
) -> Result<margin_core::CreatedNote, SinkError> {
    match deadline.remaining() {
        None => sink.create_note(note).await,
        Some(left) => tokio::time::timeout(left, sink.create_note(note))
            .await
            .unwrap_or_else(|_| Err(SinkError::deadline("Delivery deadline exceeded while sending note"))),
    }
}

fn emit(progress: Option<&SyncProgressFn<'_>>, update: SyncProgress) {
    if let Some(cb) = progress {
        cb(update);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use margin_core::CreatedNote;
    use std::collections::HashSet;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    /// Sink failing or panicking on selected contents.
    struct ScriptedSink {
        fail: HashSet<String>,
        panic_on: HashSet<String>,
        calls: AtomicUsize,
    }

    impl ScriptedSink {
        fn failing(contents: &[&str]) -> Self {
            Self {
                fail: contents.iter().map(|c| c.to_string()).collect(),
                panic_on: HashSet::new(),
                calls: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl NoteSink for ScriptedSink {
        async fn create_note(&self, note: &Note) -> Result<CreatedNote, SinkError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.panic_on.contains(&note.content) {
                panic!("sink exploded");
            }
            if self.fail.contains(&note.content) {
                return Err(SinkError::transport(format!("rejected {}", note.content)));
            }
            Ok(CreatedNote {
                id: format!("id-{}", note.content),
                content: note.content.clone(),
                ..Default::default()
            })
        }
    }

    fn notes(n: usize) -> Vec<Note> {
        (1..=n)
            .map(|i| Note {
                content: format!("note-{}", i),
                created_at: None,
            })
            .collect()
    }

    #[tokio::test(start_paused = true)]
    async fn test_five_notes_third_fails() {
        let sink = Arc::new(ScriptedSink::failing(&["note-3"]));
        let deliverer = BatchDeliverer::new(sink.clone()).with_batch_size(2);

        let outcome = deliverer.deliver(notes(5), None, &Deadline::unbounded()).await;

        assert_eq!(outcome.synced, 4);
        assert_eq!(outcome.errors, 1);
        assert_eq!(outcome.error_details.len(), 1);
        assert_eq!(outcome.error_details[0].note.content, "note-3");
        assert_eq!(sink.calls.load(Ordering::SeqCst), 5);
    }

    #[tokio::test(start_paused = true)]
    async fn test_delay_only_between_batches() {
        let sink = Arc::new(ScriptedSink::failing(&[]));
        let deliverer = BatchDeliverer::new(sink)
            .with_batch_size(2)
            .with_batch_delay(Duration::from_millis(500));

        let start = tokio::time::Instant::now();
        deliverer.deliver(notes(5), None, &Deadline::unbounded()).await;

        // three batches, two pauses
        assert_eq!(start.elapsed(), Duration::from_millis(1000));
    }

    #[tokio::test(start_paused = true)]
    async fn test_progress_reports_batches() {
        let sink = Arc::new(ScriptedSink::failing(&["note-1"]));
        let deliverer = BatchDeliverer::new(sink).with_batch_size(2);
        let events = Mutex::new(Vec::new());
        {
            let cb: &SyncProgressFn<'_> = &|p| events.lock().unwrap().push(p);
            deliverer.deliver(notes(3), Some(cb), &Deadline::unbounded()).await;
        }

        let events = events.into_inner().unwrap();
        assert_eq!(events.len(), 3);
        assert_eq!(events[0].current_batch, Some(1));
        assert_eq!(events[0].total_batches, Some(2));
        assert_eq!(events[1].current_batch, Some(2));
        assert_eq!(events[1].errors, 1);
        assert_eq!(events[1].synced, 1);
        assert_eq!(events[2].status, ProgressStatus::Complete);
        assert_eq!(events[2].synced, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_expired_deadline_fails_remaining_notes() {
        let sink = Arc::new(ScriptedSink::failing(&[]));
        let deliverer = BatchDeliverer::new(sink.clone())
            .with_batch_size(2)
            .with_batch_delay(Duration::from_millis(500));

        let deadline = Deadline::after(Duration::from_millis(700));
        let outcome = deliverer.deliver(notes(6), None, &deadline).await;

        assert_eq!(outcome.synced, 4);
        assert_eq!(outcome.errors, 2);
        assert_eq!(outcome.synced + outcome.errors, 6);
        assert_eq!(sink.calls.load(Ordering::SeqCst), 4);
        assert!(outcome.error_details[0].error.message.contains("deadline"));
    }

    #[tokio::test]
    async fn test_panicking_send_counts_as_failure() {
        let sink = Arc::new(ScriptedSink {
            fail: HashSet::new(),
            panic_on: ["note-2".to_string()].into_iter().collect(),
            calls: AtomicUsize::new(0),
        });
        let deliverer = BatchDeliverer::new(sink).with_batch_delay(Duration::ZERO);

        let outcome = deliverer.deliver(notes(3), None, &Deadline::unbounded()).await;

        assert_eq!(outcome.synced, 2);
        assert_eq!(outcome.errors, 1);
        assert_eq!(outcome.error_details[0].note.content, "note-2");
    }

    #[tokio::test]
    async fn test_empty_input() {
        let sink = Arc::new(ScriptedSink::failing(&[]));
        let outcome = BatchDeliverer::new(sink)
            .deliver(Vec::new(), None, &Deadline::unbounded())
            .await;
        assert_eq!(outcome, DeliveryOutcome::default());
    }
}

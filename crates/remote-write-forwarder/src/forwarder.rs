// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Batch forwarder: a single task that owns the accumulator and talks to the sink.
//!
//! ```text
//!    ┌──────────────┐
//!    │   Handles    │ (HTTP handlers, cloned)
//!    └──────┬───────┘
//!           │ record groups over a bounded channel
//!           v
//!    ┌──────────────┐       ┌───────────┐
//!    │   Service    │<──────│   timer   │
//!    │  event loop  │       └───────────┘
//!    └──────┬───────┘
//!           │ one batch at a time
//!           v
//!    ┌──────────────┐
//!    │     Sink     │
//!    └──────────────┘
//! ```
//!
//! The service flushes when a group would overflow the batch, on every timer tick, and once
//! more when the intake is closed. Sink calls are awaited inline, so there is never more than
//! one batch in flight and no lock is needed around the accumulator.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, info_span, warn, Instrument, Span};

use crate::accumulator::{Accumulator, Batch, FlushTrigger};
use crate::constants;
use crate::encoding::Encoding;
use crate::errors::ForwarderError;
use crate::record::Record;
use crate::sink::{send_batch, RetryStrategy, Sink};

/// What a second call to [`ForwarderHandle::close`] does.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DoubleClosePolicy {
    /// Log and return `Ok(())`.
    #[default]
    Ignore,
    /// Return [`ForwarderError::AlreadyClosed`].
    Reject,
}

#[derive(Debug, Clone)]
pub struct ForwarderConfig {
    /// Kinesis stream or Firehose delivery stream receiving the batches.
    pub stream_name: String,
    pub encoding: Encoding,
    pub max_batch_bytes: usize,
    pub max_batch_entries: usize,
    pub flush_interval: Duration,
    /// Record groups that may wait in the intake queue before `enqueue` waits for room.
    pub intake_capacity: usize,
    pub retry_strategy: RetryStrategy,
    pub double_close: DoubleClosePolicy,
}

impl ForwarderConfig {
    #[must_use]
    pub fn new(stream_name: impl Into<String>) -> Self {
        ForwarderConfig {
            stream_name: stream_name.into(),
            encoding: Encoding::Json,
            max_batch_bytes: constants::MAX_BATCH_BYTES,
            max_batch_entries: constants::MAX_BATCH_ENTRIES,
            flush_interval: constants::FLUSH_INTERVAL,
            intake_capacity: constants::INTAKE_CAPACITY,
            retry_strategy: RetryStrategy::Disabled,
            double_close: DoubleClosePolicy::Ignore,
        }
    }
}

/// Counters reported when the forwarder stops.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ForwarderSummary {
    pub batches_sent: usize,
    pub records_sent: usize,
    pub batches_failed: usize,
    pub records_failed: usize,
    /// Records that could not be encoded and never reached a batch.
    pub records_dropped: usize,
}

/// Producer side of the forwarder. Cheap to clone; all clones share the closed state.
#[derive(Clone, Debug)]
pub struct ForwarderHandle {
    tx: mpsc::Sender<Vec<Record>>,
    closed: Arc<AtomicBool>,
    shutdown: CancellationToken,
    double_close: DoubleClosePolicy,
}

impl ForwarderHandle {
    /// Queues one request's records as a single group.
    ///
    /// Waits while the intake queue is full. Fails once the forwarder has been closed.
    pub async fn enqueue(&self, records: Vec<Record>) -> Result<(), ForwarderError> {
        if self.is_closed() {
            return Err(ForwarderError::Closed);
        }
        if records.is_empty() {
            return Ok(());
        }
        self.tx
            .send(records)
            .await
            .map_err(|_| ForwarderError::Closed)
    }

    /// Stops intake. Groups already queued are still batched, then the forwarder flushes one
    /// last time and exits.
    pub fn close(&self) -> Result<(), ForwarderError> {
        if self.closed.swap(true, Ordering::AcqRel) {
            return match self.double_close {
                DoubleClosePolicy::Ignore => {
                    debug!("Forwarder already closed, ignoring close");
                    Ok(())
                }
                DoubleClosePolicy::Reject => Err(ForwarderError::AlreadyClosed),
            };
        }
        self.shutdown.cancel();
        Ok(())
    }

    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }
}

pub struct ForwarderService {
    config: ForwarderConfig,
    sink: Arc<dyn Sink>,
    accumulator: Accumulator,
    rx: mpsc::Receiver<Vec<Record>>,
    shutdown: CancellationToken,
    span: Span,
    summary: ForwarderSummary,
}

impl ForwarderService {
    /// Returns the service, to be spawned, and the handle producers use to feed it.
    #[must_use]
    pub fn new(config: ForwarderConfig, sink: Arc<dyn Sink>) -> (Self, ForwarderHandle) {
        let (tx, rx) = mpsc::channel(config.intake_capacity.max(1));
        let shutdown = CancellationToken::new();
        let span = info_span!("forwarder", stream = %config.stream_name, sink = sink.name());

        let handle = ForwarderHandle {
            tx,
            closed: Arc::new(AtomicBool::new(false)),
            shutdown: shutdown.clone(),
            double_close: config.double_close,
        };
        let service = ForwarderService {
            accumulator: Accumulator::new(config.max_batch_bytes, config.max_batch_entries),
            config,
            sink,
            rx,
            shutdown,
            span,
            summary: ForwarderSummary::default(),
        };

        (service, handle)
    }

    /// Replaces the span the event loop logs under.
    #[must_use]
    pub fn with_span(mut self, span: Span) -> Self {
        self.span = span;
        self
    }

    /// Runs until the intake is closed (or every handle is dropped) and the last batch has been
    /// flushed.
    pub async fn run(self) -> ForwarderSummary {
        let span = self.span.clone();
        self.run_loop().instrument(span).await
    }

    async fn run_loop(mut self) -> ForwarderSummary {
        debug!("Forwarder started");

        let period = self.config.flush_interval.max(constants::MIN_FLUSH_INTERVAL);
        let mut ticker = interval_at(Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut intake_closed = false;

        loop {
            tokio::select! {
                _ = ticker.tick(), if !intake_closed => {
                    let batch = self.accumulator.take();
                    self.flush(batch, FlushTrigger::Interval).await;
                }
                _ = self.shutdown.cancelled(), if !intake_closed => {
                    debug!("Forwarder intake closed, draining queued groups");
                    self.rx.close();
                    intake_closed = true;
                }
                group = self.rx.recv() => match group {
                    Some(records) => self.admit(records).await,
                    None => break,
                },
            }
        }

        warn!("Write channel closed, sending current batch");
        let batch = self.accumulator.take();
        self.flush(batch, FlushTrigger::Shutdown).await;

        info!(
            batches_sent = self.summary.batches_sent,
            records_sent = self.summary.records_sent,
            batches_failed = self.summary.batches_failed,
            records_dropped = self.summary.records_dropped,
            "Forwarder stopped"
        );
        self.summary
    }

    async fn admit(&mut self, records: Vec<Record>) {
        let group = self.config.encoding.encode_group(&records);
        self.summary.records_dropped += records.len() - group.len();

        if let Some((batch, trigger)) = self.accumulator.admit(group) {
            self.flush(batch, trigger).await;
        }
    }

    async fn flush(&mut self, batch: Batch, trigger: FlushTrigger) {
        if batch.is_empty() {
            return;
        }
        debug!("Flushing {} records on {trigger}", batch.len());

        match send_batch(
            self.sink.as_ref(),
            &batch,
            &self.config.stream_name,
            self.config.retry_strategy,
        )
        .await
        {
            Ok(()) => {
                self.summary.batches_sent += 1;
                self.summary.records_sent += batch.len();
            }
            Err(e) => {
                error!(
                    "Send failed, dropping {} records ({} bytes): {e}",
                    batch.len(),
                    batch.byte_size()
                );
                self.summary.batches_failed += 1;
                self.summary.records_failed += batch.len();
            }
        }
    }
}

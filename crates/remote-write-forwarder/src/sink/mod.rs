// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Destinations for finished batches.

use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use aws_config::{BehaviorVersion, Region};
use derive_more::Display;
use tracing::{debug, warn};

use crate::accumulator::Batch;
use crate::encoding::{EncodedRecord, Encoding};
use crate::errors::SinkError;

pub mod firehose;
pub mod kinesis;

pub use firehose::FirehoseSink;
pub use kinesis::KinesisSink;

/// Delivers a whole batch to a named stream. Delivery is all-or-nothing: any rejected record
/// fails the batch.
#[async_trait]
pub trait Sink: Send + Sync {
    fn name(&self) -> &'static str;

    async fn deliver(&self, records: &[EncodedRecord], destination: &str)
        -> Result<(), SinkError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
pub enum SinkKind {
    #[display("kinesis")]
    Kinesis,
    #[display("firehose")]
    Firehose,
}

impl SinkKind {
    #[must_use]
    pub fn default_encoding(&self) -> Encoding {
        match self {
            SinkKind::Kinesis => Encoding::JsonGzip,
            SinkKind::Firehose => Encoding::Json,
        }
    }
}

impl FromStr for SinkKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "kinesis" => Ok(SinkKind::Kinesis),
            "firehose" => Ok(SinkKind::Firehose),
            other => Err(format!("unknown sink {other}")),
        }
    }
}

/// What to do with a batch whose delivery failed. Once the retries are spent the batch is
/// discarded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RetryStrategy {
    #[default]
    Disabled,
    /// Retry up to `n` more times without waiting.
    Immediate(u32),
    /// Retry up to `n` more times, waiting `attempt * step_ms` before each one.
    LinearBackoff(u32, u64),
}

impl RetryStrategy {
    #[must_use]
    pub fn max_retries(&self) -> u32 {
        match self {
            RetryStrategy::Disabled => 0,
            RetryStrategy::Immediate(n) | RetryStrategy::LinearBackoff(n, _) => *n,
        }
    }

    fn backoff(&self, attempt: u32) -> Duration {
        match self {
            RetryStrategy::LinearBackoff(_, step_ms) => {
                Duration::from_millis(step_ms.saturating_mul(u64::from(attempt)))
            }
            _ => Duration::ZERO,
        }
    }
}

/// Hands one batch to the sink. Empty batches succeed without touching the sink.
pub async fn send_batch(
    sink: &dyn Sink,
    batch: &Batch,
    destination: &str,
    retry_strategy: RetryStrategy,
) -> Result<(), SinkError> {
    if batch.is_empty() {
        return Ok(());
    }

    debug!(
        bytes = batch.byte_size(),
        entries = batch.len(),
        "Sending batch to {} {destination}",
        sink.name()
    );

    let mut attempt = 0;
    loop {
        match sink.deliver(batch.records(), destination).await {
            Ok(()) => return Ok(()),
            Err(e) if attempt < retry_strategy.max_retries() => {
                attempt += 1;
                warn!("Failed to deliver batch (attempt {attempt}), retrying: {e}");
                let backoff = retry_strategy.backoff(attempt);
                if !backoff.is_zero() {
                    tokio::time::sleep(backoff).await;
                }
            }
            Err(e) => return Err(e),
        }
    }
}

/// Builds the sink for `kind` against `region`, with credentials from the default AWS chain.
pub async fn build_sink(kind: SinkKind, region: &str) -> Arc<dyn Sink> {
    let sdk_config = aws_config::defaults(BehaviorVersion::latest())
        .region(Region::new(region.to_string()))
        .load()
        .await;

    match kind {
        SinkKind::Firehose => Arc::new(FirehoseSink::new(aws_sdk_firehose::Client::new(
            &sdk_config,
        ))),
        SinkKind::Kinesis => Arc::new(KinesisSink::new(aws_sdk_kinesis::Client::new(
            &sdk_config,
        ))),
    }
}

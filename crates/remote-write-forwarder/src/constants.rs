// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use std::time::Duration;

/// Upper bound on the encoded bytes of one batch. Kept under the 5MB `PutRecordBatch` /
/// `PutRecords` request limit to leave room for the request envelope.
pub const MAX_BATCH_BYTES: usize = 4_500_000;

/// Upper bound on the records of one batch (`PutRecordBatch` and `PutRecords` both cap at 500).
pub const MAX_BATCH_ENTRIES: usize = 500;

/// Number of record groups that can wait in the intake queue before producers are held back.
pub const INTAKE_CAPACITY: usize = 1000;

pub const FLUSH_INTERVAL: Duration = Duration::from_secs(10);

/// Shortest flush period the forwarder ticks at; zero intervals are raised to it.
pub const MIN_FLUSH_INTERVAL: Duration = Duration::from_millis(1);

pub const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(5);

/// 10MB, same cap the trace intake applies to request bodies.
pub const MAX_REQUEST_CONTENT_LENGTH: usize = 10 * 1024 * 1024;

pub const DEFAULT_LISTEN_ADDR: &str = "0.0.0.0:9501";

pub const DEFAULT_AWS_REGION: &str = "ap-northeast-1";

pub const RECEIVE_ENDPOINT_PATH: &str = "/receive";

/// Label that carries the metric name in a remote-write series.
pub const METRIC_NAME_LABEL: &str = "__name__";

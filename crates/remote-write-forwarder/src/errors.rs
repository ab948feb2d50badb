// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

/// Failure to turn a remote-write HTTP body into records.
#[derive(Debug, thiserror::Error)]
pub enum DecodeError {
    #[error("snappy decompression failed: {0}")]
    Snappy(#[from] snap::Error),
    #[error("protobuf decoding failed: {0}")]
    Protobuf(#[from] prost::DecodeError),
}

/// Failure to serialize a single record. The record is dropped, its group is not.
#[derive(Debug, thiserror::Error)]
pub enum EncodeError {
    #[error("json: unsupported value {0}")]
    UnsupportedValue(f64),
    #[error("json: {0}")]
    Json(#[from] serde_json::Error),
    #[error("gzip: {0}")]
    Gzip(#[from] std::io::Error),
}

/// Failure to deliver a batch. The batch is discarded once the retry policy is exhausted.
#[derive(Debug, thiserror::Error)]
pub enum SinkError {
    #[error("failed to build request: {0}")]
    Build(String),
    #[error("request failed: {0}")]
    Request(String),
    #[error("{failed} of {total} records were rejected")]
    PartialFailure { failed: usize, total: usize },
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ForwarderError {
    #[error("forwarder intake is closed")]
    Closed,
    #[error("forwarder was already closed")]
    AlreadyClosed,
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{0} environment variable is not set")]
    Missing(&'static str),
    #[error("invalid value for {name}: {value:?}")]
    Invalid { name: &'static str, value: String },
}

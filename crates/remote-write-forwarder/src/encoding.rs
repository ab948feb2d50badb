// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Serialization of records into the payloads a sink ships.

use std::collections::BTreeMap;
use std::io::Write;
use std::str::FromStr;

use bytes::Bytes;
use derive_more::Display;
use flate2::write::GzEncoder;
use flate2::Compression;
use prost::Message;
use tracing::error;

use crate::errors::EncodeError;
use crate::record::Record;

const NEWLINE: u8 = b'\n';

/// Partition key used when a record has no name; Kinesis rejects empty keys.
const EMPTY_PARTITION_KEY: &str = "-";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
pub enum Encoding {
    /// Line-delimited JSON.
    #[display("json")]
    Json,
    /// Line-delimited JSON, each line gzip-compressed on its own.
    #[display("json_gzip")]
    JsonGzip,
    /// Length-delimited protobuf `Record` message.
    #[display("protobuf")]
    Protobuf,
}

impl FromStr for Encoding {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "json" => Ok(Encoding::Json),
            "json_gzip" | "gzip" => Ok(Encoding::JsonGzip),
            "protobuf" | "proto" => Ok(Encoding::Protobuf),
            other => Err(format!("unknown encoding {other}")),
        }
    }
}

/// Wire form of [`Record`] for [`Encoding::Protobuf`].
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct RecordMessage {
    #[prost(string, tag = "1")]
    pub name: String,
    #[prost(int64, tag = "2")]
    pub timestamp: i64,
    #[prost(double, optional, tag = "3")]
    pub value: Option<f64>,
    #[prost(btree_map = "string, string", tag = "4")]
    pub labels: BTreeMap<String, String>,
}

impl From<&Record> for RecordMessage {
    fn from(record: &Record) -> Self {
        RecordMessage {
            name: record.name.clone(),
            timestamp: record.timestamp,
            value: record.value,
            labels: record.labels.clone(),
        }
    }
}

/// A serialized record, ready to be placed in a batch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodedRecord {
    pub data: Bytes,
    pub partition_key: String,
}

impl EncodedRecord {
    #[must_use]
    pub fn len(&self) -> usize {
        self.data.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

/// The records of one intake group that survived encoding, with their summed size.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EncodedGroup {
    pub records: Vec<EncodedRecord>,
    pub byte_size: usize,
}

impl EncodedGroup {
    #[must_use]
    pub fn len(&self) -> usize {
        self.records.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

impl FromIterator<EncodedRecord> for EncodedGroup {
    fn from_iter<I: IntoIterator<Item = EncodedRecord>>(iter: I) -> Self {
        let records: Vec<EncodedRecord> = iter.into_iter().collect();
        let byte_size = records.iter().map(EncodedRecord::len).sum();
        EncodedGroup { records, byte_size }
    }
}

impl Encoding {
    /// Serializes one record, delimiter or length prefix included.
    pub fn encode(&self, record: &Record) -> Result<EncodedRecord, EncodeError> {
        let data = match self {
            Encoding::Json => Self::json_line(record)?,
            Encoding::JsonGzip => {
                let line = Self::json_line(record)?;
                let mut encoder =
                    GzEncoder::new(Vec::with_capacity(line.len()), Compression::default());
                encoder.write_all(&line)?;
                encoder.finish()?
            }
            Encoding::Protobuf => RecordMessage::from(record).encode_length_delimited_to_vec(),
        };

        let partition_key = if record.name.is_empty() {
            EMPTY_PARTITION_KEY.to_string()
        } else {
            record.name.clone()
        };

        Ok(EncodedRecord {
            data: Bytes::from(data),
            partition_key,
        })
    }

    /// Encodes a group, logging and skipping records that cannot be serialized.
    pub fn encode_group(&self, records: &[Record]) -> EncodedGroup {
        records
            .iter()
            .filter_map(|record| match self.encode(record) {
                Ok(encoded) => Some(encoded),
                Err(e) => {
                    error!("Failed to encode record {}: {e}", record.name);
                    None
                }
            })
            .collect()
    }

    fn json_line(record: &Record) -> Result<Vec<u8>, EncodeError> {
        // serde_json would silently write null for these
        if let Some(value) = record.value.filter(|v| v.is_infinite()) {
            return Err(EncodeError::UnsupportedValue(value));
        }
        let mut line = serde_json::to_vec(record)?;
        line.push(NEWLINE);
        Ok(line)
    }
}

// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use async_trait::async_trait;
use aws_sdk_kinesis::error::DisplayErrorContext;
use aws_sdk_kinesis::primitives::Blob;
use aws_sdk_kinesis::types::PutRecordsRequestEntry;
use aws_sdk_kinesis::Client;

use crate::encoding::EncodedRecord;
use crate::errors::SinkError;
use crate::sink::Sink;

/// Ships batches to a Kinesis data stream with `PutRecords`, keyed by metric name.
#[derive(Clone, Debug)]
pub struct KinesisSink {
    client: Client,
}

impl KinesisSink {
    #[must_use]
    pub fn new(client: Client) -> Self {
        KinesisSink { client }
    }
}

#[async_trait]
impl Sink for KinesisSink {
    fn name(&self) -> &'static str {
        "kinesis"
    }

    async fn deliver(
        &self,
        records: &[EncodedRecord],
        destination: &str,
    ) -> Result<(), SinkError> {
        let entries = records
            .iter()
            .map(|record| {
                PutRecordsRequestEntry::builder()
                    .data(Blob::new(record.data.to_vec()))
                    .partition_key(&record.partition_key)
                    .build()
                    .map_err(|e| SinkError::Build(e.to_string()))
            })
            .collect::<Result<Vec<_>, _>>()?;

        let output = self
            .client
            .put_records()
            .stream_name(destination)
            .set_records(Some(entries))
            .send()
            .await
            .map_err(|e| SinkError::Request(DisplayErrorContext(&e).to_string()))?;

        let failed = output
            .records()
            .iter()
            .filter(|entry| entry.error_code().is_some())
            .count();
        if failed > 0 {
            return Err(SinkError::PartialFailure {
                failed,
                total: records.len(),
            });
        }
        Ok(())
    }
}

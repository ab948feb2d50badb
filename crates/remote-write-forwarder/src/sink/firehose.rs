// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use async_trait::async_trait;
use aws_sdk_firehose::error::DisplayErrorContext;
use aws_sdk_firehose::primitives::Blob;
use aws_sdk_firehose::types::Record;
use aws_sdk_firehose::Client;

use crate::encoding::EncodedRecord;
use crate::errors::SinkError;
use crate::sink::Sink;

/// Ships batches to a Kinesis Data Firehose delivery stream with `PutRecordBatch`.
#[derive(Clone, Debug)]
pub struct FirehoseSink {
    client: Client,
}

impl FirehoseSink {
    #[must_use]
    pub fn new(client: Client) -> Self {
        FirehoseSink { client }
    }
}

#[async_trait]
impl Sink for FirehoseSink {
    fn name(&self) -> &'static str {
        "firehose"
    }

    async fn deliver(
        &self,
        records: &[EncodedRecord],
        destination: &str,
    ) -> Result<(), SinkError> {
        let entries = records
            .iter()
            .map(|record| {
                Record::builder()
                    .data(Blob::new(record.data.to_vec()))
                    .build()
                    .map_err(|e| SinkError::Build(e.to_string()))
            })
            .collect::<Result<Vec<_>, _>>()?;

        let output = self
            .client
            .put_record_batch()
            .delivery_stream_name(destination)
            .set_records(Some(entries))
            .send()
            .await
            .map_err(|e| SinkError::Request(DisplayErrorContext(&e).to_string()))?;

        let failed = output
            .request_responses()
            .iter()
            .filter(|response| response.error_code().is_some())
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

#[cfg(test)]
mod tests {
    use aws_sdk_firehose::config::retry::RetryConfig;
    use aws_sdk_firehose::config::{BehaviorVersion, Credentials, Region};
    use bytes::Bytes;
    use mockito::{Matcher, Server};

    use super::*;

    fn sink(endpoint: String) -> FirehoseSink {
        let config = aws_sdk_firehose::Config::builder()
            .behavior_version(BehaviorVersion::latest())
            .region(Region::new("us-east-1"))
            .endpoint_url(endpoint)
            .credentials_provider(Credentials::new("akid", "secret", None, None, "test"))
            .retry_config(RetryConfig::disabled())
            .build();
        FirehoseSink::new(Client::from_conf(config))
    }

    fn records() -> Vec<EncodedRecord> {
        vec![
            EncodedRecord {
                data: Bytes::from_static(b"{\"name\":\"up\"}\n"),
                partition_key: "up".to_string(),
            },
            EncodedRecord {
                data: Bytes::from_static(b"{\"name\":\"down\"}\n"),
                partition_key: "down".to_string(),
            },
        ]
    }

    #[tokio::test]
    async fn test_put_record_batch() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("POST", "/")
            .match_body(Matcher::Regex(
                r#""DeliveryStreamName":"metrics""#.to_string(),
            ))
            .with_status(200)
            .with_header("content-type", "application/x-amz-json-1.1")
            .with_body(
                r#"{"FailedPutCount":0,"Encrypted":false,"RequestResponses":[{"RecordId":"1"},{"RecordId":"2"}]}"#,
            )
            .create_async()
            .await;

        sink(server.url())
            .deliver(&records(), "metrics")
            .await
            .expect("delivery succeeds");
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_rejected_record_fails_batch() {
        let mut server = Server::new_async().await;
        server
            .mock("POST", "/")
            .with_status(200)
            .with_header("content-type", "application/x-amz-json-1.1")
            .with_body(
                r#"{"FailedPutCount":1,"RequestResponses":[{"RecordId":"1"},{"ErrorCode":"ServiceUnavailableException","ErrorMessage":"slow down"}]}"#,
            )
            .create_async()
            .await;

        let err = sink(server.url())
            .deliver(&records(), "metrics")
            .await
            .expect_err("one record was rejected");
        assert!(matches!(
            err,
            SinkError::PartialFailure {
                failed: 1,
                total: 2
            }
        ));
    }

    #[tokio::test]
    async fn test_service_error() {
        let mut server = Server::new_async().await;
        server
            .mock("POST", "/")
            .with_status(400)
            .with_header("content-type", "application/x-amz-json-1.1")
            .with_body(r#"{"__type":"ResourceNotFoundException","message":"no such stream"}"#)
            .create_async()
            .await;

        let err = sink(server.url())
            .deliver(&records(), "missing")
            .await
            .expect_err("stream does not exist");
        assert!(matches!(err, SinkError::Request(_)));
    }
}

// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::constants::METRIC_NAME_LABEL;
use crate::prompb::{TimeSeries, WriteRequest};

pub type Labels = BTreeMap<String, String>;

/// One sample of one series, flattened.
///
/// `value` is `None` for NaN samples and for series that carried no samples at all; it is
/// written as `null` in JSON.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record {
    pub name: String,
    #[serde(rename = "time")]
    pub timestamp: i64,
    pub value: Option<f64>,
    pub labels: Labels,
}

impl Record {
    /// Flattens one series into a record per sample, or a single record without timestamp and
    /// value when the series has no samples.
    #[must_use]
    pub fn flatten(series: TimeSeries) -> Vec<Record> {
        let labels: Labels = series
            .labels
            .into_iter()
            .map(|label| (label.name, label.value))
            .collect();
        let name = labels.get(METRIC_NAME_LABEL).cloned().unwrap_or_default();

        if series.samples.is_empty() {
            return vec![Record {
                name,
                timestamp: 0,
                value: None,
                labels,
            }];
        }

        series
            .samples
            .into_iter()
            .map(|sample| Record {
                name: name.clone(),
                timestamp: sample.timestamp,
                value: (!sample.value.is_nan()).then_some(sample.value),
                labels: labels.clone(),
            })
            .collect()
    }
}

/// Flattens every series of a request, preserving series and sample order.
#[must_use]
pub fn flatten_write_request(request: WriteRequest) -> Vec<Record> {
    let mut records = Vec::with_capacity(request.timeseries.len() * 2);
    for series in request.timeseries {
        records.extend(Record::flatten(series));
    }
    records
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::prompb::{Label, Sample};

    fn series(samples: Vec<Sample>) -> TimeSeries {
        TimeSeries {
            labels: vec![
                Label {
                    name: "__name__".to_string(),
                    value: "http_requests_total".to_string(),
                },
                Label {
                    name: "job".to_string(),
                    value: "api".to_string(),
                },
            ],
            samples,
        }
    }

    #[test]
    fn test_flatten_one_record_per_sample() {
        let records = Record::flatten(series(vec![
            Sample {
                value: 1.0,
                timestamp: 1000,
            },
            Sample {
                value: 2.5,
                timestamp: 2000,
            },
        ]));

        assert_eq!(records.len(), 2);
        assert_eq!(records[0].name, "http_requests_total");
        assert_eq!(records[0].timestamp, 1000);
        assert_eq!(records[0].value, Some(1.0));
        assert_eq!(records[1].timestamp, 2000);
        assert_eq!(records[1].value, Some(2.5));
        assert_eq!(records[1].labels.get("job").map(String::as_str), Some("api"));
        assert_eq!(
            records[1].labels.get("__name__").map(String::as_str),
            Some("http_requests_total")
        );
    }

    #[test]
    fn test_flatten_series_without_samples() {
        let records = Record::flatten(series(vec![]));

        assert_eq!(records.len(), 1);
        assert_eq!(records[0].timestamp, 0);
        assert_eq!(records[0].value, None);
        assert_eq!(records[0].labels.len(), 2);
    }

    #[test]
    fn test_flatten_nan_sample_has_no_value() {
        let records = Record::flatten(series(vec![Sample {
            value: f64::NAN,
            timestamp: 5,
        }]));

        assert_eq!(records[0].value, None);
        assert_eq!(records[0].timestamp, 5);
    }

    #[test]
    fn test_flatten_missing_name_label() {
        let records = Record::flatten(TimeSeries {
            labels: vec![Label {
                name: "job".to_string(),
                value: "api".to_string(),
            }],
            samples: vec![Sample {
                value: 1.0,
                timestamp: 1,
            }],
        });

        assert_eq!(records[0].name, "");
    }

    #[test]
    fn test_flatten_write_request_keeps_order() {
        let mut second = series(vec![Sample {
            value: 3.0,
            timestamp: 3,
        }]);
        second.labels[0].value = "up".to_string();

        let records = flatten_write_request(WriteRequest {
            timeseries: vec![
                series(vec![
                    Sample {
                        value: 1.0,
                        timestamp: 1,
                    },
                    Sample {
                        value: 2.0,
                        timestamp: 2,
                    },
                ]),
                second,
            ],
        });

        let names: Vec<_> = records
            .iter()
            .map(|r| (r.name.as_str(), r.timestamp))
            .collect();
        assert_eq!(
            names,
            vec![
                ("http_requests_total", 1),
                ("http_requests_total", 2),
                ("up", 3)
            ]
        );
    }

    #[test]
    fn test_json_shape() {
        let record = Record::flatten(series(vec![Sample {
            value: f64::NAN,
            timestamp: 42,
        }]))
        .remove(0);

        let json = serde_json::to_string(&record).expect("serialize");
        assert_eq!(
            json,
            r#"{"name":"http_requests_total","time":42,"value":null,"labels":{"__name__":"http_requests_total","job":"api"}}"#
        );
    }
}

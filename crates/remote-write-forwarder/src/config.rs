// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use std::env;
use std::net::SocketAddr;
use std::str::FromStr;
use std::time::Duration;

use crate::constants;
use crate::encoding::Encoding;
use crate::errors::ConfigError;
use crate::forwarder::{DoubleClosePolicy, ForwarderConfig};
use crate::sink::{RetryStrategy, SinkKind};

const ENV_STREAM_NAME: &str = "PRK_STREAM_NAME";
const ENV_SINK: &str = "PRK_SINK";
const ENV_LISTEN_ADDR: &str = "PRK_LISTEN_ADDR";
const ENV_AWS_REGION: &str = "AWS_REGION";
const ENV_WRITE_INTERVAL_SECS: &str = "PRK_WRITE_INTERVAL_SECS";
const ENV_MAX_BATCH_BYTES: &str = "PRK_MAX_BATCH_BYTES";
const ENV_MAX_BATCH_ENTRIES: &str = "PRK_MAX_BATCH_ENTRIES";
const ENV_INTAKE_CAPACITY: &str = "PRK_INTAKE_CAPACITY";
const ENV_ENCODING: &str = "PRK_ENCODING";
const ENV_MAX_REQUEST_CONTENT_LENGTH: &str = "PRK_MAX_REQUEST_CONTENT_LENGTH";
const ENV_FLUSH_RETRIES: &str = "PRK_FLUSH_RETRIES";
const ENV_FLUSH_RETRY_BACKOFF_MS: &str = "PRK_FLUSH_RETRY_BACKOFF_MS";
const ENV_DOUBLE_CLOSE: &str = "PRK_DOUBLE_CLOSE";
const ENV_SHUTDOWN_TIMEOUT_SECS: &str = "PRK_SHUTDOWN_TIMEOUT_SECS";
const ENV_LOG_LEVEL: &str = "PRK_LOG_LEVEL";

#[derive(Debug, Clone)]
pub struct Config {
    pub stream_name: String,
    pub sink: SinkKind,
    pub listen_addr: SocketAddr,
    pub aws_region: String,
    /// how often the current batch is flushed regardless of size
    pub flush_interval: Duration,
    pub max_batch_bytes: usize,
    pub max_batch_entries: usize,
    pub intake_capacity: usize,
    pub encoding: Encoding,
    pub max_request_content_length: usize,
    pub retry_strategy: RetryStrategy,
    pub double_close: DoubleClosePolicy,
    /// how long the final drain may take once a shutdown signal arrives
    pub shutdown_timeout: Duration,
    pub log_level: String,
}

impl Config {
    pub fn from_env() -> Result<Config, ConfigError> {
        let stream_name = env::var(ENV_STREAM_NAME)
            .ok()
            .filter(|name| !name.trim().is_empty())
            .ok_or(ConfigError::Missing(ENV_STREAM_NAME))?;

        let sink = parse_env(ENV_SINK)?.unwrap_or(SinkKind::Kinesis);
        let encoding = parse_env(ENV_ENCODING)?.unwrap_or_else(|| sink.default_encoding());

        let listen_addr: SocketAddr = match parse_env(ENV_LISTEN_ADDR)? {
            Some(addr) => addr,
            None => parse_value(ENV_LISTEN_ADDR, constants::DEFAULT_LISTEN_ADDR)?,
        };

        let flush_retries: u32 = parse_env(ENV_FLUSH_RETRIES)?.unwrap_or(0);
        let backoff_ms: u64 = parse_env(ENV_FLUSH_RETRY_BACKOFF_MS)?.unwrap_or(0);
        let retry_strategy = match (flush_retries, backoff_ms) {
            (0, _) => RetryStrategy::Disabled,
            (n, 0) => RetryStrategy::Immediate(n),
            (n, step_ms) => RetryStrategy::LinearBackoff(n, step_ms),
        };

        let double_close = match env::var(ENV_DOUBLE_CLOSE) {
            Err(_) => DoubleClosePolicy::Ignore,
            Ok(value) => match value.to_lowercase().as_str() {
                "ignore" => DoubleClosePolicy::Ignore,
                "reject" => DoubleClosePolicy::Reject,
                _ => {
                    return Err(ConfigError::Invalid {
                        name: ENV_DOUBLE_CLOSE,
                        value,
                    })
                }
            },
        };

        Ok(Config {
            stream_name,
            sink,
            listen_addr,
            aws_region: env::var(ENV_AWS_REGION)
                .ok()
                .filter(|region| !region.trim().is_empty())
                .unwrap_or_else(|| constants::DEFAULT_AWS_REGION.to_string()),
            flush_interval: Duration::from_secs(positive_env(
                ENV_WRITE_INTERVAL_SECS,
                constants::FLUSH_INTERVAL.as_secs(),
            )?),
            max_batch_bytes: positive_env(ENV_MAX_BATCH_BYTES, constants::MAX_BATCH_BYTES)?,
            max_batch_entries: positive_env(ENV_MAX_BATCH_ENTRIES, constants::MAX_BATCH_ENTRIES)?,
            intake_capacity: positive_env(ENV_INTAKE_CAPACITY, constants::INTAKE_CAPACITY)?,
            encoding,
            max_request_content_length: positive_env(
                ENV_MAX_REQUEST_CONTENT_LENGTH,
                constants::MAX_REQUEST_CONTENT_LENGTH,
            )?,
            retry_strategy,
            double_close,
            shutdown_timeout: Duration::from_secs(
                parse_env(ENV_SHUTDOWN_TIMEOUT_SECS)?
                    .unwrap_or(constants::SHUTDOWN_TIMEOUT.as_secs()),
            ),
            log_level: env::var(ENV_LOG_LEVEL).unwrap_or_else(|_| "info".to_string()),
        })
    }

    #[must_use]
    pub fn forwarder_config(&self) -> ForwarderConfig {
        ForwarderConfig {
            stream_name: self.stream_name.clone(),
            encoding: self.encoding,
            max_batch_bytes: self.max_batch_bytes,
            max_batch_entries: self.max_batch_entries,
            flush_interval: self.flush_interval,
            intake_capacity: self.intake_capacity,
            retry_strategy: self.retry_strategy,
            double_close: self.double_close,
        }
    }
}

fn parse_value<T: FromStr>(name: &'static str, value: &str) -> Result<T, ConfigError> {
    value.trim().parse::<T>().map_err(|_| ConfigError::Invalid {
        name,
        value: value.to_string(),
    })
}

/// Reads and parses `name`. An unset variable is `None`, an unparsable one is an error.
fn parse_env<T: FromStr>(name: &'static str) -> Result<Option<T>, ConfigError> {
    match env::var(name) {
        Ok(value) => parse_value(name, &value).map(Some),
        Err(_) => Ok(None),
    }
}

fn positive_env<T>(name: &'static str, default: T) -> Result<T, ConfigError>
where
    T: FromStr + PartialEq + Default + ToString,
{
    let value = parse_env(name)?.unwrap_or(default);
    if value == T::default() {
        return Err(ConfigError::Invalid {
            name,
            value: value.to_string(),
        });
    }
    Ok(value)
}

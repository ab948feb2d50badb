// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Receives Prometheus remote-write requests, flattens them into records and forwards the
//! records in size- and count-bounded batches to an AWS Kinesis stream or Firehose delivery
//! stream.
//!
//! The interesting part is [`forwarder`]: a single task owns the [`accumulator::Accumulator`],
//! selects over a flush timer and a bounded intake queue, and hands finished batches to a
//! [`sink::Sink`].

#![cfg_attr(not(test), deny(clippy::panic))]
#![cfg_attr(not(test), deny(clippy::unwrap_used))]
#![cfg_attr(not(test), deny(clippy::expect_used))]
#![cfg_attr(not(test), deny(clippy::todo))]
#![cfg_attr(not(test), deny(clippy::unimplemented))]

pub mod accumulator;
pub mod config;
pub mod constants;
pub mod decoder;
pub mod encoding;
pub mod errors;
pub mod forwarder;
pub mod http_utils;
pub mod prompb;
pub mod record;
pub mod server;
pub mod sink;

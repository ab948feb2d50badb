// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use prost::Message;

use crate::errors::DecodeError;
use crate::prompb::WriteRequest;
use crate::record::{flatten_write_request, Record};

/// Decodes a remote-write request body: snappy block format around a protobuf `WriteRequest`.
pub fn decode_write_request(body: &[u8]) -> Result<Vec<Record>, DecodeError> {
    let decompressed = snap::raw::Decoder::new().decompress_vec(body)?;
    let request = WriteRequest::decode(decompressed.as_slice())?;
    Ok(flatten_write_request(request))
}

/// Inverse of [`decode_write_request`], used by tests and local tooling to build request bodies.
pub fn encode_write_request(request: &WriteRequest) -> Result<Vec<u8>, snap::Error> {
    snap::raw::Encoder::new().compress_vec(&request.encode_to_vec())
}

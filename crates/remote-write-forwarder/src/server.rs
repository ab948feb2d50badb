// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use std::error::Error;
use std::io;

use bytes::Bytes;
use http_body_util::{BodyExt, LengthLimitError, Limited};
use hyper::body::Body;
use hyper::service::service_fn;
use hyper::{http, Method, Request, Response, StatusCode};
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error};

use crate::constants::RECEIVE_ENDPOINT_PATH;
use crate::decoder::decode_write_request;
use crate::forwarder::ForwarderHandle;
use crate::http_utils::{log_and_create_http_response, verify_request_content_length, HttpResponse};

type BoxError = Box<dyn Error + Send + Sync>;

/// HTTP front end: accepts remote-write requests and hands their records to the forwarder.
#[derive(Clone, Debug)]
pub struct RemoteWriteServer {
    handle: ForwarderHandle,
    max_request_content_length: usize,
}

impl RemoteWriteServer {
    #[must_use]
    pub fn new(handle: ForwarderHandle, max_request_content_length: usize) -> Self {
        RemoteWriteServer {
            handle,
            max_request_content_length,
        }
    }

    /// Serves connections from `listener` until `shutdown` is cancelled, then lets in-flight
    /// requests finish before returning.
    pub async fn serve(
        self,
        listener: TcpListener,
        shutdown: CancellationToken,
    ) -> Result<(), BoxError> {
        let service = service_fn(move |req| {
            let server = self.clone();
            async move { server.endpoint_handler(req).await }
        });

        let builder = hyper::server::conn::http1::Builder::new();
        let mut joinset = tokio::task::JoinSet::new();

        loop {
            let conn = tokio::select! {
                con_res = listener.accept() => match con_res {
                    Err(e)
                        if matches!(
                            e.kind(),
                            io::ErrorKind::ConnectionAborted
                                | io::ErrorKind::ConnectionReset
                                | io::ErrorKind::ConnectionRefused
                        ) =>
                    {
                        continue;
                    }
                    Err(e) => {
                        error!("Server error: {e}");
                        return Err(e.into());
                    }
                    Ok((conn, _)) => conn,
                },
                finished = async {
                    match joinset.join_next().await {
                        Some(finished) => finished,
                        None => std::future::pending().await,
                    }
                } => match finished {
                    Err(e) if e.is_panic() => {
                        error!("Connection handler panicked: {:?}", e);
                        continue;
                    },
                    Ok(()) | Err(_) => continue,
                },
                () = shutdown.cancelled() => break,
            };

            let conn = hyper_util::rt::TokioIo::new(conn);
            let builder = builder.clone();
            let service = service.clone();
            let shutdown = shutdown.clone();
            joinset.spawn(async move {
                let conn = builder.serve_connection(conn, service);
                tokio::pin!(conn);
                let result = tokio::select! {
                    result = conn.as_mut() => result,
                    () = shutdown.cancelled() => {
                        conn.as_mut().graceful_shutdown();
                        conn.await
                    }
                };
                if let Err(e) = result {
                    error!("Connection error: {e}");
                }
            });
        }

        debug!(
            "Server shutting down, waiting on {} connections",
            joinset.len()
        );
        while joinset.join_next().await.is_some() {}
        Ok(())
    }

    async fn endpoint_handler<B>(&self, req: Request<B>) -> http::Result<HttpResponse>
    where
        B: Body<Data = Bytes>,
        B::Error: Into<BoxError>,
    {
        match (req.method(), req.uri().path()) {
            (&Method::PUT | &Method::POST, RECEIVE_ENDPOINT_PATH) => {
                self.receive_handler(req).await
            }
            _ => {
                let mut not_found = Response::default();
                *not_found.status_mut() = StatusCode::NOT_FOUND;
                Ok(not_found)
            }
        }
    }

    async fn receive_handler<B>(&self, req: Request<B>) -> http::Result<HttpResponse>
    where
        B: Body<Data = Bytes>,
        B::Error: Into<BoxError>,
    {
        let (parts, body) = req.into_parts();
        if let Some(response) = verify_request_content_length(
            &parts.headers,
            self.max_request_content_length,
            "Error processing remote write request",
        ) {
            return response;
        }

        let body = match Limited::new(body, self.max_request_content_length)
            .collect()
            .await
        {
            Ok(collected) => collected.to_bytes(),
            Err(e) if e.is::<LengthLimitError>() => {
                return log_and_create_http_response(
                    "Error processing remote write request: Payload too large",
                    StatusCode::PAYLOAD_TOO_LARGE,
                );
            }
            Err(e) => {
                return log_and_create_http_response(
                    &format!("Error reading remote write request body: {e}"),
                    StatusCode::INTERNAL_SERVER_ERROR,
                );
            }
        };

        let records = match decode_write_request(&body) {
            Ok(records) => records,
            Err(e) => {
                return log_and_create_http_response(
                    &format!("Error decoding remote write request: {e}"),
                    StatusCode::BAD_REQUEST,
                );
            }
        };

        let count = records.len();
        match self.handle.enqueue(records).await {
            Ok(()) => log_and_create_http_response(
                &format!("Accepted {count} records"),
                StatusCode::OK,
            ),
            Err(e) => log_and_create_http_response(
                &format!("Error forwarding records: {e}"),
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
        }
    }
}

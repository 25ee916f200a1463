use std::time::Duration;

use async_trait::async_trait;

use crate::{RawResponse, RequestEnvelope, ResponseRecord, TransportError};

/// Single-attempt HTTP executor.
///
/// Implementations never retry; any status code is returned as a
/// [`RawResponse`], only failures to obtain one are errors. A failure after
/// the status line arrived is reported as [`TransportError::Body`] so the
/// metadata is not lost.
#[async_trait]
pub trait HttpExecutor: Send + Sync {
    async fn execute(
        &self,
        request: &RequestEnvelope,
        timeout: Duration,
    ) -> Result<RawResponse, TransportError>;
}

/// [`HttpExecutor`] backed by a shared `reqwest::Client`.
#[derive(Clone, Debug, Default)]
pub struct ReqwestExecutor {
    http: reqwest::Client,
}

impl ReqwestExecutor {
    pub fn new(http: reqwest::Client) -> Self {
        Self { http }
    }
}

#[async_trait]
impl HttpExecutor for ReqwestExecutor {
    async fn execute(
        &self,
        request: &RequestEnvelope,
        timeout: Duration,
    ) -> Result<RawResponse, TransportError> {
        let mut builder = self
            .http
            .request(request.method().into(), request.url())
            .timeout(timeout);
        for (name, value) in request.headers() {
            builder = builder.header(name.as_str(), value.as_str());
        }
        if let Some(body) = request.body() {
            builder = builder.body(body.to_vec());
        }

        let response = builder.send().await.map_err(classify_reqwest_error)?;

        let status = response.status().as_u16();
        let headers: Vec<(String, String)> = response
            .headers()
            .iter()
            .map(|(name, value)| {
                (
                    name.as_str().to_owned(),
                    String::from_utf8_lossy(value.as_bytes()).into_owned(),
                )
            })
            .collect();
        let body = match response.bytes().await {
            Ok(bytes) => bytes.to_vec(),
            Err(err) => {
                return Err(TransportError::Body {
                    record: ResponseRecord { status, headers },
                    message: err.to_string(),
                })
            }
        };

        Ok(RawResponse {
            status,
            headers,
            body,
        })
    }
}

fn classify_reqwest_error(err: reqwest::Error) -> TransportError {
    if err.is_timeout() {
        TransportError::Timeout(err.to_string())
    } else if err.is_connect() {
        TransportError::Connect(err.to_string())
    } else if err.is_builder() {
        TransportError::Request(err.to_string())
    } else {
        TransportError::Network(err)
    }
}

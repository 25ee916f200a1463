use std::fmt;

use serde::{de::DeserializeOwned, Serialize};

use crate::{HttpMethod, HttpTransport, RequestParams, ServiceError, Transport};

/// Base for generated service clients.
///
/// Owns exactly one transport for its whole lifetime and turns every
/// transport failure into a [`ServiceError`] tagged with
/// [`ERROR_DOMAIN`](crate::ERROR_DOMAIN).
pub struct ServiceClient<T: Transport = HttpTransport> {
    transport: T,
}

impl<T: Transport + fmt::Debug> fmt::Debug for ServiceClient<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServiceClient")
            .field("transport", &self.transport)
            .finish()
    }
}

impl ServiceClient<HttpTransport> {
    /// Creates a client over an [`HttpTransport`] configured from the
    /// environment. See [`HttpTransport::from_env`].
    pub fn from_env() -> std::result::Result<Self, String> {
        HttpTransport::from_env().map(Self::new)
    }
}

impl<T: Transport> ServiceClient<T> {
    pub fn new(transport: T) -> Self {
        Self { transport }
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Builds a domain error carrying the fixed error domain.
    pub fn error_with_message(&self, msg: impl Into<String>) -> ServiceError {
        ServiceError::new(msg)
    }

    /// Posts `payload` to `prefix` with `params` and returns the response body.
    ///
    /// Runs as one atomic transport call; an empty payload sends no body.
    pub async fn call(
        &self,
        prefix: &str,
        params: impl Into<RequestParams>,
        payload: &[u8],
    ) -> std::result::Result<Vec<u8>, ServiceError> {
        let body = (!payload.is_empty()).then_some(payload);
        self.transport
            .call(HttpMethod::Post, prefix, params.into(), body)
            .await
            .map_err(|err| {
                self.error_with_message(format!("request to '{prefix}' failed: {err}"))
                    .with_source(err)
            })
    }

    /// JSON round trip: serializes `request`, calls `prefix`, decodes the
    /// response as `Resp`.
    pub async fn call_json<Req, Resp>(
        &self,
        prefix: &str,
        params: impl Into<RequestParams>,
        request: &Req,
    ) -> std::result::Result<Resp, ServiceError>
    where
        Req: Serialize + ?Sized,
        Resp: DeserializeOwned,
    {
        let payload = serde_json::to_vec(request).map_err(|err| {
            self.error_with_message(format!("could not encode request for '{prefix}': {err}"))
        })?;
        let body = self.call(prefix, params, &payload).await?;
        self.decode(prefix, &body)
    }

    /// GETs the base URL with `params` and decodes the JSON response.
    pub async fn fetch_json<Resp>(
        &self,
        params: impl Into<RequestParams>,
    ) -> std::result::Result<Resp, ServiceError>
    where
        Resp: DeserializeOwned,
    {
        let body = self
            .transport
            .call(HttpMethod::Get, "", params.into(), None)
            .await
            .map_err(|err| {
                self.error_with_message(format!("read failed: {err}"))
                    .with_source(err)
            })?;
        self.decode("", &body)
    }

    fn decode<Resp: DeserializeOwned>(
        &self,
        prefix: &str,
        body: &[u8],
    ) -> std::result::Result<Resp, ServiceError> {
        serde_json::from_slice(body).map_err(|err| {
            self.error_with_message(format!(
                "malformed response from '{prefix}': {err}; body: {}",
                String::from_utf8_lossy(body)
            ))
        })
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    use async_trait::async_trait;
    use serde::{Deserialize, Serialize};

    use super::ServiceClient;
    use crate::{
        HttpExecutor, HttpMethod, HttpTransport, RawResponse, RequestEnvelope, RequestParams,
        ResponseRecord, Result, Transport, TransportError, ERROR_DOMAIN,
    };

    struct RecordedCall {
        method: HttpMethod,
        prefix: String,
        params: RequestParams,
        body: Option<Vec<u8>>,
    }

    #[derive(Default)]
    struct RecordingTransport {
        calls: Mutex<Vec<RecordedCall>>,
        call_error: Option<fn() -> TransportError>,
        response: Vec<u8>,
    }

    #[async_trait]
    impl Transport for RecordingTransport {
        async fn set_request_params(&self, _params: RequestParams) {}

        async fn write_all(&self, _data: &[u8], _prefix: &str) -> Result<()> {
            Ok(())
        }

        async fn read_all(&self) -> Result<Vec<u8>> {
            Ok(self.response.clone())
        }

        async fn call(
            &self,
            method: HttpMethod,
            prefix: &str,
            params: RequestParams,
            body: Option<&[u8]>,
        ) -> Result<Vec<u8>> {
            self.calls.lock().unwrap().push(RecordedCall {
                method,
                prefix: prefix.to_owned(),
                params,
                body: body.map(<[u8]>::to_vec),
            });
            match self.call_error {
                Some(make) => Err(make()),
                None => Ok(self.response.clone()),
            }
        }

        fn current_response(&self) -> Option<ResponseRecord> {
            None
        }
    }

    #[derive(Serialize)]
    struct EmployeesRequest {
        employer_id: i64,
    }

    #[derive(Debug, Deserialize, PartialEq)]
    struct Employee {
        name: String,
    }

    #[tokio::test]
    async fn call_json_encodes_request_and_decodes_response() {
        let client = ServiceClient::new(RecordingTransport {
            response: br#"[{"name":"John Doe"},{"name":"Mary Doe"}]"#.to_vec(),
            ..RecordingTransport::default()
        });

        let employees: Vec<Employee> = client
            .call_json(
                "employees",
                [("token", "qwerty")],
                &EmployeesRequest {
                    employer_id: 9876345,
                },
            )
            .await
            .unwrap();

        assert_eq!(employees.len(), 2);
        assert_eq!(employees[1].name, "Mary Doe");
        let calls = client.transport().calls.lock().unwrap();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].method, HttpMethod::Post);
        assert_eq!(calls[0].prefix, "employees");
        assert_eq!(calls[0].params.get("token"), Some("qwerty"));
        assert_eq!(
            calls[0].body.as_deref(),
            Some(&br#"{"employer_id":9876345}"#[..])
        );
    }

    #[tokio::test]
    async fn empty_payload_is_sent_without_body() {
        let client = ServiceClient::new(RecordingTransport::default());

        client.call("ping", (), b"").await.unwrap();

        let calls = client.transport().calls.lock().unwrap();
        assert!(calls[0].body.is_none());
        assert!(calls[0].params.is_empty());
    }

    #[tokio::test]
    async fn transport_failure_becomes_domain_error() {
        let client = ServiceClient::new(RecordingTransport {
            call_error: Some(|| TransportError::Timeout("deadline".to_owned())),
            ..RecordingTransport::default()
        });

        let err = client
            .call("employees", (), b"{}")
            .await
            .unwrap_err();

        assert_eq!(err.domain(), ERROR_DOMAIN);
        assert!(!err.message().is_empty());
        assert!(matches!(
            err.transport_error(),
            Some(TransportError::Timeout(_))
        ));
    }

    #[tokio::test]
    async fn malformed_response_is_a_validation_error() {
        let client = ServiceClient::new(RecordingTransport {
            response: b"not json".to_vec(),
            ..RecordingTransport::default()
        });

        let err = client
            .fetch_json::<Vec<Employee>>(RequestParams::new())
            .await
            .unwrap_err();

        assert_eq!(err.domain(), ERROR_DOMAIN);
        assert!(err.message().contains("malformed response"));
        assert!(err.transport_error().is_none());
        let calls = client.transport().calls.lock().unwrap();
        assert_eq!(calls[0].method, HttpMethod::Get);
    }

    #[test]
    fn error_with_message_keeps_message() {
        let client = ServiceClient::new(RecordingTransport::default());
        let err = client.error_with_message("unexpected payload");
        assert_eq!(err.message(), "unexpected payload");
        assert_eq!(err.domain(), ERROR_DOMAIN);
    }

    /// Answers every request with its own URL as the body.
    struct EchoUrlExecutor;

    #[async_trait]
    impl HttpExecutor for EchoUrlExecutor {
        async fn execute(
            &self,
            request: &RequestEnvelope,
            _timeout: Duration,
        ) -> std::result::Result<RawResponse, TransportError> {
            tokio::task::yield_now().await;
            Ok(RawResponse::new(200, request.url().as_bytes().to_vec()))
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_calls_keep_their_own_params_and_bodies() {
        let client = Arc::new(ServiceClient::new(
            HttpTransport::new("http://localhost").with_executor(EchoUrlExecutor),
        ));

        let mut tasks = Vec::new();
        for i in 0..200 {
            let client = Arc::clone(&client);
            tasks.push(tokio::spawn(async move {
                let body = client
                    .call(&format!("ep{i}"), [("id", i)], b"{}")
                    .await
                    .unwrap();
                (i, String::from_utf8(body).unwrap())
            }));
        }

        for task in tasks {
            let (i, url) = task.await.unwrap();
            assert_eq!(url, format!("http://localhost/ep{i}?id={i}"));
        }
    }
}

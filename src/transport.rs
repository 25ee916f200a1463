use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock};
use std::time::Duration;

use async_trait::async_trait;
use reqwest::header;
use tokio::sync::Mutex;
use tokio::time::sleep;

use crate::{
    envelope::build_url, DefaultRetryPolicy, FormEncoder, HttpExecutor, HttpMethod,
    ParamsEncoder, RawResponse, RequestEnvelope, RequestParams, ResponseRecord, Result,
    RetryPolicy, ReqwestExecutor, TransportError, TransportOptions,
};

/// Capability set a service client drives.
///
/// Implementations own request construction, parameter encoding, retries and
/// error classification. Any conforming implementation is interchangeable.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Stages parameters for the next logical operation only.
    async fn set_request_params(&self, params: RequestParams);

    /// Sends `data` to the endpoint named by `prefix`.
    async fn write_all(&self, data: &[u8], prefix: &str) -> Result<()>;

    /// Returns the body of the pending response, or fetches one.
    ///
    /// Parameters staged after the pending write are discarded.
    async fn read_all(&self) -> Result<Vec<u8>>;

    /// Runs one complete logical call with explicit parameters and returns
    /// the response body.
    ///
    /// Unlike the stage/write/read sequence this is atomic per call, so
    /// concurrent callers never observe each other's parameters or bodies.
    async fn call(
        &self,
        method: HttpMethod,
        prefix: &str,
        params: RequestParams,
        body: Option<&[u8]>,
    ) -> Result<Vec<u8>>;

    /// Metadata of the most recently received response.
    fn current_response(&self) -> Option<ResponseRecord>;
}

/// Aborts the running logical call of an [`HttpTransport`] between attempts.
#[derive(Clone, Debug, Default)]
pub struct CancelHandle {
    flag: Arc<AtomicBool>,
}

impl CancelHandle {
    pub fn cancel(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }

    fn reset(&self) {
        self.flag.store(false, Ordering::SeqCst);
    }
}

#[derive(Default)]
struct CallState {
    staged: Option<RequestParams>,
    pending_body: Option<Vec<u8>>,
}

/// HTTP-backed [`Transport`].
///
/// Logical calls on one instance are serialized; the response record is
/// replaced as a whole after every attempt that produced a response.
pub struct HttpTransport {
    base_url: String,
    options: TransportOptions,
    executor: Arc<dyn HttpExecutor>,
    policy: Arc<dyn RetryPolicy>,
    encoder: Arc<dyn ParamsEncoder>,
    call: Mutex<CallState>,
    response: RwLock<Option<ResponseRecord>>,
    cancel: CancelHandle,
}

impl fmt::Debug for HttpTransport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HttpTransport")
            .field("base_url", &self.base_url)
            .field("options", &self.options)
            .finish()
    }
}

impl HttpTransport {
    /// Creates a transport for `base_url` with default options, policy and
    /// encoder.
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            options: TransportOptions::default(),
            executor: Arc::new(ReqwestExecutor::default()),
            policy: Arc::new(DefaultRetryPolicy),
            encoder: Arc::new(FormEncoder),
            call: Mutex::new(CallState::default()),
            response: RwLock::new(None),
            cancel: CancelHandle::default(),
        }
    }

    /// Creates a transport from environment variables.
    ///
    /// Reads:
    /// - `HTTP_TRANSPORT_URL` — base URL (required)
    /// - `HTTP_TRANSPORT_RETRIES` — retry count (optional)
    /// - `HTTP_TRANSPORT_USER_AGENT` — user agent (optional)
    pub fn from_env() -> std::result::Result<Self, String> {
        let url = std::env::var("HTTP_TRANSPORT_URL")
            .map_err(|_| "missing HTTP_TRANSPORT_URL environment variable".to_owned())?;
        if url.trim().is_empty() {
            return Err("HTTP_TRANSPORT_URL is set but empty".to_owned());
        }

        let mut options = TransportOptions::default();
        if let Ok(retries) = std::env::var("HTTP_TRANSPORT_RETRIES") {
            options.retries_count = retries.trim().parse().map_err(|_| {
                format!("HTTP_TRANSPORT_RETRIES must be a non-negative integer, got '{retries}'")
            })?;
        }
        if let Ok(user_agent) = std::env::var("HTTP_TRANSPORT_USER_AGENT") {
            if !user_agent.trim().is_empty() {
                options.user_agent = user_agent;
            }
        }

        Ok(Self::new(url.trim()).with_options(options))
    }

    /// Applies transport options such as timeout, retries and user agent.
    pub fn with_options(mut self, options: TransportOptions) -> Self {
        self.options = options;
        self
    }

    /// Replaces the network executor, e.g. with a test double.
    pub fn with_executor(mut self, executor: impl HttpExecutor + 'static) -> Self {
        self.executor = Arc::new(executor);
        self
    }

    /// Replaces the policy deciding which errors end the retry loop.
    pub fn with_retry_policy(mut self, policy: impl RetryPolicy + 'static) -> Self {
        self.policy = Arc::new(policy);
        self
    }

    /// Replaces the encoder used for query strings.
    pub fn with_encoder(mut self, encoder: impl ParamsEncoder + 'static) -> Self {
        self.encoder = Arc::new(encoder);
        self
    }

    /// Base URL fixed at construction.
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Options in effect for every call.
    pub fn options(&self) -> &TransportOptions {
        &self.options
    }

    /// Maximum retries after the initial attempt.
    pub fn retries_count(&self) -> usize {
        self.options.retries_count
    }

    /// `User-Agent` sent with every request.
    pub fn user_agent(&self) -> &str {
        &self.options.user_agent
    }

    /// Handle that cancels the running call before its next attempt.
    pub fn cancel_handle(&self) -> CancelHandle {
        self.cancel.clone()
    }

    /// Builds the request for one attempt.
    pub fn prepare_request(
        &self,
        method: HttpMethod,
        url: &str,
        data: Option<&[u8]>,
    ) -> RequestEnvelope {
        let mut headers = vec![(
            header::USER_AGENT.as_str().to_owned(),
            self.options.user_agent.clone(),
        )];
        if data.is_some() {
            headers.push((
                header::CONTENT_TYPE.as_str().to_owned(),
                "application/json".to_owned(),
            ));
        }
        RequestEnvelope::new(method, url, headers, data.map(<[u8]>::to_vec))
    }

    /// Encodes `params` with the configured [`ParamsEncoder`].
    pub fn build_request_params_string(&self, params: &RequestParams) -> String {
        self.encoder.encode(params)
    }

    /// Asks the configured [`RetryPolicy`] whether `error` is permanent.
    pub fn should_break_on_error(&self, error: &TransportError) -> bool {
        self.policy.should_break_on_error(error)
    }

    /// Target URL for `prefix` with `params` applied.
    pub fn build_url(&self, prefix: &str, params: &RequestParams) -> Result<String> {
        build_url(&self.base_url, prefix, params, self.encoder.as_ref())
    }

    /// Runs one logical call with explicit parameters and returns the body.
    ///
    /// Does not touch staged parameters or the pending body.
    pub async fn request(
        &self,
        method: HttpMethod,
        prefix: &str,
        params: &RequestParams,
        body: Option<&[u8]>,
    ) -> Result<Vec<u8>> {
        let _call = self.call.lock().await;
        self.cancel.reset();
        let response = self.perform(method, prefix, params, body).await?;
        Ok(response.body)
    }

    /// Like [`Transport::write_all`] with an explicit HTTP method.
    ///
    /// An empty `data` slice sends no body.
    pub async fn write_all_with_method(
        &self,
        data: &[u8],
        prefix: &str,
        method: HttpMethod,
    ) -> Result<()> {
        let mut state = self.call.lock().await;
        self.cancel.reset();
        state.pending_body = None;
        let params = state.staged.take().unwrap_or_default();
        let body = (!data.is_empty()).then_some(data);

        let response = self.perform(method, prefix, &params, body).await?;
        state.pending_body = Some(response.body);
        Ok(())
    }

    async fn perform(
        &self,
        method: HttpMethod,
        prefix: &str,
        params: &RequestParams,
        body: Option<&[u8]>,
    ) -> Result<RawResponse> {
        let url = self.build_url(prefix, params)?;
        self.send_with_retry(method, &url, body).await
    }

    async fn send_with_retry(
        &self,
        method: HttpMethod,
        url: &str,
        data: Option<&[u8]>,
    ) -> Result<RawResponse> {
        let timeout = Duration::from_millis(self.options.timeout_ms);
        let mut attempt = 0usize;
        loop {
            let request = self.prepare_request(method, url, data);
            let error = match self.executor.execute(&request, timeout).await {
                Ok(response) => {
                    self.record_response(response.record());
                    if (200..300).contains(&response.status) {
                        return Ok(response);
                    }
                    TransportError::Http {
                        status: response.status,
                        body: String::from_utf8_lossy(&response.body).into_owned(),
                    }
                }
                Err(err) => {
                    if let TransportError::Body { record, .. } = &err {
                        self.record_response(record.clone());
                    }
                    err
                }
            };

            if self.should_break_on_error(&error) {
                #[cfg(feature = "tracing")]
                tracing::debug!("{} {} failed with permanent error: {}", method, url, error);
                return Err(error);
            }
            if attempt >= self.options.retries_count {
                #[cfg(feature = "tracing")]
                tracing::warn!(
                    "{} {} failed after {} attempt(s): {}",
                    method,
                    url,
                    attempt + 1,
                    error
                );
                return Err(error);
            }

            self.wait_before_retry(attempt).await;
            if self.cancel.is_cancelled() {
                #[cfg(feature = "tracing")]
                tracing::debug!("{} {} cancelled after {} attempt(s)", method, url, attempt + 1);
                return Err(TransportError::Cancelled {
                    attempts: attempt + 1,
                });
            }
            attempt += 1;
        }
    }

    fn record_response(&self, record: ResponseRecord) {
        match self.response.write() {
            Ok(mut current) => *current = Some(record),
            Err(poisoned) => *poisoned.into_inner() = Some(record),
        }
    }

    /// Waits before the next retry attempt; no-op with zero backoff.
    async fn wait_before_retry(&self, attempt: usize) {
        let delay_ms = self.options.backoff_ms(attempt);

        #[cfg(feature = "tracing")]
        tracing::debug!("retrying request after {} ms", delay_ms);

        if delay_ms > 0 {
            sleep(Duration::from_millis(delay_ms)).await;
        }
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn set_request_params(&self, params: RequestParams) {
        self.call.lock().await.staged = Some(params);
    }

    async fn write_all(&self, data: &[u8], prefix: &str) -> Result<()> {
        self.write_all_with_method(data, prefix, HttpMethod::Post)
            .await
    }

    async fn read_all(&self) -> Result<Vec<u8>> {
        let mut state = self.call.lock().await;
        if let Some(body) = state.pending_body.take() {
            state.staged = None;
            return Ok(body);
        }

        self.cancel.reset();
        let params = state.staged.take().unwrap_or_default();
        let response = self.perform(HttpMethod::Get, "", &params, None).await?;
        Ok(response.body)
    }

    async fn call(
        &self,
        method: HttpMethod,
        prefix: &str,
        params: RequestParams,
        body: Option<&[u8]>,
    ) -> Result<Vec<u8>> {
        self.request(method, prefix, &params, body).await
    }

    fn current_response(&self) -> Option<ResponseRecord> {
        match self.response.read() {
            Ok(current) => current.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }
}

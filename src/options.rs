/// Default `User-Agent` attached to outbound requests.
pub const DEFAULT_USER_AGENT: &str = concat!("http-rpc-transport/", env!("CARGO_PKG_VERSION"));

/// Configures timeout, retry and header behavior of a transport.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct TransportOptions {
    /// Per-attempt timeout in milliseconds.
    pub timeout_ms: u64,
    /// Maximum number of retries after the initial attempt.
    pub retries_count: usize,
    /// Base retry backoff in milliseconds (exponential strategy).
    ///
    /// `0` retries immediately.
    pub retry_backoff_ms: u64,
    /// Value of the `User-Agent` header sent with every request.
    pub user_agent: String,
}

impl TransportOptions {
    /// Sets how many retries follow a failed initial attempt.
    ///
    /// # Example
    ///
    /// ```
    /// use http_rpc_transport::TransportOptions;
    ///
    /// let options = TransportOptions::default()
    ///     .with_retries(3)
    ///     .with_user_agent("billing-client/2.1");
    /// assert_eq!(options.retries_count, 3);
    /// assert_eq!(options.user_agent, "billing-client/2.1");
    /// ```
    pub fn with_retries(mut self, retries_count: usize) -> Self {
        self.retries_count = retries_count;
        self
    }

    /// Sets the `User-Agent` header value.
    pub fn with_user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = user_agent.into();
        self
    }

    /// Delay before the retry that follows the given failed attempt.
    pub(crate) fn backoff_ms(&self, attempt: usize) -> u64 {
        let exp = attempt.min(16) as u32;
        self.retry_backoff_ms.saturating_mul(1u64 << exp)
    }
}

impl Default for TransportOptions {
    fn default() -> Self {
        Self {
            timeout_ms: 10_000,
            retries_count: 0,
            retry_backoff_ms: 0,
            user_agent: DEFAULT_USER_AGENT.to_owned(),
        }
    }
}

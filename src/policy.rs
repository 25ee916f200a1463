use crate::TransportError;

/// Decides whether a failed attempt ends the retry loop.
pub trait RetryPolicy: Send + Sync {
    /// Returns `true` when the error is permanent and no further attempt
    /// should be made, even with retries remaining.
    fn should_break_on_error(&self, error: &TransportError) -> bool;
}

impl<F> RetryPolicy for F
where
    F: Fn(&TransportError) -> bool + Send + Sync,
{
    fn should_break_on_error(&self, error: &TransportError) -> bool {
        self(error)
    }
}

/// Retries timeouts, connection failures, 5xx, 408 and 429; breaks on
/// everything else.
#[derive(Clone, Copy, Debug, Default)]
pub struct DefaultRetryPolicy;

impl RetryPolicy for DefaultRetryPolicy {
    fn should_break_on_error(&self, error: &TransportError) -> bool {
        !error.is_transient()
    }
}

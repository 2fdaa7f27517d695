//! Retry classification.
//!
//! # Responsibilities
//! - Decide whether an attempt's outcome is a transient failure
//! - Transient: network failure, timeout, 5xx. Never 4xx.
//!
//! # Design Decisions
//! - Request bodies are buffered, so every method can be replayed
//! - Breaker-open rejections are terminal; the retry loop never hammers an open circuit

/// Outcomes (responses or errors) that may warrant another attempt.
pub trait Transient {
    fn is_transient(&self) -> bool;
}

/// 5xx responses are retried; everything else is final.
pub fn is_retryable_status(status: u16) -> bool {
    (500..600).contains(&status)
}

impl Transient for reqwest::Error {
    fn is_transient(&self) -> bool {
        // Builder and redirect-policy errors would fail identically on replay.
        !(self.is_builder() || self.is_redirect())
    }
}

impl Transient for reqwest::StatusCode {
    fn is_transient(&self) -> bool {
        is_retryable_status(self.as_u16())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_classification() {
        assert!(is_retryable_status(500));
        assert!(is_retryable_status(503));
        assert!(is_retryable_status(599));
        assert!(!is_retryable_status(404));
        assert!(!is_retryable_status(429));
        assert!(!is_retryable_status(200));
        assert!(reqwest::StatusCode::BAD_GATEWAY.is_transient());
        assert!(!reqwest::StatusCode::UNAUTHORIZED.is_transient());
    }
}

//! Errors surfaced by the call protocol.
//!
//! Subscribing, unsubscribing, publishing and answering cannot fail.

use std::time::Duration;

/// Why a call finished without an answer.
///
/// Both variants are cancellations: the transient reply subscription has been
/// removed by the time the caller sees either one.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CallError {
    /// The caller's cancellation signal fired
    #[error("call cancelled before an answer arrived")]
    Cancelled,
    /// The deadline elapsed
    #[error("call timed out after {0:?}")]
    TimedOut(Duration),
}

impl CallError {
    /// Whether the call was cancelled. Always true: a deadline is a cancel too.
    #[must_use]
    pub fn is_cancellation(&self) -> bool {
        matches!(self, Self::Cancelled | Self::TimedOut(_))
    }

    /// Whether the call was ended by a deadline rather than an explicit cancel.
    #[must_use]
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::TimedOut(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display() {
        assert_eq!(
            CallError::Cancelled.to_string(),
            "call cancelled before an answer arrived"
        );
        assert_eq!(
            CallError::TimedOut(Duration::from_millis(10)).to_string(),
            "call timed out after 10ms"
        );
    }

    #[test]
    fn timeout_kind() {
        assert!(CallError::TimedOut(Duration::ZERO).is_timeout());
        assert!(!CallError::Cancelled.is_timeout());
    }

    #[test]
    fn every_kind_is_a_cancellation() {
        assert!(CallError::Cancelled.is_cancellation());
        assert!(CallError::TimedOut(Duration::from_secs(1)).is_cancellation());
    }
}

//! Client-facing failure taxonomy.
//!
//! Every way a paid call can fail terminally maps to one [`PaymentError`]
//! variant, so callers can tell "pay differently" apart from "the network is
//! down" and from "your payment was refused".

/// Terminal failure of a paid request.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PaymentError {
    /// The 402 response could not be read as a payment challenge.
    #[error("malformed payment challenge: {0}")]
    MalformedChallenge(String),
    /// None of the offered requirements match the local networks and schemes.
    #[error("no offered payment requirement is supported locally")]
    NoSupportedRequirement,
    /// The signing capability is absent, declined, or timed out.
    #[error("signing unavailable: {0}")]
    SigningUnavailable(String),
    /// The chosen requirement cannot be satisfied with local knowledge.
    #[error("unsupported payment requirement: {0}")]
    UnsupportedRequirement(String),
    /// The server refused the proof on the single retry.
    #[error("payment rejected: {}", .reason.as_deref().unwrap_or("no reason given"))]
    PaymentRejected {
        /// Refusal reason reported by the server.
        reason: Option<String>,
    },
    /// The payment infrastructure could not be reached.
    #[error("upstream unavailable: {0}")]
    UpstreamUnavailable(String),
    /// The request body is a stream and cannot be replayed for the retry.
    #[error("request cannot be cloned for the payment retry")]
    RequestNotCloneable,
}

/// Fieldless mirror of [`PaymentError`] for matching and metrics labels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// See [`PaymentError::MalformedChallenge`].
    MalformedChallenge,
    /// See [`PaymentError::NoSupportedRequirement`].
    NoSupportedRequirement,
    /// See [`PaymentError::SigningUnavailable`].
    SigningUnavailable,
    /// See [`PaymentError::UnsupportedRequirement`].
    UnsupportedRequirement,
    /// See [`PaymentError::PaymentRejected`].
    PaymentRejected,
    /// See [`PaymentError::UpstreamUnavailable`].
    UpstreamUnavailable,
    /// See [`PaymentError::RequestNotCloneable`].
    RequestNotCloneable,
}

impl PaymentError {
    /// The variant without its payload.
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::MalformedChallenge(_) => ErrorKind::MalformedChallenge,
            Self::NoSupportedRequirement => ErrorKind::NoSupportedRequirement,
            Self::SigningUnavailable(_) => ErrorKind::SigningUnavailable,
            Self::UnsupportedRequirement(_) => ErrorKind::UnsupportedRequirement,
            Self::PaymentRejected { .. } => ErrorKind::PaymentRejected,
            Self::UpstreamUnavailable(_) => ErrorKind::UpstreamUnavailable,
            Self::RequestNotCloneable => ErrorKind::RequestNotCloneable,
        }
    }
}

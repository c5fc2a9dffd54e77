//! Upstream failure classification
//!
//! Maps an optional HTTP status plus the provider's message text onto the
//! failure kinds the attempt loop acts on. Pure and table-driven.

use serde::Serialize;

/// How the attempt loop reacts to a failed upstream call
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// Credential rejected or disabled; only the credential is penalized
    Authentication,
    /// Rate limited, overloaded or temporarily unavailable; model and credential penalized
    Transient,
    /// Malformed-request class 4xx; the loop stops
    ClientError,
    /// Network errors, timeouts, other 5xx; model penalized, loop continues
    Other,
}

impl FailureKind {
    /// Label used in logs and metrics
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Authentication => "authentication",
            Self::Transient => "transient",
            Self::ClientError => "client_error",
            Self::Other => "other",
        }
    }

    /// Whether another attempt should follow this failure
    pub fn is_retryable(&self) -> bool {
        !matches!(self, Self::ClientError)
    }

    /// Whether the model used for the attempt takes the blame
    pub fn penalizes_model(&self) -> bool {
        !matches!(self, Self::Authentication)
    }

    /// Whether the credential used for the attempt takes the blame
    pub fn penalizes_credential(&self) -> bool {
        matches!(self, Self::Authentication | Self::Transient)
    }
}

/// Statuses that mean "try again later somewhere else"
pub const TRANSIENT_STATUSES: &[u16] = &[429, 502, 503, 504, 529];

/// Statuses that mean the credential itself is unusable (402: account out of credit)
pub const AUTHENTICATION_STATUSES: &[u16] = &[401, 402, 403];

/// Lower-case message fragments that mark a transient failure
pub const TRANSIENT_KEYWORDS: &[&str] = &[
    "rate limit",
    "rate-limit",
    "rate_limit",
    "too many requests",
    "quota exceeded",
    "overloaded",
    "unavailable",
    "capacity",
];

/// Lower-case message fragments that mark a rejected credential
pub const AUTHENTICATION_KEYWORDS: &[&str] = &[
    "invalid api key",
    "api key disabled",
    "unauthorized",
    "user not found",
    "no auth credentials",
];

/// Classify an upstream failure
///
/// Order: transient status, transient keyword, authentication status or keyword,
/// any other 4xx, everything else. Keyword matching is case-insensitive.
pub fn classify(status: Option<u16>, message: &str) -> FailureKind {
    let message = message.to_lowercase();

    if status.is_some_and(|s| TRANSIENT_STATUSES.contains(&s))
        || TRANSIENT_KEYWORDS.iter().any(|k| message.contains(k))
    {
        return FailureKind::Transient;
    }

    if status.is_some_and(|s| AUTHENTICATION_STATUSES.contains(&s))
        || AUTHENTICATION_KEYWORDS.iter().any(|k| message.contains(k))
    {
        return FailureKind::Authentication;
    }

    match status {
        Some(s) if (400..500).contains(&s) => FailureKind::ClientError,
        _ => FailureKind::Other,
    }
}

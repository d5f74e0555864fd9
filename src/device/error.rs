use std::fmt;

use serde::Serialize;
use thiserror::Error;
use utoipa::ToSchema;

type Cause = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Why a call to the controller failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum TransportErrorKind {
    /// No connection could be made.
    Unreachable,
    /// The bounded wait elapsed.
    Timeout,
    /// The controller answered, but not with what we expected.
    BadResponse,
}

impl fmt::Display for TransportErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Unreachable => "unreachable",
            Self::Timeout => "timeout",
            Self::BadResponse => "bad response",
        })
    }
}

#[derive(Debug, Error)]
#[error("{endpoint}: controller {kind}: {source}")]
pub struct TransportError {
    kind: TransportErrorKind,
    endpoint: &'static str,
    #[source]
    source: Cause,
}

impl TransportError {
    pub fn new(kind: TransportErrorKind, endpoint: &'static str, source: impl Into<Cause>) -> Self {
        Self {
            kind,
            endpoint,
            source: source.into(),
        }
    }

    /// Classify a reqwest failure. Timeouts win over everything else since
    /// they can surface from connect, send or body read.
    pub(crate) fn from_reqwest(endpoint: &'static str, e: reqwest::Error) -> Self {
        let kind = if e.is_timeout() {
            TransportErrorKind::Timeout
        } else if e.is_status() || e.is_decode() || e.is_body() {
            TransportErrorKind::BadResponse
        } else {
            TransportErrorKind::Unreachable
        };
        Self::new(kind, endpoint, e)
    }

    pub(crate) fn bad_response(endpoint: &'static str, source: impl Into<Cause>) -> Self {
        Self::new(TransportErrorKind::BadResponse, endpoint, source)
    }

    pub fn kind(&self) -> TransportErrorKind {
        self.kind
    }

    pub fn endpoint(&self) -> &'static str {
        self.endpoint
    }
}

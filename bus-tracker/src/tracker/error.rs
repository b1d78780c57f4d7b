//! Retrieval error taxonomy.
//!
//! Every failure of the live-data pipeline is reported as a
//! [`RetrievalError`]. Lower layers pick the kind; upper layers pass the
//! error through untouched so the kind survives end to end.

use std::error::Error as StdError;
use std::fmt;

/// Boxed low-level cause, kept for diagnostics only.
pub type Cause = Box<dyn StdError + Send + Sync + 'static>;

/// The kinds of retrieval failure. Each kind has exactly one user-facing
/// message, see [`RetrievalErrorKind::user_message`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RetrievalErrorKind {
    /// No network is available; no connection was attempted.
    NoConnectivity,
    /// The API host name could not be resolved.
    HostResolutionFailure,
    /// The request ended up on a different host than the one asked for.
    RedirectHostMismatch,
    /// The response could not be parsed.
    MalformedResponse,
    /// The API key was rejected.
    AuthenticationRejected,
    /// The remote system is down for maintenance.
    RemoteMaintenance,
    /// The remote system is overloaded.
    RemoteOverloaded,
    /// The remote system reported an internal fault.
    ServerFault,
    /// Anything not covered above.
    Unknown,
}

impl RetrievalErrorKind {
    /// Message shown to the user for this kind of failure.
    pub fn user_message(self) -> &'static str {
        match self {
            RetrievalErrorKind::NoConnectivity => {
                "No network connection. Check your connection and try again."
            }
            RetrievalErrorKind::HostResolutionFailure => {
                "Could not reach the bus tracker server. Check your connection and try again."
            }
            RetrievalErrorKind::RedirectHostMismatch => {
                "The connection was redirected. If you are on a Wi-Fi network you may need to \
                 sign in first."
            }
            RetrievalErrorKind::MalformedResponse => {
                "The bus tracker server returned data that could not be understood."
            }
            RetrievalErrorKind::AuthenticationRejected => {
                "The bus tracker server rejected this app's key. Please update the app."
            }
            RetrievalErrorKind::RemoteMaintenance => {
                "The bus tracker system is down for maintenance. Please try again later."
            }
            RetrievalErrorKind::RemoteOverloaded => {
                "The bus tracker system is overloaded. Please try again shortly."
            }
            RetrievalErrorKind::ServerFault => {
                "The bus tracker server had a problem handling the request."
            }
            RetrievalErrorKind::Unknown => "An unknown error occurred while loading bus times.",
        }
    }

    /// Map a fault code from the tracker API onto a kind.
    pub fn from_fault_code(code: &str) -> Self {
        match code {
            "INVALID_APP_KEY" => RetrievalErrorKind::AuthenticationRejected,
            "SYSTEM_MAINTENANCE" => RetrievalErrorKind::RemoteMaintenance,
            "SYSTEM_OVERLOADED" => RetrievalErrorKind::RemoteOverloaded,
            "PROCESSING_ERROR" | "INVALID_PARAMETER" => RetrievalErrorKind::ServerFault,
            _ => RetrievalErrorKind::Unknown,
        }
    }

    /// Map a non-success HTTP status onto a kind.
    pub fn from_status(status: reqwest::StatusCode) -> Self {
        use reqwest::StatusCode;

        match status {
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
                RetrievalErrorKind::AuthenticationRejected
            }
            StatusCode::TOO_MANY_REQUESTS => RetrievalErrorKind::RemoteOverloaded,
            StatusCode::SERVICE_UNAVAILABLE => RetrievalErrorKind::RemoteMaintenance,
            s if s.is_server_error() => RetrievalErrorKind::ServerFault,
            _ => RetrievalErrorKind::Unknown,
        }
    }
}

impl fmt::Display for RetrievalErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            RetrievalErrorKind::NoConnectivity => "no network connectivity",
            RetrievalErrorKind::HostResolutionFailure => "host resolution failed",
            RetrievalErrorKind::RedirectHostMismatch => "redirected to a different host",
            RetrievalErrorKind::MalformedResponse => "malformed response",
            RetrievalErrorKind::AuthenticationRejected => "authentication rejected",
            RetrievalErrorKind::RemoteMaintenance => "remote system under maintenance",
            RetrievalErrorKind::RemoteOverloaded => "remote system overloaded",
            RetrievalErrorKind::ServerFault => "server fault",
            RetrievalErrorKind::Unknown => "unknown retrieval error",
        };
        f.write_str(text)
    }
}

/// A failed retrieval: a kind plus an optional low-level cause.
#[derive(Debug, thiserror::Error)]
#[error("{kind}")]
pub struct RetrievalError {
    kind: RetrievalErrorKind,
    #[source]
    cause: Option<Cause>,
}

impl RetrievalError {
    pub fn new(kind: RetrievalErrorKind) -> Self {
        Self { kind, cause: None }
    }

    pub fn with_cause(kind: RetrievalErrorKind, cause: impl Into<Cause>) -> Self {
        Self {
            kind,
            cause: Some(cause.into()),
        }
    }

    pub fn kind(&self) -> RetrievalErrorKind {
        self.kind
    }

    pub fn cause(&self) -> Option<&(dyn StdError + Send + Sync + 'static)> {
        self.cause.as_deref()
    }

    pub fn user_message(&self) -> &'static str {
        self.kind.user_message()
    }

    pub fn no_connectivity() -> Self {
        Self::new(RetrievalErrorKind::NoConnectivity)
    }

    pub fn malformed(cause: impl Into<Cause>) -> Self {
        Self::with_cause(RetrievalErrorKind::MalformedResponse, cause)
    }
}

impl From<RetrievalErrorKind> for RetrievalError {
    fn from(kind: RetrievalErrorKind) -> Self {
        Self::new(kind)
    }
}

impl From<reqwest::Error> for RetrievalError {
    fn from(err: reqwest::Error) -> Self {
        let kind = if err.is_decode() {
            RetrievalErrorKind::MalformedResponse
        } else if let Some(status) = err.status() {
            RetrievalErrorKind::from_status(status)
        } else if is_dns_failure(&err) {
            RetrievalErrorKind::HostResolutionFailure
        } else {
            RetrievalErrorKind::Unknown
        };
        Self::with_cause(kind, err)
    }
}

/// reqwest does not expose DNS failures as a distinct flag; the resolver
/// error is somewhere in the source chain.
fn is_dns_failure(err: &reqwest::Error) -> bool {
    err.is_connect() && mentions_dns(err.source())
}

fn mentions_dns(mut source: Option<&(dyn StdError + 'static)>) -> bool {
    while let Some(e) = source {
        if e.to_string().contains("dns error") {
            return true;
        }
        source = e.source();
    }
    false
}

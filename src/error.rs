//! Error types for Provestor
//!
//! Every failure carries an [`ErrorKind`], a short human message and an
//! optional cause. Wrapping adds context but keeps the kind, so a `NotFound`
//! raised deep inside the copier is still a `NotFound` at the API surface.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Result type alias using our Error type
pub type Result<T> = std::result::Result<T, Error>;

type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

// =============================================================================
// Error Kinds
// =============================================================================

/// Structured error classification shared by the engine, ledger and wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ErrorKind {
    Internal,
    Param,
    Config,
    NotFound,
    Encoding,
    NotAuthorized,
    AlreadyExists,
    BadSignature,
    Crypto,
    Expired,
    ReadLedger,
    WriteLedger,
    AlreadyUpdate,
}

impl ErrorKind {
    /// Stable code used in logs and HTTP error bodies.
    pub fn code(&self) -> &'static str {
        match self {
            ErrorKind::Internal => "Internal",
            ErrorKind::Param => "Param",
            ErrorKind::Config => "Config",
            ErrorKind::NotFound => "NotFound",
            ErrorKind::Encoding => "Encoding",
            ErrorKind::NotAuthorized => "NotAuthorized",
            ErrorKind::AlreadyExists => "AlreadyExists",
            ErrorKind::BadSignature => "BadSignature",
            ErrorKind::Crypto => "Crypto",
            ErrorKind::Expired => "Expired",
            ErrorKind::ReadLedger => "ReadLedger",
            ErrorKind::WriteLedger => "WriteLedger",
            ErrorKind::AlreadyUpdate => "AlreadyUpdate",
        }
    }

    /// Parse a code produced by [`ErrorKind::code`]. Unknown codes map to Internal.
    pub fn from_code(code: &str) -> Self {
        match code {
            "Param" => ErrorKind::Param,
            "Config" => ErrorKind::Config,
            "NotFound" => ErrorKind::NotFound,
            "Encoding" => ErrorKind::Encoding,
            "NotAuthorized" => ErrorKind::NotAuthorized,
            "AlreadyExists" => ErrorKind::AlreadyExists,
            "BadSignature" => ErrorKind::BadSignature,
            "Crypto" => ErrorKind::Crypto,
            "Expired" => ErrorKind::Expired,
            "ReadLedger" => ErrorKind::ReadLedger,
            "WriteLedger" => ErrorKind::WriteLedger,
            "AlreadyUpdate" => ErrorKind::AlreadyUpdate,
            _ => ErrorKind::Internal,
        }
    }

    /// HTTP status code used when this kind crosses the wire.
    pub fn http_status(&self) -> u16 {
        match self {
            ErrorKind::Param | ErrorKind::Encoding => 400,
            ErrorKind::BadSignature => 401,
            ErrorKind::NotAuthorized => 403,
            ErrorKind::NotFound => 404,
            ErrorKind::AlreadyExists | ErrorKind::AlreadyUpdate => 409,
            ErrorKind::Expired => 410,
            _ => 500,
        }
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.code())
    }
}

// =============================================================================
// Error
// =============================================================================

/// Errors that can occur anywhere in Provestor
#[derive(Error, Debug)]
#[error("[{kind}] {message}")]
pub struct Error {
    kind: ErrorKind,
    message: String,
    #[source]
    source: Option<BoxError>,
}

impl Error {
    /// Create an error of the given kind.
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            source: None,
        }
    }

    /// Create an error of the given kind with an underlying cause.
    pub fn with_source(
        kind: ErrorKind,
        message: impl Into<String>,
        source: impl Into<BoxError>,
    ) -> Self {
        Self {
            kind,
            message: message.into(),
            source: Some(source.into()),
        }
    }

    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    /// True if this error is of the given kind.
    pub fn is(&self, kind: ErrorKind) -> bool {
        self.kind == kind
    }

    /// Add context while keeping the original kind.
    pub fn wrap(mut self, context: impl std::fmt::Display) -> Self {
        self.message = format!("{}: {}", context, self.message);
        self
    }

    /// Explicitly change the kind.
    pub fn rekind(mut self, kind: ErrorKind) -> Self {
        self.kind = kind;
        self
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Internal, message)
    }

    pub fn param(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Param, message)
    }

    pub fn config(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Config, message)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::NotFound, message)
    }

    pub fn encoding(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Encoding, message)
    }

    pub fn not_authorized(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::NotAuthorized, message)
    }

    pub fn already_exists(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::AlreadyExists, message)
    }

    pub fn bad_signature(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::BadSignature, message)
    }

    pub fn crypto(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Crypto, message)
    }

    pub fn expired(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Expired, message)
    }

    pub fn already_update(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::AlreadyUpdate, message)
    }
}

/// Extension for attaching context to results without losing the kind.
pub trait ResultExt<T> {
    fn context(self, context: impl std::fmt::Display) -> Result<T>;
}

impl<T> ResultExt<T> for Result<T> {
    fn context(self, context: impl std::fmt::Display) -> Result<T> {
        self.map_err(|e| e.wrap(context))
    }
}

impl From<std::io::Error> for Error {
    fn from(e: std::io::Error) -> Self {
        let kind = if e.kind() == std::io::ErrorKind::NotFound {
            ErrorKind::NotFound
        } else {
            ErrorKind::Internal
        };
        Error::with_source(kind, format!("I/O error: {}", e), e)
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::with_source(ErrorKind::Encoding, format!("JSON error: {}", e), e)
    }
}

impl From<reqwest::Error> for Error {
    fn from(e: reqwest::Error) -> Self {
        Error::with_source(ErrorKind::Internal, format!("HTTP error: {}", e), e)
    }
}

impl From<hex::FromHexError> for Error {
    fn from(e: hex::FromHexError) -> Self {
        Error::with_source(ErrorKind::Encoding, format!("hex decode error: {}", e), e)
    }
}

/// JSON body used when an error crosses an HTTP boundary.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorBody {
    pub code: String,
    pub message: String,
}

impl From<&Error> for ErrorBody {
    fn from(e: &Error) -> Self {
        Self {
            code: e.kind.code().to_string(),
            message: e.message.clone(),
        }
    }
}

impl From<ErrorBody> for Error {
    fn from(body: ErrorBody) -> Self {
        Error::new(ErrorKind::from_code(&body.code), body.message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wrap_preserves_kind() {
        let err = Error::not_found("slice missing").wrap("failed to pull");
        assert_eq!(err.kind(), ErrorKind::NotFound);
        assert_eq!(err.message(), "failed to pull: slice missing");
        assert_eq!(err.to_string(), "[NotFound] failed to pull: slice missing");
    }

    #[test]
    fn test_rekind() {
        let err = Error::internal("boom").rekind(ErrorKind::Crypto);
        assert!(err.is(ErrorKind::Crypto));
    }

    #[test]
    fn test_code_roundtrip_and_status() {
        for kind in [
            ErrorKind::Internal,
            ErrorKind::Param,
            ErrorKind::Config,
            ErrorKind::NotFound,
            ErrorKind::Encoding,
            ErrorKind::NotAuthorized,
            ErrorKind::AlreadyExists,
            ErrorKind::BadSignature,
            ErrorKind::Crypto,
            ErrorKind::Expired,
            ErrorKind::ReadLedger,
            ErrorKind::WriteLedger,
            ErrorKind::AlreadyUpdate,
        ] {
            assert_eq!(ErrorKind::from_code(kind.code()), kind);
        }
        assert_eq!(ErrorKind::Param.http_status(), 400);
        assert_eq!(ErrorKind::AlreadyExists.http_status(), 409);
        assert_eq!(ErrorKind::from_code("bogus"), ErrorKind::Internal);
    }

    #[test]
    fn test_io_not_found_maps_kind() {
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "nope");
        let err: Error = io.into();
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }

    #[test]
    fn test_error_body_roundtrip() {
        let err = Error::bad_signature("verify failed");
        let body = ErrorBody::from(&err);
        let back: Error = body.into();
        assert_eq!(back.kind(), ErrorKind::BadSignature);
        assert_eq!(back.message(), "verify failed");
    }
}

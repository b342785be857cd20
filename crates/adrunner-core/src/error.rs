//! Error taxonomy for ad resolution and playback.
//!
//! Resolution problems never escape `resolve_chain`; they are recorded as an
//! [`ErrorCode`] plus [`AdError`] on the terminal chain link. Lifecycle and
//! contract problems surface as [`AdRunError`].

use serde::{Deserialize, Serialize};

/// Numeric VAST error code attached to chain links and unit errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ErrorCode(pub u16);

impl ErrorCode {
    /// The document could not be parsed.
    pub const XML_PARSING: ErrorCode = ErrorCode(100);
    /// The ad carries neither a wrapper nor an inline body.
    pub const SCHEMA_VALIDATION: ErrorCode = ErrorCode(101);
    /// The ad type is not accepted here (forbidden re-wrap, disabled VPAID).
    pub const UNEXPECTED_AD_TYPE: ErrorCode = ErrorCode(200);
    /// More than one ad was returned where multiple ads are disallowed.
    pub const MULTIPLE_ADS_DISALLOWED: ErrorCode = ErrorCode(203);
    /// The time budget ran out.
    pub const TIMEOUT: ErrorCode = ErrorCode(301);
    /// The document contained no ad.
    pub const NO_ADS: ErrorCode = ErrorCode(303);
    /// Too many wrapper hops.
    pub const WRAPPER_LIMIT_REACHED: ErrorCode = ErrorCode(304);
    /// No media file the player can play.
    pub const MEDIA_FILE_NOT_SUPPORTED: ErrorCode = ErrorCode(403);
    /// The media element failed while displaying the media file.
    pub const MEDIA_FILE_PROBLEM: ErrorCode = ErrorCode(405);
    /// The document could not be fetched.
    pub const TRANSPORT: ErrorCode = ErrorCode(502);
    pub const UNKNOWN: ErrorCode = ErrorCode(900);
    /// General interactive-creative error.
    pub const VPAID_ERROR: ErrorCode = ErrorCode(901);

    pub fn as_u16(self) -> u16 {
        self.0
    }
}

impl std::fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Error descriptor carried on chain links and reported by playback units.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, thiserror::Error)]
#[error("{message}")]
pub struct AdError {
    pub code: Option<ErrorCode>,
    pub message: String,
}

impl AdError {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code: Some(code),
            message: message.into(),
        }
    }

    /// Error without a numeric code, as raised by some creatives.
    pub fn uncoded(message: impl Into<String>) -> Self {
        Self {
            code: None,
            message: message.into(),
        }
    }

    /// Fixed descriptor used when a creative reports an error without details.
    pub fn vpaid_general() -> Self {
        Self::new(ErrorCode::VPAID_ERROR, "VPAID general error")
    }
}

/// Failure of the document transport.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("transport error: {0}")]
pub struct TransportError(pub String);

/// Failure to turn a raw document into a [`crate::VastDocument`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("parse error: {0}")]
pub struct ParseError(pub String);

impl From<serde_json::Error> for ParseError {
    fn from(err: serde_json::Error) -> Self {
        ParseError(err.to_string())
    }
}

/// Errors produced by the resolver, playback units and the waterfall.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum AdRunError {
    #[error("invalid ad chain")]
    InvalidChain,

    #[error("no next ad to request")]
    NoNextAd,

    #[error("playback unit already started")]
    AlreadyStarted,

    #[error("playback unit is finished")]
    AlreadyFinished,

    #[error("ad run timed out")]
    Timeout,

    #[error("playback unit did not start")]
    StartFailed,

    #[error("ad cannot be skipped yet")]
    NotSkippable,

    #[error("{0}")]
    Ad(#[from] AdError),
}

impl AdRunError {
    /// Numeric code when one applies.
    pub fn code(&self) -> Option<ErrorCode> {
        match self {
            AdRunError::Ad(err) => err.code,
            AdRunError::Timeout => Some(ErrorCode::TIMEOUT),
            _ => None,
        }
    }
}

/// Result type for adrunner operations.
pub type Result<T> = std::result::Result<T, AdRunError>;

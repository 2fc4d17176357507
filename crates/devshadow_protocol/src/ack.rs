//! Acknowledgment codes for update requests.

use std::fmt;

/// Outcome classification of an update request.
///
/// `None` is the initial value of a synchronous wait; every other variant
/// is terminal. Numeric codes follow the cloud's reply `errorcode` values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AckCode {
    /// No outcome yet.
    None,
    /// No reply arrived before the deadline.
    Timeout,
    /// The reply did not carry a recognizable status.
    InvalidReply,
    /// The request was accepted.
    Success,
    /// 400: the request was not valid JSON.
    JsonFormatInvalid,
    /// 401: the `method` field was missing.
    MethodIsNull,
    /// 402: the `state` field was missing.
    StateIsNull,
    /// 403: the `version` field was invalid.
    VersionIsInvalid,
    /// 404: the `reported` field was missing.
    ReportedIsNull,
    /// 405: a reported attribute was null.
    ReportedAttributeIsNull,
    /// 406: the `method` value is not supported.
    MethodIsError,
    /// 407: the cloud holds no shadow document yet.
    ShadowDocumentIsNull,
    /// 408: too many attributes.
    AttributeExceeded,
    /// 500: the cloud failed to process the request.
    ServerFailed,
    /// Any other code.
    Unknown(i32),
}

impl AckCode {
    /// Converts a numeric code into an ack code.
    pub fn from_code(code: i32) -> Self {
        match code {
            0 => AckCode::None,
            -1 => AckCode::Timeout,
            -2 => AckCode::InvalidReply,
            200 => AckCode::Success,
            400 => AckCode::JsonFormatInvalid,
            401 => AckCode::MethodIsNull,
            402 => AckCode::StateIsNull,
            403 => AckCode::VersionIsInvalid,
            404 => AckCode::ReportedIsNull,
            405 => AckCode::ReportedAttributeIsNull,
            406 => AckCode::MethodIsError,
            407 => AckCode::ShadowDocumentIsNull,
            408 => AckCode::AttributeExceeded,
            500 => AckCode::ServerFailed,
            other => AckCode::Unknown(other),
        }
    }

    /// Converts a code received from the cloud.
    ///
    /// Only cloud codes are recognized; the local sentinels `0`, `-1` and
    /// `-2` arrive as [`AckCode::Unknown`].
    pub fn from_wire(code: i32) -> Self {
        match code {
            0 | -1 | -2 => AckCode::Unknown(code),
            other => Self::from_code(other),
        }
    }

    /// Returns the numeric code.
    pub fn code(&self) -> i32 {
        match self {
            AckCode::None => 0,
            AckCode::Timeout => -1,
            AckCode::InvalidReply => -2,
            AckCode::Success => 200,
            AckCode::JsonFormatInvalid => 400,
            AckCode::MethodIsNull => 401,
            AckCode::StateIsNull => 402,
            AckCode::VersionIsInvalid => 403,
            AckCode::ReportedIsNull => 404,
            AckCode::ReportedAttributeIsNull => 405,
            AckCode::MethodIsError => 406,
            AckCode::ShadowDocumentIsNull => 407,
            AckCode::AttributeExceeded => 408,
            AckCode::ServerFailed => 500,
            AckCode::Unknown(code) => *code,
        }
    }

    /// Returns true once an outcome is known.
    pub fn is_terminal(&self) -> bool {
        *self != AckCode::None
    }

    /// Returns true if the outcome counts as an accepted update.
    ///
    /// An empty remote document is not a failure.
    pub fn is_accepted(&self) -> bool {
        matches!(self, AckCode::Success | AckCode::ShadowDocumentIsNull)
    }
}

impl fmt::Display for AckCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AckCode::Unknown(code) => write!(f, "unknown ({code})"),
            other => write!(f, "{other:?} ({})", other.code()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codes_round_trip() {
        for code in [0, -1, -2, 200, 400, 401, 402, 403, 404, 405, 406, 407, 408, 500, 999] {
            assert_eq!(AckCode::from_code(code).code(), code);
        }
    }

    #[test]
    fn wire_codes_never_become_sentinels() {
        assert_eq!(AckCode::from_wire(0), AckCode::Unknown(0));
        assert_eq!(AckCode::from_wire(-1), AckCode::Unknown(-1));
        assert_eq!(AckCode::from_wire(-2), AckCode::Unknown(-2));
        assert_eq!(AckCode::from_wire(407), AckCode::ShadowDocumentIsNull);
        assert_eq!(AckCode::from_wire(200), AckCode::Success);
    }

    #[test]
    fn accepted_outcomes() {
        assert!(AckCode::Success.is_accepted());
        assert!(AckCode::ShadowDocumentIsNull.is_accepted());
        assert!(!AckCode::Timeout.is_accepted());
        assert!(!AckCode::ServerFailed.is_accepted());
        assert!(!AckCode::None.is_terminal());
        assert!(AckCode::Unknown(600).is_terminal());
    }
}

use std::fmt;

/// Canonical gRPC status codes.
///
/// Kept as plain `i32` constants rather than an enum so that codes a
/// server invents outside the canonical set survive the round trip to
/// the caller instead of collapsing into a catch-all variant.
pub mod code {
    pub const OK: i32 = 0;
    pub const CANCELLED: i32 = 1;
    pub const UNKNOWN: i32 = 2;
    pub const INVALID_ARGUMENT: i32 = 3;
    pub const DEADLINE_EXCEEDED: i32 = 4;
    pub const NOT_FOUND: i32 = 5;
    pub const ALREADY_EXISTS: i32 = 6;
    pub const PERMISSION_DENIED: i32 = 7;
    pub const RESOURCE_EXHAUSTED: i32 = 8;
    pub const FAILED_PRECONDITION: i32 = 9;
    pub const ABORTED: i32 = 10;
    pub const OUT_OF_RANGE: i32 = 11;
    pub const UNIMPLEMENTED: i32 = 12;
    pub const INTERNAL: i32 = 13;
    pub const UNAVAILABLE: i32 = 14;
    pub const DATA_LOSS: i32 = 15;
    pub const UNAUTHENTICATED: i32 = 16;
}

/// Result of a Workload API operation.
///
/// Errors are values: every operation returns a `Status` (or carries
/// one in its `Err`), and a streaming callback reports failure by
/// returning a non-OK `Status` rather than panicking. `code` 0 means
/// the operation completed normally.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Status {
    pub code: i32,
    pub message: String,
}

impl Status {
    pub fn new(code: i32, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    pub fn ok() -> Self {
        Self::default()
    }

    pub fn is_ok(&self) -> bool {
        self.code == code::OK
    }

    /// The canonical name of the status code, or `UNKNOWN_STATUS_CODE`
    /// for codes outside the canonical set.
    pub fn code_str(&self) -> &'static str {
        match self.code {
            code::OK => "OK",
            code::CANCELLED => "CANCELLED",
            code::UNKNOWN => "UNKNOWN",
            code::INVALID_ARGUMENT => "INVALID_ARGUMENT",
            code::DEADLINE_EXCEEDED => "DEADLINE_EXCEEDED",
            code::NOT_FOUND => "NOT_FOUND",
            code::ALREADY_EXISTS => "ALREADY_EXISTS",
            code::PERMISSION_DENIED => "PERMISSION_DENIED",
            code::RESOURCE_EXHAUSTED => "RESOURCE_EXHAUSTED",
            code::FAILED_PRECONDITION => "FAILED_PRECONDITION",
            code::ABORTED => "ABORTED",
            code::OUT_OF_RANGE => "OUT_OF_RANGE",
            code::UNIMPLEMENTED => "UNIMPLEMENTED",
            code::INTERNAL => "INTERNAL",
            code::UNAVAILABLE => "UNAVAILABLE",
            code::DATA_LOSS => "DATA_LOSS",
            code::UNAUTHENTICATED => "UNAUTHENTICATED",
            _ => "UNKNOWN_STATUS_CODE",
        }
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.message.is_empty() {
            write!(f, "{}", self.code_str())
        } else {
            write!(f, "{}: {}", self.code_str(), self.message)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn canonical_code_names() {
        assert_eq!(Status::new(0, "").code_str(), "OK");
        assert_eq!(Status::new(1, "").code_str(), "CANCELLED");
        assert_eq!(Status::new(13, "").code_str(), "INTERNAL");
        assert_eq!(Status::new(99, "").code_str(), "UNKNOWN_STATUS_CODE");
        assert_eq!(Status::new(-1, "").code_str(), "UNKNOWN_STATUS_CODE");
    }

    #[test]
    fn ok_only_for_code_zero() {
        assert!(Status::ok().is_ok());
        assert!(Status::default().is_ok());
        assert!(!Status::new(code::CANCELLED, "user canceled").is_ok());
    }

    #[test]
    fn display_includes_message() {
        let status = Status::new(code::PERMISSION_DENIED, "denied by policy");
        assert_eq!(status.to_string(), "PERMISSION_DENIED: denied by policy");
        assert_eq!(Status::ok().to_string(), "OK");
    }
}

//! Message codes and the default code table

use std::collections::HashMap;
use std::fmt;

/// A single message type with an indicator of whether a message of this
/// type should be treated as an error
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Code {
    /// Whether the code represents an error condition
    pub error: bool,
    /// Symbolic name of the code
    pub name: String,
}

impl Code {
    /// Create a new code
    pub fn new(error: bool, name: impl Into<String>) -> Self {
        Code {
            error,
            name: name.into(),
        }
    }
}

/// The error value returned by logging calls whose resolved code carries
/// the error flag. Its display is the formatted message alone, so call
/// sites can both log and propagate the same payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CodedError {
    code: i64,
    message: String,
}

impl CodedError {
    pub(crate) fn new(code: i64, message: impl Into<String>) -> Self {
        CodedError {
            code,
            message: message.into(),
        }
    }

    /// The message code that produced this error
    pub fn code(&self) -> i64 {
        self.code
    }
}

impl fmt::Display for CodedError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

impl std::error::Error for CodedError {}

/// Mapping of integer message codes to their symbolic names.
///
/// The table starts out with the defaults. Codes strictly between 1 and
/// 999 may be replaced with custom ones; 0, 1, 999 and everything outside
/// that range are immutable.
#[derive(Debug, Clone)]
pub struct CodeTable {
    codes: HashMap<i64, Code>,
}

impl Default for CodeTable {
    fn default() -> Self {
        CodeTable {
            codes: default_codes(),
        }
    }
}

impl CodeTable {
    /// Resolve a code to its (name, error flag) pair. Unknown codes
    /// resolve to `UNKNOWN` with the error flag set.
    pub fn resolve(&self, code: i64) -> (String, bool) {
        match self.codes.get(&code) {
            Some(c) => (c.name.clone(), c.error),
            None => ("UNKNOWN".to_string(), true),
        }
    }

    /// Merge custom codes into the table. Codes outside the open
    /// interval (1, 999) are silently ignored.
    pub fn merge(&mut self, custom: HashMap<i64, Code>) {
        for (code, value) in custom {
            if code > 1 && code < 999 {
                self.codes.insert(code, value);
            }
        }
    }
}

/// Default message codes: a handful of generic conditions plus the HTTP
/// status codes
pub fn default_codes() -> HashMap<i64, Code> {
    let defaults: [(i64, bool, &str); 66] = [
        (0, false, "Notification"),
        (1, true, "GeneralError"),
        (2, true, "ConfigurationError"),
        (3, true, "FailedAction"),
        (4, true, "UserError"),
        (10, true, "CatastrophicFailure"),
        (100, false, "HTTP-StatusContinue"),
        (101, false, "HTTP-StatusSwitchingProtocols"),
        (102, false, "HTTP-StatusProcessing"),
        (200, false, "HTTP-StatusOK"),
        (201, false, "HTTP-StatusCreated"),
        (202, false, "HTTP-StatusAccepted"),
        (203, false, "HTTP-StatusNonAuthoritativeInfo"),
        (204, false, "HTTP-StatusNoContent"),
        (205, false, "HTTP-StatusResetContent"),
        (206, false, "HTTP-StatusPartialContent"),
        (207, false, "HTTP-StatusMultiStatus"),
        (208, false, "HTTP-StatusAlreadyReported"),
        (226, false, "HTTP-StatusIMUsed"),
        (300, false, "HTTP-StatusMultipleChoices"),
        (301, false, "HTTP-StatusMovedPermanently"),
        (302, false, "HTTP-StatusFound"),
        (303, false, "HTTP-StatusSeeOther"),
        (304, false, "HTTP-StatusNotModified"),
        (305, false, "HTTP-StatusUseProxy"),
        (307, false, "HTTP-StatusTemporaryRedirect"),
        (308, false, "HTTP-StatusPermanentRedirect"),
        (400, true, "HTTP-StatusBadRequest"),
        (401, true, "HTTP-StatusUnauthorized"),
        (402, true, "HTTP-StatusPaymentRequired"),
        (403, true, "HTTP-StatusForbidden"),
        (404, true, "HTTP-StatusNotFound"),
        (405, true, "HTTP-StatusMethodNotAllowed"),
        (406, true, "HTTP-StatusNotAcceptable"),
        (407, true, "HTTP-StatusProxyAuthRequired"),
        (408, true, "HTTP-StatusRequestTimeout"),
        (409, true, "HTTP-StatusConflict"),
        (410, true, "HTTP-StatusGone"),
        (411, true, "HTTP-StatusLengthRequired"),
        (412, true, "HTTP-StatusPreconditionFailed"),
        (413, true, "HTTP-StatusRequestEntityTooLarge"),
        (414, true, "HTTP-StatusRequestURITooLong"),
        (415, true, "HTTP-StatusUnsupportedMediaType"),
        (416, true, "HTTP-StatusRequestedRangeNotSatisfiable"),
        (417, true, "HTTP-StatusExpectationFailed"),
        (418, true, "HTTP-StatusTeapot"),
        (422, true, "HTTP-StatusUnprocessableEntity"),
        (423, true, "HTTP-StatusLocked"),
        (424, true, "HTTP-StatusFailedDependency"),
        (426, true, "HTTP-StatusUpgradeRequired"),
        (428, true, "HTTP-StatusPreconditionRequired"),
        (429, true, "HTTP-StatusTooManyRequests"),
        (431, true, "HTTP-StatusRequestHeaderFieldsTooLarge"),
        (451, true, "HTTP-StatusUnavailableForLegalReasons"),
        (500, true, "HTTP-StatusInternalServerError"),
        (501, true, "HTTP-StatusNotImplemented"),
        (502, true, "HTTP-StatusBadGateway"),
        (503, true, "HTTP-StatusServiceUnavailable"),
        (504, true, "HTTP-StatusGatewayTimeout"),
        (505, true, "HTTP-StatusHTTPVersionNotSupported"),
        (506, true, "HTTP-StatusVariantAlsoNegotiates"),
        (507, true, "HTTP-StatusInsufficientStorage"),
        (508, true, "HTTP-StatusLoopDetected"),
        (510, true, "HTTP-StatusNotExtended"),
        (511, true, "HTTP-StatusNetworkAuthenticationRequired"),
        (999, true, "Exception/Unintended"),
    ];

    defaults
        .iter()
        .map(|(code, error, name)| (*code, Code::new(*error, *name)))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_resolutions() {
        let table = CodeTable::default();
        assert_eq!(table.resolve(0), ("Notification".to_string(), false));
        assert_eq!(table.resolve(1), ("GeneralError".to_string(), true));
        assert_eq!(table.resolve(2), ("ConfigurationError".to_string(), true));
        assert_eq!(table.resolve(10), ("CatastrophicFailure".to_string(), true));
        assert_eq!(table.resolve(200), ("HTTP-StatusOK".to_string(), false));
        assert_eq!(table.resolve(404), ("HTTP-StatusNotFound".to_string(), true));
        assert_eq!(
            table.resolve(500),
            ("HTTP-StatusInternalServerError".to_string(), true)
        );
        assert_eq!(table.resolve(999), ("Exception/Unintended".to_string(), true));
    }

    #[test]
    fn test_unknown_code_is_error() {
        let table = CodeTable::default();
        assert_eq!(table.resolve(12345), ("UNKNOWN".to_string(), true));
        assert_eq!(table.resolve(-1), ("UNKNOWN".to_string(), true));
    }

    #[test]
    fn test_merge_custom_codes() {
        let mut table = CodeTable::default();
        let mut custom = HashMap::new();
        custom.insert(42, Code::new(false, "MyInfo"));
        table.merge(custom);
        assert_eq!(table.resolve(42), ("MyInfo".to_string(), false));
    }

    #[test]
    fn test_merge_ignores_immutable_codes() {
        let mut table = CodeTable::default();
        let mut custom = HashMap::new();
        custom.insert(0, Code::new(true, "Bad"));
        custom.insert(1, Code::new(false, "AlsoBad"));
        custom.insert(999, Code::new(false, "StillBad"));
        custom.insert(1000, Code::new(false, "OutOfRange"));
        custom.insert(-5, Code::new(false, "Negative"));
        table.merge(custom);

        assert_eq!(table.resolve(0), ("Notification".to_string(), false));
        assert_eq!(table.resolve(1), ("GeneralError".to_string(), true));
        assert_eq!(table.resolve(999), ("Exception/Unintended".to_string(), true));
        assert_eq!(table.resolve(1000), ("UNKNOWN".to_string(), true));
        assert_eq!(table.resolve(-5), ("UNKNOWN".to_string(), true));
    }

    #[test]
    fn test_coded_error_display_is_message_only() {
        let err = CodedError::new(1, "boom");
        assert_eq!(err.to_string(), "boom");
        assert_eq!(err.code(), 1);
    }
}

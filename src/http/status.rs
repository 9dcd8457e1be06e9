//! Response status catalog.
//!
//! The code, reason phrase and family of each entry are part of the wire
//! contract and must not drift.

use std::fmt;

/// Status class derived from the hundreds digit of the code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Family {
    Informational,
    Successful,
    Redirection,
    ClientError,
    ServerError,
    Other,
}

impl Family {
    pub fn of(code: u16) -> Self {
        match code / 100 {
            1 => Family::Informational,
            2 => Family::Successful,
            3 => Family::Redirection,
            4 => Family::ClientError,
            5 => Family::ServerError,
            _ => Family::Other,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Family::Informational => "INFORMATIONAL",
            Family::Successful => "SUCCESSFUL",
            Family::Redirection => "REDIRECTION",
            Family::ClientError => "CLIENT_ERROR",
            Family::ServerError => "SERVER_ERROR",
            Family::Other => "OTHER",
        }
    }
}

impl fmt::Display for Family {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

macro_rules! status_catalog {
    ($($variant:ident => ($code:literal, $reason:literal),)+) => {
        /// A response status from the supported catalog.
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        pub enum Status {
            $($variant,)+
        }

        impl Status {
            /// Every status in the catalog, in declaration order.
            pub const ALL: &'static [Status] = &[$(Status::$variant,)+];

            /// Numeric status code.
            pub fn code(&self) -> u16 {
                match self {
                    $(Status::$variant => $code,)+
                }
            }

            /// Reason phrase sent on the status line.
            pub fn reason(&self) -> &'static str {
                match self {
                    $(Status::$variant => $reason,)+
                }
            }

            /// Reverse lookup; `None` for codes outside the catalog.
            pub fn from_code(code: u16) -> Option<Status> {
                match code {
                    $($code => Some(Status::$variant),)+
                    _ => None,
                }
            }
        }
    };
}

status_catalog! {
    Continue => (100, "Continue"),
    Ok => (200, "OK"),
    Created => (201, "Created"),
    Accepted => (202, "Accepted"),
    NoContent => (204, "No Content"),
    ResetContent => (205, "Reset Content"),
    PartialContent => (206, "Partial Content"),
    MovedPermanently => (301, "Moved Permanently"),
    Found => (302, "Found"),
    SeeOther => (303, "See Other"),
    NotModified => (304, "Not Modified"),
    UseProxy => (305, "Use Proxy"),
    TemporaryRedirect => (307, "Temporary Redirect"),
    BadRequest => (400, "Bad Request"),
    Unauthorized => (401, "Unauthorized"),
    PaymentRequired => (402, "Payment Required"),
    Forbidden => (403, "Forbidden"),
    NotFound => (404, "Not Found"),
    MethodNotAllowed => (405, "Method Not Allowed"),
    NotAcceptable => (406, "Not Acceptable"),
    ProxyAuthenticationRequired => (407, "Proxy Authentication Required"),
    RequestTimeout => (408, "Request Timeout"),
    Conflict => (409, "Conflict"),
    Gone => (410, "Gone"),
    LengthRequired => (411, "Length Required"),
    PreconditionFailed => (412, "Precondition Failed"),
    RequestEntityTooLarge => (413, "Request Entity Too Large"),
    RequestUriTooLong => (414, "Request-URI Too Long"),
    UnsupportedMediaType => (415, "Unsupported Media Type"),
    RequestedRangeNotSatisfiable => (416, "Requested Range Not Satisfiable"),
    ExpectationFailed => (417, "Expectation Failed"),
    InternalServerError => (500, "Internal Server Error"),
    NotImplemented => (501, "Not Implemented"),
    BadGateway => (502, "Bad Gateway"),
    ServiceUnavailable => (503, "Service Unavailable"),
    GatewayTimeout => (504, "Gateway Timeout"),
    HttpVersionNotSupported => (505, "HTTP Version Not Supported"),
}

impl Status {
    pub fn family(&self) -> Family {
        Family::of(self.code())
    }

    pub fn is_success(&self) -> bool {
        self.family() == Family::Successful
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.reason())
    }
}

impl From<Status> for http::StatusCode {
    fn from(status: Status) -> Self {
        http::StatusCode::from_u16(status.code()).unwrap_or(http::StatusCode::INTERNAL_SERVER_ERROR)
    }
}

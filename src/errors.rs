use std::{error, fmt};

/// Parser and pipeline failure kinds.
///
/// Each kind owns its complete wire response: an empty body,
/// `Content-Length: 0`, and `Connection: close`. The status texts are part
/// of the protocol surface (clients match on them), so they are spelled out
/// here rather than derived from the code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ErrorKind {
    BadRequestLine,
    BadHeaderSyntax,
    InvalidVersion,
    InvalidContentLength,
    BodyNotAllowed,
    // Retained mapping; not produced by the parser because requests without
    // header lines are answered normally.
    #[allow(dead_code)]
    MissingRequiredHeaders,
    UnsupportedTransferEncoding,
    // Unknown methods are answered by the router with a descriptive body.
    #[allow(dead_code)]
    UnsupportedMethod,
    HeaderTooLarge,
    TooManyHeaders,
    PayloadTooLarge,
    RequestTimeout,
    BadRequestPath,
}

macro_rules! http_errors {
    ($( $name:ident: $code:expr, $text:expr; )*) => {
        impl ErrorKind {
            /// The full response emitted for this failure.
            pub(crate) const fn as_http(&self) -> &'static [u8] {
                match self { $(
                    Self::$name => concat!(
                        "HTTP/1.1 ", $code, " ", $text, "\r\n",
                        "Content-Length: 0\r\n",
                        "Connection: close\r\n",
                        "\r\n",
                    ).as_bytes(),
                )* }
            }

            pub(crate) const fn status_code(&self) -> u16 {
                match self { $( Self::$name => $code, )* }
            }
        }
    };
}

http_errors! {
    BadRequestLine: 400, "Bad Request";
    BadHeaderSyntax: 400, "Bad Header Syntax";
    InvalidVersion: 505, "HTTP Version Not Supported";
    InvalidContentLength: 400, "Invalid Content Length";
    BodyNotAllowed: 400, "Body not allowed";
    MissingRequiredHeaders: 400, "Missing Required Headers";
    UnsupportedTransferEncoding: 501, "Not Implemented";
    UnsupportedMethod: 405, "Method Not Allowed";
    HeaderTooLarge: 431, "Request Header Fields Too Large";
    TooManyHeaders: 400, "Too Many Headers";
    PayloadTooLarge: 413, "Payload Too Large";
    RequestTimeout: 408, "Request Timeout";
    BadRequestPath: 400, "Bad Path For Request";
}

impl error::Error for ErrorKind {}
impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self)
    }
}

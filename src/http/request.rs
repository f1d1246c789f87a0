use crate::{
    errors::ErrorKind,
    http::types::{self, ByteView},
    limits::ReqLimits,
};
use memchr::memchr;

/// One header field, name stored as received, value with leading ASCII
/// spaces trimmed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct HeaderField {
    pub(crate) name: ByteView,
    pub(crate) value: ByteView,
}

/// Parsed description of one request.
///
/// All views reference the connection buffer the request was parsed from
/// and are invalidated by the next buffer shift. `decoded_target` and
/// `normalized_path` are owned and reused across requests; the instance is
/// reset at the start of every parse.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct RequestDescriptor {
    pub(crate) method: ByteView,
    pub(crate) target: ByteView,
    pub(crate) version: ByteView,
    pub(crate) headers: Vec<HeaderField>,
    pub(crate) content_length: usize,
    pub(crate) content_length_seen: bool,
    // Recorded like the other recognized headers; no current route consumes it.
    #[allow(dead_code)]
    pub(crate) content_type: ByteView,
    pub(crate) body: ByteView,
    pub(crate) keep_alive: bool,
    pub(crate) decoded_target: Vec<u8>,
    pub(crate) normalized_path: Vec<u8>,
    pub(crate) is_api: bool,
}

impl RequestDescriptor {
    #[inline]
    pub(crate) fn new(limits: &ReqLimits) -> Self {
        Self {
            method: ByteView::empty(),
            target: ByteView::empty(),
            version: ByteView::empty(),
            headers: Vec::with_capacity(limits.max_headers),
            content_length: 0,
            content_length_seen: false,
            content_type: ByteView::empty(),
            body: ByteView::empty(),
            keep_alive: true,
            decoded_target: Vec::new(),
            normalized_path: Vec::new(),
            is_api: false,
        }
    }

    #[inline]
    fn reset(&mut self) {
        self.method = ByteView::empty();
        self.target = ByteView::empty();
        self.version = ByteView::empty();
        self.headers.clear();
        self.content_length = 0;
        self.content_length_seen = false;
        self.content_type = ByteView::empty();
        self.body = ByteView::empty();
        self.keep_alive = true;
        self.decoded_target.clear();
        self.normalized_path.clear();
        self.is_api = false;
    }

    /// Case-insensitive header lookup over the insertion-ordered fields.
    #[allow(dead_code)]
    pub(crate) fn header<'b>(&self, buf: &'b [u8], name: &[u8]) -> Option<&'b [u8]> {
        self.headers
            .iter()
            .find(|h| h.name.slice(buf).eq_ignore_ascii_case(name))
            .map(|h| h.value.slice(buf))
    }
}

// Parsing. `start` is the absolute offset of the request within `buf`,
// `header_end` the absolute position of the `\r\n\r\n` terminator. The
// parser reads nothing past `header_end + 2` and advances no cursor; the
// driver derives the consumed size from `header_end` and `content_length`.
impl RequestDescriptor {
    pub(crate) fn parse(
        &mut self,
        buf: &[u8],
        start: usize,
        header_end: usize,
        limits: &ReqLimits,
    ) -> Result<(), ErrorKind> {
        self.reset();

        let line_end = self.parse_request_line(buf, start, header_end)?;
        self.parse_headers(buf, line_end + 2, header_end, limits)?;

        if self.method.slice(buf)[0] == b'G' && self.content_length > 0 {
            return Err(ErrorKind::BodyNotAllowed);
        }

        self.classify_api(buf);

        Ok(())
    }

    /// Splits the request line into method, target, and version. A single
    /// run of spaces is tolerated between tokens.
    fn parse_request_line(
        &mut self,
        buf: &[u8],
        start: usize,
        header_end: usize,
    ) -> Result<usize, ErrorKind> {
        let line_end = start
            + types::find(&buf[start..header_end + 2], b"\r\n")
                .ok_or(ErrorKind::BadRequestLine)?;
        let line = &buf[start..line_end];

        let method_end = memchr(b' ', line).ok_or(ErrorKind::BadRequestLine)?;
        if method_end == 0 {
            return Err(ErrorKind::BadRequestLine);
        }
        self.method = ByteView::new(start, method_end);

        let mut pos = method_end;
        while pos < line.len() && line[pos] == b' ' {
            pos += 1;
        }

        let target_start = pos;
        let target_end = memchr(b' ', &line[pos..])
            .map(|at| pos + at)
            .ok_or(ErrorKind::BadRequestLine)?;
        self.target = ByteView::new(start + target_start, target_end - target_start);

        pos = target_end;
        while pos < line.len() && line[pos] == b' ' {
            pos += 1;
        }
        if pos == line.len() {
            return Err(ErrorKind::BadRequestLine);
        }
        self.version = ByteView::new(start + pos, line.len() - pos);

        self.keep_alive = match &line[pos..] {
            b"HTTP/1.1" => true,
            b"HTTP/1.0" => false,
            _ => return Err(ErrorKind::InvalidVersion),
        };

        Ok(line_end)
    }

    fn parse_headers(
        &mut self,
        buf: &[u8],
        from: usize,
        header_end: usize,
        limits: &ReqLimits,
    ) -> Result<(), ErrorKind> {
        let mut pos = from;

        while pos <= header_end {
            let end = pos
                + types::find(&buf[pos..header_end + 2], b"\r\n")
                    .ok_or(ErrorKind::BadHeaderSyntax)?;
            let line = &buf[pos..end];

            if line.len() > limits.max_header_line {
                return Err(ErrorKind::HeaderTooLarge);
            }

            let colon = memchr(b':', line).ok_or(ErrorKind::BadHeaderSyntax)?;
            if colon == 0 {
                return Err(ErrorKind::BadHeaderSyntax);
            }
            let name = ByteView::new(pos, colon);

            let mut value_start = colon + 1;
            while value_start < line.len() && line[value_start] == b' ' {
                value_start += 1;
            }
            if value_start == line.len() {
                return Err(ErrorKind::BadHeaderSyntax);
            }
            let value = ByteView::new(pos + value_start, line.len() - value_start);

            if self.headers.len() == limits.max_headers {
                return Err(ErrorKind::TooManyHeaders);
            }

            let field = HeaderField { name, value };
            self.record_special(buf, &field)?;
            self.headers.push(field);

            pos = end + 2;
        }

        Ok(())
    }

    fn record_special(&mut self, buf: &[u8], field: &HeaderField) -> Result<(), ErrorKind> {
        let name = field.name.slice(buf);

        if name.eq_ignore_ascii_case(b"Content-Length") {
            if self.content_length_seen {
                return Err(ErrorKind::InvalidContentLength);
            }
            self.content_length = types::slice_to_usize(field.value.slice(buf))
                .ok_or(ErrorKind::InvalidContentLength)?;
            self.content_length_seen = true;
        } else if name.eq_ignore_ascii_case(b"Content-Type") {
            self.content_type = field.value;
        } else if name.eq_ignore_ascii_case(b"Connection") {
            if types::find_ignore_ascii_case(field.value.slice(buf), b"close").is_some() {
                self.keep_alive = false;
            }
        } else if name.eq_ignore_ascii_case(b"Transfer-Encoding") {
            return Err(ErrorKind::UnsupportedTransferEncoding);
        }

        Ok(())
    }

    /// Narrows the target in place when it addresses the API prefix.
    /// `/api/echo` becomes `/echo`; exactly `/api` becomes `/`.
    fn classify_api(&mut self, buf: &[u8]) {
        let target = self.target.slice(buf);

        if target.len() >= 5 && &target[..5] == b"/api/" {
            self.is_api = true;
            self.target.narrow_front(4);
        } else if target == b"/api" {
            self.is_api = true;
            self.target.len = 1;
        }
    }
}

//! Frame model and incremental assembler for the gateway byte stream.
//!
//! Inbound traffic is a sequence of HTTP-response-shaped frames: a start
//! line, CRLF-delimited headers (including `Transac-Id`), an empty line and
//! an optional body sized by `Content-Length` or chunked with
//! `Transfer-Encoding: chunked`. The gateway pads frames with trailing
//! CRLF pairs, which the assembler swallows.

const CRLF: &[u8] = b"\r\n";
const HEADER_END: &[u8] = b"\r\n\r\n";

/// A single parsed wire frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    /// The request or status line, verbatim (`PUT /devices/data HTTP/1.1`
    /// or `HTTP/1.1 200 OK`).
    pub start_line: String,
    /// Header name/value pairs in arrival order.
    pub headers: Vec<(String, String)>,
    pub body: Vec<u8>,
}

impl Frame {
    /// Returns a header value, matching the name case-insensitively.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// The transaction correlation id, if the frame carries one.
    pub fn transaction_id(&self) -> Option<&str> {
        self.header("Transac-Id")
    }

    /// The URI this frame originates from.
    ///
    /// Replies carry a `Uri-Origin` header naming the resource they answer
    /// for; request-shaped frames expose the path from their start line.
    pub fn uri(&self) -> Option<&str> {
        if let Some(uri) = self.header("Uri-Origin") {
            return Some(uri);
        }
        let mut parts = self.start_line.split_whitespace();
        let first = parts.next()?;
        let second = parts.next()?;
        if second.starts_with('/') {
            Some(second)
        } else if first.starts_with('/') {
            Some(first)
        } else {
            None
        }
    }

    /// Whether the start line is a request line (`METHOD /path ...`).
    pub fn is_request(&self) -> bool {
        !self.start_line.starts_with("HTTP/")
    }
}

/// Incremental frame parser.
///
/// Feed raw socket bytes with [`push`](Self::push); complete frames come
/// back in arrival order. Bytes belonging to an unfinished frame stay
/// buffered until the rest arrives. Garbage that cannot start a frame is
/// dropped up to the next CRLF so one corrupt read cannot wedge the stream.
#[derive(Debug, Default)]
pub struct FrameAssembler {
    buf: Vec<u8>,
}

impl FrameAssembler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends bytes and drains every frame that is now complete.
    pub fn push(&mut self, bytes: &[u8]) -> Vec<Frame> {
        self.buf.extend_from_slice(bytes);
        let mut frames = Vec::new();
        loop {
            // Swallow inter-frame CRLF padding.
            while self.buf.starts_with(CRLF) {
                self.buf.drain(..CRLF.len());
            }
            match self.try_parse_one() {
                Some(Ok(frame)) => frames.push(frame),
                Some(Err(())) => continue, // garbage skipped, retry
                None => break,             // incomplete, wait for more bytes
            }
        }
        frames
    }

    /// Bytes currently buffered awaiting completion.
    pub fn pending_len(&self) -> usize {
        self.buf.len()
    }

    /// Attempts to parse one frame off the front of the buffer.
    ///
    /// `None` means the buffer holds an incomplete frame; `Err(())` means
    /// leading garbage was discarded and parsing should be retried.
    fn try_parse_one(&mut self) -> Option<Result<Frame, ()>> {
        let header_end = find(&self.buf, HEADER_END)?;
        let header_block = &self.buf[..header_end];

        let Some((start_line, headers)) = parse_header_block(header_block) else {
            // Not a frame start. Drop through the next CRLF and retry.
            let skip = find(&self.buf, CRLF).map_or(self.buf.len(), |i| i + CRLF.len());
            self.buf.drain(..skip);
            return Some(Err(()));
        };

        let body_start = header_end + HEADER_END.len();
        let chunked = headers
            .iter()
            .any(|(k, v)| k.eq_ignore_ascii_case("Transfer-Encoding") && v.contains("chunked"));

        let (body, consumed) = if chunked {
            match parse_chunked_body(&self.buf[body_start..]) {
                Some((body, used)) => (body, body_start + used),
                None => return None,
            }
        } else {
            let len = headers
                .iter()
                .find(|(k, _)| k.eq_ignore_ascii_case("Content-Length"))
                .and_then(|(_, v)| v.trim().parse::<usize>().ok())
                .unwrap_or(0);
            if self.buf.len() < body_start + len {
                return None;
            }
            (
                self.buf[body_start..body_start + len].to_vec(),
                body_start + len,
            )
        };

        self.buf.drain(..consumed);
        Some(Ok(Frame {
            start_line,
            headers,
            body,
        }))
    }
}

/// Whether a line can open a frame: an HTTP-style status line or a
/// request line whose target is a path.
fn valid_start_line(line: &str) -> bool {
    let mut parts = line.split_whitespace();
    match (parts.next(), parts.next()) {
        (Some(first), Some(second)) => first.starts_with("HTTP/") || second.starts_with('/'),
        _ => false,
    }
}

/// Parses `start-line CRLF (header CRLF)*` out of a header block.
fn parse_header_block(block: &[u8]) -> Option<(String, Vec<(String, String)>)> {
    let text = std::str::from_utf8(block).ok()?;
    let mut lines = text.split("\r\n");
    let start_line = lines.next()?.trim().to_string();
    if !valid_start_line(&start_line) {
        return None;
    }
    let mut headers = Vec::new();
    for line in lines {
        if line.is_empty() {
            continue;
        }
        let (name, value) = line.split_once(':')?;
        headers.push((name.trim().to_string(), value.trim().to_string()));
    }
    Some((start_line, headers))
}

/// Decodes a `Transfer-Encoding: chunked` body.
///
/// Returns the reassembled body and the number of input bytes consumed, or
/// `None` while the terminal chunk has not arrived yet.
fn parse_chunked_body(input: &[u8]) -> Option<(Vec<u8>, usize)> {
    let mut body = Vec::new();
    let mut pos = 0;
    loop {
        let line_end = find(&input[pos..], CRLF)? + pos;
        let size_line = std::str::from_utf8(&input[pos..line_end]).ok()?;
        let size = usize::from_str_radix(size_line.trim(), 16).ok()?;
        pos = line_end + CRLF.len();
        if size == 0 {
            // Terminal chunk, optionally followed by a trailing CRLF.
            if input[pos..].starts_with(CRLF) {
                pos += CRLF.len();
            }
            return Some((body, pos));
        }
        if input.len() < pos + size + CRLF.len() {
            return None;
        }
        body.extend_from_slice(&input[pos..pos + size]);
        pos += size + CRLF.len();
    }
}

fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack
        .windows(needle.len())
        .position(|window| window == needle)
}

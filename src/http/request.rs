//! HTTP/1.1 request parsing.
//!
//! The parser consumes the bytes one connection produced and yields an
//! immutable [`Request`]. The transport model is one request per connection:
//! a first read of up to [`RECV_BUFFER_SIZE`] bytes, widened to a bounded
//! read loop when the client declared a `Content-Length` beyond what the
//! first read returned, capped at [`MAX_REQUEST_SIZE`].

use std::cell::RefCell;
use std::collections::HashMap;
use std::io::{self, Read};
use std::net::TcpStream;

use memchr::memmem;
use percent_encoding::percent_decode_str;
use smallvec::SmallVec;
use thiserror::Error;

use super::method::Method;
use crate::error::ParseError;

/// Size of the initial read from a client socket.
pub const RECV_BUFFER_SIZE: usize = 16 * 1024;
/// Hard cap on a whole request (request line + headers + body).
pub const MAX_REQUEST_SIZE: usize = 1024 * 1024;
/// Maximum number of header lines accepted.
pub const MAX_HEADERS: usize = 100;
/// Maximum length of a single header line in bytes.
pub const MAX_HEADER_LINE: usize = 8 * 1024;

/// Case-insensitive header map.
///
/// Names are normalized to lowercase on insert; insertion order is kept so
/// the map can be iterated the way the peer sent it. Duplicate names are
/// retained and lookups return the last value.
#[derive(Debug, Clone, Default)]
pub struct Headers {
    entries: SmallVec<[(String, String); 16]>,
}

impl Headers {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a header. The name is lowercased; the value is stored as-is.
    pub fn insert(&mut self, name: &str, value: &str) {
        self.entries
            .push((name.to_ascii_lowercase(), value.to_string()));
    }

    /// Case-insensitive lookup; last value wins on duplicates.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.entries
            .iter()
            .rfind(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Iterate in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }
}

/// A parsed HTTP request, immutable once built.
#[derive(Debug, Clone)]
pub struct Request {
    pub method: Method,
    /// Percent-decoded path component, always starting with `/`.
    pub path: String,
    /// `HTTP/1.0` or `HTTP/1.1`.
    pub version: String,
    pub headers: Headers,
    /// Decoded query parameters; duplicate keys keep the last value.
    pub query_params: HashMap<String, String>,
    /// Raw body bytes, never decoded.
    pub body: Vec<u8>,
}

impl Request {
    /// Parse one buffered request.
    pub fn parse(raw: &[u8]) -> Result<Self, ParseError> {
        if raw.len() > MAX_REQUEST_SIZE {
            return Err(ParseError::RequestTooLarge {
                limit: MAX_REQUEST_SIZE,
            });
        }

        let line_end =
            memmem::find(raw, b"\r\n").ok_or(ParseError::MalformedRequestLine)?;
        let request_line = std::str::from_utf8(&raw[..line_end])
            .map_err(|_| ParseError::MalformedRequestLine)?;

        let tokens: Vec<&str> = request_line.split(' ').collect();
        let &[method_token, raw_uri, version] = tokens.as_slice() else {
            return Err(ParseError::MalformedRequestLine);
        };

        let method = Method::parse(method_token);
        if method == Method::Unknown {
            return Err(ParseError::UnsupportedMethod(method_token.to_string()));
        }
        if version != "HTTP/1.1" && version != "HTTP/1.0" {
            return Err(ParseError::UnsupportedVersion(version.to_string()));
        }

        let (raw_path, raw_query) = match raw_uri.split_once('?') {
            Some((p, q)) => (p, q),
            None => (raw_uri, ""),
        };
        let path = decode_path(raw_path)?;
        if !path.starts_with('/') {
            return Err(ParseError::MalformedRequestLine);
        }
        let query_params = parse_query(raw_query);

        let headers_start = line_end + 2;
        let (header_bytes, body): (&[u8], &[u8]) = match memmem::find(raw, b"\r\n\r\n") {
            Some(pos) if pos >= headers_start => (&raw[headers_start..pos], &raw[pos + 4..]),
            // Empty header block: the terminator overlaps the request line's CRLF.
            Some(pos) => (&[], &raw[pos + 4..]),
            None if raw.len() > headers_start => (&raw[headers_start..], &[]),
            None => (&[], &[]),
        };
        let headers = parse_headers(header_bytes)?;

        Ok(Request {
            method,
            path,
            version: version.to_string(),
            headers,
            query_params,
            body: body.to_vec(),
        })
    }

    /// Case-insensitive request header lookup.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name)
    }

    /// Decoded query parameter lookup.
    pub fn query(&self, name: &str) -> Option<&str> {
        self.query_params.get(name).map(String::as_str)
    }

    /// Declared body length, when present and numeric.
    pub fn content_length(&self) -> Option<usize> {
        self.header("content-length").and_then(|v| v.trim().parse().ok())
    }

    pub fn content_type(&self) -> Option<&str> {
        self.header("content-type")
    }
}

/// Percent-decode the path component. Rejects truncated or non-hex escapes
/// and any encoded NUL.
fn decode_path(raw: &str) -> Result<String, ParseError> {
    let bytes = raw.as_bytes();
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'%' {
            if i + 2 >= bytes.len()
                || !bytes[i + 1].is_ascii_hexdigit()
                || !bytes[i + 2].is_ascii_hexdigit()
            {
                return Err(ParseError::BadPercentEncoding(raw.to_string()));
            }
            i += 3;
        } else {
            i += 1;
        }
    }
    let decoded = percent_decode_str(raw)
        .decode_utf8()
        .map_err(|_| ParseError::BadPercentEncoding(raw.to_string()))?;
    if decoded.bytes().any(|b| b == 0) {
        return Err(ParseError::BadPercentEncoding(raw.to_string()));
    }
    Ok(decoded.into_owned())
}

/// Decode `name=value&...`. Keys without `=` map to the empty string, `+`
/// decodes to space, duplicate keys keep the last value.
fn parse_query(raw: &str) -> HashMap<String, String> {
    url::form_urlencoded::parse(raw.as_bytes())
        .map(|(k, v)| (k.into_owned(), v.into_owned()))
        .collect()
}

fn parse_headers(section: &[u8]) -> Result<Headers, ParseError> {
    let mut headers = Headers::new();
    if section.is_empty() {
        return Ok(headers);
    }
    let text = String::from_utf8_lossy(section);
    let mut count = 0usize;
    for line in text.split("\r\n") {
        if line.is_empty() {
            continue;
        }
        if line.len() > MAX_HEADER_LINE {
            return Err(ParseError::HeaderTooLarge {
                limit: MAX_HEADER_LINE,
            });
        }
        count += 1;
        if count > MAX_HEADERS {
            return Err(ParseError::TooManyHeaders { limit: MAX_HEADERS });
        }
        // A line without a colon carries nothing we can store; skip it.
        let Some((name, value)) = line.split_once(':') else {
            continue;
        };
        headers.insert(name.trim(), value.trim());
    }
    Ok(headers)
}

/// Failure reading a request off a socket.
#[derive(Debug, Error)]
pub enum RecvError {
    #[error(transparent)]
    Io(#[from] io::Error),
    #[error(transparent)]
    Parse(#[from] ParseError),
}

thread_local! {
    static RECV_BUF: RefCell<Vec<u8>> = RefCell::new(Vec::with_capacity(RECV_BUFFER_SIZE));
}

/// Read one request from a client socket.
///
/// Returns `Ok(None)` when the peer closed before sending anything. When the
/// first read holds less body than `Content-Length` declares, reading
/// continues until the declared length arrives, the peer closes, or the
/// [`MAX_REQUEST_SIZE`] cap is exceeded.
pub fn read_request(stream: &mut TcpStream) -> Result<Option<Request>, RecvError> {
    RECV_BUF.with(|cell| {
        let mut buf = cell.borrow_mut();
        buf.clear();
        buf.resize(RECV_BUFFER_SIZE, 0);
        let n = stream.read(&mut buf[..])?;
        if n == 0 {
            return Ok(None);
        }
        buf.truncate(n);

        let request = Request::parse(&buf)?;
        let Some(declared) = request.content_length() else {
            return Ok(Some(request));
        };
        if request.body.len() >= declared {
            return Ok(Some(request));
        }

        let header_len = buf.len() - request.body.len();
        let expected = header_len.saturating_add(declared);
        if expected > MAX_REQUEST_SIZE {
            return Err(ParseError::RequestTooLarge {
                limit: MAX_REQUEST_SIZE,
            }
            .into());
        }

        let mut total = buf.len();
        buf.resize(expected, 0);
        while total < expected {
            let n = stream.read(&mut buf[total..])?;
            if n == 0 {
                break;
            }
            total += n;
        }
        buf.truncate(total);
        Ok(Some(Request::parse(&buf)?))
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_basic_get() {
        let req = Request::parse(b"GET /hello HTTP/1.1\r\nHost: x\r\n\r\n").unwrap();
        assert_eq!(req.method, Method::Get);
        assert_eq!(req.path, "/hello");
        assert_eq!(req.version, "HTTP/1.1");
        assert_eq!(req.header("host"), Some("x"));
        assert!(req.body.is_empty());
    }

    #[test]
    fn test_parse_decodes_path() {
        let req = Request::parse(b"GET /a%20b/c HTTP/1.1\r\n\r\n").unwrap();
        assert_eq!(req.path, "/a b/c");
    }

    #[test]
    fn test_parse_rejects_encoded_nul() {
        let err = Request::parse(b"GET /a%00b HTTP/1.1\r\n\r\n").unwrap_err();
        assert!(matches!(err, ParseError::BadPercentEncoding(_)));
    }

    #[test]
    fn test_query_last_wins_and_plus_decodes() {
        let req =
            Request::parse(b"GET /p?a=1&a=2&b=x+y&flag&empty= HTTP/1.1\r\n\r\n").unwrap();
        assert_eq!(req.query("a"), Some("2"));
        assert_eq!(req.query("b"), Some("x y"));
        assert_eq!(req.query("flag"), Some(""));
        assert_eq!(req.query("empty"), Some(""));
    }

    #[test]
    fn test_header_last_wins_case_insensitive() {
        let req = Request::parse(
            b"GET / HTTP/1.1\r\nX-Tag: one\r\nx-tag: two\r\n\r\n",
        )
        .unwrap();
        assert_eq!(req.header("X-TAG"), Some("two"));
        assert_eq!(req.headers.len(), 2);
    }

    #[test]
    fn test_body_is_raw_remainder() {
        let req = Request::parse(b"POST /u HTTP/1.1\r\nContent-Length: 4\r\n\r\n\x00\x01\xff!")
            .unwrap();
        assert_eq!(req.body, vec![0x00, 0x01, 0xff, b'!']);
    }

    #[test]
    fn test_malformed_request_line() {
        assert!(matches!(
            Request::parse(b"GET /only-two-tokens\r\n\r\n").unwrap_err(),
            ParseError::MalformedRequestLine
        ));
        assert!(matches!(
            Request::parse(b"no crlf at all").unwrap_err(),
            ParseError::MalformedRequestLine
        ));
    }

    #[test]
    fn test_unsupported_method_and_version() {
        assert!(matches!(
            Request::parse(b"BREW /pot HTTP/1.1\r\n\r\n").unwrap_err(),
            ParseError::UnsupportedMethod(_)
        ));
        assert!(matches!(
            Request::parse(b"GET / HTTP/2.0\r\n\r\n").unwrap_err(),
            ParseError::UnsupportedVersion(_)
        ));
    }

    #[test]
    fn test_too_many_headers() {
        let mut raw = b"GET / HTTP/1.1\r\n".to_vec();
        for i in 0..(MAX_HEADERS + 1) {
            raw.extend_from_slice(format!("H{i}: v\r\n").as_bytes());
        }
        raw.extend_from_slice(b"\r\n");
        assert!(matches!(
            Request::parse(&raw).unwrap_err(),
            ParseError::TooManyHeaders { .. }
        ));
    }

    #[test]
    fn test_header_line_too_large() {
        let mut raw = b"GET / HTTP/1.1\r\nX-Big: ".to_vec();
        raw.extend(std::iter::repeat(b'a').take(MAX_HEADER_LINE + 1));
        raw.extend_from_slice(b"\r\n\r\n");
        assert!(matches!(
            Request::parse(&raw).unwrap_err(),
            ParseError::HeaderTooLarge { .. }
        ));
    }
}

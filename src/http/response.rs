//! HTTP response assembly and serialization.
//!
//! A [`Response`] is mutable while handlers build it and serialized exactly
//! once per connection. Header insertion order is preserved on the wire;
//! `Content-Length` and `Connection: close` are appended at serialization
//! time when the handler did not set them (the server does not honor
//! keep-alive).

/// Reason phrase for a status code.
pub fn reason_phrase(code: u16) -> &'static str {
    match code {
        200 => "OK",
        201 => "Created",
        202 => "Accepted",
        204 => "No Content",
        301 => "Moved Permanently",
        302 => "Found",
        304 => "Not Modified",
        400 => "Bad Request",
        401 => "Unauthorized",
        403 => "Forbidden",
        404 => "Not Found",
        405 => "Method Not Allowed",
        408 => "Request Timeout",
        413 => "Payload Too Large",
        429 => "Too Many Requests",
        500 => "Internal Server Error",
        501 => "Not Implemented",
        503 => "Service Unavailable",
        _ => "Unknown",
    }
}

/// Response under construction.
#[derive(Debug, Clone)]
pub struct Response {
    status_code: u16,
    status_reason: String,
    headers: Vec<(String, String)>,
    body: Vec<u8>,
}

impl Default for Response {
    fn default() -> Self {
        Self::new()
    }
}

impl Response {
    /// A fresh `200 OK` with no headers and an empty body.
    pub fn new() -> Self {
        Self {
            status_code: 200,
            status_reason: reason_phrase(200).to_string(),
            headers: Vec::new(),
            body: Vec::new(),
        }
    }

    /// Set the status code; the reason phrase is derived from the code.
    pub fn set_status(&mut self, code: u16) -> &mut Self {
        self.status_code = code;
        self.status_reason = reason_phrase(code).to_string();
        self
    }

    /// Set the status code with an explicit reason phrase.
    pub fn set_status_with_reason(&mut self, code: u16, reason: &str) -> &mut Self {
        self.status_code = code;
        self.status_reason = reason.to_string();
        self
    }

    pub fn status_code(&self) -> u16 {
        self.status_code
    }

    pub fn status_reason(&self) -> &str {
        &self.status_reason
    }

    /// Set a header, replacing an existing one of the same name in place so
    /// its position in the serialized form is stable. Last set wins.
    pub fn set_header(&mut self, name: &str, value: &str) -> &mut Self {
        if let Some(entry) = self
            .headers
            .iter_mut()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
        {
            entry.1 = value.to_string();
        } else {
            self.headers.push((name.to_string(), value.to_string()));
        }
        self
    }

    /// Append a header without replacing duplicates.
    pub fn add_header(&mut self, name: &str, value: &str) -> &mut Self {
        self.headers.push((name.to_string(), value.to_string()));
        self
    }

    /// Case-insensitive header lookup; last value wins.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .rfind(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// Headers in insertion order.
    pub fn headers(&self) -> impl Iterator<Item = (&str, &str)> {
        self.headers.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn set_body(&mut self, body: impl Into<Vec<u8>>) -> &mut Self {
        self.body = body.into();
        self
    }

    pub fn body(&self) -> &[u8] {
        &self.body
    }

    /// Serialize to wire format.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(128 + self.body.len());
        out.extend_from_slice(
            format!("HTTP/1.1 {} {}\r\n", self.status_code, self.status_reason).as_bytes(),
        );
        for (name, value) in &self.headers {
            out.extend_from_slice(format!("{name}: {value}\r\n").as_bytes());
        }
        if self.header("content-length").is_none() {
            out.extend_from_slice(format!("Content-Length: {}\r\n", self.body.len()).as_bytes());
        }
        if self.header("connection").is_none() {
            out.extend_from_slice(b"Connection: close\r\n");
        }
        out.extend_from_slice(b"\r\n");
        out.extend_from_slice(&self.body);
        out
    }

    // Canned responses used at the worker boundary.

    pub fn bad_request(reason: &str) -> Self {
        let mut resp = Response::new();
        resp.set_status(400)
            .set_header("Content-Type", "text/plain")
            .set_body(reason.as_bytes().to_vec());
        resp
    }

    pub fn not_found() -> Self {
        let mut resp = Response::new();
        resp.set_status(404)
            .set_header("Content-Type", "text/html")
            .set_body("<h1>404 Not Found</h1>".as_bytes().to_vec());
        resp
    }

    pub fn internal_error() -> Self {
        let mut resp = Response::new();
        resp.set_status(500)
            .set_header("Content-Type", "text/html")
            .set_body("<h1>500 Internal Server Error</h1>".as_bytes().to_vec());
        resp
    }
}

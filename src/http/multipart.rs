//! multipart/form-data parsing.
//!
//! The parser splits a raw body on `--<boundary>` markers. It is binary
//! safe: part data is carried as bytes and never interpreted as text. The
//! boundary is matched as a byte literal; it is the client's job to pick one
//! that does not occur inside part data.

use memchr::memmem;

use super::request::Headers;
use crate::error::MultipartError;

/// One decoded part of a multipart body.
///
/// A part is a *file part* iff `filename` is non-empty.
#[derive(Debug, Clone)]
pub struct MultipartPart {
    /// Part headers, names lowercased.
    pub headers: Headers,
    /// `name` parameter of `Content-Disposition`.
    pub name: String,
    /// `filename` parameter of `Content-Disposition`; empty for field parts.
    pub filename: String,
    /// Verbatim `Content-Type` of the part; empty when absent
    /// (semantically `text/plain`).
    pub content_type: String,
    /// Raw part data.
    pub data: Vec<u8>,
}

impl MultipartPart {
    pub fn is_file(&self) -> bool {
        !self.filename.is_empty()
    }
}

/// Ordered collection of parsed parts.
#[derive(Debug, Clone, Default)]
pub struct Multipart {
    parts: Vec<MultipartPart>,
}

impl Multipart {
    /// Parse a body against the given boundary token.
    pub fn parse(body: &[u8], boundary: &str) -> Result<Self, MultipartError> {
        if boundary.is_empty() {
            return Err(MultipartError::MissingBoundary);
        }
        let delimiter = format!("--{boundary}").into_bytes();
        let finder = memmem::Finder::new(&delimiter);

        let first = finder.find(body).ok_or(MultipartError::MissingBoundary)?;
        let mut pos = first + delimiter.len();
        let mut parts = Vec::new();

        loop {
            // `--<boundary>--` terminates parsing regardless of what follows.
            if body[pos..].starts_with(b"--") {
                break;
            }
            if body[pos..].starts_with(b"\r\n") {
                pos += 2;
            }
            let Some(next) = finder.find(&body[pos..]) else {
                break;
            };
            let segment = &body[pos..pos + next];
            parts.push(parse_part(segment)?);
            pos += next + delimiter.len();
        }

        if parts.is_empty() {
            return Err(MultipartError::Empty);
        }
        Ok(Multipart { parts })
    }

    pub fn parts(&self) -> &[MultipartPart] {
        &self.parts
    }

    pub fn len(&self) -> usize {
        self.parts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.parts.is_empty()
    }

    /// First part with the given field name.
    pub fn part(&self, name: &str) -> Option<&MultipartPart> {
        self.parts.iter().find(|p| p.name == name)
    }

    /// All file parts, in order.
    pub fn file_parts(&self) -> impl Iterator<Item = &MultipartPart> {
        self.parts.iter().filter(|p| p.is_file())
    }
}

fn parse_part(segment: &[u8]) -> Result<MultipartPart, MultipartError> {
    let header_end =
        memmem::find(segment, b"\r\n\r\n").ok_or(MultipartError::MalformedPart)?;

    let mut part = MultipartPart {
        headers: Headers::new(),
        name: String::new(),
        filename: String::new(),
        content_type: String::new(),
        data: Vec::new(),
    };

    let header_text = String::from_utf8_lossy(&segment[..header_end]);
    for line in header_text.split("\r\n") {
        let Some((name, value)) = line.split_once(':') else {
            continue;
        };
        let name = name.trim().to_ascii_lowercase();
        let value = value.trim();
        part.headers.insert(&name, value);
        match name.as_str() {
            "content-disposition" => parse_content_disposition(value, &mut part),
            "content-type" => part.content_type = value.to_string(),
            _ => {}
        }
    }

    // Strip the single CRLF that precedes the next boundary marker.
    let mut data = &segment[header_end + 4..];
    if data.ends_with(b"\r\n") {
        data = &data[..data.len() - 2];
    }
    part.data = data.to_vec();
    Ok(part)
}

/// Decode `form-data; name="field"; filename="file.txt"`.
fn parse_content_disposition(value: &str, part: &mut MultipartPart) {
    for param in value.split(';') {
        let Some((key, val)) = param.split_once('=') else {
            continue;
        };
        let key = key.trim();
        let val = val.trim().trim_matches('"');
        match key {
            "name" => part.name = val.to_string(),
            "filename" => part.filename = val.to_string(),
            _ => {}
        }
    }
}

/// Extract the boundary token from a `Content-Type` header value like
/// `multipart/form-data; boundary=----X`.
pub fn boundary_from_content_type(value: &str) -> Option<&str> {
    value.split(';').find_map(|param| {
        let (key, val) = param.trim().split_once('=')?;
        (key.trim() == "boundary").then(|| val.trim().trim_matches('"'))
    })
}

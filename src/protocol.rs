//! Inbound message framing.
//!
//! Stations either write a bare JSON document to the socket or wrap it in an
//! HTTP/1.1 POST. Both carry a single JSON object per connection.

use serde_json::{Map, Value};

use crate::error::DecodeError;

const HEADER_END: &[u8] = b"\r\n\r\n";

const METHODS: [&str; 7] = ["GET", "POST", "PUT", "PATCH", "DELETE", "HEAD", "OPTIONS"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Framing {
    RawJson,
    HttpWrapped,
}

/// Classifies a message by its first bytes.
///
/// A message is HTTP-wrapped when its first line is an HTTP request line and
/// its header block names a `Content-Type`. Anything else is raw JSON.
pub fn framing(bytes: &[u8]) -> Framing {
    let head = match find(bytes, HEADER_END) {
        Some(end) => &bytes[..end],
        None => bytes,
    };
    let head = String::from_utf8_lossy(head);

    let mut lines = head.split("\r\n");
    let request_line = lines.next().unwrap_or("");
    let has_content_type = lines.any(|line| {
        line.split_once(':')
            .is_some_and(|(name, _)| name.trim().eq_ignore_ascii_case("content-type"))
    });

    if request_line.contains(" HTTP/") && has_content_type {
        Framing::HttpWrapped
    } else {
        Framing::RawJson
    }
}

/// Extracts the JSON object carried by `bytes`.
///
/// Returns [`DecodeError::Incomplete`] when the bytes so far are a valid
/// prefix of a message and reading more could complete it. That includes an
/// HTTP request whose header block has not ended yet, whatever framing the
/// partial bytes were classified as.
pub fn decode(framing: Framing, bytes: &[u8]) -> Result<Map<String, Value>, DecodeError> {
    if find(bytes, HEADER_END).is_none() && starts_like_request(bytes) {
        return Err(DecodeError::Incomplete);
    }

    match framing {
        Framing::RawJson => parse_object(bytes, false),
        Framing::HttpWrapped => {
            let end = find(bytes, HEADER_END).ok_or(DecodeError::Incomplete)?;
            let headers = String::from_utf8_lossy(&bytes[..end]);
            let body = &bytes[end + HEADER_END.len()..];

            match content_length(&headers) {
                Some(len) if body.len() < len => Err(DecodeError::Incomplete),
                Some(len) => parse_object(&body[..len], true),
                None => parse_object(body, false),
            }
        }
    }
}

/// Like [`decode`], for bytes after which nothing more will arrive.
///
/// Never returns [`DecodeError::Incomplete`].
pub fn decode_final(framing: Framing, bytes: &[u8]) -> Result<Map<String, Value>, DecodeError> {
    match decode(framing, bytes) {
        Err(DecodeError::Incomplete) => Err(match framing {
            Framing::HttpWrapped if find(bytes, HEADER_END).is_none() => DecodeError::MissingSeparator,
            Framing::RawJson if starts_like_request(bytes) => match parse_object(bytes, true) {
                Err(err) => err,
                Ok(_) => DecodeError::Truncated,
            },
            _ => DecodeError::Truncated,
        }),
        other => other,
    }
}

fn parse_object(text: &[u8], length_known: bool) -> Result<Map<String, Value>, DecodeError> {
    let blank = text.trim_ascii().is_empty();
    let value: Value = serde_json::from_slice(text).map_err(|e| {
        if e.is_eof() && !length_known && !blank {
            DecodeError::Incomplete
        } else {
            DecodeError::InvalidJson(e)
        }
    })?;

    match value {
        Value::Object(map) => Ok(map),
        Value::Array(_) => Err(DecodeError::NotAnObject("an array")),
        Value::String(_) => Err(DecodeError::NotAnObject("a string")),
        Value::Number(_) => Err(DecodeError::NotAnObject("a number")),
        Value::Bool(_) => Err(DecodeError::NotAnObject("a boolean")),
        Value::Null => Err(DecodeError::NotAnObject("null")),
    }
}

// True when `bytes` is, or could grow into, an HTTP request line.
fn starts_like_request(bytes: &[u8]) -> bool {
    METHODS.iter().any(|method| {
        let token = method.as_bytes();
        if bytes.len() > token.len() {
            bytes.starts_with(token) && bytes[token.len()] == b' '
        } else {
            token.starts_with(bytes)
        }
    }) && !bytes.is_empty()
}

fn content_length(headers: &str) -> Option<usize> {
    headers.split("\r\n").skip(1).find_map(|line| {
        let (name, value) = line.split_once(':')?;
        if name.trim().eq_ignore_ascii_case("content-length") {
            value.trim().parse().ok()
        } else {
            None
        }
    })
}

fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack
        .windows(needle.len())
        .position(|window| window == needle)
}

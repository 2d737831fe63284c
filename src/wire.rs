//! Wire codec for the client/daemon socket protocol.
//!
//! Requests are framed as a `u32` argument count followed by, per argument,
//! a `u32` length (string length + 1) and that many bytes (string plus a
//! trailing NUL terminator). Responses are an `i32` status, then either a
//! length-prefixed error string (status < 0) or raw help-table bytes
//! (status ≥ 0, appended verbatim). Integers are native-endian; both ends
//! always live on the same host.
//!
//! Arguments containing an embedded NUL byte are not representable in this
//! format. Encoding rejects them; this is a protocol limitation, not
//! something to paper over.

use bytes::{Buf, BufMut, BytesMut};

use crate::error::{PicodError, Result};

/// Maximum encoded message size. Oversized messages are a protocol error.
pub const MAX_MESSAGE: usize = 64 * 1024;

/// Smallest possible encoded argument: 4-byte length + NUL terminator.
const MIN_ARG_ENCODING: usize = 5;

/// A client request: the command name and its arguments, in order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Request {
    pub args: Vec<String>,
}

impl Request {
    pub fn new(args: Vec<String>) -> Self {
        Self { args }
    }
}

/// A daemon response.
///
/// Invariant: `error` is only present when `status < 0`, `help` only when
/// `status ≥ 0`; a response never carries both. Use the constructors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Response {
    pub status: i32,
    pub error: Option<String>,
    pub help: Option<Vec<u8>>,
}

impl Response {
    /// Plain status response (command result, no attachments).
    pub fn status(status: i32) -> Self {
        Self {
            status,
            error: None,
            help: None,
        }
    }

    /// Error response; `status` must be negative.
    pub fn error(status: i32, text: impl Into<String>) -> Self {
        debug_assert!(status < 0);
        Self {
            status,
            error: Some(text.into()),
            help: None,
        }
    }

    /// Help-listing response: status 0 with the raw table attached.
    pub fn help_listing(table: impl Into<Vec<u8>>) -> Self {
        Self {
            status: 0,
            error: None,
            help: Some(table.into()),
        }
    }
}

fn put_string(buf: &mut BytesMut, s: &str) -> Result<()> {
    if s.as_bytes().contains(&0) {
        return Err(PicodError::Protocol(format!(
            "argument {:?} contains a NUL byte",
            s
        )));
    }
    buf.put_u32_ne(s.len() as u32 + 1);
    buf.put_slice(s.as_bytes());
    buf.put_u8(0);
    Ok(())
}

/// Encode a request. Fails on embedded NULs or an oversized message.
pub fn encode_request(request: &Request) -> Result<Vec<u8>> {
    let mut buf = BytesMut::new();
    buf.put_u32_ne(request.args.len() as u32);
    for arg in &request.args {
        put_string(&mut buf, arg)?;
    }
    if buf.len() > MAX_MESSAGE {
        return Err(PicodError::Protocol(format!(
            "request too large: {} > {}",
            buf.len(),
            MAX_MESSAGE
        )));
    }
    Ok(buf.to_vec())
}

/// Incrementally decode a request from an accumulating buffer.
///
/// Returns `Ok(None)` when more bytes are needed, `Ok(Some(_))` once a
/// complete request is present. Never reads past `buf`.
pub fn decode_request(buf: &[u8]) -> Result<Option<Request>> {
    if buf.len() > MAX_MESSAGE {
        return Err(PicodError::Protocol(format!(
            "request too large: {} > {}",
            buf.len(),
            MAX_MESSAGE
        )));
    }
    let mut cursor = buf;
    if cursor.remaining() < 4 {
        return Ok(None);
    }
    let argc = cursor.get_u32_ne() as usize;
    // Checked so a hostile argc cannot wrap the bound on 32-bit targets.
    match argc
        .checked_mul(MIN_ARG_ENCODING)
        .and_then(|n| n.checked_add(4))
    {
        Some(min_len) if min_len <= MAX_MESSAGE => {}
        _ => return Err(PicodError::Protocol(format!("implausible argc {}", argc))),
    }

    let mut args = Vec::with_capacity(argc);
    for _ in 0..argc {
        if cursor.remaining() < 4 {
            return Ok(None);
        }
        let len = cursor.get_u32_ne() as usize;
        if len == 0 {
            return Err(PicodError::Protocol("zero-length string encoding".into()));
        }
        if cursor.remaining() < len {
            return Ok(None);
        }
        let raw = &cursor[..len];
        if raw[len - 1] != 0 {
            return Err(PicodError::Protocol("missing string terminator".into()));
        }
        let s = std::str::from_utf8(&raw[..len - 1])
            .map_err(|_| PicodError::Protocol("argument is not valid UTF-8".into()))?;
        args.push(s.to_string());
        cursor.advance(len);
    }

    Ok(Some(Request { args }))
}

/// Encode a response.
pub fn encode_response(response: &Response) -> Result<Vec<u8>> {
    debug_assert!(!(response.error.is_some() && response.help.is_some()));
    let mut buf = BytesMut::new();
    buf.put_i32_ne(response.status);
    if response.status < 0 {
        let text = response.error.as_deref().unwrap_or("");
        put_string(&mut buf, text)?;
    } else if let Some(help) = &response.help {
        buf.put_slice(help);
    }
    if buf.len() > MAX_MESSAGE {
        return Err(PicodError::Protocol(format!(
            "response too large: {} > {}",
            buf.len(),
            MAX_MESSAGE
        )));
    }
    Ok(buf.to_vec())
}

/// Decode a complete response (the client reads the stream to EOF first).
pub fn decode_response(buf: &[u8]) -> Result<Response> {
    let mut cursor = buf;
    if cursor.remaining() < 4 {
        return Err(PicodError::Protocol("response too short".into()));
    }
    let status = cursor.get_i32_ne();

    if status < 0 {
        if cursor.remaining() < 4 {
            return Err(PicodError::Protocol("truncated error string".into()));
        }
        let len = cursor.get_u32_ne() as usize;
        if len == 0 || cursor.remaining() < len {
            return Err(PicodError::Protocol("truncated error string".into()));
        }
        let raw = &cursor[..len];
        if raw[len - 1] != 0 {
            return Err(PicodError::Protocol("missing string terminator".into()));
        }
        let text = std::str::from_utf8(&raw[..len - 1])
            .map_err(|_| PicodError::Protocol("error string is not valid UTF-8".into()))?;
        Ok(Response::error(status, text))
    } else if cursor.remaining() > 0 {
        Ok(Response {
            status,
            error: None,
            help: Some(cursor.to_vec()),
        })
    } else {
        Ok(Response::status(status))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(args: &[&str]) -> Request {
        Request::new(args.iter().map(|s| s.to_string()).collect())
    }

    #[test]
    fn test_request_roundtrip() {
        let cases = [
            request(&[]),
            request(&["statusled", "greenon"]),
            request(&["lcd-line0", "hello world"]),
            request(&["--help"]),
        ];
        for r in cases {
            let encoded = encode_request(&r).unwrap();
            let decoded = decode_request(&encoded).unwrap().unwrap();
            assert_eq!(decoded, r);
        }
    }

    #[test]
    fn test_request_layout() {
        let encoded = encode_request(&request(&["buzzer"])).unwrap();
        // argc=1, len=7 ("buzzer" + NUL), bytes, NUL
        assert_eq!(&encoded[0..4], &1u32.to_ne_bytes());
        assert_eq!(&encoded[4..8], &7u32.to_ne_bytes());
        assert_eq!(&encoded[8..14], b"buzzer");
        assert_eq!(encoded[14], 0);
        assert_eq!(encoded.len(), 15);
    }

    #[test]
    fn test_request_partial_needs_more() {
        let encoded = encode_request(&request(&["fanspeed", "high"])).unwrap();
        for cut in [0, 2, 4, 6, encoded.len() - 1] {
            assert!(decode_request(&encoded[..cut]).unwrap().is_none(), "cut at {}", cut);
        }
    }

    #[test]
    fn test_request_embedded_nul_rejected() {
        let r = request(&["bad\0arg"]);
        assert!(encode_request(&r).is_err());
    }

    #[test]
    fn test_request_oversized_rejected() {
        let big = "x".repeat(MAX_MESSAGE);
        assert!(encode_request(&request(&[&big])).is_err());

        let mut buf = vec![0u8; MAX_MESSAGE + 1];
        buf[..4].copy_from_slice(&1u32.to_ne_bytes());
        assert!(decode_request(&buf).is_err());
    }

    #[test]
    fn test_request_implausible_argc_rejected() {
        let buf = u32::MAX.to_ne_bytes();
        assert!(decode_request(&buf).is_err());

        // Would pass the bound via wrap-around if the multiply were
        // unchecked on a 32-bit usize.
        let buf = 0x3333_3334u32.to_ne_bytes();
        assert!(decode_request(&buf).is_err());
    }

    #[test]
    fn test_request_missing_terminator_rejected() {
        let mut encoded = encode_request(&request(&["ok"])).unwrap();
        let last = encoded.len() - 1;
        encoded[last] = b'x';
        assert!(decode_request(&encoded).is_err());
    }

    #[test]
    fn test_response_status_roundtrip() {
        let encoded = encode_response(&Response::status(0)).unwrap();
        assert_eq!(encoded.len(), 4);
        let decoded = decode_response(&encoded).unwrap();
        assert_eq!(decoded, Response::status(0));
    }

    #[test]
    fn test_response_error_roundtrip() {
        let r = Response::error(-1, "Command not found\n");
        let decoded = decode_response(&encode_response(&r).unwrap()).unwrap();
        assert_eq!(decoded.status, -1);
        assert_eq!(decoded.error.as_deref(), Some("Command not found\n"));
        assert!(decoded.help.is_none());
    }

    #[test]
    fn test_response_help_roundtrip() {
        let table = "buzzer           Buzz\n";
        let r = Response::help_listing(table.as_bytes().to_vec());
        let decoded = decode_response(&encode_response(&r).unwrap()).unwrap();
        assert_eq!(decoded.status, 0);
        assert_eq!(decoded.help.as_deref(), Some(table.as_bytes()));
        assert!(decoded.error.is_none());
    }

    #[test]
    fn test_response_never_both_error_and_help() {
        let err = decode_response(&encode_response(&Response::error(-2, "no")).unwrap()).unwrap();
        assert!(err.help.is_none());
        let help = decode_response(&encode_response(&Response::help_listing(b"t\n".to_vec())).unwrap()).unwrap();
        assert!(help.error.is_none());
    }

    #[test]
    fn test_response_too_short() {
        assert!(decode_response(&[0, 1]).is_err());
    }

    #[test]
    fn test_response_truncated_error_string() {
        let encoded = encode_response(&Response::error(-1, "oops")).unwrap();
        assert!(decode_response(&encoded[..encoded.len() - 2]).is_err());
    }
}

//! Framing used on the native RPC surface.
//!
//! Messages travel as length-prefixed frames: one compression flag byte
//! followed by a big-endian `u32` payload length. Payloads are JSON. The call
//! status travels in the `grpc-status` / `grpc-message` trailers.

use bytes::{BufMut, Bytes, BytesMut};
use http_body_util::LengthLimitError;
use std::error::Error;
use std::time::Duration;

use crate::rpc::status::{Code, Status};

pub const CONTENT_TYPE: &str = "application/grpc";
pub const CONTENT_TYPE_JSON: &str = "application/grpc+json";

pub const GRPC_STATUS: &str = "grpc-status";
pub const GRPC_MESSAGE: &str = "grpc-message";
pub const GRPC_TIMEOUT: &str = "grpc-timeout";

const FRAME_HEADER_LEN: usize = 5;
const MAX_TIMEOUT_DIGITS: u128 = 100_000_000;

/// Headers owned by the transport; never surfaced as call metadata.
pub fn is_reserved_header(name: &str) -> bool {
    name.starts_with("grpc-")
        || name.starts_with(':')
        || matches!(
            name,
            "content-type"
                | "content-length"
                | "te"
                | "host"
                | "user-agent"
                | "connection"
                | "date"
                | "trailer"
                | "transfer-encoding"
                | "accept-encoding"
        )
}

pub fn encode_frame(payload: &[u8]) -> Bytes {
    let mut buf = BytesMut::with_capacity(FRAME_HEADER_LEN + payload.len());
    buf.put_u8(0);
    buf.put_u32(payload.len() as u32);
    buf.put_slice(payload);
    buf.freeze()
}

/// Status for a request body that could not be read in full.
///
/// Only an exceeded body limit is `ResourceExhausted`; a reset stream or bad
/// framing is the caller's malformed request.
pub fn body_read_status(error: &(dyn Error + 'static)) -> Status {
    let mut cause = Some(error);
    while let Some(e) = cause {
        if e.is::<LengthLimitError>() {
            return Status::new(
                Code::ResourceExhausted,
                format!("request body exceeds the size limit: {}", error),
            );
        }
        cause = e.source();
    }
    Status::invalid_argument(format!("failed to read request body: {}", error))
}

/// Extract the single message of a unary exchange.
pub fn decode_frame(buf: &[u8]) -> Result<&[u8], Status> {
    if buf.len() < FRAME_HEADER_LEN {
        return Err(Status::internal(format!(
            "truncated frame header: {} bytes",
            buf.len()
        )));
    }
    if buf[0] != 0 {
        return Err(Status::unimplemented("compressed messages are not supported"));
    }
    let len = u32::from_be_bytes([buf[1], buf[2], buf[3], buf[4]]) as usize;
    let payload = &buf[FRAME_HEADER_LEN..];
    if payload.len() != len {
        return Err(Status::internal(format!(
            "frame declares {} bytes but carries {}",
            len,
            payload.len()
        )));
    }
    Ok(payload)
}

/// Parse a `grpc-timeout` value such as `100m` or `5S`.
pub fn parse_timeout(value: &str) -> Option<Duration> {
    if value.len() < 2 || value.len() > 9 {
        return None;
    }
    let (digits, unit) = value.split_at(value.len() - 1);
    let amount: u64 = digits.parse().ok()?;
    let duration = match unit {
        "H" => Duration::from_secs(amount.checked_mul(3600)?),
        "M" => Duration::from_secs(amount.checked_mul(60)?),
        "S" => Duration::from_secs(amount),
        "m" => Duration::from_millis(amount),
        "u" => Duration::from_micros(amount),
        "n" => Duration::from_nanos(amount),
        _ => return None,
    };
    Some(duration)
}

/// Encode a timeout in the coarsest unit that keeps it within eight digits.
pub fn encode_timeout(timeout: Duration) -> String {
    let nanos = timeout.as_nanos();
    if nanos < MAX_TIMEOUT_DIGITS {
        return format!("{}n", nanos.max(1));
    }
    let micros = timeout.as_micros();
    if micros < MAX_TIMEOUT_DIGITS {
        return format!("{}u", micros);
    }
    let millis = timeout.as_millis();
    if millis < MAX_TIMEOUT_DIGITS {
        return format!("{}m", millis);
    }
    let secs = timeout.as_secs() as u128;
    if secs < MAX_TIMEOUT_DIGITS {
        return format!("{}S", secs);
    }
    format!("{}H", (secs / 3600).min(MAX_TIMEOUT_DIGITS - 1))
}

/// Percent-encode a status message for the `grpc-message` trailer.
pub fn encode_message(message: &str) -> String {
    let mut out = String::with_capacity(message.len());
    for byte in message.bytes() {
        if (0x20..=0x7e).contains(&byte) && byte != b'%' {
            out.push(byte as char);
        } else {
            out.push_str(&format!("%{:02X}", byte));
        }
    }
    out
}

pub fn decode_message(encoded: &str) -> String {
    let bytes = encoded.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'%' && i + 2 < bytes.len() {
            let hex = std::str::from_utf8(&bytes[i + 1..i + 3])
                .ok()
                .and_then(|hex| u8::from_str_radix(hex, 16).ok());
            if let Some(byte) = hex {
                out.push(byte);
                i += 3;
                continue;
            }
        }
        out.push(bytes[i]);
        i += 1;
    }
    String::from_utf8_lossy(&out).into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rpc::status::Code;

    #[test]
    fn frame_header_carries_length() {
        let frame = encode_frame(br#"{"sender":"John"}"#);
        assert_eq!(frame[0], 0);
        assert_eq!(u32::from_be_bytes([frame[1], frame[2], frame[3], frame[4]]), 17);
        assert_eq!(decode_frame(&frame).unwrap(), br#"{"sender":"John"}"#);
    }

    #[test]
    fn malformed_frames_are_rejected() {
        assert_eq!(decode_frame(&[0, 0]).unwrap_err().code(), Code::Internal);
        assert_eq!(
            decode_frame(&[1, 0, 0, 0, 0]).unwrap_err().code(),
            Code::Unimplemented
        );
        assert_eq!(
            decode_frame(&[0, 0, 0, 0, 9, b'{']).unwrap_err().code(),
            Code::Internal
        );
    }

    #[test]
    fn timeouts_parse_in_every_unit() {
        assert_eq!(parse_timeout("2H"), Some(Duration::from_secs(7200)));
        assert_eq!(parse_timeout("3M"), Some(Duration::from_secs(180)));
        assert_eq!(parse_timeout("5S"), Some(Duration::from_secs(5)));
        assert_eq!(parse_timeout("100m"), Some(Duration::from_millis(100)));
        assert_eq!(parse_timeout("7u"), Some(Duration::from_micros(7)));
        assert_eq!(parse_timeout("9n"), Some(Duration::from_nanos(9)));
        assert_eq!(parse_timeout("S"), None);
        assert_eq!(parse_timeout("123456789S"), None);
        assert_eq!(parse_timeout("10x"), None);
    }

    #[test]
    fn encoded_timeouts_stay_within_eight_digits() {
        for timeout in [
            Duration::from_nanos(1),
            Duration::from_millis(250),
            Duration::from_secs(30),
            Duration::from_secs(86_400 * 400),
        ] {
            let encoded = encode_timeout(timeout);
            assert!(encoded.len() <= 9, "{encoded}");
            let parsed = parse_timeout(&encoded).unwrap();
            assert!(parsed <= timeout.max(Duration::from_nanos(1)));
        }
    }

    #[test]
    fn status_messages_survive_percent_encoding() {
        let message = "bad input: 100% \"wrong\"\nüber";
        let encoded = encode_message(message);
        assert!(encoded.bytes().all(|b| (0x20..=0x7e).contains(&b)));
        assert_eq!(decode_message(&encoded), message);
    }
}

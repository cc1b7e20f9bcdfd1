//! msgpack-rpc envelopes spoken on every DEVIL socket.
//!
//! ```text
//! request:       [0, sequence, method, args]
//! response:      [1, sequence, error, result]
//! notification:  [2, method, params]
//! ```
//!
//! The sequence field is always written as zero. Responses are matched to
//! requests by position, never by sequence.

use rmpv::Value;

use crate::error::ProtocolError;

/// msgpack-rpc message kind for requests.
pub const KIND_REQUEST: u64 = 0;
/// msgpack-rpc message kind for responses.
pub const KIND_RESPONSE: u64 = 1;
/// msgpack-rpc message kind for notifications.
pub const KIND_NOTIFICATION: u64 = 2;

/// msgpack extension type tag for packed `i8` sample arrays.
pub const EXT_INT8_ARRAY: i8 = 1;

/// Message kind of a msgpack-rpc envelope.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum MessageKind {
    /// A call expecting a response.
    Request = 0,
    /// The answer to a call.
    Response = 1,
    /// A push message with no answer.
    Notification = 2,
}

impl MessageKind {
    fn name(self) -> &'static str {
        match self {
            MessageKind::Request => "request",
            MessageKind::Response => "response",
            MessageKind::Notification => "notification",
        }
    }
}

/// A decoded response envelope.
#[derive(Debug, Clone, PartialEq)]
pub struct Response {
    /// Echoed sequence number (unused).
    pub sequence: u64,
    /// Error field; `None` when the call succeeded.
    pub error: Option<String>,
    /// Result value.
    pub result: Value,
}

/// A decoded notification envelope.
#[derive(Debug, Clone, PartialEq)]
pub struct Notification {
    /// Notification method name.
    pub method: String,
    /// Positional parameters.
    pub params: Vec<Value>,
}

/// Serialize a request envelope.
pub fn encode_request(method: &str, args: Vec<Value>) -> Result<Vec<u8>, ProtocolError> {
    let envelope = Value::Array(vec![
        Value::from(KIND_REQUEST),
        Value::from(0u64),
        Value::from(method),
        Value::Array(args),
    ]);
    encode_value(&envelope)
}

/// Serialize a notification envelope. Only used by tests and simulators;
/// the client never publishes notifications itself.
pub fn encode_notification(method: &str, params: Vec<Value>) -> Result<Vec<u8>, ProtocolError> {
    let envelope = Value::Array(vec![
        Value::from(KIND_NOTIFICATION),
        Value::from(method),
        Value::Array(params),
    ]);
    encode_value(&envelope)
}

/// Serialize a response envelope (simulator side).
pub fn encode_response(error: Option<&str>, result: Value) -> Result<Vec<u8>, ProtocolError> {
    let envelope = Value::Array(vec![
        Value::from(KIND_RESPONSE),
        Value::from(0u64),
        error.map(Value::from).unwrap_or(Value::Nil),
        result,
    ]);
    encode_value(&envelope)
}

/// Serialize a single msgpack value.
pub fn encode_value(value: &Value) -> Result<Vec<u8>, ProtocolError> {
    let mut buf = Vec::with_capacity(64);
    rmpv::encode::write_value(&mut buf, value)
        .map_err(|e| ProtocolError::Encode(e.to_string()))?;
    Ok(buf)
}

/// Deserialize a single msgpack value.
pub fn decode_value(data: &[u8]) -> Result<Value, ProtocolError> {
    let mut cursor = data;
    rmpv::decode::read_value(&mut cursor).map_err(|e| ProtocolError::Decode(e.to_string()))
}

fn envelope(data: &[u8]) -> Result<Vec<Value>, ProtocolError> {
    match decode_value(data)? {
        Value::Array(items) => Ok(items),
        other => Err(ProtocolError::Malformed {
            what: "envelope",
            reason: format!("expected array, got {other}"),
        }),
    }
}

fn check_kind(items: &[Value], expected: MessageKind) -> Result<(), ProtocolError> {
    let kind = items
        .first()
        .and_then(Value::as_u64)
        .ok_or_else(|| ProtocolError::Malformed {
            what: "envelope",
            reason: "missing message kind".to_string(),
        })?;
    if kind != expected as u64 {
        return Err(ProtocolError::UnexpectedKind {
            expected: expected.name(),
            got: kind,
        });
    }
    Ok(())
}

/// Decode a response envelope.
///
/// A nil, `false` or empty-string error field counts as success, matching the
/// truthiness test used by existing servers.
pub fn decode_response(data: &[u8]) -> Result<Response, ProtocolError> {
    let mut items = envelope(data)?;
    check_kind(&items, MessageKind::Response)?;
    if items.len() != 4 {
        return Err(ProtocolError::Malformed {
            what: "response",
            reason: format!("expected 4 elements, got {}", items.len()),
        });
    }
    let result = items.pop().unwrap_or(Value::Nil);
    let error = items.pop().unwrap_or(Value::Nil);
    let sequence = items[1].as_u64().unwrap_or(0);

    let error = match error {
        Value::Nil | Value::Boolean(false) => None,
        Value::String(s) if s.as_bytes().is_empty() => None,
        Value::String(s) => Some(String::from_utf8_lossy(s.as_bytes()).into_owned()),
        Value::Array(ref a) if a.is_empty() => None,
        other => Some(other.to_string()),
    };

    Ok(Response {
        sequence,
        error,
        result,
    })
}

/// Whether an RPC result counts as success: everything except nil, `false`,
/// zero and empty strings, binaries, arrays or maps.
pub fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Nil => false,
        Value::Boolean(b) => *b,
        Value::Integer(i) => i.as_i64() != Some(0) && i.as_u64() != Some(0),
        Value::F32(f) => *f != 0.0,
        Value::F64(f) => *f != 0.0,
        Value::String(s) => !s.as_bytes().is_empty(),
        Value::Binary(b) => !b.is_empty(),
        Value::Array(a) => !a.is_empty(),
        Value::Map(m) => !m.is_empty(),
        Value::Ext(..) => true,
    }
}

/// Decode a notification envelope.
///
/// Accepts the three-element form `[2, method, params]` and the four-element
/// form `[2, sequence, method, params]`.
pub fn decode_notification(data: &[u8]) -> Result<Notification, ProtocolError> {
    let items = envelope(data)?;
    check_kind(&items, MessageKind::Notification)?;
    let (method, params) = match items.len() {
        3 => (&items[1], &items[2]),
        4 => (&items[2], &items[3]),
        n => {
            return Err(ProtocolError::Malformed {
                what: "notification",
                reason: format!("expected 3 or 4 elements, got {n}"),
            })
        }
    };
    let method = method
        .as_str()
        .ok_or_else(|| ProtocolError::Malformed {
            what: "notification",
            reason: "method is not a string".to_string(),
        })?
        .to_string();
    let params = match params {
        Value::Array(p) => p.clone(),
        Value::Nil => Vec::new(),
        other => vec![other.clone()],
    };
    Ok(Notification { method, params })
}

/// Interpret a msgpack value as a float, accepting integers too.
pub fn as_number(value: &Value) -> Option<f64> {
    match value {
        Value::F32(f) => Some(f64::from(*f)),
        Value::F64(f) => Some(*f),
        Value::Integer(i) => i.as_f64(),
        _ => None,
    }
}

/// Look up a string key in a msgpack map.
pub fn map_get<'a>(value: &'a Value, key: &str) -> Option<&'a Value> {
    value
        .as_map()?
        .iter()
        .find(|(k, _)| k.as_str() == Some(key))
        .map(|(_, v)| v)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_layout() {
        let bytes = encode_request("readRegister", vec![Value::from(3u16)]).unwrap();
        let value = decode_value(&bytes).unwrap();
        let items = value.as_array().unwrap();
        assert_eq!(items.len(), 4);
        assert_eq!(items[0].as_u64(), Some(0));
        assert_eq!(items[1].as_u64(), Some(0));
        assert_eq!(items[2].as_str(), Some("readRegister"));
        assert_eq!(items[3].as_array().unwrap()[0].as_u64(), Some(3));
    }

    #[test]
    fn test_decode_successful_response() {
        let bytes = encode_response(None, Value::from(42u32)).unwrap();
        let resp = decode_response(&bytes).unwrap();
        assert_eq!(resp.error, None);
        assert_eq!(resp.result.as_u64(), Some(42));
    }

    #[test]
    fn test_decode_error_response() {
        let bytes = encode_response(Some("no such register"), Value::Nil).unwrap();
        let resp = decode_response(&bytes).unwrap();
        assert_eq!(resp.error.as_deref(), Some("no such register"));
    }

    #[test]
    fn test_non_utf8_error_is_still_an_error() {
        let bytes = [0x94, 0x01, 0x00, 0xa3, 0xff, 0xfe, b'x', 0x07];
        let resp = decode_response(&bytes).unwrap();
        let error = resp.error.unwrap();
        assert!(error.ends_with('x'));
        assert!(!error.is_empty());
    }

    #[test]
    fn test_truthiness() {
        assert!(is_truthy(&Value::Boolean(true)));
        assert!(is_truthy(&Value::from(1u8)));
        assert!(is_truthy(&Value::from(-1i32)));
        assert!(is_truthy(&Value::from("ok")));
        assert!(!is_truthy(&Value::Nil));
        assert!(!is_truthy(&Value::Boolean(false)));
        assert!(!is_truthy(&Value::from(0u8)));
        assert!(!is_truthy(&Value::F64(0.0)));
        assert!(!is_truthy(&Value::from("")));
        assert!(!is_truthy(&Value::Array(vec![])));
    }

    #[test]
    fn test_empty_error_string_is_success() {
        let bytes = encode_response(Some(""), Value::from(true)).unwrap();
        let resp = decode_response(&bytes).unwrap();
        assert!(resp.error.is_none());
    }

    #[test]
    fn test_response_rejects_notification_kind() {
        let bytes = encode_notification("shutdown", vec![]).unwrap();
        let err = decode_response(&bytes).unwrap_err();
        assert!(matches!(err, ProtocolError::UnexpectedKind { got: 2, .. }));
    }

    #[test]
    fn test_decode_notification_three_elements() {
        let bytes = encode_notification(
            "registerChanged",
            vec![Value::from(1u16), Value::from(65535u32)],
        )
        .unwrap();
        let n = decode_notification(&bytes).unwrap();
        assert_eq!(n.method, "registerChanged");
        assert_eq!(n.params.len(), 2);
    }

    #[test]
    fn test_decode_notification_four_elements() {
        let value = Value::Array(vec![
            Value::from(2u8),
            Value::from(0u8),
            Value::from("shutdown"),
            Value::Array(vec![]),
        ]);
        let bytes = encode_value(&value).unwrap();
        let n = decode_notification(&bytes).unwrap();
        assert_eq!(n.method, "shutdown");
        assert!(n.params.is_empty());
    }

    #[test]
    fn test_garbage_is_decode_error() {
        let err = decode_notification(&[0xc1]).unwrap_err();
        assert!(matches!(err, ProtocolError::Decode(_)));
        let err = decode_response(&[]).unwrap_err();
        assert!(matches!(err, ProtocolError::Decode(_)));
    }

    #[test]
    fn test_non_array_envelope() {
        let bytes = encode_value(&Value::from(7u8)).unwrap();
        let err = decode_notification(&bytes).unwrap_err();
        assert!(matches!(err, ProtocolError::Malformed { .. }));
    }

    #[test]
    fn test_as_number_accepts_integers() {
        assert_eq!(as_number(&Value::from(3u8)), Some(3.0));
        assert_eq!(as_number(&Value::F64(0.5)), Some(0.5));
        assert_eq!(as_number(&Value::from("x")), None);
    }
}

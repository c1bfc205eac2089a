//! RPC envelopes
//!
//! Layout (semua top-level message adalah array):
//! ```text
//! Request       [0, sequence, method, params]
//! Response      [1, sequence, error | nil, result]
//! Notification  [2, method, params]
//! ```

use super::value::Value;
use crate::error::{Error, Result};

/// Tipe pesan msgpack-rpc
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageType {
    Request = 0,
    Response = 1,
    Notification = 2,
}

impl MessageType {
    #[inline(always)]
    pub fn from_u8(v: u8) -> Option<Self> {
        match v {
            0 => Some(Self::Request),
            1 => Some(Self::Response),
            2 => Some(Self::Notification),
            _ => None,
        }
    }
}

/// Request masuk dari peer
#[derive(Debug, Clone, PartialEq)]
pub struct Request {
    pub sequence: u32,
    pub method: String,
    pub params: Value,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Response {
    pub sequence: u32,
    /// `Nil` jika call sukses
    pub error: Value,
    pub result: Value,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Notification {
    pub method: String,
    pub params: Value,
}

/// Message yang sudah diklasifikasi berdasarkan discriminant
#[derive(Debug, Clone, PartialEq)]
pub enum Message {
    Request(Request),
    Response(Response),
    Notification(Notification),
    /// Response dengan sequence integer di luar range `u32`.
    /// Tidak mungkin cocok dengan waiter manapun.
    StrayResponse { sequence: Value },
}

impl Message {
    /// Klasifikasi array hasil `decode_one`.
    pub fn from_value(value: Value) -> Result<Self> {
        let mut items = match value {
            Value::Array(items) => items,
            other => {
                return Err(Error::protocol(format!(
                    "message is {}, expected array",
                    other.kind_name()
                )))
            }
        };

        let kind = items
            .first()
            .and_then(Value::as_i64)
            .and_then(|n| u8::try_from(n).ok())
            .and_then(MessageType::from_u8)
            .ok_or_else(|| Error::protocol("message has no valid type discriminant"))?;

        let expected_len = match kind {
            MessageType::Notification => 3,
            _ => 4,
        };
        if items.len() != expected_len {
            return Err(Error::protocol(format!(
                "{:?} message has {} elements, expected {}",
                kind,
                items.len(),
                expected_len
            )));
        }

        // Pop dari belakang supaya tidak ada clone
        let message = match kind {
            MessageType::Request => {
                let params = items.pop().unwrap_or_default();
                let method = method_name(items.pop().unwrap_or_default())?;
                let sequence = sequence_number(&items.pop().unwrap_or_default())?;
                Message::Request(Request {
                    sequence,
                    method,
                    params,
                })
            }
            MessageType::Response => {
                let result = items.pop().unwrap_or_default();
                let error = items.pop().unwrap_or_default();
                let raw = items.pop().unwrap_or_default();
                match sequence_number(&raw) {
                    Ok(sequence) => Message::Response(Response {
                        sequence,
                        error,
                        result,
                    }),
                    Err(_) if matches!(raw, Value::Int(_) | Value::UInt(_)) => {
                        Message::StrayResponse { sequence: raw }
                    }
                    Err(e) => return Err(e),
                }
            }
            MessageType::Notification => {
                let params = items.pop().unwrap_or_default();
                let method = method_name(items.pop().unwrap_or_default())?;
                Message::Notification(Notification { method, params })
            }
        };
        Ok(message)
    }

    pub fn message_type(&self) -> MessageType {
        match self {
            Self::Request(_) => MessageType::Request,
            Self::Response(_) | Self::StrayResponse { .. } => MessageType::Response,
            Self::Notification(_) => MessageType::Notification,
        }
    }
}

fn sequence_number(value: &Value) -> Result<u32> {
    match *value {
        Value::UInt(n) => u32::try_from(n).ok(),
        Value::Int(n) => u32::try_from(n).ok(),
        _ => None,
    }
    .ok_or_else(|| Error::protocol("sequence number is not a 32-bit unsigned integer"))
}

fn method_name(value: Value) -> Result<String> {
    match value {
        Value::String(bytes) => Ok(String::from_utf8_lossy(&bytes).into_owned()),
        other => Err(Error::protocol(format!(
            "method name is {}, expected string",
            other.kind_name()
        ))),
    }
}

impl Response {
    #[inline(always)]
    pub fn is_error(&self) -> bool {
        !self.error.is_nil()
    }

    /// Pesan error dari peer.
    ///
    /// Editor mengirim error sebagai `[type, message]`.
    pub fn error_message(&self) -> Option<String> {
        match &self.error {
            Value::Nil => None,
            Value::Array(items) => match items.get(1).and_then(Value::as_str) {
                Some(message) => Some(message.to_owned()),
                None => Some(self.error.to_string()),
            },
            Value::String(bytes) => Some(String::from_utf8_lossy(bytes).into_owned()),
            other => Some(other.to_string()),
        }
    }

    /// `Err(Error::Rpc)` jika error slot tidak nil
    pub fn into_result(self) -> Result<Value> {
        match self.error_message() {
            Some(message) => Err(Error::Rpc(message)),
            None => Ok(self.result),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::args;
    use crate::protocol::format::encode;

    #[test]
    fn test_message_type_roundtrip() {
        for t in [
            MessageType::Request,
            MessageType::Response,
            MessageType::Notification,
        ] {
            assert_eq!(MessageType::from_u8(t as u8), Some(t));
        }
        assert_eq!(MessageType::from_u8(3), None);
    }

    #[test]
    fn test_parse_response() {
        let value = encode("[d,u,n,[ss]]", &args![1, 42u64, "a", "b"]).unwrap();
        match Message::from_value(value).unwrap() {
            Message::Response(response) => {
                assert_eq!(response.sequence, 42);
                assert!(!response.is_error());
                assert_eq!(
                    response.into_result().unwrap().expect::<Vec<String>>(),
                    Some(vec!["a".into(), "b".into()])
                );
            }
            other => panic!("expected response, got {:?}", other),
        }
    }

    #[test]
    fn test_error_response() {
        let value = encode("[d,d,[d,s],n]", &args![1, 7, 0, "Vim:E121: Undefined variable"]).unwrap();
        let message = Message::from_value(value).unwrap();
        let Message::Response(response) = message else {
            panic!("expected response");
        };
        assert!(response.is_error());
        match response.into_result() {
            Err(Error::Rpc(msg)) => assert_eq!(msg, "Vim:E121: Undefined variable"),
            other => panic!("unexpected: {:?}", other),
        }
    }

    #[test]
    fn test_parse_notification_and_request() {
        let value = encode("[d,s,[d]]", &args![2, "nvim_buf_lines_event", 1]).unwrap();
        let message = Message::from_value(value).unwrap();
        assert_eq!(message.message_type(), MessageType::Notification);

        let value = encode("[d,d,s,[]]", &args![0, 9, "poll"]).unwrap();
        match Message::from_value(value).unwrap() {
            Message::Request(request) => {
                assert_eq!(request.sequence, 9);
                assert_eq!(request.method, "poll");
            }
            other => panic!("expected request, got {:?}", other),
        }
    }

    #[test]
    fn test_out_of_range_response_sequence() {
        let value = encode("[d,l,n,n]", &args![1, 1i64 << 33]).unwrap();
        let message = Message::from_value(value).unwrap();
        assert_eq!(message.message_type(), MessageType::Response);
        assert!(matches!(message, Message::StrayResponse { .. }));

        let value = encode("[d,d,n,n]", &args![1, -1]).unwrap();
        assert!(matches!(
            Message::from_value(value).unwrap(),
            Message::StrayResponse { sequence: Value::Int(-1) }
        ));

        // Request dengan sequence di luar range tetap protocol error
        let value = encode("[d,d,s,[]]", &args![0, -1, "poll"]).unwrap();
        assert!(Message::from_value(value).is_err());
    }

    #[test]
    fn test_malformed_envelopes() {
        assert!(Message::from_value(Value::Nil).is_err());
        assert!(Message::from_value(encode("[d,d]", &args![1, 2]).unwrap()).is_err());
        assert!(Message::from_value(encode("[d,d,n,n]", &args![5, 2]).unwrap()).is_err());
        assert!(Message::from_value(encode("[d,s,n,n]", &args![1, "x"]).unwrap()).is_err());
        assert!(Message::from_value(encode("[d,d,n]", &args![2, 1]).unwrap()).is_err());
    }
}

use std::collections::TryReserveError;
use std::convert::TryFrom;

use log::{debug, trace};
use num_traits::FromPrimitive;

use super::*;
use crate::clone::{clone_str, DeepClone};
use crate::decode::{MsgPackReader, ReadError, ValueRef};

#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum DecodeError {
    #[error("invalid message format: {0}")]
    InvalidMessageFormat(&'static str),
    #[error("invalid message type")]
    InvalidMessageType,
    #[error("invalid field type: {0}")]
    InvalidFieldType(&'static str),
    #[error("allocation failed: {0}")]
    Alloc(#[from] TryReserveError),
    #[error("malformed msgpack: {0}")]
    Read(#[from] ReadError),
}

impl DecodeError {
    /// The buffer ends partway through a frame. Retry once more bytes arrive.
    pub fn is_incomplete(&self) -> bool {
        matches!(self, DecodeError::Read(e) if e.is_incomplete())
    }
}

/// A decoded message and the length of the frame it came from
#[derive(Clone, Debug, PartialEq)]
pub struct Decoded {
    pub message: AnyMessage,
    /// Bytes consumed from the front of the input. Anything after belongs to
    /// the next frame.
    pub bytes_read: usize,
}

impl Codec {
    /// Decode the first frame in `buf`
    ///
    /// The returned message owns copies of everything it holds; `buf` can be
    /// reused or dropped immediately.
    pub fn decode(&self, buf: &[u8]) -> Result<Decoded, DecodeError> {
        let mut reader = MsgPackReader::with_max_depth(buf, self.config.max_depth);
        let result = reader
            .read_value_ref()
            .map_err(DecodeError::from)
            .and_then(|envelope| self.decode_envelope(&envelope));
        match result {
            Ok(message) => {
                let bytes_read = reader.position();
                trace!(
                    "decoded {:?} msgid={:?} ({} bytes)",
                    message.msg_type(),
                    message.msgid(),
                    bytes_read
                );
                Ok(Decoded {
                    message,
                    bytes_read,
                })
            }
            Err(e) => {
                debug!("rejected frame: {}", e);
                Err(e)
            }
        }
    }

    fn decode_envelope(&self, envelope: &ValueRef) -> Result<AnyMessage, DecodeError> {
        let fields = match envelope {
            ValueRef::Array(fields) => fields,
            _ => return Err(DecodeError::InvalidMessageFormat("expected array")),
        };
        let ty = fields
            .first()
            .ok_or(DecodeError::InvalidMessageFormat("msgpack array 0-length"))?;

        match decode_msgtype(ty)? {
            MsgType::Request => self.decode_request(fields).map(AnyMessage::Request),
            MsgType::Response => self.decode_response(fields).map(AnyMessage::Response),
            MsgType::Notification => self
                .decode_notification(fields)
                .map(AnyMessage::Notification),
        }
    }

    fn decode_request(&self, fields: &[ValueRef]) -> Result<Request, DecodeError> {
        if fields.len() < 4 {
            return Err(DecodeError::InvalidMessageFormat("request needs 4 fields"));
        }
        let msgid = decode_msgid(&fields[1])?;
        let method = decode_method(&fields[2])?;
        let params = self.decode_params(&fields[3])?;
        Ok(Request {
            msgid,
            method,
            params,
        })
    }

    fn decode_response(&self, fields: &[ValueRef]) -> Result<Response, DecodeError> {
        if fields.len() < 4 {
            return Err(DecodeError::InvalidMessageFormat("response needs 4 fields"));
        }
        let msgid = decode_msgid(&fields[1])?;
        let (error, result) = (&fields[2], &fields[3]);
        if self.config.exclusive_response && !error.is_nil() && !result.is_nil() {
            return Err(DecodeError::InvalidMessageFormat(
                "response has both error and result",
            ));
        }
        Ok(Response {
            msgid,
            error: decode_optional(error)?,
            result: decode_optional(result)?,
        })
    }

    fn decode_notification(&self, fields: &[ValueRef]) -> Result<Notification, DecodeError> {
        if fields.len() < 3 {
            return Err(DecodeError::InvalidMessageFormat(
                "notification needs 3 fields",
            ));
        }
        let method = decode_method(&fields[1])?;
        let params = self.decode_params(&fields[2])?;
        Ok(Notification { method, params })
    }

    fn decode_params(&self, params: &ValueRef) -> Result<Value, DecodeError> {
        if self.config.require_array_params && !params.is_array() {
            return Err(DecodeError::InvalidFieldType("params not array"));
        }
        Ok(params.deep_clone()?)
    }
}

/// Signed and unsigned encodings are both accepted as long as the value is a
/// known tag
fn decode_msgtype(tag: &ValueRef) -> Result<MsgType, DecodeError> {
    let ty = match *tag {
        ValueRef::UInt(u) => u8::try_from(u).ok(),
        ValueRef::Int(i) => u8::try_from(i).ok(),
        _ => None,
    };
    ty.and_then(MsgType::from_u8).ok_or_else(|| {
        debug!("invalid msgtype {:?}", tag);
        DecodeError::InvalidMessageType
    })
}

fn decode_msgid(msgid: &ValueRef) -> Result<MsgId, DecodeError> {
    let msgid = msgid
        .as_u64()
        .ok_or(DecodeError::InvalidFieldType("msgid not int"))?;
    u32::try_from(msgid)
        .map(MsgId::from)
        .map_err(|_| DecodeError::InvalidFieldType("msgid out of range"))
}

fn decode_method(method: &ValueRef) -> Result<String, DecodeError> {
    let method = method
        .as_str()
        .ok_or(DecodeError::InvalidFieldType("expected method string"))?;
    Ok(clone_str(method)?)
}

fn decode_optional(value: &ValueRef) -> Result<Option<Value>, DecodeError> {
    if value.is_nil() {
        Ok(None)
    } else {
        Ok(Some(value.deep_clone()?))
    }
}

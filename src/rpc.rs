//! MessagePack-RPC envelopes
//!
//! | Kind         | Tag | Shape                                  |
//! |--------------|-----|----------------------------------------|
//! | Request      | 0   | `[0, msgid, method, params]`           |
//! | Response     | 1   | `[1, msgid, error or nil, result or nil]` |
//! | Notification | 2   | `[2, method, params]`                  |

pub mod decode;
pub mod encode;

use std::fmt;

use enum_primitive_derive::Primitive;

pub use decode::{DecodeError, Decoded};

use crate::decode::DEFAULT_MAX_DEPTH;
use crate::value::Value;

#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub struct MsgId(u32);

// Allow getting, but not modifying, the raw id
impl From<MsgId> for u32 {
    fn from(msgid: MsgId) -> u32 {
        msgid.0
    }
}

impl From<u32> for MsgId {
    fn from(id: u32) -> Self {
        MsgId(id)
    }
}

impl From<MsgId> for Value {
    fn from(msgid: MsgId) -> Value {
        Value::UInt(msgid.0.into())
    }
}

impl fmt::Display for MsgId {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}

/// Wire tag in the first slot of every envelope
#[repr(u8)]
#[derive(Clone, Copy, Debug, Eq, PartialEq, Primitive)]
pub enum MsgType {
    Request = 0,
    Response = 1,
    Notification = 2,
}

impl From<MsgType> for Value {
    fn from(ty: MsgType) -> Value {
        Value::UInt(ty as u64)
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct Request {
    pub msgid: MsgId,
    pub method: String,
    /// Conventionally an array. See [`CodecConfig::require_array_params`].
    pub params: Value,
}

#[derive(Clone, Debug, PartialEq)]
pub struct Response {
    pub msgid: MsgId,
    pub error: Option<Value>,
    pub result: Option<Value>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct Notification {
    pub method: String,
    pub params: Value,
}

impl Request {
    pub fn new(msgid: impl Into<MsgId>, method: impl Into<String>, params: Vec<Value>) -> Self {
        Request {
            msgid: msgid.into(),
            method: method.into(),
            params: Value::Array(params),
        }
    }

    /// Free the method string and the params tree
    pub fn release(self) {
        drop(self)
    }
}

impl Response {
    pub fn ok(msgid: impl Into<MsgId>, result: Value) -> Self {
        Response {
            msgid: msgid.into(),
            error: None,
            result: Some(result),
        }
    }

    pub fn err(msgid: impl Into<MsgId>, error: Value) -> Self {
        Response {
            msgid: msgid.into(),
            error: Some(error),
            result: None,
        }
    }

    /// Error takes precedence when both are set. A response with neither is
    /// a successful nil result.
    pub fn into_result(self) -> Result<Value, Value> {
        match (self.error, self.result) {
            (Some(error), _) => Err(error),
            (None, result) => Ok(result.unwrap_or_default()),
        }
    }

    pub fn release(self) {
        drop(self)
    }
}

impl Notification {
    pub fn new(method: impl Into<String>, params: Vec<Value>) -> Self {
        Notification {
            method: method.into(),
            params: Value::Array(params),
        }
    }

    pub fn release(self) {
        drop(self)
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum AnyMessage {
    Request(Request),
    Response(Response),
    Notification(Notification),
}

impl AnyMessage {
    pub fn msg_type(&self) -> MsgType {
        match self {
            AnyMessage::Request(_) => MsgType::Request,
            AnyMessage::Response(_) => MsgType::Response,
            AnyMessage::Notification(_) => MsgType::Notification,
        }
    }

    pub fn msgid(&self) -> Option<MsgId> {
        match self {
            AnyMessage::Request(req) => Some(req.msgid),
            AnyMessage::Response(rsp) => Some(rsp.msgid),
            AnyMessage::Notification(_) => None,
        }
    }

    pub fn into_request(self) -> Option<Request> {
        if let AnyMessage::Request(req) = self {
            Some(req)
        } else {
            None
        }
    }

    pub fn into_response(self) -> Option<Response> {
        if let AnyMessage::Response(rsp) = self {
            Some(rsp)
        } else {
            None
        }
    }

    pub fn into_notification(self) -> Option<Notification> {
        if let AnyMessage::Notification(nfy) = self {
            Some(nfy)
        } else {
            None
        }
    }

    pub fn release(self) {
        match self {
            AnyMessage::Request(req) => req.release(),
            AnyMessage::Response(rsp) => rsp.release(),
            AnyMessage::Notification(nfy) => nfy.release(),
        }
    }
}

impl From<Request> for AnyMessage {
    fn from(req: Request) -> Self {
        AnyMessage::Request(req)
    }
}

impl From<Response> for AnyMessage {
    fn from(rsp: Response) -> Self {
        AnyMessage::Response(rsp)
    }
}

impl From<Notification> for AnyMessage {
    fn from(nfy: Notification) -> Self {
        AnyMessage::Notification(nfy)
    }
}

/// Knobs for [`Codec`]. The defaults accept anything the wire format allows.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CodecConfig {
    /// Maximum array/map nesting, envelope included, on both encode and decode
    pub max_depth: usize,
    /// Reject request and notification params that are not arrays
    pub require_array_params: bool,
    /// Reject responses carrying both a non-nil error and a non-nil result
    pub exclusive_response: bool,
}

impl Default for CodecConfig {
    fn default() -> Self {
        CodecConfig {
            max_depth: DEFAULT_MAX_DEPTH,
            require_array_params: false,
            exclusive_response: false,
        }
    }
}

impl CodecConfig {
    pub fn max_depth(mut self, max_depth: usize) -> Self {
        self.max_depth = max_depth;
        self
    }

    pub fn require_array_params(mut self, require: bool) -> Self {
        self.require_array_params = require;
        self
    }

    pub fn exclusive_response(mut self, exclusive: bool) -> Self {
        self.exclusive_response = exclusive;
        self
    }
}

/// Envelope encoder/decoder. Holds no state besides its configuration and can
/// be shared freely between threads.
#[derive(Clone, Debug, Default)]
pub struct Codec {
    config: CodecConfig,
}

impl Codec {
    pub fn new(config: CodecConfig) -> Self {
        Codec { config }
    }

    pub fn config(&self) -> &CodecConfig {
        &self.config
    }
}

#[test]
fn msg_type_ordinals() {
    use num_traits::FromPrimitive;

    assert_eq!(MsgType::from_u8(0), Some(MsgType::Request));
    assert_eq!(MsgType::from_u8(1), Some(MsgType::Response));
    assert_eq!(MsgType::from_u8(2), Some(MsgType::Notification));
    assert_eq!(MsgType::from_u8(3), None);
    assert_eq!(Value::from(MsgType::Notification), Value::UInt(2));
}

#[test]
fn response_into_result() {
    assert_eq!(Response::ok(1, 5.into()).into_result(), Ok(Value::Int(5)));
    assert_eq!(
        Response::err(1, "oops".into()).into_result(),
        Err(Value::from("oops"))
    );
    let both = Response {
        msgid: 1.into(),
        error: Some("oops".into()),
        result: Some(17.into()),
    };
    assert_eq!(both.into_result(), Err(Value::from("oops")));
    let neither = Response {
        msgid: 1.into(),
        error: None,
        result: None,
    };
    assert_eq!(neither.into_result(), Ok(Value::Nil));
}

#[test]
fn any_message_accessors() {
    let msg = AnyMessage::from(Request::new(7, "floop", vec![]));
    assert_eq!(msg.msg_type(), MsgType::Request);
    assert_eq!(msg.msgid(), Some(7.into()));
    assert!(msg.clone().into_response().is_none());
    assert_eq!(msg.into_request().map(|r| r.method), Some("floop".to_owned()));

    let msg = AnyMessage::from(Notification::new("redraw", vec![]));
    assert_eq!(msg.msgid(), None);
    msg.release();
}

//! MessagePack-RPC envelope codec
//!
//! Converts [`Request`], [`Response`] and [`Notification`] messages to and from
//! MessagePack frames. Decoded messages own deep copies of their payloads, so
//! the input buffer can be discarded as soon as [`decode`] returns. Encoding
//! borrows the message and leaves it untouched.
//!
//! ```
//! use rmp_envelope::{decode, encode_request, AnyMessage, Request};
//!
//! let req = Request::new(42, "nvim_get_current_line", vec![]);
//! let buf = encode_request(&req).unwrap();
//! let decoded = decode(&buf).unwrap();
//! assert_eq!(decoded.bytes_read, buf.len());
//! assert_eq!(decoded.message, AnyMessage::Request(req));
//! ```
//!
//! Transport concerns (framing a byte stream, matching responses to requests)
//! are left to the caller. `bytes_read` says where the next frame starts, and
//! [`DecodeError::is_incomplete`] says when to wait for more input.

mod clone;
pub mod decode;
pub mod encode;
pub mod rpc;
mod value;

pub use clone::DeepClone;
pub use decode::{read_value_ref, ReadError, ValueRef};
pub use encode::{write_value, EncodeError};
pub use rpc::{
    AnyMessage, Codec, CodecConfig, DecodeError, Decoded, MsgId, MsgType, Notification, Request,
    Response,
};
pub use value::Value;

/// Decode the first frame in `buf` with the default [`CodecConfig`]
pub fn decode(buf: &[u8]) -> Result<Decoded, DecodeError> {
    Codec::default().decode(buf)
}

pub fn encode_request(req: &Request) -> Result<Vec<u8>, EncodeError> {
    Codec::default().encode_request(req)
}

pub fn encode_response(rsp: &Response) -> Result<Vec<u8>, EncodeError> {
    Codec::default().encode_response(rsp)
}

pub fn encode_notification(nfy: &Notification) -> Result<Vec<u8>, EncodeError> {
    Codec::default().encode_notification(nfy)
}

pub fn encode(msg: &AnyMessage) -> Result<Vec<u8>, EncodeError> {
    Codec::default().encode(msg)
}

/// Free every buffer a message owns
pub fn release(msg: AnyMessage) {
    msg.release()
}

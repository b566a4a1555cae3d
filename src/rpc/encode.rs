use std::collections::TryReserveError;

use log::{debug, trace};

use super::*;
use crate::clone::{clone_bytes, DeepClone};
use crate::encode::{EncodeError, MsgPackWriter};

/// Collect envelope fields into an owned array without an infallible
/// allocation
fn envelope<const N: usize>(fields: [Value; N]) -> Result<Value, TryReserveError> {
    let mut items = Vec::new();
    items.try_reserve_exact(N)?;
    items.extend(fields);
    Ok(Value::Array(items))
}

impl Codec {
    /// Serialize into a fresh buffer, which is dropped on failure. The
    /// envelope counts as the first level of nesting, as it does on decode.
    fn serialize(&self, envelope: &Value) -> Result<Vec<u8>, EncodeError> {
        let mut buf = Vec::new();
        MsgPackWriter::with_max_depth(&mut buf, self.config.max_depth)
            .write_value(envelope)
            .map_err(|e| {
                debug!("refusing to encode: {}", e);
                e
            })?;
        Ok(buf)
    }

    /// `[0, msgid, method, params]`
    pub fn encode_request(&self, req: &Request) -> Result<Vec<u8>, EncodeError> {
        self.check_params(&req.params)?;
        let envelope = envelope([
            MsgType::Request.into(),
            req.msgid.into(),
            Value::Str(clone_bytes(req.method.as_bytes())?),
            req.params.deep_clone()?,
        ])?;
        let buf = self.serialize(&envelope)?;
        trace!(
            "encoded request msgid={} method={} ({} bytes)",
            req.msgid,
            req.method,
            buf.len()
        );
        Ok(buf)
    }

    /// `[1, msgid, error, result]` with nil standing in for absent fields
    pub fn encode_response(&self, rsp: &Response) -> Result<Vec<u8>, EncodeError> {
        let has = |v: &Option<Value>| v.as_ref().map_or(false, |v| !v.is_nil());
        if self.config.exclusive_response && has(&rsp.error) && has(&rsp.result) {
            debug!("refusing response msgid={} with error and result", rsp.msgid);
            return Err(EncodeError::InvalidMessageFormat(
                "response has both error and result",
            ));
        }
        let envelope = envelope([
            MsgType::Response.into(),
            rsp.msgid.into(),
            rsp.error.deep_clone()?,
            rsp.result.deep_clone()?,
        ])?;
        let buf = self.serialize(&envelope)?;
        trace!(
            "encoded response msgid={} ({} bytes)",
            rsp.msgid,
            buf.len()
        );
        Ok(buf)
    }

    /// `[2, method, params]`
    pub fn encode_notification(&self, nfy: &Notification) -> Result<Vec<u8>, EncodeError> {
        self.check_params(&nfy.params)?;
        let envelope = envelope([
            MsgType::Notification.into(),
            Value::Str(clone_bytes(nfy.method.as_bytes())?),
            nfy.params.deep_clone()?,
        ])?;
        let buf = self.serialize(&envelope)?;
        trace!(
            "encoded notification method={} ({} bytes)",
            nfy.method,
            buf.len()
        );
        Ok(buf)
    }

    pub fn encode(&self, msg: &AnyMessage) -> Result<Vec<u8>, EncodeError> {
        match msg {
            AnyMessage::Request(req) => self.encode_request(req),
            AnyMessage::Response(rsp) => self.encode_response(rsp),
            AnyMessage::Notification(nfy) => self.encode_notification(nfy),
        }
    }

    fn check_params(&self, params: &Value) -> Result<(), EncodeError> {
        if self.config.require_array_params && params.as_array().is_none() {
            debug!("refusing non-array params");
            return Err(EncodeError::InvalidMessageFormat("params not array"));
        }
        Ok(())
    }
}

use std::collections::TryReserveError;
use std::convert::TryFrom;

use rmp::Marker;

use byteorder::{BigEndian, ByteOrder};

use crate::decode::{is_timestamp_len, DEFAULT_MAX_DEPTH, TIMESTAMP_EXT};
use crate::value::Value;

#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum EncodeError {
    #[error("allocation failed: {0}")]
    Alloc(#[from] TryReserveError),
    #[error("length {0} does not fit in 32 bits")]
    LengthOverflow(usize),
    #[error("timestamp nanoseconds out of range: {0}")]
    InvalidTimestamp(u32),
    #[error("ext type -1 with a {0} byte payload is a timestamp, use Value::Timestamp")]
    TimestampExt(usize),
    #[error("nesting deeper than {0} levels")]
    DepthLimitExceeded(usize),
    #[error("invalid message format: {0}")]
    InvalidMessageFormat(&'static str),
}

/// The smallest representation of a uint based on its value
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EfficientInt {
    Fix(u8),
    U8(u8),
    U16(u16),
    U32(u32),
    U64(u64),
}

impl From<u8> for EfficientInt {
    fn from(val: u8) -> Self {
        if val & 0x7f == val {
            EfficientInt::Fix(val)
        } else {
            EfficientInt::U8(val)
        }
    }
}

impl From<u16> for EfficientInt {
    fn from(val: u16) -> Self {
        if let Ok(val) = u8::try_from(val) {
            val.into()
        } else {
            EfficientInt::U16(val)
        }
    }
}

impl From<u32> for EfficientInt {
    fn from(val: u32) -> Self {
        if let Ok(val) = u16::try_from(val) {
            val.into()
        } else {
            EfficientInt::U32(val)
        }
    }
}

impl From<u64> for EfficientInt {
    fn from(val: u64) -> Self {
        if let Ok(val) = u32::try_from(val) {
            val.into()
        } else {
            EfficientInt::U64(val)
        }
    }
}

/// The smallest signed representation of an int based on its value
///
/// Non-negative values still get a signed marker so they read back as signed.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EfficientSint {
    FixNeg(i8),
    I8(i8),
    I16(i16),
    I32(i32),
    I64(i64),
}

impl From<i64> for EfficientSint {
    fn from(val: i64) -> Self {
        if (-32..0).contains(&val) {
            EfficientSint::FixNeg(val as i8)
        } else if let Ok(val) = i8::try_from(val) {
            EfficientSint::I8(val)
        } else if let Ok(val) = i16::try_from(val) {
            EfficientSint::I16(val)
        } else if let Ok(val) = i32::try_from(val) {
            EfficientSint::I32(val)
        } else {
            EfficientSint::I64(val)
        }
    }
}

#[test]
fn efficient_uint_boundaries() {
    assert_eq!(EfficientInt::from(127u8), EfficientInt::Fix(127));
    assert_eq!(EfficientInt::from(128u8), EfficientInt::U8(128));
    assert_eq!(EfficientInt::from(255u16), EfficientInt::U8(255));
    assert_eq!(EfficientInt::from(256u16), EfficientInt::U16(256));
    assert_eq!(EfficientInt::from(65536u32), EfficientInt::U32(65536));
    assert_eq!(
        EfficientInt::from(4_294_967_296u64),
        EfficientInt::U64(4_294_967_296)
    );
}

#[test]
fn efficient_sint_boundaries() {
    assert_eq!(EfficientSint::from(-1), EfficientSint::FixNeg(-1));
    assert_eq!(EfficientSint::from(-32), EfficientSint::FixNeg(-32));
    assert_eq!(EfficientSint::from(-33), EfficientSint::I8(-33));
    assert_eq!(EfficientSint::from(0), EfficientSint::I8(0));
    assert_eq!(EfficientSint::from(127), EfficientSint::I8(127));
    assert_eq!(EfficientSint::from(128), EfficientSint::I16(128));
    assert_eq!(EfficientSint::from(-32769), EfficientSint::I32(-32769));
    assert_eq!(
        EfficientSint::from(i64::from(i32::MAX) + 1),
        EfficientSint::I64(i64::from(i32::MAX) + 1)
    );
}

/// Serialize `value` onto the end of `buf`, nesting at most
/// [`DEFAULT_MAX_DEPTH`] containers
///
/// On error `buf` may hold a partial value. Callers that need all-or-nothing
/// output should write into a fresh buffer and discard it on failure.
pub fn write_value(buf: &mut Vec<u8>, value: &Value) -> Result<(), EncodeError> {
    MsgPackWriter::new(buf).write_value(value)
}

/// Appends MessagePack to a byte vector, growing it fallibly
pub struct MsgPackWriter<'a> {
    buf: &'a mut Vec<u8>,
    max_depth: usize,
}

impl<'a> MsgPackWriter<'a> {
    pub fn new(buf: &'a mut Vec<u8>) -> Self {
        Self::with_max_depth(buf, DEFAULT_MAX_DEPTH)
    }

    /// Refuse values a reader with the same limit would refuse
    pub fn with_max_depth(buf: &'a mut Vec<u8>, max_depth: usize) -> Self {
        MsgPackWriter { buf, max_depth }
    }

    fn write_all(&mut self, val: &[u8]) -> Result<(), EncodeError> {
        self.buf.try_reserve(val.len())?;
        self.buf.extend_from_slice(val);
        Ok(())
    }

    fn write_u8(&mut self, val: u8) -> Result<(), EncodeError> {
        self.write_all(&[val])
    }

    fn write_u16(&mut self, val: u16) -> Result<(), EncodeError> {
        let mut buf = [0u8; 2];
        BigEndian::write_u16(&mut buf, val);
        self.write_all(&buf)
    }

    fn write_u32(&mut self, val: u32) -> Result<(), EncodeError> {
        let mut buf = [0u8; 4];
        BigEndian::write_u32(&mut buf, val);
        self.write_all(&buf)
    }

    fn write_u64(&mut self, val: u64) -> Result<(), EncodeError> {
        let mut buf = [0u8; 8];
        BigEndian::write_u64(&mut buf, val);
        self.write_all(&buf)
    }

    fn write_i8(&mut self, val: i8) -> Result<(), EncodeError> {
        self.write_u8(val as u8)
    }

    fn write_i16(&mut self, val: i16) -> Result<(), EncodeError> {
        let mut buf = [0u8; 2];
        BigEndian::write_i16(&mut buf, val);
        self.write_all(&buf)
    }

    fn write_i32(&mut self, val: i32) -> Result<(), EncodeError> {
        let mut buf = [0u8; 4];
        BigEndian::write_i32(&mut buf, val);
        self.write_all(&buf)
    }

    fn write_i64(&mut self, val: i64) -> Result<(), EncodeError> {
        let mut buf = [0u8; 8];
        BigEndian::write_i64(&mut buf, val);
        self.write_all(&buf)
    }

    fn write_marker(&mut self, marker: Marker) -> Result<(), EncodeError> {
        self.write_u8(marker.to_u8())
    }

    pub fn write_nil(&mut self) -> Result<(), EncodeError> {
        self.write_marker(Marker::Null)
    }

    pub fn write_bool(&mut self, val: bool) -> Result<(), EncodeError> {
        if val {
            self.write_marker(Marker::True)
        } else {
            self.write_marker(Marker::False)
        }
    }

    /// Write any unsigned int (u8-u64) in the most efficient representation
    pub fn write_uint(&mut self, val: impl Into<EfficientInt>) -> Result<(), EncodeError> {
        match val.into() {
            EfficientInt::Fix(val) => self.write_marker(Marker::FixPos(val)),
            EfficientInt::U8(val) => {
                self.write_marker(Marker::U8)?;
                self.write_u8(val)
            }
            EfficientInt::U16(val) => {
                self.write_marker(Marker::U16)?;
                self.write_u16(val)
            }
            EfficientInt::U32(val) => {
                self.write_marker(Marker::U32)?;
                self.write_u32(val)
            }
            EfficientInt::U64(val) => {
                self.write_marker(Marker::U64)?;
                self.write_u64(val)
            }
        }
    }

    /// Write a signed int in the smallest signed representation
    pub fn write_sint(&mut self, val: i64) -> Result<(), EncodeError> {
        match EfficientSint::from(val) {
            EfficientSint::FixNeg(val) => self.write_marker(Marker::FixNeg(val)),
            EfficientSint::I8(val) => {
                self.write_marker(Marker::I8)?;
                self.write_i8(val)
            }
            EfficientSint::I16(val) => {
                self.write_marker(Marker::I16)?;
                self.write_i16(val)
            }
            EfficientSint::I32(val) => {
                self.write_marker(Marker::I32)?;
                self.write_i32(val)
            }
            EfficientSint::I64(val) => {
                self.write_marker(Marker::I64)?;
                self.write_i64(val)
            }
        }
    }

    pub fn write_f64(&mut self, val: f64) -> Result<(), EncodeError> {
        let mut buf = [0u8; 8];
        BigEndian::write_f64(&mut buf, val);
        self.write_marker(Marker::F64)?;
        self.write_all(&buf)
    }

    /// Pick the fix, 8, 16 or 32 bit header for a length
    fn write_len(
        &mut self,
        len: usize,
        fix_max: u32,
        fix: impl FnOnce(u8) -> Marker,
        m8: Option<Marker>,
        m16: Marker,
        m32: Marker,
    ) -> Result<(), EncodeError> {
        let len32 = u32::try_from(len).map_err(|_| EncodeError::LengthOverflow(len))?;
        if len32 <= fix_max {
            self.write_marker(fix(len32 as u8))
        } else if let (Some(m8), Ok(len8)) = (m8, u8::try_from(len32)) {
            self.write_marker(m8)?;
            self.write_u8(len8)
        } else if let Ok(len16) = u16::try_from(len32) {
            self.write_marker(m16)?;
            self.write_u16(len16)
        } else {
            self.write_marker(m32)?;
            self.write_u32(len32)
        }
    }

    pub fn write_str(&mut self, val: &[u8]) -> Result<(), EncodeError> {
        self.write_len(
            val.len(),
            31,
            Marker::FixStr,
            Some(Marker::Str8),
            Marker::Str16,
            Marker::Str32,
        )?;
        self.write_all(val)
    }

    pub fn write_bin(&mut self, val: &[u8]) -> Result<(), EncodeError> {
        // bin has no fix form
        let len = u32::try_from(val.len()).map_err(|_| EncodeError::LengthOverflow(val.len()))?;
        if let Ok(len8) = u8::try_from(len) {
            self.write_marker(Marker::Bin8)?;
            self.write_u8(len8)?;
        } else if let Ok(len16) = u16::try_from(len) {
            self.write_marker(Marker::Bin16)?;
            self.write_u16(len16)?;
        } else {
            self.write_marker(Marker::Bin32)?;
            self.write_u32(len)?;
        }
        self.write_all(val)
    }

    pub fn write_array_len(&mut self, len: usize) -> Result<(), EncodeError> {
        self.write_len(
            len,
            15,
            Marker::FixArray,
            None,
            Marker::Array16,
            Marker::Array32,
        )
    }

    pub fn write_map_len(&mut self, len: usize) -> Result<(), EncodeError> {
        self.write_len(len, 15, Marker::FixMap, None, Marker::Map16, Marker::Map32)
    }

    pub fn write_ext(&mut self, ty: i8, data: &[u8]) -> Result<(), EncodeError> {
        let fixed = match data.len() {
            1 => Some(Marker::FixExt1),
            2 => Some(Marker::FixExt2),
            4 => Some(Marker::FixExt4),
            8 => Some(Marker::FixExt8),
            16 => Some(Marker::FixExt16),
            _ => None,
        };
        if let Some(marker) = fixed {
            self.write_marker(marker)?;
        } else {
            let len =
                u32::try_from(data.len()).map_err(|_| EncodeError::LengthOverflow(data.len()))?;
            if let Ok(len8) = u8::try_from(len) {
                self.write_marker(Marker::Ext8)?;
                self.write_u8(len8)?;
            } else if let Ok(len16) = u16::try_from(len) {
                self.write_marker(Marker::Ext16)?;
                self.write_u16(len16)?;
            } else {
                self.write_marker(Marker::Ext32)?;
                self.write_u32(len)?;
            }
        }
        self.write_i8(ty)?;
        self.write_all(data)
    }

    /// Timestamp extension in its 32, 64 or 96 bit form, whichever is smallest
    pub fn write_timestamp(&mut self, seconds: i64, nanoseconds: u32) -> Result<(), EncodeError> {
        if nanoseconds >= 1_000_000_000 {
            return Err(EncodeError::InvalidTimestamp(nanoseconds));
        }
        if seconds >> 34 == 0 {
            let packed = (u64::from(nanoseconds) << 34) | seconds as u64;
            if packed & 0xffff_ffff_0000_0000 == 0 {
                let mut data = [0u8; 4];
                BigEndian::write_u32(&mut data, packed as u32);
                self.write_ext(TIMESTAMP_EXT, &data)
            } else {
                let mut data = [0u8; 8];
                BigEndian::write_u64(&mut data, packed);
                self.write_ext(TIMESTAMP_EXT, &data)
            }
        } else {
            let mut data = [0u8; 12];
            BigEndian::write_u32(&mut data[..4], nanoseconds);
            BigEndian::write_i64(&mut data[4..], seconds);
            self.write_ext(TIMESTAMP_EXT, &data)
        }
    }

    pub fn write_value(&mut self, value: &Value) -> Result<(), EncodeError> {
        self.write_nested(value, 0)
    }

    fn write_nested(&mut self, value: &Value, depth: usize) -> Result<(), EncodeError> {
        match value {
            Value::Array(items) => {
                self.enter(depth)?;
                self.write_array_len(items.len())?;
                for item in items {
                    self.write_nested(item, depth + 1)?;
                }
                Ok(())
            }
            Value::Map(entries) => {
                self.enter(depth)?;
                self.write_map_len(entries.len())?;
                for (key, val) in entries {
                    self.write_str(key.as_bytes())?;
                    self.write_nested(val, depth + 1)?;
                }
                Ok(())
            }
            Value::Nil => self.write_nil(),
            Value::Bool(b) => self.write_bool(*b),
            Value::Int(i) => self.write_sint(*i),
            Value::UInt(u) => self.write_uint(*u),
            Value::Float(f) => self.write_f64(*f),
            Value::Str(s) => self.write_str(s),
            Value::Bin(b) => self.write_bin(b),
            // Would read back as a Timestamp, or not at all
            Value::Ext(TIMESTAMP_EXT, data) if is_timestamp_len(data.len()) => {
                Err(EncodeError::TimestampExt(data.len()))
            }
            Value::Ext(ty, data) => self.write_ext(*ty, data),
            Value::Timestamp {
                seconds,
                nanoseconds,
            } => self.write_timestamp(*seconds, *nanoseconds),
        }
    }

    fn enter(&self, depth: usize) -> Result<(), EncodeError> {
        if depth >= self.max_depth {
            Err(EncodeError::DepthLimitExceeded(self.max_depth))
        } else {
            Ok(())
        }
    }
}

use std::collections::TryReserveError;
use std::str::Utf8Error;

use rmp::Marker;

use byteorder::{BigEndian, ByteOrder};

/// Default nesting limit for arrays and maps
pub const DEFAULT_MAX_DEPTH: usize = 512;

/// Extension type reserved for timestamps
pub(crate) const TIMESTAMP_EXT: i8 = -1;

#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum ReadError {
    #[error("unexpected end of input")]
    Incomplete,
    #[error("reserved marker 0xc1")]
    ReservedMarker,
    #[error("map key is not a utf-8 string")]
    InvalidMapKey,
    #[error("timestamp nanoseconds out of range: {0}")]
    InvalidTimestamp(u32),
    #[error("nesting deeper than {0} levels")]
    DepthLimitExceeded(usize),
    #[error("allocation failed: {0}")]
    Alloc(#[from] TryReserveError),
}

impl ReadError {
    /// True when more input could turn this into a successful read
    pub fn is_incomplete(&self) -> bool {
        *self == ReadError::Incomplete
    }
}

impl From<Utf8Error> for ReadError {
    fn from(_: Utf8Error) -> Self {
        ReadError::InvalidMapKey
    }
}

/// A parsed value whose string, binary and extension payloads borrow from the
/// input buffer
///
/// This is the transient parse tree. Copy out what you need with
/// [`DeepClone`](crate::DeepClone) before the buffer goes away.
#[derive(Clone, Debug, PartialEq)]
pub enum ValueRef<'a> {
    Nil,
    Bool(bool),
    Int(i64),
    UInt(u64),
    Float(f64),
    Str(&'a [u8]),
    Bin(&'a [u8]),
    Array(Vec<ValueRef<'a>>),
    Map(Vec<(&'a str, ValueRef<'a>)>),
    Ext(i8, &'a [u8]),
    Timestamp { seconds: i64, nanoseconds: u32 },
}

impl<'a> ValueRef<'a> {
    pub fn is_nil(&self) -> bool {
        matches!(self, ValueRef::Nil)
    }

    pub fn is_array(&self) -> bool {
        matches!(self, ValueRef::Array(_))
    }

    /// Any integer that fits in a u64, regardless of the signed/unsigned tag
    pub fn as_u64(&self) -> Option<u64> {
        match *self {
            ValueRef::UInt(u) => Some(u),
            ValueRef::Int(i) if i >= 0 => Some(i as u64),
            _ => None,
        }
    }

    /// The string payload, if it is valid UTF-8
    pub fn as_str(&self) -> Option<&'a str> {
        if let ValueRef::Str(s) = *self {
            std::str::from_utf8(s).ok()
        } else {
            None
        }
    }
}

/// Parse one value from the front of `buf`, advancing it past the value
pub fn read_value_ref<'a>(buf: &mut &'a [u8]) -> Result<ValueRef<'a>, ReadError> {
    let input: &'a [u8] = *buf;
    let mut reader = MsgPackReader::new(input);
    let value = reader.read_value_ref()?;
    *buf = &input[reader.position()..];
    Ok(value)
}

enum Header<'a> {
    Array(usize),
    Map(usize),
    Value(ValueRef<'a>),
}

/// Marker-driven MessagePack reader over a byte slice
pub struct MsgPackReader<'a> {
    buf: &'a [u8],
    pos: usize,
    max_depth: usize,
}

impl<'a> MsgPackReader<'a> {
    pub fn new(buf: &'a [u8]) -> Self {
        Self::with_max_depth(buf, DEFAULT_MAX_DEPTH)
    }

    pub fn with_max_depth(buf: &'a [u8], max_depth: usize) -> Self {
        MsgPackReader {
            buf,
            pos: 0,
            max_depth,
        }
    }

    /// Number of bytes consumed so far
    pub fn position(&self) -> usize {
        self.pos
    }

    pub fn remaining(&self) -> usize {
        self.buf.len() - self.pos
    }

    fn read_n(&mut self, n: usize) -> Result<&'a [u8], ReadError> {
        if n > self.remaining() {
            return Err(ReadError::Incomplete);
        }
        let bytes = &self.buf[self.pos..self.pos + n];
        self.pos += n;
        Ok(bytes)
    }

    fn read_u8(&mut self) -> Result<u8, ReadError> {
        Ok(self.read_n(1)?[0])
    }

    fn read_u16(&mut self) -> Result<u16, ReadError> {
        Ok(BigEndian::read_u16(self.read_n(2)?))
    }

    fn read_u32(&mut self) -> Result<u32, ReadError> {
        Ok(BigEndian::read_u32(self.read_n(4)?))
    }

    fn read_u64(&mut self) -> Result<u64, ReadError> {
        Ok(BigEndian::read_u64(self.read_n(8)?))
    }

    fn read_i8(&mut self) -> Result<i8, ReadError> {
        self.read_u8().map(|x| x as i8)
    }

    fn read_i16(&mut self) -> Result<i16, ReadError> {
        Ok(BigEndian::read_i16(self.read_n(2)?))
    }

    fn read_i32(&mut self) -> Result<i32, ReadError> {
        Ok(BigEndian::read_i32(self.read_n(4)?))
    }

    fn read_i64(&mut self) -> Result<i64, ReadError> {
        Ok(BigEndian::read_i64(self.read_n(8)?))
    }

    fn read_f32(&mut self) -> Result<f32, ReadError> {
        Ok(BigEndian::read_f32(self.read_n(4)?))
    }

    fn read_f64(&mut self) -> Result<f64, ReadError> {
        Ok(BigEndian::read_f64(self.read_n(8)?))
    }

    /// Read one complete value
    pub fn read_value_ref(&mut self) -> Result<ValueRef<'a>, ReadError> {
        self.read_nested(0)
    }

    fn read_nested(&mut self, depth: usize) -> Result<ValueRef<'a>, ReadError> {
        match self.read_header()? {
            Header::Array(len) => self.read_array(len, depth),
            Header::Map(len) => self.read_map(len, depth),
            Header::Value(value) => Ok(value),
        }
    }

    /// Read one marker and either the whole scalar behind it or the length of
    /// the container it opens
    ///
    /// Kept out of line so each level of `read_nested` recursion costs only a
    /// small stack frame.
    #[inline(never)]
    fn read_header(&mut self) -> Result<Header<'a>, ReadError> {
        let marker = Marker::from_u8(self.read_u8()?);
        Ok(Header::Value(match marker {
            Marker::FixPos(val) => ValueRef::UInt(val.into()),
            Marker::FixNeg(val) => ValueRef::Int(val.into()),
            Marker::Null => ValueRef::Nil,
            Marker::True => ValueRef::Bool(true),
            Marker::False => ValueRef::Bool(false),
            Marker::U8 => ValueRef::UInt(self.read_u8()?.into()),
            Marker::U16 => ValueRef::UInt(self.read_u16()?.into()),
            Marker::U32 => ValueRef::UInt(self.read_u32()?.into()),
            Marker::U64 => ValueRef::UInt(self.read_u64()?),
            Marker::I8 => ValueRef::Int(self.read_i8()?.into()),
            Marker::I16 => ValueRef::Int(self.read_i16()?.into()),
            Marker::I32 => ValueRef::Int(self.read_i32()?.into()),
            Marker::I64 => ValueRef::Int(self.read_i64()?),
            Marker::F32 => ValueRef::Float(self.read_f32()?.into()),
            Marker::F64 => ValueRef::Float(self.read_f64()?),
            Marker::FixStr(len) => ValueRef::Str(self.read_n(len.into())?),
            Marker::Str8 => {
                let len = self.read_u8()?;
                ValueRef::Str(self.read_n(len.into())?)
            }
            Marker::Str16 => {
                let len = self.read_u16()?;
                ValueRef::Str(self.read_n(len.into())?)
            }
            Marker::Str32 => {
                let len = self.read_u32()?;
                ValueRef::Str(self.read_n(len as usize)?)
            }
            Marker::Bin8 => {
                let len = self.read_u8()?;
                ValueRef::Bin(self.read_n(len.into())?)
            }
            Marker::Bin16 => {
                let len = self.read_u16()?;
                ValueRef::Bin(self.read_n(len.into())?)
            }
            Marker::Bin32 => {
                let len = self.read_u32()?;
                ValueRef::Bin(self.read_n(len as usize)?)
            }
            Marker::FixArray(len) => return Ok(Header::Array(len.into())),
            Marker::Array16 => return Ok(Header::Array(self.read_u16()?.into())),
            Marker::Array32 => return Ok(Header::Array(self.read_u32()? as usize)),
            Marker::FixMap(len) => return Ok(Header::Map(len.into())),
            Marker::Map16 => return Ok(Header::Map(self.read_u16()?.into())),
            Marker::Map32 => return Ok(Header::Map(self.read_u32()? as usize)),
            Marker::FixExt1 => self.read_ext(1)?,
            Marker::FixExt2 => self.read_ext(2)?,
            Marker::FixExt4 => self.read_ext(4)?,
            Marker::FixExt8 => self.read_ext(8)?,
            Marker::FixExt16 => self.read_ext(16)?,
            Marker::Ext8 => {
                let len = self.read_u8()?;
                self.read_ext(len.into())?
            }
            Marker::Ext16 => {
                let len = self.read_u16()?;
                self.read_ext(len.into())?
            }
            Marker::Ext32 => {
                let len = self.read_u32()?;
                self.read_ext(len as usize)?
            }
            Marker::Reserved => return Err(ReadError::ReservedMarker),
        }))
    }

    fn enter(&self, depth: usize) -> Result<(), ReadError> {
        if depth >= self.max_depth {
            Err(ReadError::DepthLimitExceeded(self.max_depth))
        } else {
            Ok(())
        }
    }

    fn read_array(&mut self, len: usize, depth: usize) -> Result<ValueRef<'a>, ReadError> {
        self.enter(depth)?;
        // Every element takes at least one byte. Refuse lengths the input
        // cannot satisfy before reserving space for them.
        if len > self.remaining() {
            return Err(ReadError::Incomplete);
        }
        let mut items = Vec::new();
        items.try_reserve_exact(len)?;
        for _ in 0..len {
            items.push(self.read_nested(depth + 1)?);
        }
        Ok(ValueRef::Array(items))
    }

    fn read_map(&mut self, len: usize, depth: usize) -> Result<ValueRef<'a>, ReadError> {
        self.enter(depth)?;
        if len > self.remaining() / 2 {
            return Err(ReadError::Incomplete);
        }
        let mut entries = Vec::new();
        entries.try_reserve_exact(len)?;
        for _ in 0..len {
            let key = match self.read_nested(depth + 1)? {
                ValueRef::Str(key) => std::str::from_utf8(key)?,
                _ => return Err(ReadError::InvalidMapKey),
            };
            let value = self.read_nested(depth + 1)?;
            entries.push((key, value));
        }
        Ok(ValueRef::Map(entries))
    }

    fn read_ext(&mut self, len: usize) -> Result<ValueRef<'a>, ReadError> {
        let ty = self.read_i8()?;
        let data = self.read_n(len)?;
        if ty == TIMESTAMP_EXT {
            if let Some(ts) = read_timestamp(data)? {
                return Ok(ts);
            }
        }
        Ok(ValueRef::Ext(ty, data))
    }
}

/// Ext -1 payloads of these lengths are read as timestamps
pub(crate) fn is_timestamp_len(len: usize) -> bool {
    matches!(len, 4 | 8 | 12)
}

/// Interpret an ext -1 payload. Lengths other than 4, 8 and 12 are left as a
/// plain extension.
fn read_timestamp(data: &[u8]) -> Result<Option<ValueRef<'static>>, ReadError> {
    let (seconds, nanoseconds) = match data.len() {
        4 => (i64::from(BigEndian::read_u32(data)), 0),
        8 => {
            let packed = BigEndian::read_u64(data);
            ((packed & 0x3_ffff_ffff) as i64, (packed >> 34) as u32)
        }
        12 => (BigEndian::read_i64(&data[4..]), BigEndian::read_u32(data)),
        _ => return Ok(None),
    };
    if nanoseconds >= 1_000_000_000 {
        return Err(ReadError::InvalidTimestamp(nanoseconds));
    }
    Ok(Some(ValueRef::Timestamp {
        seconds,
        nanoseconds,
    }))
}

/// Owned dynamic MessagePack value
///
/// Every buffer referenced by a `Value` is owned by it. Use
/// [`DeepClone`](crate::DeepClone) to copy one with fallible allocation.
#[derive(Clone, Debug, PartialEq)]
pub enum Value {
    Nil,
    Bool(bool),
    Int(i64),
    UInt(u64),
    Float(f64),
    /// Raw string bytes. Not required to be valid UTF-8.
    Str(Vec<u8>),
    Bin(Vec<u8>),
    Array(Vec<Value>),
    /// Entries in the order they were read or built. Order carries no meaning.
    Map(Vec<(String, Value)>),
    Ext(i8, Vec<u8>),
    Timestamp { seconds: i64, nanoseconds: u32 },
}

impl Value {
    pub fn is_nil(&self) -> bool {
        matches!(self, Value::Nil)
    }

    pub fn as_bool(&self) -> Option<bool> {
        if let Value::Bool(b) = *self {
            Some(b)
        } else {
            None
        }
    }

    /// Any integer that fits in a u64, regardless of the signed/unsigned tag
    pub fn as_u64(&self) -> Option<u64> {
        match *self {
            Value::UInt(u) => Some(u),
            Value::Int(i) if i >= 0 => Some(i as u64),
            _ => None,
        }
    }

    /// Any integer that fits in an i64, regardless of the signed/unsigned tag
    pub fn as_i64(&self) -> Option<i64> {
        match *self {
            Value::Int(i) => Some(i),
            Value::UInt(u) if u <= i64::MAX as u64 => Some(u as i64),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        if let Value::Float(f) = *self {
            Some(f)
        } else {
            None
        }
    }

    /// The string payload, if it is valid UTF-8
    pub fn as_str(&self) -> Option<&str> {
        if let Value::Str(s) = self {
            std::str::from_utf8(s).ok()
        } else {
            None
        }
    }

    /// Raw payload of a Str or Bin
    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            Value::Str(b) | Value::Bin(b) => Some(b),
            _ => None,
        }
    }

    pub fn as_array(&self) -> Option<&[Value]> {
        if let Value::Array(a) = self {
            Some(a)
        } else {
            None
        }
    }

    pub fn as_map(&self) -> Option<&[(String, Value)]> {
        if let Value::Map(m) = self {
            Some(m)
        } else {
            None
        }
    }

    /// Look up the first map entry with the given key
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.as_map()?
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v)
    }
}

impl Default for Value {
    fn default() -> Self {
        Value::Nil
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

macro_rules! from_signed {
    ($($t:ty),*) => {
        $(impl From<$t> for Value {
            fn from(i: $t) -> Self {
                Value::Int(i.into())
            }
        })*
    };
}

macro_rules! from_unsigned {
    ($($t:ty),*) => {
        $(impl From<$t> for Value {
            fn from(u: $t) -> Self {
                Value::UInt(u.into())
            }
        })*
    };
}

from_signed!(i8, i16, i32, i64);
from_unsigned!(u8, u16, u32, u64);

impl From<f32> for Value {
    fn from(f: f32) -> Self {
        Value::Float(f.into())
    }
}

impl From<f64> for Value {
    fn from(f: f64) -> Self {
        Value::Float(f)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Str(s.as_bytes().to_vec())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Str(s.into_bytes())
    }
}

/// Byte vectors become `Bin`. Build `Value::Str` directly for raw string bytes.
impl From<Vec<u8>> for Value {
    fn from(b: Vec<u8>) -> Self {
        Value::Bin(b)
    }
}

impl From<Vec<Value>> for Value {
    fn from(a: Vec<Value>) -> Self {
        Value::Array(a)
    }
}

impl From<Vec<(String, Value)>> for Value {
    fn from(m: Vec<(String, Value)>) -> Self {
        Value::Map(m)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map_or(Value::Nil, Into::into)
    }
}

#[test]
fn integer_views() {
    assert_eq!(Value::from(17).as_u64(), Some(17));
    assert_eq!(Value::from(-1).as_u64(), None);
    assert_eq!(Value::from(u64::MAX).as_i64(), None);
    assert_eq!(Value::from(42u8).as_i64(), Some(42));
    assert_eq!(Value::from("x").as_u64(), None);
}

#[test]
fn str_views() {
    assert_eq!(Value::from("oops").as_str(), Some("oops"));
    assert_eq!(Value::Str(vec![0xff, 0xfe]).as_str(), None);
    assert_eq!(Value::Str(vec![0xff]).as_bytes(), Some(&[0xff][..]));
    assert_eq!(Value::from(vec![1u8, 2]).as_str(), None);
}

#[test]
fn map_lookup() {
    let map = Value::from(vec![
        ("a".to_owned(), Value::from(1)),
        ("b".to_owned(), Value::from(Some("two"))),
        ("c".to_owned(), Value::from(None::<bool>)),
    ]);
    assert_eq!(map.get("a"), Some(&Value::Int(1)));
    assert_eq!(map.get("b").and_then(Value::as_str), Some("two"));
    assert!(map.get("c").map_or(false, Value::is_nil));
    assert_eq!(map.get("d"), None);
}

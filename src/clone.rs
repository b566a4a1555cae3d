//! Deep copies with fallible allocation.
//!
//! Every buffer is reserved with `try_reserve_exact`, so running out of memory
//! surfaces as an `Err` rather than aborting. Whatever was copied before the
//! failure is owned by locals of the failing call and is dropped on the way
//! out.

use std::collections::TryReserveError;

use crate::decode::ValueRef;
use crate::value::Value;

/// Produce an owned [`Value`] that shares no storage with `self`
pub trait DeepClone {
    fn deep_clone(&self) -> Result<Value, TryReserveError>;
}

impl DeepClone for Value {
    fn deep_clone(&self) -> Result<Value, TryReserveError> {
        Ok(match self {
            Value::Nil => Value::Nil,
            Value::Bool(b) => Value::Bool(*b),
            Value::Int(i) => Value::Int(*i),
            Value::UInt(u) => Value::UInt(*u),
            Value::Float(f) => Value::Float(*f),
            Value::Timestamp {
                seconds,
                nanoseconds,
            } => Value::Timestamp {
                seconds: *seconds,
                nanoseconds: *nanoseconds,
            },
            Value::Str(s) => Value::Str(clone_bytes(s)?),
            Value::Bin(b) => Value::Bin(clone_bytes(b)?),
            Value::Ext(ty, data) => Value::Ext(*ty, clone_bytes(data)?),
            Value::Array(items) => Value::Array(clone_items(items)?),
            Value::Map(entries) => Value::Map(clone_entries(entries)?),
        })
    }
}

impl DeepClone for ValueRef<'_> {
    fn deep_clone(&self) -> Result<Value, TryReserveError> {
        Ok(match *self {
            ValueRef::Nil => Value::Nil,
            ValueRef::Bool(b) => Value::Bool(b),
            ValueRef::Int(i) => Value::Int(i),
            ValueRef::UInt(u) => Value::UInt(u),
            ValueRef::Float(f) => Value::Float(f),
            ValueRef::Timestamp {
                seconds,
                nanoseconds,
            } => Value::Timestamp {
                seconds,
                nanoseconds,
            },
            ValueRef::Str(s) => Value::Str(clone_bytes(s)?),
            ValueRef::Bin(b) => Value::Bin(clone_bytes(b)?),
            ValueRef::Ext(ty, data) => Value::Ext(ty, clone_bytes(data)?),
            ValueRef::Array(ref items) => Value::Array(clone_items(items)?),
            ValueRef::Map(ref entries) => Value::Map(clone_entries(entries)?),
        })
    }
}

impl<T: DeepClone> DeepClone for Option<T> {
    /// `None` clones to `Nil`
    fn deep_clone(&self) -> Result<Value, TryReserveError> {
        match self {
            Some(v) => v.deep_clone(),
            None => Ok(Value::Nil),
        }
    }
}

pub(crate) fn clone_bytes(src: &[u8]) -> Result<Vec<u8>, TryReserveError> {
    let mut dst = Vec::new();
    dst.try_reserve_exact(src.len())?;
    dst.extend_from_slice(src);
    Ok(dst)
}

pub(crate) fn clone_str(src: &str) -> Result<String, TryReserveError> {
    let mut dst = String::new();
    dst.try_reserve_exact(src.len())?;
    dst.push_str(src);
    Ok(dst)
}

fn clone_items<T: DeepClone>(src: &[T]) -> Result<Vec<Value>, TryReserveError> {
    let mut dst = Vec::new();
    dst.try_reserve_exact(src.len())?;
    for item in src {
        dst.push(item.deep_clone()?);
    }
    Ok(dst)
}

fn clone_entries<K: AsRef<str>, V: DeepClone>(
    src: &[(K, V)],
) -> Result<Vec<(String, Value)>, TryReserveError> {
    let mut dst = Vec::new();
    dst.try_reserve_exact(src.len())?;
    for (key, value) in src {
        let key = clone_str(key.as_ref())?;
        dst.push((key, value.deep_clone()?));
    }
    Ok(dst)
}

//! Decoded values and the holder capability used to reuse them across rows.

use std::net::{Ipv4Addr, Ipv6Addr};

use chdata_bytes::{ByteSlice, Charset, I256, U256};
use uuid::Uuid;

/// A decimal number as an unscaled integer and a scale: `unscaled * 10^-scale`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Decimal {
    pub unscaled: I256,
    pub scale: u32,
}

impl Decimal {
    pub fn new(unscaled: impl Into<I256>, scale: u32) -> Decimal {
        Decimal {
            unscaled: unscaled.into(),
            scale,
        }
    }
}

impl std::fmt::Display for Decimal {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let digits = self.unscaled.to_string();
        let (sign, digits) = match digits.strip_prefix('-') {
            Some(d) => ("-", d),
            None => ("", digits.as_str()),
        };
        let scale = self.scale as usize;
        if scale == 0 {
            return write!(f, "{sign}{digits}");
        }
        let padded = format!("{digits:0>width$}", width = scale + 1);
        let (int, frac) = padded.split_at(padded.len() - scale);
        write!(f, "{sign}{int}.{frac}")
    }
}

/// A point in time as ticks of `10^-scale` seconds since the Unix epoch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct DateTime {
    pub ticks: i64,
    pub scale: u32,
}

impl DateTime {
    pub fn from_seconds(seconds: i64) -> DateTime {
        DateTime {
            ticks: seconds,
            scale: 0,
        }
    }

    pub fn seconds(&self) -> i64 {
        self.ticks.div_euclid(10i64.pow(self.scale))
    }
}

/// A single decoded value.
///
/// Composite types decode into `Array`, `Map` and `Tuple`. `Nested`, geo rings and
/// polygons are arrays; a `Variant` decodes into whichever alternative was present.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum Value {
    #[default]
    Null,
    Bool(bool),
    Int8(i8),
    UInt8(u8),
    Int16(i16),
    UInt16(u16),
    Int32(i32),
    UInt32(u32),
    Int64(i64),
    UInt64(u64),
    Int128(i128),
    UInt128(u128),
    Int256(I256),
    UInt256(U256),
    Float32(f32),
    Float64(f64),
    Decimal(Decimal),
    /// Days since 1970-01-01.
    Date(i32),
    DateTime(DateTime),
    /// The numeric value of an enum constant.
    Enum(i16),
    Interval(i64),
    String(ByteSlice),
    Uuid(Uuid),
    Ipv4(Ipv4Addr),
    Ipv6(Ipv6Addr),
    Point(f64, f64),
    Array(Vec<Value>),
    Map(Vec<(Value, Value)>),
    Tuple(Vec<Value>),
}

impl Value {
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Returns the value as `i64` if it is an integer that fits.
    pub fn as_i64(&self) -> Option<i64> {
        match *self {
            Value::Bool(v) => Some(v as i64),
            Value::Int8(v) => Some(v as i64),
            Value::UInt8(v) => Some(v as i64),
            Value::Int16(v) => Some(v as i64),
            Value::UInt16(v) => Some(v as i64),
            Value::Int32(v) => Some(v as i64),
            Value::UInt32(v) => Some(v as i64),
            Value::Int64(v) | Value::Interval(v) => Some(v),
            Value::UInt64(v) => i64::try_from(v).ok(),
            Value::Int128(v) => i64::try_from(v).ok(),
            Value::UInt128(v) => i64::try_from(v).ok(),
            Value::Int256(v) => v.to_i128().and_then(|v| i64::try_from(v).ok()),
            Value::UInt256(v) => v.to_u128().and_then(|v| i64::try_from(v).ok()),
            Value::Date(v) => Some(v as i64),
            Value::Enum(v) => Some(v as i64),
            _ => None,
        }
    }

    /// Returns the value as `u64` if it is a non-negative integer that fits.
    pub fn as_u64(&self) -> Option<u64> {
        match *self {
            Value::UInt64(v) => Some(v),
            Value::UInt128(v) => u64::try_from(v).ok(),
            Value::UInt256(v) => v.to_u128().and_then(|v| u64::try_from(v).ok()),
            _ => self.as_i64().and_then(|v| u64::try_from(v).ok()),
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match *self {
            Value::Float32(v) => Some(v as f64),
            Value::Float64(v) => Some(v),
            _ => self.as_i64().map(|v| v as f64),
        }
    }

    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            Value::String(s) => Some(s.as_slice()),
            _ => None,
        }
    }

    /// Returns the string content if it is valid UTF-8.
    pub fn as_str(&self) -> Option<&str> {
        self.as_bytes().and_then(|b| std::str::from_utf8(b).ok())
    }

    /// Decodes the string content with the given charset.
    pub fn to_string_lossy(&self, charset: Charset) -> Option<String> {
        match self {
            Value::String(s) => Some(
                s.as_string(charset)
                    .unwrap_or_else(|_| String::from_utf8_lossy(s.as_slice()).into_owned()),
            ),
            _ => None,
        }
    }

    pub fn as_slice(&self) -> Option<&[Value]> {
        match self {
            Value::Array(items) | Value::Tuple(items) => Some(items),
            _ => None,
        }
    }

    pub fn as_map(&self) -> Option<&[(Value, Value)]> {
        match self {
            Value::Map(entries) => Some(entries),
            _ => None,
        }
    }
}

/// Reuse capability of decoded values.
///
/// A reader that reuses holders calls [`reset`](Self::reset) and decodes the next row
/// into the same holder; one that hands out independent rows calls
/// [`copy`](Self::copy).
pub trait ValueHolder {
    /// Returns the holder to its empty state, keeping allocations where possible.
    fn reset(&mut self);

    /// Returns a copy that shares no buffers with `self`.
    fn copy(&self) -> Self;
}

impl ValueHolder for Value {
    fn reset(&mut self) {
        match self {
            Value::Array(items) | Value::Tuple(items) => items.clear(),
            Value::Map(entries) => entries.clear(),
            Value::Point(x, y) => {
                *x = 0.0;
                *y = 0.0;
            }
            _ => *self = Value::Null,
        }
    }

    fn copy(&self) -> Value {
        match self {
            Value::String(s) => Value::String(s.copy(true)),
            Value::Array(items) => Value::Array(items.iter().map(Value::copy).collect()),
            Value::Tuple(items) => Value::Tuple(items.iter().map(Value::copy).collect()),
            Value::Map(entries) => Value::Map(
                entries
                    .iter()
                    .map(|(k, v)| (k.copy(), v.copy()))
                    .collect(),
            ),
            other => other.clone(),
        }
    }
}

impl<T: ValueHolder> ValueHolder for Vec<T> {
    fn reset(&mut self) {
        self.iter_mut().for_each(ValueHolder::reset);
    }

    fn copy(&self) -> Vec<T> {
        self.iter().map(ValueHolder::copy).collect()
    }
}

macro_rules! impl_from {
    ($($t:ty => $variant:ident),* $(,)?) => {
        $(impl From<$t> for Value {
            fn from(v: $t) -> Value {
                Value::$variant(v)
            }
        })*
    };
}

impl_from!(
    bool => Bool,
    i8 => Int8,
    u8 => UInt8,
    i16 => Int16,
    u16 => UInt16,
    i32 => Int32,
    u32 => UInt32,
    i64 => Int64,
    u64 => UInt64,
    i128 => Int128,
    u128 => UInt128,
    I256 => Int256,
    U256 => UInt256,
    f32 => Float32,
    f64 => Float64,
    Decimal => Decimal,
    DateTime => DateTime,
    ByteSlice => String,
    Uuid => Uuid,
    Ipv4Addr => Ipv4,
    Ipv6Addr => Ipv6,
    Vec<Value> => Array,
);

impl From<&str> for Value {
    fn from(v: &str) -> Value {
        Value::String(ByteSlice::from(v))
    }
}

impl From<String> for Value {
    fn from(v: String) -> Value {
        Value::String(ByteSlice::from(v))
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Value {
        v.map_or(Value::Null, Into::into)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_numeric_accessors() {
        assert_eq!(Value::from(-5i32).as_i64(), Some(-5));
        assert_eq!(Value::from(-5i32).as_u64(), None);
        assert_eq!(Value::from(u64::MAX).as_u64(), Some(u64::MAX));
        assert_eq!(Value::from(u64::MAX).as_i64(), None);
        assert_eq!(Value::from(1.5f32).as_f64(), Some(1.5));
        assert_eq!(Value::from(Some("x")).as_str(), Some("x"));
        assert!(Value::from(None::<i32>).is_null());
    }

    #[test]
    fn test_decimal_display() {
        assert_eq!(Decimal::new(123456i64, 4).to_string(), "12.3456");
        assert_eq!(Decimal::new(-5i64, 3).to_string(), "-0.005");
        assert_eq!(Decimal::new(42i64, 0).to_string(), "42");
    }

    #[test]
    fn test_reset_keeps_capacity() {
        let mut v = Value::Array(Vec::with_capacity(16));
        if let Value::Array(items) = &mut v {
            items.push(Value::from(1u8));
        }
        v.reset();
        match &v {
            Value::Array(items) => {
                assert!(items.is_empty());
                assert!(items.capacity() >= 16);
            }
            other => panic!("unexpected {other:?}"),
        }

        let mut s = Value::from("abc");
        s.reset();
        assert!(s.is_null());
    }

    #[test]
    fn test_copy_detaches_strings() {
        let shared = ByteSlice::from("hello world");
        let v = Value::Tuple(vec![Value::String(shared.slice(0..5)), Value::from(1i64)]);
        let copied = v.copy();
        assert_eq!(copied, v);
        match &copied {
            Value::Tuple(items) => match &items[0] {
                Value::String(s) => assert!(s.is_compact()),
                other => panic!("unexpected {other:?}"),
            },
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_datetime_seconds() {
        let dt = DateTime {
            ticks: -1500,
            scale: 3,
        };
        assert_eq!(dt.seconds(), -2);
        assert_eq!(DateTime::from_seconds(7).seconds(), 7);
    }
}

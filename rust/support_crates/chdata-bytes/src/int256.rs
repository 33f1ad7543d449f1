//! 256-bit integers stored as four little-endian 64-bit limbs.
//!
//! Only what the wire format needs: conversion from and to little-endian bytes of any
//! width up to 32, conversion from primitive integers, and decimal text.

use std::str::FromStr;

type Limbs = [u64; 4];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct U256(Limbs);

/// Two's complement signed 256-bit integer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct I256(Limbs);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseIntError(String);

impl std::fmt::Display for ParseIntError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "invalid 256-bit integer literal '{}'", self.0)
    }
}

impl std::error::Error for ParseIntError {}

impl U256 {
    pub const ZERO: U256 = U256([0; 4]);
    pub const MAX: U256 = U256([u64::MAX; 4]);

    /// Decodes up to 32 little-endian bytes, zero-extending.
    ///
    /// # Panics
    ///
    /// Panics if `bytes` is longer than 32.
    pub fn from_le_slice(bytes: &[u8]) -> U256 {
        assert!(bytes.len() <= 32, "{} bytes do not fit 256 bits", bytes.len());
        let mut buf = [0u8; 32];
        buf[..bytes.len()].copy_from_slice(bytes);
        U256::from_le_bytes(buf)
    }

    pub fn from_le_bytes(bytes: [u8; 32]) -> U256 {
        U256(limbs_from_le(&bytes))
    }

    pub fn to_le_bytes(&self) -> [u8; 32] {
        limbs_to_le(&self.0)
    }

    pub fn is_zero(&self) -> bool {
        self.0 == [0; 4]
    }

    pub fn to_u128(&self) -> Option<u128> {
        if self.0[2] == 0 && self.0[3] == 0 {
            Some(self.0[0] as u128 | ((self.0[1] as u128) << 64))
        } else {
            None
        }
    }

    /// Reinterprets the bits as a signed value.
    pub fn as_i256(&self) -> I256 {
        I256(self.0)
    }
}

impl I256 {
    pub const ZERO: I256 = I256([0; 4]);
    pub const MAX: I256 = I256([u64::MAX, u64::MAX, u64::MAX, i64::MAX as u64]);
    pub const MIN: I256 = I256([0, 0, 0, 1 << 63]);

    /// Decodes up to 32 little-endian bytes, sign-extending from the top bit of
    /// the last byte.
    ///
    /// # Panics
    ///
    /// Panics if `bytes` is longer than 32.
    pub fn from_le_slice(bytes: &[u8]) -> I256 {
        assert!(bytes.len() <= 32, "{} bytes do not fit 256 bits", bytes.len());
        let fill = match bytes.last() {
            Some(&b) if b & 0x80 != 0 => 0xFF,
            _ => 0x00,
        };
        let mut buf = [fill; 32];
        buf[..bytes.len()].copy_from_slice(bytes);
        I256::from_le_bytes(buf)
    }

    pub fn from_le_bytes(bytes: [u8; 32]) -> I256 {
        I256(limbs_from_le(&bytes))
    }

    pub fn to_le_bytes(&self) -> [u8; 32] {
        limbs_to_le(&self.0)
    }

    pub fn is_negative(&self) -> bool {
        self.0[3] >> 63 == 1
    }

    pub fn is_zero(&self) -> bool {
        self.0 == [0; 4]
    }

    pub fn wrapping_neg(&self) -> I256 {
        I256(negate(&self.0))
    }

    pub fn to_i128(&self) -> Option<i128> {
        let low = self.0[0] as u128 | ((self.0[1] as u128) << 64);
        let value = low as i128;
        let fill = if value < 0 { u64::MAX } else { 0 };
        (self.0[2] == fill && self.0[3] == fill).then_some(value)
    }

    /// Returns `true` if the value fits into `bytes` bytes of two's complement.
    pub fn fits_in(&self, bytes: usize) -> bool {
        if bytes >= 32 {
            return true;
        }
        let le = self.to_le_bytes();
        let fill = if self.is_negative() { 0xFF } else { 0x00 };
        le[bytes..].iter().all(|&b| b == fill) && (le[bytes - 1] & 0x80 == fill & 0x80)
    }

    /// Reinterprets the bits as an unsigned value.
    pub fn as_u256(&self) -> U256 {
        U256(self.0)
    }
}

impl Ord for I256 {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        match (self.is_negative(), other.is_negative()) {
            (true, false) => std::cmp::Ordering::Less,
            (false, true) => std::cmp::Ordering::Greater,
            _ => self.0.iter().rev().cmp(other.0.iter().rev()),
        }
    }
}

impl PartialOrd for I256 {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for U256 {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.0.iter().rev().cmp(other.0.iter().rev())
    }
}

impl PartialOrd for U256 {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

macro_rules! impl_from_unsigned {
    ($($t:ty),*) => {$(
        impl From<$t> for U256 {
            fn from(v: $t) -> U256 {
                let v = v as u128;
                U256([v as u64, (v >> 64) as u64, 0, 0])
            }
        }

        impl From<$t> for I256 {
            fn from(v: $t) -> I256 {
                U256::from(v).as_i256()
            }
        }
    )*};
}

macro_rules! impl_from_signed {
    ($($t:ty),*) => {$(
        impl From<$t> for I256 {
            fn from(v: $t) -> I256 {
                let v = v as i128;
                let fill = if v < 0 { u64::MAX } else { 0 };
                I256([v as u64, ((v as u128) >> 64) as u64, fill, fill])
            }
        }
    )*};
}

impl_from_unsigned!(u8, u16, u32, u64, u128);
impl_from_signed!(i8, i16, i32, i64, i128);

impl std::fmt::Display for U256 {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.pad_integral(true, "", &to_decimal(self.0))
    }
}

impl std::fmt::Display for I256 {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.is_negative() {
            f.pad_integral(false, "", &to_decimal(negate(&self.0)))
        } else {
            f.pad_integral(true, "", &to_decimal(self.0))
        }
    }
}

impl FromStr for U256 {
    type Err = ParseIntError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let digits = s.strip_prefix('+').unwrap_or(s);
        parse_decimal(digits)
            .map(U256)
            .ok_or_else(|| ParseIntError(s.to_string()))
    }
}

impl FromStr for I256 {
    type Err = ParseIntError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let err = || ParseIntError(s.to_string());
        let (negative, digits) = match s.as_bytes().first() {
            Some(b'-') => (true, &s[1..]),
            Some(b'+') => (false, &s[1..]),
            _ => (false, s),
        };
        let magnitude = parse_decimal(digits).ok_or_else(err)?;
        let value = if negative {
            I256(negate(&magnitude))
        } else {
            I256(magnitude)
        };
        // The magnitude must not wrap into the opposite sign, except for MIN.
        if !value.is_zero() && value.is_negative() != negative {
            return Err(err());
        }
        Ok(value)
    }
}

fn limbs_from_le(bytes: &[u8; 32]) -> Limbs {
    let mut limbs = [0u64; 4];
    for (i, limb) in limbs.iter_mut().enumerate() {
        let mut chunk = [0u8; 8];
        chunk.copy_from_slice(&bytes[i * 8..i * 8 + 8]);
        *limb = u64::from_le_bytes(chunk);
    }
    limbs
}

fn limbs_to_le(limbs: &Limbs) -> [u8; 32] {
    let mut bytes = [0u8; 32];
    for (i, limb) in limbs.iter().enumerate() {
        bytes[i * 8..i * 8 + 8].copy_from_slice(&limb.to_le_bytes());
    }
    bytes
}

fn negate(limbs: &Limbs) -> Limbs {
    let mut out = [0u64; 4];
    let mut carry = true;
    for (o, &l) in out.iter_mut().zip(limbs.iter()) {
        let (v, c) = (!l).overflowing_add(carry as u64);
        *o = v;
        carry = c;
    }
    out
}

/// Divides in place by `divisor`, returning the remainder.
fn div_rem_small(limbs: &mut Limbs, divisor: u64) -> u64 {
    let mut rem = 0u128;
    for limb in limbs.iter_mut().rev() {
        let cur = (rem << 64) | *limb as u128;
        *limb = (cur / divisor as u128) as u64;
        rem = cur % divisor as u128;
    }
    rem as u64
}

/// Computes `limbs * mul + add`, returning `None` on overflow.
fn mul_add_small(limbs: &Limbs, mul: u64, add: u64) -> Option<Limbs> {
    let mut out = [0u64; 4];
    let mut carry = add as u128;
    for (o, &l) in out.iter_mut().zip(limbs.iter()) {
        let cur = l as u128 * mul as u128 + carry;
        *o = cur as u64;
        carry = cur >> 64;
    }
    (carry == 0).then_some(out)
}

fn to_decimal(mut limbs: Limbs) -> String {
    if limbs == [0; 4] {
        return "0".to_string();
    }
    let mut digits = Vec::with_capacity(78);
    while limbs != [0; 4] {
        digits.push(b'0' + div_rem_small(&mut limbs, 10) as u8);
    }
    digits.reverse();
    String::from_utf8(digits).unwrap_or_default()
}

fn parse_decimal(digits: &str) -> Option<Limbs> {
    if digits.is_empty() {
        return None;
    }
    let mut limbs = [0u64; 4];
    for ch in digits.bytes() {
        if !ch.is_ascii_digit() {
            return None;
        }
        limbs = mul_add_small(&limbs, 10, (ch - b'0') as u64)?;
    }
    Some(limbs)
}

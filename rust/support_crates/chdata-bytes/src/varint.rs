//! LEB128-style variable-length integers as used by the RowBinary format.
//!
//! Each byte carries 7 payload bits, least significant group first; the high bit
//! marks that another byte follows. Encodings are at most [`MAX_VARINT_LEN`] bytes,
//! which covers `0..=MAX_VARINT`.

use std::io::{Read, Write};

pub const MAX_VARINT_LEN: usize = 9;

/// Largest value representable in [`MAX_VARINT_LEN`] bytes.
pub const MAX_VARINT: u64 = (1u64 << 63) - 1;

/// Number of bytes needed to encode `value`.
pub fn encoded_len(value: u64) -> usize {
    let mut len = 1;
    let mut value = value >> 7;
    while value != 0 {
        len += 1;
        value >>= 7;
    }
    len
}

/// Encodes `value` into `buf` and returns the number of bytes used.
///
/// # Panics
///
/// Panics if `value` exceeds [`MAX_VARINT`].
pub fn encode(value: u64, buf: &mut [u8; MAX_VARINT_LEN]) -> usize {
    assert!(value <= MAX_VARINT, "varint value {value} out of range");
    let mut value = value;
    let mut i = 0;
    loop {
        let mut b = (value & 0x7F) as u8;
        value >>= 7;
        if value != 0 {
            b |= 0x80;
        }
        buf[i] = b;
        i += 1;
        if value == 0 {
            return i;
        }
    }
}

/// Writes `value` to `writer`, returning the number of bytes written.
pub fn write<W: Write + ?Sized>(writer: &mut W, value: u64) -> std::io::Result<usize> {
    if value > MAX_VARINT {
        return Err(std::io::Error::new(
            std::io::ErrorKind::InvalidInput,
            format!("varint value {value} exceeds {MAX_VARINT}"),
        ));
    }
    let mut buf = [0u8; MAX_VARINT_LEN];
    let len = encode(value, &mut buf);
    writer.write_all(&buf[..len])?;
    Ok(len)
}

/// Decodes a varint from the start of `bytes`, returning the value and the number
/// of bytes consumed.
///
/// Fails with `UnexpectedEof` when `bytes` ends before the continuation chain does,
/// and with `InvalidData` when the chain is longer than [`MAX_VARINT_LEN`] bytes.
pub fn decode(bytes: &[u8]) -> std::io::Result<(u64, usize)> {
    let mut result = 0u64;
    for i in 0..MAX_VARINT_LEN {
        let Some(&b) = bytes.get(i) else {
            return Err(truncated());
        };
        result |= ((b & 0x7F) as u64) << (7 * i);
        if b & 0x80 == 0 {
            return Ok((result, i + 1));
        }
    }
    Err(too_long())
}

/// Reads a varint from `reader` one byte at a time.
pub fn read<R: Read + ?Sized>(reader: &mut R) -> std::io::Result<u64> {
    let mut result = 0u64;
    let mut byte = [0u8; 1];
    for i in 0..MAX_VARINT_LEN {
        if reader.read(&mut byte)? == 0 {
            return Err(truncated());
        }
        let b = byte[0];
        result |= ((b & 0x7F) as u64) << (7 * i);
        if b & 0x80 == 0 {
            return Ok(result);
        }
    }
    Err(too_long())
}

#[cold]
fn truncated() -> std::io::Error {
    std::io::Error::new(
        std::io::ErrorKind::UnexpectedEof,
        "reached end of stream while reading varint",
    )
}

#[cold]
fn too_long() -> std::io::Error {
    std::io::Error::new(
        std::io::ErrorKind::InvalidData,
        format!("varint longer than {MAX_VARINT_LEN} bytes"),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn encoded(value: u64) -> Vec<u8> {
        let mut out = Vec::new();
        write(&mut out, value).unwrap();
        out
    }

    #[test]
    fn test_known_encodings() {
        assert_eq!(encoded(0), [0x00]);
        assert_eq!(encoded(1), [0x01]);
        assert_eq!(encoded(127), [0x7F]);
        assert_eq!(encoded(128), [0x80, 0x01]);
        assert_eq!(encoded(300), [0xAC, 0x02]);
        assert_eq!(encoded(16_383), [0xFF, 0x7F]);
        assert_eq!(encoded(16_384), [0x80, 0x80, 0x01]);
        assert_eq!(encoded(MAX_VARINT).len(), MAX_VARINT_LEN);
        assert_eq!(*encoded(MAX_VARINT).last().unwrap(), 0x7F);
    }

    #[test]
    fn test_round_trip_boundaries() {
        let mut values = vec![0, MAX_VARINT, MAX_VARINT - 1];
        for shift in 1..63 {
            let v = 1u64 << shift;
            values.extend([v - 1, v, v + 1]);
        }
        for _ in 0..1000 {
            values.push(fastrand::u64(0..=MAX_VARINT));
        }

        for v in values {
            let bytes = encoded(v);
            assert!(bytes.len() <= MAX_VARINT_LEN);
            assert_eq!(bytes.len(), encoded_len(v));
            assert_eq!(decode(&bytes).unwrap(), (v, bytes.len()));
            assert_eq!(read(&mut bytes.as_slice()).unwrap(), v);
        }
    }

    #[test]
    fn test_truncated_input() {
        let bytes = encoded(1 << 40);
        for cut in 0..bytes.len() {
            let err = decode(&bytes[..cut]).unwrap_err();
            assert_eq!(err.kind(), std::io::ErrorKind::UnexpectedEof);
            let err = read(&mut &bytes[..cut]).unwrap_err();
            assert_eq!(err.kind(), std::io::ErrorKind::UnexpectedEof);
        }
    }

    #[test]
    fn test_overlong_chain() {
        let bytes = [0xFFu8; 12];
        assert_eq!(
            decode(&bytes).unwrap_err().kind(),
            std::io::ErrorKind::InvalidData
        );
    }

    #[test]
    fn test_out_of_range_value() {
        let mut out = Vec::new();
        let err = write(&mut out, u64::MAX).unwrap_err();
        assert_eq!(err.kind(), std::io::ErrorKind::InvalidInput);
        assert!(out.is_empty());
    }

    #[test]
    fn test_decode_ignores_trailing_bytes() {
        assert_eq!(decode(&[0xAC, 0x02, 0xFF]).unwrap(), (300, 2));
    }
}

//! Shared immutable byte slices, the varint codec and wide integers used by the
//! RowBinary wire format.

use std::{ops::RangeBounds, sync::Arc};

use byteorder::{ByteOrder, LittleEndian};

pub mod int256;
pub mod varint;

pub use int256::{I256, U256};

/// Text encodings understood by [`ByteSlice::as_string`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Charset {
    #[default]
    Utf8,
    /// ISO-8859-1: every byte maps to the code point of the same value.
    Latin1,
    Ascii,
}

/// A `(array, position, length)` view over a shared byte array.
///
/// `ByteSlice` can be sliced and cloned without copying the underlying data. Use
/// [`compact`](Self::compact) or [`copy`](Self::copy) to detach a value from a large
/// shared buffer before retaining it.
#[derive(Clone)]
pub struct ByteSlice {
    array: Arc<[u8]>,
    position: usize,
    length: usize,
}

impl ByteSlice {
    /// Creates a new empty `ByteSlice`.
    pub fn new() -> ByteSlice {
        ByteSlice {
            array: Arc::from(Vec::new()),
            position: 0,
            length: 0,
        }
    }

    /// Wraps a region of a shared array.
    ///
    /// # Panics
    ///
    /// Panics if `position + length` exceeds the array length.
    pub fn wrap(array: Arc<[u8]>, position: usize, length: usize) -> ByteSlice {
        let end = position.checked_add(length).expect("slice end");
        assert!(end <= array.len(), "slice {position}..{end} out of bounds");
        ByteSlice {
            array,
            position,
            length,
        }
    }

    /// Creates a new `ByteSlice` by copying data from a slice.
    pub fn copy_from_slice(data: &[u8]) -> ByteSlice {
        ByteSlice::from(data.to_vec())
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.length
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.length == 0
    }

    /// Offset of this view within the backing array.
    #[inline]
    pub fn position(&self) -> usize {
        self.position
    }

    /// The whole backing array, including bytes outside this view.
    pub fn array(&self) -> &Arc<[u8]> {
        &self.array
    }

    /// Returns `true` if the view covers the entire backing array.
    pub fn is_compact(&self) -> bool {
        self.position == 0 && self.length == self.array.len()
    }

    #[inline]
    pub fn as_slice(&self) -> &[u8] {
        &self.array[self.position..self.position + self.length]
    }

    /// Creates a sub-view within the given range, relative to this view.
    ///
    /// This operation is zero-copy.
    ///
    /// # Panics
    ///
    /// Panics if the range is out of bounds.
    pub fn slice(&self, range: impl RangeBounds<usize>) -> ByteSlice {
        use std::ops::Bound;
        let start = match range.start_bound() {
            Bound::Included(&s) => s,
            Bound::Excluded(&s) => s + 1,
            Bound::Unbounded => 0,
        };
        let end = match range.end_bound() {
            Bound::Included(&e) => e + 1,
            Bound::Excluded(&e) => e,
            Bound::Unbounded => self.length,
        };
        assert!(
            start <= end && end <= self.length,
            "range {start}..{end} out of bounds for slice of length {}",
            self.length
        );
        ByteSlice {
            array: self.array.clone(),
            position: self.position + start,
            length: end - start,
        }
    }

    /// Returns a view backed by an array of exactly this view's size.
    ///
    /// Already compact slices are returned as a cheap clone; otherwise the bytes are
    /// copied into a new array.
    pub fn compact(&self) -> ByteSlice {
        if self.is_compact() {
            self.clone()
        } else {
            ByteSlice::copy_from_slice(self.as_slice())
        }
    }

    /// Copies the view. A `deep` copy always allocates a new array, a shallow copy
    /// shares the backing array.
    pub fn copy(&self, deep: bool) -> ByteSlice {
        if deep {
            ByteSlice::copy_from_slice(self.as_slice())
        } else {
            self.clone()
        }
    }

    pub fn to_vec(&self) -> Vec<u8> {
        self.as_slice().to_vec()
    }

    #[inline]
    pub fn get_u8(&self, offset: usize) -> u8 {
        self.as_slice()[offset]
    }

    #[inline]
    pub fn get_i8(&self, offset: usize) -> i8 {
        self.get_u8(offset) as i8
    }

    pub fn get_i16_le(&self, offset: usize) -> i16 {
        LittleEndian::read_i16(&self.as_slice()[offset..])
    }

    pub fn get_u16_le(&self, offset: usize) -> u16 {
        LittleEndian::read_u16(&self.as_slice()[offset..])
    }

    pub fn get_i32_le(&self, offset: usize) -> i32 {
        LittleEndian::read_i32(&self.as_slice()[offset..])
    }

    pub fn get_u32_le(&self, offset: usize) -> u32 {
        LittleEndian::read_u32(&self.as_slice()[offset..])
    }

    pub fn get_i64_le(&self, offset: usize) -> i64 {
        LittleEndian::read_i64(&self.as_slice()[offset..])
    }

    pub fn get_u64_le(&self, offset: usize) -> u64 {
        LittleEndian::read_u64(&self.as_slice()[offset..])
    }

    pub fn get_f32_le(&self, offset: usize) -> f32 {
        LittleEndian::read_f32(&self.as_slice()[offset..])
    }

    pub fn get_f64_le(&self, offset: usize) -> f64 {
        LittleEndian::read_f64(&self.as_slice()[offset..])
    }

    /// Decodes a little-endian signed integer of `len` bytes (up to 32),
    /// sign-extending it to 256 bits.
    ///
    /// # Panics
    ///
    /// Panics if `len` exceeds 32 or the range is out of bounds.
    pub fn get_big_int_le(&self, offset: usize, len: usize) -> I256 {
        I256::from_le_slice(&self.as_slice()[offset..offset + len])
    }

    /// Decodes a little-endian unsigned integer of `len` bytes (up to 32).
    ///
    /// # Panics
    ///
    /// Panics if `len` exceeds 32 or the range is out of bounds.
    pub fn get_big_uint_le(&self, offset: usize, len: usize) -> U256 {
        U256::from_le_slice(&self.as_slice()[offset..offset + len])
    }

    /// Decodes the whole view as text.
    pub fn as_string(&self, charset: Charset) -> Result<String, std::str::Utf8Error> {
        let bytes = self.as_slice();
        match charset {
            Charset::Utf8 => std::str::from_utf8(bytes).map(str::to_string),
            Charset::Latin1 => Ok(bytes.iter().map(|&b| b as char).collect()),
            Charset::Ascii => Ok(bytes
                .iter()
                .map(|&b| if b.is_ascii() { b as char } else { '\u{FFFD}' })
                .collect()),
        }
    }
}

impl std::ops::Deref for ByteSlice {
    type Target = [u8];

    #[inline]
    fn deref(&self) -> &Self::Target {
        self.as_slice()
    }
}

impl AsRef<[u8]> for ByteSlice {
    fn as_ref(&self) -> &[u8] {
        self.as_slice()
    }
}

impl Default for ByteSlice {
    fn default() -> Self {
        Self::new()
    }
}

impl PartialEq for ByteSlice {
    fn eq(&self, other: &Self) -> bool {
        self.as_slice() == other.as_slice()
    }
}

impl Eq for ByteSlice {}

impl std::hash::Hash for ByteSlice {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.as_slice().hash(state)
    }
}

impl std::fmt::Debug for ByteSlice {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ByteSlice")
            .field("position", &self.position)
            .field("length", &self.length)
            .field("bytes", &self.as_slice())
            .finish()
    }
}

impl From<Vec<u8>> for ByteSlice {
    fn from(vec: Vec<u8>) -> Self {
        let length = vec.len();
        ByteSlice {
            array: Arc::from(vec),
            position: 0,
            length,
        }
    }
}

impl From<Arc<[u8]>> for ByteSlice {
    fn from(array: Arc<[u8]>) -> Self {
        let length = array.len();
        ByteSlice {
            array,
            position: 0,
            length,
        }
    }
}

impl From<&[u8]> for ByteSlice {
    fn from(s: &[u8]) -> Self {
        Self::copy_from_slice(s)
    }
}

impl From<String> for ByteSlice {
    fn from(s: String) -> Self {
        Self::from(s.into_bytes())
    }
}

impl From<&str> for ByteSlice {
    fn from(s: &str) -> Self {
        Self::copy_from_slice(s.as_bytes())
    }
}

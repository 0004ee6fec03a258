//! Bounded ASCII keys: at most [`Key::MAX_LEN`] bytes, stored NUL-padded
//! in a fixed-size buffer so a `Key` is `Copy` and safe to embed directly
//! in shared memory (the segment directory, the deleter registry).

use std::cmp::Ordering as CmpOrdering;
use std::fmt;

use store_region::{StoreError, StoreResult};

/// Buffer size backing a key, one byte larger than [`Key::MAX_LEN`] for
/// the NUL terminator.
pub const KEY_BUFFER_LEN: usize = 32;

#[repr(C)]
#[derive(Clone, Copy)]
pub struct Key {
    buf: [u8; KEY_BUFFER_LEN],
}

impl Key {
    pub const MAX_LEN: usize = KEY_BUFFER_LEN - 1;

    pub fn new(key: &str) -> StoreResult<Self> {
        let bytes = key.as_bytes();
        if bytes.len() > Self::MAX_LEN {
            return Err(StoreError::KeyTooLong { max: Self::MAX_LEN });
        }
        let mut buf = [0u8; KEY_BUFFER_LEN];
        buf[..bytes.len()].copy_from_slice(bytes);
        Ok(Self { buf })
    }

    pub fn as_str(&self) -> &str {
        let len = self.buf.iter().position(|&b| b == 0).unwrap_or(self.buf.len());
        // SAFETY: `new` only ever accepts valid UTF-8 (ASCII) bytes.
        std::str::from_utf8(&self.buf[..len]).unwrap_or("")
    }

    pub fn as_bytes(&self) -> &[u8; KEY_BUFFER_LEN] {
        &self.buf
    }
}

impl fmt::Debug for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Key({:?})", self.as_str())
    }
}

impl fmt::Display for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl PartialEq for Key {
    fn eq(&self, other: &Self) -> bool {
        self.buf == other.buf
    }
}

impl Eq for Key {}

impl PartialOrd for Key {
    fn partial_cmp(&self, other: &Self) -> Option<CmpOrdering> {
        Some(self.cmp(other))
    }
}

impl Ord for Key {
    fn cmp(&self, other: &Self) -> CmpOrdering {
        self.buf.cmp(&other.buf)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_short_key() {
        let key = Key::new("access_historical").unwrap();
        assert_eq!(key.as_str(), "access_historical");
    }

    #[test]
    fn rejects_overlong_key() {
        let too_long = "a".repeat(Key::MAX_LEN + 1);
        let err = Key::new(&too_long).unwrap_err();
        assert!(matches!(err, StoreError::KeyTooLong { max } if max == Key::MAX_LEN));
    }

    #[test]
    fn accepts_key_at_max_len() {
        let at_max = "a".repeat(Key::MAX_LEN);
        assert!(Key::new(&at_max).is_ok());
    }

    #[test]
    fn orders_by_bytes() {
        let a = Key::new("aaa").unwrap();
        let b = Key::new("aab").unwrap();
        assert!(a < b);
    }
}

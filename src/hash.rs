//! Deterministic 32-bit fingerprint for snapshot state.
//!
//! Two snapshots that represent the same logical state must hash equal
//! regardless of the order commands arrived over the wire. The hasher itself
//! is order-sensitive - it is the caller's responsibility (see
//! [`crate::snapshot::Snapshot::hash`]) to always feed entities in ascending
//! [`crate::EntityId`] order.
//!
//! The fold is FNV-1a, 32-bit. The choice is arbitrary but frozen: changing it
//! changes every hash this crate has ever produced, so it is not
//! configurable.

/// FNV-1a 32-bit offset basis.
const FNV_OFFSET_BASIS: u32 = 0x811c_9dc5;
/// FNV-1a 32-bit prime.
const FNV_PRIME: u32 = 0x0100_0193;

/// Accumulates a 32-bit FNV-1a fingerprint from the same primitive encoding
/// the packet codec uses (little-endian, two's complement, IEEE 754), so
/// that hashing a value and writing it to a packet always agree byte-for-byte.
#[derive(Debug, Clone, Copy)]
pub struct DeterministicHasher {
    state: u32,
}

impl Default for DeterministicHasher {
    fn default() -> Self {
        Self::new()
    }
}

impl DeterministicHasher {
    /// Creates a hasher primed with the FNV-1a offset basis.
    #[inline]
    #[must_use]
    pub const fn new() -> Self {
        Self {
            state: FNV_OFFSET_BASIS,
        }
    }

    /// Returns the accumulated fingerprint.
    #[inline]
    #[must_use]
    pub const fn finish(self) -> u32 {
        self.state
    }

    /// Folds in a single byte.
    #[inline]
    pub fn write_u8(&mut self, value: u8) {
        self.state ^= u32::from(value);
        self.state = self.state.wrapping_mul(FNV_PRIME);
    }

    /// Folds in raw bytes, in order.
    #[inline]
    pub fn write_bytes(&mut self, bytes: &[u8]) {
        for &b in bytes {
            self.write_u8(b);
        }
    }

    /// Folds in a boolean as one byte.
    #[inline]
    pub fn write_bool(&mut self, value: bool) {
        self.write_u8(u8::from(value));
    }

    /// Folds in a little-endian `i16`.
    #[inline]
    pub fn write_i16(&mut self, value: i16) {
        self.write_bytes(&value.to_le_bytes());
    }

    /// Folds in a little-endian `u16`.
    #[inline]
    pub fn write_u16(&mut self, value: u16) {
        self.write_bytes(&value.to_le_bytes());
    }

    /// Folds in a little-endian `i32`.
    #[inline]
    pub fn write_i32(&mut self, value: i32) {
        self.write_bytes(&value.to_le_bytes());
    }

    /// Folds in a little-endian `u32`.
    #[inline]
    pub fn write_u32(&mut self, value: u32) {
        self.write_bytes(&value.to_le_bytes());
    }

    /// Folds in a little-endian `i64`.
    #[inline]
    pub fn write_i64(&mut self, value: i64) {
        self.write_bytes(&value.to_le_bytes());
    }

    /// Folds in a little-endian `u64`.
    #[inline]
    pub fn write_u64(&mut self, value: u64) {
        self.write_bytes(&value.to_le_bytes());
    }

    /// Folds in a little-endian IEEE 754 `f32`.
    #[inline]
    pub fn write_f32(&mut self, value: f32) {
        self.write_bytes(&value.to_le_bytes());
    }

    /// Folds in a little-endian IEEE 754 `f64`.
    #[inline]
    pub fn write_f64(&mut self, value: f64) {
        self.write_bytes(&value.to_le_bytes());
    }
}

/// One-shot convenience: hashes `bytes` directly, bypassing the primitive
/// writer methods. Used for hashing already-serialized blobs (e.g. a
/// [`crate::packet::WritePacket`]'s contents) without re-deriving them field
/// by field.
#[inline]
#[must_use]
pub fn fnv1a_hash(bytes: &[u8]) -> u32 {
    let mut hasher = DeterministicHasher::new();
    hasher.write_bytes(bytes);
    hasher.finish()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_input_is_offset_basis() {
        assert_eq!(DeterministicHasher::new().finish(), FNV_OFFSET_BASIS);
    }

    #[test]
    fn order_sensitive() {
        let mut a = DeterministicHasher::new();
        a.write_u32(1);
        a.write_u32(2);

        let mut b = DeterministicHasher::new();
        b.write_u32(2);
        b.write_u32(1);

        assert_ne!(a.finish(), b.finish());
    }

    #[test]
    fn same_sequence_same_hash() {
        let mut a = DeterministicHasher::new();
        a.write_i64(-42);
        a.write_bool(true);

        let mut b = DeterministicHasher::new();
        b.write_i64(-42);
        b.write_bool(true);

        assert_eq!(a.finish(), b.finish());
    }

    #[test]
    fn one_shot_matches_incremental() {
        let mut inc = DeterministicHasher::new();
        inc.write_bytes(&[1, 2, 3, 4]);
        assert_eq!(inc.finish(), fnv1a_hash(&[1, 2, 3, 4]));
    }
}

//! Little-endian conversions from byte slices.
//! Callers guarantee the slice is long enough; the BIFF8 reader only hands over exact-length reads.

/// Converts the first 8 bytes of a slice to a 64-bit floating point number.
#[inline]
pub(crate) fn to_f64(s: &[u8]) -> f64 {
    f64::from_bits(to_u64(s))
}

/// Converts the first 8 bytes of a slice to a 64-bit unsigned integer.
#[inline]
pub(crate) fn to_u64(s: &[u8]) -> u64 {
    u64::from_le_bytes([s[0], s[1], s[2], s[3], s[4], s[5], s[6], s[7]])
}

/// Converts the first 4 bytes of a slice to a 32-bit unsigned integer.
#[inline]
pub(crate) fn to_u32(s: &[u8]) -> u32 {
    u32::from_le_bytes([s[0], s[1], s[2], s[3]])
}

/// Converts the first 2 bytes of a slice to a 16-bit unsigned integer.
#[inline]
pub(crate) fn to_u16(s: &[u8]) -> u16 {
    u16::from_le_bytes([s[0], s[1]])
}

/// Converts the first 4 bytes of a slice to a usize value.
#[inline]
pub(crate) fn to_usize(s: &[u8]) -> usize {
    to_u32(s) as usize
}

// Reversible byte transform applied to file content before it reaches the
// data region. Not a security measure; readers of the raw image just should
// not see plaintext. Metadata, users, header and bitmap are stored
// untransformed.

const SHIFT: u8 = 1;

/// Transform content for writing.
pub fn encode(data: &[u8]) -> Vec<u8> {
    data.iter().map(|b| b.wrapping_add(SHIFT)).collect()
}

/// Inverse transform after reading.
pub fn decode(data: &[u8]) -> Vec<u8> {
    data.iter().map(|b| b.wrapping_sub(SHIFT)).collect()
}

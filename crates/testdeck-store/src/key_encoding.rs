//! Order-preserving key encoding for the start-time index.
//!
//! The index partition is keyed by `(started_at, id)`. Backends compare
//! keys byte-by-byte, so a naive encoding of the signed timestamp would
//! sort negative values after positive ones. The timestamp is therefore
//! written as fixed-width big-endian with the sign bit flipped, which maps
//! i64 order onto unsigned byte order. The id follows as raw bytes; since
//! the timestamp component is fixed-width, the concatenation sorts by
//! timestamp first and id second, keeping the global order total.

use testdeck_commons::SuiteId;

const TS_WIDTH: usize = 8;

/// Encodes the composite index key for a suite's position in the
/// start-time order.
pub fn start_index_key(started_at: i64, id: &SuiteId) -> Vec<u8> {
    let mut key = Vec::with_capacity(TS_WIDTH + id.as_str().len());
    key.extend_from_slice(&((started_at as u64) ^ (1 << 63)).to_be_bytes());
    key.extend_from_slice(id.as_ref());
    key
}

/// Decodes an index key back into `(started_at, id)`.
pub fn decode_start_index_key(bytes: &[u8]) -> Result<(i64, SuiteId), String> {
    if bytes.len() < TS_WIDTH {
        return Err(format!("index key too short: {} bytes", bytes.len()));
    }
    let mut ts = [0u8; TS_WIDTH];
    ts.copy_from_slice(&bytes[..TS_WIDTH]);
    let started_at = (u64::from_be_bytes(ts) ^ (1 << 63)) as i64;
    let id = std::str::from_utf8(&bytes[TS_WIDTH..])
        .map_err(|e| format!("index key id is not utf-8: {}", e))?;
    Ok((started_at, SuiteId::new(id)))
}

/// Key of a suite row in the suites partition.
pub fn suite_key(id: &SuiteId) -> Vec<u8> {
    id.as_str().as_bytes().to_vec()
}

//! 页载荷压缩/解压（LZ4 / None）

use crate::common::{AdaptiveError, Result};
use crate::field_type::CompressionType;

pub fn compress(data: &[u8], codec: CompressionType) -> Result<Vec<u8>> {
    if data.is_empty() { return Ok(vec![]); }
    match codec {
        CompressionType::None => Ok(data.to_vec()),
        CompressionType::Lz4  =>
            lz4::block::compress(data, None, false)
                .map_err(|e| AdaptiveError::Compression(e.to_string())),
    }
}

pub fn decompress(
    data:             &[u8],
    codec:            CompressionType,
    uncompressed_len: usize,
) -> Result<Vec<u8>> {
    if uncompressed_len == 0 { return Ok(vec![]); }
    let i32_len = i32::try_from(uncompressed_len)
        .map_err(|_| AdaptiveError::Compression(format!("page too large: {uncompressed_len}")))?;
    let raw = match codec {
        CompressionType::None => data.to_vec(),
        CompressionType::Lz4  =>
            lz4::block::decompress(data, Some(i32_len))
                .map_err(|e| AdaptiveError::Compression(e.to_string()))?,
    };
    if raw.len() != uncompressed_len {
        return Err(AdaptiveError::Compression(
            format!("expected {uncompressed_len} bytes, got {}", raw.len())));
    }
    Ok(raw)
}

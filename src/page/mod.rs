//! Data Page 读写
//!
//! ```text
//! ┌──────────────────────────────────┐
//! │ value_count  (u32 LE)            │  含 NULL 的总行数
//! │ first_row_id (u32 LE)            │
//! │ uncomp_size  (u32 LE)            │
//! │ null_count   (u32 LE)            │
//! │ null_bitmap  (ceil(n/8) bytes)   │  bit=1 表示 NULL
//! │ data         (encoded+compressed)│  仅非空值
//! │ CRC32        (u32 LE)            │
//! └──────────────────────────────────┘
//! ```

use std::io::Cursor;
use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use crate::common::{AdaptiveError, Result};
use crate::compression;
use crate::encoding;
use crate::field_type::{ColumnMeta, Value};

/// 每页最多容纳的行数
pub const PAGE_MAX_ROWS: usize = 1024;

const HEADER_LEN: usize = 16;

// ── PageBuilder ───────────────────────────────────────────────────────────────

pub struct PageBuilder {
    pub first_row_id: u32,
    meta:             ColumnMeta,
    values:           Vec<Value>,
}

impl PageBuilder {
    pub fn new(first_row_id: u32, meta: ColumnMeta) -> Self {
        Self { first_row_id, meta, values: Vec::new() }
    }

    pub fn add(&mut self, v: Value) {
        self.values.push(v);
    }

    pub fn len(&self)      -> usize { self.values.len() }
    pub fn is_empty(&self) -> bool  { self.values.is_empty() }
    pub fn is_full(&self)  -> bool  { self.values.len() >= PAGE_MAX_ROWS }

    /// 尚未封页的值（全表扫描需要看到它们）
    pub fn pending(&self) -> &[Value] { &self.values }

    /// 序列化为页字节（bitmap → encode → compress → header+CRC）
    pub fn build(&self) -> Result<Vec<u8>> {
        let count  = self.values.len();
        let mut bitmap = vec![0u8; count.div_ceil(8)];
        let mut non_null = Vec::with_capacity(count);
        for (i, v) in self.values.iter().enumerate() {
            if v.is_null() {
                bitmap[i / 8] |= 1 << (i % 8);
            } else {
                non_null.push(v.clone());
            }
        }
        let null_count = (count - non_null.len()) as u32;

        let encoded    = encoding::encode(&non_null, self.meta.column_type, self.meta.encoding)?;
        let compressed = compression::compress(&encoded, self.meta.compression)?;

        let mut page = Vec::with_capacity(HEADER_LEN + bitmap.len() + compressed.len() + 4);
        let header = |page: &mut Vec<u8>| -> std::io::Result<()> {
            page.write_u32::<LittleEndian>(count as u32)?;
            page.write_u32::<LittleEndian>(self.first_row_id)?;
            page.write_u32::<LittleEndian>(encoded.len() as u32)?;
            page.write_u32::<LittleEndian>(null_count)
        };
        header(&mut page).map_err(|e| AdaptiveError::SegmentIo(e.to_string()))?;
        page.extend_from_slice(&bitmap);
        page.extend_from_slice(&compressed);

        let crc = crc32fast::hash(&page);
        page.extend_from_slice(&crc.to_le_bytes());
        Ok(page)
    }
}

// ── PageDecoder ───────────────────────────────────────────────────────────────

pub struct PageDecoder {
    pub value_count:  usize,
    pub first_row_id: u32,
    /// 按行序排列，NULL 位置为 Value::Null
    pub values:       Vec<Value>,
}

impl PageDecoder {
    pub fn decode(data: &[u8], meta: &ColumnMeta) -> Result<Self> {
        if data.len() < HEADER_LEN + 4 {
            return Err(AdaptiveError::SegmentIo("page data too short".into()));
        }
        let payload_end = data.len() - 4;
        let stored_crc  = u32::from_le_bytes([
            data[payload_end], data[payload_end + 1], data[payload_end + 2], data[payload_end + 3],
        ]);
        if crc32fast::hash(&data[..payload_end]) != stored_crc {
            return Err(AdaptiveError::ChecksumMismatch);
        }

        let mut rd = Cursor::new(&data[..payload_end]);
        let header = (|| -> std::io::Result<(usize, u32, usize, usize)> {
            Ok((
                rd.read_u32::<LittleEndian>()? as usize,
                rd.read_u32::<LittleEndian>()?,
                rd.read_u32::<LittleEndian>()? as usize,
                rd.read_u32::<LittleEndian>()? as usize,
            ))
        })();
        let (value_count, first_row_id, uncomp_size, null_count) =
            header.map_err(|e| AdaptiveError::SegmentIo(e.to_string()))?;

        let bitmap_end = HEADER_LEN + value_count.div_ceil(8);
        if bitmap_end > payload_end || null_count > value_count {
            return Err(AdaptiveError::SegmentIo("corrupt page header".into()));
        }
        let bitmap  = &data[HEADER_LEN..bitmap_end];
        let payload = &data[bitmap_end..payload_end];

        let raw = compression::decompress(payload, meta.compression, uncomp_size)?;
        let mut non_null = encoding::decode(
            &raw, meta.column_type, meta.encoding, value_count - null_count,
        )?.into_iter();

        let mut values = Vec::with_capacity(value_count);
        for i in 0..value_count {
            if bitmap[i / 8] & (1 << (i % 8)) != 0 {
                values.push(Value::Null);
            } else {
                values.push(non_null.next()
                    .ok_or_else(|| AdaptiveError::SegmentIo("page value count mismatch".into()))?);
            }
        }
        Ok(Self { value_count, first_row_id, values })
    }
}

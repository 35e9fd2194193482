//! 列编码
//!
//! 只编码非空值，NULL 由页内位图记录。支持两种编码：
//! - **Plain**：按类型定长小端写入；变长字节带 u32 长度前缀
//! - **DeltaBinary**：有序整数增量编码，时间戳列的主力编码

use std::io::Cursor;
use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use crate::common::{AdaptiveError, ColumnType, Result};
use crate::field_type::{EncodingType, Value};

// ── 统一编/解码入口 ───────────────────────────────────────────────────────────

pub fn encode(values: &[Value], ty: ColumnType, enc: EncodingType) -> Result<Vec<u8>> {
    match enc {
        EncodingType::Plain       => plain::encode(values, ty),
        EncodingType::DeltaBinary => delta::encode(values, ty),
    }
}

pub fn decode(data: &[u8], ty: ColumnType, enc: EncodingType, count: usize) -> Result<Vec<Value>> {
    match enc {
        EncodingType::Plain       => plain::decode(data, ty, count),
        EncodingType::DeltaBinary => delta::decode(data, ty, count),
    }
}

fn io_err(e: std::io::Error) -> AdaptiveError {
    AdaptiveError::Encoding(e.to_string())
}

// ── Plain ─────────────────────────────────────────────────────────────────────
mod plain {
    use super::*;

    pub fn encode(values: &[Value], ty: ColumnType) -> Result<Vec<u8>> {
        let mut out = Vec::with_capacity(values.len() * ty.fixed_size().unwrap_or(8));
        for v in values {
            match v {
                Value::Int16(x)     => out.write_i16::<LittleEndian>(*x),
                Value::Int32(x)     => out.write_i32::<LittleEndian>(*x),
                Value::Date(x)      => out.write_i32::<LittleEndian>(*x),
                Value::Int64(x)     => out.write_i64::<LittleEndian>(*x),
                Value::Timestamp(x) => out.write_i64::<LittleEndian>(*x),
                Value::Float64(x)   => out.write_f64::<LittleEndian>(*x),
                Value::Bytes(b)     => {
                    out.write_u32::<LittleEndian>(b.len() as u32).map_err(io_err)?;
                    out.extend_from_slice(b);
                    Ok(())
                }
                Value::Null => return Err(AdaptiveError::Encoding(
                    "NULL must be recorded in the page bitmap".into())),
            }
            .map_err(io_err)?;
        }
        Ok(out)
    }

    pub fn decode(data: &[u8], ty: ColumnType, count: usize) -> Result<Vec<Value>> {
        let mut rd  = Cursor::new(data);
        let mut out = Vec::with_capacity(count);
        for _ in 0..count {
            let v = match ty {
                ColumnType::Int16     => Value::Int16(rd.read_i16::<LittleEndian>().map_err(io_err)?),
                ColumnType::Int32     => Value::Int32(rd.read_i32::<LittleEndian>().map_err(io_err)?),
                ColumnType::Date      => Value::Date(rd.read_i32::<LittleEndian>().map_err(io_err)?),
                ColumnType::Int64     => Value::Int64(rd.read_i64::<LittleEndian>().map_err(io_err)?),
                ColumnType::Timestamp => Value::Timestamp(rd.read_i64::<LittleEndian>().map_err(io_err)?),
                ColumnType::Float64   => Value::Float64(rd.read_f64::<LittleEndian>().map_err(io_err)?),
                ColumnType::Varchar   => {
                    let len   = rd.read_u32::<LittleEndian>().map_err(io_err)? as usize;
                    let start = rd.position() as usize;
                    let bytes = data.get(start..start + len)
                        .ok_or_else(|| AdaptiveError::Encoding("plain: bytes truncated".into()))?;
                    rd.set_position((start + len) as u64);
                    Value::Bytes(bytes.to_vec())
                }
            };
            out.push(v);
        }
        Ok(out)
    }
}

// ── Delta Binary ──────────────────────────────────────────────────────────────
mod delta {
    use super::*;

    pub fn encode(values: &[Value], ty: ColumnType) -> Result<Vec<u8>> {
        let ints = values.iter()
            .map(|v| v.as_i64().ok_or_else(|| AdaptiveError::Encoding(
                format!("delta: {ty:?} value {v} is not an integer"))))
            .collect::<Result<Vec<i64>>>()?;
        if ints.is_empty() { return Ok(vec![]); }

        let mut out = Vec::with_capacity(ints.len() * 8);
        out.write_i64::<LittleEndian>(ints[0]).map_err(io_err)?; // base
        let mut prev = ints[0];
        for &x in &ints[1..] {
            out.write_i64::<LittleEndian>(x.wrapping_sub(prev)).map_err(io_err)?;
            prev = x;
        }
        Ok(out)
    }

    pub fn decode(data: &[u8], ty: ColumnType, count: usize) -> Result<Vec<Value>> {
        if count == 0 { return Ok(vec![]); }
        let mut rd   = Cursor::new(data);
        let mut out  = Vec::with_capacity(count);
        let mut prev = rd.read_i64::<LittleEndian>().map_err(io_err)?;
        out.push(Value::from_i64(ty, prev)?);
        while out.len() < count {
            prev = prev.wrapping_add(rd.read_i64::<LittleEndian>().map_err(io_err)?);
            out.push(Value::from_i64(ty, prev)?);
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn delta_restores_unordered_timestamps() {
        let vals = vec![Value::Timestamp(500), Value::Timestamp(100), Value::Timestamp(i64::MAX)];
        let data = encode(&vals, ColumnType::Timestamp, EncodingType::DeltaBinary).unwrap();
        let back = decode(&data, ColumnType::Timestamp, EncodingType::DeltaBinary, 3).unwrap();
        assert_eq!(back, vals);
    }

    #[test]
    fn plain_handles_varchar() {
        let vals = vec![Value::Bytes(b"cpu".to_vec()), Value::Bytes(vec![])];
        let data = encode(&vals, ColumnType::Varchar, EncodingType::Plain).unwrap();
        assert_eq!(decode(&data, ColumnType::Varchar, EncodingType::Plain, 2).unwrap(), vals);
    }

    #[test]
    fn null_cannot_be_encoded() {
        assert!(encode(&[Value::Null], ColumnType::Int64, EncodingType::Plain).is_err());
    }

    #[test]
    fn truncated_input_is_an_error() {
        let data = encode(&[Value::Int64(1), Value::Int64(2)], ColumnType::Int64,
                          EncodingType::Plain).unwrap();
        assert!(decode(&data[..12], ColumnType::Int64, EncodingType::Plain, 2).is_err());
    }
}

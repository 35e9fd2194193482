//! 列的物理类型、运行时取值与类型相关的比较

use std::cmp::Ordering;
use crate::common::{AdaptiveError, ColumnType, Result, USECS_PER_DAY};

/// 编码方式
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EncodingType {
    Plain,
    DeltaBinary,
}

/// 压缩方式
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompressionType {
    None,
    Lz4,
}

impl ColumnType {
    /// 固定字节宽度；变长类型返回 None
    pub fn fixed_size(self) -> Option<usize> {
        match self {
            Self::Int16                          => Some(2),
            Self::Int32 | Self::Date             => Some(4),
            Self::Int64 | Self::Timestamp        => Some(8),
            Self::Float64                        => Some(8),
            Self::Varchar                        => None,
        }
    }

    /// 整数语义的类型可以用 Delta 编码
    pub fn is_integer(self) -> bool {
        matches!(self,
            Self::Int16 | Self::Int32 | Self::Int64 | Self::Date | Self::Timestamp)
    }
}

/// 每列的元数据
#[derive(Debug, Clone)]
pub struct ColumnMeta {
    pub name:        String,
    pub column_type: ColumnType,
    pub is_nullable: bool,
    pub encoding:    EncodingType,
    pub compression: CompressionType,
}

impl ColumnMeta {
    pub fn new(name: &str, column_type: ColumnType) -> Self {
        // 整数/时间列用 Delta；其余用 Plain
        let encoding = if column_type.is_integer() {
            EncodingType::DeltaBinary
        } else {
            EncodingType::Plain
        };
        Self {
            name: name.into(), column_type,
            is_nullable: true, encoding,
            compression: CompressionType::Lz4,
        }
    }

    pub fn with_encoding(mut self, enc: EncodingType) -> Self {
        self.encoding = enc; self
    }
    pub fn with_compression(mut self, comp: CompressionType) -> Self {
        self.compression = comp; self
    }
    pub fn not_null(mut self) -> Self {
        self.is_nullable = false; self
    }
}

/// 列值（运行时表示）
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Int16(i16),
    Int32(i32),
    Int64(i64),
    Float64(f64),
    Bytes(Vec<u8>),
    Date(i32),
    Timestamp(i64),
}

impl Value {
    pub fn is_null(&self) -> bool { matches!(self, Self::Null) }

    /// 值是否可以存入 `ty` 类型的列（NULL 总是可以）
    pub fn matches_type(&self, ty: ColumnType) -> bool {
        matches!((self, ty),
            (Self::Null, _)
            | (Self::Int16(_), ColumnType::Int16)
            | (Self::Int32(_), ColumnType::Int32)
            | (Self::Int64(_), ColumnType::Int64)
            | (Self::Float64(_), ColumnType::Float64)
            | (Self::Bytes(_), ColumnType::Varchar)
            | (Self::Date(_), ColumnType::Date)
            | (Self::Timestamp(_), ColumnType::Timestamp))
    }

    /// 整数语义的值取 i64（Delta 编码使用）
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Self::Int16(v)     => Some(*v as i64),
            Self::Int32(v)     => Some(*v as i64),
            Self::Int64(v)     => Some(*v),
            Self::Date(v)      => Some(*v as i64),
            Self::Timestamp(v) => Some(*v),
            _ => None,
        }
    }

    /// 由 i64 还原为 `ty` 类型的值
    pub fn from_i64(ty: ColumnType, v: i64) -> Result<Self> {
        let narrow = |what: &str| AdaptiveError::Encoding(format!("{what} out of range: {v}"));
        Ok(match ty {
            ColumnType::Int16     => Self::Int16(i16::try_from(v).map_err(|_| narrow("int16"))?),
            ColumnType::Int32     => Self::Int32(i32::try_from(v).map_err(|_| narrow("int32"))?),
            ColumnType::Int64     => Self::Int64(v),
            ColumnType::Date      => Self::Date(i32::try_from(v).map_err(|_| narrow("date"))?),
            ColumnType::Timestamp => Self::Timestamp(v),
            other => return Err(AdaptiveError::Encoding(
                format!("{other:?} is not an integer type"))),
        })
    }
}

impl std::fmt::Display for Value {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Null         => write!(f, "NULL"),
            Self::Int16(v)     => write!(f, "{v}"),
            Self::Int32(v)     => write!(f, "{v}"),
            Self::Int64(v)     => write!(f, "{v}"),
            Self::Float64(v)   => write!(f, "{v}"),
            Self::Bytes(b)     => write!(f, "{}", String::from_utf8_lossy(b)),
            Self::Date(v)      => write!(f, "date({v})"),
            Self::Timestamp(v) => write!(f, "ts({v})"),
        }
    }
}

// ── 三路比较 ─────────────────────────────────────────────────────────────────

/// 类型相关的三路比较函数
pub type Comparator = fn(&Value, &Value) -> Result<Ordering>;

/// 查找列类型的比较函数；所有受支持的类型都有全序
pub fn type_comparator(ty: ColumnType) -> Comparator {
    match ty {
        ColumnType::Float64 => compare_float,
        ColumnType::Varchar => compare_bytes,
        _                   => compare_integer,
    }
}

fn compare_integer(a: &Value, b: &Value) -> Result<Ordering> {
    match (a, b) {
        (Value::Int16(x), Value::Int16(y))         => Ok(x.cmp(y)),
        (Value::Int32(x), Value::Int32(y))         => Ok(x.cmp(y)),
        (Value::Int64(x), Value::Int64(y))         => Ok(x.cmp(y)),
        (Value::Date(x), Value::Date(y))           => Ok(x.cmp(y)),
        (Value::Timestamp(x), Value::Timestamp(y)) => Ok(x.cmp(y)),
        _ => Err(AdaptiveError::TypeMismatch {
            expected: ColumnType::Int64,
            found:    format!("{a:?} vs {b:?}"),
        }),
    }
}

fn compare_float(a: &Value, b: &Value) -> Result<Ordering> {
    match (a, b) {
        (Value::Float64(x), Value::Float64(y)) => Ok(x.total_cmp(y)),
        _ => Err(AdaptiveError::TypeMismatch {
            expected: ColumnType::Float64,
            found:    format!("{a:?} vs {b:?}"),
        }),
    }
}

fn compare_bytes(a: &Value, b: &Value) -> Result<Ordering> {
    match (a, b) {
        (Value::Bytes(x), Value::Bytes(y)) => Ok(x.cmp(y)),
        _ => Err(AdaptiveError::TypeMismatch {
            expected: ColumnType::Varchar,
            found:    format!("{a:?} vs {b:?}"),
        }),
    }
}

// ── 维度内部表示 ─────────────────────────────────────────────────────────────

/// 将分区列的值换算成维度内部的 i64 表示（整数原样，日期换算为微秒）
pub fn time_value_to_internal(value: &Value, ty: ColumnType) -> Result<i64> {
    if !value.matches_type(ty) || value.is_null() {
        return Err(AdaptiveError::TypeMismatch { expected: ty, found: value.to_string() });
    }
    match value {
        Value::Int16(v)     => Ok(*v as i64),
        Value::Int32(v)     => Ok(*v as i64),
        Value::Int64(v)     => Ok(*v),
        Value::Date(days)   => (*days as i64).checked_mul(USECS_PER_DAY)
            .ok_or_else(|| AdaptiveError::InvalidArgument(format!("date out of range: {days}"))),
        Value::Timestamp(v) => Ok(*v),
        other => Err(AdaptiveError::TypeMismatch { expected: ty, found: other.to_string() }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn comparator_orders_within_type() {
        let cmp = type_comparator(ColumnType::Timestamp);
        assert_eq!(cmp(&Value::Timestamp(1), &Value::Timestamp(2)).unwrap(), Ordering::Less);
        let cmp = type_comparator(ColumnType::Float64);
        assert_eq!(cmp(&Value::Float64(2.5), &Value::Float64(-1.0)).unwrap(), Ordering::Greater);
        let cmp = type_comparator(ColumnType::Varchar);
        assert_eq!(
            cmp(&Value::Bytes(b"abc".to_vec()), &Value::Bytes(b"abd".to_vec())).unwrap(),
            Ordering::Less,
        );
    }

    #[test]
    fn comparator_rejects_mixed_types() {
        let cmp = type_comparator(ColumnType::Int64);
        assert!(cmp(&Value::Int64(1), &Value::Int32(1)).is_err());
    }

    #[test]
    fn date_converts_to_microseconds() {
        assert_eq!(time_value_to_internal(&Value::Date(2), ColumnType::Date).unwrap(),
                   2 * USECS_PER_DAY);
        assert_eq!(time_value_to_internal(&Value::Int32(-7), ColumnType::Int32).unwrap(), -7);
        assert!(time_value_to_internal(&Value::Null, ColumnType::Int64).is_err());
        assert!(time_value_to_internal(&Value::Int64(1), ColumnType::Date).is_err());
    }

    #[test]
    fn from_i64_checks_width() {
        assert_eq!(Value::from_i64(ColumnType::Int16, 12).unwrap(), Value::Int16(12));
        assert!(Value::from_i64(ColumnType::Int16, 1 << 20).is_err());
        assert!(Value::from_i64(ColumnType::Varchar, 1).is_err());
    }
}

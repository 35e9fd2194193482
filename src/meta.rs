//! Hypertable / Dimension / Slice 元数据

use std::fmt;
use crate::common::{
    AdaptiveError, ChunkId, ColumnType, DimensionId, DimensionKind, HypertableId, Result, SliceId,
};
use crate::field_type::ColumnMeta;

// ── Dimension ─────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq)]
pub struct Dimension {
    pub id:              DimensionId,
    pub hypertable_id:   HypertableId,
    pub column_name:     String,
    pub column_type:     ColumnType,
    pub kind:            DimensionKind,
    /// Open 维度的区间宽度（列的原生单位，日期/时间戳为微秒）
    pub interval_length: i64,
    /// Closed 维度的分片数
    pub num_slices:      i16,
}

impl Dimension {
    pub fn is_open(&self) -> bool { self.kind == DimensionKind::Open }
}

// ── DimensionSlice ────────────────────────────────────────────────────────────

/// 某维度上的半开区间 [range_start, range_end)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DimensionSlice {
    pub id:           SliceId,
    pub dimension_id: DimensionId,
    pub range_start:  i64,
    pub range_end:    i64,
}

impl DimensionSlice {
    pub fn new(id: SliceId, dimension_id: DimensionId, range_start: i64, range_end: i64) -> Result<Self> {
        if range_start >= range_end {
            return Err(AdaptiveError::InvalidArgument(format!(
                "slice range [{range_start}, {range_end}) is empty")));
        }
        Ok(Self { id, dimension_id, range_start, range_end })
    }

    /// 区间宽度；溢出时饱和
    pub fn interval(&self) -> i64 { self.range_end.saturating_sub(self.range_start) }

    pub fn contains(&self, point: i64) -> bool {
        self.range_start <= point && point < self.range_end
    }
}

impl fmt::Display for DimensionSlice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{},{})", self.range_start, self.range_end)
    }
}

/// 一个 chunk 在各维度上的 slice 集合
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Hypercube {
    pub slices: Vec<DimensionSlice>,
}

impl Hypercube {
    pub fn slice_by_dimension_id(&self, dimension_id: DimensionId) -> Option<&DimensionSlice> {
        self.slices.iter().find(|s| s.dimension_id == dimension_id)
    }
}

// ── 自适应配置 ────────────────────────────────────────────────────────────────

/// 以 schema 限定名引用的 sizing 函数
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SizingFuncRef {
    pub schema: String,
    pub name:   String,
}

impl SizingFuncRef {
    pub fn new(schema: &str, name: &str) -> Self {
        Self { schema: schema.into(), name: name.into() }
    }

    /// 解析 `schema.name` 或裸名（schema 为空）
    pub fn parse(qualified: &str) -> Self {
        match qualified.rsplit_once('.') {
            Some((schema, name)) => Self::new(schema, name),
            None                 => Self::new("", qualified),
        }
    }
}

impl fmt::Display for SizingFuncRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.schema.is_empty() {
            write!(f, "{}", self.name)
        } else {
            write!(f, "{}.{}", self.schema, self.name)
        }
    }
}

/// 持久化在目录中的自适应 sizing 配置；target_size_bytes == 0 表示禁用
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SizingConfig {
    pub func:              SizingFuncRef,
    pub target_size_bytes: i64,
    pub check_for_index:   bool,
}

impl SizingConfig {
    pub fn is_enabled(&self) -> bool { self.target_size_bytes > 0 }
}

// ── Hypertable ────────────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct Hypertable {
    pub id:                HypertableId,
    pub name:              String,
    pub columns:           Vec<ColumnMeta>,
    pub dimensions:        Vec<Dimension>,
    /// 在主表上声明的索引（列名列表，首列为前导列）
    pub indexes:           Vec<Vec<String>>,
    pub chunk_sizing_func: Option<SizingFuncRef>,
    pub chunk_target_size: i64,
    pub chunk_ids:         Vec<ChunkId>,
}

impl Hypertable {
    pub fn dimension_by_id(&self, dimension_id: DimensionId) -> Option<&Dimension> {
        self.dimensions.iter().find(|d| d.id == dimension_id)
    }

    /// 第 n 个指定类型的维度
    pub fn dimension_of_kind(&self, kind: DimensionKind, n: usize) -> Option<&Dimension> {
        self.dimensions.iter().filter(|d| d.kind == kind).nth(n)
    }

    pub fn column(&self, name: &str) -> Option<&ColumnMeta> {
        self.columns.iter().find(|c| c.name == name)
    }

    pub fn has_index_leading_with(&self, column: &str) -> bool {
        self.indexes.iter().any(|cols| cols.first().map(String::as_str) == Some(column))
    }
}

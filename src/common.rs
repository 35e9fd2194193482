//! 全局基础类型与错误定义

use thiserror::Error;

// ── ID 类型别名 ───────────────────────────────────────────────────────────────

pub type HypertableId = i32;
pub type DimensionId  = i32;
pub type SliceId      = i32;
pub type ChunkId      = i32;
/// 列在关系中的位置（从 0 开始）
pub type AttrNumber   = usize;

// ── 常量 ──────────────────────────────────────────────────────────────────────

pub const USECS_PER_DAY: i64 = 86_400_000_000;
pub const MB: i64            = 1024 * 1024;
pub const GB: i64            = 1024 * MB;

// ── 枚举 ──────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ColumnType {
    Int16, Int32, Int64,
    Float64,
    Varchar,
    /// 2000-01-01 起的天数
    Date,
    /// 2000-01-01 起的微秒数
    Timestamp,
}

impl ColumnType {
    /// 能否作为开放（时间）维度的分区列
    pub fn is_time_like(self) -> bool {
        matches!(self,
            Self::Int16 | Self::Int32 | Self::Int64 | Self::Date | Self::Timestamp)
    }
}

/// 维度类型：Open 按区间宽度切分，Closed 按固定分片数切分
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DimensionKind { Open, Closed }

// ── 错误 ──────────────────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum AdaptiveError {
    #[error("missing configuration for '{0}'")]
    ConfigurationMissing(String),
    #[error("could not parse '{name}' setting: {hint}")]
    ConfigurationInvalid { name: String, hint: String },
    #[error("invalid data amount: {0}")]
    InvalidDataAmount(String),
    #[error("invalid chunk sizing function")]
    InvalidSizingFunction,
    #[error("function not found: {0}")]
    FunctionNotFound(String),
    #[error("invalid function signature for {name}: a chunk sizing function's signature should be (int, bigint, bigint) -> bigint")]
    InvalidFunctionSignature { name: String },
    #[error("table \"{0}\" does not exist")]
    TableNotFound(String),
    #[error("table \"{0}\" is not a hypertable")]
    NotAHypertable(String),
    #[error("no open dimension found for adaptive chunking")]
    NoOpenDimension,
    #[error("column \"{0}\" does not exist")]
    ColumnNotFound(String),
    #[error("dimension not found: dimension_id={0}")]
    DimensionNotFound(DimensionId),
    #[error("could not find a matching hypertable: hypertable_id={0}")]
    HypertableNotFound(HypertableId),
    #[error("chunk not found: chunk_id={0}")]
    ChunkNotFound(ChunkId),
    #[error("segment I/O error: {0}")]
    SegmentIo(String),
    #[error("encoding error: {0}")]
    Encoding(String),
    #[error("compression error: {0}")]
    Compression(String),
    #[error("checksum mismatch")]
    ChecksumMismatch,
    #[error("schema mismatch")]
    SchemaMismatch,
    #[error("type mismatch: expected {expected:?}, found {found}")]
    TypeMismatch { expected: ColumnType, found: String },
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
}

impl AdaptiveError {
    /// 配置类错误：中止触发它的操作，绝不静默回退默认值
    pub fn is_configuration_error(&self) -> bool {
        matches!(self,
            Self::ConfigurationMissing(_)
            | Self::ConfigurationInvalid { .. }
            | Self::InvalidDataAmount(_)
            | Self::InvalidSizingFunction
            | Self::FunctionNotFound(_)
            | Self::InvalidFunctionSignature { .. }
            | Self::TableNotFound(_)
            | Self::NotAHypertable(_)
            | Self::NoOpenDimension
            | Self::ColumnNotFound(_))
    }
}

pub type Result<T> = std::result::Result<T, AdaptiveError>;

//! 可插拔的 chunk sizing 函数
//!
//! sizing 函数以 schema 限定名注册，签名固定为
//! `(int4 dimension_id, int8 coordinate, int8 target_size) -> int8`。
//! 安装或重新校验时解析一次得到 [`SizingFuncHandle`]，之后直接调用，
//! 不再逐次校验。

use std::fmt;
use std::sync::{Arc, RwLock};
use log::warn;
use crate::catalog::CatalogManager;
use crate::common::{AdaptiveError, DimensionId, Result, MB};
use crate::interval::CHUNK_SIZING_FUNC_NARGS;
use crate::meta::SizingFuncRef;

/// 目标大小低于该值时给出建议
pub const MIN_RECOMMENDED_TARGET_SIZE: i64 = 10 * MB;

// ── 签名 ──────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SqlType {
    Int2,
    Int4,
    Int8,
    Float8,
    Text,
    Void,
}

impl fmt::Display for SqlType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Int2   => "smallint",
            Self::Int4   => "integer",
            Self::Int8   => "bigint",
            Self::Float8 => "double precision",
            Self::Text   => "text",
            Self::Void   => "void",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FunctionSignature {
    pub args: Vec<SqlType>,
    pub ret:  SqlType,
}

impl FunctionSignature {
    pub fn new(args: &[SqlType], ret: SqlType) -> Self {
        Self { args: args.to_vec(), ret }
    }

    /// sizing 函数要求的签名
    pub fn chunk_sizing() -> Self {
        Self::new(&[SqlType::Int4, SqlType::Int8, SqlType::Int8], SqlType::Int8)
    }

    pub fn is_chunk_sizing(&self) -> bool {
        self.args.len() == CHUNK_SIZING_FUNC_NARGS && *self == Self::chunk_sizing()
    }
}

impl fmt::Display for FunctionSignature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let args: Vec<String> = self.args.iter().map(ToString::to_string).collect();
        write!(f, "({}) -> {}", args.join(", "), self.ret)
    }
}

// ── 函数体与句柄 ──────────────────────────────────────────────────────────────

/// sizing 函数执行时可见的环境
pub struct SizingContext<'a> {
    pub catalog: &'a CatalogManager,
    pub window:  usize,
}

pub type SizingFnBody =
    Arc<dyn Fn(&SizingContext<'_>, DimensionId, i64, i64) -> Result<i64> + Send + Sync>;

/// 把闭包包装成函数体（参数依次为 dimension_id, coordinate, target_size_bytes）
pub fn sizing_fn<F>(f: F) -> SizingFnBody
where
    F: Fn(&SizingContext<'_>, DimensionId, i64, i64) -> Result<i64> + Send + Sync + 'static,
{
    Arc::new(f)
}

/// 已校验的 sizing 函数
#[derive(Clone)]
pub struct SizingFuncHandle {
    func_ref: SizingFuncRef,
    body:     SizingFnBody,
}

impl SizingFuncHandle {
    pub fn func_ref(&self) -> &SizingFuncRef { &self.func_ref }

    pub fn invoke(
        &self,
        ctx:               &SizingContext<'_>,
        dimension_id:      DimensionId,
        coordinate:        i64,
        target_size_bytes: i64,
    ) -> Result<i64> {
        (self.body)(ctx, dimension_id, coordinate, target_size_bytes)
    }
}

impl fmt::Debug for SizingFuncHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SizingFuncHandle").field("func_ref", &self.func_ref).finish()
    }
}

// ── 注册表 ────────────────────────────────────────────────────────────────────

struct RegisteredFunction {
    func_ref:  SizingFuncRef,
    signature: FunctionSignature,
    body:      SizingFnBody,
}

#[derive(Default)]
pub struct SizingFunctionRegistry {
    functions: RwLock<Vec<RegisteredFunction>>,
}

impl SizingFunctionRegistry {
    pub fn new() -> Self { Self::default() }

    /// 注册（或替换）函数；签名在此不做检查
    pub fn register(&self, func_ref: SizingFuncRef, signature: FunctionSignature, body: SizingFnBody) {
        let mut functions = self.functions.write().unwrap();
        functions.retain(|f| f.func_ref != func_ref);
        functions.push(RegisteredFunction { func_ref, signature, body });
    }

    pub fn signature_of(&self, func_ref: &SizingFuncRef) -> Option<FunctionSignature> {
        let functions = self.functions.read().unwrap();
        Self::find(&functions, func_ref).map(|f| f.signature.clone())
    }

    /// 限定名精确匹配；裸名匹配任意 schema 中第一个同名函数
    fn find<'f>(functions: &'f [RegisteredFunction], func_ref: &SizingFuncRef) -> Option<&'f RegisteredFunction> {
        if func_ref.schema.is_empty() {
            functions.iter().find(|f| f.func_ref.name == func_ref.name)
        } else {
            functions.iter().find(|f| f.func_ref == *func_ref)
        }
    }

    /// 解析并校验签名，得到可直接调用的句柄
    pub fn validate(&self, func_ref: &SizingFuncRef) -> Result<SizingFuncHandle> {
        let functions = self.functions.read().unwrap();
        let f = Self::find(&functions, func_ref)
            .ok_or_else(|| AdaptiveError::FunctionNotFound(func_ref.to_string()))?;
        if !f.signature.is_chunk_sizing() {
            return Err(AdaptiveError::InvalidFunctionSignature { name: f.func_ref.to_string() });
        }
        Ok(SizingFuncHandle { func_ref: f.func_ref.clone(), body: Arc::clone(&f.body) })
    }
}

// ── 配置建议 ──────────────────────────────────────────────────────────────────

/// 非致命的配置建议，同时以 warn 级别记录
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SizingAdvisory {
    TargetBelowMinimum { target_size_bytes: i64 },
    MissingIndex { column: String, hypertable: String },
}

impl fmt::Display for SizingAdvisory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::TargetBelowMinimum { target_size_bytes } => write!(f,
                "target chunk size for adaptive chunking is less than 10 MB ({target_size_bytes} bytes); \
                 consider setting chunk_target_size to a larger value"),
            Self::MissingIndex { column, hypertable } => write!(f,
                "no index on \"{column}\" found for adaptive chunking on hypertable \"{hypertable}\"; \
                 adaptive chunking works best with an index on the dimension being adapted"),
        }
    }
}

/// 已启用的 sizing 配置的建议性检查
pub fn sizing_advisories(
    target_size_bytes: i64,
    check_for_index:   bool,
    has_index:         bool,
    column:            &str,
    hypertable:        &str,
) -> Vec<SizingAdvisory> {
    let mut out = Vec::new();
    if target_size_bytes <= 0 {
        return out;
    }
    if target_size_bytes < MIN_RECOMMENDED_TARGET_SIZE {
        out.push(SizingAdvisory::TargetBelowMinimum { target_size_bytes });
    }
    if check_for_index && !has_index {
        out.push(SizingAdvisory::MissingIndex { column: column.into(), hypertable: hypertable.into() });
    }
    for advisory in &out {
        warn!("{advisory}");
    }
    out
}

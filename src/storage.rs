//! 顶层协调器：目录 + sizing 函数注册表 + 缓存内存估算

use std::collections::HashMap;
use std::sync::RwLock;
use log::info;
use crate::catalog::{CatalogManager, DimensionCatalog};
use crate::common::{AdaptiveError, DimensionId, DimensionKind, HypertableId, Result};
use crate::config::EngineConfig;
use crate::field_type::ColumnMeta;
use crate::interval::IntervalEstimator;
use crate::memory::{convert_text_memory_amount_to_bytes, MemoryBudgetEstimator};
use crate::meta::{SizingConfig, SizingFuncRef};
use crate::policy::{
    sizing_advisories, sizing_fn, FunctionSignature, SizingAdvisory, SizingContext,
    SizingFuncHandle, SizingFunctionRegistry,
};
use crate::range_locator::ValueRangeLocator;

pub const INTERNAL_SCHEMA: &str         = "_timescaledb_internal";
pub const DEFAULT_SIZING_FUNC_NAME: &str = "calculate_chunk_interval";

/// 内置 sizing 函数的引用
pub fn default_sizing_func() -> SizingFuncRef {
    SizingFuncRef::new(INTERNAL_SCHEMA, DEFAULT_SIZING_FUNC_NAME)
}

/// `set_sizing_policy` 的结果
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SizingPolicyOutcome {
    pub func:              SizingFuncRef,
    pub target_size_bytes: i64,
    pub advisories:        Vec<SizingAdvisory>,
}

/// 单节点存储引擎中负责 chunk 区间自适应的部分
pub struct StorageEngine {
    pub config:          EngineConfig,
    pub catalog_manager: CatalogManager,
    pub registry:        SizingFunctionRegistry,
    /// 缓存内存估算的覆盖值，None 表示按配置计算
    memory_override:     RwLock<Option<i64>>,
    /// hypertable → 已解析的 sizing 函数
    handles:             RwLock<HashMap<HypertableId, SizingFuncHandle>>,
}

impl StorageEngine {
    pub fn new(config: EngineConfig) -> Self {
        let registry = SizingFunctionRegistry::new();
        registry.register(
            default_sizing_func(),
            FunctionSignature::chunk_sizing(),
            sizing_fn(|ctx, dimension_id, coordinate, target_size_bytes| {
                IntervalEstimator::new(ctx.catalog)
                    .with_window(ctx.window)
                    .estimate(dimension_id, coordinate, target_size_bytes)
            }),
        );
        let memory_override = RwLock::new(config.memory_budget_override);
        Self {
            config,
            catalog_manager: CatalogManager::new(),
            registry,
            memory_override,
            handles: RwLock::new(HashMap::new()),
        }
    }

    // ── DDL ───────────────────────────────────────────────────────────────────

    /// 创建 hypertable，sizing 函数默认为内置函数，自适应默认关闭
    pub fn create_hypertable(
        &self,
        name:            &str,
        columns:         Vec<ColumnMeta>,
        time_column:     &str,
        interval_length: i64,
    ) -> Result<HypertableId> {
        let id = self.catalog_manager.create_hypertable(name, columns, time_column, interval_length)?;
        let handle = self.registry.validate(&default_sizing_func())?;
        self.catalog_manager.persist_sizing_config(id, &SizingConfig {
            func:              handle.func_ref().clone(),
            target_size_bytes: 0,
            check_for_index:   self.config.check_for_index,
        })?;
        self.handles.write().unwrap().insert(id, handle);
        Ok(id)
    }

    // ── 内存估算 ──────────────────────────────────────────────────────────────

    pub fn memory_estimator(&self) -> MemoryBudgetEstimator {
        let override_bytes = *self.memory_override.read().unwrap();
        MemoryBudgetEstimator::new(&self.config).with_override(override_bytes)
    }

    /// 设置缓存内存估算的覆盖值，返回解析得到的字节数；非正值等同于取消覆盖
    pub fn override_memory_budget(&self, spec: &str) -> Result<i64> {
        let bytes = convert_text_memory_amount_to_bytes(spec, self.config.block_size)?;
        *self.memory_override.write().unwrap() = Some(bytes);
        info!("[adaptive] memory budget override set to {bytes} bytes");
        Ok(bytes)
    }

    pub fn reset_memory_budget_override(&self) {
        *self.memory_override.write().unwrap() = None;
    }

    // ── 区间估算 ──────────────────────────────────────────────────────────────

    pub fn estimate_interval(
        &self,
        dimension_id:      DimensionId,
        coordinate:        i64,
        target_size_bytes: i64,
    ) -> Result<i64> {
        IntervalEstimator::new(&self.catalog_manager)
            .with_window(self.config.chunk_window)
            .estimate(dimension_id, coordinate, target_size_bytes)
    }

    /// 创建新 chunk 前调用：目标大小 > 0 时调用已安装的 sizing 函数，
    /// 并把结果写回开放维度；否则原样返回当前区间
    pub fn calculate_next_interval(&self, hypertable_id: HypertableId, coordinate: i64) -> Result<i64> {
        let ht = self.catalog_manager.get_hypertable_by_id(hypertable_id)?;
        let dim = ht.dimension_of_kind(DimensionKind::Open, 0)
            .ok_or(AdaptiveError::NoOpenDimension)?;
        if ht.chunk_target_size <= 0 {
            return Ok(dim.interval_length);
        }

        let handle = self.handle_for(hypertable_id, ht.chunk_sizing_func.as_ref())?;
        let ctx = SizingContext { catalog: &self.catalog_manager, window: self.config.chunk_window };
        let interval = handle.invoke(&ctx, dim.id, coordinate, ht.chunk_target_size)?;
        if interval <= 0 {
            return Err(AdaptiveError::InvalidArgument(format!(
                "sizing function {} returned non-positive interval {interval}", handle.func_ref())));
        }
        if interval != dim.interval_length {
            self.catalog_manager.update_dimension_interval(dim.id, interval)?;
        }
        Ok(interval)
    }

    fn handle_for(&self, hypertable_id: HypertableId, func: Option<&SizingFuncRef>) -> Result<SizingFuncHandle> {
        if let Some(h) = self.handles.read().unwrap().get(&hypertable_id) {
            return Ok(h.clone());
        }
        let func = func.ok_or(AdaptiveError::InvalidSizingFunction)?;
        let handle = self.registry.validate(func)?;
        self.handles.write().unwrap().insert(hypertable_id, handle.clone());
        Ok(handle)
    }

    // ── sizing 策略 ───────────────────────────────────────────────────────────

    /// 校验并持久化 hypertable 的 sizing 配置。
    /// `target` 为 `off`/`disable`/`estimate`/内存量，缺省视为禁用；
    /// `func` 缺省时重新校验当前函数。
    pub fn set_sizing_policy(
        &self,
        table:  &str,
        target: Option<&str>,
        func:   Option<&str>,
    ) -> Result<SizingPolicyOutcome> {
        let ht = match self.catalog_manager.hypertable_by_name(table) {
            Some(ht) => ht,
            None if self.catalog_manager.table_exists(table) =>
                return Err(AdaptiveError::NotAHypertable(table.into())),
            None => return Err(AdaptiveError::TableNotFound(table.into())),
        };
        let dim = ht.dimension_of_kind(DimensionKind::Open, 0)
            .ok_or(AdaptiveError::NoOpenDimension)?;
        if ht.column(&dim.column_name).is_none() {
            return Err(AdaptiveError::ColumnNotFound(dim.column_name.clone()));
        }

        let func_ref = match func {
            Some(name) => SizingFuncRef::parse(name),
            None => ht.chunk_sizing_func.clone().ok_or(AdaptiveError::InvalidSizingFunction)?,
        };
        let handle = self.registry.validate(&func_ref)?;

        let target_size_bytes = match target {
            Some(spec) => self.memory_estimator().target_size_in_bytes(spec)?,
            None       => 0,
        };

        let check_for_index = self.config.check_for_index;
        let advisories = if target_size_bytes > 0 {
            let has_index = check_for_index && self.has_usable_index(ht.id, &dim.column_name)?;
            sizing_advisories(target_size_bytes, check_for_index, has_index, &dim.column_name, &ht.name)
        } else {
            Vec::new()
        };

        let config = SizingConfig {
            func: handle.func_ref().clone(),
            target_size_bytes,
            check_for_index,
        };
        self.catalog_manager.persist_sizing_config(ht.id, &config)?;
        self.handles.write().unwrap().insert(ht.id, handle);
        info!("[adaptive] \"{}\": sizing function {}, target size {} bytes",
              ht.name, config.func, target_size_bytes);

        Ok(SizingPolicyOutcome { func: config.func, target_size_bytes, advisories })
    }

    /// 主表声明了前导列为 `column` 的索引，或任一 chunk 上有这样的索引
    pub fn has_usable_index(&self, hypertable_id: HypertableId, column: &str) -> Result<bool> {
        let ht = self.catalog_manager.get_hypertable_by_id(hypertable_id)?;
        if ht.has_index_leading_with(column) {
            return Ok(true);
        }
        Ok(self.catalog_manager.chunks_of(hypertable_id)?
            .iter()
            .any(|c| ValueRangeLocator::has_usable_index(c, column)))
    }
}

impl Default for StorageEngine {
    fn default() -> Self { Self::new(EngineConfig::default()) }
}

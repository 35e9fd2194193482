//! 缓存内存估算与目标 chunk 大小
//!
//! 数据库同时依赖自身的共享缓冲区和操作系统文件缓存，`effective_cache_size`
//! 是两者之和的估计，`shared_buffers` 是专用缓存。取两者较大值，并以系统
//! 内存的一半为上限：
//!
//! ```text
//! shared_buffers <= effective_memory_cache <= system_mem / 2
//! ```
//!
//! 初始目标 chunk 大小取估算值的 1/4，即假设同时有 4 个 chunk 驻留缓存。
//! 这是刻意简化的启发式：按活跃 hypertable 数估计需要跨库扫描。

use log::debug;
use crate::common::{AdaptiveError, Result};
use crate::config::{ConfigOptions, EngineConfig, SystemMemory, EFFECTIVE_CACHE_SIZE, SHARED_BUFFERS};

/// 假设能同时放进缓存的 chunk 数
pub const DEFAULT_NUM_CHUNKS_TO_FIT_IN_CACHE_MEM: i64 = 4;

const UNIT_HINT: &str = "Valid units for this parameter are \"kB\", \"MB\", \"GB\", and \"TB\".";

// ── 文本 → 块数 ───────────────────────────────────────────────────────────────

/// 解析 `<整数>[空白]<单位>?`，结果以块计；无单位即为块数。
/// 失败时返回提示文本。
pub fn parse_memory_blocks(text: &str, block_size: i64) -> std::result::Result<i64, String> {
    let s = text.trim();
    let digits_end = s.char_indices()
        .find(|&(i, c)| !(c.is_ascii_digit() || (i == 0 && (c == '-' || c == '+'))))
        .map(|(i, _)| i)
        .unwrap_or(s.len());
    let amount: i64 = s[..digits_end].parse()
        .map_err(|_| format!("invalid integer value: \"{text}\""))?;

    let unit_bytes: i64 = match s[digits_end..].trim_start() {
        ""   => return check_int_range(amount),
        "kB" => 1024,
        "MB" => 1024 * 1024,
        "GB" => 1024 * 1024 * 1024,
        "TB" => 1024 * 1024 * 1024 * 1024,
        _    => return Err(UNIT_HINT.into()),
    };
    let bytes = amount.checked_mul(unit_bytes)
        .ok_or_else(|| "Value exceeds integer range.".to_string())?;
    check_int_range(bytes / block_size)
}

fn check_int_range(blocks: i64) -> std::result::Result<i64, String> {
    if blocks < i32::MIN as i64 || blocks > i32::MAX as i64 {
        return Err("Value exceeds integer range.".into());
    }
    Ok(blocks)
}

/// 内存量文本 → 字节数（先换算成整块）
pub fn convert_text_memory_amount_to_bytes(text: &str, block_size: i64) -> Result<i64> {
    let blocks = parse_memory_blocks(text, block_size).map_err(AdaptiveError::InvalidDataAmount)?;
    Ok(blocks * block_size)
}

// ── MemoryBudgetEstimator ─────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct MemoryBudgetEstimator {
    options:        ConfigOptions,
    block_size:     i64,
    system_memory:  SystemMemory,
    override_bytes: Option<i64>,
}

impl MemoryBudgetEstimator {
    pub fn new(config: &EngineConfig) -> Self {
        Self {
            options:        config.options.clone(),
            block_size:     config.block_size,
            system_memory:  config.system_memory,
            override_bytes: config.memory_budget_override,
        }
    }

    /// 替换覆盖值；`None` 恢复为按配置计算
    pub fn with_override(mut self, bytes: Option<i64>) -> Self {
        self.override_bytes = bytes; self
    }

    pub fn override_bytes(&self) -> Option<i64> { self.override_bytes }

    pub fn block_size(&self) -> i64 { self.block_size }

    fn setting_blocks(&self, name: &str) -> Result<i64> {
        let val = self.options.get_config_option(name)
            .ok_or_else(|| AdaptiveError::ConfigurationMissing(name.into()))?;
        parse_memory_blocks(val, self.block_size)
            .map_err(|hint| AdaptiveError::ConfigurationInvalid { name: name.into(), hint })
    }

    /// 估算可用于缓存的内存字节数
    pub fn estimate_effective_cache_bytes(&self) -> Result<i64> {
        if let Some(bytes) = self.override_bytes.filter(|b| *b > 0) {
            return Ok(bytes);
        }

        let shared_buffers       = self.setting_blocks(SHARED_BUFFERS)?;
        let effective_cache_size = self.setting_blocks(EFFECTIVE_CACHE_SIZE)?;
        let sysmem_bound_bytes   = self.system_memory.total_bytes()? / 2;

        // 两者都以块计
        let memory_bytes = shared_buffers.max(effective_cache_size)
            .saturating_mul(self.block_size);

        debug!("[adaptive] shared_buffers={shared_buffers} effective_cache_size={effective_cache_size} \
                blocks, system bound={sysmem_bound_bytes} bytes");

        Ok(memory_bytes.min(sysmem_bound_bytes))
    }

    pub fn calculate_initial_target_size(&self) -> Result<i64> {
        Ok(self.estimate_effective_cache_bytes()? / DEFAULT_NUM_CHUNKS_TO_FIT_IN_CACHE_MEM)
    }

    /// 目标大小文本 → 字节数：`off`/`disable` → 0，`estimate` → 初始估算，
    /// 其余按内存量解析；结果 <= 0 一律视为禁用
    pub fn target_size_in_bytes(&self, spec: &str) -> Result<i64> {
        let spec = spec.trim();
        if spec.eq_ignore_ascii_case("off") || spec.eq_ignore_ascii_case("disable") {
            return Ok(0);
        }
        let bytes = if spec.eq_ignore_ascii_case("estimate") {
            self.calculate_initial_target_size()?
        } else {
            convert_text_memory_amount_to_bytes(spec, self.block_size)?
        };
        Ok(bytes.max(0))
    }
}

//! 引擎配置
//!
//! - [`ConfigOptions`]：名字 → 文本 的运行时设置表（`shared_buffers` 等），
//!   与数据库的 GUC 读取方式一致，值的解析由使用方负责
//! - [`EngineConfig`]：本子系统的构造参数，builder 风格

use std::collections::HashMap;
use crate::common::{AdaptiveError, Result, GB};

/// 存储块大小（字节），内存类设置以块为单位
pub const DEFAULT_BLOCK_SIZE: i64 = 8192;
/// 估算时回看的 chunk 数
pub const DEFAULT_CHUNK_WINDOW: usize = 3;

pub const SHARED_BUFFERS: &str       = "shared_buffers";
pub const EFFECTIVE_CACHE_SIZE: &str = "effective_cache_size";

// ── ConfigOptions ─────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Default)]
pub struct ConfigOptions {
    options: HashMap<String, String>,
}

impl ConfigOptions {
    pub fn new() -> Self { Self::default() }

    /// 数据库出厂默认值
    pub fn defaults() -> Self {
        Self::new()
            .with(SHARED_BUFFERS, "128MB")
            .with(EFFECTIVE_CACHE_SIZE, "4GB")
    }

    pub fn with(mut self, name: &str, value: &str) -> Self {
        self.set(name, value); self
    }

    pub fn set(&mut self, name: &str, value: &str) {
        self.options.insert(name.into(), value.into());
    }

    pub fn remove(&mut self, name: &str) -> Option<String> {
        self.options.remove(name)
    }

    pub fn get_config_option(&self, name: &str) -> Option<&str> {
        self.options.get(name).map(String::as_str)
    }
}

// ── 系统内存 ──────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SystemMemory {
    /// 运行时从 /proc/meminfo 读取 MemTotal（仅 Linux）
    Probe,
    /// 固定字节数（测试与非 Linux 平台）
    Fixed(i64),
}

/// 没有 /proc/meminfo 的平台上默认假定的系统内存
pub const FALLBACK_SYSTEM_MEMORY: i64 = 8 * GB;

impl Default for SystemMemory {
    /// Linux 上读 /proc/meminfo，其他平台退回 [`FALLBACK_SYSTEM_MEMORY`]
    fn default() -> Self {
        if cfg!(target_os = "linux") {
            Self::Probe
        } else {
            Self::Fixed(FALLBACK_SYSTEM_MEMORY)
        }
    }
}

impl SystemMemory {
    pub fn total_bytes(&self) -> Result<i64> {
        match *self {
            Self::Fixed(bytes) => Ok(bytes),
            Self::Probe => {
                let text = std::fs::read_to_string("/proc/meminfo")
                    .map_err(|_| AdaptiveError::ConfigurationMissing("system memory".into()))?;
                parse_meminfo_total(&text)
                    .ok_or_else(|| AdaptiveError::ConfigurationInvalid {
                        name: "system memory".into(),
                        hint: "MemTotal not found in /proc/meminfo".into(),
                    })
            }
        }
    }
}

/// 解析 `MemTotal:   16318488 kB` 行
fn parse_meminfo_total(text: &str) -> Option<i64> {
    let line = text.lines().find(|l| l.starts_with("MemTotal:"))?;
    let mut parts = line["MemTotal:".len()..].split_whitespace();
    let amount: i64 = parts.next()?.parse().ok()?;
    match parts.next() {
        Some("kB") => amount.checked_mul(1024),
        None       => Some(amount),
        Some(_)    => None,
    }
}

// ── EngineConfig ──────────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub options:                ConfigOptions,
    pub block_size:             i64,
    pub chunk_window:           usize,
    /// 取代计算得到的缓存估算值（仅测试/确定性场景）；只有正数生效
    pub memory_budget_override: Option<i64>,
    pub system_memory:          SystemMemory,
    /// 设置 sizing 策略时是否检查分区列上的索引
    pub check_for_index:        bool,
}

impl EngineConfig {
    pub fn new(options: ConfigOptions) -> Self {
        Self {
            options,
            block_size:             DEFAULT_BLOCK_SIZE,
            chunk_window:           DEFAULT_CHUNK_WINDOW,
            memory_budget_override: None,
            system_memory:          SystemMemory::default(),
            check_for_index:        true,
        }
    }

    pub fn with_block_size(mut self, bytes: i64) -> Self {
        self.block_size = bytes; self
    }
    pub fn with_chunk_window(mut self, window: usize) -> Self {
        self.chunk_window = window; self
    }
    pub fn with_memory_budget_override(mut self, bytes: i64) -> Self {
        self.memory_budget_override = Some(bytes); self
    }
    pub fn with_system_memory(mut self, mem: SystemMemory) -> Self {
        self.system_memory = mem; self
    }
    pub fn with_check_for_index(mut self, check: bool) -> Self {
        self.check_for_index = check; self
    }
}

impl Default for EngineConfig {
    fn default() -> Self { Self::new(ConfigOptions::defaults()) }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn meminfo_total_is_parsed_in_bytes() {
        let text = "MemTotal:       16318488 kB\nMemFree:         1000 kB\n";
        assert_eq!(parse_meminfo_total(text), Some(16318488 * 1024));
        assert_eq!(parse_meminfo_total("MemFree: 1 kB"), None);
        assert_eq!(parse_meminfo_total("MemTotal: 12 MB"), None);
    }

    #[test]
    fn defaults_carry_memory_settings() {
        let cfg = EngineConfig::default();
        assert_eq!(cfg.options.get_config_option(SHARED_BUFFERS), Some("128MB"));
        assert_eq!(cfg.options.get_config_option(EFFECTIVE_CACHE_SIZE), Some("4GB"));
        assert_eq!(cfg.block_size, 8192);
        assert_eq!(cfg.chunk_window, 3);
        assert_eq!(cfg.memory_budget_override, None);
    }

    #[test]
    fn default_system_memory_is_readable_on_this_platform() {
        let mem = EngineConfig::default().system_memory;
        if cfg!(target_os = "linux") {
            assert_eq!(mem, SystemMemory::Probe);
        } else {
            assert_eq!(mem, SystemMemory::Fixed(FALLBACK_SYSTEM_MEMORY));
        }
        assert!(mem.total_bytes().unwrap() > 0);
    }

    #[test]
    fn fixed_system_memory_is_returned_verbatim() {
        assert_eq!(SystemMemory::Fixed(42).total_bytes().unwrap(), 42);
    }
}

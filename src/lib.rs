//! # chunk-adaptive
//!
//! 时间分区存储引擎的自适应 chunk 区间计算：在创建下一个 chunk 之前，
//! 根据最近若干 chunk 的实际数据跨度与物理大小，推算使 chunk 收敛到
//! 目标大小的区间宽度。
//!
//! ## 整体架构
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                        StorageEngine                          │
//! │   set_sizing_policy / calculate_next_interval / override      │
//! │   ┌──────────────────────┐   ┌─────────────────────────────┐  │
//! │   │ SizingFunctionRegistry│   │  MemoryBudgetEstimator      │  │
//! │   │ (int4,int8,int8)->int8│   │  shared_buffers / eff. cache│  │
//! │   └──────────┬───────────┘   └─────────────────────────────┘  │
//! │              │ calculate_chunk_interval                        │
//! │        IntervalEstimator ── 窗口内逐 chunk 分类 → 汇总 → 滞回  │
//! │              │                                                 │
//! │   ┌──────────┴───────────┐   ┌─────────────────────────────┐  │
//! │   │   CatalogManager     │   │   ValueRangeLocator         │  │
//! │   │ Hypertable/Dimension │   │   IndexMinMax | HeapScan    │  │
//! │   │ Slice/Chunk 窗口查询 │   └──────────────┬──────────────┘  │
//! │   └──────────┬───────────┘                  │                 │
//! │            Chunk ──────────────────────────┘                  │
//! │   ┌────────────────────────────────────────────────┐          │
//! │   │  列页 × N                                       │          │
//! │   │   ├─ encoding    (Plain/Delta)                  │          │
//! │   │   ├─ compression (LZ4/None)                     │          │
//! │   │   └─ CRC32 校验                                 │          │
//! │   │  ChunkIndex (有序索引，首尾即 min/max)          │          │
//! │   └────────────────────────────────────────────────┘          │
//! └──────────────────────────────────────────────────────────────┘
//! ```

// ── 基础类型与配置 ────────────────────────────────────────────────────────────
pub mod common;
pub mod config;
pub mod field_type;
pub mod meta;

// ── Chunk 存储层 ──────────────────────────────────────────────────────────────
pub mod encoding;
pub mod compression;
pub mod page;
pub mod index;
pub mod chunk;
pub mod catalog;

// ── 自适应 sizing ────────────────────────────────────────────────────────────
pub mod range_locator;
pub mod memory;
pub mod interval;
pub mod policy;
pub mod storage;

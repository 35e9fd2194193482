//! # chunk-adaptive 使用案例
//!
//! 1. 启动 StorageEngine（固定系统内存，便于复现）
//! 2. 创建 hypertable `conditions` 并在时间列上建索引
//! 3. 设置 sizing 策略（estimate / 显式大小）
//! 4. 逐个写入 chunk，每次创建新 chunk 前重新计算区间
//! 5. 关闭自适应后区间保持不变

use chunk_adaptive::{
    catalog::DimensionCatalog,
    common::{ColumnType, DimensionKind},
    config::{ConfigOptions, EngineConfig, SystemMemory},
    field_type::{ColumnMeta, Value},
    storage::StorageEngine,
};

const USECS_PER_SEC: i64 = 1_000_000;

fn main() -> chunk_adaptive::common::Result<()> {
    println!("═══════════════════════════════════════════════════════════");
    println!("   chunk-adaptive 演示                                      ");
    println!("═══════════════════════════════════════════════════════════\n");

    // =========================================================================
    // 1. 启动 StorageEngine
    // =========================================================================
    println!("【1】启动 StorageEngine ...");
    let config = EngineConfig::new(ConfigOptions::defaults())
        .with_system_memory(SystemMemory::Fixed(16 * 1024 * 1024 * 1024));
    let engine = StorageEngine::new(config);
    println!("    block_size   = {}", engine.config.block_size);
    println!("    chunk_window = {}\n", engine.config.chunk_window);

    // =========================================================================
    // 2. 创建 hypertable
    // =========================================================================
    println!("【2】创建 hypertable `conditions` (初始区间 1 小时) ...");
    let ht_id = engine.create_hypertable("conditions", vec![
        ColumnMeta::new("time", ColumnType::Timestamp).not_null(),
        ColumnMeta::new("device", ColumnType::Int32),
        ColumnMeta::new("temp", ColumnType::Float64),
    ], "time", 3600 * USECS_PER_SEC)?;
    engine.catalog_manager.create_hypertable_index(ht_id, &["time"])?;
    let dim_id = engine.catalog_manager.get_hypertable_by_id(ht_id)?
        .dimension_of_kind(DimensionKind::Open, 0)
        .map(|d| d.id)
        .ok_or(chunk_adaptive::common::AdaptiveError::NoOpenDimension)?;
    println!("    hypertable_id = {ht_id}, dimension_id = {dim_id}\n");

    // =========================================================================
    // 3. sizing 策略
    // =========================================================================
    println!("【3】设置 sizing 策略 ...");
    let est = engine.set_sizing_policy("conditions", Some("estimate"), None)?;
    println!("    estimate → {} bytes via {}", est.target_size_bytes, est.func);
    let out = engine.set_sizing_policy("conditions", Some("64kB"), None)?;
    println!("    64kB     → {} bytes", out.target_size_bytes);
    for advisory in &out.advisories {
        println!("    ⚠ {advisory}");
    }
    println!();

    // =========================================================================
    // 4. 写入 chunk 并自适应区间
    // =========================================================================
    println!("【4】写入数据，每秒 1 行 ...");
    let mut start = 0i64;
    for round in 0..6 {
        let interval = engine.calculate_next_interval(ht_id, start)?;
        let chunk = engine.catalog_manager.create_chunk(ht_id, &[(dim_id, start, start + interval)])?;
        let mut t = start;
        while t < start + interval {
            chunk.insert_row(vec![
                Value::Timestamp(t),
                Value::Int32((t / USECS_PER_SEC % 8) as i32),
                Value::Float64(20.0 + (t / USECS_PER_SEC % 100) as f64 / 10.0),
            ])?;
            t += USECS_PER_SEC;
        }
        println!("    chunk #{round}: {} interval = {:>6}s rows = {:>6} size = {:>8} bytes",
                 chunk.table_name(), interval / USECS_PER_SEC, chunk.num_rows(),
                 engine.catalog_manager.get_chunk(chunk.id())?.total_relation_size()?);
        start += interval;
    }
    println!();

    // =========================================================================
    // 5. 关闭自适应
    // =========================================================================
    println!("【5】关闭自适应 ...");
    let before = engine.catalog_manager.get_dimension_by_id(dim_id)?.interval_length;
    engine.set_sizing_policy("conditions", Some("off"), None)?;
    let after = engine.calculate_next_interval(ht_id, start)?;
    println!("    interval {}s → {}s (unchanged: {})\n",
             before / USECS_PER_SEC, after / USECS_PER_SEC, before == after);

    println!("✓ 演示完成");
    Ok(())
}

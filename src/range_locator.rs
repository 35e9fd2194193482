//! 查找 chunk 内分区列实际数据的 min/max
//!
//! 两种策略实现同一个 [`MinMaxStrategy`] 接口：
//! - [`IndexMinMax`]：用前导列匹配的有序索引各取首/尾一条，O(1) 行
//! - [`HeapScanMinMax`]：全量扫描所有页，逐值三路比较，跳过 NULL
//!
//! [`ValueRangeLocator`] 先用 `has_matching_index` 探测能力再选择策略；
//! 没有可用索引时回退全表扫描，并发出建议建索引的告警（非致命）。

use log::{debug, warn};
use crate::common::{AdaptiveError, AttrNumber, ColumnType, Result};
use crate::field_type::{type_comparator, Value};
use crate::index::{IndexDescriptor, ScanDirection};

// ── 被扫描关系的读接口 ───────────────────────────────────────────────────────

/// Chunk 关系的只读视图。每次调用只在调用期间持有读锁。
pub trait ChunkRelation {
    fn relation_name(&self) -> String;

    /// 列名 → 列位置
    fn attno(&self, column: &str) -> Option<AttrNumber>;

    fn column_type(&self, attno: AttrNumber) -> Option<ColumnType>;

    fn index_list(&self) -> Vec<IndexDescriptor>;

    /// 沿 `direction` 扫描索引，返回第一条条目的前导列值（至多一行）
    fn index_endpoint(
        &self,
        index:     &IndexDescriptor,
        direction: ScanDirection,
    ) -> Result<Option<Value>>;

    /// 顺序扫描一列的全部值（包括 NULL）
    fn heap_scan(
        &self,
        attno: AttrNumber,
        visit: &mut dyn FnMut(&Value) -> Result<()>,
    ) -> Result<()>;
}

// ── 结果 ──────────────────────────────────────────────────────────────────────

/// min/max 查找结果。没有索引与没有数据要求调用方做不同处理，因此是三态而非可空对。
#[derive(Debug, Clone, PartialEq)]
pub enum ValueRange {
    NoIndex,
    NoData,
    Found { min: Value, max: Value },
}

impl ValueRange {
    pub fn is_found(&self) -> bool { matches!(self, Self::Found { .. }) }
}

// ── 策略 ──────────────────────────────────────────────────────────────────────

pub trait MinMaxStrategy {
    fn name(&self) -> &'static str;

    fn minmax(
        &self,
        rel:   &dyn ChunkRelation,
        attno: AttrNumber,
        ty:    ColumnType,
    ) -> Result<ValueRange>;
}

/// 索引辅助：逐个尝试前导列匹配的索引，找到即停
pub struct IndexMinMax;

impl IndexMinMax {
    fn scan_one(rel: &dyn ChunkRelation, index: &IndexDescriptor) -> Result<ValueRange> {
        let max = rel.index_endpoint(index, ScanDirection::Backward)?;
        let min = rel.index_endpoint(index, ScanDirection::Forward)?;
        Ok(match (min, max) {
            (Some(min), Some(max)) => ValueRange::Found { min, max },
            _                      => ValueRange::NoData,
        })
    }
}

impl MinMaxStrategy for IndexMinMax {
    fn name(&self) -> &'static str { "index" }

    fn minmax(
        &self,
        rel:   &dyn ChunkRelation,
        attno: AttrNumber,
        _ty:   ColumnType,
    ) -> Result<ValueRange> {
        let mut res = ValueRange::NoIndex;
        for index in rel.index_list() {
            if index.leading_column() != Some(attno) {
                continue;
            }
            res = Self::scan_one(rel, &index)?;
            if res.is_found() {
                break;
            }
        }
        Ok(res)
    }
}

/// 全表扫描：代价高，稳态下应当罕见
pub struct HeapScanMinMax;

impl MinMaxStrategy for HeapScanMinMax {
    fn name(&self) -> &'static str { "heapscan" }

    fn minmax(
        &self,
        rel:   &dyn ChunkRelation,
        attno: AttrNumber,
        ty:    ColumnType,
    ) -> Result<ValueRange> {
        let cmp = type_comparator(ty);
        let mut min: Option<Value> = None;
        let mut max: Option<Value> = None;

        rel.heap_scan(attno, &mut |value: &Value| {
            if value.is_null() {
                return Ok(());
            }
            let is_new_min = match &min {
                None    => true,
                Some(m) => cmp(value, m)?.is_lt(),
            };
            if is_new_min {
                min = Some(value.clone());
            }
            let is_new_max = match &max {
                None    => true,
                Some(m) => cmp(value, m)?.is_gt(),
            };
            if is_new_max {
                max = Some(value.clone());
            }
            Ok(())
        })?;

        Ok(match (min, max) {
            (Some(min), Some(max)) => ValueRange::Found { min, max },
            _                      => ValueRange::NoData,
        })
    }
}

// ── ValueRangeLocator ────────────────────────────────────────────────────────

pub struct ValueRangeLocator {
    index: IndexMinMax,
    heap:  HeapScanMinMax,
}

impl ValueRangeLocator {
    pub fn new() -> Self {
        Self { index: IndexMinMax, heap: HeapScanMinMax }
    }

    /// 能力探测：是否存在前导列为 `attno` 的索引
    pub fn has_matching_index(rel: &dyn ChunkRelation, attno: AttrNumber) -> bool {
        rel.index_list().iter().any(|idx| idx.leading_column() == Some(attno))
    }

    fn strategy_for(&self, has_index: bool) -> &dyn MinMaxStrategy {
        if has_index {
            &self.index
        } else {
            &self.heap
        }
    }

    fn resolve_column(rel: &dyn ChunkRelation, column: &str) -> Result<(AttrNumber, ColumnType)> {
        let attno = rel.attno(column)
            .ok_or_else(|| AdaptiveError::ColumnNotFound(column.into()))?;
        let ty = rel.column_type(attno)
            .ok_or_else(|| AdaptiveError::ColumnNotFound(column.into()))?;
        Ok((attno, ty))
    }

    /// 查找 `column` 在 chunk 内的 min/max
    pub fn locate(&self, rel: &dyn ChunkRelation, column: &str) -> Result<ValueRange> {
        let (attno, ty) = Self::resolve_column(rel, column)?;
        let has_index = Self::has_matching_index(rel, attno);
        if !has_index {
            warn!(
                "no index on \"{}\" found for adaptive chunking on chunk \"{}\"; \
                 adaptive chunking works best with an index on the dimension being adapted",
                column, rel.relation_name()
            );
        }

        let strategy = self.strategy_for(has_index);
        debug!("[adaptive] {} min/max on \"{}\"", strategy.name(), rel.relation_name());
        let res = strategy.minmax(rel, attno, ty)?;
        if res == ValueRange::NoIndex {
            // 探测与扫描之间索引消失：仍然回退全表扫描
            return self.heap.minmax(rel, attno, ty);
        }
        Ok(res)
    }

    /// 仅用于配置阶段的建议性检查，不在估算热路径上
    pub fn has_usable_index(rel: &dyn ChunkRelation, column: &str) -> bool {
        rel.attno(column)
            .map(|attno| Self::has_matching_index(rel, attno))
            .unwrap_or(false)
    }
}

impl Default for ValueRangeLocator {
    fn default() -> Self { Self::new() }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::cell::Cell;

    /// 内存中的单列关系，可选带一个时间索引
    pub(crate) struct FakeRelation {
        pub values:     Vec<Value>,
        pub ty:         ColumnType,
        pub indexed:    bool,
        pub heap_scans: Cell<usize>,
    }

    impl FakeRelation {
        pub fn new(ty: ColumnType, values: Vec<Value>, indexed: bool) -> Self {
            Self { values, ty, indexed, heap_scans: Cell::new(0) }
        }
    }

    impl ChunkRelation for FakeRelation {
        fn relation_name(&self) -> String { "_hyper_1_1_chunk".into() }

        fn attno(&self, column: &str) -> Option<AttrNumber> {
            (column == "time").then_some(0)
        }

        fn column_type(&self, attno: AttrNumber) -> Option<ColumnType> {
            (attno == 0).then_some(self.ty)
        }

        fn index_list(&self) -> Vec<IndexDescriptor> {
            if self.indexed {
                vec![IndexDescriptor { name: "time_idx".into(), columns: vec![0] }]
            } else {
                vec![IndexDescriptor { name: "other_idx".into(), columns: vec![3] }]
            }
        }

        fn index_endpoint(
            &self, _index: &IndexDescriptor, direction: ScanDirection,
        ) -> Result<Option<Value>> {
            let cmp = type_comparator(self.ty);
            let mut sorted: Vec<&Value> = self.values.iter().filter(|v| !v.is_null()).collect();
            sorted.sort_by(|a, b| cmp(a, b).unwrap());
            Ok(match direction {
                ScanDirection::Forward  => sorted.first().map(|v| (*v).clone()),
                ScanDirection::Backward => sorted.last().map(|v| (*v).clone()),
            })
        }

        fn heap_scan(
            &self, _attno: AttrNumber, visit: &mut dyn FnMut(&Value) -> Result<()>,
        ) -> Result<()> {
            self.heap_scans.set(self.heap_scans.get() + 1);
            self.values.iter().try_for_each(|v| visit(v))
        }
    }

    fn ts(vals: &[i64]) -> Vec<Value> { vals.iter().map(|v| Value::Timestamp(*v)).collect() }

    #[test]
    fn index_strategy_skips_heap() {
        let rel = FakeRelation::new(ColumnType::Timestamp, ts(&[40, 10, 70]), true);
        let r = ValueRangeLocator::new().locate(&rel, "time").unwrap();
        assert_eq!(r, ValueRange::Found { min: Value::Timestamp(10), max: Value::Timestamp(70) });
        assert_eq!(rel.heap_scans.get(), 0);
    }

    #[test]
    fn falls_back_to_heap_scan_without_index() {
        let mut vals = ts(&[5, 3, 9]);
        vals.insert(1, Value::Null);
        let rel = FakeRelation::new(ColumnType::Timestamp, vals, false);
        let r = ValueRangeLocator::new().locate(&rel, "time").unwrap();
        assert_eq!(r, ValueRange::Found { min: Value::Timestamp(3), max: Value::Timestamp(9) });
        assert_eq!(rel.heap_scans.get(), 1);
    }

    #[test]
    fn empty_or_all_null_is_no_data() {
        let rel = FakeRelation::new(ColumnType::Timestamp, vec![Value::Null, Value::Null], false);
        assert_eq!(ValueRangeLocator::new().locate(&rel, "time").unwrap(), ValueRange::NoData);
        let rel = FakeRelation::new(ColumnType::Timestamp, vec![], true);
        assert_eq!(ValueRangeLocator::new().locate(&rel, "time").unwrap(), ValueRange::NoData);
    }

    #[test]
    fn index_min_max_reports_no_index_when_nothing_matches() {
        let rel = FakeRelation::new(ColumnType::Timestamp, ts(&[1]), false);
        assert_eq!(IndexMinMax.minmax(&rel, 0, ColumnType::Timestamp).unwrap(), ValueRange::NoIndex);
    }

    #[test]
    fn usable_index_probe() {
        let indexed = FakeRelation::new(ColumnType::Timestamp, vec![], true);
        let bare    = FakeRelation::new(ColumnType::Timestamp, vec![], false);
        assert!(ValueRangeLocator::has_usable_index(&indexed, "time"));
        assert!(!ValueRangeLocator::has_usable_index(&bare, "time"));
        assert!(!ValueRangeLocator::has_usable_index(&indexed, "missing"));
    }

    #[test]
    fn unknown_column_is_an_error() {
        let rel = FakeRelation::new(ColumnType::Timestamp, vec![], true);
        assert!(matches!(ValueRangeLocator::new().locate(&rel, "nope"),
                         Err(AdaptiveError::ColumnNotFound(_))));
    }
}

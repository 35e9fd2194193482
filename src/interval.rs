//! 自适应 chunk 区间估算
//!
//! 沿维度轴取坐标之前最近的若干 chunk，用实际数据跨度外推每个 chunk
//! “填满整个区间时”的大小，再与目标大小比较得到每个 chunk 隐含的区间：
//!
//! ```text
//! interval_fillfactor = (max - min) / R
//! extrapolated_size   = S / interval_fillfactor
//! size_fillfactor     = extrapolated_size / target
//! implied_interval    = R / size_fillfactor
//! ```
//!
//! 样本分三类：可用（两个填充率都过阈值）、偏小但密集（只有区间填充率过阈值）、
//! 忽略。没有可用样本时，至少两个偏小样本才会放大区间；否则保持原区间。
//! 候选值与当前值相差不超过 15% 时也保持原区间，避免来回振荡。

use log::{debug, info};
use crate::catalog::{ChunkWindowSource, DimensionCatalog, WindowChunk};
use crate::common::{AdaptiveError, DimensionId, Result};
use crate::config::DEFAULT_CHUNK_WINDOW;
use crate::field_type::time_value_to_internal;
use crate::meta::Dimension;
use crate::range_locator::{ValueRange, ValueRangeLocator};

/// 数据跨度至少占声明区间的比例
pub const INTERVAL_FILLFACTOR_THRESH: f64 = 0.5;
/// 外推大小至少占目标大小的比例
pub const SIZE_FILLFACTOR_THRESH: f64 = 0.15;
/// 候选区间相对变化不超过该值时保持原区间
pub const INTERVAL_MIN_CHANGE_THRESH: f64 = 0.15;
/// 触发放大所需的偏小样本数下限（严格大于）
pub const NUM_UNDERSIZED_INTERVALS: usize = 1;
/// 放大后落在可用阈值之上一点
pub const UNDERSIZED_FILLFACTOR_THRESH: f64 = SIZE_FILLFACTOR_THRESH * 1.1;
/// sizing 函数参数个数
pub const CHUNK_SIZING_FUNC_NARGS: usize = 3;

// ── 单个 chunk 样本 ───────────────────────────────────────────────────────────

/// 一个 chunk 的观测值，min/max 已转换为维度内部 i64 表示
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ChunkSample {
    pub slice_interval: i64,
    pub chunk_size:     i64,
    pub min:            i64,
    pub max:            i64,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SampleClass {
    Usable { implied_interval: f64 },
    Undersized { slice_interval: i64, size_fillfactor: f64 },
    Ignored,
}

impl ChunkSample {
    pub fn interval_fillfactor(&self) -> f64 {
        (self.max as f64 - self.min as f64) / self.slice_interval as f64
    }

    pub fn classify(&self, target_size_bytes: i64) -> SampleClass {
        if self.slice_interval <= 0 || target_size_bytes <= 0 {
            return SampleClass::Ignored;
        }
        let interval_fillfactor = self.interval_fillfactor();
        if !interval_fillfactor.is_finite() || interval_fillfactor <= 0.0 {
            return SampleClass::Ignored;
        }
        let extrapolated_size = self.chunk_size as f64 / interval_fillfactor;
        let size_fillfactor   = extrapolated_size / target_size_bytes as f64;
        if !size_fillfactor.is_finite() || size_fillfactor <= 0.0 {
            return SampleClass::Ignored;
        }

        debug!("[adaptive] slice_interval={} interval_fillfactor={:.4} \
                extrapolated_size={:.0} size_fillfactor={:.4}",
               self.slice_interval, interval_fillfactor, extrapolated_size, size_fillfactor);

        if interval_fillfactor > INTERVAL_FILLFACTOR_THRESH {
            if size_fillfactor > SIZE_FILLFACTOR_THRESH {
                return SampleClass::Usable {
                    implied_interval: self.slice_interval as f64 / size_fillfactor,
                };
            }
            return SampleClass::Undersized { slice_interval: self.slice_interval, size_fillfactor };
        }
        SampleClass::Ignored
    }
}

// ── 汇总 ──────────────────────────────────────────────────────────────────────

#[derive(Debug, Default, Clone)]
pub struct IntervalAccumulator {
    interval_sum:              f64,
    num_intervals:             usize,
    undersized_interval_sum:   f64,
    undersized_fillfactor_sum: f64,
    num_undersized:            usize,
}

impl IntervalAccumulator {
    pub fn add(&mut self, class: SampleClass) {
        match class {
            SampleClass::Usable { implied_interval } => {
                self.interval_sum  += implied_interval;
                self.num_intervals += 1;
            }
            SampleClass::Undersized { slice_interval, size_fillfactor } => {
                self.undersized_interval_sum   += slice_interval as f64;
                self.undersized_fillfactor_sum += size_fillfactor;
                self.num_undersized            += 1;
            }
            SampleClass::Ignored => {}
        }
    }

    pub fn num_usable(&self) -> usize { self.num_intervals }

    pub fn num_undersized(&self) -> usize { self.num_undersized }

    /// 候选区间（截断为整数）；没有足够证据时为 `None`
    pub fn candidate(&self) -> Option<i64> {
        if self.num_intervals > 0 {
            return Some((self.interval_sum / self.num_intervals as f64) as i64);
        }
        if self.num_undersized > NUM_UNDERSIZED_INTERVALS {
            let n = self.num_undersized as f64;
            let avg_fillfactor = self.undersized_fillfactor_sum / n;
            let avg_interval   = self.undersized_interval_sum / n;
            let incr_factor    = UNDERSIZED_FILLFACTOR_THRESH / avg_fillfactor;
            debug!("[adaptive] undersized chunks: avg_interval={avg_interval:.0} \
                    avg_fillfactor={avg_fillfactor:.4} incr_factor={incr_factor:.4}");
            return Some((avg_interval * incr_factor) as i64);
        }
        None
    }

    /// 在当前区间上应用候选值与滞回
    pub fn finish(&self, current_interval: i64) -> i64 {
        match self.candidate() {
            Some(candidate) => apply_hysteresis(current_interval, candidate),
            None            => current_interval,
        }
    }
}

/// 相对变化不超过阈值时保持当前区间；候选值非正时也保持
pub fn apply_hysteresis(current_interval: i64, candidate: i64) -> i64 {
    if candidate <= 0 {
        return current_interval;
    }
    let change = (1.0 - candidate as f64 / current_interval as f64).abs();
    if change <= INTERVAL_MIN_CHANGE_THRESH {
        debug!("[adaptive] candidate {candidate} within {:.0}% of {current_interval}, keeping it",
               INTERVAL_MIN_CHANGE_THRESH * 100.0);
        current_interval
    } else {
        candidate
    }
}

// ── IntervalEstimator ─────────────────────────────────────────────────────────

/// 一次估算的明细
#[derive(Debug, Clone, PartialEq)]
pub struct IntervalEstimate {
    pub current_interval: i64,
    pub interval:         i64,
    pub candidate:        Option<i64>,
    pub num_usable:       usize,
    pub num_undersized:   usize,
}

pub struct IntervalEstimator<'a, C> {
    catalog: &'a C,
    locator: ValueRangeLocator,
    window:  usize,
}

impl<'a, C> IntervalEstimator<'a, C>
where
    C: DimensionCatalog + ChunkWindowSource,
{
    pub fn new(catalog: &'a C) -> Self {
        Self { catalog, locator: ValueRangeLocator::new(), window: DEFAULT_CHUNK_WINDOW }
    }

    pub fn with_window(mut self, window: usize) -> Self {
        self.window = window; self
    }

    /// 计算维度的下一个区间
    pub fn estimate(&self, dimension_id: DimensionId, coordinate: i64, target_size_bytes: i64) -> Result<i64> {
        Ok(self.estimate_detailed(dimension_id, coordinate, target_size_bytes)?.interval)
    }

    pub fn estimate_detailed(
        &self,
        dimension_id:      DimensionId,
        coordinate:        i64,
        target_size_bytes: i64,
    ) -> Result<IntervalEstimate> {
        if target_size_bytes <= 0 {
            return Err(AdaptiveError::InvalidArgument(
                format!("chunk target size must be positive: {target_size_bytes}")));
        }
        let dimension = self.catalog.get_dimension_by_id(dimension_id)?;
        let hypertable = self.catalog.get_hypertable_by_id(dimension.hypertable_id)?;
        let current_interval = dimension.interval_length;

        let window = self.catalog.get_recent_partitions(
            hypertable.id, dimension_id, coordinate, self.window)?;

        let mut acc = IntervalAccumulator::default();
        for chunk in &window {
            let Some(sample) = self.sample(&dimension, chunk)? else { continue };
            acc.add(sample.classify(target_size_bytes));
        }

        let candidate = acc.candidate();
        let interval  = acc.finish(current_interval);
        if interval != current_interval {
            info!("[adaptive] \"{}\" dimension \"{}\": interval {} -> {} \
                   ({} usable, {} undersized of {} chunks)",
                  hypertable.name, dimension.column_name, current_interval, interval,
                  acc.num_usable(), acc.num_undersized(), window.len());
        } else {
            debug!("[adaptive] \"{}\" dimension \"{}\": keeping interval {} (candidate {:?})",
                   hypertable.name, dimension.column_name, current_interval, candidate);
        }

        Ok(IntervalEstimate {
            current_interval,
            interval,
            candidate,
            num_usable:     acc.num_usable(),
            num_undersized: acc.num_undersized(),
        })
    }

    /// 取一个 chunk 的观测值；没有数据时为 `None`
    fn sample(
        &self,
        dimension: &Dimension,
        chunk:     &WindowChunk<<C as ChunkWindowSource>::Relation>,
    ) -> Result<Option<ChunkSample>> {
        let chunk_size = self.catalog.get_storage_size(chunk.chunk_id)?;
        let range = self.locator.locate(&chunk.relation, &dimension.column_name)?;
        let (min, max) = match range {
            ValueRange::Found { min, max } => (min, max),
            ValueRange::NoData | ValueRange::NoIndex => {
                debug!("[adaptive] chunk {} has no data on \"{}\"", chunk.chunk_id, dimension.column_name);
                return Ok(None);
            }
        };
        Ok(Some(ChunkSample {
            slice_interval: chunk.slice.interval(),
            chunk_size,
            min: time_value_to_internal(&min, dimension.column_type)?,
            max: time_value_to_internal(&max, dimension.column_type)?,
        }))
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::common::{ChunkId, ColumnType, DimensionKind, HypertableId};
    use crate::field_type::Value;
    use crate::meta::{DimensionSlice, Hypertable, SizingConfig};
    use crate::range_locator::tests::FakeRelation;

    const DAY: i64 = 86_400;

    /// 尺寸可任意指定的窗口，按给定顺序返回
    pub(crate) struct FakeCatalog {
        pub dimension: Dimension,
        pub chunks:    Vec<(DimensionSlice, i64, Vec<i64>)>,
    }

    impl FakeCatalog {
        pub fn new(current_interval: i64) -> Self {
            Self {
                dimension: Dimension {
                    id: 2, hypertable_id: 1,
                    column_name: "time".into(),
                    column_type: ColumnType::Int64,
                    kind: DimensionKind::Open,
                    interval_length: current_interval,
                    num_slices: 0,
                },
                chunks: Vec::new(),
            }
        }

        /// 区间 [start, start+width)，物理大小 size，数据点 values
        pub fn chunk(mut self, start: i64, width: i64, size: i64, values: &[i64]) -> Self {
            let id = self.chunks.len() as i32 + 10;
            let slice = DimensionSlice::new(id, 2, start, start + width).unwrap();
            self.chunks.push((slice, size, values.to_vec()));
            self
        }
    }

    impl DimensionCatalog for FakeCatalog {
        fn get_dimension_by_id(&self, id: DimensionId) -> Result<Dimension> {
            (id == self.dimension.id).then(|| self.dimension.clone())
                .ok_or(AdaptiveError::DimensionNotFound(id))
        }

        fn get_hypertable_by_id(&self, id: HypertableId) -> Result<Hypertable> {
            if id != 1 {
                return Err(AdaptiveError::HypertableNotFound(id));
            }
            Ok(Hypertable {
                id, name: "conditions".into(), columns: Vec::new(),
                dimensions: vec![self.dimension.clone()], indexes: Vec::new(),
                chunk_sizing_func: None, chunk_target_size: 0, chunk_ids: Vec::new(),
            })
        }

        fn persist_sizing_config(&self, _: HypertableId, _: &SizingConfig) -> Result<()> { Ok(()) }
    }

    impl ChunkWindowSource for FakeCatalog {
        type Relation = FakeRelation;

        fn get_recent_partitions(
            &self, _: HypertableId, _: DimensionId, _: i64, window: usize,
        ) -> Result<Vec<WindowChunk<FakeRelation>>> {
            Ok(self.chunks.iter().take(window).map(|(slice, _, vals)| WindowChunk {
                chunk_id: slice.id,
                slice:    *slice,
                relation: FakeRelation::new(
                    ColumnType::Int64, vals.iter().map(|v| Value::Int64(*v)).collect(), true),
            }).collect())
        }

        fn get_storage_size(&self, chunk_id: ChunkId) -> Result<i64> {
            self.chunks.iter().find(|(s, _, _)| s.id == chunk_id).map(|(_, size, _)| *size)
                .ok_or(AdaptiveError::ChunkNotFound(chunk_id))
        }
    }

    fn estimate(cat: &FakeCatalog, target: i64) -> i64 {
        IntervalEstimator::new(cat).estimate(2, i64::MAX, target).unwrap()
    }

    #[test]
    fn full_chunk_above_target_shrinks_interval() {
        let cat = FakeCatalog::new(DAY).chunk(0, DAY, 120_000_000, &[0, DAY]);
        assert_eq!(estimate(&cat, 100_000_000), 72_000);
    }

    #[test]
    fn small_change_keeps_current_interval() {
        // 86400 / 80000 = 1.08 → 隐含区间 80000
        let cat = FakeCatalog::new(DAY).chunk(0, DAY, 108_000_000, &[0, DAY]);
        assert_eq!(estimate(&cat, 100_000_000), DAY);
    }

    #[test]
    fn chunk_exactly_at_target_implies_its_own_width() {
        let s = ChunkSample { slice_interval: 5_000, chunk_size: 1_000, min: 0, max: 5_000 };
        assert_eq!(s.classify(1_000), SampleClass::Usable { implied_interval: 5_000.0 });
    }

    #[test]
    fn larger_chunks_imply_smaller_intervals() {
        let implied = |size| match (ChunkSample { slice_interval: DAY, chunk_size: size, min: 0, max: DAY })
            .classify(100_000_000)
        {
            SampleClass::Usable { implied_interval } => implied_interval,
            other => panic!("unexpected {other:?}"),
        };
        assert!(implied(120_000_000) > implied(150_000_000));
        assert!(implied(150_000_000) > implied(400_000_000));
    }

    #[test]
    fn extrapolates_partially_filled_chunk() {
        // 只覆盖 60% 的区间，外推后正好是目标的 2 倍 → 隐含区间减半
        let cat = FakeCatalog::new(1_000).chunk(0, 1_000, 120, &[100, 700]);
        assert_eq!(estimate(&cat, 100), 500);
    }

    #[test]
    fn no_evidence_returns_current_interval() {
        let cat = FakeCatalog::new(DAY);
        let est = IntervalEstimator::new(&cat).estimate_detailed(2, 0, 100).unwrap();
        assert_eq!(est.interval, DAY);
        assert_eq!(est.candidate, None);

        // 稀疏 chunk（跨度 < 50%）与空 chunk 都被忽略
        let cat = FakeCatalog::new(DAY)
            .chunk(0, DAY, 500_000_000, &[0, 100])
            .chunk(DAY, DAY, 0, &[]);
        assert_eq!(estimate(&cat, 100_000_000), DAY);
    }

    #[test]
    fn single_undersized_chunk_does_not_boost() {
        let cat = FakeCatalog::new(1_000).chunk(0, 1_000, 1, &[0, 1_000]);
        let est = IntervalEstimator::new(&cat).estimate_detailed(2, 0, 100).unwrap();
        assert_eq!(est.num_undersized, 1);
        assert_eq!(est.interval, 1_000);
    }

    #[test]
    fn several_undersized_chunks_boost_interval() {
        // size_fillfactor = 0.05 → 放大 0.165 / 0.05 = 3.3 倍
        let cat = FakeCatalog::new(1_000)
            .chunk(2_000, 1_000, 5, &[2_000, 3_000])
            .chunk(1_000, 1_000, 5, &[1_000, 2_000]);
        let est = IntervalEstimator::new(&cat).estimate_detailed(2, 3_000, 100).unwrap();
        assert_eq!(est.num_usable, 0);
        assert_eq!(est.num_undersized, 2);
        assert!((3_299..=3_300).contains(&est.interval), "got {}", est.interval);
    }

    #[test]
    fn usable_samples_take_precedence_over_undersized() {
        let cat = FakeCatalog::new(1_000)
            .chunk(2_000, 1_000, 200, &[2_000, 3_000])
            .chunk(1_000, 1_000, 5, &[1_000, 2_000])
            .chunk(0, 1_000, 5, &[0, 1_000]);
        let est = IntervalEstimator::new(&cat).estimate_detailed(2, 3_000, 100).unwrap();
        assert_eq!(est.num_usable, 1);
        assert_eq!(est.interval, 500);
    }

    #[test]
    fn usable_intervals_are_averaged() {
        // 隐含区间 500 与 250 → 均值 375
        let cat = FakeCatalog::new(1_000)
            .chunk(1_000, 1_000, 200, &[1_000, 2_000])
            .chunk(0, 1_000, 400, &[0, 1_000]);
        assert_eq!(estimate(&cat, 100), 375);
    }

    #[test]
    fn window_limits_considered_chunks() {
        let cat = FakeCatalog::new(1_000)
            .chunk(1_000, 1_000, 200, &[1_000, 2_000])
            .chunk(0, 1_000, 400, &[0, 1_000]);
        let est = IntervalEstimator::new(&cat).with_window(1).estimate(2, 2_000, 100).unwrap();
        assert_eq!(est, 500);
    }

    #[test]
    fn zero_span_is_ignored() {
        let s = ChunkSample { slice_interval: 1_000, chunk_size: 1_000, min: 7, max: 7 };
        assert_eq!(s.classify(100), SampleClass::Ignored);
        let s = ChunkSample { slice_interval: 1_000, chunk_size: 0, min: 0, max: 1_000 };
        assert_eq!(s.classify(100), SampleClass::Ignored);
    }

    #[test]
    fn half_filled_interval_is_ignored() {
        let s = ChunkSample { slice_interval: 1_000, chunk_size: 1_000, min: 0, max: 500 };
        assert_eq!(s.interval_fillfactor(), INTERVAL_FILLFACTOR_THRESH);
        assert_eq!(s.classify(100), SampleClass::Ignored);
        let s = ChunkSample { max: 501, ..s };
        assert!(matches!(s.classify(100), SampleClass::Usable { .. }));
    }

    #[test]
    fn size_fillfactor_at_threshold_is_undersized() {
        // 15 / 100 == 0.15
        let s = ChunkSample { slice_interval: 1_000, chunk_size: 15, min: 0, max: 1_000 };
        assert!(matches!(s.classify(100), SampleClass::Undersized { size_fillfactor, .. }
                         if size_fillfactor == SIZE_FILLFACTOR_THRESH));
        let s = ChunkSample { chunk_size: 16, ..s };
        assert!(matches!(s.classify(100), SampleClass::Usable { .. }));
    }

    #[test]
    fn undersized_boost_within_threshold_keeps_interval() {
        // 0.165 / 0.15 = 1.1 → 候选约 1100，变化不超过 15%
        let cat = FakeCatalog::new(1_000)
            .chunk(1_000, 1_000, 15, &[1_000, 2_000])
            .chunk(0, 1_000, 15, &[0, 1_000]);
        let est = IntervalEstimator::new(&cat).estimate_detailed(2, 2_000, 100).unwrap();
        assert_eq!(est.num_undersized, 2);
        assert!(matches!(est.candidate, Some(c) if (1_099..=1_100).contains(&c)), "{:?}", est.candidate);
        assert_eq!(est.interval, 1_000);
    }

    #[test]
    fn hysteresis_boundaries() {
        assert_eq!(apply_hysteresis(1_000, 1_150), 1_000);
        assert_eq!(apply_hysteresis(1_000, 851), 1_000);
        assert_eq!(apply_hysteresis(1_000, 1_151), 1_151);
        assert_eq!(apply_hysteresis(1_000, 0), 1_000);
    }

    #[test]
    fn rejects_non_positive_target_and_unknown_dimension() {
        let cat = FakeCatalog::new(DAY);
        assert!(matches!(IntervalEstimator::new(&cat).estimate(2, 0, 0),
                         Err(AdaptiveError::InvalidArgument(_))));
        assert!(matches!(IntervalEstimator::new(&cat).estimate(99, 0, 1),
                         Err(AdaptiveError::DimensionNotFound(99))));
    }
}

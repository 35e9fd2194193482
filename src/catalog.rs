//! Hypertable 目录
//!
//! 定义估算算法依赖的两个目录接口，并给出线程安全的内存实现 [`CatalogManager`]：
//! - [`DimensionCatalog`]：维度/hypertable 查询，sizing 配置持久化
//! - [`ChunkWindowSource`]：按维度坐标回看的 chunk 窗口与物理大小

use std::collections::HashMap;
use std::io::{Cursor, Read};
use std::sync::RwLock;
use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use crate::chunk::Chunk;
use crate::common::{
    AdaptiveError, ChunkId, DimensionId, DimensionKind, HypertableId, Result, SliceId,
};
use crate::field_type::ColumnMeta;
use crate::meta::{Dimension, DimensionSlice, Hypercube, Hypertable, SizingConfig, SizingFuncRef};
use crate::range_locator::ChunkRelation;

// ── 目录接口 ──────────────────────────────────────────────────────────────────

pub trait DimensionCatalog {
    fn get_dimension_by_id(&self, dimension_id: DimensionId) -> Result<Dimension>;

    fn get_hypertable_by_id(&self, hypertable_id: HypertableId) -> Result<Hypertable>;

    fn persist_sizing_config(&self, hypertable_id: HypertableId, config: &SizingConfig) -> Result<()>;
}

/// 窗口中的一个 chunk：它在被估算维度上的 slice 与可扫描的关系
#[derive(Clone)]
pub struct WindowChunk<R> {
    pub chunk_id: ChunkId,
    pub slice:    DimensionSlice,
    pub relation: R,
}

pub trait ChunkWindowSource {
    type Relation: ChunkRelation;

    /// 沿维度轴（而非创建顺序）取 `coordinate` 之前最近的至多 `window` 个 chunk
    fn get_recent_partitions(
        &self,
        hypertable_id: HypertableId,
        dimension_id:  DimensionId,
        coordinate:    i64,
        window:        usize,
    ) -> Result<Vec<WindowChunk<Self::Relation>>>;

    fn get_storage_size(&self, chunk_id: ChunkId) -> Result<i64>;
}

// ── sizing 配置记录编解码 ─────────────────────────────────────────────────────
//
// ┌────────────────────────────────┐
// │ MAGIC "SZCF" (4) | VERSION (1) │
// │ check_for_index (u8)           │
// │ target_size_bytes (i64 LE)     │
// │ schema (u16 len + bytes)       │
// │ name   (u16 len + bytes)       │
// │ CRC32 (u32 LE)                 │
// └────────────────────────────────┘

const RECORD_MAGIC: &[u8; 4] = b"SZCF";
const RECORD_VERSION: u8     = 1;

fn record_io(e: std::io::Error) -> AdaptiveError {
    AdaptiveError::SegmentIo(format!("sizing record: {e}"))
}

fn write_str(out: &mut Vec<u8>, s: &str) -> Result<()> {
    let len = u16::try_from(s.len())
        .map_err(|_| AdaptiveError::InvalidArgument(format!("name too long: {s}")))?;
    out.write_u16::<LittleEndian>(len).map_err(record_io)?;
    out.extend_from_slice(s.as_bytes());
    Ok(())
}

fn read_str(rd: &mut Cursor<&[u8]>) -> Result<String> {
    let len = rd.read_u16::<LittleEndian>().map_err(record_io)? as usize;
    let mut buf = vec![0u8; len];
    rd.read_exact(&mut buf).map_err(record_io)?;
    String::from_utf8(buf).map_err(|e| AdaptiveError::SegmentIo(e.to_string()))
}

pub fn encode_sizing_record(config: &SizingConfig) -> Result<Vec<u8>> {
    let mut out = Vec::with_capacity(64);
    out.extend_from_slice(RECORD_MAGIC);
    out.push(RECORD_VERSION);
    out.push(config.check_for_index as u8);
    out.write_i64::<LittleEndian>(config.target_size_bytes).map_err(record_io)?;
    write_str(&mut out, &config.func.schema)?;
    write_str(&mut out, &config.func.name)?;
    let crc = crc32fast::hash(&out);
    out.write_u32::<LittleEndian>(crc).map_err(record_io)?;
    Ok(out)
}

pub fn decode_sizing_record(data: &[u8]) -> Result<SizingConfig> {
    if data.len() < RECORD_MAGIC.len() + 2 + 8 + 4 + 4 || &data[..4] != RECORD_MAGIC {
        return Err(AdaptiveError::SegmentIo("invalid sizing record".into()));
    }
    let body_end   = data.len() - 4;
    let stored_crc = Cursor::new(&data[body_end..]).read_u32::<LittleEndian>().map_err(record_io)?;
    if crc32fast::hash(&data[..body_end]) != stored_crc {
        return Err(AdaptiveError::ChecksumMismatch);
    }

    let mut rd = Cursor::new(&data[4..body_end]);
    let version = rd.read_u8().map_err(record_io)?;
    if version != RECORD_VERSION {
        return Err(AdaptiveError::SegmentIo(format!("unsupported sizing record version {version}")));
    }
    let check_for_index   = rd.read_u8().map_err(record_io)? != 0;
    let target_size_bytes = rd.read_i64::<LittleEndian>().map_err(record_io)?;
    let schema = read_str(&mut rd)?;
    let name   = read_str(&mut rd)?;
    Ok(SizingConfig {
        func: SizingFuncRef { schema, name },
        target_size_bytes,
        check_for_index,
    })
}

// ── CatalogManager ────────────────────────────────────────────────────────────

#[derive(Default)]
struct CatalogState {
    hypertables:     HashMap<HypertableId, Hypertable>,
    names:           HashMap<String, HypertableId>,
    /// 未分区的普通表
    plain_tables:    HashMap<String, Vec<ColumnMeta>>,
    dimension_owner: HashMap<DimensionId, HypertableId>,
    /// dimension_id → 该维度的所有 slice
    slices:          HashMap<DimensionId, Vec<DimensionSlice>>,
    slice_chunks:    HashMap<SliceId, Vec<ChunkId>>,
    chunks:          HashMap<ChunkId, Chunk>,
    sizing_records:  HashMap<HypertableId, Vec<u8>>,
    next_id:         i32,
}

impl CatalogState {
    fn alloc_id(&mut self) -> i32 {
        self.next_id += 1;
        self.next_id
    }

    fn hypertable_mut(&mut self, id: HypertableId) -> Result<&mut Hypertable> {
        self.hypertables.get_mut(&id).ok_or(AdaptiveError::HypertableNotFound(id))
    }
}

/// 线程安全的目录
pub struct CatalogManager {
    state: RwLock<CatalogState>,
}

impl CatalogManager {
    pub fn new() -> Self {
        Self { state: RwLock::new(CatalogState::default()) }
    }

    // ── DDL ───────────────────────────────────────────────────────────────────

    /// 注册普通表
    pub fn create_table(&self, name: &str, columns: Vec<ColumnMeta>) -> Result<()> {
        let mut st = self.state.write().unwrap();
        if st.names.contains_key(name) || st.plain_tables.contains_key(name) {
            return Err(AdaptiveError::InvalidArgument(format!("table \"{name}\" already exists")));
        }
        st.plain_tables.insert(name.into(), columns);
        Ok(())
    }

    /// 创建 hypertable 及其开放时间维度
    pub fn create_hypertable(
        &self,
        name:            &str,
        columns:         Vec<ColumnMeta>,
        time_column:     &str,
        interval_length: i64,
    ) -> Result<HypertableId> {
        let time_col = columns.iter().find(|c| c.name == time_column)
            .ok_or_else(|| AdaptiveError::ColumnNotFound(time_column.into()))?;
        if !time_col.column_type.is_time_like() {
            return Err(AdaptiveError::InvalidArgument(format!(
                "column \"{time_column}\" of type {:?} cannot be an open dimension",
                time_col.column_type)));
        }
        if interval_length <= 0 {
            return Err(AdaptiveError::InvalidArgument(
                format!("chunk interval must be positive: {interval_length}")));
        }

        let mut st = self.state.write().unwrap();
        if st.names.contains_key(name) || st.plain_tables.contains_key(name) {
            return Err(AdaptiveError::InvalidArgument(format!("table \"{name}\" already exists")));
        }
        let id     = st.alloc_id();
        let dim_id = st.alloc_id();
        let dimension = Dimension {
            id: dim_id, hypertable_id: id,
            column_name: time_column.into(),
            column_type: time_col.column_type,
            kind: DimensionKind::Open,
            interval_length,
            num_slices: 0,
        };
        st.dimension_owner.insert(dim_id, id);
        st.names.insert(name.into(), id);
        st.hypertables.insert(id, Hypertable {
            id, name: name.into(), columns,
            dimensions: vec![dimension],
            indexes: Vec::new(),
            chunk_sizing_func: None,
            chunk_target_size: 0,
            chunk_ids: Vec::new(),
        });
        Ok(id)
    }

    /// 增加按固定分片数切分的空间维度
    pub fn add_closed_dimension(
        &self,
        hypertable_id: HypertableId,
        column:        &str,
        num_slices:    i16,
    ) -> Result<DimensionId> {
        let mut st = self.state.write().unwrap();
        let dim_id = st.alloc_id();
        let ht = st.hypertable_mut(hypertable_id)?;
        let col = ht.column(column)
            .ok_or_else(|| AdaptiveError::ColumnNotFound(column.into()))?;
        let dimension = Dimension {
            id: dim_id, hypertable_id,
            column_name: column.into(),
            column_type: col.column_type,
            kind: DimensionKind::Closed,
            interval_length: 0,
            num_slices,
        };
        ht.dimensions.push(dimension);
        st.dimension_owner.insert(dim_id, hypertable_id);
        Ok(dim_id)
    }

    /// 在 hypertable 上声明索引；已有和之后创建的 chunk 都会建立对应索引
    pub fn create_hypertable_index(&self, hypertable_id: HypertableId, columns: &[&str]) -> Result<()> {
        let mut st = self.state.write().unwrap();
        let ht = st.hypertable_mut(hypertable_id)?;
        if let Some(missing) = columns.iter().find(|c| ht.column(c).is_none()) {
            return Err(AdaptiveError::ColumnNotFound((*missing).into()));
        }
        ht.indexes.push(columns.iter().map(|c| c.to_string()).collect());
        let chunk_ids = ht.chunk_ids.clone();
        for cid in chunk_ids {
            if let Some(chunk) = st.chunks.get(&cid) {
                chunk.create_index(&chunk_index_name(&chunk.table_name(), columns), columns)?;
            }
        }
        Ok(())
    }

    /// 创建 chunk，`slices` 为 (dimension_id, range_start, range_end)，须覆盖所有维度
    pub fn create_chunk(
        &self,
        hypertable_id: HypertableId,
        slices:        &[(DimensionId, i64, i64)],
    ) -> Result<Chunk> {
        let mut st = self.state.write().unwrap();
        let ht = st.hypertables.get(&hypertable_id)
            .ok_or(AdaptiveError::HypertableNotFound(hypertable_id))?
            .clone();
        if ht.dimensions.len() != slices.len()
            || ht.dimensions.iter().any(|d| !slices.iter().any(|s| s.0 == d.id))
        {
            return Err(AdaptiveError::InvalidArgument(format!(
                "chunk must have exactly one slice per dimension of hypertable {hypertable_id}")));
        }
        if let Some(&(_, start, end)) = slices.iter().find(|s| s.1 >= s.2) {
            return Err(AdaptiveError::InvalidArgument(format!(
                "slice range [{start}, {end}) is empty")));
        }

        let chunk_id = st.alloc_id();
        let mut cube = Hypercube::default();
        for &(dim_id, start, end) in slices {
            let existing = st.slices.get(&dim_id)
                .and_then(|v| v.iter().find(|s| s.range_start == start && s.range_end == end))
                .copied();
            let slice = match existing {
                Some(s) => s,
                None => {
                    let s = DimensionSlice::new(st.alloc_id(), dim_id, start, end)?;
                    st.slices.entry(dim_id).or_default().push(s);
                    s
                }
            };
            st.slice_chunks.entry(slice.id).or_default().push(chunk_id);
            cube.slices.push(slice);
        }

        let open_dim = ht.dimension_of_kind(DimensionKind::Open, 0);
        let chunk = Chunk::new(chunk_id, hypertable_id, ht.columns.clone(), cube, open_dim)?;
        for cols in &ht.indexes {
            let cols: Vec<&str> = cols.iter().map(String::as_str).collect();
            chunk.create_index(&chunk_index_name(&chunk.table_name(), &cols), &cols)?;
        }
        st.chunks.insert(chunk_id, chunk.clone());
        st.hypertable_mut(hypertable_id)?.chunk_ids.push(chunk_id);
        Ok(chunk)
    }

    pub fn update_dimension_interval(&self, dimension_id: DimensionId, interval: i64) -> Result<()> {
        if interval <= 0 {
            return Err(AdaptiveError::InvalidArgument(
                format!("chunk interval must be positive: {interval}")));
        }
        let mut st = self.state.write().unwrap();
        let owner = *st.dimension_owner.get(&dimension_id)
            .ok_or(AdaptiveError::DimensionNotFound(dimension_id))?;
        let dim = st.hypertable_mut(owner)?
            .dimensions.iter_mut()
            .find(|d| d.id == dimension_id)
            .ok_or(AdaptiveError::DimensionNotFound(dimension_id))?;
        dim.interval_length = interval;
        Ok(())
    }

    // ── 查询 ──────────────────────────────────────────────────────────────────

    pub fn hypertable_by_name(&self, name: &str) -> Option<Hypertable> {
        let st = self.state.read().unwrap();
        st.names.get(name).and_then(|id| st.hypertables.get(id)).cloned()
    }

    pub fn table_exists(&self, name: &str) -> bool {
        let st = self.state.read().unwrap();
        st.names.contains_key(name) || st.plain_tables.contains_key(name)
    }

    pub fn get_chunk(&self, chunk_id: ChunkId) -> Result<Chunk> {
        self.state.read().unwrap()
            .chunks.get(&chunk_id)
            .cloned()
            .ok_or(AdaptiveError::ChunkNotFound(chunk_id))
    }

    pub fn chunks_of(&self, hypertable_id: HypertableId) -> Result<Vec<Chunk>> {
        let st = self.state.read().unwrap();
        let ht = st.hypertables.get(&hypertable_id)
            .ok_or(AdaptiveError::HypertableNotFound(hypertable_id))?;
        Ok(ht.chunk_ids.iter().filter_map(|id| st.chunks.get(id).cloned()).collect())
    }

    /// 读回持久化的 sizing 记录（校验 CRC）
    pub fn load_sizing_config(&self, hypertable_id: HypertableId) -> Result<Option<SizingConfig>> {
        let st = self.state.read().unwrap();
        st.sizing_records.get(&hypertable_id)
            .map(|bytes| decode_sizing_record(bytes))
            .transpose()
    }
}

impl Default for CatalogManager {
    fn default() -> Self { Self::new() }
}

fn chunk_index_name(chunk_table: &str, columns: &[&str]) -> String {
    format!("{}_{}_idx", chunk_table, columns.join("_"))
}

impl DimensionCatalog for CatalogManager {
    fn get_dimension_by_id(&self, dimension_id: DimensionId) -> Result<Dimension> {
        let st = self.state.read().unwrap();
        let owner = st.dimension_owner.get(&dimension_id)
            .ok_or(AdaptiveError::DimensionNotFound(dimension_id))?;
        st.hypertables.get(owner)
            .and_then(|ht| ht.dimension_by_id(dimension_id))
            .cloned()
            .ok_or(AdaptiveError::DimensionNotFound(dimension_id))
    }

    fn get_hypertable_by_id(&self, hypertable_id: HypertableId) -> Result<Hypertable> {
        self.state.read().unwrap()
            .hypertables.get(&hypertable_id)
            .cloned()
            .ok_or(AdaptiveError::HypertableNotFound(hypertable_id))
    }

    fn persist_sizing_config(&self, hypertable_id: HypertableId, config: &SizingConfig) -> Result<()> {
        let record = encode_sizing_record(config)?;
        let mut st = self.state.write().unwrap();
        let ht = st.hypertable_mut(hypertable_id)?;
        ht.chunk_sizing_func = Some(config.func.clone());
        ht.chunk_target_size = config.target_size_bytes;
        st.sizing_records.insert(hypertable_id, record);
        Ok(())
    }
}

impl ChunkWindowSource for CatalogManager {
    type Relation = Chunk;

    fn get_recent_partitions(
        &self,
        hypertable_id: HypertableId,
        dimension_id:  DimensionId,
        coordinate:    i64,
        window:        usize,
    ) -> Result<Vec<WindowChunk<Chunk>>> {
        let st = self.state.read().unwrap();
        if !st.hypertables.contains_key(&hypertable_id) {
            return Err(AdaptiveError::HypertableNotFound(hypertable_id));
        }
        let mut before: Vec<DimensionSlice> = st.slices.get(&dimension_id)
            .map(|v| v.iter().filter(|s| s.range_start < coordinate).copied().collect())
            .unwrap_or_default();
        before.sort_by(|a, b| b.range_start.cmp(&a.range_start));

        let mut out = Vec::with_capacity(window);
        'slices: for slice in before {
            let Some(chunk_ids) = st.slice_chunks.get(&slice.id) else { continue };
            for cid in chunk_ids {
                if out.len() >= window {
                    break 'slices;
                }
                let Some(chunk) = st.chunks.get(cid) else { continue };
                if chunk.hypertable_id() != hypertable_id {
                    continue;
                }
                out.push(WindowChunk { chunk_id: *cid, slice, relation: chunk.clone() });
            }
        }
        Ok(out)
    }

    fn get_storage_size(&self, chunk_id: ChunkId) -> Result<i64> {
        self.get_chunk(chunk_id)?.total_relation_size()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::ColumnType;
    use crate::field_type::Value;

    fn catalog_with_table() -> (CatalogManager, HypertableId, DimensionId) {
        let cat = CatalogManager::new();
        let ht = cat.create_hypertable("conditions", vec![
            ColumnMeta::new("time", ColumnType::Int64).not_null(),
            ColumnMeta::new("device", ColumnType::Int32),
            ColumnMeta::new("temp", ColumnType::Float64),
        ], "time", 100).unwrap();
        let dim = cat.get_hypertable_by_id(ht).unwrap().dimensions[0].id;
        (cat, ht, dim)
    }

    #[test]
    fn window_follows_dimension_order_not_creation_order() {
        let (cat, ht, dim) = catalog_with_table();
        // 先建后面的区间，再建前面的
        for start in [300, 0, 200, 100, 400] {
            cat.create_chunk(ht, &[(dim, start, start + 100)]).unwrap();
        }
        let w = cat.get_recent_partitions(ht, dim, 350, 3).unwrap();
        let starts: Vec<i64> = w.iter().map(|c| c.slice.range_start).collect();
        assert_eq!(starts, vec![300, 200, 100]);

        let w = cat.get_recent_partitions(ht, dim, 50, 3).unwrap();
        assert_eq!(w.len(), 1);
        assert!(cat.get_recent_partitions(ht, dim, 0, 3).unwrap().is_empty());
    }

    #[test]
    fn chunk_needs_every_dimension_and_valid_ranges() {
        let (cat, ht, dim) = catalog_with_table();
        let space = cat.add_closed_dimension(ht, "device", 2).unwrap();
        assert!(cat.create_chunk(ht, &[(dim, 0, 100)]).is_err());
        assert!(cat.create_chunk(ht, &[(dim, 100, 100), (space, 0, 10)]).is_err());
        let a = cat.create_chunk(ht, &[(dim, 0, 100), (space, 0, 10)]).unwrap();
        let b = cat.create_chunk(ht, &[(dim, 0, 100), (space, 10, 20)]).unwrap();
        // 同一时间 slice 被两个 chunk 共享
        assert_eq!(a.cube().slice_by_dimension_id(dim), b.cube().slice_by_dimension_id(dim));
        assert_eq!(cat.get_recent_partitions(ht, dim, 1000, 3).unwrap().len(), 2);
    }

    #[test]
    fn hypertable_indexes_propagate_to_chunks() {
        let (cat, ht, dim) = catalog_with_table();
        let early = cat.create_chunk(ht, &[(dim, 0, 100)]).unwrap();
        cat.create_hypertable_index(ht, &["time"]).unwrap();
        let late = cat.create_chunk(ht, &[(dim, 100, 200)]).unwrap();
        assert_eq!(early.index_list().len(), 1);
        assert_eq!(late.index_list().len(), 1);
        assert!(cat.create_hypertable_index(ht, &["nope"]).is_err());
    }

    #[test]
    fn storage_size_reflects_chunk_contents() {
        let (cat, ht, dim) = catalog_with_table();
        let c = cat.create_chunk(ht, &[(dim, 0, 100)]).unwrap();
        assert_eq!(cat.get_storage_size(c.id()).unwrap(), 0);
        c.insert_row(vec![Value::Int64(1), Value::Int32(7), Value::Float64(20.5)]).unwrap();
        assert!(cat.get_storage_size(c.id()).unwrap() > 0);
        assert!(matches!(cat.get_storage_size(999), Err(AdaptiveError::ChunkNotFound(999))));
    }

    #[test]
    fn chunks_only_accept_rows_inside_their_time_slice() {
        let (cat, ht, dim) = catalog_with_table();
        let space = cat.add_closed_dimension(ht, "device", 2).unwrap();
        let c = cat.create_chunk(ht, &[(dim, 100, 200), (space, 0, 10)]).unwrap();
        c.insert_row(vec![Value::Int64(150), Value::Int32(99), Value::Float64(1.0)]).unwrap();
        for t in [99, 200, -50_000] {
            assert!(matches!(c.insert_row(vec![Value::Int64(t), Value::Int32(1), Value::Float64(1.0)]),
                             Err(AdaptiveError::InvalidArgument(_))));
        }
        assert_eq!(c.num_rows(), 1);
    }

    #[test]
    fn sizing_record_persists_and_detects_corruption() {
        let (cat, ht, _) = catalog_with_table();
        let cfg = SizingConfig {
            func: SizingFuncRef::new("_timescaledb_internal", "calculate_chunk_interval"),
            target_size_bytes: 100 * 1024 * 1024,
            check_for_index: true,
        };
        cat.persist_sizing_config(ht, &cfg).unwrap();
        assert_eq!(cat.load_sizing_config(ht).unwrap(), Some(cfg.clone()));
        let stored = cat.get_hypertable_by_id(ht).unwrap();
        assert_eq!(stored.chunk_target_size, cfg.target_size_bytes);
        assert_eq!(stored.chunk_sizing_func, Some(cfg.func.clone()));

        let mut bytes = encode_sizing_record(&cfg).unwrap();
        bytes[6] ^= 0x01;
        assert!(matches!(decode_sizing_record(&bytes), Err(AdaptiveError::ChecksumMismatch)));
    }

    #[test]
    fn plain_tables_share_the_namespace() {
        let (cat, _, _) = catalog_with_table();
        cat.create_table("devices", vec![ColumnMeta::new("id", ColumnType::Int32)]).unwrap();
        assert!(cat.table_exists("devices") && cat.table_exists("conditions"));
        assert!(cat.hypertable_by_name("devices").is_none());
        assert!(cat.create_table("conditions", vec![]).is_err());
        assert!(cat.create_hypertable("devices", vec![ColumnMeta::new("id", ColumnType::Int32)], "id", 10)
            .is_err());
    }

    #[test]
    fn dimension_interval_updates() {
        let (cat, _, dim) = catalog_with_table();
        cat.update_dimension_interval(dim, 250).unwrap();
        assert_eq!(cat.get_dimension_by_id(dim).unwrap().interval_length, 250);
        assert!(cat.update_dimension_interval(dim, 0).is_err());
        assert!(matches!(cat.get_dimension_by_id(12345), Err(AdaptiveError::DimensionNotFound(_))));
    }
}

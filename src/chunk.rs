//! Chunk 运行时状态（列页存储 + 有序索引 + Chunk 句柄）

use std::sync::{Arc, RwLock};
use crate::common::{AdaptiveError, AttrNumber, ChunkId, ColumnType, HypertableId, Result};
use crate::field_type::{time_value_to_internal, ColumnMeta, Value};
use crate::index::{ChunkIndex, IndexDescriptor, ScanDirection};
use crate::meta::{Dimension, DimensionSlice, Hypercube};
use crate::page::{PageBuilder, PageDecoder};
use crate::range_locator::ChunkRelation;

// ── 单列存储 ──────────────────────────────────────────────────────────────────

struct ColumnStore {
    meta:   ColumnMeta,
    /// 已封页的字节
    sealed: Vec<Vec<u8>>,
    open:   PageBuilder,
}

impl ColumnStore {
    fn new(meta: ColumnMeta) -> Self {
        let open = PageBuilder::new(0, meta.clone());
        Self { meta, sealed: Vec::new(), open }
    }

    /// 封页失败时值留在打开页中，下次追加时重试封页
    fn append(&mut self, value: Value, row_id: u32) -> Result<()> {
        self.open.add(value);
        if self.open.is_full() {
            let bytes = self.open.build()?;
            self.sealed.push(bytes);
            self.open = PageBuilder::new(row_id + 1, self.meta.clone());
        }
        Ok(())
    }

    fn scan(&self, visit: &mut dyn FnMut(&Value) -> Result<()>) -> Result<()> {
        for bytes in &self.sealed {
            let page = PageDecoder::decode(bytes, &self.meta)?;
            for v in &page.values {
                visit(v)?;
            }
        }
        self.open.pending().iter().try_for_each(|v| visit(v))
    }

    /// 已封页字节 + 打开页按当前内容编码后的字节
    fn disk_size(&self) -> Result<u64> {
        let sealed: u64 = self.sealed.iter().map(|p| p.len() as u64).sum();
        let open = if self.open.is_empty() { 0 } else { self.open.build()?.len() as u64 };
        Ok(sealed + open)
    }
}

// ── 分区约束 ──────────────────────────────────────────────────────────────────

/// 开放维度列的内部值须落在 chunk 的 slice 内
#[derive(Debug, Clone, Copy)]
struct RangeConstraint {
    attno:       AttrNumber,
    column_type: ColumnType,
    slice:       DimensionSlice,
}

impl RangeConstraint {
    fn check(&self, row: &[Value], column: &str) -> Result<()> {
        let point = time_value_to_internal(&row[self.attno], self.column_type)?;
        if !self.slice.contains(point) {
            return Err(AdaptiveError::InvalidArgument(format!(
                "value {point} of \"{column}\" is outside chunk range {}", self.slice)));
        }
        Ok(())
    }
}

// ── Chunk 内部状态 ────────────────────────────────────────────────────────────

pub struct ChunkInner {
    pub id:            ChunkId,
    pub hypertable_id: HypertableId,
    pub table_name:    String,
    pub cube:          Hypercube,
    constraint:        Option<RangeConstraint>,
    columns:           Vec<ColumnStore>,
    indexes:           Vec<ChunkIndex>,
    num_rows:          u32,
}

// ── Chunk 句柄 ────────────────────────────────────────────────────────────────

#[derive(Clone)]
pub struct Chunk(Arc<RwLock<ChunkInner>>);

impl Chunk {
    /// `open_dimension` 给出时，该维度的列须存在且 `cube` 中须有它的 slice，
    /// 之后插入的行都受该 slice 约束
    pub fn new(
        id:             ChunkId,
        hypertable_id:  HypertableId,
        columns:        Vec<ColumnMeta>,
        cube:           Hypercube,
        open_dimension: Option<&Dimension>,
    ) -> Result<Self> {
        let constraint = match open_dimension {
            Some(dim) => {
                let attno = columns.iter().position(|c| c.name == dim.column_name)
                    .ok_or_else(|| AdaptiveError::ColumnNotFound(dim.column_name.clone()))?;
                let slice = *cube.slice_by_dimension_id(dim.id)
                    .ok_or(AdaptiveError::DimensionNotFound(dim.id))?;
                Some(RangeConstraint { attno, column_type: dim.column_type, slice })
            }
            None => None,
        };
        let table_name = format!("_hyper_{hypertable_id}_{id}_chunk");
        Ok(Self(Arc::new(RwLock::new(ChunkInner {
            id, hypertable_id, table_name, cube, constraint,
            columns: columns.into_iter().map(ColumnStore::new).collect(),
            indexes: Vec::new(),
            num_rows: 0,
        }))))
    }

    pub fn id(&self) -> ChunkId { self.0.read().unwrap().id }

    pub fn hypertable_id(&self) -> HypertableId { self.0.read().unwrap().hypertable_id }

    pub fn table_name(&self) -> String { self.0.read().unwrap().table_name.clone() }

    pub fn cube(&self) -> Hypercube { self.0.read().unwrap().cube.clone() }

    pub fn num_rows(&self) -> u32 { self.0.read().unwrap().num_rows }

    /// 追加一行，`row` 的长度必须等于列数，值类型须匹配列类型，
    /// 分区列的值须落在 chunk 的区间内。校验全部通过后才写入
    pub fn insert_row(&self, row: Vec<Value>) -> Result<()> {
        let mut inner = self.0.write().unwrap();
        if row.len() != inner.columns.len() {
            return Err(AdaptiveError::SchemaMismatch);
        }
        for (v, col) in row.iter().zip(&inner.columns) {
            if !v.matches_type(col.meta.column_type) {
                return Err(AdaptiveError::TypeMismatch {
                    expected: col.meta.column_type,
                    found:    v.to_string(),
                });
            }
            if v.is_null() && !col.meta.is_nullable {
                return Err(AdaptiveError::InvalidArgument(
                    format!("null value in column \"{}\"", col.meta.name)));
            }
        }
        if let Some(c) = inner.constraint {
            c.check(&row, &inner.columns[c.attno].meta.name)?;
        }

        // 先写列，再写索引：索引只指向列中已存在的行
        let row_id = inner.num_rows;
        for (v, col) in row.iter().zip(inner.columns.iter_mut()) {
            col.append(v.clone(), row_id)?;
        }
        inner.num_rows += 1;
        for idx in inner.indexes.iter_mut() {
            idx.insert(&row, row_id)?;
        }
        Ok(())
    }

    /// 在 `columns` 上建有序索引并回填已有行
    pub fn create_index(&self, name: &str, columns: &[&str]) -> Result<()> {
        let mut inner = self.0.write().unwrap();
        let mut attnos    = Vec::with_capacity(columns.len());
        let mut key_types = Vec::with_capacity(columns.len());
        for col in columns {
            let attno = inner.columns.iter().position(|c| c.meta.name == *col)
                .ok_or_else(|| AdaptiveError::ColumnNotFound((*col).into()))?;
            attnos.push(attno);
            key_types.push(inner.columns[attno].meta.column_type);
        }
        let mut index = ChunkIndex::new(name, attnos, key_types);

        // 回填：按列扫描后转置成行
        let mut by_column: Vec<Vec<Value>> = Vec::with_capacity(inner.columns.len());
        for col in &inner.columns {
            let mut vals = Vec::with_capacity(inner.num_rows as usize);
            col.scan(&mut |v: &Value| { vals.push(v.clone()); Ok(()) })?;
            by_column.push(vals);
        }
        for row_id in 0..inner.num_rows as usize {
            let row: Vec<Value> = by_column.iter()
                .map(|c| c.get(row_id).cloned().unwrap_or(Value::Null))
                .collect();
            index.insert(&row, row_id as u32)?;
        }
        inner.indexes.push(index);
        Ok(())
    }

    /// 物理大小：所有列页 + 所有索引
    pub fn total_relation_size(&self) -> Result<i64> {
        let inner = self.0.read().unwrap();
        let mut bytes = 0u64;
        for col in &inner.columns {
            bytes += col.disk_size()?;
        }
        bytes += inner.indexes.iter().map(ChunkIndex::serialized_size).sum::<u64>();
        i64::try_from(bytes).map_err(|_| AdaptiveError::SegmentIo("relation size overflow".into()))
    }
}

impl ChunkRelation for Chunk {
    fn relation_name(&self) -> String { self.table_name() }

    fn attno(&self, column: &str) -> Option<AttrNumber> {
        self.0.read().unwrap().columns.iter().position(|c| c.meta.name == column)
    }

    fn column_type(&self, attno: AttrNumber) -> Option<ColumnType> {
        self.0.read().unwrap().columns.get(attno).map(|c| c.meta.column_type)
    }

    fn index_list(&self) -> Vec<IndexDescriptor> {
        self.0.read().unwrap().indexes.iter().map(|i| i.descriptor().clone()).collect()
    }

    fn index_endpoint(
        &self,
        index:     &IndexDescriptor,
        direction: ScanDirection,
    ) -> Result<Option<Value>> {
        let inner = self.0.read().unwrap();
        let idx = inner.indexes.iter()
            .find(|i| i.descriptor() == index)
            .ok_or_else(|| AdaptiveError::InvalidArgument(
                format!("index \"{}\" not found on {}", index.name, inner.table_name)))?;
        Ok(idx.first_in(direction).map(|(v, _)| v.clone()))
    }

    fn heap_scan(
        &self,
        attno: AttrNumber,
        visit: &mut dyn FnMut(&Value) -> Result<()>,
    ) -> Result<()> {
        let inner = self.0.read().unwrap();
        let col = inner.columns.get(attno)
            .ok_or_else(|| AdaptiveError::ColumnNotFound(format!("attno {attno}")))?;
        col.scan(visit)
    }
}

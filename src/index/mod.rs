//! Chunk 上的有序索引
//!
//! 等价于 B-tree 的最小实现：条目按首列（其次后续列）的类型比较函数排序，
//! 首/尾条目即为首列的最小/最大值。NULL 键不入索引。

use std::cmp::Ordering;
use crate::common::{AttrNumber, ColumnType, Result};
use crate::field_type::{type_comparator, Value};

/// 扫描方向
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanDirection { Forward, Backward }

/// 索引描述（目录层面可见的部分）
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexDescriptor {
    pub name:    String,
    /// 索引列在关系中的位置，第一个为前导列
    pub columns: Vec<AttrNumber>,
}

impl IndexDescriptor {
    pub fn leading_column(&self) -> Option<AttrNumber> { self.columns.first().copied() }
}

#[derive(Debug, Clone)]
struct IndexEntry {
    key:    Vec<Value>,
    row_id: u32,
}

#[derive(Debug, Clone)]
pub struct ChunkIndex {
    descriptor: IndexDescriptor,
    key_types:  Vec<ColumnType>,
    entries:    Vec<IndexEntry>,
}

impl ChunkIndex {
    pub fn new(name: &str, columns: Vec<AttrNumber>, key_types: Vec<ColumnType>) -> Self {
        Self {
            descriptor: IndexDescriptor { name: name.into(), columns },
            key_types,
            entries: Vec::new(),
        }
    }

    pub fn descriptor(&self) -> &IndexDescriptor { &self.descriptor }
    pub fn len(&self) -> usize { self.entries.len() }
    pub fn is_empty(&self) -> bool { self.entries.is_empty() }

    fn compare_keys(&self, a: &[Value], b: &[Value]) -> Result<Ordering> {
        for ((x, y), ty) in a.iter().zip(b).zip(&self.key_types) {
            let ord = match (x.is_null(), y.is_null()) {
                (true, true)   => Ordering::Equal,
                (true, false)  => Ordering::Greater,
                (false, true)  => Ordering::Less,
                (false, false) => type_comparator(*ty)(x, y)?,
            };
            if ord != Ordering::Equal {
                return Ok(ord);
            }
        }
        Ok(Ordering::Equal)
    }

    /// 插入一行的键；前导列为 NULL 的行不入索引
    pub fn insert(&mut self, row: &[Value], row_id: u32) -> Result<()> {
        let key: Vec<Value> = self.descriptor.columns.iter()
            .map(|&attno| row.get(attno).cloned().unwrap_or(Value::Null))
            .collect();
        if key.first().map_or(true, Value::is_null) {
            return Ok(());
        }

        // 二分找插入点（相同键按 row_id 追加在后）
        let (mut lo, mut hi) = (0usize, self.entries.len());
        while lo < hi {
            let mid = (lo + hi) / 2;
            match self.compare_keys(&self.entries[mid].key, &key)? {
                Ordering::Greater => hi = mid,
                _                 => lo = mid + 1,
            }
        }
        self.entries.insert(lo, IndexEntry { key, row_id });
        Ok(())
    }

    /// 按方向取第一条条目，返回 (前导列值, row_id)；至多一行
    pub fn first_in(&self, direction: ScanDirection) -> Option<(&Value, u32)> {
        let entry = match direction {
            ScanDirection::Forward  => self.entries.first(),
            ScanDirection::Backward => self.entries.last(),
        }?;
        entry.key.first().map(|v| (v, entry.row_id))
    }

    /// 序列化后的字节数，计入 chunk 物理大小
    pub fn serialized_size(&self) -> u64 {
        let entries: u64 = self.entries.iter()
            .map(|e| 4 + e.key.iter().map(key_width).sum::<u64>())
            .sum();
        4 + entries
    }
}

fn key_width(v: &Value) -> u64 {
    match v {
        Value::Null                         => 1,
        Value::Int16(_)                     => 2,
        Value::Int32(_) | Value::Date(_)    => 4,
        Value::Bytes(b)                     => 4 + b.len() as u64,
        _                                   => 8,
    }
}

use std::sync::Arc;

use ahash::AHashMap;
use chdata_common::{Result, error::Error};
use chdata_format::{Column, Value, ValueHolder};
use itertools::Itertools;

/// Column name to position lookup shared by every record of a result.
#[derive(Debug, Clone, Default)]
pub struct ColumnIndex(Arc<AHashMap<String, usize>>);

impl ColumnIndex {
    pub fn new(columns: &[Column]) -> ColumnIndex {
        let mut map = AHashMap::with_capacity(columns.len());
        for (index, column) in columns.iter().enumerate() {
            // The first of several equally named columns wins.
            map.entry(column.name().to_string()).or_insert(index);
        }
        ColumnIndex(Arc::new(map))
    }

    pub fn get(&self, name: &str) -> Option<usize> {
        self.0.get(name).copied()
    }
}

/// One decoded row, addressable by column position or column name.
#[derive(Debug, Clone)]
pub struct Record {
    index: ColumnIndex,
    values: Vec<Value>,
}

impl Record {
    pub fn new(index: ColumnIndex, values: Vec<Value>) -> Record {
        Record { index, values }
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&Value> {
        self.values.get(index)
    }

    pub fn get_by_name(&self, name: &str) -> Option<&Value> {
        self.index.get(name).and_then(|i| self.values.get(i))
    }

    /// Like [`get_by_name`](Self::get_by_name), failing with `InvalidArgument` for an
    /// unknown name.
    pub fn value(&self, name: &str) -> Result<&Value> {
        self.get_by_name(name)
            .ok_or_else(|| Error::invalid_arg("name", format!("unknown column '{name}'")))
    }

    pub fn values(&self) -> &[Value] {
        &self.values
    }

    pub(crate) fn values_mut(&mut self) -> &mut [Value] {
        &mut self.values
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Value> {
        self.values.iter()
    }

    pub fn into_values(self) -> Vec<Value> {
        self.values
    }
}

impl std::ops::Index<usize> for Record {
    type Output = Value;

    fn index(&self, index: usize) -> &Value {
        &self.values[index]
    }
}

impl PartialEq for Record {
    fn eq(&self, other: &Record) -> bool {
        self.values == other.values
    }
}

impl ValueHolder for Record {
    fn reset(&mut self) {
        self.values.reset();
    }

    fn copy(&self) -> Record {
        Record {
            index: self.index.clone(),
            values: self.values.copy(),
        }
    }
}

impl<'a> IntoIterator for &'a Record {
    type Item = &'a Value;
    type IntoIter = std::slice::Iter<'a, Value>;

    fn into_iter(self) -> Self::IntoIter {
        self.values.iter()
    }
}

impl std::fmt::Display for Record {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}]", self.values.iter().map(|v| format!("{v:?}")).join(", "))
    }
}

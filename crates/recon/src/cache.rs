use std::collections::HashMap;

use crate::error::ReconError;
use crate::model::Table;

/// Identity of a loaded table.
///
/// `header_row` is `None` when the header was located by token search, so a
/// pinned read and an auto-located read of the same sheet never collide.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TableKey {
    pub file: String,
    pub sheet: String,
    pub header_row: Option<usize>,
}

impl TableKey {
    pub fn new(file: impl Into<String>, sheet: impl Into<String>, header_row: Option<usize>) -> Self {
        Self {
            file: file.into(),
            sheet: sheet.into(),
            header_row,
        }
    }
}

/// Explicit, caller-owned cache of loaded tables.
///
/// Reads hand out copies: mutating a returned table never affects the cached
/// one or any later read.
#[derive(Debug, Default)]
pub struct TableCache {
    tables: HashMap<TableKey, Table>,
    hits: usize,
    misses: usize,
}

impl TableCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&mut self, key: &TableKey) -> Option<Table> {
        match self.tables.get(key) {
            Some(table) => {
                self.hits += 1;
                Some(table.clone())
            }
            None => {
                self.misses += 1;
                None
            }
        }
    }

    pub fn insert(&mut self, key: TableKey, table: Table) {
        self.tables.insert(key, table);
    }

    /// Return a copy of the cached table, loading and storing it on a miss.
    /// Load errors are returned and nothing is cached.
    pub fn get_or_load<F>(&mut self, key: TableKey, load: F) -> Result<Table, ReconError>
    where
        F: FnOnce() -> Result<Table, ReconError>,
    {
        if let Some(table) = self.get(&key) {
            log::trace!("cache hit: {}!{}", key.file, key.sheet);
            return Ok(table);
        }
        let table = load()?;
        self.tables.insert(key, table.clone());
        Ok(table)
    }

    pub fn evict(&mut self, key: &TableKey) -> bool {
        self.tables.remove(key).is_some()
    }

    /// Drop every table read from `file`. Returns how many were removed.
    pub fn evict_file(&mut self, file: &str) -> usize {
        let before = self.tables.len();
        self.tables.retain(|k, _| k.file != file);
        before - self.tables.len()
    }

    pub fn clear(&mut self) {
        self.tables.clear();
    }

    pub fn len(&self) -> usize {
        self.tables.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tables.is_empty()
    }

    /// (hits, misses) since creation.
    pub fn stats(&self) -> (usize, usize) {
        (self.hits, self.misses)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Cell, RawGrid};

    fn table(value: &str) -> Table {
        Table::from_grid(
            "14",
            RawGrid::new(vec![vec![Cell::text("HORA DE SALIDA")], vec![Cell::text(value)]]),
            0,
        )
    }

    #[test]
    fn reads_are_copies() {
        let mut cache = TableCache::new();
        let key = TableKey::new("SALIDA_2025_05.xlsx", "14", None);
        cache.insert(key.clone(), table("14:05"));

        let mut first = cache.get(&key).unwrap();
        first.set(0, 0, Cell::text("changed"));

        let second = cache.get(&key).unwrap();
        assert_eq!(second.get(0, 0), &Cell::text("14:05"));
    }

    #[test]
    fn loads_once() {
        let mut cache = TableCache::new();
        let key = TableKey::new("f.xlsx", "14", None);
        let mut loads = 0;
        for _ in 0..3 {
            cache
                .get_or_load(key.clone(), || {
                    loads += 1;
                    Ok(table("08:00"))
                })
                .unwrap();
        }
        assert_eq!(loads, 1);
        assert_eq!(cache.stats(), (2, 1));
    }

    #[test]
    fn failed_loads_are_not_cached() {
        let mut cache = TableCache::new();
        let key = TableKey::new("f.xlsx", "14", None);
        let err = cache.get_or_load(key.clone(), || Err(ReconError::InvalidDate("x".into())));
        assert!(err.is_err());
        assert!(cache.is_empty());
    }

    #[test]
    fn header_row_is_part_of_the_key() {
        let mut cache = TableCache::new();
        cache.insert(TableKey::new("f.xlsx", "14", None), table("a"));
        assert!(cache.get(&TableKey::new("f.xlsx", "14", Some(0))).is_none());
    }

    #[test]
    fn eviction() {
        let mut cache = TableCache::new();
        cache.insert(TableKey::new("a.xlsx", "01", None), table("a"));
        cache.insert(TableKey::new("a.xlsx", "02", None), table("b"));
        cache.insert(TableKey::new("b.xlsx", "01", None), table("c"));

        assert!(cache.evict(&TableKey::new("b.xlsx", "01", None)));
        assert!(!cache.evict(&TableKey::new("b.xlsx", "01", None)));
        assert_eq!(cache.evict_file("a.xlsx"), 2);
        assert!(cache.is_empty());

        cache.insert(TableKey::new("a.xlsx", "01", None), table("a"));
        cache.clear();
        assert_eq!(cache.len(), 0);
    }
}

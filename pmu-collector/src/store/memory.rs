// PMU Collector - Ingest, analysis and persistence service
// Copyright (c) 2025 David Martin Venti
//
// Dual-licensed under AGPL-3.0 and Commercial License.
// See LICENSE file for details.

//! In-process measurement store

use super::{poisoned, MeasurementStore, RowLayout};
use crate::error::Result;
use crate::migration::{Migrator, SchemaChange, SchemaState, SchemaTarget};
use pmu::MeasurementRecord;
use std::sync::Mutex;

#[derive(Debug, Default)]
struct Inner {
    schema: SchemaState,
    rows: Vec<MeasurementRecord>,
}

/// Store keeping rows in memory
#[derive(Debug, Default)]
pub struct MemoryStore {
    inner: Mutex<Inner>,
}

impl MemoryStore {
    /// Empty store with no schema
    pub fn new() -> Self {
        Self::default()
    }

    /// Empty store with the measurement schema applied
    pub fn migrated() -> Result<Self> {
        let mut store = Self::new();
        Migrator::new().run(&mut store)?;
        Ok(store)
    }

    /// Copy of the stored rows
    pub fn rows(&self) -> Vec<MeasurementRecord> {
        self.inner
            .lock()
            .map(|inner| inner.rows.clone())
            .unwrap_or_default()
    }

    /// Number of stored rows
    pub fn len(&self) -> usize {
        self.inner.lock().map(|inner| inner.rows.len()).unwrap_or(0)
    }

    /// True when no row is stored
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Copy of the current schema
    pub fn schema(&self) -> Result<SchemaState> {
        Ok(self.inner.lock().map_err(poisoned)?.schema.clone())
    }
}

impl MeasurementStore for MemoryStore {
    fn name(&self) -> &'static str {
        "memory"
    }

    fn append(&self, records: &[MeasurementRecord]) -> Result<usize> {
        let mut inner = self.inner.lock().map_err(poisoned)?;
        let layout = RowLayout::from_schema(&inner.schema)?;
        for record in records {
            layout.row(record)?;
        }
        inner.rows.extend_from_slice(records);
        Ok(records.len())
    }
}

impl SchemaTarget for MemoryStore {
    fn current_version(&self) -> Result<u32> {
        Ok(self.inner.lock().map_err(poisoned)?.schema.version)
    }

    fn apply(&mut self, change: &SchemaChange) -> Result<()> {
        self.inner.get_mut().map_err(poisoned)?.schema.apply_change(change)
    }

    fn record_version(&mut self, version: u32) -> Result<()> {
        self.inner.get_mut().map_err(poisoned)?.schema.version = version;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::CollectorError;
    use pmu::{Sample, Series};

    fn records() -> Vec<MeasurementRecord> {
        let series: Series = vec![
            Sample::voltage(100, 4_577_000, 1_000),
            Sample::current(-20, -915_400, 1_500),
        ]
        .into();
        series.to_records()
    }

    #[test]
    fn test_append_to_migrated_store() {
        let store = MemoryStore::migrated().unwrap();
        assert_eq!(store.append(&records()).unwrap(), 2);
        assert_eq!(store.len(), 2);
        assert_eq!(store.rows()[1].sample_kind, "current");
    }

    #[test]
    fn test_append_before_migration_fails() {
        let store = MemoryStore::new();
        let err = store.append(&records()).unwrap_err();
        assert!(matches!(err, CollectorError::Persistence(_)));
        assert!(store.is_empty());
    }

    #[test]
    fn test_bad_row_rejects_whole_write() {
        let store = MemoryStore::migrated().unwrap();
        let mut rows = records();
        rows[1].sample_kind = "power".into();
        assert!(store.append(&rows).is_err());
        assert!(store.is_empty());
    }

    #[test]
    fn test_migrated_version() {
        let store = MemoryStore::migrated().unwrap();
        assert_eq!(store.current_version().unwrap(), 8);
        assert_eq!(store.schema().unwrap().version, 8);
    }
}

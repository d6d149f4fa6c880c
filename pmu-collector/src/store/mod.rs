// PMU Collector - Ingest, analysis and persistence service
// Copyright (c) 2025 David Martin Venti
//
// Dual-licensed under AGPL-3.0 and Commercial License.
// See LICENSE file for details.

//! Append-only measurement storage
//!
//! A store accepts a whole batch of [`MeasurementRecord`]s as one bulk
//! write. Rows are laid out after the migrated schema of the `pmu` table,
//! so a store whose schema does not yet carry every needed column refuses
//! the write instead of guessing.

mod csv;
mod memory;

pub use self::csv::CsvStore;
pub use self::memory::MemoryStore;

use crate::config::CollectorConfig;
use crate::error::{CollectorError, Result};
use crate::migration::{ColumnKind, SchemaState, MEASUREMENT_TABLE};
use pmu::MeasurementRecord;
use std::sync::{Arc, PoisonError};

/// Columns every measurement row needs
pub const ROW_COLUMNS: [&str; 4] = ["epoch_nano", "sample_kind", "raw_sample", "nano_volts"];

/// Sink for decoded measurement rows
pub trait MeasurementStore: Send + Sync {
    /// Short name used in logs
    fn name(&self) -> &'static str;

    /// Append all rows as one write, returning how many were stored
    ///
    /// Either every row is stored or none is.
    fn append(&self, records: &[MeasurementRecord]) -> Result<usize>;
}

/// Open the store selected by `config`, migrating its schema
pub fn open_store(config: &CollectorConfig) -> Result<Arc<dyn MeasurementStore>> {
    match &config.data_dir {
        Some(dir) => Ok(Arc::new(CsvStore::open(dir)?)),
        None => Ok(Arc::new(MemoryStore::migrated()?)),
    }
}

/// Column order and value mapping of the measurement table
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RowLayout {
    columns: Vec<String>,
    sample_kinds: Vec<String>,
}

impl RowLayout {
    /// Derive the layout from a schema snapshot
    pub fn from_schema(schema: &SchemaState) -> Result<Self> {
        let table = schema.table(MEASUREMENT_TABLE).ok_or_else(|| {
            CollectorError::Persistence(format!("table {} does not exist", MEASUREMENT_TABLE))
        })?;

        for needed in ROW_COLUMNS {
            if table.column(needed).is_none() {
                return Err(CollectorError::Persistence(format!(
                    "table {} has no column {} (schema version {})",
                    MEASUREMENT_TABLE, needed, schema.version
                )));
            }
        }

        let sample_kinds = match table.column("sample_kind").map(|c| &c.kind) {
            Some(ColumnKind::Enum(name)) => schema
                .enum_variants(name)
                .map(<[String]>::to_vec)
                .unwrap_or_default(),
            _ => Vec::new(),
        };

        Ok(Self {
            columns: table.column_names().into_iter().map(String::from).collect(),
            sample_kinds,
        })
    }

    /// Column names in table order
    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    /// Values of one record in table order
    pub fn row(&self, record: &MeasurementRecord) -> Result<Vec<String>> {
        self.columns
            .iter()
            .map(|column| match column.as_str() {
                "epoch_nano" => Ok(record.epoch_nano.to_string()),
                "raw_sample" => Ok(record.raw_sample.to_string()),
                "nano_volts" => Ok(record.nano_volts.to_string()),
                "sample_kind" => {
                    if self.sample_kinds.iter().any(|k| *k == record.sample_kind) {
                        Ok(record.sample_kind.clone())
                    } else {
                        Err(CollectorError::Persistence(format!(
                            "invalid sample kind {:?}",
                            record.sample_kind
                        )))
                    }
                }
                other => Err(CollectorError::Persistence(format!(
                    "no value for column {}",
                    other
                ))),
            })
            .collect()
    }
}

pub(crate) fn poisoned<T>(_: PoisonError<T>) -> CollectorError {
    CollectorError::Persistence("store lock poisoned".to_string())
}

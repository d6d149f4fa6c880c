// PMU Collector - Ingest, analysis and persistence service
// Copyright (c) 2025 David Martin Venti
//
// Dual-licensed under AGPL-3.0 and Commercial License.
// See LICENSE file for details.

//! On-disk measurement store
//!
//! Layout of the data directory:
//!
//! ```text
//! <data_dir>/
//!   schema.json   schema snapshot and ledger version
//!   pmu.csv       one row per sample, header in table column order
//! ```

use super::{poisoned, MeasurementStore, RowLayout};
use crate::error::{CollectorError, Result};
use crate::migration::{Migrator, SchemaChange, SchemaState, SchemaTarget};
use ::csv::{ReaderBuilder, WriterBuilder};
use pmu::MeasurementRecord;
use std::fs::{self, File, OpenOptions};
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

const SCHEMA_FILE: &str = "schema.json";
const ROWS_FILE: &str = "pmu.csv";

/// Store appending rows to a CSV file
#[derive(Debug)]
pub struct CsvStore {
    dir: PathBuf,
    schema: Mutex<SchemaState>,
}

impl CsvStore {
    /// Open (or create) a store in `dir` and bring its schema up to date
    ///
    /// # Errors
    ///
    /// Fails when the directory cannot be created, a migration step fails,
    /// or an existing `pmu.csv` header does not match the migrated columns.
    pub fn open(dir: impl AsRef<Path>) -> Result<Self> {
        let dir = dir.as_ref().to_path_buf();
        fs::create_dir_all(&dir)?;

        let schema_path = dir.join(SCHEMA_FILE);
        let schema = if schema_path.exists() {
            serde_json::from_reader(File::open(&schema_path)?)?
        } else {
            SchemaState::default()
        };

        let mut store = Self {
            dir,
            schema: Mutex::new(schema),
        };
        let report = Migrator::new().run(&mut store)?;
        tracing::info!(
            dir = %store.dir.display(),
            from = report.from,
            to = report.to,
            "CSV store ready"
        );

        store.check_header()?;
        Ok(store)
    }

    /// Path of the rows file
    pub fn rows_path(&self) -> PathBuf {
        self.dir.join(ROWS_FILE)
    }

    /// Path of the schema snapshot
    pub fn schema_path(&self) -> PathBuf {
        self.dir.join(SCHEMA_FILE)
    }

    /// Read back every stored row
    pub fn read_rows(&self) -> Result<Vec<MeasurementRecord>> {
        let path = self.rows_path();
        if !path.exists() {
            return Ok(Vec::new());
        }
        let mut reader = ReaderBuilder::new().has_headers(true).from_path(path)?;
        let rows = reader
            .deserialize::<MeasurementRecord>()
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    fn check_header(&self) -> Result<()> {
        let path = self.rows_path();
        if !path.exists() || fs::metadata(&path)?.len() == 0 {
            return Ok(());
        }

        let layout = RowLayout::from_schema(&*self.schema.lock().map_err(poisoned)?)?;
        let mut reader = ReaderBuilder::new().has_headers(true).from_path(&path)?;
        let header: Vec<String> = reader.headers()?.iter().map(String::from).collect();
        if header != layout.columns() {
            return Err(CollectorError::Schema(format!(
                "{} has columns {:?}, expected {:?}",
                path.display(),
                header,
                layout.columns()
            )));
        }
        Ok(())
    }

    fn save_schema(&self, schema: &SchemaState) -> Result<()> {
        let tmp = self.dir.join(format!("{}.tmp", SCHEMA_FILE));
        serde_json::to_writer_pretty(BufWriter::new(File::create(&tmp)?), schema)?;
        fs::rename(&tmp, self.schema_path())?;
        Ok(())
    }
}

impl MeasurementStore for CsvStore {
    fn name(&self) -> &'static str {
        "csv"
    }

    fn append(&self, records: &[MeasurementRecord]) -> Result<usize> {
        let schema = self.schema.lock().map_err(poisoned)?;
        let layout = RowLayout::from_schema(&schema)?;
        let rows = records
            .iter()
            .map(|record| layout.row(record))
            .collect::<Result<Vec<_>>>()?;

        let path = self.rows_path();
        let mut file = OpenOptions::new().create(true).append(true).open(&path)?;
        let original_len = file.metadata()?.len();
        let bytes = encode_rows(&layout, original_len == 0, &rows)?;

        write_or_rollback(&mut file, &bytes, |file| file.set_len(original_len))?;
        Ok(rows.len())
    }
}

/// Encode the rows (and the header when `header` is set) into one buffer
fn encode_rows(layout: &RowLayout, header: bool, rows: &[Vec<String>]) -> Result<Vec<u8>> {
    let mut writer = WriterBuilder::new()
        .has_headers(false)
        .from_writer(Vec::new());
    if header {
        writer.write_record(layout.columns())?;
    }
    for row in rows {
        writer.write_record(row)?;
    }
    writer
        .into_inner()
        .map_err(|e| CollectorError::Persistence(e.to_string()))
}

/// Write `bytes` in full, or undo whatever part of them reached `out`
fn write_or_rollback<W, F>(out: &mut W, bytes: &[u8], rollback: F) -> io::Result<()>
where
    W: Write,
    F: FnOnce(&mut W) -> io::Result<()>,
{
    let Err(err) = out.write_all(bytes).and_then(|()| out.flush()) else {
        return Ok(());
    };
    if let Err(undo) = rollback(out) {
        tracing::error!(error = %undo, "failed to roll back partial CSV append");
    }
    Err(err)
}

impl SchemaTarget for CsvStore {
    fn current_version(&self) -> Result<u32> {
        Ok(self.schema.lock().map_err(poisoned)?.version)
    }

    fn apply(&mut self, change: &SchemaChange) -> Result<()> {
        self.schema.get_mut().map_err(poisoned)?.apply_change(change)
    }

    fn record_version(&mut self, version: u32) -> Result<()> {
        let schema = self.schema.get_mut().map_err(poisoned)?;
        schema.version = version;
        let snapshot = schema.clone();
        self.save_schema(&snapshot)
    }
}

// PMU Collector - Ingest, analysis and persistence service
// Copyright (c) 2025 David Martin Venti
//
// Dual-licensed under AGPL-3.0 and Commercial License.
// See LICENSE file for details.

//! Versioned schema ledger
//!
//! The measurement table grows through a fixed, ordered list of typed
//! [`SchemaChange`]s. [`Migrator::run`] applies every change newer than the
//! target's recorded version, recording each version right after its change
//! succeeds, so running it again is a no-op.
//!
//! ```rust
//! use pmu_collector::migration::{Migrator, SchemaState};
//!
//! let mut schema = SchemaState::default();
//! let first = Migrator::new().run(&mut schema).unwrap();
//! let second = Migrator::new().run(&mut schema).unwrap();
//! assert_eq!(first.applied.len(), 8);
//! assert!(second.applied.is_empty());
//! ```

use crate::error::{CollectorError, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Name of the measurement table
pub const MEASUREMENT_TABLE: &str = "pmu";

/// Name of the sample kind enumeration
pub const SAMPLE_KIND_ENUM: &str = "measurement_sample_kind";

/// Column type as written in the ledger
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnType {
    /// 32-bit integer
    Int,
    /// 64-bit integer
    BigInt,
    /// Value of a named enumeration
    Enum(&'static str),
}

/// Column as written in the ledger
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ColumnSpec {
    /// Column name
    pub name: &'static str,
    /// Column type
    pub ty: ColumnType,
}

impl ColumnSpec {
    const fn new(name: &'static str, ty: ColumnType) -> Self {
        Self { name, ty }
    }
}

/// One structural change to the schema
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchemaChange {
    /// Create a table unless it already exists
    CreateTable {
        table: &'static str,
        columns: &'static [ColumnSpec],
    },
    /// Create an index unless one with this name exists
    CreateIndex {
        name: &'static str,
        table: &'static str,
        column: &'static str,
    },
    /// Create an enumeration type
    CreateEnum {
        name: &'static str,
        variants: &'static [&'static str],
    },
    /// Add a column to a table
    AddColumn {
        table: &'static str,
        column: ColumnSpec,
    },
    /// Remove a column from a table
    DropColumn {
        table: &'static str,
        column: &'static str,
    },
}

impl fmt::Display for SchemaChange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::CreateTable { table, columns } => {
                write!(f, "create table {} ({} columns)", table, columns.len())
            }
            Self::CreateIndex {
                name,
                table,
                column,
            } => write!(f, "create index {} on {}({})", name, table, column),
            Self::CreateEnum { name, variants } => {
                write!(f, "create enum {} {:?}", name, variants)
            }
            Self::AddColumn { table, column } => {
                write!(f, "add column {}.{} {:?}", table, column.name, column.ty)
            }
            Self::DropColumn { table, column } => write!(f, "drop column {}.{}", table, column),
        }
    }
}

/// A numbered ledger entry
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Migration {
    /// Version reached once the change is applied (1-based, contiguous)
    pub version: u32,
    /// Structural change
    pub change: SchemaChange,
}

/// The measurement schema ledger, oldest first
pub const MIGRATIONS: &[Migration] = &[
    Migration {
        version: 1,
        change: SchemaChange::CreateTable {
            table: MEASUREMENT_TABLE,
            columns: &[
                ColumnSpec::new("voltage", ColumnType::Int),
                ColumnSpec::new("current", ColumnType::Int),
                ColumnSpec::new("epoch_nano", ColumnType::BigInt),
            ],
        },
    },
    Migration {
        version: 2,
        change: SchemaChange::CreateIndex {
            name: "idx_epoch_nano",
            table: MEASUREMENT_TABLE,
            column: "epoch_nano",
        },
    },
    Migration {
        version: 3,
        change: SchemaChange::DropColumn {
            table: MEASUREMENT_TABLE,
            column: "current",
        },
    },
    Migration {
        version: 4,
        change: SchemaChange::CreateEnum {
            name: SAMPLE_KIND_ENUM,
            variants: &["current", "voltage"],
        },
    },
    Migration {
        version: 5,
        change: SchemaChange::AddColumn {
            table: MEASUREMENT_TABLE,
            column: ColumnSpec::new("sample_kind", ColumnType::Enum(SAMPLE_KIND_ENUM)),
        },
    },
    Migration {
        version: 6,
        change: SchemaChange::AddColumn {
            table: MEASUREMENT_TABLE,
            column: ColumnSpec::new("raw_sample", ColumnType::BigInt),
        },
    },
    Migration {
        version: 7,
        change: SchemaChange::DropColumn {
            table: MEASUREMENT_TABLE,
            column: "voltage",
        },
    },
    Migration {
        version: 8,
        change: SchemaChange::AddColumn {
            table: MEASUREMENT_TABLE,
            column: ColumnSpec::new("nano_volts", ColumnType::BigInt),
        },
    },
];

/// Something a ledger can be applied to
pub trait SchemaTarget {
    /// Last recorded version, 0 when nothing was applied yet
    fn current_version(&self) -> Result<u32>;

    /// Apply one change
    fn apply(&mut self, change: &SchemaChange) -> Result<()>;

    /// Persist `version` as applied
    fn record_version(&mut self, version: u32) -> Result<()>;
}

/// Versions applied by one [`Migrator::run`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MigrationReport {
    /// Version found before running
    pub from: u32,
    /// Version reached
    pub to: u32,
    /// Versions applied in this run
    pub applied: Vec<u32>,
}

/// Applies a ledger in order
#[derive(Debug, Clone, Copy)]
pub struct Migrator {
    migrations: &'static [Migration],
}

impl Default for Migrator {
    fn default() -> Self {
        Self::new()
    }
}

impl Migrator {
    /// Migrator for the measurement schema
    pub fn new() -> Self {
        Self::with_migrations(MIGRATIONS)
    }

    /// Migrator for a custom ledger
    pub fn with_migrations(migrations: &'static [Migration]) -> Self {
        Self { migrations }
    }

    /// Highest version in the ledger
    pub fn latest_version(&self) -> u32 {
        self.migrations.iter().map(|m| m.version).max().unwrap_or(0)
    }

    /// Bring `target` up to the latest version
    ///
    /// Stops at the first gap in the ledger's version numbers.
    pub fn run<T: SchemaTarget + ?Sized>(&self, target: &mut T) -> Result<MigrationReport> {
        let from = target.current_version()?;
        tracing::info!(version = from, "loaded schema version");

        let mut applied = Vec::new();
        let mut version = from;
        for next in 1.. {
            let Some(migration) = self.migrations.iter().find(|m| m.version == next) else {
                tracing::debug!(stopped_at = next - 1, "end of ledger");
                break;
            };
            if next <= from {
                continue;
            }

            target
                .apply(&migration.change)
                .map_err(|err| CollectorError::Migration {
                    version: next,
                    reason: err.to_string(),
                })?;
            target.record_version(next)?;
            tracing::info!(version = next, change = %migration.change, "schema migrated");

            applied.push(next);
            version = next;
        }

        Ok(MigrationReport {
            from,
            to: version,
            applied,
        })
    }
}

/// Column type as stored in a schema snapshot
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ColumnKind {
    /// 32-bit integer
    Int,
    /// 64-bit integer
    BigInt,
    /// Value of a named enumeration
    Enum(String),
}

impl From<ColumnType> for ColumnKind {
    fn from(ty: ColumnType) -> Self {
        match ty {
            ColumnType::Int => Self::Int,
            ColumnType::BigInt => Self::BigInt,
            ColumnType::Enum(name) => Self::Enum(name.to_string()),
        }
    }
}

/// A column of a table snapshot
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnDef {
    /// Column name
    pub name: String,
    /// Column type
    pub kind: ColumnKind,
}

/// Table snapshot
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableSchema {
    /// Columns in creation order
    pub columns: Vec<ColumnDef>,
    /// Index name to indexed column
    pub indexes: BTreeMap<String, String>,
}

impl TableSchema {
    /// Column names in order
    pub fn column_names(&self) -> Vec<&str> {
        self.columns.iter().map(|c| c.name.as_str()).collect()
    }

    /// Look up a column
    pub fn column(&self, name: &str) -> Option<&ColumnDef> {
        self.columns.iter().find(|c| c.name == name)
    }
}

/// Snapshot of a schema and its ledger version
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchemaState {
    /// Last applied ledger version
    pub version: u32,
    /// Tables by name
    pub tables: BTreeMap<String, TableSchema>,
    /// Enumerations by name
    pub enums: BTreeMap<String, Vec<String>>,
}

impl SchemaState {
    /// Look up a table
    pub fn table(&self, name: &str) -> Option<&TableSchema> {
        self.tables.get(name)
    }

    /// Variants of an enumeration
    pub fn enum_variants(&self, name: &str) -> Option<&[String]> {
        self.enums.get(name).map(Vec::as_slice)
    }

    /// Apply a change to the snapshot
    pub fn apply_change(&mut self, change: &SchemaChange) -> Result<()> {
        match *change {
            SchemaChange::CreateTable { table, columns } => {
                if self.tables.contains_key(table) {
                    return Ok(());
                }
                let mut schema = TableSchema::default();
                for column in columns {
                    self.check_type(column.ty)?;
                    schema.columns.push(ColumnDef {
                        name: column.name.to_string(),
                        kind: column.ty.into(),
                    });
                }
                self.tables.insert(table.to_string(), schema);
            }
            SchemaChange::CreateIndex {
                name,
                table,
                column,
            } => {
                let schema = self.table_mut(table)?;
                if schema.indexes.contains_key(name) {
                    return Ok(());
                }
                if schema.column(column).is_none() {
                    return Err(schema_error(format!("column {}.{} does not exist", table, column)));
                }
                schema.indexes.insert(name.to_string(), column.to_string());
            }
            SchemaChange::CreateEnum { name, variants } => {
                if self.enums.contains_key(name) {
                    return Err(schema_error(format!("type {} already exists", name)));
                }
                self.enums
                    .insert(name.to_string(), variants.iter().map(|v| v.to_string()).collect());
            }
            SchemaChange::AddColumn { table, column } => {
                self.check_type(column.ty)?;
                let schema = self.table_mut(table)?;
                if schema.column(column.name).is_some() {
                    return Err(schema_error(format!(
                        "column {}.{} already exists",
                        table, column.name
                    )));
                }
                schema.columns.push(ColumnDef {
                    name: column.name.to_string(),
                    kind: column.ty.into(),
                });
            }
            SchemaChange::DropColumn { table, column } => {
                let schema = self.table_mut(table)?;
                let before = schema.columns.len();
                schema.columns.retain(|c| c.name != column);
                if schema.columns.len() == before {
                    return Err(schema_error(format!("column {}.{} does not exist", table, column)));
                }
                schema.indexes.retain(|_, indexed| indexed != column);
            }
        }
        Ok(())
    }

    fn table_mut(&mut self, table: &str) -> Result<&mut TableSchema> {
        self.tables
            .get_mut(table)
            .ok_or_else(|| schema_error(format!("table {} does not exist", table)))
    }

    fn check_type(&self, ty: ColumnType) -> Result<()> {
        match ty {
            ColumnType::Enum(name) if !self.enums.contains_key(name) => {
                Err(schema_error(format!("type {} does not exist", name)))
            }
            _ => Ok(()),
        }
    }
}

impl SchemaTarget for SchemaState {
    fn current_version(&self) -> Result<u32> {
        Ok(self.version)
    }

    fn apply(&mut self, change: &SchemaChange) -> Result<()> {
        self.apply_change(change)
    }

    fn record_version(&mut self, version: u32) -> Result<()> {
        self.version = version;
        Ok(())
    }
}

fn schema_error(message: String) -> CollectorError {
    CollectorError::Schema(message)
}

//! CSV ingestion - bulk load of a flat file into a SQLite table
//!
//! One load fully replaces the target table: DROP + CREATE + INSERT inside a
//! single transaction, so readers see either the old table or the new one.
//! Missing cells are normalized to the literal value zero before storage.

use crate::error::{ChatSqlError, Result};
use rusqlite::{types::Value, Connection};
use std::fmt;
use std::path::Path;
use tracing::info;

/// Storage type inferred for a column from its non-empty values.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnType {
    Integer,
    Real,
    Text,
}

impl ColumnType {
    fn sql_type(&self) -> &'static str {
        match self {
            ColumnType::Integer => "INTEGER",
            ColumnType::Real => "REAL",
            ColumnType::Text => "TEXT",
        }
    }

    /// The zero value used for missing cells of this type.
    fn zero(&self) -> Value {
        match self {
            ColumnType::Integer => Value::Integer(0),
            ColumnType::Real => Value::Real(0.0),
            ColumnType::Text => Value::Text("0".to_string()),
        }
    }
}

impl fmt::Display for ColumnType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.sql_type())
    }
}

/// An in-memory tabular dataset, as read from a CSV file.
///
/// Rows keep the raw cell strings; empty strings mark missing values and are
/// normalized at write time.
#[derive(Debug, Clone)]
pub struct Dataset {
    pub columns: Vec<String>,
    pub types: Vec<ColumnType>,
    pub rows: Vec<Vec<String>>,
}

impl Dataset {
    pub fn row_count(&self) -> usize {
        self.rows.len()
    }
}

/// Read a headered CSV file into a `Dataset`, inferring a storage type for
/// every column.
pub fn read_csv(path: &Path) -> Result<Dataset> {
    let file = std::fs::File::open(path)?;
    let mut rdr = csv::ReaderBuilder::new().from_reader(file);

    let columns = rdr
        .headers()
        .map_err(|e| ChatSqlError::Parse(format!("Failed to read CSV header: {}", e)))?
        .iter()
        .map(|s| s.to_string())
        .collect::<Vec<_>>();

    if columns.is_empty() {
        return Err(ChatSqlError::Parse(format!(
            "CSV file has no header row: {}",
            path.display()
        )));
    }

    let mut rows: Vec<Vec<String>> = Vec::new();
    for rec in rdr.records() {
        let rec = rec.map_err(|e| ChatSqlError::Parse(format!("Failed to read CSV row: {}", e)))?;
        rows.push(rec.iter().map(|s| s.to_string()).collect());
    }

    let types = infer_column_types(&columns, &rows);
    Ok(Dataset {
        columns,
        types,
        rows,
    })
}

/// Infer a type per column: INTEGER if every non-empty value parses as i64,
/// REAL if every non-empty value parses as f64, TEXT otherwise. Columns with
/// no non-empty values default to INTEGER so their zero-fill stays numeric.
fn infer_column_types(columns: &[String], rows: &[Vec<String>]) -> Vec<ColumnType> {
    (0..columns.len())
        .map(|i| {
            let mut saw_value = false;
            let mut all_int = true;
            let mut all_real = true;
            for row in rows {
                let cell = row.get(i).map(|s| s.trim()).unwrap_or("");
                if cell.is_empty() {
                    continue;
                }
                saw_value = true;
                if all_int && cell.parse::<i64>().is_err() {
                    all_int = false;
                }
                if all_real && cell.parse::<f64>().is_err() {
                    all_real = false;
                }
                if !all_real {
                    break;
                }
            }
            if !saw_value || all_int {
                ColumnType::Integer
            } else if all_real {
                ColumnType::Real
            } else {
                ColumnType::Text
            }
        })
        .collect()
}

/// Convert one cell to its stored value. Empty cells become the column's
/// zero; everything else is stored according to the column type.
fn cell_value(cell: &str, ty: ColumnType) -> Value {
    let trimmed = cell.trim();
    if trimmed.is_empty() {
        return ty.zero();
    }
    match ty {
        ColumnType::Integer => trimmed
            .parse::<i64>()
            .map(Value::Integer)
            .unwrap_or_else(|_| Value::Text(trimmed.to_string())),
        ColumnType::Real => trimmed
            .parse::<f64>()
            .map(Value::Real)
            .unwrap_or_else(|_| Value::Text(trimmed.to_string())),
        ColumnType::Text => Value::Text(cell.to_string()),
    }
}

fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

/// Replace `table` with the dataset's contents. DROP + CREATE + INSERT run in
/// one transaction; on failure the previous table is left untouched. Returns
/// the number of rows written.
pub fn replace_table(conn: &mut Connection, table: &str, dataset: &Dataset) -> Result<usize> {
    let tx = conn.transaction()?;

    tx.execute_batch(&format!("DROP TABLE IF EXISTS {}", quote_ident(table)))
        .map_err(|e| ChatSqlError::Schema(format!("Failed to drop table '{}': {}", table, e)))?;

    let col_defs = dataset
        .columns
        .iter()
        .zip(&dataset.types)
        .map(|(name, ty)| format!("{} {}", quote_ident(name), ty.sql_type()))
        .collect::<Vec<_>>()
        .join(", ");
    tx.execute_batch(&format!(
        "CREATE TABLE {} ({})",
        quote_ident(table),
        col_defs
    ))
    .map_err(|e| ChatSqlError::Schema(format!("Failed to create table '{}': {}", table, e)))?;

    let placeholders = (1..=dataset.columns.len())
        .map(|i| format!("?{}", i))
        .collect::<Vec<_>>()
        .join(", ");
    let insert_sql = format!(
        "INSERT INTO {} VALUES ({})",
        quote_ident(table),
        placeholders
    );

    {
        let mut stmt = tx.prepare(&insert_sql)?;
        for (row_idx, row) in dataset.rows.iter().enumerate() {
            if row.len() != dataset.columns.len() {
                return Err(ChatSqlError::Parse(format!(
                    "Row {} has {} cells, expected {}",
                    row_idx + 1,
                    row.len(),
                    dataset.columns.len()
                )));
            }
            let values: Vec<Value> = row
                .iter()
                .zip(&dataset.types)
                .map(|(cell, ty)| cell_value(cell, *ty))
                .collect();
            stmt.execute(rusqlite::params_from_iter(values))?;
        }
    }

    tx.commit()?;
    Ok(dataset.row_count())
}

/// Load a CSV file into `table`, replacing any prior contents.
pub fn ingest_csv(conn: &mut Connection, table: &str, path: &Path) -> Result<usize> {
    let dataset = read_csv(path)?;
    let rows = replace_table(conn, table, &dataset)?;
    info!(
        "Loaded {} rows x {} columns from {} into table '{}'",
        rows,
        dataset.columns.len(),
        path.display(),
        table
    );
    Ok(rows)
}

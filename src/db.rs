//! SQLite toolkit - the fixed capability set exposed to the agent
//!
//! Three typed operations: list tables, describe a table, run a read-only
//! query. The agent never touches the connection directly, and `run_query`
//! refuses anything the read-only guard rejects.

use crate::error::{ChatSqlError, Result};
use crate::guard::ensure_read_only;
use rusqlite::types::ValueRef;
use rusqlite::Connection;
use std::fmt::Write as _;
use std::sync::Mutex;
use tracing::{debug, info};

/// Schema description of one table.
#[derive(Debug, Clone)]
pub struct TableInfo {
    pub name: String,
    pub columns: Vec<ColumnInfo>,
    pub sample_rows: Vec<Vec<String>>,
}

#[derive(Debug, Clone)]
pub struct ColumnInfo {
    pub name: String,
    pub data_type: String,
}

/// Result of one read-only query, values rendered to strings.
#[derive(Debug, Clone)]
pub struct QueryResult {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<String>>,
    /// True if the row cap cut the result off.
    pub truncated: bool,
}

impl QueryResult {
    /// Render as the observation text shown to the model: column names, then
    /// one tuple per row.
    pub fn render(&self) -> String {
        let mut out = String::new();
        let _ = writeln!(out, "columns: {}", self.columns.join(", "));
        if self.rows.is_empty() {
            out.push_str("(no rows)");
            return out;
        }
        for row in &self.rows {
            let _ = writeln!(out, "({})", row.join(", "));
        }
        if self.truncated {
            out.push_str("... (result truncated by row cap)");
        }
        out.trim_end().to_string()
    }
}

impl TableInfo {
    pub fn render(&self) -> String {
        let mut out = String::new();
        let _ = writeln!(out, "table: {}", self.name);
        for col in &self.columns {
            let _ = writeln!(out, "  {} {}", col.name, col.data_type);
        }
        if !self.sample_rows.is_empty() {
            let _ = writeln!(out, "sample rows:");
            for row in &self.sample_rows {
                let _ = writeln!(out, "  ({})", row.join(", "));
            }
        }
        out.trim_end().to_string()
    }
}

/// Read-only view over one SQLite database.
pub struct SqlToolkit {
    conn: Mutex<Connection>,
    top_k: usize,
}

impl SqlToolkit {
    pub fn new(conn: Connection, top_k: usize) -> Self {
        Self {
            conn: Mutex::new(conn),
            top_k: top_k.max(1),
        }
    }

    /// Names of the user tables in the database.
    pub fn list_tables(&self) -> Result<Vec<String>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(
            "SELECT name FROM sqlite_master \
             WHERE type = 'table' AND name NOT LIKE 'sqlite_%' ORDER BY name",
        )?;
        let names = stmt
            .query_map([], |row| row.get::<_, String>(0))?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(names)
    }

    /// Columns and a few sample rows of one table.
    pub fn describe_table(&self, name: &str) -> Result<TableInfo> {
        let conn = self.lock()?;

        let mut stmt = conn.prepare("SELECT name, type FROM pragma_table_info(?1)")?;
        let columns = stmt
            .query_map([name], |row| {
                Ok(ColumnInfo {
                    name: row.get(0)?,
                    data_type: row.get(1)?,
                })
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        if columns.is_empty() {
            return Err(ChatSqlError::Schema(format!(
                "No such table: '{}'",
                name
            )));
        }

        let sample_sql = format!(
            "SELECT * FROM \"{}\" LIMIT 3",
            name.replace('"', "\"\"")
        );
        let mut stmt = conn.prepare(&sample_sql)?;
        let col_count = stmt.column_count();
        let sample_rows = stmt
            .query_map([], |row| {
                let mut cells = Vec::with_capacity(col_count);
                for i in 0..col_count {
                    cells.push(render_value(row.get_ref(i)?));
                }
                Ok(cells)
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        Ok(TableInfo {
            name: name.to_string(),
            columns,
            sample_rows,
        })
    }

    /// Run one read-only statement, capped at `top_k` rows.
    ///
    /// Two checks stand between the agent and the data: the textual guard
    /// up front, and SQLite's own read-only determination on the prepared
    /// statement, which also catches writes hidden behind a CTE list
    /// (`WITH ... DELETE`).
    pub fn run_query(&self, sql: &str) -> Result<QueryResult> {
        ensure_read_only(sql)?;
        debug!("Running query: {}", sql);

        let conn = self.lock()?;
        let mut stmt = conn.prepare(sql)?;
        if !stmt.readonly() {
            return Err(ChatSqlError::Rejected(
                "statement would modify the database".to_string(),
            ));
        }
        let columns: Vec<String> = stmt.column_names().iter().map(|s| s.to_string()).collect();
        let col_count = columns.len();

        let mut rows = Vec::new();
        let mut truncated = false;
        let mut iter = stmt.query([])?;
        while let Some(row) = iter.next()? {
            if rows.len() == self.top_k {
                truncated = true;
                break;
            }
            let mut cells = Vec::with_capacity(col_count);
            for i in 0..col_count {
                cells.push(render_value(row.get_ref(i)?));
            }
            rows.push(cells);
        }

        info!("Query returned {} rows (truncated: {})", rows.len(), truncated);
        Ok(QueryResult {
            columns,
            rows,
            truncated,
        })
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| ChatSqlError::Schema("database connection poisoned".to_string()))
    }
}

fn render_value(value: ValueRef<'_>) -> String {
    match value {
        ValueRef::Null => "NULL".to_string(),
        ValueRef::Integer(i) => i.to_string(),
        ValueRef::Real(f) => f.to_string(),
        ValueRef::Text(t) => String::from_utf8_lossy(t).to_string(),
        ValueRef::Blob(b) => format!("<{} byte blob>", b.len()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn toolkit() -> SqlToolkit {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch(
            "CREATE TABLE covid (state TEXT, hospitalizedIncrease INTEGER);
             INSERT INTO covid VALUES ('FL', 10), ('NY', 20), ('FL', 5);",
        )
        .unwrap();
        SqlToolkit::new(conn, 2)
    }

    #[test]
    fn lists_user_tables() {
        let tk = toolkit();
        assert_eq!(tk.list_tables().unwrap(), vec!["covid".to_string()]);
    }

    #[test]
    fn describes_columns_and_samples() {
        let tk = toolkit();
        let info = tk.describe_table("covid").unwrap();
        assert_eq!(info.columns.len(), 2);
        assert_eq!(info.columns[0].name, "state");
        assert_eq!(info.columns[1].data_type, "INTEGER");
        assert_eq!(info.sample_rows.len(), 3);
    }

    #[test]
    fn unknown_table_is_a_schema_error() {
        let tk = toolkit();
        assert!(matches!(
            tk.describe_table("nope"),
            Err(ChatSqlError::Schema(_))
        ));
    }

    #[test]
    fn run_query_caps_rows() {
        let tk = toolkit();
        let result = tk.run_query("SELECT state FROM covid").unwrap();
        assert_eq!(result.rows.len(), 2);
        assert!(result.truncated);
        assert!(result.render().contains("truncated"));
    }

    #[test]
    fn run_query_rejects_writes_hidden_behind_a_cte() {
        let tk = toolkit();
        assert!(matches!(
            tk.run_query("WITH doom AS (SELECT 1) DELETE FROM covid WHERE state IN (SELECT 'FL' FROM doom)"),
            Err(ChatSqlError::Rejected(_))
        ));
        // Nothing was deleted.
        let result = tk.run_query("SELECT COUNT(*) FROM covid").unwrap();
        assert_eq!(result.rows[0][0], "3");
    }

    #[test]
    fn run_query_allows_read_only_ctes() {
        let tk = toolkit();
        let result = tk
            .run_query("WITH fl AS (SELECT hospitalizedIncrease FROM covid WHERE state = 'FL') SELECT COUNT(*) FROM fl")
            .unwrap();
        assert_eq!(result.rows[0][0], "2");
    }

    #[test]
    fn run_query_rejects_dml() {
        let tk = toolkit();
        assert!(matches!(
            tk.run_query("DELETE FROM covid"),
            Err(ChatSqlError::Rejected(_))
        ));
        // The table is still intact.
        let result = tk.run_query("SELECT COUNT(*) FROM covid").unwrap();
        assert_eq!(result.rows[0][0], "3");
    }

    #[test]
    fn renders_empty_result() {
        let tk = toolkit();
        let result = tk
            .run_query("SELECT state FROM covid WHERE state = 'TX'")
            .unwrap();
        assert_eq!(result.render(), "columns: state\n(no rows)");
    }
}

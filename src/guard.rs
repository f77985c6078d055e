//! Read-only SQL guard
//!
//! The prompt already instructs the model never to issue DML, but prompt
//! instructions are not a security boundary. Every statement the agent runs
//! goes through this textual check first: single statement, leading keyword
//! SELECT or WITH. A leading WITH can still hide a write behind its CTE
//! list, so the toolkit additionally rejects any prepared statement SQLite
//! reports as non-read-only.

use crate::error::{ChatSqlError, Result};

/// Reject anything that is not a single statement starting with SELECT or
/// WITH. First-pass filter; the statement-level read-only check lives in
/// the toolkit.
pub fn ensure_read_only(sql: &str) -> Result<()> {
    let stripped = strip_leading_comments(sql.trim());
    if stripped.is_empty() {
        return Err(ChatSqlError::Rejected("empty SQL statement".to_string()));
    }

    let keyword = stripped
        .split_whitespace()
        .next()
        .unwrap_or("")
        .to_ascii_uppercase();
    let keyword = keyword.trim_end_matches(|c: char| !c.is_ascii_alphabetic());
    if keyword != "SELECT" && keyword != "WITH" {
        return Err(ChatSqlError::Rejected(format!(
            "only SELECT statements are allowed, got '{}'",
            keyword
        )));
    }

    if has_multiple_statements(stripped) {
        return Err(ChatSqlError::Rejected(
            "multiple SQL statements are not allowed".to_string(),
        ));
    }

    Ok(())
}

fn strip_leading_comments(sql: &str) -> &str {
    let mut rest = sql;
    loop {
        rest = rest.trim_start();
        if let Some(after) = rest.strip_prefix("--") {
            rest = after.split_once('\n').map(|(_, r)| r).unwrap_or("");
        } else if let Some(after) = rest.strip_prefix("/*") {
            rest = after.split_once("*/").map(|(_, r)| r).unwrap_or("");
        } else {
            return rest;
        }
    }
}

/// A semicolon outside of a quoted string followed by anything non-blank
/// means a second statement is present.
fn has_multiple_statements(sql: &str) -> bool {
    let mut in_single = false;
    let mut in_double = false;
    for (i, c) in sql.char_indices() {
        match c {
            '\'' if !in_double => in_single = !in_single,
            '"' if !in_single => in_double = !in_double,
            ';' if !in_single && !in_double => {
                return !sql[i + 1..].trim().is_empty();
            }
            _ => {}
        }
    }
    false
}

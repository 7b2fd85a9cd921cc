//! Lexical SQL guard for model-authored queries.
//!
//! The guard turns arbitrary text into a [`SanitizedQuery`]: a single
//! `SELECT`/`WITH` statement with no mutating keyword, referencing only the
//! readable analytics tables and carrying a bounded `LIMIT`.
//!
//! # Limitations
//!
//! This is pattern matching, not parsing. Quoted identifiers, CTE names that
//! shadow real tables, nested subqueries and stacked statements are not
//! understood. CTE names that appear after `FROM` are rejected as unknown
//! tables. Only the first table of a comma join (`FROM a, b`) is checked
//! against the allow-list. The read-only connection in `insights-db` is the backstop; a
//! grammar-aware analyzer is required before widening what the guard accepts.

use std::collections::BTreeSet;
use std::fmt;

use once_cell::sync::Lazy;
use regex::{Captures, Regex};
use thiserror::Error;

pub const DEFAULT_MAX_ROWS: usize = 5000;

pub const FORBIDDEN_KEYWORDS: &[&str] = &[
    "INSERT", "UPDATE", "DELETE", "DROP", "ALTER", "CREATE", "GRANT", "REVOKE", "TRUNCATE",
    "REPLACE", "MERGE",
];

/// Tables the model may read. Matches the tables published by the built-in
/// schema descriptor.
pub const READABLE_TABLES: &[&str] = &[
    "fact_measure",
    "dim_time",
    "dim_geo",
    "dim_indicator",
    "extended_fact_measure",
    "dataset_registry",
    "dataset_indicator",
];

static LINE_COMMENT: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?m)--.*$").expect("valid regex"));
static BLOCK_COMMENT: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)/\*.*?\*/").expect("valid regex"));
static WORD: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\b[A-Za-z_][A-Za-z0-9_]*\b").expect("valid regex"));
static TABLE_REFERENCE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\b(?:FROM|JOIN)\s+([A-Za-z_][A-Za-z0-9_]*)").expect("valid regex")
});
/// `LIMIT n` or SQLite's `LIMIT offset, count`.
static LIMIT_CLAUSE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\bLIMIT\s+(\d+)(?:\s*,\s*(\d+))?\b").expect("valid regex")
});

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum GuardError {
    #[error("Query cannot be empty")]
    EmptyQuery,
    #[error("Forbidden SQL keywords detected: {}", .keywords.join(", "))]
    ForbiddenKeyword { keywords: Vec<String> },
    #[error("Access to tables not allowed: {}", .tables.join(", "))]
    UnauthorizedTable { tables: Vec<String> },
    #[error("Only SELECT and WITH queries are allowed")]
    InvalidQueryType,
}

/// Query text that passed [`SqlGuard::validate`]. There is no other way to
/// construct one.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct SanitizedQuery(String);

impl SanitizedQuery {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_string(self) -> String {
        self.0
    }
}

impl AsRef<str> for SanitizedQuery {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SanitizedQuery {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SqlGuard {
    max_rows: usize,
}

impl Default for SqlGuard {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_ROWS)
    }
}

impl SqlGuard {
    pub fn new(max_rows: usize) -> Self {
        Self { max_rows: max_rows.max(1) }
    }

    pub fn max_rows(&self) -> usize {
        self.max_rows
    }

    pub fn validate(&self, raw: &str) -> Result<SanitizedQuery, GuardError> {
        if raw.trim().is_empty() {
            return Err(GuardError::EmptyQuery);
        }

        let query = normalize_query(raw);
        if query.is_empty() {
            return Err(GuardError::EmptyQuery);
        }

        check_forbidden_keywords(&query)?;
        check_table_names(&query)?;
        check_query_type(&query)?;

        Ok(SanitizedQuery(self.ensure_limit(query)))
    }

    fn ensure_limit(&self, query: String) -> String {
        if !LIMIT_CLAUSE.is_match(&query) {
            return format!("{query} LIMIT {}", self.max_rows);
        }

        let max_rows = self.max_rows;
        LIMIT_CLAUSE
            .replace_all(&query, |caps: &Captures<'_>| {
                let (offset, count) = match caps.get(2) {
                    Some(count) => (Some(&caps[1]), count.as_str()),
                    None => (None, &caps[1]),
                };
                // Digits too long for u64 are certainly above the cap.
                let requested = count.parse::<u64>().unwrap_or(u64::MAX);
                if requested <= max_rows as u64 {
                    return caps[0].to_string();
                }
                match offset {
                    Some(offset) => format!("LIMIT {offset}, {max_rows}"),
                    None => format!("LIMIT {max_rows}"),
                }
            })
            .into_owned()
    }
}

fn normalize_query(raw: &str) -> String {
    let without_line_comments = LINE_COMMENT.replace_all(raw, "");
    let without_comments = BLOCK_COMMENT.replace_all(&without_line_comments, " ");
    let collapsed = without_comments.split_whitespace().collect::<Vec<_>>().join(" ");
    collapsed.trim_end_matches(|ch: char| ch == ';' || ch.is_whitespace()).to_string()
}

fn check_forbidden_keywords(query: &str) -> Result<(), GuardError> {
    let mut keywords: Vec<String> = Vec::new();
    for word in WORD.find_iter(query) {
        let upper = word.as_str().to_ascii_uppercase();
        if FORBIDDEN_KEYWORDS.contains(&upper.as_str()) && !keywords.contains(&upper) {
            keywords.push(upper);
        }
    }

    if keywords.is_empty() {
        Ok(())
    } else {
        Err(GuardError::ForbiddenKeyword { keywords })
    }
}

fn check_table_names(query: &str) -> Result<(), GuardError> {
    let disallowed = TABLE_REFERENCE
        .captures_iter(query)
        .map(|caps| caps[1].to_ascii_lowercase())
        .filter(|table| !READABLE_TABLES.contains(&table.as_str()))
        .collect::<BTreeSet<_>>();

    if disallowed.is_empty() {
        Ok(())
    } else {
        Err(GuardError::UnauthorizedTable { tables: disallowed.into_iter().collect() })
    }
}

fn check_query_type(query: &str) -> Result<(), GuardError> {
    let upper = query.trim().to_ascii_uppercase();
    if upper.starts_with("SELECT") || upper.starts_with("WITH") {
        Ok(())
    } else {
        Err(GuardError::InvalidQueryType)
    }
}

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Tabular result of a read-only query. Rows are positional, aligned with
/// `columns`.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct QueryResult {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<Value>>,
    pub row_count: usize,
}

impl QueryResult {
    pub fn new(columns: Vec<String>, rows: Vec<Vec<Value>>) -> Self {
        let row_count = rows.len();
        Self { columns, rows, row_count }
    }

    /// Drops rows beyond `max_rows`. Returns the number of rows removed.
    pub fn truncate(&mut self, max_rows: usize) -> usize {
        let removed = self.rows.len().saturating_sub(max_rows);
        self.rows.truncate(max_rows);
        self.row_count = self.rows.len();
        removed
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::QueryResult;

    #[test]
    fn truncate_keeps_row_count_in_sync() {
        let mut result = QueryResult::new(
            vec!["year".to_string()],
            (2015..2025).map(|year| vec![json!(year)]).collect(),
        );

        assert_eq!(result.truncate(4), 6);
        assert_eq!(result.row_count, 4);
        assert_eq!(result.rows.last(), Some(&vec![json!(2018)]));
        assert_eq!(result.truncate(10), 0);
    }
}

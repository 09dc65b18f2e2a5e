// ABOUTME: In-memory SchemaSource for tests and offline fixtures
// ABOUTME: Keeps tables in declaration order and rows in insertion order

use crate::error::Result;
use crate::export::source::{KeyFilter, SchemaSource};
use crate::export::{Row, Value};
use async_trait::async_trait;

#[derive(Debug, Clone)]
struct MemoryTable {
    name: String,
    columns: Vec<String>,
    rows: Vec<Row>,
}

/// A fixed set of tables that answers introspection queries like a database.
#[derive(Debug, Clone, Default)]
pub struct MemorySource {
    tables: Vec<MemoryTable>,
}

impl MemorySource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Declare a table. Redeclaring replaces its columns and clears its rows.
    pub fn table(mut self, name: &str, columns: &[&str]) -> Self {
        let table = MemoryTable {
            name: name.to_string(),
            columns: columns.iter().map(|c| c.to_string()).collect(),
            rows: Vec::new(),
        };
        match self.tables.iter_mut().find(|t| t.name == name) {
            Some(existing) => *existing = table,
            None => self.tables.push(table),
        }
        self
    }

    /// Append a row; columns the table does not declare are ignored.
    ///
    /// # Panics
    ///
    /// Panics if the table was never declared.
    pub fn row(mut self, table: &str, values: &[(&str, Value)]) -> Self {
        let target = self
            .tables
            .iter_mut()
            .find(|t| t.name == table)
            .unwrap_or_else(|| panic!("table {} not declared", table));
        let row = values
            .iter()
            .filter(|(column, _)| target.columns.iter().any(|c| c == column))
            .map(|(column, value)| (column.to_string(), value.clone()))
            .collect();
        target.rows.push(row);
        self
    }

    fn find(&self, name: &str) -> Option<&MemoryTable> {
        self.tables.iter().find(|t| t.name == name)
    }

    fn matching<'a>(
        &'a self,
        table: &str,
        filter: &'a KeyFilter<'a>,
    ) -> impl Iterator<Item = &'a Row> + 'a {
        self.find(table)
            .into_iter()
            .flat_map(|t| t.rows.iter())
            .filter(move |row| {
                filter.iter().all(|(column, keys)| {
                    row.get(*column)
                        .and_then(Value::key_text)
                        .is_some_and(|text| keys.contains(&text))
                })
            })
    }
}

#[async_trait]
impl SchemaSource for MemorySource {
    async fn list_tables(&self) -> Result<Vec<String>> {
        Ok(self.tables.iter().map(|t| t.name.clone()).collect())
    }

    async fn table_columns(&self, table: &str) -> Result<Option<Vec<String>>> {
        Ok(self.find(table).map(|t| t.columns.clone()))
    }

    async fn select_keys(
        &self,
        table: &str,
        key_column: &str,
        filter: &KeyFilter<'_>,
    ) -> Result<Vec<String>> {
        let mut keys: Vec<String> = self
            .matching(table, filter)
            .filter_map(|row| row.get(key_column).and_then(Value::key_text))
            .collect();
        keys.sort();
        keys.dedup();
        Ok(keys)
    }

    async fn fetch_rows(
        &self,
        table: &str,
        columns: &[String],
        filter: &KeyFilter<'_>,
    ) -> Result<Vec<Row>> {
        Ok(self
            .matching(table, filter)
            .map(|row| {
                columns
                    .iter()
                    .filter_map(|c| row.get(c).map(|v| (c.clone(), v.clone())))
                    .collect()
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fixture() -> MemorySource {
        MemorySource::new()
            .table("Vikings", &["Id", "UserId", "Name"])
            .row(
                "Vikings",
                &[("Id", 1.into()), ("UserId", 42.into()), ("Name", "Hiccup".into())],
            )
            .row(
                "Vikings",
                &[("Id", 2.into()), ("UserId", 7.into()), ("Name", "Astrid".into())],
            )
    }

    #[tokio::test]
    async fn test_select_keys_filters_on_text_form() {
        let source = fixture();
        let owners = vec!["42".to_string()];
        let keys = source
            .select_keys("Vikings", "Id", &[("UserId", owners.as_slice())])
            .await
            .unwrap();
        assert_eq!(keys, vec!["1".to_string()]);
    }

    #[tokio::test]
    async fn test_fetch_rows_projects_columns() {
        let source = fixture();
        let owners = vec!["7".to_string()];
        let rows = source
            .fetch_rows("Vikings", &["Name".to_string()], &[("UserId", owners.as_slice())])
            .await
            .unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].len(), 1);
        assert_eq!(rows[0]["Name"], Value::Text("Astrid".into()));
    }

    #[tokio::test]
    async fn test_unknown_table_has_no_columns() {
        assert!(fixture().table_columns("Dragons").await.unwrap().is_none());
    }
}

// ABOUTME: Read-only seam between the introspector and a live schema
// ABOUTME: Implemented by the PostgreSQL client and by the in-memory source

use crate::error::Result;
use crate::export::Row;
use async_trait::async_trait;

/// Conjunction of `column::text IN (values)` predicates.
pub type KeyFilter<'a> = [(&'a str, &'a [String])];

#[async_trait]
pub trait SchemaSource: Send + Sync {
    /// Table names in schema-declared order.
    async fn list_tables(&self) -> Result<Vec<String>>;

    /// Column names in declared order, or `None` if the table does not exist.
    async fn table_columns(&self, table: &str) -> Result<Option<Vec<String>>>;

    /// Text form of `key_column` for every row matching `filter`.
    async fn select_keys(
        &self,
        table: &str,
        key_column: &str,
        filter: &KeyFilter<'_>,
    ) -> Result<Vec<String>>;

    /// Rows matching `filter`, projected to `columns`, in a stable order.
    async fn fetch_rows(
        &self,
        table: &str,
        columns: &[String],
        filter: &KeyFilter<'_>,
    ) -> Result<Vec<Row>>;
}

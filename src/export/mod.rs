// ABOUTME: Owner-scoped relational extraction and dump generation
// ABOUTME: Exports the introspector, dump generator and schema source seam

pub mod dump;
pub mod memory;
pub mod schema;
pub mod source;

pub use dump::{generate_dump, quote_ident, quote_literal, DumpDocument, Row, Value};
pub use memory::MemorySource;
pub use schema::{OwnerColumn, SchemaIntrospector, SkipReason, SkippedTable, TableSchema};
pub use source::{KeyFilter, SchemaSource};

use crate::utils::owner_file_stem;

/// The account an export is produced for, as resolved by the caller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OwnerIdentity {
    pub username: String,
    pub email: String,
}

impl OwnerIdentity {
    pub fn new(username: impl Into<String>, email: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            email: email.into(),
        }
    }

    /// Filesystem-safe rendering of the username used in artifact names.
    pub fn file_stem(&self) -> String {
        owner_file_stem(&self.username)
    }
}

/// One exportable table and the owner's rows in it.
#[derive(Debug, Clone)]
pub struct TableExport {
    pub schema: TableSchema,
    pub rows: Vec<Row>,
}

/// Everything selected for one owner, in schema-declared table order.
#[derive(Debug, Clone)]
pub struct ExportSet {
    pub owner: OwnerIdentity,
    pub tables: Vec<TableExport>,
    pub skipped: Vec<SkippedTable>,
}

impl ExportSet {
    pub fn table(&self, name: &str) -> Option<&TableExport> {
        self.tables.iter().find(|t| t.schema.name == name)
    }

    pub fn row_count(&self) -> usize {
        self.tables.iter().map(|t| t.rows.len()).sum()
    }
}

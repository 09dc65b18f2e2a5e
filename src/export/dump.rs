// ABOUTME: Deterministic INSERT-statement dump of an owner's rows
// ABOUTME: Encodes values with quoting/escaping and never executes what it writes

use crate::error::{ExportError, Result};
use crate::export::{ExportSet, TableSchema};
use std::collections::BTreeMap;
use std::fmt;
use zeroize::{Zeroize, ZeroizeOnDrop, Zeroizing};

/// A single column value as read from the source database.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
    Bytes(Vec<u8>),
    Json(serde_json::Value),
    /// A database type the reader could not decode, carrying its type name.
    Unsupported(String),
}

impl Value {
    /// Textual form used to compare owner keys, matching PostgreSQL's `::text`.
    pub fn key_text(&self) -> Option<String> {
        match self {
            Value::Int(i) => Some(i.to_string()),
            Value::Text(s) => Some(s.clone()),
            Value::Bool(b) => Some(b.to_string()),
            Value::Float(f) if f.is_finite() => Some(f.to_string()),
            _ => None,
        }
    }

    fn type_name(&self) -> String {
        match self {
            Value::Float(_) => "non-finite float".to_string(),
            Value::Unsupported(name) => name.clone(),
            other => format!("{:?}", other),
        }
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Int(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::Text(v.to_string())
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}

/// Column name to value. Dumps follow `TableSchema::columns`, not map order.
pub type Row = BTreeMap<String, Value>;

/// Rendered dump: one statement per line, each line terminated by `\n`.
#[derive(PartialEq, Eq, Zeroize, ZeroizeOnDrop)]
pub struct DumpDocument {
    statements: Vec<String>,
}

impl DumpDocument {
    pub fn new(statements: Vec<String>) -> Self {
        Self { statements }
    }

    pub fn statements(&self) -> &[String] {
        &self.statements
    }

    pub fn len(&self) -> usize {
        self.statements.len()
    }

    pub fn is_empty(&self) -> bool {
        self.statements.is_empty()
    }

    /// Exact bytes that are signed and encrypted.
    pub fn to_bytes(&self) -> Zeroizing<Vec<u8>> {
        let size = self.statements.iter().map(|s| s.len() + 1).sum();
        let mut out = Zeroizing::new(Vec::with_capacity(size));
        for statement in &self.statements {
            out.extend_from_slice(statement.as_bytes());
            out.push(b'\n');
        }
        out
    }

    /// Parse recovered plaintext back into statements.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        let text = std::str::from_utf8(bytes).map_err(|_| {
            ExportError::Io(std::io::Error::new(
                std::io::ErrorKind::InvalidData,
                "dump is not valid UTF-8",
            ))
        })?;
        Ok(Self {
            statements: text.lines().map(str::to_string).collect(),
        })
    }

    /// First `n` statements, for log previews.
    pub fn preview(&self, n: usize) -> &[String] {
        &self.statements[..n.min(self.statements.len())]
    }
}

impl fmt::Debug for DumpDocument {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DumpDocument")
            .field("statements", &self.statements.len())
            .finish()
    }
}

/// Quote an SQL identifier, doubling embedded double quotes.
///
/// Names with control characters use the `U&"..."` form with `\XXXX`
/// escapes, keeping the statement on one line.
pub fn quote_ident(name: &str) -> String {
    if !name.chars().any(char::is_control) {
        return format!("\"{}\"", name.replace('"', "\"\""));
    }

    let mut out = String::with_capacity(name.len() + 4);
    out.push_str("U&\"");
    for c in name.chars() {
        match c {
            '"' => out.push_str("\"\""),
            '\\' => out.push_str("\\\\"),
            c if c.is_control() => out.push_str(&format!("\\{:04X}", c as u32)),
            c => out.push(c),
        }
    }
    out.push('"');
    out
}

/// Quote a string literal.
///
/// Strings with control characters use the `E'...'` form so every statement
/// stays on one line; everything else is a standard literal with `'` doubled.
pub fn quote_literal(value: &str) -> String {
    if !value.chars().any(char::is_control) {
        return format!("'{}'", value.replace('\'', "''"));
    }

    let mut out = String::with_capacity(value.len() + 3);
    out.push_str("E'");
    for c in value.chars() {
        match c {
            '\'' => out.push_str("''"),
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            // \x emits a raw byte, so C1 controls need the \u form in UTF-8
            c if c.is_control() && (c as u32) < 0x80 => {
                out.push_str(&format!("\\x{:02x}", c as u32))
            }
            c if c.is_control() => out.push_str(&format!("\\u{:04x}", c as u32)),
            c => out.push(c),
        }
    }
    out.push('\'');
    out
}

fn encode_value(table: &str, column: &str, value: &Value) -> Result<String> {
    let encoded = match value {
        Value::Null => "NULL".to_string(),
        Value::Bool(true) => "TRUE".to_string(),
        Value::Bool(false) => "FALSE".to_string(),
        Value::Int(i) => i.to_string(),
        Value::Float(f) if f.is_finite() => f.to_string(),
        Value::Text(s) => quote_literal(s),
        Value::Bytes(b) => format!("'\\x{}'", hex::encode(b)),
        Value::Json(j) => quote_literal(&j.to_string()),
        Value::Float(_) | Value::Unsupported(_) => {
            return Err(ExportError::UnsupportedValueType {
                table: table.to_string(),
                column: column.to_string(),
                type_name: value.type_name(),
            })
        }
    };
    Ok(encoded)
}

/// Render one row as an INSERT statement in the schema's column order.
pub fn insert_statement(schema: &TableSchema, row: &Row) -> Result<String> {
    let mut columns = Vec::with_capacity(schema.columns.len());
    let mut values = Vec::with_capacity(schema.columns.len());

    for column in &schema.columns {
        let value = row.get(column).ok_or_else(|| ExportError::MissingColumn {
            table: schema.name.clone(),
            column: column.clone(),
        })?;
        columns.push(quote_ident(column));
        values.push(encode_value(&schema.name, column, value)?);
    }

    Ok(format!(
        "INSERT INTO {} ({}) VALUES ({});",
        quote_ident(&schema.name),
        columns.join(", "),
        values.join(", ")
    ))
}

/// Serialize an export set. Any encoding failure aborts the whole dump.
pub fn generate_dump(export: &ExportSet) -> Result<DumpDocument> {
    let mut statements = Vec::with_capacity(export.row_count());

    for table in &export.tables {
        for row in &table.rows {
            match insert_statement(&table.schema, row) {
                Ok(statement) => statements.push(statement),
                Err(e) => {
                    statements.zeroize();
                    return Err(e);
                }
            }
        }
        tracing::debug!(
            table = %table.schema.name,
            rows = table.rows.len(),
            "Dumped table"
        );
    }

    Ok(DumpDocument { statements })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::export::{OwnerColumn, OwnerIdentity, TableExport};

    fn users_schema() -> TableSchema {
        TableSchema {
            name: "Users".to_string(),
            columns: vec!["Id".into(), "Username".into(), "Email".into()],
            owner_column: Some(OwnerColumn::Root {
                key: "Id".to_string(),
            }),
        }
    }

    fn row(pairs: &[(&str, Value)]) -> Row {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect()
    }

    fn export_of(tables: Vec<TableExport>) -> ExportSet {
        ExportSet {
            owner: OwnerIdentity::new("alice", "alice@example.com"),
            tables,
            skipped: Vec::new(),
        }
    }

    #[test]
    fn test_insert_statement_uses_declared_order() {
        let r = row(&[
            ("Username", "alice".into()),
            ("Email", "alice@example.com".into()),
            ("Id", 42.into()),
        ]);
        let statement = insert_statement(&users_schema(), &r).unwrap();
        assert_eq!(
            statement,
            "INSERT INTO \"Users\" (\"Id\", \"Username\", \"Email\") VALUES (42, 'alice', 'alice@example.com');"
        );
    }

    #[test]
    fn test_value_encoding() {
        assert_eq!(encode_value("t", "c", &Value::Null).unwrap(), "NULL");
        assert_eq!(encode_value("t", "c", &Value::Bool(true)).unwrap(), "TRUE");
        assert_eq!(encode_value("t", "c", &Value::Bool(false)).unwrap(), "FALSE");
        assert_eq!(encode_value("t", "c", &Value::Int(-7)).unwrap(), "-7");
        assert_eq!(encode_value("t", "c", &Value::Float(42.75)).unwrap(), "42.75");
        assert_eq!(
            encode_value("t", "c", &Value::Text("O'Brien".into())).unwrap(),
            "'O''Brien'"
        );
        assert_eq!(
            encode_value("t", "c", &Value::Bytes(vec![0xde, 0xad])).unwrap(),
            "'\\xdead'"
        );
        assert_eq!(
            encode_value("t", "c", &Value::Json(serde_json::json!({"lvl": 3}))).unwrap(),
            "'{\"lvl\":3}'"
        );
    }

    #[test]
    fn test_control_characters_stay_on_one_line() {
        let encoded = quote_literal("line one\nit's\ttabbed\\");
        assert_eq!(encoded, "E'line one\\nit''s\\ttabbed\\\\'");
        assert!(!encoded.contains('\n'));
    }

    #[test]
    fn test_quote_ident_escapes_double_quotes() {
        assert_eq!(quote_ident("we\"ird"), "\"we\"\"ird\"");
    }

    #[test]
    fn test_quote_ident_keeps_control_characters_on_one_line() {
        assert_eq!(quote_ident("Da\nta"), "U&\"Da\\000Ata\"");
        assert_eq!(quote_ident("a\\b\"\tc"), "U&\"a\\\\b\"\"\\0009c\"");
    }

    #[test]
    fn test_control_characters_in_names_keep_one_statement_per_line() {
        let schema = TableSchema {
            name: "Odd\nTable".to_string(),
            columns: vec!["Id".into(), "Line\r\nBreak".into()],
            owner_column: Some(OwnerColumn::Direct {
                column: "UserId".into(),
            }),
        };
        let export = export_of(vec![TableExport {
            schema,
            rows: vec![
                row(&[("Id", 1.into()), ("Line\r\nBreak", "x".into())]),
                row(&[("Id", 2.into()), ("Line\r\nBreak", "y".into())]),
            ],
        }]);
        let dump = generate_dump(&export).unwrap();
        assert_eq!(dump.len(), 2);

        let parsed = DumpDocument::from_bytes(&dump.to_bytes()).unwrap();
        assert_eq!(parsed.len(), dump.len());
        assert_eq!(parsed.preview(5), dump.statements());
        assert_eq!(
            parsed.statements()[0],
            "INSERT INTO U&\"Odd\\000ATable\" (\"Id\", U&\"Line\\000D\\000ABreak\") VALUES (1, 'x');"
        );
    }

    #[test]
    fn test_unsupported_value_aborts_dump() {
        let schema = TableSchema {
            name: "Rooms".to_string(),
            columns: vec!["Id".into(), "Shape".into()],
            owner_column: Some(OwnerColumn::Direct {
                column: "UserId".into(),
            }),
        };
        let export = export_of(vec![TableExport {
            schema,
            rows: vec![
                row(&[("Id", 1.into()), ("Shape", Value::Text("ok".into()))]),
                row(&[("Id", 2.into()), ("Shape", Value::Unsupported("polygon".into()))]),
            ],
        }]);

        match generate_dump(&export) {
            Err(ExportError::UnsupportedValueType {
                table,
                column,
                type_name,
            }) => {
                assert_eq!(table, "Rooms");
                assert_eq!(column, "Shape");
                assert_eq!(type_name, "polygon");
            }
            other => panic!("expected UnsupportedValueType, got {:?}", other),
        }
    }

    #[test]
    fn test_non_finite_float_is_unsupported() {
        let err = encode_value("t", "c", &Value::Float(f64::NAN)).unwrap_err();
        assert!(matches!(err, ExportError::UnsupportedValueType { .. }));
    }

    #[test]
    fn test_missing_column_is_an_error() {
        let r = row(&[("Id", 42.into()), ("Username", "alice".into())]);
        let err = insert_statement(&users_schema(), &r).unwrap_err();
        assert!(matches!(err, ExportError::MissingColumn { .. }));
    }

    #[test]
    fn test_dump_bytes_roundtrip_through_parse() {
        let export = export_of(vec![TableExport {
            schema: users_schema(),
            rows: vec![row(&[
                ("Id", 42.into()),
                ("Username", "multi\nline".into()),
                ("Email", Value::Null),
            ])],
        }]);
        let dump = generate_dump(&export).unwrap();
        let bytes = dump.to_bytes();
        assert!(bytes.ends_with(b"\n"));

        let parsed = DumpDocument::from_bytes(&bytes).unwrap();
        assert_eq!(parsed, dump);
        assert_eq!(parsed.len(), 1);
    }

    #[test]
    fn test_debug_does_not_print_statements() {
        let export = export_of(vec![TableExport {
            schema: users_schema(),
            rows: vec![row(&[
                ("Id", 42.into()),
                ("Username", "alice".into()),
                ("Email", "secret@example.com".into()),
            ])],
        }]);
        let dump = generate_dump(&export).unwrap();
        assert!(!format!("{:?}", dump).contains("secret@example.com"));
    }
}

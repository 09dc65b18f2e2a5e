// ABOUTME: SchemaSource backed by a live PostgreSQL connection
// ABOUTME: Catalog queries for tables and columns plus parameterized owner-filtered reads

use crate::error::Result;
use crate::export::{quote_ident, KeyFilter, Row, SchemaSource, Value};
use async_trait::async_trait;
use tokio_postgres::types::ToSql;
use tokio_postgres::Client;

/// Column types decoded natively; anything else is read through `::text`.
const NATIVE_TYPES: &[&str] = &[
    "bool", "int2", "int4", "int8", "float4", "float8", "text", "varchar", "bpchar", "name",
    "json", "jsonb", "bytea",
];

pub struct PgSource {
    client: Client,
    schema: String,
}

impl PgSource {
    pub fn new(client: Client) -> Self {
        Self::with_schema(client, "public")
    }

    pub fn with_schema(client: Client, schema: &str) -> Self {
        Self {
            client,
            schema: schema.to_string(),
        }
    }

    fn qualified(&self, table: &str) -> String {
        format!("{}.{}", quote_ident(&self.schema), quote_ident(table))
    }

    /// `(column, udt_name)` in declared order.
    async fn column_types(&self, table: &str) -> Result<Vec<(String, String)>> {
        let rows = self
            .client
            .query(
                "SELECT column_name::text, udt_name::text
                 FROM information_schema.columns
                 WHERE table_schema = $1 AND table_name = $2
                 ORDER BY ordinal_position",
                &[&self.schema, &table],
            )
            .await?;
        Ok(rows.iter().map(|row| (row.get(0), row.get(1))).collect())
    }

    async fn primary_key(&self, table: &str) -> Result<Vec<String>> {
        let rows = self
            .client
            .query(
                "SELECT a.attname::text
                 FROM pg_index i
                 JOIN pg_attribute a
                   ON a.attrelid = i.indrelid AND a.attnum = ANY(i.indkey)
                 WHERE i.indrelid = format('%I.%I', $1::text, $2::text)::regclass
                   AND i.indisprimary
                 ORDER BY array_position(i.indkey::int2[], a.attnum)",
                &[&self.schema, &table],
            )
            .await?;
        Ok(rows.iter().map(|row| row.get(0)).collect())
    }
}

/// `WHERE` clause and bound parameters for an owner filter.
fn where_clause<'f>(filter: &'f KeyFilter<'_>) -> (String, Vec<&'f (dyn ToSql + Sync)>) {
    if filter.is_empty() {
        return (String::new(), Vec::new());
    }
    let mut predicates = Vec::with_capacity(filter.len());
    let mut params: Vec<&(dyn ToSql + Sync)> = Vec::with_capacity(filter.len());
    for (i, (column, keys)) in filter.iter().enumerate() {
        predicates.push(format!("{}::text = ANY(${})", quote_ident(column), i + 1));
        params.push(keys);
    }
    (format!(" WHERE {}", predicates.join(" AND ")), params)
}

fn decode(row: &tokio_postgres::Row, i: usize) -> Result<Value> {
    let type_name = row.columns()[i].type_().name().to_string();
    let value = match type_name.as_str() {
        "bool" => row.try_get::<_, Option<bool>>(i)?.map(Value::Bool),
        "int2" => row
            .try_get::<_, Option<i16>>(i)?
            .map(|v| Value::Int(v.into())),
        "int4" => row
            .try_get::<_, Option<i32>>(i)?
            .map(|v| Value::Int(v.into())),
        "int8" => row.try_get::<_, Option<i64>>(i)?.map(Value::Int),
        "float4" => row
            .try_get::<_, Option<f32>>(i)?
            .map(|v| Value::Float(v.into())),
        "float8" => row.try_get::<_, Option<f64>>(i)?.map(Value::Float),
        "text" | "varchar" | "bpchar" | "name" => {
            row.try_get::<_, Option<String>>(i)?.map(Value::Text)
        }
        "json" | "jsonb" => row
            .try_get::<_, Option<serde_json::Value>>(i)?
            .map(Value::Json),
        "bytea" => row.try_get::<_, Option<Vec<u8>>>(i)?.map(Value::Bytes),
        _ => Some(Value::Unsupported(type_name.clone())),
    };
    Ok(value.unwrap_or(Value::Null))
}

#[async_trait]
impl SchemaSource for PgSource {
    async fn list_tables(&self) -> Result<Vec<String>> {
        let rows = self
            .client
            .query(
                "SELECT table_name::text
                 FROM information_schema.tables
                 WHERE table_schema = $1 AND table_type = 'BASE TABLE'
                 ORDER BY table_name",
                &[&self.schema],
            )
            .await?;
        Ok(rows.iter().map(|row| row.get(0)).collect())
    }

    async fn table_columns(&self, table: &str) -> Result<Option<Vec<String>>> {
        let columns = self.column_types(table).await?;
        if columns.is_empty() {
            return Ok(None);
        }
        Ok(Some(columns.into_iter().map(|(name, _)| name).collect()))
    }

    async fn select_keys(
        &self,
        table: &str,
        key_column: &str,
        filter: &KeyFilter<'_>,
    ) -> Result<Vec<String>> {
        let (clause, params) = where_clause(filter);
        let key = quote_ident(key_column);
        let sql = format!(
            "SELECT DISTINCT {key}::text FROM {}{} ORDER BY 1",
            self.qualified(table),
            clause
        );
        tracing::debug!("Selecting {}.{} keys", table, key_column);
        let rows = self.client.query(&sql, &params).await?;
        Ok(rows
            .iter()
            .filter_map(|row| row.get::<_, Option<String>>(0))
            .collect())
    }

    async fn fetch_rows(
        &self,
        table: &str,
        columns: &[String],
        filter: &KeyFilter<'_>,
    ) -> Result<Vec<Row>> {
        if columns.is_empty() {
            return Ok(Vec::new());
        }
        let types = self.column_types(table).await?;
        let select: Vec<String> = columns
            .iter()
            .map(|column| {
                let native = types
                    .iter()
                    .find(|(name, _)| name == column)
                    .is_some_and(|(_, udt)| NATIVE_TYPES.contains(&udt.as_str()));
                if native {
                    quote_ident(column)
                } else {
                    format!("{}::text", quote_ident(column))
                }
            })
            .collect();

        let primary_key = self.primary_key(table).await?;
        let order_by: Vec<String> = if primary_key.is_empty() {
            columns
                .iter()
                .map(|c| format!("{}::text", quote_ident(c)))
                .collect()
        } else {
            primary_key.iter().map(|c| quote_ident(c)).collect()
        };

        let (clause, params) = where_clause(filter);
        let sql = format!(
            "SELECT {} FROM {}{} ORDER BY {}",
            select.join(", "),
            self.qualified(table),
            clause,
            order_by.join(", ")
        );
        let rows = self.client.query(&sql, &params).await?;

        let mut out = Vec::with_capacity(rows.len());
        for row in &rows {
            let mut record = Row::new();
            for (i, column) in columns.iter().enumerate() {
                record.insert(column.clone(), decode(row, i)?);
            }
            out.push(record);
        }
        tracing::debug!(table = %table, rows = out.len(), "Fetched owned rows");
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_where_clause_binds_each_filter() {
        let ids = vec!["42".to_string()];
        let vikings = vec!["4349".to_string(), "4350".to_string()];
        let filter: Vec<(&str, &[String])> = vec![("UserId", ids.as_slice()), ("VikingId", vikings.as_slice())];

        let (clause, params) = where_clause(&filter);
        assert_eq!(
            clause,
            r#" WHERE "UserId"::text = ANY($1) AND "VikingId"::text = ANY($2)"#
        );
        assert_eq!(params.len(), 2);
    }

    #[test]
    fn test_where_clause_empty_filter() {
        let filter: Vec<(&str, &[String])> = Vec::new();
        let (clause, params) = where_clause(&filter);
        assert!(clause.is_empty());
        assert!(params.is_empty());
    }

    #[test]
    fn test_where_clause_quotes_hostile_identifiers() {
        let ids = vec!["1".to_string()];
        let filter: Vec<(&str, &[String])> = vec![(r#"a"; DROP TABLE x; --"#, ids.as_slice())];
        let (clause, _) = where_clause(&filter);
        assert_eq!(clause, r#" WHERE "a""; DROP TABLE x; --"::text = ANY($1)"#);
    }
}

// ABOUTME: Schema introspection that decides which tables belong to an owner
// ABOUTME: Builds the ordered TableSchema registry and resolves owner key chains

use crate::config::ExportPolicy;
use crate::error::{ExportError, Result};
use crate::export::source::SchemaSource;
use crate::export::{ExportSet, OwnerIdentity, Row, TableExport};
use crate::utils::sanitize_identifier;
use std::collections::HashMap;
use std::fmt;

/// How a table's rows are tied to the exporting account.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OwnerColumn {
    /// The root table itself, filtered by its key column.
    Root { key: String },
    /// A column holding root keys (e.g. `UserId`).
    Direct { column: String },
    /// A column holding keys derived through a parent table (e.g. `VikingId`).
    Indirect { column: String, via: String },
}

impl OwnerColumn {
    pub fn column(&self) -> &str {
        match self {
            OwnerColumn::Root { key } => key,
            OwnerColumn::Direct { column } | OwnerColumn::Indirect { column, .. } => column,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableSchema {
    pub name: String,
    /// Exported columns in declared order, after the policy's projection.
    pub columns: Vec<String>,
    pub owner_column: Option<OwnerColumn>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    NoOwnerColumn,
    ExcludedByPolicy,
    NotFound,
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            SkipReason::NoOwnerColumn => "no owner column",
            SkipReason::ExcludedByPolicy => "excluded by policy",
            SkipReason::NotFound => "table not found",
        };
        f.write_str(text)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SkippedTable {
    pub table: String,
    pub reason: SkipReason,
}

/// Selects and reads an owner's tables according to an [`ExportPolicy`].
pub struct SchemaIntrospector<'a, S: SchemaSource + ?Sized> {
    source: &'a S,
    policy: &'a ExportPolicy,
}

impl<'a, S: SchemaSource + ?Sized> SchemaIntrospector<'a, S> {
    pub fn new(source: &'a S, policy: &'a ExportPolicy) -> Self {
        Self { source, policy }
    }

    /// Locate the owner's root keys. No match, or more than one, is fatal.
    pub async fn resolve_owner(&self, owner: &OwnerIdentity) -> Result<Vec<String>> {
        let root = &self.policy.root;
        let username = [owner.username.clone()];
        let email = [owner.email.clone()];
        let keys = self
            .source
            .select_keys(
                &root.table,
                &root.key,
                &[
                    (root.username_column.as_str(), &username[..]),
                    (root.email_column.as_str(), &email[..]),
                ],
            )
            .await?;

        match keys.len() {
            1 => Ok(keys),
            0 => {
                tracing::warn!(
                    username = %sanitize_identifier(&owner.username),
                    "No account found for identity"
                );
                Err(ExportError::IdentityNotFound)
            }
            n => {
                tracing::warn!(
                    username = %sanitize_identifier(&owner.username),
                    matches = n,
                    "Identity matches more than one account"
                );
                Err(ExportError::IdentityNotFound)
            }
        }
    }

    fn table_order(&self, discovered: Vec<String>) -> Vec<String> {
        if !self.policy.tables.is_empty() {
            return self.policy.tables.clone();
        }

        // Parents first so the dump re-imports without FK violations.
        let mut leading: Vec<String> = vec![self.policy.root.table.clone()];
        for via in self.policy.via_tables() {
            if !leading.iter().any(|t| t == via) {
                leading.push(via.to_string());
            }
        }

        let mut order: Vec<String> = leading
            .iter()
            .filter(|t| discovered.contains(t))
            .cloned()
            .collect();
        order.extend(discovered.into_iter().filter(|t| !leading.contains(t)));
        order
    }

    fn owner_column_for(&self, table: &str, columns: &[String]) -> Option<OwnerColumn> {
        let root = &self.policy.root;
        if table == root.table {
            return columns
                .contains(&root.key)
                .then(|| OwnerColumn::Root {
                    key: root.key.clone(),
                });
        }

        self.policy
            .owner_columns
            .iter()
            .find(|link| columns.contains(&link.column))
            .map(|link| match &link.via {
                None => OwnerColumn::Direct {
                    column: link.column.clone(),
                },
                Some(via) => OwnerColumn::Indirect {
                    column: link.column.clone(),
                    via: via.table.clone(),
                },
            })
    }

    /// Build the ordered registry of exportable tables plus skip events.
    pub async fn registry(&self) -> Result<(Vec<TableSchema>, Vec<SkippedTable>)> {
        let discovered = self.source.list_tables().await?;
        let mut schemas = Vec::new();
        let mut skipped = Vec::new();

        for table in self.table_order(discovered) {
            let skip = |reason| SkippedTable {
                table: table.clone(),
                reason,
            };

            if self.policy.is_table_excluded(&table) {
                skipped.push(skip(SkipReason::ExcludedByPolicy));
                continue;
            }
            let Some(columns) = self.source.table_columns(&table).await? else {
                skipped.push(skip(SkipReason::NotFound));
                continue;
            };
            let Some(owner_column) = self.owner_column_for(&table, &columns) else {
                skipped.push(skip(SkipReason::NoOwnerColumn));
                continue;
            };

            let columns = columns
                .into_iter()
                .filter(|c| !self.policy.is_column_excluded(&table, c))
                .collect();
            schemas.push(TableSchema {
                name: table,
                columns,
                owner_column: Some(owner_column),
            });
        }

        for skip in &skipped {
            match skip.reason {
                SkipReason::NotFound => tracing::warn!(
                    table = %skip.table,
                    reason = %skip.reason,
                    "Skipping table"
                ),
                _ => tracing::info!(
                    table = %skip.table,
                    reason = %skip.reason,
                    "Skipping table"
                ),
            }
        }

        Ok((schemas, skipped))
    }

    /// Keys an owner column must match, walking the chain down from the root.
    async fn resolve_keys(
        &self,
        column: &str,
        root_keys: &[String],
        cache: &mut HashMap<String, Vec<String>>,
    ) -> Result<Vec<String>> {
        if let Some(keys) = cache.get(column) {
            return Ok(keys.clone());
        }

        let mut chain = Vec::new();
        let mut current = column;
        while let Some(link) = self.policy.owner_link(current) {
            chain.push(link);
            match &link.via {
                Some(via) if chain.len() <= crate::config::MAX_OWNER_DEPTH => current = &via.owner,
                Some(_) => {
                    return Err(ExportError::Policy(format!(
                        "ownership chain from '{}' is too deep",
                        column
                    )))
                }
                None => break,
            }
        }
        if chain.last().map_or(true, |link| link.via.is_some()) {
            return Err(ExportError::Policy(format!(
                "ownership chain from '{}' does not reach the root",
                column
            )));
        }

        let mut keys = root_keys.to_vec();
        for link in chain.iter().rev() {
            if let Some(cached) = cache.get(&link.column) {
                keys = cached.clone();
                continue;
            }
            if let Some(via) = &link.via {
                let derived = if keys.is_empty() {
                    Vec::new()
                } else {
                    let filter = [(via.owner.as_str(), keys.as_slice())];
                    self.source.select_keys(&via.table, &via.key, &filter).await?
                };
                keys = derived;
                tracing::debug!(
                    column = %link.column,
                    via = %via.table,
                    keys = keys.len(),
                    "Resolved owner keys"
                );
            }
            cache.insert(link.column.clone(), keys.clone());
        }
        Ok(keys)
    }

    async fn fetch_owned_rows(
        &self,
        schema: &TableSchema,
        root_keys: &[String],
        cache: &mut HashMap<String, Vec<String>>,
    ) -> Result<Vec<Row>> {
        let Some(owner_column) = &schema.owner_column else {
            return Ok(Vec::new());
        };
        let keys = match owner_column {
            OwnerColumn::Root { .. } => root_keys.to_vec(),
            OwnerColumn::Direct { column } | OwnerColumn::Indirect { column, .. } => {
                self.resolve_keys(column, root_keys, cache).await?
            }
        };
        if keys.is_empty() {
            return Ok(Vec::new());
        }
        self.source
            .fetch_rows(
                &schema.name,
                &schema.columns,
                &[(owner_column.column(), &keys[..])],
            )
            .await
    }

    /// Produce the ordered export set for one owner.
    pub async fn export_set(&self, owner: &OwnerIdentity) -> Result<ExportSet> {
        self.policy.validate()?;
        let root_keys = self.resolve_owner(owner).await?;
        let (schemas, skipped) = self.registry().await?;

        let mut cache = HashMap::new();
        let mut tables = Vec::with_capacity(schemas.len());
        for schema in schemas {
            let rows = self.fetch_owned_rows(&schema, &root_keys, &mut cache).await?;
            tracing::debug!(table = %schema.name, rows = rows.len(), "Selected rows");
            tables.push(TableExport { schema, rows });
        }

        Ok(ExportSet {
            owner: owner.clone(),
            tables,
            skipped,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{OwnerLink, ViaTable};
    use crate::export::{MemorySource, Value};

    fn game_db() -> MemorySource {
        MemorySource::new()
            .table("Users", &["Id", "Username", "Email", "Password"])
            .table("Vikings", &["Id", "UserId", "Uid"])
            .table("AchievementPoints", &["Id", "VikingId", "Value"])
            .table("Groups", &["GroupId", "Name"])
            .table("Sessions", &["Id", "UserId", "Token"])
            .row(
                "Users",
                &[
                    ("Id", 42.into()),
                    ("Username", "alice".into()),
                    ("Email", "alice@example.com".into()),
                    ("Password", "hash".into()),
                ],
            )
            .row(
                "Users",
                &[
                    ("Id", 7.into()),
                    ("Username", "bob".into()),
                    ("Email", "bob@example.com".into()),
                    ("Password", "hash2".into()),
                ],
            )
            .row(
                "Vikings",
                &[("Id", 4349.into()), ("UserId", 42.into()), ("Uid", "a".into())],
            )
            .row(
                "Vikings",
                &[("Id", 5000.into()), ("UserId", 7.into()), ("Uid", "b".into())],
            )
            .row(
                "AchievementPoints",
                &[("Id", 1.into()), ("VikingId", 4349.into()), ("Value", 10.into())],
            )
            .row(
                "AchievementPoints",
                &[("Id", 2.into()), ("VikingId", 5000.into()), ("Value", 99.into())],
            )
            .row("Groups", &[("GroupId", 1.into()), ("Name", "Berk".into())])
    }

    fn alice() -> OwnerIdentity {
        OwnerIdentity::new("alice", "alice@example.com")
    }

    #[tokio::test]
    async fn test_table_without_owner_column_is_skipped() {
        let db = game_db();
        let policy = ExportPolicy::default();
        let export = SchemaIntrospector::new(&db, &policy)
            .export_set(&alice())
            .await
            .unwrap();

        assert!(export.table("Groups").is_none());
        assert_eq!(
            export.skipped,
            vec![SkippedTable {
                table: "Groups".to_string(),
                reason: SkipReason::NoOwnerColumn,
            }]
        );
    }

    #[tokio::test]
    async fn test_indirect_owner_column_follows_vikings() {
        let db = game_db();
        let policy = ExportPolicy::default();
        let export = SchemaIntrospector::new(&db, &policy)
            .export_set(&alice())
            .await
            .unwrap();

        let points = export.table("AchievementPoints").unwrap();
        assert_eq!(points.rows.len(), 1);
        assert_eq!(points.rows[0]["Value"], Value::Int(10));
        assert_eq!(
            points.schema.owner_column,
            Some(OwnerColumn::Indirect {
                column: "VikingId".into(),
                via: "Vikings".into(),
            })
        );
    }

    #[tokio::test]
    async fn test_empty_owned_table_is_kept_with_zero_rows() {
        let db = game_db();
        let policy = ExportPolicy::default();
        let export = SchemaIntrospector::new(&db, &policy)
            .export_set(&alice())
            .await
            .unwrap();

        let sessions = export.table("Sessions").unwrap();
        assert!(sessions.rows.is_empty());
    }

    #[tokio::test]
    async fn test_root_first_then_parents_then_declared_order() {
        let db = game_db();
        let policy = ExportPolicy::default();
        let export = SchemaIntrospector::new(&db, &policy)
            .export_set(&alice())
            .await
            .unwrap();

        let names: Vec<&str> = export.tables.iter().map(|t| t.schema.name.as_str()).collect();
        assert_eq!(names, vec!["Users", "Vikings", "AchievementPoints", "Sessions"]);
    }

    #[tokio::test]
    async fn test_password_column_is_projected_out() {
        let db = game_db();
        let policy = ExportPolicy::default();
        let export = SchemaIntrospector::new(&db, &policy)
            .export_set(&alice())
            .await
            .unwrap();

        let users = export.table("Users").unwrap();
        assert_eq!(users.schema.columns, vec!["Id", "Username", "Email"]);
        assert!(!users.rows[0].contains_key("Password"));
    }

    #[tokio::test]
    async fn test_unknown_identity_is_fatal() {
        let db = game_db();
        let policy = ExportPolicy::default();
        let err = SchemaIntrospector::new(&db, &policy)
            .export_set(&OwnerIdentity::new("alice", "wrong@example.com"))
            .await
            .unwrap_err();
        assert!(matches!(err, ExportError::IdentityNotFound));
    }

    #[tokio::test]
    async fn test_explicit_order_and_missing_table() {
        let db = game_db();
        let policy = ExportPolicy {
            tables: vec!["Vikings".into(), "Dragons".into(), "Users".into()],
            exclude_tables: vec!["Sessions".into()],
            ..ExportPolicy::default()
        };
        let (schemas, skipped) = SchemaIntrospector::new(&db, &policy)
            .registry()
            .await
            .unwrap();

        let names: Vec<&str> = schemas.iter().map(|s| s.name.as_str()).collect();
        assert_eq!(names, vec!["Vikings", "Users"]);
        assert_eq!(skipped.len(), 1);
        assert_eq!(skipped[0].reason, SkipReason::NotFound);
    }

    #[tokio::test]
    async fn test_two_level_chain() {
        let db = game_db()
            .table("DragonSkills", &["Id", "DragonId", "Skill"])
            .table("Dragons", &["Id", "VikingId", "Name"])
            .row(
                "Dragons",
                &[("Id", 900.into()), ("VikingId", 4349.into()), ("Name", "Toothless".into())],
            )
            .row(
                "DragonSkills",
                &[("Id", 1.into()), ("DragonId", 900.into()), ("Skill", "plasma".into())],
            );
        let mut policy = ExportPolicy::default();
        policy.owner_columns.insert(
            0,
            OwnerLink {
                column: "DragonId".into(),
                via: Some(ViaTable {
                    table: "Dragons".into(),
                    key: "Id".into(),
                    owner: "VikingId".into(),
                }),
            },
        );

        let export = SchemaIntrospector::new(&db, &policy)
            .export_set(&alice())
            .await
            .unwrap();
        let skills = export.table("DragonSkills").unwrap();
        assert_eq!(skills.rows.len(), 1);
        assert_eq!(skills.rows[0]["Skill"], Value::Text("plasma".into()));
    }
}

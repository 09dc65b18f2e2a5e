// ABOUTME: Declarative export policy loaded from TOML
// ABOUTME: Describes the owner root, ownership chains, table order and exclusions

use crate::error::{ExportError, Result};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::fs;
use std::path::Path;

/// Longest ownership chain the introspector will follow.
pub const MAX_OWNER_DEPTH: usize = 4;

/// Table holding one row per account, located by the identity columns.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RootTable {
    pub table: String,
    pub key: String,
    pub username_column: String,
    pub email_column: String,
}

impl Default for RootTable {
    fn default() -> Self {
        Self {
            table: "Users".to_string(),
            key: "Id".to_string(),
            username_column: "Username".to_string(),
            email_column: "Email".to_string(),
        }
    }
}

/// Parent table used to derive owner keys for an indirect owner column.
///
/// `VikingId` rows belong to the account whose `Vikings.UserId` matches, so the
/// link is `{ table = "Vikings", key = "Id", owner = "UserId" }`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ViaTable {
    pub table: String,
    pub key: String,
    pub owner: String,
}

/// A recognized ownership column. `via = None` means the column holds root keys.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct OwnerLink {
    pub column: String,
    #[serde(default)]
    pub via: Option<ViaTable>,
}

/// Which tables are exported, in what order, and through which owner column.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ExportPolicy {
    pub root: RootTable,
    /// Explicit table order. Empty means every table in the schema.
    pub tables: Vec<String>,
    pub exclude_tables: Vec<String>,
    /// Checked in order; the first column a table has wins.
    pub owner_columns: Vec<OwnerLink>,
    /// Per-table projection applied before dumping.
    pub exclude_columns: BTreeMap<String, Vec<String>>,
}

impl Default for ExportPolicy {
    fn default() -> Self {
        let mut exclude_columns = BTreeMap::new();
        exclude_columns.insert("Users".to_string(), vec!["Password".to_string()]);

        Self {
            root: RootTable::default(),
            tables: Vec::new(),
            exclude_tables: Vec::new(),
            owner_columns: vec![
                OwnerLink {
                    column: "VikingId".to_string(),
                    via: Some(ViaTable {
                        table: "Vikings".to_string(),
                        key: "Id".to_string(),
                        owner: "UserId".to_string(),
                    }),
                },
                OwnerLink {
                    column: "UserId".to_string(),
                    via: None,
                },
            ],
            exclude_columns,
        }
    }
}

impl ExportPolicy {
    pub fn owner_link(&self, column: &str) -> Option<&OwnerLink> {
        self.owner_columns.iter().find(|link| link.column == column)
    }

    pub fn is_table_excluded(&self, table: &str) -> bool {
        self.exclude_tables.iter().any(|t| t == table)
    }

    pub fn is_column_excluded(&self, table: &str, column: &str) -> bool {
        self.exclude_columns
            .get(table)
            .is_some_and(|cols| cols.iter().any(|c| c == column))
    }

    /// Tables that own derived key sets, in owner-column priority order.
    pub fn via_tables(&self) -> Vec<&str> {
        let mut seen = HashSet::new();
        self.owner_columns
            .iter()
            .filter_map(|link| link.via.as_ref())
            .map(|via| via.table.as_str())
            .filter(|t| seen.insert(*t))
            .collect()
    }

    /// Number of hops from `column` to the root key set.
    pub fn chain_depth(&self, column: &str) -> Result<usize> {
        let mut depth = 0;
        let mut current = column;
        loop {
            let link = self.owner_link(current).ok_or_else(|| {
                ExportError::Policy(format!("'{}' is not a declared owner column", current))
            })?;
            match &link.via {
                None => return Ok(depth),
                Some(via) => {
                    depth += 1;
                    if depth > MAX_OWNER_DEPTH {
                        return Err(ExportError::Policy(format!(
                            "ownership chain from '{}' is cyclic or deeper than {}",
                            column, MAX_OWNER_DEPTH
                        )));
                    }
                    current = &via.owner;
                }
            }
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.root.table.is_empty() || self.root.key.is_empty() {
            return Err(ExportError::Policy("root table and key must be set".into()));
        }
        if self.owner_columns.is_empty() {
            return Err(ExportError::Policy(
                "at least one owner column must be declared".into(),
            ));
        }

        let mut seen = HashSet::new();
        for link in &self.owner_columns {
            if !seen.insert(link.column.as_str()) {
                return Err(ExportError::Policy(format!(
                    "owner column '{}' declared twice",
                    link.column
                )));
            }
        }
        for link in &self.owner_columns {
            self.chain_depth(&link.column)?;
        }
        if self.is_table_excluded(&self.root.table) {
            return Err(ExportError::Policy(format!(
                "root table '{}' cannot be excluded",
                self.root.table
            )));
        }
        Ok(())
    }
}

/// Load an export policy from a TOML file and validate it.
pub fn load_policy_from_file(path: impl AsRef<Path>) -> anyhow::Result<ExportPolicy> {
    use anyhow::Context;

    let path = path.as_ref();
    let raw = fs::read_to_string(path)
        .with_context(|| format!("Failed to read export policy {}", path.display()))?;
    let policy = parse_policy(&raw)
        .with_context(|| format!("Failed to load export policy {}", path.display()))?;
    Ok(policy)
}

pub fn parse_policy(raw: &str) -> Result<ExportPolicy> {
    let policy: ExportPolicy =
        toml::from_str(raw).map_err(|e| ExportError::Policy(e.to_string()))?;
    policy.validate()?;
    Ok(policy)
}

//! Table schema used to resolve foreign keys and persisted columns.

use serde::{Deserialize, Serialize};

use crate::ResolutionError;

/// Tables known to the run.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Schema {
    /// Table definitions.
    #[serde(default)]
    pub tables: Vec<TableSchema>,
}

/// One table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TableSchema {
    /// Table name.
    pub name: String,
    /// Primary key column.
    #[serde(default = "default_primary_key")]
    pub primary_key: String,
    /// Plain columns.
    #[serde(default)]
    pub columns: Vec<String>,
    /// Outgoing foreign keys.
    #[serde(default)]
    pub foreign_keys: Vec<ForeignKey>,
}

fn default_primary_key() -> String {
    "id".to_string()
}

/// `column -> references.primary_key`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ForeignKey {
    /// Column on the owning table.
    pub column: String,
    /// Referenced table.
    pub references: String,
}

impl TableSchema {
    /// Whether `column` is the primary key, a plain column or a foreign key.
    pub fn has_column(&self, column: &str) -> bool {
        self.primary_key == column
            || self.columns.iter().any(|c| c == column)
            || self.foreign_keys.iter().any(|fk| fk.column == column)
    }
}

impl Schema {
    /// Looks up a table.
    pub fn table(&self, name: &str) -> Option<&TableSchema> {
        self.tables.iter().find(|t| t.name == name)
    }

    /// Finds the single column of `child` that references `parent`.
    ///
    /// # Errors
    ///
    /// Fails when `child` is unknown, or when zero or several foreign keys
    /// point at `parent`.
    pub fn foreign_key(&self, child: &str, parent: &str) -> Result<&str, ResolutionError> {
        let table = self
            .table(child)
            .ok_or_else(|| ResolutionError::UnknownTable(child.to_string()))?;
        let candidates: Vec<&str> = table
            .foreign_keys
            .iter()
            .filter(|fk| fk.references == parent)
            .map(|fk| fk.column.as_str())
            .collect();
        match candidates.as_slice() {
            [column] => Ok(*column),
            [] => Err(ResolutionError::MissingForeignKey {
                child: child.to_string(),
                parent: parent.to_string(),
            }),
            many => Err(ResolutionError::AmbiguousForeignKey {
                child: child.to_string(),
                parent: parent.to_string(),
                candidates: many.iter().map(|c| c.to_string()).collect(),
            }),
        }
    }
}

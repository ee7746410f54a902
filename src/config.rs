use serde::{Deserialize, Serialize};
use std::collections::HashSet;

use crate::error::{Error, Result};

/// The parsed generator configuration: which tables to expose and how
/// catalog types map onto Rust types.
#[derive(Debug, Serialize, Deserialize, Clone, Default)]
pub struct GenConfig {
    /// Emit `#[tracing::instrument]` on the generated client methods.
    #[serde(default)]
    pub instrument: bool,
    #[serde(default, rename = "type_override")]
    pub type_overrides: Vec<TypeOverride>,
    #[serde(default, rename = "table")]
    pub tables: Vec<TableConfig>,
}

#[derive(Debug, Serialize, Deserialize, Clone, Default)]
pub struct TableConfig {
    pub name: String,
    /// Don't infer relationships from foreign keys declared on this table.
    #[serde(default)]
    pub no_infer_belongs_to: bool,
    #[serde(default)]
    pub created_at_field: Option<String>,
    #[serde(default)]
    pub updated_at_field: Option<String>,
    #[serde(default)]
    pub belongs_to: Vec<BelongsToConfig>,
}

#[derive(Debug, Serialize, Deserialize, Clone, Default)]
pub struct BelongsToConfig {
    #[serde(default)]
    pub table: String,
    #[serde(default)]
    pub key_field: String,
    #[serde(default)]
    pub one_to_one: bool,
}

/// Replaces the default mapping for one catalog type.
///
/// `convert` and `nullable_convert` are paths to functions (or closures)
/// applied to the value decoded as `scan_type`. `bind` and `bind_array` are
/// expression templates where `{}` stands for the value being bound.
#[derive(Debug, Serialize, Deserialize, Clone, Default)]
pub struct TypeOverride {
    pub catalog_type: String,
    pub rust_type: String,
    #[serde(default)]
    pub nullable_type: Option<String>,
    #[serde(default)]
    pub scan_type: Option<String>,
    #[serde(default)]
    pub convert: Option<String>,
    #[serde(default)]
    pub nullable_convert: Option<String>,
    #[serde(default)]
    pub bind: Option<String>,
    #[serde(default)]
    pub bind_array: Option<String>,
}

impl GenConfig {
    pub fn from_toml(text: &str) -> anyhow::Result<Self> {
        let mut config: GenConfig = toml::from_str(text)?;
        config.normalize()?;
        Ok(config)
    }

    /// Trim names and reject duplicate tables.
    pub fn normalize(&mut self) -> Result<()> {
        let mut seen = HashSet::new();
        for table in &mut self.tables {
            table.name = table.name.trim().to_string();
            if table.name.is_empty() {
                return Err(Error::EmptyTableName);
            }
            if !seen.insert(table.name.clone()) {
                return Err(Error::DuplicateTable {
                    table: table.name.clone(),
                });
            }
            for field in [&mut table.created_at_field, &mut table.updated_at_field] {
                if field.as_deref().is_some_and(|f| f.trim().is_empty()) {
                    *field = None;
                }
            }
        }
        Ok(())
    }

    pub fn table(&self, name: &str) -> Option<&TableConfig> {
        self.tables.iter().find(|t| t.name == name)
    }

    pub fn table_names(&self) -> Vec<String> {
        self.tables.iter().map(|t| t.name.clone()).collect()
    }
}

//! Catalog introspection.
//!
//! Metadata building works against the [`Catalog`] trait so it can run over a
//! live database or a [`CatalogSnapshot`] loaded from disk. The Postgres
//! introspection below produces such a snapshot up front; everything after it
//! is synchronous.

use serde::{Deserialize, Serialize};
use sqlx::Row;
use std::collections::BTreeMap;

use crate::error::{Error, Result};

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct CatalogColumn {
    pub name: String,
    #[serde(rename = "type")]
    pub type_name: String,
    #[serde(default)]
    pub nullable: bool,
    #[serde(default)]
    pub is_primary_key: bool,
}

impl CatalogColumn {
    pub fn new(name: &str, type_name: &str) -> Self {
        CatalogColumn {
            name: name.to_string(),
            type_name: type_name.to_string(),
            nullable: false,
            is_primary_key: false,
        }
    }

    pub fn nullable(mut self) -> Self {
        self.nullable = true;
        self
    }

    pub fn primary_key(mut self) -> Self {
        self.is_primary_key = true;
        self
    }
}

/// A foreign key declared on a table, pointing at `ref_table`.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct CatalogForeignKey {
    pub name: String,
    pub columns: Vec<String>,
    pub ref_table: String,
    pub ref_columns: Vec<String>,
    /// The referencing columns are covered by a unique index.
    #[serde(default)]
    pub unique: bool,
}

pub trait Catalog {
    /// Columns of `table` in catalog (ordinal) order.
    fn list_columns(&self, table: &str) -> Result<Vec<CatalogColumn>>;

    /// Foreign keys declared on `table`.
    fn list_foreign_keys(&self, table: &str) -> Result<Vec<CatalogForeignKey>>;
}

#[derive(Debug, Serialize, Deserialize, Clone, Default, PartialEq, Eq)]
pub struct CatalogTable {
    #[serde(default)]
    pub columns: Vec<CatalogColumn>,
    #[serde(default)]
    pub foreign_keys: Vec<CatalogForeignKey>,
}

/// An in-memory copy of the parts of the catalog the generator reads.
#[derive(Debug, Serialize, Deserialize, Clone, Default, PartialEq, Eq)]
pub struct CatalogSnapshot {
    #[serde(default)]
    pub tables: BTreeMap<String, CatalogTable>,
}

impl CatalogSnapshot {
    pub fn add_table(&mut self, name: &str, columns: Vec<CatalogColumn>) -> &mut Self {
        self.tables.entry(name.to_string()).or_default().columns = columns;
        self
    }

    pub fn add_foreign_key(
        &mut self,
        table: &str,
        name: &str,
        column: &str,
        ref_table: &str,
        ref_column: &str,
    ) -> &mut Self {
        self.tables
            .entry(table.to_string())
            .or_default()
            .foreign_keys
            .push(CatalogForeignKey {
                name: name.to_string(),
                columns: vec![column.to_string()],
                ref_table: ref_table.to_string(),
                ref_columns: vec![ref_column.to_string()],
                unique: false,
            });
        self
    }

    pub fn from_toml(text: &str) -> anyhow::Result<Self> {
        Ok(toml::from_str(text)?)
    }

    fn get(&self, table: &str) -> Result<&CatalogTable> {
        self.tables.get(table).ok_or_else(|| Error::TableNotFound {
            table: table.to_string(),
        })
    }
}

impl Catalog for CatalogSnapshot {
    fn list_columns(&self, table: &str) -> Result<Vec<CatalogColumn>> {
        Ok(self.get(table)?.columns.clone())
    }

    fn list_foreign_keys(&self, table: &str) -> Result<Vec<CatalogForeignKey>> {
        Ok(self.get(table)?.foreign_keys.clone())
    }
}

const COLUMNS_QUERY: &str = "\
SELECT a.attname::text AS column_name, \
       format_type(a.atttypid, NULL) AS type_name, \
       NOT a.attnotnull AS nullable, \
       EXISTS ( \
           SELECT 1 FROM pg_index i \
           WHERE i.indrelid = c.oid AND i.indisprimary AND a.attnum = ANY(i.indkey) \
       ) AS is_primary_key \
FROM pg_attribute a \
JOIN pg_class c ON c.oid = a.attrelid \
JOIN pg_namespace n ON n.oid = c.relnamespace \
WHERE c.relname = $1 AND n.nspname = current_schema() \
  AND a.attnum > 0 AND NOT a.attisdropped \
ORDER BY a.attnum";

const FOREIGN_KEYS_QUERY: &str = "\
SELECT con.conname::text AS constraint_name, \
       ARRAY( \
           SELECT a.attname::text FROM unnest(con.conkey) WITH ORDINALITY AS k(attnum, ord) \
           JOIN pg_attribute a ON a.attrelid = con.conrelid AND a.attnum = k.attnum \
           ORDER BY k.ord \
       ) AS columns, \
       ref.relname::text AS ref_table, \
       ARRAY( \
           SELECT a.attname::text FROM unnest(con.confkey) WITH ORDINALITY AS k(attnum, ord) \
           JOIN pg_attribute a ON a.attrelid = con.confrelid AND a.attnum = k.attnum \
           ORDER BY k.ord \
       ) AS ref_columns, \
       EXISTS ( \
           SELECT 1 FROM pg_index ix \
           WHERE ix.indrelid = con.conrelid AND ix.indisunique \
             AND ix.indkey::int2[] @> con.conkey \
             AND ix.indnatts = array_length(con.conkey, 1) \
       ) AS is_unique \
FROM pg_constraint con \
JOIN pg_class c ON c.oid = con.conrelid \
JOIN pg_namespace n ON n.oid = c.relnamespace \
JOIN pg_class ref ON ref.oid = con.confrelid \
WHERE con.contype = 'f' AND c.relname = $1 AND n.nspname = current_schema() \
ORDER BY con.conname";

/// Introspect the given tables of the connected Postgres database.
///
/// Tables that don't exist are left out of the snapshot; metadata building
/// reports them as [`Error::TableNotFound`].
pub async fn introspect_postgres(
    pool: &sqlx::PgPool,
    tables: &[String],
) -> anyhow::Result<CatalogSnapshot> {
    let mut snapshot = CatalogSnapshot::default();

    for table in tables {
        let column_rows = sqlx::query(COLUMNS_QUERY)
            .bind(table)
            .fetch_all(pool)
            .await?;
        if column_rows.is_empty() {
            tracing::warn!("table '{}' not found in current schema", table);
            continue;
        }

        let mut columns = Vec::with_capacity(column_rows.len());
        for r in column_rows {
            columns.push(CatalogColumn {
                name: r.get("column_name"),
                type_name: r.get("type_name"),
                nullable: r.get("nullable"),
                is_primary_key: r.get("is_primary_key"),
            });
        }

        let fk_rows = sqlx::query(FOREIGN_KEYS_QUERY)
            .bind(table)
            .fetch_all(pool)
            .await?;
        let mut foreign_keys = Vec::with_capacity(fk_rows.len());
        for r in fk_rows {
            foreign_keys.push(CatalogForeignKey {
                name: r.get("constraint_name"),
                columns: r.get("columns"),
                ref_table: r.get("ref_table"),
                ref_columns: r.get("ref_columns"),
                unique: r.get("is_unique"),
            });
        }

        tracing::debug!(
            "introspected '{}': {} columns, {} foreign keys",
            table,
            columns.len(),
            foreign_keys.len()
        );
        snapshot.tables.insert(
            table.clone(),
            CatalogTable {
                columns,
                foreign_keys,
            },
        );
    }

    Ok(snapshot)
}

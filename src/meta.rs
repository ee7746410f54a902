//! Catalog metadata: one [`TableMeta`] per configured table.

use std::collections::{BTreeMap, BTreeSet};

use crate::catalog::{Catalog, CatalogColumn, CatalogForeignKey};
use crate::config::{GenConfig, TableConfig};
use crate::error::{Error, Result};
use crate::naming;
use crate::types::{TypeInfo, TypeTable};

#[derive(Debug, Clone, PartialEq)]
pub struct ColumnMeta {
    pub name: String,
    pub field_name: String,
    pub type_info: TypeInfo,
    pub nullable: bool,
    pub primary_key: bool,
    /// Position in generation-time column order; also the field-mask bit.
    pub index: usize,
}

impl ColumnMeta {
    pub fn field_type(&self) -> &str {
        self.type_info.field_type(self.nullable)
    }

    /// Name of the `<COLUMN>_FIELD_INDEX` constant.
    pub fn index_const(&self) -> String {
        format!("{}_FIELD_INDEX", naming::const_ident(&self.name))
    }
}

/// A single-column edge `points_from.from_column -> points_to.to_column`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelationshipMeta {
    pub points_from: String,
    pub from_column: String,
    pub points_to: String,
    pub to_column: String,
    pub one_to_one: bool,
    /// The foreign key column is nullable, so the relation may be absent.
    pub nullable: bool,
    /// Declared as `belongs_to` in the config rather than inferred.
    pub explicit: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TableMeta {
    pub name: String,
    pub type_name: String,
    pub primary_key: usize,
    pub columns: Vec<ColumnMeta>,
    /// Edges pointing into this table from the tables that reference it.
    pub references: Vec<RelationshipMeta>,
    pub created_at: Option<usize>,
    pub updated_at: Option<usize>,
}

impl TableMeta {
    pub fn pkey(&self) -> &ColumnMeta {
        &self.columns[self.primary_key]
    }

    pub fn column(&self, name: &str) -> Option<&ColumnMeta> {
        self.columns.iter().find(|c| c.name == name)
    }

    /// Columns written by an insert: everything except the primary key.
    pub fn insert_columns(&self) -> impl Iterator<Item = &ColumnMeta> {
        self.columns.iter().filter(|c| !c.primary_key)
    }

    pub fn snake(&self) -> String {
        naming::snake(&self.name)
    }
}

/// A discovered single-column foreign key, before inference filtering.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ForeignKeyMeta {
    pub name: String,
    pub column: String,
    pub ref_table: String,
    pub ref_column: String,
    pub unique: bool,
}

#[derive(Debug, Clone)]
pub struct TableInfo {
    pub config: TableConfig,
    pub meta: TableMeta,
    pub foreign_keys: Vec<ForeignKeyMeta>,
}

/// Name-indexed metadata for every configured table.
#[derive(Debug, Clone, Default)]
pub struct Registry {
    pub tables: BTreeMap<String, TableInfo>,
}

impl Registry {
    pub fn get(&self, table: &str) -> Option<&TableInfo> {
        self.tables.get(table)
    }

    pub fn meta(&self, table: &str) -> Option<&TableMeta> {
        self.tables.get(table).map(|t| &t.meta)
    }

    pub fn contains(&self, table: &str) -> bool {
        self.tables.contains_key(table)
    }

    pub fn metas(&self) -> impl Iterator<Item = &TableMeta> {
        self.tables.values().map(|t| &t.meta)
    }
}

/// Every catalog type used by a configured table; overrides may target these.
pub fn catalog_types(config: &GenConfig, catalog: &dyn Catalog) -> Result<BTreeSet<String>> {
    let mut types = BTreeSet::new();
    for table in &config.tables {
        for column in catalog.list_columns(&table.name)? {
            types.insert(column.type_name);
        }
    }
    Ok(types)
}

/// Build the registry. Relationships are left empty here; see
/// [`crate::relations`].
pub fn build_registry(
    config: &GenConfig,
    catalog: &dyn Catalog,
    types: &TypeTable,
) -> Result<Registry> {
    let configured: BTreeSet<&str> = config.tables.iter().map(|t| t.name.as_str()).collect();
    let mut registry = Registry::default();

    for table in &config.tables {
        let columns = catalog.list_columns(&table.name)?;
        if columns.is_empty() {
            return Err(Error::TableNotFound {
                table: table.name.clone(),
            });
        }
        let meta = build_table(table, &columns, types)?;

        let mut foreign_keys = Vec::new();
        for fk in catalog.list_foreign_keys(&table.name)? {
            if let Some(fk) = single_column_fk(&table.name, fk, &configured)? {
                foreign_keys.push(fk);
            }
        }

        tracing::debug!(
            "table '{}': {} columns, {} foreign keys",
            meta.name,
            meta.columns.len(),
            foreign_keys.len()
        );
        registry.tables.insert(
            table.name.clone(),
            TableInfo {
                config: table.clone(),
                meta,
                foreign_keys,
            },
        );
    }

    Ok(registry)
}

fn build_table(table: &TableConfig, columns: &[CatalogColumn], types: &TypeTable) -> Result<TableMeta> {
    let mut metas = Vec::with_capacity(columns.len());
    for (index, c) in columns.iter().enumerate() {
        let type_info = types
            .resolve(&c.type_name)
            .ok_or_else(|| Error::UnknownType {
                table: table.name.clone(),
                column: c.name.clone(),
                type_name: c.type_name.clone(),
            })?
            .clone();
        metas.push(ColumnMeta {
            name: c.name.clone(),
            field_name: naming::field_ident(&c.name),
            type_info,
            nullable: c.nullable,
            primary_key: c.is_primary_key,
            index,
        });
    }

    let pkeys: Vec<&ColumnMeta> = metas.iter().filter(|c| c.primary_key).collect();
    let primary_key = match pkeys.as_slice() {
        [] => {
            return Err(Error::NoPrimaryKey {
                table: table.name.clone(),
            })
        }
        [pk] => pk.index,
        many => {
            return Err(Error::CompositePrimaryKey {
                table: table.name.clone(),
                columns: many
                    .iter()
                    .map(|c| c.name.as_str())
                    .collect::<Vec<_>>()
                    .join(", "),
            })
        }
    };

    let created_at = timestamp_column(table, &metas, table.created_at_field.as_deref(), "created-at")?;
    let updated_at = timestamp_column(table, &metas, table.updated_at_field.as_deref(), "updated-at")?;

    Ok(TableMeta {
        name: table.name.clone(),
        type_name: naming::type_ident(&table.name),
        primary_key,
        columns: metas,
        references: Vec::new(),
        created_at,
        updated_at,
    })
}

fn timestamp_column(
    table: &TableConfig,
    columns: &[ColumnMeta],
    field: Option<&str>,
    kind: &'static str,
) -> Result<Option<usize>> {
    let Some(field) = field else {
        return Ok(None);
    };
    let column = columns
        .iter()
        .find(|c| c.name == field)
        .ok_or_else(|| Error::MissingTimestamp {
            table: table.name.clone(),
            column: field.to_string(),
            kind,
        })?;
    if column.type_info.timestamp.is_none() {
        return Err(Error::NotATimestamp {
            table: table.name.clone(),
            column: field.to_string(),
            kind,
            type_name: column.type_info.catalog_name.clone(),
        });
    }
    Ok(Some(column.index))
}

/// Multi-column keys into configured tables are fatal; multi-column keys
/// into the rest of the schema are never followed and are skipped.
fn single_column_fk(
    table: &str,
    fk: CatalogForeignKey,
    configured: &BTreeSet<&str>,
) -> Result<Option<ForeignKeyMeta>> {
    match (fk.columns.as_slice(), fk.ref_columns.as_slice()) {
        ([column], [ref_column]) => Ok(Some(ForeignKeyMeta {
            column: column.clone(),
            ref_column: ref_column.clone(),
            name: fk.name,
            ref_table: fk.ref_table,
            unique: fk.unique,
        })),
        _ if configured.contains(fk.ref_table.as_str()) => Err(Error::CompositeForeignKey {
            table: table.to_string(),
            constraint: fk.name,
        }),
        _ => {
            tracing::debug!(
                "{}: skipping multi-column foreign key '{}' into unconfigured table '{}'",
                table,
                fk.name,
                fk.ref_table
            );
            Ok(None)
        }
    }
}

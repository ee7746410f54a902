pub mod client;
pub mod crud;
pub mod includes;
pub mod record;

use crate::meta::{ColumnMeta, Registry};
use crate::relations::{self, IncludeClosure};

/// Knobs for emission that don't come from the catalog.
#[derive(Debug, Clone)]
pub struct GenOptions {
    /// Emit `#[tracing::instrument]` on client methods.
    pub instrument: bool,
    /// Path of the runtime module in the generated crate's dependency graph.
    pub runtime_path: String,
}

impl Default for GenOptions {
    fn default() -> Self {
        GenOptions {
            instrument: false,
            runtime_path: "rowgen::runtime".to_string(),
        }
    }
}

/// Emit the whole client module. Pure: the caller decides where it goes.
pub fn generate_client(registry: &Registry, closure: &IncludeClosure, options: &GenOptions) -> String {
    let mut out = String::new();
    out.push_str(&header(options));
    out.push_str(&includes::include_graph(closure));
    out.push_str(&client::client_types(options));

    for meta in registry.metas() {
        let navs = relations::navigations(registry, &meta.name);
        out.push_str(&record::record_struct(meta, &navs, registry));
        out.push_str(&record::record_impl(meta, closure));
        out.push_str(&record::record_trait_impl(meta, &navs, registry));
        out.push_str(&crud::ops_module(meta, &navs, registry));
        out.push_str(&client::table_methods(meta, options));
    }

    tracing::info!("generated client for {} tables", registry.tables.len());
    out
}

fn header(options: &GenOptions) -> String {
    let mut out = String::new();
    out.push_str("// Code generated by rowgen. DO NOT EDIT.\n\n");
    out.push_str("use std::sync::Arc;\n\n");
    out.push_str(&format!(
        "use {}::{{self, BoxFuture, ColumnIndexCache, Error, FieldSet, IncludeSpec, LoadedRecords, Record, Result}};\n",
        options.runtime_path
    ));
    out.push_str("use sqlx::postgres::{PgConnection, PgPool, PgRow, Postgres};\n");
    out.push_str("use sqlx::Transaction;\n\n");
    out
}

/// Rust string literal for `s`.
pub(crate) fn lit(s: &str) -> String {
    format!("{:?}", s)
}

/// A quoted SQL identifier.
pub(crate) fn ident(s: &str) -> String {
    format!("\"{}\"", s.replace('"', "\"\""))
}

/// `Option<Key>` expression for a column of record `var`.
pub(crate) fn key_expr(var: &str, column: &ColumnMeta) -> String {
    if column.nullable {
        format!("{}.{}.clone()", var, column.field_name)
    } else {
        format!("Some({}.{}.clone())", var, column.field_name)
    }
}

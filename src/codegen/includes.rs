//! Include fill: one query per requested relation and level, sharing
//! records through `LoadedRecords`.

use crate::meta::{Registry, TableMeta};
use crate::relations::{IncludeClosure, NavKind, Navigation};

use super::{ident, key_expr, lit};

/// `INCLUDE_GRAPH`: which tables each table can include directly.
pub fn include_graph(closure: &IncludeClosure) -> String {
    let mut out = String::new();
    out.push_str("const INCLUDE_GRAPH: &[(&str, &[&str])] = &[\n");
    for (table, neighbors) in closure.tables() {
        let names: Vec<String> = neighbors.iter().map(|n| lit(n)).collect();
        out.push_str(&format!("    ({}, &[{}]),\n", lit(table), names.join(", ")));
    }
    out.push_str("];\n\n");
    out
}

/// Emitted above every fill entry point.
pub(crate) const ROOT_NOTE: &str = "    /// The records passed in are filled in place and are not shared with the\n\
    \x20   /// loaded graph: a relation leading back to their table attaches separate\n\
    \x20   /// copies of those rows.\n";

pub fn fill_fns(meta: &TableMeta, navs: &[Navigation], registry: &Registry) -> String {
    let ty = &meta.type_name;
    let mut out = String::new();

    out.push_str(ROOT_NOTE);
    out.push_str(&format!(
        "    pub(super) async fn bulk_fill(\n\
        \x20       conn: &mut PgConnection,\n\
        \x20       cols: &ColumnIndexCache,\n\
        \x20       records: &mut [{ty}],\n\
        \x20       spec: &IncludeSpec,\n\
        \x20   ) -> Result<()> {{\n\
        \x20       runtime::validate_includes(INCLUDE_GRAPH, {ty}::TABLE, spec)?;\n\
        \x20       let mut loaded = LoadedRecords::new();\n\
        \x20       fill_includes(conn, cols, records, spec, &mut loaded).await\n    }}\n\n",
        ty = ty
    ));

    out.push_str(&format!(
        "    pub(super) fn fill_includes<'a>(\n\
        \x20       conn: &'a mut PgConnection,\n\
        \x20       cols: &'a ColumnIndexCache,\n\
        \x20       records: &'a mut [{}],\n\
        \x20       spec: &'a IncludeSpec,\n\
        \x20       loaded: &'a mut LoadedRecords,\n\
        \x20   ) -> BoxFuture<'a, Result<()>> {{\n",
        ty
    ));
    if navs.is_empty() {
        out.push_str("        let _ = (conn, cols, records, spec, loaded);\n");
        out.push_str("        Box::pin(async { Ok(()) })\n    }\n");
        return out;
    }
    out.push_str("        Box::pin(async move {\n");
    out.push_str("            if records.is_empty() {\n                return Ok(());\n            }\n");
    for nav in navs {
        if let Some(block) = fill_relation(meta, nav, registry) {
            out.push_str(&block);
        }
    }
    out.push_str("            Ok(())\n        })\n    }\n");
    out
}

fn fill_relation(meta: &TableMeta, nav: &Navigation, registry: &Registry) -> Option<String> {
    let other = registry.meta(&nav.table)?;
    let local = meta.column(nav.local_column())?;
    let remote = other.column(nav.remote_column())?;
    let ty = &meta.type_name;
    let oty = &other.type_name;
    let field = &nav.field;

    let (clear, link) = match nav.kind {
        NavKind::Children { one_to_one: false } => (
            format!("r.{}.clear()", field),
            format!("r.{}.push(c)", field),
        ),
        _ => (format!("r.{} = None", field), format!("r.{} = Some(c)", field)),
    };
    let keys = if local.nullable {
        format!("records.iter().filter_map(|r| r.{}.clone())", local.field_name)
    } else {
        format!("records.iter().map(|r| r.{}.clone())", local.field_name)
    };
    let sql = format!(
        "SELECT * FROM {} WHERE {} = ANY($1)",
        ident(&other.name),
        ident(&remote.name)
    );

    let i = "            ";
    let mut out = String::new();
    out.push_str(&format!(
        "{i}// {}.{} -> {}.{}\n",
        nav.edge.points_from,
        nav.edge.from_column,
        nav.edge.points_to,
        nav.edge.to_column,
        i = i
    ));
    out.push_str(&format!("{i}if let Some(sub) = spec.get({}) {{\n", lit(&other.name), i = i));
    out.push_str(&format!("{i}    for r in records.iter_mut() {{\n{i}        {};\n{i}    }}\n", clear, i = i));
    out.push_str(&format!("{i}    let keys = runtime::distinct_keys({});\n", keys, i = i));
    out.push_str(&format!("{i}    if !keys.is_empty() {{\n", i = i));
    out.push_str(&format!(
        "{i}        let idx = cols.indices::<{}>(&mut *conn).await?;\n",
        oty,
        i = i
    ));
    out.push_str(&format!("{i}        let rows = sqlx::query({})\n", lit(&sql), i = i));
    out.push_str(&format!(
        "{i}            .bind({})\n",
        local.type_info.bind_array_expr("keys"),
        i = i
    ));
    out.push_str(&format!(
        "{i}            .fetch_all(&mut *conn)\n{i}            .await\n{i}            .map_err(Error::db(\"fill_includes\", {}::TABLE))?;\n",
        oty,
        i = i
    ));
    out.push_str(&format!(
        "{i}        let scanned = runtime::scan_rows::<{}>(\"fill_includes\", &rows, &idx)?;\n",
        oty,
        i = i
    ));
    out.push_str(&format!(
        "{i}        let (mut related, mut fresh) = loaded.partition(scanned, sub);\n",
        i = i
    ));
    out.push_str(&format!(
        "{i}        if !sub.is_empty() {{\n\
         {i}            super::{}_ops::fill_includes(&mut *conn, cols, &mut fresh, sub, &mut *loaded).await?;\n\
         {i}        }}\n",
        other.snake(),
        i = i
    ));
    out.push_str(&format!(
        "{i}        related.extend(loaded.intern_all(fresh, sub));\n",
        i = i
    ));
    out.push_str(&format!(
        "{i}        runtime::attach(\n\
         {i}            &mut *records,\n\
         {i}            &related,\n\
         {i}            |r: &{ty}| {},\n\
         {i}            |c: &{oty}| {},\n\
         {i}            |r: &mut {ty}, c| {},\n\
         {i}        );\n",
        key_expr("r", local),
        key_expr("c", remote),
        link,
        ty = ty,
        oty = oty,
        i = i
    ));
    out.push_str(&format!("{i}    }}\n{i}}}\n", i = i));
    Some(out)
}

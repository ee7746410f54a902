//! Per-table data access, written once against `&mut PgConnection` so the
//! pool-backed and transaction-bound clients share it.

use crate::meta::{ColumnMeta, Registry, TableMeta};
use crate::relations::Navigation;
use crate::types::Timestamp;

use super::{ident, includes, lit};

pub fn ops_module(meta: &TableMeta, navs: &[Navigation], registry: &Registry) -> String {
    let ty = &meta.type_name;
    let pk = meta.pkey();

    let mut out = String::new();
    out.push_str(&format!("mod {}_ops {{\n", meta.snake()));
    out.push_str("    use super::*;\n\n");
    out.push_str(&format!(
        "    const SELECT_BY_KEYS: &str = {};\n",
        lit(&format!(
            "SELECT * FROM {} WHERE {} = ANY($1)",
            ident(&meta.name),
            ident(&pk.name)
        ))
    ));
    out.push_str(&format!(
        "    const DELETE_BY_KEYS: &str = {};\n\n",
        lit(&format!(
            "DELETE FROM {} WHERE {} = ANY($1)",
            ident(&meta.name),
            ident(&pk.name)
        ))
    ));

    out.push_str(&get_and_list(meta));
    out.push_str(&bulk_insert(meta));
    out.push_str(&format!(
        "    pub(super) async fn insert(conn: &mut PgConnection, value: &mut {ty}) -> Result<{k}> {{\n\
        \x20       let ids = bulk_insert(conn, std::slice::from_mut(value)).await?;\n\
        \x20       runtime::exactly_one(\"insert\", {ty}::TABLE, ids)\n    }}\n\n",
        ty = ty,
        k = pk.field_type()
    ));
    out.push_str(&update(meta));
    out.push_str(&bulk_upsert(meta));
    out.push_str(&format!(
        "    pub(super) async fn upsert(\n\
        \x20       conn: &mut PgConnection,\n\
        \x20       value: &mut {ty},\n\
        \x20       conflict: &[&str],\n\
        \x20       mask: &FieldSet,\n\
        \x20   ) -> Result<{k}> {{\n\
        \x20       let ids = bulk_upsert(conn, std::slice::from_mut(value), conflict, mask).await?;\n\
        \x20       Ok(ids.into_iter().next().unwrap_or_else(|| value.{pk}.clone()))\n    }}\n\n",
        ty = ty,
        k = pk.field_type(),
        pk = pk.field_name
    ));
    out.push_str(&delete(meta));
    out.push_str(&includes::fill_fns(meta, navs, registry));
    out.push_str("}\n\n");
    out
}

fn get_and_list(meta: &TableMeta) -> String {
    let ty = &meta.type_name;
    let pk = meta.pkey();
    let k = pk.field_type();
    let mut out = String::new();

    out.push_str(&format!(
        "    pub(super) async fn list(conn: &mut PgConnection, cols: &ColumnIndexCache, ids: &[{k}]) -> Result<Vec<{ty}>> {{\n",
        k = k,
        ty = ty
    ));
    out.push_str("        let keys = runtime::distinct_keys(ids.iter().cloned());\n");
    out.push_str("        if keys.is_empty() {\n            return Ok(Vec::new());\n        }\n");
    out.push_str(&format!(
        "        let idx = cols.indices::<{}>(&mut *conn).await?;\n",
        ty
    ));
    out.push_str("        let rows = sqlx::query(SELECT_BY_KEYS)\n");
    out.push_str(&format!(
        "            .bind({})\n",
        pk.type_info.bind_array_expr("keys")
    ));
    out.push_str("            .fetch_all(&mut *conn)\n            .await\n");
    out.push_str(&format!(
        "            .map_err(Error::db(\"list\", {}::TABLE))?;\n",
        ty
    ));
    out.push_str(&format!(
        "        let records = runtime::scan_rows::<{}>(\"list\", &rows, &idx)?;\n",
        ty
    ));
    out.push_str("        runtime::order_by_keys(\"list\", records, &keys)\n    }\n\n");

    out.push_str(&format!(
        "    pub(super) async fn get(conn: &mut PgConnection, cols: &ColumnIndexCache, id: {k}) -> Result<{ty}> {{\n",
        k = k,
        ty = ty
    ));
    out.push_str("        let records = list(conn, cols, std::slice::from_ref(&id)).await?;\n");
    out.push_str(&format!(
        "        runtime::exactly_one(\"get\", {}::TABLE, records)\n    }}\n\n",
        ty
    ));
    out
}

/// Statements assigning "now" to the configured timestamp columns of `var`.
fn stamp(meta: &TableMeta, columns: &[Option<usize>], var: &str, indent: &str) -> String {
    let mut out = String::new();
    for i in columns.iter().flatten() {
        let c = &meta.columns[*i];
        let now = match c.type_info.timestamp {
            Some(Timestamp::WithoutZone) => "now.naive_utc()",
            _ => "now",
        };
        let value = if c.nullable {
            format!("Some({})", now)
        } else {
            now.to_string()
        };
        out.push_str(&format!("{}{}.{} = {};\n", indent, var, c.field_name, value));
    }
    out
}

fn bulk_insert(meta: &TableMeta) -> String {
    let ty = &meta.type_name;
    let pk = meta.pkey();
    let cols: Vec<&ColumnMeta> = meta.insert_columns().collect();
    let timestamps = [meta.created_at, meta.updated_at];

    let mut out = String::new();
    out.push_str(&format!(
        "    pub(super) async fn bulk_insert(conn: &mut PgConnection, values: &mut [{}]) -> Result<Vec<{}>> {{\n",
        ty,
        pk.field_type()
    ));
    out.push_str("        if values.is_empty() {\n            return Ok(Vec::new());\n        }\n");
    if timestamps.iter().any(Option::is_some) {
        out.push_str("        let now = chrono::Utc::now();\n");
        out.push_str("        for v in values.iter_mut() {\n");
        out.push_str(&stamp(meta, &timestamps, "v", "            "));
        out.push_str("        }\n");
    }

    if cols.is_empty() {
        out.push_str(&format!(
            "        let mut ids = Vec::with_capacity(values.len());\n\
            \x20       for _ in values.iter() {{\n\
            \x20           let id = sqlx::query_scalar::<Postgres, {k}>({sql})\n\
            \x20               .fetch_one(&mut *conn)\n\
            \x20               .await\n\
            \x20               .map_err(Error::db(\"bulk_insert\", {ty}::TABLE))?;\n\
            \x20           ids.push(id);\n\
            \x20       }}\n\
            \x20       Ok(ids)\n    }}\n\n",
            k = pk.field_type(),
            ty = ty,
            sql = lit(&format!(
                "INSERT INTO {} DEFAULT VALUES RETURNING {}",
                ident(&meta.name),
                ident(&pk.name)
            ))
        ));
        return out;
    }

    let names: Vec<String> = cols.iter().map(|c| ident(&c.name)).collect();
    out.push_str(&format!(
        "        let mut ids = Vec::with_capacity(values.len());\n\
        \x20       for chunk in values.chunks(runtime::MAX_BIND_PARAMS / {}) {{\n",
        cols.len()
    ));
    out.push_str(&format!(
        "            let mut qb = sqlx::QueryBuilder::<Postgres>::new({});\n",
        lit(&format!(
            "INSERT INTO {} ({}) ",
            ident(&meta.name),
            names.join(", ")
        ))
    ));
    out.push_str("            qb.push_values(chunk, |mut b, v| {\n");
    for c in &cols {
        out.push_str(&format!(
            "                b.push_bind({});\n",
            c.type_info.bind_expr(&format!("v.{}", c.field_name))
        ));
    }
    out.push_str("            });\n");
    out.push_str(&format!(
        "            qb.push({});\n",
        lit(&format!(" RETURNING {}", ident(&pk.name)))
    ));
    out.push_str(&format!(
        "            let chunk_ids = qb\n\
        \x20               .build_query_scalar::<{}>()\n\
        \x20               .fetch_all(&mut *conn)\n\
        \x20               .await\n\
        \x20               .map_err(Error::db(\"bulk_insert\", {}::TABLE))?;\n",
        pk.field_type(),
        ty
    ));
    out.push_str("            ids.extend(chunk_ids);\n        }\n        Ok(ids)\n    }\n\n");
    out
}

/// `match i { 0 => query.bind(&v.a), .. }` over every column of `meta`.
fn bind_by_index(meta: &TableMeta, var: &str, indent: &str) -> String {
    let mut out = format!("{}query = match i {{\n", indent);
    for c in &meta.columns {
        out.push_str(&format!(
            "{}    {} => query.bind({}),\n",
            indent,
            c.index,
            c.type_info.bind_expr(&format!("{}.{}", var, c.field_name))
        ));
    }
    out.push_str(&format!("{}    _ => query,\n{}}};\n", indent, indent));
    out
}

fn mask_width_check(ty: &str) -> String {
    format!(
        "        if mask.len() != {ty}::MAX_FIELD_INDEX + 1 {{\n\
        \x20           return Err(Error::FieldMaskWidth {{\n\
        \x20               table: {ty}::TABLE,\n\
        \x20               expected: {ty}::MAX_FIELD_INDEX + 1,\n\
        \x20               found: mask.len(),\n\
        \x20           }});\n\
        \x20       }}\n",
        ty = ty
    )
}

fn update(meta: &TableMeta) -> String {
    let ty = &meta.type_name;
    let pk = meta.pkey();

    let mut out = String::new();
    out.push_str(&format!(
        "    pub(super) async fn update(conn: &mut PgConnection, value: &mut {}, mask: &FieldSet) -> Result<{}> {{\n",
        ty,
        pk.field_type()
    ));
    out.push_str(&mask_width_check(ty));
    out.push_str(&format!(
        "        if !mask.test({ty}::{c}) {{\n\
        \x20           return Err(Error::PrimaryKeyRequired {{ table: {ty}::TABLE }});\n\
        \x20       }}\n",
        ty = ty,
        c = pk.index_const()
    ));
    match meta.updated_at {
        Some(i) => {
            out.push_str("        let mut mask = mask.clone();\n");
            out.push_str("        let now = chrono::Utc::now();\n");
            out.push_str(&stamp(meta, &[Some(i)], "value", "        "));
            out.push_str(&format!(
                "        mask.set({}::{});\n",
                ty,
                meta.columns[i].index_const()
            ));
        }
        None => out.push_str("        let mask = mask.clone();\n"),
    }
    out.push_str(&format!(
        "        let sql = runtime::sql::update_stmt({ty}::TABLE, {ty}::COLUMNS, {ty}::{c}, &mask);\n",
        ty = ty,
        c = pk.index_const()
    ));
    out.push_str(&format!(
        "        let mut query = sqlx::query_scalar::<Postgres, {}>(&sql);\n",
        pk.field_type()
    ));
    out.push_str("        for i in mask.iter_ones() {\n");
    out.push_str(&bind_by_index(meta, "value", "            "));
    out.push_str("        }\n");
    out.push_str(&format!(
        "        query\n\
        \x20           .bind({})\n\
        \x20           .fetch_one(&mut *conn)\n\
        \x20           .await\n\
        \x20           .map_err(Error::db(\"update\", {}::TABLE))\n    }}\n\n",
        pk.type_info.bind_expr(&format!("value.{}", pk.field_name)),
        ty
    ));
    out
}

fn bulk_upsert(meta: &TableMeta) -> String {
    let ty = &meta.type_name;
    let pk = meta.pkey();
    let timestamps = [meta.created_at, meta.updated_at];

    let mut out = String::new();
    out.push_str("    /// With an empty mask nothing is updated on conflict and rows that\n");
    out.push_str("    /// already existed are not returned, so the result may be shorter than\n");
    out.push_str("    /// `values` and carries no positional correspondence to it.\n");
    out.push_str(&format!(
        "    pub(super) async fn bulk_upsert(\n\
        \x20       conn: &mut PgConnection,\n\
        \x20       values: &mut [{}],\n\
        \x20       conflict: &[&str],\n\
        \x20       mask: &FieldSet,\n\
        \x20   ) -> Result<Vec<{}>> {{\n",
        ty,
        pk.field_type()
    ));
    out.push_str("        if values.is_empty() {\n            return Ok(Vec::new());\n        }\n");
    out.push_str(&mask_width_check(ty));
    if timestamps.iter().any(Option::is_some) {
        out.push_str("        let now = chrono::Utc::now();\n");
        out.push_str("        for v in values.iter_mut() {\n");
        out.push_str(&stamp(meta, &timestamps, "v", "            "));
        out.push_str("        }\n");
    }
    match meta.updated_at {
        Some(i) => {
            out.push_str("        let mut mask = mask.clone();\n");
            out.push_str("        if !mask.is_empty() {\n");
            out.push_str(&format!(
                "            mask.set({}::{});\n        }}\n",
                ty,
                meta.columns[i].index_const()
            ));
        }
        None => out.push_str("        let mask = mask.clone();\n"),
    }
    out.push_str(&format!(
        "        let target = runtime::conflict_target({ty}::TABLE, {ty}::COLUMNS, {ty}::{c}, conflict)?;\n\
        \x20       let insert = runtime::sql::upsert_columns({ty}::COLUMNS, {ty}::{c}, &mask);\n\
        \x20       let mut ids = Vec::with_capacity(values.len());\n\
        \x20       for chunk in values.chunks(runtime::MAX_BIND_PARAMS / insert.len()) {{\n\
        \x20           let sql = runtime::sql::upsert_stmt({ty}::TABLE, {ty}::COLUMNS, {ty}::{c}, chunk.len(), &target, &mask);\n\
        \x20           let mut query = sqlx::query_scalar::<Postgres, {k}>(&sql);\n\
        \x20           for v in chunk {{\n\
        \x20               for i in insert.iter().copied() {{\n",
        ty = ty,
        c = pk.index_const(),
        k = pk.field_type()
    ));
    out.push_str(&bind_by_index(meta, "v", "                    "));
    out.push_str(&format!(
        "                }}\n\
        \x20           }}\n\
        \x20           let chunk_ids = query\n\
        \x20               .fetch_all(&mut *conn)\n\
        \x20               .await\n\
        \x20               .map_err(Error::db(\"bulk_upsert\", {}::TABLE))?;\n\
        \x20           ids.extend(chunk_ids);\n\
        \x20       }}\n\
        \x20       Ok(ids)\n    }}\n\n",
        ty
    ));
    out
}

fn delete(meta: &TableMeta) -> String {
    let ty = &meta.type_name;
    let pk = meta.pkey();
    let k = pk.field_type();

    let mut out = String::new();
    out.push_str(&format!(
        "    pub(super) async fn bulk_delete(conn: &mut PgConnection, ids: &[{}]) -> Result<()> {{\n",
        k
    ));
    out.push_str("        let keys = runtime::distinct_keys(ids.iter().cloned());\n");
    out.push_str("        if keys.is_empty() {\n            return Ok(());\n        }\n");
    out.push_str(&format!(
        "        let done = sqlx::query(DELETE_BY_KEYS)\n\
        \x20           .bind({})\n\
        \x20           .execute(&mut *conn)\n\
        \x20           .await\n\
        \x20           .map_err(Error::db(\"bulk_delete\", {ty}::TABLE))?;\n\
        \x20       runtime::expect_count(\"bulk_delete\", {ty}::TABLE, keys.len(), done.rows_affected())\n    }}\n\n",
        pk.type_info.bind_array_expr("keys"),
        ty = ty
    ));
    out.push_str(&format!(
        "    pub(super) async fn delete(conn: &mut PgConnection, id: {}) -> Result<()> {{\n\
        \x20       bulk_delete(conn, std::slice::from_ref(&id)).await\n    }}\n\n",
        k
    ));
    out
}

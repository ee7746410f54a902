use crate::meta::TableMeta;
use crate::naming;

use super::{lit, GenOptions};

pub fn client_types(options: &GenOptions) -> String {
    let mut out = String::new();
    out.push_str("/// Pool-backed client. Clones share the pool and the column-index cache.\n");
    out.push_str("#[derive(Clone)]\n");
    out.push_str("pub struct PgClient {\n");
    out.push_str("    pool: PgPool,\n");
    out.push_str("    columns: Arc<ColumnIndexCache>,\n");
    out.push_str("}\n\n");

    out.push_str("impl PgClient {\n");
    out.push_str("    pub fn new(pool: PgPool) -> Self {\n");
    out.push_str("        PgClient {\n            pool,\n            columns: Arc::new(ColumnIndexCache::new()),\n        }\n    }\n\n");
    out.push_str("    pub fn pool(&self) -> &PgPool {\n        &self.pool\n    }\n\n");
    out.push_str("    /// Start a transaction. The returned client routes every call through it.\n");
    out.push_str(&instrument(options, "*"));
    out.push_str("    pub async fn begin(&self) -> Result<TxPgClient<'static>> {\n");
    out.push_str("        let tx = self.pool.begin().await.map_err(Error::db(\"begin\", \"*\"))?;\n");
    out.push_str("        Ok(TxPgClient {\n            tx,\n            columns: Arc::clone(&self.columns),\n        })\n    }\n\n");
    out.push_str("    async fn conn(&self, table: &'static str) -> Result<sqlx::pool::PoolConnection<Postgres>> {\n");
    out.push_str("        self.pool.acquire().await.map_err(Error::db(\"acquire\", table))\n    }\n}\n\n");

    out.push_str("/// Transaction-bound client from [`PgClient::begin`].\n");
    out.push_str("pub struct TxPgClient<'t> {\n");
    out.push_str("    tx: Transaction<'t, Postgres>,\n");
    out.push_str("    columns: Arc<ColumnIndexCache>,\n");
    out.push_str("}\n\n");

    out.push_str("impl TxPgClient<'_> {\n");
    out.push_str("    pub async fn commit(self) -> Result<()> {\n");
    out.push_str("        self.tx.commit().await.map_err(Error::db(\"commit\", \"*\"))\n    }\n\n");
    out.push_str("    pub async fn rollback(self) -> Result<()> {\n");
    out.push_str("        self.tx.rollback().await.map_err(Error::db(\"rollback\", \"*\"))\n    }\n}\n\n");
    out
}

fn instrument(options: &GenOptions, table: &str) -> String {
    if options.instrument {
        format!(
            "    #[tracing::instrument(skip_all, fields(table = {}))]\n",
            lit(table)
        )
    } else {
        String::new()
    }
}

/// One method signature plus the ops call it forwards to.
struct Method {
    doc: Option<&'static str>,
    name: String,
    params: String,
    ret: String,
    call: String,
}

fn methods(meta: &TableMeta) -> Vec<Method> {
    let ty = &meta.type_name;
    let k = meta.pkey().field_type();
    let one = naming::snake(ty);
    let many = naming::plural(&one);
    let m = |doc, name: String, params: &str, ret: String, call: &str| Method {
        doc,
        name,
        params: params.to_string(),
        ret,
        call: call.to_string(),
    };

    vec![
        m(
            None,
            format!("get_{}", one),
            &format!("id: {}", k),
            ty.to_string(),
            "get(CONN, COLS, id)",
        ),
        m(
            Some("Fails unless every distinct key matches a row; results follow key order."),
            format!("list_{}", many),
            &format!("ids: &[{}]", k),
            format!("Vec<{}>", ty),
            "list(CONN, COLS, ids)",
        ),
        m(
            None,
            format!("insert_{}", one),
            &format!("value: &mut {}", ty),
            k.to_string(),
            "insert(CONN, value)",
        ),
        m(
            Some("Inserts every record and returns the generated keys in insertion order."),
            format!("bulk_insert_{}", many),
            &format!("values: &mut [{}]", ty),
            format!("Vec<{}>", k),
            "bulk_insert(CONN, values)",
        ),
        m(
            Some("Writes the columns selected in `fields`, which must include the primary key."),
            format!("update_{}", one),
            &format!("value: &mut {}, fields: &FieldSet", ty),
            k.to_string(),
            "update(CONN, value, fields)",
        ),
        m(
            None,
            format!("upsert_{}", one),
            &format!("value: &mut {}, conflict: &[&str], fields: &FieldSet", ty),
            k.to_string(),
            "upsert(CONN, value, conflict, fields)",
        ),
        m(
            Some("With an empty `fields` mask existing rows are left alone and their keys are not returned."),
            format!("bulk_upsert_{}", many),
            &format!("values: &mut [{}], conflict: &[&str], fields: &FieldSet", ty),
            format!("Vec<{}>", k),
            "bulk_upsert(CONN, values, conflict, fields)",
        ),
        m(
            None,
            format!("delete_{}", one),
            &format!("id: {}", k),
            "()".to_string(),
            "delete(CONN, id)",
        ),
        m(
            Some("Fails unless exactly as many rows were deleted as there are distinct keys."),
            format!("bulk_delete_{}", many),
            &format!("ids: &[{}]", k),
            "()".to_string(),
            "bulk_delete(CONN, ids)",
        ),
        m(
            Some("Values passed in are not shared with the loaded graph; a relation back to their table attaches copies."),
            format!("{}_fill_includes", one),
            &format!("value: &mut {}, includes: &IncludeSpec", ty),
            "()".to_string(),
            "bulk_fill(CONN, COLS, std::slice::from_mut(value), includes)",
        ),
        m(
            Some("Values passed in are not shared with the loaded graph; a relation back to their table attaches copies."),
            format!("{}_bulk_fill_includes", one),
            &format!("values: &mut [{}], includes: &IncludeSpec", ty),
            "()".to_string(),
            "bulk_fill(CONN, COLS, values, includes)",
        ),
    ]
}

/// The table's methods on both clients.
pub fn table_methods(meta: &TableMeta, options: &GenOptions) -> String {
    let ops = format!("{}_ops", meta.snake());
    let mut pool = String::new();
    let mut tx = String::new();

    for method in methods(meta) {
        for (out, receiver) in [(&mut pool, "&self"), (&mut tx, "&mut self")] {
            if let Some(doc) = method.doc {
                out.push_str(&format!("    /// {}\n", doc));
            }
            out.push_str(&instrument(options, &meta.name));
            out.push_str(&format!(
                "    pub async fn {}({}, {}) -> Result<{}> {{\n",
                method.name, receiver, method.params, method.ret
            ));
            let call = if receiver == "&self" {
                out.push_str(&format!(
                    "        let mut conn = self.conn({}::TABLE).await?;\n",
                    meta.type_name
                ));
                method.call.replace("CONN", "&mut *conn")
            } else {
                method.call.replace("CONN", "&mut *self.tx")
            };
            out.push_str(&format!(
                "        {}::{}.await\n    }}\n\n",
                ops,
                call.replace("COLS", "&self.columns")
            ));
        }
    }

    format!(
        "impl PgClient {{\n{}}}\n\nimpl TxPgClient<'_> {{\n{}}}\n\n",
        pool.trim_end_matches('\n').to_string() + "\n",
        tx.trim_end_matches('\n').to_string() + "\n"
    )
}

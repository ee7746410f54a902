use crate::meta::{Registry, TableMeta};
use crate::relations::{IncludeClosure, NavKind, Navigation};
use crate::runtime::IncludeSpec;

use super::lit;

/// Relation fields in declaration order: field name, type, empty value.
fn relation_fields(navs: &[Navigation], registry: &Registry) -> Vec<(String, String, &'static str)> {
    let mut out = Vec::new();
    for nav in navs {
        let Some(other) = registry.meta(&nav.table) else {
            continue;
        };
        let (ty, empty) = match nav.kind {
            NavKind::Children { one_to_one: false } => {
                (format!("Vec<Arc<{}>>", other.type_name), "Vec::new()")
            }
            NavKind::Children { one_to_one: true } | NavKind::Parent => {
                (format!("Option<Arc<{}>>", other.type_name), "None")
            }
        };
        out.push((nav.field.clone(), ty, empty));
    }
    out
}

/// The record struct: one field per column, then one per relation.
pub fn record_struct(meta: &TableMeta, navs: &[Navigation], registry: &Registry) -> String {
    let mut out = String::new();
    out.push_str(&format!("/// A row of `{}`.\n", meta.name));
    out.push_str("#[derive(Debug, Clone, PartialEq)]\n");
    out.push_str(&format!("pub struct {} {{\n", meta.type_name));
    for c in &meta.columns {
        out.push_str(&format!("    pub {}: {},\n", c.field_name, c.field_type()));
    }
    for (nav, (field, ty, _)) in navs
        .iter()
        .filter(|n| registry.meta(&n.table).is_some())
        .zip(relation_fields(navs, registry))
    {
        out.push_str(&format!(
            "    /// Loaded through `{}.{}`.\n",
            nav.edge.points_from, nav.edge.from_column
        ));
        out.push_str(&format!("    pub {}: {},\n", field, ty));
    }
    out.push_str("}\n\n");
    out
}

/// Field-index constants and the field set / include constructors.
pub fn record_impl(meta: &TableMeta, closure: &IncludeClosure) -> String {
    let mut out = String::new();
    out.push_str(&format!("impl {} {{\n", meta.type_name));
    for c in &meta.columns {
        out.push_str(&format!("    pub const {}: usize = {};\n", c.index_const(), c.index));
    }
    out.push_str(&format!(
        "    pub const MAX_FIELD_INDEX: usize = {};\n\n",
        meta.columns.len() - 1
    ));

    out.push_str("    pub fn all_fields() -> FieldSet {\n");
    out.push_str("        FieldSet::filled(Self::MAX_FIELD_INDEX + 1)\n    }\n\n");
    out.push_str("    pub fn no_fields() -> FieldSet {\n");
    out.push_str("        FieldSet::new(Self::MAX_FIELD_INDEX + 1)\n    }\n\n");

    out.push_str(&format!(
        "    /// Every relation reachable from `{}`.\n",
        meta.name
    ));
    out.push_str("    pub fn all_includes() -> IncludeSpec {\n");
    out.push_str(&format!(
        "        {}\n",
        spec_expr(&closure.spec(&meta.name), 2)
    ));
    out.push_str("    }\n}\n\n");
    out
}

/// Builder expression for `spec`, one `.with(..)` per nested table.
fn spec_expr(spec: &IncludeSpec, depth: usize) -> String {
    let mut out = format!("IncludeSpec::new({})", lit(spec.table()));
    let pad = "    ".repeat(depth + 1);
    for sub in spec.iter() {
        out.push_str(&format!("\n{}.with({})", pad, spec_expr(sub, depth + 1)));
    }
    out
}

pub fn record_trait_impl(meta: &TableMeta, navs: &[Navigation], registry: &Registry) -> String {
    let pk = meta.pkey();
    let columns: Vec<String> = meta.columns.iter().map(|c| lit(&c.name)).collect();

    let mut out = String::new();
    out.push_str(&format!("impl Record for {} {{\n", meta.type_name));
    out.push_str(&format!("    type Key = {};\n\n", pk.field_type()));
    out.push_str(&format!("    const TABLE: &'static str = {};\n", lit(&meta.name)));
    out.push_str(&format!(
        "    const COLUMNS: &'static [&'static str] = &[{}];\n\n",
        columns.join(", ")
    ));
    out.push_str(&format!(
        "    fn key(&self) -> {} {{\n        self.{}.clone()\n    }}\n\n",
        pk.field_type(),
        pk.field_name
    ));

    out.push_str("    fn scan(row: &PgRow, idx: &[usize]) -> Result<Self, sqlx::Error> {\n");
    out.push_str(&format!("        Ok({} {{\n", meta.type_name));
    for c in &meta.columns {
        let decoded = format!(
            "runtime::get::<{}>(row, idx, {})?",
            c.type_info.decode_type(c.nullable),
            c.index
        );
        out.push_str(&format!(
            "            {}: {},\n",
            c.field_name,
            c.type_info.read_expr(&decoded, c.nullable)
        ));
    }
    for (field, _, empty) in relation_fields(navs, registry) {
        out.push_str(&format!("            {}: {},\n", field, empty));
    }
    out.push_str("        })\n    }\n}\n\n");
    out
}

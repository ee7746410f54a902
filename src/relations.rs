//! Relationship inference and include closures.
//!
//! Edges are stored on the table they point to ([`TableMeta::references`]).
//! Navigation runs both ways: a table reaches the tables referencing it
//! (children) and the tables it references (parents).

use std::collections::{BTreeMap, BTreeSet, HashMap, VecDeque};

use crate::config::GenConfig;
use crate::error::{Error, Result};
use crate::meta::{ColumnMeta, Registry, RelationshipMeta};
use crate::naming;
use crate::runtime::{IncludeGraph, IncludeSpec};

/// Push every foreign key between two configured tables onto the referenced
/// table, unless the referencing table opted out of inference.
pub fn infer_references(registry: &mut Registry) -> Result<()> {
    let mut edges = Vec::new();
    for info in registry.tables.values() {
        if info.config.no_infer_belongs_to {
            tracing::debug!("{}: relationship inference disabled", info.meta.name);
            continue;
        }
        for fk in &info.foreign_keys {
            let Some(target) = registry.meta(&fk.ref_table) else {
                tracing::debug!(
                    "{}: foreign key '{}' points outside the configured tables",
                    info.meta.name,
                    fk.name
                );
                continue;
            };
            let column = info.meta.column(&fk.column).ok_or_else(|| Error::UnknownColumn {
                table: info.meta.name.clone(),
                column: fk.column.clone(),
            })?;
            let ref_column =
                target
                    .column(&fk.ref_column)
                    .ok_or_else(|| Error::UnknownReferencedColumn {
                        table: info.meta.name.clone(),
                        constraint: fk.name.clone(),
                        ref_table: fk.ref_table.clone(),
                        ref_column: fk.ref_column.clone(),
                    })?;
            if let Err(e) = check_key_types(&info.meta.name, column, &target.name, ref_column) {
                tracing::warn!("skipping foreign key '{}': {}", fk.name, e);
                continue;
            }
            edges.push(RelationshipMeta {
                points_from: info.meta.name.clone(),
                from_column: fk.column.clone(),
                points_to: fk.ref_table.clone(),
                to_column: fk.ref_column.clone(),
                one_to_one: fk.unique,
                nullable: column.nullable,
                explicit: false,
            });
        }
    }

    tracing::info!("inferred {} relationships", edges.len());
    for edge in edges {
        if let Some(target) = registry.tables.get_mut(&edge.points_to) {
            target.meta.references.push(edge);
        }
    }
    Ok(())
}

/// File each configured `belongs_to` under the table it points to. An
/// explicit edge replaces an inferred one over the same key column.
pub fn attach_explicit_belongs_to(registry: &mut Registry, config: &GenConfig) -> Result<()> {
    for table in &config.tables {
        for bt in &table.belongs_to {
            let target_name = bt.table.trim();
            let key_field = bt.key_field.trim();
            if target_name.is_empty() {
                return Err(Error::BelongsToMissingTable {
                    table: table.name.clone(),
                });
            }
            if key_field.is_empty() {
                return Err(Error::BelongsToMissingKey {
                    table: table.name.clone(),
                });
            }
            let source = registry.meta(&table.name).ok_or_else(|| Error::TableNotFound {
                table: table.name.clone(),
            })?;
            let target = registry
                .meta(target_name)
                .ok_or_else(|| Error::BelongsToUnknownTable {
                    table: table.name.clone(),
                    target: target_name.to_string(),
                })?;
            let column = source.column(key_field).ok_or_else(|| Error::UnknownColumn {
                table: table.name.clone(),
                column: key_field.to_string(),
            })?;
            let pkey = target.pkey();
            check_key_types(&source.name, column, &target.name, pkey)?;

            let edge = RelationshipMeta {
                points_from: source.name.clone(),
                from_column: column.name.clone(),
                points_to: target.name.clone(),
                to_column: pkey.name.clone(),
                one_to_one: bt.one_to_one,
                nullable: column.nullable,
                explicit: true,
            };
            if let Some(target) = registry.tables.get_mut(target_name) {
                let refs = &mut target.meta.references;
                refs.retain(|e| !(e.points_from == edge.points_from && e.from_column == edge.from_column));
                tracing::debug!(
                    "{}.{} belongs to {}",
                    edge.points_from,
                    edge.from_column,
                    edge.points_to
                );
                refs.push(edge);
            }
        }
    }
    Ok(())
}

/// Keys are matched in a `HashMap`, so both sides must share one Rust type
/// and nullable foreign keys must be plain `Option`s.
fn check_key_types(
    table: &str,
    column: &ColumnMeta,
    ref_table: &str,
    ref_column: &ColumnMeta,
) -> Result<()> {
    let expected = &ref_column.type_info.rust_name;
    let plain_option = format!("Option<{}>", column.type_info.rust_name);
    let option_ok = !column.nullable || column.type_info.nullable_name == plain_option;
    let ref_option_ok = !ref_column.nullable || ref_column.type_info.nullable_name == format!("Option<{}>", expected);
    if &column.type_info.rust_name != expected || !option_ok || !ref_option_ok {
        return Err(Error::KeyTypeMismatch {
            table: table.to_string(),
            column: column.name.clone(),
            found: column.field_type().to_string(),
            ref_table: ref_table.to_string(),
            ref_column: ref_column.name.clone(),
            expected: expected.clone(),
        });
    }
    Ok(())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NavKind {
    /// Rows of another table reference this one.
    Children { one_to_one: bool },
    /// This table references a row of another table.
    Parent,
}

/// One relation field on a record and the edge that fills it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Navigation {
    pub field: String,
    /// The table on the other end; also the include key.
    pub table: String,
    pub kind: NavKind,
    pub edge: RelationshipMeta,
}

impl Navigation {
    /// The column on `this` side of the edge.
    pub fn local_column(&self) -> &str {
        match self.kind {
            NavKind::Children { .. } => &self.edge.to_column,
            NavKind::Parent => &self.edge.from_column,
        }
    }

    /// The column on the other table the query filters by.
    pub fn remote_column(&self) -> &str {
        match self.kind {
            NavKind::Children { .. } => &self.edge.from_column,
            NavKind::Parent => &self.edge.to_column,
        }
    }
}

/// Relation fields of `table`, children first. Self-references are not
/// navigable.
pub fn navigations(registry: &Registry, table: &str) -> Vec<Navigation> {
    let Some(meta) = registry.meta(table) else {
        return Vec::new();
    };
    let mut taken: BTreeSet<String> = meta.columns.iter().map(|c| c.field_name.clone()).collect();
    let mut out = Vec::new();

    let children: Vec<&RelationshipMeta> = meta
        .references
        .iter()
        .filter(|e| e.points_from != table)
        .collect();
    let mut per_table: HashMap<&str, usize> = HashMap::new();
    for e in &children {
        *per_table.entry(e.points_from.as_str()).or_default() += 1;
    }
    for e in children {
        let stem = naming::snake(&e.points_from);
        let base = if e.one_to_one {
            naming::singular(&stem)
        } else {
            naming::plural(&stem)
        };
        let base = if per_table[e.points_from.as_str()] > 1 {
            format!("{}_by_{}", base, naming::snake(&e.from_column))
        } else {
            base
        };
        out.push(Navigation {
            field: unique_field(&mut taken, base, &stem),
            table: e.points_from.clone(),
            kind: NavKind::Children {
                one_to_one: e.one_to_one,
            },
            edge: e.clone(),
        });
    }

    for other in registry.metas() {
        if other.name == table {
            continue;
        }
        for e in other.references.iter().filter(|e| e.points_from == table) {
            let column = naming::snake(&e.from_column);
            let base = match column.strip_suffix("_id") {
                Some(stem) if !stem.is_empty() => stem.to_string(),
                _ => format!("{}_record", column),
            };
            out.push(Navigation {
                field: unique_field(&mut taken, base, &naming::singular(&other.snake())),
                table: other.name.clone(),
                kind: NavKind::Parent,
                edge: e.clone(),
            });
        }
    }
    out
}

fn unique_field(taken: &mut BTreeSet<String>, base: String, qualifier: &str) -> String {
    let mut name = naming::escape_keyword(&base);
    if taken.contains(&name) {
        name = format!("{}_{}", base, qualifier);
    }
    let mut n = 2;
    let stem = name.clone();
    while taken.contains(&name) {
        name = format!("{}{}", stem, n);
        n += 1;
    }
    taken.insert(name.clone());
    name
}

/// Per-table adjacency for include specs, memoized in an arena keyed by
/// table name.
#[derive(Debug, Clone, Default)]
pub struct IncludeClosure {
    arena: BTreeMap<String, BTreeSet<String>>,
}

impl IncludeClosure {
    pub fn build(registry: &Registry) -> Self {
        let mut closure = IncludeClosure::default();
        for table in registry.tables.keys() {
            closure.ensure(registry, table);
        }
        closure
    }

    /// Insert `table` before visiting its neighbors so cycles stop here.
    fn ensure(&mut self, registry: &Registry, table: &str) {
        if self.arena.contains_key(table) {
            return;
        }
        let neighbors: BTreeSet<String> = navigations(registry, table)
            .into_iter()
            .map(|n| n.table)
            .collect();
        self.arena.insert(table.to_string(), neighbors.clone());
        for next in &neighbors {
            self.ensure(registry, next);
        }
    }

    pub fn neighbors(&self, table: &str) -> Option<&BTreeSet<String>> {
        self.arena.get(table)
    }

    pub fn tables(&self) -> impl Iterator<Item = (&String, &BTreeSet<String>)> {
        self.arena.iter()
    }

    /// Every table transitively reachable from `table`, excluding itself.
    pub fn reachable(&self, table: &str) -> BTreeSet<String> {
        let mut seen = BTreeSet::new();
        let mut queue = VecDeque::from([table.to_string()]);
        while let Some(next) = queue.pop_front() {
            for n in self.arena.get(&next).into_iter().flatten() {
                if n != table && seen.insert(n.clone()) {
                    queue.push_back(n.clone());
                }
            }
        }
        seen
    }

    /// The full include spec for `table`: a breadth-first spanning tree of
    /// its closure where each table appears once and the root never nests.
    pub fn spec(&self, table: &str) -> IncludeSpec {
        let mut children: BTreeMap<String, Vec<String>> = BTreeMap::new();
        let mut seen = BTreeSet::from([table.to_string()]);
        let mut queue = VecDeque::from([table.to_string()]);
        while let Some(next) = queue.pop_front() {
            for n in self.arena.get(&next).into_iter().flatten() {
                if seen.insert(n.clone()) {
                    children.entry(next.clone()).or_default().push(n.clone());
                    queue.push_back(n.clone());
                }
            }
        }
        Self::tree(table, &children)
    }

    fn tree(table: &str, children: &BTreeMap<String, Vec<String>>) -> IncludeSpec {
        let mut spec = IncludeSpec::new(table);
        for child in children.get(table).into_iter().flatten() {
            spec.include(Self::tree(child, children));
        }
        spec
    }
}

impl IncludeGraph for IncludeClosure {
    fn adjacent(&self, table: &str) -> Vec<&str> {
        self.arena
            .get(table)
            .into_iter()
            .flatten()
            .map(String::as_str)
            .collect()
    }
}

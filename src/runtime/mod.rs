//! Support code for generated clients.
//!
//! Everything here is called from emitted source; nothing in it runs at
//! generation time except [`IncludeSpec`] and [`IncludeGraph`].

mod columns;
mod error;
mod field_set;
mod include;
mod loaded;
pub mod sql;

use std::collections::{HashMap, HashSet};
use std::fmt::Debug;
use std::hash::Hash;
use std::sync::Arc;

use sqlx::postgres::PgRow;
use sqlx::{Decode, Postgres, Row, Type};

pub use columns::{live_columns, translate, ColumnIndexCache};
pub use futures::future::BoxFuture;
pub use error::{Error, Result};
pub use field_set::FieldSet;
pub use include::{validate_includes, IncludeGraph, IncludeSpec, ParseIncludeError};
pub use loaded::LoadedRecords;

/// Postgres accepts at most this many bind parameters per statement.
pub const MAX_BIND_PARAMS: usize = u16::MAX as usize;

/// A generated record type.
pub trait Record: Sized + Send + Sync + 'static {
    type Key: Clone + Eq + Hash + Debug + Send + Sync + 'static;

    const TABLE: &'static str;
    /// Column names in generation-time order.
    const COLUMNS: &'static [&'static str];

    fn key(&self) -> Self::Key;

    /// Read one row. `idx[i]` is the live position of `COLUMNS[i]`.
    fn scan(row: &PgRow, idx: &[usize]) -> Result<Self, sqlx::Error>;
}

/// Decode generation-time column `i` of `row` through the translation table.
pub fn get<'r, T>(row: &'r PgRow, idx: &[usize], i: usize) -> Result<T, sqlx::Error>
where
    T: Decode<'r, Postgres> + Type<Postgres>,
{
    let pos = idx.get(i).copied().ok_or(sqlx::Error::ColumnIndexOutOfBounds {
        index: i,
        len: idx.len(),
    })?;
    row.try_get(pos)
}

pub fn scan_rows<R: Record>(op: &'static str, rows: &[PgRow], idx: &[usize]) -> Result<Vec<R>> {
    rows.iter()
        .map(|row| R::scan(row, idx).map_err(Error::db(op, R::TABLE)))
        .collect()
}

/// The single item of `items`, or a count mismatch.
pub fn exactly_one<T>(op: &'static str, table: &'static str, items: Vec<T>) -> Result<T> {
    let found = items.len();
    let mut items = items.into_iter();
    match (items.next(), found) {
        (Some(item), 1) => Ok(item),
        _ => Err(Error::CountMismatch {
            op,
            table,
            expected: 1,
            found,
        }),
    }
}

pub fn expect_count(op: &'static str, table: &'static str, expected: usize, found: u64) -> Result<()> {
    if found as usize != expected {
        return Err(Error::CountMismatch {
            op,
            table,
            expected,
            found: found as usize,
        });
    }
    Ok(())
}

/// Conflict target for an upsert: the requested columns, or the primary key
/// when none are given.
pub fn conflict_target<'a>(
    table: &'static str,
    columns: &'static [&'static str],
    pkey: usize,
    requested: &[&'a str],
) -> Result<Vec<&'a str>> {
    if requested.is_empty() {
        return Ok(vec![columns[pkey]]);
    }
    for c in requested {
        if !columns.iter().any(|col| col == c) {
            return Err(Error::MissingColumn {
                table,
                column: c.to_string(),
            });
        }
    }
    Ok(requested.to_vec())
}

/// `keys` with duplicates removed, in first-seen order.
pub fn distinct_keys<K: Clone + Eq + Hash>(keys: impl IntoIterator<Item = K>) -> Vec<K> {
    let mut seen = HashSet::new();
    keys.into_iter().filter(|k| seen.insert(k.clone())).collect()
}

/// Reorder `records` to follow `keys`, failing unless there is exactly one
/// record per key.
pub fn order_by_keys<R: Record>(op: &'static str, records: Vec<R>, keys: &[R::Key]) -> Result<Vec<R>> {
    let mismatch = |found| Error::CountMismatch {
        op,
        table: R::TABLE,
        expected: keys.len(),
        found,
    };
    if records.len() != keys.len() {
        return Err(mismatch(records.len()));
    }
    let mut by_key: HashMap<R::Key, R> = records.into_iter().map(|r| (r.key(), r)).collect();
    let mut out = Vec::with_capacity(keys.len());
    for k in keys {
        match by_key.remove(k) {
            Some(r) => out.push(r),
            None => return Err(mismatch(out.len())),
        }
    }
    Ok(out)
}

/// Hand every record in `targets` the loaded records whose `loaded_key`
/// matches its `target_key`. Records with a null key get nothing.
pub fn attach<T, L, K>(
    targets: &mut [T],
    loaded: &[Arc<L>],
    target_key: impl Fn(&T) -> Option<K>,
    loaded_key: impl Fn(&L) -> Option<K>,
    mut link: impl FnMut(&mut T, Arc<L>),
) where
    K: Eq + Hash,
{
    let mut by_key: HashMap<K, Vec<&Arc<L>>> = HashMap::new();
    for l in loaded {
        if let Some(k) = loaded_key(&**l) {
            by_key.entry(k).or_default().push(l);
        }
    }
    for t in targets.iter_mut() {
        let Some(k) = target_key(&*t) else { continue };
        for l in by_key.get(&k).into_iter().flatten() {
            link(&mut *t, Arc::clone(*l));
        }
    }
}

//! Column-position reconciliation.
//!
//! Generated scans read columns by position. The first scan of a table on a
//! client looks up the table's live column order once and caches a
//! translation from generation-time index to live index.

use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex, PoisonError};

use sqlx::postgres::PgConnection;
use tokio::sync::OnceCell;

use super::error::{Error, Result};
use super::Record;

const LIVE_COLUMNS_QUERY: &str = "\
SELECT column_name::text FROM information_schema.columns \
WHERE table_schema = current_schema() AND table_name = $1 \
ORDER BY ordinal_position";

type Slot = Arc<OnceCell<Arc<[usize]>>>;

/// Per-client cache of translation tables, keyed by table.
#[derive(Debug, Default)]
pub struct ColumnIndexCache {
    slots: Mutex<HashMap<&'static str, Slot>>,
}

impl ColumnIndexCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Translation table for `R`, loading the live column order on first use.
    pub async fn indices<R: Record>(&self, conn: &mut PgConnection) -> Result<Arc<[usize]>> {
        self.get_or_load(R::TABLE, R::COLUMNS, live_columns(conn, R::TABLE))
            .await
    }

    /// Concurrent first calls for one table run a single `load`; the other
    /// callers drop theirs unpolled and wait for its result. A failed load
    /// leaves the slot empty so the next call retries.
    pub async fn get_or_load<Fut>(
        &self,
        table: &'static str,
        columns: &'static [&'static str],
        load: Fut,
    ) -> Result<Arc<[usize]>>
    where
        Fut: Future<Output = Result<Vec<String>, sqlx::Error>>,
    {
        let slot = {
            let mut slots = self.slots.lock().unwrap_or_else(PoisonError::into_inner);
            slots.entry(table).or_default().clone()
        };
        let indices = slot
            .get_or_try_init(|| async move {
                let live = load.await.map_err(Error::db("load columns", table))?;
                translate(table, columns, &live).map(Arc::from)
            })
            .await?;
        Ok(indices.clone())
    }

    /// Whether a translation table has been built for `table`.
    pub fn is_loaded(&self, table: &str) -> bool {
        let slots = self.slots.lock().unwrap_or_else(PoisonError::into_inner);
        slots.get(table).is_some_and(|s| s.initialized())
    }
}

/// Map each generation-time column to its live position. Live columns the
/// generated code doesn't know about are ignored.
pub fn translate(table: &'static str, generated: &[&str], live: &[String]) -> Result<Vec<usize>> {
    let positions: HashMap<&str, usize> = live
        .iter()
        .enumerate()
        .map(|(i, name)| (name.as_str(), i))
        .collect();

    let mut out = Vec::with_capacity(generated.len());
    for column in generated {
        let pos = positions
            .get(column)
            .copied()
            .ok_or_else(|| Error::MissingColumn {
                table,
                column: column.to_string(),
            })?;
        out.push(pos);
    }

    let shifted = out.iter().enumerate().any(|(i, pos)| i != *pos);
    if shifted || live.len() != generated.len() {
        tracing::info!(
            table,
            generated = generated.len(),
            live = live.len(),
            "column order differs from generation time"
        );
    }
    Ok(out)
}

pub async fn live_columns(
    conn: &mut PgConnection,
    table: &str,
) -> std::result::Result<Vec<String>, sqlx::Error> {
    sqlx::query_scalar(LIVE_COLUMNS_QUERY)
        .bind(table)
        .fetch_all(conn)
        .await
}

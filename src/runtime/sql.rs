//! Statements whose shape depends on a field mask, built at call time.

use super::field_set::FieldSet;

pub fn quote(ident: &str) -> String {
    format!("\"{}\"", ident.replace('"', "\"\""))
}

/// `UPDATE t SET <masked columns> WHERE pk = $n RETURNING pk`.
///
/// Arguments are the masked columns in column order, then the primary key.
pub fn update_stmt(table: &str, columns: &[&str], pkey: usize, mask: &FieldSet) -> String {
    let mut sets = Vec::new();
    for (n, i) in mask.iter_ones().enumerate() {
        sets.push(format!("{} = ${}", quote(columns[i]), n + 1));
    }
    format!(
        "UPDATE {} SET {} WHERE {} = ${} RETURNING {}",
        quote(table),
        sets.join(", "),
        quote(columns[pkey]),
        sets.len() + 1,
        quote(columns[pkey])
    )
}

/// Indices of the columns an upsert writes: every non-key column, plus the
/// primary key when the mask selects it or nothing else is left.
pub fn upsert_columns(columns: &[&str], pkey: usize, mask: &FieldSet) -> Vec<usize> {
    let with_key = mask.test(pkey) || columns.len() == 1;
    (0..columns.len())
        .filter(|i| *i != pkey || with_key)
        .collect()
}

/// Multi-row `INSERT .. ON CONFLICT` over [`upsert_columns`].
///
/// Arguments are row-major. When the mask selects no column besides the
/// conflict target the statement is `ON CONFLICT DO NOTHING`, and rows that
/// already existed are not returned.
pub fn upsert_stmt(
    table: &str,
    columns: &[&str],
    pkey: usize,
    nrows: usize,
    conflict: &[&str],
    mask: &FieldSet,
) -> String {
    let insert = upsert_columns(columns, pkey, mask);
    let names: Vec<String> = insert.iter().map(|i| quote(columns[*i])).collect();

    let mut rows = Vec::with_capacity(nrows);
    let mut n = 0;
    for _ in 0..nrows {
        let params: Vec<String> = insert
            .iter()
            .map(|_| {
                n += 1;
                format!("${}", n)
            })
            .collect();
        rows.push(format!("({})", params.join(", ")));
    }

    let updates: Vec<String> = mask
        .iter_ones()
        .filter(|i| *i != pkey && !conflict.iter().any(|c| *c == columns[*i]))
        .map(|i| format!("{} = excluded.{}", quote(columns[i]), quote(columns[i])))
        .collect();

    let on_conflict = if updates.is_empty() {
        "ON CONFLICT DO NOTHING".to_string()
    } else {
        let target: Vec<String> = conflict.iter().map(|c| quote(c)).collect();
        format!(
            "ON CONFLICT ({}) DO UPDATE SET {}",
            target.join(", "),
            updates.join(", ")
        )
    };

    format!(
        "INSERT INTO {} ({}) VALUES {} {} RETURNING {}",
        quote(table),
        names.join(", "),
        rows.join(", "),
        on_conflict,
        quote(columns[pkey])
    )
}

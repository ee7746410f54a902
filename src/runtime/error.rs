use thiserror::Error;

/// Errors returned by generated data-access code.
#[derive(Debug, Error)]
pub enum Error {
    #[error("{op} on '{table}': {source}")]
    Database {
        op: &'static str,
        table: &'static str,
        #[source]
        source: sqlx::Error,
    },

    #[error("{op} on '{table}': expected {expected} rows, found {found}")]
    CountMismatch {
        op: &'static str,
        table: &'static str,
        expected: usize,
        found: usize,
    },

    #[error("update on '{table}': the primary key field must be set in the field mask")]
    PrimaryKeyRequired { table: &'static str },

    #[error("'{table}' has {expected} fields but the field mask has {found}")]
    FieldMaskWidth {
        table: &'static str,
        expected: usize,
        found: usize,
    },

    #[error("include spec for '{found}' applied to '{expected}'")]
    IncludeTableMismatch { expected: String, found: String },

    #[error("'{include}' can't be included from '{table}'{}", through(.via))]
    IncludeNotReachable {
        table: String,
        include: String,
        /// Tables to nest `include` under, empty when it isn't reachable.
        via: Vec<String>,
    },

    #[error("'{table}' has no column '{column}' in the connected database")]
    MissingColumn { table: &'static str, column: String },
}

impl Error {
    /// Wrap a database error with the operation and table it came from:
    /// `.map_err(Error::db("list", "orders"))`.
    pub fn db(op: &'static str, table: &'static str) -> impl FnOnce(sqlx::Error) -> Error {
        move |source| Error::Database { op, table, source }
    }
}

fn through(via: &[String]) -> String {
    if via.is_empty() {
        String::new()
    } else {
        format!("; it is reachable through {}", via.join(" -> "))
    }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

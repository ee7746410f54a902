use thiserror::Error;

/// Errors that abort a generation run.
///
/// Every variant names the table, column or type at fault. There is no partial
/// output: the first error stops the run.
#[derive(Debug, Error)]
pub enum Error {
    #[error("table '{table}' is configured more than once")]
    DuplicateTable { table: String },

    #[error("a configured table has an empty name")]
    EmptyTableName,

    #[error("table '{table}' not found in the catalog")]
    TableNotFound { table: String },

    #[error("table '{table}': no primary key")]
    NoPrimaryKey { table: String },

    #[error("table '{table}': composite primary key ({columns}) is not supported")]
    CompositePrimaryKey { table: String, columns: String },

    #[error("table '{table}': multi-column foreign key '{constraint}' is not supported")]
    CompositeForeignKey { table: String, constraint: String },

    #[error("table '{table}': foreign key '{constraint}' references unknown column '{ref_table}.{ref_column}'")]
    UnknownReferencedColumn {
        table: String,
        constraint: String,
        ref_table: String,
        ref_column: String,
    },

    #[error("table '{table}': column '{column}' has unknown type '{type_name}'")]
    UnknownType {
        table: String,
        column: String,
        type_name: String,
    },

    #[error("type override for unknown catalog type '{type_name}'")]
    UnknownOverrideType { type_name: String },

    #[error("type override for '{type_name}': {reason}")]
    InconsistentOverride { type_name: String, reason: String },

    #[error("{table}: belongs_to requires a 'table' key")]
    BelongsToMissingTable { table: String },

    #[error("{table}: belongs_to requires a 'key_field' key")]
    BelongsToMissingKey { table: String },

    #[error("{table}: belongs_to references unconfigured table '{target}'")]
    BelongsToUnknownTable { table: String, target: String },

    #[error("{table}.{column} ({found}) can't reference {ref_table}.{ref_column} ({expected})")]
    KeyTypeMismatch {
        table: String,
        column: String,
        found: String,
        ref_table: String,
        ref_column: String,
        expected: String,
    },

    #[error("table '{table}' has no field '{column}'")]
    UnknownColumn { table: String, column: String },

    #[error("table '{table}' has no '{column}' {kind} timestamp")]
    MissingTimestamp {
        table: String,
        column: String,
        kind: &'static str,
    },

    #[error("table '{table}': {kind} field '{column}' has non-timestamp type '{type_name}'")]
    NotATimestamp {
        table: String,
        column: String,
        kind: &'static str,
        type_name: String,
    },

    #[error("catalog error for table '{table}': {message}")]
    Catalog { table: String, message: String },
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

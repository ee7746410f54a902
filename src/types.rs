//! Mapping from catalog types to the Rust types used in generated records.

use std::collections::{BTreeMap, BTreeSet};

use crate::config::TypeOverride;
use crate::error::{Error, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Timestamp {
    /// `timestamp with time zone`, stamped with `Utc::now()`.
    WithZone,
    /// `timestamp without time zone`, stamped with UTC wall-clock time.
    WithoutZone,
}

/// How a single catalog type is represented and marshaled.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TypeInfo {
    pub catalog_name: String,
    pub rust_name: String,
    pub nullable_name: String,
    /// The type decoded from the row before conversion into `rust_name`.
    pub scan_name: String,
    pub convert: Option<String>,
    pub nullable_convert: Option<String>,
    /// Expression template for binding one value; `{}` is the value.
    pub bind: String,
    /// Expression template for binding a slice of values to `= ANY($n)`.
    pub bind_array: String,
    pub timestamp: Option<Timestamp>,
}

impl TypeInfo {
    fn simple(catalog_name: &str, rust_name: &str) -> Self {
        TypeInfo {
            catalog_name: catalog_name.to_string(),
            rust_name: rust_name.to_string(),
            nullable_name: format!("Option<{}>", rust_name),
            scan_name: rust_name.to_string(),
            convert: None,
            nullable_convert: None,
            bind: "&{}".to_string(),
            bind_array: "&{}".to_string(),
            timestamp: None,
        }
    }

    fn with_timestamp(mut self, kind: Timestamp) -> Self {
        self.timestamp = Some(kind);
        self
    }

    pub fn field_type(&self, nullable: bool) -> &str {
        if nullable {
            &self.nullable_name
        } else {
            &self.rust_name
        }
    }

    /// The type to decode from the row. Nullable columns always go through
    /// an `Option` of the scan type.
    pub fn decode_type(&self, nullable: bool) -> String {
        if nullable {
            format!("Option<{}>", self.scan_name)
        } else {
            self.scan_name.clone()
        }
    }

    /// Convert an already-decoded value expression into the field type.
    pub fn read_expr(&self, decoded: &str, nullable: bool) -> String {
        match (nullable, &self.convert, &self.nullable_convert) {
            (true, _, Some(nc)) => format!("{}({})", nc, decoded),
            (true, Some(c), None) => format!("{}.map({})", decoded, c),
            (false, Some(c), _) => format!("{}({})", c, decoded),
            _ => decoded.to_string(),
        }
    }

    pub fn bind_expr(&self, value: &str) -> String {
        self.bind.replace("{}", value)
    }

    pub fn bind_array_expr(&self, values: &str) -> String {
        self.bind_array.replace("{}", values)
    }

    fn validate(&self) -> Result<()> {
        let fail = |reason: &str| Error::InconsistentOverride {
            type_name: self.catalog_name.clone(),
            reason: reason.to_string(),
        };
        if self.rust_name.trim().is_empty() {
            return Err(fail("empty rust type"));
        }
        if self.scan_name != self.rust_name && self.convert.is_none() {
            return Err(fail("scan type differs from rust type but no 'convert' is given"));
        }
        let option_of_rust = format!("Option<{}>", self.rust_name);
        if self.nullable_name != option_of_rust && self.nullable_convert.is_none() {
            return Err(fail(
                "nullable type can't be built from the scan holder without 'nullable_convert'",
            ));
        }
        if !self.bind.contains("{}") || !self.bind_array.contains("{}") {
            return Err(fail("bind templates must contain '{}'"));
        }
        Ok(())
    }
}

const DEFAULT_TYPES: &[(&str, &str)] = &[
    ("smallint", "i16"),
    ("integer", "i32"),
    ("bigint", "i64"),
    ("real", "f32"),
    ("double precision", "f64"),
    ("numeric", "rust_decimal::Decimal"),
    ("boolean", "bool"),
    ("text", "String"),
    ("character varying", "String"),
    ("character", "String"),
    ("citext", "String"),
    ("bytea", "Vec<u8>"),
    ("uuid", "uuid::Uuid"),
    ("json", "serde_json::Value"),
    ("jsonb", "serde_json::Value"),
    ("date", "chrono::NaiveDate"),
    ("time without time zone", "chrono::NaiveTime"),
    ("smallint[]", "Vec<i16>"),
    ("integer[]", "Vec<i32>"),
    ("bigint[]", "Vec<i64>"),
    ("text[]", "Vec<String>"),
    ("character varying[]", "Vec<String>"),
    ("boolean[]", "Vec<bool>"),
    ("uuid[]", "Vec<uuid::Uuid>"),
];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TypeTable {
    entries: BTreeMap<String, TypeInfo>,
}

impl Default for TypeTable {
    fn default() -> Self {
        let mut entries: BTreeMap<String, TypeInfo> = DEFAULT_TYPES
            .iter()
            .map(|(pg, rust)| (pg.to_string(), TypeInfo::simple(pg, rust)))
            .collect();
        entries.insert(
            "timestamp with time zone".into(),
            TypeInfo::simple("timestamp with time zone", "chrono::DateTime<chrono::Utc>")
                .with_timestamp(Timestamp::WithZone),
        );
        entries.insert(
            "timestamp without time zone".into(),
            TypeInfo::simple("timestamp without time zone", "chrono::NaiveDateTime")
                .with_timestamp(Timestamp::WithoutZone),
        );
        TypeTable { entries }
    }
}

impl TypeTable {
    pub fn resolve(&self, catalog_type: &str) -> Option<&TypeInfo> {
        self.entries.get(catalog_type)
    }

    pub fn contains(&self, catalog_type: &str) -> bool {
        self.entries.contains_key(catalog_type)
    }

    /// Build a new table with `overrides` applied entry by entry.
    ///
    /// An override must name a type this table already maps or one the
    /// catalog reports (`catalog_types`).
    pub fn with_overrides(
        &self,
        overrides: &[TypeOverride],
        catalog_types: &BTreeSet<String>,
    ) -> Result<TypeTable> {
        let mut table = self.clone();
        for o in overrides {
            let name = o.catalog_type.trim();
            if !self.contains(name) && !catalog_types.contains(name) {
                return Err(Error::UnknownOverrideType {
                    type_name: name.to_string(),
                });
            }
            let base = TypeInfo::simple(name, o.rust_type.trim());
            let info = TypeInfo {
                nullable_name: o.nullable_type.clone().unwrap_or(base.nullable_name),
                scan_name: o.scan_type.clone().unwrap_or(base.scan_name),
                convert: o.convert.clone(),
                nullable_convert: o.nullable_convert.clone(),
                bind: o.bind.clone().unwrap_or(base.bind),
                bind_array: o.bind_array.clone().unwrap_or(base.bind_array),
                // keep stamping behaviour for overridden timestamp types
                timestamp: self.resolve(name).and_then(|t| t.timestamp),
                catalog_name: base.catalog_name,
                rust_name: base.rust_name,
            };
            info.validate()?;
            tracing::debug!("type override: {} -> {}", name, info.rust_name);
            table.entries.insert(name.to_string(), info);
        }
        Ok(table)
    }
}

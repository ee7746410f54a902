use rowgen::config::TypeOverride;
use rowgen::types::{Timestamp, TypeTable};
use rowgen::Error;
use std::collections::BTreeSet;

fn override_for(catalog_type: &str, rust_type: &str) -> TypeOverride {
    TypeOverride {
        catalog_type: catalog_type.into(),
        rust_type: rust_type.into(),
        ..Default::default()
    }
}

#[test]
fn defaults_cover_common_postgres_types() {
    let table = TypeTable::default();
    assert_eq!(table.resolve("integer").unwrap().rust_name, "i32");
    assert_eq!(table.resolve("text").unwrap().nullable_name, "Option<String>");
    assert_eq!(
        table.resolve("timestamp with time zone").unwrap().timestamp,
        Some(Timestamp::WithZone)
    );
    assert_eq!(
        table.resolve("timestamp without time zone").unwrap().rust_name,
        "chrono::NaiveDateTime"
    );
    assert_eq!(table.resolve("bigint[]").unwrap().rust_name, "Vec<i64>");
    assert!(table.resolve("money").is_none());
}

#[test]
fn overrides_produce_a_new_table() {
    let default = TypeTable::default();
    let known = BTreeSet::new();
    let table = default
        .with_overrides(&[override_for("text", "std::sync::Arc<str>")], &known)
        .unwrap();
    assert_eq!(table.resolve("text").unwrap().rust_name, "std::sync::Arc<str>");
    assert_eq!(default.resolve("text").unwrap().rust_name, "String");
}

#[test]
fn override_may_target_a_catalog_type() {
    let known = BTreeSet::from(["money".to_string()]);
    let table = TypeTable::default()
        .with_overrides(&[override_for("money", "i64")], &known)
        .unwrap();
    assert_eq!(table.resolve("money").unwrap().field_type(true), "Option<i64>");
}

#[test]
fn override_for_unknown_type_fails() {
    let err = TypeTable::default()
        .with_overrides(&[override_for("money", "i64")], &BTreeSet::new())
        .unwrap_err();
    assert!(matches!(err, Error::UnknownOverrideType { ref type_name } if type_name == "money"));
}

#[test]
fn override_with_scan_type_needs_convert() {
    let mut o = override_for("citext", "Email");
    o.scan_type = Some("String".into());
    let err = TypeTable::default()
        .with_overrides(&[o.clone()], &BTreeSet::new())
        .unwrap_err();
    assert!(matches!(err, Error::InconsistentOverride { .. }));

    o.convert = Some("Email::from".into());
    let table = TypeTable::default().with_overrides(&[o], &BTreeSet::new()).unwrap();
    let info = table.resolve("citext").unwrap();
    assert_eq!(info.decode_type(true), "Option<String>");
    assert_eq!(info.read_expr("raw", true), "raw.map(Email::from)");
}

#[test]
fn custom_nullable_type_needs_nullable_convert() {
    let mut o = override_for("text", "String");
    o.nullable_type = Some("MaybeText".into());
    let err = TypeTable::default()
        .with_overrides(&[o.clone()], &BTreeSet::new())
        .unwrap_err();
    assert!(matches!(err, Error::InconsistentOverride { .. }));

    o.nullable_convert = Some("MaybeText::from".into());
    let table = TypeTable::default().with_overrides(&[o], &BTreeSet::new()).unwrap();
    let info = table.resolve("text").unwrap();
    assert_eq!(info.field_type(true), "MaybeText");
    assert_eq!(info.read_expr("raw", true), "MaybeText::from(raw)");
}

#[test]
fn overridden_timestamp_keeps_stamping() {
    let table = TypeTable::default()
        .with_overrides(
            &[override_for("timestamp with time zone", "chrono::DateTime<chrono::Utc>")],
            &BTreeSet::new(),
        )
        .unwrap();
    assert_eq!(
        table.resolve("timestamp with time zone").unwrap().timestamp,
        Some(Timestamp::WithZone)
    );
}

#[test]
fn bind_templates_wrap_values() {
    let mut o = override_for("text", "Name");
    o.bind = Some("{}.as_str()".into());
    o.bind_array = Some("&Name::strings({})".into());
    let table = TypeTable::default().with_overrides(&[o], &BTreeSet::new()).unwrap();
    let info = table.resolve("text").unwrap();
    assert_eq!(info.bind_expr("v.name"), "v.name.as_str()");
    assert_eq!(info.bind_array_expr("keys"), "&Name::strings(keys)");
}

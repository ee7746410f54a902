mod common;

use common::{config, shop_catalog, shop_config, SHOP_CONFIG};
use rowgen::codegen::{generate_client, GenOptions};
use rowgen::{build_model, generate_code, Error};

fn shop_code() -> String {
    generate_code(&shop_config(), &shop_catalog()).unwrap()
}

/// The body of `mod <name> { .. }` in generated code.
fn module<'a>(code: &'a str, name: &str) -> &'a str {
    let start = code
        .find(&format!("mod {} {{", name))
        .unwrap_or_else(|| panic!("no module {}", name));
    let len = code[start..].find("\n}\n").unwrap();
    &code[start..start + len]
}

#[test]
fn records_carry_columns_and_relations() {
    let code = shop_code();
    assert!(code.starts_with("// Code generated by rowgen. DO NOT EDIT."));
    assert!(code.contains("pub struct Order {"));
    assert!(code.contains("    pub total: rust_decimal::Decimal,\n"));
    assert!(code.contains("    pub note: Option<String>,\n"));
    assert!(code.contains("    pub customer: Option<Arc<Customer>>,\n"));
    assert!(code.contains("    pub line_items: Vec<Arc<LineItem>>,\n"));
    assert!(code.contains("    pub order: Option<Arc<Order>>,\n"));
    assert!(code.contains("    pub orders: Vec<Arc<Order>>,\n"));
    assert!(!code.contains("pub manager: Option<Arc<Employee>>"));
}

#[test]
fn field_indices_follow_catalog_order() {
    let code = shop_code();
    assert!(code.contains("impl Order {\n    pub const ID_FIELD_INDEX: usize = 0;"));
    assert!(code.contains("    pub const PLACED_AT_FIELD_INDEX: usize = 4;\n"));
    assert!(code.contains("    pub const MAX_FIELD_INDEX: usize = 4;\n"));
    assert!(code.contains("impl Record for Order {\n    type Key = i64;"));
    assert!(code.contains(
        r#"const COLUMNS: &'static [&'static str] = &["id", "customer_id", "total", "note", "placed_at"];"#
    ));
    assert!(code.contains("note: runtime::get::<Option<String>>(row, idx, 3)?,"));
}

#[test]
fn include_graph_and_all_includes() {
    let code = shop_code();
    assert!(code.contains("const INCLUDE_GRAPH: &[(&str, &[&str])] = &[\n"));
    assert!(code.contains(r#"    ("orders", &["customers", "line_items"]),"#));
    assert!(code.contains(r#"    ("employees", &[]),"#));
    assert!(code.contains(r#".with(IncludeSpec::new("line_items")"#));
    assert!(code.contains(r#".with(IncludeSpec::new("products"))"#));
}

#[test]
fn timestamps_are_stamped_by_kind() {
    let code = shop_code();
    let customers = module(&code, "customers_ops");
    assert!(customers.contains("let now = chrono::Utc::now();"));
    assert!(customers.contains("v.created_at = now;"));
    assert!(customers.contains("v.updated_at = Some(now);"));
    assert!(customers.contains("value.updated_at = Some(now);"));
    assert!(customers.contains("mask.set(Customer::UPDATED_AT_FIELD_INDEX);"));
    assert!(customers.contains("if !mask.is_empty() {"));

    let orders = module(&code, "orders_ops");
    assert!(orders.contains("v.placed_at = now.naive_utc();"));
    assert!(orders.contains("let mask = mask.clone();"));

    let products = module(&code, "products_ops");
    assert!(!products.contains("chrono::Utc::now()"));
}

#[test]
fn fill_queries_one_table_per_relation() {
    let code = shop_code();
    let orders = module(&code, "orders_ops");
    assert!(orders.contains(r#"if let Some(sub) = spec.get("line_items") {"#));
    assert!(orders.contains(r#"SELECT * FROM \"line_items\" WHERE \"order_id\" = ANY($1)"#));
    assert!(orders.contains(r#"SELECT * FROM \"customers\" WHERE \"id\" = ANY($1)"#));
    assert!(orders.contains("super::line_items_ops::fill_includes("));
    assert!(orders.contains("r.line_items.push(c)"));
    assert!(orders.contains("r.customer = Some(c)"));

    let line_items = module(&code, "line_items_ops");
    assert!(line_items.contains("records.iter().filter_map(|r| r.product_id.clone())"));

    let employees = module(&code, "employees_ops");
    assert!(employees.contains("Box::pin(async { Ok(()) })"));
}

#[test]
fn cached_records_are_matched_against_the_sub_spec() {
    let code = shop_code();
    let line_items = module(&code, "line_items_ops");
    assert!(line_items.contains("let (mut related, mut fresh) = loaded.partition(scanned, sub);"));
    assert!(line_items.contains("related.extend(loaded.intern_all(fresh, sub));"));
    assert!(line_items.contains("super::orders_ops::fill_includes(&mut *conn, cols, &mut fresh, sub, &mut *loaded)"));
    assert!(line_items.contains("/// copies of those rows."));
    assert!(code.contains("/// Values passed in are not shared with the loaded graph;"));
}

#[test]
fn records_need_no_default_impl() {
    let text = format!(
        "[[type_override]]\ncatalog_type = \"numeric\"\nrust_type = \"bigdecimal::BigDecimal\"\n{}",
        SHOP_CONFIG
    );
    let code = generate_code(&config(&text), &shop_catalog()).unwrap();
    assert!(!code.contains("Default"));
    assert!(code.contains("#[derive(Debug, Clone, PartialEq)]\npub struct Order {"));

    let order_scan = &code[code.find("impl Record for Order {").unwrap()..];
    let order_scan = &order_scan[..order_scan.find("\n}\n").unwrap()];
    assert!(order_scan.contains("            line_items: Vec::new(),\n            customer: None,\n        })"));
}

#[test]
fn both_clients_get_every_method() {
    let code = shop_code();
    for name in [
        "get_line_item",
        "list_line_items",
        "insert_line_item",
        "bulk_insert_line_items",
        "update_line_item",
        "upsert_line_item",
        "bulk_upsert_line_items",
        "delete_line_item",
        "bulk_delete_line_items",
        "line_item_fill_includes",
        "line_item_bulk_fill_includes",
    ] {
        assert_eq!(
            code.matches(&format!("pub async fn {}(", name)).count(),
            2,
            "{}",
            name
        );
    }
    assert!(code.contains("pub async fn get_order(&self, id: i64) -> Result<Order> {"));
    assert!(code.contains("pub async fn get_order(&mut self, id: i64) -> Result<Order> {"));
    assert!(code.contains("orders_ops::get(&mut *self.tx, &self.columns, id).await"));
    assert!(code.contains("let mut conn = self.conn(Order::TABLE).await?;"));
    assert!(code.contains("pub struct TxPgClient<'t> {"));
}

#[test]
fn instrumentation_is_opt_in() {
    assert!(!shop_code().contains("tracing::instrument"));

    let text = format!("instrument = true\n{}", SHOP_CONFIG);
    let code = generate_code(&config(&text), &shop_catalog()).unwrap();
    assert!(code.contains(r#"#[tracing::instrument(skip_all, fields(table = "orders"))]"#));
}

#[test]
fn runtime_path_is_configurable() {
    let (registry, closure) = build_model(&shop_config(), &shop_catalog()).unwrap();
    let options = GenOptions {
        runtime_path: "crate::db::runtime".to_string(),
        ..GenOptions::default()
    };
    let code = generate_client(&registry, &closure, &options);
    assert!(code.contains("use crate::db::runtime::{self, BoxFuture,"));
}

#[test]
fn output_is_deterministic() {
    assert_eq!(shop_code(), shop_code());
}

#[test]
fn errors_abort_without_output() {
    let text = format!("{}\n[[table]]\nname = \"invoices\"\n", SHOP_CONFIG);
    let err = generate_code(&config(&text), &shop_catalog()).unwrap_err();
    assert!(matches!(err, Error::TableNotFound { ref table } if table == "invoices"));
}

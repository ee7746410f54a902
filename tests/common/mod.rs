#![allow(dead_code)]

use rowgen::catalog::{CatalogColumn, CatalogForeignKey, CatalogSnapshot};
use rowgen::config::GenConfig;

/// A small store schema: customers place orders, orders hold line items,
/// line items point at products, and employees report to employees.
pub fn shop_catalog() -> CatalogSnapshot {
    let mut cat = CatalogSnapshot::default();
    cat.add_table(
        "customers",
        vec![
            CatalogColumn::new("id", "bigint").primary_key(),
            CatalogColumn::new("name", "text"),
            CatalogColumn::new("email", "text").nullable(),
            CatalogColumn::new("created_at", "timestamp with time zone"),
            CatalogColumn::new("updated_at", "timestamp with time zone").nullable(),
        ],
    );
    cat.add_table(
        "orders",
        vec![
            CatalogColumn::new("id", "bigint").primary_key(),
            CatalogColumn::new("customer_id", "bigint"),
            CatalogColumn::new("total", "numeric"),
            CatalogColumn::new("note", "text").nullable(),
            CatalogColumn::new("placed_at", "timestamp without time zone"),
        ],
    );
    cat.add_table(
        "line_items",
        vec![
            CatalogColumn::new("id", "bigint").primary_key(),
            CatalogColumn::new("order_id", "bigint"),
            CatalogColumn::new("product_id", "bigint").nullable(),
            CatalogColumn::new("quantity", "integer"),
        ],
    );
    cat.add_table(
        "products",
        vec![
            CatalogColumn::new("id", "bigint").primary_key(),
            CatalogColumn::new("name", "text"),
        ],
    );
    cat.add_table(
        "employees",
        vec![
            CatalogColumn::new("id", "bigint").primary_key(),
            CatalogColumn::new("manager_id", "bigint").nullable(),
        ],
    );
    cat.add_foreign_key("orders", "orders_customer_id_fkey", "customer_id", "customers", "id")
        .add_foreign_key("line_items", "line_items_order_id_fkey", "order_id", "orders", "id")
        .add_foreign_key("line_items", "line_items_product_id_fkey", "product_id", "products", "id")
        .add_foreign_key("employees", "employees_manager_id_fkey", "manager_id", "employees", "id");
    cat
}

pub const SHOP_CONFIG: &str = r#"
[[table]]
name = "customers"
created_at_field = "created_at"
updated_at_field = "updated_at"

[[table]]
name = "orders"
created_at_field = "placed_at"

[[table]]
name = "line_items"

[[table]]
name = "products"

[[table]]
name = "employees"
"#;

pub fn shop_config() -> GenConfig {
    GenConfig::from_toml(SHOP_CONFIG).unwrap()
}

pub fn config(text: &str) -> GenConfig {
    GenConfig::from_toml(text).unwrap()
}

pub fn composite_fk(name: &str, columns: &[&str], ref_table: &str, ref_columns: &[&str]) -> CatalogForeignKey {
    CatalogForeignKey {
        name: name.to_string(),
        columns: columns.iter().map(|c| c.to_string()).collect(),
        ref_table: ref_table.to_string(),
        ref_columns: ref_columns.iter().map(|c| c.to_string()).collect(),
        unique: false,
    }
}

//! Exercises a client generated from the shop fixture against the database
//! behind `DATABASE_URL`. `tests/live_client.rs` appends the generated code
//! as `mod db` and builds this file as a binary.

use std::sync::Arc;

use chrono::Utc;
use db::{Customer, LineItem, Order, PgClient, Product};
use rowgen::runtime::{Error, FieldSet, IncludeSpec};
use rust_decimal::Decimal;
use sqlx::postgres::{PgConnectOptions, PgPoolOptions};
use sqlx::PgPool;

const SCHEMA: &str = "rowgen_live";

// customers has email before name, unlike the fixture catalog
const TABLES: &str = "
CREATE TABLE customers (
    id bigserial PRIMARY KEY,
    email text UNIQUE,
    name text NOT NULL,
    created_at timestamptz NOT NULL,
    updated_at timestamptz
);
CREATE TABLE orders (
    id bigserial PRIMARY KEY,
    customer_id bigint NOT NULL REFERENCES customers (id),
    total numeric NOT NULL,
    note text,
    placed_at timestamp NOT NULL
);
CREATE TABLE products (
    id bigserial PRIMARY KEY,
    name text NOT NULL
);
CREATE TABLE line_items (
    id bigserial PRIMARY KEY,
    order_id bigint NOT NULL REFERENCES orders (id),
    product_id bigint REFERENCES products (id),
    quantity integer NOT NULL
);
CREATE TABLE employees (
    id bigserial PRIMARY KEY,
    manager_id bigint REFERENCES employees (id)
)";

async fn exec(pool: &PgPool, sql: &str) {
    for stmt in sql.split(';').map(str::trim).filter(|s| !s.is_empty()) {
        sqlx::query(stmt).execute(pool).await.unwrap();
    }
}

async fn setup() -> PgPool {
    dotenvy::dotenv().ok();
    let url = std::env::var("DATABASE_URL").expect("DATABASE_URL must be set");
    let options = url
        .parse::<PgConnectOptions>()
        .unwrap()
        .options([("search_path", SCHEMA)]);
    let pool = PgPoolOptions::new()
        .max_connections(4)
        .connect_with(options)
        .await
        .unwrap();
    exec(
        &pool,
        &format!("DROP SCHEMA IF EXISTS {0} CASCADE; CREATE SCHEMA {0}", SCHEMA),
    )
    .await;
    exec(&pool, TABLES).await;
    pool
}

fn customer(name: &str, email: &str) -> Customer {
    Customer {
        id: 0,
        name: name.to_string(),
        email: Some(email.to_string()),
        created_at: Utc::now(),
        updated_at: None,
        orders: Vec::new(),
    }
}

fn order(customer_id: i64, cents: i64) -> Order {
    Order {
        id: 0,
        customer_id,
        total: Decimal::new(cents, 2),
        note: None,
        placed_at: Utc::now().naive_utc(),
        line_items: Vec::new(),
        customer: None,
    }
}

fn include(text: &str) -> IncludeSpec {
    text.parse().unwrap()
}

#[tokio::main]
async fn main() {
    let pool = setup().await;
    let client = PgClient::new(pool.clone());

    // insert then get, through the reordered customers table
    let mut ada = customer("Ada", "ada@example.com");
    let ada_id = client.insert_customer(&mut ada).await.unwrap();
    let fetched = client.get_customer(ada_id).await.unwrap();
    let mut expected = ada.clone();
    expected.id = ada_id;
    expected.created_at = fetched.created_at;
    expected.updated_at = fetched.updated_at;
    assert_eq!(fetched, expected);
    assert!((fetched.created_at - ada.created_at).num_seconds().abs() < 1);
    assert!(fetched.updated_at.is_some());

    let mut more = [customer("Grace", "grace@example.com"), customer("Linus", "linus@example.com")];
    let ids = client.bulk_insert_customers(&mut more).await.unwrap();
    assert_eq!(ids.len(), 2);
    let (grace_id, linus_id) = (ids[0], ids[1]);

    // list: key order, duplicates collapse, a missing key fails the call
    let listed = client.list_customers(&[linus_id, ada_id, linus_id]).await.unwrap();
    let names: Vec<&str> = listed.iter().map(|c| c.name.as_str()).collect();
    assert_eq!(names, ["Linus", "Ada"]);
    let err = client.list_customers(&[ada_id, -1]).await.unwrap_err();
    assert!(matches!(err, Error::CountMismatch { expected: 2, found: 1, .. }), "{}", err);

    // update needs the primary key in the mask
    let mut renamed = fetched.clone();
    renamed.name = "Ada Lovelace".to_string();
    let only_name = Customer::no_fields().with(Customer::NAME_FIELD_INDEX);
    let err = client.update_customer(&mut renamed, &only_name).await.unwrap_err();
    assert!(matches!(err, Error::PrimaryKeyRequired { .. }), "{}", err);
    let mask = only_name.clone().with(Customer::ID_FIELD_INDEX);
    assert_eq!(client.update_customer(&mut renamed, &mask).await.unwrap(), ada_id);
    assert_eq!(client.get_customer(ada_id).await.unwrap().name, "Ada Lovelace");

    // an empty mask leaves the existing row alone and returns nothing for it
    let mut dup = [customer("Someone Else", "ada@example.com")];
    let returned = client
        .bulk_upsert_customers(&mut dup, &["email"], &Customer::no_fields())
        .await
        .unwrap();
    assert!(returned.is_empty());
    assert_eq!(client.get_customer(ada_id).await.unwrap().name, "Ada Lovelace");

    let mut dup = customer("Countess", "ada@example.com");
    let id = client.upsert_customer(&mut dup, &["email"], &only_name).await.unwrap();
    assert_eq!(id, ada_id);
    assert_eq!(client.get_customer(ada_id).await.unwrap().name, "Countess");

    // two orders sharing a customer get the same loaded instance
    let mut orders = [order(ada_id, 1250), order(ada_id, 990), order(grace_id, 100)];
    let order_ids = client.bulk_insert_orders(&mut orders).await.unwrap();
    let mut orders = client.list_orders(&order_ids).await.unwrap();
    client
        .order_bulk_fill_includes(&mut orders, &include("orders{customers}"))
        .await
        .unwrap();
    let first = orders[0].customer.as_ref().unwrap();
    let second = orders[1].customer.as_ref().unwrap();
    assert!(Arc::ptr_eq(first, second));
    assert_eq!(first.id, ada_id);
    assert_eq!(orders[2].customer.as_ref().unwrap().name, "Grace");
    assert_eq!(orders[0].total, Decimal::new(1250, 2));

    // a table reached twice gets what each path asked for
    let mut lamp = Product {
        id: 0,
        name: "Lamp".to_string(),
        line_items: Vec::new(),
    };
    let lamp_id = client.insert_product(&mut lamp).await.unwrap();
    let mut item = LineItem {
        id: 0,
        order_id: order_ids[0],
        product_id: Some(lamp_id),
        quantity: 2,
        order: None,
        product: None,
    };
    let item_id = client.insert_line_item(&mut item).await.unwrap();
    let mut item = client.get_line_item(item_id).await.unwrap();
    client
        .line_item_fill_includes(
            &mut item,
            &include("line_items{orders, products{line_items{orders{customers}}}}"),
        )
        .await
        .unwrap();
    assert!(item.order.as_ref().unwrap().customer.is_none());
    let product = item.product.as_ref().unwrap();
    let inner = product.line_items[0].order.as_ref().unwrap();
    assert_eq!(inner.id, order_ids[0]);
    assert_eq!(inner.customer.as_ref().unwrap().id, ada_id);

    let err = client
        .line_item_fill_includes(&mut item, &include("line_items{customers}"))
        .await
        .unwrap_err();
    assert!(matches!(err, Error::IncludeNotReachable { .. }), "{}", err);

    // bulk delete is all or nothing when run in a transaction
    let mut tx = client.begin().await.unwrap();
    let err = tx.bulk_delete_customers(&[linus_id, -1]).await.unwrap_err();
    assert!(matches!(err, Error::CountMismatch { expected: 2, found: 1, .. }), "{}", err);
    tx.rollback().await.unwrap();
    assert_eq!(client.get_customer(linus_id).await.unwrap().name, "Linus");
    client.bulk_delete_customers(&[linus_id, linus_id]).await.unwrap();
    assert!(client.get_customer(linus_id).await.is_err());

    let mut tx = client.begin().await.unwrap();
    let mut temp = customer("Temp", "temp@example.com");
    let temp_id = tx.insert_customer(&mut temp).await.unwrap();
    assert_eq!(tx.get_customer(temp_id).await.unwrap().name, "Temp");
    tx.rollback().await.unwrap();
    assert!(client.get_customer(temp_id).await.is_err());

    exec(&pool, &format!("DROP SCHEMA {} CASCADE", SCHEMA)).await;
}

//! Needs a Postgres reachable through `DATABASE_URL`:
//! `cargo test -- --ignored`.

mod common;

use common::config;
use rowgen::catalog::introspect_postgres;
use rowgen::runtime::{self, ColumnIndexCache, Record};
use rowgen::{build_model, connect_first};
use sqlx::postgres::PgRow;
use sqlx::PgPool;

async fn pool() -> PgPool {
    connect_first(&[]).await.unwrap()
}

async fn exec(pool: &PgPool, sql: &str) {
    for stmt in sql.split(';') {
        let trimmed = stmt.trim();
        if !trimmed.is_empty() {
            sqlx::query(trimmed).execute(pool).await.unwrap();
        }
    }
}

#[tokio::test]
#[ignore]
async fn introspect_live_catalog() {
    let pool = pool().await;
    exec(
        &pool,
        "DROP TABLE IF EXISTS rt_orders;
         DROP TABLE IF EXISTS rt_customers;
         CREATE TABLE rt_customers (
             id bigserial PRIMARY KEY,
             name text NOT NULL,
             email text,
             created_at timestamptz NOT NULL
         );
         CREATE TABLE rt_orders (
             id bigserial PRIMARY KEY,
             customer_id bigint NOT NULL UNIQUE REFERENCES rt_customers (id),
             total numeric NOT NULL
         )",
    )
    .await;

    let tables = vec!["rt_customers".to_string(), "rt_orders".to_string(), "rt_missing".to_string()];
    let snapshot = introspect_postgres(&pool, &tables).await.unwrap();
    assert!(!snapshot.tables.contains_key("rt_missing"));

    let customers = &snapshot.tables["rt_customers"];
    let columns: Vec<(&str, &str, bool, bool)> = customers
        .columns
        .iter()
        .map(|c| (c.name.as_str(), c.type_name.as_str(), c.nullable, c.is_primary_key))
        .collect();
    assert_eq!(
        columns,
        [
            ("id", "bigint", false, true),
            ("name", "text", false, false),
            ("email", "text", true, false),
            ("created_at", "timestamp with time zone", false, false),
        ]
    );

    let fk = &snapshot.tables["rt_orders"].foreign_keys[0];
    assert_eq!(fk.columns, ["customer_id"]);
    assert_eq!(fk.ref_table, "rt_customers");
    assert_eq!(fk.ref_columns, ["id"]);
    assert!(fk.unique);

    let cfg = config(
        "[[table]]\nname = \"rt_customers\"\ncreated_at_field = \"created_at\"\n[[table]]\nname = \"rt_orders\"\n",
    );
    let (registry, closure) = build_model(&cfg, &snapshot).unwrap();
    assert!(registry.meta("rt_customers").unwrap().references[0].one_to_one);
    assert_eq!(closure.spec("rt_orders").to_string(), "rt_orders{rt_customers}");

    exec(&pool, "DROP TABLE rt_orders; DROP TABLE rt_customers").await;
}

#[derive(Debug, PartialEq)]
struct Person {
    id: i64,
    name: String,
    email: Option<String>,
}

impl Record for Person {
    type Key = i64;
    const TABLE: &'static str = "rt_people";
    const COLUMNS: &'static [&'static str] = &["id", "name", "email"];

    fn key(&self) -> i64 {
        self.id
    }

    fn scan(row: &PgRow, idx: &[usize]) -> Result<Self, sqlx::Error> {
        Ok(Person {
            id: runtime::get(row, idx, 0)?,
            name: runtime::get(row, idx, 1)?,
            email: runtime::get(row, idx, 2)?,
        })
    }
}

#[tokio::test]
#[ignore]
async fn scans_survive_reordered_columns() {
    let pool = pool().await;
    exec(
        &pool,
        "DROP TABLE IF EXISTS rt_people;
         CREATE TABLE rt_people (id bigint PRIMARY KEY, added int, email text, name text NOT NULL);
         INSERT INTO rt_people VALUES (1, 0, 'ada@example.com', 'Ada'), (2, 0, NULL, 'Grace')",
    )
    .await;

    let cache = ColumnIndexCache::new();
    let mut conn = pool.acquire().await.unwrap();
    let idx = cache.indices::<Person>(&mut *conn).await.unwrap();
    assert_eq!(&*idx, &[0, 3, 2]);
    assert!(cache.is_loaded("rt_people"));

    let rows = sqlx::query("SELECT * FROM rt_people ORDER BY id")
        .fetch_all(&mut *conn)
        .await
        .unwrap();
    let people = runtime::scan_rows::<Person>("list", &rows, &idx).unwrap();
    assert_eq!(
        people,
        [
            Person {
                id: 1,
                name: "Ada".into(),
                email: Some("ada@example.com".into()),
            },
            Person {
                id: 2,
                name: "Grace".into(),
                email: None,
            },
        ]
    );

    drop(conn);
    exec(&pool, "DROP TABLE rt_people").await;
}

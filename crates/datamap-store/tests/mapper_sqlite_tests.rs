// End-to-end tests: mapper over a real SQLite connection

use chrono::NaiveDate;
use datamap_core::criteria::{Comparison, Mode};
use datamap_core::errors::ExErrorKind;
use datamap_core::{
    impl_entity, Adapter, AggregateFn, Criteria, DeleteOptions, FindOptions, Mapper, MapperConfig,
    Record, Value,
};
use datamap_store::{db, SqliteAdapter};
use std::sync::Arc;

#[derive(Debug, Clone, Default, PartialEq)]
struct Order {
    id: Option<i64>,
    customer: String,
    status: String,
    total: f64,
}

impl_entity!(Order {
    id,
    customer,
    status,
    total
});

fn setup_orders() -> Mapper<Order, SqliteAdapter> {
    let adapter = SqliteAdapter::open_in_memory().unwrap();
    adapter
        .connection()
        .execute_batch(
            "CREATE TABLE orders (
                id INTEGER PRIMARY KEY,
                customer TEXT NOT NULL,
                status TEXT NOT NULL,
                total REAL NOT NULL
             );
             INSERT INTO orders (customer, status, total) VALUES
               ('ann', 'open', 10.0),
               ('bob', 'open', 25.5),
               ('ann', 'shipped', 7.25),
               ('cy',  'open', 3.0),
               ('cy',  'void', 0.0);",
        )
        .unwrap();
    Mapper::new(adapter, MapperConfig::new("orders")).unwrap()
}

#[test]
fn test_count_matching_rows() {
    // Given: three open orders among five
    let mut mapper = setup_orders();

    // When: counting open orders
    let count = mapper
        .find_aggregate(
            AggregateFn::Count,
            None,
            None,
            &Criteria::new().field("status", "open"),
        )
        .unwrap();

    // Then: the count is 3
    assert_eq!(count, Value::Int(3));
}

#[test]
fn test_grouped_aggregate() {
    let mut mapper = setup_orders();
    let totals = mapper
        .find_aggregate(AggregateFn::Sum, Some("total"), Some("customer"), &Criteria::new())
        .unwrap();

    let Value::Map(by_customer) = totals else {
        panic!("expected grouped result");
    };
    assert_eq!(by_customer.get("ann"), Some(&Value::Float(17.25)));
    assert_eq!(by_customer.get("bob"), Some(&Value::Float(25.5)));
    assert_eq!(by_customer.len(), 3);
}

#[test]
fn test_empty_membership_returns_nothing() {
    let mut mapper = setup_orders();
    let found = mapper
        .find_by_field(
            &Criteria::new().one_of("id", Vec::<i64>::new()),
            &FindOptions::new(),
        )
        .unwrap();
    assert!(found.is_empty());
}

#[test]
fn test_find_by_field_orders_and_pages() {
    let mut mapper = setup_orders();
    let page = mapper
        .find_by_field(
            &Criteria::new().field("status", "open"),
            &FindOptions::new().order("total DESC").limit(2),
        )
        .unwrap();

    let customers: Vec<_> = page.iter().map(|o| o.customer.as_str()).collect();
    assert_eq!(customers, vec!["bob", "ann"]);
}

#[test]
fn test_find_by_field_with_maximal_limit() {
    let mut mapper = setup_orders();
    let all = mapper
        .find_by_field(&Criteria::new(), &FindOptions::new().limit(u64::MAX))
        .unwrap();
    assert_eq!(all.len(), 5);
}

#[test]
fn test_find_by_field_membership() {
    let mut mapper = setup_orders();
    let found = mapper
        .find_by_field(
            &Criteria::new().one_of("customer", ["ann", "cy"]),
            &FindOptions::new(),
        )
        .unwrap();
    assert_eq!(found.len(), 4);
    assert!(found.windows(2).all(|w| w[0].id < w[1].id));
}

#[test]
fn test_save_then_find_by_id() {
    // Given: a new order
    let mut mapper = setup_orders();
    let mut order = Order {
        id: None,
        customer: "dee".to_string(),
        status: "open".to_string(),
        total: 12.0,
    };

    // When: it is saved
    let key = mapper.save(&mut order).unwrap();

    // Then: the generated key is 6 and the order is found under it
    assert_eq!(key, Some(Value::Int(6)));
    let found = mapper.find_by_id(6).unwrap().unwrap();
    assert_eq!(*found, order);
}

#[test]
fn test_save_updates_existing_row() {
    let mut mapper = setup_orders();
    let mut order = (*mapper.find_by_id(2).unwrap().unwrap()).clone();
    order.status = "shipped".to_string();

    mapper.save(&mut order).unwrap();

    let shipped = mapper
        .find_aggregate(
            AggregateFn::Count,
            None,
            None,
            &Criteria::new().field("status", "shipped"),
        )
        .unwrap();
    assert_eq!(shipped, Value::Int(2));
}

#[test]
fn test_delete_by_id_missing_row_is_harmless() {
    let mut mapper = setup_orders();
    mapper.delete_by_id(999).unwrap();
    let count = mapper
        .find_aggregate(AggregateFn::Count, None, None, &Criteria::new())
        .unwrap();
    assert_eq!(count, Value::Int(5));
}

#[test]
fn test_delete_by_id_then_lookup_misses() {
    let mut mapper = setup_orders();
    let cached = mapper.find_by_id(1).unwrap();
    assert!(cached.is_some());

    mapper.delete_by_id(1).unwrap();

    assert!(mapper.find_by_id(1).unwrap().is_none());
}

#[test]
fn test_delete_by_field_with_or_mode_and_limit() {
    let mut mapper = setup_orders();
    let criteria = Criteria::new()
        .field("status", "void")
        .field("status", "shipped");

    mapper
        .delete_by_field(
            &criteria,
            &DeleteOptions::default(),
            Some(Mode::or(Comparison::Exact)),
        )
        .unwrap();
    mapper
        .delete_by_field(
            &Criteria::new().field("status", "open"),
            &DeleteOptions { limit: Some(1) },
            None,
        )
        .unwrap();

    let count = mapper
        .find_aggregate(AggregateFn::Count, None, None, &Criteria::new())
        .unwrap();
    assert_eq!(count, Value::Int(2));
}

#[test]
fn test_like_and_range_comparisons() {
    let mut mapper = setup_orders();
    let criteria = Criteria::new().field("customer", "an");
    mapper
        .delete_by_field(&criteria, &DeleteOptions::default(), Some(Mode::and(Comparison::Like)))
        .unwrap();

    let between = Criteria::new().between("total", 1.0, 30.0);
    let remaining = mapper
        .find_aggregate(AggregateFn::Count, None, None, &between)
        .unwrap();
    assert_eq!(remaining, Value::Int(2));
}

#[test]
fn test_editmode_adds_missing_column() {
    // Given: a table without a "note" column and an edit-mode mapper
    let adapter = SqliteAdapter::open_in_memory().unwrap();
    adapter
        .connection()
        .execute_batch("CREATE TABLE notes (id INTEGER PRIMARY KEY, title TEXT)")
        .unwrap();
    let config = MapperConfig::new("notes").editmode(true);
    let mut mapper: Mapper<Record, _> = Mapper::new(adapter, config).unwrap();

    let mut note = Record::new();
    note.set("title", "hello");
    note.set("note", "new column");

    // When: the record is saved
    let key = mapper.save(&mut note).unwrap();

    // Then: the column was added and the row persisted
    assert_eq!(key, Some(Value::Int(1)));
    let stored: String = mapper
        .adapter()
        .connection()
        .query_row("SELECT note FROM notes WHERE id = 1", [], |row| row.get(0))
        .unwrap();
    assert_eq!(stored, "new column");
    assert_eq!(mapper.adapter().errors().len(), 1);
}

#[test]
fn test_editmode_creates_missing_table() {
    let adapter = SqliteAdapter::open_in_memory().unwrap();
    let config = MapperConfig::new("orders").editmode(true);
    let mut mapper: Mapper<Order, _> = Mapper::new(adapter, config).unwrap();
    let mut order = Order {
        id: None,
        customer: "eve".to_string(),
        status: "open".to_string(),
        total: 1.0,
    };

    mapper.save(&mut order).unwrap();

    assert_eq!(order.id, Some(1));
    let found = mapper
        .find_by_field(&Criteria::new().field("customer", "eve"), &FindOptions::new())
        .unwrap();
    assert_eq!(found.len(), 1);
}

#[test]
fn test_without_editmode_schema_errors_are_absorbed() {
    let adapter = SqliteAdapter::open_in_memory().unwrap();
    let mut mapper: Mapper<Record, _> = Mapper::new(adapter, MapperConfig::new("ghosts")).unwrap();
    let mut ghost = Record::new();
    ghost.set("name", "boo");

    let key = mapper.save(&mut ghost).unwrap();

    assert_eq!(key, None);
    assert_eq!(
        mapper.adapter().errors()[0].kind(),
        ExErrorKind::SchemaMismatch
    );
}

#[test]
fn test_dates_round_trip_through_text_storage() {
    let adapter = SqliteAdapter::open_in_memory().unwrap();
    let config = MapperConfig::new("events").editmode(true);
    let mut mapper: Mapper<Record, _> = Mapper::new(adapter, config).unwrap();
    let when = NaiveDate::from_ymd_opt(2021, 5, 1)
        .unwrap()
        .and_hms_opt(9, 30, 0)
        .unwrap();

    let mut event = Record::new();
    event.set("at", when);
    event.set("label", "2021-05-01");
    let key = mapper.save(&mut event).unwrap().unwrap();

    // A fresh mapper over the same connection has an empty identity cache
    let adapter = mapper.into_adapter();
    let mut reader: Mapper<Record, _> =
        Mapper::new(adapter, MapperConfig::new("events")).unwrap();
    let loaded = reader.find_by_id(key).unwrap().unwrap();

    assert_eq!(loaded.get("at"), Some(&Value::DateTime(when)));
    assert_eq!(loaded.get("label"), Some(&Value::from("2021-05-01")));
}

#[test]
fn test_file_database_is_shared_between_mappers() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("orders.db");

    let writer_conn = db::open(&path).unwrap();
    db::configure(&writer_conn).unwrap();
    let mut writer: Mapper<Order, _> = Mapper::new(
        SqliteAdapter::new(writer_conn),
        MapperConfig::new("orders").editmode(true),
    )
    .unwrap();
    let mut order = Order {
        customer: "fay".to_string(),
        status: "open".to_string(),
        total: 4.5,
        ..Order::default()
    };
    writer.save(&mut order).unwrap();

    let mut reader: Mapper<Order, _> = Mapper::new(
        SqliteAdapter::new(db::open(&path).unwrap()),
        MapperConfig::new("orders"),
    )
    .unwrap();
    let found = reader.find_by_id(1).unwrap().unwrap();
    assert_eq!(found.customer, "fay");
    assert!(!Arc::ptr_eq(&found, &writer.find_by_id(1).unwrap().unwrap()));
}

//! Integration tests for the quickmodel-sqlite crate.

use chrono::{NaiveDate, TimeZone, Utc};
use quickmodel_core::{Condition, FieldSpec, IndexSpec, ModelError, ModelSpec, SqlValue, Value};
use quickmodel_sqlite::{Database, DatabaseConfig, SessionState, SqliteError};
use serde_json::json;

fn person_spec() -> ModelSpec {
    ModelSpec::new("person")
        .field("name", FieldSpec::string().not_null())
        .field("age", FieldSpec::integer())
        .index(IndexSpec::new(["name"]))
}

fn person(name: &str, age: i64) -> [(&str, Value); 2] {
    [("name", Value::from(name)), ("age", Value::from(age))]
}

#[test]
fn test_person_end_to_end() {
    let db = Database::open_in_memory("1.0").unwrap();
    let people = db.define_model(person_spec()).unwrap();
    db.confirm_migration().unwrap();

    let ann = people.create(person("Ann", 34)).unwrap();
    let bob = people.create(person("Bob", 17)).unwrap();
    let cid = people.create(person("Cid", 70)).unwrap();
    assert_eq!(ann.id(), Some(1));
    assert_eq!(bob.id(), Some(2));
    assert_eq!(cid.id(), Some(3));

    let working_age = people
        .filter_json(&json!({"age": {"gte": 18, "lt": 65}}))
        .unwrap()
        .all()
        .unwrap();
    assert_eq!(working_age.len(), 1);
    assert_eq!(working_age[0].get("name").unwrap(), Value::from("Ann"));

    let by_age = people.order("-age").unwrap().all().unwrap();
    let ages: Vec<i64> = by_age
        .iter()
        .map(|r| r.get("age").unwrap().as_i64().unwrap())
        .collect();
    assert_eq!(ages, vec![70, 34, 17]);

    assert_eq!(people.remove(2).unwrap(), 1);
    assert!(people.find(2).unwrap().is_none());
    assert_eq!(people.count().unwrap(), 2);
}

#[test]
fn test_redeclaring_identical_model_is_noop() {
    let db = Database::open_in_memory("1").unwrap();
    db.define_model(person_spec()).unwrap();
    let before = db.schema_version().unwrap();

    db.define_model(person_spec()).unwrap();
    assert_eq!(db.schema_version().unwrap(), before);
    assert!(db.sync_reports().last().unwrap().is_noop());
}

#[test]
fn test_changed_columns_preserve_rows_across_versions() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("app.db");

    {
        let db = Database::open(&path, "1").unwrap();
        let t = db
            .define_model(
                ModelSpec::new("t")
                    .field("a", FieldSpec::string())
                    .field("b", FieldSpec::integer()),
            )
            .unwrap();
        for i in 0..5 {
            t.create([("a", Value::from(format!("row{i}"))), ("b", Value::from(i))])
                .unwrap();
        }
        db.confirm_migration().unwrap();
        db.close().unwrap();
    }

    let db = Database::open(&path, "2").unwrap();
    assert_eq!(db.state(), SessionState::Migrating);
    let t = db
        .define_model(
            ModelSpec::new("t")
                .field("a", FieldSpec::string())
                .field("c", FieldSpec::integer()),
        )
        .unwrap();

    let report = db.sync_reports().last().cloned().unwrap();
    assert!(report.rebuilt);
    assert_eq!(report.rows_copied, 5);
    assert_eq!(report.dropped_columns, vec!["b".to_string()]);

    let rows = t.order("id").unwrap().all().unwrap();
    assert_eq!(rows.len(), 5);
    for (i, row) in rows.iter().enumerate() {
        assert_eq!(row.id(), Some(i as i64 + 1));
        assert_eq!(row.get("a").unwrap(), Value::from(format!("row{i}")));
        assert_eq!(row.get("c").unwrap(), Value::Null);
        assert!(matches!(row.get("b"), Err(ModelError::UnknownField { .. })));
    }
}

#[test]
fn test_confirmed_version_reopens_ready() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("app.db");

    {
        let db = Database::open(&path, "1").unwrap();
        db.define_model(person_spec()).unwrap();
        db.close().unwrap();
    }
    {
        let db = Database::open(&path, "1").unwrap();
        assert_eq!(db.state(), SessionState::Migrating);
        db.define_model(person_spec()).unwrap();
        db.confirm_migration().unwrap();
        db.close().unwrap();
    }

    let db = Database::open(&path, "1").unwrap();
    assert_eq!(db.state(), SessionState::Ready);
    let ddl = db.object_sql("person").unwrap();
    db.define_model(ModelSpec::new("person").field("other", FieldSpec::string()))
        .unwrap();
    assert_eq!(db.object_sql("person").unwrap(), ddl);
    assert!(db.sync_reports().is_empty());
}

#[test]
fn test_confirm_prunes_undeclared_tables() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("app.db");

    {
        let db = Database::open(&path, "1").unwrap();
        db.define_model(person_spec()).unwrap();
        db.define_model(ModelSpec::new("legacy").field("x", FieldSpec::integer()))
            .unwrap();
        assert!(db.confirm_migration().unwrap().is_empty());
        db.close().unwrap();
    }

    let db = Database::open(&path, "2").unwrap();
    db.define_model(person_spec()).unwrap();
    assert_eq!(db.confirm_migration().unwrap(), vec!["legacy".to_string()]);
    assert!(!db.table_names().unwrap().contains(&"legacy".to_string()));
    assert_eq!(db.version_record().unwrap().unwrap().version, "2");
}

#[test]
fn test_transaction_rolls_back_partial_writes() {
    let db = Database::open_in_memory("1").unwrap();
    let people = db.define_model(person_spec()).unwrap();
    db.confirm_migration().unwrap();

    let result = db.transaction(|_| {
        people.create(person("Ann", 30))?;
        people.create([("name", Value::Null)])?;
        Ok(())
    });
    assert!(matches!(result, Err(SqliteError::DatabaseError(_))));
    assert_eq!(people.count().unwrap(), 0);
}

#[test]
fn test_unknown_field_on_closed_model() {
    let db = Database::open_in_memory("1").unwrap();
    let people = db.define_model(person_spec()).unwrap();

    let filtered = people.filter_json(&json!({"height": {"gt": 180}})).unwrap().all();
    assert!(matches!(
        filtered,
        Err(SqliteError::ModelError(ModelError::UnknownField { .. }))
    ));
    assert!(matches!(
        people.create([("height", 180)]),
        Err(SqliteError::ModelError(ModelError::UnknownField { .. }))
    ));
}

#[test]
fn test_view_is_read_only() {
    let db = Database::open_in_memory("1").unwrap();
    let people = db.define_model(person_spec()).unwrap();
    let adults = db
        .define_view("adults", "SELECT id, name, age FROM person WHERE age >= 18")
        .unwrap();
    db.confirm_migration().unwrap();

    people.create(person("Ann", 34)).unwrap();
    people.create(person("Bob", 9)).unwrap();

    let rows = adults.all().unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].get("name").unwrap(), Value::from("Ann"));
    assert!(matches!(
        adults.create(person("Eve", 40)),
        Err(SqliteError::ReadOnly(_))
    ));
    assert!(db.object_sql("adults").unwrap().unwrap().starts_with("CREATE VIEW adults"));
}

#[test]
fn test_foreign_keys_cascade_when_ready() {
    let db = Database::open_in_memory("1").unwrap();
    let people = db.define_model(person_spec()).unwrap();
    let pets = db
        .define_model(
            ModelSpec::new("pet")
                .field("name", FieldSpec::string())
                .field("owner", FieldSpec::foreign_key("person")),
        )
        .unwrap();
    db.confirm_migration().unwrap();

    let ann = people.create(person("Ann", 34)).unwrap();
    pets.create([("name", Value::from("Rex")), ("owner", Value::from(ann.id()))])
        .unwrap();
    assert_eq!(pets.count().unwrap(), 1);

    people.remove_record(&ann).unwrap();
    assert_eq!(pets.count().unwrap(), 0);
}

#[test]
fn test_failed_migration_leaves_table_untouched() {
    let db = Database::open_in_memory("1").unwrap();
    db.define_model(person_spec()).unwrap();

    let broken = ModelSpec::new("broken")
        .field("x", FieldSpec::integer())
        .trigger("CREATE TRIGGER broken_touch AFTER INSERT ON missing BEGIN SELECT 1; END");
    let result = db.define_model(broken);
    assert!(matches!(
        result,
        Err(SqliteError::MigrationError { ref table, .. }) if table == "broken"
    ));
    assert!(db.object_sql("broken").unwrap().is_none());
    assert!(db.object_sql("person").unwrap().is_some());
    assert!(db.is_migrating());
}

#[test]
fn test_typed_values_round_trip_through_sqlite() {
    let db = Database::open_in_memory("1").unwrap();
    let events = db
        .define_model(
            ModelSpec::new("event")
                .field("title", FieldSpec::string())
                .field("day", FieldSpec::date())
                .field("at", FieldSpec::datetime())
                .field("done", FieldSpec::boolean())
                .field("score", FieldSpec::float())
                .field("tags", FieldSpec::json()),
        )
        .unwrap();

    let day = NaiveDate::from_ymd_opt(2024, 2, 29).unwrap();
    let at = Utc.with_ymd_and_hms(2024, 5, 1, 12, 30, 0).unwrap();
    let tags = json!({"labels": ["a", "b"], "n": 2});
    let created = events
        .create([
            ("title", Value::from("it's here")),
            ("day", Value::from(day)),
            ("at", Value::from(at)),
            ("done", Value::from(true)),
            ("score", Value::from(2.5)),
            ("tags", Value::from(tags.clone())),
        ])
        .unwrap();

    assert_eq!(created.get("title").unwrap(), Value::from("it's here"));
    assert_eq!(created.get("day").unwrap(), Value::Date(day));
    assert_eq!(created.get("at").unwrap(), Value::DateTime(at));
    assert_eq!(created.get("done").unwrap(), Value::Bool(true));
    assert_eq!(created.get("score").unwrap(), Value::Float(2.5));
    assert_eq!(created.get("tags").unwrap(), Value::Json(tags));

    let found = events
        .filter(Condition::eq("day", day))
        .get()
        .unwrap()
        .unwrap();
    assert_eq!(found.id(), created.id());
}

#[test]
fn test_from_config_opens_file() {
    let dir = tempfile::tempdir().unwrap();
    let mut config = DatabaseConfig::new("shop", "3");
    config.path = Some(dir.path().join("shop.db"));
    config.busy_timeout_ms = Some(500);

    let db = Database::from_config(&config).unwrap();
    assert_eq!(db.version(), Some("3"));
    assert!(db.is_migrating());
    assert!(dir.path().join("shop.db").exists());
}

#[test]
fn test_execute_sql_result_set() {
    let db = Database::open_in_memory("1").unwrap();
    let people = db.define_model(person_spec()).unwrap();
    people.create(person("Ann", 34)).unwrap();

    let result = db
        .execute_sql("SELECT name, age FROM person WHERE age > ?", &[SqlValue::Integer(18)])
        .unwrap();
    assert_eq!(result.columns, vec!["name".to_string(), "age".to_string()]);
    assert_eq!(result.to_json(), json!([{"name": "Ann", "age": 34}]));

    let update = db
        .execute_sql("UPDATE person SET age = age + 1", &[])
        .unwrap();
    assert_eq!(update.rows_affected, 1);
}

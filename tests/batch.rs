//! Integration tests for exec / exec_one / query.
#![cfg(all(unix, feature = "engine"))]

mod common;

use common::{memory_db, user_values, USERS_SCHEMA};
use rstest::rstest;
use sqlwire::{Error, Row, Value, ValueType};

const INSERT_USER: &str = "INSERT INTO users (id, name, age, rating) VALUES (?, ?, ?, ?)";
const SELECT_USERS: &str = "SELECT id, name, age, rating FROM users ORDER BY id";
const USER_TYPES: [ValueType; 4] = [
    ValueType::Int,
    ValueType::Text,
    ValueType::Int,
    ValueType::Double,
];

/// Test inserting two typed rows and reading them back in order.
#[tokio::test]
async fn test_insert_and_query_users() {
    let mut db = memory_db().await;
    db.exec_one(USERS_SCHEMA).await.unwrap();

    let affected = db.exec(INSERT_USER, 2, 4, &user_values(2, true)).await.unwrap();
    assert_eq!(affected, 2);

    let rows = db.query(SELECT_USERS, &[], &USER_TYPES).await.unwrap();
    assert_eq!(
        rows,
        vec![
            Row::new(vec![
                Value::Int(1),
                Value::Text("User_1".into()),
                Value::Int(33),
                Value::Double(0.13),
            ]),
            Row::new(vec![
                Value::Int(2),
                Value::Text("User_2".into()),
                Value::Int(34),
                Value::Double(0.26),
            ]),
        ]
    );
    assert!(!db.has_active_statement());
}

/// Test that a bound NULL in a REAL column comes back as Null.
#[tokio::test]
async fn test_null_rating_round_trip() {
    let mut db = memory_db().await;
    db.exec_one(USERS_SCHEMA).await.unwrap();

    db.exec(INSERT_USER, 1, 4, &user_values(1, false)).await.unwrap();

    let rows = db
        .query("SELECT rating FROM users", &[], &[ValueType::Double])
        .await
        .unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0][0], Value::Null);
    assert_eq!(rows[0][0].as_double().unwrap(), None);
}

/// Test that a 64-byte blob is stored and read back byte for byte.
#[tokio::test]
async fn test_blob_round_trip() {
    let mut db = memory_db().await;
    db.exec_one("CREATE TABLE images (id INTEGER PRIMARY KEY NOT NULL, image BLOB)")
        .await
        .unwrap();

    let image: Vec<u8> = (0..64u8).collect();
    db.exec(
        "INSERT INTO images (id, image) VALUES (?, ?)",
        1,
        2,
        &[Value::Int(1), Value::Blob(image.clone())],
    )
    .await
    .unwrap();

    let rows = db
        .query(
            "SELECT id, image FROM images ORDER BY id",
            &[],
            &[ValueType::Int, ValueType::Blob],
        )
        .await
        .unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0][1].as_blob().unwrap(), Some(&image[..]));
}

/// Test that exec returns the summed change count of every row.
#[tokio::test]
async fn test_exec_counts_every_row() {
    let mut db = memory_db().await;
    db.exec_one(USERS_SCHEMA).await.unwrap();

    db.exec_one("BEGIN TRANSACTION").await.unwrap();
    let affected = db
        .exec(INSERT_USER, 100, 4, &user_values(100, true))
        .await
        .unwrap();
    db.exec_one("COMMIT").await.unwrap();
    assert_eq!(affected, 100);

    let updated = db
        .exec_one("UPDATE users SET age = age + 1 WHERE id <= 10")
        .await
        .unwrap();
    assert_eq!(updated, 10);

    let rows = db.query(SELECT_USERS, &[], &USER_TYPES).await.unwrap();
    assert_eq!(rows.len(), 100);
}

/// Test that a wrong number of values is rejected before anything is bound.
#[tokio::test]
async fn test_exec_rejects_wrong_value_count() {
    let mut db = memory_db().await;
    db.exec_one(USERS_SCHEMA).await.unwrap();

    let mut values = user_values(2, true);
    values.pop();
    let err = db.exec(INSERT_USER, 2, 4, &values).await.unwrap_err();
    assert_eq!(err.row, None);
    assert_eq!(err.affected, 0);
    assert!(matches!(err.source, Error::BindFailed(_)));
    assert!(!db.has_active_statement());

    let rows = db.query(SELECT_USERS, &[], &USER_TYPES).await.unwrap();
    assert!(rows.is_empty());
}

/// Test that partial-row binding is rejected.
#[tokio::test]
async fn test_exec_rejects_partial_rows() {
    let mut db = memory_db().await;
    db.exec_one(USERS_SCHEMA).await.unwrap();

    let err = db
        .exec(
            INSERT_USER,
            1,
            3,
            &[Value::Int(1), Value::from("User_1"), Value::Int(33)],
        )
        .await
        .unwrap_err();
    assert!(matches!(err.source, Error::BindFailed(_)));
    assert_eq!(err.row, None);
    // finalized even though no row ran
    assert!(!db.has_active_statement());
}

/// Test that a failing row stops exec and reports progress so far.
#[tokio::test]
async fn test_exec_stops_at_failing_row() {
    let mut db = memory_db().await;
    db.exec_one(USERS_SCHEMA).await.unwrap();

    // Row 2 repeats id 1
    let mut values = user_values(4, true);
    values[8] = Value::Int(1);
    let err = db.exec(INSERT_USER, 4, 4, &values).await.unwrap_err();

    assert_eq!(err.row, Some(2));
    assert_eq!(err.affected, 2);
    assert!(matches!(err.source, Error::StepFailed { .. }));
    assert!(!db.has_active_statement());

    // No implicit transaction: the first two rows stay
    let rows = db.query(SELECT_USERS, &[], &USER_TYPES).await.unwrap();
    assert_eq!(rows.len(), 2);

    // Converts into the crate error through `?`
    async fn run(db: &mut sqlwire::Driver) -> sqlwire::Result<i64> {
        Ok(db.exec(INSERT_USER, 1, 4, &user_values(1, true)).await?)
    }
    assert!(matches!(run(&mut db).await, Err(Error::StepFailed { .. })));
}

/// Test that invalid SQL in exec surfaces as PrepareFailed.
#[tokio::test]
async fn test_exec_invalid_sql() {
    let mut db = memory_db().await;
    let err = db.exec_one("CREATE TABEL nope (x)").await.unwrap_err();
    assert!(matches!(err, Error::PrepareFailed { .. }));
    assert!(!db.has_active_statement());
}

/// Test that a query with no matching rows returns an empty result.
#[tokio::test]
async fn test_query_empty_result() {
    let mut db = memory_db().await;
    db.exec_one(USERS_SCHEMA).await.unwrap();

    let rows = db
        .query(
            "SELECT id, name, age, rating FROM users WHERE age > ?",
            &[Value::Int(1000)],
            &USER_TYPES,
        )
        .await
        .unwrap();
    assert!(rows.is_empty());
    assert!(!db.has_active_statement());
}

/// Test that the column schema must match the column count.
#[rstest]
#[case::too_few(&[ValueType::Int])]
#[case::too_many(&[ValueType::Int, ValueType::Text, ValueType::Int, ValueType::Double, ValueType::Text])]
#[tokio::test]
async fn test_query_schema_mismatch(#[case] schema: &'static [ValueType]) {
    let mut db = memory_db().await;
    db.exec_one(USERS_SCHEMA).await.unwrap();

    let err = db.query(SELECT_USERS, &[], schema).await.unwrap_err();
    match err {
        Error::SchemaMismatch { declared, actual } => {
            assert_eq!(declared, schema.len());
            assert_eq!(actual, 4);
        }
        other => panic!("expected SchemaMismatch, got {:?}", other),
    }
    assert!(!db.has_active_statement());
}

/// Test that query parameters must match the parameter count.
#[tokio::test]
async fn test_query_parameter_mismatch() {
    let mut db = memory_db().await;
    db.exec_one(USERS_SCHEMA).await.unwrap();

    let err = db
        .query("SELECT id FROM users WHERE id = ?", &[], &[ValueType::Int])
        .await
        .unwrap_err();
    assert!(matches!(err, Error::BindFailed(_)));
    assert!(!db.has_active_statement());
}

/// Test that a type mismatch mid-query still finalizes the statement.
#[tokio::test]
async fn test_query_type_mismatch_finalizes() {
    let mut db = memory_db().await;
    db.exec_one(USERS_SCHEMA).await.unwrap();
    db.exec(INSERT_USER, 1, 4, &user_values(1, true)).await.unwrap();

    let err = db
        .query(
            SELECT_USERS,
            &[],
            &[ValueType::Int, ValueType::Int, ValueType::Int, ValueType::Double],
        )
        .await
        .unwrap_err();
    assert!(matches!(err, Error::ColumnTypeMismatch { column: 1, .. }));
    assert!(!db.has_active_statement());
}

/// Test values of every type through a bound parameter and back.
#[rstest]
#[case::int(Value::Int(-42), ValueType::Int)]
#[case::double(Value::Double(2.5), ValueType::Double)]
#[case::text(Value::Text("héllo".into()), ValueType::Text)]
#[case::empty_text(Value::Text(String::new()), ValueType::Text)]
#[case::blob(Value::Blob(vec![0, 255, 7]), ValueType::Blob)]
#[case::empty_blob(Value::Blob(Vec::new()), ValueType::Blob)]
#[case::null(Value::Null, ValueType::Int)]
#[tokio::test]
async fn test_parameter_echo(#[case] value: Value, #[case] column_type: ValueType) {
    let mut db = memory_db().await;

    let rows = db
        .query("SELECT ?", std::slice::from_ref(&value), &[column_type])
        .await
        .unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0][0], value);
}

/// Test a three-table join filtered by bound parameters.
#[tokio::test]
async fn test_join_across_tables() {
    let mut db = memory_db().await;
    for sql in [
        "PRAGMA foreign_keys=1",
        "CREATE TABLE profiles (id VARCHAR PRIMARY KEY NOT NULL, name VARCHAR NOT NULL, active BOOL NOT NULL)",
        "CREATE TABLE users (id VARCHAR PRIMARY KEY NOT NULL, profileId VARCHAR NOT NULL, name VARCHAR NOT NULL, active BOOL NOT NULL, FOREIGN KEY (profileId) REFERENCES profiles(id))",
        "CREATE INDEX idx_users_profileId ON users(profileId)",
        "CREATE TABLE locations (id VARCHAR PRIMARY KEY NOT NULL, userId VARCHAR NOT NULL, name VARCHAR NOT NULL, active BOOL NOT NULL, FOREIGN KEY (userId) REFERENCES users(id))",
        "CREATE INDEX idx_locations_userId ON locations(userId)",
    ] {
        db.exec_one(sql).await.unwrap();
    }

    let (nprofiles, nusers, nlocations) = (2, 2, 2);
    let mut profiles = Vec::new();
    let mut users = Vec::new();
    let mut locations = Vec::new();
    for p in 0..nprofiles {
        profiles.extend([
            Value::from(format!("profile_{}", p)),
            Value::from(format!("Profile {}", p)),
            Value::from(p % 2 == 1),
        ]);
        for u in 0..nusers {
            let user_id = format!("user_{}_{}", p, u);
            users.extend([
                Value::from(user_id.clone()),
                Value::from(format!("profile_{}", p)),
                Value::from(format!("User {} {}", p, u)),
                Value::from(u % 2 == 1),
            ]);
            for l in 0..nlocations {
                locations.extend([
                    Value::from(format!("location_{}_{}_{}", p, u, l)),
                    Value::from(user_id.clone()),
                    Value::from(format!("Location {} {} {}", p, u, l)),
                    Value::from(l % 2 == 1),
                ]);
            }
        }
    }

    db.exec_one("BEGIN TRANSACTION").await.unwrap();
    db.exec(
        "INSERT INTO profiles (id, name, active) VALUES (?, ?, ?)",
        nprofiles,
        3,
        &profiles,
    )
    .await
    .unwrap();
    db.exec(
        "INSERT INTO users (id, profileId, name, active) VALUES (?, ?, ?, ?)",
        nprofiles * nusers,
        4,
        &users,
    )
    .await
    .unwrap();
    let inserted = db
        .exec(
            "INSERT INTO locations (id, userId, name, active) VALUES (?, ?, ?, ?)",
            nprofiles * nusers * nlocations,
            4,
            &locations,
        )
        .await
        .unwrap();
    db.exec_one("COMMIT").await.unwrap();
    assert_eq!(inserted, 8);

    let sql = "SELECT locations.id, locations.userId, locations.name, locations.active, \
               users.id, users.profileId, users.name, users.active, \
               profiles.id, profiles.name, profiles.active \
               FROM locations \
               LEFT JOIN users ON users.id = locations.userId \
               LEFT JOIN profiles ON profiles.id = users.profileId \
               WHERE locations.active = ? OR locations.active = ? \
               ORDER BY locations.name, locations.id, users.name, users.id, profiles.name, profiles.id";
    let schema = [
        ValueType::Text,
        ValueType::Text,
        ValueType::Text,
        ValueType::Int,
        ValueType::Text,
        ValueType::Text,
        ValueType::Text,
        ValueType::Int,
        ValueType::Text,
        ValueType::Text,
        ValueType::Int,
    ];
    let rows = db
        .query(sql, &[Value::Int(0), Value::Int(1)], &schema)
        .await
        .unwrap();
    assert_eq!(rows.len(), 8);

    let first = &rows[0];
    assert_eq!(first[0].as_text().unwrap(), Some("location_0_0_0"));
    assert_eq!(first[4].as_text().unwrap(), Some("user_0_0"));
    assert_eq!(first[8].as_text().unwrap(), Some("profile_0"));
    assert_eq!(first[10].as_int().unwrap(), Some(0));

    // Foreign keys are enforced
    let err = db
        .exec(
            "INSERT INTO locations (id, userId, name, active) VALUES (?, ?, ?, ?)",
            1,
            4,
            &[
                Value::from("orphan"),
                Value::from("no_such_user"),
                Value::from("Orphan"),
                Value::from(true),
            ],
        )
        .await
        .unwrap_err();
    assert!(matches!(err.source, Error::StepFailed { .. }));
}

//! Functional test and benchmark runs against a sqlwire engine.
//!
//! ```text
//! cargo build --bin sqlwire-engine
//! cargo run --example bench -- --engine target/debug/sqlwire-engine test
//! cargo run --release --example bench -- --engine target/release/sqlwire-engine bench
//! ```
//!
//! `test` runs every workload with small sizes; `bench` runs the insert and
//! query workloads at full size and logs their timings.

use std::time::Instant;

use clap::{Parser, Subcommand};
use sqlwire::{Driver, Options, Result, Value, ValueType};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Engine executable
    #[arg(short, long, default_value = "sqlwire-engine", global = true)]
    engine: String,

    /// Database path; ":memory:" for an in-memory database
    #[arg(short, long, default_value = ":memory:", global = true)]
    db: String,

    #[command(subcommand)]
    command: Run,
}

#[derive(Subcommand, Debug, Clone, Copy)]
enum Run {
    /// Run every workload with small sizes
    Test,
    /// Run the workloads at benchmark sizes
    Bench,
}

const USERS_SCHEMA: &str =
    "CREATE TABLE users (id INTEGER PRIMARY KEY NOT NULL, name VARCHAR, age INTEGER, rating REAL)";
const INSERT_USER: &str = "INSERT INTO users (id, name, age, rating) VALUES (?, ?, ?, ?)";
const SELECT_USERS: &str = "SELECT id, name, age, rating FROM users ORDER BY id";

struct Bench {
    options: Options,
    db: String,
}

impl Bench {
    async fn connect(&self) -> Result<Driver> {
        if self.db != sqlwire::MEMORY_DB {
            // Start from an empty file
            let _ = std::fs::remove_file(&self.db);
        }
        let mut driver = Driver::new(self.options.clone()).await?;
        driver.open(&self.db).await?;
        Ok(driver)
    }

    /// Per-row bind/step/reset through the low-level operations.
    async fn functions(&self, nusers: i64) -> Result<()> {
        tracing::info!(nusers, "functions");
        let mut db = self.connect().await?;

        db.prepare(USERS_SCHEMA).await?;
        db.step().await?;
        db.finalize().await?;

        let start = Instant::now();
        db.exec_one("BEGIN TRANSACTION").await?;
        db.prepare(INSERT_USER).await?;
        for i in 0..nusers {
            let id = i + 1;
            db.bind(1, &Value::Int(id)).await?;
            db.bind(2, &Value::Text(format!("User_{}", id))).await?;
            db.bind(3, &Value::Int(33 + i)).await?;
            db.bind(4, &Value::Double(0.13 * id as f64)).await?;
            db.step().await?;
            db.reset().await?;
            let changes = db.changes().await?;
            assert_eq!(changes, 1, "row {} not inserted", id);
        }
        db.finalize().await?;
        db.exec_one("COMMIT").await?;
        let inserted = start.elapsed();

        let start = Instant::now();
        db.prepare(SELECT_USERS).await?;
        let mut fetched = 0;
        while db.step().await? {
            db.column(0, ValueType::Int).await?;
            db.column(1, ValueType::Text).await?;
            db.column(2, ValueType::Int).await?;
            db.column(3, ValueType::Double).await?;
            fetched += 1;
        }
        db.finalize().await?;
        let queried = start.elapsed();

        db.close().await?;
        db.terminate().await?;
        tracing::info!(fetched, ?inserted, ?queried, "functions ok");
        Ok(())
    }

    /// Batched insert and typed query, with or without a rating.
    async fn users(&self, nusers: usize, bind_rating: bool) -> Result<()> {
        tracing::info!(nusers, bind_rating, "users");
        let mut db = self.connect().await?;
        db.exec_one(USERS_SCHEMA).await?;

        let mut values = Vec::with_capacity(nusers * 4);
        for i in 0..nusers {
            let id = (i + 1) as i64;
            values.push(Value::Int(id));
            values.push(Value::Text(format!("User_{}", id)));
            values.push(Value::Int(33 + i as i64));
            values.push(if bind_rating {
                Value::Double(0.13 * id as f64)
            } else {
                Value::Null
            });
        }

        let start = Instant::now();
        db.exec_one("BEGIN TRANSACTION").await?;
        db.exec(INSERT_USER, nusers, 4, &values).await?;
        db.exec_one("COMMIT").await?;
        let inserted = start.elapsed();

        let start = Instant::now();
        let rows = db
            .query(
                SELECT_USERS,
                &[],
                &[ValueType::Int, ValueType::Text, ValueType::Int, ValueType::Double],
            )
            .await?;
        let queried = start.elapsed();
        assert_eq!(rows.len(), nusers);

        db.close().await?;
        db.terminate().await?;
        tracing::info!(fetched = rows.len(), ?inserted, ?queried, "users ok");
        Ok(())
    }

    /// Three related tables joined in one query.
    async fn complex(&self, nprofiles: usize, nusers: usize, nlocations: usize) -> Result<()> {
        tracing::info!(nprofiles, nusers, nlocations, "complex");
        let mut db = self.connect().await?;

        for sql in [
            "PRAGMA foreign_keys=1",
            "DROP TABLE IF EXISTS locations",
            "DROP TABLE IF EXISTS users",
            "DROP TABLE IF EXISTS profiles",
            "CREATE TABLE profiles (id VARCHAR PRIMARY KEY NOT NULL, name VARCHAR NOT NULL, active BOOL NOT NULL)",
            "CREATE INDEX idx_profiles_name ON profiles(name)",
            "CREATE INDEX idx_profiles_active ON profiles(active)",
            "CREATE TABLE users (id VARCHAR PRIMARY KEY NOT NULL, profileId VARCHAR NOT NULL, name VARCHAR NOT NULL, active BOOL NOT NULL, FOREIGN KEY (profileId) REFERENCES profiles(id))",
            "CREATE INDEX idx_users_profileId ON users(profileId)",
            "CREATE INDEX idx_users_name ON users(name)",
            "CREATE INDEX idx_users_active ON users(active)",
            "CREATE TABLE locations (id VARCHAR PRIMARY KEY NOT NULL, userId VARCHAR NOT NULL, name VARCHAR NOT NULL, active BOOL NOT NULL, FOREIGN KEY (userId) REFERENCES users(id))",
            "CREATE INDEX idx_locations_userId ON locations(userId)",
            "CREATE INDEX idx_locations_name ON locations(name)",
            "CREATE INDEX idx_locations_active ON locations(active)",
        ] {
            db.exec_one(sql).await?;
        }

        let start = Instant::now();
        let mut profiles = Vec::with_capacity(nprofiles * 3);
        let mut users = Vec::with_capacity(nprofiles * nusers * 4);
        let mut locations = Vec::with_capacity(nprofiles * nusers * nlocations * 4);
        for p in 0..nprofiles {
            let profile_id = format!("profile_{}", p);
            profiles.extend([
                Value::from(profile_id.clone()),
                Value::from(format!("Profile {}", p)),
                Value::from(p % 2 == 1),
            ]);
            for u in 0..nusers {
                let user_id = format!("user_{}_{}", p, u);
                users.extend([
                    Value::from(user_id.clone()),
                    Value::from(profile_id.clone()),
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

        db.exec_one("BEGIN TRANSACTION").await?;
        db.exec(
            "INSERT INTO profiles (id, name, active) VALUES (?, ?, ?)",
            nprofiles,
            3,
            &profiles,
        )
        .await?;
        db.exec(
            "INSERT INTO users (id, profileId, name, active) VALUES (?, ?, ?, ?)",
            nprofiles * nusers,
            4,
            &users,
        )
        .await?;
        db.exec(
            "INSERT INTO locations (id, userId, name, active) VALUES (?, ?, ?, ?)",
            nprofiles * nusers * nlocations,
            4,
            &locations,
        )
        .await?;
        db.exec_one("COMMIT").await?;
        let inserted = start.elapsed();

        let start = Instant::now();
        let sql = "SELECT locations.id, locations.userId, locations.name, locations.active, \
                   users.id, users.profileId, users.name, users.active, \
                   profiles.id, profiles.name, profiles.active \
                   FROM locations \
                   LEFT JOIN users ON users.id = locations.userId \
                   LEFT JOIN profiles ON profiles.id = users.profileId \
                   WHERE locations.active = ? OR locations.active = ? \
                   ORDER BY locations.name, locations.id, users.name, users.id, profiles.name, profiles.id";
        use ValueType::{Int, Text};
        let rows = db
            .query(
                sql,
                &[Value::Int(0), Value::Int(1)],
                &[Text, Text, Text, Int, Text, Text, Text, Int, Text, Text, Int],
            )
            .await?;
        let queried = start.elapsed();
        assert_eq!(rows.len(), nprofiles * nusers * nlocations);

        db.close().await?;
        db.terminate().await?;
        tracing::info!(fetched = rows.len(), ?inserted, ?queried, "complex ok");
        Ok(())
    }

    /// A 64-byte blob written and read back.
    async fn blob(&self) -> Result<()> {
        tracing::info!("blob");
        let mut db = self.connect().await?;
        db.exec_one("DROP TABLE IF EXISTS images").await?;
        db.exec_one("CREATE TABLE images (id INTEGER PRIMARY KEY NOT NULL, image BLOB)")
            .await?;

        let image: Vec<u8> = (0..64u8).collect();
        db.exec(
            "INSERT INTO images (id, image) VALUES (?, ?)",
            1,
            2,
            &[Value::Int(1), Value::Blob(image.clone())],
        )
        .await?;

        let rows = db
            .query(
                "SELECT id, image FROM images ORDER BY id",
                &[],
                &[ValueType::Int, ValueType::Blob],
            )
            .await?;
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0][1].as_blob()?, Some(&image[..]));

        db.close().await?;
        db.terminate().await?;
        tracing::info!("blob ok");
        Ok(())
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let args = Args::parse();
    let bench = Bench {
        options: Options::new().engine_path(&args.engine),
        db: args.db,
    };

    match args.command {
        Run::Test => {
            bench.functions(2).await?;
            bench.users(2, true).await?;
            bench.complex(2, 2, 2).await?;
            bench.blob().await?;
        }
        Run::Bench => {
            bench.functions(10_000).await?;
            bench.users(1_000_000, false).await?;
            bench.users(1_000_000, true).await?;
            bench.complex(100, 100, 10).await?;
        }
    }
    Ok(())
}

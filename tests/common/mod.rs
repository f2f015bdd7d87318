//! Shared helpers for integration tests.
#![allow(dead_code)]

use std::io::{BufReader, BufWriter};
use std::os::unix::net::UnixStream;

use sqlwire::{Driver, Options, StderrMode, Value, MEMORY_DB};

pub const USERS_SCHEMA: &str =
    "CREATE TABLE users (id INTEGER PRIMARY KEY NOT NULL, name VARCHAR, age INTEGER, rating REAL)";

/// Driver talking to an engine running on a thread of this process.
pub async fn in_process() -> Driver {
    let (ours, theirs) = UnixStream::pair().unwrap();

    let engine_reader = theirs.try_clone().unwrap();
    std::thread::spawn(move || {
        sqlwire::engine::serve(BufReader::new(engine_reader), BufWriter::new(theirs))
    });

    ours.set_nonblocking(true).unwrap();
    let stream = tokio::net::UnixStream::from_std(ours).unwrap();
    let (reader, writer) = stream.into_split();
    Driver::from_transport(Box::new(reader), Box::new(writer))
        .await
        .unwrap()
}

/// In-process driver with an in-memory database open.
pub async fn memory_db() -> Driver {
    let mut db = in_process().await;
    db.open(MEMORY_DB).await.unwrap();
    db
}

/// Options launching the engine binary built with this crate.
pub fn engine_options() -> Options {
    Options::new()
        .engine_path(env!("CARGO_BIN_EXE_sqlwire-engine"))
        .stderr(StderrMode::Discard)
}

/// Row-major `(id, name, age, rating)` values for `n` users.
///
/// User `i` (1-based) is `(i, "User_i", 32 + i, 0.13 * i)`, or a NULL
/// rating when `with_rating` is false.
pub fn user_values(n: usize, with_rating: bool) -> Vec<Value> {
    let mut values = Vec::with_capacity(n * 4);
    for i in 1..=n {
        values.push(Value::Int(i as i64));
        values.push(Value::Text(format!("User_{}", i)));
        values.push(Value::Int(32 + i as i64));
        values.push(if with_rating {
            Value::Double(0.13 * i as f64)
        } else {
            Value::Null
        });
    }
    values
}

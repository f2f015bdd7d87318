//! Engine side of the protocol, backed by SQLite.
//!
//! [`serve`] reads request frames from a byte stream, executes them against
//! an embedded SQLite database through `rusqlite`, and writes one response
//! frame per request. The `sqlwire-engine` binary runs it over
//! stdin/stdout; tests run it over an in-process socket pair.
//!
//! The engine is synchronous and single-threaded. It never closes the
//! stream on a bad request: undecodable payloads and commands sent in the
//! wrong state are answered with [`Status::Misuse`](crate::protocol::Status)
//! and the session continues. Only a broken frame header or a broken
//! stream ends it.

mod io;
mod session;

use std::io::{Read, Write};

use crate::error::Result;
use crate::options::ENGINE_MAX_PAYLOAD_ENV;
use crate::protocol::DEFAULT_MAX_PAYLOAD_SIZE;

/// Serve one session until the input reaches EOF.
///
/// An open database and any active statement are released on return.
///
/// # Errors
///
/// Returns an error if the stream breaks or a frame header is malformed.
pub fn serve<R: Read, W: Write>(reader: R, writer: W) -> Result<()> {
    serve_with_max_payload(reader, writer, DEFAULT_MAX_PAYLOAD_SIZE)
}

/// Like [`serve`], rejecting request payloads above `max_payload_size`.
pub fn serve_with_max_payload<R: Read, W: Write>(
    reader: R,
    writer: W,
    max_payload_size: u32,
) -> Result<()> {
    let mut frames = io::FrameIo::with_max_payload(reader, writer, max_payload_size);
    session::session_scope(&mut frames)
}

/// Payload limit from an [`ENGINE_MAX_PAYLOAD_ENV`] value.
///
/// Missing or unparsable values fall back to the default.
pub fn max_payload_from_env(value: Option<&str>) -> u32 {
    match value.map(str::parse::<u32>) {
        Some(Ok(size)) => size,
        Some(Err(e)) => {
            tracing::warn!(error = %e, "ignoring invalid {}", ENGINE_MAX_PAYLOAD_ENV);
            DEFAULT_MAX_PAYLOAD_SIZE
        }
        None => DEFAULT_MAX_PAYLOAD_SIZE,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::{PayloadReader, PayloadWriter};
    use crate::protocol::{
        build_request, Command, EngineFailure, ResponseHeader, Status,
        DEFAULT_MAX_PAYLOAD_SIZE, MISUSE_CODE, PROTOCOL_VERSION, RESPONSE_HEADER_SIZE,
    };
    use crate::value::{Value, ValueType};

    fn str_payload(s: &str) -> Vec<u8> {
        let mut writer = PayloadWriter::new();
        writer.put_str(s);
        writer.finish().to_vec()
    }

    fn bind_payload(position: i32, value: &Value) -> Vec<u8> {
        let mut writer = PayloadWriter::new();
        writer.put_i32(position).put_value(value);
        writer.finish().to_vec()
    }

    fn column_payload(index: i32, expected: ValueType) -> Vec<u8> {
        let mut writer = PayloadWriter::new();
        writer.put_i32(index).put_u8(expected.tag());
        writer.finish().to_vec()
    }

    /// Run a scripted session and split the output into responses.
    fn run(script: &[(Command, Vec<u8>)]) -> Vec<(Command, Status, Vec<u8>)> {
        let input: Vec<u8> = script
            .iter()
            .flat_map(|(command, payload)| build_request(*command, payload))
            .collect();
        let mut output = Vec::new();
        serve(&input[..], &mut output).unwrap();

        let mut responses = Vec::new();
        let mut rest = &output[..];
        while !rest.is_empty() {
            let mut header = [0u8; RESPONSE_HEADER_SIZE];
            header.copy_from_slice(&rest[..RESPONSE_HEADER_SIZE]);
            let header = ResponseHeader::decode(&header, DEFAULT_MAX_PAYLOAD_SIZE).unwrap();
            let end = RESPONSE_HEADER_SIZE + header.payload_length as usize;
            responses.push((
                header.command,
                header.status,
                rest[RESPONSE_HEADER_SIZE..end].to_vec(),
            ));
            rest = &rest[end..];
        }
        assert_eq!(responses.len(), script.len(), "one response per request");
        responses
    }

    #[test]
    fn test_version_reports_protocol() {
        let responses = run(&[(Command::Version, vec![])]);
        let (command, status, payload) = &responses[0];
        assert_eq!(*command, Command::Version);
        assert_eq!(*status, Status::Ok);

        let mut reader = PayloadReader::new(payload);
        assert_eq!(reader.u8().unwrap(), PROTOCOL_VERSION);
        assert_eq!(reader.str().unwrap(), env!("CARGO_PKG_VERSION"));
        assert!(reader.str().unwrap().starts_with('3'));
        reader.finish().unwrap();
    }

    #[test]
    fn test_insert_and_select_session() {
        let responses = run(&[
            (Command::Open, str_payload(":memory:")),
            (Command::Prepare, str_payload("CREATE TABLE t (name TEXT, n INTEGER)")),
            (Command::Step, vec![]),
            (Command::Finalize, vec![]),
            (Command::Prepare, str_payload("INSERT INTO t VALUES (?, ?)")),
            (Command::Bind, bind_payload(1, &Value::Text("a".into()))),
            (Command::Bind, bind_payload(2, &Value::Int(5))),
            (Command::Step, vec![]),
            (Command::Reset, vec![]),
            (Command::Changes, vec![]),
            (Command::Finalize, vec![]),
            (Command::Prepare, str_payload("SELECT name, n FROM t")),
            (Command::Step, vec![]),
            (Command::Column, column_payload(0, ValueType::Text)),
            (Command::Column, column_payload(1, ValueType::Double)),
            (Command::Step, vec![]),
            (Command::Step, vec![]),
            (Command::Finalize, vec![]),
            (Command::Close, vec![]),
        ]);

        for (command, status, _) in &responses {
            assert_eq!(*status, Status::Ok, "{} failed", command);
        }

        let mut counts = PayloadReader::new(&responses[4].2);
        assert_eq!(counts.count().unwrap(), 2);
        assert_eq!(counts.count().unwrap(), 0);

        assert_eq!(responses[9].2, 1i64.to_be_bytes());

        assert_eq!(responses[12].2, [1]);
        let mut name = PayloadReader::new(&responses[13].2);
        assert_eq!(name.value().unwrap(), Value::Text("a".into()));
        let mut n = PayloadReader::new(&responses[14].2);
        assert_eq!(n.value().unwrap(), Value::Double(5.0));
        // exhausted, then stays exhausted
        assert_eq!(responses[15].2, [0]);
        assert_eq!(responses[16].2, [0]);
    }

    #[test]
    fn test_out_of_state_commands_are_misuse() {
        let responses = run(&[
            (Command::Prepare, str_payload("SELECT 1")),
            (Command::Open, str_payload(":memory:")),
            (Command::Step, vec![]),
            (Command::Prepare, str_payload("SELECT 1")),
            (Command::Prepare, str_payload("SELECT 2")),
            (Command::Close, vec![]),
            (Command::Step, vec![]),
            (Command::Bind, bind_payload(1, &Value::Int(1))),
            (Command::Finalize, vec![]),
        ]);

        let statuses: Vec<Status> = responses.iter().map(|(_, s, _)| *s).collect();
        assert_eq!(
            statuses,
            vec![
                Status::Misuse, // prepare before open
                Status::Ok,
                Status::Misuse, // step without a statement
                Status::Ok,
                Status::Misuse, // second prepare
                Status::Misuse, // close with a statement
                Status::Ok,
                Status::Misuse, // bind while stepping
                Status::Ok,
            ]
        );
        let failure = EngineFailure::decode(Status::Misuse, &responses[4].2).unwrap();
        assert_eq!(failure.code, MISUSE_CODE);
    }

    #[test]
    fn test_column_type_mismatch() {
        let responses = run(&[
            (Command::Open, str_payload(":memory:")),
            (Command::Prepare, str_payload("SELECT 'text'")),
            (Command::Step, vec![]),
            (Command::Column, column_payload(0, ValueType::Int)),
            (Command::Column, column_payload(0, ValueType::Blob)),
        ]);

        assert_eq!(responses[3].1, Status::TypeMismatch);
        let failure = EngineFailure::decode(Status::TypeMismatch, &responses[3].2).unwrap();
        assert!(failure.message.contains("column 0"));
        assert_eq!(responses[4].1, Status::Ok);
    }

    #[test]
    fn test_step_failure_resets_statement() {
        let responses = run(&[
            (Command::Open, str_payload(":memory:")),
            (Command::Prepare, str_payload("CREATE TABLE t (id INTEGER PRIMARY KEY)")),
            (Command::Step, vec![]),
            (Command::Finalize, vec![]),
            (Command::Prepare, str_payload("INSERT INTO t VALUES (1)")),
            (Command::Step, vec![]),
            (Command::Reset, vec![]),
            (Command::Step, vec![]),
            // back in the statement scope after the failure
            (Command::Reset, vec![]),
        ]);

        assert_eq!(responses[5].1, Status::Ok);
        assert_eq!(responses[7].1, Status::Error);
        let failure = EngineFailure::decode(Status::Error, &responses[7].2).unwrap();
        assert_eq!(failure.code, 1555);
        assert_eq!(responses[8].1, Status::Ok);
    }

    #[test]
    fn test_undecodable_payload_keeps_session() {
        let responses = run(&[
            (Command::Open, vec![0, 0]),
            (Command::Open, str_payload(":memory:")),
        ]);
        assert_eq!(responses[0].1, Status::Misuse);
        assert_eq!(responses[1].1, Status::Ok);
    }

    #[test]
    fn test_open_failure_reports_error() {
        let responses = run(&[(
            Command::Open,
            str_payload("/nonexistent-dir/for/sure/db.sqlite"),
        )]);
        assert_eq!(responses[0].1, Status::Error);
    }

    #[test]
    fn test_request_above_limit_ends_session() {
        let input = build_request(Command::Open, &str_payload(":memory:"));
        let mut output = Vec::new();
        let err = serve_with_max_payload(&input[..], &mut output, 4).unwrap_err();
        assert!(matches!(err, crate::error::Error::MalformedFrame(_)));
        assert!(output.is_empty());
    }

    #[test]
    fn test_max_payload_from_env() {
        assert_eq!(max_payload_from_env(None), DEFAULT_MAX_PAYLOAD_SIZE);
        assert_eq!(max_payload_from_env(Some("4096")), 4096);
        assert_eq!(max_payload_from_env(Some("4294967295")), u32::MAX);
        assert_eq!(max_payload_from_env(Some("lots")), DEFAULT_MAX_PAYLOAD_SIZE);
    }
}

//! Protocol module - command codes, statuses, headers and frames.
//!
//! This module implements the binary protocol spoken over the engine's
//! stdin/stdout:
//! - 5-byte request header and 6-byte response header
//! - Request/response frame types with zero-copy payloads
//! - Engine failure payloads carried by non-Ok responses

mod frame;
mod wire_format;

pub use frame::{build_request, build_response, EngineFailure, Request, Response};
pub use wire_format::{
    check_payload_size, Command, RequestHeader, ResponseHeader, Status,
    DEFAULT_MAX_PAYLOAD_SIZE, MISUSE_CODE, PROTOCOL_VERSION, REQUEST_HEADER_SIZE,
    RESPONSE_HEADER_SIZE,
};

//! Wire messages exchanged across the host/guest stdio boundary.
//!
//! The encoding is proto3; the field numbers below are a fixed contract
//! shared with every deployed guest and must not be renumbered. The
//! messages are hand-annotated `prost` structs (vendored generated code —
//! the schema compiler lives outside this repository).

mod convert;
mod types;

pub use convert::{header_map_from_wire, header_map_to_wire};
pub use types::{HeaderValues, StringList, WireRequest, WireResponse};

use prost::Message;

/// Errors from the wire codec.
#[derive(Debug, thiserror::Error)]
pub enum WireError {
    /// Malformed encoded message.
    #[error("wire decode: {0}")]
    Decode(#[from] prost::DecodeError),
}

/// Decode a [`WireRequest`] from encoded bytes.
///
/// An empty input is not an error: it decodes to an all-default message.
///
/// # Errors
///
/// Returns [`WireError::Decode`] on malformed input.
pub fn decode_request(bytes: &[u8]) -> Result<WireRequest, WireError> {
    Ok(WireRequest::decode(bytes)?)
}

/// Decode a [`WireResponse`] from encoded bytes.
///
/// # Errors
///
/// Returns [`WireError::Decode`] on malformed input.
pub fn decode_response(bytes: &[u8]) -> Result<WireResponse, WireError> {
    Ok(WireResponse::decode(bytes)?)
}

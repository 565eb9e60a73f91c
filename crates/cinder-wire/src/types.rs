//! Message definitions. Field numbers are the host↔guest contract.

use std::collections::HashMap;

/// An ordered list of values for one header name.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct HeaderValues {
    #[prost(string, repeated, tag = "1")]
    pub values: Vec<String>,
}

/// An ordered list of strings (transfer-encoding tokens).
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct StringList {
    #[prost(string, repeated, tag = "1")]
    pub values: Vec<String>,
}

/// The request as delivered to a guest over stdin.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct WireRequest {
    /// HTTP method.
    #[prost(string, tag = "1")]
    pub method: String,
    /// Header multimap; each name keeps its values in the order sent.
    #[prost(map = "string, message", tag = "2")]
    pub header: HashMap<String, HeaderValues>,
    /// Request body, possibly empty.
    #[prost(bytes = "vec", tag = "3")]
    pub body: Vec<u8>,
    /// Declared content length; 0 when absent.
    #[prost(int64, tag = "4")]
    pub content_length: i64,
    /// Transfer-encoding list, outermost first.
    #[prost(message, optional, tag = "5")]
    pub transfer_encoding: Option<StringList>,
    /// Host the client addressed.
    #[prost(string, tag = "6")]
    pub host: String,
    /// Client address as seen by the listener.
    #[prost(string, tag = "7")]
    pub remote_addr: String,
    /// Path plus optional query; not a full URL.
    #[prost(string, tag = "8")]
    pub request_uri: String,
    /// Route pattern that matched this request.
    #[prost(string, tag = "9")]
    pub pattern: String,
}

/// The response a guest writes to stdout.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct WireResponse {
    /// Response body, possibly empty.
    #[prost(bytes = "vec", tag = "1")]
    pub body: Vec<u8>,
    /// HTTP status code; 0 means the guest never set one.
    #[prost(int32, tag = "2")]
    pub status_code: i32,
    /// Byte length of `body`.
    #[prost(int32, tag = "3")]
    pub length: i32,
    /// Header multimap, same shape as the request side.
    #[prost(map = "string, message", tag = "4")]
    pub header: HashMap<String, HeaderValues>,
}

impl WireResponse {
    /// Status code with the guest-never-wrote-one case mapped to 200.
    #[must_use]
    pub fn status_or_default(&self) -> u16 {
        if self.status_code == 0 {
            200
        } else {
            // Out-of-range codes are the dispatcher's problem to reject.
            u16::try_from(self.status_code).unwrap_or(500)
        }
    }
}

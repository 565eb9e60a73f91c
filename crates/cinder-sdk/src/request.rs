//! The request object handed to guest handlers.

use http::header::HeaderMap;
use http::{Method, Uri};

use cinder_wire::{header_map_from_wire, WireRequest};

/// One decoded request, as seen from inside the guest.
///
/// Field values mirror the wire request; anything the client never sent
/// is empty rather than absent.
#[derive(Debug)]
pub struct GuestRequest {
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    body: Vec<u8>,
    host: String,
    remote_addr: String,
    pattern: String,
    content_length: i64,
    transfer_encoding: Vec<String>,
}

impl GuestRequest {
    pub(crate) fn from_wire(wire: WireRequest) -> Self {
        let method = Method::from_bytes(wire.method.as_bytes()).unwrap_or(Method::GET);
        let uri = wire.request_uri.parse::<Uri>().unwrap_or_else(|_| Uri::from_static("/"));
        Self {
            method,
            uri,
            headers: header_map_from_wire(&wire.header),
            body: wire.body,
            host: wire.host,
            remote_addr: wire.remote_addr,
            pattern: wire.pattern,
            content_length: wire.content_length,
            transfer_encoding: wire
                .transfer_encoding
                .map(|list| list.values)
                .unwrap_or_default(),
        }
    }

    #[must_use]
    pub fn method(&self) -> &Method {
        &self.method
    }

    #[must_use]
    pub fn uri(&self) -> &Uri {
        &self.uri
    }

    #[must_use]
    pub fn path(&self) -> &str {
        self.uri.path()
    }

    #[must_use]
    pub fn query(&self) -> Option<&str> {
        self.uri.query()
    }

    #[must_use]
    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    #[must_use]
    pub fn body(&self) -> &[u8] {
        &self.body
    }

    /// Host the client addressed.
    #[must_use]
    pub fn host(&self) -> &str {
        &self.host
    }

    /// Client address as seen by the host's listener.
    #[must_use]
    pub fn remote_addr(&self) -> &str {
        &self.remote_addr
    }

    /// Route pattern that matched on the host side.
    #[must_use]
    pub fn pattern(&self) -> &str {
        &self.pattern
    }

    #[must_use]
    pub fn content_length(&self) -> i64 {
        self.content_length
    }

    #[must_use]
    pub fn transfer_encoding(&self) -> &[String] {
        &self.transfer_encoding
    }
}

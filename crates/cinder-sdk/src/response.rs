//! The response writer handed to guest handlers.

use std::io;

use http::header::HeaderMap;

use cinder_wire::{header_map_to_wire, WireResponse};

/// Accumulates the handler's response: status, headers, and body bytes.
///
/// The status starts at 200 and only changes when the handler calls
/// [`ResponseWriter::write_header`]. Body writes never fail; they append
/// to an in-memory buffer that becomes the wire response body.
#[derive(Debug)]
pub struct ResponseWriter {
    status: u16,
    headers: HeaderMap,
    body: Vec<u8>,
}

impl ResponseWriter {
    #[must_use]
    pub fn new() -> Self {
        Self {
            status: 200,
            headers: HeaderMap::new(),
            body: Vec::new(),
        }
    }

    /// Response headers; append for duplicates, insert to replace.
    pub fn headers_mut(&mut self) -> &mut HeaderMap {
        &mut self.headers
    }

    /// Set the response status code.
    pub fn write_header(&mut self, status: u16) {
        self.status = status;
    }

    #[must_use]
    pub fn status(&self) -> u16 {
        self.status
    }

    #[must_use]
    pub fn body(&self) -> &[u8] {
        &self.body
    }

    pub(crate) fn into_wire(self) -> WireResponse {
        let length = self.body.len() as i32;
        WireResponse {
            status_code: i32::from(self.status),
            length,
            header: header_map_to_wire(&self.headers),
            body: self.body,
        }
    }
}

impl Default for ResponseWriter {
    fn default() -> Self {
        Self::new()
    }
}

impl io::Write for ResponseWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.body.extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

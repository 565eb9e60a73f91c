//! Guest-side adapter for cinder request handlers.
//!
//! A guest's `main` hands a handler to [`handle`]; the adapter owns the
//! wire format on both sides of it. Handlers look like any conventional
//! request/response pair:
//!
//! ```no_run
//! use cinder_sdk::{GuestRequest, ResponseWriter};
//! use std::io::Write;
//!
//! fn main() {
//!     cinder_sdk::handle(|req: &GuestRequest, res: &mut ResponseWriter| {
//!         res.headers_mut()
//!             .insert("content-type", "text/plain".parse().unwrap());
//!         let _ = res.write_all(req.body());
//!     });
//! }
//! ```

mod request;
mod response;

pub use request::GuestRequest;
pub use response::ResponseWriter;

use std::io::{self, Read, Write};

use prost::Message;

/// A request handler. Implemented for any
/// `Fn(&GuestRequest, &mut ResponseWriter)` closure.
pub trait Handler {
    fn serve(&self, req: &GuestRequest, res: &mut ResponseWriter);
}

impl<F> Handler for F
where
    F: Fn(&GuestRequest, &mut ResponseWriter),
{
    fn serve(&self, req: &GuestRequest, res: &mut ResponseWriter) {
        self(req, res);
    }
}

/// Run one request through `handler` over the process's stdio.
///
/// Reads standard input to EOF, decodes the wire request, invokes the
/// handler, and writes the encoded wire response to standard output. A
/// request that fails to decode produces a 400 with an empty body; the
/// process still exits cleanly. Only stdio failures are fatal.
pub fn handle<H: Handler>(handler: H) {
    let stdin = io::stdin();
    let stdout = io::stdout();
    if let Err(e) = handle_io(stdin.lock(), stdout.lock(), &handler) {
        eprintln!("cinder-sdk: stdio failure: {e}");
        std::process::exit(1);
    }
}

/// The I/O-generic core of [`handle`]; takes any reader/writer pair.
///
/// # Errors
///
/// Returns only I/O errors from `input` and `output`; handler and decode
/// outcomes are encoded into the response instead.
pub fn handle_io<R, W, H>(mut input: R, mut output: W, handler: &H) -> io::Result<()>
where
    R: Read,
    W: Write,
    H: Handler,
{
    let mut encoded = Vec::new();
    input.read_to_end(&mut encoded)?;

    let mut res = ResponseWriter::new();
    match cinder_wire::decode_request(&encoded) {
        Ok(wire) => {
            let req = GuestRequest::from_wire(wire);
            handler.serve(&req, &mut res);
        }
        Err(_) => {
            // Malformed input from the host side; answer 400 and leave
            // the body empty.
            res.write_header(400);
        }
    }

    let wire = res.into_wire();
    output.write_all(&wire.encode_to_vec())?;
    output.flush()
}

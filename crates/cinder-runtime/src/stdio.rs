//! Stdio bridging over real OS pipes.
//!
//! The guest's stdin and stdout are bound to pipe ends rather than
//! in-memory buffers so that guests keep true file-descriptor semantics
//! (blocking reads, partial writes) and the response never has to fit in
//! a single pre-sized buffer. Two copier threads per invocation move
//! bytes between the caller's reader/sink and the pipe ends.

use std::io::{self, Read, Write};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};

use bytes::Bytes;
use wasmtime_wasi::{
    HostInputStream, HostOutputStream, StdinStream, StdoutStream, StreamError, StreamResult,
    Subscribe,
};

const READ_CHUNK: usize = 64 * 1024;

/// Guest stdin backed by the read end of an OS pipe. Reads block until
/// the host-side copier has produced bytes or closed the write end.
pub(crate) struct StdinPipe(Arc<Mutex<os_pipe::PipeReader>>);

impl StdinPipe {
    pub(crate) fn new(reader: os_pipe::PipeReader) -> Self {
        Self(Arc::new(Mutex::new(reader)))
    }
}

impl StdinStream for StdinPipe {
    fn stream(&self) -> Box<dyn HostInputStream> {
        Box::new(StdinPipeStream(Arc::clone(&self.0)))
    }

    fn isatty(&self) -> bool {
        false
    }
}

struct StdinPipeStream(Arc<Mutex<os_pipe::PipeReader>>);

impl HostInputStream for StdinPipeStream {
    fn read(&mut self, size: usize) -> StreamResult<Bytes> {
        let mut buf = vec![0u8; size.min(READ_CHUNK)];
        let n = self
            .0
            .lock()
            .unwrap()
            .read(&mut buf)
            .map_err(|e| StreamError::LastOperationFailed(anyhow::anyhow!(e)))?;
        if n == 0 {
            return Err(StreamError::Closed);
        }
        buf.truncate(n);
        Ok(buf.into())
    }
}

#[async_trait::async_trait]
impl Subscribe for StdinPipeStream {
    async fn ready(&mut self) {}
}

/// Guest stdout backed by the write end of an OS pipe.
pub(crate) struct StdoutPipe(Arc<Mutex<os_pipe::PipeWriter>>);

impl StdoutPipe {
    pub(crate) fn new(writer: os_pipe::PipeWriter) -> Self {
        Self(Arc::new(Mutex::new(writer)))
    }
}

impl StdoutStream for StdoutPipe {
    fn stream(&self) -> Box<dyn HostOutputStream> {
        Box::new(StdoutPipeStream(Arc::clone(&self.0)))
    }

    fn isatty(&self) -> bool {
        false
    }
}

struct StdoutPipeStream(Arc<Mutex<os_pipe::PipeWriter>>);

impl HostOutputStream for StdoutPipeStream {
    fn write(&mut self, bytes: Bytes) -> StreamResult<()> {
        self.0
            .lock()
            .unwrap()
            .write_all(&bytes)
            .map_err(|e| StreamError::LastOperationFailed(anyhow::anyhow!(e)))
    }

    fn flush(&mut self) -> StreamResult<()> {
        self.0
            .lock()
            .unwrap()
            .flush()
            .map_err(|e| StreamError::LastOperationFailed(anyhow::anyhow!(e)))
    }

    fn check_write(&mut self) -> StreamResult<usize> {
        Ok(READ_CHUNK)
    }
}

#[async_trait::async_trait]
impl Subscribe for StdoutPipeStream {
    async fn ready(&mut self) {}
}

/// Forward the caller's stdin reader into the guest's stdin pipe, then
/// close the write end so the guest observes EOF.
///
/// A guest is free to exit without draining its stdin; the resulting
/// broken pipe is EOF from the copier's point of view, not a failure.
pub(crate) fn spawn_stdin_copier(
    mut reader: Box<dyn Read + Send>,
    mut writer: os_pipe::PipeWriter,
) -> io::Result<JoinHandle<io::Result<()>>> {
    thread::Builder::new()
        .name("cinder-stdin-copier".to_string())
        .spawn(move || match io::copy(&mut reader, &mut writer) {
            Ok(_) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::BrokenPipe => Ok(()),
            Err(e) => Err(e),
        })
}

/// Drain the guest's stdout pipe into the caller's sink until every write
/// end has been dropped.
pub(crate) fn spawn_stdout_copier(
    mut reader: os_pipe::PipeReader,
    mut sink: Box<dyn Write + Send>,
) -> io::Result<JoinHandle<io::Result<()>>> {
    thread::Builder::new()
        .name("cinder-stdout-copier".to_string())
        .spawn(move || {
            io::copy(&mut reader, &mut sink)?;
            sink.flush()
        })
}

/// A cloneable in-memory sink for capturing guest stdout.
///
/// The dispatcher hands a clone to the sandbox and takes the accumulated
/// bytes back once the invocation completes.
#[derive(Debug, Clone, Default)]
pub struct SharedBuffer(Arc<Mutex<Vec<u8>>>);

impl SharedBuffer {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Take the accumulated bytes, leaving the buffer empty.
    #[must_use]
    pub fn take(&self) -> Vec<u8> {
        std::mem::take(&mut self.0.lock().unwrap())
    }
}

impl Write for SharedBuffer {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn shared_buffer_accumulates_and_takes() {
        let buffer = SharedBuffer::new();
        let mut writer = buffer.clone();
        writer.write_all(b"abc").unwrap();
        writer.write_all(b"def").unwrap();
        assert_eq!(buffer.take(), b"abcdef");
        assert!(buffer.take().is_empty());
    }

    #[test]
    fn copiers_bridge_a_pipe_pair() {
        let (guest_read, host_write) = os_pipe::pipe().unwrap();
        let (host_read, guest_write) = os_pipe::pipe().unwrap();

        let stdin = spawn_stdin_copier(Box::new(io::Cursor::new(b"ping".to_vec())), host_write)
            .unwrap();
        let sink = SharedBuffer::new();
        let stdout = spawn_stdout_copier(host_read, Box::new(sink.clone())).unwrap();

        // Stand in for the guest: echo stdin to stdout.
        let mut guest_read = guest_read;
        let mut guest_write = guest_write;
        let mut buf = Vec::new();
        guest_read.read_to_end(&mut buf).unwrap();
        guest_write.write_all(&buf).unwrap();
        drop(guest_write);

        stdin.join().unwrap().unwrap();
        stdout.join().unwrap().unwrap();
        assert_eq!(sink.take(), b"ping");
    }

    #[test]
    fn stdin_copier_tolerates_guest_exit() {
        let (guest_read, host_write) = os_pipe::pipe().unwrap();
        // Guest goes away without reading anything.
        drop(guest_read);

        let big = vec![0u8; 1 << 20];
        let copier = spawn_stdin_copier(Box::new(io::Cursor::new(big)), host_write).unwrap();
        copier.join().unwrap().unwrap();
    }
}

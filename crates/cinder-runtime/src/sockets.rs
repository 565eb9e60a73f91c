//! The `cinder_sock` guest extension: allow-listed TCP plus the
//! configured DNS upstream.
//!
//! WASI-level networking is disabled for every sandbox; this extension is
//! the only road to the network. It is always wired — a guest that never
//! imports it simply never links against these functions — and every dial
//! and listen is checked against the deployment's allow-lists. Handles
//! are plain integers into a per-sandbox table; the filesystem soft cap
//! on open descriptors is enforced here, since this table is the only
//! place the host hands out descriptors beyond preopens.

use std::collections::HashMap;
use std::io::{Read, Write};
use std::net::{IpAddr, SocketAddr, TcpListener, TcpStream, ToSocketAddrs};
use std::time::Duration;

use wasmtime::{Caller, Linker};

use crate::acl::HostPortAcl;
use crate::guest_mem::{read_string, write_bytes};
use crate::sandbox::GuestCtx;

/// Import module name guests link against.
pub const SOCK_MODULE: &str = "cinder_sock";

const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);
const MAX_IO_BYTES: u32 = 64 * 1024;
const DEFAULT_MAX_HANDLES: usize = 128;

// Negative return codes shared by every sockets function.
const ERR_DENIED: i64 = -1;
const ERR_RESOLVE: i64 = -2;
const ERR_CONNECT: i64 = -3;
const ERR_MEMORY: i64 = -4;
const ERR_LIMIT: i64 = -5;
const ERR_BADF: i64 = -6;
const ERR_IO: i64 = -7;

enum SockHandle {
    Stream(TcpStream),
    Listener(TcpListener),
}

/// Per-sandbox socket state: the allow-lists, the handle table, and the
/// configured DNS upstream.
pub struct SocketTable {
    dial_acl: HostPortAcl,
    listen_acl: HostPortAcl,
    dns_upstream: String,
    handles: HashMap<u64, SockHandle>,
    next_handle: u64,
    max_handles: usize,
}

impl SocketTable {
    pub(crate) fn new(
        dial_acl: HostPortAcl,
        listen_acl: HostPortAcl,
        dns_upstream: String,
        max_handles: Option<u32>,
    ) -> Self {
        Self {
            dial_acl,
            listen_acl,
            dns_upstream,
            handles: HashMap::new(),
            next_handle: 1,
            max_handles: max_handles.map_or(DEFAULT_MAX_HANDLES, |n| n as usize),
        }
    }

    fn insert(&mut self, handle: SockHandle) -> Option<u64> {
        if self.handles.len() >= self.max_handles {
            return None;
        }
        let id = self.next_handle;
        self.next_handle = self.next_handle.saturating_add(1);
        self.handles.insert(id, handle);
        Some(id)
    }

    fn connect(&mut self, host: &str, port: u16) -> i64 {
        if !self.dial_acl.allows(host, port) {
            tracing::warn!(host, port, "guest dial denied by allow-list");
            return ERR_DENIED;
        }

        let addrs = match resolve_socket_addrs(host, port) {
            Ok(addrs) => addrs,
            Err(e) => {
                tracing::debug!(host, port, error = %e, "guest dial resolution failed");
                return ERR_RESOLVE;
            }
        };

        let mut connected: Option<TcpStream> = None;
        let mut last_error: Option<(SocketAddr, std::io::Error)> = None;
        for addr in addrs {
            match TcpStream::connect_timeout(&addr, CONNECT_TIMEOUT) {
                Ok(stream) => {
                    connected = Some(stream);
                    break;
                }
                Err(err) => last_error = Some((addr, err)),
            }
        }

        let Some(stream) = connected else {
            if let Some((addr, err)) = last_error {
                tracing::debug!(host, port, %addr, error = %err, "guest dial failed");
            }
            return ERR_CONNECT;
        };
        if stream.set_nodelay(true).is_err() {
            return ERR_IO;
        }

        self.insert(SockHandle::Stream(stream))
            .map_or(ERR_LIMIT, |id| id as i64)
    }

    fn listen(&mut self, host: &str, port: u16) -> i64 {
        if !self.listen_acl.allows(host, port) {
            tracing::warn!(host, port, "guest listen denied by allow-list");
            return ERR_DENIED;
        }
        match TcpListener::bind((host, port)) {
            Ok(listener) => self
                .insert(SockHandle::Listener(listener))
                .map_or(ERR_LIMIT, |id| id as i64),
            Err(e) => {
                tracing::debug!(host, port, error = %e, "guest listen failed");
                ERR_IO
            }
        }
    }

    fn accept(&mut self, handle: u64) -> i64 {
        let accepted = match self.handles.get(&handle) {
            Some(SockHandle::Listener(listener)) => listener.accept(),
            _ => return ERR_BADF,
        };
        match accepted {
            Ok((stream, _)) => {
                if stream.set_nodelay(true).is_err() {
                    return ERR_IO;
                }
                self.insert(SockHandle::Stream(stream))
                    .map_or(ERR_LIMIT, |id| id as i64)
            }
            Err(_) => ERR_IO,
        }
    }

    fn stream_mut(&mut self, handle: u64) -> Option<&mut TcpStream> {
        match self.handles.get_mut(&handle) {
            Some(SockHandle::Stream(stream)) => Some(stream),
            _ => None,
        }
    }

    fn close(&mut self, handle: u64) {
        self.handles.remove(&handle);
    }

    pub(crate) fn dns_upstream(&self) -> &str {
        &self.dns_upstream
    }
}

/// Resolve a hostname and port to socket addresses, with an IP-literal
/// fast path.
pub(crate) fn resolve_socket_addrs(host: &str, port: u16) -> std::io::Result<Vec<SocketAddr>> {
    if let Ok(ip) = host.parse::<IpAddr>() {
        return Ok(vec![SocketAddr::new(ip, port)]);
    }
    let addrs: Vec<SocketAddr> = (host, port).to_socket_addrs()?.collect();
    if addrs.is_empty() {
        Err(std::io::Error::new(
            std::io::ErrorKind::AddrNotAvailable,
            "no address",
        ))
    } else {
        Ok(addrs)
    }
}

/// Register every `cinder_sock` function on the linker.
pub(crate) fn add_to_linker(linker: &mut Linker<GuestCtx>) -> anyhow::Result<()> {
    linker.func_wrap(
        SOCK_MODULE,
        "sock_connect",
        |mut caller: Caller<'_, GuestCtx>, host_ptr: u32, host_len: u32, port: u32| -> i64 {
            let Some(host) = read_string(&mut caller, host_ptr, host_len) else {
                return ERR_MEMORY;
            };
            let Ok(port) = u16::try_from(port) else {
                return ERR_RESOLVE;
            };
            caller.data_mut().sockets.connect(&host, port)
        },
    )?;

    linker.func_wrap(
        SOCK_MODULE,
        "sock_listen",
        |mut caller: Caller<'_, GuestCtx>, host_ptr: u32, host_len: u32, port: u32| -> i64 {
            let Some(host) = read_string(&mut caller, host_ptr, host_len) else {
                return ERR_MEMORY;
            };
            let Ok(port) = u16::try_from(port) else {
                return ERR_RESOLVE;
            };
            caller.data_mut().sockets.listen(&host, port)
        },
    )?;

    linker.func_wrap(
        SOCK_MODULE,
        "sock_accept",
        |mut caller: Caller<'_, GuestCtx>, handle: i64| -> i64 {
            let Ok(handle) = u64::try_from(handle) else {
                return ERR_BADF;
            };
            caller.data_mut().sockets.accept(handle)
        },
    )?;

    linker.func_wrap(
        SOCK_MODULE,
        "sock_read",
        |mut caller: Caller<'_, GuestCtx>, handle: i64, buf_ptr: u32, buf_cap: u32| -> i64 {
            let Ok(handle) = u64::try_from(handle) else {
                return ERR_BADF;
            };
            let cap = buf_cap.min(MAX_IO_BYTES) as usize;
            let mut buf = vec![0u8; cap];
            let n = {
                let Some(stream) = caller.data_mut().sockets.stream_mut(handle) else {
                    return ERR_BADF;
                };
                match stream.read(&mut buf) {
                    Ok(n) => n,
                    Err(_) => return ERR_IO,
                }
            };
            if n > 0 && write_bytes(&mut caller, buf_ptr, &buf[..n]).is_none() {
                return ERR_MEMORY;
            }
            n as i64
        },
    )?;

    linker.func_wrap(
        SOCK_MODULE,
        "sock_write",
        |mut caller: Caller<'_, GuestCtx>, handle: i64, buf_ptr: u32, buf_len: u32| -> i64 {
            let Ok(handle) = u64::try_from(handle) else {
                return ERR_BADF;
            };
            let Some(data) = crate::guest_mem::read_bytes(
                &mut caller,
                buf_ptr,
                buf_len.min(MAX_IO_BYTES),
            ) else {
                return ERR_MEMORY;
            };
            let Some(stream) = caller.data_mut().sockets.stream_mut(handle) else {
                return ERR_BADF;
            };
            match stream.write(&data) {
                Ok(n) => n as i64,
                Err(_) => ERR_IO,
            }
        },
    )?;

    linker.func_wrap(
        SOCK_MODULE,
        "sock_close",
        |mut caller: Caller<'_, GuestCtx>, handle: i64| -> i32 {
            if let Ok(handle) = u64::try_from(handle) {
                caller.data_mut().sockets.close(handle);
            }
            0
        },
    )?;

    // Guests that run their own resolver ask the host where DNS queries
    // should go; the upstream is deployment configuration.
    linker.func_wrap(
        SOCK_MODULE,
        "sock_dns_upstream",
        |mut caller: Caller<'_, GuestCtx>, buf_ptr: u32, buf_cap: u32| -> i32 {
            let upstream = caller.data().sockets.dns_upstream().to_string();
            let bytes = upstream.as_bytes();
            let n = bytes.len().min(buf_cap as usize);
            if n > 0 && write_bytes(&mut caller, buf_ptr, &bytes[..n]).is_none() {
                return ERR_MEMORY as i32;
            }
            bytes.len() as i32
        },
    )?;

    Ok(())
}

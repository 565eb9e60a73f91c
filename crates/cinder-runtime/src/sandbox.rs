//! Per-request sandbox lifecycle: capability provisioning, stdio
//! bridging, and driving the guest's entry point to completion.

use std::io::{Read, Write};

use wasmtime::{Engine, Linker, Module, Store};
use wasmtime_wasi::preview1::{self, WasiP1Ctx};
use wasmtime_wasi::{DirPerms, FilePerms, I32Exit, WasiCtxBuilder};

use uuid::Uuid;

use crate::acl::HostPortAcl;
use crate::caps::CapabilityConfig;
use crate::engine::EngineKind;
use crate::error::{Result, SandboxError};
use crate::httpext::{self, HttpClient};
use crate::sockets::{self, SocketTable};
use crate::stdio::{self, StdinPipe, StdoutPipe};

/// Arguments for building a sandbox via `WasmHost::sandbox`.
pub struct SandboxArgs<'a> {
    /// How to interpret the blob.
    pub engine: EngineKind,
    /// Identity of the deployment, and the module-cache key.
    pub deployment_id: Uuid,
    /// The deployment artifact: module bytes for native, source text for
    /// scripted.
    pub blob: &'a [u8],
    /// Where the guest's stdout ends up.
    pub stdout: Box<dyn Write + Send>,
}

/// Store data for one guest instance: the WASI context plus the state
/// behind the host extensions.
pub(crate) struct GuestCtx {
    pub(crate) wasi: WasiP1Ctx,
    pub(crate) sockets: SocketTable,
    pub(crate) http: HttpClient,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum State {
    Built,
    Configured,
    Running,
    Closed,
}

/// One sandbox runs one request to completion and is then closed; the
/// compiled module it was built from stays in the cache.
pub struct Sandbox {
    engine: Engine,
    module: Module,
    kind: EngineKind,
    caps: CapabilityConfig,
    stdout: Option<Box<dyn Write + Send>>,
    state: State,
}

impl std::fmt::Debug for Sandbox {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Sandbox")
            .field("kind", &self.kind)
            .field("state", &self.state)
            .finish()
    }
}

impl Sandbox {
    pub(crate) fn new(
        engine: Engine,
        module: Module,
        kind: EngineKind,
        caps: CapabilityConfig,
        stdout: Box<dyn Write + Send>,
    ) -> Self {
        Self {
            engine,
            module,
            kind,
            caps,
            stdout: Some(stdout),
            state: State::Built,
        }
    }

    /// Run the guest to completion.
    ///
    /// Bytes from `stdin` are delivered to the guest's standard input in
    /// order over an OS pipe; everything the guest writes to standard
    /// output lands in the sink supplied at construction. For scripted
    /// engines the argument vector is prefixed with `["", "-e", source]`.
    ///
    /// The sandbox ends up `Closed` whatever the outcome; a sandbox is
    /// never reused across requests.
    ///
    /// # Errors
    ///
    /// `Config` for a scripted invocation without source (or a reused
    /// sandbox); `Pipe` for stdio-bridging failures; `Instantiate` for
    /// unresolved imports, provisioning failures, or guest traps.
    pub fn invoke(
        &mut self,
        stdin: Box<dyn Read + Send>,
        env: &[(String, String)],
        args: &[String],
        source: Option<&[u8]>,
    ) -> Result<()> {
        let result = self.invoke_inner(stdin, env, args, source);
        self.state = State::Closed;
        result
    }

    /// Idempotent teardown. Invocation closes the sandbox on its own;
    /// this exists for the paths that bail before invoking.
    pub fn close(&mut self) {
        self.state = State::Closed;
        self.stdout = None;
    }

    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.state == State::Closed
    }

    fn invoke_inner(
        &mut self,
        stdin: Box<dyn Read + Send>,
        env: &[(String, String)],
        args: &[String],
        source: Option<&[u8]>,
    ) -> Result<()> {
        if self.state != State::Built {
            return Err(SandboxError::Config("sandbox already used".to_string()));
        }

        let argv = self.build_argv(args, source)?;

        let (guest_stdin, stdin_writer) = os_pipe::pipe().map_err(SandboxError::Pipe)?;
        let (stdout_reader, guest_stdout) = os_pipe::pipe().map_err(SandboxError::Pipe)?;
        let sink = self
            .stdout
            .take()
            .ok_or_else(|| SandboxError::Config("sandbox already used".to_string()))?;
        let stdin_copier =
            stdio::spawn_stdin_copier(stdin, stdin_writer).map_err(SandboxError::Pipe)?;
        let stdout_copier =
            stdio::spawn_stdout_copier(stdout_reader, sink).map_err(SandboxError::Pipe)?;

        let wasi = self.build_wasi_ctx(&argv, env, guest_stdin, guest_stdout)?;
        self.state = State::Configured;

        let mut linker: Linker<GuestCtx> = Linker::new(&self.engine);
        preview1::add_to_linker_sync(&mut linker, |cx: &mut GuestCtx| &mut cx.wasi)
            .map_err(SandboxError::Instantiate)?;
        sockets::add_to_linker(&mut linker).map_err(SandboxError::Instantiate)?;
        if self.caps.http.enabled && httpext::module_imports_http(&self.module) {
            httpext::add_to_linker(&mut linker).map_err(SandboxError::Instantiate)?;
        }

        let ctx = GuestCtx {
            wasi,
            sockets: SocketTable::new(
                HostPortAcl::from_patterns(&self.caps.network.dial_allow),
                HostPortAcl::from_patterns(&self.caps.network.listen_allow),
                self.caps.dns.upstream.clone(),
                self.caps.filesystem.max_open_files,
            ),
            http: HttpClient::new(&self.caps.http),
        };
        let mut store = Store::new(&self.engine, ctx);
        self.state = State::Running;

        let run = (|| -> anyhow::Result<()> {
            let instance = linker.instantiate(&mut store, &self.module)?;
            let start = instance.get_typed_func::<(), ()>(&mut store, "_start")?;
            start.call(&mut store, ())?;
            Ok(())
        })();

        // Dropping the store releases the guest ends of both pipes, which
        // is what lets the copiers run to EOF.
        drop(store);
        let stdin_result = stdin_copier.join();
        let stdout_result = stdout_copier.join();

        if let Err(e) = run {
            match e.downcast_ref::<I32Exit>() {
                Some(exit) if exit.0 == 0 => {}
                _ => return Err(SandboxError::Instantiate(e)),
            }
        }

        flatten_copier(stdin_result)?;
        flatten_copier(stdout_result)?;
        Ok(())
    }

    fn build_argv(&self, args: &[String], source: Option<&[u8]>) -> Result<Vec<String>> {
        match self.kind {
            EngineKind::Native => Ok(args.to_vec()),
            EngineKind::Scripted => {
                let source = source.unwrap_or_default();
                if source.is_empty() {
                    return Err(SandboxError::Config("script source is empty".to_string()));
                }
                let mut argv = Vec::with_capacity(args.len() + 3);
                argv.push(String::new()); // conventional program-name slot
                argv.push("-e".to_string());
                argv.push(String::from_utf8_lossy(source).into_owned());
                argv.extend_from_slice(args);
                Ok(argv)
            }
        }
    }

    fn build_wasi_ctx(
        &self,
        argv: &[String],
        env: &[(String, String)],
        stdin: os_pipe::PipeReader,
        stdout: os_pipe::PipeWriter,
    ) -> Result<WasiP1Ctx> {
        let mut builder = WasiCtxBuilder::new();
        builder.allow_blocking_current_thread(true);
        // WASI-level network stays off; the sockets extension is the only
        // road to the network.
        builder.allow_tcp(false);
        builder.allow_udp(false);
        builder.allow_ip_name_lookup(false);
        builder.stdin(StdinPipe::new(stdin));
        builder.stdout(StdoutPipe::new(stdout));
        builder.inherit_stderr();
        builder.args(argv);
        for (key, value) in env {
            builder.env(key, value);
        }
        for mount in &self.caps.filesystem.mounts {
            if !mount.host.exists() {
                tracing::warn!(
                    path = %mount.host.display(),
                    "mount path does not exist on host, skipping"
                );
                continue;
            }
            builder
                .preopened_dir(&mount.host, &mount.guest, DirPerms::all(), FilePerms::all())
                .map_err(SandboxError::Instantiate)?;
        }
        Ok(builder.build_p1())
    }
}

fn flatten_copier(joined: std::thread::Result<std::io::Result<()>>) -> Result<()> {
    match joined {
        Ok(Ok(())) => Ok(()),
        Ok(Err(e)) => Err(SandboxError::Pipe(e)),
        Err(_) => Err(SandboxError::Pipe(std::io::Error::other(
            "stdio copier panicked",
        ))),
    }
}

//! Helpers for moving bytes across the guest memory boundary.

use wasmtime::{Caller, Memory};

fn memory<T>(caller: &mut Caller<'_, T>) -> Option<Memory> {
    caller.get_export("memory").and_then(|ext| ext.into_memory())
}

pub(crate) fn read_bytes<T>(caller: &mut Caller<'_, T>, ptr: u32, len: u32) -> Option<Vec<u8>> {
    let memory = memory(caller)?;
    let mut buf = vec![0u8; len as usize];
    memory.read(&mut *caller, ptr as usize, &mut buf).ok()?;
    Some(buf)
}

pub(crate) fn read_string<T>(caller: &mut Caller<'_, T>, ptr: u32, len: u32) -> Option<String> {
    String::from_utf8(read_bytes(caller, ptr, len)?).ok()
}

pub(crate) fn write_bytes<T>(caller: &mut Caller<'_, T>, ptr: u32, data: &[u8]) -> Option<()> {
    let memory = memory(caller)?;
    memory.write(&mut *caller, ptr as usize, data).ok()
}

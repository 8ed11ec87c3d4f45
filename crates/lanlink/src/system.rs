//! Host queries: hostname and privilege

use anyhow::{bail, Result};
use std::io;

/// Name of this machine, sent in the discovery query
#[cfg(unix)]
pub fn local_hostname() -> io::Result<String> {
    use std::ffi::CStr;

    let mut buf = [0u8; 256];
    // SAFETY: buf is writable for buf.len() bytes
    let rc = unsafe { libc::gethostname(buf.as_mut_ptr() as *mut libc::c_char, buf.len()) };
    if rc != 0 {
        return Err(io::Error::last_os_error());
    }

    let name = CStr::from_bytes_until_nul(&buf)
        .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?
        .to_string_lossy()
        .into_owned();

    if name.is_empty() {
        return Err(io::Error::new(io::ErrorKind::NotFound, "empty hostname"));
    }
    Ok(name)
}

#[cfg(not(unix))]
pub fn local_hostname() -> io::Result<String> {
    std::env::var("COMPUTERNAME").map_err(|e| io::Error::new(io::ErrorKind::NotFound, e))
}

/// Interface and route changes need root; refuse early instead of failing midway
#[cfg(unix)]
pub fn ensure_privileged() -> Result<()> {
    // SAFETY: geteuid has no preconditions
    let euid = unsafe { libc::geteuid() };
    if euid != 0 {
        bail!("must run as root (try sudo)");
    }
    Ok(())
}

#[cfg(not(unix))]
pub fn ensure_privileged() -> Result<()> {
    bail!("unsupported platform")
}

use std::io;
use std::process::Child;

/// Asks `child` to shut down. Returns `false` where no graceful request exists.
#[cfg(unix)]
pub(crate) fn request_termination(child: &Child) -> io::Result<bool> {
    let pid = libc::pid_t::try_from(child.id())
        .map_err(|_| io::Error::new(io::ErrorKind::InvalidInput, "child pid out of range"))?;

    // SAFETY: `pid` names a child we spawned and have not reaped yet, so it
    // cannot refer to an unrelated process. SIGTERM has no memory effects.
    let rc = unsafe { libc::kill(pid, libc::SIGTERM) };
    if rc == 0 {
        Ok(true)
    } else {
        Err(io::Error::last_os_error())
    }
}

#[cfg(not(unix))]
pub(crate) fn request_termination(_child: &Child) -> io::Result<bool> {
    Ok(false)
}

//! Low-level chunked writes against a raw destination handle.

use std::io::Error as IoError;

use crate::buffer::Destination;

/// Outcome of writing one work item.
#[derive(Debug)]
pub(crate) struct WriteResult {
    /// Bytes actually delivered before completion or abort.
    pub bytes_written: usize,
    /// Set when the OS reported a hard error; the remainder of the item was
    /// not written.
    pub error: Option<IoError>,
}

impl WriteResult {
    fn complete(bytes_written: usize) -> Self {
        Self {
            bytes_written,
            error: None,
        }
    }

    fn aborted(bytes_written: usize, error: IoError) -> Self {
        Self {
            bytes_written,
            error: Some(error),
        }
    }
}

/// Writes `len` bytes starting at `addr` to `dest` in chunks of at most
/// `chunk_size` bytes.
///
/// Short writes advance by the actual count and retry against the remaining
/// tail, so a destination that accepts fewer bytes per call than requested
/// still receives the full region. `EINTR` retries the current chunk; any
/// other error aborts the remainder of this item.
#[cfg(unix)]
pub(crate) fn write_region(
    dest: Destination,
    addr: usize,
    len: usize,
    chunk_size: usize,
) -> WriteResult {
    let mut written = 0usize;
    while written < len {
        let chunk = (len - written).min(chunk_size);
        let rc = unsafe {
            libc::write(
                dest.raw(),
                (addr + written) as *const libc::c_void,
                chunk as libc::size_t,
            )
        };
        if rc < 0 {
            let err = IoError::last_os_error();
            if err.raw_os_error() == Some(libc::EINTR) {
                continue;
            }
            return WriteResult::aborted(written, err);
        }
        if rc == 0 {
            // A zero-byte result for a nonzero request would loop forever.
            return WriteResult::aborted(
                written,
                IoError::new(std::io::ErrorKind::WriteZero, "write returned zero bytes"),
            );
        }
        written += rc as usize;
    }
    WriteResult::complete(written)
}

/// Single unchunked write. Chunked writes misbehave on this platform's pipe
/// implementation, so the whole region goes out in one call.
#[cfg(windows)]
pub(crate) fn write_region(
    dest: Destination,
    addr: usize,
    len: usize,
    _chunk_size: usize,
) -> WriteResult {
    if len == 0 {
        return WriteResult::complete(0);
    }
    let count = u32::try_from(len).unwrap_or(u32::MAX);
    let rc = unsafe { libc::write(dest.raw(), addr as *const libc::c_void, count) };
    if rc < 0 {
        return WriteResult::aborted(0, IoError::last_os_error());
    }
    WriteResult::complete(rc as usize)
}

#[cfg(not(any(unix, windows)))]
pub(crate) fn write_region(
    _dest: Destination,
    _addr: usize,
    _len: usize,
    _chunk_size: usize,
) -> WriteResult {
    WriteResult::aborted(
        0,
        IoError::new(
            std::io::ErrorKind::Unsupported,
            "raw descriptor writes not supported on this platform",
        ),
    )
}

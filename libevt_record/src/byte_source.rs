//! Byte-stream inputs for the buffered record reader.
//!
//! The reader needs three things from its input that `std::io::Read` alone
//! does not give it: a non-blocking "is data available right now" probe, a
//! blocking wait for readability, and an end-of-data latch that can be
//! cleared when tailing a growing file.

use std::io::{self, Read};
use std::os::fd::AsRawFd;

use super::signal;

/// A byte stream the buffered record reader can consume.
pub trait ByteSource {
    /// Blocking read into `buf`. Returns the number of bytes obtained; zero
    /// means end-of-data (which also latches [`ByteSource::at_eof`]).
    fn read_bytes(&mut self, buf: &mut [u8]) -> io::Result<usize>;

    /// Non-blocking probe: true when a `read_bytes` call would return
    /// immediately (data buffered in the OS, or EOF/hangup pending).
    fn poll_readable(&mut self) -> io::Result<bool>;

    /// Block until the stream is readable (or at end-of-data).
    fn wait_readable(&mut self) -> io::Result<()>;

    /// True once a read has observed end-of-data.
    fn at_eof(&self) -> bool;

    /// Forget a previously observed end-of-data, for tail-follow use where
    /// the producer may still append.
    fn clear_eof(&mut self);
}

/// [`ByteSource`] over anything with a file descriptor: stdin, a pipe end,
/// or an open segment file. Readiness comes from `poll(2)`; interrupted
/// syscalls are retried, except once [`signal::shutdown_requested`] holds,
/// from which point the source reports end-of-data rather than blocking
/// again.
#[derive(Debug)]
pub struct FdSource<T: Read + AsRawFd> {
    inner: T,
    eof: bool,
}

impl<T: Read + AsRawFd> FdSource<T> {
    pub fn new(inner: T) -> Self {
        Self { inner, eof: false }
    }

    /// Give back the wrapped stream.
    pub fn into_inner(self) -> T {
        self.inner
    }

    fn poll(&mut self, timeout_ms: libc::c_int) -> io::Result<bool> {
        let mut pfd = libc::pollfd {
            fd: self.inner.as_raw_fd(),
            events: libc::POLLIN,
            revents: 0,
        };
        loop {
            if signal::shutdown_requested() {
                self.eof = true;
                return Ok(false);
            }
            let rc = unsafe { libc::poll(&mut pfd, 1, timeout_ms) };
            if rc < 0 {
                let err = io::Error::last_os_error();
                if err.kind() == io::ErrorKind::Interrupted {
                    continue;
                }
                return Err(err);
            }
            // POLLHUP/POLLERR also mean a read would return immediately.
            return Ok(rc > 0);
        }
    }
}

impl<T: Read + AsRawFd> ByteSource for FdSource<T> {
    fn read_bytes(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        loop {
            if self.eof || signal::shutdown_requested() {
                self.eof = true;
                return Ok(0);
            }
            match self.inner.read(buf) {
                Ok(0) => {
                    self.eof = true;
                    return Ok(0);
                }
                Ok(n) => return Ok(n),
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e),
            }
        }
    }

    fn poll_readable(&mut self) -> io::Result<bool> {
        if self.eof {
            return Ok(false);
        }
        self.poll(0)
    }

    fn wait_readable(&mut self) -> io::Result<()> {
        if self.eof {
            return Ok(());
        }
        self.poll(-1).map(|_| ())
    }

    fn at_eof(&self) -> bool {
        self.eof
    }

    fn clear_eof(&mut self) {
        self.eof = false;
    }
}

/// Block until any of the given descriptors is readable. Returns one bool
/// per descriptor, in order. Used by the injector to multiplex its inputs.
pub fn poll_many(fds: &[libc::c_int], timeout_ms: libc::c_int) -> io::Result<Vec<bool>> {
    let mut pfds: Vec<libc::pollfd> = fds
        .iter()
        .map(|&fd| libc::pollfd {
            fd,
            events: libc::POLLIN,
            revents: 0,
        })
        .collect();
    loop {
        let rc = unsafe { libc::poll(pfds.as_mut_ptr(), pfds.len() as libc::nfds_t, timeout_ms) };
        if rc < 0 {
            let err = io::Error::last_os_error();
            if err.kind() == io::ErrorKind::Interrupted {
                continue;
            }
            return Err(err);
        }
        return Ok(pfds
            .iter()
            .map(|p| p.revents & (libc::POLLIN | libc::POLLHUP | libc::POLLERR) != 0)
            .collect());
    }
}

//! Signal policy for the segmentation tools.
//!
//! A broken downstream pipe must surface as an ordinary write-error return,
//! not a process-terminating SIGPIPE. Interactive interrupts must not kill
//! the segmenter mid-record: the handler only bumps an atomic counter, and
//! the main loop checks it cooperatively once per record, so a run always
//! receives its terminator record before the process exits.

use std::sync::atomic::{AtomicU32, Ordering};

static INTERRUPTS: AtomicU32 = AtomicU32::new(0);

/// Interrupts observed so far. A single stray Ctrl-C is ignored; callers
/// treat [`INTERRUPT_SHUTDOWN_COUNT`] or more as "stop taking input".
pub fn interrupt_count() -> u32 {
    INTERRUPTS.load(Ordering::Relaxed)
}

/// Number of interrupts after which the segmenter stops reading input and
/// closes the run out with a bad-end record.
pub const INTERRUPT_SHUTDOWN_COUNT: u32 = 3;

/// True once the operator has insisted: [`INTERRUPT_SHUTDOWN_COUNT`] or more
/// interrupts observed. [`FdSource`](crate::byte_source::FdSource) reports
/// end-of-data from this point on, so a segmenter blocked on an idle input
/// pipe still reaches its shutdown path.
pub fn shutdown_requested() -> bool {
    interrupt_count() >= INTERRUPT_SHUTDOWN_COUNT
}

extern "C" fn note_interrupt(_signum: libc::c_int) {
    // Only an atomic bump is async-signal-safe; everything else happens in
    // the main loop.
    INTERRUPTS.fetch_add(1, Ordering::Relaxed);
}

/// Install the writer-side signal dispositions: SIGPIPE ignored, SIGINT
/// counted for cooperative shutdown.
pub fn install_writer_policy() {
    unsafe {
        libc::signal(libc::SIGPIPE, libc::SIG_IGN);

        let mut action: libc::sigaction = std::mem::zeroed();
        action.sa_sigaction =
            note_interrupt as extern "C" fn(libc::c_int) as libc::sighandler_t;
        libc::sigemptyset(&mut action.sa_mask);
        libc::sigaction(libc::SIGINT, &action, std::ptr::null_mut());
    }
}

/// Install the filter-side disposition: only SIGPIPE suppression. Filters
/// exit on EOF like any other pipeline stage, so SIGINT keeps its default.
pub fn install_filter_policy() {
    unsafe {
        libc::signal(libc::SIGPIPE, libc::SIG_IGN);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::byte_source::{ByteSource, FdSource};
    use std::fs::File;
    use std::os::fd::FromRawFd;

    fn reset_interrupts() {
        INTERRUPTS.store(0, Ordering::Relaxed);
    }

    // One test owns the process-global counter so parallel test threads
    // never observe each other's interrupt state.
    #[test]
    fn repeated_interrupts_latch_end_of_input() {
        reset_interrupts();
        assert_eq!(interrupt_count(), 0);
        note_interrupt(libc::SIGINT);
        assert_eq!(interrupt_count(), 1);
        assert!(!shutdown_requested());

        for _ in 0..INTERRUPT_SHUTDOWN_COUNT {
            note_interrupt(libc::SIGINT);
        }
        assert!(shutdown_requested());

        // An idle pipe: no data, writer still alive. Without the shutdown
        // latch this wait would block forever.
        let mut fds = [0i32; 2];
        assert_eq!(unsafe { libc::pipe(fds.as_mut_ptr()) }, 0);
        let reader = unsafe { File::from_raw_fd(fds[0]) };
        let _writer = unsafe { File::from_raw_fd(fds[1]) };

        let mut source = FdSource::new(reader);
        source.wait_readable().expect("wait should return");
        assert!(source.at_eof());
        let mut buf = [0u8; 8];
        assert_eq!(source.read_bytes(&mut buf).expect("read"), 0);

        reset_interrupts();
    }
}

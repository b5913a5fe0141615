//! Process-wide stdout/stderr capture for tests.
//!
//! An [`OutputCapture`] owns fds 1 and 2 while it is active: both are
//! pointed at pipes whose contents are collected until the capture is
//! closed. Anything writing to those fds lands in the capture, including
//! child processes that inherit them.
//!
//! Only one capture can be active per process. Acquiring a second one from
//! another thread blocks until the first is closed; acquiring it again on
//! the same thread fails with [`CaptureError::AlreadyActive`].

use std::cell::Cell;
use std::fs::File;
use std::io::{self, Read, Write};
use std::os::fd::{AsFd, AsRawFd, OwnedFd, RawFd};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::thread::{self, JoinHandle};

use nix::fcntl::OFlag;
use nix::unistd::{dup2, pipe2};

use crate::error::{fatal, CaptureError};

static STREAMS: Mutex<()> = Mutex::new(());

thread_local! {
    static HELD: Cell<bool> = const { Cell::new(false) };
}

const STDOUT_FD: RawFd = 1;
const STDERR_FD: RawFd = 2;

/// One redirected stream slot.
struct Redirect {
    fd: RawFd,
    saved: OwnedFd,
    write: Option<OwnedFd>,
    reader: Option<JoinHandle<io::Result<Vec<u8>>>>,
    captured: Vec<u8>,
}

impl Redirect {
    fn install(fd: RawFd, saved: OwnedFd) -> Result<Self, CaptureError> {
        let (read, write) = pipe2(OFlag::O_CLOEXEC).map_err(CaptureError::Pipe)?;
        let reader = thread::spawn(move || {
            let mut buf = Vec::new();
            File::from(read).read_to_end(&mut buf)?;
            Ok(buf)
        });
        let redirect = Redirect { fd, saved, write: Some(write), reader: Some(reader), captured: Vec::new() };
        if let Some(w) = &redirect.write {
            dup2(w.as_raw_fd(), fd).map_err(|source| CaptureError::Redirect { fd, source })?;
        }
        Ok(redirect)
    }

    // Put the saved fd back first: fd 1/2 is itself a copy of the write end,
    // so the reader only sees EOF once both are closed. If that fails the
    // reader is left detached rather than joined.
    fn restore(&mut self) -> Result<(), CaptureError> {
        dup2(self.saved.as_raw_fd(), self.fd)
            .map_err(|source| CaptureError::Redirect { fd: self.fd, source })?;
        self.write.take();
        self.captured = match self.reader.take() {
            Some(h) => match h.join() {
                Ok(r) => r?,
                Err(_) => return Err(CaptureError::Drain),
            },
            None => Vec::new(),
        };
        Ok(())
    }
}

/// Ownership of the process's standard output and error streams.
pub struct OutputCapture {
    out: Redirect,
    err: Redirect,
    closed: bool,
    slot: Option<MutexGuard<'static, ()>>,
}

impl OutputCapture {
    /// Starts capturing. Setup failures are fatal.
    #[allow(clippy::new_without_default)]
    pub fn new() -> Self {
        Self::try_new().unwrap_or_else(|e| fatal(e))
    }

    pub fn try_new() -> Result<Self, CaptureError> {
        if HELD.get() {
            return Err(CaptureError::AlreadyActive);
        }
        let slot = STREAMS.lock().unwrap_or_else(PoisonError::into_inner);
        io::stdout().flush()?;
        io::stderr().flush()?;
        let saved_out = io::stdout().as_fd().try_clone_to_owned()?;
        let saved_err = io::stderr().as_fd().try_clone_to_owned()?;

        let mut out = Redirect::install(STDOUT_FD, saved_out)?;
        let err = match Redirect::install(STDERR_FD, saved_err) {
            Ok(err) => err,
            Err(e) => {
                let _ = out.restore();
                return Err(e);
            }
        };
        HELD.set(true);
        tracing::debug!("capturing stdout and stderr");
        Ok(OutputCapture { out, err, closed: false, slot: Some(slot) })
    }

    /// Finalizes, then returns everything written to stdout.
    pub fn out(&mut self) -> &[u8] {
        self.close();
        &self.out.captured
    }

    pub fn out_string(&mut self) -> String {
        String::from_utf8_lossy(self.out()).into_owned()
    }

    /// Finalizes, then returns everything written to stderr.
    pub fn err(&mut self) -> &[u8] {
        self.close();
        &self.err.captured
    }

    pub fn err_string(&mut self) -> String {
        String::from_utf8_lossy(self.err()).into_owned()
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    /// Restores the original streams and collects what was written.
    /// Failures are fatal. Calling it again is a no-op.
    pub fn close(&mut self) {
        if let Err(e) = self.try_close() {
            fatal(e)
        }
    }

    pub fn try_close(&mut self) -> Result<(), CaptureError> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        let _ = io::stdout().flush();
        let _ = io::stderr().flush();
        let out = self.out.restore();
        let err = self.err.restore();
        HELD.set(false);
        self.slot.take();
        tracing::debug!(out = self.out.captured.len(), err = self.err.captured.len(), "capture closed");
        out.and(err)
    }
}

impl Drop for OutputCapture {
    fn drop(&mut self) {
        if let Err(e) = self.try_close() {
            tracing::warn!(error = %e, "output capture was not restored cleanly");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write_both(out: &str, err: &str) {
        let mut o = io::stdout().lock();
        o.write_all(out.as_bytes()).unwrap();
        o.flush().unwrap();
        let mut e = io::stderr().lock();
        e.write_all(err.as_bytes()).unwrap();
    }

    #[test]
    fn captures_both_streams() {
        let mut cap = OutputCapture::new();
        write_both("to stdout 7731\n", "to stderr 7731\n");
        assert!(cap.out_string().contains("to stdout 7731"));
        assert!(cap.err_string().contains("to stderr 7731"));
        assert!(!cap.out_string().contains("to stderr 7731"));
    }

    #[test]
    fn accessor_order_does_not_matter() {
        let mut a = OutputCapture::new();
        write_both("a-out\n", "a-err\n");
        let (a_out, a_err) = (a.out().to_vec(), a.err().to_vec());
        drop(a);

        let mut b = OutputCapture::new();
        write_both("a-out\n", "a-err\n");
        let b_err = b.err().to_vec();
        let b_out = b.out().to_vec();

        assert!(String::from_utf8_lossy(&a_out).contains("a-out"));
        assert!(String::from_utf8_lossy(&b_out).contains("a-out"));
        assert_eq!(String::from_utf8_lossy(&a_err), String::from_utf8_lossy(&b_err));
    }

    #[test]
    fn close_is_idempotent() {
        let mut cap = OutputCapture::new();
        write_both("once\n", "");
        let first = cap.out().to_vec();
        assert!(cap.is_closed());
        let restored = nix::sys::stat::fstat(STDOUT_FD).unwrap();
        cap.close();
        cap.close();
        let again = nix::sys::stat::fstat(STDOUT_FD).unwrap();
        assert_eq!((restored.st_dev, restored.st_ino), (again.st_dev, again.st_ino));
        assert_eq!(cap.out(), first.as_slice());
        assert!(String::from_utf8_lossy(&first).contains("once"));
    }

    #[test]
    fn failed_restore_reports_without_draining() {
        let target = File::open("/dev/null").unwrap();
        let saved = target.as_fd().try_clone_to_owned().unwrap();
        let mut slot = Redirect::install(target.as_raw_fd(), saved).unwrap();
        slot.fd = -1;
        assert!(matches!(slot.restore(), Err(CaptureError::Redirect { fd: -1, .. })));
        assert!(slot.reader.is_some());
    }

    #[test]
    fn streams_are_restored_on_close() {
        let mut cap = OutputCapture::new();
        let during = nix::sys::stat::fstat(STDOUT_FD).unwrap();
        cap.close();
        let before = nix::sys::stat::fstat(cap.out.saved.as_raw_fd()).unwrap();
        let after = nix::sys::stat::fstat(STDOUT_FD).unwrap();
        assert_eq!((before.st_dev, before.st_ino), (after.st_dev, after.st_ino));
        assert_ne!((during.st_dev, during.st_ino), (after.st_dev, after.st_ino));
    }

    #[test]
    fn same_thread_reacquire_fails() {
        let _cap = OutputCapture::new();
        assert!(matches!(OutputCapture::try_new(), Err(CaptureError::AlreadyActive)));
    }

    #[test]
    fn new_capture_after_close_on_same_thread() {
        let mut first = OutputCapture::new();
        first.close();
        let mut second = OutputCapture::try_new().unwrap();
        write_both("second 7733\n", "");
        assert!(second.out_string().contains("second 7733"));
    }

    #[test]
    fn large_output_does_not_block() {
        let mut cap = OutputCapture::new();
        let chunk = "x".repeat(1024);
        for _ in 0..256 {
            write_both(&chunk, "");
        }
        assert!(cap.out().len() >= 256 * 1024);
    }

    #[test]
    fn drop_restores_after_panic() {
        let res = std::panic::catch_unwind(|| {
            let _cap = OutputCapture::new();
            panic!("inside capture");
        });
        assert!(res.is_err());
        let mut cap = OutputCapture::try_new().unwrap();
        write_both("recovered 7734\n", "");
        assert!(cap.out_string().contains("recovered 7734"));
    }
}

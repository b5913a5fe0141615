use std::error::Error as StdError;
use std::fmt;
use std::io;
use std::process::ExitStatus;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum CommandError {
    #[error("failed to spawn `{program}`")]
    Spawn {
        program: String,
        #[source]
        source: io::Error,
    },
    #[error("stdio of `{program}` failed")]
    Io {
        program: String,
        #[source]
        source: io::Error,
    },
    #[error("`{program}` exited with {status}")]
    Exit { program: String, status: ExitStatus },
    #[cfg(feature = "exec")]
    #[error("executable `{program}` not found")]
    NotFound {
        program: String,
        #[source]
        source: which::Error,
    },
    #[cfg(feature = "exec")]
    #[error("invalid argument for `{program}`: {value:?}")]
    InvalidArgument {
        program: String,
        value: String,
        #[source]
        source: std::ffi::NulError,
    },
    #[cfg(feature = "exec")]
    #[error("cannot enter directory {dir:?} for `{program}`")]
    Chdir {
        program: String,
        dir: String,
        #[source]
        source: nix::Error,
    },
    #[cfg(feature = "exec")]
    #[error("exec of `{program}` failed")]
    Exec {
        program: String,
        #[source]
        source: nix::Error,
    },
}

#[derive(Debug, Error)]
pub enum CaptureError {
    #[error("an output capture is already active on this thread")]
    AlreadyActive,
    #[error("cannot create capture pipe")]
    Pipe(#[source] nix::Error),
    #[error("cannot redirect fd {fd}")]
    Redirect {
        fd: i32,
        #[source]
        source: nix::Error,
    },
    #[error("capture I/O failed")]
    Io(#[from] io::Error),
    #[error("capture reader thread panicked")]
    Drain,
}

/// Renders an error followed by each of its causes, `outer: inner: root`.
pub struct ErrorChain<'a>(pub &'a (dyn StdError + 'static));

impl fmt::Display for ErrorChain<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)?;
        let mut cause = self.0.source();
        while let Some(e) = cause {
            write!(f, ": {}", e)?;
            cause = e.source();
        }
        Ok(())
    }
}

/// Logs the cause chain of `err` and panics with it.
///
/// Used by the `must_*` variants, `Command::exec` and capture setup/finalize.
pub fn fatal<E: StdError + 'static>(err: E) -> ! {
    let chain = ErrorChain(&err).to_string();
    tracing::error!(error = %chain, "fatal");
    panic!("{}", chain)
}

//! shellz::prelude - grab-and-go imports for scripts and tests

pub use crate::capture::OutputCapture;
pub use crate::cmd::{default_log_hook, Arg, Command};
pub use crate::error::{fatal, CaptureError, CommandError};
#[cfg(feature = "exec")]
pub use crate::exec::ExecPlan;

//! shellz: a command builder with blocking run, combined-output and
//! process-replacement strategies, plus process-wide stdout/stderr capture
//! for tests.

pub mod error;
pub mod cmd;
pub mod render;
pub mod exec;
pub mod capture;
pub mod prelude;
pub mod macros;

pub use capture::OutputCapture;
pub use cmd::{Arg, Command};
pub use error::{CaptureError, CommandError};
#[cfg(feature = "exec")]
pub use exec::ExecPlan;

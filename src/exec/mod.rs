//! Execution strategies for [`Command`].
//!
//! `run` and `output` spawn a child and block until it exits. `exec`
//! replaces the current process image and only comes back to fail.

use std::fs::File;
use std::io::{self, Read, Write};
use std::process::{self, Child, ChildStdin, ExitStatus, Stdio};
use std::thread::{self, Scope, ScopedJoinHandle};

use nix::fcntl::OFlag;
use nix::unistd::pipe2;

use crate::cmd::{Arg, Command};
use crate::error::{fatal, CommandError};

#[cfg(feature = "exec")]
mod replace;

#[cfg(feature = "exec")]
pub use replace::ExecPlan;

impl<'a> Command<'a> {
    /// Runs to completion. Stdio is inherited unless overridden.
    pub fn run(&mut self) -> Result<(), CommandError> {
        self.log();
        let stdin = self.stdin.take();
        let mut cmd = self.std_command();
        cmd.stdin(piped_or_inherit(stdin.is_some()))
            .stdout(piped_or_inherit(self.stdout.is_some()))
            .stderr(piped_or_inherit(self.stderr.is_some()));
        let mut child = self.spawn(cmd)?;

        let stdout = self.stdout.as_mut();
        let stderr = self.stderr.as_mut();
        let status = thread::scope(|s| {
            let feed = pump_in(s, stdin, child.stdin.take());
            let out = pump_out(s, child.stdout.take(), stdout);
            let err = pump_out(s, child.stderr.take(), stderr);
            let status = child.wait();
            join(feed).and(join(out)).and(join(err)).and(status)
        })
        .map_err(|source| self.io_error(source))?;
        self.check(status)
    }

    /// Like [`Command::run`] but panics through [`fatal`] on any error.
    pub fn must_run(&mut self) {
        if let Err(e) = self.run() {
            fatal(e)
        }
    }

    /// Runs to completion and returns stdout and stderr merged into one
    /// trimmed string.
    ///
    /// A stdout override is ignored here. A stderr override still receives
    /// stderr on its own, leaving only stdout in the result.
    pub fn output(&mut self) -> Result<String, CommandError> {
        self.log();
        let stdin = self.stdin.take();
        let (reader, writer) = pipe2(OFlag::O_CLOEXEC).map_err(|e| self.io_error(e.into()))?;
        let mut cmd = self.std_command();
        cmd.stdin(piped_or_inherit(stdin.is_some()))
            .stdout(Stdio::from(writer.try_clone().map_err(|e| self.io_error(e))?));
        if self.stderr.is_some() {
            drop(writer);
            cmd.stderr(Stdio::piped());
        } else {
            cmd.stderr(Stdio::from(writer));
        }
        let mut child = self.spawn(cmd)?;

        let mut combined = Vec::new();
        let stderr = self.stderr.as_mut();
        let status = thread::scope(|s| {
            let feed = pump_in(s, stdin, child.stdin.take());
            let err = pump_out(s, child.stderr.take(), stderr);
            let read = File::from(reader).read_to_end(&mut combined).map(drop);
            let status = child.wait();
            join(feed).and(join(err)).and(read).and(status)
        })
        .map_err(|source| self.io_error(source))?;
        self.check(status)?;
        Ok(String::from_utf8_lossy(&combined).trim().to_string())
    }

    /// Like [`Command::output`] but panics through [`fatal`] on any error.
    pub fn must_output(&mut self) -> String {
        self.output().unwrap_or_else(|e| fatal(e))
    }

    pub(crate) fn std_command(&self) -> process::Command {
        let mut cmd = process::Command::new(&self.program);
        cmd.args(self.args.iter().map(Arg::as_os_str)).envs(&self.env);
        if let Some(dir) = &self.cwd {
            cmd.current_dir(dir);
        }
        cmd
    }

    // Consumes `cmd` so the parent's copies of any stdio fds close here.
    fn spawn(&self, mut cmd: process::Command) -> Result<Child, CommandError> {
        tracing::debug!(program = %self.program, args = ?self.args, cwd = ?self.cwd, "spawning command");
        cmd.spawn().map_err(|source| CommandError::Spawn { program: self.program.clone(), source })
    }

    fn check(&self, status: ExitStatus) -> Result<(), CommandError> {
        tracing::debug!(program = %self.program, %status, "command exited");
        if status.success() {
            Ok(())
        } else {
            Err(CommandError::Exit { program: self.program.clone(), status })
        }
    }

    pub(crate) fn io_error(&self, source: io::Error) -> CommandError {
        CommandError::Io { program: self.program.clone(), source }
    }
}

fn piped_or_inherit(piped: bool) -> Stdio {
    if piped { Stdio::piped() } else { Stdio::inherit() }
}

fn pump_in<'scope, 'env, R>(
    s: &'scope Scope<'scope, 'env>,
    src: Option<R>,
    dst: Option<ChildStdin>,
) -> Option<ScopedJoinHandle<'scope, io::Result<()>>>
where
    R: Read + Send + 'scope,
{
    let (mut src, mut dst) = src.zip(dst)?;
    Some(s.spawn(move || match io::copy(&mut src, &mut dst) {
        // the child may exit without reading all of its input
        Err(e) if e.kind() == io::ErrorKind::BrokenPipe => Ok(()),
        r => r.map(drop),
    }))
}

fn pump_out<'scope, 'env, R, W>(
    s: &'scope Scope<'scope, 'env>,
    src: Option<R>,
    dst: Option<W>,
) -> Option<ScopedJoinHandle<'scope, io::Result<()>>>
where
    R: Read + Send + 'scope,
    W: Write + Send + 'scope,
{
    let (mut src, mut dst) = src.zip(dst)?;
    Some(s.spawn(move || {
        io::copy(&mut src, &mut dst)?;
        dst.flush()
    }))
}

fn join(handle: Option<ScopedJoinHandle<'_, io::Result<()>>>) -> io::Result<()> {
    match handle {
        Some(h) => h.join().unwrap_or_else(|_| Err(io::Error::other("stdio pump panicked"))),
        None => Ok(()),
    }
}

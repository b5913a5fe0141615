//! In-place process replacement.

use std::env;
use std::ffi::{CString, OsStr, OsString};
use std::io::{self, Write};
use std::os::unix::ffi::OsStrExt;
use std::path::PathBuf;

use nix::unistd::{chdir, execve};

use crate::cmd::{Arg, Command};
use crate::error::{fatal, CommandError};

/// Everything `execve` needs, resolved without touching the process.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecPlan {
    /// Absolute path of the executable.
    pub path: CString,
    /// `argv[0]` is the program as configured, followed by every argument
    /// in its string form.
    pub argv: Vec<CString>,
    /// Inherited environment minus overridden keys, then the overrides.
    pub envp: Vec<CString>,
}

impl<'a> Command<'a> {
    /// Resolves the executable, argument vector and environment that
    /// [`Command::exec`] would hand to `execve`.
    ///
    /// The lookup uses the `PATH` override when one is set, relative to the
    /// configured directory.
    pub fn plan_exec(&self) -> Result<ExecPlan, CommandError> {
        let path = self.resolve_executable()?;
        let argv = std::iter::once(OsStr::new(&self.program))
            .chain(self.args.iter().map(Arg::as_os_str))
            .map(|s| self.c_string(s))
            .collect::<Result<Vec<_>, _>>()?;
        let envp = self
            .exec_env()
            .iter()
            .map(|kv| self.c_string(kv))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(ExecPlan { path: self.c_string(path.as_os_str())?, argv, envp })
    }

    /// Replaces the current process image with this command.
    ///
    /// Stdio overrides are ignored: the new image keeps the current fds 0-2.
    /// Every failure, before or during `execve`, is fatal.
    pub fn exec(&self) -> ! {
        self.log();
        let plan = self.plan_exec().unwrap_or_else(|e| fatal(e));
        if let Some(dir) = &self.cwd {
            if let Err(source) = chdir(dir.as_path()) {
                fatal(CommandError::Chdir {
                    program: self.program.clone(),
                    dir: dir.display().to_string(),
                    source,
                })
            }
        }
        tracing::debug!(path = ?plan.path, argv = ?plan.argv, "replacing process image");
        let _ = io::stdout().flush();
        let _ = io::stderr().flush();
        match execve(&plan.path, plan.argv.as_slice(), plan.envp.as_slice()) {
            Ok(never) => match never {},
            Err(source) => fatal(CommandError::Exec { program: self.program.clone(), source }),
        }
    }

    fn resolve_executable(&self) -> Result<PathBuf, CommandError> {
        let paths = match self.env.get("PATH") {
            Some(p) => Some(OsString::from(p)),
            None => env::var_os("PATH"),
        };
        let cwd = match &self.cwd {
            Some(dir) => dir.clone(),
            None => env::current_dir().map_err(|e| self.io_error(e))?,
        };
        which::which_in(&self.program, paths, cwd)
            .map_err(|source| CommandError::NotFound { program: self.program.clone(), source })
    }

    fn exec_env(&self) -> Vec<OsString> {
        let inherited = env::vars_os()
            .filter(|(k, _)| k.to_str().map_or(true, |k| !self.env.contains_key(k)))
            .map(|(k, v)| env_entry(&k, &v));
        let overrides = self.env.iter().map(|(k, v)| env_entry(OsStr::new(k), OsStr::new(v)));
        inherited.chain(overrides).collect()
    }

    fn c_string(&self, s: &OsStr) -> Result<CString, CommandError> {
        CString::new(s.as_bytes()).map_err(|source| CommandError::InvalidArgument {
            program: self.program.clone(),
            value: s.to_string_lossy().into_owned(),
            source,
        })
    }
}

fn env_entry(key: &OsStr, value: &OsStr) -> OsString {
    let mut entry = key.to_os_string();
    entry.push("=");
    entry.push(value);
    entry
}

//! Command modeling: the builder every execution strategy starts from.

use std::collections::BTreeMap;
use std::ffi::{OsStr, OsString};
use std::fmt;
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};

use crate::render::render_line;

/// A single command-line argument.
///
/// `Native` values are handed to the child exactly as given. `Rendered`
/// values came from a non-string type and are passed as their `Display` form.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Arg {
    Native(OsString),
    Rendered(String),
}

impl Arg {
    pub fn display<T: fmt::Display>(value: T) -> Self {
        Arg::Rendered(value.to_string())
    }

    pub fn as_os_str(&self) -> &OsStr {
        match self {
            Arg::Native(s) => s,
            Arg::Rendered(s) => OsStr::new(s),
        }
    }
}

impl fmt::Display for Arg {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Arg::Native(s) => write!(f, "{}", s.to_string_lossy()),
            Arg::Rendered(s) => f.write_str(s),
        }
    }
}

impl From<&str> for Arg {
    fn from(s: &str) -> Self { Arg::Native(s.into()) }
}
impl From<String> for Arg {
    fn from(s: String) -> Self { Arg::Native(s.into()) }
}
impl From<&String> for Arg {
    fn from(s: &String) -> Self { Arg::Native(s.into()) }
}
impl From<OsString> for Arg {
    fn from(s: OsString) -> Self { Arg::Native(s) }
}
impl From<&OsStr> for Arg {
    fn from(s: &OsStr) -> Self { Arg::Native(s.to_os_string()) }
}
impl From<&Path> for Arg {
    fn from(p: &Path) -> Self { Arg::Native(p.as_os_str().to_os_string()) }
}
impl From<PathBuf> for Arg {
    fn from(p: PathBuf) -> Self { Arg::Native(p.into_os_string()) }
}

macro_rules! rendered_arg {
    ($($t:ty),*) => {
        $( impl From<$t> for Arg { fn from(v: $t) -> Self { Arg::display(v) } } )*
    };
}

rendered_arg!(i8, i16, i32, i64, i128, isize, u8, u16, u32, u64, u128, usize, f32, f64, bool, char);

pub type LogHook<'a> = Box<dyn Fn(&str, &[Arg]) + 'a>;

/// Writes `program arg ...` to the process stdout handle.
///
/// Goes through `io::stdout()` rather than `println!` so the line lands on
/// fd 1 even under the test harness.
pub fn default_log_hook(program: &str, args: &[Arg]) {
    let mut out = io::stdout().lock();
    let _ = writeln!(out, "{}", render_line(program, args));
    let _ = out.flush();
}

/// Builder for an external process invocation.
///
/// Setters only record intent; nothing is validated until one of the
/// execution methods in [`crate::exec`] runs. A stdin override is consumed by
/// the first execution that uses it.
pub struct Command<'a> {
    pub(crate) program: String,
    pub(crate) args: Vec<Arg>,
    pub(crate) env: BTreeMap<String, String>,
    pub(crate) cwd: Option<PathBuf>,
    pub(crate) stdin: Option<Box<dyn Read + Send + 'a>>,
    pub(crate) stdout: Option<Box<dyn Write + Send + 'a>>,
    pub(crate) stderr: Option<Box<dyn Write + Send + 'a>>,
    pub(crate) log: Option<LogHook<'a>>,
}

impl<'a> Command<'a> {
    pub fn new(program: impl Into<String>) -> Self {
        Command {
            program: program.into(),
            args: Vec::new(),
            env: BTreeMap::new(),
            cwd: None,
            stdin: None,
            stdout: None,
            stderr: None,
            log: Some(Box::new(default_log_hook)),
        }
    }

    pub fn arg(&mut self, arg: impl Into<Arg>) -> &mut Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, A>(&mut self, args: I) -> &mut Self
    where
        I: IntoIterator<Item = A>,
        A: Into<Arg>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Appends `value` in its `Display` form, whatever its type.
    pub fn arg_display(&mut self, value: impl fmt::Display) -> &mut Self {
        self.args.push(Arg::display(value));
        self
    }

    /// Sets one environment override. A later call for the same key wins.
    pub fn env(&mut self, key: impl Into<String>, value: impl Into<String>) -> &mut Self {
        self.env.insert(key.into(), value.into());
        self
    }

    /// Merges overrides into the existing set without clearing it.
    pub fn envs<I, K, V>(&mut self, vars: I) -> &mut Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        for (k, v) in vars {
            self.env.insert(k.into(), v.into());
        }
        self
    }

    /// An empty path means "inherit the caller's directory".
    pub fn current_dir(&mut self, dir: impl AsRef<Path>) -> &mut Self {
        let dir = dir.as_ref();
        self.cwd = if dir.as_os_str().is_empty() { None } else { Some(dir.to_path_buf()) };
        self
    }

    pub fn stdin(&mut self, input: impl Read + Send + 'a) -> &mut Self {
        self.stdin = Some(Box::new(input));
        self
    }

    pub fn stdout(&mut self, sink: impl Write + Send + 'a) -> &mut Self {
        self.stdout = Some(Box::new(sink));
        self
    }

    pub fn stderr(&mut self, sink: impl Write + Send + 'a) -> &mut Self {
        self.stderr = Some(Box::new(sink));
        self
    }

    /// Replaces the log hook, called with the program and raw arguments
    /// right before execution.
    pub fn log_hook(&mut self, hook: impl Fn(&str, &[Arg]) + 'a) -> &mut Self {
        self.log = Some(Box::new(hook));
        self
    }

    pub fn no_log(&mut self) -> &mut Self {
        self.log = None;
        self
    }

    pub fn get_program(&self) -> &str { &self.program }
    pub fn get_args(&self) -> &[Arg] { &self.args }
    pub fn get_envs(&self) -> &BTreeMap<String, String> { &self.env }
    pub fn get_current_dir(&self) -> Option<&Path> { self.cwd.as_deref() }

    pub(crate) fn log(&self) {
        if let Some(hook) = &self.log {
            hook(&self.program, &self.args);
        }
    }
}

impl fmt::Display for Command<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&render_line(&self.program, &self.args))
    }
}

impl fmt::Debug for Command<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Command")
            .field("program", &self.program)
            .field("args", &self.args)
            .field("env", &self.env)
            .field("cwd", &self.cwd)
            .field("stdin", &self.stdin.is_some())
            .field("stdout", &self.stdout.is_some())
            .field("stderr", &self.stderr.is_some())
            .field("log", &self.log.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;

    #[test]
    fn args_keep_their_kind() {
        let mut c = Command::new("echo");
        c.arg("a").arg(3).args(["b", "c"]).arg_display(1.5).arg(Path::new("/tmp/x"));
        assert_eq!(
            c.get_args(),
            &[
                Arg::Native("a".into()),
                Arg::Rendered("3".into()),
                Arg::Native("b".into()),
                Arg::Native("c".into()),
                Arg::Rendered("1.5".into()),
                Arg::Native("/tmp/x".into()),
            ]
        );
    }

    #[test]
    fn env_setters_compose() {
        let mut c = Command::new("env");
        c.env("A", "1").env("B", "1");
        c.envs([("B", "2"), ("C", "3")]);
        c.env("A", "4");
        let got: Vec<_> = c.get_envs().iter().map(|(k, v)| format!("{}={}", k, v)).collect();
        assert_eq!(got, vec!["A=4", "B=2", "C=3"]);
    }

    #[test]
    fn empty_dir_inherits() {
        let mut c = Command::new("pwd");
        c.current_dir("/tmp");
        assert_eq!(c.get_current_dir(), Some(Path::new("/tmp")));
        c.current_dir("");
        assert_eq!(c.get_current_dir(), None);
    }

    #[test]
    fn log_hook_sees_raw_args() {
        let seen = RefCell::new(Vec::new());
        let mut c = Command::new("cat");
        c.arg("-b").arg(7u8).log_hook(|p, a| seen.borrow_mut().push((p.to_string(), a.to_vec())));
        c.log();
        c.no_log();
        c.log();
        drop(c);
        let seen = seen.into_inner();
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0].0, "cat");
        assert_eq!(seen[0].1, vec![Arg::Native("-b".into()), Arg::Rendered("7".into())]);
    }

    #[test]
    fn display_renders_command_line() {
        let mut c = Command::new("grep");
        c.arg("-n").arg("two words").arg(2);
        assert_eq!(c.to_string(), "grep -n 'two words' 2");
    }
}

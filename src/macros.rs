//! Terse macros for everyday usage

/// Builds a [`Command`](crate::cmd::Command) from a program and arguments.
///
/// ```ignore
/// let out = shellz::cmd!("git", "rev-parse", "HEAD").no_log().must_output();
/// ```
#[macro_export]
macro_rules! cmd {
    ($program:expr $(, $arg:expr)* $(,)?) => {{
        #[allow(unused_mut)]
        let mut __c = $crate::cmd::Command::new($program);
        $( __c.arg($arg); )*
        __c
    }};
}

//! Rendering of command lines for display and logging.
//!
//! The output is meant for humans reading a log. It is never handed to a
//! shell; execution always passes an argument vector.

use crate::cmd::Arg;

/// Renders `program arg ...`, quoting any word that is not shell-simple.
pub fn render_line(program: &str, args: &[Arg]) -> String {
    let mut parts: Vec<String> = Vec::with_capacity(args.len() + 1);
    parts.push(quote_word(program));
    for a in args {
        parts.push(quote_word(&a.to_string()));
    }
    parts.join(" ")
}

fn quote_word(s: &str) -> String {
    if !s.is_empty() && is_simple_word(s) { s.to_string() } else { quote_sh(s) }
}

fn is_simple_word(s: &str) -> bool {
    s.chars().all(|c| matches!(c,
        'a'..='z' | 'A'..='Z' | '0'..='9' | '_' | '-' | '.' | '/' | ':' | '+' | '%' | '@' | '=' | ','))
}

fn quote_sh(s: &str) -> String {
    if s.is_empty() { return "''".to_string(); }
    let escaped = s.replace("'", "'\"'\"'");
    format!("'{}'", escaped)
}

//! Wrapper substitution contract.
//!
//! A workspace (or an individual run) may carry a wrapper template such as
//! `docker run img sh -c {}`. Runners substitute each node's label into the
//! template before executing it under a shell:
//!
//! - `{}` is replaced by the single-quoted, shell-escaped label
//! - a template without `{}` gets the escaped label appended after a space
//! - with no wrapper at all, the label is executed directly

/// The substitution point inside a wrapper template.
pub const PLACEHOLDER: &str = "{}";

/// Single-quotes `label` for POSIX shells, escaping embedded quotes.
#[must_use]
pub fn shell_quote(label: &str) -> String {
    let mut quoted = String::with_capacity(label.len() + 2);
    quoted.push('\'');
    for ch in label.chars() {
        if ch == '\'' {
            quoted.push_str("'\\''");
        } else {
            quoted.push(ch);
        }
    }
    quoted.push('\'');
    quoted
}

/// Renders the command a runner should execute for a node label.
#[must_use]
pub fn render_command(wrapper: Option<&str>, label: &str) -> String {
    match wrapper {
        None => label.to_string(),
        Some(template) if template.contains(PLACEHOLDER) => {
            template.replacen(PLACEHOLDER, &shell_quote(label), 1)
        }
        Some(template) => format!("{template} {}", shell_quote(label)),
    }
}

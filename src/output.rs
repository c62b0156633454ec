//! User-facing terminal messages
//!
//! Plain colored messages for the CLI, kept apart from the `log` stream so
//! users don't see timestamps or module paths.

use owo_colors::OwoColorize;

/// Print a warning in yellow, padded by blank lines
///
/// # Example
/// ```ignore
/// output::warn("Query has no tags; nothing to list.");
/// ```
pub fn warn(message: &str) {
    eprintln!("\n{}\n", message.yellow());
}

/// Print an error in red, padded by blank lines
///
/// # Example
/// ```ignore
/// output::error("No tag store found. Run 'tsf init' first.");
/// ```
pub fn error(message: &str) {
    eprintln!("\n{}\n", message.red());
}

/// Print a dimmed status line (cache hit/miss and similar)
pub fn note(message: &str) {
    eprintln!("{}", message.dimmed());
}

//! Pretty-printing messages to the console

use colored::Colorize;

use crate::location::Location;

/// Pretty-print a bare error message to the console
pub fn error(error_message: impl AsRef<str>) {
    let error_title = "error:".red().bold();
    eprintln!("{} {}", error_title, error_message.as_ref());
}

/// Pretty-print a warning message to the console
pub fn warning(message: impl AsRef<str>, loc: &Location) {
    let warning = "warning:".yellow().bold();
    eprintln!("{} {}: {}", warning, loc, message.as_ref());
}

/// Pretty-print an informational note, used by the driver to announce which
/// stage of the pipeline is running.
pub fn note(message: impl AsRef<str>) {
    let note = "note:".blue().bold();
    eprintln!("{} {}", note, message.as_ref());
}

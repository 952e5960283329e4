use std::io::Write;

use console::Style;
use indicatif::{ProgressBar, ProgressStyle};

/// Print a Cargo-style status line: `   Resolving org#app;1.0`
///
/// The `label` is right-padded to 12 characters and printed in bold green,
/// followed by the `message` in the default terminal colour.
pub fn status(label: &str, message: &str) {
    print_status(Style::new().green().bold(), label, message);
}

/// Like [`status`] but uses bold cyan for informational (non-action) messages.
pub fn status_info(label: &str, message: &str) {
    print_status(Style::new().cyan().bold(), label, message);
}

/// Print a warning-style status line (bold yellow label).
pub fn status_warn(label: &str, message: &str) {
    print_status(Style::new().yellow().bold(), label, message);
}

/// Print an error-style status line (bold red label).
pub fn status_error(label: &str, message: &str) {
    print_status(Style::new().red().bold(), label, message);
}

fn print_status(style: Style, label: &str, message: &str) {
    let _ = writeln!(std::io::stderr(), "{:>12} {message}", style.apply_to(label));
}

/// Spinner shown while a long step runs.
///
/// Hidden when stderr is not a terminal so piped output stays clean.
pub fn spinner(message: &str) -> ProgressBar {
    if !console::Term::stderr().is_term() {
        return ProgressBar::hidden();
    }
    let pb = ProgressBar::new_spinner();
    if let Ok(style) = ProgressStyle::default_spinner().template("{spinner:.green} {msg}") {
        pb.set_style(style);
    }
    pb.set_message(message.to_string());
    pb.enable_steady_tick(std::time::Duration::from_millis(80));
    pb
}

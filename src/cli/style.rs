//! Terminal styling helpers
//!
//! Output goes through `anstream`, which strips the ANSI codes when stdout
//! is not a terminal.

use owo_colors::OwoColorize;

/// Check mark
pub const CHECK: &str = "✓";
/// Cross mark
pub const CROSS: &str = "✗";

/// Semantic styles for CLI output
pub trait Stylize {
    /// De-emphasized text
    fn muted(&self) -> String;
    /// Headings
    fn emphasis(&self) -> String;
    /// Names and identifiers
    fn accent(&self) -> String;
    /// Positive outcome
    fn success(&self) -> String;
    /// Something needs attention
    fn warn(&self) -> String;
    /// Negative outcome
    fn error(&self) -> String;
}

impl<T: AsRef<str> + ?Sized> Stylize for T {
    fn muted(&self) -> String {
        self.as_ref().dimmed().to_string()
    }

    fn emphasis(&self) -> String {
        self.as_ref().bold().to_string()
    }

    fn accent(&self) -> String {
        self.as_ref().cyan().to_string()
    }

    fn success(&self) -> String {
        self.as_ref().green().to_string()
    }

    fn warn(&self) -> String {
        self.as_ref().yellow().to_string()
    }

    fn error(&self) -> String {
        self.as_ref().red().to_string()
    }
}

/// Green check mark
pub fn check() -> String {
    CHECK.success()
}

/// Red cross mark
pub fn cross() -> String {
    CROSS.error()
}

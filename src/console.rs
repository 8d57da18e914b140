//! Console output formatting with ANSI color support.
//!
//! Provides styled terminal output with automatic TTY detection
//! and respect for the NO_COLOR environment variable.

use crate::filter::ChapterItem;
use crate::reconcile::ReconcileOutcome;
use std::io::{self, IsTerminal};

/// ANSI style codes for terminal formatting.
#[derive(Debug, Clone, Copy)]
pub enum Style {
    Bold,
    Dim,
    Green,
    Yellow,
    Blue,
    Magenta,
    Cyan,
    Gray,
}

impl Style {
    /// Returns the ANSI escape code for this style.
    fn code(self) -> &'static str {
        match self {
            Style::Bold => "1",
            Style::Dim => "2",
            Style::Green => "32",
            Style::Yellow => "33",
            Style::Blue => "34",
            Style::Magenta => "35",
            Style::Cyan => "36",
            Style::Gray => "90",
        }
    }
}

const RESET: &str = "\x1b[0m";

/// Console output handler with color support detection.
#[derive(Debug)]
pub struct Console {
    colors_enabled: bool,
}

impl Default for Console {
    fn default() -> Self {
        Self::new()
    }
}

impl Console {
    /// Creates a new Console instance, detecting color support.
    ///
    /// Colors are disabled if:
    /// - The `NO_COLOR` environment variable is set
    /// - stdout is not a terminal (TTY)
    pub fn new() -> Self {
        let colors_enabled = std::env::var("NO_COLOR").is_err() && io::stdout().is_terminal();

        Self { colors_enabled }
    }

    /// Creates a Console with colors explicitly enabled or disabled.
    pub fn with_colors(enabled: bool) -> Self {
        Self {
            colors_enabled: enabled,
        }
    }

    /// Applies ANSI styles to text if colors are enabled.
    pub fn style(&self, text: &str, styles: &[Style]) -> String {
        if !self.colors_enabled || styles.is_empty() {
            return text.to_string();
        }

        let codes: Vec<&str> = styles.iter().map(|s| s.code()).collect();
        format!("\x1b[{}m{}{}", codes.join(";"), text, RESET)
    }

    /// Creates a colored label like `[INFO]`.
    pub fn label(&self, label: &str, color: Style) -> String {
        let styled = self.style(label, &[color, Style::Bold]);
        format!("[{}]", styled)
    }

    fn labeled(&self, label: &str, color: Style, message: &str) {
        println!("{} {}", self.label(label, color), message);
    }

    /// Prints `[INFO] message`.
    pub fn info(&self, message: &str) {
        self.labeled("INFO", Style::Blue, message);
    }

    /// Prints `[OK] message`.
    pub fn success(&self, message: &str) {
        self.labeled("OK", Style::Green, message);
    }

    pub fn warning(&self, message: &str) {
        self.labeled("WARN", Style::Yellow, message);
    }

    pub fn step(&self, message: &str) {
        self.labeled("STEP", Style::Cyan, message);
    }

    /// Prints a section header in magenta bold.
    pub fn section(&self, message: &str) {
        println!();
        println!("{}", self.style(message, &[Style::Magenta, Style::Bold]));
    }

    /// Returns text styled as muted (dim gray).
    pub fn muted(&self, text: &str) -> String {
        self.style(text, &[Style::Gray, Style::Dim])
    }

    /// Formats a count with styling.
    pub fn count(&self, n: usize) -> String {
        self.style(&n.to_string(), &[Style::Green, Style::Bold])
    }

    /// Formats one row of a chapter list.
    ///
    /// Read chapters are muted; flags mark bookmarks (`*`), downloads (`D`)
    /// and unavailable chapters (`!`).
    pub fn chapter_line(&self, item: &ChapterItem) -> String {
        let chapter = &item.chapter;
        let number = chapter
            .chapter_number
            .map(|n| format!("{:>6}", n))
            .unwrap_or_else(|| format!("{:>6}", "?"));
        let flags: String = [
            (chapter.bookmark, '*'),
            (item.downloaded, 'D'),
            (chapter.unavailable, '!'),
        ]
        .iter()
        .map(|&(set, flag)| if set { flag } else { ' ' })
        .collect();

        let title = if chapter.name.is_empty() {
            chapter.chapter_txt.as_str()
        } else {
            chapter.name.as_str()
        };
        let scanlator = chapter
            .scanlator
            .as_deref()
            .map(|s| format!(" ({})", s))
            .unwrap_or_default();

        let line = format!("{} {} {}{}", number, flags, title, scanlator);
        if chapter.read {
            self.muted(&line)
        } else {
            line
        }
    }

    /// Prints the summary of a reconcile pass.
    pub fn reconcile_summary(&self, outcome: &ReconcileOutcome) {
        self.success(&format!(
            "{} new, {} removed ({} inserted, {} updated, {} deleted)",
            self.count(outcome.new_chapters.len()),
            self.count(outcome.removed_chapters.len()),
            outcome.inserted,
            outcome.updated,
            outcome.deleted
        ));
        for chapter in &outcome.new_chapters {
            self.info(&format!("New: {}", chapter.url));
        }
        for chapter in &outcome.removed_chapters {
            self.warning(&format!("Removed: {}", chapter.url));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ChapterRecord;

    #[test]
    fn test_style_disabled() {
        let console = Console::with_colors(false);
        assert_eq!(console.style("hello", &[Style::Yellow]), "hello");
    }

    #[test]
    fn test_style_enabled() {
        let console = Console::with_colors(true);
        let styled = console.style("hello", &[Style::Yellow]);
        assert!(styled.contains("\x1b[33m"));
        assert!(styled.contains("hello"));
        assert!(styled.contains(RESET));
    }

    #[test]
    fn test_label() {
        let console = Console::with_colors(false);
        assert_eq!(console.label("INFO", Style::Blue), "[INFO]");
    }

    #[test]
    fn test_chapter_line() {
        let console = Console::with_colors(false);
        let item = ChapterItem::new(
            ChapterRecord {
                chapter_number: Some(12.5),
                name: "Chapter 12.5".to_string(),
                scanlator: Some("Group A".to_string()),
                bookmark: true,
                ..Default::default()
            },
            true,
        );

        assert_eq!(console.chapter_line(&item), "  12.5 *D  Chapter 12.5 (Group A)");

        let unnumbered = ChapterItem::new(
            ChapterRecord {
                chapter_txt: "Oneshot".to_string(),
                ..Default::default()
            },
            false,
        );
        assert_eq!(console.chapter_line(&unnumbered), "     ?     Oneshot");
    }
}

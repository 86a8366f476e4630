//! Shared CLI output formatting with colors, symbols, and structured display.

use std::io::IsTerminal;

pub const ENV_JSON: &str = "SITEMAP_INDEXER_JSON";
pub const ENV_QUIET: &str = "SITEMAP_INDEXER_QUIET";
pub const ENV_VERBOSE: &str = "SITEMAP_INDEXER_VERBOSE";

/// Check if color output is enabled.
pub fn color_enabled() -> bool {
    // https://no-color.org/
    if std::env::var("NO_COLOR").is_ok() {
        return false;
    }
    std::io::stderr().is_terminal()
}

const GREEN: &str = "\x1b[32m";
const YELLOW: &str = "\x1b[33m";
const CYAN: &str = "\x1b[36m";
const DIM: &str = "\x1b[2m";
const BOLD: &str = "\x1b[1m";
const RESET: &str = "\x1b[0m";

/// Colored string builder.
pub struct Styled {
    use_color: bool,
}

impl Default for Styled {
    fn default() -> Self {
        Self::new()
    }
}

impl Styled {
    pub fn new() -> Self {
        Self {
            use_color: color_enabled(),
        }
    }

    /// Green checkmark symbol.
    pub fn ok_sym(&self) -> &str {
        if self.use_color {
            "\x1b[32m\u{2713}\x1b[0m"
        } else {
            "OK"
        }
    }

    /// Yellow warning symbol.
    pub fn warn_sym(&self) -> &str {
        if self.use_color {
            "\x1b[33m\u{26a0}\x1b[0m"
        } else {
            "??"
        }
    }

    /// Blue circle (info/neutral) symbol.
    pub fn info_sym(&self) -> &str {
        if self.use_color {
            "\x1b[34m\u{25cb}\x1b[0m"
        } else {
            "--"
        }
    }

    pub fn green(&self, s: &str) -> String {
        self.paint(GREEN, s)
    }

    pub fn yellow(&self, s: &str) -> String {
        self.paint(YELLOW, s)
    }

    pub fn cyan(&self, s: &str) -> String {
        self.paint(CYAN, s)
    }

    pub fn dim(&self, s: &str) -> String {
        self.paint(DIM, s)
    }

    pub fn bold(&self, s: &str) -> String {
        self.paint(BOLD, s)
    }

    fn paint(&self, code: &str, s: &str) -> String {
        if self.use_color {
            format!("{code}{s}{RESET}")
        } else {
            s.to_string()
        }
    }
}

/// Print a section header.
pub fn print_section(s: &Styled, title: &str) {
    eprintln!("  {}", s.bold(title));
}

/// Print a check result line with symbol and label/value.
pub fn print_check(symbol: &str, label: &str, value: &str) {
    eprintln!("    {symbol} {label:<24} {value}");
}

/// Format milliseconds for humans (e.g. "840ms", "12.4s", "2m 5s").
pub fn format_elapsed(ms: u64) -> String {
    if ms < 1000 {
        format!("{ms}ms")
    } else if ms < 60_000 {
        format!("{:.1}s", ms as f64 / 1000.0)
    } else {
        let secs = ms / 1000;
        format!("{}m {}s", secs / 60, secs % 60)
    }
}

/// Simple progress bar string.
pub fn progress_bar(current: u64, total: u64, width: usize) -> String {
    if total == 0 {
        return format!("[{}]", " ".repeat(width));
    }
    let current = current.min(total);
    let filled = ((current * width as u64) / total) as usize;
    let empty = width - filled;
    let pct = (current * 100) / total;
    format!(
        "[{}{}] {pct}%",
        "\u{2588}".repeat(filled),
        "\u{2591}".repeat(empty)
    )
}

/// Check if --quiet mode is active.
pub fn is_quiet() -> bool {
    std::env::var(ENV_QUIET).is_ok()
}

/// Check if --verbose mode is active.
pub fn is_verbose() -> bool {
    std::env::var(ENV_VERBOSE).is_ok()
}

/// Check if --json mode is active.
pub fn is_json() -> bool {
    std::env::var(ENV_JSON).is_ok()
}

/// Print JSON output to stdout.
pub fn print_json(value: &serde_json::Value) {
    if let Ok(s) = serde_json::to_string_pretty(value) {
        println!("{s}");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_elapsed() {
        assert_eq!(format_elapsed(840), "840ms");
        assert_eq!(format_elapsed(12_400), "12.4s");
        assert_eq!(format_elapsed(125_000), "2m 5s");
    }

    #[test]
    fn test_progress_bar() {
        assert_eq!(progress_bar(0, 0, 4), "[    ]");
        assert_eq!(
            progress_bar(50, 100, 4),
            "[\u{2588}\u{2588}\u{2591}\u{2591}] 50%"
        );
        assert!(progress_bar(200, 100, 4).ends_with("100%"));
    }

    #[test]
    fn test_plain_styling() {
        let s = Styled { use_color: false };
        assert_eq!(s.ok_sym(), "OK");
        assert_eq!(s.bold("x"), "x");
    }
}

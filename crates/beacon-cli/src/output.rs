//! Output formatting for the CLI.

use clap::ValueEnum;
use serde::Serialize;

/// Output format.
#[derive(Debug, Clone, Copy, Default, ValueEnum)]
pub enum OutputFormat {
    #[default]
    Text,
    Json,
}

/// Print a report in the specified format.
pub fn print<T: Serialize + std::fmt::Display>(value: &T, format: &OutputFormat) {
    match format {
        OutputFormat::Text => println!("{}", value),
        OutputFormat::Json => match serde_json::to_string_pretty(value) {
            Ok(json) => println!("{}", json),
            Err(_) => println!("{}", value),
        },
    }
}

/// Print an error message.
pub fn print_error(message: &str, format: &OutputFormat) {
    match format {
        OutputFormat::Text => eprintln!("Error: {}", message),
        OutputFormat::Json => {
            let body = serde_json::json!({ "status": "error", "message": message });
            eprintln!("{}", body);
        }
    }
}

/// Format a labelled row.
pub fn row(label: &str, value: impl std::fmt::Display) -> String {
    format!("  {:<16} {}", format!("{}:", label), value)
}

/// Hide all but the last four characters of a secret.
pub fn mask(secret: &str) -> String {
    let chars: Vec<char> = secret.chars().collect();
    if chars.is_empty() {
        return "(not set)".to_string();
    }
    if chars.len() <= 4 {
        return "*".repeat(chars.len());
    }
    let visible: String = chars[chars.len() - 4..].iter().collect();
    format!("{}{}", "*".repeat(chars.len() - 4), visible)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mask() {
        assert_eq!(mask(""), "(not set)");
        assert_eq!(mask("abc"), "***");
        assert_eq!(mask("phc_12345678"), "********5678");
    }

    #[test]
    fn test_row_alignment() {
        assert_eq!(row("Pending", 3), "  Pending:         3");
    }
}

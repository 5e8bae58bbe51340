//! Styled terminal output utilities.

use owo_colors::OwoColorize;

use tidemark_core::{InfoRow, RowState};

/// Print a header/title
pub fn header(text: &str) {
    println!();
    println!("{}", text.bold().cyan());
    println!("{}", "─".repeat(text.len()).dimmed());
    println!();
}

/// Print a key-value pair
pub fn kv(key: &str, value: &str) {
    println!("  {}: {}", key.dimmed(), value);
}

/// Print a success message
pub fn success(text: &str) {
    println!("{} {}", "✔".green().bold(), text.green());
}

/// Print an info message
pub fn info(text: &str) {
    println!("{} {}", "ℹ".blue().bold(), text);
}

/// Print a warning message
pub fn warn(text: &str) {
    println!("{} {}", "⚠".yellow().bold(), text.yellow());
}

/// Print an error message
pub fn error(text: &str) {
    eprintln!("{} {}", "✖".red().bold(), text.red());
}

/// Print a list item
pub fn list_item(text: &str) {
    println!("  {} {}", "•".dimmed(), text);
}

/// Print a newline
pub fn newline() {
    println!();
}

/// Render the info listing as an aligned table.
pub fn info_table(rows: &[InfoRow]) {
    let headers = [
        "Id",
        "Version",
        "Category",
        "Description",
        "Installed on",
        "Installed by",
        "State",
        "Checksum",
    ];
    let cells: Vec<[String; 8]> = rows.iter().map(row_cells).collect();

    let mut widths: Vec<usize> = headers.iter().map(|h| h.len()).collect();
    for row in &cells {
        for (i, cell) in row.iter().enumerate() {
            widths[i] = widths[i].max(cell.len());
        }
    }

    print_separator(&widths);
    let header_line = headers
        .iter()
        .enumerate()
        .map(|(i, h)| format!("{:width$}", h, width = widths[i]))
        .collect::<Vec<_>>()
        .join(" | ");
    println!("| {} |", header_line.bold());
    print_separator(&widths);
    for (row, info) in cells.iter().zip(rows) {
        let line = row
            .iter()
            .enumerate()
            .map(|(i, cell)| format!("{:width$}", cell, width = widths[i]))
            .collect::<Vec<_>>()
            .join(" | ");
        println!("| {} |", paint_state(&line, info.state));
    }
    print_separator(&widths);
}

fn row_cells(row: &InfoRow) -> [String; 8] {
    [
        row.id.map(|id| id.to_string()).unwrap_or_default(),
        row.version.clone(),
        row.category.clone(),
        truncate(&row.description, 40),
        row.installed_on
            .map(|t| t.format("%Y-%m-%d %H:%M:%S").to_string())
            .unwrap_or_default(),
        row.installed_by.clone(),
        row.state.to_string(),
        truncate(&row.checksum, 12),
    ]
}

fn paint_state(line: &str, state: RowState) -> String {
    match state {
        RowState::Success => line.to_string(),
        RowState::Pending => line.yellow().to_string(),
        RowState::Failed => line.red().to_string(),
        RowState::Lost => line.magenta().to_string(),
        RowState::Ignored => line.dimmed().to_string(),
    }
}

fn print_separator(widths: &[usize]) {
    let line = widths
        .iter()
        .map(|w| "-".repeat(w + 2))
        .collect::<Vec<_>>()
        .join("+");
    println!("+{line}+");
}

fn truncate(text: &str, max: usize) -> String {
    if text.chars().count() <= max {
        text.to_string()
    } else {
        let cut: String = text.chars().take(max.saturating_sub(1)).collect();
        format!("{cut}…")
    }
}

/// Ask for confirmation
pub fn confirm(prompt: &str) -> bool {
    use std::io::{self, Write};

    print!("{} {} ", prompt, "[y/N]".dimmed());
    io::stdout().flush().ok();

    let mut input = String::new();
    if io::stdin().read_line(&mut input).is_err() {
        return false;
    }
    matches!(input.trim().to_lowercase().as_str(), "y" | "yes")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_truncate() {
        assert_eq!(truncate("short", 10), "short");
        assert_eq!(truncate("a".repeat(50).as_str(), 5), "aaaa…");
    }
}

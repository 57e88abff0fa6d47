/// Terminal output helpers shared by the commands
use colored::*;
use comfy_table::modifiers::UTF8_ROUND_CORNERS;
use comfy_table::presets::UTF8_FULL;
use comfy_table::{Attribute, Cell, Color as TableColor, ContentArrangement, Table};

/// Check if colors should be disabled
pub fn colors_enabled() -> bool {
    std::env::var("NO_COLOR").is_err()
        && std::env::var("CLICOLOR").unwrap_or_else(|_| "1".to_string()) != "0"
}

pub fn section_header(title: &str) {
    println!("\n{} {}", "▶".cyan().bold(), title.bold());
}

pub fn success(message: &str) {
    println!("{} {}", "✓".green().bold(), message);
}

pub fn warning(message: &str) {
    println!("{} {}", "⚠".yellow().bold(), message);
}

pub fn failure(message: &str) {
    println!("{} {}", "✗".red().bold(), message);
}

pub fn info(message: &str) {
    println!("{} {}", "●".cyan(), message);
}

/// Rounded table with a bold cyan header row
pub fn styled_table(headers: &[&str]) -> Table {
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .apply_modifier(UTF8_ROUND_CORNERS)
        .set_content_arrangement(ContentArrangement::Dynamic);
    if colors_enabled() {
        table.set_header(
            headers
                .iter()
                .map(|h| Cell::new(h).add_attribute(Attribute::Bold).fg(TableColor::Cyan)),
        );
    } else {
        table.set_header(headers.iter().map(Cell::new));
    }
    table
}

/// Print a two-column label/value table
pub fn print_stats_table(title: &str, stats: Vec<(&str, String)>) {
    let mut table = styled_table(&[title, ""]);
    for (label, value) in stats {
        table.add_row(vec![Cell::new(label), Cell::new(value).fg(TableColor::Green)]);
    }
    println!("\n{}", table);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_styled_table_has_header() {
        let mut table = styled_table(&["Step", "Stage"]);
        table.add_row(vec!["1", "dbcan"]);
        let rendered = table.to_string();
        assert!(rendered.contains("Step"));
        assert!(rendered.contains("dbcan"));
    }
}

//! Section header formatting.

use owo_colors::OwoColorize;

#[derive(Debug, Clone, Copy)]
pub enum SectionStyle {
    Primary,
    Success,
    Error,
}

impl SectionStyle {
    fn colorize(&self, text: &str) -> String {
        match self {
            SectionStyle::Primary => text.cyan().bold().to_string(),
            SectionStyle::Success => text.green().bold().to_string(),
            SectionStyle::Error => text.red().bold().to_string(),
        }
    }
}

pub fn print_section_header(title: &str, style: SectionStyle) {
    println!("{}", style.colorize(title));
    println!();
}

/// Prints a section header with a dimmed subtitle, e.g. the workspace root.
pub fn print_section_header_with_subtitle(title: &str, subtitle: &str, style: SectionStyle) {
    println!("{}", style.colorize(title));
    println!("  {}", subtitle.bright_black());
    println!();
}

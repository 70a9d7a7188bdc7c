//! Status indicators and message formatting.

use owo_colors::OwoColorize;
use strata_core::TaskStatus;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    Success,
    Skipped,
    Error,
    Warning,
}

impl Status {
    pub fn symbol(&self) -> &'static str {
        match self {
            Status::Success => "✓",
            Status::Skipped => "↷",
            Status::Error => "✗",
            Status::Warning => "⚠",
        }
    }

    pub fn colored_symbol(&self) -> String {
        match self {
            Status::Success => self.symbol().green().to_string(),
            Status::Skipped => self.symbol().bright_black().to_string(),
            Status::Error => self.symbol().red().to_string(),
            Status::Warning => self.symbol().yellow().to_string(),
        }
    }

    pub fn color(&self) -> comfy_table::Color {
        match self {
            Status::Success => comfy_table::Color::Green,
            Status::Skipped => comfy_table::Color::DarkGrey,
            Status::Error => comfy_table::Color::Red,
            Status::Warning => comfy_table::Color::Yellow,
        }
    }

    pub fn format(&self, message: &str) -> String {
        format!("{} {}", self.colored_symbol(), self.colorize_text(message))
    }

    fn colorize_text(&self, text: &str) -> String {
        match self {
            Status::Success => text.green().bold().to_string(),
            Status::Skipped => text.bright_black().to_string(),
            Status::Error => text.red().bold().to_string(),
            Status::Warning => text.yellow().bold().to_string(),
        }
    }
}

impl From<TaskStatus> for Status {
    fn from(status: TaskStatus) -> Self {
        match status {
            TaskStatus::Succeeded => Status::Success,
            TaskStatus::Skipped => Status::Skipped,
            TaskStatus::Failed => Status::Error,
            TaskStatus::Blocked
            | TaskStatus::Cancelled
            | TaskStatus::Pending
            | TaskStatus::Running => Status::Warning,
        }
    }
}

pub fn print_success(message: &str) {
    println!("  {}", Status::Success.format(message));
}

pub fn print_error(message: &str) {
    println!("  {}", Status::Error.format(message));
}

pub fn print_warning(message: &str) {
    println!("  {}", Status::Warning.format(message));
}

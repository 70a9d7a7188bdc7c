//! CLI output formatting.
//!
//! Colors, visual hierarchy and tables shared by every command.

mod headers;
mod output;
mod progress;
mod status;
mod tables;

pub use headers::{print_section_header, print_section_header_with_subtitle, SectionStyle};
pub use output::{format_duration, print_key_value, print_separator_with_spacing, print_summary_box};
pub use progress::create_progress_bar;
pub use status::{print_error, print_success, print_warning, Status};
pub use tables::{
    print_package_list, print_package_table, print_plan_table, print_task_order_table,
    print_task_results, print_violation_table,
};

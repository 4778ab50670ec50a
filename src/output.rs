//! CLI output formatting.
//!
//! Each command has a `format_*` function returning lines, for testability,
//! and a `print_*` wrapper that writes them to stdout. Format functions are
//! pure: no I/O, no side effects.
//!
//! # Output Format
//!
//! ## Run
//!
//! ```text
//! display: 431432
//! label: FAILED tesseract is not available: ...
//! ```
//!
//! ## Versions
//!
//! ```text
//! tesseract 5.3.0
//!     Executable: tesseract
//!     Languages: eng, osd
//! ssocr not available
//!     Executable: /opt/ssocr/ssocr
//!     ssocr is not available: ...
//! ```

use crate::engine::EngineReport;
use crate::parameters::RoiOutcome;

fn indent(depth: usize) -> String {
    "    ".repeat(depth)
}

/// One line per ROI. Multi-line text is kept on one line with `\n` shown
/// as ` | ` so the output stays greppable by name.
pub fn format_run_results(outcomes: &[RoiOutcome]) -> Vec<String> {
    outcomes
        .iter()
        .map(|outcome| match &outcome.text {
            Ok(text) => format!("{}: {}", outcome.name, text.lines().collect::<Vec<_>>().join(" | ")),
            Err(e) => format!("{}: FAILED {e}", outcome.name),
        })
        .collect()
}

pub fn print_run_results(outcomes: &[RoiOutcome]) {
    for line in format_run_results(outcomes) {
        println!("{line}");
    }
}

pub fn format_versions(reports: &[EngineReport]) -> Vec<String> {
    let mut lines = Vec::new();
    for report in reports {
        match &report.version {
            Ok(version) => lines.push(format!("{} {version}", report.name)),
            Err(_) => lines.push(format!("{} not available", report.name)),
        }
        lines.push(format!(
            "{}Executable: {}",
            indent(1),
            report.executable.display()
        ));
        if let Err(reason) = &report.version {
            lines.push(format!("{}{reason}", indent(1)));
            continue;
        }
        match &report.languages {
            Some(Ok(languages)) if languages.is_empty() => {
                lines.push(format!("{}Languages: none installed", indent(1)))
            }
            Some(Ok(languages)) => {
                lines.push(format!("{}Languages: {}", indent(1), languages.join(", ")))
            }
            Some(Err(reason)) => lines.push(format!("{}Languages: {reason}", indent(1))),
            None => {}
        }
    }
    lines
}

pub fn print_versions(reports: &[EngineReport]) {
    for line in format_versions(reports) {
        println!("{line}");
    }
}

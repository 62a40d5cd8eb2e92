//! Result rendering, size bounding and exit codes.

mod render;
mod truncate;

pub use render::{columns, render, render_csv, render_jsonl, render_markdown, render_toon};
pub use truncate::{
    insert_cursor_in_toon_truncation, truncate_bytes, truncate_csv, truncate_jsonl,
    truncate_markdown, truncate_toon, Truncation, BYTE_TRUNCATION_SUFFIX,
};

use serde::{Deserialize, Serialize};

/// Process exit status for success.
pub const EXIT_SUCCESS: u8 = 0;
/// Process exit status for execution failures.
pub const EXIT_ERROR: u8 = 1;
/// Process exit status for parse, validation and cursor errors.
pub const EXIT_USAGE: u8 = 2;
/// Process exit status when primary output was truncated.
pub const EXIT_TRUNCATED: u8 = 100;

/// Output formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    /// Structured text envelope.
    #[default]
    Toon,
    Markdown,
    Jsonl,
    Csv,
}

impl OutputFormat {
    pub fn as_str(&self) -> &'static str {
        match self {
            OutputFormat::Toon => "toon",
            OutputFormat::Markdown => "markdown",
            OutputFormat::Jsonl => "jsonl",
            OutputFormat::Csv => "csv",
        }
    }
}

/// Truncate already-rendered output in the matching format.
pub fn truncate(
    content: &str,
    format: OutputFormat,
    max_bytes: usize,
    original_total: Option<usize>,
) -> Truncation {
    match format {
        OutputFormat::Toon => truncate_toon(content, max_bytes),
        OutputFormat::Markdown => truncate_markdown(content, max_bytes, original_total),
        OutputFormat::Jsonl => truncate_jsonl(content, max_bytes),
        OutputFormat::Csv => truncate_csv(content, max_bytes, original_total),
    }
}

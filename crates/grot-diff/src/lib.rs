//! Regular-file differencing.
//!
//! Implements the Hunt-McIlroy longest-common-subsequence algorithm
//! over line hashes: lines are bucketed into equivalence classes, the
//! candidate ("stone") pass computes the match vector, and every
//! tentative match is re-verified byte-by-byte to break spurious hash
//! collisions. Output comes in brief, normal, or unified form.

mod engine;

pub use engine::diffreg;

/// Behavior flags for a diff run.
#[derive(Debug, Clone, Copy, Default)]
pub struct DiffFlags {
    /// Fold upper case to lower case before comparing.
    pub ignore_case: bool,
    /// Treat runs of blanks as equal (-b).
    pub fold_blanks: bool,
    /// Ignore all blanks (-w).
    pub ignore_blanks: bool,
    /// Treat the inputs as text even if they look binary.
    pub force_ascii: bool,
    /// Expand tabs to spaces in output lines.
    pub expand_tabs: bool,
    /// Annotate hunk headers with the enclosing function prototype.
    pub prototype: bool,
    /// Print the recorded command line before the first change.
    pub print_header: bool,
    /// Diff against an empty left-hand side.
    pub empty_lhs: bool,
    /// Diff against an empty right-hand side.
    pub empty_rhs: bool,
    /// Spend whatever time it takes to find a minimal diff.
    pub minimal: bool,
}

/// Output format selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiffFormat {
    /// Report only whether the files differ.
    Brief,
    /// Classic ed-style change blocks with `<`/`>` lines.
    Normal,
    /// Unified hunks with context.
    Unified,
}

/// Per-run arguments.
#[derive(Debug, Clone)]
pub struct DiffArgs {
    pub format: DiffFormat,
    /// Context lines around unified hunks.
    pub context: usize,
    /// Label for the left file (`---` line).
    pub label_left: String,
    /// Label for the right file (`+++` line).
    pub label_right: String,
    /// Command line echoed when `print_header` is set.
    pub command_line: Option<String>,
}

impl DiffArgs {
    pub fn unified(label_left: impl Into<String>, label_right: impl Into<String>) -> Self {
        Self {
            format: DiffFormat::Unified,
            context: 3,
            label_left: label_left.into(),
            label_right: label_right.into(),
            command_line: None,
        }
    }
}

/// Overall outcome of a diff run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiffResult {
    /// The files are identical (no output produced).
    Same,
    /// The files differ; output was produced per the format.
    Differ,
    /// At least one file is binary; no line diff was attempted.
    Binary,
}

/// Errors produced by diff operations.
#[derive(Debug, thiserror::Error)]
pub enum DiffError {
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

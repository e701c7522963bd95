//! Tolerant parser for the model's free-text reply.
//!
//! The model is asked to answer with three labeled sections (`Chủ đề:`,
//! `Tóm tắt:`, `Kết luận:`) but nothing enforces it. The reply is scanned line
//! by line with a cursor on the current section:
//!
//! - a line starting with `<label>:` moves the cursor to that section; any text
//!   after the colon replaces what the section held so far
//! - any other non-blank line is appended (newline separated) to the section
//!   under the cursor, or dropped when no label has been seen yet
//!
//! Parsing never fails. Sections the reply never filled stay empty and are
//! reported by [`AnalysisResult::empty_sections`].

use crate::models::{AnalysisResult, Section};
use itertools::Itertools;
use tracing::{instrument, warn};

/// Parse a model reply into an [`AnalysisResult`].
#[instrument(level = "debug", skip_all, fields(reply_bytes = reply.len()))]
pub fn parse(reply: &str) -> AnalysisResult {
    let mut result = AnalysisResult::default();
    let mut current: Option<Section> = None;

    for line in reply.lines().map(str::trim).filter(|l| !l.is_empty()) {
        if let Some((section, rest)) = match_label(line) {
            current = Some(section);
            let rest = rest.trim();
            if !rest.is_empty() {
                *result.get_mut(section) = rest.to_string();
            }
            continue;
        }

        if let Some(section) = current {
            let text = result.get_mut(section);
            if !text.is_empty() {
                text.push('\n');
            }
            text.push_str(line);
        }
    }

    for section in Section::ALL {
        let text = result.get_mut(section);
        *text = text.trim().to_string();
    }

    let empty = result.empty_sections();
    if !empty.is_empty() {
        warn!(
            empty = %empty.iter().map(|s| s.key()).join(", "),
            "Model reply left sections empty"
        );
    }
    result
}

/// Match `line` against the section labels in [`Section::ALL`] order.
///
/// Returns the section and whatever follows `<label>:` on the line.
fn match_label(line: &str) -> Option<(Section, &str)> {
    Section::ALL.into_iter().find_map(|section| {
        line.strip_prefix(section.label())
            .and_then(|rest| rest.strip_prefix(':'))
            .map(|rest| (section, rest))
    })
}

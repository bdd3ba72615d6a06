//! Merging skill IDs into a block's `selection.enable` list.
//!
//! The list is located with a small state machine over the config lines:
//!
//! - `Searching`: looking for the `<name> = {` line of the target block,
//!   opened at depth 1 like every block [`extract_source_blocks`] reports.
//! - `InBlock`: inside the block, tracking depth, watching for
//!   `selection.enable = [` or the block's closing line.
//! - `InSelectionList`: collecting quoted items until a `];` line.
//!
//! An inline `selection.enable = [ "a" "b" ];` is read in one step while
//! in `InBlock`. Only the list's own lines are ever replaced.
//!
//! [`extract_source_blocks`]: crate::nixconf::extract_source_blocks

use std::collections::BTreeSet;
use std::sync::LazyLock;

use regex::Regex;

use crate::error::{Error, Result};
use crate::nixconf::blocks::block_open_name;
use crate::text::{brace_delta, indent_of, quoted_items, strip_comments_and_strings};

static SELECTION_OPEN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\s*selection\.enable\s*=\s*\[").expect("valid selection pattern")
});

static SELECTION_INLINE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\s*selection\.enable\s*=\s*\[.*\]\s*;\s*$").expect("valid inline pattern")
});

static LIST_CLOSE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\s*];\s*$").expect("valid list close pattern"));

/// Result of [`update_selection_in_lines`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MergeOutcome {
    pub lines: Vec<String>,
    /// Requested IDs that were not selected before, in request order.
    pub added: Vec<String>,
    /// Requested IDs that were already selected, in request order.
    pub already: Vec<String>,
    pub changed: bool,
}

/// Existing `selection.enable` list inside a block.
#[derive(Debug, Clone, PartialEq, Eq)]
struct ListSpan {
    /// First and last line of the list (equal for the inline form).
    start: usize,
    end: usize,
    indent: String,
    /// Indentation of the first item line, multi-line form only.
    item_indent: Option<String>,
    items: Vec<String>,
}

/// Where the target block and its list sit in the lines.
#[derive(Debug, Clone, PartialEq, Eq)]
struct SelectionLayout {
    block_indent: String,
    block_end: usize,
    list: Option<ListSpan>,
}

enum ScanState {
    Searching,
    InBlock {
        depth: isize,
    },
    InSelectionList {
        depth: isize,
        start: usize,
        indent: String,
        item_indent: Option<String>,
        items: Vec<String>,
    },
}

fn scan_selection(lines: &[String], source_name: &str) -> Result<SelectionLayout> {
    let mut state = ScanState::Searching;
    let mut top_depth: isize = 0;
    let mut block_indent = String::new();
    let mut list: Option<ListSpan> = None;

    for (i, line) in lines.iter().enumerate() {
        state = match state {
            ScanState::Searching => {
                if top_depth == 1 && block_open_name(line).as_deref() == Some(source_name) {
                    block_indent = indent_of(line).to_string();
                    ScanState::InBlock {
                        depth: brace_delta(line),
                    }
                } else {
                    top_depth += brace_delta(line);
                    ScanState::Searching
                }
            }
            ScanState::InBlock { depth } => {
                let clean = strip_comments_and_strings(line);
                if list.is_none() && SELECTION_OPEN.is_match(&clean) {
                    let after_bracket = line.split_once('[').map(|(_, rest)| rest).unwrap_or("");
                    let items = quoted_items(after_bracket);
                    if SELECTION_INLINE.is_match(&clean) {
                        list = Some(ListSpan {
                            start: i,
                            end: i,
                            indent: indent_of(line).to_string(),
                            item_indent: None,
                            items,
                        });
                        ScanState::InBlock { depth }
                    } else {
                        ScanState::InSelectionList {
                            depth,
                            start: i,
                            indent: indent_of(line).to_string(),
                            item_indent: None,
                            items,
                        }
                    }
                } else {
                    let depth = depth + brace_delta(line);
                    if depth <= 0 {
                        return Ok(SelectionLayout {
                            block_indent,
                            block_end: i,
                            list,
                        });
                    }
                    ScanState::InBlock { depth }
                }
            }
            ScanState::InSelectionList {
                depth,
                start,
                indent,
                mut item_indent,
                mut items,
            } => {
                if LIST_CLOSE.is_match(line) {
                    list = Some(ListSpan {
                        start,
                        end: i,
                        indent,
                        item_indent,
                        items,
                    });
                    ScanState::InBlock { depth }
                } else {
                    let found = quoted_items(line);
                    if item_indent.is_none() && !found.is_empty() {
                        item_indent = Some(indent_of(line).to_string());
                    }
                    items.extend(found);
                    ScanState::InSelectionList {
                        depth,
                        start,
                        indent,
                        item_indent,
                        items,
                    }
                }
            }
        };
    }

    match state {
        ScanState::Searching => Err(Error::Structure(format!(
            "source block '{source_name}' not found"
        ))),
        ScanState::InBlock { .. } => Err(Error::Structure(format!(
            "could not find the end of source block '{source_name}'"
        ))),
        ScanState::InSelectionList { .. } => Err(Error::Structure(format!(
            "unterminated selection.enable list in source block '{source_name}'"
        ))),
    }
}

/// Render a `selection.enable` list with one item per line.
pub fn render_selection(indent: &str, item_indent: &str, items: &[String]) -> Vec<String> {
    if items.is_empty() {
        return vec![format!("{indent}selection.enable = [ ];")];
    }
    let mut out = Vec::with_capacity(items.len() + 2);
    out.push(format!("{indent}selection.enable = ["));
    out.extend(items.iter().map(|item| format!("{item_indent}\"{item}\"")));
    out.push(format!("{indent}];"));
    out
}

/// Merge `skills_to_add` into the selection list of `source_name`.
///
/// The merged list is sorted and deduplicated. When every requested ID is
/// already selected the lines come back untouched with `changed: false`.
/// Otherwise only the list's lines are replaced, or a new list is inserted
/// just before the block's closing line.
pub fn update_selection_in_lines(
    lines: &[String],
    source_name: &str,
    skills_to_add: &[String],
) -> Result<MergeOutcome> {
    let layout = scan_selection(lines, source_name)?;
    let existing: BTreeSet<String> = layout
        .list
        .as_ref()
        .map(|l| l.items.iter().cloned().collect())
        .unwrap_or_default();

    let mut added = Vec::new();
    let mut already = Vec::new();
    let mut seen = BTreeSet::new();
    for skill in skills_to_add {
        if !seen.insert(skill.as_str()) {
            continue;
        }
        if existing.contains(skill) {
            already.push(skill.clone());
        } else {
            added.push(skill.clone());
        }
    }

    if added.is_empty() {
        return Ok(MergeOutcome {
            lines: lines.to_vec(),
            added,
            already,
            changed: false,
        });
    }

    let merged: Vec<String> = existing
        .iter()
        .cloned()
        .chain(added.iter().cloned())
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect();

    let mut out = lines.to_vec();
    match &layout.list {
        Some(list) => {
            let item_indent = list
                .item_indent
                .clone()
                .unwrap_or_else(|| format!("{}  ", list.indent));
            let rendered = render_selection(&list.indent, &item_indent, &merged);
            out.splice(list.start..=list.end, rendered);
        }
        None => {
            let indent = format!("{}  ", layout.block_indent);
            let item_indent = format!("{}    ", layout.block_indent);
            let rendered = render_selection(&indent, &item_indent, &merged);
            out.splice(layout.block_end..layout.block_end, rendered);
        }
    }

    tracing::debug!(
        source = %source_name,
        added = added.len(),
        already = already.len(),
        "Merged selection list"
    );

    Ok(MergeOutcome {
        lines: out,
        added,
        already,
        changed: true,
    })
}

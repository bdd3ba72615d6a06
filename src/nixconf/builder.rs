//! Rendering and inserting brand-new source blocks.

use std::collections::{BTreeMap, BTreeSet};

use crate::error::{Error, Result};
use crate::nixconf::selection::render_selection;
use crate::source::{sanitize_name, unique_name};
use crate::text::brace_delta;

/// Everything needed to render a new source block.
#[derive(Debug, Clone)]
pub struct NewSource<'a> {
    pub name: &'a str,
    pub url: &'a str,
    pub flake: bool,
    pub base_dir: &'a str,
    pub catalogs: &'a BTreeMap<String, String>,
    pub selection: &'a [String],
    /// Indentation of the block's opening line.
    pub indent: &'a str,
}

/// Render a block in canonical form: url, flake, baseDir, catalogs, selection.
///
/// Catalog keys and selection entries come out sorted. Values are quoted
/// verbatim; embedded `"` is not escaped.
pub fn build_source_block(source: &NewSource<'_>) -> Vec<String> {
    let outer = source.indent;
    let inner = format!("{outer}  ");
    let nested = format!("{outer}    ");

    let mut lines = vec![
        format!("{outer}{} = {{", source.name),
        format!("{inner}url = \"{}\";", source.url),
        format!("{inner}flake = {};", source.flake),
        format!("{inner}baseDir = \"{}\";", source.base_dir),
        format!("{inner}catalogs = {{"),
    ];
    for (key, path) in source.catalogs {
        lines.push(format!("{nested}{key} = \"{path}\";"));
    }
    lines.push(format!("{inner}}};"));

    let mut selection: Vec<String> = source.selection.to_vec();
    selection.sort();
    selection.dedup();
    lines.extend(render_selection(&inner, &nested, &selection));

    lines.push(format!("{outer}}};"));
    lines
}

/// Splice `block_lines` in front of the line that closes the top-level set.
///
/// That is the last line where the running depth drops from positive back
/// to zero. A set written on a single line (`{ }`) is split at its final
/// `}` first.
pub fn insert_source_block(lines: &[String], block_lines: &[String]) -> Result<Vec<String>> {
    let mut depth: isize = 0;
    let mut close: Option<usize> = None;

    for (i, line) in lines.iter().enumerate() {
        let before = depth;
        depth += brace_delta(line);
        if before > 0 && depth == 0 {
            close = Some(i);
        }
    }

    let mut out = Vec::with_capacity(lines.len() + block_lines.len() + 1);
    if let Some(close) = close {
        out.extend_from_slice(&lines[..close]);
        out.extend_from_slice(block_lines);
        out.extend_from_slice(&lines[close..]);
        return Ok(out);
    }

    let (i, cut) = lines
        .iter()
        .enumerate()
        .rev()
        .find_map(|(i, line)| one_line_set_close(line).map(|cut| (i, cut)))
        .ok_or_else(|| {
            Error::Structure("could not find the closing brace of the top-level set".to_string())
        })?;
    let (head, tail) = lines[i].split_at(cut);
    out.extend_from_slice(&lines[..i]);
    out.push(head.trim_end().to_string());
    out.extend_from_slice(block_lines);
    out.push(tail.to_string());
    out.extend_from_slice(&lines[i + 1..]);
    Ok(out)
}

/// Byte offset of the final `}` of a balanced one-line set without
/// strings or comments.
fn one_line_set_close(line: &str) -> Option<usize> {
    let trimmed = line.trim();
    if line.contains(['"', '#'])
        || !trimmed.starts_with('{')
        || !trimmed.ends_with('}')
        || brace_delta(line) != 0
    {
        return None;
    }
    line.rfind('}')
}

/// `baseDir` plus catalog map for a new source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CatalogLayout {
    pub base_dir: String,
    pub catalogs: BTreeMap<String, String>,
}

/// Pick a primary skill root and name a catalog for every root.
///
/// Primary root precedence: `skills`, the only root, the repository root
/// `.`, then the first root. The primary catalog is keyed by the source
/// name; others get `<source>-<suffix>` where the suffix is the root path
/// relative to the primary root, squeezed to `[a-z0-9-]`.
pub fn derive_catalogs(source_name: &str, skill_roots: &[String]) -> CatalogLayout {
    let primary = if skill_roots.iter().any(|r| r == "skills") {
        "skills".to_string()
    } else if skill_roots.len() == 1 {
        skill_roots[0].clone()
    } else if skill_roots.iter().any(|r| r == ".") {
        ".".to_string()
    } else {
        skill_roots
            .first()
            .cloned()
            .unwrap_or_else(|| ".".to_string())
    };

    let mut catalogs = BTreeMap::new();
    let mut used = BTreeSet::new();
    catalogs.insert(source_name.to_string(), primary.clone());
    used.insert(source_name.to_string());

    for root in skill_roots {
        if *root == primary {
            continue;
        }
        let relative = if primary == "." {
            root.as_str()
        } else {
            root.strip_prefix(&format!("{primary}/"))
                .unwrap_or(root.as_str())
        };
        let suffix = if relative == "." {
            "root".to_string()
        } else {
            sanitize_name(&relative.replace('/', "-"))
        };
        let key = unique_name(&format!("{source_name}-{suffix}"), &used);
        used.insert(key.clone());
        catalogs.insert(key, root.clone());
    }

    CatalogLayout {
        base_dir: primary,
        catalogs,
    }
}

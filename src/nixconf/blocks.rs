//! Source block extraction.

use std::sync::LazyLock;

use regex::Regex;

use crate::text::{brace_delta, indent_of, strip_comments_and_strings};

/// `<ident> = {` alone on a line (after comments are stripped).
static BLOCK_OPEN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\s*([A-Za-z0-9_-]+)\s*=\s*\{\s*$").expect("valid block pattern")
});

static URL_LINE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"^\s*url\s*=\s*"([^"]*)"\s*;"#).expect("valid url pattern")
});

static FLAKE_LINE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\s*flake\s*=\s*(true|false)\s*;").expect("valid flake pattern")
});

/// One top-level source block as found in the config text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceBlock {
    pub name: String,
    /// Line index of `<name> = {`.
    pub start: usize,
    /// Line index of the block's closing `};`.
    pub end: usize,
    /// Indentation of the opening line.
    pub indent: String,
    pub url: Option<String>,
    pub flake: Option<bool>,
}

/// Config text split into lines plus the blocks found in it.
///
/// `lines` carry no `\r`; [`ExtractedConfig::render`] puts the file's line
/// ending back.
#[derive(Debug, Clone)]
pub struct ExtractedConfig {
    pub lines: Vec<String>,
    pub sources: Vec<SourceBlock>,
    pub newline: &'static str,
}

impl ExtractedConfig {
    /// Join edited lines with the line ending of the original text.
    pub fn render(&self, lines: &[String]) -> String {
        lines.join(self.newline)
    }

    pub fn find(&self, name: &str) -> Option<&SourceBlock> {
        self.sources.iter().find(|s| s.name == name)
    }

    /// Indentation used by existing blocks, or two spaces for an empty config.
    pub fn block_indent(&self) -> String {
        self.sources
            .first()
            .map(|s| s.indent.clone())
            .unwrap_or_else(|| "  ".to_string())
    }
}

/// Split text on `\n`. A trailing newline leaves a final empty element so
/// [`join_lines`] reproduces the input exactly.
pub fn split_lines(text: &str) -> Vec<String> {
    text.split('\n').map(str::to_string).collect()
}

pub fn join_lines(lines: &[String]) -> String {
    lines.join("\n")
}

/// `\r\n` if the text uses it anywhere, else `\n`.
pub fn line_ending(text: &str) -> &'static str {
    if text.contains("\r\n") { "\r\n" } else { "\n" }
}

/// Block name if `line` opens a block (`<ident> = {`).
pub(crate) fn block_open_name(line: &str) -> Option<String> {
    let clean = strip_comments_and_strings(line);
    BLOCK_OPEN
        .captures(&clean)
        .map(|caps| caps[1].to_string())
}

/// Scan the config for blocks opened at depth 1.
///
/// Depth counts every `{`/`}` outside strings and comments from the start
/// of the file. A block opens on a `<ident> = {` line seen at depth 1 and
/// closes on the line that brings the depth back to 1.
pub fn extract_source_blocks(config_text: &str) -> ExtractedConfig {
    let newline = line_ending(config_text);
    let lines: Vec<String> = split_lines(config_text)
        .into_iter()
        .map(|mut line| {
            if line.ends_with('\r') {
                line.pop();
            }
            line
        })
        .collect();
    let mut sources = Vec::new();
    let mut depth: isize = 0;
    let mut current: Option<SourceBlock> = None;

    for (i, line) in lines.iter().enumerate() {
        if let Some(block) = current.as_mut() {
            if block.url.is_none()
                && let Some(caps) = URL_LINE.captures(line)
            {
                block.url = Some(caps[1].to_string());
            }
            if block.flake.is_none()
                && let Some(caps) = FLAKE_LINE.captures(&strip_comments_and_strings(line))
            {
                block.flake = Some(&caps[1] == "true");
            }
        } else if depth == 1
            && let Some(name) = block_open_name(line)
        {
            current = Some(SourceBlock {
                name,
                start: i,
                end: i,
                indent: indent_of(line).to_string(),
                url: None,
                flake: None,
            });
        }

        depth += brace_delta(line);

        if depth < 1 {
            if let Some(block) = current.take() {
                tracing::debug!(name = %block.name, line = i, "Dropping unterminated block");
            }
        } else if depth == 1
            && let Some(mut block) = current.take()
        {
            block.end = i;
            tracing::debug!(name = %block.name, start = block.start, end = i, "Found source block");
            sources.push(block);
        }
    }

    ExtractedConfig {
        lines,
        sources,
        newline,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"{
  # curated upstream skills
  anthropic = {
    url = "github:anthropics/skills"; # main repo
    flake = false;
    baseDir = "skills";
    catalogs = {
      anthropic = "skills";
      anthropic-curated = "skills/.curated"; # nested {
    };
    selection.enable = [
      "pdf"
    ];
  };

  local-tools = {
    flake = true;
    url = "path:./vendor/tools";
  };
}
"#;

    #[test]
    fn extracts_blocks_in_order() {
        let cfg = extract_source_blocks(SAMPLE);
        let names: Vec<&str> = cfg.sources.iter().map(|s| s.name.as_str()).collect();
        assert_eq!(names, vec!["anthropic", "local-tools"]);

        let first = &cfg.sources[0];
        assert_eq!(first.url.as_deref(), Some("github:anthropics/skills"));
        assert_eq!(first.flake, Some(false));
        assert_eq!(first.start, 2);
        assert_eq!(first.end, 13);
        assert_eq!(first.indent, "  ");

        let second = &cfg.sources[1];
        assert_eq!(second.url.as_deref(), Some("path:./vendor/tools"));
        assert_eq!(second.flake, Some(true));
        assert_eq!(cfg.lines[second.end].trim(), "};");
    }

    #[test]
    fn nested_mappings_are_not_blocks() {
        let cfg = extract_source_blocks(SAMPLE);
        assert!(cfg.find("catalogs").is_none());
    }

    #[test]
    fn missing_fields_stay_none() {
        let cfg = extract_source_blocks("{\n  bare = {\n    baseDir = \".\";\n  };\n}\n");
        let block = cfg.find("bare").unwrap();
        assert_eq!(block.url, None);
        assert_eq!(block.flake, None);
    }

    #[test]
    fn empty_config_has_no_blocks() {
        let cfg = extract_source_blocks("{\n}\n");
        assert!(cfg.sources.is_empty());
        assert_eq!(cfg.block_indent(), "  ");
    }

    #[test]
    fn crlf_config_is_read_and_rendered_back() {
        let text = SAMPLE.replace('\n', "\r\n");
        let cfg = extract_source_blocks(&text);
        assert_eq!(cfg.newline, "\r\n");
        assert!(cfg.lines.iter().all(|l| !l.ends_with('\r')));
        assert_eq!(cfg.sources.len(), 2);
        assert_eq!(cfg.render(&cfg.lines), text);
    }

    #[test]
    fn split_and_join_round_trip_exactly() {
        assert_eq!(join_lines(&split_lines(SAMPLE)), SAMPLE);
        assert_eq!(join_lines(&split_lines("no newline")), "no newline");
    }
}

//! Keep the companion `flake.nix` inputs in step with the skills config.
//!
//! Every source block becomes a non-flake input inside a fenced region of
//! the flake's `inputs = { ... }` set. The region is regenerated as a whole
//! on every run; everything outside the markers is left alone.

use std::path::Path;
use std::process::Command;
use std::sync::LazyLock;

use regex::Regex;

use crate::error::{Error, Result};
use crate::nixconf::{SourceBlock, line_ending};
use crate::text::{brace_delta, indent_of, strip_comments_and_strings};

pub const START_MARKER: &str = "# >>> skills-add sources >>>";
pub const END_MARKER: &str = "# <<< skills-add sources <<<";
const HEADER: &str = "# Generated by skills-add from the skills config. Do not edit by hand.";

static INPUTS_OPEN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\s*inputs\s*=\s*\{").expect("valid inputs pattern"));

static INPUTS_EMPTY: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\s*inputs\s*=\s*\{\s*\}\s*;\s*$").expect("valid empty inputs pattern")
});

/// Render the fenced region, sources sorted by name.
///
/// Blocks without a `url` are skipped; a missing `flake` renders as `false`.
pub fn render_region(sources: &[SourceBlock], indent: &str) -> Vec<String> {
    let mut sorted: Vec<&SourceBlock> = sources.iter().collect();
    sorted.sort_by(|a, b| a.name.cmp(&b.name));

    let mut lines = vec![format!("{indent}{START_MARKER}"), format!("{indent}{HEADER}")];
    for source in sorted {
        let Some(url) = &source.url else {
            tracing::debug!(name = %source.name, "Source has no url, not synced");
            continue;
        };
        lines.push(format!("{indent}{} = {{", source.name));
        lines.push(format!("{indent}  url = \"{url}\";"));
        lines.push(format!("{indent}  flake = {};", source.flake.unwrap_or(false)));
        lines.push(format!("{indent}}};"));
    }
    lines.push(format!("{indent}{END_MARKER}"));
    lines
}

/// Line indices of `inputs = {` and of the line closing it.
fn locate_inputs(lines: &[String]) -> Result<(usize, usize)> {
    let open = lines
        .iter()
        .position(|l| INPUTS_OPEN.is_match(&strip_comments_and_strings(l)))
        .ok_or_else(|| Error::Structure("flake has no `inputs = {` set".to_string()))?;

    let mut depth: isize = 0;
    for (i, line) in lines.iter().enumerate().skip(open) {
        depth += brace_delta(line);
        if depth <= 0 {
            if i == open {
                break;
            }
            return Ok((open, i));
        }
    }
    Err(Error::Structure(
        "could not find the end of the flake `inputs` set".to_string(),
    ))
}

/// Regenerate the fenced region inside the flake's `inputs` set.
///
/// An existing region is replaced from its start marker through its end
/// marker, or through the line before the `inputs` close when the end
/// marker is gone. Without a region one is inserted before the close.
/// The file's line ending style (`\n` or `\r\n`) is kept.
pub fn sync_flake_text(flake_text: &str, sources: &[SourceBlock]) -> Result<String> {
    let newline = line_ending(flake_text);
    let mut lines: Vec<String> = flake_text
        .split('\n')
        .map(|l| l.strip_suffix('\r').unwrap_or(l).to_string())
        .collect();

    // `inputs = { };` on one line is opened up so the region has a home.
    if let Some(i) = lines
        .iter()
        .position(|l| INPUTS_EMPTY.is_match(&strip_comments_and_strings(l)))
    {
        let indent = indent_of(&lines[i]).to_string();
        lines.splice(i..=i, [format!("{indent}inputs = {{"), format!("{indent}}};")]);
    }

    let (open, close) = locate_inputs(&lines)?;
    let indent = format!("{}  ", indent_of(&lines[open]));
    let region = render_region(sources, &indent);

    let existing = (open + 1..close).find(|&i| lines[i].trim() == START_MARKER);
    match existing {
        Some(start) => {
            let end = (start + 1..close)
                .find(|&i| lines[i].trim() == END_MARKER)
                .unwrap_or(close - 1);
            tracing::debug!(start, end, "Replacing flake sources region");
            lines.splice(start..=end, region);
        }
        None => {
            tracing::debug!(line = close, "Inserting flake sources region");
            lines.splice(close..close, region);
        }
    }

    Ok(lines.join(newline))
}

/// Run an external sync command from `cwd`, inheriting stdio.
///
/// A non-zero exit becomes [`Error::SyncCommand`] carrying the exit code.
pub fn run_sync_command(argv: &[String], cwd: &Path) -> Result<()> {
    let Some((program, args)) = argv.split_first() else {
        return Ok(());
    };
    let command = argv.join(" ");
    tracing::info!(command = %command, "Running sync command");

    let status = Command::new(program)
        .args(args)
        .current_dir(cwd)
        .status()
        .map_err(|e| Error::Io {
            context: format!("failed to run sync command `{command}`"),
            source: e,
        })?;

    if !status.success() {
        return Err(Error::SyncCommand {
            command,
            code: status.code().unwrap_or(1),
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn block(name: &str, url: Option<&str>, flake: Option<bool>) -> SourceBlock {
        SourceBlock {
            name: name.to_string(),
            start: 0,
            end: 0,
            indent: "  ".to_string(),
            url: url.map(str::to_string),
            flake,
        }
    }

    const FLAKE: &str = r#"{
  description = "dotfiles";

  inputs = {
    nixpkgs.url = "github:NixOS/nixpkgs/nixos-unstable";
  };

  outputs = { self, nixpkgs, ... }: { };
}
"#;

    #[test]
    fn inserts_region_before_inputs_close() {
        let sources = vec![
            block("zeta", Some("github:z/z"), Some(true)),
            block("alpha", Some("github:a/a"), None),
        ];
        let out = sync_flake_text(FLAKE, &sources).unwrap();
        let expected = r#"{
  description = "dotfiles";

  inputs = {
    nixpkgs.url = "github:NixOS/nixpkgs/nixos-unstable";
    # >>> skills-add sources >>>
    # Generated by skills-add from the skills config. Do not edit by hand.
    alpha = {
      url = "github:a/a";
      flake = false;
    };
    zeta = {
      url = "github:z/z";
      flake = true;
    };
    # <<< skills-add sources <<<
  };

  outputs = { self, nixpkgs, ... }: { };
}
"#;
        assert_eq!(out, expected);
    }

    #[test]
    fn resync_is_stable() {
        let sources = vec![block("alpha", Some("github:a/a"), Some(false))];
        let once = sync_flake_text(FLAKE, &sources).unwrap();
        let twice = sync_flake_text(&once, &sources).unwrap();
        assert_eq!(once, twice);
    }

    #[test]
    fn replaces_existing_region() {
        let first = sync_flake_text(FLAKE, &[block("old", Some("github:o/o"), None)]).unwrap();
        let second = sync_flake_text(&first, &[block("new", Some("github:n/n"), None)]).unwrap();
        assert!(second.contains("new = {"));
        assert!(!second.contains("old = {"));
        assert_eq!(second.matches(START_MARKER).count(), 1);
        assert!(second.contains("nixpkgs.url"));
    }

    #[test]
    fn missing_end_marker_replaces_to_inputs_close() {
        let text = "{\n  inputs = {\n    # >>> skills-add sources >>>\n    stale = {\n      url = \"x\";\n    };\n  };\n}\n";
        let out = sync_flake_text(text, &[block("a", Some("github:a/a"), None)]).unwrap();
        assert!(!out.contains("stale"));
        assert!(out.contains(END_MARKER));
        assert!(out.ends_with("    # <<< skills-add sources <<<\n  };\n}\n"));
    }

    #[test]
    fn keeps_crlf_line_endings() {
        let text = FLAKE.replace('\n', "\r\n");
        let out = sync_flake_text(&text, &[block("a", Some("github:a/a"), None)]).unwrap();
        assert!(out.contains("    a = {\r\n"));
        assert_eq!(out.matches('\n').count(), out.matches("\r\n").count());
    }

    #[test]
    fn opens_up_empty_inputs() {
        let text = "{\n  inputs = { };\n  outputs = _: { };\n}\n";
        let out = sync_flake_text(text, &[block("a", Some("github:a/a"), None)]).unwrap();
        assert!(out.starts_with("{\n  inputs = {\n    # >>> skills-add sources >>>\n"));
        assert!(out.contains("    # <<< skills-add sources <<<\n  };\n  outputs"));
    }

    #[test]
    fn sources_without_url_are_skipped() {
        let out = sync_flake_text(FLAKE, &[block("nourl", None, None)]).unwrap();
        assert!(!out.contains("nourl"));
        assert!(out.contains(START_MARKER));
    }

    #[test]
    fn flake_without_inputs_fails() {
        let err = sync_flake_text("{ outputs = _: { }; }\n", &[]).unwrap_err();
        assert!(matches!(err, Error::Structure(_)));
    }

    #[cfg(unix)]
    #[test]
    fn sync_command_exit_code_propagates() {
        let tmp = tempfile::tempdir().unwrap();
        let argv = vec!["sh".to_string(), "-c".to_string(), "exit 3".to_string()];
        let err = run_sync_command(&argv, tmp.path()).unwrap_err();
        assert!(matches!(err, Error::SyncCommand { code: 3, .. }));
        assert_eq!(err.exit_code(), 3);
    }

    #[cfg(unix)]
    #[test]
    fn sync_command_runs_in_cwd() {
        let tmp = tempfile::tempdir().unwrap();
        let argv = vec!["sh".to_string(), "-c".to_string(), "touch synced".to_string()];
        run_sync_command(&argv, tmp.path()).unwrap();
        assert!(tmp.path().join("synced").exists());
    }

    #[test]
    fn empty_sync_command_is_noop() {
        let tmp = tempfile::tempdir().unwrap();
        run_sync_command(&[], tmp.path()).unwrap();
    }
}

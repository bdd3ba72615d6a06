//! Line-level text primitives shared by the config scanner and merger.
//!
//! None of these understand Nix syntax beyond double-quoted strings and `#`
//! line comments. Multi-line strings are not supported by the config dialect.

/// Count literal occurrences of `ch` in `text`.
pub fn count_char(text: &str, ch: char) -> usize {
    text.chars().filter(|&c| c == ch).count()
}

/// Drop the contents of double-quoted strings and any trailing `#` comment.
///
/// Quotes themselves are kept so the result still reads as `url = "";`.
/// A backslash inside a string escapes the next character.
pub fn strip_comments_and_strings(line: &str) -> String {
    let mut out = String::with_capacity(line.len());
    let mut in_string = false;
    let mut escaped = false;

    for c in line.chars() {
        if in_string {
            if escaped {
                escaped = false;
            } else if c == '\\' {
                escaped = true;
            } else if c == '"' {
                in_string = false;
                out.push(c);
            }
            continue;
        }
        match c {
            '"' => {
                in_string = true;
                out.push(c);
            }
            '#' => break,
            _ => out.push(c),
        }
    }

    out
}

/// Net brace depth change contributed by one line, ignoring strings and comments.
pub fn brace_delta(line: &str) -> isize {
    let clean = strip_comments_and_strings(line);
    count_char(&clean, '{') as isize - count_char(&clean, '}') as isize
}

/// Leading whitespace of a line.
pub fn indent_of(line: &str) -> &str {
    let trimmed = line.trim_start();
    &line[..line.len() - trimmed.len()]
}

/// Every double-quoted item on a line, in order, without the quotes.
///
/// Anything after an unquoted `#` is ignored.
pub fn quoted_items(line: &str) -> Vec<String> {
    let mut items = Vec::new();
    let mut current: Option<String> = None;
    let mut escaped = false;

    for c in line.chars() {
        match current.as_mut() {
            Some(buf) => {
                if escaped {
                    buf.push(c);
                    escaped = false;
                } else if c == '\\' {
                    escaped = true;
                } else if c == '"' {
                    if let Some(item) = current.take() {
                        items.push(item);
                    }
                } else {
                    buf.push(c);
                }
            }
            None => match c {
                '"' => current = Some(String::new()),
                '#' => break,
                _ => {}
            },
        }
    }

    items
}

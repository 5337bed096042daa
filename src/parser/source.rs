use std::fs;
use std::io;
use std::path::Path;

/// Extensions the interpreter accepts for debugging.
pub const SOURCE_EXTENSIONS: [&str; 2] = ["cs", "mqs"];

/// Check if line is blank or a `//` comment
pub fn is_comment(line: &str) -> bool {
    let trimmed = line.trim();
    trimmed.is_empty() || trimmed.starts_with("//")
}

pub fn has_source_extension(path: &str) -> bool {
    SOURCE_EXTENSIONS.iter().any(|ext| path.ends_with(ext))
}

/// Read a source file as lines, keeping blank lines so indices match the editor.
pub fn load_source_lines(path: &Path) -> io::Result<Vec<String>> {
    let contents = fs::read_to_string(path)?;
    Ok(contents
        .split('\n')
        .map(|line| line.trim_end_matches('\r').to_string())
        .collect())
}

/// Index of the first line that holds code, skipping blanks, `//` comments and
/// `/* ... */` blocks. Falls back to the last non-blank line inspected.
pub fn first_executable_line<S: AsRef<str>>(lines: &[S]) -> usize {
    if lines.len() <= 1 {
        return 0;
    }

    let mut first = 0;
    let mut in_block = false;

    for (index, raw) in lines.iter().enumerate() {
        let mut line = raw.as_ref().trim();
        if line.is_empty() {
            continue;
        }
        first = index;

        if !in_block {
            if let Some(rest) = line.strip_prefix("/*") {
                in_block = true;
                line = rest;
            } else if line.starts_with("//") {
                continue;
            } else {
                break;
            }
        }

        if let Some(end) = line.find("*/") {
            in_block = false;
            if !line[end + 2..].trim().is_empty() {
                break;
            }
        }
    }

    first
}

/// First line at or after `from` that is neither blank nor a `//` comment.
pub fn next_executable_line<S: AsRef<str>>(lines: &[S], from: usize) -> Option<usize> {
    (from..lines.len()).find(|&index| !is_comment(lines[index].as_ref()))
}

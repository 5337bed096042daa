use super::types::{SourceExcerpt, SplitError, SplitResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Comment {
    None,
    Line,
    Block,
}

/// Nesting depth per bracket kind, with the line each was last opened on.
#[derive(Debug, Default)]
struct Depth {
    curly: i32,
    brackets: i32,
    parens: i32,
    curly_line: usize,
    bracket_line: usize,
    paren_line: usize,
}

impl Depth {
    fn is_zero(&self) -> bool {
        self.curly == 0 && self.brackets == 0 && self.parens == 0
    }
}

/// Split REPL input into self-contained top-level statements.
///
/// A statement ends at a `;` or at a `}` that closes the outermost block, as
/// long as no bracket, parenthesis or quote is still open. Comments are
/// dropped, line breaks inside a statement become a space, runs of unquoted
/// spaces collapse to one, and the returned block
/// maps every newline to `\r` so the server receives it as one line.
pub fn split_statements(text: &str) -> Result<SplitResult, SplitError> {
    let chars: Vec<char> = text.chars().collect();

    let mut block = String::with_capacity(text.len());
    let mut statements = Vec::new();
    let mut current = String::new();

    let mut depth = Depth::default();
    let mut comment = Comment::None;
    let mut quote: Option<char> = None;
    let mut quote_line = 0usize;
    let mut backslashes = 0usize;
    let mut line = 0usize;

    let mut i = 0usize;
    while i < chars.len() {
        let ch = chars[i];
        let next = chars.get(i + 1).copied();
        i += 1;

        match ch {
            '\r' => continue,
            '\n' => {
                if comment == Comment::Line {
                    comment = Comment::None;
                }
                block.push('\r');
                if !current.is_empty() && !current.ends_with(' ') {
                    current.push(' ');
                }
                line += 1;
                continue;
            }
            _ => {}
        }

        if quote.is_none() && ch == ' ' && current.ends_with(' ') {
            continue;
        }

        match comment {
            Comment::Line => continue,
            Comment::Block => {
                if ch == '*' && next == Some('/') {
                    i += 1;
                    comment = Comment::None;
                }
                continue;
            }
            Comment::None => {}
        }

        if quote.is_none() && ch == '/' {
            match next {
                Some('/') => comment = Comment::Line,
                Some('*') => comment = Comment::Block,
                _ => {}
            }
            if comment != Comment::None {
                i += 1;
                continue;
            }
        }

        let escaped = backslashes % 2 == 1;
        backslashes = if ch == '\\' { backslashes + 1 } else { 0 };

        let mut completed = false;
        match ch {
            '\'' | '"' => {
                if !escaped {
                    match quote {
                        None => {
                            quote = Some(ch);
                            quote_line = line;
                        }
                        Some(open) if open == ch => quote = None,
                        Some(_) => {}
                    }
                }
            }
            _ if quote.is_some() => {}
            ';' => completed = depth.is_zero(),
            '{' => {
                depth.curly += 1;
                depth.curly_line = line;
            }
            '}' => {
                depth.curly -= 1;
                if depth.curly < 0 {
                    return Err(SplitError::Braces(excerpt(text, line)));
                }
                completed = depth.is_zero();
            }
            '[' => {
                depth.brackets += 1;
                depth.bracket_line = line;
            }
            ']' => {
                depth.brackets -= 1;
                if depth.brackets < 0 {
                    return Err(SplitError::Brackets(excerpt(text, line)));
                }
            }
            '(' => {
                depth.parens += 1;
                depth.paren_line = line;
            }
            ')' => {
                depth.parens -= 1;
                if depth.parens < 0 {
                    return Err(SplitError::Parentheses(excerpt(text, line)));
                }
            }
            _ => {}
        }

        block.push(ch);
        current.push(ch);

        if completed {
            push_statement(&mut statements, &mut current);
        }
    }

    if quote.is_some() {
        return Err(SplitError::Quotes(excerpt(text, quote_line)));
    }
    if depth.brackets != 0 {
        return Err(SplitError::Brackets(excerpt(text, depth.bracket_line)));
    }
    if depth.parens != 0 {
        return Err(SplitError::Parentheses(excerpt(text, depth.paren_line)));
    }
    if depth.curly != 0 {
        return Err(SplitError::Braces(excerpt(text, depth.curly_line)));
    }

    push_statement(&mut statements, &mut current);

    Ok(SplitResult { block, statements })
}

fn push_statement(statements: &mut Vec<String>, current: &mut String) {
    let statement = current.trim();
    if !statement.is_empty() {
        statements.push(statement.to_string());
    }
    current.clear();
}

/// Build a readable excerpt ending at `line` (0-based). Near-empty lines such
/// as a lone `{` pull in the previous lines until something meaningful shows.
fn excerpt(text: &str, line: usize) -> SourceExcerpt {
    let lines: Vec<&str> = text.split('\n').collect();
    let last = line.min(lines.len().saturating_sub(1));

    let mut first = last;
    let mut content = lines[last].trim().to_string();
    let mut collect_more = content.len() < 3;

    while collect_more && first > 0 {
        first -= 1;
        let previous = lines[first].trim();
        collect_more = previous.len() < 2;
        content = format!("{}  {}", previous, content);
    }

    SourceExcerpt {
        first_line: first + 1,
        last_line: last + 1,
        text: content,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn excerpt_merges_short_lines() {
        let text = "x = foo(1,\n(\n)";
        let e = excerpt(text, 1);
        assert_eq!(e.first_line, 1);
        assert_eq!(e.last_line, 2);
        assert_eq!(e.text, "x = foo(1,  (");
    }

    #[test]
    fn excerpt_single_line() {
        let e = excerpt("foo(", 0);
        assert_eq!(e.to_string(), "Line 1: foo(");
    }
}

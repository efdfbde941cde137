//! Layout pass for the analysis language
//!
//! Converts physical source lines into logical lines the grammar can consume:
//! comments are dropped, lines inside brackets (or ending in `\`) are joined,
//! blank lines disappear, and changes in indentation become explicit
//! INDENT / DEDENT markers. Each logical line remembers the physical line it
//! started on so parse errors can point back at the user's source.

use super::ParseError;

pub const INDENT: char = '\u{02}';
pub const DEDENT: char = '\u{03}';

/// Logical-line form of a program
#[derive(Debug, Clone, PartialEq)]
pub struct Layout {
    pub text: String,
    /// 1-based source line for each logical line (index = logical line - 1)
    pub lines: Vec<usize>,
}

impl Layout {
    /// Map a 1-based line of `text` back to the source line
    pub fn source_line(&self, logical: usize) -> usize {
        logical
            .checked_sub(1)
            .and_then(|i| self.lines.get(i))
            .copied()
            .unwrap_or(logical)
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum Quote {
    Single(char),
    Triple(char),
}

struct LogicalLine {
    indent: usize,
    content: String,
    line: usize,
}

/// Run the layout pass over a source string
pub fn layout(source: &str) -> Result<Layout, ParseError> {
    let logical = split_logical_lines(source)?;

    let mut text = String::with_capacity(source.len() + 16);
    let mut lines = Vec::with_capacity(logical.len());
    let mut stack: Vec<usize> = Vec::new();

    for line in logical {
        let base = *stack.first().unwrap_or(&line.indent);
        if stack.is_empty() {
            stack.push(base);
        }

        let top = *stack.last().unwrap_or(&base);
        if line.indent > top {
            stack.push(line.indent);
            text.push(INDENT);
        } else if line.indent < top {
            while stack.len() > 1 && line.indent < *stack.last().unwrap_or(&base) {
                stack.pop();
                text.push(DEDENT);
            }
            if stack.last() != Some(&line.indent) {
                return Err(ParseError::Indentation {
                    message: "unindent does not match any outer indentation level".to_string(),
                    line: line.line,
                });
            }
        }

        text.push_str(&line.content);
        text.push('\n');
        lines.push(line.line);
    }

    for _ in 1..stack.len() {
        text.push(DEDENT);
    }

    Ok(Layout { text, lines })
}

fn indent_width(line: &str) -> usize {
    let mut width = 0;
    for ch in line.chars() {
        match ch {
            ' ' => width += 1,
            '\t' => width = (width / 8 + 1) * 8,
            _ => break,
        }
    }
    width
}

fn split_logical_lines(source: &str) -> Result<Vec<LogicalLine>, ParseError> {
    let chars: Vec<char> = source.chars().collect();
    let mut out = Vec::new();

    let mut current = String::new();
    let mut start_line = 1;
    let mut line_no = 1;
    let mut at_line_start = true;
    let mut indent = 0;
    let mut depth: usize = 0;
    let mut quote: Option<Quote> = None;
    let mut i = 0;

    while i < chars.len() {
        let ch = chars[i];

        if at_line_start {
            let rest: String = chars[i..].iter().take_while(|c| **c != '\n').collect();
            indent = indent_width(&rest);
            start_line = line_no;
            let skip = rest.len() - rest.trim_start_matches([' ', '\t']).len();
            i += rest[..skip].chars().count();
            at_line_start = false;
            continue;
        }

        if let Some(q) = quote {
            match q {
                Quote::Single(c) => {
                    if ch == '\\' && i + 1 < chars.len() {
                        current.push(ch);
                        current.push(chars[i + 1]);
                        if chars[i + 1] == '\n' {
                            line_no += 1;
                        }
                        i += 2;
                        continue;
                    }
                    if ch == '\n' {
                        return Err(ParseError::Syntax {
                            message: "unterminated string literal".to_string(),
                            line: line_no,
                        });
                    }
                    if ch == c {
                        quote = None;
                    }
                    current.push(ch);
                }
                Quote::Triple(c) => {
                    if ch == '\\' && i + 1 < chars.len() {
                        current.push(ch);
                        current.push(chars[i + 1]);
                        i += 2;
                        continue;
                    }
                    if ch == '\n' {
                        line_no += 1;
                    }
                    if ch == c && chars.get(i + 1) == Some(&c) && chars.get(i + 2) == Some(&c) {
                        current.push_str(&[c, c, c].iter().collect::<String>());
                        quote = None;
                        i += 3;
                        continue;
                    }
                    current.push(ch);
                }
            }
            i += 1;
            continue;
        }

        match ch {
            '#' => {
                while i < chars.len() && chars[i] != '\n' {
                    i += 1;
                }
                continue;
            }
            '"' | '\'' => {
                if chars.get(i + 1) == Some(&ch) && chars.get(i + 2) == Some(&ch) {
                    quote = Some(Quote::Triple(ch));
                    current.push_str(&[ch, ch, ch].iter().collect::<String>());
                    i += 3;
                    continue;
                }
                quote = Some(Quote::Single(ch));
                current.push(ch);
            }
            '(' | '[' | '{' => {
                depth += 1;
                current.push(ch);
            }
            ')' | ']' | '}' => {
                depth = depth.saturating_sub(1);
                current.push(ch);
            }
            '\\' if chars.get(i + 1) == Some(&'\n') => {
                current.push(' ');
                line_no += 1;
                i += 2;
                continue;
            }
            '\r' => {}
            '\n' => {
                line_no += 1;
                if depth > 0 {
                    current.push(' ');
                } else {
                    push_line(&mut out, &mut current, indent, start_line);
                    at_line_start = true;
                }
            }
            _ => current.push(ch),
        }
        i += 1;
    }

    if quote.is_some() {
        return Err(ParseError::Syntax {
            message: "unterminated string literal".to_string(),
            line: start_line,
        });
    }
    if depth > 0 {
        return Err(ParseError::Syntax {
            message: "unexpected EOF: unclosed bracket".to_string(),
            line: start_line,
        });
    }
    push_line(&mut out, &mut current, indent, start_line);

    Ok(out)
}

fn push_line(out: &mut Vec<LogicalLine>, current: &mut String, indent: usize, line: usize) {
    let content = current.trim_end().to_string();
    current.clear();
    if !content.trim().is_empty() {
        out.push(LogicalLine {
            indent,
            content,
            line,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn render(source: &str) -> String {
        layout(source)
            .expect("layout failed")
            .text
            .replace(INDENT, "<I>")
            .replace(DEDENT, "<D>")
    }

    #[test]
    fn test_blocks_become_markers() {
        let source = "if x:\n    y = 1\n    z = 2\nw = 3\n";
        assert_eq!(render(source), "if x:\n<I>y = 1\nz = 2\n<D>w = 3\n");
    }

    #[test]
    fn test_nested_blocks_close_at_eof() {
        let source = "for a in b:\n  if a:\n    print(a)";
        assert_eq!(render(source), "for a in b:\n<I>if a:\n<I>print(a)\n<D><D>");
    }

    #[test]
    fn test_comments_and_blank_lines_removed() {
        let source = "# header\n\nx = 1  # trailing\n    # odd indent comment\ny = '# not a comment'\n";
        assert_eq!(render(source), "x = 1\ny = '# not a comment'\n");
    }

    #[test]
    fn test_bracket_continuation_joined() {
        let source = "total = sum([\n    1,\n    2,\n])\nprint(total)\n";
        let out = layout(source).unwrap();
        assert_eq!(out.text, "total = sum([     1,     2, ])\nprint(total)\n");
        assert_eq!(out.lines, vec![1, 5]);
    }

    #[test]
    fn test_uniform_leading_indent_is_base_level() {
        let source = "    x = 1\n    print(x)\n";
        assert_eq!(render(source), "x = 1\nprint(x)\n");
    }

    #[test]
    fn test_triple_quoted_string_keeps_newlines() {
        let source = "s = \"\"\"a\nb\"\"\"\nprint(s)\n";
        assert_eq!(render(source), "s = \"\"\"a\nb\"\"\"\nprint(s)\n");
    }

    #[test]
    fn test_inconsistent_dedent_rejected() {
        let source = "if x:\n        y = 1\n    z = 2\n";
        match layout(source) {
            Err(ParseError::Indentation { line, .. }) => assert_eq!(line, 3),
            other => panic!("Expected indentation error, got {:?}", other),
        }
    }

    #[test]
    fn test_unterminated_string_rejected() {
        match layout("x = 'abc\n") {
            Err(ParseError::Syntax { message, .. }) => assert!(message.contains("unterminated")),
            other => panic!("Expected syntax error, got {:?}", other),
        }
    }
}

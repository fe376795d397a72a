use std::sync::LazyLock;

use regex::Regex;
use unicode_normalization::UnicodeNormalization;

macro_rules! pattern {
    ($name:ident, $re:expr) => {
        static $name: LazyLock<Regex> =
            LazyLock::new(|| Regex::new($re).expect(concat!("invalid pattern ", stringify!($name))));
    };
}

pattern!(RETURN_NONE, r"([)\]])\s+None\s*:");
pattern!(DOUBLE_QUOTE_OPEN, r#"(^|[^"])""([A-Za-z])"#);
pattern!(EXTRA_QUOTES, r#"(^|[^"])"{4,}"#);
pattern!(LEADING_DOT_QUOTE, r#"^(\s*)\.\s*""#);
pattern!(FROM_IMPORT, r"^(\s*)from([A-Za-z_][\w.]*\s+import\b)");

const OPENERS: [char; 3] = ['(', '[', '{'];
const CONTINUATIONS: [char; 6] = ['(', '[', '{', ',', '\\', '+'];

/// Whitespace cleanup that keeps line structure and indentation
pub fn clean_text(text: &str) -> String {
    let mut out: Vec<String> = Vec::new();
    let mut previous_blank = true;

    for line in text.lines() {
        let line = line.trim_end();
        let content = line.trim_start();

        if content.is_empty() {
            if !previous_blank {
                out.push(String::new());
            }
            previous_blank = true;
            continue;
        }

        let indent = &line[..line.len() - content.len()];
        let collapsed = content.split(' ').filter(|s| !s.is_empty()).collect::<Vec<_>>().join(" ");
        out.push(format!("{indent}{collapsed}"));
        previous_blank = false;
    }

    while out.last().is_some_and(|l| l.is_empty()) {
        out.pop();
    }
    out.join("\n")
}

/// NFKC plus typographic punctuation folded to ASCII
pub fn normalize_unicode(text: &str) -> String {
    text.nfkc()
        .map(|c| match c {
            '\u{2018}' | '\u{2019}' | '\u{201A}' | '\u{2032}' => '\'',
            '\u{201C}' | '\u{201D}' | '\u{201E}' | '\u{2033}' => '"',
            '\u{2010}' | '\u{2011}' | '\u{2012}' | '\u{2013}' | '\u{2014}' | '\u{2212}' => '-',
            '\u{00A0}' => ' ',
            other => other,
        })
        .collect()
}

/// Repair OCR damage that is common in screenshots of source code.
/// Unicode folding is limited to code-like lines; prose keeps its symbols.
pub fn normalize_code(text: &str) -> String {
    let folded: Vec<String> = text
        .lines()
        .map(|line| {
            if is_code_line(line) {
                normalize_unicode(line)
            } else {
                line.to_string()
            }
        })
        .collect();
    let lines: Vec<&str> = folded.iter().map(String::as_str).collect();

    let mut repaired: Vec<String> = Vec::with_capacity(lines.len());
    for (i, line) in lines.iter().enumerate() {
        let mut line = repair_docstring_quotes(line);
        line = RETURN_NONE.replace_all(&line, "$1 -> None:").into_owned();
        line = FROM_IMPORT.replace(&line, "${1}from $2").into_owned();

        if is_code_line(&line) {
            line = pair_quotes(&line);
            let next = lines[i + 1..].iter().find(|l| !l.trim().is_empty()).copied();
            line = close_brackets(&line, next);
        }
        repaired.push(line);
    }

    align_docstrings(&repaired).join("\n")
}

fn repair_docstring_quotes(line: &str) -> String {
    let line = LEADING_DOT_QUOTE.replace(line, r#"$1""#);
    let line = DOUBLE_QUOTE_OPEN.replace_all(&line, r#"$1"""$2"#);
    EXTRA_QUOTES.replace_all(&line, r#"$1""""#).into_owned()
}

pub fn is_code_line(line: &str) -> bool {
    let stripped = line.trim();
    if stripped.is_empty() || stripped.starts_with('#') {
        return false;
    }
    const MARKERS: [&str; 13] = [
        "def ", "class ", "=", "(", ")", "[", "]", "{", "}", "if ", "for ", "while ", "return ",
    ];
    MARKERS.iter().any(|m| stripped.contains(m))
}

/// Close an unterminated string literal on a single code line
fn pair_quotes(line: &str) -> String {
    if line.contains(r#"""""#) {
        return line.to_string();
    }

    for quote in ['"', '\''] {
        let count = line.matches(quote).count();
        // an apostrophe is only a quote when it opens a literal
        let opens_literal = quote == '"'
            || ["('", "['", "{'", "= '", ", '"].iter().any(|p| line.contains(p));
        if count % 2 == 1 && opens_literal {
            let at = trailing_punctuation_start(line);
            let mut fixed = String::with_capacity(line.len() + 1);
            fixed.push_str(&line[..at]);
            fixed.push(quote);
            fixed.push_str(&line[at..]);
            return fixed;
        }
    }
    line.to_string()
}

/// Byte offset where a trailing run of `)]}:,;` begins
fn trailing_punctuation_start(line: &str) -> usize {
    let trimmed = line.trim_end_matches([')', ']', '}', ':', ',', ';']);
    trimmed.len()
}

/// Append closers for brackets left open on a line that does not continue
fn close_brackets(line: &str, next: Option<&str>) -> String {
    let trimmed = line.trim_end();
    if trimmed.ends_with(CONTINUATIONS) {
        return line.to_string();
    }

    let indent = |l: &str| l.len() - l.trim_start().len();
    if let Some(next) = next {
        let starts_with_closer = next.trim_start().starts_with([')', ']', '}']);
        if starts_with_closer || (indent(next) > indent(line) && !trimmed.ends_with(':')) {
            return line.to_string();
        }
    }

    let mut stack: Vec<char> = Vec::new();
    let mut in_string: Option<char> = None;
    for c in trimmed.chars() {
        match (in_string, c) {
            (Some(q), c) if c == q => in_string = None,
            (Some(_), _) => {}
            (None, '"' | '\'') => in_string = Some(c),
            (None, '#') => break,
            (None, c) if OPENERS.contains(&c) => stack.push(c),
            (None, ')' | ']' | '}') => {
                if stack.last().is_some_and(|open| closer_for(*open) == c) {
                    stack.pop();
                }
            }
            _ => {}
        }
    }

    if stack.is_empty() || in_string.is_some() {
        return line.to_string();
    }

    let closers: String = stack.iter().rev().map(|c| closer_for(*c)).collect();
    match trimmed.strip_suffix(':') {
        Some(head) => format!("{head}{closers}:"),
        None => format!("{trimmed}{closers}"),
    }
}

fn closer_for(open: char) -> char {
    match open {
        '(' => ')',
        '[' => ']',
        _ => '}',
    }
}

/// Docstring lines take the indentation of the code that follows them
fn align_docstrings(lines: &[String]) -> Vec<String> {
    lines
        .iter()
        .enumerate()
        .map(|(i, line)| {
            if !line.contains(r#"""""#) {
                return line.clone();
            }
            let next_indent = lines
                .iter()
                .skip(i + 1)
                .take(2)
                .find(|l| !l.trim().is_empty() && !l.contains(r#"""""#))
                .map(|l| l.len() - l.trim_start().len());

            match next_indent {
                Some(n) if n > 0 => format!("{}{}", " ".repeat(n), line.trim()),
                _ => line.clone(),
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clean_text_keeps_indentation() {
        let raw = "def f():   \n    x  =   1\n\n\n\n    return   x\n\n";
        assert_eq!(clean_text(raw), "def f():\n    x = 1\n\n    return x");
    }

    #[test]
    fn test_clean_text_drops_leading_blank_lines() {
        assert_eq!(clean_text("\n\n  \nhello"), "hello");
        assert_eq!(clean_text(""), "");
    }

    #[test]
    fn test_typographic_quotes_and_dashes() {
        assert_eq!(
            normalize_unicode("print(\u{201C}hi\u{201D}) \u{2014} \u{2018}x\u{2019}"),
            "print(\"hi\") - 'x'"
        );
        // fullwidth forms fold under NFKC
        assert_eq!(normalize_unicode("\u{FF21}\u{FF08}\u{FF09}"), "A()");
    }

    #[test]
    fn test_return_none_arrow_repaired() {
        assert_eq!(
            normalize_code("def close(self) None:"),
            "def close(self) -> None:"
        );
        assert_eq!(
            normalize_code("def close(self) -> None:"),
            "def close(self) -> None:"
        );
    }

    #[test]
    fn test_docstring_quotes_repaired() {
        assert_eq!(
            normalize_code("    \"\"Initialize the portal.\"\"\"\n    pass"),
            "    \"\"\"Initialize the portal.\"\"\"\n    pass"
        );
        assert_eq!(normalize_code("\"\"\"\"Doc\"\"\""), "\"\"\"Doc\"\"\"");
    }

    #[test]
    fn test_unbalanced_brackets_closed() {
        assert_eq!(normalize_code("print(len(items)"), "print(len(items))");
        assert_eq!(normalize_code("def foo(self:"), "def foo(self):");
        assert_eq!(normalize_code("values = [1, 2, 3"), "values = [1, 2, 3]");
    }

    #[test]
    fn test_continued_brackets_left_open() {
        let src = "result = call(\n    a,\n    b,\n)";
        assert_eq!(normalize_code(src), src);

        let src = "items = [1,\n         2]";
        assert_eq!(normalize_code(src), src);
    }

    #[test]
    fn test_odd_quotes_paired() {
        assert_eq!(normalize_code("print(\"hello)"), "print(\"hello\")");
        assert_eq!(normalize_code("name = 'abc"), "name = 'abc'");
        // prose apostrophes are not touched
        assert_eq!(normalize_code("# don't panic"), "# don't panic");
    }

    #[test]
    fn test_from_import_spacing() {
        assert_eq!(
            normalize_code("fromtyping import Optional"),
            "from typing import Optional"
        );
        assert_eq!(normalize_code("fromage = 1"), "fromage = 1");
    }

    #[test]
    fn test_docstring_aligned_to_code() {
        let src = "def run(self):\n\"\"\"Run it.\"\"\"\n    return 1";
        assert_eq!(
            normalize_code(src),
            "def run(self):\n    \"\"\"Run it.\"\"\"\n    return 1"
        );
    }

    #[test]
    fn test_prose_keeps_typography_among_code() {
        let src = "Einstein wrote mc\u{00B2} \u{2014} famously\nx = f(\u{201C}a\u{201D})";
        assert_eq!(
            normalize_code(src),
            "Einstein wrote mc\u{00B2} \u{2014} famously\nx = f(\"a\")"
        );
    }

    #[test]
    fn test_plain_prose_untouched() {
        let src = "Hello world\nThis is text";
        assert_eq!(normalize_code(src), src);
    }
}

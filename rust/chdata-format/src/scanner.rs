//! Low-level scanning of type descriptors.
//!
//! Every function works on byte offsets into `args` and never looks at or past `len`.
//! All syntax characters are ASCII, so offsets returned here are always valid `str`
//! boundaries.

use chdata_common::{Result, error::Error};

pub fn is_quote(ch: u8) -> bool {
    matches!(ch, b'\'' | b'`' | b'"')
}

pub fn is_open_bracket(ch: u8) -> bool {
    matches!(ch, b'(' | b'[' | b'{')
}

pub fn is_close_bracket(ch: u8) -> bool {
    matches!(ch, b')' | b']' | b'}')
}

pub fn is_separator(ch: u8) -> bool {
    matches!(ch, b',' | b';')
}

fn close_bracket_of(open: u8) -> u8 {
    match open {
        b'[' => b']',
        b'{' => b'}',
        _ => b')',
    }
}

/// Returns `true` if a `--` or `/*` comment starts at `i`.
fn comment_at(bytes: &[u8], i: usize, len: usize) -> bool {
    i + 1 < len
        && ((bytes[i] == b'-' && bytes[i + 1] == b'-') || (bytes[i] == b'/' && bytes[i + 1] == b'*'))
}

/// Skips the comment starting at `i`, returning the index after it.
fn skip_comment(args: &str, i: usize, len: usize) -> Result<usize> {
    if args.as_bytes()[i] == b'-' {
        Ok(skip_single_line_comment(args, i + 2, len))
    } else {
        skip_multi_line_comment(args, i + 2, len)
    }
}

/// Skips past the bracket matching `bracket`.
///
/// `start` may point at the opening bracket or just after it. Quoted strings and
/// comments are skipped, other bracket kinds nest.
///
/// # Returns
///
/// The index right after the matching closing bracket.
pub fn skip_brackets(args: &str, start: usize, len: usize, bracket: u8) -> Result<usize> {
    let bytes = args.as_bytes();
    let mut close = close_bracket_of(bracket);
    let mut stack = Vec::new();
    let mut i = if start < len && bytes[start] == bracket {
        start + 1
    } else {
        start
    };
    while i < len {
        let ch = bytes[i];
        if is_quote(ch) {
            i = skip_quoted_string(args, i, len, ch)?;
            continue;
        } else if is_open_bracket(ch) {
            stack.push(close);
            close = close_bracket_of(ch);
        } else if ch == close {
            match stack.pop() {
                None => return Ok(i + 1),
                Some(outer) => close = outer,
            }
        } else if comment_at(bytes, i, len) {
            i = skip_comment(args, i, len)?;
            continue;
        }
        i += 1;
    }

    Err(Error::parse(
        args,
        start,
        format!(
            "Missing '{}' for '{}' at position {start}",
            close as char, bracket as char
        ),
    ))
}

/// Skips a quoted string starting at `start`. A backslash escapes the next character
/// and a doubled quote stands for itself.
///
/// # Returns
///
/// The index right after the closing quote.
pub fn skip_quoted_string(args: &str, start: usize, len: usize, quote: u8) -> Result<usize> {
    let bytes = args.as_bytes();
    let mut i = start;
    while i < len {
        let ch = bytes[i];
        if ch == b'\\' {
            i += 1;
        } else if ch == quote && i > start {
            i += 1;
            if i < len && bytes[i] == quote {
                i += 1;
                continue;
            }
            return Ok(i);
        }
        i += 1;
    }

    Err(Error::parse(
        args,
        start,
        format!("Missing quote: {}", quote as char),
    ))
}

/// Returns the index of the line after `start`, or `len` on the last line.
pub fn skip_single_line_comment(args: &str, start: usize, len: usize) -> usize {
    let start = start.min(len);
    args.as_bytes()[start..len]
        .iter()
        .position(|&b| b == b'\n')
        .map_or(len, |p| start + p + 1)
}

/// Skips a possibly nested `/* ... */` comment; `start` points after the opening `/*`.
pub fn skip_multi_line_comment(args: &str, start: usize, len: usize) -> Result<usize> {
    let bytes = args.as_bytes();
    let mut level = 1usize;
    let mut i = start;
    while i < len {
        let has_next = i + 1 < len;
        if bytes[i] == b'/' && has_next && bytes[i + 1] == b'*' {
            i += 1;
            level += 1;
        } else if bytes[i] == b'*' && has_next && bytes[i + 1] == b'/' {
            i += 1;
            level -= 1;
            if level == 0 {
                return Ok(i + 1);
            }
        }
        i += 1;
    }

    Err(Error::parse(args, start, "Unclosed multi-line comment"))
}

/// Skips quoted strings, comments and bracketed groups until one of `end_chars`.
///
/// # Returns
///
/// The index right after the end character, or `len` if none was found.
pub fn skip_contents_until(args: &str, start: usize, len: usize, end_chars: &[u8]) -> Result<usize> {
    let bytes = args.as_bytes();
    let mut i = start;
    while i < len {
        let ch = bytes[i];
        if end_chars.contains(&ch) {
            return Ok(i + 1);
        }
        if is_quote(ch) {
            i = skip_quoted_string(args, i, len, ch)?;
        } else if is_open_bracket(ch) {
            i = skip_brackets(args, i, len, ch)?;
        } else if comment_at(bytes, i, len) {
            i = skip_comment(args, i, len)?;
        } else {
            i += 1;
        }
    }
    Ok(len)
}

/// Reads a bare name or a quoted string into `builder`.
///
/// Quotes are stripped; inside quotes a doubled quote is a literal quote. A backslash
/// escapes the next character either way. A bare name ends at whitespace, a bracket, a
/// separator or a comment, but leading delimiters are skipped while `builder` is
/// still empty.
///
/// # Returns
///
/// The index after the closing quote, the index of the delimiter that ended a bare
/// name, or `len`. A quote still open at `len` is a parse error.
pub fn read_name_or_quoted_string(
    args: &str,
    start: usize,
    len: usize,
    builder: &mut Vec<u8>,
) -> Result<usize> {
    let bytes = args.as_bytes();
    let mut quote = None;
    let mut opened = start;
    let mut i = start;
    while i < len {
        let ch = bytes[i];
        if ch == b'\\' {
            i += 1;
            if i < len {
                builder.push(bytes[i]);
            }
        } else if is_quote(ch) {
            if quote == Some(ch) {
                if i + 1 < len && bytes[i + 1] == ch {
                    builder.push(ch);
                    i += 2;
                    continue;
                }
                return Ok(i + 1);
            } else if quote.is_none() {
                quote = Some(ch);
                opened = i;
            } else {
                builder.push(ch);
            }
        } else if quote.is_none()
            && (ch.is_ascii_whitespace()
                || is_open_bracket(ch)
                || is_close_bracket(ch)
                || is_separator(ch)
                || comment_at(bytes, i, len))
        {
            if !builder.is_empty() {
                return Ok(i);
            }
        } else {
            builder.push(ch);
        }
        i += 1;
    }
    match quote {
        Some(q) => Err(Error::parse(
            args,
            opened,
            format!("Missing closing {} for the quote at position {opened}", q as char),
        )),
        None => Ok(len),
    }
}

/// Reads a parenthesized, comma-separated parameter list starting at or before the
/// opening bracket at `start`.
///
/// Parameters keep nested brackets and quoted strings verbatim. Runs of whitespace
/// collapse to a single space between two words and disappear next to commas,
/// brackets, `=`, `-` and `/`, so `'a' = 1` reads as `'a'=1`.
///
/// # Returns
///
/// The index right after the closing bracket.
pub fn read_parameters(args: &str, start: usize, len: usize, params: &mut Vec<String>) -> Result<usize> {
    let bytes = args.as_bytes();
    let mut begin = start;
    let mut i = start;
    while i < len {
        let ch = bytes[i];
        if ch == b'(' {
            begin = i + 1;
            break;
        } else if comment_at(bytes, i, len) {
            i = skip_comment(args, i, len)?;
            continue;
        } else if !ch.is_ascii_whitespace() {
            begin = i;
            break;
        }
        i += 1;
    }

    let mut close = b')';
    let mut stack = Vec::new();
    let mut builder = Vec::<u8>::new();
    let mut expect_ws = false;
    let mut i = begin;
    while i < len {
        let ch = bytes[i];
        if ch.is_ascii_whitespace() {
            if !builder.is_empty() {
                let mut j = i + 1;
                while j < len {
                    let next = bytes[j];
                    if matches!(next, b',' | b'=' | b'-' | b'/')
                        || is_open_bracket(next)
                        || is_close_bracket(next)
                    {
                        break;
                    } else if !next.is_ascii_whitespace() {
                        if expect_ws {
                            builder.push(b' ');
                        }
                        break;
                    }
                    j += 1;
                }
                i = j;
                expect_ws = false;
                continue;
            }
            expect_ws = false;
        } else if is_quote(ch) {
            builder.push(ch);
            let mut j = i + 1;
            while j < len {
                let c = bytes[j];
                builder.push(c);
                if c == ch && bytes[j - 1] != b'\\' {
                    if j + 1 < len && bytes[j + 1] == ch {
                        builder.push(ch);
                        j += 2;
                        continue;
                    }
                    break;
                }
                j += 1;
            }
            i = j;
            expect_ws = false;
        } else if is_open_bracket(ch) {
            builder.push(ch);
            stack.push(close);
            close = close_bracket_of(ch);
            expect_ws = false;
        } else if ch == close {
            match stack.pop() {
                None => {
                    if !builder.is_empty() {
                        params.push(take_string(&mut builder));
                    }
                    return Ok(i + 1);
                }
                Some(outer) => {
                    builder.push(ch);
                    close = outer;
                }
            }
            expect_ws = false;
        } else if ch == b',' {
            if stack.is_empty() {
                params.push(take_string(&mut builder));
            } else {
                builder.push(ch);
            }
            expect_ws = false;
        } else if comment_at(bytes, i, len) {
            i = skip_comment(args, i, len)?;
            expect_ws = false;
            continue;
        } else {
            builder.push(ch);
            expect_ws = ch != b'=';
        }
        i += 1;
    }

    Err(Error::parse(
        args,
        start,
        format!("Missing '{}' for parameters at position {start}", close as char),
    ))
}

/// Moves the accumulated bytes out of `builder` as a string.
pub fn take_string(builder: &mut Vec<u8>) -> String {
    let s = String::from_utf8_lossy(builder).into_owned();
    builder.clear();
    s
}

#[cfg(test)]
mod tests {
    use super::*;

    fn name(args: &str) -> (String, usize) {
        let mut builder = Vec::new();
        let end = read_name_or_quoted_string(args, 0, args.len(), &mut builder).unwrap();
        (take_string(&mut builder), end)
    }

    fn params(args: &str) -> (Vec<String>, usize) {
        let mut params = Vec::new();
        let end = read_parameters(args, 0, args.len(), &mut params).unwrap();
        (params, end)
    }

    #[test]
    fn test_skip_brackets() {
        let s = "(a(b)[c]{d}) tail";
        assert_eq!(skip_brackets(s, 0, s.len(), b'(').unwrap(), 12);
        assert_eq!(skip_brackets(s, 1, s.len(), b'(').unwrap(), 12);
        let s = "(')' -- )\n)";
        assert_eq!(skip_brackets(s, 0, s.len(), b'(').unwrap(), s.len());
        let err = skip_brackets("(a(b)", 0, 5, b'(').unwrap_err();
        assert!(err.to_string().contains("Missing ')' for '(' at position 0"));
    }

    #[test]
    fn test_skip_quoted_string() {
        assert_eq!(skip_quoted_string("'ab' x", 0, 6, b'\'').unwrap(), 4);
        assert_eq!(skip_quoted_string("'a''b'", 0, 6, b'\'').unwrap(), 6);
        assert_eq!(skip_quoted_string(r"'a\'b'", 0, 6, b'\'').unwrap(), 6);
        assert!(skip_quoted_string("'abc", 0, 4, b'\'').is_err());
    }

    #[test]
    fn test_comments() {
        assert_eq!(skip_single_line_comment("--x\ny", 2, 5), 4);
        assert_eq!(skip_single_line_comment("--xy", 2, 4), 4);
        assert_eq!(skip_multi_line_comment("/* /* */ */x", 2, 12).unwrap(), 11);
        assert!(skip_multi_line_comment("/* x", 2, 4).is_err());
    }

    #[test]
    fn test_skip_contents_until() {
        let s = "a(1,2) ',' b, c";
        assert_eq!(skip_contents_until(s, 0, s.len(), b",").unwrap(), 13);
        assert_eq!(skip_contents_until("abc", 0, 3, b",").unwrap(), 3);
    }

    #[test]
    fn test_read_name_or_quoted_string() {
        assert_eq!(name("Int32 x"), ("Int32".to_string(), 5));
        assert_eq!(name("  String,"), ("String".to_string(), 8));
        assert_eq!(name("`my col` x"), ("my col".to_string(), 8));
        assert_eq!(name("'it''s'"), ("it's".to_string(), 7));
        assert_eq!(name(r"a\ b c"), ("a b".to_string(), 4));
        assert_eq!(name("abc--comment"), ("abc".to_string(), 3));
        assert_eq!(name("Decimal(1,2)"), ("Decimal".to_string(), 7));

        let mut builder = Vec::new();
        assert!(read_name_or_quoted_string("`UInt8", 0, 6, &mut builder).is_err());
        assert!(read_name_or_quoted_string("'a''", 0, 4, &mut builder).is_err());
    }

    #[test]
    fn test_read_parameters() {
        assert_eq!(
            params("(18, 4)"),
            (vec!["18".to_string(), "4".to_string()], 7)
        );
        assert_eq!(
            params("('a' = 1, 'b c' = -2)"),
            (vec!["'a'=1".to_string(), "'b c'=-2".to_string()], 21)
        );
        assert_eq!(
            params("(quantiles(0.5, 0.9), UInt64)"),
            (
                vec!["quantiles(0.5,0.9)".to_string(), "UInt64".to_string()],
                29
            )
        );
        assert_eq!(
            params("(Nullable( String ) , x  y)").0,
            vec!["Nullable(String)".to_string(), "x y".to_string()]
        );
        assert_eq!(params("  /* c */ (3)").0, vec!["3".to_string()]);
        assert_eq!(params("()"), (vec![], 2));
    }

    #[test]
    fn test_read_parameters_unterminated() {
        let mut params = Vec::new();
        assert!(read_parameters("(1, 2", 0, 5, &mut params).is_err());
        assert!(read_parameters("(a(1)", 0, 5, &mut params).is_err());
    }
}

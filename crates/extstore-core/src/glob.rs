//! Shell-style glob matching over slash-separated object keys.
//!
//! Pattern syntax:
//!
//! - `*` matches any run of characters other than `/`
//! - `?` matches a single character other than `/`
//! - `[range]` matches one character in the class; `[^range]` negates it;
//!   a range is `c` or `lo-hi`
//! - `\c` matches `c` literally
//!
//! The whole key must match. A malformed pattern is reported as an error even
//! when a mismatch could be decided before reaching the malformed part.

/// Returned when a glob pattern is malformed.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("syntax error in pattern {pattern:?}")]
pub struct PatternError {
    pattern: String,
}

impl PatternError {
    /// The offending pattern.
    pub fn pattern(&self) -> &str {
        &self.pattern
    }
}

#[derive(Debug, Clone, Copy)]
struct BadPattern;

/// Reports whether `name` matches the glob `pattern`.
pub fn matches(pattern: &str, name: &str) -> Result<bool, PatternError> {
    match_pattern(pattern, name).map_err(|BadPattern| PatternError {
        pattern: pattern.to_owned(),
    })
}

fn match_pattern(mut pattern: &str, mut name: &str) -> Result<bool, BadPattern> {
    'pattern: while !pattern.is_empty() {
        let (star, chunk, rest) = scan_chunk(pattern);
        pattern = rest;

        if star && chunk.is_empty() {
            // Trailing `*` takes the rest of the key unless it crosses a `/`.
            return Ok(!name.contains('/'));
        }

        if let Some(tail) = match_chunk(chunk, name)?
            && (tail.is_empty() || !pattern.is_empty())
        {
            name = tail;
            continue;
        }

        if star {
            let current = name;
            for (at, ch) in current.char_indices() {
                if ch == '/' {
                    break;
                }
                let Some(tail) = match_chunk(chunk, &current[at + ch.len_utf8()..])? else {
                    continue;
                };
                // The last chunk has to consume the key.
                if pattern.is_empty() && !tail.is_empty() {
                    continue;
                }
                name = tail;
                continue 'pattern;
            }
        }

        while !pattern.is_empty() {
            let (_, chunk, rest) = scan_chunk(pattern);
            pattern = rest;
            match_chunk(chunk, "")?;
        }
        return Ok(false);
    }

    Ok(name.is_empty())
}

/// Splits off the leading stars and the literal chunk up to the next star.
fn scan_chunk(mut pattern: &str) -> (bool, &str, &str) {
    let mut star = false;
    while let Some(rest) = pattern.strip_prefix('*') {
        pattern = rest;
        star = true;
    }

    let bytes = pattern.as_bytes();
    let mut in_range = false;
    let mut at = 0;
    while at < bytes.len() {
        match bytes[at] {
            b'\\' if at + 1 < bytes.len() => at += 1,
            b'[' => in_range = true,
            b']' => in_range = false,
            b'*' if !in_range => break,
            _ => {}
        }
        at += 1;
    }
    (star, &pattern[..at], &pattern[at..])
}

/// Matches `chunk` against the start of `s`, returning the unmatched tail.
///
/// After a mismatch the rest of the chunk is still parsed so that syntax
/// errors are never masked.
fn match_chunk<'a>(mut chunk: &str, mut s: &'a str) -> Result<Option<&'a str>, BadPattern> {
    let mut failed = false;

    while let Some(head) = chunk.chars().next() {
        if !failed && s.is_empty() {
            failed = true;
        }

        match head {
            '[' => {
                let mut current = '\0';
                if !failed && let Some((ch, rest)) = next_char(s) {
                    current = ch;
                    s = rest;
                }
                chunk = &chunk[1..];

                let mut negated = false;
                if let Some(rest) = chunk.strip_prefix('^') {
                    negated = true;
                    chunk = rest;
                }

                let mut matched = false;
                let mut ranges = 0;
                loop {
                    if ranges > 0
                        && let Some(rest) = chunk.strip_prefix(']')
                    {
                        chunk = rest;
                        break;
                    }
                    let (lo, rest) = class_char(chunk)?;
                    chunk = rest;
                    let mut hi = lo;
                    if let Some(rest) = chunk.strip_prefix('-') {
                        let (upper, rest) = class_char(rest)?;
                        hi = upper;
                        chunk = rest;
                    }
                    if lo <= current && current <= hi {
                        matched = true;
                    }
                    ranges += 1;
                }

                if matched == negated {
                    failed = true;
                }
            }
            '?' => {
                if !failed && let Some((ch, rest)) = next_char(s) {
                    if ch == '/' {
                        failed = true;
                    }
                    s = rest;
                }
                chunk = &chunk[1..];
            }
            '\\' => {
                let Some((literal, rest)) = next_char(&chunk[1..]) else {
                    return Err(BadPattern);
                };
                match_literal(literal, &mut s, &mut failed);
                chunk = rest;
            }
            literal => {
                match_literal(literal, &mut s, &mut failed);
                chunk = &chunk[literal.len_utf8()..];
            }
        }
    }

    Ok(if failed { None } else { Some(s) })
}

fn match_literal(literal: char, s: &mut &str, failed: &mut bool) {
    if *failed {
        return;
    }
    match next_char(s) {
        Some((ch, rest)) => {
            if ch != literal {
                *failed = true;
            }
            *s = rest;
        }
        None => *failed = true,
    }
}

/// Reads one possibly escaped character of a character class.
fn class_char(chunk: &str) -> Result<(char, &str), BadPattern> {
    let chunk = match chunk.chars().next() {
        None | Some('-') | Some(']') => return Err(BadPattern),
        Some('\\') => &chunk[1..],
        Some(_) => chunk,
    };
    let (ch, rest) = next_char(chunk).ok_or(BadPattern)?;
    if rest.is_empty() {
        return Err(BadPattern);
    }
    Ok((ch, rest))
}

fn next_char(s: &str) -> Option<(char, &str)> {
    let ch = s.chars().next()?;
    Some((ch, &s[ch.len_utf8()..]))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn is_match(pattern: &str, name: &str) -> bool {
        matches(pattern, name).unwrap()
    }

    #[test]
    fn star_stays_within_one_element() {
        assert!(is_match("*.csv", "a.csv"));
        assert!(!is_match("*.csv", "b.txt"));
        assert!(!is_match("*.csv", "sub/c.csv"));
        assert!(is_match("*/*.csv", "sub/c.csv"));
        assert!(is_match("backup/*", "backup/file"));
        assert!(!is_match("backup/*", "backup/nested/file"));
        assert!(is_match("a*b*c", "axxbyyc"));
        assert!(!is_match("a*b", "axb/b"));
    }

    #[test]
    fn question_mark() {
        assert!(is_match("data-?.sst", "data-1.sst"));
        assert!(!is_match("data-?.sst", "data-12.sst"));
        assert!(!is_match("a?b", "a/b"));
        assert!(is_match("??", "éa"));
    }

    #[test]
    fn character_classes() {
        assert!(is_match("[a-c]x", "bx"));
        assert!(!is_match("[a-c]x", "dx"));
        assert!(is_match("[^a-c]x", "dx"));
        assert!(!is_match("[^a-c]x", "ax"));
        assert!(is_match("[\\]]", "]"));
        assert!(is_match("[xyz]", "y"));
    }

    #[test]
    fn escapes() {
        assert!(is_match("\\*", "*"));
        assert!(!is_match("\\*", "a"));
        assert!(is_match("a\\?b", "a?b"));
    }

    #[test]
    fn exact_match_required() {
        assert!(is_match("abc", "abc"));
        assert!(!is_match("abc", "abcd"));
        assert!(!is_match("abcd", "abc"));
        assert!(is_match("", ""));
        assert!(!is_match("", "a"));
    }

    #[test]
    fn malformed_patterns_are_errors() {
        for pattern in ["[", "[]a]", "[a-", "\\", "[-]"] {
            let err = matches(pattern, "a").unwrap_err();
            assert_eq!(err.pattern(), pattern);
        }
        // A mismatch before the malformed class still reports the error.
        assert!(matches("x[", "a").is_err());
        assert!(matches("*x[", "abc").is_err());
    }
}

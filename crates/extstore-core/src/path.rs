//! Slash-separated object key helpers.
//!
//! Object keys are treated as lexical paths: `join` cleans redundant
//! separators and `.`/`..` elements the way a slash-path joiner does, and
//! never touches the local filesystem.

/// Characters that introduce a glob construct.
const GLOB_CHARS: &[char] = &['*', '?', '['];

/// Returns the shortest lexically equivalent form of `path`.
///
/// Empty input cleans to `"."`, matching slash-path semantics.
pub fn clean(path: &str) -> String {
    if path.is_empty() {
        return ".".to_owned();
    }

    let rooted = path.starts_with('/');
    let mut parts: Vec<&str> = Vec::new();
    for part in path.split('/') {
        match part {
            "" | "." => {}
            ".." => match parts.last() {
                Some(&last) if last != ".." => {
                    parts.pop();
                }
                _ if !rooted => parts.push(".."),
                _ => {}
            },
            part => parts.push(part),
        }
    }

    let joined = parts.join("/");
    match (rooted, joined.is_empty()) {
        (true, _) => format!("/{joined}"),
        (false, true) => ".".to_owned(),
        (false, false) => joined,
    }
}

/// Joins path elements with `/` and cleans the result.
///
/// Empty elements are ignored; joining only empty elements yields `""`.
pub fn join(parts: &[&str]) -> String {
    let non_empty: Vec<&str> = parts.iter().copied().filter(|p| !p.is_empty()).collect();
    if non_empty.is_empty() {
        return String::new();
    }
    clean(&non_empty.join("/"))
}

/// Joins `prefix` and `suffix`, keeping a trailing slash of `suffix`.
///
/// Listing `a/` must not also match `ab`, so the slash is significant.
pub fn join_preserving_trailing_slash(prefix: &str, suffix: &str) -> String {
    let mut out = join(&[prefix, suffix]);
    if suffix.ends_with('/') && !out.ends_with('/') {
        out.push('/');
    }
    out
}

/// Returns `true` when `s` contains any glob metacharacter.
#[inline]
pub fn contains_glob(s: &str) -> bool {
    s.contains(GLOB_CHARS)
}

/// Returns the literal directory portion of `path` preceding its first glob
/// metacharacter, or `path` itself when it has none.
///
/// A glob in the first path element yields `""` (list everything).
pub fn prefix_before_wildcard(path: &str) -> String {
    let Some(glob_at) = path.find(GLOB_CHARS) else {
        return path.to_owned();
    };
    let literal = &path[..glob_at];
    match literal.rfind('/') {
        Some(slash) => clean(&literal[..=slash]),
        None => String::new(),
    }
}

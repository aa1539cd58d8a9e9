//! Redis-compatible glob patterns.
//!
//! Supported syntax mirrors `SCAN ... MATCH`:
//!
//! | Token    | Matches                                 |
//! |----------|-----------------------------------------|
//! | `*`      | any run of characters, including empty  |
//! | `?`      | exactly one character                   |
//! | `[abc]`  | one character from the set              |
//! | `[^a-z]` | one character outside the range         |
//! | `\x`     | the literal character `x`               |
//!
//! Patterns are compiled once into an anchored [`Regex`] so tiers without
//! native pattern support (the local tier, the in-memory tiers, post-filtering
//! in PostgreSQL) match exactly what Redis would.

use std::fmt;

use regex::Regex;

use crate::error::CacheError;

/// Characters with special meaning in a glob pattern.
pub const GLOB_METACHARACTERS: [char; 4] = ['*', '?', '[', ']'];

/// A compiled glob pattern.
#[derive(Clone)]
pub struct GlobPattern {
    source: String,
    regex: Regex,
}

impl GlobPattern {
    /// Compiles a glob pattern.
    pub fn new(pattern: &str) -> Result<Self, CacheError> {
        let regex = Regex::new(&glob_to_regex(pattern)?)
            .map_err(|e| CacheError::invalid_pattern(pattern, e.to_string()))?;
        Ok(Self {
            source: pattern.to_string(),
            regex,
        })
    }

    /// Returns `true` if `candidate` matches the whole pattern.
    pub fn matches(&self, candidate: &str) -> bool {
        self.regex.is_match(candidate)
    }

    /// The pattern as written.
    pub fn as_str(&self) -> &str {
        &self.source
    }

    /// The literal text before the first wildcard, with escapes resolved.
    ///
    /// Used to narrow scans in stores that only support prefix matching.
    pub fn literal_prefix(&self) -> String {
        let mut prefix = String::new();
        let mut chars = self.source.chars();
        while let Some(c) = chars.next() {
            match c {
                '\\' => match chars.next() {
                    Some(escaped) => prefix.push(escaped),
                    None => break,
                },
                c if GLOB_METACHARACTERS.contains(&c) => break,
                c => prefix.push(c),
            }
        }
        prefix
    }

    /// Returns `true` if the pattern contains no wildcards.
    pub fn is_literal(&self) -> bool {
        find_unescaped_metachar(&self.source).is_none()
    }
}

impl fmt::Debug for GlobPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("GlobPattern").field(&self.source).finish()
    }
}

impl fmt::Display for GlobPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.source)
    }
}

impl PartialEq for GlobPattern {
    fn eq(&self, other: &Self) -> bool {
        self.source == other.source
    }
}

impl Eq for GlobPattern {}

/// Returns the first glob metacharacter in `s` that is not escaped by a backslash.
pub fn find_unescaped_metachar(s: &str) -> Option<char> {
    let mut chars = s.chars();
    while let Some(c) = chars.next() {
        if c == '\\' {
            chars.next();
            continue;
        }
        if GLOB_METACHARACTERS.contains(&c) {
            return Some(c);
        }
    }
    None
}

/// Escapes glob metacharacters so `s` matches only itself.
pub fn escape(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        if c == '\\' || GLOB_METACHARACTERS.contains(&c) {
            out.push('\\');
        }
        out.push(c);
    }
    out
}

/// Resolves backslash escapes, the inverse of [`escape`].
///
/// Returns `None` if `s` ends in a dangling backslash.
pub fn unescape(s: &str) -> Option<String> {
    let mut out = String::with_capacity(s.len());
    let mut chars = s.chars();
    while let Some(c) = chars.next() {
        if c == '\\' {
            out.push(chars.next()?);
        } else {
            out.push(c);
        }
    }
    Some(out)
}

fn glob_to_regex(pattern: &str) -> Result<String, CacheError> {
    let mut out = String::with_capacity(pattern.len() * 2 + 8);
    out.push_str("(?s)^");

    let mut chars = pattern.chars().peekable();
    while let Some(c) = chars.next() {
        match c {
            '*' => out.push_str(".*"),
            '?' => out.push('.'),
            '\\' => match chars.next() {
                Some(escaped) => out.push_str(&regex::escape(&escaped.to_string())),
                None => {
                    return Err(CacheError::invalid_pattern(pattern, "trailing backslash"));
                }
            },
            '[' => {
                out.push('[');
                if matches!(chars.peek(), Some('^') | Some('!')) {
                    chars.next();
                    out.push('^');
                }
                let mut closed = false;
                let mut empty = true;
                while let Some(inner) = chars.next() {
                    match inner {
                        ']' if !empty => {
                            closed = true;
                            break;
                        }
                        '\\' => {
                            let escaped = chars.next().ok_or_else(|| {
                                CacheError::invalid_pattern(pattern, "trailing backslash")
                            })?;
                            if !escaped.is_alphanumeric() {
                                out.push('\\');
                            }
                            out.push(escaped);
                        }
                        '-' => out.push('-'),
                        other => {
                            if matches!(other, '[' | ']' | '^' | '&' | '~') {
                                out.push('\\');
                            }
                            out.push(other);
                        }
                    }
                    empty = false;
                }
                if !closed {
                    return Err(CacheError::invalid_pattern(
                        pattern,
                        "unterminated character class",
                    ));
                }
                out.push(']');
            }
            ']' => {
                return Err(CacheError::invalid_pattern(pattern, "unbalanced ']'"));
            }
            other => out.push_str(&regex::escape(&other.to_string())),
        }
    }

    out.push('$');
    Ok(out)
}

//! Glob-style file name patterns.
//!
//! Patterns are matched against a file's name only, never its directory:
//!
//! - `*` matches any run of characters (including none)
//! - `?` matches exactly one character
//! - `[abc]`, `[a-z]` and `[!abc]` match one character from (or not from) a set
//! - everything else matches literally
//!
//! Patterns are compiled once into an anchored regex.

use std::fmt;

use regex::Regex;

use super::error::{RetentionError, RetentionResult};

/// A compiled glob pattern.
#[derive(Clone)]
pub struct FilePattern {
    source: String,
    regex: Regex,
}

impl FilePattern {
    /// Compile a glob pattern.
    pub fn new(pattern: &str) -> RetentionResult<Self> {
        if pattern.is_empty() {
            return Err(invalid(pattern, "pattern is empty"));
        }
        if pattern.contains('/') {
            return Err(invalid(pattern, "patterns match file names and cannot contain '/'"));
        }

        let translated = glob_to_regex(pattern)?;
        let regex = Regex::new(&translated).map_err(|e| invalid(pattern, e.to_string()))?;

        Ok(Self {
            source: pattern.to_string(),
            regex,
        })
    }

    /// Check whether a file name matches.
    pub fn matches(&self, file_name: &str) -> bool {
        self.regex.is_match(file_name)
    }

    /// The original glob text.
    pub fn as_str(&self) -> &str {
        &self.source
    }
}

impl fmt::Debug for FilePattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("FilePattern").field(&self.source).finish()
    }
}

impl fmt::Display for FilePattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.source)
    }
}

impl PartialEq for FilePattern {
    fn eq(&self, other: &Self) -> bool {
        self.source == other.source
    }
}

fn invalid(pattern: &str, reason: impl Into<String>) -> RetentionError {
    RetentionError::InvalidPattern {
        pattern: pattern.to_string(),
        reason: reason.into(),
    }
}

fn glob_to_regex(pattern: &str) -> RetentionResult<String> {
    let mut out = String::with_capacity(pattern.len() * 2 + 2);
    out.push('^');

    let mut chars = pattern.chars().peekable();
    while let Some(c) = chars.next() {
        match c {
            '*' => {
                // Collapse runs of stars
                while chars.peek() == Some(&'*') {
                    chars.next();
                }
                out.push_str(".*");
            }
            '?' => out.push('.'),
            '[' => {
                let mut class = String::new();
                let mut closed = false;

                if matches!(chars.peek(), Some('!') | Some('^')) {
                    chars.next();
                    class.push('^');
                }
                // A leading ']' is a literal member of the set
                if chars.peek() == Some(&']') {
                    chars.next();
                    class.push_str("\\]");
                }

                for member in chars.by_ref() {
                    match member {
                        ']' => {
                            closed = true;
                            break;
                        }
                        '\\' | '[' | '&' | '~' => {
                            class.push('\\');
                            class.push(member);
                        }
                        _ => class.push(member),
                    }
                }

                if !closed {
                    return Err(invalid(pattern, "unterminated character class"));
                }
                if class.is_empty() || class == "^" {
                    return Err(invalid(pattern, "empty character class"));
                }

                out.push('[');
                out.push_str(&class);
                out.push(']');
            }
            _ => out.push_str(&regex::escape(c.encode_utf8(&mut [0; 4]))),
        }
    }

    out.push('$');
    Ok(out)
}

//! Batch splitting
//!
//! A script is split on separator lines (`GO`, `/`) that appear outside any
//! string, quoted identifier or comment. The scanner keeps lexical state
//! across lines, so a separator inside a multi-line string or block comment
//! is ordinary text. Batches containing only whitespace and comments are
//! dropped.

use crate::dialect::{BatchSeparator, SqlDialect};
use crate::error::{SqlError, SqlResult};

/// One executable batch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Batch {
    /// Batch text with surrounding whitespace trimmed
    pub sql: String,

    /// 1-based line of the script where the batch begins
    pub line: usize,

    /// Times to execute the batch (`GO <n>`), at least 1
    pub repeat: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Code,
    Quoted {
        close: char,
        kind: &'static str,
        backslash: bool,
    },
    Dollar,
    BlockComment {
        depth: usize,
    },
}

struct Scanner<'d> {
    dialect: &'d dyn SqlDialect,
    state: State,
    /// Line where the current string or comment opened
    start_line: usize,
    dollar_tag: Vec<char>,
    has_code: bool,
}

impl<'d> Scanner<'d> {
    fn new(dialect: &'d dyn SqlDialect) -> Self {
        Self {
            dialect,
            state: State::Code,
            start_line: 0,
            dollar_tag: Vec::new(),
            has_code: false,
        }
    }

    fn open(&mut self, state: State, line_no: usize) {
        self.state = state;
        self.start_line = line_no;
    }

    fn scan_line(&mut self, line: &str, line_no: usize) {
        let chars: Vec<char> = line.chars().collect();
        let mut i = 0;

        while i < chars.len() {
            let c = chars[i];
            let next = chars.get(i + 1).copied();

            match self.state {
                State::Code => {
                    if c.is_whitespace() {
                        i += 1;
                        continue;
                    }
                    if c == '-' && next == Some('-') {
                        return;
                    }
                    if c == '#' && self.dialect.hash_comments() {
                        return;
                    }
                    if c == '/' && next == Some('*') {
                        self.open(State::BlockComment { depth: 1 }, line_no);
                        i += 2;
                        continue;
                    }

                    self.has_code = true;
                    let quoted = |close, kind, backslash| State::Quoted {
                        close,
                        kind,
                        backslash,
                    };
                    match c {
                        '\'' => self.open(
                            quoted('\'', "string literal", self.dialect.backslash_escapes()),
                            line_no,
                        ),
                        '"' => self.open(
                            quoted('"', "quoted identifier", self.dialect.backslash_escapes()),
                            line_no,
                        ),
                        '[' if self.dialect.bracket_identifiers() => {
                            self.open(quoted(']', "bracketed identifier", false), line_no)
                        }
                        '`' if self.dialect.backtick_identifiers() => {
                            self.open(quoted('`', "backtick identifier", false), line_no)
                        }
                        '$' if self.dialect.dollar_quotes() => {
                            if let Some(end) = dollar_tag_end(&chars, i) {
                                self.dollar_tag = chars[i + 1..end].to_vec();
                                self.open(State::Dollar, line_no);
                                i = end;
                            }
                        }
                        _ => {}
                    }
                    i += 1;
                }
                State::Quoted {
                    close, backslash, ..
                } => {
                    if backslash && c == '\\' {
                        i += 2;
                        continue;
                    }
                    if c == close {
                        self.state = State::Code;
                    }
                    i += 1;
                }
                State::Dollar => {
                    let tag_len = self.dollar_tag.len();
                    if c == '$'
                        && chars.get(i + 1 + tag_len) == Some(&'$')
                        && chars[i + 1..i + 1 + tag_len] == self.dollar_tag[..]
                    {
                        self.state = State::Code;
                        i += tag_len + 2;
                    } else {
                        i += 1;
                    }
                }
                State::BlockComment { depth } => {
                    if c == '*' && next == Some('/') {
                        self.state = if depth == 1 {
                            State::Code
                        } else {
                            State::BlockComment { depth: depth - 1 }
                        };
                        i += 2;
                    } else if c == '/' && next == Some('*') && self.dialect.nested_block_comments()
                    {
                        self.state = State::BlockComment { depth: depth + 1 };
                        i += 2;
                    } else {
                        i += 1;
                    }
                }
            }
        }
    }

    fn finish(&self) -> SqlResult<()> {
        let kind = match self.state {
            State::Code => return Ok(()),
            State::Quoted { kind, .. } => kind,
            State::Dollar => "dollar-quoted string",
            State::BlockComment { .. } => "block comment",
        };
        Err(SqlError::Unterminated {
            kind,
            line: self.start_line,
        })
    }

    fn flush(&mut self, current: &mut String, line: usize, repeat: u32, out: &mut Vec<Batch>) {
        if self.has_code {
            out.push(Batch {
                sql: current.trim().to_string(),
                line,
                repeat,
            });
        }
        current.clear();
        self.has_code = false;
    }
}

/// If `chars[start]` opens a dollar quote (`$$` or `$tag$`), return the index
/// of the closing `$` of the opening delimiter.
fn dollar_tag_end(chars: &[char], start: usize) -> Option<usize> {
    // `a$b$` is an identifier, not a quote
    if start > 0 {
        let prev = chars[start - 1];
        if prev.is_alphanumeric() || prev == '_' || prev == '$' {
            return None;
        }
    }
    // `$1` is a positional parameter
    if chars.get(start + 1).is_some_and(|c| c.is_ascii_digit()) {
        return None;
    }
    let mut j = start + 1;
    while j < chars.len() && (chars[j].is_alphanumeric() || chars[j] == '_') {
        j += 1;
    }
    (chars.get(j) == Some(&'$')).then_some(j)
}

/// Recognize a separator line. Returns the repeat count when `line` is one.
fn match_separator(
    line: &str,
    separator: BatchSeparator,
    hash_comments: bool,
    line_no: usize,
) -> SqlResult<Option<u32>> {
    let trimmed = line.trim();
    let keyword = separator.keyword();
    let Some(head) = trimmed.get(..keyword.len()) else {
        return Ok(None);
    };
    if !head.eq_ignore_ascii_case(keyword) {
        return Ok(None);
    }

    let is_comment = |s: &str| s.starts_with("--") || (hash_comments && s.starts_with('#'));

    let after = &trimmed[keyword.len()..];
    if !(after.is_empty() || after.starts_with(char::is_whitespace) || is_comment(after)) {
        return Ok(None);
    }

    let after = after.trim_start();
    let digits_end = after
        .find(|c: char| !c.is_ascii_digit())
        .unwrap_or(after.len());
    let (digits, rest) = after.split_at(digits_end);
    let rest = rest.trim_start();

    if !(rest.is_empty() || is_comment(rest)) {
        return Ok(None);
    }
    if digits.is_empty() {
        return Ok(Some(1));
    }
    if !separator.allows_repeat_count() {
        return Ok(None);
    }
    match digits.parse::<u32>() {
        Ok(n) if n > 0 => Ok(Some(n)),
        _ => Err(SqlError::InvalidRepeatCount {
            count: digits.to_string(),
            line: line_no,
        }),
    }
}

/// Split `text` into executable batches for `dialect`.
///
/// A missing trailing separator still yields the final batch. An
/// unterminated string, identifier or block comment is an error carrying
/// the line where it opened.
pub fn split_batches(text: &str, dialect: &dyn SqlDialect) -> SqlResult<Vec<Batch>> {
    let separator = dialect.separator();
    let hash_comments = dialect.hash_comments();
    let mut scanner = Scanner::new(dialect);
    let mut batches = Vec::new();
    let mut current = String::new();
    let mut batch_line = 1;

    for (idx, line) in text.split_inclusive('\n').enumerate() {
        let line_no = idx + 1;

        if scanner.state == State::Code {
            if let Some(repeat) = match_separator(line, separator, hash_comments, line_no)? {
                scanner.flush(&mut current, batch_line, repeat, &mut batches);
                batch_line = line_no + 1;
                continue;
            }
        }

        scanner.scan_line(line, line_no);
        current.push_str(line);
    }

    scanner.finish()?;
    scanner.flush(&mut current, batch_line, 1, &mut batches);

    log::debug!(
        "Split script into {} batch(es) using {} separator '{}'",
        batches.len(),
        dialect.name(),
        separator.keyword()
    );

    Ok(batches)
}

#[cfg(test)]
#[path = "splitter_test.rs"]
mod tests;

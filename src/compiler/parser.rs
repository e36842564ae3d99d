//! Parsing of canonical pattern expressions into compiled patterns.
//!
//! The grammar is a whitespace-separated sequence of fragments, optionally
//! anchored with a leading `^` and/or a trailing `$`:
//!
//! | Syntax              | Fragment                                   |
//! |---------------------|--------------------------------------------|
//! | `4d 5a`             | literal bytes (hex pairs)                  |
//! | `'text'`            | literal ASCII bytes                        |
//! | `` `text` ``        | literal raw bytes                          |
//! | `[00:1f 7f]`        | one byte from a set of ranges              |
//! | `[!00:1f]`          | one byte not in the set                    |
//! | `['abc' 20]`        | set members given as text                  |
//! | `??`                | any single byte                            |
//! | `[2:4]`, `[2:*]`    | gap of 2 to 4 (or at least 2) bytes        |
//! | `{4}`, `{2-4}`, `{2-*}` | gap                                    |
//! | `*`                 | gap of any length                          |
//! | `(01 02\|'ab'\|??)` | alternatives of fixed runs                 |
//!
//! A bracket whose bounds are both two-digit numbers, such as `[10:20]`, is a
//! byte range. Any other purely numeric bracket, such as `[2:4]` or `[128:256]`,
//! is a gap.
//!
//! Expressions are normalized before parsing, and the normalizer reads a `^`
//! directly followed by `[` as an inverted set: `^[00:1f]` is the floating
//! `[!00:1f]`. A start-anchored pattern that begins with a set is written with
//! a space after the anchor, `^ [00:1f]`, or with an explicit `^[!00:1f]`.

use crate::error::{Result, SignatureError};
use crate::ir::{coalesce, Anchor, ByteClass, CompiledPattern, Fragment, SignatureExpression};

/// Compile a canonical expression.
pub fn compile(expression: &SignatureExpression) -> Result<CompiledPattern> {
    let (anchor, fragments) = PatternParser::new(expression.as_str()).parse()?;
    Ok(CompiledPattern::new(expression.clone(), anchor, fragments))
}

/// Normalize and compile a raw expression.
pub fn compile_str(raw: &str) -> Result<CompiledPattern> {
    compile(&super::normalize(raw))
}

/// Recursive descent parser over the bytes of an expression.
pub(crate) struct PatternParser<'a> {
    input: &'a [u8],
    position: usize,
}

impl<'a> PatternParser<'a> {
    pub(crate) fn new(expression: &'a str) -> Self {
        Self {
            input: expression.as_bytes(),
            position: 0,
        }
    }

    fn peek(&self) -> Option<u8> {
        self.input.get(self.position).copied()
    }

    fn peek_at(&self, offset: usize) -> Option<u8> {
        self.input.get(self.position + offset).copied()
    }

    fn skip_whitespace(&mut self) {
        while matches!(self.peek(), Some(b) if b.is_ascii_whitespace()) {
            self.position += 1;
        }
    }

    fn skip_separators(&mut self) {
        while matches!(self.peek(), Some(b) if b.is_ascii_whitespace() || b == b',') {
            self.position += 1;
        }
    }

    fn error<T>(&self, position: usize, message: impl Into<String>) -> Result<T> {
        Err(SignatureError::syntax(position, message))
    }

    pub(crate) fn parse(mut self) -> Result<(Anchor, Vec<Fragment>)> {
        let mut anchor = Anchor::Floating;

        self.skip_whitespace();
        if self.peek() == Some(b'^') {
            anchor = Anchor::Start;
            self.position += 1;
        }

        let mut fragments = Vec::new();
        loop {
            self.skip_whitespace();
            match self.peek() {
                None => break,
                Some(b'$') => {
                    let dollar = self.position;
                    self.position += 1;
                    self.skip_whitespace();
                    if self.peek().is_some() {
                        return self.error(dollar, "'$' is only allowed at the end of a pattern");
                    }
                    anchor = anchor.combine(Anchor::End);
                    break;
                }
                Some(_) => fragments.push(self.parse_fragment(false)?),
            }
        }

        if fragments.is_empty() {
            return self.error(0, "empty pattern");
        }

        Ok((anchor, fragments))
    }

    fn parse_fragment(&mut self, in_alternative: bool) -> Result<Fragment> {
        let start = self.position;
        let Some(ch) = self.peek() else {
            return self.error(start, "unexpected end of pattern");
        };

        match ch {
            b'\'' | b'`' => Ok(Fragment::Literal(self.parse_quoted()?)),
            b'[' => self.parse_bracket(in_alternative),
            b'{' if in_alternative => self.error(start, "gaps are not allowed inside alternatives"),
            b'{' => self.parse_brace_gap(),
            b'*' if in_alternative => self.error(start, "gaps are not allowed inside alternatives"),
            b'*' => {
                self.position += 1;
                Ok(Fragment::Gap { min: 0, max: None })
            }
            b'?' => {
                if self.peek_at(1) != Some(b'?') {
                    return self.error(start, "expected '??'");
                }
                self.position += 2;
                Ok(Fragment::Class(ByteClass::any()))
            }
            b'(' if in_alternative => self.error(start, "nested alternatives are not supported"),
            b'(' => self.parse_alternatives(),
            b']' => self.error(start, "unmatched ']'"),
            b')' => self.error(start, "unmatched ')'"),
            b'}' => self.error(start, "unmatched '}'"),
            b'|' => self.error(start, "'|' outside alternatives"),
            b'^' => self.error(start, "'^' is only allowed at the start of a pattern"),
            b'$' => self.error(start, "'$' is only allowed at the end of a pattern"),
            _ => Ok(Fragment::Literal(vec![self.parse_hex_byte()?])),
        }
    }

    fn parse_hex_byte(&mut self) -> Result<u8> {
        let hi = self.hex_digit(self.position)?;
        let lo = self.hex_digit(self.position + 1)?;
        self.position += 2;
        Ok((hi << 4) | lo)
    }

    fn hex_digit(&self, position: usize) -> Result<u8> {
        match self.input.get(position) {
            Some(&b) => match (b as char).to_digit(16) {
                Some(d) => Ok(d as u8),
                None => self.error(position, format!("invalid hex digit '{}'", b as char)),
            },
            None => self.error(position, "incomplete hex byte"),
        }
    }

    fn parse_quoted(&mut self) -> Result<Vec<u8>> {
        let start = self.position;
        let delimiter = self.input[start];
        self.position += 1;

        let mut bytes = Vec::new();
        loop {
            match self.peek() {
                None => return self.error(start, "unterminated quoted text"),
                Some(b) if b == delimiter => {
                    self.position += 1;
                    break;
                }
                Some(b) => {
                    if delimiter == b'\'' && !b.is_ascii() {
                        return self.error(self.position, "non-ASCII character in quoted text");
                    }
                    bytes.push(b);
                    self.position += 1;
                }
            }
        }

        if bytes.is_empty() {
            return self.error(start, "empty quoted text");
        }
        Ok(bytes)
    }

    /// Find the `]` closing the bracket opened at `start`, skipping quoted text.
    fn find_closing_bracket(&self, start: usize) -> Result<usize> {
        let mut i = start + 1;
        let mut quote: Option<u8> = None;

        while let Some(&b) = self.input.get(i) {
            match quote {
                Some(q) if b == q => quote = None,
                Some(_) => {}
                None => match b {
                    b'\'' | b'`' => quote = Some(b),
                    b'[' => return self.error(i, "nested '[' inside a byte set"),
                    b']' => return Ok(i),
                    _ => {}
                },
            }
            i += 1;
        }

        self.error(start, "unterminated '['")
    }

    fn parse_bracket(&mut self, in_alternative: bool) -> Result<Fragment> {
        let start = self.position;
        let end = self.find_closing_bracket(start)?;
        let content = &self.input[start + 1..end];

        if let Some((min, max)) = gap_bounds(content) {
            if in_alternative {
                return self.error(start, "gaps are not allowed inside alternatives");
            }
            let min = parse_count(min).ok_or_else(|| {
                SignatureError::syntax(start, "gap bound is out of range")
            })?;
            let max = match max {
                b"*" => None,
                digits => Some(parse_count(digits).ok_or_else(|| {
                    SignatureError::syntax(start, "gap bound is out of range")
                })?),
            };
            if matches!(max, Some(max) if max < min) {
                return self.error(start, "gap minimum exceeds maximum");
            }
            self.position = end + 1;
            return Ok(Fragment::Gap { min, max });
        }

        self.position = start + 1;
        self.skip_whitespace();
        let negated = self.peek() == Some(b'!');
        if negated {
            self.position += 1;
        }

        let mut ranges = Vec::new();
        loop {
            self.skip_separators();
            match self.peek() {
                Some(b']') => break,
                Some(b'\'') | Some(b'`') => {
                    for b in self.parse_quoted()? {
                        ranges.push((b, b));
                    }
                }
                Some(_) => {
                    let lo = self.parse_hex_byte()?;
                    self.skip_whitespace();
                    if self.peek() == Some(b':') {
                        self.position += 1;
                        self.skip_whitespace();
                        let hi = self.parse_hex_byte()?;
                        ranges.push((lo, hi));
                    } else {
                        ranges.push((lo, lo));
                    }
                }
                None => return self.error(start, "unterminated '['"),
            }
        }

        if ranges.is_empty() {
            return self.error(start, "empty byte set");
        }

        self.position = end + 1;
        Ok(Fragment::Class(ByteClass::new(ranges, negated)))
    }

    fn parse_brace_gap(&mut self) -> Result<Fragment> {
        let start = self.position;
        let end = match self.input[start..].iter().position(|&b| b == b'}') {
            Some(offset) => start + offset,
            None => return self.error(start, "unterminated '{'"),
        };

        let content = trim(&self.input[start + 1..end]);
        let (min, max) = match content.iter().position(|&b| b == b'-') {
            Some(dash) => (trim(&content[..dash]), Some(trim(&content[dash + 1..]))),
            None => (content, None),
        };

        let invalid = || SignatureError::syntax(start, "invalid gap bounds");
        let min = parse_count(min).ok_or_else(invalid)?;
        let max = match max {
            None => Some(min),
            Some(b"*") => None,
            Some(digits) => Some(parse_count(digits).ok_or_else(invalid)?),
        };
        if matches!(max, Some(max) if max < min) {
            return self.error(start, "gap minimum exceeds maximum");
        }

        self.position = end + 1;
        Ok(Fragment::Gap { min, max })
    }

    fn parse_alternatives(&mut self) -> Result<Fragment> {
        let start = self.position;
        self.position += 1;

        let mut branches = Vec::new();
        let mut current = Vec::new();
        loop {
            self.skip_whitespace();
            match self.peek() {
                None => return self.error(start, "unterminated '('"),
                Some(b'|') | Some(b')') => {
                    if current.is_empty() {
                        return self.error(self.position, "empty alternative");
                    }
                    branches.push(coalesce(std::mem::take(&mut current)));
                    let closing = self.peek() == Some(b')');
                    self.position += 1;
                    if closing {
                        break;
                    }
                }
                Some(_) => current.push(self.parse_fragment(true)?),
            }
        }

        Ok(Fragment::Alternatives(branches))
    }
}

fn trim(bytes: &[u8]) -> &[u8] {
    let start = bytes
        .iter()
        .position(|b| !b.is_ascii_whitespace())
        .unwrap_or(bytes.len());
    let end = bytes
        .iter()
        .rposition(|b| !b.is_ascii_whitespace())
        .map_or(start, |p| p + 1);
    &bytes[start..end]
}

fn parse_count(digits: &[u8]) -> Option<usize> {
    if digits.is_empty() || !digits.iter().all(u8::is_ascii_digit) {
        return None;
    }
    std::str::from_utf8(digits).ok()?.parse().ok()
}

/// Split a bracket body into gap bounds if it has the numeric gap form.
fn gap_bounds(content: &[u8]) -> Option<(&[u8], &[u8])> {
    let colon = content.iter().position(|&b| b == b':')?;
    let min = trim(&content[..colon]);
    let max = trim(&content[colon + 1..]);

    let is_number = |s: &[u8]| !s.is_empty() && s.iter().all(u8::is_ascii_digit);
    if !is_number(min) || !(is_number(max) || max == b"*") {
        return None;
    }

    // two-digit bounds on both sides read as a byte range
    if min.len() == 2 && max.len() == 2 {
        return None;
    }

    Some((min, max))
}

//! Lexical helpers for scanning Go source without a full parser.
//!
//! [`Masked`] keeps two byte-aligned copies of a file: `code` with comments
//! blanked out, and `mask` which additionally blanks the contents of string,
//! raw-string and rune literals. Structure (brackets, commas, keywords) is
//! found in `mask`; literal text is read back from `code` at the same offsets.

pub(crate) struct Masked {
    pub code: String,
    pub mask: String,
}

#[derive(Clone, Copy, PartialEq)]
enum State {
    Code,
    LineComment,
    BlockComment,
    Str(u8),
}

impl Masked {
    pub fn new(source: &str) -> Self {
        let bytes = source.as_bytes();
        let mut code = Vec::with_capacity(bytes.len());
        let mut mask = Vec::with_capacity(bytes.len());
        let mut state = State::Code;
        let mut i = 0;

        while i < bytes.len() {
            let b = bytes[i];
            let next = bytes.get(i + 1).copied();
            match state {
                State::Code => match (b, next) {
                    (b'/', Some(b'/')) => {
                        state = State::LineComment;
                        push_both(&mut code, &mut mask, b"  ");
                        i += 2;
                        continue;
                    }
                    (b'/', Some(b'*')) => {
                        state = State::BlockComment;
                        push_both(&mut code, &mut mask, b"  ");
                        i += 2;
                        continue;
                    }
                    (b'"' | b'`' | b'\'', _) => {
                        state = State::Str(b);
                        push_both(&mut code, &mut mask, &[b]);
                    }
                    _ => push_both(&mut code, &mut mask, &[b]),
                },
                State::LineComment => {
                    if b == b'\n' {
                        state = State::Code;
                        push_both(&mut code, &mut mask, b"\n");
                    } else {
                        push_both(&mut code, &mut mask, b" ");
                    }
                }
                State::BlockComment => {
                    if b == b'*' && next == Some(b'/') {
                        state = State::Code;
                        push_both(&mut code, &mut mask, b"  ");
                        i += 2;
                        continue;
                    }
                    let keep = if b == b'\n' { b'\n' } else { b' ' };
                    push_both(&mut code, &mut mask, &[keep]);
                }
                State::Str(quote) => {
                    if b == b'\\' && quote != b'`' {
                        code.push(b);
                        mask.push(b' ');
                        if let Some(escaped) = next {
                            code.push(escaped);
                            mask.push(b' ');
                        }
                        i += 2;
                        continue;
                    }
                    if b == quote || (b == b'\n' && quote != b'`') {
                        state = State::Code;
                        push_both(&mut code, &mut mask, &[b]);
                    } else {
                        code.push(b);
                        mask.push(if b == b'\n' { b'\n' } else { b' ' });
                    }
                }
            }
            i += 1;
        }

        Self {
            code: String::from_utf8_lossy(&code).into_owned(),
            mask: String::from_utf8_lossy(&mask).into_owned(),
        }
    }

    /// Offset of the bracket closing the one opened just before `start`.
    pub fn closing(&self, start: usize, open: u8, close: u8) -> Option<usize> {
        let mut depth = 1usize;
        for (offset, &b) in self.mask.as_bytes()[start..].iter().enumerate() {
            if b == open {
                depth += 1;
            } else if b == close {
                depth -= 1;
                if depth == 0 {
                    return Some(start + offset);
                }
            }
        }
        None
    }

    /// Split the argument list beginning at `start` (just past the opening
    /// parenthesis) into trimmed `(code, mask)` pairs.
    pub fn call_args(&self, start: usize) -> Vec<(&str, &str)> {
        let Some(end) = self.closing(start, b'(', b')') else {
            return Vec::new();
        };
        self.split_top_level(start, end, |b| b == b',')
            .into_iter()
            .filter(|(code, _)| !code.is_empty())
            .collect()
    }

    /// Split `start..end` on bytes matched by `is_sep` that sit at bracket
    /// depth zero.
    pub fn split_top_level(
        &self,
        start: usize,
        end: usize,
        is_sep: impl Fn(u8) -> bool,
    ) -> Vec<(&str, &str)> {
        let mask = self.mask.as_bytes();
        let mut parts = Vec::new();
        let mut depth = 0i32;
        let mut from = start;
        for i in start..end {
            match mask[i] {
                b'(' | b'[' | b'{' => depth += 1,
                b')' | b']' | b'}' => depth -= 1,
                b if depth == 0 && is_sep(b) => {
                    parts.push(self.slice(from, i));
                    from = i + 1;
                }
                _ => {}
            }
        }
        parts.push(self.slice(from, end));
        parts
    }

    fn slice(&self, from: usize, to: usize) -> (&str, &str) {
        let code = self.code.get(from..to).unwrap_or_default();
        let mask = self.mask.get(from..to).unwrap_or_default();
        let lead = code.len() - code.trim_start().len();
        let trail = code.len() - code.trim_end().len();
        let range = lead..code.len() - trail;
        if range.is_empty() {
            return ("", "");
        }
        (
            code.get(range.clone()).unwrap_or_default(),
            mask.get(range).unwrap_or_default(),
        )
    }
}

fn push_both(code: &mut Vec<u8>, mask: &mut Vec<u8>, bytes: &[u8]) {
    code.extend_from_slice(bytes);
    mask.extend_from_slice(bytes);
}

/// Contents of `arg` when it is exactly one non-empty string literal.
pub(crate) fn string_literal<'a>((code, mask): (&'a str, &str)) -> Option<&'a str> {
    let quote = *mask.as_bytes().first()?;
    if !matches!(quote, b'"' | b'`') || mask.len() < 2 || !mask.ends_with(quote as char) {
        return None;
    }
    if mask[1..mask.len() - 1].bytes().any(|b| b == quote) {
        return None;
    }
    let inner = code.get(1..code.len() - 1)?;
    (!inner.is_empty()).then_some(inner)
}

/*
 * tokenizer.rs
 * Copyright (C) 2026 Chris Burdess
 *
 * This file is part of Tagliacarte, a cross-platform email client.
 *
 * Tagliacarte is free software: you can redistribute it and/or modify
 * it under the terms of the GNU General Public License as published by
 * the Free Software Foundation, either version 3 of the License, or
 * (at your option) any later version.
 *
 * Tagliacarte is distributed in the hope that it will be useful,
 * but WITHOUT ANY WARRANTY; without even the implied warranty of
 * MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
 * GNU General Public License for more details.
 *
 * You should have received a copy of the GNU General Public License
 * along with Tagliacarte.  If not, see <http://www.gnu.org/licenses/>.
 */

//! Incremental byte-stream to token-stream conversion (RFC 9051 §9), literal-aware.
//!
//! [`tokenize_line`] consumes bytes for exactly one top-level response (terminated by
//! CRLF, with embedded CRLF permitted inside quoted strings and literals) and is
//! restartable: on [`TokenizeOutcome::Incomplete`] the caller's buffer is left
//! untouched and a retry after appending more bytes resumes from scratch.

use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Token {
    Atom(String),
    Number(u64),
    QuotedString(String),
    Literal(Vec<u8>),
    Flag(String),
    Nil,
    LParen,
    RParen,
    LBracket,
    RBracket,
    Star,
    Plus,
    Crlf,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenizeError(pub String);

impl fmt::Display for TokenizeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "malformed response: {}", self.0)
    }
}

impl std::error::Error for TokenizeError {}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TokenizeOutcome {
    /// One full response line was tokenized; `consumed` bytes should be dropped from the buffer.
    Complete { tokens: Vec<Token>, consumed: usize },
    /// More bytes are needed; the buffer must be retried unmodified once more data arrives.
    Incomplete,
}

fn is_atom_char(b: u8) -> bool {
    matches!(b,
        0x21
        | 0x23..=0x27
        | 0x2B..=0x3F
        | 0x40..=0x5A
        | 0x5E..=0x60
        | 0x61..=0x7A
        | 0x7C
        | 0x7E
    )
}

/// Tokenize one complete response line out of `buf`. Never mutates or consumes `buf`
/// itself; the caller advances its own cursor by `consumed` bytes on success.
pub fn tokenize_line(buf: &[u8]) -> Result<TokenizeOutcome, TokenizeError> {
    let mut i = 0usize;
    let mut tokens = Vec::new();

    loop {
        while i < buf.len() && buf[i] == b' ' {
            i += 1;
        }
        if i >= buf.len() {
            return Ok(TokenizeOutcome::Incomplete);
        }
        match buf[i] {
            b'\r' => {
                if i + 1 >= buf.len() {
                    return Ok(TokenizeOutcome::Incomplete);
                }
                if buf[i + 1] != b'\n' {
                    return Err(TokenizeError("bare CR not followed by LF".into()));
                }
                tokens.push(Token::Crlf);
                return Ok(TokenizeOutcome::Complete { tokens, consumed: i + 2 });
            }
            b'(' => {
                tokens.push(Token::LParen);
                i += 1;
            }
            b')' => {
                tokens.push(Token::RParen);
                i += 1;
            }
            b'[' => {
                tokens.push(Token::LBracket);
                i += 1;
            }
            b']' => {
                tokens.push(Token::RBracket);
                i += 1;
            }
            b'*' => {
                tokens.push(Token::Star);
                i += 1;
            }
            b'+' => {
                tokens.push(Token::Plus);
                i += 1;
            }
            b'"' => match scan_quoted_string(buf, i)? {
                None => return Ok(TokenizeOutcome::Incomplete),
                Some((s, next)) => {
                    tokens.push(Token::QuotedString(s));
                    i = next;
                }
            },
            b'{' => match scan_literal(buf, i)? {
                None => return Ok(TokenizeOutcome::Incomplete),
                Some((bytes, next)) => {
                    tokens.push(Token::Literal(bytes));
                    i = next;
                }
            },
            b'\\' => match scan_flag(buf, i) {
                None => return Ok(TokenizeOutcome::Incomplete),
                Some((flag, next)) => {
                    tokens.push(Token::Flag(flag));
                    i = next;
                }
            },
            b if b.is_ascii_digit() => {
                let start = i;
                while i < buf.len() && buf[i].is_ascii_digit() {
                    i += 1;
                }
                if i >= buf.len() {
                    return Ok(TokenizeOutcome::Incomplete);
                }
                let digits = std::str::from_utf8(&buf[start..i]).unwrap();
                let n: u64 = digits
                    .parse()
                    .map_err(|_| TokenizeError(format!("number overflow: {digits}")))?;
                tokens.push(Token::Number(n));
            }
            b if is_atom_char(b) => {
                let start = i;
                while i < buf.len() && is_atom_char(buf[i]) {
                    i += 1;
                }
                if i >= buf.len() {
                    return Ok(TokenizeOutcome::Incomplete);
                }
                let atom = std::str::from_utf8(&buf[start..i])
                    .map_err(|_| TokenizeError("atom is not valid UTF-8".into()))?
                    .to_string();
                if atom == "NIL" {
                    tokens.push(Token::Nil);
                } else {
                    tokens.push(Token::Atom(atom));
                }
            }
            other => {
                return Err(TokenizeError(format!("unexpected byte 0x{other:02x}")));
            }
        }
    }
}

fn scan_quoted_string(buf: &[u8], start: usize) -> Result<Option<(String, usize)>, TokenizeError> {
    let mut i = start + 1;
    let mut out = Vec::new();
    loop {
        if i >= buf.len() {
            return Ok(None);
        }
        match buf[i] {
            b'"' => return Ok(Some((String::from_utf8_lossy(&out).into_owned(), i + 1))),
            b'\\' => {
                if i + 1 >= buf.len() {
                    return Ok(None);
                }
                match buf[i + 1] {
                    b'"' | b'\\' => {
                        out.push(buf[i + 1]);
                        i += 2;
                    }
                    _ => return Err(TokenizeError("invalid escape in quoted string".into())),
                }
            }
            b'\r' | b'\n' => return Err(TokenizeError("bare CR/LF inside quoted string".into())),
            b => {
                out.push(b);
                i += 1;
            }
        }
    }
}

fn scan_literal(buf: &[u8], start: usize) -> Result<Option<(Vec<u8>, usize)>, TokenizeError> {
    let mut i = start + 1;
    let digits_start = i;
    while i < buf.len() && buf[i].is_ascii_digit() {
        i += 1;
    }
    if i == digits_start {
        if i >= buf.len() {
            return Ok(None);
        }
        return Err(TokenizeError("literal header has no digits".into()));
    }
    if i >= buf.len() {
        return Ok(None);
    }
    if buf[i] == b'+' {
        // non-synchronizing literal marker; this core always waits for the bytes regardless.
        i += 1;
        if i >= buf.len() {
            return Ok(None);
        }
    }
    if buf[i] != b'}' {
        return Err(TokenizeError("literal header not terminated by '}'".into()));
    }
    i += 1;
    if i + 1 >= buf.len() {
        return Ok(None);
    }
    if buf[i] != b'\r' || buf[i + 1] != b'\n' {
        return Err(TokenizeError("literal header not followed by CRLF".into()));
    }
    i += 2;
    let digits = std::str::from_utf8(&buf[digits_start..digits_start + count_digits(&buf[digits_start..])]).unwrap();
    let n: usize = digits
        .parse()
        .map_err(|_| TokenizeError(format!("literal size overflow: {digits}")))?;
    if buf.len() - i < n {
        return Ok(None);
    }
    let bytes = buf[i..i + n].to_vec();
    Ok(Some((bytes, i + n)))
}

fn count_digits(buf: &[u8]) -> usize {
    buf.iter().take_while(|b| b.is_ascii_digit()).count()
}

fn scan_flag(buf: &[u8], start: usize) -> Option<(String, usize)> {
    let mut i = start + 1;
    if i >= buf.len() {
        return None;
    }
    if buf[i] == b'*' {
        return Some(("*".to_string(), i + 1));
    }
    let run_start = i;
    while i < buf.len() && is_atom_char(buf[i]) {
        i += 1;
    }
    if i >= buf.len() {
        return None;
    }
    let name = std::str::from_utf8(&buf[run_start..i]).ok()?.to_string();
    Some((name, i))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tokens_of(s: &str) -> Vec<Token> {
        match tokenize_line(s.as_bytes()).unwrap() {
            TokenizeOutcome::Complete { tokens, .. } => tokens,
            TokenizeOutcome::Incomplete => panic!("expected complete tokenization of {s:?}"),
        }
    }

    #[test]
    fn tags_and_status() {
        let toks = tokens_of("A0001 OK LOGIN completed\r\n");
        assert_eq!(
            toks,
            vec![
                Token::Atom("A0001".into()),
                Token::Atom("OK".into()),
                Token::Atom("LOGIN".into()),
                Token::Atom("completed".into()),
                Token::Crlf,
            ]
        );
    }

    #[test]
    fn nil_is_distinct_token() {
        let toks = tokens_of("* LIST (\\Noselect) NIL INBOX\r\n");
        assert!(toks.contains(&Token::Nil));
    }

    #[test]
    fn number_then_uid_set_continuation_atom() {
        // "304,319:320" tokenizes as Number(304) followed by an atom starting with ','.
        let toks = tokens_of("* OK [COPYUID 1 304,319:320 1:2] done\r\n");
        let nums: Vec<&Token> = toks.iter().filter(|t| matches!(t, Token::Number(_))).collect();
        assert!(nums.contains(&&Token::Number(304)));
        assert!(toks.contains(&Token::Atom(",319:320".into())));
    }

    #[test]
    fn quoted_string_with_escapes() {
        let toks = tokens_of("A1 LOGIN \"us\\\"er\" \"pa\\\\ss\"\r\n");
        assert!(toks.contains(&Token::QuotedString("us\"er".into())));
        assert!(toks.contains(&Token::QuotedString("pa\\ss".into())));
    }

    #[test]
    fn literal_with_embedded_crlf() {
        let line = b"* 1 FETCH (BODY[] {11}\r\nHello World)\r\n";
        let toks = match tokenize_line(line).unwrap() {
            TokenizeOutcome::Complete { tokens, consumed } => {
                assert_eq!(consumed, line.len());
                tokens
            }
            TokenizeOutcome::Incomplete => panic!("expected complete"),
        };
        assert!(toks.contains(&Token::Literal(b"Hello World".to_vec())));
    }

    #[test]
    fn incomplete_on_truncated_literal() {
        let line = b"* 1 FETCH (BODY[] {11}\r\nHello";
        match tokenize_line(line).unwrap() {
            TokenizeOutcome::Incomplete => {}
            TokenizeOutcome::Complete { .. } => panic!("expected incomplete"),
        }
    }

    #[test]
    fn incomplete_on_truncated_line() {
        match tokenize_line(b"A0001 OK LOGIN comple").unwrap() {
            TokenizeOutcome::Incomplete => {}
            TokenizeOutcome::Complete { .. } => panic!("expected incomplete"),
        }
    }

    #[test]
    fn restartability_across_arbitrary_splits() {
        let full = b"* 172 EXISTS\r\n".to_vec();
        let whole = match tokenize_line(&full).unwrap() {
            TokenizeOutcome::Complete { tokens, .. } => tokens,
            TokenizeOutcome::Incomplete => panic!("expected complete"),
        };
        for split in 1..full.len() {
            let mut buf = full[..split].to_vec();
            let first = tokenize_line(&buf).unwrap();
            assert_eq!(first, TokenizeOutcome::Incomplete, "split at {split}");
            buf.extend_from_slice(&full[split..]);
            let second = tokenize_line(&buf).unwrap();
            match second {
                TokenizeOutcome::Complete { tokens, consumed } => {
                    assert_eq!(tokens, whole);
                    assert_eq!(consumed, full.len());
                }
                TokenizeOutcome::Incomplete => panic!("expected complete after full buffer at split {split}"),
            }
        }
    }

    #[test]
    fn flag_tokens() {
        let toks = tokens_of("* FLAGS (\\Answered \\Seen \\*)\r\n");
        assert!(toks.contains(&Token::Flag("Answered".into())));
        assert!(toks.contains(&Token::Flag("Seen".into())));
        assert!(toks.contains(&Token::Flag("*".into())));
    }

    #[test]
    fn bare_cr_without_lf_is_malformed() {
        assert!(tokenize_line(b"A1 OK\rX").is_err());
    }

    #[test]
    fn unterminated_quoted_string_is_incomplete() {
        assert_eq!(
            tokenize_line(b"A1 LOGIN \"unterminated").unwrap(),
            TokenizeOutcome::Incomplete
        );
    }
}

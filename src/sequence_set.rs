/*
 * sequence_set.rs
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

//! Sequence-set parse/format (RFC 9051 §9, `sequence-set`). Round-trips the exact
//! input syntax: `304,319:320`, `1:*`, `5`, etc.

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SeqNum {
    Value(u32),
    /// `*`, the largest message/UID number in the mailbox.
    Largest,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SeqItem {
    Single(SeqNum),
    Range(SeqNum, SeqNum),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SequenceSet(pub Vec<SeqItem>);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SequenceSetError(pub String);

impl std::fmt::Display for SequenceSetError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "invalid sequence-set: {}", self.0)
    }
}

impl std::error::Error for SequenceSetError {}

fn format_num(n: SeqNum) -> String {
    match n {
        SeqNum::Value(v) => v.to_string(),
        SeqNum::Largest => "*".to_string(),
    }
}

fn parse_num(s: &str) -> Result<SeqNum, SequenceSetError> {
    if s == "*" {
        return Ok(SeqNum::Largest);
    }
    s.parse::<u32>()
        .map(SeqNum::Value)
        .map_err(|_| SequenceSetError(format!("not a sequence number: {s}")))
}

/// Parse `s` into a [`SequenceSet`]. Accepts comma-separated single numbers, ranges
/// (`n:m`), and `*`.
pub fn parse(s: &str) -> Result<SequenceSet, SequenceSetError> {
    if s.is_empty() {
        return Err(SequenceSetError("empty sequence-set".into()));
    }
    let mut items = Vec::new();
    for part in s.split(',') {
        if part.is_empty() {
            return Err(SequenceSetError("empty element between commas".into()));
        }
        match part.split_once(':') {
            Some((a, b)) => items.push(SeqItem::Range(parse_num(a)?, parse_num(b)?)),
            None => items.push(SeqItem::Single(parse_num(part)?)),
        }
    }
    Ok(SequenceSet(items))
}

/// Render a [`SequenceSet`] back to its wire syntax.
pub fn format(set: &SequenceSet) -> String {
    set.0
        .iter()
        .map(|item| match item {
            SeqItem::Single(n) => format_num(*n),
            SeqItem::Range(a, b) => format!("{}:{}", format_num(*a), format_num(*b)),
        })
        .collect::<Vec<_>>()
        .join(",")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_simple_forms() {
        for s in ["1", "1:5", "1,3,5", "304,319:320", "1:*", "*", "1:4,7,9:11"] {
            let parsed = parse(s).unwrap();
            assert_eq!(format(&parsed), s, "round-trip mismatch for {s}");
        }
    }

    #[test]
    fn format_of_parse_is_identity() {
        let set = SequenceSet(vec![
            SeqItem::Single(SeqNum::Value(1)),
            SeqItem::Range(SeqNum::Value(3), SeqNum::Largest),
        ]);
        let formatted = format(&set);
        assert_eq!(parse(&formatted).unwrap(), set);
    }

    #[test]
    fn rejects_empty_and_malformed() {
        assert!(parse("").is_err());
        assert!(parse("1,,2").is_err());
        assert!(parse("abc").is_err());
    }
}

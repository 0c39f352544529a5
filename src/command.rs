/*
 * command.rs
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

//! Command value to wire-bytes serialization (RFC 9051 §6-7).

pub const DONE: &[u8] = b"DONE\r\n";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommandArg {
    /// Quoted or emitted as-is per the astring-safe rule.
    Str(String),
    /// Emitted verbatim, no quoting (pre-formed parenthesized lists, `[section]`, etc.).
    Raw(String),
    Number(u64),
    /// Triggers the continuation handshake; at most one per command.
    Literal(Vec<u8>),
}

impl From<&str> for CommandArg {
    fn from(s: &str) -> Self {
        CommandArg::Str(s.to_string())
    }
}

impl From<String> for CommandArg {
    fn from(s: String) -> Self {
        CommandArg::Str(s)
    }
}

impl From<u64> for CommandArg {
    fn from(n: u64) -> Self {
        CommandArg::Number(n)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Command {
    pub tag: String,
    pub name: String,
    pub args: Vec<CommandArg>,
}

impl Command {
    pub fn new(tag: impl Into<String>, name: impl Into<String>, args: Vec<CommandArg>) -> Self {
        Command { tag: tag.into(), name: name.into(), args }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SerializedCommand {
    Plain(Vec<u8>),
    /// `prefix` ends with `{N}\r\n`; caller sends it, awaits a continuation, then sends
    /// `literal` followed by CRLF.
    WithLiteral { prefix: Vec<u8>, literal: Vec<u8> },
}

fn is_astring_safe(b: u8) -> bool {
    b > 0x20 && b != 0x7F && b != b'(' && b != b')' && b != b'{' && b != b'"' && b != b'\\'
}

/// Quote `s` as an IMAP string if it contains bytes outside the astring-safe set.
/// Empty strings always quote to `""`.
pub fn quote_astring(s: &str) -> String {
    if !s.is_empty() && s.bytes().all(is_astring_safe) {
        s.to_string()
    } else {
        let mut out = String::with_capacity(s.len() + 2);
        out.push('"');
        for c in s.chars() {
            if c == '\\' || c == '"' {
                out.push('\\');
            }
            out.push(c);
        }
        out.push('"');
        out
    }
}

/// Serialize a [`Command`] into wire bytes. Exactly one [`CommandArg::Literal`] is supported.
pub fn serialize(cmd: &Command) -> SerializedCommand {
    let mut prefix = Vec::new();
    prefix.extend_from_slice(cmd.tag.as_bytes());
    prefix.push(b' ');
    prefix.extend_from_slice(cmd.name.as_bytes());

    for (i, arg) in cmd.args.iter().enumerate() {
        match arg {
            CommandArg::Literal(data) => {
                prefix.push(b' ');
                prefix.extend_from_slice(format!("{{{}}}", data.len()).as_bytes());
                prefix.extend_from_slice(b"\r\n");
                debug_assert_eq!(i, cmd.args.len() - 1, "at most one literal arg is supported, and it must be last");
                return SerializedCommand::WithLiteral { prefix, literal: data.clone() };
            }
            CommandArg::Str(s) => {
                prefix.push(b' ');
                prefix.extend_from_slice(quote_astring(s).as_bytes());
            }
            CommandArg::Raw(s) => {
                prefix.push(b' ');
                prefix.extend_from_slice(s.as_bytes());
            }
            CommandArg::Number(n) => {
                prefix.push(b' ');
                prefix.extend_from_slice(n.to_string().as_bytes());
            }
        }
    }
    prefix.extend_from_slice(b"\r\n");
    SerializedCommand::Plain(prefix)
}

/// Render tag `n` (1-based) as `A` + zero-padded 4-digit decimal, growing beyond 4 digits as needed.
pub fn format_tag(n: u32) -> String {
    format!("A{:04}", n)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_command_with_atom_safe_args() {
        let cmd = Command::new("A0001", "SELECT", vec!["INBOX".into()]);
        assert_eq!(serialize(&cmd), SerializedCommand::Plain(b"A0001 SELECT INBOX\r\n".to_vec()));
    }

    #[test]
    fn quotes_string_with_space() {
        let cmd = Command::new("A0002", "LOGIN", vec!["user name".into(), "p@ss".into()]);
        assert_eq!(
            serialize(&cmd),
            SerializedCommand::Plain(b"A0002 LOGIN \"user name\" p@ss\r\n".to_vec())
        );
    }

    #[test]
    fn escapes_backslash_and_quote() {
        assert_eq!(quote_astring("a\"b\\c"), "\"a\\\"b\\\\c\"");
    }

    #[test]
    fn empty_string_quotes_to_empty_quoted_string() {
        assert_eq!(quote_astring(""), "\"\"");
    }

    #[test]
    fn append_emits_literal_prefix_and_retains_bytes() {
        let cmd = Command::new(
            "A0003",
            "APPEND",
            vec!["INBOX".into(), CommandArg::Literal(b"hello world".to_vec())],
        );
        match serialize(&cmd) {
            SerializedCommand::WithLiteral { prefix, literal } => {
                assert_eq!(prefix, b"A0003 APPEND INBOX {11}\r\n");
                assert_eq!(literal, b"hello world");
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn raw_arg_bypasses_quoting() {
        let cmd = Command::new("A0004", "STORE", vec!["1:2".into(), CommandArg::Raw("+FLAGS (\\Seen)".into())]);
        assert_eq!(
            serialize(&cmd),
            SerializedCommand::Plain(b"A0004 STORE 1:2 +FLAGS (\\Seen)\r\n".to_vec())
        );
    }

    #[test]
    fn tag_formatting_zero_pads_to_four_digits() {
        assert_eq!(format_tag(1), "A0001");
        assert_eq!(format_tag(42), "A0042");
        assert_eq!(format_tag(10000), "A10000");
    }
}
